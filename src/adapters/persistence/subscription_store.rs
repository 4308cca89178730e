use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_lifecycle::SubscriptionStore,
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

const SELECT_COLS: &str = r#"
    merchant_subscription_id, gateway_order_id, user_id, status,
    amount_minor, max_amount_minor, amount_type, frequency,
    auth_workflow_type, start_date, end_date, created_at, updated_at
"#;

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> AppResult<Subscription> {
    let status: String = row.get("status");
    let amount_type: String = row.get("amount_type");
    let frequency: String = row.get("frequency");
    let auth_workflow_type: String = row.get("auth_workflow_type");

    Ok(Subscription {
        merchant_subscription_id: row.get("merchant_subscription_id"),
        gateway_order_id: row.get("gateway_order_id"),
        user_id: row.get("user_id"),
        status: SubscriptionStatus::from_gateway(&status),
        amount_minor: row.get("amount_minor"),
        max_amount_minor: row.get("max_amount_minor"),
        amount_type: amount_type
            .parse()
            .map_err(|_| AppError::Database(format!("bad amount_type: {amount_type}")))?,
        frequency: frequency
            .parse()
            .map_err(|_| AppError::Database(format!("bad frequency: {frequency}")))?,
        auth_workflow_type: auth_workflow_type
            .parse()
            .map_err(|_| AppError::Database(format!("bad auth_workflow_type: {auth_workflow_type}")))?,
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SubscriptionStore for PostgresPersistence {
    async fn get(&self, merchant_subscription_id: &str) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM subscriptions WHERE merchant_subscription_id = $1"
        ))
        .bind(merchant_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn get_all(&self) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM subscriptions ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        rows.iter().map(row_to_subscription).collect()
    }

    async fn get_active_only(&self) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM subscriptions WHERE status = 'ACTIVE' ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        rows.iter().map(row_to_subscription).collect()
    }

    async fn upsert(&self, subscription: &Subscription) -> AppResult<Subscription> {
        // Field-level replace on conflict; created_at is kept from the
        // original row. Last-write-wins is fine: the gateway is the
        // authoritative system and Postgres serializes same-row writes.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions
                (merchant_subscription_id, gateway_order_id, user_id, status,
                 amount_minor, max_amount_minor, amount_type, frequency,
                 auth_workflow_type, start_date, end_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, CURRENT_TIMESTAMP)
            ON CONFLICT (merchant_subscription_id) DO UPDATE SET
                gateway_order_id = EXCLUDED.gateway_order_id,
                user_id = EXCLUDED.user_id,
                status = EXCLUDED.status,
                amount_minor = EXCLUDED.amount_minor,
                max_amount_minor = EXCLUDED.max_amount_minor,
                amount_type = EXCLUDED.amount_type,
                frequency = EXCLUDED.frequency,
                auth_workflow_type = EXCLUDED.auth_workflow_type,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(&subscription.merchant_subscription_id)
        .bind(&subscription.gateway_order_id)
        .bind(subscription.user_id)
        .bind(subscription.status.as_str())
        .bind(subscription.amount_minor)
        .bind(subscription.max_amount_minor)
        .bind(subscription.amount_type.as_ref())
        .bind(subscription.frequency.as_ref())
        .bind(subscription.auth_workflow_type.as_ref())
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        row_to_subscription(&row)
    }

    async fn update_status(
        &self,
        merchant_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions SET
                status = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE merchant_subscription_id = $1
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(merchant_subscription_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        let row = row.ok_or(AppError::NotFound)?;
        row_to_subscription(&row)
    }
}
