pub mod subscription_store;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Shared Postgres handle; repository traits are implemented on this type.
#[derive(Clone)]
pub struct PostgresPersistence {
    pub(crate) pool: PgPool,
}

pub async fn postgres_persistence(database_url: &str) -> Result<PostgresPersistence, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(PostgresPersistence { pool })
}
