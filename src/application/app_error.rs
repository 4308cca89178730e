use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Too many requests. Please slow down.")]
    RateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Subscription {0} is not active")]
    SubscriptionNotActive(String),

    #[error("Merchant subscription id {0} already exists")]
    DuplicateSubscriptionId(String),

    #[error("Gateway transport error: {0}")]
    GatewayTransport(String),

    #[error("Gateway error {code}: {message}")]
    Gateway { code: String, message: String },

    #[error("Webhook authorization failed")]
    WebhookUnauthorized,

    #[error("Webhook credentials are not configured")]
    WebhookNotConfigured,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the HTTP error body.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::SubscriptionNotActive(_) => ErrorCode::SubscriptionNotActive,
            AppError::DuplicateSubscriptionId(_) => ErrorCode::DuplicateSubscriptionId,
            AppError::GatewayTransport(_) => ErrorCode::GatewayTransport,
            AppError::Gateway { .. } => ErrorCode::GatewayError,
            AppError::WebhookUnauthorized => ErrorCode::WebhookUnauthorized,
            AppError::WebhookNotConfigured => ErrorCode::WebhookNotConfigured,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Database(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    RateLimited,
    InvalidInput,
    NotFound,
    SubscriptionNotActive,
    DuplicateSubscriptionId,
    GatewayTransport,
    GatewayError,
    WebhookUnauthorized,
    WebhookNotConfigured,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::SubscriptionNotActive => "SUBSCRIPTION_NOT_ACTIVE",
            ErrorCode::DuplicateSubscriptionId => "DUPLICATE_SUBSCRIPTION_ID",
            ErrorCode::GatewayTransport => "GATEWAY_TRANSPORT",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::WebhookUnauthorized => "WEBHOOK_UNAUTHORIZED",
            ErrorCode::WebhookNotConfigured => "WEBHOOK_NOT_CONFIGURED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
