use crate::domain::status::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrderError>;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("error: order not found")]
    OrderNotFound,
    #[error("error: sub order not found")]
    SubOrderNotFound,
    #[error("error: previous order not completed yet")]
    PreviousOrderNotEmpty,
    #[error("error: order id cannot be empty")]
    OrderIsEmpty,
    #[error("error: this order already cancelled")]
    CancelOrder,
    #[error("error: amount must be {percent}% from total price")]
    InvalidDownAmount { percent: Decimal },
    #[error("error: amount must be 50% from (remaining outstanding amount - down payment)")]
    InvalidHalfAmount,
    #[error("error: amount must be 100% from (remaining outstanding amount - half payment)")]
    InvalidFullAmount,
    #[error("error: your bill for 100% has been paid")]
    FullPaymentNotEmpty,
    #[error("error: your bill for 50% has been paid")]
    HalfPaymentNotEmpty,
    #[error("order date must be greater than now")]
    OrderDate,
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error("invalid status")]
    InvalidStatus,
    #[error("invalid payment type: {0}")]
    InvalidPaymentType(String),
    #[error("database server failed to execute, please try again")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("sorry, third party service is busy")]
    CircuitOpen { service: &'static str },
    #[error("{service} service error: {message}")]
    Gateway {
        service: &'static str,
        message: String,
    },
    #[error("malformed payment event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("message broker error: {0}")]
    Broker(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OrderError {
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    pub fn gateway(service: &'static str, message: impl Into<String>) -> Self {
        Self::Gateway {
            service,
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt. Domain rejections and
    /// undecodable payloads fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::CircuitOpen { .. } | Self::Gateway { .. }
        )
    }
}

#[cfg(feature = "storage-postgres")]
impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::storage(err)
    }
}

#[cfg(feature = "storage-postgres")]
impl From<sqlx::migrate::MigrateError> for OrderError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        tracing::error!(error = %err, "migration failure");
        Self::storage(err)
    }
}
