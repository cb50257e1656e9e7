use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout(e.to_string())
        } else {
            ServiceError::Gateway(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
