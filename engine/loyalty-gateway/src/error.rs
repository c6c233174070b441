//! Error types for the LoyaltyGateway

use thiserror::Error;
use warp::http::StatusCode;

/// Errors that can occur in the LoyaltyGateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),
}

/// Result type for LoyaltyGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request outcomes turned into error responses by the rejection handler
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    InsufficientFunds,
    Conflict { code: &'static str, message: String },
    InvalidNumber(String),
    /// Details are logged where they happen, never sent
    Internal,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::InvalidNumber(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ApiError::Conflict { code, .. } => code,
            ApiError::InvalidNumber(_) => "INVALID_ORDER_NUMBER",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::InvalidNumber(message)
            | ApiError::Conflict { message, .. } => message.clone(),
            ApiError::InsufficientFunds => "not enough points on balance".to_string(),
            ApiError::Internal => "internal server error".to_string(),
        }
    }
}
