//! REST API endpoints for the LoyaltyGateway
//!
//! Order upload and listing, balance, withdrawals, plus registration and
//! login from [`crate::auth`]. Every rejection is turned into an
//! [`ErrorResponse`] by [`handle_rejection`].

use crate::auth::{self, with_auth, Credentials};
use crate::error::ApiError;
use crate::session::SessionCache;
use ledger_store::{checksum, Balance, LedgerStore, Order, SubmitOutcome, Withdrawal, WithdrawalOutcome};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Reply};

/// Order as listed to its owner
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    pub uploaded_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status.to_string(),
            accrual: order.accrual,
            uploaded_at: order.uploaded_at.to_rfc3339(),
        }
    }
}

/// Withdrawal request body
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: f64,
}

/// Withdrawal as listed to its owner
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    pub processed_at: String,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.number,
            sum: withdrawal.amount,
            processed_at: withdrawal.processed_at.to_rfc3339(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn reject(error: ApiError) -> warp::Rejection {
    warp::reject::custom(error)
}

fn internal(context: &str, login: &str, e: impl std::fmt::Display) -> warp::Rejection {
    error!(login = %login, "{} failed: {}", context, e);
    reject(ApiError::Internal)
}

/// `POST /api/user/orders`
pub async fn submit_order(
    login: String,
    content_type: Option<String>,
    body: Bytes,
    ledger: Arc<dyn LedgerStore>,
) -> Result<Response, warp::Rejection> {
    let is_text = content_type.map(|ct| ct.starts_with("text/plain")).unwrap_or(false);
    if !is_text {
        return Err(reject(ApiError::BadRequest("expected Content-Type text/plain".to_string())));
    }

    let number = std::str::from_utf8(&body)
        .map_err(|_| reject(ApiError::BadRequest("body is not valid UTF-8".to_string())))?
        .trim();

    if !checksum::is_valid(number) {
        return Err(reject(ApiError::InvalidNumber(format!("invalid order number {:?}", number))));
    }

    match ledger.submit_order(number, &login).await {
        Ok(SubmitOutcome::Created) => {
            info!(order = %number, login = %login, "Order uploaded");
            Ok(warp::reply::with_status(format!("Order {} accepted", number), StatusCode::ACCEPTED)
                .into_response())
        }
        Ok(SubmitOutcome::AlreadyOwnedBySelf) => {
            Ok(warp::reply::with_status(format!("Order {} already uploaded", number), StatusCode::OK)
                .into_response())
        }
        Ok(SubmitOutcome::OwnedByOther) => {
            warn!(order = %number, login = %login, "Order held by another user");
            Err(reject(ApiError::Conflict {
                code: "ORDER_OWNED_BY_OTHER",
                message: format!("order {} was uploaded by another user", number),
            }))
        }
        Err(e) => Err(internal("Order upload", &login, e)),
    }
}

/// `GET /api/user/orders`
pub async fn list_orders(login: String, ledger: Arc<dyn LedgerStore>) -> Result<Response, warp::Rejection> {
    let orders = ledger.get_orders(&login).await.map_err(|e| internal("Order listing", &login, e))?;

    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let response: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(warp::reply::json(&response).into_response())
}

/// `GET /api/user/balance`
pub async fn get_balance(login: String, ledger: Arc<dyn LedgerStore>) -> Result<Response, warp::Rejection> {
    let balance: Balance =
        ledger.get_balance(&login).await.map_err(|e| internal("Balance lookup", &login, e))?;
    Ok(warp::reply::json(&balance).into_response())
}

/// `POST /api/user/balance/withdraw`
pub async fn withdraw(
    login: String,
    request: WithdrawRequest,
    ledger: Arc<dyn LedgerStore>,
) -> Result<Response, warp::Rejection> {
    let number = request.order.trim();
    if !checksum::is_valid(number) {
        return Err(reject(ApiError::InvalidNumber(format!("invalid order number {:?}", number))));
    }
    if !request.sum.is_finite() || request.sum <= 0.0 {
        return Err(reject(ApiError::BadRequest("sum must be a positive number".to_string())));
    }

    match ledger.record_withdrawal(number, &login, request.sum).await {
        Ok(WithdrawalOutcome::Applied) => {
            info!(order = %number, login = %login, sum = request.sum, "Withdrawal recorded");
            Ok(warp::reply::with_status(format!("Withdrawal {} recorded", number), StatusCode::OK)
                .into_response())
        }
        Ok(WithdrawalOutcome::AlreadyOwnedBySelf) => Err(reject(ApiError::Conflict {
            code: "WITHDRAWAL_ALREADY_RECORDED",
            message: format!("withdrawal {} was already recorded", number),
        })),
        Ok(WithdrawalOutcome::OwnedByOther) => Err(reject(ApiError::Conflict {
            code: "WITHDRAWAL_OWNED_BY_OTHER",
            message: format!("withdrawal {} belongs to another user", number),
        })),
        Ok(WithdrawalOutcome::InsufficientFunds) => Err(reject(ApiError::InsufficientFunds)),
        Err(e) => Err(internal("Withdrawal", &login, e)),
    }
}

/// `GET /api/user/withdrawals`
pub async fn list_withdrawals(
    login: String,
    ledger: Arc<dyn LedgerStore>,
) -> Result<Response, warp::Rejection> {
    let withdrawals =
        ledger.get_withdrawals(&login).await.map_err(|e| internal("Withdrawal listing", &login, e))?;

    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let response: Vec<WithdrawalResponse> =
        withdrawals.into_iter().map(WithdrawalResponse::from).collect();
    Ok(warp::reply::json(&response).into_response())
}

/// Turn any rejection into an [`ErrorResponse`]
pub async fn handle_rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(api) = err.find::<ApiError>() {
        (api.status(), api.code(), api.message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "MALFORMED_BODY", e.to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST", "expected Content-Type application/json".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", "request body too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "LENGTH_REQUIRED", "content-length required".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal server error".to_string())
    };

    let body = ErrorResponse {
        error: ErrorDetail { code: code.to_string(), message, details: None },
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Create REST API routes
pub fn create_routes(
    ledger: Arc<dyn LedgerStore>,
    sessions: Arc<SessionCache>,
    body_limit: u64,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ledger_filter = warp::any().map(move || ledger.clone());
    let sessions_filter = {
        let sessions = sessions.clone();
        warp::any().map(move || sessions.clone())
    };
    let authenticated = with_auth(sessions);

    // Liveness
    let ping = warp::path("ping").and(warp::path::end()).and(warp::get()).map(|| "pong");

    let register = warp::path!("api" / "user" / "register")
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::json::<Credentials>())
        .and(ledger_filter.clone())
        .and(sessions_filter.clone())
        .and_then(auth::register);

    let login = warp::path!("api" / "user" / "login")
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::json::<Credentials>())
        .and(ledger_filter.clone())
        .and(sessions_filter)
        .and_then(auth::login);

    let upload_order = warp::path!("api" / "user" / "orders")
        .and(warp::post())
        .and(authenticated.clone())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::bytes())
        .and(ledger_filter.clone())
        .and_then(submit_order);

    let orders = warp::path!("api" / "user" / "orders")
        .and(warp::get())
        .and(authenticated.clone())
        .and(ledger_filter.clone())
        .and_then(list_orders);

    let balance = warp::path!("api" / "user" / "balance")
        .and(warp::get())
        .and(authenticated.clone())
        .and(ledger_filter.clone())
        .and_then(get_balance);

    let withdraw_points = warp::path!("api" / "user" / "balance" / "withdraw")
        .and(warp::post())
        .and(authenticated.clone())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::json::<WithdrawRequest>())
        .and(ledger_filter.clone())
        .and_then(withdraw);

    let withdrawals = warp::path!("api" / "user" / "withdrawals")
        .and(warp::get())
        .and(authenticated)
        .and(ledger_filter)
        .and_then(list_withdrawals);

    ping.or(register)
        .or(login)
        .or(upload_order)
        .or(orders)
        .or(balance)
        .or(withdraw_points)
        .or(withdrawals)
        .recover(handle_rejection)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type", "authorization"])
                .expose_headers(vec!["authorization"])
                .allow_methods(vec!["GET", "POST", "OPTIONS"]),
        )
        .with(warp::log::custom(|info| {
            info!(
                method = %info.method(),
                path = info.path(),
                status = info.status().as_u16(),
                elapsed_ms = info.elapsed().as_millis() as u64,
                "HTTP request"
            );
        }))
}
