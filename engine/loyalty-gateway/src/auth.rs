//! Authentication for the LoyaltyGateway
//!
//! Registration and login hand out session tokens. Authenticated routes
//! accept the token either in the `Authorization` header or in the
//! `AuthToken` cookie.

use crate::error::ApiError;
use crate::session::SessionCache;
use ledger_store::{LedgerStore, UserOutcome};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::reply::Response;
use warp::{Filter, Reply};

pub const AUTH_HEADER: &str = "Authorization";
pub const AUTH_COOKIE: &str = "AuthToken";

const FORBIDDEN_PASSWORD_CHARS: [char; 5] = [' ', '(', ')', ':', '!'];
const MIN_PASSWORD_LEN: usize = 4;

/// Body of register and login requests
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Check a password against the password policy
pub fn is_acceptable_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && !password.contains(&FORBIDDEN_PASSWORD_CHARS[..])
}

/// Salted SHA-256 of `password`, stored as `salt$hex`
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

/// Check `password` against a stored `salt$hex` hash
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Filter that resolves the caller's session to a login or rejects with 401
pub fn with_auth(
    sessions: Arc<SessionCache>,
) -> impl Filter<Extract = (String,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(AUTH_HEADER)
        .and(warp::cookie::optional::<String>(AUTH_COOKIE))
        .and(warp::any().map(move || sessions.clone()))
        .and_then(
            |header: Option<String>, cookie: Option<String>, sessions: Arc<SessionCache>| async move {
                let token = header
                    .or(cookie)
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| warp::reject::custom(ApiError::Unauthorized("absent auth token".to_string())))?;

                sessions
                    .resolve(&token)
                    .ok_or_else(|| warp::reject::custom(ApiError::Unauthorized("invalid token".to_string())))
            },
        )
}

// 200 carrying the token in both the header and the cookie
fn authorized(token: String, message: String) -> Response {
    let cookie = format!("{}={}; Path=/; HttpOnly", AUTH_COOKIE, token);
    let reply = warp::reply::with_header(message, AUTH_HEADER, token);
    warp::reply::with_header(reply, "Set-Cookie", cookie).into_response()
}

/// `POST /api/user/register`
pub async fn register(
    credentials: Credentials,
    ledger: Arc<dyn LedgerStore>,
    sessions: Arc<SessionCache>,
) -> Result<Response, warp::Rejection> {
    if credentials.login.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest("login must not be empty".to_string())));
    }
    if !is_acceptable_password(&credentials.password) {
        return Err(warp::reject::custom(ApiError::BadRequest("password is unsuitable".to_string())));
    }

    let hash = hash_password(&credentials.password);
    match ledger.create_user(&credentials.login, &hash).await {
        Ok(UserOutcome::Created) => {
            info!(login = %credentials.login, "User registered");
            let token = sessions.issue(&credentials.login);
            Ok(authorized(token, format!("User {} is registered", credentials.login)))
        }
        Ok(UserOutcome::AlreadyExists) => Err(warp::reject::custom(ApiError::Conflict {
            code: "LOGIN_TAKEN",
            message: format!("user {} already exists", credentials.login),
        })),
        Err(e) => {
            error!(login = %credentials.login, "Registration failed: {}", e);
            Err(warp::reject::custom(ApiError::Internal))
        }
    }
}

/// `POST /api/user/login`
pub async fn login(
    credentials: Credentials,
    ledger: Arc<dyn LedgerStore>,
    sessions: Arc<SessionCache>,
) -> Result<Response, warp::Rejection> {
    let stored = match ledger.password_hash(&credentials.login).await {
        Ok(stored) => stored,
        Err(e) => {
            error!(login = %credentials.login, "Login lookup failed: {}", e);
            return Err(warp::reject::custom(ApiError::Internal));
        }
    };

    match stored {
        Some(hash) if verify_password(&credentials.password, &hash) => {
            let token = sessions.issue(&credentials.login);
            Ok(authorized(token, format!("User {} is authenticated", credentials.login)))
        }
        _ => {
            warn!(login = %credentials.login, "Rejected login");
            Err(warp::reject::custom(ApiError::Unauthorized(
                "unknown login or wrong password".to_string(),
            )))
        }
    }
}
