//! Stand-in accrual authority for local end-to-end runs
//!
//! Answers every order with a random status and an accrual in `[0, 5)`.
//! Optionally refuses every n-th request with 429 so the poller's cooldown
//! can be watched without a real authority.

use crate::models::{AccrualResponse, AccrualStatus};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

const MAX_POINTS: f64 = 5.0;

const STATUSES: [AccrualStatus; 4] = [
    AccrualStatus::Registered,
    AccrualStatus::Invalid,
    AccrualStatus::Processing,
    AccrualStatus::Processed,
];

/// Random verdict for `number`
pub fn random_response(number: &str) -> AccrualResponse {
    let mut rng = rand::thread_rng();
    let status = STATUSES[rng.gen_range(0..STATUSES.len())];
    let accrual = match status {
        AccrualStatus::Processed => Some(rng.gen::<f64>() * MAX_POINTS),
        _ => None,
    };

    AccrualResponse { order: number.to_string(), status, accrual }
}

/// `GET /api/orders/{number}`. With `rate_limit_every > 0` every n-th request
/// gets a 429 instead.
pub fn routes(
    rate_limit_every: u64,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let counter = Arc::new(AtomicU64::new(0));
    let counter_filter = warp::any().map(move || counter.clone());

    warp::path("api")
        .and(warp::path("orders"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(counter_filter)
        .map(move |number: String, counter: Arc<AtomicU64>| {
            let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if rate_limit_every > 0 && seen % rate_limit_every == 0 {
                return warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({ "error": "too many requests" })),
                    StatusCode::TOO_MANY_REQUESTS,
                );
            }

            warp::reply::with_status(warp::reply::json(&random_response(&number)), StatusCode::OK)
        })
}
