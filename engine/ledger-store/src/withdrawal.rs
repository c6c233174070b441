//! Withdrawal records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Withdrawal represents points debited against a withdrawal request number.
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub number: String,
    pub login: String,
    pub amount: f64,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Create a withdrawal stamped with the current time
    pub fn new(number: impl Into<String>, login: impl Into<String>, amount: f64) -> Self {
        Self {
            number: number.into(),
            login: login.into(),
            amount,
            processed_at: Utc::now(),
        }
    }
}
