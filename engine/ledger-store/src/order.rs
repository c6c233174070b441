//! Orders and the order status state machine

use crate::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Order status
///
/// `NEW` -> `PROCESSING` -> {`INVALID`, `PROCESSED`}. `NEW` may jump straight to
/// either terminal state. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    /// Database / wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    /// Check if no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl FromStr for OrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(LedgerError::CorruptRecord {
                message: format!("unknown order status '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of the transition table for a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Legal forward move
    Applied,
    /// Already in the requested status
    NoOp,
    /// Backward move or a move out of a terminal status
    Rejected,
}

/// Transition table
pub fn transition(from: OrderStatus, to: OrderStatus) -> Transition {
    use OrderStatus::*;

    if from == to {
        return Transition::NoOp;
    }

    match (from, to) {
        (New, Processing) | (New, Invalid) | (New, Processed) => Transition::Applied,
        (Processing, Invalid) | (Processing, Processed) => Transition::Applied,
        _ => Transition::Rejected,
    }
}

/// A status decided by the accrual authority
///
/// Only `Processed` carries an amount, so no other status can ever be written
/// together with an accrual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Processing,
    Invalid,
    Processed { accrual: f64 },
}

impl Resolution {
    /// Status this resolution moves the order to
    pub fn status(&self) -> OrderStatus {
        match self {
            Resolution::Processing => OrderStatus::Processing,
            Resolution::Invalid => OrderStatus::Invalid,
            Resolution::Processed { .. } => OrderStatus::Processed,
        }
    }

    /// Points to credit when this resolution is applied
    pub fn credit(&self) -> Option<f64> {
        match self {
            Resolution::Processed { accrual } => Some(*accrual),
            _ => None,
        }
    }
}

/// Order represents an uploaded order number and its reconciliation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub login: String,
    pub status: OrderStatus,
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly submitted order
    pub fn new(number: impl Into<String>, login: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            number: number.into(),
            login: login.into(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: now,
            updated_at: now,
        }
    }

    /// Check if the poller still has to look at this order
    pub fn is_unresolved(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Order after applying a resolution, if the transition table allows it
    pub fn resolved(&self, resolution: Resolution) -> Option<Order> {
        match transition(self.status, resolution.status()) {
            Transition::Applied => Some(Order {
                status: resolution.status(),
                accrual: resolution.credit(),
                updated_at: Utc::now(),
                ..self.clone()
            }),
            Transition::NoOp | Transition::Rejected => None,
        }
    }
}
