//! Accrual authority wire types

use crate::error::AccrualError;
use ledger_store::Resolution;
use serde::{Deserialize, Serialize};

/// Order status as reported by the accrual authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    /// Known to the authority but not evaluated yet
    Registered,
    Invalid,
    Processing,
    Processed,
}

/// Body of `GET /api/orders/{number}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

impl AccrualResponse {
    /// Local resolution this response asks for. `None` while the authority
    /// has not started on the order.
    pub fn resolution(&self) -> Result<Option<Resolution>, AccrualError> {
        match self.status {
            AccrualStatus::Registered => Ok(None),
            AccrualStatus::Invalid => Ok(Some(Resolution::Invalid)),
            AccrualStatus::Processing => Ok(Some(Resolution::Processing)),
            AccrualStatus::Processed => {
                let accrual = self.accrual.unwrap_or(0.0);
                if !accrual.is_finite() || accrual < 0.0 {
                    return Err(AccrualError::InvalidAccrual { order: self.order.clone(), accrual });
                }
                Ok(Some(Resolution::Processed { accrual }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: AccrualStatus, accrual: Option<f64>) -> AccrualResponse {
        AccrualResponse { order: "12345678903".to_string(), status, accrual }
    }

    #[test]
    fn test_parse_processed_body() {
        let body = r#"{"order":"12345678903","status":"PROCESSED","accrual":500}"#;
        let parsed: AccrualResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed, response(AccrualStatus::Processed, Some(500.0)));
        assert_eq!(parsed.resolution().unwrap(), Some(Resolution::Processed { accrual: 500.0 }));
    }

    #[test]
    fn test_parse_without_accrual() {
        let body = r#"{"order":"12345678903","status":"REGISTERED"}"#;
        let parsed: AccrualResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.accrual, None);
        assert_eq!(parsed.resolution().unwrap(), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            response(AccrualStatus::Invalid, None).resolution().unwrap(),
            Some(Resolution::Invalid)
        );
        assert_eq!(
            response(AccrualStatus::Processing, None).resolution().unwrap(),
            Some(Resolution::Processing)
        );
        // processed with no amount credits nothing
        assert_eq!(
            response(AccrualStatus::Processed, None).resolution().unwrap(),
            Some(Resolution::Processed { accrual: 0.0 })
        );
    }

    #[test]
    fn test_negative_accrual_rejected() {
        let result = response(AccrualStatus::Processed, Some(-3.0)).resolution();
        assert!(matches!(result, Err(AccrualError::InvalidAccrual { .. })));
    }

    #[test]
    fn test_unknown_status_fails_to_parse() {
        let body = r#"{"order":"12345678903","status":"LOST"}"#;
        assert!(serde_json::from_str::<AccrualResponse>(body).is_err());
    }
}
