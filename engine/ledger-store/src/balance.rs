//! Balance type for loyalty points

use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Point balance of one user
///
/// `current` is what the user can still spend, `withdrawn` is the running total
/// of everything debited so far. Credits only grow `current`; debits move
/// points from `current` to `withdrawn`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub current: f64,
    pub withdrawn: f64,
}

impl Balance {
    /// Create a balance with nothing withdrawn yet
    pub fn new(current: f64) -> Self {
        Self { current, withdrawn: 0.0 }
    }

    /// Check if the balance covers a debit of `amount`
    pub fn covers(&self, amount: f64) -> bool {
        amount <= self.current
    }

    /// Balance after crediting an accrual
    pub fn credited(self, amount: f64) -> Result<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount { amount });
        }

        Ok(Self { current: self.current + amount, withdrawn: self.withdrawn })
    }

    /// Balance after a withdrawal, or `None` if the balance does not cover it
    pub fn debited(self, amount: f64) -> Result<Option<Self>> {
        validate_withdrawal_amount(amount)?;

        if !self.covers(amount) {
            return Ok(None);
        }

        Ok(Some(Self { current: self.current - amount, withdrawn: self.withdrawn + amount }))
    }
}

/// Withdrawal amounts must be finite and strictly positive
pub fn validate_withdrawal_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "current={:.2} withdrawn={:.2}", self.current, self.withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_adds_to_current_only() {
        let balance = Balance::new(10.0).credited(500.0).unwrap();
        assert_eq!(balance, Balance { current: 510.0, withdrawn: 0.0 });
    }

    #[test]
    fn test_debit_moves_points_to_withdrawn() {
        let balance = Balance::new(500.0).debited(200.0).unwrap().unwrap();
        assert_eq!(balance, Balance { current: 300.0, withdrawn: 200.0 });
    }

    #[test]
    fn test_debit_exact_balance_allowed() {
        let balance = Balance::new(300.0).debited(300.0).unwrap().unwrap();
        assert_eq!(balance.current, 0.0);
        assert_eq!(balance.withdrawn, 300.0);
    }

    #[test]
    fn test_overdraw_reports_none() {
        let balance = Balance { current: 300.0, withdrawn: 200.0 };
        assert_eq!(balance.debited(400.0).unwrap(), None);
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        let balance = Balance::new(100.0);
        assert!(balance.debited(0.0).is_err());
        assert!(balance.debited(-5.0).is_err());
        assert!(balance.debited(f64::NAN).is_err());
        assert!(balance.credited(-1.0).is_err());
        assert!(balance.credited(f64::INFINITY).is_err());
        // zero accrual is a legal credit
        assert_eq!(balance.credited(0.0).unwrap(), balance);
    }
}
