use crate::domain::money::Money;
use crate::error::{LendingError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Active,
    Paid,
    Inactive,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
            LoanStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    Monthly,
    Biweekly,
}

/// The financial terms a schedule is generated from.
///
/// Terms are immutable once the loan is activated; changing them later does
/// not regenerate the schedule automatically.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LoanTerms {
    pub principal: Money,
    /// Monthly interest rate in percent (e.g. `2` for 2% per month).
    pub monthly_rate_pct: Decimal,
    /// Number of installments, 1-indexed in the generated schedule.
    pub term: u32,
    pub frequency: PaymentFrequency,
    pub start_date: NaiveDate,
    /// Fixed administrative fee charged on every installment.
    pub admin_fee: Money,
}

impl LoanTerms {
    /// Rejects terms a schedule cannot be generated from. The generator
    /// itself assumes validated input; a zero term never reaches it.
    pub fn validate(&self) -> Result<()> {
        if self.term == 0 {
            return Err(LendingError::Validation(
                "loan term must be at least 1 installment".to_string(),
            ));
        }
        if self.principal.value() <= Decimal::ZERO {
            return Err(LendingError::Validation(
                "loan principal must be positive".to_string(),
            ));
        }
        if self.monthly_rate_pct < Decimal::ZERO {
            return Err(LendingError::Validation(
                "interest rate must not be negative".to_string(),
            ));
        }
        if self.admin_fee.value() < Decimal::ZERO {
            return Err(LendingError::Validation(
                "admin fee must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Loan {
    pub id: String,
    pub client_id: String,
    pub terms: LoanTerms,
    pub status: LoanStatus,
}

impl Loan {
    pub fn new(id: impl Into<String>, client_id: impl Into<String>, terms: LoanTerms) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            terms,
            status: LoanStatus::Pending,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn terms(term: u32) -> LoanTerms {
        LoanTerms {
            principal: Money::new(dec!(12000)),
            monthly_rate_pct: dec!(2),
            term,
            frequency: PaymentFrequency::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            admin_fee: Money::new(dec!(20)),
        }
    }

    #[test]
    fn test_zero_term_rejected() {
        assert!(matches!(
            terms(0).validate(),
            Err(LendingError::Validation(_))
        ));
        assert!(terms(12).validate().is_ok());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut t = terms(12);
        t.monthly_rate_pct = dec!(-1);
        assert!(matches!(t.validate(), Err(LendingError::Validation(_))));
    }

    #[test]
    fn test_new_loan_starts_pending() {
        let loan = Loan::new("L1", "C1", terms(12));
        assert_eq!(loan.status, LoanStatus::Pending);
        assert!(!loan.is_active());
    }
}
