use crate::domain::money::Money;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confirmation state of a submitted payment. The wire names follow the
/// cooperative's existing vocabulary.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum ConfirmationStatus {
    #[serde(rename = "pending_confirmation")]
    PendingConfirmation,
    #[serde(rename = "aprobado")]
    Approved,
    #[serde(rename = "rechazado")]
    Rejected,
}

impl ConfirmationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingConfirmation => "pending_confirmation",
            Self::Approved => "aprobado",
            Self::Rejected => "rechazado",
        };
        write!(f, "{s}")
    }
}

/// What the payment targets. A single payment settles one installment; a
/// full payoff simultaneously settles the remaining balance across several
/// installments of the same loan.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentKind {
    Single { installment: u32 },
    FullPayoff { installments: Vec<u32> },
}

impl PaymentKind {
    pub fn installments(&self) -> &[u32] {
        match self {
            Self::Single { installment } => std::slice::from_ref(installment),
            Self::FullPayoff { installments } => installments,
        }
    }

    pub fn is_full_payoff(&self) -> bool {
        matches!(self, Self::FullPayoff { .. })
    }
}

/// A submitted payment event awaiting (or past) staff confirmation.
///
/// Several payments may exist per installment over time: the original plus
/// one edit cycle after each rejection. The latest by id is authoritative.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: u64,
    pub loan_id: String,
    pub kind: PaymentKind,
    pub amount: Money,
    pub method: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub confirmation_status: ConfirmationStatus,
    /// Guards the edit cycle: set when a rejected payment is edited, cleared
    /// again on the next rejection, so each rejection allows exactly one
    /// resubmission and a pending payment cannot be silently edited twice.
    pub has_been_edited: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.confirmation_status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_status_wire_names() {
        let json = serde_json::to_string(&ConfirmationStatus::Approved).unwrap();
        assert_eq!(json, "\"aprobado\"");
        let json = serde_json::to_string(&ConfirmationStatus::Rejected).unwrap();
        assert_eq!(json, "\"rechazado\"");
        let back: ConfirmationStatus = serde_json::from_str("\"pending_confirmation\"").unwrap();
        assert_eq!(back, ConfirmationStatus::PendingConfirmation);
    }

    #[test]
    fn test_kind_installments() {
        let single = PaymentKind::Single { installment: 3 };
        assert_eq!(single.installments(), &[3]);
        assert!(!single.is_full_payoff());

        let payoff = PaymentKind::FullPayoff {
            installments: vec![4, 5, 6],
        };
        assert_eq!(payoff.installments(), &[4, 5, 6]);
        assert!(payoff.is_full_payoff());
    }
}
