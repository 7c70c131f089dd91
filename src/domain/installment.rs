use crate::domain::money::Money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    PartiallyPaid,
    PendingConfirmation,
    Paid,
    Rejected,
    Overdue,
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::PartiallyPaid => "partially_paid",
            InstallmentStatus::PendingConfirmation => "pending_confirmation",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Rejected => "rejected",
            InstallmentStatus::Overdue => "overdue",
        };
        write!(f, "{s}")
    }
}

/// One scheduled due date of a loan's amortization plan.
///
/// Identified by `(loan_id, number)`; numbers are contiguous and 1-indexed
/// within a loan. `version` is the optimistic-concurrency token: every
/// guarded update must present the version it read, so two overlapping
/// approvals cannot both rewrite `paid`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Installment {
    pub loan_id: String,
    pub number: u32,
    pub due_date: NaiveDate,
    pub principal: Money,
    pub interest: Money,
    pub admin_fee: Money,
    /// Late-payment surcharge, zero until assessed.
    pub mora: Money,
    /// Scheduled charge for the period: principal + interest + admin fee.
    pub amount: Money,
    /// Cumulative confirmed payments against this installment.
    pub paid: Money,
    pub status: InstallmentStatus,
    pub version: u64,
}

impl Installment {
    /// Everything owed on this installment as the ledger sees it.
    pub fn scheduled_total(&self) -> Money {
        (self.amount + self.mora + self.admin_fee).round2()
    }

    /// Balance a full-payoff payment must cover for this installment.
    /// Note the admin fee is not part of the payoff figure.
    pub fn payoff_remaining(&self) -> Money {
        ((self.amount + self.mora) - self.paid).round2().max_zero()
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }
}
