use crate::domain::installment::{Installment, InstallmentStatus};
use crate::domain::money::Money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Overpayment tolerance checked at submission time: a single-installment
/// payment may not push the cumulative paid amount past 150% of the
/// scheduled total. Full-payoff submissions skip the check because their
/// amount intentionally spans several installments.
pub const OVERPAYMENT_CEILING: Decimal = dec!(1.5);

/// Result of applying a payment to an installment: the new cumulative paid
/// amount and the status it implies. The caller decides when to apply it;
/// at submission time the installment always moves to `pending_confirmation`
/// and the paid/partial determination waits for approval.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LedgerOutcome {
    pub new_paid: Money,
    pub status: InstallmentStatus,
}

/// Accumulates `incoming` onto the installment's paid total and derives the
/// resulting status against the scheduled total (amount + mora + admin fee).
pub fn apply_payment(installment: &Installment, incoming: Money) -> LedgerOutcome {
    let scheduled_total = installment.scheduled_total();
    let new_paid = (installment.paid + incoming).round2();

    let status = if new_paid >= scheduled_total {
        InstallmentStatus::Paid
    } else if new_paid > Money::ZERO {
        InstallmentStatus::PartiallyPaid
    } else {
        installment.status
    };

    LedgerOutcome { new_paid, status }
}

/// Submission-time guard: would this payment exceed the 150% ceiling?
pub fn exceeds_overpayment_ceiling(installment: &Installment, incoming: Money) -> bool {
    let scheduled_total = installment.scheduled_total();
    let new_paid = (installment.paid + incoming).round2();
    new_paid.value() > scheduled_total.value() * OVERPAYMENT_CEILING
}

/// Total a full-payoff payment must carry to settle the given installments:
/// the sum of each one's remaining `(amount + mora) - paid`, floored at zero.
pub fn payoff_total<'a>(installments: impl IntoIterator<Item = &'a Installment>) -> Money {
    installments
        .into_iter()
        .fold(Money::ZERO, |acc, inst| acc + inst.payoff_remaining())
}

/// Approval of a full payoff settles each targeted installment outright:
/// paid becomes `amount + mora`, status becomes `paid`.
pub fn settle_in_full(installment: &Installment) -> LedgerOutcome {
    LedgerOutcome {
        new_paid: (installment.amount + installment.mora).round2(),
        status: InstallmentStatus::Paid,
    }
}
