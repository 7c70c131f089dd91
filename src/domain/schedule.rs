use crate::domain::installment::{Installment, InstallmentStatus};
use crate::domain::loan::{LoanTerms, PaymentFrequency};
use crate::domain::money::Money;
use crate::error::{LendingError, Result};
use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;

/// Generates the full installment schedule for a loan, once, at creation.
///
/// The capital split is flat: every period carries `round2(principal / term)`
/// regardless of frequency. Interest per period is `round2(principal * rate%)`
/// for monthly schedules; a biweekly schedule halves the interest but keeps
/// capital and fee unhalved, so each biweekly period costs roughly half a
/// month's interest. Rounding happens per period, never on aggregates.
///
/// Assumes validated terms (`LoanTerms::validate`); a zero term yields an
/// empty schedule here but is rejected upstream.
pub fn generate_schedule(loan_id: &str, terms: &LoanTerms) -> Result<Vec<Installment>> {
    let n = Decimal::from(terms.term);
    let principal_per_period = if terms.term == 0 {
        Money::ZERO
    } else {
        Money::new(terms.principal.value() / n).round2()
    };

    let monthly_interest =
        Money::new(terms.principal.value() * terms.monthly_rate_pct / Decimal::ONE_HUNDRED)
            .round2();
    let interest_per_period = match terms.frequency {
        PaymentFrequency::Monthly => monthly_interest,
        PaymentFrequency::Biweekly => Money::new(monthly_interest.value() / Decimal::TWO).round2(),
    };

    let amount = (principal_per_period + interest_per_period + terms.admin_fee).round2();

    let mut schedule = Vec::with_capacity(terms.term as usize);
    for number in 1..=terms.term {
        schedule.push(Installment {
            loan_id: loan_id.to_string(),
            number,
            due_date: due_date(terms.start_date, terms.frequency, number)?,
            principal: principal_per_period,
            interest: interest_per_period,
            admin_fee: terms.admin_fee,
            mora: Money::ZERO,
            amount,
            paid: Money::ZERO,
            status: InstallmentStatus::Pending,
            version: 0,
        });
    }
    Ok(schedule)
}

/// Due date of installment `number` (1-indexed). Monthly schedules add whole
/// civil-calendar months, clipping the day-of-month to the target month's
/// length (Jan 31 + 1 month = Feb 29 in a leap year). Biweekly schedules
/// step in fixed 15-day increments.
fn due_date(start: NaiveDate, frequency: PaymentFrequency, number: u32) -> Result<NaiveDate> {
    let date = match frequency {
        PaymentFrequency::Monthly => start.checked_add_months(Months::new(number)),
        PaymentFrequency::Biweekly => start.checked_add_days(Days::new(15 * number as u64)),
    };
    date.ok_or_else(|| {
        LendingError::Validation(format!(
            "due date for installment {number} falls outside the supported calendar range"
        ))
    })
}
