use crate::domain::installment::Installment;
use crate::domain::loan::{Loan, LoanStatus};
use crate::error::Result;
use std::collections::HashMap;
use std::io::Write;

/// Writes the final installment state as CSV, one row per installment with
/// the parent loan's status in the last column.
pub struct ScheduleWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ScheduleWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    pub fn write_state(&mut self, loans: &[Loan], installments: &[Installment]) -> Result<()> {
        let statuses: HashMap<&str, LoanStatus> =
            loans.iter().map(|l| (l.id.as_str(), l.status)).collect();

        self.writer.write_record([
            "loan",
            "installment",
            "due_date",
            "amount",
            "paid",
            "status",
            "loan_status",
        ])?;

        let mut rows: Vec<&Installment> = installments.iter().collect();
        rows.sort_by(|a, b| (&a.loan_id, a.number).cmp(&(&b.loan_id, b.number)));

        for installment in rows {
            let loan_status = statuses
                .get(installment.loan_id.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let row = [
                installment.loan_id.clone(),
                installment.number.to_string(),
                installment.due_date.format("%Y-%m-%d").to_string(),
                installment.amount.to_string(),
                installment.paid.to_string(),
                installment.status.to_string(),
                loan_status,
            ];
            self.writer.write_record(&row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
