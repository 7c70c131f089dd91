use crate::domain::loan::PaymentFrequency;
use crate::error::LendingError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Activate,
    Submit,
    Payoff,
    Approve,
    Reject,
}

/// One row of the loan-event CSV driving the CLI. Columns are optional
/// because each event type uses a different subset.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EventRecord {
    pub r#type: EventType,
    pub loan: String,
    pub client: Option<String>,
    pub installment: Option<u32>,
    pub amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub term: Option<u32>,
    pub frequency: Option<PaymentFrequency>,
    pub date: Option<NaiveDate>,
    pub reason: Option<String>,
}

pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn events(self) -> impl Iterator<Item = Result<EventRecord, LendingError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LendingError::from))
    }
}
