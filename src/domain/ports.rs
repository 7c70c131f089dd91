use crate::domain::client::ClientRecord;
use crate::domain::installment::Installment;
use crate::domain::loan::Loan;
use crate::domain::notification::{Channel, NotificationLogEntry};
use crate::domain::payment::Payment;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn store(&self, loan: Loan) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Loan>>;
    async fn all(&self) -> Result<Vec<Loan>>;
}

#[async_trait]
pub trait InstallmentStore: Send + Sync {
    /// Inserts or overwrites without a version check. Only used when the
    /// schedule is first generated.
    async fn store(&self, installment: Installment) -> Result<()>;
    async fn get(&self, loan_id: &str, number: u32) -> Result<Option<Installment>>;
    async fn for_loan(&self, loan_id: &str) -> Result<Vec<Installment>>;
    async fn all(&self) -> Result<Vec<Installment>>;
    /// Atomic conditional update: writes `installment` (with its version
    /// bumped) only if the stored version still equals `expected_version`.
    /// Returns `false` when another writer got there first.
    async fn update_guarded(&self, installment: Installment, expected_version: u64)
        -> Result<bool>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn next_id(&self) -> Result<u64>;
    async fn store(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: u64) -> Result<Option<Payment>>;
    /// Latest payment (by id) targeting the given installment. Authoritative
    /// for approve/reject actions when several submissions exist.
    async fn latest_for_installment(&self, loan_id: &str, number: u32)
        -> Result<Option<Payment>>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn store(&self, client: ClientRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<ClientRecord>>;
}

#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn record(&self, entry: NotificationLogEntry) -> Result<()>;
    async fn entries(&self) -> Result<Vec<NotificationLogEntry>>;
}

/// External delivery collaborator (SMS/WhatsApp gateway, in-app inbox).
/// Failures here are soft: callers log them and carry on, they never roll
/// back a confirmation decision or abort a sweep.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, channel: Channel, destination: Option<&str>, message: &str)
        -> Result<()>;
}

pub type LoanStoreBox = Box<dyn LoanStore>;
pub type InstallmentStoreBox = Box<dyn InstallmentStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type ClientStoreBox = Box<dyn ClientStore>;
pub type NotificationLogBox = Box<dyn NotificationLog>;
pub type NotificationSenderBox = Box<dyn NotificationSender>;
