use crate::domain::client::ClientRecord;
use crate::domain::installment::Installment;
use crate::domain::loan::Loan;
use crate::domain::notification::{Channel, NotificationLogEntry};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    ClientStore, InstallmentStore, LoanStore, NotificationLog, NotificationSender, PaymentStore,
};
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Thread-safe in-memory loan store. `Clone` shares the underlying map, so
/// several boxed handles can point at the same state.
#[derive(Default, Clone)]
pub struct InMemoryLoanStore {
    loans: Arc<RwLock<HashMap<String, Loan>>>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanStore for InMemoryLoanStore {
    async fn store(&self, loan: Loan) -> Result<()> {
        let mut loans = self.loans.write().await;
        loans.insert(loan.id.clone(), loan);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Loan>> {
        let loans = self.loans.read().await;
        Ok(loans.get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<Loan>> {
        let loans = self.loans.read().await;
        Ok(loans.values().cloned().collect())
    }
}

/// In-memory installment store with the version-guarded conditional write
/// the approval path depends on.
#[derive(Default, Clone)]
pub struct InMemoryInstallmentStore {
    installments: Arc<RwLock<HashMap<(String, u32), Installment>>>,
}

impl InMemoryInstallmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstallmentStore for InMemoryInstallmentStore {
    async fn store(&self, installment: Installment) -> Result<()> {
        let mut installments = self.installments.write().await;
        installments.insert(
            (installment.loan_id.clone(), installment.number),
            installment,
        );
        Ok(())
    }

    async fn get(&self, loan_id: &str, number: u32) -> Result<Option<Installment>> {
        let installments = self.installments.read().await;
        Ok(installments.get(&(loan_id.to_string(), number)).cloned())
    }

    async fn for_loan(&self, loan_id: &str) -> Result<Vec<Installment>> {
        let installments = self.installments.read().await;
        let mut found: Vec<Installment> = installments
            .values()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.number);
        Ok(found)
    }

    async fn all(&self) -> Result<Vec<Installment>> {
        let installments = self.installments.read().await;
        let mut found: Vec<Installment> = installments.values().cloned().collect();
        found.sort_by(|a, b| (&a.loan_id, a.number).cmp(&(&b.loan_id, b.number)));
        Ok(found)
    }

    async fn update_guarded(
        &self,
        mut installment: Installment,
        expected_version: u64,
    ) -> Result<bool> {
        let mut installments = self.installments.write().await;
        let key = (installment.loan_id.clone(), installment.number);
        match installments.get(&key) {
            Some(current) if current.version == expected_version => {
                installment.version = expected_version + 1;
                installments.insert(key, installment);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(LendingError::NotFound(format!(
                "installment {}#{}",
                key.0, key.1
            ))),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<u64, Payment>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            payments: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn next_id(&self) -> Result<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn store(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: u64) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn latest_for_installment(
        &self,
        loan_id: &str,
        number: u32,
    ) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.loan_id == loan_id && p.kind.installments().contains(&number))
            .max_by_key(|p| p.id)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryClientStore {
    clients: Arc<RwLock<HashMap<String, ClientRecord>>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn store(&self, client: ClientRecord) -> Result<()> {
        let mut clients = self.clients.write().await;
        clients.insert(client.id.clone(), client);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ClientRecord>> {
        let clients = self.clients.read().await;
        Ok(clients.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationLog {
    entries: Arc<RwLock<Vec<NotificationLogEntry>>>,
}

impl InMemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationLog for InMemoryNotificationLog {
    async fn record(&self, entry: NotificationLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<NotificationLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }
}

/// Delivery stub that records every send. Can be flipped to fail, which lets
/// tests exercise the soft-warning path.
#[derive(Default, Clone)]
pub struct RecordingSender {
    pub sent: Arc<RwLock<Vec<(Channel, Option<String>, String)>>>,
    pub fail: Arc<RwLock<bool>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        channel: Channel,
        destination: Option<&str>,
        message: &str,
    ) -> Result<()> {
        if *self.fail.read().await {
            return Err(LendingError::Io(std::io::Error::other(
                "delivery gateway unavailable",
            )));
        }
        let mut sent = self.sent.write().await;
        sent.push((channel, destination.map(str::to_string), message.to_string()));
        Ok(())
    }
}

/// Delivery adapter for the CLI: emits each message as a log line instead of
/// calling a real gateway.
#[derive(Default, Clone)]
pub struct TracingSender;

#[async_trait]
impl NotificationSender for TracingSender {
    async fn send(
        &self,
        channel: Channel,
        destination: Option<&str>,
        message: &str,
    ) -> Result<()> {
        tracing::info!(%channel, destination = destination.unwrap_or("-"), message, "notification");
        Ok(())
    }
}
