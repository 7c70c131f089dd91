use crate::domain::access::AccessScope;
use crate::domain::client::ClientRecord;
use crate::domain::installment::InstallmentStatus;
use crate::domain::ledger;
use crate::domain::loan::{Loan, LoanStatus, LoanTerms};
use crate::domain::money::{Amount, Money};
use crate::domain::payment::{ConfirmationStatus, Payment, PaymentKind};
use crate::domain::ports::{
    ClientStoreBox, InstallmentStoreBox, LoanStoreBox, NotificationSenderBox, PaymentStoreBox,
};
use crate::domain::schedule::generate_schedule;
use crate::error::{LendingError, Result};
use chrono::{NaiveDate, NaiveDateTime};

pub struct CreateLoan {
    pub loan_id: String,
    pub client_id: String,
    pub terms: LoanTerms,
}

pub struct SubmitPayment {
    pub loan_id: String,
    pub kind: PaymentKind,
    /// Required for a single-installment payment. Ignored in full-payoff
    /// mode, where the amount is derived from the remaining balances.
    pub amount: Option<Amount>,
    pub method: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

pub struct EditPayment {
    pub amount: Option<Amount>,
    pub method: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

pub enum Decision {
    Approve,
    Reject { reason: String },
}

pub struct ConfirmOutcome {
    pub payment: Payment,
    /// True exactly once: on the approval that brings the last installment
    /// to `paid`.
    pub loan_finalized: bool,
    /// Downstream notification failures; never abort the decision.
    pub warnings: Vec<String>,
}

/// State machine governing a payment's life from submission to approval or
/// rejection, and the knock-on effects on installments and the parent loan.
///
/// Owns the storage ports; every mutation of an installment goes through a
/// version-guarded update so two overlapping confirmations cannot produce a
/// lost update on `paid`.
pub struct ConfirmationWorkflow {
    loans: LoanStoreBox,
    installments: InstallmentStoreBox,
    payments: PaymentStoreBox,
    clients: ClientStoreBox,
    notifier: NotificationSenderBox,
}

impl ConfirmationWorkflow {
    pub fn new(
        loans: LoanStoreBox,
        installments: InstallmentStoreBox,
        payments: PaymentStoreBox,
        clients: ClientStoreBox,
        notifier: NotificationSenderBox,
    ) -> Self {
        Self {
            loans,
            installments,
            payments,
            clients,
            notifier,
        }
    }

    /// Creates a loan and generates its full schedule in one step. The loan
    /// starts `pending`; activation is a separate operation.
    pub async fn create_loan(&self, scope: &AccessScope, req: CreateLoan) -> Result<Loan> {
        let client = self.require_client(&req.client_id).await?;
        if !scope.may_manage_loans() || !scope.may_submit_for(&client) {
            return Err(LendingError::Forbidden(format!(
                "{} may not create loans for client {}",
                scope.actor_label(),
                client.id
            )));
        }
        req.terms.validate()?;
        if self.loans.get(&req.loan_id).await?.is_some() {
            return Err(LendingError::Conflict(format!(
                "loan {} already exists",
                req.loan_id
            )));
        }

        let schedule = generate_schedule(&req.loan_id, &req.terms)?;
        let loan = Loan::new(req.loan_id, req.client_id, req.terms);
        self.loans.store(loan.clone()).await?;
        for installment in schedule {
            self.installments.store(installment).await?;
        }
        tracing::info!(loan = %loan.id, term = loan.terms.term, "loan created with schedule");
        Ok(loan)
    }

    pub async fn activate_loan(&self, scope: &AccessScope, loan_id: &str) -> Result<Loan> {
        if !scope.may_manage_loans() {
            return Err(LendingError::Forbidden(format!(
                "{} may not activate loans",
                scope.actor_label()
            )));
        }
        let mut loan = self.require_loan(loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(LendingError::Conflict(format!(
                "loan {loan_id} is {} and cannot be activated",
                loan.status
            )));
        }
        loan.status = LoanStatus::Active;
        self.loans.store(loan.clone()).await?;
        tracing::info!(loan = %loan.id, "loan activated");
        Ok(loan)
    }

    /// Records a payment submission. The targeted installments move to
    /// `pending_confirmation` unconditionally; whether the amount is partial
    /// or full is decided at approval time, not here.
    pub async fn submit_payment(
        &self,
        scope: &AccessScope,
        mut req: SubmitPayment,
    ) -> Result<Payment> {
        let loan = self.require_loan(&req.loan_id).await?;
        let client = self.require_client(&loan.client_id).await?;
        if !scope.may_submit_for(&client) {
            return Err(LendingError::Forbidden(format!(
                "{} may not submit payments for client {}",
                scope.actor_label(),
                client.id
            )));
        }

        // A repeated payoff target would be summed twice and would trip the
        // version guard on its second update.
        if let PaymentKind::FullPayoff { installments } = &mut req.kind {
            installments.sort_unstable();
            installments.dedup();
        }

        let targets = req.kind.installments();
        if targets.is_empty() {
            return Err(LendingError::Validation(
                "a payment must target at least one installment".to_string(),
            ));
        }

        let mut installments = Vec::with_capacity(targets.len());
        for &number in targets {
            let installment = self.require_installment(&loan.id, number).await?;
            match installment.status {
                InstallmentStatus::Paid => {
                    return Err(LendingError::Conflict(format!(
                        "installment {number} is already paid"
                    )));
                }
                // A second submission against a pending installment would
                // double-count on approval; resubmission goes through the
                // edit path instead.
                InstallmentStatus::PendingConfirmation => {
                    return Err(LendingError::Conflict(format!(
                        "installment {number} is already awaiting confirmation; edit the pending payment instead"
                    )));
                }
                _ => {}
            }
            installments.push(installment);
        }

        let amount = match &req.kind {
            PaymentKind::Single { .. } => {
                let amount = req.amount.ok_or_else(|| {
                    LendingError::Validation("payment amount is required".to_string())
                })?;
                // 150% ceiling, checked against the scheduled total at
                // submission time. Full payoffs skip it by design.
                if ledger::exceeds_overpayment_ceiling(&installments[0], amount.into()) {
                    return Err(LendingError::Conflict(format!(
                        "payment of {} exceeds the overpayment tolerance for installment {}",
                        amount.value(),
                        installments[0].number
                    )));
                }
                Money::from(amount)
            }
            PaymentKind::FullPayoff { .. } => {
                let total = ledger::payoff_total(installments.iter());
                if total.is_zero() {
                    return Err(LendingError::Conflict(
                        "nothing remains to pay off on the targeted installments".to_string(),
                    ));
                }
                total
            }
        };

        let payment = Payment {
            id: self.payments.next_id().await?,
            loan_id: loan.id.clone(),
            kind: req.kind,
            amount,
            method: req.method,
            date: req.date,
            notes: req.notes,
            confirmation_status: ConfirmationStatus::PendingConfirmation,
            has_been_edited: false,
            confirmed_by: None,
            confirmed_at: None,
            rejection_reason: None,
        };

        for mut installment in installments {
            let version = installment.version;
            installment.status = InstallmentStatus::PendingConfirmation;
            self.guarded_update(installment, version).await?;
        }
        self.payments.store(payment.clone()).await?;
        tracing::info!(
            loan = %payment.loan_id,
            payment = payment.id,
            amount = %payment.amount,
            "payment submitted, awaiting confirmation"
        );
        Ok(payment)
    }

    /// One resubmission is allowed after a rejection. The edit returns the
    /// payment and its installments to `pending_confirmation` and burns the
    /// edit flag, so a second silent edit is blocked until the next
    /// rejection clears it again.
    pub async fn edit_payment(
        &self,
        scope: &AccessScope,
        payment_id: u64,
        req: EditPayment,
    ) -> Result<Payment> {
        let mut payment = self.require_payment(payment_id).await?;
        let loan = self.require_loan(&payment.loan_id).await?;
        let client = self.require_client(&loan.client_id).await?;
        if !scope.may_submit_for(&client) {
            return Err(LendingError::Forbidden(format!(
                "{} may not edit payments for client {}",
                scope.actor_label(),
                client.id
            )));
        }
        if payment.confirmation_status != ConfirmationStatus::Rejected {
            return Err(LendingError::Conflict(format!(
                "payment {payment_id} is {} and cannot be edited",
                payment.confirmation_status
            )));
        }
        if payment.has_been_edited {
            return Err(LendingError::Conflict(format!(
                "payment {payment_id} has already been edited once"
            )));
        }

        let mut installments = Vec::new();
        for &number in payment.kind.installments() {
            let installment = self.require_installment(&loan.id, number).await?;
            // The payment being edited is rejected, so a pending status here
            // can only belong to a newer submission against the same
            // installment. Resurrecting this one would leave two payments
            // awaiting confirmation and double-count on approval.
            if installment.status == InstallmentStatus::PendingConfirmation {
                return Err(LendingError::Conflict(format!(
                    "installment {number} is awaiting confirmation of a newer payment; payment {payment_id} can no longer be edited"
                )));
            }
            installments.push(installment);
        }

        payment.amount = match &payment.kind {
            PaymentKind::Single { .. } => {
                let amount = req.amount.ok_or_else(|| {
                    LendingError::Validation("payment amount is required".to_string())
                })?;
                if ledger::exceeds_overpayment_ceiling(&installments[0], amount.into()) {
                    return Err(LendingError::Conflict(format!(
                        "payment of {} exceeds the overpayment tolerance for installment {}",
                        amount.value(),
                        installments[0].number
                    )));
                }
                Money::from(amount)
            }
            // Remaining balances may have moved since the original
            // submission; recompute rather than trust the edit.
            PaymentKind::FullPayoff { .. } => ledger::payoff_total(installments.iter()),
        };
        payment.method = req.method;
        payment.date = req.date;
        payment.notes = req.notes;
        payment.confirmation_status = ConfirmationStatus::PendingConfirmation;
        payment.has_been_edited = true;
        payment.rejection_reason = None;

        for mut installment in installments {
            let version = installment.version;
            installment.status = InstallmentStatus::PendingConfirmation;
            self.guarded_update(installment, version).await?;
        }
        self.payments.store(payment.clone()).await?;
        tracing::info!(payment = payment.id, "rejected payment edited and resubmitted");
        Ok(payment)
    }

    /// Approves or rejects a pending payment. Approval applies the ledger
    /// and may finalize the loan; rejection rolls the installments to
    /// `rejected` without touching confirmed paid amounts. Notification
    /// failures are returned as warnings, never as errors.
    pub async fn confirm_payment(
        &self,
        scope: &AccessScope,
        payment_id: u64,
        decision: Decision,
        at: NaiveDateTime,
    ) -> Result<ConfirmOutcome> {
        let mut payment = self.require_payment(payment_id).await?;
        if payment.is_terminal() {
            return Err(LendingError::Conflict(format!(
                "payment {payment_id} is already {}",
                payment.confirmation_status
            )));
        }
        let loan = self.require_loan(&payment.loan_id).await?;
        let client = self.require_client(&loan.client_id).await?;
        if !scope.may_confirm_for(&client) {
            return Err(LendingError::Forbidden(format!(
                "{} may not confirm payments for client {}",
                scope.actor_label(),
                client.id
            )));
        }

        match decision {
            Decision::Approve => self.approve(scope, payment, loan, client, at).await,
            Decision::Reject { reason } => {
                self.reject(scope, &mut payment, client, reason, at).await
            }
        }
    }

    async fn approve(
        &self,
        scope: &AccessScope,
        mut payment: Payment,
        loan: Loan,
        client: ClientRecord,
        at: NaiveDateTime,
    ) -> Result<ConfirmOutcome> {
        if !loan.is_active() {
            return Err(LendingError::Conflict(format!(
                "loan {} is {}; payments can only be approved on an active loan",
                loan.id, loan.status
            )));
        }

        for &number in payment.kind.installments() {
            let mut installment = self.require_installment(&loan.id, number).await?;
            let outcome = match &payment.kind {
                PaymentKind::Single { .. } => ledger::apply_payment(&installment, payment.amount),
                PaymentKind::FullPayoff { .. } => ledger::settle_in_full(&installment),
            };
            let version = installment.version;
            installment.paid = outcome.new_paid;
            installment.status = outcome.status;
            self.guarded_update(installment, version).await?;
        }

        payment.confirmation_status = ConfirmationStatus::Approved;
        payment.confirmed_by = Some(scope.actor_label());
        payment.confirmed_at = Some(at);
        self.payments.store(payment.clone()).await?;
        tracing::info!(payment = payment.id, loan = %loan.id, "payment approved");

        let loan_finalized = self.finalize_if_settled(&loan).await?;

        let mut warnings = Vec::new();
        self.notify_client(
            &client,
            &format!("Su pago de {} fue aprobado.", payment.amount),
            &mut warnings,
        )
        .await;

        Ok(ConfirmOutcome {
            payment,
            loan_finalized,
            warnings,
        })
    }

    async fn reject(
        &self,
        scope: &AccessScope,
        payment: &mut Payment,
        client: ClientRecord,
        reason: String,
        at: NaiveDateTime,
    ) -> Result<ConfirmOutcome> {
        if reason.trim().is_empty() {
            return Err(LendingError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        // Only the pending submission is rolled back; paid amounts from
        // previously approved payments stay untouched.
        for &number in payment.kind.installments() {
            let mut installment = self.require_installment(&payment.loan_id, number).await?;
            let version = installment.version;
            installment.status = InstallmentStatus::Rejected;
            self.guarded_update(installment, version).await?;
        }

        payment.confirmation_status = ConfirmationStatus::Rejected;
        payment.confirmed_by = Some(scope.actor_label());
        payment.confirmed_at = Some(at);
        payment.rejection_reason = Some(reason.clone());
        payment.has_been_edited = false;
        self.payments.store(payment.clone()).await?;
        tracing::info!(payment = payment.id, %reason, "payment rejected");

        let mut warnings = Vec::new();
        self.notify_client(
            &client,
            &format!("Su pago fue rechazado: {reason}. Puede corregirlo y reenviarlo."),
            &mut warnings,
        )
        .await;

        Ok(ConfirmOutcome {
            payment: payment.clone(),
            loan_finalized: false,
            warnings,
        })
    }

    /// Flips the loan to `paid` on the approval that settles the last
    /// installment. Idempotent: re-checking an already-paid loan is a no-op.
    async fn finalize_if_settled(&self, loan: &Loan) -> Result<bool> {
        if loan.status == LoanStatus::Paid {
            return Ok(false);
        }
        let installments = self.installments.for_loan(&loan.id).await?;
        if installments.is_empty() || !installments.iter().all(|i| i.is_paid()) {
            return Ok(false);
        }
        let mut settled = loan.clone();
        settled.status = LoanStatus::Paid;
        self.loans.store(settled).await?;
        tracing::info!(loan = %loan.id, "all installments paid, loan finalized");
        Ok(true)
    }

    async fn notify_client(
        &self,
        client: &ClientRecord,
        message: &str,
        warnings: &mut Vec<String>,
    ) {
        let Some(channel) = client.eligible_channels().into_iter().next() else {
            return;
        };
        if let Err(e) = self
            .notifier
            .send(channel, client.phone.as_deref(), message)
            .await
        {
            tracing::warn!(client = %client.id, error = %e, "client notification failed");
            warnings.push(format!("notification delivery failed: {e}"));
        }
    }

    async fn guarded_update(
        &self,
        installment: crate::domain::installment::Installment,
        expected_version: u64,
    ) -> Result<()> {
        let loan_id = installment.loan_id.clone();
        let number = installment.number;
        if !self
            .installments
            .update_guarded(installment, expected_version)
            .await?
        {
            return Err(LendingError::Conflict(format!(
                "installment {loan_id}#{number} was modified concurrently; retry the operation"
            )));
        }
        Ok(())
    }

    async fn require_payment(&self, id: u64) -> Result<Payment> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("payment {id}")))
    }

    async fn require_loan(&self, id: &str) -> Result<Loan> {
        self.loans
            .get(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("loan {id}")))
    }

    async fn require_client(&self, id: &str) -> Result<ClientRecord> {
        self.clients
            .get(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("client {id}")))
    }

    async fn require_installment(
        &self,
        loan_id: &str,
        number: u32,
    ) -> Result<crate::domain::installment::Installment> {
        self.installments
            .get(loan_id, number)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("installment {loan_id}#{number}")))
    }

    pub fn loan_store(&self) -> &LoanStoreBox {
        &self.loans
    }

    pub fn installment_store(&self) -> &InstallmentStoreBox {
        &self.installments
    }

    pub fn payment_store(&self) -> &PaymentStoreBox {
        &self.payments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::PreferredChannel;
    use crate::domain::installment::InstallmentStatus;
    use crate::domain::loan::PaymentFrequency;
    use crate::domain::ports::ClientStore;
    use crate::infrastructure::in_memory::{
        InMemoryClientStore, InMemoryInstallmentStore, InMemoryLoanStore, InMemoryPaymentStore,
        RecordingSender,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn terms() -> LoanTerms {
        LoanTerms {
            principal: Money::new(dec!(12000)),
            monthly_rate_pct: dec!(2),
            term: 12,
            frequency: PaymentFrequency::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            admin_fee: Money::new(dec!(20)),
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    async fn workflow_with_loan() -> (ConfirmationWorkflow, RecordingSender) {
        let clients = InMemoryClientStore::new();
        clients
            .store(ClientRecord {
                id: "C1".to_string(),
                name: "Ana".to_string(),
                advisor_id: Some("A1".to_string()),
                phone: Some("+50255512345".to_string()),
                sms_opt_in: true,
                whatsapp_opt_in: false,
                preferred_channel: PreferredChannel::Sms,
            })
            .await
            .unwrap();

        let sender = RecordingSender::new();
        let workflow = ConfirmationWorkflow::new(
            Box::new(InMemoryLoanStore::new()),
            Box::new(InMemoryInstallmentStore::new()),
            Box::new(InMemoryPaymentStore::new()),
            Box::new(clients),
            Box::new(sender.clone()),
        );

        let scope = AccessScope::Admin;
        workflow
            .create_loan(
                &scope,
                CreateLoan {
                    loan_id: "L1".to_string(),
                    client_id: "C1".to_string(),
                    terms: terms(),
                },
            )
            .await
            .unwrap();
        workflow.activate_loan(&scope, "L1").await.unwrap();
        (workflow, sender)
    }

    fn single(installment: u32, amount: Decimal) -> SubmitPayment {
        SubmitPayment {
            loan_id: "L1".to_string(),
            kind: PaymentKind::Single { installment },
            amount: Some(Amount::new(amount).unwrap()),
            method: "cash".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            notes: None,
        }
    }

    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_partial_then_full_lifecycle() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;

        // First half payment: pending regardless of amount, partial after approval.
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.status, InstallmentStatus::PendingConfirmation);

        let outcome = workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        assert!(!outcome.loan_finalized);
        assert_eq!(
            outcome.payment.confirmation_status,
            ConfirmationStatus::Approved
        );
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.paid, Money::new(dec!(640.00)));
        assert_eq!(inst.status, InstallmentStatus::PartiallyPaid);

        // Second half: scheduled total is 1280 (amount 1260 + fee 20).
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.paid, Money::new(dec!(1280.00)));
        assert_eq!(inst.status, InstallmentStatus::Paid);
    }

    #[tokio::test]
    async fn test_resubmission_requires_edit_path() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;
        workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        // Same payload again while still pending: conflict, not double-count.
        let result = workflow.submit_payment(&scope, single(1, dec!(640))).await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_reject_then_edit_cycle() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();

        // Rejection needs a reason.
        let result = workflow
            .confirm_payment(
                &scope,
                payment.id,
                Decision::Reject {
                    reason: "  ".to_string(),
                },
                at(),
            )
            .await;
        assert!(matches!(result, Err(LendingError::Validation(_))));

        let outcome = workflow
            .confirm_payment(
                &scope,
                payment.id,
                Decision::Reject {
                    reason: "illegible receipt".to_string(),
                },
                at(),
            )
            .await
            .unwrap();
        assert!(!outcome.payment.has_been_edited);
        assert_eq!(
            outcome.payment.rejection_reason.as_deref(),
            Some("illegible receipt")
        );
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.status, InstallmentStatus::Rejected);
        assert_eq!(inst.paid, Money::ZERO);

        // One edit cycle is allowed and returns everything to pending.
        let edited = workflow
            .edit_payment(
                &scope,
                payment.id,
                EditPayment {
                    amount: Some(Amount::new(dec!(640)).unwrap()),
                    method: "transfer".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 2, 11).unwrap(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert!(edited.has_been_edited);
        assert_eq!(
            edited.confirmation_status,
            ConfirmationStatus::PendingConfirmation
        );
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.status, InstallmentStatus::PendingConfirmation);

        // A second silent edit while pending is blocked.
        let result = workflow
            .edit_payment(
                &scope,
                payment.id,
                EditPayment {
                    amount: Some(Amount::new(dec!(700)).unwrap()),
                    method: "transfer".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 2, 12).unwrap(),
                    notes: None,
                },
            )
            .await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_edit_blocked_while_newer_submission_pending() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;

        // First submission gets rejected, then a fresh one takes its place.
        let first = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        workflow
            .confirm_payment(
                &scope,
                first.id,
                Decision::Reject {
                    reason: "wrong reference number".to_string(),
                },
                at(),
            )
            .await
            .unwrap();
        let second = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();

        // Editing the rejected payment now would put two payments in
        // pending_confirmation on the same installment.
        let result = workflow
            .edit_payment(
                &scope,
                first.id,
                EditPayment {
                    amount: Some(Amount::new(dec!(640)).unwrap()),
                    method: "transfer".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 2, 11).unwrap(),
                    notes: None,
                },
            )
            .await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));

        // Only the newer submission counts toward the installment.
        workflow
            .confirm_payment(&scope, second.id, Decision::Approve, at())
            .await
            .unwrap();
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.paid, Money::new(dec!(640.00)));
    }

    #[tokio::test]
    async fn test_full_payoff_dedups_repeated_targets() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;
        let payment = workflow
            .submit_payment(
                &scope,
                SubmitPayment {
                    loan_id: "L1".to_string(),
                    kind: PaymentKind::FullPayoff {
                        installments: vec![2, 1, 1],
                    },
                    amount: None,
                    method: "transfer".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        // Two distinct installments at 1260 remaining each, not three.
        assert_eq!(payment.amount, Money::new(dec!(2520.00)));
        assert_eq!(payment.kind.installments(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_approve_requires_active_loan() {
        let clients = InMemoryClientStore::new();
        clients
            .store(ClientRecord {
                id: "C1".to_string(),
                name: "Ana".to_string(),
                advisor_id: None,
                phone: None,
                sms_opt_in: false,
                whatsapp_opt_in: false,
                preferred_channel: PreferredChannel::Sms,
            })
            .await
            .unwrap();
        let workflow = ConfirmationWorkflow::new(
            Box::new(InMemoryLoanStore::new()),
            Box::new(InMemoryInstallmentStore::new()),
            Box::new(InMemoryPaymentStore::new()),
            Box::new(clients),
            Box::new(RecordingSender::new()),
        );
        let scope = AccessScope::Admin;
        workflow
            .create_loan(
                &scope,
                CreateLoan {
                    loan_id: "L1".to_string(),
                    client_id: "C1".to_string(),
                    terms: terms(),
                },
            )
            .await
            .unwrap();
        // Loan never activated: submission works, approval conflicts.
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        let result = workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_terminal_payment_cannot_be_confirmed_again() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        let result = workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unassigned_advisor_is_forbidden() {
        let (workflow, _) = workflow_with_loan().await;
        let payment = workflow
            .submit_payment(&AccessScope::Admin, single(1, dec!(640)))
            .await
            .unwrap();

        let other_advisor = AccessScope::Advisor("A2".to_string());
        let result = workflow
            .confirm_payment(&other_advisor, payment.id, Decision::Approve, at())
            .await;
        assert!(matches!(result, Err(LendingError::Forbidden(_))));

        // The assigned advisor may approve.
        let assigned = AccessScope::Advisor("A1".to_string());
        let outcome = workflow
            .confirm_payment(&assigned, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        assert_eq!(
            outcome.payment.confirmed_by.as_deref(),
            Some("advisor:A1")
        );
    }

    #[tokio::test]
    async fn test_client_cannot_confirm_own_payment() {
        let (workflow, _) = workflow_with_loan().await;
        let client_scope = AccessScope::Client("C1".to_string());
        let payment = workflow
            .submit_payment(&client_scope, single(1, dec!(640)))
            .await
            .unwrap();
        let result = workflow
            .confirm_payment(&client_scope, payment.id, Decision::Approve, at())
            .await;
        assert!(matches!(result, Err(LendingError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_overpayment_ceiling_on_submission() {
        let (workflow, _) = workflow_with_loan().await;
        let scope = AccessScope::Admin;
        // Scheduled total 1280; ceiling 1920.
        let result = workflow.submit_payment(&scope, single(1, dec!(1921))).await;
        assert!(matches!(result, Err(LendingError::Conflict(_))));
        assert!(workflow.submit_payment(&scope, single(1, dec!(1920))).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_installment_is_not_found() {
        let (workflow, _) = workflow_with_loan().await;
        let result = workflow
            .submit_payment(&AccessScope::Admin, single(99, dec!(100)))
            .await;
        assert!(matches!(result, Err(LendingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_full_payoff_settles_targets_and_finalizes() {
        let clients = InMemoryClientStore::new();
        clients
            .store(ClientRecord {
                id: "C1".to_string(),
                name: "Ana".to_string(),
                advisor_id: None,
                phone: None,
                sms_opt_in: false,
                whatsapp_opt_in: false,
                preferred_channel: PreferredChannel::Sms,
            })
            .await
            .unwrap();
        let workflow = ConfirmationWorkflow::new(
            Box::new(InMemoryLoanStore::new()),
            Box::new(InMemoryInstallmentStore::new()),
            Box::new(InMemoryPaymentStore::new()),
            Box::new(clients),
            Box::new(RecordingSender::new()),
        );
        let scope = AccessScope::Admin;
        let mut t = terms();
        t.term = 3;
        workflow
            .create_loan(
                &scope,
                CreateLoan {
                    loan_id: "L1".to_string(),
                    client_id: "C1".to_string(),
                    terms: t,
                },
            )
            .await
            .unwrap();
        workflow.activate_loan(&scope, "L1").await.unwrap();

        let payment = workflow
            .submit_payment(
                &scope,
                SubmitPayment {
                    loan_id: "L1".to_string(),
                    kind: PaymentKind::FullPayoff {
                        installments: vec![1, 2, 3],
                    },
                    amount: None,
                    method: "transfer".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        // term 3: per period 4000 capital + 240 interest + 20 fee = 4260.
        assert_eq!(payment.amount, Money::new(dec!(12780.00)));

        let outcome = workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        assert!(outcome.loan_finalized);
        for number in 1..=3 {
            let inst = workflow
                .installment_store()
                .get("L1", number)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(inst.status, InstallmentStatus::Paid);
            assert_eq!(inst.paid, Money::new(dec!(4260.00)));
        }
        let loan = workflow.loan_store().get("L1").await.unwrap().unwrap();
        assert_eq!(loan.status, LoanStatus::Paid);
    }

    #[tokio::test]
    async fn test_notification_failure_is_a_warning_not_an_error() {
        let (workflow, sender) = workflow_with_loan().await;
        sender.set_fail(true).await;
        let scope = AccessScope::Admin;
        let payment = workflow
            .submit_payment(&scope, single(1, dec!(640)))
            .await
            .unwrap();
        let outcome = workflow
            .confirm_payment(&scope, payment.id, Decision::Approve, at())
            .await
            .unwrap();
        // The approval stands; the delivery failure is advisory.
        assert_eq!(
            outcome.payment.confirmation_status,
            ConfirmationStatus::Approved
        );
        assert_eq!(outcome.warnings.len(), 1);
        let inst = workflow.installment_store().get("L1", 1).await.unwrap().unwrap();
        assert_eq!(inst.paid, Money::new(dec!(640.00)));
    }
}
