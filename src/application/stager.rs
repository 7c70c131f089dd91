use crate::domain::client::ClientRecord;
use crate::domain::installment::{Installment, InstallmentStatus};
use crate::domain::notification::{
    Channel, DeliveryOutcome, NotificationLogEntry, NotificationSettings, Stage, compose_message,
    compute_stage,
};
use crate::domain::ports::{
    ClientStoreBox, InstallmentStoreBox, LoanStoreBox, NotificationLogBox, NotificationSenderBox,
};
use crate::error::Result;
use chrono::{Duration, NaiveDateTime};
use std::collections::{HashMap, HashSet};

/// What the stager proposes for one channel of one installment's stage.
/// Suppressed decisions are still logged (`ignored`), so a re-run can see
/// what was deliberately skipped; they are never queued for later.
#[derive(Debug, PartialEq, Clone)]
pub enum ProposedAction {
    Send,
    Suppress(String),
}

#[derive(Debug, PartialEq, Clone)]
pub struct StageDecision {
    pub loan_id: String,
    pub installment: u32,
    pub client_id: String,
    pub stage: Stage,
    pub channel: Channel,
    pub destination: Option<String>,
    pub message: String,
    pub action: ProposedAction,
}

/// Pure staging pass: given "today", the non-paid installments with their
/// clients, and the notification log, decides what to notify. The caller is
/// responsible for delivery and for persisting log rows.
///
/// Guarantees, in order of precedence per installment and channel:
/// - an (installment, stage, channel) triple already `sent` is never
///   proposed again;
/// - quiet hours suppress client channels for the whole run;
/// - a client with `rate_limit_max_sends` recent sends gets suppressions,
///   counting both log history inside the window and sends proposed earlier
///   in this same run;
/// - advisor escalations dedup per stage but bypass quiet hours and the
///   client rate limit.
pub fn compute_notification_stages(
    now: NaiveDateTime,
    items: &[(Installment, ClientRecord)],
    log: &[NotificationLogEntry],
    settings: &NotificationSettings,
) -> Vec<StageDecision> {
    let sent_index: HashSet<(&str, u32, &str, Channel)> = log
        .iter()
        .filter(|e| e.outcome == DeliveryOutcome::Sent)
        .map(|e| (e.loan_id.as_str(), e.installment, e.stage.as_str(), e.channel))
        .collect();

    let window_start = now - Duration::hours(settings.rate_limit_window_hours);
    let mut budget_used: HashMap<&str, u32> = HashMap::new();
    for entry in log {
        if entry.outcome == DeliveryOutcome::Sent
            && entry.channel != Channel::Advisor
            && entry.at > window_start
        {
            *budget_used.entry(entry.client_id.as_str()).or_default() += 1;
        }
    }

    let quiet = settings.in_quiet_hours(now);
    let mut decisions = Vec::new();

    for (installment, client) in items {
        if installment.is_paid() {
            continue;
        }
        let Some(stage) = compute_stage(now.date(), installment.due_date, installment.status)
        else {
            continue;
        };
        let stage_key = stage.key();

        if stage.is_overdue()
            && client.advisor_id.is_some()
            && !sent_index.contains(&(
                installment.loan_id.as_str(),
                installment.number,
                stage_key.as_str(),
                Channel::Advisor,
            ))
        {
            decisions.push(StageDecision {
                loan_id: installment.loan_id.clone(),
                installment: installment.number,
                client_id: client.id.clone(),
                stage,
                channel: Channel::Advisor,
                destination: None,
                message: format!(
                    "Cuota {} del préstamo {} de {} está en etapa {}; saldo pendiente {}.",
                    installment.number,
                    installment.loan_id,
                    client.name,
                    stage_key,
                    installment.payoff_remaining()
                ),
                action: ProposedAction::Send,
            });
        }

        for channel in client.eligible_channels() {
            if sent_index.contains(&(
                installment.loan_id.as_str(),
                installment.number,
                stage_key.as_str(),
                channel,
            )) {
                continue;
            }

            let action = if quiet {
                ProposedAction::Suppress("quiet hours".to_string())
            } else {
                let used = budget_used.entry(client.id.as_str()).or_default();
                if *used >= settings.rate_limit_max_sends {
                    ProposedAction::Suppress("rate limit reached".to_string())
                } else {
                    *used += 1;
                    ProposedAction::Send
                }
            };

            decisions.push(StageDecision {
                loan_id: installment.loan_id.clone(),
                installment: installment.number,
                client_id: client.id.clone(),
                stage,
                channel,
                destination: client.phone.as_deref().map(|p| settings.normalize_phone(p)),
                message: compose_message(stage, installment, settings),
                action,
            });
        }
    }

    decisions
}

#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct SweepSummary {
    pub evaluated: usize,
    pub sent: usize,
    pub failed: usize,
    pub ignored: usize,
}

/// The externally-triggered delinquency sweep. Marks past-due installments
/// `overdue`, runs the pure staging pass, hands sends to the delivery
/// collaborator and records one idempotent log row per decision. Safe to
/// re-run after a partial failure: every send is guarded by the log dedup.
pub struct DelinquencySweep {
    loans: LoanStoreBox,
    installments: InstallmentStoreBox,
    clients: ClientStoreBox,
    log: NotificationLogBox,
    sender: NotificationSenderBox,
    settings: NotificationSettings,
}

impl DelinquencySweep {
    pub fn new(
        loans: LoanStoreBox,
        installments: InstallmentStoreBox,
        clients: ClientStoreBox,
        log: NotificationLogBox,
        sender: NotificationSenderBox,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            loans,
            installments,
            clients,
            log,
            sender,
            settings,
        }
    }

    pub async fn run(&self, now: NaiveDateTime) -> Result<SweepSummary> {
        self.mark_overdue(now).await?;

        let mut items = Vec::new();
        for installment in self.installments.all().await? {
            if installment.is_paid() {
                continue;
            }
            let Some(loan) = self.loans.get(&installment.loan_id).await? else {
                continue;
            };
            let Some(client) = self.clients.get(&loan.client_id).await? else {
                continue;
            };
            items.push((installment, client));
        }

        let log_entries = self.log.entries().await?;
        let decisions = compute_notification_stages(now, &items, &log_entries, &self.settings);

        let mut summary = SweepSummary {
            evaluated: items.len(),
            ..SweepSummary::default()
        };
        for decision in decisions {
            let outcome = match &decision.action {
                ProposedAction::Send => {
                    match self
                        .sender
                        .send(
                            decision.channel,
                            decision.destination.as_deref(),
                            &decision.message,
                        )
                        .await
                    {
                        Ok(()) => {
                            summary.sent += 1;
                            DeliveryOutcome::Sent
                        }
                        Err(e) => {
                            tracing::warn!(
                                loan = %decision.loan_id,
                                installment = decision.installment,
                                stage = %decision.stage,
                                error = %e,
                                "notification delivery failed"
                            );
                            summary.failed += 1;
                            DeliveryOutcome::Failed
                        }
                    }
                }
                ProposedAction::Suppress(reason) => {
                    tracing::debug!(
                        loan = %decision.loan_id,
                        installment = decision.installment,
                        stage = %decision.stage,
                        reason,
                        "notification suppressed"
                    );
                    summary.ignored += 1;
                    DeliveryOutcome::Ignored
                }
            };
            self.log
                .record(NotificationLogEntry {
                    loan_id: decision.loan_id,
                    installment: decision.installment,
                    client_id: decision.client_id,
                    stage: decision.stage.key(),
                    channel: decision.channel,
                    outcome,
                    at: now,
                })
                .await?;
        }

        Ok(summary)
    }

    /// A pending installment past its due date becomes `overdue`. A lost
    /// guarded update just leaves it for the next sweep.
    async fn mark_overdue(&self, now: NaiveDateTime) -> Result<()> {
        for installment in self.installments.all().await? {
            if installment.status == InstallmentStatus::Pending
                && installment.due_date < now.date()
            {
                let version = installment.version;
                let mut overdue = installment;
                overdue.status = InstallmentStatus::Overdue;
                self.installments.update_guarded(overdue, version).await?;
            }
        }
        Ok(())
    }
}
