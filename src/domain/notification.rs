use crate::domain::installment::{Installment, InstallmentStatus};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named point in the delinquency timeline. The schedule is deliberately
/// sparse: outside the listed day offsets no notification fires at all.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Stage {
    DMinus15,
    DMinus2,
    DMinus1,
    DueToday,
    DPlus1,
    DPlus3,
    Weekly(u32),
}

impl Stage {
    /// Stable key used for notification-log idempotency.
    pub fn key(&self) -> String {
        match self {
            Stage::DMinus15 => "D-15".to_string(),
            Stage::DMinus2 => "D-2".to_string(),
            Stage::DMinus1 => "D-1".to_string(),
            Stage::DueToday => "D0".to_string(),
            Stage::DPlus1 => "D+1".to_string(),
            Stage::DPlus3 => "D+3".to_string(),
            Stage::Weekly(k) => format!("WEEKLY_{k}"),
        }
    }

    /// Overdue stages escalate to the assigned advisor as well.
    pub fn is_overdue(&self) -> bool {
        matches!(self, Stage::DPlus1 | Stage::DPlus3 | Stage::Weekly(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Computes the delinquency stage for one installment on a given calendar
/// day. `days` is positive once the due date has passed. Weekly escalation
/// starts on day 7 and only applies while the installment is still
/// `pending` or `overdue`; every other offset outside the fixed singles
/// yields no stage.
pub fn compute_stage(
    today: NaiveDate,
    due: NaiveDate,
    status: InstallmentStatus,
) -> Option<Stage> {
    let days = (today - due).num_days();
    match days {
        -15 => Some(Stage::DMinus15),
        -2 => Some(Stage::DMinus2),
        -1 => Some(Stage::DMinus1),
        0 => Some(Stage::DueToday),
        1 => Some(Stage::DPlus1),
        3 => Some(Stage::DPlus3),
        d if d >= 7
            && matches!(
                status,
                InstallmentStatus::Pending | InstallmentStatus::Overdue
            ) =>
        {
            Some(Stage::Weekly((d / 7) as u32))
        }
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Whatsapp,
    /// Staff-facing escalation; independent of client opt-ins and rate limits.
    Advisor,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Advisor => "advisor",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    Ignored,
}

/// One row per channel per stage attempt for an installment. The log is the
/// idempotency record: a `Sent` row for an (installment, stage, channel)
/// triple permanently blocks a re-send, and `Sent` rows inside the rolling
/// window feed the per-client rate limit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct NotificationLogEntry {
    pub loan_id: String,
    pub installment: u32,
    pub client_id: String,
    pub stage: String,
    pub channel: Channel,
    pub outcome: DeliveryOutcome,
    pub at: NaiveDateTime,
}

/// Process-wide notification settings, passed in explicitly so the stager
/// stays pure and testable.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSettings {
    pub support_contact: String,
    /// Prefixed onto phone numbers that carry no `+` country code.
    pub default_country_code: String,
    /// Local hours `[start, end)` during which client sends are suppressed.
    pub quiet_hours: Option<(u32, u32)>,
    /// Maximum `Sent` notifications per client inside the rolling window.
    pub rate_limit_max_sends: u32,
    pub rate_limit_window_hours: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            support_contact: "atención al socio".to_string(),
            default_country_code: "+502".to_string(),
            quiet_hours: None,
            rate_limit_max_sends: 2,
            rate_limit_window_hours: 24,
        }
    }
}

impl NotificationSettings {
    pub fn normalize_phone(&self, phone: &str) -> String {
        if phone.starts_with('+') {
            phone.to_string()
        } else {
            format!("{}{}", self.default_country_code, phone)
        }
    }

    pub fn in_quiet_hours(&self, now: NaiveDateTime) -> bool {
        match self.quiet_hours {
            Some((start, end)) => {
                let hour = now.hour();
                if start <= end {
                    hour >= start && hour < end
                } else {
                    // Window wraps midnight, e.g. 21..6.
                    hour >= start || hour < end
                }
            }
            None => false,
        }
    }
}

/// Client-facing message text for a stage.
pub fn compose_message(
    stage: Stage,
    installment: &Installment,
    settings: &NotificationSettings,
) -> String {
    let due = installment.due_date.format("%d/%m/%Y");
    let remaining = installment.payoff_remaining();
    match stage {
        Stage::DMinus15 | Stage::DMinus2 | Stage::DMinus1 => format!(
            "Recordatorio: su cuota {} por {} vence el {}. Consultas: {}.",
            installment.number, remaining, due, settings.support_contact
        ),
        Stage::DueToday => format!(
            "Su cuota {} por {} vence hoy. Consultas: {}.",
            installment.number, remaining, settings.support_contact
        ),
        Stage::DPlus1 | Stage::DPlus3 => format!(
            "Su cuota {} por {} venció el {}. Por favor regularice su pago. Consultas: {}.",
            installment.number, remaining, due, settings.support_contact
        ),
        Stage::Weekly(_) => format!(
            "Su cuota {} por {} sigue pendiente desde el {}. Comuníquese con {} para evitar recargos.",
            installment.number, remaining, due, settings.support_contact
        ),
    }
}
