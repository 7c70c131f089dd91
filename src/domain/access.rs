use crate::domain::client::ClientRecord;
use serde::{Deserialize, Serialize};

/// Who is acting on an operation. Every workflow entry point takes the scope
/// as an explicit parameter; this is the single place the scope-to-permission
/// translation lives.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum AccessScope {
    Admin,
    Advisor(String),
    Client(String),
}

impl AccessScope {
    /// May this actor submit or edit a payment on behalf of `client`?
    pub fn may_submit_for(&self, client: &ClientRecord) -> bool {
        match self {
            AccessScope::Admin => true,
            AccessScope::Advisor(id) => client.advisor_id.as_deref() == Some(id),
            AccessScope::Client(id) => *id == client.id,
        }
    }

    /// May this actor approve or reject a payment for `client`? Clients never
    /// confirm their own payments; advisors only confirm for assigned clients.
    pub fn may_confirm_for(&self, client: &ClientRecord) -> bool {
        match self {
            AccessScope::Admin => true,
            AccessScope::Advisor(id) => client.advisor_id.as_deref() == Some(id),
            AccessScope::Client(_) => false,
        }
    }

    /// May this actor create or activate loans?
    pub fn may_manage_loans(&self) -> bool {
        matches!(self, AccessScope::Admin | AccessScope::Advisor(_))
    }

    /// Label stamped into `confirmed_by` on approval/rejection.
    pub fn actor_label(&self) -> String {
        match self {
            AccessScope::Admin => "admin".to_string(),
            AccessScope::Advisor(id) => format!("advisor:{id}"),
            AccessScope::Client(id) => format!("client:{id}"),
        }
    }
}
