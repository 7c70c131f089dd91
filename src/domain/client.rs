use crate::domain::notification::Channel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PreferredChannel {
    Sms,
    Whatsapp,
    Both,
}

/// The slice of a client record the core needs: who services the client and
/// how the client may be reached for delinquency notifications.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    /// Advisor assigned to this client; advisors may only confirm payments
    /// for their own clients.
    pub advisor_id: Option<String>,
    pub phone: Option<String>,
    pub sms_opt_in: bool,
    pub whatsapp_opt_in: bool,
    pub preferred_channel: PreferredChannel,
}

impl ClientRecord {
    /// Client-facing channels a notification may use, honoring opt-in flags
    /// and the preferred-channel setting. Empty when the client has no phone
    /// number on file.
    pub fn eligible_channels(&self) -> Vec<Channel> {
        if self.phone.is_none() {
            return Vec::new();
        }
        let mut channels = Vec::new();
        let wants_sms = matches!(
            self.preferred_channel,
            PreferredChannel::Sms | PreferredChannel::Both
        );
        let wants_whatsapp = matches!(
            self.preferred_channel,
            PreferredChannel::Whatsapp | PreferredChannel::Both
        );
        if self.sms_opt_in && wants_sms {
            channels.push(Channel::Sms);
        }
        if self.whatsapp_opt_in && wants_whatsapp {
            channels.push(Channel::Whatsapp);
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientRecord {
        ClientRecord {
            id: "C1".to_string(),
            name: "Ana".to_string(),
            advisor_id: Some("A1".to_string()),
            phone: Some("+50255512345".to_string()),
            sms_opt_in: true,
            whatsapp_opt_in: true,
            preferred_channel: PreferredChannel::Both,
        }
    }

    #[test]
    fn test_both_channels_when_opted_in() {
        assert_eq!(
            client().eligible_channels(),
            vec![Channel::Sms, Channel::Whatsapp]
        );
    }

    #[test]
    fn test_preference_narrows_channels() {
        let mut c = client();
        c.preferred_channel = PreferredChannel::Whatsapp;
        assert_eq!(c.eligible_channels(), vec![Channel::Whatsapp]);
    }

    #[test]
    fn test_opt_out_overrides_preference() {
        let mut c = client();
        c.sms_opt_in = false;
        c.preferred_channel = PreferredChannel::Sms;
        assert!(c.eligible_channels().is_empty());
    }

    #[test]
    fn test_no_phone_means_no_channels() {
        let mut c = client();
        c.phone = None;
        assert!(c.eligible_channels().is_empty());
    }
}
