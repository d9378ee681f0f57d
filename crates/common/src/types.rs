use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric user identifier, assigned by the directory starting at 1.
pub type UserId = u64;

/// Notification delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Per-user channel opt-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub email: bool,
    pub sms: bool,
}

impl Preferences {
    pub fn enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    pub preferences: Preferences,
}

impl User {
    /// Contact address for a channel, if the user has one.
    pub fn contact(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.telephone.as_deref(),
        }
    }
}

/// A message waiting on a channel queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    /// Correlation id; kept across retries.
    pub id: Uuid,
    pub channel: Channel,
    /// Address or number resolved when the message was queued.
    pub recipient: String,
    pub body: String,
    pub user_id: UserId,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(
        channel: Channel,
        recipient: impl Into<String>,
        body: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            recipient: recipient.into(),
            body: body.into(),
            user_id,
            attempts: 0,
            queued_at: Utc::now(),
        }
    }

    /// Copy of this message with the attempt counter bumped by one.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }
}

/// Response body returned by the upstream email/SMS service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status: String,
    pub channel: Channel,
    pub to: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_display_matches_serde() {
        assert_eq!(Channel::Email.to_string(), "email");
        assert_eq!(serde_json::to_value(Channel::Sms).unwrap(), "sms");
    }

    #[test]
    fn test_user_serializes_camel_case_without_missing_contacts() {
        let user = User {
            user_id: 7,
            email: Some("a@x.com".to_string()),
            telephone: None,
            preferences: Preferences {
                email: true,
                sms: false,
            },
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["email"], "a@x.com");
        assert!(json.get("telephone").is_none());
        assert_eq!(json["preferences"]["email"], true);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let msg = NotificationMessage::new(Channel::Email, "a@x.com", "hi", 1);
        let retry = msg.next_attempt();
        assert_eq!(retry.id, msg.id);
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.queued_at, msg.queued_at);
        assert_eq!(msg.attempts, 0);
    }
}
