//! crates/chat_export_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or serialization format.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

//=========================================================================================
// Collaborator Projections (read-only, fetched per export)
//=========================================================================================

/// A chat as reported by the messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub is_group: bool,
}

/// The kind of a raw message. Only `Chat` and `Text` carry user-authored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Text,
    System,
    Other,
}

impl MessageKind {
    /// Maps a collaborator type tag onto a `MessageKind`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "chat" => Self::Chat,
            "text" => Self::Text,
            "e2e_notification" | "notification" | "notification_template" | "gp2"
            | "system" => Self::System,
            _ => Self::Other,
        }
    }
}

/// A single message from a chat's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub body: String,
    pub from_me: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub kind: MessageKind,
}

//=========================================================================================
// Derived Training Data
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Messages sent from the paired account are the assistant's turns.
    pub fn from_sender(from_me: bool) -> Self {
        if from_me {
            Self::Assistant
        } else {
            Self::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that survived filtering, before chat context is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedMessage {
    pub role: Role,
    pub content: String,
    /// Word count of the body before cleaning.
    pub word_count: usize,
    pub timestamp: i64,
}

/// One cleaned message with its chat metadata and bounded context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRecord {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub chat_id: String,
    pub chat_name: String,
    pub is_group: bool,
    pub word_count: usize,
    pub timestamp: DateTime<Utc>,
    /// Cleaned contents of the preceding messages in the same chat, oldest
    /// first, ending with this record's own content.
    pub context_window: Vec<String>,
}

/// A question/answer unit built from an adjacent user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPair {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub chat_name: String,
    /// The question's context window without the question itself.
    pub context: Vec<String>,
}

/// Converts epoch seconds into a UTC timestamp, clamping invalid values to the epoch.
pub fn timestamp_from_epoch(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

//=========================================================================================
// Session Lifecycle
//=========================================================================================

/// The lifecycle state of the process's single messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AwaitingScan,
    Authenticating,
    Ready,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingScan => "awaiting_scan",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push notifications emitted by a messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    PairingToken(String),
    Authenticated,
    AuthFailure(String),
    Ready,
    Disconnected(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PairingToken(_) => "pairing-token",
            Self::Authenticated => "authenticated",
            Self::AuthFailure(_) => "auth-failure",
            Self::Ready => "ready",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

/// The current pairing token and its rendered image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    pub payload: String,
    /// A `data:` URL holding the rendered QR code, if rendering succeeded.
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_follows_sender() {
        assert_eq!(Role::from_sender(true), Role::Assistant);
        assert_eq!(Role::from_sender(false), Role::User);
    }

    #[test]
    fn message_kind_tags() {
        assert_eq!(MessageKind::from_tag("chat"), MessageKind::Chat);
        assert_eq!(MessageKind::from_tag("text"), MessageKind::Text);
        assert_eq!(MessageKind::from_tag("e2e_notification"), MessageKind::System);
        assert_eq!(MessageKind::from_tag("image"), MessageKind::Other);
    }

    #[test]
    fn epoch_conversion() {
        assert_eq!(timestamp_from_epoch(0), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(
            timestamp_from_epoch(1_700_000_000).to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
        assert_eq!(timestamp_from_epoch(i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }
}
