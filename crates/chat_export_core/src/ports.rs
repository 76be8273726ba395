//! crates/chat_export_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete messaging backend and storage.

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use std::sync::Arc;
use crate::domain::{Chat, ClientEvent, RawMessage};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The client handle was destroyed or lost its connection mid-call.
    #[error("Client unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Where a client pushes its lifecycle notifications.
pub type EventSink = UnboundedSender<ClientEvent>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The opaque messaging-protocol client. It owns pairing and transport;
/// this crate only drives it.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Starts the client. Lifecycle events arrive on the sink it was created with.
    async fn initialize(&self) -> PortResult<()>;

    async fn list_chats(&self) -> PortResult<Vec<Chat>>;

    /// Returns up to `limit` of the most recent messages of a chat, oldest first.
    async fn fetch_messages(&self, chat_id: &str, limit: usize) -> PortResult<Vec<RawMessage>>;

    /// Unlinks the paired device.
    async fn logout(&self) -> PortResult<()>;

    /// Releases the client and closes its event stream.
    async fn destroy(&self) -> PortResult<()>;
}

/// Creates fresh client handles. Each handle reports to its own sink.
pub trait ClientFactory: Send + Sync {
    fn create(&self, events: EventSink) -> Arc<dyn MessagingClient>;
}

/// The persisted pairing credentials of the messaging client.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self) -> PortResult<bool>;

    /// Removes all stored credentials. Wiping an absent store succeeds.
    async fn wipe(&self) -> PortResult<()>;
}
