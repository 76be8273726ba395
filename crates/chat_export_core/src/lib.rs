pub mod domain;
pub mod filter;
pub mod lifecycle;
pub mod pairs;
pub mod ports;

pub use domain::{
    Chat, CleanedMessage, ClientEvent, ConversationPair, MessageKind, PairingCode, RawMessage,
    Role, SessionState, TrainingRecord,
};
pub use filter::{DiscardReason, FilterOutcome, MessageFilter};
pub use lifecycle::{transition, QrEffect, Transition};
pub use pairs::{build_pairs, ContextWindow, TrainingSetBuilder};
pub use ports::{ClientFactory, CredentialStore, EventSink, MessagingClient, PortError, PortResult};
