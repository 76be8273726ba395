//! services/api/src/session/error.rs
//!
//! The error taxonomy of the session lifecycle and export path.

use chat_export_core::PortError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client could not be started; no readiness was reached.
    #[error("Client failed to initialize after {attempts} attempt(s): {source}")]
    Init {
        attempts: u32,
        #[source]
        source: PortError,
    },

    /// Pairing was rejected and the stored credentials are presumed corrupt.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Admission control rejected the call because the session is not ready.
    #[error("The messaging session is not ready")]
    NotReady,

    /// Fetching one chat's history failed; the chat is skipped.
    #[error("Failed to fetch history for chat {chat_id}: {source}")]
    ChatFetch {
        chat_id: String,
        #[source]
        source: PortError,
    },

    /// A step of the reset sequence failed. Resets are not retried.
    #[error("Session reset failed: {0}")]
    Reset(String),

    #[error("A session reset is already in progress")]
    ResetInProgress,
}

pub type SessionResult<T> = Result<T, SessionError>;
