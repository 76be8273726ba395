//! crates/chat_export_core/src/lifecycle.rs
//!
//! The session lifecycle as an explicit transition table. Every
//! (state, event) pair not listed here is invalid and must be rejected.

use crate::domain::{ClientEvent, SessionState};

/// What to do with the stored pairing code when a transition is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrEffect {
    Keep,
    Store(String),
    Clear,
}

/// The outcome of a valid transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub qr: QrEffect,
    /// Set when the stored credentials must be considered corrupt.
    pub credentials_rejected: bool,
}

impl Transition {
    fn to(next: SessionState, qr: QrEffect) -> Self {
        Self {
            next,
            qr,
            credentials_rejected: false,
        }
    }
}

/// Looks up the transition for `event` in `state`. Returns `None` if the
/// event is not valid from that state.
pub fn transition(state: SessionState, event: &ClientEvent) -> Option<Transition> {
    use SessionState::*;

    match (state, event) {
        // A fresh token, or a refreshed one while the previous expired unscanned.
        (Uninitialized | AwaitingScan, ClientEvent::PairingToken(payload)) => {
            Some(Transition::to(AwaitingScan, QrEffect::Store(payload.clone())))
        }
        // Token accepted, or stored credentials restored without a scan.
        (Uninitialized | AwaitingScan | Authenticating, ClientEvent::Authenticated) => {
            Some(Transition::to(Authenticating, QrEffect::Keep))
        }
        (Authenticating, ClientEvent::Ready) => Some(Transition::to(Ready, QrEffect::Clear)),
        (Uninitialized | AwaitingScan | Authenticating, ClientEvent::AuthFailure(_)) => {
            Some(Transition {
                next: Uninitialized,
                qr: QrEffect::Clear,
                credentials_rejected: true,
            })
        }
        (Authenticating | Ready, ClientEvent::Disconnected(_)) => {
            Some(Transition::to(Disconnected, QrEffect::Clear))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    fn token() -> ClientEvent {
        ClientEvent::PairingToken("2@abc".to_string())
    }

    #[test]
    fn happy_path_reaches_ready() {
        let t = transition(Uninitialized, &token()).unwrap();
        assert_eq!(t.next, AwaitingScan);
        assert_eq!(t.qr, QrEffect::Store("2@abc".to_string()));

        let t = transition(AwaitingScan, &ClientEvent::Authenticated).unwrap();
        assert_eq!(t.next, Authenticating);
        assert_eq!(t.qr, QrEffect::Keep);

        let t = transition(Authenticating, &ClientEvent::Authenticated).unwrap();
        assert_eq!(t.next, Authenticating);

        let t = transition(Authenticating, &ClientEvent::Ready).unwrap();
        assert_eq!(t.next, Ready);
        assert_eq!(t.qr, QrEffect::Clear);
    }

    #[test]
    fn disconnect_only_from_authenticating_or_ready() {
        let event = ClientEvent::Disconnected("LOGOUT".to_string());
        assert_eq!(transition(Ready, &event).unwrap().next, Disconnected);
        assert_eq!(transition(Authenticating, &event).unwrap().qr, QrEffect::Clear);
        assert!(transition(Uninitialized, &event).is_none());
        assert!(transition(AwaitingScan, &event).is_none());
        assert!(transition(Disconnected, &event).is_none());
    }

    #[test]
    fn auth_failure_rejects_credentials() {
        let event = ClientEvent::AuthFailure("bad session".to_string());
        let t = transition(Authenticating, &event).unwrap();
        assert_eq!(t.next, Uninitialized);
        assert!(t.credentials_rejected);
        assert!(transition(Ready, &event).is_none());
    }

    #[test]
    fn invalid_events_are_rejected() {
        assert!(transition(Uninitialized, &ClientEvent::Ready).is_none());
        assert!(transition(AwaitingScan, &ClientEvent::Ready).is_none());
        assert!(transition(Ready, &token()).is_none());
        assert!(transition(Ready, &ClientEvent::Ready).is_none());
        assert!(transition(Disconnected, &ClientEvent::Authenticated).is_none());
    }
}
