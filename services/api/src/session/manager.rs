//! services/api/src/session/manager.rs
//!
//! Owns the process's single messaging-client handle and drives the session
//! lifecycle from the events that handle pushes.
//!
//! Every handle is tagged with a generation number. Starting a new handle or
//! detaching the current one bumps the generation, so late events from a
//! superseded handle are dropped instead of being applied to the new session.

use crate::adapters::qr;
use crate::config::Config;
use crate::session::error::{SessionError, SessionResult};
use crate::session::supervisor::{retry_with_backoff, RetryPolicy};
use chat_export_core::{
    transition, ClientEvent, ClientFactory, CredentialStore, MessagingClient, PairingCode,
    QrEffect, SessionState, Transition,
};
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

//=========================================================================================
// Policy and Status Types
//=========================================================================================

/// How the manager reacts to failures of the messaging client.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub init_retry: RetryPolicy,
    pub restart_on_auth_failure: bool,
    pub max_auth_restarts: u32,
}

impl SessionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            init_retry: RetryPolicy::exponential(config.init_max_attempts, config.init_backoff),
            restart_on_auth_failure: config.restart_on_auth_failure,
            max_auth_restarts: config.max_auth_restarts,
        }
    }
}

/// A side-effect free snapshot of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connected: bool,
    pub has_handle: bool,
}

//=========================================================================================
// The Session (guarded by the manager)
//=========================================================================================

struct Session {
    state: SessionState,
    pairing: Option<PairingCode>,
    handle: Option<Arc<dyn MessagingClient>>,
    generation: u64,
    /// Consecutive restarts triggered by authentication failures.
    auth_restarts: u32,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            pairing: None,
            handle: None,
            generation: 0,
            auth_restarts: 0,
        }
    }
}

//=========================================================================================
// The Connection Manager
//=========================================================================================

pub struct ConnectionManager {
    session: Mutex<Session>,
    /// Serializes every sequence that replaces or removes the handle.
    lifecycle_lock: Mutex<()>,
    factory: Arc<dyn ClientFactory>,
    credentials: Arc<dyn CredentialStore>,
    policy: SessionPolicy,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        credentials: Arc<dyn CredentialStore>,
        policy: SessionPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(Session::new()),
            lifecycle_lock: Mutex::new(()),
            factory,
            credentials,
            policy,
        })
    }

    // --- Read Accessors ---

    pub async fn status(&self) -> SessionStatus {
        let session = self.session.lock().await;
        let has_handle = session.handle.is_some();
        SessionStatus {
            state: session.state,
            connected: session.state == SessionState::Ready && has_handle,
            has_handle,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    pub async fn pairing_code(&self) -> Option<PairingCode> {
        self.session.lock().await.pairing.clone()
    }

    /// Admission control for every chat and export operation.
    ///
    /// Returns the current handle so the caller keeps using it even if a
    /// reset replaces it mid-call.
    pub async fn require_ready(&self) -> SessionResult<Arc<dyn MessagingClient>> {
        let session = self.session.lock().await;
        match (&session.state, &session.handle) {
            (SessionState::Ready, Some(handle)) => Ok(handle.clone()),
            _ => Err(SessionError::NotReady),
        }
    }

    // --- Lifecycle Operations ---

    /// Creates a fresh client handle and initializes it under the retry policy.
    /// Any existing handle is destroyed first.
    pub async fn start(self: &Arc<Self>) -> SessionResult<()> {
        let _lifecycle = self.lifecycle_lock.lock().await;
        self.start_locked().await
    }

    async fn start_locked(self: &Arc<Self>) -> SessionResult<()> {
        if let Some(previous) = self.detach_handle().await {
            info!("Destroying previous messaging client before starting a new one.");
            destroy_quietly(previous).await;
        }

        let (events_tx, events_rx) = mpsc::unbounded();
        let client = self.factory.create(events_tx);
        let generation = {
            let mut session = self.session.lock().await;
            session.generation += 1;
            session.handle = Some(client.clone());
            session.state = SessionState::Uninitialized;
            session.pairing = None;
            session.generation
        };
        tokio::spawn(pump_events(Arc::downgrade(self), generation, events_rx));
        info!("Starting messaging client (generation {}).", generation);

        let result = retry_with_backoff(&self.policy.init_retry, "Client initialization", |_| {
            let client = client.clone();
            async move { client.initialize().await }
        })
        .await;

        match result {
            Ok(()) => {
                info!("Messaging client initialized (generation {}).", generation);
                Ok(())
            }
            Err((source, attempts)) => {
                let err = SessionError::Init { attempts, source };
                error!("{}", err);
                if let Some(failed) = self.detach_generation(generation).await {
                    destroy_quietly(failed).await;
                }
                Err(err)
            }
        }
    }

    /// Best-effort logout and destroy of the current handle. Failures are logged.
    pub async fn shutdown_client(&self, logout: bool) {
        let _lifecycle = self.lifecycle_lock.lock().await;
        let Some(client) = self.detach_handle().await else {
            debug!("No messaging client to shut down.");
            return;
        };
        if logout {
            if let Err(e) = client.logout().await {
                warn!("Logout failed during shutdown: {}", e);
            }
        }
        destroy_quietly(client).await;
    }

    /// Returns the session to `Uninitialized`, forgetting any pairing code.
    pub async fn reset_state(&self) {
        let mut session = self.session.lock().await;
        session.state = SessionState::Uninitialized;
        session.pairing = None;
        session.auth_restarts = 0;
    }

    // --- Event Handling ---

    /// Applies one event from the handle of `generation`.
    pub async fn handle_event(self: &Arc<Self>, generation: u64, event: ClientEvent) {
        let Some(applied) = self.apply_event(generation, &event).await else {
            return;
        };
        if applied.credentials_rejected {
            let reason = match event {
                ClientEvent::AuthFailure(reason) => reason,
                other => other.name().to_string(),
            };
            tokio::spawn(self.clone().recover_from_auth_failure(generation, reason));
        }
    }

    async fn apply_event(&self, generation: u64, event: &ClientEvent) -> Option<Transition> {
        // Rendering is pure; keep it outside the lock.
        let image = match event {
            ClientEvent::PairingToken(payload) => match qr::render_data_url(payload) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Could not render pairing QR: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut session = self.session.lock().await;
        if session.generation != generation {
            debug!(
                "Dropping {} event from superseded client generation {} (current {}).",
                event.name(),
                generation,
                session.generation
            );
            return None;
        }

        let Some(applied) = transition(session.state, event) else {
            match event {
                ClientEvent::Disconnected(reason) => error!(
                    "Messaging client lost its connection while {}: {}. Reset the session to recover.",
                    session.state, reason
                ),
                _ => warn!("Rejected {} event in state {}.", event.name(), session.state),
            }
            return None;
        };

        match &applied.qr {
            QrEffect::Keep => {}
            QrEffect::Store(payload) => {
                session.pairing = Some(PairingCode {
                    payload: payload.clone(),
                    image,
                })
            }
            QrEffect::Clear => session.pairing = None,
        }

        match event {
            ClientEvent::PairingToken(_) => info!("Pairing QR received; waiting for scan."),
            ClientEvent::Authenticated => info!("Messaging client authenticated."),
            ClientEvent::AuthFailure(reason) => error!("Authentication failed: {}", reason),
            ClientEvent::Ready => {
                session.auth_restarts = 0;
                info!("Messaging client is ready.");
            }
            ClientEvent::Disconnected(reason) => {
                warn!("Messaging client disconnected: {}. Waiting for an operator reset.", reason)
            }
        }
        debug!("Session state {} -> {}.", session.state, applied.next);
        session.state = applied.next;
        Some(applied)
    }

    /// Wipes the rejected credentials and, if the policy allows, restarts.
    ///
    /// Boxed because it re-enters `start_locked`, which spawns the event pump
    /// that calls back into this method.
    fn recover_from_auth_failure(
        self: Arc<Self>,
        generation: u64,
        reason: String,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _lifecycle = self.lifecycle_lock.lock().await;

            let Some(client) = self.detach_generation(generation).await else {
                debug!("Auth failure of generation {} already superseded.", generation);
                return;
            };
            destroy_quietly(client).await;

            if let Err(e) = self.credentials.wipe().await {
                error!(
                    "{}; could not wipe stored credentials: {}. Not restarting.",
                    SessionError::AuthFailure(reason),
                    e
                );
                return;
            }

            let restarts = {
                let mut session = self.session.lock().await;
                if !self.policy.restart_on_auth_failure
                    || session.auth_restarts >= self.policy.max_auth_restarts
                {
                    None
                } else {
                    session.auth_restarts += 1;
                    Some(session.auth_restarts)
                }
            };

            match restarts {
                Some(count) => {
                    info!(
                        "Restarting after authentication failure ({}/{}).",
                        count, self.policy.max_auth_restarts
                    );
                    if let Err(e) = self.start_locked().await {
                        error!("Restart after authentication failure failed: {}", e);
                    }
                }
                None => warn!(
                    "{}; credentials wiped, not restarting automatically.",
                    SessionError::AuthFailure(reason)
                ),
            }
        })
    }

    // --- Handle Bookkeeping ---

    /// Removes the current handle and invalidates its events.
    async fn detach_handle(&self) -> Option<Arc<dyn MessagingClient>> {
        let mut session = self.session.lock().await;
        session.generation += 1;
        session.pairing = None;
        session.handle.take()
    }

    /// Like `detach_handle`, but only while `generation` is still current.
    async fn detach_generation(&self, generation: u64) -> Option<Arc<dyn MessagingClient>> {
        let mut session = self.session.lock().await;
        if session.generation != generation {
            return None;
        }
        session.generation += 1;
        session.pairing = None;
        session.handle.take()
    }
}

/// Forwards the events of one handle until its sender side is dropped.
async fn pump_events(
    manager: Weak<ConnectionManager>,
    generation: u64,
    mut events: UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = events.next().await {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        manager.handle_event(generation, event).await;
    }
    debug!("Event stream of client generation {} ended.", generation);
}

async fn destroy_quietly(client: Arc<dyn MessagingClient>) {
    if let Err(e) = client.destroy().await {
        warn!("Destroying messaging client failed: {}", e);
    }
}
