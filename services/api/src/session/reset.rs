//! services/api/src/session/reset.rs
//!
//! Operator-triggered session reset: tear down the current client, wipe the
//! stored credentials and start a fresh pairing cycle. The request is
//! acknowledged immediately and the sequence runs in the background.

use crate::session::error::{SessionError, SessionResult};
use crate::session::manager::ConnectionManager;
use chat_export_core::CredentialStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct SessionResetCoordinator {
    manager: Arc<ConnectionManager>,
    credentials: Arc<dyn CredentialStore>,
    /// Pause between acknowledging the request and starting teardown.
    delay: Duration,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag however the reset task ends.
struct InProgress(Arc<SessionResetCoordinator>);

impl Drop for InProgress {
    fn drop(&mut self) {
        self.0.in_progress.store(false, Ordering::SeqCst);
    }
}

impl SessionResetCoordinator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        credentials: Arc<dyn CredentialStore>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            credentials,
            delay,
            in_progress: AtomicBool::new(false),
        })
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Accepts a reset request and runs it in the background.
    ///
    /// Fails with `ResetInProgress` while an earlier reset has not finished.
    /// The returned handle resolves once the fresh client has been started.
    pub fn request_reset(self: &Arc<Self>) -> SessionResult<JoinHandle<SessionResult<()>>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::ResetInProgress);
        }
        info!("Session reset requested.");

        let guard = InProgress(self.clone());
        Ok(tokio::spawn(async move {
            let coordinator = guard.0.clone();
            if !coordinator.delay.is_zero() {
                tokio::time::sleep(coordinator.delay).await;
            }
            let result = coordinator.run().await;
            if let Err(e) = &result {
                error!("{}", e);
            }
            drop(guard);
            result
        }))
    }

    async fn run(&self) -> SessionResult<()> {
        info!("Session reset: shutting down the current client.");
        self.manager.shutdown_client(true).await;

        info!("Session reset: wiping stored credentials.");
        self.credentials
            .wipe()
            .await
            .map_err(|e| SessionError::Reset(format!("credential wipe failed: {e}")))?;

        self.manager.reset_state().await;

        info!("Session reset: starting a fresh pairing cycle.");
        self.manager
            .start()
            .await
            .map_err(|e| SessionError::Reset(e.to_string()))?;

        info!("Session reset complete.");
        Ok(())
    }
}
