//! Shared fakes for the integration tests: a scripted messaging client and
//! helpers to build a manager around it.

#![allow(dead_code)]

use api_lib::config::Config;
use api_lib::session::{ConnectionManager, RetryPolicy, SessionPolicy, SessionResetCoordinator};
use api_lib::web::state::AppState;
use api_lib::adapters::FsCredentialStore;
use async_trait::async_trait;
use chat_export_core::{
    Chat, ClientEvent, ClientFactory, EventSink, MessageKind, MessagingClient, PortError,
    PortResult, RawMessage, SessionState,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// What every client created by a `FakeFactory` does.
#[derive(Default)]
pub struct Script {
    /// Events pushed by each successful `initialize`.
    pub init_events: Vec<ClientEvent>,
    /// Number of `initialize` calls that fail before one succeeds.
    pub init_failures: usize,
    pub chats: Vec<Chat>,
    pub messages: HashMap<String, Vec<RawMessage>>,
    pub failing_chats: HashSet<String>,
    /// Holds `fetch_messages` of one chat until the test releases it.
    pub pause_on_fetch: Option<FetchPause>,
}

#[derive(Clone)]
pub struct FetchPause {
    pub chat_id: String,
    /// Signalled once the paused fetch has started.
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FetchPause {
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[derive(Default)]
pub struct Calls {
    pub created: AtomicUsize,
    pub initialize: AtomicUsize,
    pub list_chats: AtomicUsize,
    pub fetch_messages: AtomicUsize,
    pub logout: AtomicUsize,
    pub destroy: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Calls that touch chat data.
    pub fn data_calls(&self) -> usize {
        Self::get(&self.list_chats) + Self::get(&self.fetch_messages)
    }
}

pub struct FakeBackend {
    pub script: Mutex<Script>,
    pub calls: Calls,
    sinks: Mutex<Vec<EventSink>>,
}

impl FakeBackend {
    /// Pushes an event through the sink of the `index`-th created client.
    pub fn emit_to(&self, index: usize, event: ClientEvent) {
        let sinks = self.sinks.lock().unwrap();
        sinks[index].unbounded_send(event).unwrap();
    }

    /// Pushes an event through the most recently created client.
    pub fn emit(&self, event: ClientEvent) {
        let index = self.sinks.lock().unwrap().len() - 1;
        self.emit_to(index, event);
    }
}

pub struct FakeFactory {
    pub backend: Arc<FakeBackend>,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self {
            backend: Arc::new(FakeBackend {
                script: Mutex::new(script),
                calls: Calls::default(),
                sinks: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, events: EventSink) -> Arc<dyn MessagingClient> {
        self.backend.calls.created.fetch_add(1, Ordering::SeqCst);
        self.backend.sinks.lock().unwrap().push(events.clone());
        Arc::new(FakeClient {
            backend: self.backend.clone(),
            events,
            destroyed: AtomicBool::new(false),
        })
    }
}

pub struct FakeClient {
    backend: Arc<FakeBackend>,
    events: EventSink,
    destroyed: AtomicBool,
}

impl FakeClient {
    fn ensure_live(&self) -> PortResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("client destroyed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn initialize(&self) -> PortResult<()> {
        self.backend.calls.initialize.fetch_add(1, Ordering::SeqCst);
        let events = {
            let mut script = self.backend.script.lock().unwrap();
            if script.init_failures > 0 {
                script.init_failures -= 1;
                return Err(PortError::Unavailable("browser failed to launch".to_string()));
            }
            script.init_events.clone()
        };
        for event in events {
            let _ = self.events.unbounded_send(event);
        }
        Ok(())
    }

    async fn list_chats(&self) -> PortResult<Vec<Chat>> {
        self.backend.calls.list_chats.fetch_add(1, Ordering::SeqCst);
        self.ensure_live()?;
        Ok(self.backend.script.lock().unwrap().chats.clone())
    }

    async fn fetch_messages(&self, chat_id: &str, limit: usize) -> PortResult<Vec<RawMessage>> {
        self.backend.calls.fetch_messages.fetch_add(1, Ordering::SeqCst);
        self.ensure_live()?;
        let pause = self
            .backend
            .script
            .lock()
            .unwrap()
            .pause_on_fetch
            .clone()
            .filter(|pause| pause.chat_id == chat_id);
        if let Some(pause) = pause {
            pause.entered.notify_one();
            pause.release.notified().await;
        }

        let script = self.backend.script.lock().unwrap();
        if script.failing_chats.contains(chat_id) {
            return Err(PortError::Unavailable(format!("chat {chat_id} unreadable")));
        }
        let messages = script.messages.get(chat_id).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn logout(&self) -> PortResult<()> {
        self.backend.calls.logout.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> PortResult<()> {
        self.backend.calls.destroy.fetch_add(1, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

//=========================================================================================
// Builders
//=========================================================================================

pub fn chat(id: &str, name: &str, is_group: bool) -> Chat {
    Chat {
        id: id.to_string(),
        name: name.to_string(),
        is_group,
    }
}

pub fn text(body: &str, from_me: bool, timestamp: i64) -> RawMessage {
    RawMessage {
        body: body.to_string(),
        from_me,
        timestamp,
        kind: MessageKind::Chat,
    }
}

/// The events of a client that pairs and connects straight away.
pub fn pairing_then_ready() -> Vec<ClientEvent> {
    vec![
        ClientEvent::PairingToken("pair-token-1".to_string()),
        ClientEvent::Authenticated,
        ClientEvent::Ready,
    ]
}

pub fn test_policy() -> SessionPolicy {
    SessionPolicy {
        init_retry: RetryPolicy::exponential(3, Duration::from_millis(1)),
        restart_on_auth_failure: true,
        max_auth_restarts: 3,
    }
}

/// A manager wired to a fake client and a credential directory in a temp dir.
pub struct Harness {
    pub manager: Arc<ConnectionManager>,
    pub reset: Arc<SessionResetCoordinator>,
    pub backend: Arc<FakeBackend>,
    pub auth_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub fn new(script: Script, policy: SessionPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = dir.path().join("auth");
        std::fs::create_dir_all(auth_path.join("session")).unwrap();
        std::fs::write(auth_path.join("session").join("creds.json"), b"{}").unwrap();

        let factory = FakeFactory::new(script);
        let backend = factory.backend.clone();
        let credentials = Arc::new(FsCredentialStore::new(auth_path.clone()));
        let manager = ConnectionManager::new(Arc::new(factory), credentials.clone(), policy);
        let reset = SessionResetCoordinator::new(manager.clone(), credentials, Duration::ZERO);
        Self {
            manager,
            reset,
            backend,
            auth_path,
            _dir: dir,
        }
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(Config::default()),
            sessions: self.manager.clone(),
            reset: self.reset.clone(),
        })
    }

    pub fn credentials_exist(&self) -> bool {
        self.auth_path.exists()
    }
}

/// Polls until the manager reaches `state`, panicking after two seconds.
pub async fn wait_for_state(manager: &ConnectionManager, state: SessionState) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if manager.state().await == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if reached.is_err() {
        panic!(
            "session never reached {} (stuck in {})",
            state,
            manager.state().await
        );
    }
}

/// Polls until `check` holds, panicking after two seconds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

/// Polls until the stored pairing code carries `payload`.
pub async fn wait_for_pairing(manager: &ConnectionManager, payload: &str) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if manager
                .pairing_code()
                .await
                .is_some_and(|code| code.payload == payload)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "pairing code never became {payload}");
}
