//! services/api/src/adapters/bridge.rs
//!
//! This module contains the adapter for the messaging protocol bridge, an
//! external process that owns device pairing and the message transport.
//! It implements the `MessagingClient` and `ClientFactory` ports from the core crate.
//!
//! Commands are plain JSON over HTTP; lifecycle events arrive on a WebSocket
//! stream at `/events` that is opened before the bridge is asked to initialize.

use async_trait::async_trait;
use chat_export_core::{
    Chat, ClientEvent, ClientFactory, EventSink, MessageKind, MessagingClient, PortError,
    PortResult, RawMessage,
};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize, Debug)]
struct WireChat {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_group: bool,
}

impl WireChat {
    fn into_domain(self) -> Chat {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        Chat {
            id: self.id,
            name,
            is_group: self.is_group,
        }
    }
}

#[derive(Deserialize, Debug)]
struct WireMessage {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    from_me: bool,
    #[serde(default)]
    timestamp: i64,
    #[serde(rename = "type", default)]
    kind: String,
}

impl WireMessage {
    fn into_domain(self) -> RawMessage {
        RawMessage {
            body: self.body.unwrap_or_default(),
            from_me: self.from_me,
            timestamp: self.timestamp,
            kind: MessageKind::from_tag(&self.kind),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WireEvent {
    Qr {
        payload: String,
    },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<WireEvent> for ClientEvent {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::Qr { payload } => Self::PairingToken(payload),
            WireEvent::Authenticated => Self::Authenticated,
            WireEvent::AuthFailure { reason } => Self::AuthFailure(reason),
            WireEvent::Ready => Self::Ready,
            WireEvent::Disconnected { reason } => Self::Disconnected(reason),
        }
    }
}

//=========================================================================================
// The Factory
//=========================================================================================

/// Creates `BridgeClient` handles sharing one HTTP connection pool.
#[derive(Clone)]
pub struct BridgeClientFactory {
    http: reqwest::Client,
    base_url: Url,
}

impl BridgeClientFactory {
    pub fn new(base_url: Url) -> PortResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self { http, base_url })
    }
}

impl ClientFactory for BridgeClientFactory {
    fn create(&self, events: EventSink) -> Arc<dyn MessagingClient> {
        Arc::new(BridgeClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            events,
            shutdown: CancellationToken::new(),
            destroyed: AtomicBool::new(false),
            reader: Mutex::new(None),
        })
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// One live connection to the bridge.
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    events: EventSink,
    shutdown: CancellationToken,
    destroyed: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    fn ensure_live(&self) -> PortResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("client was destroyed".to_string()));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> PortResult<Url> {
        endpoint(&self.base_url, segments)
    }

    async fn post(&self, segments: &[&str]) -> PortResult<()> {
        let url = self.endpoint(segments)?;
        let response = self.http.post(url).send().await.map_err(map_transport_error)?;
        check_status(response).await.map(|_| ())
    }

    async fn spawn_event_reader(&self) -> PortResult<JoinHandle<()>> {
        let mut url = self.endpoint(&["events"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| PortError::Unexpected(format!("cannot derive event URL from {}", url)))?;

        let (mut stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| PortError::Unavailable(format!("event stream: {e}")))?;
        info!("Connected to bridge event stream at {}.", url);

        let sink = self.events.clone();
        let shutdown = self.shutdown.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Event stream closed by destroy().");
                        return;
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<WireEvent>(&text) {
                            Ok(event) => {
                                if sink.unbounded_send(event.into()).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Ignoring unrecognized bridge event {:?}: {}", text, e),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Bridge event stream failed: {}", e);
                            break;
                        }
                    }
                }
            }
            // The bridge went away without being asked to.
            error!("Bridge event stream ended unexpectedly; reporting the client as disconnected.");
            let _ = sink.unbounded_send(ClientEvent::Disconnected("event stream closed".to_string()));
        }))
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

//=========================================================================================
// `MessagingClient` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn initialize(&self) -> PortResult<()> {
        self.ensure_live()?;
        {
            let mut reader = self.reader.lock().await;
            if reader.as_ref().map_or(true, |handle| handle.is_finished()) {
                *reader = Some(self.spawn_event_reader().await?);
            }
        }
        self.post(&["initialize"]).await
    }

    async fn list_chats(&self) -> PortResult<Vec<Chat>> {
        self.ensure_live()?;
        let url = self.endpoint(&["chats"])?;
        let response = self.http.get(url).send().await.map_err(map_transport_error)?;
        let chats: Vec<WireChat> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed chat list: {e}")))?;
        Ok(chats.into_iter().map(WireChat::into_domain).collect())
    }

    async fn fetch_messages(&self, chat_id: &str, limit: usize) -> PortResult<Vec<RawMessage>> {
        self.ensure_live()?;
        let url = self.endpoint(&["chats", chat_id, "messages"])?;
        let response = self
            .http
            .get(url)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(map_transport_error)?;
        let messages: Vec<WireMessage> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed message list: {e}")))?;
        Ok(messages.into_iter().map(WireMessage::into_domain).collect())
    }

    async fn logout(&self) -> PortResult<()> {
        self.ensure_live()?;
        self.post(&["logout"]).await
    }

    async fn destroy(&self) -> PortResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.post(&["destroy"]).await
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn endpoint(base: &Url, segments: &[&str]) -> PortResult<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| PortError::Unexpected(format!("bridge URL {} cannot be a base", base)))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

fn map_transport_error(e: reqwest::Error) -> PortError {
    if e.is_connect() || e.is_timeout() {
        PortError::Unavailable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> PortResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(detail),
        StatusCode::CONFLICT | StatusCode::GONE | StatusCode::SERVICE_UNAVAILABLE => {
            PortError::Unavailable(format!("{status}: {detail}"))
        }
        _ => PortError::Unexpected(format!("{status}: {detail}")),
    })
}
