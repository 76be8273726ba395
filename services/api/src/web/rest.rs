//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::config::Config;
use crate::web::export_task::{export_process, ExportOptions, ExportReport};
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chat_export_core::{ConversationPair, SessionState, TrainingRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        status_handler,
        qr_handler,
        list_chats_handler,
        export_handler,
        reset_session_handler,
    ),
    components(
        schemas(
            StatusResponse, QrResponse, ChatSummary, ChatsResponse, TrainingRecordBody,
            ConversationPairBody, ExportSettings, ExportMetadata, ExportResponse,
            ResetResponse, ErrorBody
        )
    ),
    tags(
        (name = "Chat Export API", description = "Messaging session control and training data export.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub connected: bool,
    pub client_exists: bool,
    pub state: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct QrResponse {
    pub state: String,
    /// The raw pairing token, present only while waiting for a scan.
    pub qr: Option<String>,
    /// The token rendered as a `data:` URL image.
    pub qr_image: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    pub is_group: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ChatsResponse {
    pub total: usize,
    pub chats: Vec<ChatSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct TrainingRecordBody {
    pub id: String,
    pub role: String,
    pub content: String,
    pub chat_id: String,
    pub chat_name: String,
    pub is_group: bool,
    pub word_count: usize,
    pub timestamp: DateTime<Utc>,
    pub context_window: Vec<String>,
}

impl From<TrainingRecord> for TrainingRecordBody {
    fn from(record: TrainingRecord) -> Self {
        Self {
            id: record.id,
            role: record.role.to_string(),
            content: record.content,
            chat_id: record.chat_id,
            chat_name: record.chat_name,
            is_group: record.is_group,
            word_count: record.word_count,
            timestamp: record.timestamp,
            context_window: record.context_window,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConversationPairBody {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub chat_name: String,
    pub context: Vec<String>,
}

impl From<ConversationPair> for ConversationPairBody {
    fn from(pair: ConversationPair) -> Self {
        Self {
            id: pair.id,
            question: pair.question,
            answer: pair.answer,
            timestamp: pair.timestamp,
            chat_name: pair.chat_name,
            context: pair.context,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ExportSettings {
    pub limit: usize,
    pub min_words: usize,
    pub include_groups: bool,
    pub context_window: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ExportMetadata {
    pub export_id: Uuid,
    pub client_name: String,
    pub extraction_date: DateTime<Utc>,
    pub total_messages: usize,
    pub total_pairs: usize,
    pub chats_total: usize,
    pub chats_processed: usize,
    pub chats_skipped: usize,
    pub groups_excluded: usize,
    /// Discarded message counts keyed by reason.
    pub discarded: BTreeMap<String, usize>,
    pub settings: ExportSettings,
}

#[derive(Serialize, ToSchema)]
pub struct ExportResponse {
    pub metadata: ExportMetadata,
    pub training_data: Vec<TrainingRecordBody>,
    pub conversation_pairs: Vec<ConversationPairBody>,
}

impl ExportResponse {
    fn from_report(report: ExportReport, options: ExportOptions) -> Self {
        let metadata = ExportMetadata {
            export_id: Uuid::new_v4(),
            client_name: options.client_name,
            extraction_date: Utc::now(),
            total_messages: report.records.len(),
            total_pairs: report.pairs.len(),
            chats_total: report.chats_total,
            chats_processed: report.chats_processed,
            chats_skipped: report.chats_skipped,
            groups_excluded: report.groups_excluded,
            discarded: report
                .discarded
                .into_iter()
                .map(|(reason, count)| (reason.to_string(), count))
                .collect(),
            settings: ExportSettings {
                limit: options.limit,
                min_words: options.min_words,
                include_groups: options.include_groups,
                context_window: options.context_window,
            },
        };
        Self {
            metadata,
            training_data: report.records.into_iter().map(Into::into).collect(),
            conversation_pairs: report.pairs.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl ErrorBody {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

type ApiFailure = (StatusCode, Json<ErrorBody>);

fn not_ready() -> ApiFailure {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody::new(
            "Messaging session not connected. Scan the QR code first.",
        )),
    )
}

/// Query parameters of the training export. Values are parsed leniently:
/// anything missing, non-numeric or zero falls back to its default.
#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// Label stored in the export metadata.
    pub client_name: Option<String>,
    /// Messages fetched per chat.
    pub limit: Option<String>,
    /// Minimum words a message needs to be kept.
    pub min_words: Option<String>,
    /// `true` to include group chats.
    pub include_groups: Option<String>,
    /// Messages of context attached to each record.
    pub context_window: Option<String>,
}

impl ExportQuery {
    pub fn into_options(self, config: &Config) -> ExportOptions {
        ExportOptions {
            client_name: self
                .client_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            limit: positive_or(self.limit.as_deref(), config.export_default_limit),
            min_words: positive_or(self.min_words.as_deref(), 1),
            include_groups: self.include_groups.as_deref() == Some("true"),
            context_window: positive_or(
                self.context_window.as_deref(),
                config.export_default_context_window,
            ),
        }
    }
}

fn positive_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn status_message(state: SessionState) -> &'static str {
    match state {
        SessionState::Ready => "Connected",
        SessionState::AwaitingScan => "Waiting for QR scan",
        SessionState::Authenticating => "Authenticating",
        SessionState::Uninitialized => "Starting messaging client",
        SessionState::Disconnected => "Disconnected; reset the session to pair again",
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Report whether the messaging session is connected.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Current session status", body = StatusResponse)
    )
)]
pub async fn status_handler(State(app_state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = app_state.sessions.status().await;
    Json(StatusResponse {
        connected: status.connected,
        client_exists: status.has_handle,
        state: status.state.to_string(),
        message: status_message(status.state).to_string(),
    })
}

/// The pairing QR code, while one is waiting to be scanned.
#[utoipa::path(
    get,
    path = "/qr",
    responses(
        (status = 200, description = "Current pairing code, if any", body = QrResponse)
    )
)]
pub async fn qr_handler(State(app_state): State<Arc<AppState>>) -> Json<QrResponse> {
    let state = app_state.sessions.state().await;
    let pairing = app_state.sessions.pairing_code().await;
    let (qr, qr_image) = match pairing {
        Some(code) => (Some(code.payload), code.image),
        None => (None, None),
    };
    Json(QrResponse {
        state: state.to_string(),
        qr,
        qr_image,
    })
}

/// List the chats of the connected account.
#[utoipa::path(
    get,
    path = "/chats",
    responses(
        (status = 200, description = "All chats", body = ChatsResponse),
        (status = 500, description = "The messaging client failed", body = ErrorBody),
        (status = 503, description = "Session not ready", body = ErrorBody)
    )
)]
pub async fn list_chats_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ChatsResponse>, ApiFailure> {
    let client = app_state
        .sessions
        .require_ready()
        .await
        .map_err(|_| not_ready())?;

    let chats = client.list_chats().await.map_err(|e| {
        error!("Failed to list chats: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(e.to_string())))
    })?;

    Ok(Json(ChatsResponse {
        total: chats.len(),
        chats: chats
            .into_iter()
            .map(|chat| ChatSummary {
                id: chat.id,
                name: chat.name,
                is_group: chat.is_group,
            })
            .collect(),
    }))
}

/// Export cleaned chat history as training records and conversation pairs.
#[utoipa::path(
    get,
    path = "/export/clean-for-training",
    params(ExportQuery),
    responses(
        (status = 200, description = "Training data", body = ExportResponse),
        (status = 500, description = "The export failed", body = ErrorBody),
        (status = 503, description = "Session not ready", body = ErrorBody)
    )
)]
pub async fn export_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ExportResponse>, ApiFailure> {
    let client = app_state
        .sessions
        .require_ready()
        .await
        .map_err(|_| not_ready())?;

    let options = query.into_options(&app_state.config);
    let report = export_process(client.as_ref(), &options).await.map_err(|e| {
        error!("Training export failed: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(e.to_string())))
    })?;

    Ok(Json(ExportResponse::from_report(report, options)))
}

/// Log out, wipe the stored credentials and start a new pairing cycle.
///
/// The reset runs in the background; the response only confirms it was accepted.
#[utoipa::path(
    post,
    path = "/reset-session",
    responses(
        (status = 200, description = "Reset accepted", body = ResetResponse),
        (status = 409, description = "A reset is already running", body = ErrorBody)
    )
)]
pub async fn reset_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ResetResponse>, ApiFailure> {
    match app_state.reset.request_reset() {
        Ok(_) => {
            info!("Reset accepted.");
            Ok(Json(ResetResponse {
                success: true,
                message: "Resetting session...".to_string(),
            }))
        }
        Err(e) => Err((StatusCode::CONFLICT, Json(ErrorBody::new(e.to_string())))),
    }
}
