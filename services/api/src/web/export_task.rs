//! services/api/src/web/export_task.rs
//!
//! Walks the chat history of a ready client and turns it into training
//! records and conversation pairs.

use crate::session::SessionError;
use chat_export_core::{
    ConversationPair, DiscardReason, FilterOutcome, MessageFilter, MessagingClient, PortResult,
    TrainingRecord, TrainingSetBuilder,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Effective settings of one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub client_name: String,
    /// Messages fetched per chat.
    pub limit: usize,
    pub min_words: usize,
    pub include_groups: bool,
    pub context_window: usize,
}

/// Everything one export produced.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub records: Vec<TrainingRecord>,
    pub pairs: Vec<ConversationPair>,
    pub chats_total: usize,
    pub chats_processed: usize,
    pub chats_skipped: usize,
    pub groups_excluded: usize,
    pub discarded: BTreeMap<DiscardReason, usize>,
}

/// Runs the export against `client`.
///
/// Only listing the chats can fail the whole export; a chat whose history
/// cannot be fetched is logged and skipped.
pub async fn export_process(
    client: &dyn MessagingClient,
    options: &ExportOptions,
) -> PortResult<ExportReport> {
    info!("Exporting chats for training ({}).", options.client_name);
    let chats = client.list_chats().await?;
    info!("Total chats: {}", chats.len());

    let filter = MessageFilter::new(options.min_words);
    let mut builder = TrainingSetBuilder::new(options.context_window);
    let mut report = ExportReport {
        chats_total: chats.len(),
        ..ExportReport::default()
    };

    for chat in &chats {
        if chat.is_group && !options.include_groups {
            report.groups_excluded += 1;
            continue;
        }

        let mut messages = match client.fetch_messages(&chat.id, options.limit).await {
            Ok(messages) => messages,
            Err(source) => {
                let err = SessionError::ChatFetch {
                    chat_id: chat.id.clone(),
                    source,
                };
                warn!("{}; skipping chat '{}'.", err, chat.name);
                report.chats_skipped += 1;
                continue;
            }
        };
        messages.sort_by_key(|m| m.timestamp);
        debug!("Chat '{}': {} messages fetched.", chat.name, messages.len());

        let mut cleaned = Vec::with_capacity(messages.len());
        for message in &messages {
            match filter.clean(message) {
                FilterOutcome::Kept(message) => cleaned.push(message),
                FilterOutcome::Discarded(reason) => {
                    *report.discarded.entry(reason).or_insert(0) += 1;
                }
            }
        }
        builder.add_chat(chat, cleaned);
        report.chats_processed += 1;
    }

    let (records, pairs) = builder.finish();
    info!(
        "Exported {} messages and {} conversation pairs from {} chats ({} skipped).",
        records.len(),
        pairs.len(),
        report.chats_processed,
        report.chats_skipped
    );
    report.records = records;
    report.pairs = pairs;
    Ok(report)
}
