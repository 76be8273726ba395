//! crates/chat_export_core/src/filter.rs
//!
//! Turns raw chat messages into cleaned text suitable for training, or
//! discards them. Everything here is pure: malformed input is discarded,
//! never reported as an error.

use crate::domain::{CleanedMessage, MessageKind, RawMessage, Role};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Replacement for every URL found in a message body.
pub const URL_PLACEHOLDER: &str = "[URL]";

/// Group and security notices that leak into chat history as ordinary text.
pub const DEFAULT_SYSTEM_NOTICES: &[&str] = &[
    "joined using this group's invite link",
    "left the group",
    "changed the subject",
    "changed this group's icon",
    "changed the group description",
    "messages and calls are end-to-end encrypted",
    "se unió usando el enlace de invitación",
    "salió del grupo",
    "cambió el asunto",
    "cambió la descripción del grupo",
    "los mensajes y las llamadas están cifrados de extremo a extremo",
];

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("URL pattern is a valid regex")
});

/// Why a message did not make it into the training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscardReason {
    UnsupportedKind,
    EmptyBody,
    TooFewWords,
    SystemNotice,
    EmptyAfterCleaning,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedKind => "unsupported_kind",
            Self::EmptyBody => "empty_body",
            Self::TooFewWords => "too_few_words",
            Self::SystemNotice => "system_notice",
            Self::EmptyAfterCleaning => "empty_after_cleaning",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Kept(CleanedMessage),
    Discarded(DiscardReason),
}

/// The message filter with its configured thresholds.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    min_words: usize,
    /// Lowercased notice phrases.
    system_notices: Vec<String>,
}

impl MessageFilter {
    /// Creates a filter using the built-in system notice list.
    pub fn new(min_words: usize) -> Self {
        Self::with_notices(min_words, DEFAULT_SYSTEM_NOTICES.iter().copied())
    }

    pub fn with_notices<'a>(min_words: usize, notices: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            min_words,
            system_notices: notices.into_iter().map(str::to_lowercase).collect(),
        }
    }

    pub fn min_words(&self) -> usize {
        self.min_words
    }

    /// Applies the discard rules in order, then cleans the survivor.
    pub fn clean(&self, message: &RawMessage) -> FilterOutcome {
        if !matches!(message.kind, MessageKind::Chat | MessageKind::Text) {
            return FilterOutcome::Discarded(DiscardReason::UnsupportedKind);
        }

        let body = message.body.as_str();
        if body.trim().is_empty() {
            return FilterOutcome::Discarded(DiscardReason::EmptyBody);
        }

        let word_count = count_words(body);
        if word_count < self.min_words {
            return FilterOutcome::Discarded(DiscardReason::TooFewWords);
        }

        if self.is_system_notice(body) {
            return FilterOutcome::Discarded(DiscardReason::SystemNotice);
        }

        let content = clean_text(body);
        if content.is_empty() {
            return FilterOutcome::Discarded(DiscardReason::EmptyAfterCleaning);
        }

        FilterOutcome::Kept(CleanedMessage {
            role: Role::from_sender(message.from_me),
            content,
            word_count,
            timestamp: message.timestamp,
        })
    }

    fn is_system_notice(&self, body: &str) -> bool {
        let lowered = body.to_lowercase();
        self.system_notices
            .iter()
            .any(|phrase| lowered.contains(phrase.as_str()))
    }
}

/// Number of whitespace-separated tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Replaces URLs with a placeholder, strips emoji and trims the result.
pub fn clean_text(text: &str) -> String {
    let without_urls = URL_PATTERN.replace_all(text, URL_PLACEHOLDER);
    let without_emoji: String = without_urls.chars().filter(|c| !is_emoji(*c)).collect();
    without_emoji.trim().to_string()
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F1E6..=0x1F1FF   // regional indicators (flags)
            | 0x1F300..=0x1F9FF // pictographs, emoticons, transport, geometric shapes
            | 0x1FA70..=0x1FAFF // symbols and pictographs extended-A
            | 0x2600..=0x26FF   // misc symbols
            | 0x2700..=0x27BF   // dingbats
            | 0x200D            // zero width joiner
            | 0x20E3            // combining keycap
            | 0xFE0F            // variation selector
            | 0xE0020..=0xE007F // tag sequences
    )
}
