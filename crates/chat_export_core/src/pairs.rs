//! crates/chat_export_core/src/pairs.rs
//!
//! Attaches bounded per-chat context to cleaned messages and synthesizes
//! question/answer pairs from adjacent user/assistant exchanges.

use crate::domain::{timestamp_from_epoch, Chat, CleanedMessage, ConversationPair, Role, TrainingRecord};
use std::collections::VecDeque;

/// A FIFO of the last `2 * size` cleaned contents of one chat.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    size: usize,
    buffer: VecDeque<String>,
}

impl ContextWindow {
    /// A window of `size` entries. Zero is treated as one, since every
    /// record's context holds at least the record itself.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            buffer: VecDeque::with_capacity(size * 2 + 1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Appends `content` and returns the last `size` entries, oldest first,
    /// ending with `content` itself.
    pub fn push(&mut self, content: &str) -> Vec<String> {
        self.buffer.push_back(content.to_string());
        while self.buffer.len() > self.size * 2 {
            self.buffer.pop_front();
        }
        let skip = self.buffer.len().saturating_sub(self.size);
        self.buffer.iter().skip(skip).cloned().collect()
    }
}

/// Accumulates training records across chats in traversal order.
#[derive(Debug)]
pub struct TrainingSetBuilder {
    context_window: usize,
    records: Vec<TrainingRecord>,
}

impl TrainingSetBuilder {
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window: context_window.max(1),
            records: Vec::new(),
        }
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Appends one chat's cleaned messages, oldest first. Context never
    /// crosses from one chat into another.
    pub fn add_chat(&mut self, chat: &Chat, messages: impl IntoIterator<Item = CleanedMessage>) {
        let mut window = ContextWindow::new(self.context_window);
        for message in messages {
            let context_window = window.push(&message.content);
            let id = format!("msg_{}", self.records.len());
            self.records.push(TrainingRecord {
                id,
                role: message.role,
                content: message.content,
                chat_id: chat.id.clone(),
                chat_name: chat.name.clone(),
                is_group: chat.is_group,
                word_count: message.word_count,
                timestamp: timestamp_from_epoch(message.timestamp),
                context_window,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns all records and the pairs derived from them.
    pub fn finish(self) -> (Vec<TrainingRecord>, Vec<ConversationPair>) {
        let pairs = build_pairs(&self.records);
        (self.records, pairs)
    }
}

/// Scans adjacent records for user → assistant exchanges.
///
/// The answer must carry its question in its own context window, so a
/// question at the end of one chat never pairs with an answer opening the next.
pub fn build_pairs(records: &[TrainingRecord]) -> Vec<ConversationPair> {
    let mut pairs = Vec::new();
    for adjacent in records.windows(2) {
        let (question, answer) = (&adjacent[0], &adjacent[1]);
        if question.role != Role::User || answer.role != Role::Assistant {
            continue;
        }
        if question.chat_id != answer.chat_id || answer.context_window.len() < 2 {
            continue;
        }

        let mut context = question.context_window.clone();
        context.pop();

        pairs.push(ConversationPair {
            id: format!("pair_{}", pairs.len()),
            question: question.content.clone(),
            answer: answer.content.clone(),
            timestamp: question.timestamp,
            chat_name: question.chat_name.clone(),
            context,
        });
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: &str) -> Chat {
        Chat {
            id: id.to_string(),
            name: format!("Chat {id}"),
            is_group: false,
        }
    }

    fn msg(role: Role, content: &str, timestamp: i64) -> CleanedMessage {
        CleanedMessage {
            role,
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            timestamp,
        }
    }

    #[test]
    fn window_keeps_last_entries_including_current() {
        let mut window = ContextWindow::new(3);
        assert_eq!(window.push("a"), vec!["a"]);
        assert_eq!(window.push("b"), vec!["a", "b"]);
        assert_eq!(window.push("c"), vec!["a", "b", "c"]);
        assert_eq!(window.push("d"), vec!["b", "c", "d"]);
        for i in 0..20 {
            assert!(window.push(&i.to_string()).len() <= 3);
        }
    }

    #[test]
    fn window_size_is_the_requested_bound() {
        assert_eq!(ContextWindow::new(0).size(), 1);
        assert_eq!(ContextWindow::new(1_000).size(), 1_000);
    }

    #[test]
    fn window_of_one_holds_only_the_record() {
        let mut builder = TrainingSetBuilder::new(1);
        builder.add_chat(
            &chat("1"),
            vec![
                msg(Role::User, "a", 1),
                msg(Role::Assistant, "b", 2),
                msg(Role::User, "c", 3),
            ],
        );
        let (records, pairs) = builder.finish();

        for record in &records {
            assert_eq!(record.context_window, vec![record.content.clone()]);
        }
        // The answer's context cannot carry its question.
        assert!(pairs.is_empty());
    }

    #[test]
    fn single_pair_from_hi_hello_bye() {
        let mut builder = TrainingSetBuilder::new(3);
        builder.add_chat(
            &chat("1"),
            vec![
                msg(Role::User, "hi", 10),
                msg(Role::Assistant, "hello", 20),
                msg(Role::User, "bye", 30),
            ],
        );
        let (records, pairs) = builder.finish();

        assert_eq!(records.len(), 3);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "hi");
        assert_eq!(pairs[0].answer, "hello");
        assert!(pairs[0].context.is_empty());
        assert_eq!(pairs[0].timestamp, timestamp_from_epoch(10));
    }

    #[test]
    fn same_role_adjacency_never_pairs() {
        let mut builder = TrainingSetBuilder::new(5);
        builder.add_chat(
            &chat("1"),
            vec![
                msg(Role::User, "one", 1),
                msg(Role::User, "two", 2),
                msg(Role::Assistant, "three", 3),
                msg(Role::Assistant, "four", 4),
            ],
        );
        let (records, pairs) = builder.finish();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "two");
        assert_eq!(pairs[0].answer, "three");
        assert_eq!(pairs[0].context, vec!["one"]);
        for pair in &pairs {
            let q = records.iter().position(|r| r.content == pair.question).unwrap();
            assert_eq!(records[q].role, Role::User);
            assert_eq!(records[q + 1].role, Role::Assistant);
        }
    }

    #[test]
    fn context_is_causal_and_per_chat() {
        let mut builder = TrainingSetBuilder::new(2);
        builder.add_chat(&chat("a"), vec![msg(Role::User, "a1", 1), msg(Role::User, "a2", 2)]);
        builder.add_chat(&chat("b"), vec![msg(Role::Assistant, "b1", 3), msg(Role::User, "b2", 4)]);
        let (records, pairs) = builder.finish();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["msg_0", "msg_1", "msg_2", "msg_3"]);
        assert_eq!(records[1].context_window, vec!["a1", "a2"]);
        assert_eq!(records[2].context_window, vec!["b1"]);
        for record in &records {
            assert!(record.context_window.len() <= 2);
            assert_eq!(record.context_window.last(), Some(&record.content));
        }
        // "a2" (user) is followed by "b1" (assistant) but they belong to different chats.
        assert!(pairs.is_empty());
    }

    #[test]
    fn pair_context_excludes_question() {
        let mut builder = TrainingSetBuilder::new(3);
        builder.add_chat(
            &chat("1"),
            vec![
                msg(Role::Assistant, "welcome", 1),
                msg(Role::User, "price?", 2),
                msg(Role::User, "for two", 3),
                msg(Role::Assistant, "ten dollars", 4),
            ],
        );
        let (_, pairs) = builder.finish();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].id, "pair_0");
        assert_eq!(pairs[0].question, "for two");
        assert_eq!(pairs[0].context, vec!["welcome", "price?"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let builder = TrainingSetBuilder::new(5);
        assert!(builder.is_empty());
        let (records, pairs) = builder.finish();
        assert!(records.is_empty());
        assert!(pairs.is_empty());
    }
}
