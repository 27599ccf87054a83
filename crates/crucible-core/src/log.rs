//! Append-only interaction log kept per task.

use serde::{Deserialize, Serialize};

use crate::task::EvaluationVerdict;
use crate::types::{ChatMessage, Role};

/// One entry of a task's interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    /// A conversation turn exchanged with the worker model.
    LlmMessage {
        /// Author of the turn.
        role: Role,
        /// Text of the turn.
        content: String,
    },
    /// A verdict produced by the evaluator.
    Evaluation {
        /// Model that produced the verdict.
        evaluator_model: String,
        /// The verdict itself.
        verdict: EvaluationVerdict,
    },
    /// A note from the orchestrator itself, usually a failure.
    SystemMessage {
        /// Note text.
        text: String,
    },
}

/// Ordered, append-only record of everything that happened in one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionLog {
    entries: Vec<LogEntry>,
}

impl InteractionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a conversation turn.
    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(LogEntry::LlmMessage {
            role,
            content: content.into(),
        });
    }

    /// Appends an evaluator verdict.
    pub fn push_evaluation(&mut self, evaluator_model: impl Into<String>, verdict: EvaluationVerdict) {
        self.entries.push(LogEntry::Evaluation {
            evaluator_model: evaluator_model.into(),
            verdict,
        });
    }

    /// Appends an orchestrator note.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.entries.push(LogEntry::SystemMessage { text: text.into() });
    }

    /// Rebuilds the worker conversation: every user/assistant turn, in order.
    pub fn conversation_history(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::LlmMessage { role, content }
                    if matches!(role, Role::User | Role::Assistant) =>
                {
                    Some(ChatMessage::new(*role, content.clone()))
                }
                LogEntry::LlmMessage { .. }
                | LogEntry::Evaluation { .. }
                | LogEntry::SystemMessage { .. } => None,
            })
            .collect()
    }

    /// All entries in order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The last `count` entries (fewer if the log is shorter).
    pub fn tail(&self, count: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of turns authored by `role`.
    pub fn count_messages(&self, role: Role) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, LogEntry::LlmMessage { role: logged, .. } if *logged == role))
            .count()
    }

    /// Number of evaluation entries.
    pub fn count_evaluations(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, LogEntry::Evaluation { .. }))
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test code is allowed to unwrap")]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_history_skips_non_messages() {
        let mut log = InteractionLog::new();
        log.push_message(Role::User, "question");
        log.push_message(Role::Assistant, "answer");
        log.push_evaluation("judge", EvaluationVerdict::error());
        log.push_system("note");
        log.push_message(Role::User, "follow up");

        let history = log.conversation_history();
        assert_eq!(
            history,
            vec![
                ChatMessage::user("question"),
                ChatMessage::assistant("answer"),
                ChatMessage::user("follow up"),
            ]
        );
    }

    #[test]
    fn test_conversation_history_excludes_system_role_turns() {
        let mut log = InteractionLog::new();
        log.push_message(Role::System, "framing");
        log.push_message(Role::User, "question");
        assert_eq!(log.conversation_history(), vec![ChatMessage::user("question")]);
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut log = InteractionLog::new();
        log.push_system("one");
        log.push_system("two");
        assert_eq!(log.tail(3).len(), 2);
        assert_eq!(log.tail(1), &[LogEntry::SystemMessage { text: "two".to_owned() }]);
        assert!(InteractionLog::new().tail(3).is_empty());
    }

    #[test]
    fn test_entries_serialize_with_type_tag() {
        let mut log = InteractionLog::new();
        log.push_system("worker failed");
        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(json, r#"[{"type":"system_message","text":"worker failed"}]"#);
    }

    #[test]
    fn test_counts() {
        let mut log = InteractionLog::new();
        log.push_message(Role::User, "q");
        log.push_message(Role::Assistant, "a");
        log.push_evaluation("judge", EvaluationVerdict::approved("fine", None));
        assert_eq!(log.count_messages(Role::Assistant), 1);
        assert_eq!(log.count_messages(Role::User), 1);
        assert_eq!(log.count_evaluations(), 1);
        assert_eq!(log.len(), 3);
    }
}
