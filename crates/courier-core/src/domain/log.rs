//! Log entries - `job:{id}:events` に積まれる行
//!
//! The Log is append-only. Each stored line is either one of our own entries
//! (`{"type":"error"|"system"|"text","content":...}`) or a line of the agent's
//! stream-json output, stored verbatim.

use serde::{Deserialize, Serialize};

/// An entry written by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase", deny_unknown_fields)]
pub enum LogEntry {
    /// A line the agent wrote to stderr.
    Error(String),
    /// Engine notices: cancellation, forwarded input, timeouts.
    System(String),
    /// Plain text that is not structured output.
    Text(String),
}

impl LogEntry {
    pub fn error(content: impl Into<String>) -> Self {
        LogEntry::Error(content.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        LogEntry::System(content.into())
    }

    pub fn content(&self) -> &str {
        match self {
            LogEntry::Error(c) | LogEntry::System(c) | LogEntry::Text(c) => c,
        }
    }

    /// Serialized form, one line.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            // LogEntry is a string-only enum; serialization cannot fail.
            Err(_) => self.content().to_string(),
        }
    }
}

/// A stored log line, decoded for readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogItem {
    Entry(LogEntry),
    /// Structured agent output, passed through untouched.
    Stream(serde_json::Value),
}

impl LogItem {
    /// Decode one stored line.
    ///
    /// Lines that are not JSON at all become `text` entries.
    pub fn parse(line: &str) -> Self {
        if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
            return LogItem::Entry(entry);
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => LogItem::Stream(value),
            Err(_) => LogItem::Entry(LogEntry::Text(line.to_string())),
        }
    }
}
