//! Control record and user input messages.

use std::collections::HashMap;

/// Marker that asks the engine to interrupt the agent before forwarding
/// the rest of the message.
pub const INTERRUPT_MARKER: &str = "[interrupt]";

/// Per-job control flags (`job:{id}:control`).
///
/// Set by an external cancel request, never cleared by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlRecord {
    pub cancel: bool,
}

impl ControlRecord {
    pub const CANCEL_FIELD: &'static str = "cancel";

    pub fn from_fields(map: &HashMap<String, String>) -> Self {
        Self {
            cancel: map
                .get(Self::CANCEL_FIELD)
                .is_some_and(|v| v.trim() == "true"),
        }
    }
}

/// One queued user message (`job:{id}:input`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMessage {
    pub text: String,
    /// Send an interrupt to the agent before the text.
    pub interrupt: bool,
}

impl InputMessage {
    pub fn new(text: impl Into<String>, interrupt: bool) -> Self {
        Self {
            text: text.into(),
            interrupt,
        }
    }

    /// Decode a raw queue item.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(INTERRUPT_MARKER) {
            Some(rest) => Self::new(rest.trim_start(), true),
            None => Self::new(raw, false),
        }
    }

    /// Encode for the input queue.
    pub fn encode(&self) -> String {
        if self.interrupt {
            format!("{INTERRUPT_MARKER} {}", self.text)
        } else {
            self.text.clone()
        }
    }

    /// What the agent receives on stdin.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(b'\n');
        bytes
    }

    /// Audit line recorded in the Log after forwarding.
    pub fn audit_line(&self) -> String {
        if self.interrupt {
            format!("> User interrupt: {}", self.text)
        } else {
            format!("> User input: {}", self.text)
        }
    }
}
