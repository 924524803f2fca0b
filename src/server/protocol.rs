//! JSON messages exchanged over a session's WebSocket.
//!
//! Upstream (client to server) carries control messages as text frames and
//! audio as binary frames in the wire codec. Downstream (server to client)
//! is a single tagged event stream: `info`, `partial`, `final`, `error`.

use crate::error::{InterscribeError, Result};
use crate::transcript::{EventKind, TranscriptEvent};
use serde::{Deserialize, Serialize};

/// Control messages a client may send as WebSocket text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Start server-side capture of the loopback device (sys source only).
    StartSystemAudio,
    /// Stop server-side loopback capture.
    StopSystemAudio,
    /// Tear down the whole session, all sources included.
    Stop,
}

/// Downstream transcript events in their serialized shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMessage {
    Info {
        seq: u64,
        text: String,
    },
    Partial {
        seq: u64,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    Final {
        seq: u64,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    Error {
        seq: u64,
        text: String,
    },
}

impl From<&TranscriptEvent> for EventMessage {
    fn from(event: &TranscriptEvent) -> Self {
        match event.kind {
            EventKind::Info => EventMessage::Info {
                seq: event.seq,
                text: event.text.clone(),
            },
            EventKind::Partial => EventMessage::Partial {
                seq: event.seq,
                text: event.text.clone(),
                confidence: event.confidence,
            },
            EventKind::Final => EventMessage::Final {
                seq: event.seq,
                text: event.text.clone(),
                confidence: event.confidence,
            },
            EventKind::Error => EventMessage::Error {
                seq: event.seq,
                text: event.text.clone(),
            },
        }
    }
}

/// Parses a control message from a text frame.
pub fn parse_control(text: &str) -> Result<ControlMessage> {
    serde_json::from_str(text).map_err(|e| InterscribeError::MalformedControl {
        message: format!("unrecognized control message: {}", e),
    })
}
