//! # Wire Events
//!
//! Structured messages delivered to call participants over the WebSocket,
//! modeled as a tagged union discriminated by a `type` field. Each variant
//! carries a fixed set of required fields; optional fields are omitted from
//! the wire when absent.

use actix::Message;
use serde::{Deserialize, Serialize};

/// Outbound structured message for one call participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// A recognized-and-translated utterance.
    Transcription {
        /// Original transcribed text
        source: String,
        /// Translated text
        translated: String,
        /// Language code of the speaking participant
        sender: String,
    },

    /// A non-fatal processing failure surfaced to the call.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// A unicast status update (e.g. on join).
    Status {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

/// Frame handed to a connection actor for delivery to its peer.
///
/// The connection actor owns the actual socket; everything else in the
/// process addresses it only through `Recipient<OutboundFrame>`.
#[derive(Debug, Clone, Message, PartialEq)]
#[rtype(result = "()")]
pub enum OutboundFrame {
    /// Relayed peer audio, forwarded verbatim as a binary frame.
    Audio(Vec<u8>),
    /// Structured event, serialized to a text frame.
    Event(ServerEvent),
}
