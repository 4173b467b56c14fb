//! Wire frames for the WebSocket transport
//!
//! Every frame is a JSON text message tagged by `type`. The client opens each
//! connection with a handshake carrying its credential, then both sides
//! exchange events; requests set `ack` and the host answers with an `ack`
//! frame carrying the same id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Credential block sent in the handshake
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HandshakeAuth {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Messages exchanged over the socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame on every connection
    Handshake { auth: HandshakeAuth },

    /// A named event with its payload
    Event {
        event: String,
        #[serde(default)]
        data: Value,
        /// Set when the sender expects an acknowledgement
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },

    /// Answer to an event that carried an ack id
    Ack {
        id: u64,
        #[serde(default)]
        data: Value,
    },
}

impl Frame {
    pub fn handshake(api_key: Option<String>) -> Self {
        Self::Handshake {
            auth: HandshakeAuth { api_key },
        }
    }

    pub fn event(event: impl Into<String>, data: Value, ack: Option<u64>) -> Self {
        Self::Event {
            event: event.into(),
            data,
            ack,
        }
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}
