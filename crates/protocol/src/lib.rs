//! Wire types shared by the live message channel and its consumers.
//!
//! Every frame on the channel is a UTF-8 JSON object carrying at least a
//! `type` discriminator. Everything else is message-specific: the backend
//! nests payloads under `data`, older servers flatten them to the top level.

pub mod progress;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

pub use progress::ParsingProgress;

/// Message type discriminators sent by the backend.
pub mod kinds {
    pub const PARSING_PROGRESS: &str = "parsing_progress";
    pub const QUERY_STREAM: &str = "query_stream";
    pub const ERROR: &str = "error";
    pub const INFO: &str = "info";
    /// Reply the backend sends for every text frame a client writes.
    pub const ECHO: &str = "echo";
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A decoded channel message: `{ "type": ..., "data"?: ..., ...extra }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any other top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Decode a text frame. Anything other than a JSON object with a string
    /// `type` is rejected.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        serde_json::from_str(frame).map_err(FrameError::Decode)
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Encode)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Look up a field at the top level first, then inside `data` when it
    /// is an object.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name).or_else(|| {
            self.data
                .as_ref()
                .and_then(Value::as_object)
                .and_then(|data| data.get(name))
        })
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }
}

/// Something that can be written to the channel: either an already
/// serialized frame or a structured message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Message(ChannelMessage),
}

impl OutboundFrame {
    pub fn into_wire(self) -> Result<String, FrameError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Message(message) => message.encode(),
        }
    }
}

impl From<String> for OutboundFrame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundFrame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<ChannelMessage> for OutboundFrame {
    fn from(message: ChannelMessage) -> Self {
        Self::Message(message)
    }
}
