//! Lifecycle notifications emitted by the mixnet proxy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier the proxy hands out for every message it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event from the proxy.
///
/// The set of events is closed: handlers match on it exhaustively so a new
/// kind of event cannot be silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The proxy connected to, or disconnected from, the mixnet.
    ConnectionStatus {
        #[serde(rename = "is_connected")]
        connected: bool,
    },

    /// A previously submitted message left the proxy.
    MessageSent { id: MessageId },

    /// A message is waiting in the receive queue. The payload has to be
    /// fetched separately.
    MessageReceived,

    /// A reply to a service (Kaetzchen) request.
    ServiceReply { payload: Vec<u8> },
}

impl Event {
    /// Short name of the event kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectionStatus { .. } => "ConnectionStatus",
            Event::MessageSent { .. } => "MessageSent",
            Event::MessageReceived => "MessageReceived",
            Event::ServiceReply { .. } => "ServiceReply",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ConnectionStatus { connected: true } => write!(f, "ConnectionStatus: connected"),
            Event::ConnectionStatus { connected: false } => {
                write!(f, "ConnectionStatus: disconnected")
            }
            Event::MessageSent { id } => write!(f, "MessageSent: {id}"),
            Event::MessageReceived => write!(f, "MessageReceived"),
            Event::ServiceReply { payload } => {
                write!(f, "ServiceReply: {} bytes", payload.len())
            }
        }
    }
}
