//! Debug Adapter Protocol (DAP) front end for the debugger.
//!
//! This module exposes the [`DebuggerHandle`](super::DebuggerHandle) to
//! editors such as VS Code.
//!
//! # Architecture
//!
//! - [`messages`]: protocol types (requests, responses, events)
//! - [`transport`]: `Content-Length` framing over any byte stream
//! - [`session`]: maps requests onto an [`EngineThread`](super::EngineThread)
//! - [`server`]: the request loop, plus a thread that turns
//!   [`DebugEvent`](super::DebugEvent)s into protocol events
//!
//! # References
//!
//! - [DAP Specification](https://microsoft.github.io/debug-adapter-protocol/)

pub mod messages;
pub mod server;
pub mod session;
pub mod transport;

pub use messages::*;
pub use server::DapServer;
pub use session::DebugSession;

use serde::{Deserialize, Serialize};

/// One framed message, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    /// A client request.
    Request(Request),
    /// The adapter's answer to a request.
    Response(Response),
    /// An unsolicited notification from the adapter.
    Event(Event),
}

/// DAP request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// The command to execute.
    pub command: String,
    /// Command-specific arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// DAP response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number.
    pub seq: i64,
    /// Sequence number of the answered request.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// The answered command.
    pub command: String,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// DAP event message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Event type.
    pub event: String,
    /// Event-specific information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl ProtocolMessage {
    /// The sender's sequence number, whichever kind of message this is.
    #[must_use]
    pub const fn seq(&self) -> i64 {
        match self {
            Self::Request(Request { seq, .. })
            | Self::Response(Response { seq, .. })
            | Self::Event(Event { seq, .. }) => *seq,
        }
    }
}
