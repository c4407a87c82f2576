//! Wire protocol for the device link
//!
//! Messages are JSON objects with a single discriminating top-level key
//! (serde external tagging): `command`, `query`, `error`, or `reply`.
//! Commands and queries carry a correlation token that the device echoes
//! back in its reply, so the gateway matches replies by token instead of
//! assuming whatever arrives next answers the outstanding request.
//!
//! Unknown top-level shapes fail to parse; receivers log and ignore them
//! without closing the connection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message exchanged over a device connection, in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMessage {
    /// Gateway-to-device instruction
    Command(CommandBody),
    /// Gateway-to-device question
    Query(QueryBody),
    /// Fault notice; receiving this terminates the current exchange
    Error(String),
    /// Device-to-gateway answer to the outstanding command or query
    Reply(ReplyBody),
}

/// Body of a `command` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBody {
    /// Correlation token echoed back in the reply
    pub token: Uuid,
    /// Command verb (e.g. "open", "lock screen")
    pub command: String,
    /// Free-form command argument
    #[serde(default)]
    pub x: serde_json::Value,
    /// Optional URL argument
    #[serde(default)]
    pub url: serde_json::Value,
}

/// Body of a `query` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryBody {
    /// Correlation token echoed back in the reply
    pub token: Uuid,
    /// Queried value (e.g. "battery", "memory usage")
    pub value: String,
    /// Free-form query argument
    #[serde(default)]
    pub x: serde_json::Value,
}

/// Body of a `reply` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyBody {
    /// Token of the command or query this answers
    pub token: Uuid,
    /// Spoken response; empty means a bare acknowledgement
    #[serde(default)]
    pub text: Option<String>,
    /// Longer display-only text (e.g. a full file path) when it should
    /// differ from what is read aloud
    #[serde(default)]
    pub display: Option<String>,
}

impl ReplyBody {
    /// A bare acknowledgement carrying no response text
    #[must_use]
    pub const fn ack(token: Uuid) -> Self {
        Self {
            token,
            text: None,
            display: None,
        }
    }
}
