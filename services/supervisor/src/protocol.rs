//! Parent → worker message protocol.
//!
//! Messages are newline-delimited JSON written to the worker's stdin:
//!
//! ```text
//! {"type":"setGlobal","data":"<serialized state>"}
//! {"type":"call","value":{"method":"foo","args":"<serialized argument list>"}}
//! ```

use serde::{Deserialize, Serialize};

/// Environment variable marking a process as a worker.
pub const WORKER_ENV: &str = "BLITZ_IS_WORKER";

/// A message from the supervisor to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Hydrate the worker with the serialized shared state.
    #[serde(rename = "setGlobal")]
    SetGlobal { data: String },

    /// Invoke a method inside the worker.
    #[serde(rename = "call")]
    Call { value: CallRequest },
}

/// Payload of a `call` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    /// Serialized argument list.
    pub args: String,
}

impl WorkerMessage {
    pub fn set_global(data: impl Into<String>) -> Self {
        WorkerMessage::SetGlobal { data: data.into() }
    }

    pub fn call(method: impl Into<String>, args: impl Into<String>) -> Self {
        WorkerMessage::Call {
            value: CallRequest {
                method: method.into(),
                args: args.into(),
            },
        }
    }

    /// Message type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::SetGlobal { .. } => "setGlobal",
            WorkerMessage::Call { .. } => "call",
        }
    }

    /// Encode as a single NDJSON line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Whether this process was spawned as a worker.
pub fn is_worker() -> bool {
    std::env::var(WORKER_ENV)
        .map(|v| v == "true")
        .unwrap_or(false)
}
