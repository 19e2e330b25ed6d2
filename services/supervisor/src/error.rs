//! Error types for the supervisor.

use std::path::PathBuf;

use blitz_codec::CodecError;
use thiserror::Error;

use crate::pool::WorkerId;

/// Supervisor errors with standardized reason codes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Hooks were run for an id nothing has registered yet.
    #[error("missing_node: no entry for node '{0}'")]
    MissingNode(String),

    /// A worker process could not be started.
    #[error("spawn_failed: node {node_id}: {program}: {source}")]
    Spawn {
        node_id: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The shared state or call arguments could not be encoded.
    #[error("serialization_failed: {0}")]
    Serialization(#[from] CodecError),

    /// A message targeted a worker whose channel is gone.
    #[error("channel_closed: node {node_id} worker {worker_id}")]
    ChannelClosed { node_id: String, worker_id: WorkerId },

    /// A pre-cluster hook failed.
    #[error("hook_failed: node {node_id} hook {label}: {source}")]
    Hook {
        node_id: String,
        label: String,
        #[source]
        source: anyhow::Error,
    },

    /// A proxy was called with the wrong number of arguments.
    #[error("arity_mismatch: {node_id}.{method} takes {expected} arguments, got {actual}")]
    Arity {
        node_id: String,
        method: String,
        expected: usize,
        actual: usize,
    },

    /// No proxy with this name is installed for the node.
    #[error("unknown_method: {node_id}.{method}")]
    UnknownMethod { node_id: String, method: String },
}

impl SupervisorError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SupervisorError::MissingNode(_) => "missing_node",
            SupervisorError::Spawn { .. } => "spawn_failed",
            SupervisorError::Serialization(_) => "serialization_failed",
            SupervisorError::ChannelClosed { .. } => "channel_closed",
            SupervisorError::Hook { .. } => "hook_failed",
            SupervisorError::Arity { .. } => "arity_mismatch",
            SupervisorError::UnknownMethod { .. } => "unknown_method",
        }
    }
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
