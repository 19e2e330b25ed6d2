//! Error types for graph encoding and decoding.

use thiserror::Error;

/// Errors that can occur when encoding or decoding an object graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The graph holds a value the wire format cannot carry.
    #[error("unrepresentable value at {path}: {detail}")]
    Unrepresentable { path: String, detail: String },

    /// The text is valid JSON but not a valid encoded graph.
    #[error("malformed graph: {0}")]
    Malformed(String),

    /// A back-reference points at a container that was never defined.
    #[error("dangling reference: ${0}")]
    DanglingReference(u64),

    /// A cycle was found where a tree was required.
    #[error("cycle at {0}")]
    Cycle(String),

    /// The text nests containers deeper than the decoder accepts.
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Underlying JSON error.
    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(err.to_string())
    }
}

/// Render a path of keys and indices the way error messages show it.
pub(crate) fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        format!("$.{}", path.join("."))
    }
}
