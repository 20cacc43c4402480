//! Response envelopes.

use closeman_core::CloseError;
use serde::Serialize;
use serde_json::Value;

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessOutput {
    /// Always "success"
    pub status: &'static str,
    /// Operation that ran
    pub operation: String,
    /// Operation result
    pub data: Value,
}

/// What the host receives for every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// `{"output": {"status": "success", "operation": ..., "data": ...}}`
    Success {
        /// Result body
        output: SuccessOutput,
    },
    /// `{"error": ..., "type": ...}`
    Error {
        /// Error message
        error: String,
        /// Error kind, e.g. `ValidationError`
        #[serde(rename = "type")]
        kind: String,
    },
}

impl Envelope {
    /// Wrap a successful result.
    pub fn success(operation: impl Into<String>, data: Value) -> Self {
        Envelope::Success {
            output: SuccessOutput {
                status: "success",
                operation: operation.into(),
                data,
            },
        }
    }

    /// Wrap an error.
    pub fn error(err: &CloseError) -> Self {
        Envelope::Error {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }

    /// Whether this is an error envelope.
    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error { .. })
    }

    /// The `data` of a success envelope.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Envelope::Success { output } => Some(&output.data),
            Envelope::Error { .. } => None,
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
