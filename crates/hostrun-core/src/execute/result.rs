//! Execution results.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::RequestId;

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Fragments could not be combined.
    Combination,
    /// The parameter document was invalid.
    Parameters,
    /// The compiler reported diagnostics.
    Compilation,
    /// No document was open.
    NoDocument,
    /// The engine's own libraries were shadowed by another extension.
    Conflict,
    /// The script raised a fault or panicked.
    Runtime,
    /// The document refused to commit.
    Transaction,
    /// The deadline elapsed before the host finished.
    TimedOut,
    /// A newer submission replaced this one before the host ran it.
    Superseded,
    /// The host thread is gone.
    HostUnavailable,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Combination => "combination",
            FailureKind::Parameters => "parameters",
            FailureKind::Compilation => "compilation",
            FailureKind::NoDocument => "no document",
            FailureKind::Conflict => "conflict",
            FailureKind::Runtime => "runtime",
            FailureKind::Transaction => "transaction",
            FailureKind::TimedOut => "timed out",
            FailureKind::Superseded => "superseded",
            FailureKind::HostUnavailable => "host unavailable",
        };
        f.write_str(name)
    }
}

/// A structured side-channel payload emitted by a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub kind: String,
    pub data: Value,
}

/// Outcome of one execution, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub structured_output: Vec<StructuredOutput>,
    #[serde(default)]
    pub internal_data: Option<String>,
    #[serde(default)]
    pub return_value: Option<Value>,
    pub script_name: String,
    /// Completion time, unix milliseconds.
    pub timestamp: u64,
    #[serde(default)]
    pub failure: Option<FailureKind>,
    pub request_id: RequestId,
}

impl ExecutionResult {
    pub fn succeeded(request_id: RequestId, script_name: impl Into<String>) -> Self {
        Self {
            success: true,
            message: "Code executed successfully".to_string(),
            error_details: Vec::new(),
            output: Vec::new(),
            structured_output: Vec::new(),
            internal_data: None,
            return_value: None,
            script_name: script_name.into(),
            timestamp: now_millis(),
            failure: None,
            request_id,
        }
    }

    pub fn failed(
        request_id: RequestId,
        script_name: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(kind),
            ..Self::succeeded(request_id, script_name)
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.error_details = details;
        self
    }

    pub fn is_failure(&self, kind: FailureKind) -> bool {
        self.failure == Some(kind)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
