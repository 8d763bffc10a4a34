//! Interfaces the engine consumes from the host integration.
//!
//! The engine never implements these. An integration layer supplies the
//! wake-up primitive, the document model, a per-request execution context
//! and the compiler that turns combined source or binaries into something
//! invocable.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::combine::CombinedUnit;
use crate::execute::ScriptGlobals;

/// Requests the host's attention on its privileged thread.
///
/// The dispatcher only raises when no raise is pending, but implementations
/// should tolerate repeated raises.
pub trait HostSignal: Send + Sync {
    fn raise(&self);
}

/// Snapshot of the host returned by status queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub host_available: bool,
    pub version: Option<String>,
    pub document_open: bool,
    pub document_title: Option<String>,
}

/// State owned by the host thread.
pub trait HostApplication: 'static {
    fn status(&self) -> HostStatus;
}

/// A transactional document model.
pub trait Document: Send {
    fn title(&self) -> String;

    /// Open a named transaction. At most one is open at a time.
    fn begin_transaction(&mut self, name: &str) -> anyhow::Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> anyhow::Result<()>;

    /// Discard every change made since the transaction was opened.
    fn roll_back(&mut self) -> anyhow::Result<()>;

    /// Downcast hook for scripts that know the concrete document type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Capabilities handed to one request: document access and output sinks.
pub trait ExecutionContext: Send {
    /// Current document, if one is open.
    fn document(&mut self) -> Option<&mut dyn Document>;

    fn print(&mut self, line: &str);

    fn log_error(&mut self, line: &str);

    /// Structured side channel (tables, element lists, charts).
    fn emit_structured(&mut self, kind: &str, payload: Value);

    /// Read-only contexts never commit.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub id: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({},{}): error {}: {}",
            self.file, self.line, self.column, self.id, self.message
        )
    }
}

/// A fault raised by the compiler or by a running script.
///
/// `kind` is the fault's type name as reported by the runtime (for example
/// `TypeLoadException`); classification reads it together with the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScriptFault {
    pub kind: String,
    pub message: String,
    pub trace: Option<String>,
}

impl ScriptFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// Failure to produce an invocable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed with {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),

    #[error(transparent)]
    Fault(#[from] ScriptFault),
}

/// Turns combined source or a precompiled binary into an invocable.
pub trait Compiler: Send + Sync {
    fn compile(&self, unit: &CombinedUnit) -> Result<Box<dyn Invocable>, CompileError>;

    fn load(&self, binary: &[u8]) -> Result<Box<dyn Invocable>, CompileError>;
}

/// A runnable entry point.
pub trait Invocable {
    fn invoke(&self, globals: &mut ScriptGlobals<'_>) -> Result<Option<Value>, ScriptFault>;
}
