//! The surface a running script sees.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::host::{Document, ExecutionContext, ScriptFault};
use crate::params::ParameterSet;

use super::result::StructuredOutput;

/// Fault kind reported when a script overruns its budget at a checkpoint.
pub const BUDGET_EXCEEDED: &str = "ScriptBudgetExceeded";

/// Everything a script emitted while running.
#[derive(Debug, Default)]
pub(crate) struct Capture {
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub structured: Vec<StructuredOutput>,
    pub internal_data: Option<String>,
}

/// Globals passed to an [`Invocable`](crate::host::Invocable).
///
/// Output is forwarded to the request's context and also captured for the
/// result.
pub struct ScriptGlobals<'a> {
    parameters: &'a ParameterSet,
    context: &'a mut dyn ExecutionContext,
    capture: &'a mut Capture,
    started: Instant,
    budget: Option<Duration>,
}

impl<'a> ScriptGlobals<'a> {
    pub(crate) fn new(
        parameters: &'a ParameterSet,
        context: &'a mut dyn ExecutionContext,
        capture: &'a mut Capture,
        budget: Option<Duration>,
    ) -> Self {
        Self {
            parameters,
            context,
            capture,
            started: Instant::now(),
            budget,
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        self.parameters
    }

    pub fn print(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.context.print(&line);
        self.capture.output.push(line);
    }

    pub fn log_error(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.context.log_error(&line);
        self.capture.errors.push(line);
    }

    pub fn emit_structured(&mut self, kind: impl Into<String>, data: Value) {
        let kind = kind.into();
        self.context.emit_structured(&kind, data.clone());
        self.capture.structured.push(StructuredOutput { kind, data });
    }

    /// Set the machine-readable side channel returned with the result.
    pub fn set_internal_data(&mut self, data: impl Into<String>) {
        self.capture.internal_data = Some(data.into());
    }

    pub fn document(&mut self) -> Option<&mut dyn Document> {
        self.context.document()
    }

    /// Downcast the document to its concrete type.
    pub fn document_as<T: 'static>(&mut self) -> Option<&mut T> {
        self.context
            .document()
            .and_then(|doc| doc.as_any_mut().downcast_mut::<T>())
    }

    pub fn is_read_only(&self) -> bool {
        self.context.is_read_only()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Cooperative budget check. Long-running scripts should call this
    /// periodically and propagate the error.
    pub fn checkpoint(&self) -> Result<(), ScriptFault> {
        match self.budget {
            Some(budget) if self.elapsed() > budget => Err(ScriptFault::new(
                BUDGET_EXCEEDED,
                format!("script exceeded its budget of {:?}", budget),
            )),
            _ => Ok(()),
        }
    }
}
