//! The execution wrapper that runs one request on the host thread.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::host::{CompileError, Compiler, ExecutionContext, ScriptFault};
use crate::params::ParameterSet;

use super::classify::{ConflictRules, classify_fault};
use super::globals::{Capture, ScriptGlobals};
use super::request::{ExecutableUnit, ExecutionRequest, RequestId};
use super::result::{ExecutionResult, FailureKind};

/// Fault kind used for panics raised by a script.
pub const PANIC_FAULT: &str = "Panic";

/// Settings for [`ScriptRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name given to the transaction wrapping each run.
    pub transaction_name: String,
    /// Budget checked by `ScriptGlobals::checkpoint`.
    pub script_budget: Option<Duration>,
    pub conflict: ConflictRules,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            transaction_name: "Run Script".to_string(),
            script_budget: None,
            conflict: ConflictRules::default(),
        }
    }
}

/// Compiles, loads and invokes requests inside a transaction.
///
/// Lives on the host thread. Every failure, panics included, becomes a
/// failed [`ExecutionResult`].
pub struct ScriptRunner {
    compiler: Arc<dyn Compiler>,
    config: RunnerConfig,
}

impl ScriptRunner {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self::with_config(compiler, RunnerConfig::default())
    }

    pub fn with_config(compiler: Arc<dyn Compiler>, config: RunnerConfig) -> Self {
        Self { compiler, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one request to completion.
    pub fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let ExecutionRequest {
            id,
            unit,
            parameters,
            mut context,
            script_name,
            ..
        } = request;

        tracing::debug!("Executing '{}' ({})", script_name, id);
        let context = context.as_mut();

        let params = match ParameterSet::parse(&parameters) {
            Ok(params) => params,
            Err(e) => {
                context.log_error(&e.to_string());
                return ExecutionResult::failed(
                    id,
                    script_name,
                    FailureKind::Parameters,
                    e.to_string(),
                );
            }
        };

        let compiled = match &unit {
            ExecutableUnit::Combined(unit) => self.compiler.compile(unit),
            ExecutableUnit::Binary(bytes) => self.compiler.load(bytes),
        };
        let invocable = match compiled {
            Ok(invocable) => invocable,
            Err(CompileError::Diagnostics(diagnostics)) => {
                let details: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
                for line in &details {
                    context.log_error(line);
                }
                return ExecutionResult::failed(
                    id,
                    script_name,
                    FailureKind::Compilation,
                    format!("Compilation failed with {} error(s)", details.len()),
                )
                .with_details(details);
            }
            Err(CompileError::Fault(fault)) => {
                return self.fault_result(id, script_name, &fault, context);
            }
        };

        let read_only = context.is_read_only();
        match context.document() {
            None => {
                return ExecutionResult::failed(
                    id,
                    script_name,
                    FailureKind::NoDocument,
                    "No document is open",
                );
            }
            Some(doc) => {
                if let Err(e) = doc.begin_transaction(&self.config.transaction_name) {
                    return ExecutionResult::failed(
                        id,
                        script_name,
                        FailureKind::Transaction,
                        format!("Failed to open transaction: {}", e),
                    );
                }
            }
        }

        let mut capture = Capture::default();
        let outcome = {
            let mut globals =
                ScriptGlobals::new(&params, context, &mut capture, self.config.script_budget);
            catch_unwind(AssertUnwindSafe(|| invocable.invoke(&mut globals)))
        };
        let outcome: Result<Option<Value>, ScriptFault> = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => Err(ScriptFault::new(PANIC_FAULT, panic_message(&*payload))),
        };

        let mut result = match outcome {
            Ok(value) => {
                let closed = if read_only {
                    roll_back(context);
                    Ok(())
                } else {
                    commit(context)
                };
                match closed {
                    Ok(()) => {
                        let mut result = ExecutionResult::succeeded(id, script_name);
                        result.return_value = value;
                        result
                    }
                    Err(message) => {
                        tracing::error!("Commit failed for {}: {}", id, message);
                        ExecutionResult::failed(
                            id,
                            script_name,
                            FailureKind::Transaction,
                            format!("Failed to commit transaction: {}", message),
                        )
                    }
                }
            }
            Err(fault) => {
                roll_back(context);
                self.fault_result(id, script_name, &fault, context)
            }
        };

        result.output = capture.output;
        result.structured_output = capture.structured;
        result.internal_data = capture.internal_data;
        result.error_details.extend(capture.errors);

        tracing::debug!(
            "Finished {} (success: {}, {} output lines)",
            id,
            result.success,
            result.output.len()
        );
        result
    }

    fn fault_result(
        &self,
        id: RequestId,
        script_name: String,
        fault: &ScriptFault,
        context: &mut dyn ExecutionContext,
    ) -> ExecutionResult {
        let classified = classify_fault(fault, &self.config.conflict);
        match classified.kind {
            FailureKind::Conflict => {
                tracing::error!("Environment conflict while running {}: {}", id, fault);
                context.print(&self.config.conflict.hint);
            }
            _ => {
                tracing::error!("Script {} failed: {}", id, fault);
                context.log_error(&fault.to_string());
            }
        }
        ExecutionResult::failed(id, script_name, classified.kind, classified.message)
            .with_details(classified.details)
    }
}

/// Commit the open transaction, rolling back if the commit fails.
fn commit(context: &mut dyn ExecutionContext) -> Result<(), String> {
    let Some(doc) = context.document() else {
        return Err("document closed during execution".to_string());
    };
    doc.commit().map_err(|e| {
        if let Err(rb) = doc.roll_back() {
            tracing::error!("Rollback after failed commit also failed: {}", rb);
        }
        e.to_string()
    })
}

fn roll_back(context: &mut dyn ExecutionContext) {
    match context.document() {
        Some(doc) => {
            if let Err(e) = doc.roll_back() {
                tracing::error!("Rollback failed: {}", e);
            }
        }
        None => tracing::warn!("Document closed during execution; nothing to roll back"),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
