//! Execution of requests on the host thread.
//!
//! ```text
//! ExecutionRequest
//!     │
//!     └── ScriptRunner::execute
//!             ├── ParameterSet::parse
//!             ├── Compiler::compile / Compiler::load
//!             ├── Document::begin_transaction
//!             ├── Invocable::invoke (catch_unwind, ScriptGlobals)
//!             ├── commit, or roll back on fault
//!             └── classify_fault → ExecutionResult
//! ```
//!
//! # Module Structure
//!
//! - `request` - Submissions, request ids and executable units
//! - `result` - Execution results and failure kinds
//! - `globals` - What a running script sees
//! - `classify` - Conflict vs. runtime fault classification
//! - `runner` - The execution wrapper

mod classify;
mod globals;
mod request;
mod result;
mod runner;

pub use classify::{Classified, ConflictRules, classify_fault};
pub use globals::{BUDGET_EXCEEDED, ScriptGlobals};
pub use request::{COMPILED_SCRIPT_NAME, ExecutableUnit, ExecutionRequest, RequestId, Submission};
pub use result::{ExecutionResult, FailureKind, StructuredOutput};
pub use runner::{PANIC_FAULT, RunnerConfig, ScriptRunner};

pub(crate) use runner::panic_message;
