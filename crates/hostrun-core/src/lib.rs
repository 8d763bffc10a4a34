//! Core engine for hostrun: running submitted scripts inside a host
//! application that only allows document mutation from one thread.
//!
//! This crate provides:
//! - Source combination of multi-file submissions into one compile unit
//! - A single-slot dispatcher bridging callers to the host thread
//! - Orchestration with a global execution permit and a deadline
//! - A transactional execution wrapper with fault classification
//! - Parameter documents, declared script parameters and script metadata

pub mod combine;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod host;
pub mod metadata;
pub mod orchestrate;
pub mod params;
pub mod script_params;

pub use combine::{
    CombineOptions, CombinedUnit, SourceFragment, TypeDeclaration, combine,
    identify_entry_fragment,
};
pub use config::EngineConfig;
pub use dispatch::{
    ChannelSignal, Completion, Dispatcher, HostThread, HostWakeups, QueryHandle, channel_signal,
};
pub use error::{Error, Result};
pub use execute::{
    ConflictRules, ExecutableUnit, ExecutionRequest, ExecutionResult, FailureKind, RequestId,
    RunnerConfig, ScriptGlobals, ScriptRunner, StructuredOutput, Submission, classify_fault,
};
pub use host::{
    CompileError, Compiler, Diagnostic, Document, ExecutionContext, HostApplication, HostSignal,
    HostStatus, Invocable, ScriptFault,
};
pub use metadata::{ScriptMetadata, extract_metadata};
pub use orchestrate::{ExecutionHistory, HistoryEntry, Orchestrator, RunState};
pub use params::ParameterSet;
pub use script_params::{ScriptParameter, extract_parameters};
