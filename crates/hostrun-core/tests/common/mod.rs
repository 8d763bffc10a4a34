//! In-memory host used by the integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use hostrun_core::{
    CombinedUnit, CompileError, Compiler, Diagnostic, Dispatcher, Document, EngineConfig,
    ExecutionContext, HostApplication, HostStatus, HostThread, Invocable, Orchestrator,
    ScriptFault, ScriptGlobals, ScriptRunner, channel_signal,
};

pub const HOST_THREAD_NAME: &str = "hostrun-test-host";

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Default)]
struct DocumentState {
    committed: Vec<String>,
    staged: Option<Vec<String>>,
    transactions: usize,
}

/// Shared handle to a transactional list of elements.
#[derive(Debug, Clone, Default)]
pub struct DocumentHandle(Arc<Mutex<DocumentState>>);

impl DocumentHandle {
    /// Committed elements.
    pub fn committed(&self) -> Vec<String> {
        self.0.lock().unwrap().committed.clone()
    }

    /// Number of transactions opened so far.
    pub fn transactions(&self) -> usize {
        self.0.lock().unwrap().transactions
    }

    /// Add an element inside the open transaction.
    pub fn add(&self, element: &str) -> Result<(), ScriptFault> {
        let mut state = self.0.lock().unwrap();
        match state.staged.as_mut() {
            Some(staged) => {
                staged.push(element.to_string());
                Ok(())
            }
            None => Err(ScriptFault::new(
                "InvalidOperationException",
                "modification outside of a transaction",
            )),
        }
    }

    /// Element count as seen inside the open transaction.
    pub fn visible_len(&self) -> usize {
        let state = self.0.lock().unwrap();
        state.staged.as_ref().unwrap_or(&state.committed).len()
    }
}

impl Document for DocumentHandle {
    fn title(&self) -> String {
        "Test Project".to_string()
    }

    fn begin_transaction(&mut self, _name: &str) -> anyhow::Result<()> {
        let mut state = self.0.lock().unwrap();
        anyhow::ensure!(state.staged.is_none(), "a transaction is already open");
        state.staged = Some(state.committed.clone());
        state.transactions += 1;
        Ok(())
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        let mut state = self.0.lock().unwrap();
        let staged = state
            .staged
            .take()
            .ok_or_else(|| anyhow::anyhow!("no open transaction"))?;
        state.committed = staged;
        Ok(())
    }

    fn roll_back(&mut self) -> anyhow::Result<()> {
        self.0.lock().unwrap().staged = None;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// =============================================================================
// Context
// =============================================================================

/// Per-request context recording everything sent to its sinks.
pub struct TestContext {
    pub document: Option<DocumentHandle>,
    pub read_only: bool,
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl TestContext {
    pub fn new(document: &DocumentHandle) -> Self {
        Self {
            document: Some(document.clone()),
            read_only: false,
            lines: Arc::default(),
        }
    }

    pub fn boxed(document: &DocumentHandle) -> Box<dyn ExecutionContext> {
        Box::new(Self::new(document))
    }
}

impl ExecutionContext for TestContext {
    fn document(&mut self) -> Option<&mut dyn Document> {
        self.document.as_mut().map(|d| d as &mut dyn Document)
    }

    fn print(&mut self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn log_error(&mut self, line: &str) {
        self.lines.lock().unwrap().push(format!("error: {}", line));
    }

    fn emit_structured(&mut self, kind: &str, _payload: Value) {
        self.lines.lock().unwrap().push(format!("structured: {}", kind));
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

// =============================================================================
// Compiler
// =============================================================================

pub type ScriptBody =
    Arc<dyn Fn(&mut ScriptGlobals<'_>) -> Result<Option<Value>, ScriptFault> + Send + Sync>;

struct Script(ScriptBody);

impl Invocable for Script {
    fn invoke(&self, globals: &mut ScriptGlobals<'_>) -> Result<Option<Value>, ScriptFault> {
        (self.0)(globals)
    }
}

/// Compiler that maps statement text (or binary bytes) to Rust closures.
#[derive(Default)]
pub struct ScriptedCompiler {
    sources: HashMap<String, ScriptBody>,
    binaries: HashMap<Vec<u8>, Result<ScriptBody, ScriptFault>>,
    compiled: AtomicUsize,
}

impl ScriptedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script<F>(mut self, statements: &str, body: F) -> Self
    where
        F: Fn(&mut ScriptGlobals<'_>) -> Result<Option<Value>, ScriptFault> + Send + Sync + 'static,
    {
        self.sources.insert(statements.to_string(), Arc::new(body));
        self
    }

    pub fn binary<F>(mut self, bytes: &[u8], body: F) -> Self
    where
        F: Fn(&mut ScriptGlobals<'_>) -> Result<Option<Value>, ScriptFault> + Send + Sync + 'static,
    {
        self.binaries.insert(bytes.to_vec(), Ok(Arc::new(body)));
        self
    }

    /// A binary whose loading fails with `fault`.
    pub fn broken_binary(mut self, bytes: &[u8], fault: ScriptFault) -> Self {
        self.binaries.insert(bytes.to_vec(), Err(fault));
        self
    }

    /// Number of compile or load calls so far.
    pub fn calls(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }
}

impl Compiler for ScriptedCompiler {
    fn compile(&self, unit: &CombinedUnit) -> Result<Box<dyn Invocable>, CompileError> {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        match self.sources.get(unit.statements()) {
            Some(body) => Ok(Box::new(Script(body.clone()))),
            None => Err(CompileError::Diagnostics(vec![Diagnostic {
                file: unit.entry_file().unwrap_or("<unit>").to_string(),
                line: 1,
                column: 1,
                id: "CS0103".to_string(),
                message: format!("unknown script '{}'", unit.statements()),
            }])),
        }
    }

    fn load(&self, binary: &[u8]) -> Result<Box<dyn Invocable>, CompileError> {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        match self.binaries.get(binary) {
            Some(Ok(body)) => Ok(Box::new(Script(body.clone()))),
            Some(Err(fault)) => Err(CompileError::Fault(fault.clone())),
            None => Err(CompileError::Fault(ScriptFault::new(
                "BadImageFormatException",
                "not a valid script binary",
            ))),
        }
    }
}

// =============================================================================
// Host
// =============================================================================

pub struct TestHost {
    pub document: Option<DocumentHandle>,
}

impl HostApplication for TestHost {
    fn status(&self) -> HostStatus {
        HostStatus {
            host_available: true,
            version: Some("2025".to_string()),
            document_open: self.document.is_some(),
            document_title: self.document.as_ref().map(|d| d.title()),
        }
    }
}

/// A running engine: host thread, dispatcher and orchestrator.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator<TestHost>>,
    pub document: DocumentHandle,
    pub compiler: Arc<ScriptedCompiler>,
    thread: Option<HostThread>,
}

impl Harness {
    pub fn start(compiler: ScriptedCompiler, deadline: Duration) -> Self {
        let config = EngineConfig {
            deadline,
            ..EngineConfig::default()
        };
        let document = DocumentHandle::default();
        let compiler = Arc::new(compiler);

        let dispatcher = Arc::new(Dispatcher::with_capacity(config.completion_capacity));
        let (signal, wakeups) = channel_signal();
        dispatcher.initialize(signal);

        let runner = ScriptRunner::with_config(compiler.clone(), config.runner_config());
        let host_document = document.clone();
        let thread = HostThread::spawn(
            HOST_THREAD_NAME,
            dispatcher.clone(),
            runner,
            wakeups,
            move || {
                Ok(TestHost {
                    document: Some(host_document),
                })
            },
        )
        .expect("host thread should start");

        Self {
            orchestrator: Arc::new(Orchestrator::new(dispatcher, &config)),
            document,
            compiler,
            thread: Some(thread),
        }
    }

    pub fn context(&self) -> Box<dyn ExecutionContext> {
        TestContext::boxed(&self.document)
    }

    pub fn shutdown(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.shutdown().expect("host thread should stop cleanly");
        }
    }
}

/// Document handle from inside a running script.
pub fn doc(globals: &mut ScriptGlobals<'_>) -> Result<DocumentHandle, ScriptFault> {
    globals
        .document_as::<DocumentHandle>()
        .cloned()
        .ok_or_else(|| ScriptFault::new("InvalidOperationException", "no document"))
}
