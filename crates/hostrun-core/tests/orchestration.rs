//! Integration tests for orchestrated execution on a dedicated host thread.
//!
//! Covers serialization of concurrent runs, transactional rollback,
//! deadlines with late results, queries and fault classification.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use common::{Harness, ScriptedCompiler, TestContext, doc};
use hostrun_core::{
    CombineOptions, Dispatcher, EngineConfig, Error, ExecutionRequest, FailureKind, HostThread,
    Orchestrator, ScriptFault, ScriptRunner, SourceFragment, Submission, channel_signal,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn main_script(statements: &str) -> Submission {
    Submission::from_fragments(vec![SourceFragment::new("Main.cs", statements)])
}

/// Poll `check` until it holds or `timeout` passes.
async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Lets a script hold the host thread until the test releases it.
#[derive(Clone, Default)]
struct Gate {
    started: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl Gate {
    /// Called from the script: block until released (or five seconds pass).
    fn pass(&self) {
        self.started.store(true, Ordering::SeqCst);
        let give_up = std::time::Instant::now() + Duration::from_secs(5);
        while !self.released.load(Ordering::SeqCst) && std::time::Instant::now() < give_up {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn gated_compiler(gate: &Gate) -> ScriptedCompiler {
    let gate = gate.clone();
    ScriptedCompiler::new()
        .script("Block();", move |g| {
            gate.pass();
            doc(g)?.add("block")?;
            Ok(None)
        })
        .script("Waiting();", |g| {
            doc(g)?.add("waiting")?;
            Ok(None)
        })
        .script("Direct();", |g| {
            doc(g)?.add("direct")?;
            Ok(None)
        })
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_commits_and_captures_output() {
    let compiler = ScriptedCompiler::new().script("AddWall();", |g| {
        doc(g)?.add("wall")?;
        g.print("Created 1 wall");
        g.emit_structured("table", serde_json::json!([{"id": 1}]));
        g.set_internal_data(r#"{"created":1}"#);
        Ok(None)
    });
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let submission = Submission::from_fragments(vec![
        SourceFragment::new("Main.cs", "using Host.Db;\nAddWall();"),
        SourceFragment::new("Helpers.cs", "using Host.Db;\nstatic class Helpers {}"),
    ]);
    let result = harness
        .orchestrator
        .run(submission, harness.context())
        .await
        .unwrap();

    assert!(result.success, "{:?}", result);
    assert_eq!(result.script_name, "Main.cs");
    assert_eq!(result.output, vec!["Created 1 wall"]);
    assert_eq!(result.structured_output.len(), 1);
    assert_eq!(result.internal_data.as_deref(), Some(r#"{"created":1}"#));
    assert_eq!(harness.document.committed(), vec!["wall"]);

    let history = harness.orchestrator.history().for_request(result.request_id);
    assert_eq!(history.len(), 1);
    assert!(history[0].delivered);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fault_leaves_no_partial_mutation() {
    let compiler = ScriptedCompiler::new()
        .script("Seed();", |g| {
            doc(g)?.add("existing")?;
            Ok(None)
        })
        .script("Broken();", |g| {
            let doc = doc(g)?;
            doc.add("first")?;
            doc.add("second")?;
            Err(ScriptFault::new("ArgumentException", "bad level").with_trace("at Broken()"))
        });
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let seeded = harness
        .orchestrator
        .run(main_script("Seed();"), harness.context())
        .await
        .unwrap();
    assert!(seeded.success);

    let result = harness
        .orchestrator
        .run(main_script("Broken();"), harness.context())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert_eq!(result.message, "Script execution error: bad level");
    assert!(result.error_details.iter().any(|d| d == "at Broken()"));
    assert_eq!(harness.document.committed(), vec!["existing"]);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_script_rolls_back_and_host_survives() {
    let compiler = ScriptedCompiler::new()
        .script("Panic();", |g| {
            doc(g)?.add("orphan")?;
            panic!("index out of range");
        })
        .script("Ok();", |g| {
            doc(g)?.add("kept")?;
            Ok(None)
        });
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let panicked = harness
        .orchestrator
        .run(main_script("Panic();"), harness.context())
        .await
        .unwrap();
    assert_eq!(panicked.failure, Some(FailureKind::Runtime));

    let next = harness
        .orchestrator
        .run(main_script("Ok();"), harness.context())
        .await
        .unwrap();
    assert!(next.success);
    assert_eq!(harness.document.committed(), vec!["kept"]);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_runs_are_serialized() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let compiler = {
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        let observed = observed.clone();
        ScriptedCompiler::new().script("Count();", move |g| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);

            let doc = doc(g)?;
            observed.lock().unwrap().push(doc.visible_len());
            std::thread::sleep(Duration::from_millis(15));
            doc.add("element")?;

            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        })
    };
    let harness = Harness::start(compiler, Duration::from_secs(10));

    let callers = 8;
    let mut tasks = Vec::new();
    for _ in 0..callers {
        let orchestrator = harness.orchestrator.clone();
        let context = harness.context();
        tasks.push(tokio::spawn(async move {
            orchestrator.run(main_script("Count();"), context).await
        }));
    }
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert!(result.success, "{:?}", result);
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(harness.document.committed().len(), callers);
    assert_eq!(harness.document.transactions(), callers);

    // Each run saw every earlier commit and nothing else.
    let seen: HashSet<usize> = observed.lock().unwrap().iter().copied().collect();
    assert_eq!(seen, (0..callers).collect::<HashSet<_>>());

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_returns_synthetic_result_and_records_late_result_once() {
    let compiler = ScriptedCompiler::new()
        .script("Slow();", |g| {
            std::thread::sleep(Duration::from_millis(450));
            doc(g)?.add("slow")?;
            Ok(Some(Value::from("done")))
        })
        .script("Fast();", |g| {
            doc(g)?.add("fast")?;
            Ok(None)
        });
    let harness = Harness::start(compiler, Duration::from_millis(300));
    let orchestrator = harness.orchestrator.clone();

    let timed_out = orchestrator
        .run(main_script("Slow();"), harness.context())
        .await
        .unwrap();
    assert!(!timed_out.success);
    assert_eq!(timed_out.failure, Some(FailureKind::TimedOut));
    assert!(timed_out.error_details[0].contains("already started"));
    let slow_id = timed_out.request_id;

    // Back-to-back: the permit was released on timeout; this run waits for
    // the host to finish the slow script and then completes normally.
    let fast = orchestrator
        .run(main_script("Fast();"), harness.context())
        .await
        .unwrap();
    assert!(fast.success, "{:?}", fast);
    assert_ne!(fast.request_id, slow_id);

    let recorded = eventually(Duration::from_secs(2), || {
        !orchestrator.history().for_request(slow_id).is_empty()
    })
    .await;
    assert!(recorded, "late result never reached history");

    let late = orchestrator.history().for_request(slow_id);
    assert_eq!(late.len(), 1);
    assert!(!late[0].delivered);
    assert!(late[0].result.success);
    assert_eq!(late[0].result.return_value, Some(Value::from("done")));

    // The late success still committed on the host.
    assert_eq!(harness.document.committed(), vec!["slow", "fast"]);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_outliving_two_deadlines_drops_nothing() {
    let compiler = ScriptedCompiler::new()
        .script("Slow();", |g| {
            std::thread::sleep(Duration::from_millis(900));
            doc(g)?.add("slow")?;
            Ok(None)
        })
        .script("B();", |g| {
            doc(g)?.add("b")?;
            Ok(None)
        })
        .script("C();", |g| {
            doc(g)?.add("c")?;
            Ok(None)
        })
        .script("Fast();", |g| {
            doc(g)?.add("fast")?;
            Ok(None)
        });
    let harness = Harness::start(compiler, Duration::from_millis(200));
    let orchestrator = harness.orchestrator.clone();

    let slow = orchestrator
        .run(main_script("Slow();"), harness.context())
        .await
        .unwrap();
    assert_eq!(slow.failure, Some(FailureKind::TimedOut));
    assert!(slow.error_details[0].contains("already started"));

    // Both wait behind the slow script, time out and are withdrawn.
    let b = orchestrator
        .run(main_script("B();"), harness.context())
        .await
        .unwrap();
    let c = orchestrator
        .run(main_script("C();"), harness.context())
        .await
        .unwrap();
    for result in [&b, &c] {
        assert_eq!(result.failure, Some(FailureKind::TimedOut), "{:?}", result);
        assert!(
            result.error_details[0].contains("never started"),
            "{:?}",
            result.error_details
        );
    }

    let b_history = orchestrator.history().for_request(b.request_id);
    assert_eq!(b_history.len(), 1);
    assert!(b_history[0].delivered);
    assert_eq!(b_history[0].result.failure, Some(FailureKind::TimedOut));

    let recorded = eventually(Duration::from_secs(3), || {
        !orchestrator.history().for_request(slow.request_id).is_empty()
    })
    .await;
    assert!(recorded, "late result never reached history");
    let late = orchestrator.history().for_request(slow.request_id);
    assert_eq!(late.len(), 1);
    assert!(late[0].result.success);
    assert!(!late[0].delivered);
    assert_eq!(harness.document.committed(), vec!["slow"]);

    let fast = orchestrator
        .run(main_script("Fast();"), harness.context())
        .await
        .unwrap();
    assert!(fast.success, "{:?}", fast);
    assert_eq!(harness.document.committed(), vec!["slow", "fast"]);

    assert!(
        orchestrator
            .history()
            .entries()
            .iter()
            .all(|e| e.result.failure != Some(FailureKind::Superseded))
    );

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_direct_submission_supersedes_waiting_run() {
    let gate = Gate::default();
    let harness = Harness::start(gated_compiler(&gate), Duration::from_secs(5));
    let orchestrator = harness.orchestrator.clone();
    let dispatcher = orchestrator.dispatcher().clone();

    let blocked = {
        let orchestrator = orchestrator.clone();
        let context = harness.context();
        tokio::spawn(async move { orchestrator.run(main_script("Block();"), context).await })
    };
    assert!(eventually(Duration::from_secs(2), || gate.has_started()).await);

    let waiting = {
        let orchestrator = orchestrator.clone();
        let context = harness.context();
        tokio::spawn(async move { orchestrator.run(main_script("Waiting();"), context).await })
    };
    assert!(eventually(Duration::from_secs(2), || dispatcher.is_occupied()).await);

    let direct = ExecutionRequest::build(
        main_script("Direct();"),
        harness.context(),
        &CombineOptions::default(),
    )
    .unwrap();
    dispatcher.submit_request(direct).unwrap();

    let superseded = waiting.await.unwrap().unwrap();
    assert_eq!(superseded.failure, Some(FailureKind::Superseded));
    let entries = orchestrator.history().for_request(superseded.request_id);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].delivered);

    gate.release();
    let blocked = blocked.await.unwrap().unwrap();
    assert!(blocked.success, "{:?}", blocked);

    let committed = eventually(Duration::from_secs(2), || {
        harness.document.committed() == vec!["block", "direct"]
    })
    .await;
    assert!(committed, "{:?}", harness.document.committed());

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_times_out_unstarted_while_slot_stays_taken() {
    let gate = Gate::default();
    let harness = Harness::start(gated_compiler(&gate), Duration::from_millis(200));
    let orchestrator = harness.orchestrator.clone();
    let dispatcher = orchestrator.dispatcher().clone();

    let blocked = orchestrator
        .run(main_script("Block();"), harness.context())
        .await
        .unwrap();
    assert_eq!(blocked.failure, Some(FailureKind::TimedOut));
    assert!(gate.has_started());

    let direct = ExecutionRequest::build(
        main_script("Direct();"),
        harness.context(),
        &CombineOptions::default(),
    )
    .unwrap();
    dispatcher.submit_request(direct).unwrap();

    let waiting = orchestrator
        .run(main_script("Waiting();"), harness.context())
        .await
        .unwrap();
    assert_eq!(waiting.failure, Some(FailureKind::TimedOut));
    assert!(waiting.error_details[0].contains("never started"));
    assert!(dispatcher.is_occupied(), "the direct request must not be replaced");
    let entries = orchestrator.history().for_request(waiting.request_id);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].delivered);

    gate.release();
    let committed = eventually(Duration::from_secs(2), || {
        harness.document.committed() == vec!["block", "direct"]
    })
    .await;
    assert!(committed, "{:?}", harness.document.committed());

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_resolves_waiting_run() {
    let gate = Gate::default();
    let harness = Harness::start(gated_compiler(&gate), Duration::from_secs(5));
    let orchestrator = harness.orchestrator.clone();
    let dispatcher = orchestrator.dispatcher().clone();
    let document = harness.document.clone();

    let blocked = {
        let orchestrator = orchestrator.clone();
        let context = harness.context();
        tokio::spawn(async move { orchestrator.run(main_script("Block();"), context).await })
    };
    assert!(eventually(Duration::from_secs(2), || gate.has_started()).await);

    let waiting = {
        let orchestrator = orchestrator.clone();
        let context = harness.context();
        tokio::spawn(async move { orchestrator.run(main_script("Waiting();"), context).await })
    };
    assert!(eventually(Duration::from_secs(2), || dispatcher.is_occupied()).await);

    let stopper = std::thread::spawn(move || harness.shutdown());
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.release();

    let blocked = blocked.await.unwrap().unwrap();
    assert!(blocked.success, "{:?}", blocked);
    let waiting = waiting.await.unwrap().unwrap();
    assert_eq!(waiting.failure, Some(FailureKind::HostUnavailable));
    stopper.join().unwrap();

    assert_eq!(document.committed(), vec!["block"]);
    assert!(!dispatcher.is_occupied());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_combination_error_returns_before_host_work() {
    let harness = Harness::start(ScriptedCompiler::new(), Duration::from_secs(5));

    let submission = Submission::from_fragments(vec![
        SourceFragment::new("A.cs", "First();"),
        SourceFragment::new("B.cs", "Second();"),
    ]);
    let result = harness
        .orchestrator
        .run(submission, harness.context())
        .await
        .unwrap();

    assert_eq!(result.failure, Some(FailureKind::Combination));
    assert!(result.message.contains("A.cs, B.cs"));
    assert!(result.error_details[0].contains("hint:"));
    assert_eq!(harness.compiler.calls(), 0);
    assert_eq!(harness.document.transactions(), 0);
    assert_eq!(harness.orchestrator.history().len(), 1);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compile_diagnostics_are_reported() {
    let harness = Harness::start(ScriptedCompiler::new(), Duration::from_secs(5));

    let result = harness
        .orchestrator
        .run(main_script("Unknown();"), harness.context())
        .await
        .unwrap();

    assert_eq!(result.failure, Some(FailureKind::Compilation));
    assert_eq!(
        result.error_details[0],
        "Main.cs(1,1): error CS0103: unknown script 'Unknown();'"
    );
    assert_eq!(harness.document.transactions(), 0);

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_binary_submission_and_conflict_classification() {
    let compiler = ScriptedCompiler::new()
        .binary(&[0xCA, 0xFE], |g| {
            doc(g)?.add("from binary")?;
            Ok(None)
        })
        .broken_binary(
            &[0xDE, 0xAD],
            ScriptFault::new(
                "System.Reflection.ReflectionTypeLoadException",
                "Unable to load one or more of the requested types",
            ),
        );
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let loaded = harness
        .orchestrator
        .run(Submission::from_binary(vec![0xCA, 0xFE]), harness.context())
        .await
        .unwrap();
    assert!(loaded.success);
    assert_eq!(loaded.script_name, "Compiled Script");

    let context = TestContext::new(&harness.document);
    let lines = context.lines.clone();
    let conflict = harness
        .orchestrator
        .run(
            Submission::from_binary(vec![0xDE, 0xAD]).with_name("Tagger"),
            Box::new(context),
        )
        .await
        .unwrap();
    assert_eq!(conflict.failure, Some(FailureKind::Conflict));
    assert_eq!(conflict.script_name, "Tagger");
    assert!(conflict.message.starts_with("Add-in conflict"));
    assert!(lines.lock().unwrap()[0].starts_with("Tip:"));

    assert_eq!(harness.document.committed(), vec!["from binary"]);
    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_only_context_never_commits() {
    let compiler = ScriptedCompiler::new().script("Preview();", |g| {
        doc(g)?.add("preview")?;
        g.print(format!("read only: {}", g.is_read_only()));
        Ok(None)
    });
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let mut context = TestContext::new(&harness.document);
    context.read_only = true;
    let result = harness
        .orchestrator
        .run(main_script("Preview();"), Box::new(context))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output, vec!["read only: true"]);
    assert!(harness.document.committed().is_empty());

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_document() {
    let compiler = ScriptedCompiler::new().script("Run();", |_| Ok(None));
    let harness = Harness::start(compiler, Duration::from_secs(5));

    let mut context = TestContext::new(&harness.document);
    context.document = None;
    let result = harness
        .orchestrator
        .run(main_script("Run();"), Box::new(context))
        .await
        .unwrap();
    assert_eq!(result.failure, Some(FailureKind::NoDocument));

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_run_on_the_host_thread() {
    let harness = Harness::start(ScriptedCompiler::new(), Duration::from_secs(5));

    let name = harness
        .orchestrator
        .query(|_host| Ok(std::thread::current().name().map(str::to_string)))
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some(common::HOST_THREAD_NAME));

    let failed = harness
        .orchestrator
        .query(|_host| -> anyhow::Result<()> { anyhow::bail!("nothing selected") })
        .await;
    assert!(matches!(failed, Err(Error::QueryFailed(ref m)) if m == "nothing selected"));

    let panicked = harness
        .orchestrator
        .query(|_host| -> anyhow::Result<()> { panic!("selection exploded") })
        .await;
    assert!(matches!(panicked, Err(Error::QueryPanicked(_))));

    let status = harness.orchestrator.status().await.unwrap();
    assert!(status.host_available);
    assert!(status.document_open);
    assert_eq!(status.document_title.as_deref(), Some("Test Project"));

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_before_initialize_fails() {
    let dispatcher = Arc::new(Dispatcher::<common::TestHost>::new());
    let orchestrator = Orchestrator::new(dispatcher, &EngineConfig::default());
    let document = common::DocumentHandle::default();

    let err = orchestrator
        .run(main_script("Run();"), TestContext::boxed(&document))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DispatcherNotInitialized));

    let status = orchestrator.status().await.unwrap();
    assert!(!status.host_available);
}

#[test]
fn test_host_thread_init_failure_is_reported() {
    let dispatcher = Arc::new(Dispatcher::<common::TestHost>::new());
    let (signal, wakeups) = channel_signal();
    dispatcher.initialize(signal);
    let runner = ScriptRunner::new(Arc::new(ScriptedCompiler::new()));

    let err = HostThread::spawn("failing-host", dispatcher, runner, wakeups, || {
        anyhow::bail!("no license")
    })
    .err()
    .expect("spawn should fail");
    assert!(err.to_string().contains("no license"));
}
