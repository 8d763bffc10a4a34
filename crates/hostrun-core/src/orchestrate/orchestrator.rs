//! One-at-a-time execution with a deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Semaphore, broadcast, oneshot};
use tokio::time::Instant;

use crate::combine::CombineOptions;
use crate::config::EngineConfig;
use crate::dispatch::{Completion, Dispatcher};
use crate::error::{Error, Result};
use crate::execute::{ExecutionRequest, ExecutionResult, FailureKind, RequestId, Submission};
use crate::host::{ExecutionContext, HostApplication, HostStatus};

use super::history::ExecutionHistory;
use super::state::{RunState, StateCell};

/// Serializes runs through one permit and applies the deadline.
///
/// The permit keeps two runs from racing for the mailbox; the mailbox keeps
/// the host thread from ever queueing more than one unit of work. A run
/// never replaces a job still waiting in the mailbox, so every timed-out
/// request either runs or is withdrawn, never silently dropped.
pub struct Orchestrator<H> {
    dispatcher: Arc<Dispatcher<H>>,
    permit: Arc<Semaphore>,
    deadline: Duration,
    combine: CombineOptions,
    history: Arc<ExecutionHistory>,
}

impl<H: 'static> Orchestrator<H> {
    pub fn new(dispatcher: Arc<Dispatcher<H>>, config: &EngineConfig) -> Self {
        Self {
            dispatcher,
            permit: Arc::new(Semaphore::new(1)),
            deadline: config.deadline,
            combine: config.combine,
            history: Arc::new(ExecutionHistory::new(config.history_capacity)),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<H>> {
        &self.dispatcher
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Run a submission on the host thread and wait for its result.
    ///
    /// Every failure of the script or the host comes back as a failed
    /// [`ExecutionResult`]; the only error is
    /// [`Error::DispatcherNotInitialized`].
    pub async fn run(
        &self,
        submission: Submission,
        context: Box<dyn ExecutionContext>,
    ) -> Result<ExecutionResult> {
        let id = RequestId::new();
        let state = Arc::new(StateCell::new());
        let fallback_name = submission.fallback_name();

        let built = ExecutionRequest::build_with_id(id, submission, context, &self.combine);
        let request = match built {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Request {} rejected before dispatch: {}", id, e);
                let result = ExecutionResult::failed(
                    id,
                    fallback_name,
                    FailureKind::Combination,
                    e.to_string(),
                )
                .with_details(vec![e.with_hint()]);
                self.history.record(result.clone(), true);
                return Ok(result);
            }
        };
        let script_name = request.script_name.clone();

        if !self.dispatcher.is_initialized() {
            return Err(Error::DispatcherNotInitialized);
        }

        let _permit = self
            .permit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::HostUnavailable("execution permit closed".to_string()))?;
        state.advance(RunState::Received, RunState::LockAcquired);
        tracing::debug!("Request {} acquired the execution permit", id);
        let deadline_at = Instant::now() + self.deadline;

        // A timed-out request may still occupy the slot; wait for the host to
        // take it rather than replacing it.
        let completions = self.dispatcher.subscribe();
        let submitted =
            tokio::time::timeout_at(deadline_at, self.dispatcher.submit_request_when_vacant(request))
                .await;
        match submitted {
            Ok(submitted) => submitted?,
            Err(_) => {
                state.advance(RunState::LockAcquired, RunState::TimedOut);
                tracing::warn!(
                    "Request {} ({}) never reached the host: still busy after {:?}",
                    id,
                    script_name,
                    self.deadline
                );
                let result = self.timed_out(
                    id,
                    script_name,
                    "The host was still busy with an earlier request; this request was never started",
                );
                self.history.record(result.clone(), true);
                return Ok(result);
            }
        }
        state.advance(RunState::LockAcquired, RunState::Dispatched);

        let (tx, mut rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_completion(
            completions,
            id,
            script_name.clone(),
            state.clone(),
            self.history.clone(),
            tx,
        ));

        let result = match tokio::time::timeout_at(deadline_at, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => host_gone(id, script_name),
            Err(_) if state.advance(RunState::Dispatched, RunState::TimedOut) => {
                if self.dispatcher.withdraw_request(id) {
                    watcher.abort();
                    tracing::warn!(
                        "Request {} ({}) timed out after {:?} before the host started it; withdrawn",
                        id,
                        script_name,
                        self.deadline
                    );
                    let result = self.timed_out(
                        id,
                        script_name,
                        "The host never started this request; it was withdrawn and will not run",
                    );
                    self.history.record(result.clone(), true);
                    result
                } else {
                    tracing::warn!(
                        "Request {} ({}) timed out after {:?}; the host keeps running it",
                        id,
                        script_name,
                        self.deadline
                    );
                    self.timed_out(
                        id,
                        script_name,
                        "The host had already started the script; its result will be recorded in history",
                    )
                }
            }
            // The completion won the race at the deadline and is already sent.
            Err(_) => rx.await.unwrap_or_else(|_| host_gone(id, script_name)),
        };

        tracing::debug!("Request {} finished in state {:?}", id, state.get());
        Ok(result)
    }

    fn timed_out(&self, id: RequestId, script_name: String, detail: &str) -> ExecutionResult {
        ExecutionResult::failed(
            id,
            script_name,
            FailureKind::TimedOut,
            format!("Execution timed out after {:?}", self.deadline),
        )
        .with_details(vec![detail.to_string()])
    }

    /// Run a closure on the host thread under the execution permit.
    pub async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut H) -> anyhow::Result<T> + Send + 'static,
    {
        let _permit = self
            .permit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::HostUnavailable("execution permit closed".to_string()))?;

        let unanswered = || {
            Error::HostUnavailable(format!("host did not answer within {:?}", self.deadline))
        };
        let deadline_at = Instant::now() + self.deadline;
        let handle =
            tokio::time::timeout_at(deadline_at, self.dispatcher.submit_query_when_vacant(f))
                .await
                .map_err(|_| unanswered())??;
        tokio::time::timeout_at(deadline_at, handle.wait())
            .await
            .map_err(|_| unanswered())?
    }
}

impl<H: HostApplication> Orchestrator<H> {
    /// Host availability and document state. An unreachable host reports
    /// itself unavailable rather than failing.
    pub async fn status(&self) -> Result<HostStatus> {
        match self.query(|host: &mut H| Ok(host.status())).await {
            Ok(status) => Ok(status),
            Err(Error::DispatcherNotInitialized | Error::HostUnavailable(_)) => {
                Ok(HostStatus::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// Close out `id` after its completion fell out of the broadcast buffer.
fn record_lost(
    id: RequestId,
    script_name: String,
    state: &StateCell,
    history: &ExecutionHistory,
    deliver: oneshot::Sender<ExecutionResult>,
) {
    let result = ExecutionResult::failed(
        id,
        script_name,
        FailureKind::HostUnavailable,
        "The completion of this request was lost; the host result is unknown",
    );
    if state.advance(RunState::Dispatched, RunState::Completed) {
        history.record(result.clone(), true);
        if deliver.send(result).is_err() {
            tracing::debug!("Caller for {} went away before delivery", id);
        }
    } else {
        history.record(result, false);
    }
}

fn host_gone(id: RequestId, script_name: String) -> ExecutionResult {
    ExecutionResult::failed(
        id,
        script_name,
        FailureKind::HostUnavailable,
        "The host stopped before completing the request",
    )
}

/// Wait for the completion of `id`. Delivers it if the caller is still
/// waiting, otherwise records it as a late result.
async fn watch_completion(
    mut completions: broadcast::Receiver<Completion>,
    id: RequestId,
    script_name: String,
    state: Arc<StateCell>,
    history: Arc<ExecutionHistory>,
    deliver: oneshot::Sender<ExecutionResult>,
) {
    let completion = loop {
        match completions.recv().await {
            Ok(completion) if completion.request_id == id => break completion,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                // The skipped completions may include ours; waiting on would hang.
                tracing::warn!(
                    "Completion watcher for {} lagged, {} completions skipped",
                    id,
                    skipped
                );
                record_lost(id, script_name, &state, &history, deliver);
                return;
            }
            Err(RecvError::Closed) => {
                tracing::warn!("Completion channel closed while waiting for {}", id);
                return;
            }
        }
    };

    let result = completion.result;
    if state.advance(RunState::Dispatched, RunState::Completed) {
        history.record(result.clone(), true);
        if deliver.send(result).is_err() {
            tracing::debug!("Caller for {} went away before delivery", id);
        }
    } else {
        tracing::warn!(
            "Late result for {} ({}) arrived after timeout (success: {}); recorded in history",
            id,
            result.script_name,
            result.success
        );
        history.record(result, false);
    }
}
