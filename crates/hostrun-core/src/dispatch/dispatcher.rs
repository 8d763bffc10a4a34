//! The single-slot mailbox between caller threads and the host thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::{Notify, broadcast, oneshot};

use crate::error::{Error, Result};
use crate::execute::{
    ExecutionRequest, ExecutionResult, FailureKind, RequestId, ScriptRunner, panic_message,
};
use crate::host::HostSignal;

use super::query::QueryHandle;

/// Default capacity of the completion broadcast.
/// Slow observers that fall further behind lose the oldest completions.
pub const COMPLETION_CHANNEL_CAPACITY: usize = 64;

/// A finished run, as broadcast to every subscriber.
#[derive(Debug, Clone)]
pub struct Completion {
    pub request_id: RequestId,
    /// Who submitted the request.
    pub source: String,
    pub result: ExecutionResult,
}

type QueryJob<H> = Box<dyn FnOnce(&mut H) + Send>;

/// The two kinds of work sharing the slot.
enum Job<H> {
    Run(ExecutionRequest),
    Query(QueryJob<H>),
}

/// Bridges arbitrary threads to the host's privileged thread.
///
/// Holds at most one job. [`submit_request`](Self::submit_request) and
/// [`submit_query`](Self::submit_query) replace a job still waiting in the
/// slot and resolve it: a displaced run is broadcast as a `Superseded`
/// failure, a displaced query resolves to [`Error::QueryAbandoned`]. Nothing
/// is dropped silently. The `*_when_vacant` variants never replace; they wait
/// until the host has taken the previous job.
///
/// `H` is the host state the drain loop owns; queries receive `&mut H`.
pub struct Dispatcher<H> {
    slot: Mutex<Option<Job<H>>>,
    /// Set while a raise is outstanding; cleared by the drain.
    pending: AtomicBool,
    signal: OnceLock<Arc<dyn HostSignal>>,
    /// Notified whenever the slot is emptied.
    vacated: Notify,
    completions: broadcast::Sender<Completion>,
}

impl<H: 'static> Dispatcher<H> {
    pub fn new() -> Self {
        Self::with_capacity(COMPLETION_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(completion_capacity: usize) -> Self {
        let (completions, _) = broadcast::channel(completion_capacity.max(1));
        Self {
            slot: Mutex::new(None),
            pending: AtomicBool::new(false),
            signal: OnceLock::new(),
            vacated: Notify::new(),
            completions,
        }
    }

    /// Bind the host wake-up primitive. Only the first call has an effect.
    pub fn initialize(&self, signal: Arc<dyn HostSignal>) {
        if self.signal.set(signal).is_err() {
            tracing::debug!("Dispatcher already initialized; ignoring new signal");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.signal.get().is_some()
    }

    /// Whether a raise is outstanding and not yet drained.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether a job is waiting in the slot.
    pub fn is_occupied(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Subscribe to completions of every run.
    pub fn subscribe(&self) -> broadcast::Receiver<Completion> {
        self.completions.subscribe()
    }

    /// Store a run job and wake the host. Returns immediately; the outcome
    /// arrives on the completion broadcast.
    pub fn submit_request(&self, request: ExecutionRequest) -> Result<()> {
        tracing::debug!("Submitting request {} ({})", request.id, request.script_name);
        self.store(Job::Run(request))
    }

    /// Store a closure to run on the host thread and return a handle to its
    /// value.
    pub fn submit_query<T, F>(&self, f: F) -> Result<QueryHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut H) -> anyhow::Result<T> + Send + 'static,
    {
        let (job, handle) = query_job(f);
        self.store(job)?;
        Ok(handle)
    }

    /// Like [`submit_request`](Self::submit_request), but waits for the slot
    /// to be empty instead of replacing the job in it.
    pub async fn submit_request_when_vacant(&self, request: ExecutionRequest) -> Result<()> {
        tracing::debug!(
            "Submitting request {} ({}) once the slot is free",
            request.id,
            request.script_name
        );
        self.store_when_vacant(Job::Run(request)).await
    }

    /// Like [`submit_query`](Self::submit_query), but waits for the slot to
    /// be empty instead of replacing the job in it.
    pub async fn submit_query_when_vacant<T, F>(&self, f: F) -> Result<QueryHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut H) -> anyhow::Result<T> + Send + 'static,
    {
        let (job, handle) = query_job(f);
        self.store_when_vacant(job).await?;
        Ok(handle)
    }

    /// Take request `id` back out of the slot if the host has not started it.
    ///
    /// Returns `true` when the request was withdrawn; it will never run and
    /// no completion is published for it.
    pub fn withdraw_request(&self, id: RequestId) -> bool {
        let withdrawn = {
            let mut slot = self.lock_slot();
            match slot.as_ref() {
                Some(Job::Run(request)) if request.id == id => slot.take(),
                _ => None,
            }
        };
        match withdrawn {
            Some(_) => {
                tracing::debug!("Request {} withdrawn before the host started it", id);
                self.vacated.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Resolve whatever is left in the slot when the host stops draining.
    ///
    /// A waiting run is broadcast as a `HostUnavailable` failure; a waiting
    /// query resolves to [`Error::QueryAbandoned`].
    pub fn abandon_pending(&self, reason: &str) {
        let Some(job) = self.lock_slot().take() else {
            return;
        };
        self.vacated.notify_waiters();
        match job {
            Job::Run(request) => {
                tracing::warn!(
                    "Request {} ({}) abandoned: {}",
                    request.id,
                    request.script_name,
                    reason
                );
                let result = ExecutionResult::failed(
                    request.id,
                    request.script_name,
                    FailureKind::HostUnavailable,
                    format!("The host stopped before running the request: {}", reason),
                );
                self.publish(Completion {
                    request_id: request.id,
                    source: request.source,
                    result,
                });
            }
            Job::Query(_) => tracing::warn!("A pending query was abandoned: {}", reason),
        }
    }

    /// Run whatever is in the slot. Call only on the host thread.
    ///
    /// Returns `false` when the slot was empty (spurious wake-up).
    pub fn drain_on_host_thread(&self, host: &mut H, runner: &ScriptRunner) -> bool {
        self.pending.store(false, Ordering::Release);
        let Some(job) = self.lock_slot().take() else {
            tracing::debug!("Drain found an empty slot");
            return false;
        };
        self.vacated.notify_waiters();

        match job {
            Job::Query(query) => query(host),
            Job::Run(request) => {
                let request_id = request.id;
                let source = request.source.clone();
                let script_name = request.script_name.clone();

                let result = catch_unwind(AssertUnwindSafe(|| runner.execute(request)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(&*payload);
                        tracing::error!("Execution of {} panicked: {}", request_id, message);
                        ExecutionResult::failed(
                            request_id,
                            script_name,
                            FailureKind::Runtime,
                            format!("Execution panicked: {}", message),
                        )
                    });

                self.publish(Completion {
                    request_id,
                    source,
                    result,
                });
            }
        }
        true
    }

    fn store(&self, job: Job<H>) -> Result<()> {
        let signal = self.signal()?;

        let displaced = self.lock_slot().replace(job);
        if let Some(displaced) = displaced {
            self.resolve_displaced(displaced);
        }

        self.raise(signal);
        Ok(())
    }

    async fn store_when_vacant(&self, mut job: Job<H>) -> Result<()> {
        let signal = self.signal()?;
        loop {
            // Registered before the check so a vacancy in between is not missed.
            let vacated = self.vacated.notified();
            match self.place_if_vacant(job) {
                None => {
                    self.raise(signal);
                    return Ok(());
                }
                Some(returned) => job = returned,
            }
            vacated.await;
        }
    }

    /// Put `job` in the slot if it is empty; hands it back otherwise.
    fn place_if_vacant(&self, job: Job<H>) -> Option<Job<H>> {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return Some(job);
        }
        *slot = Some(job);
        None
    }

    fn signal(&self) -> Result<&Arc<dyn HostSignal>> {
        self.signal.get().ok_or(Error::DispatcherNotInitialized)
    }

    fn raise(&self, signal: &Arc<dyn HostSignal>) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            signal.raise();
        }
    }

    fn resolve_displaced(&self, job: Job<H>) {
        match job {
            Job::Run(request) => {
                tracing::warn!(
                    "Request {} ({}) was superseded before the host ran it",
                    request.id,
                    request.script_name
                );
                let result = ExecutionResult::failed(
                    request.id,
                    request.script_name,
                    FailureKind::Superseded,
                    "Superseded by a newer submission before the host ran it",
                );
                self.publish(Completion {
                    request_id: request.id,
                    source: request.source,
                    result,
                });
            }
            Job::Query(_) => {
                tracing::warn!("A pending query was abandoned by a newer submission");
            }
        }
    }

    fn publish(&self, completion: Completion) {
        if self.completions.send(completion).is_err() {
            tracing::debug!("No completion subscribers");
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Job<H>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wrap `f` so that its outcome, error or panic reaches the returned handle.
fn query_job<H, T, F>(f: F) -> (Job<H>, QueryHandle<T>)
where
    H: 'static,
    T: Send + 'static,
    F: FnOnce(&mut H) -> anyhow::Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: QueryJob<H> = Box::new(move |host: &mut H| {
        let outcome = match catch_unwind(AssertUnwindSafe(|| f(host))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::QueryFailed(format!("{:#}", e))),
            Err(payload) => Err(Error::QueryPanicked(panic_message(&*payload))),
        };
        if tx.send(outcome).is_err() {
            tracing::debug!("Query caller went away before the result was ready");
        }
    });
    (Job::Query(job), QueryHandle::new(rx))
}

impl<H: 'static> Default for Dispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}
