//! A ready-made host thread for integrations without their own event loop.
//!
//! The host state is built in place on a dedicated named OS thread, which
//! then blocks on wake-ups and drains the dispatcher each time one arrives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::execute::ScriptRunner;
use crate::host::HostSignal;

use super::dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wakeup {
    Drain,
    Shutdown,
}

/// [`HostSignal`] backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    tx: mpsc::UnboundedSender<Wakeup>,
}

impl HostSignal for ChannelSignal {
    fn raise(&self) {
        if self.tx.send(Wakeup::Drain).is_err() {
            tracing::warn!("Host thread is gone; wake-up dropped");
        }
    }
}

/// Receiving end of a [`ChannelSignal`].
#[derive(Debug)]
pub struct HostWakeups {
    rx: mpsc::UnboundedReceiver<Wakeup>,
    tx: mpsc::UnboundedSender<Wakeup>,
}

impl HostWakeups {
    /// Block until the next wake-up. Returns `false` on shutdown.
    pub fn wait(&mut self) -> bool {
        matches!(self.rx.blocking_recv(), Some(Wakeup::Drain))
    }

    /// Non-blocking check, for hosts that poll from their own idle loop.
    pub fn poll(&mut self) -> Option<bool> {
        self.rx.try_recv().ok().map(|w| w == Wakeup::Drain)
    }

    fn stopper(&self) -> mpsc::UnboundedSender<Wakeup> {
        self.tx.clone()
    }
}

/// Build a connected signal and wake-up receiver.
pub fn channel_signal() -> (Arc<ChannelSignal>, HostWakeups) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSignal { tx: tx.clone() }), HostWakeups { rx, tx })
}

/// A dedicated OS thread standing in for the host's privileged thread.
pub struct HostThread {
    name: String,
    stop: mpsc::UnboundedSender<Wakeup>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HostThread {
    /// Spawn the thread, build the host state on it with `init`, and drain
    /// `dispatcher` on every wake-up until [`shutdown`](Self::shutdown).
    ///
    /// Returns once `init` has finished; its error is returned here. Work
    /// still in the dispatcher when the loop stops is resolved as abandoned.
    pub fn spawn<H, F>(
        name: impl Into<String>,
        dispatcher: Arc<Dispatcher<H>>,
        runner: ScriptRunner,
        mut wakeups: HostWakeups,
        init: F,
    ) -> Result<Self>
    where
        H: 'static,
        F: FnOnce() -> anyhow::Result<H> + Send + 'static,
    {
        let name = name.into();
        let stop = wakeups.stopper();
        let stopped = Arc::new(AtomicBool::new(false));
        let loop_stopped = stopped.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut host = match init() {
                    Ok(host) => {
                        let _ = ready_tx.send(Ok(()));
                        host
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };

                tracing::debug!("Host thread '{}' started", thread_name);
                while wakeups.wait() {
                    if loop_stopped.load(Ordering::Acquire) {
                        break;
                    }
                    dispatcher.drain_on_host_thread(&mut host, &runner);
                }
                dispatcher.abandon_pending(&format!("host thread '{}' stopped", thread_name));
                tracing::debug!("Host thread '{}' stopped", thread_name);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                name,
                stop,
                stopped,
                handle: Some(handle),
            }),
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(Error::HostUnavailable(format!(
                    "host initialization failed: {}",
                    message
                )))
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::HostUnavailable(
                    "host thread exited during initialization".to_string(),
                ))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop after the current drain and join the thread. A job
    /// still waiting in the slot is not run.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.stopped.store(true, Ordering::Release);
        let _ = self.stop.send(Wakeup::Shutdown);
        handle
            .join()
            .map_err(|_| Error::HostUnavailable(format!("host thread '{}' panicked", self.name)))
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::warn!("{}", e);
        }
    }
}
