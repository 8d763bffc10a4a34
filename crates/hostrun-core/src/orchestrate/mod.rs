//! Execution orchestration.
//!
//! Turns one "run this" call into exactly one host-thread execution:
//!
//! ```text
//! run(submission, context)
//!     │  Received      build request (combination errors return here)
//!     │  LockAcquired  one-permit semaphore
//!     │  Dispatched    dispatcher.submit_request, watcher subscribed
//!     ▼
//!  Completed ── result delivered, recorded in history
//!  TimedOut  ── synthetic result delivered; the real one is recorded
//!               in history when it arrives
//! ```

mod history;
mod orchestrator;
mod state;

pub use history::{ExecutionHistory, HistoryEntry};
pub use orchestrator::Orchestrator;
pub use state::RunState;
