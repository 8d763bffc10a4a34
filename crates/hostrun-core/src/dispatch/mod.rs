//! Host-thread dispatch.
//!
//! ```text
//! caller threads                      host thread
//!     │                                   │
//!     ├── submit_request ──┐              │
//!     ├── submit_query ────┤              │
//!     │                    ▼              │
//!     │             [ single slot ]       │
//!     │                    │   raise      │
//!     │                    └──────────▶ drain_on_host_thread
//!     │                                   ├── query → QueryHandle
//!     ◀──────── completion broadcast ─────┴── run   → ScriptRunner
//! ```
//!
//! # Module Structure
//!
//! - `dispatcher` - The mailbox, its overwrite policy and the completion broadcast
//! - `query` - Handles for host-thread queries
//! - `thread` - Channel-backed signal and a dedicated host thread

mod dispatcher;
mod query;
mod thread;

pub use dispatcher::{COMPLETION_CHANNEL_CAPACITY, Completion, Dispatcher};
pub use query::QueryHandle;
pub use thread::{ChannelSignal, HostThread, HostWakeups, channel_signal};
