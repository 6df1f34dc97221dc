//! Dispatch - run a protocol handler across many targets
//!
//! - `engine.rs` - semaphore-bounded fan-out with per-target isolation
//! - `progress.rs` - progress observer and terminal bar

mod engine;
mod progress;

pub use engine::{DispatchEngine, DispatchError, RunOutcome};
pub use progress::{ProgressObserver, TerminalProgress};
