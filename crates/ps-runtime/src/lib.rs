//! ps-runtime: the cyclic controller.
//!
//! Two layers:
//! - [`CycleEngine`] runs one cycle at a time, synchronously and
//!   deterministically: propagate inbound connections, execute instances
//!   in order, expose the published frame, apply a diff between cycles
//! - [`Scheduler`] drives an engine on its own thread at a fixed period,
//!   staging diffs, tag writes and stop requests for the cycle boundary and
//!   handing periodic snapshots to a writer thread
//!
//! # Cycle semantics
//!
//! Each instance pulls its inbound connections from the live value table
//! immediately before it executes. A producer earlier in the order delivers
//! this cycle's value; a producer later in the order (the edge closing a
//! feedback loop) delivers last cycle's value.

pub mod apply;
pub mod engine;
pub mod error;
pub mod options;
pub mod scheduler;
pub mod staging;

pub use apply::{AppliedDiff, apply_diff};
pub use engine::{CycleEngine, CycleOutcome, PublishedFrame};
pub use error::{DiffRejected, RuntimeError, RuntimeResult};
pub use options::SchedulerOptions;
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState, StopReport};
pub use staging::{DiffOutcome, DiffSummary, DiffTicket};
