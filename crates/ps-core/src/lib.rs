//! ps-core: shared foundation for plcsim.
//!
//! Contains:
//! - value (signal `Value` and the ordered `ValueMap`)
//! - key (`SignalKey`, the `"instance.param"` address of a live slot)
//! - state (opaque per-instance `InternalState` blob)
//! - error (shared error types)

pub mod error;
pub mod key;
pub mod state;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use key::SignalKey;
pub use state::InternalState;
pub use value::{Value, ValueMap};
