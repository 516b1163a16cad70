//! Instance execution contract and built-in components for plcsim.
//!
//! Every model and algorithm is a pluggable black box behind
//! [`InstanceBehavior`]. The scheduler only ever sees that trait; the
//! [`Registry`] maps configuration type tags to implementations.
//!
//! # Architecture
//!
//! - Each built-in splits into a plain configuration struct with a pure
//!   `step`/`update` function, and a unit type that adapts it to the
//!   uniform `(inputs, params, state) -> (outputs, state)` contract
//! - Internal state is an opaque [`ps_core::InternalState`] blob; each
//!   component encodes its own state struct into it
//!
//! # Built-ins
//!
//! - `pid`: PID controller with output clamping and anti-windup
//! - `valve`: rate-limited valve travel
//! - `cylindrical_tank`: level dynamics with Torricelli outflow

pub mod error;
pub mod instance;
pub mod pid;
pub mod registry;
pub mod tank;
pub mod valve;

pub use error::{ComputationError, ComputationResult, ControlError, ControlResult};
pub use instance::{ExecContext, ExecOutput, InstanceBehavior};
pub use pid::{PidController, PidState, PidType};
pub use registry::Registry;
pub use tank::{CylindricalTank, TankState, TankType};
pub use valve::{Valve, ValveState, ValveType};
