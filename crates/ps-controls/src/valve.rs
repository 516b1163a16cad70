//! Valve travel dynamics.
//!
//! Opening moves linearly toward the commanded target at
//! `(max_opening - min_opening) / full_travel_time` per second and snaps
//! onto the target once within [`PRECISION`].

use ps_core::{InternalState, ValueMap};
use serde::{Deserialize, Serialize};

use crate::error::{ComputationResult, ControlError, ControlResult};
use crate::instance::{ExecContext, ExecOutput, InstanceBehavior, finite, param_f64, signal_f64};

/// Snap tolerance in percent.
pub const PRECISION: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valve {
    pub min_opening: f64,
    pub max_opening: f64,
    /// Seconds to travel the full range.
    pub full_travel_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveState {
    /// Current opening (%).
    pub opening: f64,
}

impl Valve {
    pub fn new(min_opening: f64, max_opening: f64, full_travel_time: f64) -> ControlResult<Self> {
        if min_opening >= max_opening {
            return Err(ControlError::InvalidArg {
                what: "min_opening must be less than max_opening",
            });
        }
        if full_travel_time <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "full_travel_time must be positive",
            });
        }
        Ok(Self {
            min_opening,
            max_opening,
            full_travel_time,
        })
    }

    pub fn from_params(params: &ValueMap) -> ControlResult<Self> {
        Self::new(
            param_f64(params, "min_opening", 0.0)?,
            param_f64(params, "max_opening", 100.0)?,
            param_f64(params, "full_travel_time", 5.0)?,
        )
    }

    /// Percent per second.
    pub fn travel_speed(&self) -> f64 {
        (self.max_opening - self.min_opening) / self.full_travel_time
    }

    /// Advance by `dt` toward `target` (clamped to the valve range).
    pub fn step(&self, state: &ValveState, dt: f64, target: f64) -> ValveState {
        let target = target.clamp(self.min_opening, self.max_opening);
        let diff = target - state.opening;
        if diff.abs() < PRECISION {
            return ValveState { opening: target };
        }
        let max_change = self.travel_speed() * dt;
        let change = diff.clamp(-max_change, max_change);
        ValveState {
            opening: (state.opening + change).clamp(self.min_opening, self.max_opening),
        }
    }
}

/// `valve` instance type. Input `target_opening`; output `current_opening`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValveType;

impl InstanceBehavior for ValveType {
    fn type_tag(&self) -> &str {
        "valve"
    }

    fn validate(&self, params: &ValueMap) -> ControlResult<()> {
        Valve::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        inputs: &ValueMap,
        params: &ValueMap,
        state: &InternalState,
    ) -> ComputationResult<ExecOutput> {
        let valve = Valve::from_params(params)?;
        let prev = match state.decode::<ValveState>()? {
            Some(s) => s,
            None => ValveState {
                opening: param_f64(params, "initial_opening", valve.min_opening)?,
            },
        };
        let target = signal_f64(inputs, params, "target_opening", prev.opening)?;
        let next = valve.step(&prev, ctx.dt_s, target);

        let mut outputs = ValueMap::new();
        outputs.insert("current_opening".into(), finite("current_opening", next.opening)?);
        Ok(ExecOutput {
            outputs,
            state: InternalState::encode(&next)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::Value;

    #[test]
    fn rejects_bad_range() {
        assert!(Valve::new(50.0, 50.0, 5.0).is_err());
        assert!(Valve::new(0.0, 100.0, 0.0).is_err());
    }

    #[test]
    fn travel_is_rate_limited() {
        let v = Valve::new(0.0, 100.0, 5.0).unwrap();
        let s = v.step(&ValveState { opening: 0.0 }, 0.5, 100.0);
        assert_eq!(s.opening, 10.0);
        let s = v.step(&s, 0.5, 0.0);
        assert_eq!(s.opening, 0.0);
    }

    #[test]
    fn reaches_and_holds_target() {
        let v = Valve::new(0.0, 100.0, 5.0).unwrap();
        let mut s = ValveState { opening: 0.0 };
        for _ in 0..20 {
            s = v.step(&s, 0.5, 42.0);
        }
        assert_eq!(s.opening, 42.0);
    }

    #[test]
    fn target_clamped_to_range() {
        let v = Valve::new(10.0, 90.0, 1.0).unwrap();
        let s = v.step(&ValveState { opening: 89.995 }, 1.0, 150.0);
        assert_eq!(s.opening, 90.0);
    }

    #[test]
    fn instance_starts_at_min_opening() {
        let mut params = ValueMap::new();
        params.insert("min_opening".into(), Value::Float(20.0));
        let mut inputs = ValueMap::new();
        inputs.insert("target_opening".into(), Value::Float(100.0));
        let out = ValveType
            .execute(
                &ExecContext::new(0, 0.5),
                &inputs,
                &params,
                &InternalState::fresh(),
            )
            .unwrap();
        // 80 %/5 s * 0.5 s = 8 %
        assert_eq!(out.outputs.get("current_opening"), Some(&Value::Float(28.0)));
    }
}
