//! PID controller.
//!
//! Rectangular integration, clamped integral, output limits `[l, h]` and
//! conditional anti-windup: when the output saturates in the direction of
//! the error, the latest integral increment is undone.

use ps_core::{InternalState, ValueMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ComputationResult, ControlError, ControlResult};
use crate::instance::{ExecContext, ExecOutput, InstanceBehavior, finite, param_f64, signal_f64};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidController {
    /// Proportional gain.
    pub kp: f64,
    /// Integral time (seconds). Zero disables integral action.
    pub ti: f64,
    /// Derivative time (seconds).
    pub td: f64,
    /// Output upper limit.
    pub h: f64,
    /// Output lower limit.
    pub l: f64,
}

impl Default for PidController {
    fn default() -> Self {
        Self {
            kp: 12.0,
            ti: 30.0,
            td: 0.15,
            h: 100.0,
            l: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidState {
    pub integral: f64,
    pub last_error: f64,
    /// No derivative kick on the first update.
    pub primed: bool,
}

impl Default for PidState {
    fn default() -> Self {
        Self {
            integral: 0.0,
            last_error: 0.0,
            primed: false,
        }
    }
}

impl PidController {
    pub fn new(kp: f64, ti: f64, td: f64, h: f64, l: f64) -> ControlResult<Self> {
        if !kp.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "kp must be finite",
            });
        }
        if ti < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "ti cannot be negative",
            });
        }
        if td < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "td cannot be negative",
            });
        }
        if h <= l {
            return Err(ControlError::InvalidArg {
                what: "h must be greater than l",
            });
        }
        Ok(Self { kp, ti, td, h, l })
    }

    pub fn from_params(params: &ValueMap) -> ControlResult<Self> {
        let d = Self::default();
        Self::new(
            param_f64(params, "kp", d.kp)?,
            param_f64(params, "ti", d.ti)?,
            param_f64(params, "td", d.td)?,
            param_f64(params, "h", d.h)?,
            param_f64(params, "l", d.l)?,
        )
    }

    fn integral_limit(&self, dt: f64) -> f64 {
        if self.ti > EPSILON && self.kp > EPSILON && dt > EPSILON {
            (self.h - self.l) * self.ti / self.kp * self.ti / dt
        } else {
            f64::INFINITY
        }
    }

    /// One controller step. Returns the new state and `mv`.
    pub fn update(&self, state: &PidState, pv: f64, sv: f64, dt: f64) -> (PidState, f64) {
        let error = sv - pv;
        let p_term = self.kp * error;

        let (mut integral, increment) = if self.ti > EPSILON {
            let increment = error * dt;
            let limit = self.integral_limit(dt);
            ((state.integral + increment).clamp(-limit, limit), increment)
        } else {
            (state.integral, 0.0)
        };
        let i_term = |integral: f64| {
            if self.ti > EPSILON {
                self.kp / self.ti * integral
            } else {
                0.0
            }
        };

        let d_term = if state.primed && dt > EPSILON {
            self.kp * self.td * (error - state.last_error) / dt
        } else {
            0.0
        };

        let mut mv = (p_term + i_term(integral) + d_term).clamp(self.l, self.h);

        let saturated_high = mv >= self.h && error > 0.0;
        let saturated_low = mv <= self.l && error < 0.0;
        if self.ti > EPSILON && (saturated_high || saturated_low) {
            integral -= increment;
            mv = (p_term + i_term(integral) + d_term).clamp(self.l, self.h);
        }

        let next = PidState {
            integral,
            last_error: error,
            primed: true,
        };
        (next, mv)
    }
}

/// `pid` instance type. Inputs `pv`, `sv`; output `mv`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PidType;

impl InstanceBehavior for PidType {
    fn type_tag(&self) -> &str {
        "pid"
    }

    fn validate(&self, params: &ValueMap) -> ControlResult<()> {
        PidController::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        inputs: &ValueMap,
        params: &ValueMap,
        state: &InternalState,
    ) -> ComputationResult<ExecOutput> {
        let pid = PidController::from_params(params)?;
        let prev: PidState = state.decode()?.unwrap_or_default();
        let pv = signal_f64(inputs, params, "pv", 0.0)?;
        let sv = signal_f64(inputs, params, "sv", 0.0)?;

        let (next, mv) = pid.update(&prev, pv, sv, ctx.dt_s);
        debug!(cycle = ctx.cycle, pv, sv, mv, "pid step");

        let mut outputs = ValueMap::new();
        outputs.insert("mv".into(), finite("mv", mv)?);
        Ok(ExecOutput {
            outputs,
            state: InternalState::encode(&next)?,
        })
    }
}
