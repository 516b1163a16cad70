//! The uniform execution capability every model and algorithm implements.

use ps_core::{InternalState, Value, ValueMap};

use crate::error::{ComputationError, ComputationResult, ControlError, ControlResult};

/// Timing information for one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecContext {
    /// Zero-based cycle counter.
    pub cycle: u64,
    /// Live cycle period (seconds). Used as the integration step.
    pub dt_s: f64,
    /// `cycle * dt_s`.
    pub sim_time_s: f64,
}

impl ExecContext {
    pub fn new(cycle: u64, dt_s: f64) -> Self {
        Self {
            cycle,
            dt_s,
            sim_time_s: cycle as f64 * dt_s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutput {
    /// Parameter name -> value, written to `"<instance>.<name>"`.
    pub outputs: ValueMap,
    pub state: InternalState,
}

/// One model or algorithm type.
///
/// `inputs` is the instance's view of the live value table (every slot
/// `"<instance>.*"`, keyed by parameter name) after its inbound connections
/// were copied in. `params` is the configured parameter set.
///
/// Implementations must be deterministic and must return promptly: the
/// scheduler neither times out nor preempts an execution.
pub trait InstanceBehavior: Send + Sync {
    fn type_tag(&self) -> &str;

    /// Check a full parameter set before it is accepted into configuration.
    fn validate(&self, _params: &ValueMap) -> ControlResult<()> {
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        inputs: &ValueMap,
        params: &ValueMap,
        state: &InternalState,
    ) -> ComputationResult<ExecOutput>;
}

/// Numeric parameter with a default when absent.
pub(crate) fn param_f64(params: &ValueMap, key: &str, default: f64) -> ControlResult<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| ControlError::NotNumeric {
            param: key.to_string(),
        }),
    }
}

/// Numeric signal: the live slot first, then the configured param, then `default`.
pub(crate) fn signal_f64(
    inputs: &ValueMap,
    params: &ValueMap,
    key: &str,
    default: f64,
) -> ComputationResult<f64> {
    match inputs.get(key).or_else(|| params.get(key)) {
        None => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| ComputationError::BadInput {
            input: key.to_string(),
        }),
    }
}

pub(crate) fn finite(what: &'static str, value: f64) -> ComputationResult<Value> {
    if value.is_finite() {
        Ok(Value::Float(value))
    } else {
        Err(ComputationError::NonFinite { what, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_prefers_live_slot() {
        let mut inputs = ValueMap::new();
        let mut params = ValueMap::new();
        params.insert("sv".into(), Value::Float(1.0));
        assert_eq!(signal_f64(&inputs, &params, "sv", 0.0).unwrap(), 1.0);
        inputs.insert("sv".into(), Value::Float(2.0));
        assert_eq!(signal_f64(&inputs, &params, "sv", 0.0).unwrap(), 2.0);
        assert_eq!(signal_f64(&inputs, &params, "pv", 9.0).unwrap(), 9.0);
        inputs.insert("pv".into(), Value::from("high"));
        assert!(matches!(
            signal_f64(&inputs, &params, "pv", 0.0),
            Err(ComputationError::BadInput { .. })
        ));
    }

    #[test]
    fn context_sim_time() {
        let ctx = ExecContext::new(4, 0.5);
        assert_eq!(ctx.sim_time_s, 2.0);
    }

    #[test]
    fn finite_guard() {
        assert!(finite("x", 1.0).is_ok());
        assert!(finite("x", f64::NAN).is_err());
    }
}
