//! Cylindrical tank with valve-controlled inflow and free outflow.
//!
//! Inflow `inlet_area * inlet_velocity * opening / 100`; outflow follows
//! Torricelli, `outlet_area * sqrt(2 g level)`. Level is clamped to
//! `[0, height]`.

use ps_core::{InternalState, ValueMap};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ComputationResult, ControlError, ControlResult};
use crate::instance::{ExecContext, ExecOutput, InstanceBehavior, finite, param_f64, signal_f64};

pub const GRAVITY: f64 = 9.81;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylindricalTank {
    /// m
    pub height: f64,
    /// m
    pub radius: f64,
    /// Fully open inlet area (m²).
    pub inlet_area: f64,
    /// m/s
    pub inlet_velocity: f64,
    /// m²
    pub outlet_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankState {
    /// m
    pub level: f64,
}

impl Default for CylindricalTank {
    fn default() -> Self {
        Self {
            height: 2.0,
            radius: 0.5,
            inlet_area: 0.06,
            inlet_velocity: 3.0,
            outlet_area: 0.001,
        }
    }
}

impl CylindricalTank {
    pub fn new(
        height: f64,
        radius: f64,
        inlet_area: f64,
        inlet_velocity: f64,
        outlet_area: f64,
    ) -> ControlResult<Self> {
        if height <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "height must be positive",
            });
        }
        if radius <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "radius must be positive",
            });
        }
        if inlet_area < 0.0 || outlet_area < 0.0 || inlet_velocity < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "areas and inlet velocity cannot be negative",
            });
        }
        Ok(Self {
            height,
            radius,
            inlet_area,
            inlet_velocity,
            outlet_area,
        })
    }

    pub fn from_params(params: &ValueMap) -> ControlResult<Self> {
        let d = Self::default();
        Self::new(
            param_f64(params, "height", d.height)?,
            param_f64(params, "radius", d.radius)?,
            param_f64(params, "inlet_area", d.inlet_area)?,
            param_f64(params, "inlet_velocity", d.inlet_velocity)?,
            param_f64(params, "outlet_area", d.outlet_area)?,
        )
    }

    pub fn base_area(&self) -> f64 {
        PI * self.radius * self.radius
    }

    /// m³/s at `opening` percent.
    pub fn inflow(&self, opening: f64) -> f64 {
        self.inlet_area * self.inlet_velocity * opening.clamp(0.0, 100.0) / 100.0
    }

    /// m³/s at `level`.
    pub fn outflow(&self, level: f64) -> f64 {
        if level > 0.0 {
            self.outlet_area * (2.0 * GRAVITY * level).sqrt()
        } else {
            0.0
        }
    }

    pub fn step(&self, state: &TankState, dt: f64, opening: f64) -> TankState {
        let net = self.inflow(opening) - self.outflow(state.level);
        let level = state.level + net * dt / self.base_area();
        TankState {
            level: level.clamp(0.0, self.height),
        }
    }
}

/// `cylindrical_tank` instance type. Input `valve_opening`; output `level`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TankType;

impl InstanceBehavior for TankType {
    fn type_tag(&self) -> &str {
        "cylindrical_tank"
    }

    fn validate(&self, params: &ValueMap) -> ControlResult<()> {
        CylindricalTank::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        inputs: &ValueMap,
        params: &ValueMap,
        state: &InternalState,
    ) -> ComputationResult<ExecOutput> {
        let tank = CylindricalTank::from_params(params)?;
        let prev = match state.decode::<TankState>()? {
            Some(s) => s,
            None => TankState {
                level: param_f64(params, "initial_level", 0.0)?.clamp(0.0, tank.height),
            },
        };
        let opening = signal_f64(inputs, params, "valve_opening", 0.0)?;
        let next = tank.step(&prev, ctx.dt_s, opening);

        let mut outputs = ValueMap::new();
        outputs.insert("level".into(), finite("level", next.level)?);
        Ok(ExecOutput {
            outputs,
            state: InternalState::encode(&next)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_valve_drains() {
        let tank = CylindricalTank::default();
        let s = tank.step(&TankState { level: 1.0 }, 0.5, 0.0);
        assert!(s.level < 1.0);
    }

    #[test]
    fn empty_tank_has_no_outflow() {
        let tank = CylindricalTank::default();
        assert_eq!(tank.outflow(0.0), 0.0);
        let s = tank.step(&TankState { level: 0.0 }, 0.5, 0.0);
        assert_eq!(s.level, 0.0);
    }

    #[test]
    fn open_valve_fills_until_height() {
        let tank = CylindricalTank::default();
        let mut s = TankState { level: 0.0 };
        for _ in 0..2_000 {
            s = tank.step(&s, 0.5, 100.0);
        }
        // Inflow 0.18 m³/s beats outflow at 2 m (~0.0063 m³/s).
        assert_eq!(s.level, tank.height);
    }

    #[test]
    fn opening_clamped() {
        let tank = CylindricalTank::default();
        assert_eq!(tank.inflow(150.0), tank.inflow(100.0));
        assert_eq!(tank.inflow(-5.0), 0.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn level_stays_in_bounds(level in 0.0..2.0f64, opening in -50.0..150.0f64, dt in 0.001..10.0f64) {
            let tank = CylindricalTank::default();
            let s = tank.step(&TankState { level }, dt, opening);
            prop_assert!(s.level >= 0.0 && s.level <= tank.height);
        }
    }
}
