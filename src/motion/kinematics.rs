//! Motor model and the Cartesian kinematic transform (spec §3, §9).
//!
//! The teacher kept a `Kinematics` trait with Cartesian and CoreXY bodies.
//! Only Cartesian survives here — the pipeline exposes the transform hook
//! the spec calls for, but no non-Cartesian transform is specified.

use crate::axes::{Axis, AxisVector};
use crate::config::{Config, MotorConfig};

pub const MOTOR_COUNT: usize = 4;

/// Cartesian transform hook (spec §1 Non-goals / §9 kinematic-transform hook).
pub trait Kinematics: Send + Sync {
    /// Canonical axis position → per-motor target position, in the motor's
    /// own length/angle units (before `steps_per_unit` is applied).
    fn axis_to_motor(&self, axis_position: &AxisVector, motors: &[MotorConfig; MOTOR_COUNT]) -> [f64; MOTOR_COUNT];
}

/// Cartesian kinematics: each motor drives exactly one axis 1:1 (spec §3).
/// Inhibited axes and unmapped motors contribute zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct CartesianKinematics;

impl Kinematics for CartesianKinematics {
    fn axis_to_motor(&self, axis_position: &AxisVector, motors: &[MotorConfig; MOTOR_COUNT]) -> [f64; MOTOR_COUNT] {
        let mut out = [0.0; MOTOR_COUNT];
        for (m, motor) in motors.iter().enumerate() {
            if let Some(axis) = motor.axis {
                out[m] = axis_position.get(axis);
            }
        }
        out
    }
}

/// Per-motor derived values recomputed from `MotorConfig` (spec §3 invariant:
/// `steps_per_unit` recomputed whenever any input changes — modeled here as a
/// pure function rather than a cached field, since the inputs are cheap).
#[derive(Debug, Clone, Copy)]
pub struct MotorGeometry {
    pub axis: Option<Axis>,
    pub steps_per_unit: f64,
}

pub fn motor_geometry(motors: &[MotorConfig; MOTOR_COUNT]) -> [MotorGeometry; MOTOR_COUNT] {
    let mut out = [MotorGeometry { axis: None, steps_per_unit: 0.0 }; MOTOR_COUNT];
    for (m, motor) in motors.iter().enumerate() {
        out[m] = MotorGeometry {
            axis: motor.axis,
            steps_per_unit: motor.steps_per_unit(),
        };
    }
    out
}

/// Motors mapped to each axis (an axis may be driven by more than one motor).
pub fn motors_for_axis(config: &Config, axis: Axis) -> Vec<usize> {
    config
        .motors
        .iter()
        .enumerate()
        .filter(|(_, m)| m.axis == Some(axis))
        .map(|(i, _)| i)
        .collect()
}

/// Whether a motor's mapped axis is currently inhibited (produces zero steps
/// regardless of commanded position, spec §3).
pub fn motor_is_inhibited(config: &Config, motor_index: usize) -> bool {
    match config.motors[motor_index].axis {
        Some(axis) => config.axis(axis).mode == crate::config::AxisMode::Disabled
            || config.axis(axis).mode == crate::config::AxisMode::Inhibited,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn cartesian_maps_motors_1to1() {
        let mut config = Config::default();
        config.motors[0].axis = Some(Axis::X);
        config.motors[1].axis = Some(Axis::Y);

        let pos = AxisVector::from([10.0, 20.0, 0.0, 0.0, 0.0, 0.0]);
        let out = CartesianKinematics.axis_to_motor(&pos, &config.motors);
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 20.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn inhibited_axis_flagged_regardless_of_position() {
        let mut config = Config::default();
        config.motors[0].axis = Some(Axis::X);
        config.axes[Axis::X.index()].mode = crate::config::AxisMode::Inhibited;
        assert!(motor_is_inhibited(&config, 0));
    }

    #[test]
    fn unmapped_motor_is_inhibited() {
        let config = Config::default();
        assert!(motor_is_inhibited(&config, 2));
    }

    #[test]
    fn axis_with_no_motor_has_empty_list() {
        let config = Config::default();
        assert!(motors_for_axis(&config, Axis::C).is_empty());
    }
}
