//! `status_report()` (spec §6): a snapshot of machine/cycle/motion/hold/
//! homing state, position, and active modal state, for the protocol layer
//! to serialize however it likes.

use crate::axes::{Axis, AxisVector};
use crate::config::{Config, DistanceMode, FeedRateMode, Plane, Units};
use crate::gcode::{CanonicalMachine, MotionMode, MotionSink};
use crate::motion::MotionController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Init,
    Ready,
    Alarm,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
    Holding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    NotHolding,
    Holding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingState {
    NotHomed,
    Partial,
    Homed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub machine_state: MachineState,
    pub cycle_state: CycleState,
    pub motion_state: MotionState,
    pub hold_state: HoldState,
    pub homing_state: HomingState,
    pub line_no: u32,
    pub velocity: f64,
    /// Work-coordinate position (machine position minus the active offset).
    pub position: AxisVector,
    /// Absolute machine position, offsets not applied.
    pub machine_position: AxisVector,
    pub work_offsets: AxisVector,
    pub units: Units,
    pub coord_system: u8,
    pub motion_mode: MotionMode,
    pub plane: Plane,
    pub distance_mode: DistanceMode,
    pub feed_rate_mode: FeedRateMode,
}

pub fn status_report<S: MotionSink>(
    machine: &CanonicalMachine<S>,
    motion: &MotionController,
    config: &Config,
    last_line_no: u32,
    machine_state: MachineState,
) -> StatusReport {
    let mut work_offsets = AxisVector::ZERO;
    for i in 0..6 {
        let axis = Axis::from_index(i).expect("index < 6");
        work_offsets.set(
            axis,
            config.coord_systems[machine.modal.coord_system as usize].offset.get(axis) + machine.pos.g92_offset.get(axis),
        );
    }

    let machine_position = motion.current_position();
    let position = machine_position.sub(&work_offsets);
    let velocity = motion.queue().running().map(|b| b.cruise_velocity).unwrap_or(0.0);

    let cycle_state = if motion.queue().held() {
        CycleState::Holding
    } else if motion.queue().is_empty() {
        CycleState::Idle
    } else {
        CycleState::Running
    };
    let motion_state = if motion.queue().running().is_some() { MotionState::Running } else { MotionState::Stopped };
    let hold_state = if motion.queue().held() { HoldState::Holding } else { HoldState::NotHolding };
    let homed_count = machine.pos.homed.iter().filter(|h| **h).count();
    let homing_state = match homed_count {
        0 => HomingState::NotHomed,
        6 => HomingState::Homed,
        _ => HomingState::Partial,
    };

    StatusReport {
        machine_state,
        cycle_state,
        motion_state,
        hold_state,
        homing_state,
        line_no: last_line_no,
        velocity,
        position,
        machine_position,
        work_offsets,
        units: machine.modal.units,
        coord_system: machine.modal.coord_system,
        motion_mode: machine.modal.motion_mode,
        plane: machine.modal.plane,
        distance_mode: machine.modal.distance_mode,
        feed_rate_mode: machine.modal.feed_rate_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::CanonicalMachine;

    struct NullSink;
    impl MotionSink for NullSink {
        fn accept_line(&mut self, _line: crate::gcode::LinePrimitive) -> crate::error::BlockResult {
            Ok(())
        }
        fn accept_dwell(&mut self, _dwell: crate::gcode::DwellPrimitive) -> crate::error::BlockResult {
            Ok(())
        }
        fn accept_command(&mut self, _command: crate::gcode::CommandPrimitive) -> crate::error::BlockResult {
            Ok(())
        }
    }

    #[test]
    fn fresh_machine_reports_idle_not_homed() {
        let config = Config::default();
        let machine = CanonicalMachine::new(&config, NullSink);
        let motion = MotionController::new(&config);
        let report = status_report(&machine, &motion, &config, 0, MachineState::Ready);
        assert_eq!(report.cycle_state, CycleState::Idle);
        assert_eq!(report.homing_state, HomingState::NotHomed);
        assert_eq!(report.motion_state, MotionState::Stopped);
    }
}
