//! Segment runtime: walks a running planner buffer's jerk-limited profile
//! forward in fixed-time micro-segments, projecting canonical position onto
//! motor space each tick and loading the result into the stepper executor
//! (spec §4.4).
//!
//! Grounded in the teacher's `StepGenerator::generate_interpolated_steps`
//! (fixed-count interpolation along a straight segment), generalized from
//! linear interpolation to the jerk-limited velocity profile computed by
//! the planner, and from 4 fixed axes to the kinematic motor projection.

use crate::axes::AxisVector;
use crate::config::Config;
use crate::motion::kinematics::{motor_geometry, motor_is_inhibited, Kinematics, MOTOR_COUNT};
use crate::motion::planner::PlannerBuffer;
use crate::motion::profile::JerkRamp;
use crate::motion::stepper::StepperExecutor;

/// Which part of the jerk-limited profile elapsed time `t` falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePhase {
    Head,
    Body,
    Tail,
}

pub struct SegmentRuntime {
    dda_ticks_per_segment: u32,
}

impl SegmentRuntime {
    pub fn new(config: &Config) -> Self {
        let ticks = (config.system.segment_time / config.system.dda_tick_period).round();
        Self { dda_ticks_per_segment: if ticks.is_finite() { ticks.max(1.0) as u32 } else { 1 } }
    }

    pub fn dda_ticks_per_segment(&self) -> u32 {
        self.dda_ticks_per_segment
    }

    fn phase_at(&self, buffer: &PlannerBuffer, head_time: f64, body_time: f64, t: f64) -> ProfilePhase {
        if t <= head_time {
            ProfilePhase::Head
        } else if t <= head_time + body_time {
            ProfilePhase::Body
        } else {
            let _ = buffer;
            ProfilePhase::Tail
        }
    }

    /// Path distance covered from the start of `buffer`'s move through
    /// elapsed time `t`.
    fn distance_along(&self, buffer: &PlannerBuffer, t: f64) -> f64 {
        let head = JerkRamp::new(buffer.entry_velocity, buffer.cruise_velocity, buffer.jerk);
        let body_time = if buffer.cruise_velocity > 1e-9 { buffer.body_length / buffer.cruise_velocity } else { 0.0 };
        let tail = JerkRamp::new(buffer.cruise_velocity, buffer.exit_velocity, buffer.jerk);
        match self.phase_at(buffer, head.total_time, body_time, t) {
            ProfilePhase::Head => head.distance_at(t),
            ProfilePhase::Body => buffer.head_length + buffer.cruise_velocity * (t - head.total_time),
            ProfilePhase::Tail => {
                let tail_t = (t - head.total_time - body_time).clamp(0.0, tail.total_time);
                buffer.head_length + buffer.body_length + tail.distance_at(tail_t)
            }
        }
    }

    /// Advances one `segment_time` micro-segment of `buffer`'s move,
    /// starting at `elapsed_before` seconds and `last_axis_position`.
    /// Loads each motor's step delta for this micro-segment into
    /// `executor`, spread over `dda_ticks_per_segment` DDA ticks. Returns
    /// the new elapsed time, the new canonical axis position, and whether
    /// the move is now fully traversed.
    pub fn prepare_segment(
        &self,
        buffer: &PlannerBuffer,
        elapsed_before: f64,
        move_start_position: &AxisVector,
        last_axis_position: &AxisVector,
        config: &Config,
        kinematics: &dyn Kinematics,
        executor: &mut StepperExecutor,
    ) -> (f64, AxisVector, bool) {
        let segment_time = config.system.segment_time.max(1e-9);
        let elapsed_after = (elapsed_before + segment_time).min(buffer.time);

        let distance_after = self.distance_along(buffer, elapsed_after);
        let mut new_position = *move_start_position;
        for i in 0..6 {
            new_position.0[i] = move_start_position.0[i] + buffer.unit.0[i] * distance_after;
        }

        let geometry = motor_geometry(&config.motors);
        let prev_motor = kinematics.axis_to_motor(last_axis_position, &config.motors);
        let next_motor = kinematics.axis_to_motor(&new_position, &config.motors);

        for motor in 0..MOTOR_COUNT {
            if motor_is_inhibited(config, motor) {
                executor.load_segment(motor, 0.0, self.dda_ticks_per_segment);
                continue;
            }
            let delta_units = next_motor[motor] - prev_motor[motor];
            let delta_steps = delta_units * geometry[motor].steps_per_unit;
            executor.load_segment(motor, delta_steps, self.dda_ticks_per_segment);
        }

        let finished = elapsed_after >= buffer.time - 1e-9;
        (elapsed_after, new_position, finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::motion::kinematics::CartesianKinematics;
    use crate::motion::planner::{MoveState, MoveType};

    fn buffer_for(length: f64, cruise: f64, jerk: f64) -> PlannerBuffer {
        let jerk_ramp = JerkRamp::new(0.0, cruise, jerk);
        let head_length = jerk_ramp.length.min(length / 2.0);
        let tail_length = head_length;
        let body_length = (length - head_length - tail_length).max(0.0);
        let body_time = if cruise > 0.0 { body_length / cruise } else { 0.0 };
        PlannerBuffer {
            line_no: 1,
            move_type: MoveType::Line,
            move_state: MoveState::New,
            target: AxisVector::from([length, 0.0, 0.0, 0.0, 0.0, 0.0]),
            unit: AxisVector::from([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            length,
            cruise_vmax: cruise,
            delta_vmax: 0.0,
            jerk,
            entry_vmax: 0.0,
            braking_velocity: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: cruise,
            exit_velocity: 0.0,
            head_length,
            body_length,
            tail_length,
            time: jerk_ramp.total_time * 2.0 + body_time,
            replannable: false,
            command: None,
            dwell_seconds: None,
        }
    }

    #[test]
    fn runtime_reaches_full_length_by_end_of_move() {
        let mut config = Config::default();
        config.motors[0].axis = Some(crate::axes::Axis::X);
        config.system.segment_time = 0.001;
        config.system.dda_tick_period = 0.0001;

        let buffer = buffer_for(50.0, 30.0, 2_000_000.0);
        let runtime = SegmentRuntime::new(&config);
        let mut executor = StepperExecutor::new();
        let kinematics = CartesianKinematics;

        let mut elapsed = 0.0;
        let mut position = AxisVector::ZERO;
        loop {
            let (next_elapsed, next_position, finished) = runtime.prepare_segment(
                &buffer,
                elapsed,
                &AxisVector::ZERO,
                &position,
                &config,
                &kinematics,
                &mut executor,
            );
            elapsed = next_elapsed;
            position = next_position;
            if finished {
                break;
            }
        }
        assert!((position.get(crate::axes::Axis::X) - 50.0).abs() < 1e-6);
    }

    #[test]
    fn inhibited_motor_never_receives_steps() {
        let mut config = Config::default();
        config.motors[0].axis = Some(crate::axes::Axis::X);
        config.axes[crate::axes::Axis::X.index()].mode = crate::config::AxisMode::Inhibited;
        config.system.segment_time = 0.001;
        config.system.dda_tick_period = 0.0001;

        let buffer = buffer_for(10.0, 20.0, 2_000_000.0);
        let runtime = SegmentRuntime::new(&config);
        let mut executor = StepperExecutor::new();
        let kinematics = CartesianKinematics;

        runtime.prepare_segment(&buffer, 0.0, &AxisVector::ZERO, &AxisVector::ZERO, &config, &kinematics, &mut executor);
        for _ in 0..runtime.dda_ticks_per_segment() {
            assert!(executor.tick().is_empty());
        }
    }
}
