//! Motion subsystem: kinematics, arc expansion, the line planner, segment
//! runtime, and the stepper executor, wired together behind the
//! `gcode::MotionSink` trait the canonical machine pushes primitives into
//! (spec §3, §4).

pub mod arc;
pub mod kinematics;
pub mod planner;
pub mod profile;
pub mod runtime;
pub mod stepper;

use crate::axes::AxisVector;
use crate::config::Config;
use crate::error::BlockResult;
use crate::gcode::{CommandPayload, CommandPrimitive, DwellPrimitive, LinePrimitive, MotionSink};
use kinematics::{CartesianKinematics, Kinematics};
use planner::{MoveType, PlannerBuffer, PlannerQueue};
use runtime::SegmentRuntime;
use stepper::{MotorPower, StepCommand, StepperExecutor};

/// Ties the planner ring, the segment runtime, and the stepper DDA
/// together. Implements `MotionSink` so the canonical machine can push
/// resolved primitives straight into the planner queue.
pub struct MotionController {
    config: Config,
    queue: PlannerQueue,
    runtime: SegmentRuntime,
    executor: StepperExecutor,
    power: MotorPower,
    kinematics: Box<dyn Kinematics>,
    move_start_position: AxisVector,
    move_elapsed: f64,
    last_axis_position: AxisVector,
}

impl MotionController {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            queue: PlannerQueue::new(config.system.planner_buffer_count, AxisVector::ZERO),
            runtime: SegmentRuntime::new(config),
            executor: StepperExecutor::new(),
            power: MotorPower::new(),
            kinematics: Box::new(CartesianKinematics),
            move_start_position: AxisVector::ZERO,
            move_elapsed: 0.0,
            last_axis_position: AxisVector::ZERO,
        }
    }

    /// Adopts a new configuration snapshot (spec §6 `config set`). Does not
    /// retroactively touch buffers already queued.
    pub fn update_config(&mut self, config: &Config) {
        self.runtime = SegmentRuntime::new(config);
        self.config = config.clone();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &PlannerQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut PlannerQueue {
        &mut self.queue
    }

    pub fn current_position(&self) -> AxisVector {
        self.last_axis_position
    }

    pub fn feedhold(&mut self) {
        self.queue.feedhold();
    }

    pub fn resume(&mut self) {
        self.queue.resume();
    }

    pub fn flush(&mut self) {
        self.queue.flush();
    }

    pub fn abort(&mut self) {
        let position = self.last_axis_position;
        self.queue.abort(position);
        self.executor.reset();
        self.move_elapsed = 0.0;
        self.move_start_position = position;
    }

    /// Runs one segment-prep cycle (spec §5: the foreground/real-time
    /// segment-prep task). Promotes the head buffer to running if nothing
    /// is running, walks it forward by one `segment_time` micro-segment,
    /// and loads the resulting per-motor deltas into the DDA. Returns
    /// `true` once the running buffer has been fully traversed and freed.
    pub fn prepare_segment(&mut self) -> bool {
        let buffer: PlannerBuffer = match self.queue.begin_running() {
            Some(b) => b.clone(),
            None => return false,
        };

        match buffer.move_type {
            MoveType::Line => {
                let (elapsed, position, finished) = self.runtime.prepare_segment(
                    &buffer,
                    self.move_elapsed,
                    &self.move_start_position,
                    &self.last_axis_position,
                    &self.config,
                    self.kinematics.as_ref(),
                    &mut self.executor,
                );
                self.move_elapsed = elapsed;
                self.last_axis_position = position;
                if finished {
                    self.move_elapsed = 0.0;
                    self.move_start_position = position;
                    let _ = self.queue.complete_running();
                    true
                } else {
                    false
                }
            }
            MoveType::Dwell => {
                // No stepper work, but the buffer still occupies the head
                // for `buffer.time` seconds, advanced in segment_time steps
                // exactly like a line's body would be.
                self.move_elapsed += self.config.system.segment_time;
                if self.move_elapsed + 1e-12 >= buffer.time {
                    self.move_elapsed = 0.0;
                    let _ = self.queue.complete_running();
                    true
                } else {
                    false
                }
            }
            MoveType::Command => {
                if let Some(payload) = buffer.command {
                    dispatch_command(payload, buffer.line_no);
                }
                let _ = self.queue.complete_running();
                true
            }
        }
    }

    /// Advances the stepper DDA by one tick (spec §5: the real-time
    /// stepper-tick task), returning any pulses to issue this tick.
    pub fn tick(&mut self) -> Vec<StepCommand> {
        self.executor.tick()
    }

    pub fn dda_ticks_per_segment(&self) -> u32 {
        self.runtime.dda_ticks_per_segment()
    }

    pub fn motor_power(&self) -> &MotorPower {
        &self.power
    }

    pub fn motor_power_mut(&mut self) -> &mut MotorPower {
        &mut self.power
    }
}

impl MotionSink for MotionController {
    fn accept_line(&mut self, line: LinePrimitive) -> BlockResult {
        let config = self.config.clone();
        self.queue.enqueue_line(line, &config)
    }

    fn accept_dwell(&mut self, dwell: DwellPrimitive) -> BlockResult {
        self.queue.enqueue_dwell(dwell)
    }

    fn accept_command(&mut self, command: CommandPrimitive) -> BlockResult {
        self.queue.enqueue_command(command.line_no, command.payload)
    }
}

/// Foreground dispatch for a spindle/coolant/program command once it
/// reaches the head of the queue. This crate has no spindle or coolant
/// hardware of its own to drive, so dispatch is logging the intent at the
/// point it takes effect; a host integrating real peripherals hangs its
/// driver calls off this same match.
fn dispatch_command(payload: CommandPayload, line_no: u32) {
    use crate::gcode::CommandPayload::*;
    match payload {
        SpindleCw(rpm) => tracing::info!(line = line_no, rpm, "spindle on, clockwise"),
        SpindleCcw(rpm) => tracing::info!(line = line_no, rpm, "spindle on, counter-clockwise"),
        SpindleStop => tracing::info!(line = line_no, "spindle stop"),
        CoolantMist => tracing::info!(line = line_no, "coolant mist on"),
        CoolantFlood => tracing::info!(line = line_no, "coolant flood on"),
        CoolantOff => tracing::info!(line = line_no, "coolant off"),
        ProgramPause => tracing::info!(line = line_no, "program pause"),
        ProgramStop => tracing::info!(line = line_no, "program stop"),
        ProgramEnd => tracing::info!(line = line_no, "program end"),
        ToolChange(tool) => tracing::info!(line = line_no, tool, "tool change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::primitives::ModalSnapshot;
    use crate::gcode::MotionMode;

    #[test]
    fn accept_line_enqueues_and_complete_drains_queue() {
        let mut config = Config::default();
        config.motors[0].axis = Some(crate::axes::Axis::X);
        for axis in config.axes.iter_mut() {
            axis.velocity_max = 500.0;
            axis.feedrate_max = 300.0;
            axis.jerk_max = 50_000_000.0;
        }
        config.system.segment_time = 0.001;
        config.system.dda_tick_period = 0.0001;

        let mut controller = MotionController::new(&config);
        controller
            .accept_line(LinePrimitive {
                line_no: 1,
                target: AxisVector::from([10.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                feed_rate: 200.0,
                motion_mode: MotionMode::Feed,
                modal: ModalSnapshot::default(),
            })
            .unwrap();
        assert!(!controller.queue().is_empty());

        let mut guard = 0;
        loop {
            let freed = controller.prepare_segment();
            for _ in 0..controller.dda_ticks_per_segment() {
                controller.tick();
            }
            if freed {
                break;
            }
            guard += 1;
            assert!(guard < 100_000, "move never completed");
        }
        assert!(controller.queue().is_empty());
        assert!((controller.current_position().get(crate::axes::Axis::X) - 10.0).abs() < 1e-6);
    }
}
