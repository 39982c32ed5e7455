//! Stepper executor: fractional-step DDA and motor power-mode policy
//! (spec §4.5, §3 "Step/direction command").
//!
//! Grounded in the teacher's `StepGenerator` (float-rounding
//! `position_to_steps`/`generate_steps`), replaced with a proper digital
//! differential analyzer: each motor carries a 32-bit accumulator that is
//! never reset between segments, so rounding residue is carried forward
//! indefinitely instead of being re-quantized away every micro-segment.

use crate::config::PowerMode;
use crate::motion::kinematics::MOTOR_COUNT;

/// A single step pulse, one motor, one direction (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCommand {
    pub motor: usize,
    pub direction: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct MotorChannel {
    /// 32-bit phase accumulator. Persists across segment loads so residual
    /// fractional steps are never dropped.
    accumulator: u32,
    /// Per-tick increment for the segment currently loaded.
    increment: u32,
    /// Integer steps already issued since the last `reset`.
    commanded_steps: i64,
    /// Integer steps the current segment wants issued by its end.
    target_steps: i64,
    direction: bool,
}

/// Per-motor DDA state, ticked once per `dda_tick_period` (spec §4.5).
pub struct StepperExecutor {
    channels: [MotorChannel; MOTOR_COUNT],
}

impl StepperExecutor {
    pub fn new() -> Self {
        Self { channels: [MotorChannel::default(); MOTOR_COUNT] }
    }

    pub fn commanded_steps(&self, motor: usize) -> i64 {
        self.channels[motor].commanded_steps
    }

    /// Loads a new segment for one motor: `delta_steps` is the signed
    /// number of steps this motor must move over the next `ticks` DDA
    /// ticks. The increment is derived from the residual plus the new
    /// delta so a short move doesn't lose precision to an earlier segment's
    /// rounding.
    pub fn load_segment(&mut self, motor: usize, delta_steps: f64, ticks: u32) {
        let channel = &mut self.channels[motor];
        let ticks = ticks.max(1);
        channel.direction = delta_steps >= 0.0;
        channel.target_steps = channel.commanded_steps + delta_steps.round() as i64;
        let magnitude = delta_steps.abs();
        // Spread `magnitude` steps evenly across `ticks` accumulator
        // additions: each tick adds `increment`, and every overflow of the
        // 32-bit accumulator emits one step. Over `ticks` ticks the total
        // carry is `increment * ticks / 2^32`, so solve for `increment`.
        let increment = if magnitude <= 0.0 {
            0u32
        } else {
            let scaled = magnitude * (u32::MAX as f64 + 1.0) / ticks as f64;
            scaled.clamp(0.0, u32::MAX as f64) as u32
        };
        channel.increment = increment;
    }

    /// Advances every motor by one DDA tick. Returns the step commands to
    /// issue this tick (motors whose accumulator overflowed).
    pub fn tick(&mut self) -> Vec<StepCommand> {
        let mut out = Vec::new();
        for (motor, channel) in self.channels.iter_mut().enumerate() {
            if channel.increment == 0 {
                continue;
            }
            let (next, overflow) = channel.accumulator.overflowing_add(channel.increment);
            channel.accumulator = next;
            if overflow {
                if channel.direction {
                    channel.commanded_steps += 1;
                } else {
                    channel.commanded_steps -= 1;
                }
                out.push(StepCommand { motor, direction: channel.direction });
            }
        }
        out
    }

    /// True once every motor has reached its segment's target step count
    /// and the accumulator has no residual increment pending.
    pub fn segment_complete(&self) -> bool {
        self.channels.iter().all(|c| c.commanded_steps == c.target_steps)
    }

    /// Resets all step counters (after homing, or on abort).
    pub fn reset(&mut self) {
        self.channels = [MotorChannel::default(); MOTOR_COUNT];
    }
}

impl Default for StepperExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks per-motor enable/disable policy (spec §6 motor `pm` key): a motor
/// stays powered according to its `PowerMode`, with an idle timeout for the
/// "on during move" mode.
#[derive(Debug, Clone)]
pub struct MotorPower {
    enabled: [bool; MOTOR_COUNT],
    idle_since: [Option<f64>; MOTOR_COUNT],
}

impl MotorPower {
    pub fn new() -> Self {
        Self { enabled: [false; MOTOR_COUNT], idle_since: [None; MOTOR_COUNT] }
    }

    /// Called when a motor starts stepping within the current move.
    pub fn on_move_start(&mut self, motor: usize, mode: PowerMode) {
        match mode {
            PowerMode::Disabled => self.enabled[motor] = false,
            PowerMode::AlwaysOn | PowerMode::OnDuringMove | PowerMode::OnOnlyWhenStepping => {
                self.enabled[motor] = true;
            }
        }
        self.idle_since[motor] = None;
    }

    /// Called when the current move finishes; `now` is the monotonic
    /// runtime clock so idle timeout can be evaluated later.
    pub fn on_move_end(&mut self, motor: usize, mode: PowerMode, now: f64) {
        match mode {
            PowerMode::AlwaysOn => {}
            PowerMode::Disabled => self.enabled[motor] = false,
            PowerMode::OnOnlyWhenStepping => self.enabled[motor] = false,
            PowerMode::OnDuringMove => self.idle_since[motor] = Some(now),
        }
    }

    /// Advances the idle timer; motors in `OnDuringMove` mode that have
    /// been idle past `idle_timeout` seconds are disabled.
    pub fn tick_idle(&mut self, now: f64, idle_timeout: f64, mode: PowerMode, motor: usize) {
        if mode != PowerMode::OnDuringMove {
            return;
        }
        if let Some(since) = self.idle_since[motor] {
            if now - since >= idle_timeout {
                self.enabled[motor] = false;
            }
        }
    }

    pub fn is_enabled(&self, motor: usize) -> bool {
        self.enabled[motor]
    }
}

impl Default for MotorPower {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dda_emits_exactly_the_commanded_steps_over_a_segment() {
        let mut exec = StepperExecutor::new();
        exec.load_segment(0, 100.0, 1000);
        let mut total = 0;
        for _ in 0..1000 {
            total += exec.tick().len();
        }
        assert_eq!(total, 100);
        assert_eq!(exec.commanded_steps(0), 100);
    }

    #[test]
    fn negative_delta_produces_negative_direction_steps() {
        let mut exec = StepperExecutor::new();
        exec.load_segment(1, -50.0, 500);
        let mut count = 0;
        for _ in 0..500 {
            for cmd in exec.tick() {
                assert_eq!(cmd.motor, 1);
                assert!(!cmd.direction);
                count += 1;
            }
        }
        assert_eq!(count, 50);
        assert_eq!(exec.commanded_steps(1), -50);
    }

    #[test]
    fn residual_carries_across_segment_loads() {
        // A delta that doesn't divide evenly into a whole number of steps
        // across two back-to-back segments should still sum exactly, since
        // the accumulator (not the per-segment increment) carries residue.
        let mut exec = StepperExecutor::new();
        exec.load_segment(2, 33.0, 100);
        for _ in 0..100 {
            exec.tick();
        }
        exec.load_segment(2, 34.0, 100);
        for _ in 0..100 {
            exec.tick();
        }
        assert_eq!(exec.commanded_steps(2), 67);
    }

    #[test]
    fn motor_power_on_during_move_disables_after_idle_timeout() {
        let mut power = MotorPower::new();
        power.on_move_start(0, PowerMode::OnDuringMove);
        assert!(power.is_enabled(0));
        power.on_move_end(0, PowerMode::OnDuringMove, 10.0);
        power.tick_idle(10.5, 2.0, PowerMode::OnDuringMove, 0);
        assert!(power.is_enabled(0));
        power.tick_idle(13.0, 2.0, PowerMode::OnDuringMove, 0);
        assert!(!power.is_enabled(0));
    }

    #[test]
    fn always_on_never_disables() {
        let mut power = MotorPower::new();
        power.on_move_start(1, PowerMode::AlwaysOn);
        power.on_move_end(1, PowerMode::AlwaysOn, 0.0);
        power.tick_idle(1000.0, 0.001, PowerMode::AlwaysOn, 1);
        assert!(power.is_enabled(1));
    }
}
