//! Line planner: look-ahead queue, junction-deviation cornering, and
//! jerk-limited trapezoid/triangle profile solving (spec §3, §4.3).
//!
//! Grounded in `motion::junction`'s buffer/state shape and the teacher's
//! queue-of-moves style, generalized from `tan(angle/2)` cornering (which
//! the spec does not use) to the `sin(theta/2)` junction-deviation formula,
//! and from a fixed `[Buffer; N]` array to a runtime-sized ring sized from
//! `SystemConfig::planner_buffer_count` (config is loaded at startup, not
//! compile time, so the array length can't be a const generic here).

use crate::axes::AxisVector;
use crate::config::Config;
use crate::error::{BlockResult, RuntimeError, StatusCode, SystemError};
use crate::gcode::{CommandPayload, DwellPrimitive, LinePrimitive, MotionMode};
use crate::motion::profile::{self, JerkRamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    Line,
    Dwell,
    Command,
}

/// Coarse execution state carried in the data model (spec §3). The segment
/// runtime owns the finer head/body/tail phase breakdown; this only tracks
/// whether the runtime has touched the buffer yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Off,
    New,
    Run,
    RunContinue,
}

/// Queue-slot occupancy state (spec §3 "Planner queue").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Queued,
    Pending,
    Running,
}

#[derive(Debug, Clone)]
pub struct PlannerBuffer {
    pub line_no: u32,
    pub move_type: MoveType,
    pub move_state: MoveState,
    pub target: AxisVector,
    pub unit: AxisVector,
    pub length: f64,
    pub cruise_vmax: f64,
    pub delta_vmax: f64,
    pub jerk: f64,
    pub entry_vmax: f64,
    pub braking_velocity: f64,
    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    pub time: f64,
    pub replannable: bool,
    pub command: Option<CommandPayload>,
    pub dwell_seconds: Option<f64>,
}

impl Default for PlannerBuffer {
    fn default() -> Self {
        Self {
            line_no: 0,
            move_type: MoveType::Line,
            move_state: MoveState::Off,
            target: AxisVector::ZERO,
            unit: AxisVector::ZERO,
            length: 0.0,
            cruise_vmax: 0.0,
            delta_vmax: 0.0,
            jerk: 0.0,
            entry_vmax: 0.0,
            braking_velocity: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            time: 0.0,
            replannable: true,
            command: None,
            dwell_seconds: None,
        }
    }
}

/// Fixed-capacity ring of planner buffers plus a parallel occupancy-state
/// array. `head` is the oldest occupied slot (the one that is running, or
/// next to run); `count` occupied slots follow it in FIFO order.
pub struct PlannerQueue {
    slots: Vec<PlannerBuffer>,
    states: Vec<BufferState>,
    capacity: usize,
    head: usize,
    count: usize,
    tail_position: AxisVector,
    last_exit_velocity: f64,
    held: bool,
}

impl PlannerQueue {
    pub fn new(capacity: usize, initial_position: AxisVector) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![PlannerBuffer::default(); capacity],
            states: vec![BufferState::Empty; capacity],
            capacity,
            head: 0,
            count: 0,
            tail_position: initial_position,
            last_exit_velocity: 0.0,
            held: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn held(&self) -> bool {
        self.held
    }

    pub fn feedhold(&mut self) {
        self.held = true;
    }

    pub fn resume(&mut self) {
        self.held = false;
    }

    /// Discards every buffer that is not currently running. Must not be
    /// called while a running buffer would itself need discarding — the
    /// caller is responsible for decelerating to a stop first.
    pub fn flush(&mut self) {
        if self.count == 0 {
            return;
        }
        let running_at_head = self.states[self.head] == BufferState::Running;
        if running_at_head {
            let head_buf = self.slots[self.head].clone();
            self.tail_position = head_buf.target;
            for i in 0..self.capacity {
                if i != self.head {
                    self.states[i] = BufferState::Empty;
                }
            }
            self.count = 1;
        } else {
            for s in self.states.iter_mut() {
                *s = BufferState::Empty;
            }
            self.count = 0;
        }
        self.held = false;
    }

    /// Hard reset: drops every buffer including a running one. `position`
    /// is the runtime's actual machine position after the abort.
    pub fn abort(&mut self, position: AxisVector) {
        for s in self.states.iter_mut() {
            *s = BufferState::Empty;
        }
        self.head = 0;
        self.count = 0;
        self.tail_position = position;
        self.last_exit_velocity = 0.0;
        self.held = false;
    }

    fn slot_index(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity
    }

    fn previous_buffer(&self) -> Option<&PlannerBuffer> {
        if self.count == 0 {
            None
        } else {
            Some(&self.slots[self.slot_index(self.count - 1)])
        }
    }

    pub fn enqueue_line(&mut self, line: LinePrimitive, config: &Config) -> BlockResult {
        if self.is_full() {
            return Err(SystemError::BufferFull.into());
        }
        let delta = line.target.sub(&self.tail_position);
        let length = delta.length();
        if length < config.system.min_line_segment {
            return Err(RuntimeError::MinimumLengthMove.into());
        }
        let unit = delta.unit(length);

        let mut cruise_vmax = f64::INFINITY;
        let mut jerk = f64::INFINITY;
        for axis in crate::axes::ALL_AXES {
            let component = unit.get(axis).abs();
            if component <= 1e-12 {
                continue;
            }
            let ac = &config.axes[axis.index()];
            let axis_limit = if line.motion_mode == MotionMode::Traverse {
                ac.velocity_max
            } else {
                ac.feedrate_max
            };
            cruise_vmax = cruise_vmax.min(axis_limit / component);
            jerk = jerk.min(ac.jerk_max / component);
        }
        if !cruise_vmax.is_finite() {
            cruise_vmax = 0.0;
        }
        if !jerk.is_finite() || jerk <= 0.0 {
            jerk = 1.0;
        }
        if line.motion_mode == MotionMode::Feed && line.feed_rate > 0.0 {
            cruise_vmax = cruise_vmax.min(line.feed_rate);
        }

        let delta_vmax = profile::delta_vmax(length, jerk);

        let entry_vmax = match self.previous_buffer() {
            None => 0.0,
            Some(prev) => junction_velocity(prev, &unit, cruise_vmax, config),
        };

        let buffer = PlannerBuffer {
            line_no: line.line_no,
            move_type: MoveType::Line,
            move_state: MoveState::New,
            target: line.target,
            unit,
            length,
            cruise_vmax,
            delta_vmax,
            jerk,
            entry_vmax,
            braking_velocity: entry_vmax,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            head_length: 0.0,
            body_length: length,
            tail_length: 0.0,
            time: 0.0,
            replannable: true,
            command: None,
            dwell_seconds: None,
        };

        let idx = self.slot_index(self.count);
        self.slots[idx] = buffer;
        self.states[idx] = BufferState::Queued;
        self.count += 1;
        self.tail_position = line.target;
        self.replan();
        Ok(())
    }

    pub fn enqueue_dwell(&mut self, dwell: DwellPrimitive) -> BlockResult {
        if self.is_full() {
            return Err(SystemError::BufferFull.into());
        }
        let buffer = PlannerBuffer {
            line_no: dwell.line_no,
            move_type: MoveType::Dwell,
            move_state: MoveState::New,
            target: self.tail_position,
            dwell_seconds: Some(dwell.seconds),
            time: dwell.seconds,
            replannable: false,
            ..PlannerBuffer::default()
        };
        let idx = self.slot_index(self.count);
        self.slots[idx] = buffer;
        self.states[idx] = BufferState::Queued;
        self.count += 1;
        Ok(())
    }

    pub fn enqueue_command(&mut self, line_no: u32, payload: CommandPayload) -> BlockResult {
        if self.is_full() {
            return Err(SystemError::BufferFull.into());
        }
        let buffer = PlannerBuffer {
            line_no,
            move_type: MoveType::Command,
            move_state: MoveState::New,
            target: self.tail_position,
            command: Some(payload),
            replannable: false,
            ..PlannerBuffer::default()
        };
        let idx = self.slot_index(self.count);
        self.slots[idx] = buffer;
        self.states[idx] = BufferState::Queued;
        self.count += 1;
        Ok(())
    }

    /// Re-derives braking velocities (reverse pass) and entry/cruise/exit
    /// velocities plus head/body/tail lengths (forward pass) for every
    /// buffer still open to replanning. The running buffer is frozen.
    pub fn replan(&mut self) {
        if self.count == 0 {
            return;
        }

        let mut next_braking = 0.0;
        for i in (0..self.count).rev() {
            let idx = self.slot_index(i);
            if self.states[idx] == BufferState::Running || !self.slots[idx].replannable {
                next_braking = self.slots[idx].braking_velocity;
                continue;
            }
            let buf = &mut self.slots[idx];
            buf.braking_velocity = buf.entry_vmax.min(next_braking + buf.delta_vmax);
            next_braking = buf.braking_velocity;
        }

        let mut prev_exit = self.last_exit_velocity;
        for i in 0..self.count {
            let idx = self.slot_index(i);
            if self.states[idx] == BufferState::Running {
                self.slots[idx].replannable = false;
                prev_exit = self.slots[idx].exit_velocity;
                continue;
            }
            if self.slots[idx].move_type != MoveType::Line {
                prev_exit = 0.0;
                continue;
            }

            let is_last = i + 1 == self.count;
            let (next_entry_vmax, next_braking_velocity) = if is_last {
                // Nothing follows this buffer, so it must decelerate to a
                // full stop rather than carry speed into an undefined next
                // move.
                (0.0, f64::INFINITY)
            } else {
                let next_idx = self.slot_index(i + 1);
                (self.slots[next_idx].entry_vmax, self.slots[next_idx].braking_velocity)
            };

            let buf = &mut self.slots[idx];
            buf.replannable = true;
            buf.entry_velocity = prev_exit.min(buf.braking_velocity);
            buf.exit_velocity = next_entry_vmax.min(buf.entry_velocity + buf.delta_vmax).min(next_braking_velocity);

            let (head_length, tail_length, body_length, cruise_velocity) =
                solve_profile(buf.length, buf.entry_velocity, buf.exit_velocity, buf.cruise_vmax, buf.jerk);
            buf.head_length = head_length;
            buf.body_length = body_length;
            buf.tail_length = tail_length;
            buf.cruise_velocity = cruise_velocity;

            let head_ramp = JerkRamp::new(buf.entry_velocity, cruise_velocity, buf.jerk);
            let tail_ramp = JerkRamp::new(cruise_velocity, buf.exit_velocity, buf.jerk);
            let body_time = if cruise_velocity > 1e-9 { body_length / cruise_velocity } else { 0.0 };
            buf.time = head_ramp.total_time + body_time + tail_ramp.total_time;

            prev_exit = buf.exit_velocity;
        }
    }

    /// Promotes the head slot to `Running` if it isn't already, returning
    /// it. Returns `None` if the queue is empty or feedhold is engaged.
    pub fn begin_running(&mut self) -> Option<&PlannerBuffer> {
        if self.count == 0 || self.held {
            return None;
        }
        if self.states[self.head] != BufferState::Running {
            self.states[self.head] = BufferState::Running;
            self.slots[self.head].replannable = false;
        }
        Some(&self.slots[self.head])
    }

    pub fn running(&self) -> Option<&PlannerBuffer> {
        if self.count > 0 && self.states[self.head] == BufferState::Running {
            Some(&self.slots[self.head])
        } else {
            None
        }
    }

    pub fn running_mut(&mut self) -> Option<&mut PlannerBuffer> {
        if self.count > 0 && self.states[self.head] == BufferState::Running {
            Some(&mut self.slots[self.head])
        } else {
            None
        }
    }

    /// Frees the running head buffer once the runtime has fully executed
    /// it, advancing the ring strictly FIFO.
    pub fn complete_running(&mut self) -> Result<(), StatusCode> {
        if self.count == 0 || self.states[self.head] != BufferState::Running {
            return Err(SystemError::PlannerAssertion("complete_running called with no running buffer".into()).into());
        }
        self.last_exit_velocity = self.slots[self.head].exit_velocity;
        self.states[self.head] = BufferState::Empty;
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Ok(())
    }
}

fn junction_velocity(prev: &PlannerBuffer, unit: &AxisVector, cruise_vmax: f64, config: &Config) -> f64 {
    let cos_theta = prev.unit.dot(unit).clamp(-1.0, 1.0);
    if cos_theta >= 1.0 - 1e-9 {
        return prev.cruise_vmax.min(cruise_vmax);
    }
    if cos_theta <= 1e-9 {
        return 0.0;
    }
    let mut deviation = f64::INFINITY;
    for axis in crate::axes::ALL_AXES {
        if unit.get(axis).abs() > 1e-12 || prev.unit.get(axis).abs() > 1e-12 {
            deviation = deviation.min(config.axes[axis.index()].junction_deviation);
        }
    }
    if !deviation.is_finite() {
        deviation = 0.0;
    }
    let theta = cos_theta.acos();
    let sin_half = (theta / 2.0).sin();
    if sin_half >= 1.0 - 1e-9 {
        return 0.0;
    }
    let a = config.system.junction_acceleration;
    let v = (a * deviation * sin_half / (1.0 - sin_half)).sqrt();
    v.min(prev.cruise_vmax).min(cruise_vmax)
}

/// Solves the head/body/tail split for a move of `length` between
/// `entry_v` and `exit_v` under jerk `jerk`, capped at `cruise_vmax`.
/// Returns `(head_length, tail_length, body_length, cruise_velocity)`.
/// Falls back to a triangle profile (no cruise plateau) when the move is
/// too short for both ramps to complete at `cruise_vmax`, and as a last
/// resort lowers `exit_v` until a feasible triangle exists.
fn solve_profile(length: f64, entry_v: f64, exit_v: f64, cruise_vmax: f64, jerk: f64) -> (f64, f64, f64, f64) {
    let mut exit_v = exit_v.max(0.0);
    let entry_v = entry_v.max(0.0);

    for _ in 0..8 {
        let reachable = entry_v.max(exit_v) + profile::delta_vmax(length, jerk);
        let cruise_v = cruise_vmax.min(reachable).max(entry_v).max(exit_v);
        let head = JerkRamp::new(entry_v, cruise_v, jerk);
        let tail = JerkRamp::new(cruise_v, exit_v, jerk);
        if head.length + tail.length <= length + 1e-9 {
            let body = (length - head.length - tail.length).max(0.0);
            return (head.length, tail.length, body, cruise_v);
        }

        // Degenerate triangle: find the peak velocity (no cruise plateau)
        // whose head+tail ramp length matches exactly, via bisection — the
        // combined length is monotone increasing in the peak.
        let lo = entry_v.max(exit_v);
        let hi = cruise_v.max(lo);
        let mut lo_b = lo;
        let mut hi_b = hi;
        let feasible_at_lo = {
            let h = JerkRamp::new(entry_v, lo, jerk).length;
            let t = JerkRamp::new(lo, exit_v, jerk).length;
            h + t <= length + 1e-9
        };
        if feasible_at_lo {
            for _ in 0..40 {
                let mid = 0.5 * (lo_b + hi_b);
                let h = JerkRamp::new(entry_v, mid, jerk).length;
                let t = JerkRamp::new(mid, exit_v, jerk).length;
                if h + t > length {
                    hi_b = mid;
                } else {
                    lo_b = mid;
                }
            }
            let h = JerkRamp::new(entry_v, lo_b, jerk).length;
            let t = JerkRamp::new(lo_b, exit_v, jerk).length;
            let body = (length - h.max(0.0) - t.max(0.0)).max(0.0);
            return (h, t, body, lo_b);
        }

        // Even the minimal triangle overshoots the move's length: the
        // incoming exit velocity is infeasible for this segment. Lower it
        // and retry the reverse/forward fit on the next planner pass.
        exit_v *= 0.5;
    }

    // Exhausted retries — collapse to the safest profile: decelerate from
    // entry straight to rest over whatever length is available.
    let ramp = JerkRamp::new(entry_v, 0.0, jerk);
    let head = ramp.length.min(length);
    (head, 0.0, (length - head).max(0.0), entry_v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gcode::MotionMode;

    fn test_config() -> Config {
        let mut c = Config::default();
        for axis in c.axes.iter_mut() {
            axis.velocity_max = 500.0;
            axis.feedrate_max = 300.0;
            axis.jerk_max = 50_000_000.0;
            axis.junction_deviation = 0.01;
        }
        c.system.min_line_segment = 0.0001;
        c.system.junction_acceleration = 500_000.0;
        c
    }

    fn line(target: [f64; 6], feed: f64) -> LinePrimitive {
        LinePrimitive {
            line_no: 1,
            target: AxisVector(target),
            feed_rate: feed,
            motion_mode: MotionMode::Feed,
            modal: crate::gcode::primitives::ModalSnapshot::default(),
        }
    }

    #[test]
    fn enqueue_computes_forward_derived_fields() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let buf = q.previous_buffer().unwrap();
        assert!((buf.length - 10.0).abs() < 1e-9);
        assert!(buf.cruise_vmax <= 200.0 + 1e-9);
        assert!(buf.delta_vmax > 0.0);
    }

    #[test]
    fn collinear_moves_get_full_junction_speed() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        q.enqueue_line(line([20.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let second = &q.slots[q.slot_index(1)];
        assert!((second.entry_vmax - 200.0).abs() < 1e-6);
    }

    #[test]
    fn right_angle_turn_limits_junction_speed() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        q.enqueue_line(line([10.0, 10.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let second = &q.slots[q.slot_index(1)];
        assert!(second.entry_vmax < 50.0);
    }

    #[test]
    fn reversal_forces_zero_junction_speed() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        q.enqueue_line(line([0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let second = &q.slots[q.slot_index(1)];
        assert_eq!(second.entry_vmax, 0.0);
    }

    #[test]
    fn short_move_rejected_below_minimum_length() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        let err = q.enqueue_line(line([0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config);
        assert!(matches!(err, Err(StatusCode::Runtime(RuntimeError::MinimumLengthMove))));
    }

    #[test]
    fn full_queue_rejects_further_enqueue() {
        let config = test_config();
        let mut q = PlannerQueue::new(1, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let err = q.enqueue_line(line([20.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config);
        assert!(matches!(err, Err(StatusCode::System(SystemError::BufferFull))));
    }

    #[test]
    fn running_buffer_survives_replan_unchanged() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        q.begin_running();
        let before = q.running().unwrap().clone();
        q.enqueue_line(line([20.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        let after = q.running().unwrap();
        assert_eq!(before.entry_velocity, after.entry_velocity);
        assert_eq!(before.exit_velocity, after.exit_velocity);
    }

    #[test]
    fn complete_running_advances_ring_fifo() {
        let config = test_config();
        let mut q = PlannerQueue::new(2, AxisVector::ZERO);
        q.enqueue_line(line([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 200.0), &config).unwrap();
        q.begin_running();
        q.complete_running().unwrap();
        assert!(q.running().is_none());
        assert_eq!(q.count, 0);
    }

    #[test]
    fn triangle_profile_used_for_short_high_speed_move() {
        let config = test_config();
        let mut q = PlannerQueue::new(8, AxisVector::ZERO);
        q.enqueue_line(line([0.05, 0.0, 0.0, 0.0, 0.0, 0.0], 300.0), &config).unwrap();
        let buf = q.previous_buffer().unwrap();
        assert!(buf.head_length + buf.tail_length >= buf.body_length - 1e-6 || buf.body_length < 1e-6);
        assert!((buf.head_length + buf.body_length + buf.tail_length - buf.length).abs() < 1e-6);
    }
}
