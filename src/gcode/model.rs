//! The canonical machine: modal state, target resolution, and the public
//! contract of spec §4.1, grounded in `GCodeProcessor`'s modal-state-holding
//! shape (`gcode::mod`) generalized from three axes and temperature handling
//! to the full six-axis canonical machine.

use crate::axes::{Axis, AxisVector, ALL_AXES};
use crate::config::{Config, DistanceMode, FeedRateMode, PathControlMode, Plane, Units};
use crate::error::{BlockResult, GcodeError, ParseError, StatusCode};
use crate::gcode::parser::{lex_block, Word};
use crate::gcode::primitives::{
    ArcPrimitive, CommandPayload, CommandPrimitive, DwellPrimitive, LinePrimitive, ModalSnapshot, MotionMode,
};
use crate::motion::arc::expand_arc;
use tracing::{debug, warn};

const MIN_ARC_RADIUS: f64 = 0.0001;

/// Where the canonical machine hands off finished primitives. The planner
/// never sees an `ArcPrimitive` — arcs are expanded before this is called.
pub trait MotionSink {
    fn accept_line(&mut self, line: LinePrimitive) -> BlockResult;
    fn accept_dwell(&mut self, dwell: DwellPrimitive) -> BlockResult;
    fn accept_command(&mut self, command: CommandPrimitive) -> BlockResult;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModalState {
    pub units: Units,
    pub plane: Plane,
    pub coord_system: u8, // 0..=5 => G54..G59
    pub distance_mode: DistanceMode,
    pub feed_rate_mode: FeedRateMode,
    pub path_control: PathControlMode,
    pub motion_mode: MotionMode,
    pub feed_rate: f64,
}

impl ModalState {
    fn from_defaults(config: &Config) -> Self {
        let d = config.gcode_defaults;
        Self {
            units: d.units,
            plane: d.plane,
            coord_system: d.coord_system,
            distance_mode: d.distance_mode,
            feed_rate_mode: FeedRateMode::UnitsPerMinute,
            path_control: d.path_control,
            motion_mode: MotionMode::Traverse,
            feed_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionalState {
    pub position: AxisVector,
    pub g92_offset: AxisVector,
    pub homed: [bool; 6],
    pub stored_g28: AxisVector,
    pub stored_g30: AxisVector,
}

impl Default for PositionalState {
    fn default() -> Self {
        Self {
            position: AxisVector::ZERO,
            g92_offset: AxisVector::ZERO,
            homed: [false; 6],
            stored_g28: AxisVector::ZERO,
            stored_g30: AxisVector::ZERO,
        }
    }
}

/// The four/five modal groups this machine enforces one-word-per-block for.
/// M-code groups (stopping/spindle/coolant) are checked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModalGroup {
    Motion,
    Plane,
    Units,
    Distance,
    FeedRateMode,
    PathControl,
    CoordSystem,
    NonModal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MGroup {
    Stopping,
    Spindle,
    Coolant,
}

pub struct CanonicalMachine<S: MotionSink> {
    pub modal: ModalState,
    pub pos: PositionalState,
    pub alarmed: bool,
    sink: S,
}

impl<S: MotionSink> CanonicalMachine<S> {
    pub fn new(config: &Config, sink: S) -> Self {
        Self {
            modal: ModalState::from_defaults(config),
            pos: PositionalState::default(),
            alarmed: false,
            sink,
        }
    }

    pub fn set_units(&mut self, units: Units) {
        self.modal.units = units;
    }

    pub fn set_plane(&mut self, plane: Plane) {
        self.modal.plane = plane;
    }

    pub fn set_coord_system(&mut self, n: u8) {
        self.modal.coord_system = n;
    }

    pub fn set_distance_mode(&mut self, mode: DistanceMode) {
        self.modal.distance_mode = mode;
    }

    pub fn set_feed_rate(&mut self, rate: f64) {
        self.modal.feed_rate = rate;
    }

    fn work_offset(&self, config: &Config, axis: Axis) -> f64 {
        config.coord_systems[self.modal.coord_system as usize].offset.get(axis) + self.pos.g92_offset.get(axis)
    }

    /// Resolve a word's value into a machine-coordinate target for one axis
    /// (spec §4.1 "Target resolution").
    fn resolve_axis_target(&self, config: &Config, axis: Axis, word_value: f64) -> f64 {
        let axis_cfg = config.axis(axis);
        let converted = if axis.is_linear() {
            if matches!(self.modal.units, Units::Inches) {
                word_value * 25.4
            } else {
                word_value
            }
        } else if matches!(axis_cfg.mode, crate::config::AxisMode::Radius) {
            (word_value / axis_cfg.radius.max(1e-9)) * 180.0 / std::f64::consts::PI
        } else {
            word_value
        };

        match self.modal.distance_mode {
            DistanceMode::Absolute => converted - self.work_offset(config, axis),
            DistanceMode::Incremental => self.pos.position.get(axis) + converted,
        }
    }

    fn compute_target(&self, config: &Config, axis_words: &[Option<f64>; 6]) -> AxisVector {
        let mut target = self.pos.position;
        for axis in ALL_AXES {
            if let Some(w) = axis_words[axis.index()] {
                target.set(axis, self.resolve_axis_target(config, axis, w));
            }
        }
        target
    }

    fn modal_snapshot(&self) -> ModalSnapshot {
        ModalSnapshot {
            plane: self.modal.plane,
            distance_mode: self.modal.distance_mode,
            feed_rate_mode: self.modal.feed_rate_mode,
        }
    }

    pub fn straight_feed(&mut self, target: AxisVector, feed_rate: f64, line_no: u32) -> BlockResult {
        self.modal.motion_mode = MotionMode::Feed;
        let line = LinePrimitive { line_no, target, feed_rate, motion_mode: MotionMode::Feed, modal: self.modal_snapshot() };
        self.pos.position = target;
        self.sink.accept_line(line)
    }

    pub fn straight_traverse(&mut self, target: AxisVector, line_no: u32) -> BlockResult {
        self.modal.motion_mode = MotionMode::Traverse;
        let line = LinePrimitive { line_no, target, feed_rate: 0.0, motion_mode: MotionMode::Traverse, modal: self.modal_snapshot() };
        self.pos.position = target;
        self.sink.accept_line(line)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn arc_feed(
        &mut self,
        config: &Config,
        target: AxisVector,
        target_present: [bool; 6],
        offsets: [f64; 3],
        offsets_present: [bool; 3],
        radius: f64,
        radius_present: bool,
        rotations: i32,
        rotations_present: bool,
        cw: bool,
        line_no: u32,
    ) -> BlockResult {
        if self.modal.feed_rate_mode == FeedRateMode::UnitsPerMinute && self.modal.feed_rate <= 0.0 {
            return Err(GcodeError::FeedrateMissing.into());
        }
        if radius_present && radius.abs() < MIN_ARC_RADIUS {
            return Err(GcodeError::ArcRadiusOutOfTolerance.into());
        }

        let arc = ArcPrimitive {
            line_no,
            target,
            target_present,
            offsets,
            offsets_present,
            radius,
            radius_present,
            rotations,
            rotations_present,
            feed_rate: self.modal.feed_rate,
            motion_mode: if cw { MotionMode::ArcCw } else { MotionMode::ArcCcw },
            modal: self.modal_snapshot(),
        };
        self.modal.motion_mode = arc.motion_mode;

        let segments = expand_arc(&arc, config, &self.pos.position)?;
        for seg in segments {
            self.pos.position = seg.target;
            self.sink.accept_line(seg)?;
        }
        Ok(())
    }

    pub fn dwell(&mut self, seconds: f64, line_no: u32) -> BlockResult {
        self.sink.accept_dwell(DwellPrimitive { line_no, seconds })
    }

    pub fn queue_command(&mut self, payload: CommandPayload, line_no: u32) -> BlockResult {
        self.sink.accept_command(CommandPrimitive { line_no, payload })
    }

    /// Lex, classify, and dispatch one block (spec §4.1 public contract).
    pub fn execute_block(&mut self, text: &str, config: &Config, line_no: u32) -> StatusCode {
        if self.alarmed {
            return StatusCode::Gcode(GcodeError::CommandNotAccepted);
        }
        let saved_modal = self.modal;
        let saved_pos = self.pos;
        match self.execute_block_inner(text, config, line_no) {
            Ok(()) => StatusCode::Ok,
            Err(status) => {
                warn!(line = line_no, error = %status, "block rejected");
                self.modal = saved_modal;
                self.pos = saved_pos;
                status
            }
        }
    }

    fn execute_block_inner(&mut self, text: &str, config: &Config, line_no: u32) -> BlockResult {
        let words = lex_block(text).map_err(StatusCode::from)?;
        if words.is_empty() {
            return Ok(());
        }

        let mut seen_groups: Vec<ModalGroup> = Vec::new();
        let mut seen_mgroups: Vec<MGroup> = Vec::new();
        let mut axis_words: [Option<f64>; 6] = [None; 6];
        let mut feed: Option<f64> = None;
        let mut offsets = [0.0f64; 3];
        let mut offsets_present = [false; 3];
        let mut radius: Option<f64> = None;
        let mut rotations: Option<i32> = None;
        let mut g_words: Vec<f64> = Vec::new();
        let mut m_words: Vec<f64> = Vec::new();

        for Word { letter, value } in &words {
            match letter {
                'G' => g_words.push(*value),
                'M' => m_words.push(*value),
                'F' => feed = Some(*value),
                'N' | 'P' => {}
                'X' => axis_words[Axis::X.index()] = Some(*value),
                'Y' => axis_words[Axis::Y.index()] = Some(*value),
                'Z' => axis_words[Axis::Z.index()] = Some(*value),
                'A' => axis_words[Axis::A.index()] = Some(*value),
                'B' => axis_words[Axis::B.index()] = Some(*value),
                'C' => axis_words[Axis::C.index()] = Some(*value),
                'I' => {
                    offsets[0] = *value;
                    offsets_present[0] = true;
                }
                'J' => {
                    offsets[1] = *value;
                    offsets_present[1] = true;
                }
                'K' => {
                    offsets[2] = *value;
                    offsets_present[2] = true;
                }
                'R' => radius = Some(*value),
                _ => {}
            }
        }
        // P is reused for dwell seconds / rotation count depending on context;
        // find it explicitly since 'N' is line number and both use the same letter 'P'.
        let p_value = words.iter().find(|w| w.letter == 'P').map(|w| w.value);
        if let Some(p) = p_value {
            rotations = Some(p as i32);
        }

        if let Some(f) = feed {
            self.modal.feed_rate = f;
        }

        let has_axis_word = axis_words.iter().any(Option::is_some);
        let has_offset_word = offsets_present.iter().any(|&p| p) || radius.is_some();

        for g in &g_words {
            let group = classify_g(*g)?;
            if seen_groups.contains(&group) && group != ModalGroup::NonModal {
                return Err(GcodeError::ModalGroupViolation.into());
            }
            seen_groups.push(group);
        }
        for m in &m_words {
            let group = classify_m(*m)?;
            if seen_mgroups.contains(&group) {
                return Err(GcodeError::ModalGroupViolation.into());
            }
            seen_mgroups.push(group);
        }

        // Apply non-motion modal words first (plane/units/distance/feed-rate-mode/path-control/coord-system).
        for g in &g_words {
            apply_non_motion_g(*g, &mut self.modal, &mut self.pos);
        }

        // Silent-skip rule (spec §4.1): only F/P/N and no axis/offset words while
        // an arc motion mode is active.
        let motion_g = g_words.iter().find(|g| is_motion_word(**g));
        let effective_motion = match motion_g {
            Some(g) => Some(*g),
            None => None, // inherits previous motion mode below
        };

        if effective_motion.is_none()
            && matches!(self.modal.motion_mode, MotionMode::ArcCw | MotionMode::ArcCcw)
            && !has_axis_word
            && !has_offset_word
        {
            debug!(line = line_no, "silent-skip: arc-mode block with only modal words");
            return Ok(());
        }

        let motion_word = effective_motion;

        // G28/G30/G92 are non-modal and consume axis words themselves; an
        // axis word in one of these blocks must not also trigger the
        // currently active motion mode.
        let non_modal_axis_consumer = g_words.iter().any(|g| matches!(tenths(*g), 280 | 300 | 920));

        match motion_word {
            Some(g) if g == 0.0 => {
                let target = self.compute_target(config, &axis_words);
                self.straight_traverse(target, line_no)
            }
            Some(g) if g == 1.0 => {
                if self.modal.feed_rate <= 0.0 && matches!(self.modal.feed_rate_mode, FeedRateMode::UnitsPerMinute) {
                    return Err(GcodeError::FeedrateMissing.into());
                }
                if !has_axis_word {
                    return Err(GcodeError::AxisWordMissing.into());
                }
                let target = self.compute_target(config, &axis_words);
                self.straight_feed(target, self.modal.feed_rate, line_no)
            }
            Some(g) if g == 2.0 || g == 3.0 => {
                let target = self.compute_target(config, &axis_words);
                let mut target_present = [false; 6];
                for axis in ALL_AXES {
                    target_present[axis.index()] = axis_words[axis.index()].is_some();
                }
                self.arc_feed(
                    config,
                    target,
                    target_present,
                    offsets,
                    offsets_present,
                    radius.unwrap_or(0.0),
                    radius.is_some(),
                    rotations.unwrap_or(1),
                    rotations.is_some(),
                    g == 2.0,
                    line_no,
                )
            }
            Some(g) if g == 80.0 => {
                self.modal.motion_mode = MotionMode::Cancel;
                Ok(())
            }
            None if has_axis_word && !non_modal_axis_consumer => match self.modal.motion_mode {
                MotionMode::Traverse => {
                    let target = self.compute_target(config, &axis_words);
                    self.straight_traverse(target, line_no)
                }
                MotionMode::Feed => {
                    if self.modal.feed_rate <= 0.0 {
                        return Err(GcodeError::FeedrateMissing.into());
                    }
                    let target = self.compute_target(config, &axis_words);
                    self.straight_feed(target, self.modal.feed_rate, line_no)
                }
                _ => Err(GcodeError::CommandNotAccepted.into()),
            },
            _ => Ok(()),
        }?;

        // G4 dwell and M-codes.
        for g in &g_words {
            if *g == 4.0 {
                let seconds = p_value.ok_or(GcodeError::ArcSpecError("G4 missing P".into()))?;
                self.dwell(seconds, line_no)?;
            }
            if *g == 92.0 {
                for axis in ALL_AXES {
                    if let Some(w) = axis_words[axis.index()] {
                        let current = self.pos.position.get(axis);
                        self.pos.g92_offset.set(axis, current - w);
                    }
                }
            }
        }
        for m in &m_words {
            if let Some(payload) = m_code_payload(*m) {
                self.queue_command(payload, line_no)?;
            }
        }

        Ok(())
    }
}

/// G/M word values carry one decimal place at most (e.g. `G61.1`); match on
/// a tenths-scaled integer key instead of the float directly.
fn tenths(value: f64) -> i32 {
    (value * 10.0).round() as i32
}

fn is_motion_word(g: f64) -> bool {
    matches!(tenths(g), 0 | 10 | 20 | 30 | 800)
}

fn classify_g(g: f64) -> Result<ModalGroup, StatusCode> {
    Ok(match tenths(g) {
        0 | 10 | 20 | 30 | 800 => ModalGroup::Motion,
        170 | 180 | 190 => ModalGroup::Plane,
        200 | 210 => ModalGroup::Units,
        900 | 910 => ModalGroup::Distance,
        930 | 940 => ModalGroup::FeedRateMode,
        610 | 611 | 640 => ModalGroup::PathControl,
        540 | 550 | 560 | 570 | 580 | 590 => ModalGroup::CoordSystem,
        40 | 280 | 300 | 920 => ModalGroup::NonModal,
        _ => return Err(ParseError::UnrecognizedCommand(format!("G{g}")).into()),
    })
}

fn classify_m(m: f64) -> Result<MGroup, StatusCode> {
    Ok(match tenths(m) {
        0 | 10 | 20 | 300 => MGroup::Stopping,
        30 | 40 | 50 => MGroup::Spindle,
        70 | 80 | 90 => MGroup::Coolant,
        _ => return Err(ParseError::UnrecognizedCommand(format!("M{m}")).into()),
    })
}

fn apply_non_motion_g(g: f64, modal: &mut ModalState, pos: &mut PositionalState) {
    match tenths(g) {
        170 => modal.plane = Plane::Xy,
        180 => modal.plane = Plane::Xz,
        190 => modal.plane = Plane::Yz,
        200 => modal.units = Units::Inches,
        210 => modal.units = Units::Millimeters,
        900 => modal.distance_mode = DistanceMode::Absolute,
        910 => modal.distance_mode = DistanceMode::Incremental,
        930 => modal.feed_rate_mode = FeedRateMode::InverseTime,
        940 => modal.feed_rate_mode = FeedRateMode::UnitsPerMinute,
        610 => modal.path_control = PathControlMode::ExactStop,
        611 => modal.path_control = PathControlMode::ExactPath,
        640 => modal.path_control = PathControlMode::Continuous,
        540..=590 => modal.coord_system = ((tenths(g) - 540) / 10) as u8,
        _ => {
            let _ = pos; // reserved for G28/G30/G92 side effects handled by caller
        }
    }
}

fn m_code_payload(m: f64) -> Option<CommandPayload> {
    match tenths(m) {
        0 | 10 => Some(CommandPayload::ProgramPause),
        20 | 300 => Some(CommandPayload::ProgramEnd),
        30 => Some(CommandPayload::SpindleCw(0.0)),
        40 => Some(CommandPayload::SpindleCcw(0.0)),
        50 => Some(CommandPayload::SpindleStop),
        70 => Some(CommandPayload::CoolantMist),
        80 => Some(CommandPayload::CoolantFlood),
        90 => Some(CommandPayload::CoolantOff),
        _ => None,
    }
}
