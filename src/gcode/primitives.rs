//! Canonical motion primitives (spec §3, §4.1).
//!
//! These are what the interpreter emits and what the arc expander consumes
//! and produces; the planner only ever sees `Primitive::Line` and
//! `Primitive::Command` entries (arcs are gone by the time they reach it).

use crate::axes::AxisVector;
use crate::config::{DistanceMode, FeedRateMode, Plane};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Traverse, // G0
    Feed,     // G1
    ArcCw,    // G2
    ArcCcw,   // G3
    Cancel,   // G80
}

/// Modal state snapshot carried alongside a primitive so later stages (arc
/// expansion, planner) can interpret it without reaching back into the
/// interpreter (spec §3: "the modal state snapshot required to interpret it").
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModalSnapshot {
    pub plane: Plane,
    pub distance_mode: DistanceMode,
    pub feed_rate_mode: FeedRateMode,
}

/// A straight move (G0/G1), already target-resolved into canonical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePrimitive {
    pub line_no: u32,
    pub target: AxisVector,
    pub feed_rate: f64,
    pub motion_mode: MotionMode,
    pub modal: ModalSnapshot,
}

/// A circular/helical move (G2/G3) before expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcPrimitive {
    pub line_no: u32,
    pub target: AxisVector,
    pub target_present: [bool; 6],
    /// Center offsets I, J, K, indexed by plane axis (a0, a1) then helical.
    pub offsets: [f64; 3],
    pub offsets_present: [bool; 3],
    pub radius: f64,
    pub radius_present: bool,
    pub rotations: i32,
    pub rotations_present: bool,
    pub feed_rate: f64,
    pub motion_mode: MotionMode,
    pub modal: ModalSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellPrimitive {
    pub line_no: u32,
    pub seconds: f64,
}

/// Synchronous command payload (spec §9: replace function-pointer callbacks
/// with an enum whose variants carry their own data).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandPayload {
    SpindleCw(f64),
    SpindleCcw(f64),
    SpindleStop,
    CoolantMist,
    CoolantFlood,
    CoolantOff,
    ProgramPause,
    ProgramStop,
    ProgramEnd,
    ToolChange(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandPrimitive {
    pub line_no: u32,
    pub payload: CommandPayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Line(LinePrimitive),
    Arc(ArcPrimitive),
    Dwell(DwellPrimitive),
    Command(CommandPrimitive),
}
