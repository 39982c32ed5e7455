//! Central status/error taxonomy (spec §7).
//!
//! Every public entry point into the core returns one of these codes (or a
//! `Result` whose error converts into one). The protocol layer — external to
//! this crate — is responsible for turning a `StatusCode` into text.

use thiserror::Error;

/// Parse/input errors produced while lexing or tokenizing a block.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),
    #[error("bad number format: {0}")]
    BadNumberFormat(String),
    #[error("input too long ({0} bytes)")]
    InputTooLong(usize),
    #[error("input out of range: {0}")]
    InputOutOfRange(String),
    #[error("value unsupported: {0}")]
    ValueUnsupported(String),
}

/// G-code semantic errors (modal rules, arcs, travel limits).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GcodeError {
    #[error("modal group violation")]
    ModalGroupViolation,
    #[error("axis word missing")]
    AxisWordMissing,
    #[error("feed rate not specified")]
    FeedrateMissing,
    #[error("arc spec error: {0}")]
    ArcSpecError(String),
    #[error("arc endpoint equals start")]
    ArcEndpointEqualsStart,
    #[error("arc radius out of tolerance")]
    ArcRadiusOutOfTolerance,
    #[error("arc offsets missing for plane")]
    ArcOffsetsMissingForPlane,
    #[error("maximum travel exceeded on axis {0}")]
    MaxTravelExceeded(&'static str),
    #[error("maximum spindle speed exceeded")]
    MaxSpindleSpeedExceeded,
    #[error("command not accepted in current state")]
    CommandNotAccepted,
}

/// Motion runtime errors: can't be localized to a single bad block.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("move shorter than minimum length")]
    MinimumLengthMove,
    #[error("move shorter than minimum time")]
    MinimumTimeMove,
    #[error("soft limit exceeded on axis {0}")]
    SoftLimitExceeded(&'static str),
    #[error("homing failed")]
    HomingFailed,
    #[error("probing failed")]
    ProbingFailed,
    #[error("missed segment-prepare deadline")]
    MissedSegmentDeadline,
    #[error("step/direction integrity check failed")]
    IntegrityFault,
}

/// System-level errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SystemError {
    #[error("planner buffer full")]
    BufferFull,
    #[error("planner buffer full (fatal, unrecoverable)")]
    BufferFullFatal,
    #[error("planner assertion failure: {0}")]
    PlannerAssertion(String),
    #[error("internal range/math error: {0}")]
    MathError(String),
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("machine is alarmed")]
    Alarmed,
}

/// The unified status code every entry point returns.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatusCode {
    #[error("ok")]
    Ok,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Gcode(#[from] GcodeError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    System(#[from] SystemError),
}

impl StatusCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

pub type BlockResult = Result<(), StatusCode>;
