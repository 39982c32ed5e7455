//! Gcode interpreter and canonical machine (spec §4.1).

pub mod model;
pub mod parser;
pub mod primitives;

pub use model::{CanonicalMachine, ModalState, MotionSink, PositionalState};
pub use primitives::{ArcPrimitive, CommandPayload, CommandPrimitive, DwellPrimitive, LinePrimitive, MotionMode, Primitive};
