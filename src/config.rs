//! Key/value configuration store (spec §6, §9).
//!
//! The teacher encodes configuration as a `serde`/TOML struct with
//! `#[serde(default = "...")]` scattered per field (`src/config/mod.rs`).
//! This keeps that shape for loading, and adds the table-driven key/value
//! surface the core needs to expose to an external configuration store:
//! opaque five-character-or-shorter keys resolving to typed fields, per
//! spec §9's guidance to replace the C original's function-pointer table
//! with a tagged sum type over a strongly typed struct rather than raw
//! pointers.

use crate::axes::{Axis, ALL_AXES};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum AxisMode {
    Disabled,
    #[default]
    Standard,
    Inhibited,
    Radius,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SwitchMode {
    #[default]
    Disabled,
    HomingOnly,
    LimitOnly,
    HomingAndLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SwitchType {
    #[default]
    NormallyOpen,
    NormallyClosed,
}

/// Per-axis static configuration (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisConfig {
    pub mode: AxisMode,
    pub velocity_max: f64,
    pub feedrate_max: f64,
    pub jerk_max: f64,
    pub junction_deviation: f64,
    pub travel_min: f64,
    pub travel_max: f64,
    /// Radius, for rotary axes run in radius mode (length-equivalent).
    pub radius: f64,
    pub switch_min: SwitchMode,
    pub switch_max: SwitchMode,
    pub search_velocity: f64,
    pub latch_velocity: f64,
    pub latch_backoff: f64,
    pub zero_backoff: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            mode: AxisMode::Standard,
            velocity_max: 600.0,
            feedrate_max: 600.0,
            jerk_max: 20_000_000.0,
            junction_deviation: 0.01,
            travel_min: 0.0,
            travel_max: 200.0,
            radius: 1.0,
            switch_min: SwitchMode::Disabled,
            switch_max: SwitchMode::Disabled,
            search_velocity: 500.0,
            latch_velocity: 100.0,
            latch_backoff: 2.0,
            zero_backoff: 1.0,
        }
    }
}

impl AxisConfig {
    /// Invariant (spec §3): `velocity_max >= search_velocity >= latch_velocity > 0`
    /// whenever the axis participates in homing (either switch armed).
    pub fn validate(&self) -> Result<(), String> {
        let homing_armed = self.switch_min != SwitchMode::Disabled || self.switch_max != SwitchMode::Disabled;
        if homing_armed {
            if !(self.velocity_max >= self.search_velocity
                && self.search_velocity >= self.latch_velocity
                && self.latch_velocity > 0.0)
            {
                return Err(format!(
                    "axis homing invariant violated: velocity_max {} >= search_velocity {} >= latch_velocity {} > 0",
                    self.velocity_max, self.search_velocity, self.latch_velocity
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Microsteps {
    One,
    Two,
    Four,
    #[default]
    Eight,
}

impl Microsteps {
    pub fn as_u32(self) -> u32 {
        match self {
            Microsteps::One => 1,
            Microsteps::Two => 2,
            Microsteps::Four => 4,
            Microsteps::Eight => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Polarity {
    #[default]
    Normal,
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum PowerMode {
    AlwaysOn,
    #[default]
    OnDuringMove,
    OnOnlyWhenStepping,
    Disabled,
}

/// Per-motor static configuration (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MotorConfig {
    pub axis: Option<Axis>,
    /// Degrees per full step.
    pub step_angle: f64,
    /// Length (in the mapped axis's units) per revolution.
    pub travel_per_rev: f64,
    pub microsteps: Microsteps,
    pub polarity: Polarity,
    pub power_mode: PowerMode,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            axis: None,
            step_angle: 1.8,
            travel_per_rev: 40.0,
            microsteps: Microsteps::Eight,
            polarity: Polarity::Normal,
            power_mode: PowerMode::OnDuringMove,
        }
    }
}

impl MotorConfig {
    /// `steps_per_unit = 360 / (step_angle / microsteps) / travel_per_rev`
    /// (spec §3), recomputed whenever any input changes rather than cached,
    /// since it is cheap and keeps this struct trivially `Copy`.
    pub fn steps_per_unit(&self) -> f64 {
        let microsteps = self.microsteps.as_u32() as f64;
        360.0 / (self.step_angle / microsteps) / self.travel_per_rev
    }
}

/// System-wide motion tuning (spec §6 keys `ja, ct, ml, ma, mt, st`).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SystemConfig {
    /// `ja` — junction (centripetal) acceleration used by the junction-deviation formula.
    pub junction_acceleration: f64,
    /// `ct` — chordal tolerance for arc segmentation.
    pub chordal_tolerance: f64,
    /// `ml` — minimum line segment length.
    pub min_line_segment: f64,
    /// `ma` — minimum arc segment length.
    pub min_arc_segment: f64,
    /// `mt` — minimum segment time.
    pub min_segment_time: f64,
    /// `st` — homing switch type.
    pub switch_type: SwitchType,
    /// Segment runtime micro-segment period, seconds.
    pub segment_time: f64,
    /// DDA tick period, seconds.
    pub dda_tick_period: f64,
    /// Planner ring capacity.
    pub planner_buffer_count: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            junction_acceleration: 100_000.0,
            chordal_tolerance: 0.01,
            min_line_segment: 0.001,
            min_arc_segment: 0.001,
            min_segment_time: 0.0000075,
            switch_type: SwitchType::NormallyOpen,
            segment_time: 0.00025,
            dda_tick_period: 0.000004,
            planner_buffer_count: 28,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Plane {
    #[default]
    Xy,
    Xz,
    Yz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum PathControlMode {
    ExactStop,
    ExactPath,
    #[default]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum DistanceMode {
    #[default]
    Absolute,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum FeedRateMode {
    #[default]
    UnitsPerMinute,
    InverseTime,
}

/// `gpl, gun, gco, gpa, gdi` default gcode modal state.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
pub struct GcodeDefaults {
    pub plane: Plane,
    pub units: Units,
    pub coord_system: u8,
    pub path_control: PathControlMode,
    pub distance_mode: DistanceMode,
}

/// One `G54..G59` or `G92` coordinate system's per-axis offset.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
pub struct CoordinateSystem {
    pub offset: crate::axes::AxisVector,
}

pub const COORD_SYSTEM_COUNT: usize = 7; // g54..g59 (6) + g92 (1)
pub const G92_INDEX: usize = 6;

/// The full configuration store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_axes")]
    pub axes: [AxisConfig; 6],
    #[serde(default)]
    pub motors: [MotorConfig; 4],
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub gcode_defaults: GcodeDefaults,
    #[serde(default = "default_coord_systems")]
    pub coord_systems: [CoordinateSystem; COORD_SYSTEM_COUNT],
    #[serde(default)]
    pub serial_port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_axes() -> [AxisConfig; 6] {
    [AxisConfig::default(); 6]
}

fn default_coord_systems() -> [CoordinateSystem; COORD_SYSTEM_COUNT] {
    [CoordinateSystem::default(); COORD_SYSTEM_COUNT]
}

fn default_baud() -> u32 {
    115_200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            axes: default_axes(),
            motors: Default::default(),
            system: SystemConfig::default(),
            gcode_defaults: GcodeDefaults::default(),
            coord_systems: default_coord_systems(),
            serial_port: String::new(),
            baud: default_baud(),
        }
    }
}

impl Config {
    pub fn load_from_str(toml_src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_src)
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        Self::load_from_str(&contents).map_err(|e| format!("parsing {}: {e}", path.display()))
    }

    pub fn validate(&self) -> Result<(), String> {
        for axis in ALL_AXES {
            self.axes[axis.index()].validate()?;
        }
        Ok(())
    }

    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        &self.axes[axis.index()]
    }

    /// Keys whose value may be written while motion is in progress without
    /// a "command not accepted" rejection (spec §5).
    pub fn is_runtime_safe_key(key: &ConfigKey) -> bool {
        matches!(
            key,
            ConfigKey::SystemJunctionAcceleration
                | ConfigKey::SystemChordalTolerance
                | ConfigKey::GcodeDefaultCoordSystem
        )
    }
}

/// A value carried by the key/value config protocol; spec §6: "numeric
/// (integer or float) or short strings".
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Float(f64),
    Int(i64),
    Str(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Int(v) => write!(f, "{v}"),
            ConfigValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Every documented configuration key (spec §6), as a tagged sum type rather
/// than an opaque string lookup table — the key string is only used at the
/// protocol boundary (`ConfigKey::parse`/`to_token`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Motor(u8, MotorKey),
    AxisKey(Axis, AxisKeyKind),
    SystemJunctionAcceleration,
    SystemChordalTolerance,
    SystemMinLine,
    SystemMinArc,
    SystemMinSegmentTime,
    SystemSwitchType,
    GcodeDefaultPlane,
    GcodeDefaultUnits,
    GcodeDefaultCoordSystem,
    GcodeDefaultPathControl,
    GcodeDefaultDistanceMode,
    CoordOffset(u8, Axis),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorKey {
    Axis,
    StepAngle,
    TravelPerRev,
    Microsteps,
    Polarity,
    PowerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKeyKind {
    Mode,
    VelocityMax,
    FeedrateMax,
    TravelMax,
    JerkMax,
    JunctionDeviation,
    SwitchMin,
    SwitchMax,
    SearchVelocity,
    LatchVelocity,
    LatchBackoff,
    ZeroBackoff,
    Radius,
}

impl ConfigKey {
    /// Parse an opaque token (spec §6: "Keys are opaque short tokens, ≤5 chars").
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() > 5 {
            return None;
        }
        let lower = token.to_ascii_lowercase();
        let mut chars = lower.chars();
        let first = chars.next()?;

        if let Some(digit) = first.to_digit(10) {
            let motor = digit as u8;
            if !(1..=4).contains(&motor) {
                return None;
            }
            let rest: String = chars.collect();
            let key = match rest.as_str() {
                "ma" => MotorKey::Axis,
                "sa" => MotorKey::StepAngle,
                "tr" => MotorKey::TravelPerRev,
                "mi" => MotorKey::Microsteps,
                "po" => MotorKey::Polarity,
                "pm" => MotorKey::PowerMode,
                _ => return None,
            };
            return Some(ConfigKey::Motor(motor, key));
        }

        if let Some(axis) = Axis::from_char(first) {
            let rest: String = chars.collect();
            let kind = match rest.as_str() {
                "am" => AxisKeyKind::Mode,
                "vm" => AxisKeyKind::VelocityMax,
                "fr" => AxisKeyKind::FeedrateMax,
                "tm" => AxisKeyKind::TravelMax,
                "jm" => AxisKeyKind::JerkMax,
                "jd" => AxisKeyKind::JunctionDeviation,
                "sn" => AxisKeyKind::SwitchMin,
                "sx" => AxisKeyKind::SwitchMax,
                "sv" => AxisKeyKind::SearchVelocity,
                "lv" => AxisKeyKind::LatchVelocity,
                "lb" => AxisKeyKind::LatchBackoff,
                "zb" => AxisKeyKind::ZeroBackoff,
                "ra" if axis.is_rotary() => AxisKeyKind::Radius,
                _ => return None,
            };
            return Some(ConfigKey::AxisKey(axis, kind));
        }

        match lower.as_str() {
            "ja" => return Some(ConfigKey::SystemJunctionAcceleration),
            "ct" => return Some(ConfigKey::SystemChordalTolerance),
            "ml" => return Some(ConfigKey::SystemMinLine),
            "ma" => return Some(ConfigKey::SystemMinArc),
            "mt" => return Some(ConfigKey::SystemMinSegmentTime),
            "st" => return Some(ConfigKey::SystemSwitchType),
            "gpl" => return Some(ConfigKey::GcodeDefaultPlane),
            "gun" => return Some(ConfigKey::GcodeDefaultUnits),
            "gco" => return Some(ConfigKey::GcodeDefaultCoordSystem),
            "gpa" => return Some(ConfigKey::GcodeDefaultPathControl),
            "gdi" => return Some(ConfigKey::GcodeDefaultDistanceMode),
            _ => {}
        }

        if first == 'g' {
            let rest: String = chars.collect();
            if rest.len() == 2 {
                let mut rc = rest.chars();
                let sys_digit2 = rc.next()?;
                let axis_char = rc.next()?;
                let system_no: u8 = format!("5{sys_digit2}").parse().ok()?;
                if (54..=59).contains(&system_no) {
                    let axis = Axis::from_char(axis_char)?;
                    return Some(ConfigKey::CoordOffset(system_no - 54, axis));
                }
            }
            if rest.len() == 3 && &rest[..2] == "92" {
                let axis_char = rest.chars().nth(2)?;
                let axis = Axis::from_char(axis_char)?;
                return Some(ConfigKey::CoordOffset(G92_INDEX as u8, axis));
            }
        }
        None
    }

    pub fn get(self, config: &Config) -> ConfigValue {
        use ConfigValue::*;
        match self {
            ConfigKey::Motor(n, key) => {
                let m = &config.motors[(n - 1) as usize];
                match key {
                    MotorKey::Axis => Str(m.axis.map(|a| a.letter().to_string()).unwrap_or_default()),
                    MotorKey::StepAngle => Float(m.step_angle),
                    MotorKey::TravelPerRev => Float(m.travel_per_rev),
                    MotorKey::Microsteps => Int(m.microsteps.as_u32() as i64),
                    MotorKey::Polarity => Int((m.polarity == Polarity::Reversed) as i64),
                    MotorKey::PowerMode => Int(m.power_mode as i64),
                }
            }
            ConfigKey::AxisKey(axis, kind) => {
                let a = config.axis(axis);
                match kind {
                    AxisKeyKind::Mode => Int(a.mode as i64),
                    AxisKeyKind::VelocityMax => Float(a.velocity_max),
                    AxisKeyKind::FeedrateMax => Float(a.feedrate_max),
                    AxisKeyKind::TravelMax => Float(a.travel_max),
                    AxisKeyKind::JerkMax => Float(a.jerk_max),
                    AxisKeyKind::JunctionDeviation => Float(a.junction_deviation),
                    AxisKeyKind::SwitchMin => Int(a.switch_min as i64),
                    AxisKeyKind::SwitchMax => Int(a.switch_max as i64),
                    AxisKeyKind::SearchVelocity => Float(a.search_velocity),
                    AxisKeyKind::LatchVelocity => Float(a.latch_velocity),
                    AxisKeyKind::LatchBackoff => Float(a.latch_backoff),
                    AxisKeyKind::ZeroBackoff => Float(a.zero_backoff),
                    AxisKeyKind::Radius => Float(a.radius),
                }
            }
            ConfigKey::SystemJunctionAcceleration => Float(config.system.junction_acceleration),
            ConfigKey::SystemChordalTolerance => Float(config.system.chordal_tolerance),
            ConfigKey::SystemMinLine => Float(config.system.min_line_segment),
            ConfigKey::SystemMinArc => Float(config.system.min_arc_segment),
            ConfigKey::SystemMinSegmentTime => Float(config.system.min_segment_time),
            ConfigKey::SystemSwitchType => Int(config.system.switch_type as i64),
            ConfigKey::GcodeDefaultPlane => Int(config.gcode_defaults.plane as i64),
            ConfigKey::GcodeDefaultUnits => Int(config.gcode_defaults.units as i64),
            ConfigKey::GcodeDefaultCoordSystem => Int(config.gcode_defaults.coord_system as i64),
            ConfigKey::GcodeDefaultPathControl => Int(config.gcode_defaults.path_control as i64),
            ConfigKey::GcodeDefaultDistanceMode => Int(config.gcode_defaults.distance_mode as i64),
            ConfigKey::CoordOffset(sys, axis) => Float(config.coord_systems[sys as usize].offset.get(axis)),
        }
    }

    /// Set a float-valued key. Non-numeric keys (enums, strings) are set
    /// through dedicated setters on `Config`, not through this generic path,
    /// matching the spec's distinction between numeric and short-string values.
    pub fn set_float(self, config: &mut Config, value: f64) -> Result<(), crate::error::StatusCode> {
        use crate::error::{GcodeError, StatusCode};
        match self {
            ConfigKey::Motor(n, MotorKey::StepAngle) => config.motors[(n - 1) as usize].step_angle = value,
            ConfigKey::Motor(n, MotorKey::TravelPerRev) => config.motors[(n - 1) as usize].travel_per_rev = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::VelocityMax) => config.axes[axis.index()].velocity_max = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::FeedrateMax) => config.axes[axis.index()].feedrate_max = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::TravelMax) => config.axes[axis.index()].travel_max = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::JerkMax) => config.axes[axis.index()].jerk_max = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::JunctionDeviation) => {
                config.axes[axis.index()].junction_deviation = value
            }
            ConfigKey::AxisKey(axis, AxisKeyKind::SearchVelocity) => config.axes[axis.index()].search_velocity = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::LatchVelocity) => config.axes[axis.index()].latch_velocity = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::LatchBackoff) => config.axes[axis.index()].latch_backoff = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::ZeroBackoff) => config.axes[axis.index()].zero_backoff = value,
            ConfigKey::AxisKey(axis, AxisKeyKind::Radius) => config.axes[axis.index()].radius = value,
            ConfigKey::SystemJunctionAcceleration => config.system.junction_acceleration = value,
            ConfigKey::SystemChordalTolerance => config.system.chordal_tolerance = value,
            ConfigKey::SystemMinLine => config.system.min_line_segment = value,
            ConfigKey::SystemMinArc => config.system.min_arc_segment = value,
            ConfigKey::SystemMinSegmentTime => config.system.min_segment_time = value,
            ConfigKey::CoordOffset(sys, axis) => config.coord_systems[sys as usize].offset.set(axis, value),
            _ => return Err(StatusCode::Gcode(GcodeError::CommandNotAccepted)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_axis_and_motor_keys() {
        assert_eq!(
            ConfigKey::parse("xvm"),
            Some(ConfigKey::AxisKey(Axis::X, AxisKeyKind::VelocityMax))
        );
        assert_eq!(ConfigKey::parse("1sa"), Some(ConfigKey::Motor(1, MotorKey::StepAngle)));
        assert_eq!(ConfigKey::parse("ja"), Some(ConfigKey::SystemJunctionAcceleration));
        assert_eq!(ConfigKey::parse("g54x"), Some(ConfigKey::CoordOffset(0, Axis::X)));
        assert_eq!(ConfigKey::parse("g92z"), Some(ConfigKey::CoordOffset(G92_INDEX as u8, Axis::Z)));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert_eq!(ConfigKey::parse("zzzzzz"), None);
        assert_eq!(ConfigKey::parse("5ma"), None); // motor index out of 1..=4
    }

    #[test]
    fn round_trips_float_keys() {
        let mut config = Config::default();
        let key = ConfigKey::parse("xvm").unwrap();
        key.set_float(&mut config, 750.0).unwrap();
        assert_eq!(key.get(&config), ConfigValue::Float(750.0));
    }

    #[test]
    fn steps_per_unit_matches_spec_formula() {
        let motor = MotorConfig {
            axis: Some(Axis::X),
            step_angle: 1.8,
            travel_per_rev: 1.25,
            microsteps: Microsteps::Eight,
            ..Default::default()
        };
        // 360 / (1.8/8) / 1.25 = 360 / 0.225 / 1.25 = 1600 / 1.25 = 1280
        assert!((motor.steps_per_unit() - 1280.0).abs() < 1e-9);
    }

    #[test]
    fn homing_invariant_enforced_only_when_armed() {
        let mut axis = AxisConfig::default();
        axis.switch_min = SwitchMode::HomingOnly;
        axis.search_velocity = 10.0;
        axis.latch_velocity = 50.0; // violates search >= latch
        assert!(axis.validate().is_err());

        axis.switch_min = SwitchMode::Disabled;
        assert!(axis.validate().is_ok());
    }
}
