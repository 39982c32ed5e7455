//! Arc expander (spec §4.2): G2/G3 → a sequence of straight feeds.
//!
//! No arc expander exists in the teacher; this is grounded in its vector-math
//! style (`motion::junction`, `motion::kinematics`) generalized to the full
//! plane-selection/radius-and-center-form algorithm below.

use crate::axes::{Axis, AxisVector};
use crate::config::{Config, FeedRateMode, Plane};
use crate::error::{GcodeError, RuntimeError, StatusCode};
use crate::gcode::primitives::{ArcPrimitive, LinePrimitive, MotionMode};
use std::f64::consts::PI;

const MIN_ARC_RADIUS: f64 = 0.0001;
const ARC_RADIUS_ERROR_MAX: f64 = 0.5;
const ARC_RADIUS_ERROR_MIN: f64 = 0.0001;
const ARC_RADIUS_TOLERANCE: f64 = 0.001;

/// (in-plane axis 0, in-plane axis 1, helical axis), in the order the
/// angle convention below assumes: angle = atan2(a1, a0).
fn plane_axes(plane: Plane) -> (Axis, Axis, Axis) {
    match plane {
        Plane::Xy => (Axis::X, Axis::Y, Axis::Z),
        Plane::Xz => (Axis::X, Axis::Z, Axis::Y),
        Plane::Yz => (Axis::Y, Axis::Z, Axis::X),
    }
}

/// Index into a fixed I/J/K offset triple by physical axis (I=X, J=Y, K=Z),
/// independent of which plane is active.
fn ijk_index(axis: Axis) -> Option<usize> {
    match axis {
        Axis::X => Some(0),
        Axis::Y => Some(1),
        Axis::Z => Some(2),
        _ => None,
    }
}

struct Resolved {
    center_a0: f64,
    center_a1: f64,
    radius: f64,
}

fn resolve_radius_form(
    arc: &ArcPrimitive,
    start_a0: f64,
    start_a1: f64,
    target_a0: f64,
    target_a1: f64,
) -> Result<Resolved, StatusCode> {
    let r = arc.radius;
    if r.abs() < MIN_ARC_RADIUS {
        return Err(GcodeError::ArcRadiusOutOfTolerance.into());
    }
    let dx = target_a0 - start_a0;
    let dy = target_a1 - start_a1;
    let d2 = dx * dx + dy * dy;
    if d2 < 1e-18 {
        return Err(GcodeError::ArcEndpointEqualsStart.into());
    }
    let d = d2.sqrt();
    let h2 = r * r - d2 / 4.0;
    if h2 < 0.0 {
        return Err(GcodeError::ArcRadiusOutOfTolerance.into());
    }
    let h = h2.sqrt();

    let mid_a0 = (start_a0 + target_a0) / 2.0;
    let mid_a1 = (start_a1 + target_a1) / 2.0;
    // Perpendicular to the chord, unit length.
    let perp_a0 = -dy / d;
    let perp_a1 = dx / d;

    // CW with positive r picks one side; CCW or negative r flips it
    // (spec §4.2 step 2: "negative r selects the long arc").
    let cw = matches!(arc.motion_mode, MotionMode::ArcCw);
    let mut sign = if cw { -1.0 } else { 1.0 };
    if r < 0.0 {
        sign = -sign;
    }

    Ok(Resolved {
        center_a0: mid_a0 + sign * h * perp_a0,
        center_a1: mid_a1 + sign * h * perp_a1,
        radius: r.abs(),
    })
}

fn resolve_center_form(arc: &ArcPrimitive, a0: Axis, a1: Axis, start_a0: f64, start_a1: f64, target_a0: f64, target_a1: f64) -> Result<Resolved, StatusCode> {
    let i0 = ijk_index(a0).expect("plane axis is always linear");
    let i1 = ijk_index(a1).expect("plane axis is always linear");

    let offset_a0 = if arc.offsets_present[i0] { arc.offsets[i0] } else { 0.0 };
    let offset_a1 = if arc.offsets_present[i1] { arc.offsets[i1] } else { 0.0 };
    if !arc.offsets_present[i0] && !arc.offsets_present[i1] {
        return Err(GcodeError::ArcOffsetsMissingForPlane.into());
    }

    let center_a0 = start_a0 + offset_a0;
    let center_a1 = start_a1 + offset_a1;
    let start_radius = (offset_a0 * offset_a0 + offset_a1 * offset_a1).sqrt();
    let end_dx = target_a0 - center_a0;
    let end_dy = target_a1 - center_a1;
    let end_radius = (end_dx * end_dx + end_dy * end_dy).sqrt();

    let diff = (end_radius - start_radius).abs();
    let tolerance = ARC_RADIUS_ERROR_MIN.max(start_radius * ARC_RADIUS_TOLERANCE);
    if diff > ARC_RADIUS_ERROR_MAX && diff > tolerance {
        return Err(GcodeError::ArcSpecError(format!(
            "start radius {start_radius:.6} and end radius {end_radius:.6} differ by {diff:.6}"
        ))
        .into());
    }
    if start_radius < MIN_ARC_RADIUS {
        return Err(GcodeError::ArcRadiusOutOfTolerance.into());
    }

    Ok(Resolved { center_a0, center_a1, radius: start_radius })
}

/// Expand one arc primitive into a sequence of line primitives.
pub fn expand_arc(arc: &ArcPrimitive, config: &Config, current_position: &AxisVector) -> Result<Vec<LinePrimitive>, StatusCode> {
    let (a0, a1, helical) = plane_axes(arc.modal.plane);
    let cw = matches!(arc.motion_mode, MotionMode::ArcCw);

    let start_a0 = current_position.get(a0);
    let start_a1 = current_position.get(a1);

    let plane_endpoint_given = arc.target_present[a0.index()] || arc.target_present[a1.index()];
    let target_a0 = if arc.target_present[a0.index()] { arc.target.get(a0) } else { start_a0 };
    let target_a1 = if arc.target_present[a1.index()] { arc.target.get(a1) } else { start_a1 };

    let resolved = if arc.radius_present {
        resolve_radius_form(arc, start_a0, start_a1, target_a0, target_a1)?
    } else {
        resolve_center_form(arc, a0, a1, start_a0, start_a1, target_a0, target_a1)?
    };

    let start_angle = (start_a1 - resolved.center_a1).atan2(start_a0 - resolved.center_a0);

    let mut angular_travel = if plane_endpoint_given {
        let end_angle = (target_a1 - resolved.center_a1).atan2(target_a0 - resolved.center_a0);
        let mut travel = end_angle - start_angle;
        if cw {
            if travel <= 1e-12 {
                travel += 2.0 * PI;
            }
        } else if travel >= -1e-12 {
            travel -= 2.0 * PI;
        }
        travel
    } else {
        0.0
    };

    // G18 (XZ) angular-travel sign-flip fix (spec §9 redesign flag / open question).
    if matches!(arc.modal.plane, Plane::Xz) {
        angular_travel = -angular_travel;
    }

    let direction_sign = if cw { 1.0 } else { -1.0 };
    if arc.rotations_present {
        angular_travel += (arc.rotations as f64) * 2.0 * PI * direction_sign;
    } else if !plane_endpoint_given {
        // Full circle, default P=1 (spec §4.2 step 4).
        angular_travel = direction_sign * 2.0 * PI;
    }

    let target_helical = if arc.target_present[helical.index()] { arc.target.get(helical) } else { current_position.get(helical) };
    let start_helical = current_position.get(helical);
    let linear = (target_helical - start_helical).abs();
    let planar = (angular_travel * resolved.radius).abs();
    let length = (planar * planar + linear * linear).sqrt();

    if length < 1e-9 {
        return Err(RuntimeError::MinimumLengthMove.into());
    }

    let chordal_tolerance = config.system.chordal_tolerance;
    let chord_limit = if 2.0 * resolved.radius > chordal_tolerance {
        planar / (4.0 * chordal_tolerance * (2.0 * resolved.radius - chordal_tolerance)).sqrt()
    } else {
        f64::INFINITY
    };

    let planned_time_minutes = match arc.modal.feed_rate_mode {
        FeedRateMode::InverseTime => {
            if arc.feed_rate <= 0.0 {
                return Err(GcodeError::FeedrateMissing.into());
            }
            1.0 / arc.feed_rate
        }
        FeedRateMode::UnitsPerMinute => {
            if arc.feed_rate <= 0.0 {
                return Err(GcodeError::FeedrateMissing.into());
            }
            length / arc.feed_rate
        }
    };
    let slowest_feedrate_max = [config.axis(a0).feedrate_max, config.axis(a1).feedrate_max, config.axis(helical).feedrate_max]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
        .max(1e-6);
    let planned_time_minutes = planned_time_minutes.max(length / slowest_feedrate_max);
    let planned_time_seconds = planned_time_minutes * 60.0;
    let time_limit = planned_time_seconds / config.system.min_segment_time.max(1e-9);

    let segments = (chord_limit.min(time_limit).floor() as i64).max(1) as usize;

    let mut out = Vec::with_capacity(segments);
    let mut prev = *current_position;
    let mut end_vector = *current_position;
    for axis in crate::axes::ALL_AXES {
        if arc.target_present[axis.index()] {
            end_vector.set(axis, arc.target.get(axis));
        }
    }
    end_vector.set(a0, resolved.center_a0 + resolved.radius * (start_angle + angular_travel).cos());
    end_vector.set(a1, resolved.center_a1 + resolved.radius * (start_angle + angular_travel).sin());

    for seg in 0..segments {
        let frac = (seg + 1) as f64 / segments as f64;
        let angle = start_angle + angular_travel * frac;
        let mut point = prev;
        for axis in crate::axes::ALL_AXES {
            if axis == a0 || axis == a1 {
                continue;
            }
            let start_v = current_position.get(axis);
            let end_v = end_vector.get(axis);
            point.set(axis, start_v + (end_v - start_v) * frac);
        }
        point.set(a0, resolved.center_a0 + resolved.radius * angle.cos());
        point.set(a1, resolved.center_a1 + resolved.radius * angle.sin());

        out.push(LinePrimitive {
            line_no: arc.line_no,
            target: point,
            feed_rate: if matches!(arc.modal.feed_rate_mode, FeedRateMode::InverseTime) {
                arc.feed_rate * segments as f64
            } else {
                arc.feed_rate
            },
            motion_mode: MotionMode::Feed,
            modal: arc.modal,
        });
        prev = point;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMode;
    use crate::gcode::primitives::ModalSnapshot;

    fn modal(plane: Plane) -> ModalSnapshot {
        ModalSnapshot { plane, distance_mode: DistanceMode::Absolute, feed_rate_mode: FeedRateMode::UnitsPerMinute }
    }

    #[test]
    fn radius_arc_xy_semicircle() {
        let config = Config::default();
        let start = AxisVector::ZERO;
        let mut target = AxisVector::ZERO;
        target.set(Axis::X, 10.0);
        let mut present = [false; 6];
        present[Axis::X.index()] = true;

        let arc = ArcPrimitive {
            line_no: 1,
            target,
            target_present: present,
            offsets: [0.0; 3],
            offsets_present: [false; 3],
            radius: 5.0,
            radius_present: true,
            rotations: 0,
            rotations_present: false,
            feed_rate: 300.0,
            motion_mode: MotionMode::ArcCw,
            modal: modal(Plane::Xy),
        };

        let segments = expand_arc(&arc, &config, &start).unwrap();
        assert!(!segments.is_empty());
        let last = segments.last().unwrap();
        assert!((last.target.get(Axis::X) - 10.0).abs() < 1e-6);
        assert!(last.target.get(Axis::Y).abs() < 1e-6);

        let total_planar: f64 = segments
            .iter()
            .scan(start, |prev, seg| {
                let dx = seg.target.get(Axis::X) - prev.get(Axis::X);
                let dy = seg.target.get(Axis::Y) - prev.get(Axis::Y);
                *prev = seg.target;
                Some((dx * dx + dy * dy).sqrt())
            })
            .sum();
        // Start (0,0) to target (10,0) with R5 is a chord equal to the
        // diameter (h=0), i.e. a semicircle: planar length = pi * r.
        let expected = std::f64::consts::PI * 5.0;
        assert!((total_planar - expected).abs() / expected < 0.01);
    }

    #[test]
    fn full_circle_returns_to_start() {
        let config = Config::default();
        let start = AxisVector::ZERO;
        let arc = ArcPrimitive {
            line_no: 1,
            target: AxisVector::ZERO,
            target_present: [false; 6],
            offsets: [5.0, 0.0, 0.0],
            offsets_present: [true, false, false],
            radius: 0.0,
            radius_present: false,
            rotations: 1,
            rotations_present: true,
            feed_rate: 300.0,
            motion_mode: MotionMode::ArcCw,
            modal: modal(Plane::Xy),
        };
        let segments = expand_arc(&arc, &config, &start).unwrap();
        let last = segments.last().unwrap();
        assert!((last.target.get(Axis::X) - start.get(Axis::X)).abs() < 1e-6);
        assert!((last.target.get(Axis::Y) - start.get(Axis::Y)).abs() < 1e-6);
    }

    #[test]
    fn radius_form_rejects_identical_endpoints() {
        let config = Config::default();
        let start = AxisVector::ZERO;
        let arc = ArcPrimitive {
            line_no: 1,
            target: AxisVector::ZERO,
            target_present: [true, true, false, false, false, false],
            offsets: [0.0; 3],
            offsets_present: [false; 3],
            radius: 5.0,
            radius_present: true,
            rotations: 0,
            rotations_present: false,
            feed_rate: 300.0,
            motion_mode: MotionMode::ArcCw,
            modal: modal(Plane::Xy),
        };
        let err = expand_arc(&arc, &config, &start).unwrap_err();
        assert_eq!(err, StatusCode::Gcode(GcodeError::ArcEndpointEqualsStart));
    }
}
