// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe tracks: ordered control points animating one parameter.
//!
//! Timestamps are expressed in the owning element's media time, so the
//! effective domain of a track is `[inpoint, inpoint + duration]`. When an
//! element is trimmed or split the points are re-anchored on the new
//! boundaries by interpolating the curve, then pruned.

use crate::interval::ClockTime;
use serde::{Deserialize, Serialize};

/// Interpolation mode between control points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum InterpolationMode {
    /// Step: hold the previous value
    None,
    /// Linear interpolation
    #[default]
    Linear,
    /// Cubic Hermite spline
    Cubic,
}

/// A single `(timestamp, value)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Media time of the point
    pub timestamp: ClockTime,
    /// Value at this point
    pub value: f32,
}

impl ControlPoint {
    /// Create a control point
    pub fn new(timestamp: ClockTime, value: f32) -> Self {
        Self { timestamp, value }
    }
}

impl From<(ClockTime, f32)> for ControlPoint {
    fn from((timestamp, value): (ClockTime, f32)) -> Self {
        Self::new(timestamp, value)
    }
}

/// Interpolation utilities
pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two floats
    pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + (b - a) * t
    }

    /// Hermite spline interpolation
    pub fn hermite(p0: f64, m0: f64, p1: f64, m1: f64, t: f64) -> f64 {
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * p0 + h10 * m0 + h01 * p1 + h11 * m1
    }
}

/// Value of the straight line through `prev` and `next` at `position`.
///
/// With only one neighbour its value is returned as is. `position` may lie
/// before `prev`, in which case the line is extended backwards. Results are
/// clamped to `[0.0, 1.0]` unless `absolute` is set. Returns `None` only when
/// both neighbours are missing.
pub fn interpolate_at(
    prev: Option<ControlPoint>,
    next: Option<ControlPoint>,
    position: ClockTime,
    absolute: bool,
) -> Option<f32> {
    let value = match (prev, next) {
        (None, None) => return None,
        (None, Some(next)) => next.value,
        (Some(prev), None) => prev.value,
        (Some(prev), Some(next)) => {
            let span = next.timestamp.saturating_sub(prev.timestamp);
            if position == prev.timestamp || span == 0 {
                prev.value
            } else if position == next.timestamp {
                next.value
            } else {
                let diff = f64::from(next.value) - f64::from(prev.value);
                let span = span as f64;

                if position > prev.timestamp {
                    let offset = (position - prev.timestamp) as f64;
                    (f64::from(prev.value) + offset / span * diff) as f32
                } else {
                    let offset = (prev.timestamp - position) as f64;
                    (f64::from(prev.value) - offset / span * diff) as f32
                }
            }
        }
    };

    Some(if absolute { value } else { value.clamp(0.0, 1.0) })
}

/// Ordered control points for one animatable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTrack {
    /// Name of the animated parameter
    pub property_name: String,
    /// Interpolation mode between points
    pub mode: InterpolationMode,
    /// Whether values are absolute (otherwise normalized to `[0, 1]`)
    pub absolute: bool,
    points: Vec<ControlPoint>,
}

impl KeyframeTrack {
    /// Create an empty, linear, normalized track
    pub fn new(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            mode: InterpolationMode::Linear,
            absolute: false,
            points: Vec::new(),
        }
    }

    /// Set the interpolation mode
    pub fn with_mode(mut self, mode: InterpolationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark the track as carrying absolute values
    pub fn with_absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }

    /// Add points, replacing any existing point at the same timestamp
    pub fn with_points<P: Into<ControlPoint>>(mut self, points: impl IntoIterator<Item = P>) -> Self {
        for point in points {
            let point = point.into();
            self.set(point.timestamp, point.value);
        }
        self
    }

    /// An empty track with the same name, mode and scaling
    pub fn empty_like(&self) -> Self {
        Self {
            property_name: self.property_name.clone(),
            mode: self.mode,
            absolute: self.absolute,
            points: Vec::new(),
        }
    }

    /// All points, sorted by timestamp
    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the track has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at an exact timestamp
    pub fn point_at(&self, timestamp: ClockTime) -> Option<ControlPoint> {
        self.points
            .binary_search_by_key(&timestamp, |p| p.timestamp)
            .ok()
            .map(|idx| self.points[idx])
    }

    /// Insert or replace the point at `timestamp`
    pub fn set(&mut self, timestamp: ClockTime, value: f32) {
        match self.points.binary_search_by_key(&timestamp, |p| p.timestamp) {
            Ok(idx) => self.points[idx].value = value,
            Err(idx) => self.points.insert(idx, ControlPoint::new(timestamp, value)),
        }
    }

    /// Remove the point at `timestamp`. Returns whether one existed.
    pub fn unset(&mut self, timestamp: ClockTime) -> bool {
        match self.points.binary_search_by_key(&timestamp, |p| p.timestamp) {
            Ok(idx) => {
                self.points.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// Remove every point
    pub fn unset_all(&mut self) {
        self.points.clear();
    }

    /// Evaluate the curve at `position` using the interpolation mode
    pub fn value_at(&self, position: ClockTime) -> Option<f32> {
        let first = self.points.first()?;
        let next_idx = self.points.partition_point(|p| p.timestamp <= position);

        let value = match next_idx {
            0 => f64::from(first.value),
            idx if idx == self.points.len() => f64::from(self.points[idx - 1].value),
            idx => {
                let a = self.points[idx - 1];
                let b = self.points[idx];
                let t = (position - a.timestamp) as f64 / (b.timestamp - a.timestamp) as f64;

                match self.mode {
                    InterpolationMode::None => f64::from(a.value),
                    InterpolationMode::Linear => {
                        Interpolation::lerp(f64::from(a.value), f64::from(b.value), t)
                    }
                    InterpolationMode::Cubic => {
                        let span = (b.timestamp - a.timestamp) as f64;
                        let m0 = self.tangent(idx - 1) * span;
                        let m1 = self.tangent(idx) * span;
                        Interpolation::hermite(f64::from(a.value), m0, f64::from(b.value), m1, t)
                    }
                }
            }
        };

        let value = value as f32;
        Some(if self.absolute { value } else { value.clamp(0.0, 1.0) })
    }

    /// Catmull-Rom slope (value per nanosecond) at point `idx`
    fn tangent(&self, idx: usize) -> f64 {
        let prev = self.points[idx.saturating_sub(1)];
        let next = self.points[(idx + 1).min(self.points.len() - 1)];
        if next.timestamp == prev.timestamp {
            return 0.0;
        }
        (f64::from(next.value) - f64::from(prev.value)) / (next.timestamp - prev.timestamp) as f64
    }

    /// Re-anchor the track on `[inpoint, inpoint + duration]`.
    ///
    /// `duration == None` means unbounded: only the left boundary is
    /// re-anchored. A zero duration clears the track.
    pub fn resync_to_interval(&mut self, inpoint: ClockTime, duration: Option<ClockTime>) {
        if duration == Some(0) {
            self.unset_all();
            return;
        }
        if self.points.is_empty() {
            return;
        }

        // Left boundary: the line from the earliest point to the first point
        // past the new inpoint, or to the last point when none lies past it
        let first = self.points[0];
        let next = self.points[1..]
            .iter()
            .find(|p| p.timestamp > inpoint)
            .or_else(|| self.points[1..].last())
            .copied();
        if let Some(value) = interpolate_at(Some(first), next, inpoint, self.absolute) {
            self.unset(first.timestamp);
            self.set(inpoint, value);
        }

        // Right boundary: the line from the nearest point before the new end
        // to the last point
        if let Some(duration) = duration {
            let end = inpoint.saturating_add(duration);
            let last = self.points[self.points.len() - 1];

            if last.timestamp == inpoint {
                // Only the left anchor is left; hold its value
                self.set(end, last.value);
            } else {
                let prev = self.points[..self.points.len() - 1]
                    .iter()
                    .rev()
                    .find(|p| p.timestamp < end)
                    .copied();
                if let Some(value) = interpolate_at(prev, Some(last), end, self.absolute) {
                    self.unset(last.timestamp);
                    self.set(end, value);
                }
            }
        }

        // Prune
        self.points.retain(|p| {
            p.timestamp >= inpoint
                && duration.map_or(true, |duration| p.timestamp <= inpoint.saturating_add(duration))
        });
    }

    /// Split the track at `position`.
    ///
    /// The value at `position` becomes the right boundary of `self` and the
    /// left boundary of `target`; every point after `position` moves to
    /// `target`. Points at or before `position` stay in `self`.
    pub fn split_at(&mut self, position: ClockTime, target: &mut KeyframeTrack) {
        let split_idx = self.points.partition_point(|p| p.timestamp <= position);
        if split_idx == self.points.len() {
            return;
        }

        let previous = split_idx.checked_sub(1).map(|idx| self.points[idx]);
        let first_after = self.points[split_idx];
        let moved = self.points.split_off(split_idx);

        if let Some(value) = interpolate_at(previous, Some(first_after), position, self.absolute) {
            target.set(position, value);
            self.set(position, value);
        }
        for point in moved {
            target.set(point.timestamp, point.value);
        }
    }

    /// Split the track at `position`, returning the part after it
    pub fn split_off(&mut self, position: ClockTime) -> KeyframeTrack {
        let mut target = self.empty_like();
        self.split_at(position, &mut target);
        target
    }

    /// Copy every point verbatim into `target`
    pub fn copy_all(&self, target: &mut KeyframeTrack) {
        target.mode = self.mode;
        for point in &self.points {
            target.set(point.timestamp, point.value);
        }
    }
}
