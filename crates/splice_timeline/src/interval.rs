// SPDX-License-Identifier: MIT OR Apache-2.0
//! Time intervals of timeline elements.
//!
//! All times are expressed in nanoseconds. An [`Interval`] carries the
//! position of an element on the timeline (`start`), the offset into its
//! media (`inpoint`), its length (`duration`) and its stacking `priority`.

use serde::{Deserialize, Serialize};

/// Time in nanoseconds
pub type ClockTime = u64;

/// One second in [`ClockTime`] units
pub const SECOND: ClockTime = 1_000_000_000;

/// One millisecond in [`ClockTime`] units
pub const MSECOND: ClockTime = 1_000_000;

/// Reserved priority floor; lower values are forced up to it
pub const MIN_PRIORITY: u32 = 1;

/// Priority span reserved for a single layer
pub const LAYER_HEIGHT: u32 = 1000;

/// Position, media offset, length and priority of a timeline element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: ClockTime,
    inpoint: ClockTime,
    duration: ClockTime,
    priority: u32,
    max_duration: Option<ClockTime>,
}

impl Interval {
    /// Create an interval at the priority floor with no media ceiling
    pub fn new(start: ClockTime, inpoint: ClockTime, duration: ClockTime) -> Self {
        Self {
            start,
            inpoint,
            duration,
            priority: MIN_PRIORITY,
            max_duration: None,
        }
    }

    /// Set the intrinsic media length, clamping the current duration to it
    pub fn with_max_duration(mut self, max_duration: ClockTime) -> Self {
        self.set_max_duration(Some(max_duration));
        self
    }

    /// Timeline position
    pub fn start(&self) -> ClockTime {
        self.start
    }

    /// Offset into the media
    pub fn inpoint(&self) -> ClockTime {
        self.inpoint
    }

    /// Length on the timeline
    pub fn duration(&self) -> ClockTime {
        self.duration
    }

    /// Stacking priority (lower is higher up)
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Intrinsic media length, if known
    pub fn max_duration(&self) -> Option<ClockTime> {
        self.max_duration
    }

    /// Timeline position of the end edge
    pub fn end(&self) -> ClockTime {
        self.start.saturating_add(self.duration)
    }

    /// Media position of the end edge
    pub fn media_end(&self) -> ClockTime {
        self.inpoint.saturating_add(self.duration)
    }

    /// Whether a timeline position falls inside `[start, end)`
    pub fn contains(&self, position: ClockTime) -> bool {
        position >= self.start && position < self.end()
    }

    /// Map a timeline position to the element's media time
    pub fn to_media_time(&self, position: ClockTime) -> ClockTime {
        self.inpoint
            .saturating_add(position.saturating_sub(self.start))
    }

    /// Set the timeline position. Returns `true` if the value changed.
    pub fn set_start(&mut self, start: ClockTime) -> bool {
        if start == self.start {
            return false;
        }
        self.start = start;
        true
    }

    /// Set the media offset. Returns `true` if the value changed.
    pub fn set_inpoint(&mut self, inpoint: ClockTime) -> bool {
        if inpoint == self.inpoint {
            return false;
        }
        self.inpoint = inpoint;
        true
    }

    /// Set the length, clamped so that `inpoint + duration` never exceeds
    /// the media ceiling. Returns `true` if the value changed.
    pub fn set_duration(&mut self, duration: ClockTime) -> bool {
        let duration = self.clamp_duration(duration);
        if duration == self.duration {
            return false;
        }
        self.duration = duration;
        true
    }

    /// Set the priority, forcing values below [`MIN_PRIORITY`] up to it.
    /// Returns `true` if the value changed.
    pub fn set_priority(&mut self, priority: u32) -> bool {
        let priority = if priority < MIN_PRIORITY {
            tracing::info!(priority, floor = MIN_PRIORITY, "priority below floor, clamping");
            MIN_PRIORITY
        } else {
            priority
        };

        if priority == self.priority {
            return false;
        }
        self.priority = priority;
        true
    }

    /// Set or clear the media ceiling. The duration is re-clamped.
    pub fn set_max_duration(&mut self, max_duration: Option<ClockTime>) -> bool {
        if max_duration == self.max_duration {
            return false;
        }
        self.max_duration = max_duration;
        self.duration = self.clamp_duration(self.duration);
        true
    }

    /// Largest duration the media ceiling allows at the current inpoint
    pub fn clamp_duration(&self, duration: ClockTime) -> ClockTime {
        match self.max_duration {
            Some(max) if self.inpoint.saturating_add(duration) > max => {
                max.saturating_sub(self.inpoint)
            }
            _ => duration,
        }
    }

    /// Index of the layer an absolute priority belongs to
    pub fn layer_priority(&self) -> u32 {
        if self.priority < LAYER_HEIGHT + MIN_PRIORITY {
            return 0;
        }
        (self.priority - MIN_PRIORITY) / LAYER_HEIGHT
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::new(0, 0, SECOND)
    }
}
