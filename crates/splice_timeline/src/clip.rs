// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clips: groups of track elements sharing one interval.
//!
//! A clip spans one track per child element. Its interval is authoritative:
//! the timeline copies it onto every child after each edit. The helpers at
//! the bottom of the module carry child parameters and automation over
//! when a clip is duplicated or split.

use crate::element::{ElementId, ElementState, Result, TrackElement};
use crate::interval::{ClockTime, Interval};
use crate::layer::LayerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    /// Create a new random clip ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A composite of same-interval track elements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    /// Unique clip ID
    pub id: ClipId,
    /// Clip name
    pub name: String,
    /// Whether edits may change the clip
    pub pinned: bool,
    interval: Interval,
    /// Priority inside the layer
    priority: u32,
    layer: Option<LayerId>,
    elements: Vec<ElementId>,
}

impl Clip {
    /// Create a clip outside any layer
    pub fn new(name: impl Into<String>, interval: Interval) -> Self {
        Self {
            id: ClipId::new(),
            name: name.into(),
            pinned: false,
            interval,
            priority: 0,
            layer: None,
            elements: Vec::new(),
        }
    }

    /// Shared interval
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Timeline position
    pub fn start(&self) -> ClockTime {
        self.interval.start()
    }

    /// Timeline position of the end edge
    pub fn end(&self) -> ClockTime {
        self.interval.end()
    }

    /// Priority relative to the layer base
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Containing layer
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// Child elements, one per spanned track
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    /// Absolute priority of the children in a layer based at `base`
    pub fn element_priority(&self, base: u32) -> u32 {
        base.saturating_add(self.priority)
    }

    pub(crate) fn set_interval(&mut self, interval: Interval) {
        self.interval = interval;
    }

    pub(crate) fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    pub(crate) fn set_layer(&mut self, layer: Option<LayerId>) {
        self.layer = layer;
    }

    pub(crate) fn push_element(&mut self, element: ElementId) {
        self.elements.push(element);
    }
}

/// Clip state as stored in history snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipState {
    /// Clip
    pub clip: ClipId,
    /// Layer at snapshot time
    pub layer: Option<LayerId>,
    /// Interval at snapshot time
    pub interval: Interval,
    /// Children at snapshot time
    pub elements: Vec<ElementState>,
}

/// Copy every writable child parameter of `source` onto `dest`.
///
/// Values the source overrode stay overrides on the destination; the rest
/// keep following layer defaults. Parameters `dest` does not expose are
/// skipped. Returns the number of parameters copied.
pub fn copy_child_parameters(source: &TrackElement, dest: &mut TrackElement) -> Result<usize> {
    let mut copied = 0;
    for spec in source.child_parameters().iter().filter(|spec| spec.writable) {
        let key = spec.qualified_name();
        let Ok(target) = dest.lookup_child(&key) else {
            tracing::debug!(element = %dest.id(), property = %key, "not exposed, skipping");
            continue;
        };
        let target = target.qualified_name();
        let value = source.get_child_parameter(&key)?;
        dest.write_child(target, value, source.is_overridden(&key))?;
        copied += 1;
    }
    Ok(copied)
}

/// Bind the part after `media_position` of every binding of `element` on
/// the same parameters of `sibling`.
///
/// `element` is not modified; once every child of a split succeeded, the
/// head is cut with [`truncate_bindings`].
pub fn split_bindings(
    element: &TrackElement,
    sibling: &mut TrackElement,
    media_position: ClockTime,
) -> Result<usize> {
    let mut count = 0;
    for binding in element.control_bindings() {
        let tail = binding.clone().split_off(media_position);
        sibling.bind_control_track(&tail.property, tail.track, tail.kind)?;
        count += 1;
    }
    Ok(count)
}

/// Cut every binding of `element` at `media_position`, keeping the head
pub(crate) fn truncate_bindings(element: &mut TrackElement, media_position: ClockTime) {
    for binding in element.control_bindings_mut() {
        binding.split_off(media_position);
    }
}

/// Bind verbatim copies of every binding of `source` on `dest`
pub fn copy_bindings(source: &TrackElement, dest: &mut TrackElement) -> Result<usize> {
    let mut count = 0;
    for binding in source.control_bindings() {
        let copy = binding.duplicate();
        dest.bind_control_track(&copy.property, copy.track, copy.kind)?;
        count += 1;
    }
    Ok(count)
}
