// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layers: priority-ordered collections of clips with default metadata.

use crate::backing::ParamValue;
use crate::clip::ClipId;
use crate::interval::{ClockTime, LAYER_HEIGHT, MIN_PRIORITY};
use crate::kind::META_VOLUME;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub Uuid);

impl LayerId {
    /// Create a new random layer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LayerEntry {
    clip: ClipId,
    start: ClockTime,
    seq: u64,
}

/// A layer of the timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Unique layer ID
    pub id: LayerId,
    /// Layer name
    pub name: String,
    priority: u32,
    clips: Vec<LayerEntry>,
    next_seq: u64,
    metadata: IndexMap<String, ParamValue>,
}

impl Layer {
    /// Create an empty layer
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            priority,
            clips: Vec::new(),
            next_seq: 0,
            metadata: IndexMap::new(),
        }
    }

    /// Set the default volume of the layer
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.set_volume(volume);
        self
    }

    /// Layer priority; 0 is the top layer
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Priority of the first element slot of this layer
    pub fn base_priority(&self) -> u32 {
        self.priority
            .saturating_mul(LAYER_HEIGHT)
            .saturating_add(MIN_PRIORITY)
    }

    /// Clips in the layer, by start then insertion order
    pub fn clips(&self) -> impl Iterator<Item = ClipId> + '_ {
        self.clips.iter().map(|entry| entry.clip)
    }

    /// Whether the clip is in the layer
    pub fn contains(&self, clip: ClipId) -> bool {
        self.clips.iter().any(|entry| entry.clip == clip)
    }

    /// Number of clips in the layer
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether the layer holds no clip
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Metadata value
    pub fn meta(&self, key: &str) -> Option<&ParamValue> {
        self.metadata.get(key)
    }

    /// Set a metadata value, returning the previous one
    pub fn set_meta(&mut self, key: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.metadata.insert(key.into(), value)
    }

    /// Default value for elements that did not override the parameter
    /// following `key`
    pub fn resolve_default(&self, key: &str) -> Option<&ParamValue> {
        self.meta(key)
    }

    /// Default volume
    pub fn volume(&self) -> Option<f64> {
        self.meta(META_VOLUME).and_then(ParamValue::as_f64)
    }

    /// Set the default volume
    pub fn set_volume(&mut self, volume: f64) {
        self.set_meta(META_VOLUME, ParamValue::Double(volume));
    }

    pub(crate) fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    pub(crate) fn insert_clip(&mut self, clip: ClipId, start: ClockTime) {
        if self.contains(clip) {
            self.update_start(clip, start);
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.clips.push(LayerEntry { clip, start, seq });
        self.sort();
    }

    pub(crate) fn remove_clip(&mut self, clip: ClipId) -> bool {
        let before = self.clips.len();
        self.clips.retain(|entry| entry.clip != clip);
        self.clips.len() != before
    }

    pub(crate) fn update_start(&mut self, clip: ClipId, start: ClockTime) {
        if let Some(entry) = self.clips.iter_mut().find(|entry| entry.clip == clip) {
            entry.start = start;
            self.sort();
        }
    }

    fn sort(&mut self) {
        self.clips.sort_by_key(|entry| (entry.start, entry.seq));
    }
}
