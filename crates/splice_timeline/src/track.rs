// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tracks: single media-type lanes of a timeline.

use crate::element::ElementId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Create a new random track ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Media type carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    /// Audio samples
    Audio,
    /// Video frames
    Video,
    /// Anything else
    Unknown,
}

impl TrackType {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Video => "Video",
            Self::Unknown => "Unknown",
        }
    }
}

/// A media lane holding track elements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: TrackId,
    /// Track name
    pub name: String,
    /// Track type
    pub track_type: TrackType,
    restriction: Option<String>,
    elements: IndexSet<ElementId>,
}

impl Track {
    /// Create a new track
    pub fn new(name: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            track_type,
            restriction: None,
            elements: IndexSet::new(),
        }
    }

    /// Set the initial restriction
    pub fn with_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.restriction = Some(restriction.into());
        self
    }

    /// Format constraints the track imposes on its elements
    pub fn restriction(&self) -> Option<&str> {
        self.restriction.as_deref()
    }

    /// Elements currently in the track, in insertion order
    pub fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.iter().copied()
    }

    /// Whether the element is in the track
    pub fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    /// Number of elements in the track
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the track holds no element
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn set_restriction(&mut self, restriction: Option<String>) -> bool {
        if restriction == self.restriction {
            return false;
        }
        self.restriction = restriction;
        true
    }

    pub(crate) fn insert(&mut self, element: ElementId) -> bool {
        self.elements.insert(element)
    }

    pub(crate) fn remove(&mut self, element: ElementId) -> bool {
        self.elements.shift_remove(&element)
    }
}
