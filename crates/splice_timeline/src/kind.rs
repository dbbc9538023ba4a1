// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concrete kinds of track elements.
//!
//! A kind decides which backing object the engine builds, which of its
//! parameters are exposed as child parameters, and which layer metadata
//! and track restrictions the element follows.

use crate::backing::ParameterSpec;
use crate::track::TrackType;
use serde::{Deserialize, Serialize};

/// Layer metadata key for the default volume
pub const META_VOLUME: &str = "volume";

/// Selects which introspected parameters become child parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterFilter {
    /// Owner categories to keep; `None` keeps every category
    pub categories: Option<Vec<String>>,
    /// Owners whose parameters are never exposed
    pub denied_owners: Vec<String>,
    /// Parameter names to keep; `None` keeps every writable parameter
    pub allowed_names: Option<Vec<String>>,
}

impl ParameterFilter {
    /// Keep every writable parameter
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only the listed parameter names
    pub fn names(names: &[&str]) -> Self {
        Self {
            allowed_names: Some(names.iter().map(|n| n.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Keep only owners in one of the listed categories
    pub fn categories(categories: &[&str]) -> Self {
        Self {
            categories: Some(categories.iter().map(|c| c.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Never expose parameters of these owners
    pub fn deny_owners(mut self, owners: &[&str]) -> Self {
        self.denied_owners = owners.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Whether `spec` becomes a child parameter
    pub fn accepts(&self, spec: &ParameterSpec) -> bool {
        if self.denied_owners.iter().any(|o| *o == spec.owner) {
            return false;
        }
        if let Some(categories) = &self.categories {
            if !spec.category.split('/').any(|c| categories.iter().any(|w| w == c)) {
                return false;
            }
        }
        if !spec.writable {
            if self.allowed_names.as_ref().is_some_and(|names| names.contains(&spec.name)) {
                tracing::warn!(
                    owner = %spec.owner,
                    name = %spec.name,
                    "parameter exists but is not writable"
                );
            }
            return false;
        }
        self.allowed_names
            .as_ref()
            .map_or(true, |names| names.contains(&spec.name))
    }
}

/// What a track element does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Generated test tone
    AudioTestSource {
        /// Tone frequency in Hz
        freq: f64,
        /// Tone volume
        volume: f64,
    },
    /// Audio from a media file
    AudioSource {
        /// Media location
        uri: String,
    },
    /// Generated test picture
    VideoTestSource {
        /// Pattern index
        pattern: i64,
    },
    /// Video from a media file
    VideoSource {
        /// Media location
        uri: String,
    },
    /// Effect applied to the layers below
    Effect {
        /// Engine description of the effect
        description: String,
        /// Media type the effect works on
        track_type: TrackType,
    },
    /// Transition between two overlapping sources
    Transition {
        /// Transition name
        transition: String,
        /// Media type the transition works on
        track_type: TrackType,
    },
}

impl ElementKind {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::AudioTestSource { .. } => "AudioTestSource",
            Self::AudioSource { .. } => "AudioSource",
            Self::VideoTestSource { .. } => "VideoTestSource",
            Self::VideoSource { .. } => "VideoSource",
            Self::Effect { .. } => "Effect",
            Self::Transition { .. } => "Transition",
        }
    }

    /// Container type the engine wraps the element in
    pub fn backing_kind(&self) -> &'static str {
        if self.is_operation() {
            "operation"
        } else {
            "source"
        }
    }

    /// Whether the element consumes as well as produces data
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Effect { .. } | Self::Transition { .. })
    }

    /// Media type of the element
    pub fn track_type(&self) -> TrackType {
        match self {
            Self::AudioTestSource { .. } | Self::AudioSource { .. } => TrackType::Audio,
            Self::VideoTestSource { .. } | Self::VideoSource { .. } => TrackType::Video,
            Self::Effect { track_type, .. } | Self::Transition { track_type, .. } => *track_type,
        }
    }

    /// Which introspected parameters are exposed
    pub fn parameter_filter(&self) -> ParameterFilter {
        match self {
            Self::AudioTestSource { .. } => ParameterFilter::names(&["volume", "freq", "mute"]),
            Self::AudioSource { .. } => ParameterFilter::names(&["volume", "mute"]),
            Self::VideoTestSource { .. } => {
                ParameterFilter::names(&["pattern", "alpha", "posx", "posy"])
            }
            Self::VideoSource { .. } => ParameterFilter::names(&["alpha", "posx", "posy"]),
            Self::Effect { .. } => ParameterFilter::categories(&["Effect"]),
            Self::Transition { .. } => ParameterFilter::all().deny_owners(&["capsfilter"]),
        }
    }

    /// Pairs of (layer metadata key, qualified child parameter) the element
    /// follows unless the parameter was explicitly set
    pub fn layer_defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::AudioTestSource { .. } | Self::AudioSource { .. } => {
                &[(META_VOLUME, "volume::volume")]
            }
            _ => &[],
        }
    }

    /// Whether the element follows its track's restriction
    pub fn follows_restriction(&self) -> bool {
        matches!(self, Self::AudioTestSource { .. } | Self::AudioSource { .. })
    }
}
