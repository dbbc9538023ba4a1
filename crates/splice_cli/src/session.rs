// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session scripts.
//!
//! A session is a RON document describing tracks, layers and clips, followed
//! by a list of commands. The runner builds the timeline against the
//! in-memory backing engine, replays the commands in order and reports the
//! resulting document. A failing command is reported and the replay goes on;
//! a failure while building the initial document aborts the run.

use serde::{Deserialize, Serialize};
use splice_timeline::{
    BindingKind, ClipId, ClockTime, Edge, EditMode, ElementId, ElementKind,
    HistoryStats, Interval, InterpolationMode, KeyframeTrack, LayerId, ParamValue,
    SimulatedFactory, Timeline, TimelineConfig, TimelineError, Track, TrackElement, TrackId,
    TrackType,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The script could not be read
    #[error("Failed to read session: {0}")]
    Io(#[from] std::io::Error),

    /// The script is not valid RON
    #[error("Failed to parse session: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// No layer with that name
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// No track with that name
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    /// No clip with that name
    #[error("Unknown clip: {0}")]
    UnknownClip(String),

    /// The clip has no element on a track of that type
    #[error("Clip {clip} has no {track_type} element")]
    NoElement {
        /// Clip name
        clip: String,
        /// Requested media type
        track_type: &'static str,
    },

    /// Timeline operation failed
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// The report could not be serialized
    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// A track to create
#[derive(Debug, Clone, Deserialize)]
pub struct TrackSpec {
    /// Name used by commands
    pub name: String,
    /// Media type
    pub kind: TrackType,
    /// Initial format restriction
    #[serde(default)]
    pub restriction: Option<String>,
}

/// A layer to create, top first
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    /// Name used by commands
    pub name: String,
    /// Default volume; the configured default when absent
    #[serde(default)]
    pub volume: Option<f64>,
}

/// A clip to create
#[derive(Debug, Clone, Deserialize)]
pub struct ClipSpec {
    /// Name used by commands
    pub name: String,
    /// Layer name
    pub layer: String,
    /// Timeline position
    pub start: ClockTime,
    /// Media offset
    #[serde(default)]
    pub inpoint: ClockTime,
    /// Length
    pub duration: ClockTime,
    /// Media length
    #[serde(default)]
    pub max_duration: Option<ClockTime>,
    /// Lock against edits
    #[serde(default)]
    pub pinned: bool,
    /// One element per track
    pub elements: Vec<ElementKind>,
}

/// One step of a session
#[derive(Debug, Clone, Deserialize)]
pub enum Command {
    /// Edit a clip
    Edit {
        /// Clip name
        clip: String,
        /// Edit mode
        mode: EditMode,
        /// Edited edge
        #[serde(default)]
        edge: Edge,
        /// Target position
        position: ClockTime,
        /// Candidate layer names; empty means all
        #[serde(default)]
        layers: Vec<String>,
    },
    /// Split a clip; the tail is registered under `name`
    Split {
        /// Clip name
        clip: String,
        /// Timeline position
        position: ClockTime,
        /// Name of the tail clip
        name: String,
    },
    /// Duplicate a clip
    Copy {
        /// Clip name
        clip: String,
        /// Target layer name
        layer: String,
        /// Position of the copy
        start: ClockTime,
        /// Name of the copy
        name: String,
    },
    /// Bind a keyframe track to a child parameter
    Keyframes {
        /// Clip name
        clip: String,
        /// Track type of the element
        track: TrackType,
        /// Child parameter
        property: String,
        /// Value mapping
        #[serde(default)]
        binding: BindingKind,
        /// Interpolation
        #[serde(default)]
        mode: InterpolationMode,
        /// `(timestamp, value)` pairs in media time
        points: Vec<(ClockTime, f32)>,
    },
    /// Write a child parameter
    SetChild {
        /// Clip name
        clip: String,
        /// Track type of the element
        track: TrackType,
        /// Child parameter
        property: String,
        /// New value
        value: ParamValue,
    },
    /// Change a layer's default volume
    SetLayerVolume {
        /// Layer name
        layer: String,
        /// New volume
        volume: f64,
    },
    /// Change a track's restriction
    Restrict {
        /// Track name
        track: String,
        /// New restriction
        restriction: Option<String>,
    },
    /// Lock or unlock a clip
    Pin {
        /// Clip name
        clip: String,
        /// Lock state
        pinned: bool,
    },
    /// Push keyframe values at a position
    Sample {
        /// Timeline position
        position: ClockTime,
    },
    /// Revert the last edit
    Undo,
    /// Re-apply the last reverted edit
    Redo,
}

impl Command {
    fn label(&self) -> String {
        match self {
            Self::Edit {
                clip,
                mode,
                edge,
                position,
                ..
            } => format!("edit {clip} {mode} {edge:?} @{position}"),
            Self::Split { clip, position, .. } => format!("split {clip} @{position}"),
            Self::Copy { clip, layer, start, .. } => format!("copy {clip} -> {layer} @{start}"),
            Self::Keyframes { clip, property, .. } => format!("keyframes {clip} {property}"),
            Self::SetChild { clip, property, value, .. } => format!("set {clip} {property}={value}"),
            Self::SetLayerVolume { layer, volume } => format!("volume {layer}={volume}"),
            Self::Restrict { track, .. } => format!("restrict {track}"),
            Self::Pin { clip, pinned } => format!("pin {clip}={pinned}"),
            Self::Sample { position } => format!("sample @{position}"),
            Self::Undo => "undo".to_string(),
            Self::Redo => "redo".to_string(),
        }
    }
}

/// A session script
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Timeline settings
    pub config: TimelineConfig,
    /// Tracks
    pub tracks: Vec<TrackSpec>,
    /// Layers, top first
    pub layers: Vec<LayerSpec>,
    /// Initial clips
    pub clips: Vec<ClipSpec>,
    /// Commands to replay
    pub commands: Vec<Command>,
}

impl Session {
    /// Parse a RON session
    pub fn from_ron_str(source: &str) -> Result<Self> {
        Ok(ron::from_str(source)?)
    }

    /// Load a RON session file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    /// Build the timeline and replay every command
    pub fn run(&self) -> Result<Report> {
        let mut runner = Runner::build(self)?;
        let mut outcomes = Vec::with_capacity(self.commands.len());

        for command in &self.commands {
            let label = command.label();
            match runner.apply(command) {
                Ok(()) => {
                    tracing::info!(command = %label, "applied");
                    outcomes.push(Outcome {
                        command: label,
                        ok: true,
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::warn!(command = %label, %error, "command failed");
                    outcomes.push(Outcome {
                        command: label,
                        ok: false,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        Ok(runner.report(outcomes))
    }
}

/// Result of one command
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Command summary
    pub command: String,
    /// Whether it succeeded
    pub ok: bool,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Keyframes of one binding
#[derive(Debug, Clone, Serialize)]
pub struct BindingReport {
    /// Qualified parameter name
    pub property: String,
    /// Value mapping
    pub kind: BindingKind,
    /// `(timestamp, value)` pairs
    pub points: Vec<(ClockTime, f32)>,
}

/// One track element
#[derive(Debug, Clone, Serialize)]
pub struct ElementReport {
    /// Element kind
    pub kind: &'static str,
    /// Track name, if attached
    pub track: Option<String>,
    /// Absolute priority
    pub priority: u32,
    /// Whether the element takes part in processing
    pub active: bool,
    /// Keyframe bindings
    pub bindings: Vec<BindingReport>,
}

/// One clip
#[derive(Debug, Clone, Serialize)]
pub struct ClipReport {
    /// Session name
    pub name: String,
    /// Timeline position
    pub start: ClockTime,
    /// Media offset
    pub inpoint: ClockTime,
    /// Length
    pub duration: ClockTime,
    /// Locked against edits
    pub pinned: bool,
    /// Children
    pub elements: Vec<ElementReport>,
}

/// One layer with its clips in start order
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    /// Layer name
    pub name: String,
    /// Layer priority
    pub priority: u32,
    /// Default volume
    pub volume: Option<f64>,
    /// Clips
    pub clips: Vec<ClipReport>,
}

/// Final state of a session
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Command results, in order
    pub outcomes: Vec<Outcome>,
    /// Document
    pub layers: Vec<LayerReport>,
    /// Undo state
    pub history: HistoryStats,
}

impl Report {
    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of failed commands
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.ok).count()
    }
}

struct Runner {
    timeline: Timeline,
    tracks: HashMap<String, TrackId>,
    layers: HashMap<String, LayerId>,
    clips: HashMap<String, ClipId>,
}

impl Runner {
    fn build(session: &Session) -> Result<Self> {
        let factory = Arc::new(SimulatedFactory::new());
        let mut runner = Self {
            timeline: Timeline::with_config(session.config.clone(), factory),
            tracks: HashMap::new(),
            layers: HashMap::new(),
            clips: HashMap::new(),
        };

        for spec in &session.tracks {
            let mut track = Track::new(spec.name.clone(), spec.kind);
            if let Some(restriction) = &spec.restriction {
                track = track.with_restriction(restriction.clone());
            }
            let id = runner.timeline.add_track(track);
            runner.tracks.insert(spec.name.clone(), id);
        }

        for spec in &session.layers {
            let id = runner.timeline.add_layer(spec.name.clone());
            if let Some(volume) = spec.volume {
                runner.timeline.set_layer_volume(id, volume)?;
            }
            runner.layers.insert(spec.name.clone(), id);
        }

        for spec in &session.clips {
            let layer = runner.layer(&spec.layer)?;
            let mut interval = Interval::new(spec.start, spec.inpoint, spec.duration);
            if let Some(max) = spec.max_duration {
                interval = interval.with_max_duration(max);
            }
            let id = runner
                .timeline
                .add_clip(layer, spec.name.clone(), interval, spec.elements.clone())?;
            if spec.pinned {
                runner.timeline.set_clip_pinned(id, true)?;
            }
            runner.clips.insert(spec.name.clone(), id);
        }

        tracing::debug!(
            tracks = runner.tracks.len(),
            layers = runner.layers.len(),
            clips = runner.clips.len(),
            "session built"
        );
        Ok(runner)
    }

    fn layer(&self, name: &str) -> Result<LayerId> {
        self.layers
            .get(name)
            .copied()
            .ok_or_else(|| SessionError::UnknownLayer(name.to_string()))
    }

    fn clip(&self, name: &str) -> Result<ClipId> {
        self.clips
            .get(name)
            .copied()
            .ok_or_else(|| SessionError::UnknownClip(name.to_string()))
    }

    fn element(&self, clip: &str, track_type: TrackType) -> Result<ElementId> {
        self.timeline
            .clip_elements(self.clip(clip)?)
            .into_iter()
            .find(|element| element.track_type() == track_type)
            .map(TrackElement::id)
            .ok_or(SessionError::NoElement {
                clip: clip.to_string(),
                track_type: track_type.name(),
            })
    }

    fn apply(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Edit {
                clip,
                mode,
                edge,
                position,
                layers,
            } => {
                let clip = self.clip(clip)?;
                let layers = layers
                    .iter()
                    .map(|name| self.layer(name))
                    .collect::<Result<Vec<_>>>()?;
                self.timeline.edit_clip(clip, *mode, *edge, &layers, *position)?;
            }
            Command::Split { clip, position, name } => {
                let tail = self.timeline.split_clip(self.clip(clip)?, *position)?;
                self.clips.insert(name.clone(), tail);
            }
            Command::Copy {
                clip,
                layer,
                start,
                name,
            } => {
                let copy = self
                    .timeline
                    .copy_clip(self.clip(clip)?, self.layer(layer)?, *start)?;
                self.clips.insert(name.clone(), copy);
            }
            Command::Keyframes {
                clip,
                track,
                property,
                binding,
                mode,
                points,
            } => {
                let id = self.element(clip, *track)?;
                let keyframes = KeyframeTrack::new(property.clone())
                    .with_mode(*mode)
                    .with_points(points.iter().copied());
                self.timeline.bind_control_track(id, property, keyframes, *binding)?;
            }
            Command::SetChild {
                clip,
                track,
                property,
                value,
            } => {
                let id = self.element(clip, *track)?;
                self.timeline.set_child_parameter(id, property, value.clone())?;
            }
            Command::SetLayerVolume { layer, volume } => {
                self.timeline.set_layer_volume(self.layer(layer)?, *volume)?;
            }
            Command::Restrict { track, restriction } => {
                let id = self
                    .tracks
                    .get(track)
                    .copied()
                    .ok_or_else(|| SessionError::UnknownTrack(track.clone()))?;
                self.timeline.set_track_restriction(id, restriction.clone())?;
            }
            Command::Pin { clip, pinned } => {
                self.timeline.set_clip_pinned(self.clip(clip)?, *pinned)?;
            }
            Command::Sample { position } => {
                let written = self.timeline.sync_controlled_parameters(*position)?;
                tracing::debug!(position, written, "sampled");
            }
            Command::Undo => self.timeline.undo()?,
            Command::Redo => self.timeline.redo()?,
        }
        Ok(())
    }

    fn report(&self, outcomes: Vec<Outcome>) -> Report {
        let names: HashMap<ClipId, &str> = self
            .clips
            .iter()
            .map(|(name, id)| (*id, name.as_str()))
            .collect();

        let layers = self
            .timeline
            .layers()
            .iter()
            .map(|layer| LayerReport {
                name: layer.name.clone(),
                priority: layer.priority(),
                volume: layer.volume(),
                clips: layer
                    .clips()
                    .filter_map(|id| self.timeline.clip(id))
                    .map(|clip| ClipReport {
                        name: names
                            .get(&clip.id)
                            .map_or_else(|| clip.name.clone(), |name| (*name).to_string()),
                        start: clip.start(),
                        inpoint: clip.interval().inpoint(),
                        duration: clip.interval().duration(),
                        pinned: clip.pinned,
                        elements: self
                            .timeline
                            .clip_elements(clip.id)
                            .into_iter()
                            .map(|element| ElementReport {
                                kind: element.kind().name(),
                                track: element
                                    .track()
                                    .and_then(|track| self.timeline.track(track))
                                    .map(|track| track.name.clone()),
                                priority: element.interval().priority(),
                                active: element.is_active(),
                                bindings: element
                                    .control_bindings()
                                    .map(|binding| BindingReport {
                                        property: binding.property.clone(),
                                        kind: binding.kind,
                                        points: binding
                                            .track
                                            .points()
                                            .iter()
                                            .map(|point| (point.timestamp, point.value))
                                            .collect(),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Report {
            outcomes,
            layers,
            history: self.timeline.history_stats(),
        }
    }
}
