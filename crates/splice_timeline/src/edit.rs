// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edit modes.
//!
//! Edits are computed as an [`EditPlan`] over a read-only view of the clips
//! before anything is changed. A plan lists the new start, inpoint,
//! duration and layer of every clip the edit touches and is only produced
//! once every touched clip has been checked, so applying it can never stop
//! halfway.
//!
//! | Mode     | Edge    | Effect                                                         |
//! |----------|---------|----------------------------------------------------------------|
//! | `Normal` | any     | move the clip, optionally to another layer                     |
//! | `Trim`   | `Start` | move the start, keep the end (inpoint follows)                 |
//! | `Trim`   | `End`   | move the end                                                   |
//! | `Ripple` | `None`  | move the clip and every later clip                             |
//! | `Ripple` | `End`   | move the end, shift later clips by the change                  |
//! | `Ripple` | `Start` | cut the head, keep the start, pull later clips back            |
//! | `Roll`   | `Start` | move the start, adjacent previous clip's end follows           |
//! | `Roll`   | `End`   | move the end, adjacent next clip's start follows               |
//! | `Slide`  | any     | move the clip, adjacent neighbours grow or shrink to follow    |

use crate::clip::ClipId;
use crate::interval::ClockTime;
use crate::layer::LayerId;
use crate::track::TrackId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timeline mutation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditMode {
    /// Move
    Normal,
    /// Move or trim, shifting later clips
    Ripple,
    /// Move an edit point shared by two clips
    Roll,
    /// Move one edge
    Trim,
    /// Move between fixed neighbours
    Slide,
}

impl EditMode {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Ripple => "ripple",
            Self::Roll => "roll",
            Self::Trim => "trim",
            Self::Slide => "slide",
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Clip edge an edit works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Edge {
    /// Start edge
    Start,
    /// End edge
    End,
    /// Whole clip
    #[default]
    None,
}

/// Why an edit was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// The clip is not in the view
    #[error("Clip {0} is not on the timeline")]
    UnknownClip(ClipId),

    /// The mode needs a start or end edge
    #[error("{0} edit needs a start or end edge")]
    EdgeRequired(EditMode),

    /// A time value would drop below zero
    #[error("{what} of clip {clip} would become negative")]
    Negative {
        /// Offending clip
        clip: ClipId,
        /// Offending field
        what: &'static str,
    },

    /// The clip would read past the end of its media
    #[error("Clip {clip} would exceed its media duration of {max}")]
    ExceedsMaxDuration {
        /// Offending clip
        clip: ClipId,
        /// Media ceiling
        max: ClockTime,
    },

    /// The clip is pinned
    #[error("Clip {0} is pinned")]
    Pinned(ClipId),
}

/// Read-only view of a clip used to plan edits
#[derive(Debug, Clone, PartialEq)]
pub struct ClipView {
    /// Clip
    pub id: ClipId,
    /// Timeline position
    pub start: ClockTime,
    /// Media offset
    pub inpoint: ClockTime,
    /// Length
    pub duration: ClockTime,
    /// Media ceiling
    pub max_duration: Option<ClockTime>,
    /// Containing layer
    pub layer: Option<LayerId>,
    /// Tracks spanned by the clip's attached children
    pub tracks: Vec<TrackId>,
    /// Whether edits may change the clip
    pub pinned: bool,
}

impl ClipView {
    /// End edge
    pub fn end(&self) -> ClockTime {
        self.start.saturating_add(self.duration)
    }

    fn shares_track(&self, other: &ClipView) -> bool {
        self.tracks.iter().any(|track| other.tracks.contains(track))
    }

    fn unchanged(&self) -> PlannedClip {
        PlannedClip {
            start: self.start,
            inpoint: self.inpoint,
            duration: self.duration,
            layer: self.layer,
        }
    }

    fn shifted(&self, delta: i128) -> Result<PlannedClip, EditError> {
        Ok(PlannedClip {
            start: offset(self.start, delta).ok_or(self.negative("start"))?,
            ..self.unchanged()
        })
    }

    /// Move the start by `delta`, keeping the end
    fn head_trimmed(&self, delta: i128) -> Result<PlannedClip, EditError> {
        Ok(PlannedClip {
            start: offset(self.start, delta).ok_or(self.negative("start"))?,
            ..self.head_cut(delta)?
        })
    }

    /// Skip `delta` of media, keeping the start
    fn head_cut(&self, delta: i128) -> Result<PlannedClip, EditError> {
        Ok(PlannedClip {
            inpoint: offset(self.inpoint, delta).ok_or(self.negative("inpoint"))?,
            duration: offset(self.duration, -delta).ok_or(self.negative("duration"))?,
            ..self.unchanged()
        })
    }

    fn resized(&self, delta: i128) -> Result<PlannedClip, EditError> {
        Ok(PlannedClip {
            duration: offset(self.duration, delta).ok_or(self.negative("duration"))?,
            ..self.unchanged()
        })
    }

    fn negative(&self, what: &'static str) -> EditError {
        EditError::Negative { clip: self.id, what }
    }
}

/// New values of one clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedClip {
    /// Timeline position
    pub start: ClockTime,
    /// Media offset
    pub inpoint: ClockTime,
    /// Length
    pub duration: ClockTime,
    /// Containing layer
    pub layer: Option<LayerId>,
}

/// A requested edit
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    /// Edited clip
    pub clip: ClipId,
    /// Edit mode
    pub mode: EditMode,
    /// Edge the edit works on
    pub edge: Edge,
    /// Target position
    pub position: ClockTime,
    /// Layers considered; empty means all layers
    pub layers: Vec<LayerId>,
}

/// A validated set of clip changes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditPlan {
    /// Position actually used, after snapping
    pub position: ClockTime,
    changes: IndexMap<ClipId, PlannedClip>,
}

impl EditPlan {
    pub(crate) fn single(clip: ClipId, planned: PlannedClip, position: ClockTime) -> Self {
        let mut changes = IndexMap::new();
        changes.insert(clip, planned);
        Self { position, changes }
    }

    /// Planned values of a clip
    pub fn get(&self, clip: ClipId) -> Option<&PlannedClip> {
        self.changes.get(&clip)
    }

    /// Changed clips with their new values
    pub fn iter(&self) -> impl Iterator<Item = (ClipId, PlannedClip)> + '_ {
        self.changes.iter().map(|(id, planned)| (*id, *planned))
    }

    /// Changed clips
    pub fn clips(&self) -> Vec<ClipId> {
        self.changes.keys().copied().collect()
    }

    /// Number of changed clips
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the edit changes nothing
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn offset(value: ClockTime, delta: i128) -> Option<ClockTime> {
    ClockTime::try_from(i128::from(value) + delta).ok()
}

fn signed_delta(from: ClockTime, to: ClockTime) -> i128 {
    i128::from(to) - i128::from(from)
}

/// Computes edit plans over a set of clips
#[derive(Debug)]
pub struct EditPlanner<'a> {
    clips: &'a [ClipView],
    snapping_distance: ClockTime,
}

impl<'a> EditPlanner<'a> {
    /// Plan over `clips`
    pub fn new(clips: &'a [ClipView]) -> Self {
        Self {
            clips,
            snapping_distance: 0,
        }
    }

    /// Snap positions in `Normal` and `Trim` modes to clip edges within
    /// `distance`
    pub fn with_snapping(mut self, distance: ClockTime) -> Self {
        self.snapping_distance = distance;
        self
    }

    fn neighbours<'b>(
        &'b self,
        target: &'b ClipView,
        layers: &'b [LayerId],
    ) -> impl Iterator<Item = &'a ClipView> + 'b {
        self.clips.iter().filter(move |clip| {
            clip.id != target.id
                && clip.shares_track(target)
                && (layers.is_empty() || clip.layer.is_some_and(|layer| layers.contains(&layer)))
        })
    }

    /// Closest position to `position` that puts the start, or the end of a
    /// `length`-long clip, on one of `edges`
    fn snap(&self, position: ClockTime, length: ClockTime, edges: &[ClockTime]) -> ClockTime {
        if self.snapping_distance == 0 {
            return position;
        }

        let mut best: Option<(ClockTime, ClockTime)> = None;
        for &edge in edges {
            let by_end = if length > 0 { edge.checked_sub(length) } else { None };
            for snapped in [Some(edge), by_end].into_iter().flatten() {
                let distance = snapped.abs_diff(position);
                if distance <= self.snapping_distance
                    && best.map_or(true, |(closest, _)| distance < closest)
                {
                    best = Some((distance, snapped));
                }
            }
        }

        match best {
            Some((_, snapped)) => {
                tracing::debug!(position, snapped, "snapped");
                snapped
            }
            None => position,
        }
    }

    /// Compute and validate the plan of `request`
    pub fn plan(&self, request: &EditRequest) -> Result<EditPlan, EditError> {
        let target = self
            .clips
            .iter()
            .find(|clip| clip.id == request.clip)
            .ok_or(EditError::UnknownClip(request.clip))?;
        let neighbours: Vec<&ClipView> = self.neighbours(target, &request.layers).collect();
        let edges: Vec<ClockTime> = neighbours
            .iter()
            .flat_map(|clip| [clip.start, clip.end()])
            .collect();

        let mut changes = IndexMap::new();
        let mut position = request.position;

        match (request.mode, request.edge) {
            (EditMode::Normal, _) => {
                position = self.snap(position, target.duration, &edges);
                let layer = match request.layers.as_slice() {
                    [layer] => Some(*layer),
                    _ => target.layer,
                };
                let planned = PlannedClip {
                    start: position,
                    layer,
                    ..target.unchanged()
                };
                changes.insert(target.id, planned);
            }

            (EditMode::Trim | EditMode::Roll, Edge::None) => {
                return Err(EditError::EdgeRequired(request.mode));
            }

            (EditMode::Trim, Edge::Start) => {
                position = self.snap(position, 0, &edges);
                let delta = signed_delta(target.start, position);
                changes.insert(target.id, target.head_trimmed(delta)?);
            }

            (EditMode::Trim, Edge::End) => {
                position = self.snap(position, 0, &edges);
                let duration = clamp_to_media(target, end_duration(target, position)?);
                changes.insert(target.id, PlannedClip { duration, ..target.unchanged() });
            }

            (EditMode::Ripple, Edge::None) => {
                let delta = signed_delta(target.start, position);
                changes.insert(target.id, target.shifted(delta)?);
                for clip in neighbours.iter().filter(|clip| clip.start >= target.start) {
                    changes.insert(clip.id, clip.shifted(delta)?);
                }
            }

            (EditMode::Ripple, Edge::End) => {
                let duration = clamp_to_media(target, end_duration(target, position)?);
                let delta = signed_delta(target.duration, duration);
                changes.insert(target.id, PlannedClip { duration, ..target.unchanged() });
                for clip in neighbours.iter().filter(|clip| clip.start >= target.end()) {
                    changes.insert(clip.id, clip.shifted(delta)?);
                }
            }

            (EditMode::Ripple, Edge::Start) => {
                let delta = signed_delta(target.start, position);
                changes.insert(target.id, target.head_cut(delta)?);
                for clip in neighbours.iter().filter(|clip| clip.start >= target.end()) {
                    changes.insert(clip.id, clip.shifted(-delta)?);
                }
            }

            (EditMode::Roll, Edge::End) => {
                let duration = end_duration(target, position)?;
                let delta = signed_delta(target.end(), position);
                changes.insert(target.id, PlannedClip { duration, ..target.unchanged() });
                for clip in neighbours.iter().filter(|clip| clip.start == target.end()) {
                    changes.insert(clip.id, clip.head_trimmed(delta)?);
                }
            }

            (EditMode::Roll, Edge::Start) => {
                let delta = signed_delta(target.start, position);
                changes.insert(target.id, target.head_trimmed(delta)?);
                for clip in neighbours.iter().filter(|clip| clip.end() == target.start) {
                    changes.insert(clip.id, clip.resized(delta)?);
                }
            }

            (EditMode::Slide, _) => {
                let delta = signed_delta(target.start, position);
                changes.insert(target.id, target.shifted(delta)?);
                for clip in &neighbours {
                    if clip.end() == target.start {
                        changes.insert(clip.id, clip.resized(delta)?);
                    } else if clip.start == target.end() {
                        changes.insert(clip.id, clip.head_trimmed(delta)?);
                    }
                }
            }
        }

        self.validate(changes, position)
    }

    fn validate(
        &self,
        changes: IndexMap<ClipId, PlannedClip>,
        position: ClockTime,
    ) -> Result<EditPlan, EditError> {
        let mut plan = EditPlan {
            position,
            changes: IndexMap::new(),
        };

        for (id, planned) in changes {
            let Some(view) = self.clips.iter().find(|clip| clip.id == id) else {
                return Err(EditError::UnknownClip(id));
            };
            if planned == view.unchanged() {
                continue;
            }
            if view.pinned {
                return Err(EditError::Pinned(id));
            }
            if let Some(max) = view.max_duration {
                if planned.inpoint.saturating_add(planned.duration) > max {
                    return Err(EditError::ExceedsMaxDuration { clip: id, max });
                }
            }
            plan.changes.insert(id, planned);
        }

        Ok(plan)
    }
}

fn end_duration(clip: &ClipView, end: ClockTime) -> Result<ClockTime, EditError> {
    end.checked_sub(clip.start).ok_or(clip.negative("duration"))
}

fn clamp_to_media(clip: &ClipView, duration: ClockTime) -> ClockTime {
    match clip.max_duration {
        Some(max) if clip.inpoint.saturating_add(duration) > max => {
            tracing::info!(clip = %clip.id, duration, max, "clamping to media duration");
            max.saturating_sub(clip.inpoint)
        }
        _ => duration,
    }
}
