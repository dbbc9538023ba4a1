// SPDX-License-Identifier: MIT OR Apache-2.0
//! The timeline: layers, tracks, clips and the edit engine.
//!
//! The timeline owns every clip and track element and is the only place
//! that moves elements in and out of tracks. Clips, layers and tracks refer
//! to each other by ID. Edits are planned by [`EditPlanner`] over a view of
//! all clips, then applied in one go and recorded in the undo history.

use crate::backing::{BackingFactory, ParamValue};
use crate::binding::BindingKind;
use crate::clip::{self, Clip, ClipId, ClipState};
use crate::config::TimelineConfig;
use crate::edit::{ClipView, Edge, EditError, EditMode, EditPlan, EditPlanner, EditRequest, PlannedClip};
use crate::element::{ElementError, ElementId, TrackElement};
use crate::events::{EventBus, TimelineEvent};
use crate::history::{History, HistoryError, HistoryStats, Snapshot};
use crate::interval::{ClockTime, Interval, MIN_PRIORITY};
use crate::keyframe::KeyframeTrack;
use crate::kind::ElementKind;
use crate::layer::{Layer, LayerId};
use crate::track::{Track, TrackId};
use indexmap::IndexMap;
use std::sync::mpsc;
use std::sync::Arc;

/// Timeline errors
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The element is not attached to any track
    #[error("Element is not in a track")]
    NotInTrack,

    /// The element does not belong to this timeline
    #[error("Element is not in a timeline")]
    NotInTimeline,

    /// The edit would break a constraint; nothing was changed
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// No clip with that ID
    #[error("Clip not found: {0}")]
    ClipNotFound(ClipId),

    /// No layer with that ID
    #[error("Layer not found")]
    LayerNotFound,

    /// No track with that ID
    #[error("Track not found")]
    TrackNotFound,

    /// No free track of the element's media type
    #[error("No {0} track available")]
    NoTrackForType(&'static str),

    /// Element operation failed
    #[error(transparent)]
    Element(#[from] ElementError),

    /// Undo/redo failed
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl From<EditError> for TimelineError {
    fn from(error: EditError) -> Self {
        Self::InvalidEdit(error.to_string())
    }
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Top-level container of layers and tracks
pub struct Timeline {
    config: TimelineConfig,
    factory: Arc<dyn BackingFactory>,
    tracks: IndexMap<TrackId, Track>,
    layers: Vec<Layer>,
    clips: IndexMap<ClipId, Clip>,
    elements: IndexMap<ElementId, TrackElement>,
    history: History,
    events: EventBus,
}

impl Timeline {
    /// Create an empty timeline with default settings
    pub fn new(factory: Arc<dyn BackingFactory>) -> Self {
        Self::with_config(TimelineConfig::default(), factory)
    }

    /// Create an empty timeline
    pub fn with_config(config: TimelineConfig, factory: Arc<dyn BackingFactory>) -> Self {
        let history = History::with_max_depth(config.history_depth);
        Self {
            config,
            factory,
            tracks: IndexMap::new(),
            layers: Vec::new(),
            clips: IndexMap::new(),
            elements: IndexMap::new(),
            history,
            events: EventBus::new(),
        }
    }

    /// Settings
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Bus carrying element and edit notifications
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a new event subscriber
    pub fn subscribe(&self) -> mpsc::Receiver<TimelineEvent> {
        self.events.subscribe()
    }

    // -- Tracks ----------------------------------------------------------

    /// Add a track
    pub fn add_track(&mut self, track: Track) -> TrackId {
        let id = track.id;
        tracing::debug!(track = ?id, kind = track.track_type.name(), "track added");
        self.tracks.insert(id, track);
        id
    }

    /// Get a track
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// All tracks, in insertion order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Change a track's restriction and notify the elements following it
    pub fn set_track_restriction(&mut self, id: TrackId, restriction: Option<String>) -> Result<bool> {
        let track = self.tracks.get_mut(&id).ok_or(TimelineError::TrackNotFound)?;
        if !track.set_restriction(restriction) {
            return Ok(false);
        }
        let restriction = track.restriction();
        for element_id in track.elements() {
            if let Some(element) = self.elements.get_mut(&element_id) {
                element.on_restriction_changed(restriction);
            }
        }
        Ok(true)
    }

    // -- Layers ----------------------------------------------------------

    /// Append a layer below the existing ones
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let priority = u32::try_from(self.layers.len()).unwrap_or(u32::MAX);
        let layer = Layer::new(name, priority).with_volume(self.config.default_layer_volume);
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Get a layer
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// All layers, top first
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn layer_index(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or(TimelineError::LayerNotFound)
    }

    /// Remove a layer with all its clips. Layers below move up.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<()> {
        let index = self.layer_index(id)?;
        let clips: Vec<ClipId> = self.layers[index].clips().collect();
        let children: Vec<ElementId> = clips
            .iter()
            .filter_map(|clip| self.clips.get(clip))
            .flat_map(|clip| clip.elements().iter().copied())
            .collect();
        self.detach_all(&children)?;

        for clip in clips {
            self.forget_clip(clip);
        }
        self.layers.remove(index);
        self.history.clear();

        for (priority, layer) in self.layers.iter_mut().enumerate().skip(index) {
            layer.set_priority(u32::try_from(priority).unwrap_or(u32::MAX));
        }
        let moved: Vec<ClipId> = self.layers[index..]
            .iter()
            .flat_map(Layer::clips)
            .collect();
        for clip in moved {
            self.sync_clip_children(clip, false);
        }
        Ok(())
    }

    /// Set a layer's default volume and push it to the elements that did
    /// not override it
    pub fn set_layer_volume(&mut self, id: LayerId, volume: f64) -> Result<()> {
        let index = self.layer_index(id)?;
        self.layers[index].set_volume(volume);
        let clips: Vec<ClipId> = self.layers[index].clips().collect();
        for clip in clips {
            self.sync_clip_defaults(clip);
        }
        Ok(())
    }

    // -- Clips -----------------------------------------------------------

    /// Create a clip in `layer` with one element per kind, each attached
    /// to the first free track of its media type
    pub fn add_clip(
        &mut self,
        layer: LayerId,
        name: impl Into<String>,
        interval: Interval,
        kinds: Vec<ElementKind>,
    ) -> Result<ClipId> {
        let index = self.layer_index(layer)?;
        let mut clip = Clip::new(name, interval);
        clip.set_layer(Some(layer));
        let child_interval = self.child_interval(&clip);

        let mut created: Vec<TrackElement> = Vec::new();
        for kind in kinds {
            let track_type = kind.track_type();
            let track = self.tracks.values().find(|track| {
                track.track_type == track_type
                    && !created.iter().any(|element| element.track() == Some(track.id))
            });
            let Some(track) = track else {
                discard(created);
                return Err(TimelineError::NoTrackForType(track_type.name()));
            };

            let mut element = TrackElement::new(kind, child_interval).with_events(self.events.clone());
            element.set_clip(Some(clip.id));
            if let Err(error) = element.attach_to_track(track, self.factory.as_ref()) {
                discard(created);
                return Err(error.into());
            }
            element.sync_layer_defaults(&self.layers[index]);
            created.push(element);
        }

        let id = clip.id;
        for element in created {
            clip.push_element(element.id());
            self.adopt(element);
        }
        self.layers[index].insert_clip(id, clip.start());
        tracing::debug!(clip = %id, name = %clip.name, children = clip.elements().len(), "clip added");
        self.clips.insert(id, clip);
        Ok(id)
    }

    /// Detach and drop a clip with its elements. If any element cannot be
    /// detached the clip stays as it was.
    pub fn remove_clip(&mut self, id: ClipId) -> Result<()> {
        let clip = self.clips.get(&id).ok_or(TimelineError::ClipNotFound(id))?;
        let children = clip.elements().to_vec();
        self.detach_all(&children)?;

        self.forget_clip(id);
        self.history.clear();
        Ok(())
    }

    /// Drop a clip whose elements are all detached
    fn forget_clip(&mut self, id: ClipId) {
        let Some(clip) = self.clips.shift_remove(&id) else {
            return;
        };
        for element in clip.elements() {
            self.elements.shift_remove(element);
        }
        for layer in &mut self.layers {
            layer.remove_clip(id);
        }
        tracing::debug!(clip = %id, "clip removed");
    }

    /// Detach every attached element of `ids`, or none of them
    fn detach_all(&mut self, ids: &[ElementId]) -> Result<()> {
        let attached: Vec<(ElementId, TrackId)> = ids
            .iter()
            .filter_map(|id| Some((*id, self.elements.get(id)?.track()?)))
            .collect();
        if let Some((busy, _)) = attached
            .iter()
            .find(|(id, _)| self.elements.get(id).is_some_and(TrackElement::is_transitioning))
        {
            tracing::warn!(element = %busy, "element is changing state, nothing detached");
            return Err(ElementError::StillScheduled.into());
        }

        for (done, (id, _)) in attached.iter().enumerate() {
            if let Err(error) = self.detach_element(*id) {
                for (id, track) in &attached[..done] {
                    if let Err(error) = self.attach_element(*id, *track) {
                        tracing::warn!(element = %id, %error, "could not re-attach element");
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Get a clip
    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    /// All clips, in insertion order
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    /// Elements of a clip
    pub fn clip_elements(&self, id: ClipId) -> Vec<&TrackElement> {
        self.clips
            .get(&id)
            .map(|clip| {
                clip.elements()
                    .iter()
                    .filter_map(|element| self.elements.get(element))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lock or unlock a clip against edits
    pub fn set_clip_pinned(&mut self, id: ClipId, pinned: bool) -> Result<()> {
        let clip = self.clips.get_mut(&id).ok_or(TimelineError::ClipNotFound(id))?;
        clip.pinned = pinned;
        Ok(())
    }

    /// Split a clip at timeline `position`. The original keeps the head;
    /// the returned clip holds the tail with the tail part of every
    /// keyframe track and a copy of the child parameters.
    pub fn split_clip(&mut self, id: ClipId, position: ClockTime) -> Result<ClipId> {
        let clip = self.clips.get(&id).ok_or(TimelineError::ClipNotFound(id))?;
        if clip.pinned {
            return Err(EditError::Pinned(id).into());
        }
        let interval = *clip.interval();
        if position <= interval.start() || position >= interval.end() {
            return Err(TimelineError::InvalidEdit(format!(
                "split position {position} is outside clip {id}"
            )));
        }
        let media_position = interval.to_media_time(position);

        let mut tail_interval = Interval::new(position, media_position, interval.end() - position);
        if let Some(max) = interval.max_duration() {
            tail_interval = tail_interval.with_max_duration(max);
        }
        let mut tail = Clip::new(clip.name.clone(), tail_interval);
        tail.set_layer(clip.layer());
        tail.set_priority(clip.priority());
        let children = clip.elements().to_vec();
        let mut siblings = self.build_siblings(&tail, &children)?;

        let carried = self.carry_over(&children, &mut siblings, tail.layer(), |original, sibling| {
            clip::copy_child_parameters(original, sibling)?;
            clip::split_bindings(original, sibling, media_position)
        });
        if let Err(error) = carried {
            tracing::warn!(clip = %id, position, %error, "split abandoned");
            discard(siblings);
            return Err(error);
        }

        for child in &children {
            if let Some(original) = self.elements.get_mut(child).filter(|e| e.is_attached()) {
                clip::truncate_bindings(original, media_position);
            }
        }

        let mut head = interval;
        head.set_duration(position - interval.start());
        if let Some(clip) = self.clips.get_mut(&id) {
            clip.set_interval(head);
        }
        self.sync_clip_children(id, false);

        let tail_id = self.insert_clip(tail, siblings);
        self.history.clear();
        tracing::debug!(clip = %id, tail = %tail_id, position, "clip split");
        Ok(tail_id)
    }

    /// Duplicate a clip into `layer` at `start`, with its child parameters
    /// and keyframes
    pub fn copy_clip(&mut self, id: ClipId, layer: LayerId, start: ClockTime) -> Result<ClipId> {
        self.layer_index(layer)?;
        let clip = self.clips.get(&id).ok_or(TimelineError::ClipNotFound(id))?;

        let mut interval = *clip.interval();
        interval.set_start(start);
        let mut copy = Clip::new(clip.name.clone(), interval);
        copy.set_layer(Some(layer));
        copy.set_priority(clip.priority());
        let children = clip.elements().to_vec();
        let mut siblings = self.build_siblings(&copy, &children)?;

        let carried = self.carry_over(&children, &mut siblings, Some(layer), |original, sibling| {
            clip::copy_child_parameters(original, sibling)?;
            clip::copy_bindings(original, sibling)
        });
        if let Err(error) = carried {
            tracing::warn!(clip = %id, %error, "copy abandoned");
            discard(siblings);
            return Err(error);
        }

        let copy_id = self.insert_clip(copy, siblings);
        tracing::debug!(clip = %id, copy = %copy_id, start, "clip copied");
        Ok(copy_id)
    }

    /// Move a clip to another layer, keeping its times
    pub fn move_clip_to_layer(&mut self, id: ClipId, layer: LayerId) -> Result<()> {
        self.layer_index(layer)?;
        let clip = self.clips.get(&id).ok_or(TimelineError::ClipNotFound(id))?;
        if clip.layer() == Some(layer) {
            return Ok(());
        }
        if clip.pinned {
            return Err(EditError::Pinned(id).into());
        }
        let planned = PlannedClip {
            start: clip.start(),
            inpoint: clip.interval().inpoint(),
            duration: clip.interval().duration(),
            layer: Some(layer),
        };
        let plan = EditPlan::single(id, planned, clip.start());
        self.commit_plan(&plan, "move to layer")
    }

    /// Elements built for `clip`, one per child of the source clip, on the
    /// same tracks. Nothing is left attached on failure.
    fn build_siblings(&self, clip: &Clip, children: &[ElementId]) -> Result<Vec<TrackElement>> {
        let interval = self.child_interval(clip);
        let mut siblings = Vec::with_capacity(children.len());
        for child in children {
            let Some(original) = self.elements.get(child) else {
                continue;
            };
            let mut sibling =
                TrackElement::new(original.kind().clone(), interval).with_events(self.events.clone());
            sibling.set_clip(Some(clip.id));
            if let Some(track) = original.track() {
                let Some(track) = self.tracks.get(&track) else {
                    discard(siblings);
                    return Err(TimelineError::TrackNotFound);
                };
                if let Err(error) = sibling.attach_to_track(track, self.factory.as_ref()) {
                    discard(siblings);
                    return Err(error.into());
                }
            }
            siblings.push(sibling);
        }
        Ok(siblings)
    }

    /// Run `carry` on every attached child and its sibling, then apply the
    /// layer defaults to the siblings. Only the siblings are modified.
    fn carry_over<F>(
        &self,
        children: &[ElementId],
        siblings: &mut [TrackElement],
        layer: Option<LayerId>,
        carry: F,
    ) -> Result<()>
    where
        F: Fn(&TrackElement, &mut TrackElement) -> std::result::Result<usize, ElementError>,
    {
        let layer = layer.and_then(|layer| self.layer(layer));
        for (original, sibling) in children.iter().zip(siblings.iter_mut()) {
            let Some(original) = self.elements.get(original) else {
                continue;
            };
            if original.is_attached() && sibling.is_attached() {
                carry(original, sibling)?;
            }
            if let Some(layer) = layer {
                sibling.sync_layer_defaults(layer);
            }
        }
        Ok(())
    }

    fn insert_clip(&mut self, mut clip: Clip, elements: Vec<TrackElement>) -> ClipId {
        let id = clip.id;
        for element in elements {
            clip.push_element(element.id());
            self.adopt(element);
        }
        if let Some(layer) = clip
            .layer()
            .and_then(|layer| self.layers.iter_mut().find(|l| l.id == layer))
        {
            layer.insert_clip(id, clip.start());
        }
        self.clips.insert(id, clip);
        id
    }

    fn adopt(&mut self, element: TrackElement) {
        if let Some(track) = element.track().and_then(|track| self.tracks.get_mut(&track)) {
            track.insert(element.id());
        }
        self.elements.insert(element.id(), element);
    }

    // -- Elements --------------------------------------------------------

    /// Get an element
    pub fn element(&self, id: ElementId) -> Option<&TrackElement> {
        self.elements.get(&id)
    }


    /// All elements
    pub fn elements(&self) -> impl Iterator<Item = &TrackElement> {
        self.elements.values()
    }

    fn element_entry(&mut self, id: ElementId) -> Result<&mut TrackElement> {
        self.elements.get_mut(&id).ok_or(TimelineError::NotInTimeline)
    }

    /// Write a child parameter of an element. The value then wins over
    /// layer defaults.
    pub fn set_child_parameter(&mut self, element: ElementId, name: &str, value: ParamValue) -> Result<()> {
        self.element_entry(element)?.set_child_parameter(name, value)?;
        Ok(())
    }

    /// Drive a child parameter of an element with `track`, replacing any
    /// existing binding
    pub fn bind_control_track(
        &mut self,
        element: ElementId,
        name: &str,
        track: KeyframeTrack,
        kind: BindingKind,
    ) -> Result<()> {
        self.element_entry(element)?.bind_control_track(name, track, kind)?;
        Ok(())
    }

    /// Remove a binding of an element. Returns whether one existed.
    pub fn unbind_control_track(&mut self, element: ElementId, name: &str) -> Result<bool> {
        Ok(self.element_entry(element)?.unbind_control_track(name))
    }

    /// Switch an element on or off. Returns whether the flag changed.
    pub fn set_element_active(&mut self, element: ElementId, active: bool) -> Result<bool> {
        Ok(self.element_entry(element)?.set_active(active)?)
    }

    /// Take an element out of its track, releasing its backing object
    pub fn detach_element(&mut self, id: ElementId) -> Result<()> {
        let element = self.elements.get_mut(&id).ok_or(TimelineError::NotInTimeline)?;
        let track = element.track().ok_or(TimelineError::NotInTrack)?;
        element.detach()?;
        if let Some(track) = self.tracks.get_mut(&track) {
            track.remove(id);
        }
        Ok(())
    }

    /// Put an element in a track of its media type
    pub fn attach_element(&mut self, id: ElementId, track: TrackId) -> Result<()> {
        let element = self.elements.get_mut(&id).ok_or(TimelineError::NotInTimeline)?;
        let target = self.tracks.get_mut(&track).ok_or(TimelineError::TrackNotFound)?;
        if target.track_type != element.track_type() {
            return Err(TimelineError::NoTrackForType(element.track_type().name()));
        }
        element.attach_to_track(target, self.factory.as_ref())?;
        target.insert(id);

        let layer = element
            .clip()
            .and_then(|clip| self.clips.get(&clip))
            .and_then(Clip::layer)
            .and_then(|layer| self.layers.iter().find(|l| l.id == layer));
        if let Some(layer) = layer {
            element.sync_layer_defaults(layer);
        }
        Ok(())
    }

    /// Push keyframe values at timeline `position` for every element
    /// playing there. Returns the number of parameters written.
    pub fn sync_controlled_parameters(&self, position: ClockTime) -> Result<usize> {
        let mut written = 0;
        for element in self
            .elements
            .values()
            .filter(|element| element.is_attached() && element.interval().contains(position))
        {
            written += element.sync_controlled_parameters(position)?;
        }
        Ok(written)
    }

    // -- Edits -----------------------------------------------------------

    /// Edit the clip owning `element`
    pub fn edit_element(
        &mut self,
        element: ElementId,
        mode: EditMode,
        edge: Edge,
        layers: &[LayerId],
        position: ClockTime,
    ) -> Result<()> {
        let element = self.elements.get(&element).ok_or_else(|| {
            tracing::warn!(%element, "edit of an element outside the timeline");
            TimelineError::NotInTimeline
        })?;
        if element.track().is_none() {
            tracing::warn!(element = %element.id(), "edit of an element outside any track");
            return Err(TimelineError::NotInTrack);
        }
        let clip = element.clip().ok_or(TimelineError::NotInTimeline)?;
        self.edit_clip(clip, mode, edge, layers, position)
    }

    /// Edit a clip; the whole edit is applied or nothing is
    pub fn edit_clip(
        &mut self,
        clip: ClipId,
        mode: EditMode,
        edge: Edge,
        layers: &[LayerId],
        position: ClockTime,
    ) -> Result<()> {
        let target = self.clips.get(&clip).ok_or(TimelineError::ClipNotFound(clip))?;
        let placed = target
            .elements()
            .iter()
            .any(|element| self.elements.get(element).is_some_and(TrackElement::is_attached));
        if !placed {
            return Err(TimelineError::NotInTrack);
        }
        for layer in layers {
            self.layer_index(*layer)?;
        }

        let views = self.clip_views();
        let request = EditRequest {
            clip,
            mode,
            edge,
            position,
            layers: layers.to_vec(),
        };
        let plan = EditPlanner::new(&views)
            .with_snapping(self.config.snapping_distance)
            .plan(&request)
            .inspect_err(|error| {
                tracing::warn!(%clip, %mode, ?edge, position, %error, "edit rejected");
            })?;

        self.commit_plan(&plan, format!("{mode} {edge:?}"))?;
        tracing::debug!(%clip, %mode, ?edge, position = plan.position, changed = plan.len(), "edited");
        self.events.publish(TimelineEvent::Edited {
            clip,
            mode,
            edge,
            position: plan.position,
        });
        Ok(())
    }

    fn clip_views(&self) -> Vec<ClipView> {
        self.clips
            .values()
            .map(|clip| ClipView {
                id: clip.id,
                start: clip.start(),
                inpoint: clip.interval().inpoint(),
                duration: clip.interval().duration(),
                max_duration: clip.interval().max_duration(),
                layer: clip.layer(),
                tracks: clip
                    .elements()
                    .iter()
                    .filter_map(|element| self.elements.get(element)?.track())
                    .collect(),
                pinned: clip.pinned,
            })
            .collect()
    }

    fn commit_plan(&mut self, plan: &EditPlan, description: impl Into<String>) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }
        let ids = plan.clips();
        let before = Snapshot::capture(&self.clip_states(&ids))?;
        for (id, planned) in plan.iter() {
            self.apply_planned(id, planned);
        }
        let after = Snapshot::capture(&self.clip_states(&ids))?;
        self.history.record(description, before, after);
        Ok(())
    }

    fn apply_planned(&mut self, id: ClipId, planned: PlannedClip) {
        let Some(clip) = self.clips.get_mut(&id) else {
            return;
        };
        let mut interval = *clip.interval();
        interval.set_start(planned.start);
        interval.set_inpoint(planned.inpoint);
        interval.set_duration(planned.duration);
        clip.set_interval(interval);

        let from = clip.layer();
        clip.set_layer(planned.layer);
        self.place_in_layer(id, from, planned.layer, planned.start);
        self.sync_clip_children(id, from != planned.layer);
    }

    fn place_in_layer(&mut self, clip: ClipId, from: Option<LayerId>, to: Option<LayerId>, start: ClockTime) {
        if from != to {
            if let Some(layer) = from.and_then(|id| self.layers.iter_mut().find(|l| l.id == id)) {
                layer.remove_clip(clip);
            }
        }
        if let Some(layer) = to.and_then(|id| self.layers.iter_mut().find(|l| l.id == id)) {
            layer.insert_clip(clip, start);
        }
    }

    fn base_priority(&self, layer: Option<LayerId>) -> u32 {
        layer
            .and_then(|id| self.layer(id))
            .map_or(MIN_PRIORITY, Layer::base_priority)
    }

    fn child_interval(&self, clip: &Clip) -> Interval {
        let mut interval = *clip.interval();
        interval.set_priority(clip.element_priority(self.base_priority(clip.layer())));
        interval
    }

    /// Copy the clip's interval onto its children
    fn sync_clip_children(&mut self, id: ClipId, layer_changed: bool) {
        let Some(clip) = self.clips.get(&id) else {
            return;
        };
        let interval = self.child_interval(clip);
        for element in clip.elements() {
            if let Some(element) = self.elements.get_mut(element) {
                element.apply_interval(interval);
            }
        }
        if layer_changed {
            self.sync_clip_defaults(id);
        }
    }

    fn sync_clip_defaults(&self, id: ClipId) {
        let Some(clip) = self.clips.get(&id) else {
            return;
        };
        let Some(layer) = clip.layer().and_then(|layer| self.layer(layer)) else {
            return;
        };
        for element in clip.elements().iter().filter_map(|e| self.elements.get(e)) {
            element.sync_layer_defaults(layer);
        }
    }

    // -- History ---------------------------------------------------------

    fn clip_states(&self, ids: &[ClipId]) -> Vec<ClipState> {
        ids.iter()
            .filter_map(|id| self.clips.get(id))
            .map(|clip| ClipState {
                clip: clip.id,
                layer: clip.layer(),
                interval: *clip.interval(),
                elements: clip
                    .elements()
                    .iter()
                    .filter_map(|element| self.elements.get(element))
                    .map(TrackElement::state)
                    .collect(),
            })
            .collect()
    }

    fn restore(&mut self, states: Vec<ClipState>) {
        for state in states {
            let Some(clip) = self.clips.get_mut(&state.clip) else {
                tracing::warn!(clip = %state.clip, "clip vanished, cannot restore");
                continue;
            };
            clip.set_interval(state.interval);
            let from = clip.layer();
            clip.set_layer(state.layer);
            self.place_in_layer(state.clip, from, state.layer, state.interval.start());

            for element_state in state.elements {
                if let Some(element) = self.elements.get_mut(&element_state.element) {
                    element.restore(element_state);
                }
            }
            if from != state.layer {
                self.sync_clip_defaults(state.clip);
            }
        }
    }

    /// Revert the last edit
    pub fn undo(&mut self) -> Result<()> {
        let states = self.history.undo()?;
        tracing::debug!(clips = states.len(), "undo");
        self.restore(states);
        Ok(())
    }

    /// Re-apply the last reverted edit
    pub fn redo(&mut self) -> Result<()> {
        let states = self.history.redo()?;
        tracing::debug!(clips = states.len(), "redo");
        self.restore(states);
        Ok(())
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// History statistics
    pub fn history_stats(&self) -> HistoryStats {
        self.history.stats()
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        for element in self.elements.values_mut() {
            element.release();
        }
    }
}

/// Detach elements that will not be kept
fn discard(elements: Vec<TrackElement>) {
    for mut element in elements {
        if element.is_attached() && element.detach().is_err() {
            element.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{
        BackingError, BackingObject, BackingState, ParameterSpec, StateChangeReturn, PROP_DURATION,
        PROP_PRIORITY, PROP_RESTRICTION,
    };
    use crate::interval::{LAYER_HEIGHT, SECOND};
    use crate::keyframe::ControlPoint;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::simulated::SimulatedFactory;
    use crate::track::TrackType;

    struct Fixture {
        timeline: Timeline,
        factory: Arc<SimulatedFactory>,
        audio: TrackId,
        video: TrackId,
        layer: LayerId,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(TimelineConfig::default())
        }

        fn with_config(config: TimelineConfig) -> Self {
            let factory = Arc::new(SimulatedFactory::new());
            let mut timeline = Timeline::with_config(config, factory.clone());
            let audio = timeline.add_track(Track::new("audio", TrackType::Audio));
            let video = timeline.add_track(Track::new("video", TrackType::Video));
            let layer = timeline.add_layer("main");
            Self {
                timeline,
                factory,
                audio,
                video,
                layer,
            }
        }

        fn av_clip(&mut self, start: ClockTime, inpoint: ClockTime, duration: ClockTime) -> ClipId {
            self.timeline
                .add_clip(
                    self.layer,
                    "clip",
                    Interval::new(start, inpoint, duration),
                    vec![
                        ElementKind::VideoTestSource { pattern: 0 },
                        ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 },
                    ],
                )
                .expect("add clip")
        }

        fn audio_clip(&mut self, start: ClockTime, inpoint: ClockTime, duration: ClockTime) -> ClipId {
            self.timeline
                .add_clip(
                    self.layer,
                    "tone",
                    Interval::new(start, inpoint, duration),
                    vec![ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 }],
                )
                .expect("add clip")
        }

        fn element(&self, clip: ClipId, track_type: TrackType) -> ElementId {
            self.timeline
                .clip_elements(clip)
                .into_iter()
                .find(|element| element.track_type() == track_type)
                .map(TrackElement::id)
                .expect("element of that type")
        }

        fn times(&self, clip: ClipId) -> (ClockTime, ClockTime, ClockTime) {
            let interval = self.timeline.clip(clip).map(|c| *c.interval()).unwrap_or_default();
            (interval.start(), interval.inpoint(), interval.duration())
        }

        fn points(&self, element: ElementId, name: &str) -> Vec<ControlPoint> {
            self.timeline
                .element(element)
                .and_then(|e| e.control_binding(name))
                .map(|b| b.track.points().to_vec())
                .unwrap_or_default()
        }
    }

    /// Faults switched on in every [`FaultyBacking`] of a factory
    #[derive(Debug, Default)]
    struct Faults {
        /// `freq` can no longer be read
        unreadable: AtomicBool,
        /// State changes are refused
        stuck: AtomicBool,
    }

    #[derive(Debug)]
    struct FaultyBacking {
        inner: Box<dyn BackingObject>,
        faults: Arc<Faults>,
    }

    impl BackingObject for FaultyBacking {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn introspect_parameters(&self) -> Vec<ParameterSpec> {
            self.inner.introspect_parameters()
        }

        fn set_parameter(&mut self, name: &str, value: ParamValue) -> std::result::Result<(), BackingError> {
            self.inner.set_parameter(name, value)
        }

        fn get_parameter(&self, name: &str) -> Option<ParamValue> {
            if self.faults.unreadable.load(Ordering::SeqCst) && name.ends_with("freq") {
                return None;
            }
            self.inner.get_parameter(name)
        }

        fn current_state(&self) -> BackingState {
            self.inner.current_state()
        }

        fn pending_state(&self) -> Option<BackingState> {
            self.inner.pending_state()
        }

        fn set_state(&mut self, state: BackingState) -> std::result::Result<StateChangeReturn, BackingError> {
            if self.faults.stuck.load(Ordering::SeqCst) {
                return Err(BackingError::StateChange(format!("{state:?}")));
            }
            self.inner.set_state(state)
        }
    }

    #[derive(Default)]
    struct FaultyFactory {
        inner: SimulatedFactory,
        faults: Arc<Faults>,
    }

    impl BackingFactory for FaultyFactory {
        fn create(
            &self,
            kind: &ElementKind,
            interval: &Interval,
            active: bool,
        ) -> std::result::Result<Box<dyn BackingObject>, BackingError> {
            Ok(Box::new(FaultyBacking {
                inner: self.inner.create(kind, interval, active)?,
                faults: Arc::clone(&self.faults),
            }))
        }
    }

    #[test]
    fn test_add_clip_attaches_one_element_per_track() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(0, 0, 10 * SECOND);

        let elements = fx.timeline.clip_elements(clip);
        assert_eq!(elements.len(), 2);
        assert!(elements.iter().all(|e| e.is_attached()));
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(1));
        assert_eq!(fx.timeline.track(fx.video).map(Track::len), Some(1));
        assert_eq!(fx.factory.created(), 2);

        for element in elements {
            assert_eq!(element.interval().priority(), MIN_PRIORITY);
            assert_eq!(element.clip(), Some(clip));
        }
    }

    #[test]
    fn test_add_clip_without_matching_track() {
        let mut fx = Fixture::new();
        let result = fx.timeline.add_clip(
            fx.layer,
            "two tones",
            Interval::default(),
            vec![
                ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 },
                ElementKind::AudioTestSource { freq: 220.0, volume: 0.8 },
            ],
        );
        assert!(matches!(result, Err(TimelineError::NoTrackForType("Audio"))));
        assert_eq!(fx.timeline.clips().count(), 0);
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(0));
    }

    #[test]
    fn test_layer_volume_respects_overrides() {
        let mut fx = Fixture::new();
        let first = fx.audio_clip(0, 0, 10);
        let second = fx.audio_clip(20, 0, 10);
        let first_el = fx.element(first, TrackType::Audio);
        let second_el = fx.element(second, TrackType::Audio);

        fx.timeline
            .set_child_parameter(second_el, "volume::volume", ParamValue::Double(3.0))
            .expect("set");
        fx.timeline.set_layer_volume(fx.layer, 0.25).expect("volume");

        let volume = |id| {
            fx.timeline
                .element(id)
                .and_then(|e| e.get_child_parameter("volume::volume").ok())
        };
        assert_eq!(volume(first_el), Some(ParamValue::Double(0.25)));
        assert_eq!(volume(second_el), Some(ParamValue::Double(3.0)));
    }

    #[test]
    fn test_edit_requires_placed_element() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 10);
        let element = fx.element(clip, TrackType::Audio);

        assert!(matches!(
            fx.timeline.edit_element(ElementId::new(), EditMode::Normal, Edge::None, &[], 5),
            Err(TimelineError::NotInTimeline)
        ));

        fx.timeline.detach_element(element).expect("detach");
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(0));
        assert!(matches!(
            fx.timeline.edit_element(element, EditMode::Normal, Edge::None, &[], 5),
            Err(TimelineError::NotInTrack)
        ));

        fx.timeline.attach_element(element, fx.audio).expect("attach");
        fx.timeline
            .edit_element(element, EditMode::Normal, Edge::None, &[], 5)
            .expect("edit");
        assert_eq!(fx.times(clip), (5, 0, 10));
    }

    #[test]
    fn test_failed_trim_leaves_everything_unchanged() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(10, 0, 20);
        let element = fx.element(clip, TrackType::Audio);
        let before = fx.timeline.element(element).map(|e| *e.interval());

        let result = fx
            .timeline
            .edit_element(element, EditMode::Trim, Edge::Start, &[], 40);
        assert!(matches!(result, Err(TimelineError::InvalidEdit(_))));
        assert_eq!(fx.timeline.element(element).map(|e| *e.interval()), before);
        assert_eq!(fx.times(clip), (10, 0, 20));
        assert!(!fx.timeline.can_undo());
    }

    #[test]
    fn test_trim_propagates_to_children_and_keyframes() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(0, 0, 20);
        let audio = fx.element(clip, TrackType::Audio);
        let video = fx.element(clip, TrackType::Video);
        fx.timeline
            .bind_control_track(
                audio,
                "volume::volume",
                KeyframeTrack::new("volume").with_points([(0, 0.0), (10, 1.0), (20, 0.0)]),
                BindingKind::DirectAbsolute,
            )
            .expect("bind");

        fx.timeline
            .edit_clip(clip, EditMode::Trim, Edge::Start, &[], 5)
            .expect("trim start");
        fx.timeline
            .edit_clip(clip, EditMode::Trim, Edge::End, &[], 15)
            .expect("trim end");

        assert_eq!(fx.times(clip), (5, 5, 10));
        assert_eq!(
            fx.timeline.element(video).map(|e| (e.interval().start(), e.interval().duration())),
            Some((5, 10))
        );
        assert_eq!(
            fx.points(audio, "volume::volume"),
            vec![
                ControlPoint::new(5, 0.5),
                ControlPoint::new(10, 1.0),
                ControlPoint::new(15, 0.5)
            ]
        );
        let pushed = fx
            .timeline
            .element(audio)
            .and_then(|e| e.backing())
            .and_then(|b| b.lock().get_parameter(PROP_DURATION));
        assert_eq!(pushed, Some(ParamValue::UInt(10)));
    }

    #[test]
    fn test_ripple_and_undo_redo() {
        let mut fx = Fixture::new();
        let a = fx.audio_clip(0, 0, 10);
        let b = fx.audio_clip(10, 0, 10);
        let c = fx.audio_clip(30, 0, 10);
        let events = fx.timeline.subscribe();

        fx.timeline
            .edit_clip(a, EditMode::Ripple, Edge::End, &[], 4)
            .expect("ripple");
        assert_eq!(fx.times(a), (0, 0, 4));
        assert_eq!(fx.times(b), (4, 0, 10));
        assert_eq!(fx.times(c), (24, 0, 10));
        assert_eq!(
            events.try_recv().ok(),
            Some(TimelineEvent::Edited {
                clip: a,
                mode: EditMode::Ripple,
                edge: Edge::End,
                position: 4
            })
        );

        fx.timeline.undo().expect("undo");
        assert_eq!(fx.times(a), (0, 0, 10));
        assert_eq!(fx.times(b), (10, 0, 10));
        assert_eq!(fx.times(c), (30, 0, 10));
        let element = fx.element(c, TrackType::Audio);
        assert_eq!(fx.timeline.element(element).map(|e| e.interval().start()), Some(30));

        fx.timeline.redo().expect("redo");
        assert_eq!(fx.times(c), (24, 0, 10));
        assert!(matches!(
            fx.timeline.redo(),
            Err(TimelineError::History(HistoryError::NothingToRedo))
        ));
    }

    #[test]
    fn test_undo_restores_keyframes() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 20);
        let element = fx.element(clip, TrackType::Audio);
        let original = vec![
            ControlPoint::new(0, 0.0),
            ControlPoint::new(10, 1.0),
            ControlPoint::new(20, 0.0),
        ];
        fx.timeline
            .bind_control_track(
                element,
                "freq",
                KeyframeTrack::new("freq").with_points(original.iter().map(|p| (p.timestamp, p.value))),
                BindingKind::Direct,
            )
            .expect("bind");

        fx.timeline
            .edit_clip(clip, EditMode::Trim, Edge::End, &[], 5)
            .expect("trim");
        assert_eq!(fx.points(element, "freq").len(), 2);

        fx.timeline.undo().expect("undo");
        assert_eq!(fx.points(element, "freq"), original);
    }

    #[test]
    fn test_roll_between_adjacent_clips() {
        let mut fx = Fixture::new();
        let a = fx.av_clip(0, 0, 10);
        let b = fx.av_clip(10, 10, 10);

        fx.timeline
            .edit_clip(b, EditMode::Roll, Edge::Start, &[], 7)
            .expect("roll");
        assert_eq!(fx.times(a), (0, 0, 7));
        assert_eq!(fx.times(b), (7, 7, 13));
        assert_eq!(fx.times(a).2 + fx.times(b).2, 20);
    }

    #[test]
    fn test_slide_between_neighbours() {
        let mut fx = Fixture::new();
        let a = fx.audio_clip(0, 0, 10);
        let b = fx.audio_clip(10, 5, 10);
        let c = fx.audio_clip(20, 5, 10);

        fx.timeline
            .edit_clip(b, EditMode::Slide, Edge::None, &[], 8)
            .expect("slide");
        assert_eq!(fx.times(a), (0, 0, 8));
        assert_eq!(fx.times(b), (8, 5, 10));
        assert_eq!(fx.times(c), (18, 3, 12));
    }

    #[test]
    fn test_pinned_clip_refuses_edits() {
        let mut fx = Fixture::new();
        let a = fx.audio_clip(0, 0, 10);
        let b = fx.audio_clip(10, 0, 10);
        fx.timeline.set_clip_pinned(b, true).expect("pin");

        assert!(matches!(
            fx.timeline.edit_clip(a, EditMode::Ripple, Edge::None, &[], 5),
            Err(TimelineError::InvalidEdit(_))
        ));
        assert_eq!(fx.times(a), (0, 0, 10));
        assert_eq!(fx.times(b), (10, 0, 10));
        assert!(matches!(fx.timeline.split_clip(b, 15), Err(TimelineError::InvalidEdit(_))));
    }

    #[test]
    fn test_normal_edit_changes_layer_and_priority() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 10);
        let element = fx.element(clip, TrackType::Audio);
        let lower = fx.timeline.add_layer("lower");
        fx.timeline.set_layer_volume(lower, 0.5).expect("volume");

        fx.timeline
            .edit_clip(clip, EditMode::Normal, Edge::None, &[lower], 3)
            .expect("move");

        assert_eq!(fx.timeline.clip(clip).and_then(Clip::layer), Some(lower));
        assert!(fx.timeline.layer(lower).is_some_and(|l| l.contains(clip)));
        assert!(fx.timeline.layer(fx.layer).is_some_and(Layer::is_empty));

        let element = fx.timeline.element(element).expect("element");
        assert_eq!(element.interval().priority(), LAYER_HEIGHT + MIN_PRIORITY);
        assert_eq!(element.interval().layer_priority(), 1);
        assert_eq!(
            element.backing().and_then(|b| b.lock().get_parameter(PROP_PRIORITY)),
            Some(ParamValue::UInt(u64::from(LAYER_HEIGHT + MIN_PRIORITY)))
        );
        assert_eq!(
            element.get_child_parameter("volume::volume").ok(),
            Some(ParamValue::Double(0.5))
        );

        fx.timeline.undo().expect("undo");
        assert_eq!(fx.timeline.clip(clip).and_then(Clip::layer), Some(fx.layer));
    }

    #[test]
    fn test_move_clip_to_layer() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(40, 0, 10);
        let lower = fx.timeline.add_layer("lower");

        fx.timeline.move_clip_to_layer(clip, lower).expect("move");
        assert_eq!(fx.timeline.clip(clip).and_then(Clip::layer), Some(lower));
        assert_eq!(fx.times(clip), (40, 0, 10));
        assert!(fx.timeline.can_undo());
    }

    #[test]
    fn test_snapping_in_normal_mode() {
        let mut fx = Fixture::with_config(TimelineConfig {
            snapping_distance: 2,
            ..TimelineConfig::default()
        });
        let a = fx.audio_clip(0, 0, 10);
        let b = fx.audio_clip(50, 0, 10);

        fx.timeline
            .edit_clip(b, EditMode::Normal, Edge::None, &[], 11)
            .expect("move");
        assert_eq!(fx.times(b), (10, 0, 10));
        assert_eq!(fx.times(a), (0, 0, 10));
    }

    #[test]
    fn test_split_clip_partitions_keyframes() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(100, 0, 30);
        let audio = fx.element(clip, TrackType::Audio);
        fx.timeline
            .set_child_parameter(audio, "freq", ParamValue::Double(880.0))
            .expect("set");
        fx.timeline
            .bind_control_track(
                audio,
                "volume::volume",
                KeyframeTrack::new("volume").with_points([(0, 0.0), (10, 1.0), (20, 0.0), (30, 1.0)]),
                BindingKind::DirectAbsolute,
            )
            .expect("bind");

        let tail = fx.timeline.split_clip(clip, 115).expect("split");
        assert_eq!(fx.times(clip), (100, 0, 15));
        assert_eq!(fx.times(tail), (115, 15, 15));
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(2));

        let tail_audio = fx.element(tail, TrackType::Audio);
        assert_eq!(
            fx.points(audio, "volume::volume"),
            vec![
                ControlPoint::new(0, 0.0),
                ControlPoint::new(10, 1.0),
                ControlPoint::new(15, 0.5)
            ]
        );
        assert_eq!(
            fx.points(tail_audio, "volume::volume"),
            vec![
                ControlPoint::new(15, 0.5),
                ControlPoint::new(20, 0.0),
                ControlPoint::new(30, 1.0)
            ]
        );
        assert_eq!(
            fx.timeline
                .element(tail_audio)
                .and_then(|e| e.get_child_parameter("freq").ok()),
            Some(ParamValue::Double(880.0))
        );

        assert!(matches!(fx.timeline.split_clip(clip, 100), Err(TimelineError::InvalidEdit(_))));
    }

    #[test]
    fn test_copy_clip_duplicates_keyframes() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 20);
        let element = fx.element(clip, TrackType::Audio);
        fx.timeline
            .bind_control_track(
                element,
                "freq",
                KeyframeTrack::new("freq").with_points([(0, 0.1), (20, 0.9)]),
                BindingKind::Direct,
            )
            .expect("bind");

        let copy = fx.timeline.copy_clip(clip, fx.layer, 50).expect("copy");
        let copy_element = fx.element(copy, TrackType::Audio);
        assert_eq!(fx.times(copy), (50, 0, 20));
        assert_eq!(fx.points(copy_element, "freq"), fx.points(element, "freq"));
        assert_ne!(copy_element, element);
    }

    #[test]
    fn test_track_restriction_reaches_audio_sources() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(0, 0, 10);
        let audio = fx.element(clip, TrackType::Audio);
        let video = fx.element(clip, TrackType::Video);

        assert!(fx
            .timeline
            .set_track_restriction(fx.audio, Some("audio/x-raw,channels=2".into()))
            .expect("restriction"));
        assert_eq!(
            fx.timeline.element(audio).and_then(TrackElement::restriction),
            Some("audio/x-raw,channels=2")
        );
        assert!(fx
            .timeline
            .set_track_restriction(fx.video, Some("video/x-raw".into()))
            .expect("restriction"));
        assert_eq!(
            fx.timeline
                .element(video)
                .and_then(|e| e.backing())
                .and_then(|b| b.lock().get_parameter(PROP_RESTRICTION)),
            Some(ParamValue::from("ANY"))
        );
    }

    #[test]
    fn test_remove_clip_detaches_elements() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(0, 0, 10);
        fx.timeline.remove_clip(clip).expect("remove");
        assert_eq!(fx.timeline.clips().count(), 0);
        assert_eq!(fx.timeline.elements().count(), 0);
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(0));
        assert!(matches!(
            fx.timeline.remove_clip(clip),
            Err(TimelineError::ClipNotFound(_))
        ));
    }

    #[test]
    fn test_remove_clip_while_scheduled_fails() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 10);
        let element = fx.element(clip, TrackType::Audio);
        fx.factory.set_async(true);
        if let Some(backing) = fx.timeline.element(element).and_then(|e| e.backing()) {
            backing.lock().set_state(BackingState::Playing).expect("state");
        }

        assert!(matches!(
            fx.timeline.remove_clip(clip),
            Err(TimelineError::Element(ElementError::StillScheduled))
        ));
        assert!(fx.timeline.clip(clip).is_some());
    }

    #[test]
    fn test_remove_layer_moves_lower_layers_up() {
        let mut fx = Fixture::new();
        let lower = fx.timeline.add_layer("lower");
        let clip = fx
            .timeline
            .add_clip(
                lower,
                "tone",
                Interval::new(0, 0, 10),
                vec![ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 }],
            )
            .expect("add");
        fx.audio_clip(0, 0, 10);

        fx.timeline.remove_layer(fx.layer).expect("remove");
        assert_eq!(fx.timeline.layers().len(), 1);
        assert_eq!(fx.timeline.layer(lower).map(Layer::priority), Some(0));
        let element = fx.element(clip, TrackType::Audio);
        assert_eq!(
            fx.timeline.element(element).map(|e| e.interval().priority()),
            Some(MIN_PRIORITY)
        );
    }

    #[test]
    fn test_sync_controlled_parameters_at_position() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(100, 0, 20);
        let element = fx.element(clip, TrackType::Audio);
        fx.timeline
            .bind_control_track(
                element,
                "freq",
                KeyframeTrack::new("freq").with_points([(0, 100.0), (20, 300.0)]),
                BindingKind::DirectAbsolute,
            )
            .expect("bind");

        assert_eq!(fx.timeline.sync_controlled_parameters(50).expect("sync"), 0);
        assert_eq!(fx.timeline.sync_controlled_parameters(110).expect("sync"), 1);
        assert_eq!(
            fx.timeline
                .element(element)
                .and_then(|e| e.get_child_parameter("freq").ok()),
            Some(ParamValue::Double(200.0))
        );
    }


    #[test]
    fn test_failed_split_and_copy_change_nothing() {
        let factory = Arc::new(FaultyFactory::default());
        let mut timeline = Timeline::new(factory.clone());
        let audio = timeline.add_track(Track::new("audio", TrackType::Audio));
        let layer = timeline.add_layer("main");
        let clip = timeline
            .add_clip(
                layer,
                "tone",
                Interval::new(0, 0, 30),
                vec![ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 }],
            )
            .expect("add clip");
        let element = timeline.clip(clip).map(|c| c.elements()[0]).expect("child");
        timeline
            .bind_control_track(
                element,
                "volume::volume",
                KeyframeTrack::new("volume").with_points([(0, 0.0), (10, 1.0), (20, 0.0), (30, 1.0)]),
                BindingKind::DirectAbsolute,
            )
            .expect("bind");
        let before = timeline.element(element).map(TrackElement::state);

        factory.faults.unreadable.store(true, Ordering::SeqCst);
        assert!(matches!(
            timeline.split_clip(clip, 15),
            Err(TimelineError::Element(ElementError::UnknownParameter(_)))
        ));
        assert!(matches!(
            timeline.copy_clip(clip, layer, 40),
            Err(TimelineError::Element(ElementError::UnknownParameter(_)))
        ));

        assert_eq!(timeline.clips().count(), 1);
        assert_eq!(timeline.elements().count(), 1);
        assert_eq!(timeline.track(audio).map(Track::len), Some(1));
        assert_eq!(timeline.clip(clip).map(|c| c.interval().duration()), Some(30));
        assert_eq!(timeline.element(element).map(TrackElement::state), before);

        factory.faults.unreadable.store(false, Ordering::SeqCst);
        let tail = timeline.split_clip(clip, 15).expect("split");
        assert_eq!(timeline.clip_elements(tail).len(), 1);
        assert_eq!(timeline.track(audio).map(Track::len), Some(2));
    }

    #[test]
    fn test_element_changes_go_through_timeline() {
        let mut fx = Fixture::new();
        let clip = fx.audio_clip(0, 0, 20);
        let element = fx.element(clip, TrackType::Audio);
        let events = fx.timeline.subscribe();

        let unknown = ElementId::new();
        assert!(matches!(
            fx.timeline.set_child_parameter(unknown, "freq", ParamValue::Double(1.0)),
            Err(TimelineError::NotInTimeline)
        ));
        assert!(matches!(
            fx.timeline.unbind_control_track(unknown, "freq"),
            Err(TimelineError::NotInTimeline)
        ));
        assert!(matches!(
            fx.timeline.set_child_parameter(element, "pitch", ParamValue::Double(1.0)),
            Err(TimelineError::Element(ElementError::UnknownParameter(_)))
        ));

        fx.timeline
            .bind_control_track(
                element,
                "freq",
                KeyframeTrack::new("freq").with_points([(0, 0.0), (20, 1.0)]),
                BindingKind::Direct,
            )
            .expect("bind");
        assert!(fx.timeline.set_element_active(element, false).expect("active"));
        assert!(!fx.timeline.set_element_active(element, false).expect("active"));
        assert!(fx.timeline.unbind_control_track(element, "freq").expect("unbind"));
        assert!(!fx.timeline.unbind_control_track(element, "freq").expect("unbind"));

        let property = "audiotestsrc::freq".to_string();
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                TimelineEvent::ControlBindingAdded { element, property: property.clone() },
                TimelineEvent::ActiveChanged { element, active: false },
                TimelineEvent::ControlBindingRemoved { element, property },
            ]
        );

        fx.timeline
            .edit_clip(clip, EditMode::Trim, Edge::End, &[], 10)
            .expect("trim");
        assert_eq!(
            fx.timeline.element(element).map(|e| e.interval().duration()),
            Some(10)
        );
        assert_eq!(fx.timeline.track(fx.audio).map(Track::len), Some(1));
    }

    #[test]
    fn test_remove_is_all_or_nothing() {
        let mut fx = Fixture::new();
        let clip = fx.av_clip(0, 0, 10);
        let audio = fx.element(clip, TrackType::Audio);
        let video = fx.element(clip, TrackType::Video);
        fx.factory.set_async(true);
        let backing = fx.timeline.element(audio).and_then(|e| e.backing()).cloned();
        if let Some(backing) = &backing {
            backing.lock().set_state(BackingState::Playing).expect("state");
        }

        assert!(matches!(
            fx.timeline.remove_clip(clip),
            Err(TimelineError::Element(ElementError::StillScheduled))
        ));
        assert!(matches!(
            fx.timeline.remove_layer(fx.layer),
            Err(TimelineError::Element(ElementError::StillScheduled))
        ));
        assert_eq!(fx.timeline.layers().len(), 1);
        assert!(fx.timeline.clip(clip).is_some());
        for (element, track) in [(audio, fx.audio), (video, fx.video)] {
            assert!(fx.timeline.element(element).is_some_and(TrackElement::is_attached));
            assert_eq!(fx.timeline.track(track).map(Track::len), Some(1));
        }

        fx.factory.set_async(false);
        if let Some(backing) = &backing {
            backing.lock().set_state(BackingState::Null).expect("state");
        }
        fx.timeline.remove_layer(fx.layer).expect("remove");
        assert_eq!(fx.timeline.elements().count(), 0);
        assert_eq!(fx.timeline.track(fx.video).map(Track::len), Some(0));
    }

    #[test]
    fn test_release_survives_refused_state_change() {
        let factory = FaultyFactory::default();
        let track = Track::new("audio", TrackType::Audio);
        let mut element = TrackElement::new(
            ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 },
            Interval::new(0, 0, 10),
        );
        element.attach_to_track(&track, &factory).expect("attach");
        factory.inner.set_async(true);
        if let Some(backing) = element.backing() {
            backing.lock().set_state(BackingState::Playing).expect("state");
        }
        factory.faults.stuck.store(true, Ordering::SeqCst);

        assert!(element.is_transitioning());
        assert!(matches!(element.detach(), Err(ElementError::StillScheduled)));
        element.release();
        assert!(!element.is_attached());
        assert_eq!(element.track(), None);
    }

    #[test]
    fn test_dropping_timeline_releases_attached_elements() {
        let mut fx = Fixture::new();
        fx.av_clip(0, 0, 10);
        drop(fx);
    }
}
