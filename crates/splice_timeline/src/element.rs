// SPDX-License-Identifier: MIT OR Apache-2.0
//! Track elements: positioned units of media processing.
//!
//! A [`TrackElement`] is created detached. Attaching it to a [`Track`]
//! builds its backing object through a [`BackingFactory`]; from then on
//! every interval, activity and child-parameter change is pushed to that
//! object. Keyframe tracks bound to child parameters are re-anchored
//! whenever the element's inpoint or duration changes.
//!
//! An element must be detached before it is dropped. Dropping an attached
//! element panics.

use crate::backing::{
    BackingError, BackingFactory, BackingHandle, BackingState, ParamValue, ParameterSpec,
    StateChangeReturn, PROP_ACTIVE, PROP_DURATION, PROP_INPOINT, PROP_PRIORITY,
    PROP_RESTRICTION, PROP_START,
};
use crate::binding::{BindingKind, ControlBinding};
use crate::clip::ClipId;
use crate::events::{EventBus, TimelineEvent};
use crate::interval::{ClockTime, Interval};
use crate::keyframe::KeyframeTrack;
use crate::kind::ElementKind;
use crate::layer::Layer;
use crate::track::{Track, TrackId, TrackType};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a track element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub Uuid);

impl ElementId {
    /// Create a new random element ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track element errors
#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    /// The element has no backing object
    #[error("Element is not attached to a track")]
    NotAttached,

    /// The element already has a backing object
    #[error("Element is already attached to a track")]
    AlreadyAttached,

    /// The factory could not build a backing object
    #[error("Could not create backing object: {0}")]
    BackingCreation(#[source] BackingError),

    /// The backing object has not settled to an idle state
    #[error("Backing object is still scheduled")]
    StillScheduled,

    /// No (controllable) child parameter with that name
    #[error("Unknown child parameter: {0}")]
    UnknownParameter(String),

    /// The backing object refused an operation
    #[error("Backing error: {0}")]
    Backing(#[from] BackingError),
}

/// Result type for element operations
pub type Result<T> = std::result::Result<T, ElementError>;

/// Interval and automation of an element, as stored in history snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    /// Element
    pub element: ElementId,
    /// Interval at snapshot time
    pub interval: Interval,
    /// Bindings at snapshot time
    pub bindings: Vec<ControlBinding>,
}

/// A positioned unit of media processing bound to at most one track
pub struct TrackElement {
    id: ElementId,
    kind: ElementKind,
    interval: Interval,
    active: bool,
    track: Option<TrackId>,
    clip: Option<ClipId>,
    backing: Option<BackingHandle>,
    children: Vec<ParameterSpec>,
    bindings: IndexMap<String, ControlBinding>,
    /// Explicitly written child values, by qualified name
    overrides: IndexMap<String, ParamValue>,
    restriction: Option<String>,
    events: EventBus,
}

impl fmt::Debug for TrackElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackElement")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("interval", &self.interval)
            .field("active", &self.active)
            .field("track", &self.track)
            .field("attached", &self.backing.is_some())
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TrackElement {
    /// Create a detached, active element
    pub fn new(kind: ElementKind, interval: Interval) -> Self {
        Self {
            id: ElementId::new(),
            kind,
            interval,
            active: true,
            track: None,
            clip: None,
            backing: None,
            children: Vec::new(),
            bindings: IndexMap::new(),
            overrides: IndexMap::new(),
            restriction: None,
            events: EventBus::new(),
        }
    }

    /// Publish notifications on `events` instead of a private bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Unique element ID
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Element kind
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Media type
    pub fn track_type(&self) -> TrackType {
        self.kind.track_type()
    }

    /// Current interval
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Whether the element is used by its track
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Track the element is attached to
    pub fn track(&self) -> Option<TrackId> {
        self.track
    }

    /// Clip the element belongs to
    pub fn clip(&self) -> Option<ClipId> {
        self.clip
    }

    /// Whether a backing object exists
    pub fn is_attached(&self) -> bool {
        self.backing.is_some()
    }

    /// Backing object handle, while attached
    pub fn backing(&self) -> Option<&BackingHandle> {
        self.backing.as_ref()
    }

    /// Restriction last received from the track
    pub fn restriction(&self) -> Option<&str> {
        self.restriction.as_deref()
    }

    /// Event bus notifications are published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn set_clip(&mut self, clip: Option<ClipId>) {
        self.clip = clip;
    }

    fn backing_or_err(&self) -> Result<&BackingHandle> {
        self.backing.as_ref().ok_or(ElementError::NotAttached)
    }

    fn push(&self, name: &str, value: ParamValue) {
        if let Some(backing) = &self.backing {
            if let Err(error) = backing.lock().set_parameter(name, value) {
                tracing::warn!(element = %self.id, property = name, %error, "push failed");
            }
        }
    }

    fn push_interval(&self) {
        self.push(PROP_START, ParamValue::UInt(self.interval.start()));
        self.push(PROP_INPOINT, ParamValue::UInt(self.interval.inpoint()));
        self.push(PROP_DURATION, ParamValue::UInt(self.interval.duration()));
        self.push(PROP_PRIORITY, ParamValue::UInt(u64::from(self.interval.priority())));
    }

    fn resync_bindings(&mut self, duration: Option<ClockTime>) {
        let inpoint = self.interval.inpoint();
        for binding in self.bindings.values_mut() {
            binding.track.resync_to_interval(inpoint, duration);
        }
    }

    // -- Interval --------------------------------------------------------

    /// Move the element on the timeline
    pub fn set_start(&mut self, start: ClockTime) -> Result<bool> {
        self.backing_or_err()?;
        if !self.interval.set_start(start) {
            return Ok(false);
        }
        self.push(PROP_START, ParamValue::UInt(start));
        Ok(true)
    }

    /// Change the media offset. Bound keyframe tracks are re-anchored on
    /// the new inpoint.
    pub fn set_inpoint(&mut self, inpoint: ClockTime) -> Result<bool> {
        self.backing_or_err()?;
        if !self.interval.set_inpoint(inpoint) {
            return Ok(false);
        }
        self.resync_bindings(None);
        self.push(PROP_INPOINT, ParamValue::UInt(inpoint));
        Ok(true)
    }

    /// Change the length, clamped to the media ceiling. Bound keyframe
    /// tracks are re-anchored on `[inpoint, inpoint + duration]`.
    pub fn set_duration(&mut self, duration: ClockTime) -> Result<bool> {
        self.backing_or_err()?;
        if !self.interval.set_duration(duration) {
            return Ok(false);
        }
        let duration = self.interval.duration();
        self.resync_bindings(Some(duration));
        self.push(PROP_DURATION, ParamValue::UInt(duration));
        Ok(true)
    }

    /// Change the stacking priority, clamped to the floor
    pub fn set_priority(&mut self, priority: u32) -> Result<bool> {
        self.backing_or_err()?;
        if !self.interval.set_priority(priority) {
            return Ok(false);
        }
        self.push(PROP_PRIORITY, ParamValue::UInt(u64::from(self.interval.priority())));
        Ok(true)
    }

    /// Set or clear the media ceiling
    pub fn set_max_duration(&mut self, max_duration: Option<ClockTime>) -> bool {
        let before = self.interval.duration();
        if !self.interval.set_max_duration(max_duration) {
            return false;
        }
        if self.interval.duration() != before {
            let duration = self.interval.duration();
            self.resync_bindings(Some(duration));
            self.push(PROP_DURATION, ParamValue::UInt(duration));
        }
        true
    }

    /// Replace the whole interval, attached or not. Used by timeline edits,
    /// which validate the values beforehand.
    pub(crate) fn apply_interval(&mut self, interval: Interval) {
        let inpoint_changed = interval.inpoint() != self.interval.inpoint();
        let duration_changed = interval.duration() != self.interval.duration();
        if interval == self.interval {
            return;
        }

        self.interval = interval;
        if inpoint_changed {
            self.resync_bindings(None);
        }
        if inpoint_changed || duration_changed {
            self.resync_bindings(Some(interval.duration()));
        }
        self.push_interval();
    }

    // -- Lifecycle -------------------------------------------------------

    /// Build the backing object and attach the element to `track`
    pub fn attach_to_track(&mut self, track: &Track, factory: &dyn BackingFactory) -> Result<()> {
        if self.backing.is_some() {
            return Err(ElementError::AlreadyAttached);
        }

        let mut object = factory
            .create(&self.kind, &self.interval, self.active)
            .map_err(ElementError::BackingCreation)?;

        if self.children.is_empty() {
            let filter = self.kind.parameter_filter();
            self.children = object
                .introspect_parameters()
                .into_iter()
                .filter(|spec| filter.accepts(spec))
                .collect();
        }

        for (name, value) in &self.overrides {
            if let Err(error) = object.set_parameter(name, value.clone()) {
                tracing::warn!(element = %self.id, property = %name, %error, "could not restore child value");
            }
        }

        self.backing = Some(Arc::new(Mutex::new(object)));
        self.track = Some(track.id);
        self.restriction = None;
        if self.kind.follows_restriction() {
            self.on_restriction_changed(track.restriction());
        }

        tracing::debug!(element = %self.id, track = ?track.id, kind = self.kind.name(), "attached");
        Ok(())
    }

    /// Release the backing object. A running object is first brought back
    /// to `Null`; if that does not complete synchronously the element stays
    /// attached.
    pub fn detach(&mut self) -> Result<()> {
        let backing = self.backing_or_err()?;
        {
            let mut object = backing.lock();
            if let Some(pending) = object.pending_state() {
                tracing::warn!(element = %self.id, ?pending, "detach during state change");
                return Err(ElementError::StillScheduled);
            }
            if !object.current_state().is_idle()
                && object.set_state(BackingState::Null)? == StateChangeReturn::Async
            {
                tracing::warn!(element = %self.id, "backing object did not settle");
                return Err(ElementError::StillScheduled);
            }
        }

        self.backing = None;
        self.track = None;
        self.restriction = None;
        tracing::debug!(element = %self.id, "detached");
        Ok(())
    }

    /// Whether the backing object is between two states. Such an element
    /// cannot be detached.
    pub fn is_transitioning(&self) -> bool {
        self.backing
            .as_ref()
            .is_some_and(|backing| backing.lock().pending_state().is_some())
    }

    /// Drop the backing object whatever its state
    pub(crate) fn release(&mut self) {
        if let Some(backing) = self.backing.take() {
            if let Err(error) = backing.lock().set_state(BackingState::Null) {
                tracing::warn!(element = %self.id, %error, "backing object released without stopping");
            }
        }
        self.track = None;
    }

    /// Switch the element on or off
    pub fn set_active(&mut self, active: bool) -> Result<bool> {
        self.backing_or_err()?;
        if active == self.active {
            return Ok(false);
        }
        self.active = active;
        self.push(PROP_ACTIVE, ParamValue::Bool(active));
        self.events.publish(TimelineEvent::ActiveChanged {
            element: self.id,
            active,
        });
        Ok(true)
    }

    // -- Child parameters ------------------------------------------------

    /// Registered child parameters
    pub fn child_parameters(&self) -> &[ParameterSpec] {
        &self.children
    }

    /// Look up a child parameter by `name` or `owner::name`
    pub fn lookup_child(&self, name: &str) -> Result<&ParameterSpec> {
        self.children
            .iter()
            .find(|spec| spec.matches(name))
            .ok_or_else(|| ElementError::UnknownParameter(name.to_string()))
    }

    /// Whether the child parameter was explicitly written
    pub fn is_overridden(&self, name: &str) -> bool {
        self.lookup_child(name)
            .is_ok_and(|spec| self.overrides.contains_key(&spec.qualified_name()))
    }

    /// Write a child parameter. The value then wins over layer defaults.
    pub fn set_child_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let key = self.lookup_child(name)?.qualified_name();
        self.write_child(key, value, true)
    }

    pub(crate) fn write_child(&mut self, key: String, value: ParamValue, explicit: bool) -> Result<()> {
        self.backing_or_err()?.lock().set_parameter(&key, value.clone())?;
        if explicit {
            self.overrides.insert(key, value);
        }
        Ok(())
    }

    /// Read a child parameter
    pub fn get_child_parameter(&self, name: &str) -> Result<ParamValue> {
        let key = self.lookup_child(name)?.qualified_name();
        self.backing_or_err()?
            .lock()
            .get_parameter(&key)
            .ok_or(ElementError::UnknownParameter(key))
    }

    /// Push the layer's metadata to the parameters following it, except
    /// those written explicitly
    pub fn sync_layer_defaults(&self, layer: &Layer) {
        for (meta, parameter) in self.kind.layer_defaults() {
            if self.overrides.contains_key(*parameter) {
                continue;
            }
            if let Some(value) = layer.resolve_default(meta) {
                tracing::trace!(element = %self.id, %meta, %value, "layer default");
                self.push(parameter, value.clone());
            }
        }
    }

    /// Follow a new track restriction
    pub fn on_restriction_changed(&mut self, restriction: Option<&str>) {
        if !self.kind.follows_restriction() {
            return;
        }
        self.restriction = restriction.map(str::to_string);
        self.push(PROP_RESTRICTION, restriction.unwrap_or("ANY").into());
    }

    // -- Control bindings ------------------------------------------------

    /// Drive the child parameter `name` with `track`, replacing any
    /// existing binding
    pub fn bind_control_track(
        &mut self,
        name: &str,
        track: KeyframeTrack,
        kind: BindingKind,
    ) -> Result<()> {
        let spec = self.lookup_child(name)?;
        if !spec.is_controllable() {
            return Err(ElementError::UnknownParameter(name.to_string()));
        }
        let key = spec.qualified_name();

        let binding = ControlBinding::new(key.clone(), kind, track);
        if self.bindings.insert(key.clone(), binding).is_some() {
            self.events.publish(TimelineEvent::ControlBindingRemoved {
                element: self.id,
                property: key.clone(),
            });
        }
        tracing::debug!(element = %self.id, property = %key, %kind, "binding added");
        self.events.publish(TimelineEvent::ControlBindingAdded {
            element: self.id,
            property: key,
        });
        Ok(())
    }

    /// Remove the binding of `name`. Returns whether one existed.
    pub fn unbind_control_track(&mut self, name: &str) -> bool {
        let key = self
            .lookup_child(name)
            .map(ParameterSpec::qualified_name)
            .unwrap_or_else(|_| name.to_string());
        if self.bindings.shift_remove(&key).is_none() {
            return false;
        }
        tracing::debug!(element = %self.id, property = %key, "binding removed");
        self.events.publish(TimelineEvent::ControlBindingRemoved {
            element: self.id,
            property: key,
        });
        true
    }

    /// Binding of `name`
    pub fn control_binding(&self, name: &str) -> Option<&ControlBinding> {
        match self.lookup_child(name) {
            Ok(spec) => self.bindings.get(&spec.qualified_name()),
            Err(_) => self.bindings.get(name),
        }
    }

    /// Mutable binding of `name`, for keyframe editing
    pub fn control_binding_mut(&mut self, name: &str) -> Option<&mut ControlBinding> {
        let key = self
            .lookup_child(name)
            .map(ParameterSpec::qualified_name)
            .unwrap_or_else(|_| name.to_string());
        self.bindings.get_mut(&key)
    }

    /// All bindings, in binding order
    pub fn control_bindings(&self) -> impl Iterator<Item = &ControlBinding> {
        self.bindings.values()
    }

    pub(crate) fn control_bindings_mut(&mut self) -> impl Iterator<Item = &mut ControlBinding> {
        self.bindings.values_mut()
    }

    /// Push every bound value at timeline `position` to the backing object.
    /// Returns the number of parameters written.
    pub fn sync_controlled_parameters(&self, position: ClockTime) -> Result<usize> {
        let backing = self.backing_or_err()?;
        let media_position = self.interval.to_media_time(position);
        let mut object = backing.lock();
        let mut written = 0;
        for (key, binding) in &self.bindings {
            let Some(spec) = self.children.iter().find(|spec| spec.matches(key)) else {
                continue;
            };
            if let Some(value) = binding.parameter_value(media_position, spec) {
                object.set_parameter(key, value)?;
                written += 1;
            }
        }
        Ok(written)
    }

    // -- Snapshots -------------------------------------------------------

    /// Interval and bindings, for history
    pub fn state(&self) -> ElementState {
        ElementState {
            element: self.id,
            interval: self.interval,
            bindings: self.bindings.values().cloned().collect(),
        }
    }

    /// Restore a previous state verbatim, without re-anchoring keyframes
    pub(crate) fn restore(&mut self, state: ElementState) {
        self.interval = state.interval;
        self.bindings = state
            .bindings
            .into_iter()
            .map(|binding| (binding.property.clone(), binding))
            .collect();
        self.push_interval();
    }
}

impl Drop for TrackElement {
    fn drop(&mut self) {
        if self.backing.is_some() && !std::thread::panicking() {
            panic!(
                "track element {} dropped while still attached to a track; detach it first",
                self.id
            );
        }
        self.bindings.clear();
        self.backing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::ControlPoint;
    use crate::simulated::SimulatedFactory;

    fn tone() -> ElementKind {
        ElementKind::AudioTestSource { freq: 440.0, volume: 0.8 }
    }

    fn attached(kind: ElementKind, interval: Interval) -> (TrackElement, Track, SimulatedFactory) {
        let factory = SimulatedFactory::new();
        let track = Track::new("track", kind.track_type());
        let mut element = TrackElement::new(kind, interval);
        element.attach_to_track(&track, &factory).expect("attach");
        (element, track, factory)
    }

    fn backing_value(element: &TrackElement, name: &str) -> Option<ParamValue> {
        element.backing().and_then(|b| b.lock().get_parameter(name))
    }

    #[test]
    fn test_setters_require_backing() {
        let mut element = TrackElement::new(tone(), Interval::new(0, 0, 10));
        assert!(matches!(element.set_start(5), Err(ElementError::NotAttached)));
        assert!(matches!(element.set_inpoint(5), Err(ElementError::NotAttached)));
        assert!(matches!(element.set_duration(5), Err(ElementError::NotAttached)));
        assert!(matches!(element.set_priority(5), Err(ElementError::NotAttached)));
        assert!(matches!(element.set_active(false), Err(ElementError::NotAttached)));
        assert!(matches!(element.detach(), Err(ElementError::NotAttached)));
    }

    #[test]
    fn test_setters_push_to_backing() {
        let (mut element, _track, _factory) = attached(tone(), Interval::new(0, 0, 10));

        assert!(element.set_start(5).expect("start"));
        assert!(!element.set_start(5).expect("start"));
        assert!(!element.set_priority(0).expect("priority"));
        assert!(element.set_priority(7).expect("priority"));
        assert!(element.set_priority(0).expect("priority"));
        assert_eq!(element.interval().priority(), 1);

        assert_eq!(backing_value(&element, PROP_START), Some(ParamValue::UInt(5)));
        assert_eq!(backing_value(&element, PROP_PRIORITY), Some(ParamValue::UInt(1)));
        element.detach().expect("detach");
    }

    #[test]
    fn test_attach_twice_fails() {
        let (mut element, track, factory) = attached(tone(), Interval::default());
        assert!(matches!(
            element.attach_to_track(&track, &factory),
            Err(ElementError::AlreadyAttached)
        ));
        assert_eq!(element.track(), Some(track.id));
        element.detach().expect("detach");
        assert_eq!(element.track(), None);
    }

    #[test]
    fn test_backing_creation_failure() {
        let factory = SimulatedFactory::new().failing_on("AudioTestSource");
        let track = Track::new("audio", TrackType::Audio);
        let mut element = TrackElement::new(tone(), Interval::default());
        assert!(matches!(
            element.attach_to_track(&track, &factory),
            Err(ElementError::BackingCreation(_))
        ));
        assert!(!element.is_attached());
    }

    #[test]
    fn test_detach_mid_transition_keeps_state() {
        let (mut element, _track, factory) = attached(tone(), Interval::new(0, 0, 20));
        element
            .bind_control_track(
                "freq",
                KeyframeTrack::new("freq").with_points([(0, 0.0), (20, 1.0)]),
                BindingKind::Direct,
            )
            .expect("bind");

        factory.set_async(true);
        if let Some(backing) = element.backing() {
            backing.lock().set_state(BackingState::Playing).expect("state");
        }
        let interval = *element.interval();
        let bindings = element.state().bindings;

        assert!(matches!(element.detach(), Err(ElementError::StillScheduled)));
        assert!(element.is_attached());
        assert_eq!(*element.interval(), interval);
        assert_eq!(element.state().bindings, bindings);

        factory.set_async(false);
        if let Some(backing) = element.backing() {
            backing.lock().set_state(BackingState::Null).expect("state");
        }
        element.detach().expect("detach");
    }

    #[test]
    fn test_detach_stops_running_backing() {
        let (mut element, _track, _factory) = attached(tone(), Interval::default());
        if let Some(backing) = element.backing() {
            backing.lock().set_state(BackingState::Playing).expect("state");
        }
        element.detach().expect("detach");
        assert!(!element.is_attached());
    }

    #[test]
    #[should_panic(expected = "still attached")]
    fn test_drop_while_attached_panics() {
        let (element, _track, _factory) = attached(tone(), Interval::default());
        drop(element);
    }

    #[test]
    fn test_active_change_notifies() {
        let (mut element, _track, _factory) = attached(tone(), Interval::default());
        let events = element.events().subscribe();

        assert!(!element.set_active(true).expect("active"));
        assert!(element.set_active(false).expect("active"));
        assert_eq!(backing_value(&element, PROP_ACTIVE), Some(ParamValue::Bool(false)));
        assert_eq!(
            events.try_recv().ok(),
            Some(TimelineEvent::ActiveChanged {
                element: element.id(),
                active: false
            })
        );
        assert!(events.try_recv().is_err());
        element.detach().expect("detach");
    }

    #[test]
    fn test_child_parameter_table_is_filtered() {
        let (mut element, _track, _factory) = attached(tone(), Interval::default());
        let names: Vec<_> = element
            .child_parameters()
            .iter()
            .map(ParameterSpec::qualified_name)
            .collect();
        assert_eq!(
            names,
            ["audiotestsrc::freq", "audiotestsrc::volume", "volume::volume", "volume::mute"]
        );

        element
            .set_child_parameter("volume::volume", ParamValue::Double(2.0))
            .expect("set");
        assert_eq!(
            element.get_child_parameter("volume::volume").expect("get"),
            ParamValue::Double(2.0)
        );
        assert_eq!(
            element.get_child_parameter("volume").expect("get"),
            ParamValue::Double(0.8)
        );
        assert!(element.is_overridden("volume::volume"));
        assert!(matches!(
            element.get_child_parameter("wave"),
            Err(ElementError::UnknownParameter(_))
        ));
        element.detach().expect("detach");
    }

    #[test]
    fn test_effect_children_come_from_effect_category() {
        let kind = ElementKind::Effect {
            description: "solarize threshold=3".into(),
            track_type: TrackType::Video,
        };
        let (mut element, _track, _factory) = attached(kind, Interval::default());
        let owners: Vec<_> = element.child_parameters().iter().map(|s| s.owner.as_str()).collect();
        assert_eq!(owners, ["solarize", "solarize"]);
        element.detach().expect("detach");
    }

    #[test]
    fn test_bind_replaces_and_notifies() {
        let (mut element, _track, _factory) = attached(tone(), Interval::new(0, 0, 10));
        let events = element.events().subscribe();

        let track = KeyframeTrack::new("freq").with_points([(0, 0.0)]);
        element
            .bind_control_track("freq", track.clone(), BindingKind::Direct)
            .expect("bind");
        element
            .bind_control_track("audiotestsrc::freq", track, BindingKind::DirectAbsolute)
            .expect("bind");

        let received: Vec<_> = events.try_iter().collect();
        let property = "audiotestsrc::freq".to_string();
        assert_eq!(
            received,
            vec![
                TimelineEvent::ControlBindingAdded { element: element.id(), property: property.clone() },
                TimelineEvent::ControlBindingRemoved { element: element.id(), property: property.clone() },
                TimelineEvent::ControlBindingAdded { element: element.id(), property },
            ]
        );
        assert_eq!(element.control_bindings().count(), 1);
        assert_eq!(
            element.control_binding("freq").map(|b| b.kind),
            Some(BindingKind::DirectAbsolute)
        );

        assert!(element.unbind_control_track("freq"));
        assert!(!element.unbind_control_track("freq"));
        element.detach().expect("detach");
    }

    #[test]
    fn test_bind_unknown_parameter_fails() {
        let kind = ElementKind::AudioSource { uri: "file:///a.ogg".into() };
        let (mut element, _track, _factory) = attached(kind, Interval::default());
        assert!(matches!(
            element.bind_control_track("uri", KeyframeTrack::new("uri"), BindingKind::Direct),
            Err(ElementError::UnknownParameter(_))
        ));
        assert!(matches!(
            element.bind_control_track("pitch", KeyframeTrack::new("pitch"), BindingKind::Direct),
            Err(ElementError::UnknownParameter(_))
        ));
        element.detach().expect("detach");
    }

    #[test]
    fn test_trims_resync_bindings() {
        let (mut element, _track, _factory) = attached(tone(), Interval::new(0, 0, 20));
        element
            .bind_control_track(
                "volume::volume",
                KeyframeTrack::new("volume").with_points([(0, 0.0), (10, 1.0), (20, 0.0)]),
                BindingKind::DirectAbsolute,
            )
            .expect("bind");

        element.set_inpoint(5).expect("inpoint");
        element.set_duration(10).expect("duration");

        let points = element
            .control_binding("volume::volume")
            .map(|b| b.track.points().to_vec())
            .unwrap_or_default();
        assert_eq!(
            points,
            vec![
                ControlPoint::new(5, 0.5),
                ControlPoint::new(10, 1.0),
                ControlPoint::new(15, 0.5)
            ]
        );
        element.detach().expect("detach");
    }

    #[test]
    fn test_sync_controlled_parameters() {
        let (mut element, _track, _factory) = attached(tone(), Interval::new(100, 0, 20));
        element
            .bind_control_track(
                "volume::volume",
                KeyframeTrack::new("volume").with_points([(0, 0.0), (20, 1.0)]),
                BindingKind::Direct,
            )
            .expect("bind");

        assert_eq!(element.sync_controlled_parameters(110).expect("sync"), 1);
        assert_eq!(
            backing_value(&element, "volume::volume"),
            Some(ParamValue::Double(5.0))
        );
        element.detach().expect("detach");
    }

    #[test]
    fn test_restriction_followed_by_audio_sources() {
        let factory = SimulatedFactory::new();
        let track = Track::new("audio", TrackType::Audio).with_restriction("audio/x-raw,rate=48000");
        let mut element = TrackElement::new(tone(), Interval::default());
        element.attach_to_track(&track, &factory).expect("attach");

        assert_eq!(element.restriction(), Some("audio/x-raw,rate=48000"));
        assert_eq!(
            backing_value(&element, PROP_RESTRICTION),
            Some(ParamValue::from("audio/x-raw,rate=48000"))
        );
        element.on_restriction_changed(None);
        assert_eq!(backing_value(&element, PROP_RESTRICTION), Some(ParamValue::from("ANY")));
        element.detach().expect("detach");
    }

    #[test]
    fn test_overrides_survive_reattach() {
        let (mut element, track, factory) = attached(tone(), Interval::default());
        element
            .set_child_parameter("mute", ParamValue::Bool(true))
            .expect("set");
        element.detach().expect("detach");

        element.attach_to_track(&track, &factory).expect("attach");
        assert_eq!(
            element.get_child_parameter("mute").expect("get"),
            ParamValue::Bool(true)
        );
        element.detach().expect("detach");
    }
}
