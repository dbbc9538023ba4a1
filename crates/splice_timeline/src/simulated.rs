// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory backing engine.
//!
//! [`SimulatedFactory`] produces [`SimulatedBacking`] objects that expose a
//! realistic parameter catalog per element kind, check value types and
//! model asynchronous state changes. It backs the session runner and the
//! test suites.

use crate::backing::{
    BackingError, BackingFactory, BackingObject, BackingState, ParamValue, ParameterSpec,
    StateChangeReturn, PROP_ACTIVE, PROP_DURATION, PROP_INPOINT, PROP_PRIORITY,
    PROP_RESTRICTION, PROP_START,
};
use crate::interval::Interval;
use crate::kind::ElementKind;
use crate::track::TrackType;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const CONTAINER_PROPS: [&str; 6] = [
    PROP_START,
    PROP_INPOINT,
    PROP_DURATION,
    PROP_PRIORITY,
    PROP_ACTIVE,
    PROP_RESTRICTION,
];

fn media_suffix(track_type: TrackType) -> &'static str {
    match track_type {
        TrackType::Audio => "Audio",
        TrackType::Video => "Video",
        TrackType::Unknown => "Generic",
    }
}

fn audio_chain(specs: &mut Vec<ParameterSpec>) {
    specs.push(
        ParameterSpec::new("volume", "volume", "Filter/Effect/Audio", ParamValue::Double(1.0))
            .with_range(0.0, 10.0),
    );
    specs.push(ParameterSpec::new("mute", "volume", "Filter/Effect/Audio", ParamValue::Bool(false)));
    specs.push(ParameterSpec::new(
        "dithering",
        "audioconvert",
        "Filter/Converter/Audio",
        ParamValue::Int(1),
    ));
}

fn video_chain(specs: &mut Vec<ParameterSpec>) {
    specs.push(
        ParameterSpec::new("alpha", "compositor", "Generic/Mixer", ParamValue::Double(1.0))
            .with_range(0.0, 1.0),
    );
    specs.push(ParameterSpec::new("posx", "compositor", "Generic/Mixer", ParamValue::Int(0)));
    specs.push(ParameterSpec::new("posy", "compositor", "Generic/Mixer", ParamValue::Int(0)));
}

/// Parameters exposed by the backing object of `kind`
pub fn catalog(kind: &ElementKind) -> Vec<ParameterSpec> {
    let mut specs = Vec::new();
    match kind {
        ElementKind::AudioTestSource { freq, volume } => {
            specs.push(
                ParameterSpec::new("freq", "audiotestsrc", "Source/Audio", ParamValue::Double(*freq))
                    .with_range(0.0, 20_000.0),
            );
            specs.push(
                ParameterSpec::new("volume", "audiotestsrc", "Source/Audio", ParamValue::Double(*volume))
                    .with_range(0.0, 1.0),
            );
            specs.push(ParameterSpec::new("wave", "audiotestsrc", "Source/Audio", ParamValue::Int(0)));
            audio_chain(&mut specs);
        }
        ElementKind::AudioSource { uri } => {
            specs.push(
                ParameterSpec::new("uri", "uridecodebin", "Generic/Bin/Decoder", uri.as_str().into())
                    .read_only(),
            );
            audio_chain(&mut specs);
        }
        ElementKind::VideoTestSource { pattern } => {
            specs.push(
                ParameterSpec::new("pattern", "videotestsrc", "Source/Video", ParamValue::Int(*pattern))
                    .with_range(0.0, 24.0),
            );
            video_chain(&mut specs);
        }
        ElementKind::VideoSource { uri } => {
            specs.push(
                ParameterSpec::new("uri", "uridecodebin", "Generic/Bin/Decoder", uri.as_str().into())
                    .read_only(),
            );
            video_chain(&mut specs);
        }
        ElementKind::Effect {
            description,
            track_type,
        } => {
            let owner = description.split_whitespace().next().unwrap_or("effect");
            let media = media_suffix(*track_type);
            specs.push(
                ParameterSpec::new("mix", owner, format!("Filter/Effect/{media}"), ParamValue::Double(0.5))
                    .with_range(0.0, 1.0),
            );
            specs.push(ParameterSpec::new(
                "level",
                owner,
                format!("Filter/Effect/{media}"),
                ParamValue::Int(3),
            ));
            let converter = if *track_type == TrackType::Audio {
                "audioconvert"
            } else {
                "videoconvert"
            };
            specs.push(ParameterSpec::new(
                "dither",
                converter,
                format!("Filter/Converter/{media}"),
                ParamValue::Int(0),
            ));
        }
        ElementKind::Transition { .. } => {
            specs.push(ParameterSpec::new(
                "border",
                "transition",
                "Generic/Transition",
                ParamValue::UInt(0),
            ));
            specs.push(ParameterSpec::new(
                "invert",
                "transition",
                "Generic/Transition",
                ParamValue::Bool(false),
            ));
            specs.push(ParameterSpec::new("caps", "capsfilter", "Generic", "ANY".into()));
        }
    }
    specs
}

/// Backing object held entirely in memory
#[derive(Debug)]
pub struct SimulatedBacking {
    name: String,
    specs: Vec<ParameterSpec>,
    values: IndexMap<String, ParamValue>,
    state: BackingState,
    pending: Option<BackingState>,
    async_changes: Arc<AtomicBool>,
}

impl SimulatedBacking {
    fn new(
        name: String,
        kind: &ElementKind,
        interval: &Interval,
        active: bool,
        async_changes: Arc<AtomicBool>,
    ) -> Self {
        let specs = catalog(kind);
        let mut values = IndexMap::new();
        values.insert(PROP_START.to_string(), ParamValue::UInt(interval.start()));
        values.insert(PROP_INPOINT.to_string(), ParamValue::UInt(interval.inpoint()));
        values.insert(PROP_DURATION.to_string(), ParamValue::UInt(interval.duration()));
        values.insert(
            PROP_PRIORITY.to_string(),
            ParamValue::UInt(u64::from(interval.priority())),
        );
        values.insert(PROP_ACTIVE.to_string(), ParamValue::Bool(active));
        values.insert(PROP_RESTRICTION.to_string(), "ANY".into());
        for spec in &specs {
            values.insert(spec.qualified_name(), spec.default.clone());
        }

        Self {
            name,
            specs,
            values,
            state: BackingState::Null,
            pending: None,
            async_changes,
        }
    }

    fn resolve(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|spec| spec.matches(name))
    }
}

impl BackingObject for SimulatedBacking {
    fn name(&self) -> &str {
        &self.name
    }

    fn introspect_parameters(&self) -> Vec<ParameterSpec> {
        self.specs.clone()
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), BackingError> {
        let (key, expected) = if CONTAINER_PROPS.contains(&name) {
            let current = self
                .values
                .get(name)
                .ok_or_else(|| BackingError::NoSuchProperty(name.to_string()))?;
            (name.to_string(), current.clone())
        } else {
            let spec = self
                .resolve(name)
                .ok_or_else(|| BackingError::NoSuchProperty(name.to_string()))?;
            if !spec.writable {
                return Err(BackingError::ReadOnly(spec.qualified_name()));
            }
            (spec.qualified_name(), spec.default.clone())
        };

        if !expected.same_type(&value) {
            return Err(BackingError::TypeMismatch {
                property: key,
                expected: expected.type_name(),
                found: value.type_name(),
            });
        }
        self.values.insert(key, value);
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        if CONTAINER_PROPS.contains(&name) {
            return self.values.get(name).cloned();
        }
        let spec = self.resolve(name)?;
        self.values.get(&spec.qualified_name()).cloned()
    }

    fn current_state(&self) -> BackingState {
        self.state
    }

    fn pending_state(&self) -> Option<BackingState> {
        self.pending
    }

    fn set_state(&mut self, state: BackingState) -> Result<StateChangeReturn, BackingError> {
        if self.async_changes.load(Ordering::SeqCst) {
            self.pending = Some(state);
            return Ok(StateChangeReturn::Async);
        }
        self.state = state;
        self.pending = None;
        Ok(StateChangeReturn::Success)
    }
}

/// Factory for [`SimulatedBacking`] objects
#[derive(Debug, Default)]
pub struct SimulatedFactory {
    failing: Vec<&'static str>,
    async_changes: Arc<AtomicBool>,
    created: AtomicUsize,
}

impl SimulatedFactory {
    /// Create a factory that builds every kind
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to build elements whose kind is named `kind`
    pub fn failing_on(mut self, kind: &'static str) -> Self {
        self.failing.push(kind);
        self
    }

    /// Make state changes of every object, existing or future, complete
    /// asynchronously
    pub fn set_async(&self, async_changes: bool) {
        self.async_changes.store(async_changes, Ordering::SeqCst);
    }

    /// Number of objects built so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl BackingFactory for SimulatedFactory {
    fn create(
        &self,
        kind: &ElementKind,
        interval: &Interval,
        active: bool,
    ) -> Result<Box<dyn BackingObject>, BackingError> {
        if self.failing.contains(&kind.name()) {
            return Err(BackingError::UnknownKind(kind.name().to_string()));
        }
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}{}", kind.backing_kind(), index);
        tracing::trace!(%name, kind = kind.name(), "simulated backing created");
        Ok(Box::new(SimulatedBacking::new(
            name,
            kind,
            interval,
            active,
            Arc::clone(&self.async_changes),
        )))
    }
}
