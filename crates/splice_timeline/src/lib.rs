// SPDX-License-Identifier: MIT OR Apache-2.0
//! Non-linear timeline edit model.
//!
//! This crate provides the data model of a video editing timeline:
//! - Layers stacking clips by priority
//! - Tracks grouping elements of one media type
//! - Clips sharing one interval across their track elements
//! - Keyframe automation of child parameters
//! - Normal, ripple, roll, trim and slide edits with undo/redo
//!
//! ## Architecture
//!
//! The model is built on:
//! - A [`Timeline`] arena owning clips and elements, referenced by ID
//! - Backing objects behind the [`BackingObject`] trait, created by a
//!   [`BackingFactory`] when an element enters a track
//! - An [`EditPlanner`] computing whole edits before anything changes
//! - Bincode snapshots in [`History`] for undo
//!
//! [`SimulatedFactory`] provides in-memory backing objects for tests and
//! the command-line runner.

pub mod backing;
pub mod binding;
pub mod clip;
pub mod config;
pub mod edit;
pub mod element;
pub mod events;
pub mod history;
pub mod interval;
pub mod keyframe;
pub mod kind;
pub mod layer;
pub mod simulated;
pub mod timeline;
pub mod track;

pub use backing::{
    BackingError, BackingFactory, BackingHandle, BackingObject, BackingState, ParamValue,
    ParameterSpec, StateChangeReturn,
};
pub use binding::{BindingKind, ControlBinding};
pub use clip::{Clip, ClipId, ClipState};
pub use config::{ConfigError, TimelineConfig};
pub use edit::{Edge, EditError, EditMode, EditPlan, EditPlanner, EditRequest};
pub use element::{ElementError, ElementId, TrackElement};
pub use events::{EventBus, TimelineEvent};
pub use history::{History, HistoryError, HistoryStats};
pub use interval::{ClockTime, Interval, LAYER_HEIGHT, MIN_PRIORITY, MSECOND, SECOND};
pub use keyframe::{ControlPoint, InterpolationMode, KeyframeTrack};
pub use kind::{ElementKind, ParameterFilter};
pub use layer::{Layer, LayerId};
pub use simulated::{SimulatedBacking, SimulatedFactory};
pub use timeline::{Timeline, TimelineError};
pub use track::{Track, TrackId, TrackType};
