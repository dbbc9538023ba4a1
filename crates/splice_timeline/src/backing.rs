// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contract with the external media engine.
//!
//! Every attached track element delegates its media processing to an opaque
//! backing object produced by a [`BackingFactory`]. The timeline only ever
//! pushes parameters to it and queries its scheduling state; building and
//! running the actual pipeline is the engine's business.

use crate::interval::Interval;
use crate::kind::ElementKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Container property carrying the timeline position
pub const PROP_START: &str = "start";
/// Container property carrying the media offset
pub const PROP_INPOINT: &str = "inpoint";
/// Container property carrying the length
pub const PROP_DURATION: &str = "duration";
/// Container property carrying the priority
pub const PROP_PRIORITY: &str = "priority";
/// Container property toggling output usage
pub const PROP_ACTIVE: &str = "active";
/// Container property carrying the track restriction
pub const PROP_RESTRICTION: &str = "restriction";

/// A parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Double(f64),
    /// String
    String(String),
}

impl ParamValue {
    /// Name of the value type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }

    /// Whether both values carry the same type
    pub fn same_type(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Whether the value can be driven by a keyframe track
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::String(_))
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::String(_) => None,
        }
    }

    /// A value of the same type holding `value`
    pub fn with_numeric(&self, value: f64) -> Option<ParamValue> {
        match self {
            Self::Bool(_) => Some(Self::Bool(value >= 0.5)),
            Self::Int(_) => Some(Self::Int(value.round() as i64)),
            Self::UInt(_) => Some(Self::UInt(value.max(0.0).round() as u64)),
            Self::Double(_) => Some(Self::Double(value)),
            Self::String(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Description of a configurable parameter of a backing object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Name of the internal sub-element owning the parameter
    pub owner: String,
    /// `/`-separated classification of the owner, e.g. `Filter/Effect/Audio`
    pub category: String,
    /// Whether the parameter can be written
    pub writable: bool,
    /// Default value; also fixes the value type
    pub default: ParamValue,
    /// Valid numeric range, if any
    pub range: Option<(f64, f64)>,
}

impl ParameterSpec {
    /// Create a writable parameter description
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        category: impl Into<String>,
        default: ParamValue,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            category: category.into(),
            writable: true,
            default,
            range: None,
        }
    }

    /// Set the numeric range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Mark the parameter read-only
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// `owner::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.owner, self.name)
    }

    /// Whether a keyframe track may drive this parameter
    pub fn is_controllable(&self) -> bool {
        self.writable && self.default.is_numeric()
    }

    /// Whether `name` designates this parameter, qualified or not
    pub fn matches(&self, name: &str) -> bool {
        match name.split_once("::") {
            Some((owner, param)) => owner == self.owner && param == self.name,
            None => name == self.name,
        }
    }
}

/// Scheduling state of a backing object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum BackingState {
    /// No resources allocated
    #[default]
    Null,
    /// Resources allocated, not scheduled
    Ready,
    /// Scheduled, not running
    Paused,
    /// Running
    Playing,
}

impl BackingState {
    /// Whether the object can be released without stopping it first
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Null | Self::Ready)
    }
}

/// Outcome of a state change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeReturn {
    /// The new state was reached
    Success,
    /// The change continues in the engine's own threads
    Async,
}

/// Error raised by the backing engine
#[derive(Debug, thiserror::Error)]
pub enum BackingError {
    /// The engine cannot produce this kind of object
    #[error("Unknown backing kind: {0}")]
    UnknownKind(String),

    /// No parameter with that name
    #[error("No such property: {0}")]
    NoSuchProperty(String),

    /// The parameter cannot be written
    #[error("Property is not writable: {0}")]
    ReadOnly(String),

    /// The value has the wrong type
    #[error("Type mismatch for {property}: expected {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name
        property: String,
        /// Expected type name
        expected: &'static str,
        /// Provided type name
        found: &'static str,
    },

    /// The engine refused a state change
    #[error("State change refused: {0}")]
    StateChange(String),
}

/// An opaque processing unit owned by one track element
pub trait BackingObject: Send + fmt::Debug {
    /// Instance name, for diagnostics
    fn name(&self) -> &str;

    /// Configurable parameters of the object's internal sub-elements
    fn introspect_parameters(&self) -> Vec<ParameterSpec>;

    /// Write a parameter. Child parameters are addressed as `owner::name`.
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), BackingError>;

    /// Read a parameter
    fn get_parameter(&self, name: &str) -> Option<ParamValue>;

    /// Settled scheduling state
    fn current_state(&self) -> BackingState;

    /// Target of a transition still in progress
    fn pending_state(&self) -> Option<BackingState>;

    /// Request a state change
    fn set_state(&mut self, state: BackingState) -> Result<StateChangeReturn, BackingError>;
}

/// Shared handle on a backing object.
///
/// The engine may drive the object from its own threads; every access goes
/// through the lock so that parameter pushes never race a state change.
pub type BackingHandle = Arc<Mutex<Box<dyn BackingObject>>>;

/// Producer of backing objects
pub trait BackingFactory: Send + Sync {
    /// Create the processing unit for an element of `kind`
    fn create(
        &self,
        kind: &ElementKind,
        interval: &Interval,
        active: bool,
    ) -> Result<Box<dyn BackingObject>, BackingError>;
}
