// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control bindings: a keyframe track driving one child parameter.

use crate::backing::{ParamValue, ParameterSpec};
use crate::interval::ClockTime;
use crate::keyframe::KeyframeTrack;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How keyframe values map onto the parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub enum BindingKind {
    /// Values in `[0, 1]` are scaled into the parameter's range
    #[default]
    Direct,
    /// Values are written to the parameter unchanged
    DirectAbsolute,
}

impl BindingKind {
    /// Whether keyframe values are absolute
    pub fn is_absolute(&self) -> bool {
        matches!(self, Self::DirectAbsolute)
    }

    /// The binding kind for a track's scaling
    pub fn for_absolute(absolute: bool) -> Self {
        if absolute {
            Self::DirectAbsolute
        } else {
            Self::Direct
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DirectAbsolute => "direct-absolute",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown binding kind name
#[derive(Debug, thiserror::Error)]
#[error("Binding kind must be one of [direct, direct-absolute], got {0:?}")]
pub struct UnknownBindingKind(pub String);

impl FromStr for BindingKind {
    type Err = UnknownBindingKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "direct-absolute" => Ok(Self::DirectAbsolute),
            other => Err(UnknownBindingKind(other.to_string())),
        }
    }
}

/// A keyframe track bound to a child parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlBinding {
    /// Bound parameter name
    pub property: String,
    /// Value mapping
    pub kind: BindingKind,
    /// Control points, in media time
    pub track: KeyframeTrack,
}

impl ControlBinding {
    /// Bind `track` to `property`; the track's scaling follows `kind`
    pub fn new(property: impl Into<String>, kind: BindingKind, mut track: KeyframeTrack) -> Self {
        let property = property.into();
        track.absolute = kind.is_absolute();
        track.property_name.clone_from(&property);
        Self {
            property,
            kind,
            track,
        }
    }

    /// Parameter value at a media position, converted to the parameter's type
    pub fn parameter_value(&self, media_position: ClockTime, spec: &ParameterSpec) -> Option<ParamValue> {
        let value = f64::from(self.track.value_at(media_position)?);
        let value = match (self.kind, spec.range) {
            (BindingKind::Direct, Some((min, max))) => min + value * (max - min),
            _ => value,
        };
        spec.default.with_numeric(value)
    }

    /// Split the binding at a media position, returning the part after it
    pub fn split_off(&mut self, media_position: ClockTime) -> ControlBinding {
        let track = self.track.split_off(media_position);
        Self {
            property: self.property.clone(),
            kind: self.kind,
            track,
        }
    }

    /// A binding of the same kind carrying a verbatim copy of the points
    pub fn duplicate(&self) -> ControlBinding {
        let mut track = self.track.empty_like();
        self.track.copy_all(&mut track);
        Self {
            property: self.property.clone(),
            kind: self.kind,
            track,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_spec() -> ParameterSpec {
        ParameterSpec::new("volume", "volume", "Filter/Effect/Audio", ParamValue::Double(1.0))
            .with_range(0.0, 10.0)
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("direct".parse::<BindingKind>().ok(), Some(BindingKind::Direct));
        assert_eq!(
            "direct-absolute".parse::<BindingKind>().ok(),
            Some(BindingKind::DirectAbsolute)
        );
        assert!("trigger".parse::<BindingKind>().is_err());
        assert_eq!(BindingKind::DirectAbsolute.to_string(), "direct-absolute");
    }

    #[test]
    fn test_new_aligns_track_scaling() {
        let track = KeyframeTrack::new("other").with_absolute(false);
        let binding = ControlBinding::new("volume", BindingKind::DirectAbsolute, track);
        assert!(binding.track.absolute);
        assert_eq!(binding.track.property_name, "volume");
    }

    #[test]
    fn test_direct_scales_into_range() {
        let track = KeyframeTrack::new("volume").with_points([(0, 0.0), (10, 0.5)]);
        let binding = ControlBinding::new("volume", BindingKind::Direct, track);
        assert_eq!(binding.parameter_value(10, &volume_spec()), Some(ParamValue::Double(5.0)));

        let track = KeyframeTrack::new("volume").with_points([(0, 2.5)]);
        let binding = ControlBinding::new("volume", BindingKind::DirectAbsolute, track);
        assert_eq!(binding.parameter_value(0, &volume_spec()), Some(ParamValue::Double(2.5)));
    }

    #[test]
    fn test_split_and_duplicate_keep_kind() {
        let track = KeyframeTrack::new("alpha").with_points([(0, 0.0), (10, 1.0)]);
        let mut binding = ControlBinding::new("alpha", BindingKind::Direct, track);

        let copy = binding.duplicate();
        assert_eq!(copy, binding);

        let tail = binding.split_off(5);
        assert_eq!(tail.kind, BindingKind::Direct);
        assert_eq!(tail.track.points()[0].timestamp, 5);
        assert_eq!(binding.track.points().last().map(|p| p.timestamp), Some(5));
    }
}
