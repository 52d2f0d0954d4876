//! Core types for the pipeline system

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Nanosecond position on a graph's timeline.
///
/// Durations reported as `ClockTime::ZERO` mean "unknown", following the
/// framework convention used by the facades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);
    pub const SECOND: ClockTime = ClockTime(1_000_000_000);

    /// Create a clock time from nanoseconds
    pub const fn from_nseconds(ns: u64) -> Self {
        Self(ns)
    }

    /// Create a clock time from whole seconds
    pub const fn from_seconds(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Create a clock time from a signed nanosecond value, negative values clamp to zero
    pub fn from_signed(ns: i64) -> Self {
        Self(ns.max(0) as u64)
    }

    /// Nanoseconds
    pub const fn nseconds(&self) -> u64 {
        self.0
    }

    /// Whole seconds, truncated
    pub const fn seconds(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(&self, other: ClockTime) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: ClockTime) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Convert to duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl From<Duration> for ClockTime {
    fn from(value: Duration) -> Self {
        Self(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// Formats as `hh:mm:ss`
impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.seconds();
        write!(
            f,
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

/// What a stage does in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Produces data, has no input
    Source,
    /// One input, one static output
    Filter,
    /// One input, outputs appear only after format negotiation
    DynamicDemux,
    /// Consumes data, has no output
    Sink,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Source => write!(f, "source"),
            Capability::Filter => write!(f, "filter"),
            Capability::DynamicDemux => write!(f, "dynamic-demux"),
            Capability::Sink => write!(f, "sink"),
        }
    }
}

/// A rational number, used for frame rates and pixel aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    pub numer: i32,
    pub denom: i32,
}

impl Fraction {
    pub const fn new(numer: i32, denom: i32) -> Self {
        Self { numer, denom }
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

/// Media capabilities: a media type plus typed fields
///
/// Rendered with [`std::fmt::Display`] in the framework's textual caps syntax,
/// e.g. `video/x-raw, width=(int)1920, framerate=(fraction)30/1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caps {
    pub media_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, StageValue>,
}

impl Caps {
    pub fn builder(media_type: impl Into<String>) -> CapsBuilder {
        CapsBuilder {
            caps: Caps {
                media_type: media_type.into(),
                fields: BTreeMap::new(),
            },
        }
    }
}

impl std::fmt::Display for Caps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (name, value) in &self.fields {
            write!(f, ", {}=({}){}", name, value.type_tag(), value)?;
        }
        Ok(())
    }
}

pub struct CapsBuilder {
    caps: Caps,
}

impl CapsBuilder {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<StageValue>) -> Self {
        self.caps.fields.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Caps {
        self.caps
    }
}

/// Typed configuration value applied to a stage at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Fraction(Fraction),
    Caps(Caps),
    Str(String),
}

impl StageValue {
    /// Type annotation used inside caps strings
    pub fn type_tag(&self) -> &'static str {
        match self {
            StageValue::Bool(_) => "boolean",
            StageValue::Int(_) => "int",
            StageValue::Double(_) => "double",
            StageValue::Fraction(_) => "fraction",
            StageValue::Caps(_) => "caps",
            StageValue::Str(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StageValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StageValue::Double(v) => Some(*v),
            StageValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageValue::Bool(v) => write!(f, "{}", v),
            StageValue::Int(v) => write!(f, "{}", v),
            StageValue::Double(v) => write!(f, "{}", v),
            StageValue::Fraction(v) => write!(f, "{}", v),
            StageValue::Caps(v) => write!(f, "{}", v),
            StageValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for StageValue {
    fn from(value: bool) -> Self {
        StageValue::Bool(value)
    }
}

impl From<i64> for StageValue {
    fn from(value: i64) -> Self {
        StageValue::Int(value)
    }
}

impl From<i32> for StageValue {
    fn from(value: i32) -> Self {
        StageValue::Int(value.into())
    }
}

impl From<u32> for StageValue {
    fn from(value: u32) -> Self {
        StageValue::Int(value.into())
    }
}

impl From<u16> for StageValue {
    fn from(value: u16) -> Self {
        StageValue::Int(value.into())
    }
}

impl From<f64> for StageValue {
    fn from(value: f64) -> Self {
        StageValue::Double(value)
    }
}

impl From<Fraction> for StageValue {
    fn from(value: Fraction) -> Self {
        StageValue::Fraction(value)
    }
}

impl From<Caps> for StageValue {
    fn from(value: Caps) -> Self {
        StageValue::Caps(value)
    }
}

impl From<&str> for StageValue {
    fn from(value: &str) -> Self {
        StageValue::Str(value.to_string())
    }
}

impl From<String> for StageValue {
    fn from(value: String) -> Self {
        StageValue::Str(value)
    }
}

/// State of the framework-side transport, as reported by state-change events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Null => write!(f, "NULL"),
            TransportState::Ready => write!(f, "READY"),
            TransportState::Paused => write!(f, "PAUSED"),
            TransportState::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Outcome of a successful state-change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The graph reached the requested state before the call returned
    Success,
    /// The framework is still settling; a `StateChanged` event follows
    Async,
    /// Live source: the graph cannot preroll in Paused
    NoPreroll,
}

/// Seek behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags {
    /// Discard buffered in-flight data
    pub flush: bool,
    /// Snap to the nearest decodable sync point at or before the target
    pub key_unit: bool,
}

impl SeekFlags {
    pub const FLUSH_KEY_UNIT: SeekFlags = SeekFlags {
        flush: true,
        key_unit: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_format() {
        assert_eq!(ClockTime::ZERO.to_string(), "00:00:00");
        assert_eq!(ClockTime::from_seconds(3_725).to_string(), "01:02:05");
        assert_eq!(
            ClockTime::from_nseconds(59_999_999_999).to_string(),
            "00:00:59"
        );
    }

    #[test]
    fn test_clock_time_signed() {
        assert_eq!(ClockTime::from_signed(-5), ClockTime::ZERO);
        assert_eq!(ClockTime::from_signed(42).nseconds(), 42);
    }

    #[test]
    fn test_caps_rendering() {
        let caps = Caps::builder("video/x-raw")
            .field("width", 1920)
            .field("framerate", Fraction::new(30, 1))
            .build();
        assert_eq!(
            caps.to_string(),
            "video/x-raw, framerate=(fraction)30/1, width=(int)1920"
        );
    }

    #[test]
    fn test_stage_value_from_json() {
        let value: StageValue = serde_json::from_str("4000").unwrap();
        assert_eq!(value, StageValue::Int(4000));
        let value: StageValue = serde_json::from_str("\"zerolatency\"").unwrap();
        assert_eq!(value.as_str(), Some("zerolatency"));
        let value: StageValue = serde_json::from_str(r#"{"numer":30,"denom":1}"#).unwrap();
        assert_eq!(value, StageValue::Fraction(Fraction::new(30, 1)));
    }
}
