//! Typed configuration for the player, sender and receiver
//!
//! Every device name, file path and network endpoint a topology needs comes
//! from here. Config files are JSON; missing fields take the defaults below.

use crate::pipeline::types::Fraction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Video sinks to try, best first, for the current platform
pub fn default_video_sinks() -> Vec<String> {
    let preferred: &[&str] = if cfg!(target_os = "windows") {
        &["d3dvideosink", "autovideosink"]
    } else if cfg!(target_os = "macos") {
        &["osxvideosink", "autovideosink"]
    } else {
        &["autovideosink"]
    };
    preferred.iter().map(|s| s.to_string()).collect()
}

/// Camera sources to try, best first, for the current platform
pub fn default_camera_sources() -> Vec<String> {
    let preferred: &[&str] = if cfg!(target_os = "windows") {
        &["mfvideosrc", "ksvideosrc", "autovideosrc"]
    } else if cfg!(target_os = "macos") {
        &["avfvideosrc", "autovideosrc"]
    } else {
        &["v4l2src", "autovideosrc"]
    };
    preferred.iter().map(|s| s.to_string()).collect()
}

fn default_decoders() -> Vec<String> {
    vec!["nvh264dec".to_string(), "avdec_h264".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Decoder kinds, hardware first
    pub decoders: Vec<String>,
    pub sinks: Vec<String>,
    /// Initial volume, clamped to [0, 1]
    pub volume: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            decoders: default_decoders(),
            sinks: default_video_sinks(),
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub sources: Vec<String>,
    pub device_index: Option<i32>,
    pub device_name: Option<String>,
    pub width: i32,
    pub height: i32,
    pub framerate: Fraction,
    pub pixel_aspect_ratio: Fraction,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sources: default_camera_sources(),
            device_index: Some(0),
            device_name: None,
            width: 1920,
            height: 1080,
            framerate: Fraction::new(30, 1),
            pixel_aspect_ratio: Fraction::new(1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Hardware encoders tried before the software one (file output only)
    pub hardware: Vec<String>,
    /// Preset applied to hardware encoders (4 = low latency)
    pub hardware_preset: i32,
    pub software: String,
    /// x264 tune flags (4 = zerolatency)
    pub tune: i32,
    /// x264 speed preset (1 = ultrafast)
    pub speed_preset: i32,
    /// Target bitrate in kbit/s
    pub bitrate: u32,
    /// Maximum distance between key frames, in frames
    pub key_int_max: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hardware: vec!["nvh264enc".to_string()],
            hardware_preset: 4,
            software: "x264enc".to_string(),
            tune: 4,
            speed_preset: 1,
            bitrate: 4000,
            key_int_max: 30,
        }
    }
}

/// Where the sender writes its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SenderOutput {
    /// MPEG-TS file
    File,
    /// RTP over UDP
    #[default]
    Rtp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub output: SenderOutput,
    pub camera: CameraConfig,
    pub encoder: EncoderConfig,
    pub location: String,
    pub host: String,
    pub port: u16,
    pub payload_type: u32,
    pub config_interval: i32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            output: SenderOutput::default(),
            camera: CameraConfig::default(),
            encoder: EncoderConfig::default(),
            location: "output.ts".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            payload_type: 96,
            config_interval: 1,
        }
    }
}

/// Where the receiver reads its stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverInput {
    /// MPEG-TS file
    File,
    /// RTP over UDP
    #[default]
    Rtp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub input: ReceiverInput,
    pub location: String,
    pub port: u16,
    pub buffer_size: u32,
    pub payload_type: u32,
    pub clock_rate: u32,
    pub decoders: Vec<String>,
    pub sinks: Vec<String>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            input: ReceiverInput::default(),
            location: "output.ts".to_string(),
            port: 5000,
            buffer_size: 65536,
            payload_type: 96,
            clock_rate: 90000,
            decoders: default_decoders(),
            sinks: default_video_sinks(),
        }
    }
}

/// Root of a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
