//! Camera sender topologies
//!
//! File:  camera → camera-caps → converter → encoder → muxer → sink
//! RTP:   camera → camera-caps → converter → encoder → parser → payloader → sink

use crate::config::{CameraConfig, EncoderConfig, SenderConfig, SenderOutput};
use crate::pipeline::topology::{StageCandidate, StageSpec, Topology};
use crate::pipeline::types::{Capability, Caps};

pub const CAMERA: &str = "camera-source";
pub const CAMERA_CAPS: &str = "camera-caps";
pub const CONVERTER: &str = "converter";
pub const ENCODER: &str = "encoder";
pub const MUXER: &str = "muxer";
pub const PARSER: &str = "parser";
pub const PAYLOADER: &str = "payloader";
pub const SINK: &str = "sink";

pub fn sender_topology(config: &SenderConfig) -> Topology {
    let head = Topology::new("camera-sender-pipeline")
        .stage(camera(&config.camera))
        .stage(
            StageSpec::new(CAMERA_CAPS, Capability::Filter)
                .candidate(StageCandidate::new("capsfilter").with("caps", camera_caps(&config.camera))),
        )
        .stage(StageSpec::from_kinds(CONVERTER, Capability::Filter, &["videoconvert"]));

    match config.output {
        SenderOutput::File => head
            .stage(encoder(&config.encoder, true))
            .stage(StageSpec::from_kinds(MUXER, Capability::Filter, &["mpegtsmux"]))
            .stage(
                StageSpec::new(SINK, Capability::Sink).candidate(
                    StageCandidate::new("filesink")
                        .with("location", config.location.as_str())
                        .with("sync", false)
                        .with("async", false),
                ),
            )
            .chain(&[CAMERA, CAMERA_CAPS, CONVERTER, ENCODER, MUXER, SINK]),
        SenderOutput::Rtp => head
            .stage(encoder(&config.encoder, false))
            .stage(StageSpec::from_kinds(PARSER, Capability::Filter, &["h264parse"]))
            .stage(
                StageSpec::new(PAYLOADER, Capability::Filter).candidate(
                    StageCandidate::new("rtph264pay")
                        .with("pt", config.payload_type)
                        .with("config-interval", config.config_interval),
                ),
            )
            .stage(
                StageSpec::new(SINK, Capability::Sink).candidate(
                    StageCandidate::new("udpsink")
                        .with("host", config.host.as_str())
                        .with("port", config.port)
                        .with("sync", false)
                        .with("async", false),
                ),
            )
            .chain(&[CAMERA, CAMERA_CAPS, CONVERTER, ENCODER, PARSER, PAYLOADER, SINK]),
    }
}

fn camera(config: &CameraConfig) -> StageSpec {
    config
        .sources
        .iter()
        .fold(StageSpec::new(CAMERA, Capability::Source), |spec, kind| {
            let mut candidate = StageCandidate::new(kind.as_str());
            if matches!(kind.as_str(), "avfvideosrc" | "mfvideosrc" | "ksvideosrc") {
                if let Some(index) = config.device_index {
                    candidate = candidate.with("device-index", index);
                }
            }
            if matches!(kind.as_str(), "mfvideosrc" | "ksvideosrc") {
                if let Some(name) = &config.device_name {
                    candidate = candidate.with("device-name", name.as_str());
                }
            }
            if kind != "autovideosrc" {
                candidate = candidate.with("do-timestamp", true);
            }
            spec.candidate(candidate)
        })
}

pub fn camera_caps(config: &CameraConfig) -> Caps {
    Caps::builder("video/x-raw")
        .field("width", config.width)
        .field("height", config.height)
        .field("framerate", config.framerate)
        .field("pixel-aspect-ratio", config.pixel_aspect_ratio)
        .build()
}

/// Hardware encoders first when `allow_hardware`, then the software encoder
fn encoder(config: &EncoderConfig, allow_hardware: bool) -> StageSpec {
    let mut spec = StageSpec::new(ENCODER, Capability::Filter);
    if allow_hardware {
        for kind in &config.hardware {
            spec = spec.candidate(
                StageCandidate::new(kind.as_str())
                    .with("preset", config.hardware_preset)
                    .with("bitrate", config.bitrate),
            );
        }
    }
    spec.candidate(
        StageCandidate::new(config.software.as_str())
            .with("tune", config.tune)
            .with("speed-preset", config.speed_preset)
            .with("bitrate", config.bitrate)
            .with("key-int-max", config.key_int_max),
    )
}
