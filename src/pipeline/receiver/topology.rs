//! Video receiver topologies
//!
//! File:  source → demuxer ⇢ parser → decoder → converter → sink
//! RTP:   source → caps → depayloader → decoder → converter → sink

use crate::config::{ReceiverConfig, ReceiverInput};
use crate::pipeline::topology::{DynamicLinkSpec, StageCandidate, StageSpec, Topology};
use crate::pipeline::types::{Capability, Caps};

pub const SOURCE: &str = "source";
pub const DEMUXER: &str = "demuxer";
pub const PARSER: &str = "parser";
pub const CAPS: &str = "caps";
pub const DEPAYLOADER: &str = "depayloader";
pub const DECODER: &str = "decoder";
pub const CONVERTER: &str = "converter";
pub const SINK: &str = "sink";

pub fn receiver_topology(config: &ReceiverConfig) -> Topology {
    let tail = |topology: Topology| {
        topology
            .stage(StageSpec::from_kinds(DECODER, Capability::Filter, &config.decoders))
            .stage(StageSpec::from_kinds(CONVERTER, Capability::Filter, &["videoconvert"]))
            .stage(StageSpec::from_kinds(SINK, Capability::Sink, &config.sinks))
    };

    match config.input {
        ReceiverInput::File => tail(
            Topology::new("video-receiver-pipeline")
                .stage(
                    StageSpec::new(SOURCE, Capability::Source).candidate(
                        StageCandidate::new("filesrc").with("location", config.location.as_str()),
                    ),
                )
                .stage(StageSpec::from_kinds(DEMUXER, Capability::DynamicDemux, &["tsdemux"]))
                .stage(StageSpec::from_kinds(PARSER, Capability::Filter, &["h264parse"])),
        )
        .link(SOURCE, DEMUXER)
        .chain(&[PARSER, DECODER, CONVERTER, SINK])
        .dynamic(DynamicLinkSpec::new(DEMUXER, PARSER).with_prefix("video")),

        ReceiverInput::Rtp => tail(
            Topology::new("video-receiver-pipeline")
                .stage(
                    StageSpec::new(SOURCE, Capability::Source).candidate(
                        StageCandidate::new("udpsrc")
                            .with("port", config.port)
                            .with("buffer-size", config.buffer_size),
                    ),
                )
                .stage(
                    StageSpec::new(CAPS, Capability::Filter)
                        .candidate(StageCandidate::new("capsfilter").with("caps", rtp_caps(config))),
                )
                .stage(StageSpec::from_kinds(DEPAYLOADER, Capability::Filter, &["rtph264depay"])),
        )
        .chain(&[SOURCE, CAPS, DEPAYLOADER, DECODER, CONVERTER, SINK]),
    }
}

pub fn rtp_caps(config: &ReceiverConfig) -> Caps {
    Caps::builder("application/x-rtp")
        .field("media", "video")
        .field("clock-rate", config.clock_rate)
        .field("encoding-name", "H264")
        .field("payload", config.payload_type)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_topology_has_dynamic_link() {
        let config = ReceiverConfig {
            input: ReceiverInput::File,
            ..Default::default()
        };
        let topology = receiver_topology(&config);
        assert!(topology.validate().is_ok());
        assert_eq!(topology.dynamic_links.len(), 1);
        assert_eq!(topology.dynamic_links[0].to, PARSER);
    }

    #[test]
    fn test_rtp_topology_is_static() {
        let topology = receiver_topology(&ReceiverConfig::default());
        assert!(topology.validate().is_ok());
        assert!(topology.dynamic_links.is_empty());
        assert_eq!(
            rtp_caps(&ReceiverConfig::default()).to_string(),
            "application/x-rtp, clock-rate=(int)90000, encoding-name=(string)H264, media=(string)video, payload=(int)96"
        );
    }
}
