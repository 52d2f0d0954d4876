//! File player topology
//!
//! source → queue → demuxer ⇢ decoder → converter → sink

use crate::config::PlayerConfig;
use crate::pipeline::topology::{DynamicLinkSpec, StageCandidate, StageSpec, Topology};
use crate::pipeline::types::Capability;

pub const SOURCE: &str = "source";
pub const QUEUE: &str = "queue";
pub const DEMUXER: &str = "demuxer";
pub const DECODER: &str = "decoder";
pub const CONVERTER: &str = "converter";
pub const SINK: &str = "sink";

pub fn player_topology(config: &PlayerConfig, location: Option<&str>) -> Topology {
    let mut source = StageCandidate::new("filesrc");
    if let Some(location) = location {
        source = source.with("location", location);
    }

    Topology::new("ts-player-pipeline")
        .stage(StageSpec::new(SOURCE, Capability::Source).candidate(source))
        .stage(StageSpec::from_kinds(QUEUE, Capability::Filter, &["queue"]))
        .stage(StageSpec::from_kinds(DEMUXER, Capability::DynamicDemux, &["tsdemux"]))
        .stage(StageSpec::from_kinds(DECODER, Capability::Filter, &config.decoders))
        .stage(StageSpec::from_kinds(CONVERTER, Capability::Filter, &["videoconvert"]))
        .stage(StageSpec::from_kinds(SINK, Capability::Sink, &config.sinks))
        .chain(&[SOURCE, QUEUE, DEMUXER])
        .chain(&[DECODER, CONVERTER, SINK])
        .dynamic(DynamicLinkSpec::new(DEMUXER, DECODER).with_prefix("video"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::StageValue;

    #[test]
    fn test_player_topology_is_valid() {
        let topology = player_topology(&PlayerConfig::default(), Some("movie.ts"));
        assert!(topology.validate().is_ok());
        assert_eq!(topology.stages.len(), 6);
        assert_eq!(
            topology.find(SOURCE).unwrap().candidates[0].config,
            vec![("location".to_string(), StageValue::from("movie.ts"))]
        );
        assert_eq!(topology.find(DECODER).unwrap().kinds(), vec!["nvh264dec", "avdec_h264"]);
    }
}
