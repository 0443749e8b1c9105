use std::path::Path;

use common::data::{AudioTrack, MetadataResult, Reading, VideoMetadata, VideoTrack};
use log::warn;

use super::{Probe, ProbeFormat, ProbeStream, VideoBackend};

pub const NO_METADATA: &str = "No metadata available";

/// Probes `path` and normalizes the first video and audio stream.
///
/// Never fails: probe errors come back as a [`MetadataResult::Failed`] payload
/// and the pipeline carries on.
pub fn extract_metadata(backend: &dyn VideoBackend, path: &Path) -> MetadataResult {
    match backend.probe(path) {
        Ok(probe) => from_probe(&probe),
        Err(e) => {
            warn!("metadata extraction failed for {}: {e}", path.display());
            MetadataResult::Failed {
                error: format!("Error extracting metadata: {e}"),
            }
        }
    }
}

pub fn from_probe(probe: &Probe) -> MetadataResult {
    let metadata = VideoMetadata {
        video: probe
            .first_of("video")
            .map(|s| video_track(s, &probe.format)),
        audio: probe.first_of("audio").map(audio_track),
    };
    if metadata.video.is_none() && metadata.audio.is_none() {
        MetadataResult::Failed {
            error: NO_METADATA.to_string(),
        }
    } else {
        MetadataResult::Extracted(metadata)
    }
}

fn parse<T: std::str::FromStr>(v: &Option<String>) -> Reading<T> {
    v.as_deref().and_then(|s| s.trim().parse::<T>().ok()).into()
}

fn text(v: &Option<String>) -> Reading<String> {
    v.clone().filter(|s| !s.is_empty() && s != "unknown").into()
}

fn video_track(stream: &ProbeStream, format: &ProbeFormat) -> VideoTrack {
    // Matroska and WebM only carry a duration on the container.
    let duration_ms = stream
        .duration
        .as_deref()
        .or(format.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|secs| (secs * 1000.0).round() as u64);

    let scan_type = match stream.field_order.as_deref() {
        Some("progressive") => Some("Progressive".to_string()),
        Some("tt" | "bb" | "tb" | "bt") => Some("Interlaced".to_string()),
        _ => None,
    };

    VideoTrack {
        codec: text(&stream.codec_name),
        duration_ms: duration_ms.into(),
        width_px: stream.width.into(),
        height_px: stream.height.into(),
        frame_rate_fps: stream.frame_rate().map(|r| (r * 1000.0).round() / 1000.0).into(),
        bit_rate_bps: parse(&stream.bit_rate),
        color_space: text(&stream.color_space),
        scan_type: scan_type.into(),
    }
}

fn audio_track(stream: &ProbeStream) -> AudioTrack {
    AudioTrack {
        codec: text(&stream.codec_name),
        sample_rate_hz: parse(&stream.sample_rate),
        channels: stream.channels.into(),
        bit_rate_bps: parse(&stream.bit_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::FakeBackend;
    use common::AnalysisError;
    use serde_json::json;

    const FFPROBE_MKV: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "vp9",
                "codec_type": "video",
                "width": 1280,
                "height": 720,
                "color_space": "bt709",
                "field_order": "tt",
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "disposition": {"default": 1}
            }
        ],
        "format": {
            "format_name": "matroska,webm",
            "duration": "12.345000",
            "bit_rate": "812345"
        }
    }"#;

    #[test]
    fn ffprobe_output_is_normalized() {
        let probe: Probe = serde_json::from_str(FFPROBE_MKV).unwrap();
        let MetadataResult::Extracted(meta) = from_probe(&probe) else {
            panic!("expected metadata");
        };
        assert!(meta.audio.is_none());
        let video = meta.video.unwrap();
        assert_eq!(video.codec, Reading::Value("vp9".to_string()));
        assert_eq!(video.duration_ms, Reading::Value(12345));
        assert_eq!(video.width_px, Reading::Value(1280));
        assert_eq!(video.frame_rate_fps, Reading::Value(29.97));
        assert_eq!(video.scan_type, Reading::Value("Interlaced".to_string()));
        assert_eq!(video.bit_rate_bps, Reading::missing());
    }

    #[test]
    fn missing_fields_serialize_as_sentinels() {
        let probe = Probe {
            streams: vec![ProbeStream {
                codec_type: Some("audio".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = from_probe(&probe);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"audio": {
                "codec": "N/A",
                "sample_rate_hz": "N/A",
                "channels": "N/A",
                "bit_rate_bps": "N/A"
            }})
        );
    }

    #[test]
    fn no_tracks_is_an_error_record() {
        let result = from_probe(&Probe::default());
        assert_eq!(
            result,
            MetadataResult::Failed {
                error: NO_METADATA.to_string()
            }
        );
    }

    #[test]
    fn probe_failure_degrades_instead_of_failing() {
        let mut backend = FakeBackend::with_levels(vec![]);
        backend.probe = Err(AnalysisError::Decode("moov atom not found".to_string()));
        let result = extract_metadata(&backend, Path::new("broken.mp4"));
        assert_eq!(
            result,
            MetadataResult::Failed {
                error: "Error extracting metadata: decode error: moov atom not found"
                    .to_string()
            }
        );
    }

    #[test]
    fn sample_probe_has_both_tracks() {
        let backend = FakeBackend::with_levels(vec![]);
        let MetadataResult::Extracted(meta) = extract_metadata(&backend, Path::new("a.mp4"))
        else {
            panic!("expected metadata");
        };
        let video = meta.video.unwrap();
        assert_eq!(video.duration_ms, Reading::Value(10500));
        assert_eq!(video.bit_rate_bps, Reading::Value(4_000_000));
        assert_eq!(video.scan_type, Reading::Value("Progressive".to_string()));
        let audio = meta.audio.unwrap();
        assert_eq!(audio.sample_rate_hz, Reading::Value(48000));
        assert_eq!(audio.channels, Reading::Value(2));
    }
}
