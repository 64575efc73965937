use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::config::model::EmbeddedVideoConfig;
use crate::foundation::error::{FramecastError, FramecastResult};

/// Metadata about a source video, as reported by a probe tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Average frame rate.
    pub fps: f64,
    /// Fractional-second duration.
    pub duration_seconds: f64,
    /// Number of video frames (reported or derived from duration).
    pub frame_count: u64,
    /// Whether at least one audio stream exists.
    pub has_audio: bool,
    /// Video codec name.
    #[serde(default)]
    pub codec: Option<String>,
    /// Container bitrate in bits per second.
    #[serde(default)]
    pub bitrate: Option<u64>,
}

impl VideoMetadata {
    /// `width / height`, or `1.0` when either dimension is 0.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Inspects media files.
pub trait MediaProbe {
    /// Read metadata for `path`.
    fn probe(&self, path: &Path) -> FramecastResult<VideoMetadata>;
}

/// [`MediaProbe`] backed by the system `ffprobe`.
#[derive(Clone, Debug)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProbe {
    /// Use `program` instead of `ffprobe` from `PATH`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MediaProbe for FfprobeProbe {
    #[tracing::instrument(skip(self))]
    fn probe(&self, path: &Path) -> FramecastResult<VideoMetadata> {
        let out = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| FramecastError::io(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(FramecastError::validation(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_ffprobe_json(&out.stdout)
    }
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_ffprobe_json(bytes: &[u8]) -> FramecastResult<VideoMetadata> {
    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        codec_name: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        avg_frame_rate: Option<String>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
        duration: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
        bit_rate: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| FramecastError::serde(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FramecastError::validation("no video stream found"))?;

    let fps = [video.avg_frame_rate.as_deref(), video.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(parse_ff_ratio)
        .find(|f| *f > 0.0)
        .unwrap_or(0.0);

    let duration_seconds = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| (duration_seconds * fps).round() as u64);

    let bitrate = parsed
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|s| s.parse::<u64>().ok());

    Ok(VideoMetadata {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        duration_seconds,
        frame_count,
        has_audio: parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
        codec: video.codec_name.clone(),
        bitrate,
    })
}

fn parse_ff_ratio(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((a, b)) => {
            let a = a.parse::<f64>().ok()?;
            let b = b.parse::<f64>().ok()?;
            (b != 0.0).then(|| a / b)
        }
        None => s.parse::<f64>().ok(),
    }
}

/// Check an embedded clip against its probed source.
///
/// Rejects a seek past the end of the source and clears `include_audio` when the source has no
/// audio stream.
pub fn validate_embedded_video(
    cfg: &EmbeddedVideoConfig,
    meta: &VideoMetadata,
) -> FramecastResult<EmbeddedVideoConfig> {
    cfg.validate()?;
    if meta.width == 0 || meta.height == 0 {
        return Err(FramecastError::validation(format!(
            "embedded video '{}' source has no decodable picture",
            cfg.id
        )));
    }
    if meta.duration_seconds > 0.0 && cfg.trim_start_seconds >= meta.duration_seconds {
        return Err(FramecastError::validation(format!(
            "embedded video '{}' trim_start_seconds {} is past the source duration {}",
            cfg.id, cfg.trim_start_seconds, meta.duration_seconds
        )));
    }
    let mut out = cfg.clone();
    if out.include_audio && !meta.has_audio {
        tracing::debug!(id = %cfg.id, "source has no audio stream; dropping clip audio");
        out.include_audio = false;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/media/probe.rs"]
mod tests;
