use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::error::{FramecastError, FramecastResult};

/// Timeline geometry and length. The primary raw-frame stream follows it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Frames per second, `> 0`.
    pub fps: u32,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Timeline length in frames.
    #[serde(default)]
    pub duration_in_frames: u64,
}

impl TimelineConfig {
    /// Check `fps > 0` and non-zero, even dimensions (yuv420p output).
    pub fn validate(&self) -> FramecastResult<()> {
        if self.fps == 0 {
            return Err(FramecastError::validation("timeline fps must be > 0"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::validation(
                "timeline width/height must be > 0",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(FramecastError::validation(
                "timeline width/height must be even (required for yuv420p output)",
            ));
        }
        Ok(())
    }

    /// Size in bytes of one `rgba` frame at the timeline dimensions.
    pub fn rgba_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Named quality level, resolved to a `(crf, preset)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// `crf 30`, `veryfast`.
    Low,
    /// `crf 23`, `medium`.
    #[default]
    Medium,
    /// `crf 18`, `slow`.
    High,
    /// `crf 0`, `veryslow`.
    Lossless,
}

impl Quality {
    /// The `(crf, preset)` pair for this level.
    pub fn crf_preset(self) -> (u8, &'static str) {
        match self {
            Self::Low => (30, "veryfast"),
            Self::Medium => (23, "medium"),
            Self::High => (18, "slow"),
            Self::Lossless => (0, "veryslow"),
        }
    }
}

/// Wire format of the frame feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Fixed-size `rgba` frames, `width * height * 4` bytes each.
    #[default]
    RawRgba,
    /// Concatenated PNG images.
    Png,
}

/// Output quality and frame-feed format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Quality level.
    #[serde(default)]
    pub quality: Quality,
    /// Replaces the quality level's crf when set.
    #[serde(default)]
    pub crf_override: Option<u8>,
    /// Replaces the quality level's preset when set.
    #[serde(default)]
    pub preset_override: Option<String>,
    /// Frame-feed wire format.
    #[serde(default)]
    pub frame_format: FrameFormat,
}

impl EncodingConfig {
    /// Effective crf after applying `crf_override`.
    pub fn resolved_crf(&self) -> u8 {
        self.crf_override.unwrap_or(self.quality.crf_preset().0)
    }

    /// Effective preset after applying `preset_override`.
    pub fn resolved_preset(&self) -> &str {
        self.preset_override
            .as_deref()
            .unwrap_or(self.quality.crf_preset().1)
    }

    /// Check the overrides are usable by an x264-class encoder.
    pub fn validate(&self) -> FramecastResult<()> {
        if let Some(crf) = self.crf_override
            && crf > 51
        {
            return Err(FramecastError::validation("crf_override must be <= 51"));
        }
        if let Some(preset) = &self.preset_override
            && (preset.trim().is_empty() || preset.chars().any(char::is_whitespace))
        {
            return Err(FramecastError::validation(
                "preset_override must be a single non-empty word",
            ));
        }
        Ok(())
    }
}

/// Where a separate audio track comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    /// Local file.
    Path(PathBuf),
    /// Anything the encoder can open by URI (`http://`, `file:`, ...).
    Url(String),
}

impl AudioSource {
    /// The value passed to the encoder's `-i`.
    pub fn as_input(&self) -> OsString {
        match self {
            Self::Path(p) => p.clone().into_os_string(),
            Self::Url(u) => OsString::from(u),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Path(p) => p.as_os_str().is_empty(),
            Self::Url(u) => u.trim().is_empty(),
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Background audio placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackConfig {
    /// Input source.
    pub source: AudioSource,
    /// Timeline frame at which the track starts.
    #[serde(default)]
    pub start_frame: u64,
    /// Audible length in frames. `0` mutes the track entirely.
    pub duration_in_frames: u64,
    /// Frames skipped at the head of the source.
    #[serde(default)]
    pub trim_start_frame: u64,
    /// Fade-in length in frames.
    #[serde(default)]
    pub fade_in_frames: u64,
    /// Fade-out length in frames, ending at `duration_in_frames`.
    #[serde(default)]
    pub fade_out_frames: u64,
    /// Linear gain, `1.0` = unity.
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Loop the source indefinitely.
    ///
    /// The looped stream never ends and the encoder runs without `-shortest`, so an output with a
    /// looping track does not finish when the frame feed closes. Bound it yourself: cancel the
    /// session once the video is complete, or leave `loop` off for tracks that must end with the
    /// video.
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

impl AudioTrackConfig {
    /// A unity-gain, non-looping track covering `duration_in_frames` from frame 0.
    pub fn new(source: AudioSource, duration_in_frames: u64) -> Self {
        Self {
            source,
            start_frame: 0,
            duration_in_frames,
            trim_start_frame: 0,
            fade_in_frames: 0,
            fade_out_frames: 0,
            volume: 1.0,
            looping: false,
        }
    }

    /// Check source and volume.
    pub fn validate(&self) -> FramecastResult<()> {
        if self.source.is_empty() {
            return Err(FramecastError::validation(
                "audio track source must be non-empty",
            ));
        }
        validate_volume(self.volume, "audio track volume")
    }
}

/// A secondary clip embedded into the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedVideoConfig {
    /// Unique id within the composition.
    pub id: String,
    /// Source file.
    pub video_path: PathBuf,
    /// Timeline frame at which the clip starts.
    #[serde(default)]
    pub start_frame: u64,
    /// Clip length in frames. `0` means the clip contributes no audio.
    pub duration_in_frames: u64,
    /// Seek offset into the source.
    #[serde(default)]
    pub trim_start_seconds: f64,
    /// Render box width.
    pub width: u32,
    /// Render box height.
    pub height: u32,
    /// Render box left edge, only used in overlay mode.
    #[serde(default)]
    pub x: i32,
    /// Render box top edge, only used in overlay mode.
    #[serde(default)]
    pub y: i32,
    /// Mix the clip's own audio into the output.
    #[serde(default = "default_true")]
    pub include_audio: bool,
    /// Audio fade-in length in frames.
    #[serde(default)]
    pub audio_fade_in_frames: u64,
    /// Audio fade-out length in frames.
    #[serde(default)]
    pub audio_fade_out_frames: u64,
    /// Linear audio gain, `1.0` = unity.
    #[serde(default = "default_volume")]
    pub audio_volume: f64,
}

impl EmbeddedVideoConfig {
    /// A clip at frame 0 with audio included at unity gain.
    pub fn new(
        id: impl Into<String>,
        video_path: impl Into<PathBuf>,
        duration_in_frames: u64,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            video_path: video_path.into(),
            start_frame: 0,
            duration_in_frames,
            trim_start_seconds: 0.0,
            width,
            height,
            x: 0,
            y: 0,
            include_audio: true,
            audio_fade_in_frames: 0,
            audio_fade_out_frames: 0,
            audio_volume: 1.0,
        }
    }

    /// `true` when the clip feeds an `[i:a]` stream into the graph.
    pub fn produces_audio(&self) -> bool {
        self.include_audio && self.duration_in_frames > 0
    }

    /// Map a timeline frame onto the clip's source frame number.
    ///
    /// Returns `None` outside `[start_frame, start_frame + duration_in_frames)` or when either fps is
    /// not positive.
    pub fn source_frame_for(
        &self,
        timeline_frame: u64,
        timeline_fps: u32,
        source_fps: f64,
    ) -> Option<u64> {
        if timeline_fps == 0 || !source_fps.is_finite() || source_fps <= 0.0 {
            return None;
        }
        let local = timeline_frame.checked_sub(self.start_frame)?;
        if local >= self.duration_in_frames {
            return None;
        }
        let source_sec = self.trim_start_seconds + local as f64 / f64::from(timeline_fps);
        // Absorb float noise so exact frame boundaries do not round down.
        Some((source_sec * source_fps + 1e-6).floor() as u64)
    }

    /// Check id, path, geometry and audio settings.
    pub fn validate(&self) -> FramecastResult<()> {
        if self.id.trim().is_empty() {
            return Err(FramecastError::validation(
                "embedded video id must be non-empty",
            ));
        }
        if self.video_path.as_os_str().is_empty() {
            return Err(FramecastError::validation(format!(
                "embedded video '{}' video_path must be non-empty",
                self.id
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::validation(format!(
                "embedded video '{}' width/height must be > 0",
                self.id
            )));
        }
        if !self.trim_start_seconds.is_finite() || self.trim_start_seconds < 0.0 {
            return Err(FramecastError::validation(format!(
                "embedded video '{}' trim_start_seconds must be finite and >= 0",
                self.id
            )));
        }
        validate_volume(self.audio_volume, "embedded video audio_volume")
    }
}

/// How embedded clips reach the output picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedVideoMode {
    /// The renderer composites clip frames (via the frame cache) into the primary stream.
    #[default]
    FrameFeed,
    /// The encoder scales and overlays each clip onto the primary stream.
    Overlay,
}

/// Everything needed to build the filter graph and the encoder invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// Timeline geometry.
    pub timeline: TimelineConfig,
    /// Output quality and feed format.
    #[serde(default)]
    pub encoding: EncodingConfig,
    /// Separate audio tracks in declared order.
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrackConfig>,
    /// Embedded clips in declared order.
    #[serde(default)]
    pub embedded_videos: Vec<EmbeddedVideoConfig>,
    /// Embedded clip compositing strategy.
    #[serde(default)]
    pub embedded_video_mode: EmbeddedVideoMode,
}

impl CompositionConfig {
    /// A config with default encoding and no audio or embedded clips.
    pub fn new(timeline: TimelineConfig) -> Self {
        Self {
            timeline,
            encoding: EncodingConfig::default(),
            audio_tracks: Vec::new(),
            embedded_videos: Vec::new(),
            embedded_video_mode: EmbeddedVideoMode::default(),
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> FramecastResult<Self> {
        serde_json::from_str(s).map_err(|e| FramecastError::serde(e.to_string()))
    }

    /// Read and parse a JSON file.
    pub fn from_json_path(path: &Path) -> FramecastResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Serialize as pretty JSON.
    pub fn to_json_string(&self) -> FramecastResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FramecastError::serde(e.to_string()))
    }

    /// Validate every part and check embedded ids are unique.
    pub fn validate(&self) -> FramecastResult<()> {
        self.timeline.validate()?;
        self.encoding.validate()?;
        for track in &self.audio_tracks {
            track.validate()?;
        }
        let mut seen = BTreeSet::new();
        for video in &self.embedded_videos {
            video.validate()?;
            if !seen.insert(video.id.as_str()) {
                return Err(FramecastError::validation(format!(
                    "duplicate embedded video id '{}'",
                    video.id
                )));
            }
        }
        Ok(())
    }
}

fn validate_volume(v: f64, what: &str) -> FramecastResult<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(FramecastError::validation(format!(
            "{what} must be finite and >= 0"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/config/model.rs"]
mod tests;
