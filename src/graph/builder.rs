//! Compile a [`CompositionConfig`] into an ffmpeg `-filter_complex` graph.
//!
//! Input indexing: `0` is the primary raw-frame stream, embedded videos take `1..=N` in declared
//! order, separate audio tracks follow in declared order. Every collection is walked in its
//! declared order, so the same config always yields the same bytes.

use crate::config::model::{CompositionConfig, EmbeddedVideoMode};
use crate::foundation::error::{FramecastError, FramecastResult};

/// Label of the final video stream.
pub const VIDEO_OUTPUT_LABEL: &str = "[v_out]";
/// Label of the final audio stream, present only when some source produces audio.
pub const AUDIO_OUTPUT_LABEL: &str = "[a_mix_out]";

/// `aloop` size used for infinite looping (ffmpeg's `INT_MAX`).
const LOOP_SIZE: u64 = 2_147_483_647;

/// Output of [`build_filter_graph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    /// The `-filter_complex` argument.
    pub graph: String,
    /// Always [`VIDEO_OUTPUT_LABEL`].
    pub video_output_label: String,
    /// [`AUDIO_OUTPUT_LABEL`] when at least one source produces audio.
    pub audio_output_label: Option<String>,
    /// Number of embedded video inputs (indices `1..=embedded_video_count`).
    pub embedded_video_count: usize,
}

impl FilterGraph {
    /// Number of `;`-separated filter chains in the graph.
    pub fn chain_count(&self) -> usize {
        self.graph.split(';').filter(|c| !c.is_empty()).count()
    }
}

/// Per-source audio processing, shared by embedded clips and separate tracks.
#[derive(Debug, Clone, Copy)]
struct AudioChain {
    input_index: usize,
    start_frame: u64,
    duration_in_frames: u64,
    trim_start_frames: u64,
    fade_in_frames: u64,
    fade_out_frames: u64,
    volume: f64,
    looping: bool,
}

impl AudioChain {
    /// Filters in their fixed order: trim, fade-in, fade-out, volume, loop, delay.
    fn stages(&self, fps: u32) -> Vec<String> {
        let mut out = Vec::new();
        if self.trim_start_frames > 0 {
            out.push(format!(
                "atrim=start={}",
                fmt_num(frames_to_secs(self.trim_start_frames, fps))
            ));
            out.push("asetpts=PTS-STARTPTS".to_string());
        }
        if self.fade_in_frames > 0 {
            out.push(format!(
                "afade=t=in:st=0:d={}",
                fmt_num(frames_to_secs(self.fade_in_frames, fps))
            ));
        }
        if self.fade_out_frames > 0 {
            let start = self.duration_in_frames.saturating_sub(self.fade_out_frames);
            out.push(format!(
                "afade=t=out:st={}:d={}",
                fmt_num(frames_to_secs(start, fps)),
                fmt_num(frames_to_secs(self.fade_out_frames, fps))
            ));
        }
        if self.volume != 1.0 {
            out.push(format!("volume={}", self.volume));
        }
        if self.looping {
            out.push(format!("aloop=loop=-1:size={LOOP_SIZE}"));
        }
        if self.start_frame > 0 {
            let ms = frames_to_delay_ms(self.start_frame, fps);
            out.push(format!("adelay={ms}|{ms}"));
        }
        out
    }
}

/// Build the filter graph for `cfg`.
///
/// Fails only on a structurally invalid config (`fps == 0`).
pub fn build_filter_graph(cfg: &CompositionConfig) -> FramecastResult<FilterGraph> {
    let fps = cfg.timeline.fps;
    if fps == 0 {
        return Err(FramecastError::validation("timeline fps must be > 0"));
    }

    let embedded_video_count = cfg.embedded_videos.len();
    let mut chains = Vec::<String>::new();

    build_video_chains(cfg, &mut chains);

    let mut sources = Vec::<AudioChain>::new();
    for (i, video) in cfg.embedded_videos.iter().enumerate() {
        if !video.produces_audio() {
            continue;
        }
        // The input seek already skips `trim_start_seconds`.
        sources.push(AudioChain {
            input_index: i + 1,
            start_frame: video.start_frame,
            duration_in_frames: video.duration_in_frames,
            trim_start_frames: 0,
            fade_in_frames: video.audio_fade_in_frames,
            fade_out_frames: video.audio_fade_out_frames,
            volume: video.audio_volume,
            looping: false,
        });
    }
    for (j, track) in cfg.audio_tracks.iter().enumerate() {
        if track.duration_in_frames == 0 {
            continue;
        }
        sources.push(AudioChain {
            input_index: embedded_video_count + j + 1,
            start_frame: track.start_frame,
            duration_in_frames: track.duration_in_frames,
            trim_start_frames: track.trim_start_frame,
            fade_in_frames: track.fade_in_frames,
            fade_out_frames: track.fade_out_frames,
            volume: track.volume,
            looping: track.looping,
        });
    }

    let audio_output_label = match sources.as_slice() {
        [] => None,
        [only] => {
            chains.push(audio_chain_text(only, fps, AUDIO_OUTPUT_LABEL));
            Some(AUDIO_OUTPUT_LABEL.to_string())
        }
        many => {
            let mut mix_inputs = String::new();
            for (k, src) in many.iter().enumerate() {
                let label = format!("[a{k}]");
                chains.push(audio_chain_text(src, fps, &label));
                mix_inputs.push_str(&label);
            }
            chains.push(format!(
                "{mix_inputs}amix=inputs={}:duration=longest{AUDIO_OUTPUT_LABEL}",
                many.len()
            ));
            Some(AUDIO_OUTPUT_LABEL.to_string())
        }
    };

    let graph = FilterGraph {
        graph: chains.join(";"),
        video_output_label: VIDEO_OUTPUT_LABEL.to_string(),
        audio_output_label,
        embedded_video_count,
    };
    tracing::debug!(
        embedded_video_count,
        audio_sources = sources.len(),
        has_audio = graph.audio_output_label.is_some(),
        "built filter graph"
    );
    Ok(graph)
}

fn build_video_chains(cfg: &CompositionConfig, chains: &mut Vec<String>) {
    let fps = cfg.timeline.fps;
    let base = format!("[0:v]fps={fps},format=yuv420p");

    if cfg.embedded_video_mode == EmbeddedVideoMode::FrameFeed || cfg.embedded_videos.is_empty() {
        chains.push(format!("{base}{VIDEO_OUTPUT_LABEL}"));
        return;
    }

    chains.push(format!("{base}[v_base]"));
    let last = cfg.embedded_videos.len() - 1;
    let mut current = "[v_base]".to_string();
    for (k, video) in cfg.embedded_videos.iter().enumerate() {
        let start = frames_to_secs(video.start_frame, fps);
        let end = frames_to_secs(video.start_frame.saturating_add(video.duration_in_frames), fps);
        let clip = format!("[ev{k}]");
        chains.push(format!(
            "[{}:v]setpts=PTS-STARTPTS+{}/TB,scale={}:{}{clip}",
            k + 1,
            fmt_num(start),
            video.width,
            video.height
        ));
        let next = if k == last {
            VIDEO_OUTPUT_LABEL.to_string()
        } else {
            format!("[v_ov{k}]")
        };
        chains.push(format!(
            "{current}{clip}overlay=x={}:y={}:enable='between(t,{},{})'{next}",
            video.x,
            video.y,
            fmt_num(start),
            fmt_num(end)
        ));
        current = next;
    }
}

fn audio_chain_text(src: &AudioChain, fps: u32, out_label: &str) -> String {
    let stages = src.stages(fps);
    let mut s = format!("[{}:a]", src.input_index);
    if stages.is_empty() {
        s.push_str("anull");
    } else {
        s.push_str(&stages.join(","));
    }
    s.push_str(out_label);
    s
}

fn frames_to_secs(frames: u64, fps: u32) -> f64 {
    frames as f64 / f64::from(fps)
}

/// Frames to whole milliseconds, rounding half up. Integer math keeps it exact for any fps.
pub(crate) fn frames_to_delay_ms(frames: u64, fps: u32) -> u64 {
    let fps = u128::from(fps);
    let ms = (u128::from(frames) * 1000 + fps / 2) / fps;
    u64::try_from(ms).unwrap_or(u64::MAX)
}

/// Fixed six-decimal rendering with trailing zeros removed (`9.0` -> `9`, `0.5` -> `0.5`).
///
/// Only for seconds derived from frame counts; user-supplied values keep their exact `{}` form.
pub(crate) fn fmt_num(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/builder.rs"]
mod tests;
