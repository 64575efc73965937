use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::config::model::{CompositionConfig, FrameFormat};
use crate::graph::builder::FilterGraph;

/// Video codec for the output file.
pub const VIDEO_CODEC: &str = "libx264";
/// Output pixel format.
pub const PIXEL_FORMAT: &str = "yuv420p";
/// Audio codec used when the graph has an audio output.
pub const AUDIO_CODEC: &str = "aac";
/// Audio bitrate used when the graph has an audio output.
pub const AUDIO_BITRATE: &str = "192k";

/// Full encoder argument vector (program name excluded).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncoderArgs(Vec<OsString>);

impl EncoderArgs {
    fn push(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.0.push(arg.as_ref().to_os_string());
        self
    }

    fn push_all<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in args {
            self.push(a);
        }
        self
    }

    /// Borrow the arguments.
    pub fn as_slice(&self) -> &[OsString] {
        &self.0
    }

    /// Lossy UTF-8 rendering, for logs and tests.
    pub fn to_strings(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl IntoIterator for EncoderArgs {
    type Item = OsString;
    type IntoIter = std::vec::IntoIter<OsString>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build the encoder invocation for `cfg` with the prebuilt `graph`, writing to `output_path`.
///
/// Layout: frame-feed input on stdin, one optional seek + input per embedded video, one input per
/// audio track, the filter graph, output maps, codec settings, force-overwrite, output path.
pub fn build_encoder_args(
    cfg: &CompositionConfig,
    graph: &FilterGraph,
    output_path: &Path,
) -> EncoderArgs {
    let mut args = EncoderArgs::default();
    let fps = cfg.timeline.fps.to_string();

    match cfg.encoding.frame_format {
        FrameFormat::RawRgba => {
            let size = format!("{}x{}", cfg.timeline.width, cfg.timeline.height);
            args.push_all([
                "-f", "rawvideo", "-pix_fmt", "rgba", "-s", size.as_str(), "-r", fps.as_str(), "-i", "-",
            ]);
        }
        FrameFormat::Png => {
            args.push_all(["-f", "image2pipe", "-vcodec", "png", "-r", fps.as_str(), "-i", "-"]);
        }
    }

    for video in &cfg.embedded_videos {
        if video.trim_start_seconds != 0.0 {
            args.push("-ss").push(video.trim_start_seconds.to_string());
        }
        args.push("-i").push(&video.video_path);
    }

    for track in &cfg.audio_tracks {
        args.push("-i").push(track.source.as_input());
    }

    args.push("-filter_complex").push(&graph.graph);
    args.push("-map").push(&graph.video_output_label);
    match &graph.audio_output_label {
        Some(label) => {
            args.push("-map").push(label);
            args.push_all(["-c:a", AUDIO_CODEC, "-b:a", AUDIO_BITRATE]);
        }
        None => {
            args.push("-an");
        }
    }

    let crf = cfg.encoding.resolved_crf().to_string();
    args.push_all([
        "-c:v",
        VIDEO_CODEC,
        "-pix_fmt",
        PIXEL_FORMAT,
        "-preset",
        cfg.encoding.resolved_preset(),
        "-crf",
        crf.as_str(),
        "-y",
    ]);
    args.push(output_path);
    args
}

#[cfg(test)]
#[path = "../../tests/unit/encode/args.rs"]
mod tests;
