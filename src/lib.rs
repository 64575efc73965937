//! Framecast turns a declarative audiovisual timeline into an encoded video file.
//!
//! The pipeline has three parts:
//!
//! - [`build_filter_graph`] compiles a [`CompositionConfig`] into an ffmpeg filter graph
//! - [`EncodingOrchestrator`] spawns the encoder and exposes an [`EncodingSession`] that accepts
//!   rendered frames over the encoder's stdin
//! - [`FrameCache`] serves decoded frames of embedded video clips, coalescing concurrent requests
//!   and preloading ahead of the playhead
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod encode;
pub(crate) mod graph;
pub(crate) mod media;

pub use crate::foundation::core::{FrameRange, centered_window};
pub use crate::foundation::error::{FramecastError, FramecastResult};

pub use crate::config::model::{
    AudioSource, AudioTrackConfig, CompositionConfig, EmbeddedVideoConfig, EmbeddedVideoMode,
    EncodingConfig, FrameFormat, Quality, TimelineConfig,
};
pub use crate::graph::builder::{
    AUDIO_OUTPUT_LABEL, FilterGraph, VIDEO_OUTPUT_LABEL, build_filter_graph,
};

pub use crate::encode::args::{
    AUDIO_BITRATE, AUDIO_CODEC, EncoderArgs, PIXEL_FORMAT, VIDEO_CODEC, build_encoder_args,
};
pub use crate::encode::session::{
    Completion, EncodePlan, EncodingOrchestrator, EncodingSession, FrameFeed, OrchestratorOpts,
    Outcome,
};
pub use crate::encode::temp::{
    FixedTempDir, ProcessTempDir, TempDirProvider, ensure_dir, output_path_in,
};

pub use crate::media::extract::{ExtractedFrame, FfmpegFrameExtractor, FrameExtractor};
pub use crate::media::probe::{
    FfprobeProbe, MediaProbe, VideoMetadata, parse_ffprobe_json, validate_embedded_video,
};

pub use crate::cache::frame_cache::{FrameCache, FrameCacheConfig, FrameCacheStats};
pub use crate::cache::registry;
