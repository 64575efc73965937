use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::foundation::error::{FramecastError, FramecastResult};

/// One decoded frame of an embedded clip, straight-alpha RGBA8, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedFrame {
    /// Source frame number.
    pub frame_number: u64,
    /// Pixel bytes, `width * height * 4` long.
    pub rgba: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ExtractedFrame {
    /// Bytes accounted against the frame cache's memory bound.
    pub fn size_in_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Encode the frame as a PNG, for `png` frame feeds.
    pub fn to_png(&self) -> FramecastResult<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| {
                FramecastError::validation(format!(
                    "frame {} has {} bytes, expected {}",
                    self.frame_number,
                    self.rgba.len(),
                    self.size_in_bytes()
                ))
            })?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| FramecastError::io(format!("png encode failed: {e}")))?;
        Ok(buf)
    }
}

/// Decodes frames of a video file at a requested size.
///
/// Implementations must be callable from several threads at once; the frame cache runs batch
/// extractions in parallel.
pub trait FrameExtractor: Send + Sync {
    /// Decode frame `frame_number` scaled to `width x height`.
    fn extract_frame(
        &self,
        video_path: &Path,
        frame_number: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<ExtractedFrame>;

    /// Decode up to `count` sequential frames starting at `start_frame`.
    fn extract_frames(
        &self,
        video_path: &Path,
        start_frame: u64,
        count: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<Vec<ExtractedFrame>> {
        (start_frame..start_frame.saturating_add(count))
            .map(|n| self.extract_frame(video_path, n, source_fps, width, height))
            .collect()
    }
}

/// [`FrameExtractor`] that shells out to the system `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegFrameExtractor {
    program: PathBuf,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegFrameExtractor {
    /// Use `program` instead of `ffmpeg` from `PATH`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn decode(
        &self,
        video_path: &Path,
        start_frame: u64,
        count: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<Vec<ExtractedFrame>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if !source_fps.is_finite() || source_fps <= 0.0 {
            return Err(FramecastError::extraction("source fps must be finite and > 0"));
        }
        let frame_len = width as usize * height as usize * 4;
        if frame_len == 0 {
            return Err(FramecastError::extraction(
                "extraction width/height must be > 0",
            ));
        }

        let seek = format!("{:.9}", start_frame as f64 / source_fps);
        let frames = count.to_string();
        let scale = format!("scale={width}:{height}");
        let out = Command::new(&self.program)
            .args(["-v", "error", "-ss", seek.as_str()])
            .arg("-i")
            .arg(video_path)
            .args([
                "-frames:v",
                frames.as_str(),
                "-vf",
                scale.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .output()
            .map_err(|e| {
                FramecastError::extraction(format!("failed to run ffmpeg for frame decode: {e}"))
            })?;

        if !out.status.success() {
            return Err(FramecastError::extraction(format!(
                "ffmpeg frame decode failed for '{}': {}",
                video_path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        if out.stdout.len() < frame_len || !out.stdout.len().is_multiple_of(frame_len) {
            return Err(FramecastError::extraction(format!(
                "decoded frame batch has invalid size: got {} bytes, expected multiples of {frame_len}",
                out.stdout.len()
            )));
        }

        let available = (out.stdout.len() / frame_len).min(count as usize);
        Ok(out
            .stdout
            .chunks_exact(frame_len)
            .take(available)
            .enumerate()
            .map(|(i, rgba)| ExtractedFrame {
                frame_number: start_frame + i as u64,
                rgba: rgba.to_vec(),
                width,
                height,
            })
            .collect())
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    #[tracing::instrument(skip(self))]
    fn extract_frame(
        &self,
        video_path: &Path,
        frame_number: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<ExtractedFrame> {
        let mut frames = self.decode(video_path, frame_number, 1, source_fps, width, height)?;
        frames.pop().ok_or_else(|| {
            FramecastError::extraction(format!(
                "ffmpeg returned no frame {frame_number} for '{}'",
                video_path.display()
            ))
        })
    }

    fn extract_frames(
        &self,
        video_path: &Path,
        start_frame: u64,
        count: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<Vec<ExtractedFrame>> {
        self.decode(video_path, start_frame, count, source_fps, width, height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/extract.rs"]
mod tests;
