use crate::foundation::error::{FramecastError, FramecastResult};

/// Half-open frame range `[start, end)` in frame-number space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: u64,
    /// Exclusive range end.
    pub end: u64,
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: u64, end: u64) -> FramecastResult<Self> {
        if start > end {
            return Err(FramecastError::validation("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Range covering `[start, end_inclusive]`.
    pub fn inclusive(start: u64, end_inclusive: u64) -> FramecastResult<Self> {
        Self::new(start, end_inclusive.saturating_add(1))
    }

    /// `count` frames starting at `start`, saturating at `u64::MAX`.
    pub fn starting_at(start: u64, count: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(count),
        }
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: u64) -> bool {
        self.start <= f && f < self.end
    }

    /// Clip the end of the range to `limit` (exclusive). Empty results keep `start`.
    pub fn clip_end(self, limit: u64) -> Self {
        Self {
            start: self.start,
            end: self.end.min(limit).max(self.start),
        }
    }

    /// Iterate over the frame numbers in the range.
    pub fn frames(self) -> std::ops::Range<u64> {
        self.start..self.end.max(self.start)
    }
}

/// Symmetric window `[center - size/2, center + size/2]` as a half-open range.
///
/// The lower bound saturates at 0.
pub fn centered_window(center: u64, window_size: u64) -> FrameRange {
    let half = window_size / 2;
    FrameRange {
        start: center.saturating_sub(half),
        end: center.saturating_add(half).saturating_add(1),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
