//! LRU cache of decoded embedded-video frames.
//!
//! Two bounds (entry count and total bytes) are enforced on every insert. Concurrent misses on the
//! same `(video_path, frame_number)` coalesce onto a single extractor call; the extracted frame is
//! cached before any waiter sees it. Failed extractions are never cached.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;

use crate::foundation::core::{FrameRange, centered_window};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::foundation::slot::SettleOnce;
use crate::media::extract::{ExtractedFrame, FrameExtractor};

const DEFAULT_MAX_FRAMES: usize = 120;
const DEFAULT_MAX_MEMORY_BYTES: usize = 512 * 1024 * 1024;

/// Bounds for a [`FrameCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCacheConfig {
    /// Maximum number of cached frames.
    pub max_frames: usize,
    /// Maximum total `size_in_bytes` of cached frames.
    pub max_memory_bytes: usize,
}

impl Default for FrameCacheConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
        }
    }
}

impl FrameCacheConfig {
    /// Defaults overridden by `FRAMECAST_CACHE_MAX_FRAMES` / `FRAMECAST_CACHE_MAX_BYTES`.
    ///
    /// Unparseable or zero values fall back to the defaults.
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<usize> {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
        }
        let d = Self::default();
        Self {
            max_frames: var("FRAMECAST_CACHE_MAX_FRAMES").unwrap_or(d.max_frames),
            max_memory_bytes: var("FRAMECAST_CACHE_MAX_BYTES").unwrap_or(d.max_memory_bytes),
        }
    }
}

/// Counters and current occupancy of a [`FrameCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that missed (including ones that joined an in-flight extraction).
    pub misses: u64,
    /// Extractor invocations.
    pub extractions: u64,
    /// Entries dropped to satisfy a bound.
    pub evictions: u64,
    /// Current entry count.
    pub entries: usize,
    /// Current byte total.
    pub bytes: usize,
}

type FrameKey = (PathBuf, u64);

struct Entry {
    frame: Arc<ExtractedFrame>,
    tick: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<FrameKey, Entry>,
    // tick -> key, oldest first.
    recency: BTreeMap<u64, FrameKey>,
    next_tick: u64,
    bytes: usize,
    inflight: HashMap<FrameKey, Arc<InFlight>>,
    stats: FrameCacheStats,
}

impl State {
    fn bump(&mut self) -> u64 {
        let t = self.next_tick;
        self.next_tick += 1;
        t
    }

    fn touch(&mut self, key: &FrameKey) -> Option<Arc<ExtractedFrame>> {
        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(entry.frame.clone())
    }

    fn insert(&mut self, key: FrameKey, frame: Arc<ExtractedFrame>, cfg: FrameCacheConfig) {
        self.remove(&key);
        let tick = self.bump();
        self.bytes += frame.size_in_bytes();
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, Entry { frame, tick });

        while self.entries.len() > cfg.max_frames || self.bytes > cfg.max_memory_bytes {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            if let Some(e) = self.entries.remove(&oldest) {
                self.bytes -= e.frame.size_in_bytes();
                self.stats.evictions += 1;
                tracing::trace!(path = %oldest.0.display(), frame = oldest.1, "evicted frame");
            }
        }
    }

    fn remove(&mut self, key: &FrameKey) -> bool {
        match self.entries.remove(key) {
            Some(e) => {
                self.recency.remove(&e.tick);
                self.bytes -= e.frame.size_in_bytes();
                true
            }
            None => false,
        }
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&FrameKey) -> bool) -> usize {
        let doomed: Vec<FrameKey> = self.entries.keys().filter(|k| pred(k)).cloned().collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

type Shared = Result<Arc<ExtractedFrame>, String>;

/// Result slot shared by every requester of one in-flight key.
type InFlight = SettleOnce<Shared>;

/// Settles an in-flight slot with an error if the extracting thread unwinds.
struct LeaderGuard<'a> {
    cache: &'a FrameCache,
    key: &'a FrameKey,
    flight: &'a InFlight,
    done: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.cache.lock().inflight.remove(self.key);
        self.flight
            .settle(Err("frame extractor panicked".to_string()));
    }
}

enum Role {
    Hit(Arc<ExtractedFrame>),
    Leader(Arc<InFlight>),
    Waiter(Arc<InFlight>),
}

/// Bounded, thread-safe LRU cache of [`ExtractedFrame`]s keyed by `(video_path, frame_number)`.
pub struct FrameCache {
    cfg: FrameCacheConfig,
    state: Mutex<State>,
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("cfg", &self.cfg)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(FrameCacheConfig::default())
    }
}

impl FrameCache {
    /// Create an empty cache with the given bounds.
    pub fn new(cfg: FrameCacheConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State::default()),
        }
    }

    /// The bounds this cache enforces.
    pub fn config(&self) -> FrameCacheConfig {
        self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached frame for the key, marking it most recently used.
    pub fn get(&self, video_path: &Path, frame_number: u64) -> Option<Arc<ExtractedFrame>> {
        let key = (video_path.to_path_buf(), frame_number);
        let mut st = self.lock();
        let hit = st.touch(&key);
        if hit.is_some() {
            st.stats.hits += 1;
        }
        hit
    }

    /// `true` when the key is cached. Does not affect recency.
    pub fn contains(&self, video_path: &Path, frame_number: u64) -> bool {
        self.lock()
            .entries
            .contains_key(&(video_path.to_path_buf(), frame_number))
    }

    /// Insert a frame under `(video_path, frame.frame_number)`, evicting as needed.
    pub fn insert(&self, video_path: &Path, frame: ExtractedFrame) -> Arc<ExtractedFrame> {
        let frame = Arc::new(frame);
        let key = (video_path.to_path_buf(), frame.frame_number);
        self.lock().insert(key, frame.clone(), self.cfg);
        frame
    }

    /// Return the cached frame or extract it, coalescing concurrent requests for the same key.
    pub fn get_or_extract(
        &self,
        extractor: &dyn FrameExtractor,
        video_path: &Path,
        frame_number: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<Arc<ExtractedFrame>> {
        let key = (video_path.to_path_buf(), frame_number);

        let role = {
            let mut st = self.lock();
            if let Some(frame) = st.touch(&key) {
                st.stats.hits += 1;
                Role::Hit(frame)
            } else {
                st.stats.misses += 1;
                match st.inflight.get(&key) {
                    Some(flight) => Role::Waiter(flight.clone()),
                    None => {
                        let flight = Arc::new(InFlight::default());
                        st.inflight.insert(key.clone(), flight.clone());
                        st.stats.extractions += 1;
                        Role::Leader(flight)
                    }
                }
            }
        };

        let flight = match role {
            Role::Hit(frame) => {
                tracing::trace!(path = %video_path.display(), frame = frame_number, "cache hit");
                return Ok(frame);
            }
            Role::Waiter(flight) => return flight.wait().map_err(FramecastError::Extraction),
            Role::Leader(flight) => flight,
        };

        tracing::trace!(path = %video_path.display(), frame = frame_number, "cache miss");
        let mut guard = LeaderGuard {
            cache: self,
            key: &key,
            flight: &flight,
            done: false,
        };

        let extracted = extractor
            .extract_frame(video_path, frame_number, source_fps, width, height)
            .and_then(|frame| {
                if frame.rgba.len() != frame.size_in_bytes() {
                    return Err(FramecastError::extraction(format!(
                        "extracted frame {frame_number} has {} bytes, expected {}",
                        frame.rgba.len(),
                        frame.size_in_bytes()
                    )));
                }
                Ok(Arc::new(frame))
            });

        let shared: Shared = {
            let mut st = self.lock();
            st.inflight.remove(&key);
            match extracted {
                Ok(frame) => {
                    st.insert(key.clone(), frame.clone(), self.cfg);
                    Ok(frame)
                }
                Err(e) => Err(extraction_message(e)),
            }
        };
        guard.done = true;
        flight.settle(shared.clone());
        shared.map_err(FramecastError::Extraction)
    }

    /// Extract every missing frame in `[current_frame, current_frame + ahead_count)`, clipped to
    /// `total_frames` when given. Returns how many frames were missing.
    #[allow(clippy::too_many_arguments)]
    pub fn preload_ahead(
        &self,
        extractor: &dyn FrameExtractor,
        video_path: &Path,
        current_frame: u64,
        ahead_count: u64,
        total_frames: Option<u64>,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<usize> {
        let mut range = FrameRange::starting_at(current_frame, ahead_count);
        if let Some(total) = total_frames {
            range = range.clip_end(total);
        }
        self.preload(extractor, video_path, range, source_fps, width, height)
    }

    /// Extract every missing frame in `[start_frame, end_frame]`. Returns how many were missing.
    #[allow(clippy::too_many_arguments)]
    pub fn preload_range(
        &self,
        extractor: &dyn FrameExtractor,
        video_path: &Path,
        start_frame: u64,
        end_frame: u64,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<usize> {
        let range = FrameRange::inclusive(start_frame, end_frame)?;
        self.preload(extractor, video_path, range, source_fps, width, height)
    }

    fn preload(
        &self,
        extractor: &dyn FrameExtractor,
        video_path: &Path,
        range: FrameRange,
        source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<usize> {
        let missing: Vec<u64> = {
            let st = self.lock();
            range
                .frames()
                .filter(|&n| !st.entries.contains_key(&(video_path.to_path_buf(), n)))
                .collect()
        };
        if missing.is_empty() {
            return Ok(0);
        }

        // Let every extraction in the batch settle before reporting the first failure.
        let results: Vec<FramecastResult<Arc<ExtractedFrame>>> = missing
            .par_iter()
            .map(|&n| self.get_or_extract(extractor, video_path, n, source_fps, width, height))
            .collect();
        for r in results {
            r?;
        }
        tracing::debug!(path = %video_path.display(), frames = missing.len(), "preloaded frames");
        Ok(missing.len())
    }

    /// Drop this video's frames outside `[center - window/2, center + window/2]`.
    ///
    /// Returns the number of dropped entries. Other videos are untouched.
    pub fn evict_outside_window(
        &self,
        video_path: &Path,
        center_frame: u64,
        window_size: u64,
    ) -> usize {
        let window = centered_window(center_frame, window_size);
        self.lock()
            .remove_where(|(p, n)| p == video_path && !window.contains(*n))
    }

    /// Drop every cached frame of one video.
    pub fn clear_video(&self, video_path: &Path) -> usize {
        self.lock().remove_where(|(p, _)| p == video_path)
    }

    /// Drop every cached frame.
    pub fn clear_all(&self) {
        let mut st = self.lock();
        st.entries.clear();
        st.recency.clear();
        st.bytes = 0;
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `size_in_bytes` of cached frames.
    pub fn current_bytes(&self) -> usize {
        self.lock().bytes
    }

    /// `current_bytes / max_memory_bytes`, or `0.0` when the byte bound is 0.
    pub fn memory_usage_ratio(&self) -> f64 {
        if self.cfg.max_memory_bytes == 0 {
            return 0.0;
        }
        self.current_bytes() as f64 / self.cfg.max_memory_bytes as f64
    }

    /// Snapshot of counters and occupancy.
    pub fn stats(&self) -> FrameCacheStats {
        let st = self.lock();
        FrameCacheStats {
            entries: st.entries.len(),
            bytes: st.bytes,
            ..st.stats
        }
    }
}

fn extraction_message(e: FramecastError) -> String {
    match e {
        FramecastError::Extraction(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
