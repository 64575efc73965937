use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;

/// Extractor that fills each frame with its number and counts calls per frame.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail_first: AtomicUsize,
}

impl Counting {
    fn slow(ms: u64) -> Self {
        Self {
            delay: Some(Duration::from_millis(ms)),
            ..Self::default()
        }
    }

    fn failing_once() -> Self {
        Self {
            fail_first: AtomicUsize::new(1),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameExtractor for Counting {
    fn extract_frame(
        &self,
        _video_path: &Path,
        frame_number: u64,
        _source_fps: f64,
        width: u32,
        height: u32,
    ) -> FramecastResult<ExtractedFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FramecastError::extraction("decoder exploded"));
        }
        Ok(ExtractedFrame {
            frame_number,
            rgba: vec![frame_number as u8; width as usize * height as usize * 4],
            width,
            height,
        })
    }
}

fn frame(n: u64) -> ExtractedFrame {
    ExtractedFrame {
        frame_number: n,
        rgba: vec![0; 16],
        width: 2,
        height: 2,
    }
}

fn cache(max_frames: usize, max_memory_bytes: usize) -> FrameCache {
    FrameCache::new(FrameCacheConfig {
        max_frames,
        max_memory_bytes,
    })
}

const V: &str = "clip.mp4";

#[test]
fn inserting_past_capacity_evicts_first_inserted() {
    let c = cache(3, usize::MAX);
    for n in 0..4 {
        c.insert(Path::new(V), frame(n));
    }
    assert_eq!(c.len(), 3);
    assert!(!c.contains(Path::new(V), 0));
    for n in 1..4 {
        assert!(c.contains(Path::new(V), n));
    }
    assert_eq!(c.stats().evictions, 1);
}

#[test]
fn get_promotes_entry() {
    let c = cache(3, usize::MAX);
    for n in 0..3 {
        c.insert(Path::new(V), frame(n));
    }
    assert!(c.get(Path::new(V), 0).is_some());
    c.insert(Path::new(V), frame(3));
    assert!(c.contains(Path::new(V), 0));
    assert!(!c.contains(Path::new(V), 1));
}

#[test]
fn memory_bound_is_enforced() {
    // Each frame is 16 bytes; room for two.
    let c = cache(100, 40);
    for n in 0..5 {
        c.insert(Path::new(V), frame(n));
        assert!(c.current_bytes() <= 40);
        let ratio = c.memory_usage_ratio();
        assert!((0.0..=1.0).contains(&ratio));
    }
    assert_eq!(c.len(), 2);
    assert_eq!(c.current_bytes(), 32);
    assert!((c.memory_usage_ratio() - 0.8).abs() < 1e-12);
}

#[test]
fn memory_ratio_is_zero_when_empty_or_unbounded() {
    let c = cache(10, 1024);
    assert_eq!(c.memory_usage_ratio(), 0.0);
    let c = cache(10, 0);
    c.insert(Path::new(V), frame(0));
    assert_eq!(c.memory_usage_ratio(), 0.0);
    assert_eq!(c.current_bytes(), 0);
}

#[test]
fn reinserting_a_key_does_not_double_count() {
    let c = cache(10, usize::MAX);
    c.insert(Path::new(V), frame(1));
    c.insert(Path::new(V), frame(1));
    assert_eq!(c.len(), 1);
    assert_eq!(c.current_bytes(), 16);
}

#[test]
fn get_or_extract_caches_result() {
    let c = cache(10, usize::MAX);
    let ex = Counting::default();
    let a = c.get_or_extract(&ex, Path::new(V), 7, 30.0, 2, 2).unwrap();
    let b = c.get_or_extract(&ex, Path::new(V), 7, 30.0, 2, 2).unwrap();
    assert_eq!(ex.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    let s = c.stats();
    assert_eq!((s.hits, s.misses, s.extractions), (1, 1, 1));
}

#[test]
fn concurrent_requests_coalesce_into_one_extraction() {
    const K: usize = 8;
    let c = cache(10, usize::MAX);
    let ex = Counting::slow(50);
    let barrier = Barrier::new(K);

    let results: Vec<Arc<ExtractedFrame>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..K)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    c.get_or_extract(&ex, Path::new(V), 3, 30.0, 2, 2).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(ex.calls(), 1);
    assert_eq!(results.len(), K);
    for r in &results {
        assert_eq!(**r, *results[0]);
    }
    assert!(c.contains(Path::new(V), 3));
}

#[test]
fn failures_reach_every_waiter_and_are_not_cached() {
    const K: usize = 4;
    let c = cache(10, usize::MAX);
    let ex = Counting {
        delay: Some(Duration::from_millis(50)),
        ..Counting::failing_once()
    };
    let barrier = Barrier::new(K);

    let errors: Vec<FramecastError> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..K)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    c.get_or_extract(&ex, Path::new(V), 1, 30.0, 2, 2)
                        .unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(ex.calls(), 1);
    for e in &errors {
        assert!(matches!(e, FramecastError::Extraction(m) if m.contains("decoder exploded")));
    }
    assert!(c.is_empty());

    // Next call retries.
    assert!(c.get_or_extract(&ex, Path::new(V), 1, 30.0, 2, 2).is_ok());
    assert_eq!(ex.calls(), 2);
}

#[test]
fn wrongly_sized_frames_are_rejected() {
    struct Short;
    impl FrameExtractor for Short {
        fn extract_frame(
            &self,
            _: &Path,
            frame_number: u64,
            _: f64,
            width: u32,
            height: u32,
        ) -> FramecastResult<ExtractedFrame> {
            Ok(ExtractedFrame {
                frame_number,
                rgba: vec![0; 3],
                width,
                height,
            })
        }
    }
    let c = cache(10, usize::MAX);
    assert!(c.get_or_extract(&Short, Path::new(V), 0, 30.0, 2, 2).is_err());
    assert!(c.is_empty());
}

#[test]
fn preload_ahead_skips_cached_and_clips_to_total() {
    let c = cache(100, usize::MAX);
    let ex = Counting::default();
    c.get_or_extract(&ex, Path::new(V), 11, 30.0, 2, 2).unwrap();

    let loaded = c
        .preload_ahead(&ex, Path::new(V), 10, 10, Some(14), 30.0, 2, 2)
        .unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(ex.calls(), 4);
    for n in 10..14 {
        assert!(c.contains(Path::new(V), n));
    }
    assert!(!c.contains(Path::new(V), 14));
}

#[test]
fn preload_range_is_inclusive() {
    let c = cache(100, usize::MAX);
    let ex = Counting::default();
    assert_eq!(c.preload_range(&ex, Path::new(V), 5, 8, 30.0, 2, 2).unwrap(), 4);
    assert_eq!(c.len(), 4);
    assert_eq!(c.preload_range(&ex, Path::new(V), 5, 8, 30.0, 2, 2).unwrap(), 0);
    assert_eq!(ex.calls(), 4);
    assert!(c.preload_range(&ex, Path::new(V), 8, 5, 30.0, 2, 2).is_err());
}

#[test]
fn overlapping_preloads_extract_each_frame_once() {
    let c = cache(100, usize::MAX);
    let ex = Counting::slow(20);
    std::thread::scope(|s| {
        s.spawn(|| c.preload_range(&ex, Path::new(V), 0, 9, 30.0, 2, 2).unwrap());
        s.spawn(|| c.preload_range(&ex, Path::new(V), 5, 14, 30.0, 2, 2).unwrap());
    });
    assert_eq!(ex.calls(), 15);
    assert_eq!(c.len(), 15);
}

#[test]
fn preload_reports_failure_after_batch_settles() {
    let c = cache(100, usize::MAX);
    let ex = Counting::failing_once();
    assert!(c.preload_range(&ex, Path::new(V), 0, 3, 30.0, 2, 2).is_err());
    assert_eq!(ex.calls(), 4);
    assert_eq!(c.len(), 3);
}

#[test]
fn evict_outside_window_only_touches_one_video() {
    let c = cache(100, usize::MAX);
    for n in 0..20 {
        c.insert(Path::new(V), frame(n));
        c.insert(Path::new("other.mp4"), frame(n));
    }
    let removed = c.evict_outside_window(Path::new(V), 10, 4);
    assert_eq!(removed, 15);
    for n in 8..=12 {
        assert!(c.contains(Path::new(V), n));
    }
    assert!(!c.contains(Path::new(V), 7));
    assert!(!c.contains(Path::new(V), 13));
    assert_eq!(c.len(), 25);
    assert_eq!(c.current_bytes(), 25 * 16);
}

#[test]
fn clear_video_and_clear_all_fix_accounting() {
    let c = cache(100, usize::MAX);
    for n in 0..3 {
        c.insert(Path::new(V), frame(n));
        c.insert(Path::new("other.mp4"), frame(n));
    }
    assert_eq!(c.clear_video(Path::new(V)), 3);
    assert_eq!(c.current_bytes(), 48);
    c.clear_all();
    assert!(c.is_empty());
    assert_eq!(c.current_bytes(), 0);
    assert_eq!(c.memory_usage_ratio(), 0.0);
}
