pub(crate) mod frame_cache;
/// Process-wide shared frame cache.
pub mod registry;
