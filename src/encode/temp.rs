use std::path::{Path, PathBuf};

use crate::foundation::error::{FramecastError, FramecastResult};

/// Resolves the directory encoding sessions write their output into.
pub trait TempDirProvider: Send + Sync {
    /// Return an existing, writable directory.
    fn temp_dir(&self) -> FramecastResult<PathBuf>;
}

/// `<system temp>/framecast-<pid>`, created on demand.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTempDir;

impl TempDirProvider for ProcessTempDir {
    fn temp_dir(&self) -> FramecastResult<PathBuf> {
        let dir = std::env::temp_dir().join(format!("framecast-{}", std::process::id()));
        ensure_dir(&dir)?;
        Ok(dir)
    }
}

/// A caller-chosen directory, created on demand.
#[derive(Clone, Debug)]
pub struct FixedTempDir(
    /// Output directory.
    pub PathBuf,
);

impl TempDirProvider for FixedTempDir {
    fn temp_dir(&self) -> FramecastResult<PathBuf> {
        ensure_dir(&self.0)?;
        Ok(self.0.clone())
    }
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> FramecastResult<()> {
    use anyhow::Context as _;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    Ok(())
}

/// Join a caller-supplied output file name onto `dir`.
///
/// The name must be a single path component; separators and `..` are rejected.
pub fn output_path_in(dir: &Path, file_name: &str) -> FramecastResult<PathBuf> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        return Err(FramecastError::validation("output file name must be non-empty"));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(FramecastError::validation(format!(
            "output file name '{file_name}' must be a plain file name"
        )));
    }
    Ok(dir.join(trimmed))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/temp.rs"]
mod tests;
