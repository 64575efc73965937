//! Encoder process lifecycle.
//!
//! An [`EncodingOrchestrator`] runs at most one [`EncodingSession`] at a time. A session owns the
//! spawned encoder: frames go in through a [`FrameFeed`] over the encoder's stdin, and the outcome is
//! reported once through a [`Completion`].

use std::ffi::OsString;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::model::{CompositionConfig, FrameFormat};
use crate::encode::args::{EncoderArgs, build_encoder_args};
use crate::encode::temp::{ProcessTempDir, TempDirProvider, output_path_in};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::foundation::slot::SettleOnce;
use crate::graph::builder::{FilterGraph, build_filter_graph};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Options for an [`EncodingOrchestrator`].
#[derive(Clone)]
pub struct OrchestratorOpts {
    /// Encoder executable.
    pub program: PathBuf,
    /// Arguments placed before the generated vector (for example `-hide_banner`).
    pub leading_args: Vec<OsString>,
    /// Where output files are written.
    pub temp_dir: Arc<dyn TempDirProvider>,
}

impl Default for OrchestratorOpts {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            leading_args: Vec::new(),
            temp_dir: Arc::new(ProcessTempDir),
        }
    }
}

impl std::fmt::Debug for OrchestratorOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorOpts")
            .field("program", &self.program)
            .field("leading_args", &self.leading_args)
            .finish_non_exhaustive()
    }
}

/// Everything needed to launch the encoder, computed without side effects on the process.
#[derive(Clone, Debug)]
pub struct EncodePlan {
    /// The built filter graph.
    pub graph: FilterGraph,
    /// Arguments after `leading_args`.
    pub args: EncoderArgs,
    /// Where the output file will be written.
    pub output_path: PathBuf,
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code 0; the output file is complete.
    Finished(PathBuf),
    /// Non-zero exit with captured stderr.
    Failed {
        /// Exit status.
        status: ExitStatus,
        /// Raw stderr text.
        stderr: String,
    },
    /// The process could not be waited on.
    Lost(String),
    /// Terminated by [`EncodingSession::cancel`]; the output file is invalid.
    Cancelled,
}

impl Outcome {
    fn into_result(self) -> FramecastResult<PathBuf> {
        match self {
            Self::Finished(path) => Ok(path),
            Self::Failed { status, stderr } => Err(FramecastError::Process { status, stderr }),
            Self::Lost(msg) => Err(FramecastError::io(msg)),
            Self::Cancelled => Err(FramecastError::Cancelled),
        }
    }
}

/// Single-resolution result of an encoding session. Cheap to clone; all clones observe the same
/// outcome.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    inner: Arc<SettleOnce<Outcome>>,
}

impl Completion {
    /// Block until the session settles. `Ok` carries the output path.
    pub fn wait(&self) -> FramecastResult<PathBuf> {
        self.inner.wait().into_result()
    }

    /// Block for at most `timeout`. `None` while still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FramecastResult<PathBuf>> {
        self.inner.wait_timeout(timeout).map(Outcome::into_result)
    }

    /// The outcome if already settled.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.get()
    }

    /// `true` once the session has settled.
    pub fn is_settled(&self) -> bool {
        self.inner.get().is_some()
    }

    fn settle(&self, outcome: Outcome) -> bool {
        self.inner.settle(outcome)
    }
}

struct FeedInner {
    stdin: Mutex<Option<ChildStdin>>,
    format: FrameFormat,
    frame_len: usize,
    frames_written: AtomicU64,
}

/// Write-only frame sink over the encoder's stdin.
///
/// Frames must be written whole and in non-decreasing timeline order; concurrent writers are
/// serialized but never reordered.
#[derive(Clone)]
pub struct FrameFeed {
    inner: Arc<FeedInner>,
}

impl std::fmt::Debug for FrameFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFeed")
            .field("format", &self.inner.format)
            .field("frames_written", &self.frames_written())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FrameFeed {
    fn new(stdin: ChildStdin, format: FrameFormat, frame_len: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                stdin: Mutex::new(Some(stdin)),
                format,
                frame_len,
                frames_written: AtomicU64::new(0),
            }),
        }
    }

    /// Write one whole frame: `width * height * 4` bytes for `raw_rgba`, one PNG image for `png`.
    pub fn write_frame(&self, frame: &[u8]) -> FramecastResult<()> {
        match self.inner.format {
            FrameFormat::RawRgba if frame.len() != self.inner.frame_len => {
                return Err(FramecastError::validation(format!(
                    "frame size mismatch: got {} bytes, expected {}",
                    frame.len(),
                    self.inner.frame_len
                )));
            }
            FrameFormat::Png if !frame.starts_with(PNG_SIGNATURE) => {
                return Err(FramecastError::validation(
                    "png frame feed received data without a PNG signature",
                ));
            }
            _ => {}
        }

        let mut guard = self
            .inner
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(stdin) = guard.as_mut() else {
            return Err(FramecastError::io("frame feed is closed"));
        };
        stdin.write_all(frame).map_err(|e| {
            FramecastError::io(format!("failed to write frame to encoder stdin: {e}"))
        })?;
        self.inner.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush and close stdin so the encoder sees EOF and finalizes. Idempotent.
    pub fn close(&self) -> FramecastResult<()> {
        let taken = self
            .inner
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut stdin) = taken {
            stdin.flush().map_err(|e| {
                FramecastError::io(format!("failed to flush encoder stdin: {e}"))
            })?;
        }
        Ok(())
    }

    /// Number of frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.inner.frames_written.load(Ordering::Relaxed)
    }

    /// `true` after [`FrameFeed::close`].
    pub fn is_closed(&self) -> bool {
        self.inner
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// One session's hold on the orchestrator's active flag. Releases at most once.
struct SessionLease {
    active: Arc<AtomicBool>,
    released: AtomicBool,
}

impl SessionLease {
    fn acquire(active: &Arc<AtomicBool>) -> FramecastResult<Arc<Self>> {
        if active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FramecastError::configuration(
                "an encoding session is already active on this orchestrator",
            ));
        }
        Ok(Arc::new(Self {
            active: active.clone(),
            released: AtomicBool::new(false),
        }))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.active.store(false, Ordering::Release);
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Spawns encoder processes, one active session at a time.
#[derive(Debug)]
pub struct EncodingOrchestrator {
    opts: OrchestratorOpts,
    active: Arc<AtomicBool>,
}

impl Default for EncodingOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorOpts::default())
    }
}

impl EncodingOrchestrator {
    /// Create an orchestrator with the given options.
    pub fn new(opts: OrchestratorOpts) -> Self {
        Self {
            opts,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` while a session holds the orchestrator.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Validate `cfg`, build its graph and argument vector, and resolve the output path.
    pub fn plan(&self, cfg: &CompositionConfig, output_file_name: &str) -> FramecastResult<EncodePlan> {
        cfg.validate()?;
        let dir = self.opts.temp_dir.temp_dir()?;
        let output_path = output_path_in(&dir, output_file_name)?;
        let graph = build_filter_graph(cfg)?;
        let args = build_encoder_args(cfg, &graph, &output_path);
        Ok(EncodePlan {
            graph,
            args,
            output_path,
        })
    }

    /// Spawn the encoder for `cfg`, writing to `output_file_name` inside the temp directory.
    ///
    /// Fails with a configuration error while another session is active.
    #[tracing::instrument(skip(self, cfg))]
    pub fn start(
        &self,
        cfg: &CompositionConfig,
        output_file_name: &str,
    ) -> FramecastResult<EncodingSession> {
        let lease = SessionLease::acquire(&self.active)?;
        let plan = self.plan(cfg, output_file_name)?;
        tracing::debug!(
            program = %self.opts.program.display(),
            args = ?plan.args.to_strings(),
            "spawning encoder"
        );

        let mut child = Command::new(&self.opts.program)
            .args(&self.opts.leading_args)
            .args(plan.args.as_slice())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FramecastError::io(format!(
                    "failed to spawn encoder '{}' (is it installed and on PATH?): {e}",
                    self.opts.program.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stderr)) = (stdin, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FramecastError::io("failed to open encoder pipes (unexpected)"));
        };
        let stderr_drain = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        let feed = FrameFeed::new(stdin, cfg.encoding.frame_format, cfg.timeline.rgba_frame_len());
        let completion = Completion::default();
        let cancel = Arc::new(AtomicBool::new(false));

        tracing::info!(output = %plan.output_path.display(), "encoding session started");
        {
            let completion = completion.clone();
            let cancel = cancel.clone();
            let lease = lease.clone();
            let output_path = plan.output_path.clone();
            std::thread::spawn(move || {
                let outcome = monitor(child, stderr_drain, &cancel, output_path);
                lease.release();
                completion.settle(outcome);
            });
        }

        Ok(EncodingSession {
            feed,
            completion,
            cancel,
            lease,
            output_path: plan.output_path,
            graph: plan.graph,
        })
    }
}

fn monitor(
    mut child: Child,
    stderr_drain: JoinHandle<std::io::Result<Vec<u8>>>,
    cancel: &AtomicBool,
    output_path: PathBuf,
) -> Outcome {
    loop {
        if cancel.load(Ordering::Acquire) {
            reap(&mut child, stderr_drain);
            tracing::info!(output = %output_path.display(), "encoding session cancelled");
            return Outcome::Cancelled;
        }
        match child.try_wait() {
            Ok(Some(_)) if cancel.load(Ordering::Acquire) => {
                let _ = stderr_drain.join();
                tracing::info!(output = %output_path.display(), "encoding session cancelled");
                return Outcome::Cancelled;
            }
            Ok(Some(status)) => {
                let stderr = match stderr_drain.join() {
                    Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(Err(e)) => format!("<failed to read encoder stderr: {e}>"),
                    Err(_) => "<encoder stderr drain thread panicked>".to_string(),
                };
                if status.success() {
                    tracing::info!(output = %output_path.display(), "encoding session finished");
                    return Outcome::Finished(output_path);
                }
                tracing::warn!(%status, stderr = %stderr.trim(), "encoder exited unsuccessfully");
                return Outcome::Failed { status, stderr };
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                reap(&mut child, stderr_drain);
                return Outcome::Lost(format!("failed to wait for encoder: {e}"));
            }
        }
    }
}

/// Kill the child, wait for it, and join the stderr drain.
fn reap(
    child: &mut Child,
    stderr_drain: JoinHandle<std::io::Result<Vec<u8>>>,
) -> Option<ExitStatus> {
    let _ = child.kill();
    let status = child.wait().ok();
    let _ = stderr_drain.join();
    status
}

/// A running encoder process.
#[derive(Debug)]
pub struct EncodingSession {
    feed: FrameFeed,
    completion: Completion,
    cancel: Arc<AtomicBool>,
    lease: Arc<SessionLease>,
    output_path: PathBuf,
    graph: FilterGraph,
}

impl Drop for EncodingSession {
    fn drop(&mut self) {
        let _ = self.feed.close();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

impl EncodingSession {
    /// A handle to the frame sink, shareable across threads.
    pub fn feed(&self) -> FrameFeed {
        self.feed.clone()
    }

    /// Write one whole frame. See [`FrameFeed::write_frame`].
    pub fn write_frame(&self, frame: &[u8]) -> FramecastResult<()> {
        self.feed.write_frame(frame)
    }

    /// Close the sink without killing the process; the encoder finalizes on EOF.
    pub fn close(&self) -> FramecastResult<()> {
        self.feed.close()
    }

    /// Terminate the encoder immediately. The output file must be treated as invalid.
    ///
    /// Releases the orchestrator right away.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        // Dropping stdin unblocks any writer stuck on a full pipe once the process dies.
        let _ = self.feed.close();
        self.lease.release();
    }

    /// Completion handle for this session.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Close the sink and block until the encoder exits.
    pub fn finish(self) -> FramecastResult<PathBuf> {
        self.feed.close()?;
        self.completion.wait()
    }

    /// Where the output file is written.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The filter graph baked into this session's arguments.
    pub fn graph(&self) -> &FilterGraph {
        &self.graph
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/session.rs"]
mod tests;
