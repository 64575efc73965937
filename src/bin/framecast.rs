use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use framecast::{
    CompositionConfig, EncodingOrchestrator, ExtractedFrame, FfprobeProbe, FixedTempDir,
    FrameFormat, MediaProbe, OrchestratorOpts,
};

#[derive(Parser, Debug)]
#[command(name = "framecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the filter graph built for a composition.
    Graph(GraphArgs),
    /// Print the encoder argument vector, one argument per line.
    Args(ArgsArgs),
    /// Print media metadata as JSON (requires `ffprobe` on PATH).
    Probe(ProbeArgs),
    /// Encode a directory of still images as the frame feed (requires `ffmpeg` on PATH).
    Encode(EncodeArgs),
}

#[derive(Parser, Debug)]
struct GraphArgs {
    /// Input composition JSON.
    #[arg(long)]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct ArgsArgs {
    /// Input composition JSON.
    #[arg(long)]
    config: PathBuf,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Encoder executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to inspect.
    input: PathBuf,

    /// Probe executable.
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    /// Input composition JSON.
    #[arg(long)]
    config: PathBuf,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Directory of frame images, consumed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Encoder executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FRAMECAST_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Graph(args) => cmd_graph(args),
        Command::Args(args) => cmd_args(args),
        Command::Probe(args) => cmd_probe(args),
        Command::Encode(args) => cmd_encode(args),
    }
}

fn read_config(path: &Path) -> anyhow::Result<CompositionConfig> {
    let cfg = CompositionConfig::from_json_path(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Output files land in the requested path's parent; the orchestrator only takes a file name.
fn orchestrator_for(out: &Path, program: PathBuf) -> anyhow::Result<(EncodingOrchestrator, String)> {
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = out
        .file_name()
        .with_context(|| format!("output path '{}' has no file name", out.display()))?
        .to_string_lossy()
        .into_owned();
    let opts = OrchestratorOpts {
        program,
        temp_dir: Arc::new(FixedTempDir(dir)),
        ..OrchestratorOpts::default()
    };
    Ok((EncodingOrchestrator::new(opts), name))
}

fn cmd_graph(args: GraphArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    let graph = framecast::build_filter_graph(&cfg)?;
    println!("{}", graph.graph);
    Ok(())
}

fn cmd_args(args: ArgsArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    let (orch, name) = orchestrator_for(&args.out, args.ffmpeg.clone())?;
    let plan = orch.plan(&cfg, &name)?;
    println!("{}", args.ffmpeg.display());
    for arg in plan.args.to_strings() {
        println!("{arg}");
    }
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let meta = FfprobeProbe::new(args.ffprobe).probe(&args.input)?;
    let json = serde_json::to_string_pretty(&meta).context("serialize metadata")?;
    println!("{json}");
    Ok(())
}

fn frame_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read frames dir '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        anyhow::bail!("no frame images in '{}'", dir.display());
    }
    Ok(files)
}

fn load_frame(path: &Path, index: u64, cfg: &CompositionConfig) -> anyhow::Result<Vec<u8>> {
    let (w, h) = (cfg.timeline.width, cfg.timeline.height);
    let img = image::open(path).with_context(|| format!("decode image '{}'", path.display()))?;
    let img = if img.width() == w && img.height() == h {
        img
    } else {
        img.resize_exact(w, h, image::imageops::FilterType::Triangle)
    };
    let frame = ExtractedFrame {
        frame_number: index,
        rgba: img.to_rgba8().into_raw(),
        width: w,
        height: h,
    };
    match cfg.encoding.frame_format {
        FrameFormat::RawRgba => Ok(frame.rgba),
        FrameFormat::Png => frame
            .to_png()
            .with_context(|| format!("encode png for '{}'", path.display())),
    }
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    let files = frame_files(&args.frames)?;
    let (orch, name) = orchestrator_for(&args.out, args.ffmpeg)?;

    let session = orch.start(&cfg, &name)?;
    // Short image sequences hold their last frame until the timeline ends.
    let total = cfg.timeline.duration_in_frames.max(files.len() as u64);
    let mut last: Option<Vec<u8>> = None;
    for i in 0..total {
        if let Some(path) = files.get(i as usize) {
            last = Some(load_frame(path, i, &cfg)?);
        }
        if let Some(frame) = last.as_deref()
            && let Err(e) = session.write_frame(frame)
        {
            // A dead encoder breaks the pipe; its exit status carries the real cause.
            let cause = match session.finish() {
                Err(exit) => exit,
                Ok(_) => e,
            };
            return Err(cause).with_context(|| format!("write frame {i}"));
        }
    }

    let out = session.finish()?;
    eprintln!("wrote {}", out.display());
    Ok(())
}
