/// Historical event miner.
/// Walks a chunk manifest of archived weather grids, classifies every
/// timestep, tracks flagged regions into discrete events and appends them to
/// a JSONL ledger. With a checkpoint the run resumes where it stopped.
use anyhow::{Context, Result};
use clap::Parser;
use hazard_core::grid::source::{GridAccessor, ManifestAccessor};
use hazard_core::{mine, EventLedger, MiningState, PipelineConfig};
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "miner", about = "Mine historical hazard events from archived weather grids")]
struct Args {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chunk manifest listing serialised grid chunks in time order.
    #[arg(short, long, default_value = "data/archive/chunks.json")]
    manifest: PathBuf,

    /// Event ledger (JSONL). Created when missing; existing events are kept.
    #[arg(short, long, default_value = "data/events.jsonl")]
    ledger: PathBuf,

    /// Checkpoint file written after every chunk.
    #[arg(long, default_value = "data/miner.checkpoint.json")]
    checkpoint: PathBuf,

    /// Ignore an existing checkpoint and start from the first chunk.
    #[arg(long)]
    fresh: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let accessor = ManifestAccessor::open(&args.manifest)
        .with_context(|| format!("opening manifest {}", args.manifest.display()))?;
    println!("Manifest: {} chunks", accessor.chunk_count());

    for path in [&args.ledger, &args.checkpoint] {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }

    let mut ledger =
        EventLedger::open(&args.ledger).with_context(|| format!("opening ledger {}", args.ledger.display()))?;
    let mut state = if args.fresh {
        MiningState::new(&config)
    } else {
        MiningState::resume_or_new(&args.checkpoint, &config)
            .with_context(|| format!("reading checkpoint {}", args.checkpoint.display()))?
    };

    let report = mine(&accessor, &config, &mut ledger, &mut state, Some(&args.checkpoint))?;

    println!();
    println!("Chunks processed: {}", report.chunks_processed);
    println!("Chunks failed:    {}", report.chunks_failed);
    println!("Timesteps:        {}", report.timesteps);
    println!("Events inserted:  {}", report.events.inserted);
    println!("Events skipped:   {} (already in ledger)", report.events.skipped);
    if !report.gaps.is_empty() {
        println!("Gaps:");
        for gap in &report.gaps {
            println!("  {} .. {}  {}", gap.start, gap.end, gap.reason);
        }
    }
    println!("Ledger now holds {} events → {}", ledger.len(), args.ledger.display());
    Ok(())
}
