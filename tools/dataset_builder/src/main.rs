/// Training dataset builder.
/// Joins the mined event ledger back onto the archived grids: one positive
/// sample per event, buffered negatives elsewhere, partitioned into
/// time-disjoint train and evaluation splits.
use anyhow::{bail, Context, Result};
use clap::Parser;
use hazard_core::dataset::build_dataset;
use hazard_core::grid::source::ManifestAccessor;
use hazard_core::{EventLedger, HazardKind, PipelineConfig};
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dataset_builder", about = "Build a labelled train/eval dataset from mined hazard events")]
struct Args {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chunk manifest the events were mined from.
    #[arg(short, long, default_value = "data/archive/chunks.json")]
    manifest: PathBuf,

    /// Event ledger written by `miner`.
    #[arg(short, long, default_value = "data/events.jsonl")]
    ledger: PathBuf,

    /// Hazard to build the dataset for (e.g. heat_stress, flash_flood).
    #[arg(short = 'z', long)]
    hazard: String,

    /// Output dataset JSON. Defaults to data/datasets/{hazard}.json.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(hazard) = HazardKind::from_name(&args.hazard) else {
        let known: Vec<&str> = HazardKind::ALL.iter().map(|h| h.name()).collect();
        bail!("unknown hazard '{}' (expected one of: {})", args.hazard, known.join(", "));
    };
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if !args.ledger.exists() {
        bail!("ledger {} does not exist; run miner first", args.ledger.display());
    }
    let ledger = EventLedger::open(&args.ledger).with_context(|| format!("reading {}", args.ledger.display()))?;
    let events = ledger.events_for(hazard);
    println!("{} {hazard} events in {}", events.len(), args.ledger.display());

    let accessor = ManifestAccessor::open(&args.manifest)
        .with_context(|| format!("opening manifest {}", args.manifest.display()))?;
    let dataset = build_dataset(&accessor, &events, hazard, &config.dataset, &config.mining)?;

    let output = args.output.unwrap_or_else(|| PathBuf::from(format!("data/datasets/{hazard}.json")));
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    dataset.save(&output).with_context(|| format!("writing {}", output.display()))?;

    let s = &dataset.stats;
    println!();
    println!("Schema:            {}", dataset.schema.names().join(", "));
    println!("Positives:         {} ({} skipped)", s.positives, s.positives_skipped);
    println!("Negatives:         {} ({} short)", s.negatives, s.negatives_short);
    println!("Dropped by block:  {}", s.dropped_by_block);
    println!("Train / eval:      {} / {}", dataset.train.len(), dataset.eval.len());
    println!("Fingerprint:       {}", dataset.fingerprint());
    println!("Written → {}", output.display());
    Ok(())
}
