/// Hazard classifier trainer.
/// Fits a random forest on a built dataset, evaluates it on the held-out
/// split and writes a versioned model artifact.
use anyhow::{Context, Result};
use clap::Parser;
use hazard_core::dataset::PartitionedDataset;
use hazard_core::{train_model, PipelineConfig};
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Train and evaluate a hazard occurrence classifier")]
struct Args {
    /// Pipeline configuration (TOML). Only the [training] table is used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset JSON written by `dataset_builder`.
    #[arg(short, long)]
    dataset: PathBuf,

    /// Output artifact. Defaults to data/models/{model_version}.json.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the evaluation metrics as JSON next to the artifact.
    #[arg(long)]
    metrics_json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let dataset =
        PartitionedDataset::load(&args.dataset).with_context(|| format!("reading {}", args.dataset.display()))?;
    println!(
        "Dataset: {} ({} train, {} eval, {} features)",
        dataset.hazard,
        dataset.train.len(),
        dataset.eval.len(),
        dataset.schema.len()
    );

    let trained = train_model(&dataset, &config.training)?;
    let artifact = &trained.artifact;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("data/models/{}.json", artifact.model_version)));
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    artifact.save(&output).with_context(|| format!("writing {}", output.display()))?;

    println!();
    println!("Model {}", artifact.model_version);
    println!("{}", trained.metrics);
    println!();
    println!("{}", trained.metrics.confusion);
    println!();
    println!("Feature importance:");
    let mut importance: Vec<(&String, &f64)> = artifact.feature_importance.iter().collect();
    importance.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (name, value) in importance {
        println!("  {name:<12} {value:.4}");
    }

    if args.metrics_json {
        let path = output.with_extension("metrics.json");
        fs::write(&path, serde_json::to_string_pretty(&trained.metrics)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Metrics → {}", path.display());
    }
    println!("Artifact → {}", output.display());
    Ok(())
}
