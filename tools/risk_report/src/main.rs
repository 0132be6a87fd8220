/// Forecast risk report.
/// Classifies every timestep of a forecast grid and writes per-timestep
/// hazard counts plus the list of risky points. With a trained model the
/// risky points of that model's hazard also carry its occurrence probability.
use anyhow::{Context, Result};
use clap::Parser;
use hazard_core::classify::report::{risky_points, summarize_pass, RiskSummary, RiskyPoint};
use hazard_core::model::FeatureVector;
use hazard_core::pipeline::classify_forecast;
use hazard_core::{ModelArtifact, PipelineConfig, WeatherGrid};
use serde::Serialize;
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "risk_report", about = "Classify a forecast grid into hazard flags and risky points")]
struct Args {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Forecast grid (serialised WeatherGrid JSON).
    #[arg(short, long)]
    grid: PathBuf,

    /// Optional model artifact used to score risky points.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Output report JSON.
    #[arg(short, long, default_value = "data/risk_report.json")]
    output: PathBuf,
}

#[derive(Serialize)]
struct ScoredPoint {
    #[serde(flatten)]
    point: RiskyPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    probability: Option<f32>,
}

#[derive(Serialize)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<String>,
    timesteps: Vec<RiskSummary>,
    risky_points: Vec<ScoredPoint>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let text = fs::read_to_string(&args.grid).with_context(|| format!("reading {}", args.grid.display()))?;
    let grid: WeatherGrid = serde_json::from_str::<WeatherGrid>(&text)
        .with_context(|| format!("parsing {}", args.grid.display()))?
        .validate()?;
    let model = match &args.model {
        Some(path) => Some(ModelArtifact::load(path).with_context(|| format!("loading model {}", path.display()))?),
        None => None,
    };

    let tolerance = config.mining.tolerance();
    let passes = classify_forecast(&grid, &config.hazards, tolerance);

    let mut report = Report {
        model_version: model.as_ref().map(|m| m.model_version.clone()),
        timesteps: Vec::with_capacity(passes.len()),
        risky_points: Vec::new(),
    };
    let mut unscored = 0usize;
    for pass in &passes {
        report.timesteps.push(summarize_pass(pass));
        let snapshot = grid.snapshot(pass.time, tolerance);
        for point in risky_points(pass, &grid.axes) {
            let probability = match &model {
                Some(m) if point.severities.contains_key(&m.hazard) => {
                    let (row, col) = grid.axes.clamped_cell(point.location);
                    let cell = grid.axes.index(row, col);
                    let scored = m.feature_schema.extract(&snapshot, cell).and_then(|values| {
                        m.predict(&FeatureVector::new(m.feature_schema.names(), values)).ok()
                    });
                    if scored.is_none() {
                        unscored += 1;
                    }
                    scored.map(|p| p.probability)
                }
                _ => None,
            };
            report.risky_points.push(ScoredPoint { point, probability });
        }
    }

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&args.output, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("{:<22} {:>8}  hazards exceeded", "time", "cells");
    for summary in &report.timesteps {
        let exceeded: Vec<String> = summary
            .hazards
            .iter()
            .filter(|(_, c)| c.exceeded > 0)
            .map(|(h, c)| format!("{h}={}", c.exceeded))
            .collect();
        let time = summary.time.format("%Y-%m-%d %H:%M");
        println!("{time:<22} {:>8}  {}", summary.combined_exceeded, exceeded.join(" "));
        for (hazard, reason) in &summary.failed {
            println!("{:<22} {:>8}  {hazard} not evaluated: {reason}", "", "");
        }
    }
    if unscored > 0 {
        log::warn!("{unscored} risky points could not be scored (missing model features)");
    }
    println!("{} risky points → {}", report.risky_points.len(), args.output.display());
    Ok(())
}
