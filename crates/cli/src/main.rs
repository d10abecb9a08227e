//! FireScar CLI - burned-area mapping and accuracy assessment

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use firescar_algorithms::evaluation::{confusion_counts, confusion_image, ConfusionCounts};
use firescar_algorithms::fire::CLASS_BAND;
use firescar_algorithms::imagery::IndexRegistry;
use firescar_algorithms::pipeline::{ClassifierOutcome, DeltaRun, FirePipeline, FireRun, RunReport};
use firescar_core::io::{read_geotiff, write_geotiff, write_image};
use firescar_core::Raster;

use crate::config::RunConfig;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "firescar")]
#[command(author, version, about = "Burned-area mapping from pre/post-fire composites", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the fires of a run configuration
    Run {
        /// JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory for report.json and rasters
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the spectral indices
    Indices {
        /// Also list the custom indices of this run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Score a 0/1 classification raster against a ground-truth raster
    Evaluate {
        /// Predicted classes
        #[arg(short, long)]
        predicted: PathBuf,
        /// Ground truth
        #[arg(short, long)]
        truth: PathBuf,
        /// Sampling resolution in map units
        #[arg(short, long, default_value = "30")]
        scale: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    read_geotiff(path).with_context(|| format!("Failed to read raster {}", path.display()))
}

fn print_counts(label: &str, counts: &ConfusionCounts) {
    println!("  {:<28} {}", label, counts);
}

/// Directory name for one fire/window combination
fn run_dir_name(fire: &str, delta_days: u32) -> String {
    let slug: String = fire
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_d{}", slug, delta_days)
}

fn write_rasters(run: &DeltaRun, dir: &Path) -> Result<()> {
    let analysis = &run.analysis;
    write_image(&analysis.stack, dir, "").context("Failed to write delta stack")?;
    write_geotiff(&analysis.truth, dir.join(format!("{}.tif", CLASS_BAND))).context("Failed to write ground truth")?;
    write_image(&run.thresholds.classified, dir, "threshold_").context("Failed to write threshold classes")?;
    write_image(&run.thresholds.confusion, dir, "confusion_").context("Failed to write confusion rasters")?;

    for outcome in &run.classifiers {
        if let ClassifierOutcome::Trained { kind, classified, .. } = outcome {
            write_geotiff(classified, dir.join(format!("classified_{}.tif", kind)))
                .with_context(|| format!("Failed to write {} classification", kind))?;
            let confusion = confusion_image(classified, &analysis.truth)?;
            write_geotiff(&confusion, dir.join(format!("confusion_{}.tif", kind)))
                .with_context(|| format!("Failed to write {} confusion raster", kind))?;
        }
    }
    Ok(())
}

fn print_run(run: &FireRun) {
    println!("\n{} ({} day windows)", run.fire, run.delta_days);
    let result = match &run.outcome {
        Ok(result) => result,
        Err(e) => {
            println!("  failed: {}", e);
            return;
        }
    };
    println!(
        "  pre {}  post {}",
        result.analysis.pre_window, result.analysis.post_window
    );
    println!(
        "  fires in scope: {}  invalid records: {}",
        result.analysis.filtered.in_scope.len(),
        result.analysis.filtered.invalid.len()
    );
    for score in &result.thresholds.scores {
        print_counts(&format!("{} at {}", score.index, score.threshold), &score.score.counts);
    }
    for outcome in &result.classifiers {
        match outcome {
            ClassifierOutcome::Trained {
                kind,
                scene,
                training,
                validation,
                ..
            } => {
                print_counts(&kind.to_string(), scene);
                print_counts("    training", training);
                print_counts("    validation", validation);
            }
            ClassifierOutcome::Failed { kind, error } => println!("  {:<28} failed: {}", kind.to_string(), error),
        }
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run(config_path: &Path, out: Option<&Path>) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let pipeline = FirePipeline::new(config.pipeline_config()?).with_registry(config.registry()?);

    let pb = spinner("Loading fire records and scenes...");
    let records = config.load_records()?;
    let jobs = config.load_jobs()?;
    pb.finish_and_clear();
    info!("{} fire records, {} fires", records.len(), jobs.len());

    let start = Instant::now();
    let pb = spinner("Analysing fires...");
    let runs = pipeline.run_batch(&jobs, &records);
    pb.finish_and_clear();
    info!("Analysis finished in {:.2?}", start.elapsed());

    for run in &runs {
        print_run(run);
    }

    let failed = runs.iter().filter(|r| r.outcome.is_err()).count();
    if failed > 0 {
        warn!("{} of {} fire analyses failed", failed, runs.len());
    }

    if let Some(out) = out {
        std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
        let reports: Vec<RunReport> = runs.iter().map(FireRun::report).collect();
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialize report")?;
        let report_path = out.join("report.json");
        std::fs::write(&report_path, json).with_context(|| format!("Failed to write {}", report_path.display()))?;

        if config.write_rasters {
            let pb = spinner("Writing rasters...");
            for run in &runs {
                if let Ok(result) = &run.outcome {
                    write_rasters(result, &out.join(run_dir_name(&run.fire, run.delta_days)))?;
                }
            }
            pb.finish_and_clear();
        }
        println!("\nReport saved to: {}", report_path.display());
    }
    Ok(())
}

fn list_indices(config: Option<&Path>) -> Result<()> {
    let registry = match config {
        Some(path) => RunConfig::load(path)?.registry()?,
        None => IndexRegistry::builtin(),
    };
    for def in registry.iter() {
        println!(
            "{:<8} {:<9} [{}, {}]  {}",
            def.name,
            format!("{:?}", def.burn_direction),
            def.display_range.0,
            def.display_range.1,
            def.formula
        );
    }
    for (alias, target) in registry.aliases() {
        println!("{:<8} alias of {}", alias, target);
    }
    Ok(())
}

fn evaluate(predicted: &Path, truth: &Path, scale: f64) -> Result<()> {
    let predicted = read_raster(predicted)?;
    let truth = read_raster(truth)?;
    let counts = confusion_counts(&predicted, &truth, scale).context("Failed to compare rasters")?;
    let [pa0, pa1] = counts.producers_accuracy();
    let [ca0, ca1] = counts.consumers_accuracy();

    println!("Confusion matrix [predicted][actual]:");
    println!("  TN {:>10}  FN {:>10}", counts.true_negative, counts.false_negative);
    println!("  FP {:>10}  TP {:>10}", counts.false_positive, counts.true_positive);
    println!("Accuracy: {:.4}", counts.accuracy());
    println!("Kappa:    {:.4}", counts.kappa());
    println!("Producer's accuracy: unburned {:.4}, burned {:.4}", pa0, pa1);
    println!("Consumer's accuracy: unburned {:.4}, burned {:.4}", ca0, ca1);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run { config, out } => run(&config, out.as_deref()),
        Commands::Indices { config } => list_indices(config.as_deref()),
        Commands::Evaluate { predicted, truth, scale } => evaluate(&predicted, &truth, scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dirs_are_filesystem_safe() {
        assert_eq!(run_dir_name("Sever do Vouga", 10), "sever_do_vouga_d10");
        assert_eq!(run_dir_name("A/B", 15), "a_b_d15");
    }

    #[test]
    fn cli_parses_run_command() {
        let cli = Cli::try_parse_from(["firescar", "-v", "run", "--config", "run.json", "--out", "out"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { config, out } => {
                assert_eq!(config, PathBuf::from("run.json"));
                assert_eq!(out, Some(PathBuf::from("out")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_evaluate_defaults_to_30m() {
        let cli = Cli::try_parse_from(["firescar", "evaluate", "-p", "a.tif", "-t", "b.tif"]).unwrap();
        match cli.command {
            Commands::Evaluate { scale, .. } => assert_eq!(scale, 30.0),
            _ => panic!("expected evaluate"),
        }
    }
}
