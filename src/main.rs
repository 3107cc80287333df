//! Armband Gesture CLI
//!
//! Inspect raw recordings, evaluate the recognizer on a dataset and classify
//! single recordings.

use anyhow::{bail, Context, Result};
use armband_gesture::{
    classifier::{GestureClassifier, GestureRecognizer},
    config::PipelineConfig,
    core::{
        features::FeatureExtractor, framing::FrameLayout, reconcile, resample_batch,
        resample_record, PredictionBuilder,
    },
    diagnostics::create_shared_log_with_persistence,
    recording::{load_dataset, loader::discover_gesture_dir, GestureRecord, SensorKind},
    VERSION,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "armband-gesture")]
#[command(version = VERSION)]
#[command(about = "Align, featurize and classify armband gesture recordings", long_about = None)]
struct Cli {
    /// Worker threads for batch stages (defaults to available cores)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show time base, grid and framing details of raw recordings
    Inspect {
        /// Gesture directory, `<root>/<performer>/<gesture>`
        recording_dir: PathBuf,

        /// Only the recording with this stamp
        #[arg(long)]
        stamp: Option<String>,
    },

    /// Train on a dataset and report accuracy on held-out recordings
    Evaluate {
        /// Dataset root, `<root>/<performer>/<gesture>/<sensor>_<stamp>.csv`
        #[arg(long)]
        data: PathBuf,

        /// Hold out every N-th recording for testing
        #[arg(long, default_value = "5")]
        holdout: usize,
    },

    /// Train on a dataset, then classify one recording
    Classify {
        /// Dataset root used for training
        #[arg(long)]
        data: PathBuf,

        /// Gesture directory holding the recording
        #[arg(long)]
        recording: PathBuf,

        /// Stamp of the recording to classify
        #[arg(long)]
        stamp: String,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let workers = cli
        .workers
        .unwrap_or_else(armband_gesture::core::workers::default_worker_count);

    let result = match cli.command {
        Commands::Inspect {
            recording_dir,
            stamp,
        } => cmd_inspect(&recording_dir, stamp.as_deref()),
        Commands::Evaluate { data, holdout } => cmd_evaluate(&data, holdout, workers),
        Commands::Classify {
            data,
            recording,
            stamp,
        } => cmd_classify(&data, &recording, &stamp, workers),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::load().context("loading configuration")
}

/// Load the recordings of one gesture directory, optionally just one stamp.
fn load_gesture_dir(dir: &Path, stamp: Option<&str>) -> Result<Vec<GestureRecord>> {
    let label = dir_component(dir)?;
    let performer = dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let mut records = Vec::new();
    for files in discover_gesture_dir(dir, &performer, &label)? {
        if stamp.is_some_and(|s| s != files.stamp) {
            continue;
        }
        if !files.is_complete() {
            println!("Recording {}: missing sensor files, skipped", files.stamp);
            continue;
        }
        records.push(files.load()?);
    }

    if records.is_empty() {
        bail!("no complete recordings found in {dir:?}");
    }
    Ok(records)
}

fn dir_component(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{path:?} has no usable directory name"))
}

fn cmd_inspect(dir: &Path, stamp: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let mut extractor = FeatureExtractor::new(config.ar_order);

    for record in load_gesture_dir(dir, stamp)? {
        println!("Recording: {} by {}", record.label, record.performed_by);
        println!("==========");
        for stream in record.streams() {
            println!("  {:<18} {} samples", stream.kind().to_string(), stream.len());
        }

        let time_base = reconcile(&record)?;
        println!();
        println!(
            "Time base: {} .. {} us ({:.1} ms)",
            time_base.start_us,
            time_base.end_us,
            time_base.duration_ms()
        );
        println!("Grid points: {}", time_base.grid_len(config.grid_step_us));

        let resampled = resample_record(&record, config.grid_step_us)?;
        println!();
        println!("Framing:");
        for sensor in SensorKind::CLASSIFIED {
            let frame_count = config.frames.get(sensor);
            let length = resampled.stream(sensor).len();
            match FrameLayout::new(length, frame_count) {
                Some(layout) => {
                    let features = extractor
                        .extract(&resampled, sensor, frame_count)
                        .map_or(0, |v| v.len());
                    println!(
                        "  {:<18} {} frames of {} samples, {} dropped, {} features",
                        sensor.to_string(),
                        layout.frame_count,
                        layout.frame_length(),
                        layout.discarded,
                        features
                    );
                }
                None => println!(
                    "  {:<18} too short: {} samples, needs {} for {} frames",
                    sensor.to_string(),
                    length,
                    FrameLayout::min_data_length(frame_count),
                    frame_count
                ),
            }
        }
        println!();
    }
    Ok(())
}

fn cmd_evaluate(data: &Path, holdout: usize, workers: usize) -> Result<()> {
    if holdout < 2 {
        bail!("--holdout must be at least 2");
    }
    let config = load_config()?;
    config.validate()?;
    let log = create_shared_log_with_persistence(config.log_path());

    let records = load_dataset(data)?;
    let outcome = resample_batch(&records, config.grid_step_us, workers);
    log.record_converted(outcome.records.len() as u64);
    log.record_conversion_failures(outcome.failures.len() as u64);
    if !outcome.failures.is_empty() {
        println!("Recordings that could not be converted:");
        for failure in &outcome.failures {
            println!("  {failure}");
        }
        println!();
    }

    let (test, train): (Vec<_>, Vec<_>) = outcome
        .records
        .into_iter()
        .enumerate()
        .partition(|(index, _)| index % holdout == 0);
    let train: Vec<_> = train.into_iter().map(|(_, record)| record).collect();
    let test: Vec<_> = test.into_iter().map(|(_, record)| record).collect();
    if train.is_empty() || test.is_empty() {
        bail!(
            "need recordings for both training and testing, got {} and {}",
            train.len(),
            test.len()
        );
    }

    println!(
        "Training on {} recordings, testing on {}",
        train.len(),
        test.len()
    );
    let (recognizer, report) = GestureRecognizer::train(&train, &config, workers)?;
    for summary in &report.sensors {
        log.record_feature_vectors(summary.records_used as u64);
        log.record_models_fitted(summary.classes.len() as u64);
        for skipped in &summary.skipped {
            log.record_skipped(skipped.clone());
        }
    }
    let skipped: Vec<_> = report.skipped().collect();
    if !skipped.is_empty() {
        println!("Recordings skipped during training:");
        for record in &skipped {
            println!("  {record}");
        }
        println!();
    }

    let mut correct = 0;
    let mut evaluated = 0;
    for record in &test {
        match recognizer.classify(record) {
            Ok(result) => {
                log.record_prediction();
                evaluated += 1;
                let hit = result.label() == record.label;
                if hit {
                    correct += 1;
                }
                println!(
                    "  {:<12} {:<12} -> {:<12} {}",
                    record.performed_by,
                    record.label,
                    result.label(),
                    if hit { "ok" } else { "miss" }
                );
            }
            Err(e) => println!("  {} by {}: {e}", record.label, record.performed_by),
        }
    }

    println!();
    if evaluated > 0 {
        println!(
            "Accuracy: {correct}/{evaluated} ({:.1}%)",
            100.0 * correct as f64 / evaluated as f64
        );
    }
    if let Some(ensemble) = recognizer.classifier(SensorKind::Accelerometer) {
        println!("Classes: {}", ensemble.classes().join(", "));
    }
    println!();
    println!("{}", log.summary());

    log.save().context("saving pipeline log")?;
    Ok(())
}

fn cmd_classify(data: &Path, recording: &Path, stamp: &str, workers: usize) -> Result<()> {
    let config = load_config()?;
    config.validate()?;

    let target = load_gesture_dir(recording, Some(stamp))?
        .into_iter()
        .next()
        .with_context(|| format!("no recording with stamp {stamp}"))?;
    let target = resample_record(&target, config.grid_step_us)?;

    let records = load_dataset(data)?;
    let outcome = resample_batch(&records, config.grid_step_us, workers);
    let (recognizer, _) = GestureRecognizer::train(&outcome.records, &config, workers)?;

    let result = recognizer.classify(&target)?;
    let snapshot = PredictionBuilder::new().build(&target, &result);
    println!("{}", snapshot.to_json()?);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = load_config()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", PipelineConfig::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
