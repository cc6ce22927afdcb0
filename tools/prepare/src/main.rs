//! Dataset preparation tool for yoga pose images.
//!
//! Each stage of the pipeline is exposed as its own subcommand:
//! - Format normalization
//! - Height-preserving resize of a single image
//! - Class balancing through augmentation
//! - Stratified train/val/test splitting
//! - Dataset statistics
//! - The full pipeline from a TOML config

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};
use yoga_core::{
    load_toml_config, setup_cli_logging, write_json_report, NormalizeConfig, PipelineConfig,
    SplitRatios,
};
use yoga_dataset::balance::deficit;
use yoga_dataset::{
    discover_classes, resize_to_height, run_pipeline, ClassBalancer, DatasetStatistics,
    FormatNormalizer, SplitCounts, SplitDestinations, StratifiedSplitter,
};

#[derive(Parser)]
#[command(name = "yoga-prepare")]
#[command(about = "Prepare yoga pose image datasets for training", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of parallel workers (default: one per core)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode every image under a tree into one format and color model
    Normalize {
        /// Root of the raw image tree
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Root of the mirrored output tree
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Target file extension
        #[arg(short, long, default_value = "png")]
        extension: String,

        /// Also resize every image to this height
        #[arg(long)]
        height: Option<u32>,

        /// Delete each source file once it has been converted
        #[arg(long)]
        remove_sources: bool,
    },

    /// Resize one image to a fixed height, keeping its aspect ratio
    Resize {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Target height in pixels
        #[arg(long)]
        height: u32,
    },

    /// Top up every class with augmented samples
    Balance {
        /// Directory containing one folder per class
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Shared output directory for generated samples
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Images per class after balancing (default: largest class)
        #[arg(short, long)]
        target: Option<usize>,

        /// Pipeline config to read the augmentation steps from
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Extension of generated files
        #[arg(short, long, default_value = "png")]
        extension: String,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Split every class into train/val/test folders
    Split {
        /// Directory containing one folder per class
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Root of the train/, val/ and test/ trees
        #[arg(short, long)]
        output_dir: PathBuf,

        #[arg(long, default_value = "0.8")]
        train_ratio: f64,

        #[arg(long, default_value = "0.1")]
        val_ratio: f64,

        #[arg(long, default_value = "0.1")]
        test_ratio: f64,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Report the class distribution of a dataset
    Analyze {
        /// Directory containing one folder per class
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Output file for statistics (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run normalize, balance and split from one config file
    Run {
        /// Pipeline config (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the seed in the config
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    if let Some(n) = cli.workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    match cli.command {
        Commands::Normalize {
            input_dir,
            output_dir,
            extension,
            height,
            remove_sources,
        } => normalize(
            &input_dir,
            &output_dir,
            NormalizeConfig {
                target_extension: extension,
                target_height: height,
                remove_sources,
            },
        )?,

        Commands::Resize {
            input,
            output,
            height,
        } => resize(&input, &output, height)?,

        Commands::Balance {
            data_dir,
            output_dir,
            target,
            config,
            extension,
            seed,
        } => balance(
            &data_dir,
            &output_dir,
            target,
            config.as_deref(),
            &extension,
            seed,
        )?,

        Commands::Split {
            data_dir,
            output_dir,
            train_ratio,
            val_ratio,
            test_ratio,
            seed,
        } => split(
            &data_dir,
            &output_dir,
            SplitRatios::new(train_ratio, val_ratio, test_ratio)?,
            seed,
        )?,

        Commands::Analyze { data_dir, output } => analyze(&data_dir, output.as_deref())?,

        Commands::Run { config, seed } => run(config.as_deref(), seed)?,
    }

    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("#>-"),
    );
    Ok(bar)
}

fn normalize(input_dir: &Path, output_dir: &Path, config: NormalizeConfig) -> Result<()> {
    let normalizer = FormatNormalizer::new(config)?;

    let bar = spinner("Normalizing images")?;
    let report = normalizer
        .normalize_tree(input_dir, output_dir)
        .with_context(|| format!("Failed to normalize {}", input_dir.display()))?;
    bar.finish_and_clear();

    info!("Processed: {}", report.total());
    info!("Converted: {}", report.converted.len());
    info!("Skipped: {}", report.skipped.len());
    for skipped in &report.skipped {
        warn!("  {}: {}", skipped.path.display(), skipped.reason);
    }
    if report.removed_sources > 0 {
        info!("Removed sources: {}", report.removed_sources);
    }

    Ok(())
}

fn resize(input: &Path, output: &Path, height: u32) -> Result<()> {
    let image = image::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let resized = resize_to_height(&image, height)?;
    resized
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "{}x{} -> {}x{}: {}",
        image.width(),
        image.height(),
        resized.width(),
        resized.height(),
        output.display()
    );
    Ok(())
}

fn balance(
    data_dir: &Path,
    output_dir: &Path,
    target: Option<usize>,
    config: Option<&Path>,
    extension: &str,
    seed: Option<u64>,
) -> Result<()> {
    let spec = match config {
        Some(path) => load_toml_config::<PipelineConfig>(path)?.augmentation,
        None => PipelineConfig::default().augmentation,
    };
    let balancer = ClassBalancer::new(spec, extension)?;

    let pools = discover_classes(data_dir)?;
    if pools.is_empty() {
        bail!("No class directories found in {}", data_dir.display());
    }
    let stats = DatasetStatistics::from_pools(&pools);
    let target = target.unwrap_or(stats.max_class_size);
    info!("Balancing {} classes to {} images each", pools.len(), target);

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let bar = progress_bar(pools.len())?;
    let mut generated = 0;
    for pool in &pools {
        bar.set_message(pool.label.clone());
        let report = balancer
            .balance_class(pool, target, output_dir, &mut rng)
            .with_context(|| format!("Failed to balance class '{}'", pool.label))?;
        generated += report.generated.len();
        bar.inc(1);
    }
    bar.finish_and_clear();

    for (label, &count) in &stats.class_distribution {
        info!("  {}: {} + {}", label, count, deficit(count, target));
    }
    info!("Generated {} images into {}", generated, output_dir.display());
    Ok(())
}

fn split(data_dir: &Path, output_dir: &Path, ratios: SplitRatios, seed: Option<u64>) -> Result<()> {
    let pools = discover_classes(data_dir)?;
    if pools.is_empty() {
        bail!("No class directories found in {}", data_dir.display());
    }

    let mut splitter = StratifiedSplitter::new(ratios, seed)?;
    let mut totals = SplitCounts::default();

    let bar = progress_bar(pools.len())?;
    for pool in &pools {
        bar.set_message(pool.label.clone());
        let destinations = SplitDestinations::for_class(output_dir, &pool.label);
        let counts = splitter
            .split_files(pool.assets.clone(), &destinations)
            .with_context(|| format!("Failed to split class '{}'", pool.label))?;
        bar.println(format!(
            "  {}: train {}, val {}, test {}",
            pool.label, counts.train, counts.val, counts.test
        ));
        totals += counts;
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "Split {} images: train {}, val {}, test {}",
        totals.total(),
        totals.train,
        totals.val,
        totals.test
    );
    Ok(())
}

fn analyze(data_dir: &Path, output: Option<&Path>) -> Result<()> {
    let pools = discover_classes(data_dir)?;
    let stats = DatasetStatistics::from_pools(&pools);

    info!("Classes: {}", stats.num_classes);
    info!("Total images: {}", stats.num_samples);
    for (label, count) in &stats.class_distribution {
        info!("  {}: {}", label, count);
    }
    info!("Smallest class: {}", stats.min_class_size);
    info!("Largest class: {}", stats.max_class_size);
    info!("Imbalance ratio: {:.2}:1", stats.imbalance_ratio);

    if let Some(path) = output {
        write_json_report(path, &stats)?;
        info!("Statistics saved to {}", path.display());
    }
    Ok(())
}

/// Loads the pipeline config, letting `--seed` win over the file
fn resolve_config(path: Option<&Path>, seed: Option<u64>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => load_toml_config::<PipelineConfig>(path)?,
        None => PipelineConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

fn run(config: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let config = resolve_config(config, seed)?;

    let bar = spinner("Running pipeline")?;
    let report = run_pipeline(&config).context("Pipeline failed")?;
    bar.finish_and_clear();

    info!("Processed: {}", report.normalize.total());
    info!("Skipped: {}", report.normalize.skipped.len());
    for skipped in &report.normalize.skipped {
        warn!("  {}: {}", skipped.path.display(), skipped.reason);
    }
    info!(
        "Generated: {}",
        report.balance.iter().map(|b| b.generated.len()).sum::<usize>()
    );
    for (label, counts) in &report.split {
        info!(
            "  {}: train {}, val {}, test {}",
            label, counts.train, counts.val, counts.test
        );
    }
    info!("Report written to {}", report.report_path.display());
    Ok(())
}
