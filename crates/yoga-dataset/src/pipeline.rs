//! End-to-end dataset preparation.
//!
//! Normalize the raw tree, top every class up to a common population in the
//! shared augmented area, then split each class into `train/`, `val/` and
//! `test/` under the split root. Every run starts from a fresh normalized
//! tree, drops the previously generated samples of each class and rebuilds
//! the three split subtrees. The source tree is only read.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use yoga_core::{write_json_report, DataSplit, Error, PipelineConfig, Result};

use crate::balance::{clear_generated, generated_files, BalanceReport, ClassBalancer};
use crate::loader::discover_classes;
use crate::normalize::{FormatNormalizer, NormalizeReport};
use crate::split::{reset_directory, SplitCounts, SplitDestinations, StratifiedSplitter};
use crate::statistics::DatasetStatistics;

/// File name of the run summary written into the split root
pub const REPORT_FILE_NAME: &str = "pipeline_report.json";

/// Summary of a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub normalize: NormalizeReport,
    /// Class distribution of the normalized tree
    pub before: DatasetStatistics,
    /// Per-class population the balancer aimed for
    pub target_per_class: usize,
    pub balance: Vec<BalanceReport>,
    /// Class distribution of the pools that were split
    pub after: DatasetStatistics,
    pub split: BTreeMap<String, SplitCounts>,
    pub split_totals: SplitCounts,
    pub report_path: PathBuf,
}

/// Runs every stage with the settings in `config`
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;

    let normalizer = FormatNormalizer::new(config.normalize.clone())?;
    if !config.source_root.is_dir() {
        return Err(Error::InvalidDatasetState(format!(
            "Source root not found: {}",
            config.source_root.display()
        )));
    }
    reset_directory(&config.normalized_root)?;
    let normalize = normalizer.normalize_tree(&config.source_root, &config.normalized_root)?;
    if !normalize.skipped.is_empty() {
        warn!("{} file(s) skipped during normalization", normalize.skipped.len());
    }

    let mut pools = discover_classes(&config.normalized_root)?;
    if pools.is_empty() {
        return Err(Error::InvalidDatasetState(format!(
            "No class directories under {}",
            config.normalized_root.display()
        )));
    }

    let before = DatasetStatistics::from_pools(&pools);
    let target = config
        .balance
        .target_per_class
        .unwrap_or(before.max_class_size);
    info!(
        "{} classes, {} images, imbalance {:.2}; balancing to {} per class",
        before.num_classes, before.num_samples, before.imbalance_ratio, target
    );

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let balancer = ClassBalancer::new(config.augmentation.clone(), normalizer.extension())?;
    for pool in &pools {
        let cleared = clear_generated(&config.augmented_root, &pool.label)?;
        if cleared > 0 {
            debug!("Removed {} earlier samples of '{}'", cleared, pool.label);
        }
    }
    let balance = balancer.balance_all(&pools, target, &config.augmented_root, &mut rng)?;

    for pool in &mut pools {
        pool.extend(generated_files(&config.augmented_root, &pool.label)?);
    }
    let after = DatasetStatistics::from_pools(&pools);

    for split in DataSplit::ALL {
        reset_directory(&config.split_root.join(split.dir_name()))?;
    }
    let mut splitter = StratifiedSplitter::new(config.split_ratios, Some(rng.gen()))?;
    let mut split = BTreeMap::new();
    let mut split_totals = SplitCounts::default();
    for pool in &pools {
        let destinations = SplitDestinations::for_class(&config.split_root, &pool.label);
        let counts = splitter.split_files(pool.assets.clone(), &destinations)?;
        info!(
            "{}: train {}, val {}, test {}",
            pool.label, counts.train, counts.val, counts.test
        );
        split_totals += counts;
        split.insert(pool.label.clone(), counts);
    }

    let report_path = config.split_root.join(REPORT_FILE_NAME);
    let report = PipelineReport {
        normalize,
        before,
        target_per_class: target,
        balance,
        after,
        split,
        split_totals,
        report_path: report_path.clone(),
    };
    write_json_report(&report_path, &report)?;

    info!(
        "Pipeline finished: train {}, val {}, test {} ({})",
        split_totals.train,
        split_totals.val,
        split_totals.test,
        report_path.display()
    );
    Ok(report)
}
