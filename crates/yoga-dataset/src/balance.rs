//! Class balancing by synthetic augmentation.
//!
//! Every class writes its synthetic samples into one shared output area.
//! Generated names have the form `{label}__aug{seq:06}__{source_stem}.{ext}`;
//! `seq` continues from the highest number already present for the label,
//! and files are opened with `create_new`, so a sample is never silently
//! overwritten by another class, a rerun or a concurrent writer.

use std::fs::{self, OpenOptions};
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use yoga_core::{AugmentationSpec, Error, Result};

use crate::augmentation::AugmentationPipeline;
use crate::loader::{list_files, load_pool_image, ClassPool};
use crate::normalize::write_encoded;

/// What the balancer did for one class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceReport {
    pub label: String,
    /// Population before balancing
    pub existing: usize,
    /// Requested population
    pub target: usize,
    /// Files written into the shared area
    pub generated: Vec<PathBuf>,
}

/// Number of samples needed to bring `existing` up to `target`; never negative
pub fn deficit(existing: usize, target: usize) -> usize {
    target.saturating_sub(existing)
}

/// File name of the `seq`-th synthetic sample of `label`
pub fn generated_name(label: &str, seq: u64, source_stem: &str, extension: &str) -> String {
    format!("{label}__aug{seq:06}__{source_stem}.{extension}")
}

/// Sequence number encoded in `file_name` if it was generated for `label`
pub fn parse_sequence(file_name: &str, label: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(label)?.strip_prefix("__aug")?;
    let (digits, _) = rest.split_once("__")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Synthetic files already generated for `label` in `output_dir`
pub fn generated_files(output_dir: &Path, label: &str) -> Result<Vec<PathBuf>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(list_files(output_dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| parse_sequence(&name.to_string_lossy(), label))
                .is_some()
        })
        .collect())
}

/// Deletes the synthetic files of `label` from `output_dir`, leaving every
/// other file alone
pub fn clear_generated(output_dir: &Path, label: &str) -> Result<usize> {
    let files = generated_files(output_dir, label)?;
    for path in &files {
        fs::remove_file(path).map_err(|e| {
            Error::InvalidDatasetState(format!("Failed to remove {}: {e}", path.display()))
        })?;
    }
    Ok(files.len())
}

fn next_sequence(output_dir: &Path, label: &str) -> Result<u64> {
    let highest = list_files(output_dir)?
        .iter()
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| parse_sequence(&name.to_string_lossy(), label))
        })
        .max();
    Ok(highest.map_or(0, |seq| seq + 1))
}

/// One synthetic sample, fully determined before rendering starts
struct Job<'a> {
    source: &'a Path,
    seq: u64,
    seed: u64,
}

/// Brings class pools up to a target population
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    pipeline: AugmentationPipeline,
    extension: String,
    format: ImageFormat,
}

impl ClassBalancer {
    /// `extension` selects the encoding of generated files
    pub fn new(spec: AugmentationSpec, extension: &str) -> Result<Self> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        let format = ImageFormat::from_extension(&extension)
            .filter(|format| format.can_write())
            .ok_or_else(|| {
                Error::Config(format!("No encoder available for extension '{extension}'"))
            })?;

        Ok(Self {
            pipeline: AugmentationPipeline::new(spec)?,
            extension,
            format,
        })
    }

    /// Generates exactly `deficit(pool.len(), target)` samples into `output_dir`.
    ///
    /// Sources are drawn with replacement. The source and per-sample seed of
    /// every job come from `rng` before any rendering, so a seeded run is
    /// reproducible whatever the thread schedule. An unreadable source aborts
    /// the class.
    pub fn balance_class<R: Rng + ?Sized>(
        &self,
        pool: &ClassPool,
        target: usize,
        output_dir: &Path,
        rng: &mut R,
    ) -> Result<BalanceReport> {
        let existing = pool.len();
        let needed = deficit(existing, target);

        let mut report = BalanceReport {
            label: pool.label.clone(),
            existing,
            target,
            generated: Vec::new(),
        };

        if needed == 0 {
            info!("Class '{}': {} >= {}, nothing to generate", pool.label, existing, target);
            return Ok(report);
        }
        if pool.is_empty() {
            return Err(Error::InvalidDatasetState(format!(
                "Class '{}' has no images to augment",
                pool.label
            )));
        }

        fs::create_dir_all(output_dir).map_err(|e| {
            Error::InvalidDatasetState(format!(
                "Failed to create output directory {}: {e}",
                output_dir.display()
            ))
        })?;

        let first_seq = next_sequence(output_dir, &pool.label)?;
        let jobs: Vec<Job> = (0..needed as u64)
            .map(|offset| Job {
                source: pool.assets[rng.gen_range(0..existing)].as_path(),
                seq: first_seq + offset,
                seed: rng.gen(),
            })
            .collect();

        info!(
            "Class '{}': generating {} samples ({} -> {})",
            pool.label, needed, existing, target
        );

        report.generated = jobs
            .par_iter()
            .map(|job| self.render(&pool.label, job, output_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(report)
    }

    /// Balances every pool against the same target, in pool order
    pub fn balance_all<R: Rng + ?Sized>(
        &self,
        pools: &[ClassPool],
        target: usize,
        output_dir: &Path,
        rng: &mut R,
    ) -> Result<Vec<BalanceReport>> {
        pools
            .iter()
            .map(|pool| self.balance_class(pool, target, output_dir, rng))
            .collect()
    }

    fn render(&self, label: &str, job: &Job, output_dir: &Path) -> Result<PathBuf> {
        let image = load_pool_image(job.source)?;
        let mut rng = ChaCha8Rng::seed_from_u64(job.seed);
        let augmented = self.pipeline.augment(&image, &mut rng);

        let stem = job
            .source
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let path = output_dir.join(generated_name(label, job.seq, &stem, &self.extension));

        // Encode first so a failed render never leaves a file behind.
        let mut encoded = Cursor::new(Vec::new());
        write_encoded(&augmented, &mut encoded, self.format)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::InvalidDatasetState(format!(
                    "Generated name collides with an existing file: {}",
                    path.display()
                )),
                _ => Error::InvalidDatasetState(format!(
                    "Failed to create {}: {e}",
                    path.display()
                )),
            })?;

        if let Err(e) = file.write_all(encoded.get_ref()).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(Error::InvalidDatasetState(format!(
                "Failed to write {}: {e}",
                path.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn make_pool(root: &Path, label: &str, count: usize) -> ClassPool {
        let dir = root.join(label);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            ImageBuffer::from_fn(24, 16, |x, y| Rgb([(x * 10) as u8, (y * 15) as u8, i as u8]))
                .save(dir.join(format!("{i}.png")))
                .unwrap();
        }
        ClassPool::scan(&dir).unwrap()
    }

    fn balancer() -> ClassBalancer {
        ClassBalancer::new(AugmentationSpec::default(), "png").unwrap()
    }

    #[test]
    fn test_deficit() {
        assert_eq!(deficit(3, 10), 7);
        assert_eq!(deficit(10, 10), 0);
        assert_eq!(deficit(12, 10), 0);
    }

    #[test]
    fn test_name_round_trip() {
        let name = generated_name("downdog", 42, "IMG_7", "png");
        assert_eq!(name, "downdog__aug000042__IMG_7.png");
        assert_eq!(parse_sequence(&name, "downdog"), Some(42));
        assert_eq!(parse_sequence(&name, "down"), None);
        assert_eq!(parse_sequence("downdog_1.png", "downdog"), None);
    }

    #[test]
    fn test_generates_exactly_the_deficit() {
        let temp = TempDir::new().unwrap();
        let pool = make_pool(temp.path(), "tree", 3);
        let out = temp.path().join("augmented");
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let report = balancer().balance_class(&pool, 10, &out, &mut rng).unwrap();

        assert_eq!(report.existing, 3);
        assert_eq!(report.generated.len(), 7);
        assert_eq!(list_files(&out).unwrap().len(), 7);
        // source pool untouched
        assert_eq!(ClassPool::scan(&temp.path().join("tree")).unwrap().len(), 3);
    }

    #[test]
    fn test_full_pool_generates_nothing() {
        let temp = TempDir::new().unwrap();
        let pool = make_pool(temp.path(), "plank", 5);
        let out = temp.path().join("augmented");
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let report = balancer().balance_class(&pool, 4, &out, &mut rng).unwrap();
        assert!(report.generated.is_empty());
        assert_eq!(ClassPool::scan(&temp.path().join("plank")).unwrap().len(), 5);
    }

    #[test]
    fn test_shared_area_names_never_collide() {
        let temp = TempDir::new().unwrap();
        let tree = make_pool(temp.path(), "tree", 2);
        let plank = make_pool(temp.path(), "plank", 2);
        let out = temp.path().join("augmented");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let balancer = balancer();

        balancer.balance_all(&[tree.clone(), plank], 6, &out, &mut rng).unwrap();
        // a rerun continues numbering instead of overwriting
        let rerun = balancer.balance_class(&tree, 6, &out, &mut rng).unwrap();

        assert_eq!(list_files(&out).unwrap().len(), 12);
        assert_eq!(generated_files(&out, "tree").unwrap().len(), 8);
        assert_eq!(generated_files(&out, "plank").unwrap().len(), 4);
        assert!(rerun.generated[0]
            .to_string_lossy()
            .contains("tree__aug000004__"));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let temp = TempDir::new().unwrap();
        let pool = make_pool(temp.path(), "warrior", 4);
        let balancer = balancer();

        let run = |dir: &str| {
            let out = temp.path().join(dir);
            let mut rng = ChaCha8Rng::seed_from_u64(2024);
            balancer.balance_class(&pool, 9, &out, &mut rng).unwrap();
            list_files(&out)
                .unwrap()
                .into_iter()
                .map(|path| {
                    let name = path.file_name().unwrap().to_string_lossy().to_string();
                    (name, fs::read(&path).unwrap())
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run("first"), run("second"));
    }

    #[test]
    fn test_corrupt_source_is_fatal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tree");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("broken.png"), b"not an image").unwrap();
        let pool = ClassPool::scan(&dir).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let result = balancer().balance_class(&pool, 3, &temp.path().join("out"), &mut rng);
        assert!(matches!(result, Err(Error::InvalidDatasetState(_))));
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("wide");
        fs::create_dir_all(&dir).unwrap();
        // ICO frames are limited to 256 pixels a side
        ImageBuffer::from_pixel(300, 16, Rgb([10u8, 20, 30]))
            .save(dir.join("0.png"))
            .unwrap();
        let pool = ClassPool::scan(&dir).unwrap();
        let out = temp.path().join("augmented");

        let balancer = ClassBalancer::new(AugmentationSpec::identity(), "ico").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert!(balancer.balance_class(&pool, 3, &out, &mut rng).is_err());
        assert!(list_files(&out).unwrap().is_empty());
    }

    #[test]
    fn test_clear_generated_only_touches_its_label() {
        let temp = TempDir::new().unwrap();
        let tree = make_pool(temp.path(), "tree", 1);
        let plank = make_pool(temp.path(), "plank", 1);
        let out = temp.path().join("augmented");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("notes.txt"), "keep").unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        balancer()
            .balance_all(&[tree, plank], 3, &out, &mut rng)
            .unwrap();

        assert_eq!(clear_generated(&out, "tree").unwrap(), 2);
        assert!(generated_files(&out, "tree").unwrap().is_empty());
        assert_eq!(generated_files(&out, "plank").unwrap().len(), 2);
        assert!(out.join("notes.txt").is_file());
    }

    #[test]
    fn test_empty_pool_with_deficit_is_fatal() {
        let temp = TempDir::new().unwrap();
        let pool = ClassPool::new("empty", Vec::new());
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let result = balancer().balance_class(&pool, 3, temp.path(), &mut rng);
        assert!(matches!(result, Err(Error::InvalidDatasetState(_))));
    }
}
