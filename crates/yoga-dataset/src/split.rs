//! Stratified train/validation/test splitting.
//!
//! A split always starts by deleting and recreating its three destination
//! directories, so rerunning never mixes old output with new. Files are
//! shuffled, then assigned in order: the first `floor(train * total)` to
//! train, the next `floor(validation * total)` to val and the remainder to
//! test. Assignment copies; the source pool is left intact.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use yoga_core::{DataSplit, Error, Result, SplitRatios};

use crate::loader::list_files;

/// Number of files assigned to each subset
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }

    pub fn get(&self, split: DataSplit) -> usize {
        match split {
            DataSplit::Train => self.train,
            DataSplit::Validation => self.val,
            DataSplit::Test => self.test,
        }
    }
}

impl std::ops::AddAssign for SplitCounts {
    fn add_assign(&mut self, other: Self) {
        self.train += other.train;
        self.val += other.val;
        self.test += other.test;
    }
}

/// Partition sizes for a pool of `total` files.
///
/// Train and validation are truncated; test takes whatever is left, so the
/// three counts always sum to `total`.
pub fn split_counts(total: usize, ratios: &SplitRatios) -> Result<SplitCounts> {
    ratios.validate()?;

    let train = ((ratios.train * total as f64).floor() as usize).min(total);
    let val = ((ratios.validation * total as f64).floor() as usize).min(total - train);

    Ok(SplitCounts {
        train,
        val,
        test: total - train - val,
    })
}

/// The three directories a split writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDestinations {
    pub train: PathBuf,
    pub val: PathBuf,
    pub test: PathBuf,
}

impl SplitDestinations {
    pub fn new(train: impl Into<PathBuf>, val: impl Into<PathBuf>, test: impl Into<PathBuf>) -> Self {
        Self {
            train: train.into(),
            val: val.into(),
            test: test.into(),
        }
    }

    /// `root/train/label`, `root/val/label` and `root/test/label`
    pub fn for_class(root: &Path, label: &str) -> Self {
        Self::new(
            root.join(DataSplit::Train.dir_name()).join(label),
            root.join(DataSplit::Validation.dir_name()).join(label),
            root.join(DataSplit::Test.dir_name()).join(label),
        )
    }

    pub fn get(&self, split: DataSplit) -> &Path {
        match split {
            DataSplit::Train => &self.train,
            DataSplit::Validation => &self.val,
            DataSplit::Test => &self.test,
        }
    }
}

/// Deletes `dir` (including any partial leftovers) and recreates it empty
pub fn reset_directory(dir: &Path) -> Result<()> {
    let cleared = if dir.is_dir() {
        fs::remove_dir_all(dir)
    } else if dir.exists() {
        fs::remove_file(dir)
    } else {
        Ok(())
    };

    cleared
        .and_then(|_| fs::create_dir_all(dir))
        .map_err(|e| {
            Error::InvalidDatasetState(format!("Failed to reset {}: {e}", dir.display()))
        })
}

/// Shuffles pools and copies them into train/val/test directories
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    ratios: SplitRatios,
    rng: ChaCha8Rng,
}

impl StratifiedSplitter {
    /// Validates `ratios` up front; `None` seeds the shuffle from OS entropy
    pub fn new(ratios: SplitRatios, seed: Option<u64>) -> Result<Self> {
        ratios.validate()?;
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self { ratios, rng })
    }

    pub fn ratios(&self) -> &SplitRatios {
        &self.ratios
    }

    /// Splits every file directly inside `source_dir`
    pub fn split_directory(
        &mut self,
        source_dir: &Path,
        destinations: &SplitDestinations,
    ) -> Result<SplitCounts> {
        let files = list_files(source_dir)?;
        self.split_files(files, destinations)
    }

    /// Splits an explicit list of files. Names must be unique, since every
    /// file keeps its name in the destination.
    pub fn split_files(
        &mut self,
        mut files: Vec<PathBuf>,
        destinations: &SplitDestinations,
    ) -> Result<SplitCounts> {
        let mut names = HashSet::new();
        for file in &files {
            let name = file.file_name().ok_or_else(|| {
                Error::InvalidDatasetState(format!("Not a file path: {}", file.display()))
            })?;
            if !names.insert(name.to_os_string()) {
                return Err(Error::InvalidDatasetState(format!(
                    "Duplicate file name in split pool: {}",
                    name.to_string_lossy()
                )));
            }
        }

        let counts = split_counts(files.len(), &self.ratios)?;

        for split in DataSplit::ALL {
            reset_directory(destinations.get(split))?;
        }

        files.sort();
        files.shuffle(&mut self.rng);

        for (idx, source) in files.iter().enumerate() {
            let split = if idx < counts.train {
                DataSplit::Train
            } else if idx < counts.train + counts.val {
                DataSplit::Validation
            } else {
                DataSplit::Test
            };

            // file_name presence checked above
            let name = source.file_name().unwrap_or_default();
            let dest = destinations.get(split).join(name);
            fs::copy(source, &dest).map_err(|e| {
                Error::InvalidDatasetState(format!(
                    "Failed to copy {} to {}: {e}",
                    source.display(),
                    dest.display()
                ))
            })?;
            debug!("{} -> {}", source.display(), split);
        }

        info!(
            "Split {} files (train: {}, val: {}, test: {})",
            counts.total(),
            counts.train,
            counts.val,
            counts.test
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_files(dir: &Path, count: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            fs::write(dir.join(format!("img_{i:03}.png")), format!("{i}")).unwrap();
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        list_files(dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_split_counts_concrete() {
        let ratios = SplitRatios::default();
        assert_eq!(
            split_counts(10, &ratios).unwrap(),
            SplitCounts { train: 8, val: 1, test: 1 }
        );
        assert_eq!(
            split_counts(7, &ratios).unwrap(),
            SplitCounts { train: 5, val: 0, test: 2 }
        );
        assert_eq!(split_counts(0, &ratios).unwrap(), SplitCounts::default());
    }

    #[test]
    fn test_split_counts_always_exhaustive() {
        let ratio_sets = [
            SplitRatios::default(),
            SplitRatios::new(0.7, 0.15, 0.15).unwrap(),
            SplitRatios::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0).unwrap(),
            SplitRatios::new(0.0, 0.0, 1.0).unwrap(),
            SplitRatios::new(1.0, 0.0, 0.0).unwrap(),
        ];
        for ratios in &ratio_sets {
            for total in 0..200 {
                let counts = split_counts(total, ratios).unwrap();
                assert_eq!(counts.total(), total);
                assert_eq!(counts.train, (ratios.train * total as f64).floor() as usize);
                assert_eq!(counts.val, (ratios.validation * total as f64).floor() as usize);
            }
        }
    }

    #[test]
    fn test_invalid_ratios_fail_eagerly() {
        let ratios = SplitRatios {
            train: 0.8,
            validation: 0.1,
            test: 0.2,
        };
        assert!(matches!(split_counts(10, &ratios), Err(Error::InvalidSplitRatios(_))));
        assert!(matches!(
            StratifiedSplitter::new(ratios, Some(1)),
            Err(Error::InvalidSplitRatios(_))
        ));
    }

    #[test]
    fn test_split_directory_is_disjoint_and_exhaustive() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("tree");
        make_files(&source, 10);
        let dest = SplitDestinations::for_class(&temp.path().join("split"), "tree");

        let mut splitter = StratifiedSplitter::new(SplitRatios::default(), Some(42)).unwrap();
        let counts = splitter.split_directory(&source, &dest).unwrap();

        assert_eq!(counts, SplitCounts { train: 8, val: 1, test: 1 });
        let mut all: Vec<String> = DataSplit::ALL
            .iter()
            .flat_map(|split| names(dest.get(*split)))
            .collect();
        assert_eq!(all.len(), 10);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
        // copy, not move
        assert_eq!(names(&source).len(), 10);
        assert!(dest.train.ends_with("train/tree"));
    }

    #[test]
    fn test_rerun_replaces_previous_output() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("plank");
        make_files(&source, 7);
        let dest = SplitDestinations::new(
            temp.path().join("train"),
            temp.path().join("val"),
            temp.path().join("test"),
        );

        // leftovers from a crashed run
        make_files(&dest.train, 3);
        fs::create_dir_all(dest.test.join("stale_subdir")).unwrap();
        make_files(&dest.val, 1);

        let mut splitter = StratifiedSplitter::new(SplitRatios::default(), Some(1)).unwrap();
        splitter.split_directory(&source, &dest).unwrap();
        let second = splitter.split_directory(&source, &dest).unwrap();

        assert_eq!(second, SplitCounts { train: 5, val: 0, test: 2 });
        assert_eq!(names(&dest.train).len(), 5);
        assert!(names(&dest.val).is_empty());
        assert_eq!(names(&dest.test).len(), 2);
        assert!(!dest.test.join("stale_subdir").exists());
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("warrior");
        make_files(&source, 20);

        let assign = |root: &str| {
            let dest = SplitDestinations::for_class(&temp.path().join(root), "warrior");
            let mut splitter = StratifiedSplitter::new(SplitRatios::default(), Some(9)).unwrap();
            splitter.split_directory(&source, &dest).unwrap();
            names(&dest.train)
        };

        assert_eq!(assign("a"), assign("b"));
    }

    #[test]
    fn test_duplicate_names_rejected_before_reset() {
        let temp = TempDir::new().unwrap();
        make_files(&temp.path().join("a"), 1);
        make_files(&temp.path().join("b"), 1);
        let dest = SplitDestinations::for_class(&temp.path().join("split"), "x");
        make_files(&dest.train, 2);

        let files = vec![
            temp.path().join("a/img_000.png"),
            temp.path().join("b/img_000.png"),
        ];
        let mut splitter = StratifiedSplitter::new(SplitRatios::default(), Some(0)).unwrap();

        assert!(matches!(
            splitter.split_files(files, &dest),
            Err(Error::InvalidDatasetState(_))
        ));
        assert_eq!(names(&dest.train).len(), 2);
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let temp = TempDir::new().unwrap();
        let dest = SplitDestinations::for_class(temp.path(), "ghost");
        let mut splitter = StratifiedSplitter::new(SplitRatios::default(), None).unwrap();

        let result = splitter.split_directory(&temp.path().join("ghost"), &dest);
        assert!(matches!(result, Err(Error::InvalidDatasetState(_))));
    }
}
