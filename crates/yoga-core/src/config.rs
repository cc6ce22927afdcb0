//! Configuration structures for the dataset preparation pipeline.
//!
//! Every directory the pipeline touches is passed in through these values;
//! no stage reads a hard-coded path.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tolerance used when checking that split ratios sum to one
pub const RATIO_TOLERANCE: f64 = 1e-6;

/// Top-level configuration for a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw images, one subdirectory per class label
    pub source_root: PathBuf,
    /// Mirror of `source_root` after format normalization
    pub normalized_root: PathBuf,
    /// Shared output area for synthetic samples of every class
    pub augmented_root: PathBuf,
    /// Root of the `train/`, `val/` and `test/` trees
    pub split_root: PathBuf,
    /// Seed for augmentation and shuffling; `None` draws from OS entropy
    pub seed: Option<u64>,
    pub normalize: NormalizeConfig,
    pub balance: BalanceConfig,
    pub split_ratios: SplitRatios,
    pub augmentation: AugmentationSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("data"),
            normalized_root: PathBuf::from("dataconv"),
            augmented_root: PathBuf::from("augmented"),
            split_root: PathBuf::from("split"),
            seed: None,
            normalize: NormalizeConfig::default(),
            balance: BalanceConfig::default(),
            split_ratios: SplitRatios::default(),
            augmentation: AugmentationSpec::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks every nested section that has invariants of its own
    pub fn validate(&self) -> Result<()> {
        self.check_roots()?;
        self.normalize.validate()?;
        self.split_ratios.validate()?;
        self.augmentation.validate()
    }

    /// Every stage clears part of its output root, so no root may equal or
    /// contain another one.
    fn check_roots(&self) -> Result<()> {
        let roots = [
            ("source_root", resolve_root(&self.source_root)?),
            ("normalized_root", resolve_root(&self.normalized_root)?),
            ("augmented_root", resolve_root(&self.augmented_root)?),
            ("split_root", resolve_root(&self.split_root)?),
        ];

        for (i, (name_a, a)) in roots.iter().enumerate() {
            for (name_b, b) in &roots[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(Error::Config(format!(
                        "{name_a} ({}) and {name_b} ({}) overlap",
                        a.display(),
                        b.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Absolute form of `path` for overlap checks: `.` and `..` are folded
/// lexically and the deepest existing ancestor is canonicalized.
fn resolve_root(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut lexical = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Format normalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Extension (without the dot) of every output file; selects the encoder
    pub target_extension: String,
    /// When set, every image is resized to this height keeping its aspect ratio
    pub target_height: Option<u32>,
    /// Delete source files that converted successfully once the walk finishes
    pub remove_sources: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_extension: "png".to_string(),
            target_height: None,
            remove_sources: false,
        }
    }
}

impl NormalizeConfig {
    /// Extension with any leading dot stripped and lowercased
    pub fn extension(&self) -> String {
        self.target_extension
            .trim_start_matches('.')
            .to_lowercase()
    }

    pub fn validate(&self) -> Result<()> {
        if self.extension().is_empty() {
            return Err(Error::Config("target extension must not be empty".to_string()));
        }
        if self.target_height == Some(0) {
            return Err(Error::Config("target height must be positive".to_string()));
        }
        Ok(())
    }
}

/// Class balancing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Population every class is brought up to; `None` uses the largest class
    pub target_per_class: Option<usize>,
}

/// Train/validation/test split ratios
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SplitRatios {
    /// Training data ratio
    pub train: f64,
    /// Validation data ratio
    pub validation: f64,
    /// Test data ratio
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            validation: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, validation: f64, test: f64) -> Result<Self> {
        let ratios = Self {
            train,
            validation,
            test,
        };
        ratios.validate()?;
        Ok(ratios)
    }

    /// Validates that ratios are non-negative and sum to 1.0
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("train", self.train),
            ("validation", self.validation),
            ("test", self.test),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidSplitRatios(format!(
                    "{name} ratio must be a non-negative number, got {value}"
                )));
            }
        }

        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(Error::InvalidSplitRatios(format!(
                "ratios must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Ordered list of randomized transforms applied to every synthetic sample.
///
/// Each step fires independently with its own probability, so one sample may
/// receive any combination of the listed transforms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AugmentationSpec {
    pub steps: Vec<TransformStep>,
}

/// One entry of an [`AugmentationSpec`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformStep {
    /// Chance in `[0, 1]` that this step is applied to a given sample
    pub probability: f32,
    pub kind: TransformKind,
}

impl TransformStep {
    pub fn new(probability: f32, kind: TransformKind) -> Self {
        Self { probability, kind }
    }
}

/// A single transform and the range its parameters are drawn from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformKind {
    /// Scale distance from the mean luminance
    Contrast { min_factor: f32, max_factor: f32 },
    /// Scale pixel intensities
    Brightness { min_factor: f32, max_factor: f32 },
    /// Scale distance from each pixel's grey value
    Color { min_factor: f32, max_factor: f32 },
    FlipLeftRight,
    FlipTopBottom,
    /// Rotate by an angle in `[-max_left_degrees, max_right_degrees]`
    Rotate {
        max_left_degrees: f32,
        max_right_degrees: f32,
    },
    /// Crop a window covering a fraction of the area, then scale back up
    ZoomRandom { min_area: f32, max_area: f32 },
    /// Local elastic warp driven by a grid of random vertex displacements
    Distortion {
        grid_width: u32,
        grid_height: u32,
        magnitude: f32,
    },
}

impl TransformKind {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Contrast { .. } => "contrast",
            TransformKind::Brightness { .. } => "brightness",
            TransformKind::Color { .. } => "color",
            TransformKind::FlipLeftRight => "flip_left_right",
            TransformKind::FlipTopBottom => "flip_top_bottom",
            TransformKind::Rotate { .. } => "rotate",
            TransformKind::ZoomRandom { .. } => "zoom_random",
            TransformKind::Distortion { .. } => "distortion",
        }
    }
}

impl Default for AugmentationSpec {
    fn default() -> Self {
        use TransformKind::*;

        Self {
            steps: vec![
                TransformStep::new(0.5, Contrast { min_factor: 0.8, max_factor: 1.2 }),
                TransformStep::new(0.5, Brightness { min_factor: 0.8, max_factor: 1.2 }),
                TransformStep::new(0.5, Color { min_factor: 0.8, max_factor: 1.2 }),
                TransformStep::new(0.5, FlipLeftRight),
                TransformStep::new(
                    0.7,
                    Rotate {
                        max_left_degrees: 10.0,
                        max_right_degrees: 10.0,
                    },
                ),
                TransformStep::new(0.5, ZoomRandom { min_area: 0.9, max_area: 0.9 }),
                TransformStep::new(0.2, FlipTopBottom),
                TransformStep::new(
                    0.5,
                    Distortion {
                        grid_width: 4,
                        grid_height: 4,
                        magnitude: 8.0,
                    },
                ),
            ],
        }
    }
}

impl AugmentationSpec {
    /// No steps; every generated sample is a plain copy of its source
    pub fn identity() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            let name = step.kind.name();
            if !(0.0..=1.0).contains(&step.probability) {
                return Err(Error::Config(format!(
                    "step {idx} ({name}): probability {} is outside [0, 1]",
                    step.probability
                )));
            }

            match step.kind {
                TransformKind::Contrast { min_factor, max_factor }
                | TransformKind::Brightness { min_factor, max_factor }
                | TransformKind::Color { min_factor, max_factor } => {
                    if !min_factor.is_finite()
                        || !max_factor.is_finite()
                        || min_factor <= 0.0
                        || min_factor > max_factor
                    {
                        return Err(Error::Config(format!(
                            "step {idx} ({name}): factor range [{min_factor}, {max_factor}] is invalid"
                        )));
                    }
                }
                TransformKind::Rotate {
                    max_left_degrees,
                    max_right_degrees,
                } => {
                    // NaN fails the range check
                    if !(0.0..90.0).contains(&max_left_degrees)
                        || !(0.0..90.0).contains(&max_right_degrees)
                    {
                        return Err(Error::Config(format!(
                            "step {idx} ({name}): rotation bounds must be within [0, 90) degrees"
                        )));
                    }
                }
                TransformKind::ZoomRandom { min_area, max_area } => {
                    if !min_area.is_finite()
                        || !max_area.is_finite()
                        || min_area <= 0.0
                        || max_area > 1.0
                        || min_area > max_area
                    {
                        return Err(Error::Config(format!(
                            "step {idx} ({name}): area range [{min_area}, {max_area}] must lie in (0, 1]"
                        )));
                    }
                }
                TransformKind::Distortion {
                    grid_width,
                    grid_height,
                    magnitude,
                } => {
                    if grid_width == 0 || grid_height == 0 || !magnitude.is_finite() || magnitude < 0.0 {
                        return Err(Error::Config(format!(
                            "step {idx} ({name}): grid must be non-empty and magnitude non-negative"
                        )));
                    }
                }
                TransformKind::FlipLeftRight | TransformKind::FlipTopBottom => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ratios_validation() {
        assert!(SplitRatios::default().validate().is_ok());
        assert!(SplitRatios::new(0.7, 0.15, 0.15).is_ok());

        let short = SplitRatios::new(0.5, 0.3, 0.1);
        assert!(matches!(short, Err(Error::InvalidSplitRatios(_))));

        let negative = SplitRatios::new(1.2, -0.1, -0.1);
        assert!(matches!(negative, Err(Error::InvalidSplitRatios(_))));
    }

    #[test]
    fn test_default_augmentation_spec_matches_reference_pipeline() {
        let spec = AugmentationSpec::default();
        let names: Vec<_> = spec.steps.iter().map(|s| s.kind.name()).collect();
        assert_eq!(
            names,
            [
                "contrast",
                "brightness",
                "color",
                "flip_left_right",
                "rotate",
                "zoom_random",
                "flip_top_bottom",
                "distortion"
            ]
        );
        assert_eq!(spec.steps[4].probability, 0.7);
        assert_eq!(spec.steps[6].probability, 0.2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_augmentation_spec_rejects_bad_steps() {
        let bad_probability = AugmentationSpec {
            steps: vec![TransformStep::new(1.5, TransformKind::FlipLeftRight)],
        };
        assert!(bad_probability.validate().is_err());

        let inverted = AugmentationSpec {
            steps: vec![TransformStep::new(
                0.5,
                TransformKind::Brightness { min_factor: 1.2, max_factor: 0.8 },
            )],
        };
        assert!(inverted.validate().is_err());

        let empty_grid = AugmentationSpec {
            steps: vec![TransformStep::new(
                0.5,
                TransformKind::Distortion {
                    grid_width: 0,
                    grid_height: 4,
                    magnitude: 8.0,
                },
            )],
        };
        assert!(empty_grid.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_from_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            source_root = "raw"
            seed = 7

            [normalize]
            target_extension = ".JPG"
            target_height = 250

            [split_ratios]
            train = 0.7
            validation = 0.2
            test = 0.1

            [[augmentation.steps]]
            probability = 0.5
            kind = { type = "flip_left_right" }

            [[augmentation.steps]]
            probability = 0.7
            kind = { type = "rotate", max_left_degrees = 5.0, max_right_degrees = 15.0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.source_root, PathBuf::from("raw"));
        assert_eq!(config.normalized_root, PathBuf::from("dataconv"));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.normalize.extension(), "jpg");
        assert_eq!(config.normalize.target_height, Some(250));
        assert_eq!(config.split_ratios.validation, 0.2);
        assert_eq!(config.augmentation.steps.len(), 2);
        assert_eq!(
            config.augmentation.steps[1].kind,
            TransformKind::Rotate {
                max_left_degrees: 5.0,
                max_right_degrees: 15.0
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_augmentation_spec_rejects_non_finite_parameters() {
        let kinds = [
            TransformKind::Contrast { min_factor: f32::NAN, max_factor: f32::NAN },
            TransformKind::Color { min_factor: 0.8, max_factor: f32::INFINITY },
            TransformKind::Rotate { max_left_degrees: f32::NAN, max_right_degrees: 10.0 },
            TransformKind::ZoomRandom { min_area: f32::NAN, max_area: 0.9 },
            TransformKind::Distortion { grid_width: 4, grid_height: 4, magnitude: f32::NAN },
            TransformKind::Distortion { grid_width: 4, grid_height: 4, magnitude: f32::INFINITY },
        ];
        for kind in kinds {
            let spec = AugmentationSpec {
                steps: vec![TransformStep::new(0.5, kind.clone())],
            };
            assert!(spec.validate().is_err(), "{kind:?} accepted");
        }

        let from_toml: PipelineConfig = toml::from_str(
            r#"
            [[augmentation.steps]]
            probability = 0.5
            kind = { type = "brightness", min_factor = nan, max_factor = nan }
            "#,
        )
        .unwrap();
        assert!(matches!(from_toml.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        let config_with = |split_root: PathBuf| PipelineConfig {
            source_root: root.join("data"),
            normalized_root: root.join("dataconv"),
            augmented_root: root.join("augmented"),
            split_root,
            ..PipelineConfig::default()
        };

        assert!(config_with(root.join("split")).validate().is_ok());
        // parent of the raw data
        assert!(matches!(
            config_with(root.to_path_buf()).validate(),
            Err(Error::Config(_))
        ));
        // same directory spelled differently
        assert!(config_with(root.join("split/../data/.")).validate().is_err());
        // nested inside another output
        assert!(config_with(root.join("augmented/split")).validate().is_err());
        // sibling whose name shares a prefix is fine
        assert!(config_with(root.join("data_split")).validate().is_ok());
    }

    #[test]
    fn test_current_dir_as_split_root_contains_relative_source() {
        let config = PipelineConfig {
            split_root: PathBuf::from("."),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_normalize_config_rejects_zero_height() {
        let config = NormalizeConfig {
            target_height: Some(0),
            ..NormalizeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
