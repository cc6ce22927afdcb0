//! Dataset preparation for yoga pose images.
//!
//! Stages, in the order a full run applies them: format normalization
//! ([`normalize`]), class balancing through random augmentation
//! ([`balance`], [`augmentation`]) and stratified splitting ([`split`]).
//! [`pipeline::run_pipeline`] chains them.

pub mod augmentation;
pub mod balance;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod resize;
pub mod split;
pub mod statistics;

pub use augmentation::AugmentationPipeline;
pub use balance::{BalanceReport, ClassBalancer};
pub use loader::{discover_classes, ClassPool};
pub use normalize::{FormatNormalizer, NormalizeReport, SkippedFile};
pub use pipeline::{run_pipeline, PipelineReport};
pub use preprocess::{ImagePreprocessor, PreprocessConfig};
pub use resize::resize_to_height;
pub use split::{split_counts, SplitCounts, SplitDestinations, StratifiedSplitter};
pub use statistics::DatasetStatistics;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::augmentation::*;
    pub use crate::balance::*;
    pub use crate::loader::*;
    pub use crate::normalize::*;
    pub use crate::pipeline::*;
    pub use crate::preprocess::*;
    pub use crate::resize::*;
    pub use crate::split::*;
    pub use crate::statistics::*;
}
