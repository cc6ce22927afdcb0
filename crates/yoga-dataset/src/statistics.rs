//! Per-class counts for a set of pools.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::loader::ClassPool;

/// Class distribution of a dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatasetStatistics {
    pub num_samples: usize,
    pub num_classes: usize,
    /// Images per class label
    pub class_distribution: BTreeMap<String, usize>,
    pub min_class_size: usize,
    pub max_class_size: usize,
    /// Largest class over smallest; 0.0 when a class is empty or there are none
    pub imbalance_ratio: f64,
}

impl DatasetStatistics {
    pub fn from_pools(pools: &[ClassPool]) -> Self {
        let class_distribution: BTreeMap<String, usize> = pools
            .iter()
            .map(|pool| (pool.label.clone(), pool.len()))
            .collect();

        let min_class_size = class_distribution.values().copied().min().unwrap_or(0);
        let max_class_size = class_distribution.values().copied().max().unwrap_or(0);
        let imbalance_ratio = if min_class_size == 0 {
            0.0
        } else {
            max_class_size as f64 / min_class_size as f64
        };

        Self {
            num_samples: class_distribution.values().sum(),
            num_classes: class_distribution.len(),
            class_distribution,
            min_class_size,
            max_class_size,
            imbalance_ratio,
        }
    }

    /// Whether every class already holds the same number of images
    pub fn is_balanced(&self) -> bool {
        self.min_class_size == self.max_class_size
    }

    /// Labels with fewer than `target` images, with their deficit
    pub fn deficits(&self, target: usize) -> Vec<(&str, usize)> {
        self.class_distribution
            .iter()
            .filter(|(_, &count)| count < target)
            .map(|(label, &count)| (label.as_str(), target - count))
            .collect()
    }
}
