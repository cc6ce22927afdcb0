//! Discovery of class pools on disk.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, warn};
use yoga_core::{extension_of, Error, Result};

/// Extensions the pipeline accepts as input images (compared lowercased)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// Whether a path carries one of the recognized image extensions
pub fn is_image_path(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Images belonging to one class label at some pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPool {
    /// Class label, taken from the directory name
    pub label: String,
    /// Image files in the pool, sorted by path
    pub assets: Vec<PathBuf>,
}

impl ClassPool {
    pub fn new(label: impl Into<String>, mut assets: Vec<PathBuf>) -> Self {
        assets.sort();
        Self {
            label: label.into(),
            assets,
        }
    }

    /// Scans a flat class directory for image files.
    ///
    /// The label is the directory's own name.
    pub fn scan(dir: &Path) -> Result<Self> {
        let label = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::InvalidDatasetState(format!("Class directory has no name: {}", dir.display()))
            })?;

        let assets = scan_images(dir)?;
        debug!("Class '{}': {} images", label, assets.len());

        // Pools are flat; nested images never reach balancing or splitting.
        for nested in nested_dirs(dir)? {
            warn!("Class '{}': skipping nested directory {}", label, nested.display());
        }
        Ok(Self::new(label, assets))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Adds more assets, keeping the pool sorted
    pub fn extend(&mut self, more: impl IntoIterator<Item = PathBuf>) {
        self.assets.extend(more);
        self.assets.sort();
    }
}

/// Lists the image files directly inside `dir`, sorted
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = list_files(dir)?
        .into_iter()
        .filter(|path| is_image_path(path))
        .collect();
    images.sort();
    Ok(images)
}

/// Lists every regular file directly inside `dir`, sorted
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::InvalidDatasetState(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Subdirectories directly inside `dir`, sorted
pub fn nested_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Builds one pool per class subdirectory of `root`, sorted by label.
///
/// Hidden directories are ignored.
pub fn discover_classes(root: &Path) -> Result<Vec<ClassPool>> {
    if !root.is_dir() {
        return Err(Error::InvalidDatasetState(format!(
            "Dataset root not found: {}",
            root.display()
        )));
    }

    let mut pools = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        pools.push(ClassPool::scan(&entry.path())?);
    }

    pools.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(pools)
}

/// Decodes an image that upstream stages have already validated.
///
/// Failure here means the pool is not in the state the caller promised.
pub fn load_pool_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| {
        Error::InvalidDatasetState(format!("Failed to load image {}: {e}", path.display()))
    })
}
