//! Format normalization.
//!
//! Walks a source tree and re-encodes every recognized image into a single
//! target format and color model, mirroring the directory structure under a
//! destination root. This is a best-effort batch: a file that fails to decode,
//! convert or encode is logged and skipped while the rest of the walk carries
//! on.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use yoga_core::{ColorMode, Error, ImageAsset, NormalizeConfig, Result};

use crate::loader::is_image_path;
use crate::resize::resize_to_height;

/// JPEG quality used for lossy targets
pub const MAX_JPEG_QUALITY: u8 = 100;

/// A source file that produced no output, and why
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one normalization walk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Files written under the destination root
    pub converted: Vec<ImageAsset>,
    /// Recognized source files that were not converted
    pub skipped: Vec<SkippedFile>,
    /// Source files deleted afterwards (only with `remove_sources`)
    pub removed_sources: usize,
}

impl NormalizeReport {
    /// Recognized files seen by the walk
    pub fn total(&self) -> usize {
        self.converted.len() + self.skipped.len()
    }
}

/// Converts image trees into one uniform encoding and color model
#[derive(Debug, Clone)]
pub struct FormatNormalizer {
    config: NormalizeConfig,
    extension: String,
    format: ImageFormat,
}

impl FormatNormalizer {
    /// Creates a normalizer, failing if the target extension has no encoder
    pub fn new(config: NormalizeConfig) -> Result<Self> {
        config.validate()?;
        let extension = config.extension();
        let format = ImageFormat::from_extension(&extension)
            .filter(|format| format.can_write())
            .ok_or_else(|| {
                Error::Config(format!("No encoder available for extension '{extension}'"))
            })?;

        Ok(Self {
            config,
            extension,
            format,
        })
    }

    /// Output extension, without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Normalizes every recognized image under `source_root` into `dest_root`.
    ///
    /// Only a missing source root is fatal; every per-file problem ends up in
    /// [`NormalizeReport::skipped`].
    pub fn normalize_tree(&self, source_root: &Path, dest_root: &Path) -> Result<NormalizeReport> {
        if !source_root.is_dir() {
            return Err(Error::InvalidDatasetState(format!(
                "Source root not found: {}",
                source_root.display()
            )));
        }

        info!(
            "Normalizing {:?} -> {:?} as .{}",
            source_root, dest_root, self.extension
        );
        fs::create_dir_all(dest_root)?;

        let mut report = NormalizeReport::default();
        let mut jobs = Vec::new();

        for entry in WalkDir::new(source_root).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_image_path(entry.path()) => {
                    let source = entry.path().to_path_buf();
                    let relative = match source.strip_prefix(source_root) {
                        Ok(relative) => relative.to_path_buf(),
                        Err(e) => {
                            report.skipped.push(skip(&source, e.to_string()));
                            continue;
                        }
                    };
                    let dest = dest_root.join(relative).with_extension(&self.extension);
                    jobs.push((source, dest));
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    report.skipped.push(skip(&path, e.to_string()));
                }
            }
        }

        // `a.jpg` and `a.png` in one directory would both become `a.<ext>`;
        // the first in walk order keeps the name.
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        jobs.retain(|(source, dest)| match claimed.get(dest) {
            Some(owner) => {
                report.skipped.push(skip(
                    source,
                    format!("output {} already produced from {}", dest.display(), owner.display()),
                ));
                false
            }
            None => {
                claimed.insert(dest.clone(), source.clone());
                true
            }
        });

        let outcomes: Vec<(PathBuf, Result<ImageAsset>)> = jobs
            .par_iter()
            .map(|(source, dest)| (source.clone(), self.normalize_file(source, dest)))
            .collect();

        let mut converted_sources = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(asset) => {
                    debug!("Converted {:?} -> {:?}", source, asset.path);
                    report.converted.push(asset);
                    converted_sources.push(source);
                }
                Err(err) => report.skipped.push(skip(&source, err.to_string())),
            }
        }

        for skipped in &report.skipped {
            warn!("Error processing file {}: {}", skipped.path.display(), skipped.reason);
        }

        if self.config.remove_sources {
            report.removed_sources = remove_sources(&converted_sources, &claimed);
        }

        info!(
            "Conversion completed: {} converted, {} skipped",
            report.converted.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Converts one file. Every failure is reported as
    /// [`Error::CorruptOrUnsupportedImage`] scoped to `source`.
    pub fn normalize_file(&self, source: &Path, dest: &Path) -> Result<ImageAsset> {
        let corrupt = |reason: String| Error::CorruptOrUnsupportedImage {
            path: source.to_path_buf(),
            reason,
        };

        let image = ImageReader::open(source)
            .map_err(|e| corrupt(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| corrupt(e.to_string()))?
            .decode()
            .map_err(|e| corrupt(e.to_string()))?;

        let mut image = if image.color() == ColorType::Rgb8 {
            image
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        if let Some(height) = self.config.target_height {
            image = resize_to_height(&image, height).map_err(|e| corrupt(e.to_string()))?;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| corrupt(e.to_string()))?;
        }
        encode(&image, dest, self.format).map_err(|e| corrupt(e.to_string()))?;

        Ok(ImageAsset::new(
            dest,
            ColorMode::from(image.color()),
            image.width(),
            image.height(),
        ))
    }
}

fn skip(path: &Path, reason: String) -> SkippedFile {
    SkippedFile {
        path: path.to_path_buf(),
        reason,
    }
}

/// Encodes at maximum quality; lossless formats ignore quality entirely
pub(crate) fn encode(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_encoded(image, &mut writer, format)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn write_encoded<W>(image: &DynamicImage, writer: &mut W, format: ImageFormat) -> Result<()>
where
    W: Write + std::io::Seek,
{
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(writer, MAX_JPEG_QUALITY);
            image.write_with_encoder(encoder)?;
        }
        _ => image.write_to(writer, format)?,
    }
    Ok(())
}

fn remove_sources(sources: &[PathBuf], outputs: &HashMap<PathBuf, PathBuf>) -> usize {
    let mut removed = 0;
    for source in sources {
        // Never delete a file that is also an output of this run.
        if outputs.contains_key(source) {
            continue;
        }
        match fs::remove_file(source) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove source {}: {}", source.display(), e),
        }
    }
    info!("Removed {} source files", removed);
    removed
}
