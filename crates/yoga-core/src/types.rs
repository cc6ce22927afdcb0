//! Core type definitions shared by the pipeline stages.

use std::fmt;
use std::path::{Path, PathBuf};

use image::ColorType;
use serde::{Deserialize, Serialize};

/// Color model of a decoded image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColorMode {
    /// Single channel
    Luma,
    /// Single channel plus alpha
    LumaAlpha,
    /// Three channel color
    Rgb,
    /// Three channel color plus alpha
    Rgba,
    /// Anything wider than 8 bits per channel or otherwise unusual
    Other,
}

impl From<ColorType> for ColorMode {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::L8 => ColorMode::Luma,
            ColorType::La8 => ColorMode::LumaAlpha,
            ColorType::Rgb8 => ColorMode::Rgb,
            ColorType::Rgba8 => ColorMode::Rgba,
            _ => ColorMode::Other,
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Luma => write!(f, "L"),
            ColorMode::LumaAlpha => write!(f, "LA"),
            ColorMode::Rgb => write!(f, "RGB"),
            ColorMode::Rgba => write!(f, "RGBA"),
            ColorMode::Other => write!(f, "other"),
        }
    }
}

/// A single image file as it exists on disk after a pipeline stage wrote it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAsset {
    /// Location of the file
    pub path: PathBuf,
    /// Lowercase file extension, which also names the encoding
    pub encoding: String,
    /// Color model of the pixel data
    pub color: ColorMode,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageAsset {
    /// Describes an image that has just been written to `path`.
    pub fn new(path: impl Into<PathBuf>, color: ColorMode, width: u32, height: u32) -> Self {
        let path = path.into();
        let encoding = extension_of(&path).unwrap_or_default();
        Self {
            path,
            encoding,
            color,
            width,
            height,
        }
    }
}

/// Lowercased extension of a path, if it has one
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Subset a file lands in after splitting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
}

impl DataSplit {
    /// All subsets, in assignment order
    pub const ALL: [DataSplit; 3] = [DataSplit::Train, DataSplit::Validation, DataSplit::Test];

    /// Directory name used for this subset under a split root
    pub fn dir_name(&self) -> &'static str {
        match self {
            DataSplit::Train => "train",
            DataSplit::Validation => "val",
            DataSplit::Test => "test",
        }
    }
}

impl fmt::Display for DataSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

/// Image dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of channels (e.g., 3 for RGB)
    pub channels: u32,
}

impl ImageDimensions {
    /// Creates new image dimensions
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Square RGB input of the given side length
    pub fn square(side: u32) -> Self {
        Self::new(side, side, 3)
    }

    /// Standard ImageNet dimensions (224x224x3)
    pub fn imagenet() -> Self {
        Self::square(224)
    }

    /// Total number of values in a CHW tensor of these dimensions
    pub fn total_values(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_mode_from_color_type() {
        assert_eq!(ColorMode::from(ColorType::Rgb8), ColorMode::Rgb);
        assert_eq!(ColorMode::from(ColorType::La8), ColorMode::LumaAlpha);
        assert_eq!(ColorMode::from(ColorType::Rgb16), ColorMode::Other);
    }

    #[test]
    fn test_image_asset_encoding_from_extension() {
        let asset = ImageAsset::new("out/tree/IMG_01.PNG", ColorMode::Rgb, 40, 30);
        assert_eq!(asset.encoding, "png");
        assert_eq!((asset.width, asset.height), (40, 30));
    }

    #[test]
    fn test_data_split_names() {
        assert_eq!(DataSplit::Train.dir_name(), "train");
        assert_eq!(DataSplit::Validation.dir_name(), "val");
        assert_eq!(DataSplit::Validation.to_string(), "validation");
        assert_eq!(DataSplit::ALL.len(), 3);
    }

    #[test]
    fn test_image_dimensions() {
        let dims = ImageDimensions::imagenet();
        assert_eq!(dims.width, 224);
        assert_eq!(dims.height, 224);
        assert_eq!(dims.channels, 3);
        assert_eq!(dims.total_values(), 224 * 224 * 3);
    }
}
