//! Model-input preprocessing.
//!
//! Training and inference must agree on the input contract: a square RGB
//! image at the model's input side, with intensities scaled into `[0, 1]`
//! and laid out channel-first. [`ImagePreprocessor`] is the single place
//! that contract is defined.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use yoga_core::{Error, ImageDimensions, Result};

/// Configuration for model-input preprocessing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Model input dimensions; width and height are equal for every
    /// shipped model
    pub target_size: ImageDimensions,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: ImageDimensions::imagenet(),
        }
    }
}

/// Turns decoded images into CHW tensors in `[0, 1]`
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Preprocessor for a square input of `side` pixels
    pub fn square(side: u32) -> Self {
        Self::new(PreprocessConfig {
            target_size: ImageDimensions::square(side),
        })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Resizes and scales an image into model input
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let resized = self.resize_image(&image.to_rgb8())?;
        Ok(Self::to_chw(&resized))
    }

    pub fn preprocess_from_path(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path).map_err(|e| {
            Error::Image(format!("Failed to load image {}: {e}", path.display()))
        })?;
        self.preprocess(&image)
    }

    /// `[channels, height, width]`
    pub fn output_shape(&self) -> [usize; 3] {
        [
            self.config.target_size.channels as usize,
            self.config.target_size.height as usize,
            self.config.target_size.width as usize,
        ]
    }

    /// Maps a preprocessed tensor back to an RGB image
    pub fn to_image(&self, values: &[f32]) -> Result<RgbImage> {
        let width = self.config.target_size.width as usize;
        let height = self.config.target_size.height as usize;
        let plane = width * height;

        if values.len() != plane * 3 {
            return Err(Error::InvalidArgument(format!(
                "Expected {} values, got {}",
                plane * 3,
                values.len()
            )));
        }

        Ok(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            let idx = y as usize * width + x as usize;
            let channel = |c: usize| (values[c * plane + idx].clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb([channel(0), channel(1), channel(2)])
        }))
    }

    fn resize_image(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::MalformedImage(format!(
                "Cannot preprocess a {width}x{height} image"
            )));
        }

        let target_w = self.config.target_size.width;
        let target_h = self.config.target_size.height;
        if width == target_w && height == target_h {
            return Ok(image.clone());
        }

        Ok(image::imageops::resize(
            image,
            target_w,
            target_h,
            FilterType::Triangle,
        ))
    }

    fn to_chw(image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let mut values = Vec::with_capacity(width as usize * height as usize * 3);

        for channel in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    values.push(image.get_pixel(x, y)[channel] as f32 / 255.0);
                }
            }
        }

        values
    }
}
