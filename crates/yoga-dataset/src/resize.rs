//! Aspect-preserving resize to a fixed height.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use yoga_core::{Error, Result};

/// Width that keeps the aspect ratio of a `width`×`height` image at `target_height`.
///
/// `round(target_height * width / height)`; a zero `height` is malformed input.
pub fn target_width(width: u32, height: u32, target_height: u32) -> Result<u32> {
    if width == 0 || height == 0 {
        return Err(Error::MalformedImage(format!(
            "image has a zero dimension ({width}x{height})"
        )));
    }
    if target_height == 0 {
        return Err(Error::InvalidArgument("target height must be positive".to_string()));
    }

    let new_width = (target_height as f64 * width as f64 / height as f64).round();
    if new_width < 1.0 {
        return Err(Error::MalformedImage(format!(
            "{width}x{height} collapses to zero width at height {target_height}"
        )));
    }
    if new_width > u32::MAX as f64 {
        return Err(Error::MalformedImage(format!(
            "{width}x{height} at height {target_height} exceeds the maximum width"
        )));
    }
    Ok(new_width as u32)
}

/// Resizes `image` to exactly `target_height` rows, deriving the width.
///
/// Uses bilinear filtering.
pub fn resize_to_height(image: &DynamicImage, target_height: u32) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    let new_width = target_width(width, height, target_height)?;

    if (new_width, target_height) == (width, height) {
        return Ok(image.clone());
    }

    Ok(image.resize_exact(new_width, target_height, FilterType::Triangle))
}
