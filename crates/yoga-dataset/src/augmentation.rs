//! Randomized image transforms driven by an [`AugmentationSpec`].
//!
//! The pipeline walks its steps in order. Each step fires when a uniform draw
//! falls below its probability, and its parameters are drawn uniformly from
//! the configured range at that moment. Every transform returns an image of
//! the same dimensions as its input.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use yoga_core::{AugmentationSpec, Result, TransformKind};

/// Applies an [`AugmentationSpec`] to images
#[derive(Debug, Clone)]
pub struct AugmentationPipeline {
    spec: AugmentationSpec,
}

impl AugmentationPipeline {
    /// Creates a pipeline, rejecting specs with invalid parameter ranges
    pub fn new(spec: AugmentationSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &AugmentationSpec {
        &self.spec
    }

    /// Produces one randomized variant of `image`
    pub fn augment<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        let mut result = image.to_rgb8();

        for step in &self.spec.steps {
            if rng.gen::<f32>() >= step.probability {
                continue;
            }

            result = match step.kind {
                TransformKind::Contrast { min_factor, max_factor } => {
                    adjust_contrast(&result, rng.gen_range(min_factor..=max_factor))
                }
                TransformKind::Brightness { min_factor, max_factor } => {
                    adjust_brightness(&result, rng.gen_range(min_factor..=max_factor))
                }
                TransformKind::Color { min_factor, max_factor } => {
                    adjust_color(&result, rng.gen_range(min_factor..=max_factor))
                }
                TransformKind::FlipLeftRight => imageops::flip_horizontal(&result),
                TransformKind::FlipTopBottom => imageops::flip_vertical(&result),
                TransformKind::Rotate {
                    max_left_degrees,
                    max_right_degrees,
                } => rotate_and_crop(&result, rng.gen_range(-max_left_degrees..=max_right_degrees)),
                TransformKind::ZoomRandom { min_area, max_area } => {
                    let area = rng.gen_range(min_area..=max_area);
                    zoom(&result, area, rng)
                }
                TransformKind::Distortion {
                    grid_width,
                    grid_height,
                    magnitude,
                } => distort(&result, grid_width, grid_height, magnitude, rng),
            };
        }

        DynamicImage::ImageRgb8(result)
    }
}

fn luminance(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

fn map_channels(image: &RgbImage, f: impl Fn(f32, f32) -> f32) -> RgbImage {
    let (width, height) = image.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        let gray = luminance(pixel);
        Rgb([
            f(pixel[0] as f32, gray).round().clamp(0.0, 255.0) as u8,
            f(pixel[1] as f32, gray).round().clamp(0.0, 255.0) as u8,
            f(pixel[2] as f32, gray).round().clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Scales each channel's distance from the image's mean luminance
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let count = (width as f64 * height as f64).max(1.0);
    let mean = (image.pixels().map(|p| luminance(p) as f64).sum::<f64>() / count) as f32;
    map_channels(image, |value, _| mean + factor * (value - mean))
}

/// Scales every channel, blending toward black below 1.0
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    map_channels(image, |value, _| value * factor)
}

/// Scales each channel's distance from the pixel's own grey value
pub fn adjust_color(image: &RgbImage, factor: f32) -> RgbImage {
    map_channels(image, |value, gray| gray + factor * (value - gray))
}

/// Bilinear sample; coordinates outside the image yield black
fn bilinear_sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = image.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Bilinear sample with coordinates clamped to the image border
fn clamped_sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    bilinear_sample(
        image,
        x.clamp(0.0, (width - 1) as f32),
        y.clamp(0.0, (height - 1) as f32),
    )
}

/// Size of the largest axis-aligned rectangle that fits inside a `width`×`height`
/// rectangle rotated by `angle_degrees`
pub fn largest_inscribed_rect(width: u32, height: u32, angle_degrees: f32) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let angle = (angle_degrees as f64).to_radians();
    let (sin_a, cos_a) = (angle.sin().abs(), angle.cos().abs());

    let (long, short) = if w >= h { (w, h) } else { (h, w) };

    let (crop_w, crop_h) = if short <= 2.0 * sin_a * cos_a * long || (sin_a - cos_a).abs() < 1e-10 {
        // Half-constrained: two crop corners touch the longer side
        let x = 0.5 * short;
        if w >= h {
            (x / sin_a, x / cos_a)
        } else {
            (x / cos_a, x / sin_a)
        }
    } else {
        let cos_2a = cos_a * cos_a - sin_a * sin_a;
        ((w * cos_a - h * sin_a) / cos_2a, (h * cos_a - w * sin_a) / cos_2a)
    };

    (
        (crop_w.floor() as u32).clamp(1, width),
        (crop_h.floor() as u32).clamp(1, height),
    )
}

/// Rotates about the centre, crops away the fill and scales back to size
pub fn rotate_and_crop(image: &RgbImage, angle_degrees: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    if angle_degrees.abs() < 0.1 || width < 2 || height < 2 {
        return image.clone();
    }

    let angle = angle_degrees.to_radians();
    let (sin_a, cos_a) = angle.sin_cos();
    let cx = (width - 1) as f32 / 2.0;
    let cy = (height - 1) as f32 / 2.0;

    let rotated = ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        bilinear_sample(
            image,
            cx + dx * cos_a + dy * sin_a,
            cy - dx * sin_a + dy * cos_a,
        )
    });

    // Sampling stays inside [0, size - 1], so fit against that span and
    // keep a pixel of margin for the odd-size centring offset.
    let (inner_w, inner_h) = largest_inscribed_rect(width - 1, height - 1, angle_degrees);
    let crop_w = inner_w.saturating_sub(1).max(1);
    let crop_h = inner_h.saturating_sub(1).max(1);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    let cropped = imageops::crop_imm(&rotated, x, y, crop_w, crop_h).to_image();

    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

/// Crops a randomly placed window covering `area` of the image and scales it back
pub fn zoom<R: Rng + ?Sized>(image: &RgbImage, area: f32, rng: &mut R) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let side = area.clamp(0.0, 1.0).sqrt();
    let crop_w = ((width as f32 * side).round() as u32).clamp(1, width);
    let crop_h = ((height as f32 * side).round() as u32).clamp(1, height);

    if (crop_w, crop_h) == (width, height) {
        return image.clone();
    }

    let x = rng.gen_range(0..=width - crop_w);
    let y = rng.gen_range(0..=height - crop_h);
    let cropped = imageops::crop_imm(image, x, y, crop_w, crop_h).to_image();

    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

/// Elastic warp: interior grid vertices move by up to `magnitude` pixels and
/// every pixel follows the bilinear blend of its cell's vertex offsets
pub fn distort<R: Rng + ?Sized>(
    image: &RgbImage,
    grid_width: u32,
    grid_height: u32,
    magnitude: f32,
    rng: &mut R,
) -> RgbImage {
    let (width, height) = image.dimensions();
    let cols = grid_width.max(1) as usize;
    let rows = grid_height.max(1) as usize;

    // (cols + 1) x (rows + 1) vertices; the border stays pinned.
    let mut offsets = vec![(0.0f32, 0.0f32); (cols + 1) * (rows + 1)];
    for row in 1..rows {
        for col in 1..cols {
            offsets[row * (cols + 1) + col] = (
                rng.gen_range(-magnitude..=magnitude),
                rng.gen_range(-magnitude..=magnitude),
            );
        }
    }

    let cell_w = width as f32 / cols as f32;
    let cell_h = height as f32 / rows as f32;

    ImageBuffer::from_fn(width, height, |x, y| {
        let u = x as f32 / cell_w;
        let v = y as f32 / cell_h;
        let col = (u.floor() as usize).min(cols - 1);
        let row = (v.floor() as usize).min(rows - 1);
        let fu = u - col as f32;
        let fv = v - row as f32;

        let at = |r: usize, c: usize| offsets[r * (cols + 1) + c];
        let (d00, d10, d01, d11) = (at(row, col), at(row, col + 1), at(row + 1, col), at(row + 1, col + 1));
        let blend = |a: f32, b: f32, c: f32, d: f32| {
            a * (1.0 - fu) * (1.0 - fv) + b * fu * (1.0 - fv) + c * (1.0 - fu) * fv + d * fu * fv
        };
        let dx = blend(d00.0, d10.0, d01.0, d11.0);
        let dy = blend(d00.1, d10.1, d01.1, d11.1);

        clamped_sample(image, x as f32 + dx, y as f32 + dy)
    })
}
