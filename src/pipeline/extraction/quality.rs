//! Local image quality measurement.
//!
//! Pure read-only analysis of the capture: the seven sub-scores the provider
//! policy turns into penalties. Runs before any network call, so it must stay
//! cheap (single pass per measure, subsampled skew search).

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ExtractionError;
use crate::gateway::CaptureImage;

/// Luma at or above this counts as blown-out (glare).
const SATURATION_LEVEL: u8 = 250;

/// Minimum step in mean luma between nearby lines of the outer band that
/// counts as a visible document edge.
const EDGE_STEP: f32 = 20.0;

/// Raw sub-scores of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMeasurements {
    /// Laplacian variance. Higher is sharper.
    pub blur_variance: f32,
    /// Mean luma, 0-255.
    pub mean_brightness: f32,
    /// Shorter image side in pixels.
    pub short_side_px: u32,
    /// RMS contrast (grayscale standard deviation).
    pub contrast_rms: f32,
    /// Share of saturated pixels, 0.0-1.0.
    pub glare_ratio: f32,
    /// Image sides (0-4) with a document edge in the outer band.
    pub edges_visible: u8,
    /// Estimated skew in degrees (absolute).
    pub skew_degrees: f32,
}

/// Measures a capture. Implementations must not modify the image.
pub trait QualityAssessor: Send + Sync {
    fn measure(&self, image: &CaptureImage) -> Result<QualityMeasurements, ExtractionError>;
}

/// Decodes the capture with the `image` crate and measures it in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalQualityAssessor;

impl QualityAssessor for LocalQualityAssessor {
    fn measure(&self, image: &CaptureImage) -> Result<QualityMeasurements, ExtractionError> {
        let decoded = image::load_from_memory(image.bytes())
            .map_err(|e| ExtractionError::InvalidImage(format!("cannot decode image: {e}")))?;
        let gray = rgb_to_gray(&decoded.to_rgb8());
        let measurements = measure_gray(&gray);
        debug!(
            blur = measurements.blur_variance,
            brightness = measurements.mean_brightness,
            short_side = measurements.short_side_px,
            edges = measurements.edges_visible,
            "Measured capture quality"
        );
        Ok(measurements)
    }
}

/// All sub-scores of a grayscale image.
pub fn measure_gray(gray: &GrayImage) -> QualityMeasurements {
    QualityMeasurements {
        blur_variance: compute_laplacian_variance(gray),
        mean_brightness: compute_mean_brightness(gray),
        short_side_px: gray.width().min(gray.height()),
        contrast_rms: compute_contrast_score(gray),
        glare_ratio: compute_glare_ratio(gray),
        edges_visible: count_visible_edges(gray),
        skew_degrees: detect_skew_angle(gray).map(f32::abs).unwrap_or(0.0),
    }
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
                as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Laplacian variance with the 3x3 kernel `[0,1,0; 1,-4,1; 0,1,0]`.
/// Blurry photos < 100, sharp printed text > 500.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
            let laplacian =
                px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

fn pixel_count(img: &GrayImage) -> usize {
    (img.width() as usize) * (img.height() as usize)
}

pub fn compute_mean_brightness(img: &GrayImage) -> f32 {
    let count = pixel_count(img);
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f64 / count as f64) as f32
}

/// RMS contrast: standard deviation of grayscale intensities (0-127.5).
pub fn compute_contrast_score(img: &GrayImage) -> f32 {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0).sqrt() as f32
}

pub fn compute_glare_ratio(img: &GrayImage) -> f32 {
    let count = pixel_count(img);
    if count == 0 {
        return 0.0;
    }
    let saturated = img.pixels().filter(|p| p.0[0] >= SATURATION_LEVEL).count();
    saturated as f32 / count as f32
}

/// Count image sides whose outer fifth contains a sharp step in mean luma,
/// i.e. where the document border is inside the frame.
pub fn count_visible_edges(img: &GrayImage) -> u8 {
    let (w, h) = (img.width(), img.height());
    if w < 10 || h < 10 {
        return 0;
    }

    let row_means: Vec<f32> = (0..h)
        .map(|y| (0..w).map(|x| img.get_pixel(x, y).0[0] as f32).sum::<f32>() / w as f32)
        .collect();
    let col_means: Vec<f32> = (0..w)
        .map(|x| (0..h).map(|y| img.get_pixel(x, y).0[0] as f32).sum::<f32>() / h as f32)
        .collect();

    let band_rows = (h as usize / 5).max(3);
    let band_cols = (w as usize / 5).max(3);
    let sides = [
        &row_means[..band_rows],
        &row_means[row_means.len() - band_rows..],
        &col_means[..band_cols],
        &col_means[col_means.len() - band_cols..],
    ];
    sides.iter().filter(|profile| has_step(profile)).count() as u8
}

fn has_step(profile: &[f32]) -> bool {
    profile.windows(3).any(|w| (w[2] - w[0]).abs() >= EDGE_STEP)
}

/// Skew via horizontal projection profile, -5..=5 degrees in 0.25 steps.
///
/// `None` when the image is too small, has under 2% ink, or the best angle
/// is negligible (< 0.5 degrees).
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let (w, h) = (img.width(), img.height());
    if w < 50 || h < 50 {
        return None;
    }

    let ink_threshold = 128u8;
    let dark_count = img.pixels().filter(|p| p.0[0] < ink_threshold).count();
    let total = pixel_count(img);
    if (dark_count as f32 / total as f32) < 0.02 {
        return None;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = projection_variance(img, ink_threshold, 0.0);

    for step in 1..=20 {
        let magnitude = step as f32 * 0.25;
        for angle in [-magnitude, magnitude] {
            let score = projection_variance(img, ink_threshold, angle);
            if score > best_score {
                best_score = score;
                best_angle = angle;
            }
        }
    }

    if best_angle.abs() < 0.5 {
        None
    } else {
        Some(best_angle)
    }
}

/// Sum of squared differences between adjacent row ink counts after
/// shearing rows by `angle_deg`. Crisper rows score higher.
fn projection_variance(img: &GrayImage, threshold: u8, angle_deg: f32) -> f64 {
    let (w, h) = (img.width(), img.height());
    let tan_a = (angle_deg.to_radians()).tan() as f64;
    let mut projection = vec![0u32; h as usize];

    for y in 0..h {
        let shift = (y as f64 * tan_a).round() as i64;
        let mut count = 0u32;
        // every 4th column
        for x in (0..w).step_by(4) {
            let sx = x as i64 + shift;
            if sx >= 0 && sx < w as i64 && img.get_pixel(sx as u32, y).0[0] < threshold {
                count += 1;
            }
        }
        projection[y as usize] = count;
    }

    projection
        .windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}
