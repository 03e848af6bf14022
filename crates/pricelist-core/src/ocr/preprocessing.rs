//! Image preprocessing for OCR.
//!
//! The chain is fixed: grayscale, CLAHE, bilateral filter, then adaptive
//! Gaussian thresholding. Intermediate planes are `ndarray` buffers indexed
//! `[row, column]`.

use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array2;
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::PreprocessConfig;

/// Deterministic enhancement applied to every rendered page before recognition.
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Run the full chain and return a binarized page.
    pub fn apply(&self, image: &DynamicImage) -> Result<GrayImage, OcrError> {
        let gray = to_plane(&image.to_luma8());
        let (h, w) = gray.dim();
        if h == 0 || w == 0 {
            return Err(OcrError::Preprocessing("empty image".to_string()));
        }
        if self.config.threshold_block_size % 2 == 0 || self.config.threshold_block_size < 3 {
            return Err(OcrError::Preprocessing(format!(
                "threshold block size must be odd and at least 3, got {}",
                self.config.threshold_block_size
            )));
        }

        let enhanced = clahe(&gray, self.config.clahe_clip_limit, self.config.clahe_grid.max(1) as usize);
        let smoothed = bilateral_filter(
            &enhanced,
            self.config.bilateral_diameter as usize,
            self.config.bilateral_sigma_color,
            self.config.bilateral_sigma_space,
        );
        let binary = adaptive_gaussian_threshold(
            &smoothed,
            self.config.threshold_block_size as usize,
            self.config.threshold_c,
        );

        debug!(width = w, height = h, "preprocessed page");
        Ok(to_image(&binary))
    }
}

fn to_plane(gray: &GrayImage) -> Array2<f32> {
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| gray.get_pixel(x as u32, y as u32)[0] as f32)
}

fn to_image(plane: &Array2<f32>) -> GrayImage {
    let (h, w) = plane.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([plane[[y as usize, x as usize]].round().clamp(0.0, 255.0) as u8])
    })
}

/// Contrast limited adaptive histogram equalization.
///
/// Per-tile histograms are clipped at `clip_limit * tile_area / 256`, the
/// excess is spread over all bins, and tile lookup tables are bilinearly
/// interpolated between tile centers.
pub fn clahe(src: &Array2<f32>, clip_limit: f32, grid: usize) -> Array2<f32> {
    let (h, w) = src.dim();
    let tile_h = h.div_ceil(grid).max(1);
    let tile_w = w.div_ceil(grid).max(1);
    let tiles_y = h.div_ceil(tile_h);
    let tiles_x = w.div_ceil(tile_w);

    let mut luts = vec![[0f32; 256]; tiles_y * tiles_x];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let y0 = ty * tile_h;
            let x0 = tx * tile_w;
            let y1 = (y0 + tile_h).min(h);
            let x1 = (x0 + tile_w).min(w);

            let mut hist = [0usize; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[src[[y, x]].clamp(0.0, 255.0) as usize] += 1;
                }
            }
            let area = (y1 - y0) * (x1 - x0);
            luts[ty * tiles_x + tx] = tile_lut(&mut hist, area, clip_limit);
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        let (ty1, ty2, ya) = interpolation_cell(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx1, tx2, xa) = interpolation_cell(x, tile_w, tiles_x);
            let v = src[[y, x]].clamp(0.0, 255.0) as usize;

            let top = luts[ty1 * tiles_x + tx1][v] * (1.0 - xa) + luts[ty1 * tiles_x + tx2][v] * xa;
            let bottom = luts[ty2 * tiles_x + tx1][v] * (1.0 - xa) + luts[ty2 * tiles_x + tx2][v] * xa;
            out[[y, x]] = (top * (1.0 - ya) + bottom * ya).round();
        }
    }
    out
}

fn tile_lut(hist: &mut [usize; 256], area: usize, clip_limit: f32) -> [f32; 256] {
    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as usize).max(1);
        let mut excess = 0usize;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }

        let batch = excess / 256;
        let mut residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1);
            let mut i = 0;
            while i < 256 && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0f32; 256];
    let mut sum = 0usize;
    for (slot, count) in lut.iter_mut().zip(hist.iter()) {
        sum += count;
        *slot = (sum as f32 * scale).round().min(255.0);
    }
    lut
}

/// Neighboring tile indices and the weight of the second one.
fn interpolation_cell(pos: usize, tile: usize, tiles: usize) -> (usize, usize, f32) {
    let f = pos as f32 / tile as f32 - 0.5;
    let first = f.floor();
    let weight = f - first;
    let lo = first.max(0.0) as usize;
    let hi = ((first + 1.0).max(0.0) as usize).min(tiles - 1);
    (lo.min(tiles - 1), hi, weight)
}

/// Edge-preserving smoothing over a circular window of `diameter` pixels.
pub fn bilateral_filter(src: &Array2<f32>, diameter: usize, sigma_color: f32, sigma_space: f32) -> Array2<f32> {
    let (h, w) = src.dim();
    let radius = (diameter / 2).max(1) as isize;

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let mut offsets: Vec<(isize, isize, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() <= radius as f32 {
                offsets.push((dy, dx, (r2 * space_coeff).exp()));
            }
        }
    }
    let color_weights: Vec<f32> = (0..256).map(|d| ((d * d) as f32 * color_coeff).exp()).collect();

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let center = src[[y, x]];
            let mut sum = 0.0f32;
            let mut norm = 0.0f32;
            for &(dy, dx, space_weight) in &offsets {
                let ny = (y as isize + dy).clamp(0, h as isize - 1) as usize;
                let nx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                let value = src[[ny, nx]];
                let diff = (value - center).abs().min(255.0) as usize;
                let weight = space_weight * color_weights[diff];
                sum += value * weight;
                norm += weight;
            }
            out[[y, x]] = sum / norm;
        }
    }
    out
}

/// Binarize against a Gaussian-weighted local mean minus `c`.
///
/// Pixels brighter than their threshold become 255, the rest 0.
pub fn adaptive_gaussian_threshold(src: &Array2<f32>, block_size: usize, c: f32) -> Array2<f32> {
    let kernel = gaussian_kernel(block_size);
    let mean = convolve_separable(src, &kernel);
    ndarray::Zip::from(src)
        .and(&mean)
        .map_collect(|&v, &m| if v > m - c { 255.0 } else { 0.0 })
}

/// Normalized Gaussian kernel with the sigma OpenCV derives from the size.
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as isize;
    let raw: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|k| k / total).collect()
}

fn convolve_separable(src: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = src.dim();
    let half = (kernel.len() / 2) as isize;

    let mut horizontal = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            horizontal[[y, x]] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let nx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as usize;
                    src[[y, nx]] * weight
                })
                .sum();
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            out[[y, x]] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let ny = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
                    horizontal[[ny, x]] * weight
                })
                .sum();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spread(plane: &Array2<f32>) -> f32 {
        let max = plane.iter().cloned().fold(f32::MIN, f32::max);
        let min = plane.iter().cloned().fold(f32::MAX, f32::min);
        max - min
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(11);
        assert_eq!(kernel.len(), 11);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(kernel[5] > kernel[4]);
        assert!((kernel[0] - kernel[10]).abs() < 1e-7);
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let src = Array2::from_shape_fn((256, 256), |(_, x)| 100.0 + (x % 21) as f32);
        assert_eq!(spread(&src), 20.0);

        let out = clahe(&src, 2.0, 8);
        assert_eq!(out.dim(), (256, 256));
        assert!(spread(&out) > 20.0, "spread {}", spread(&out));
    }

    #[test]
    fn test_bilateral_keeps_edges() {
        let src = Array2::from_shape_fn((20, 20), |(_, x)| if x < 10 { 0.0 } else { 255.0 });
        let out = bilateral_filter(&src, 9, 75.0, 75.0);
        assert!(out[[10, 9]] < 20.0);
        assert!(out[[10, 10]] > 235.0);

        let flat = Array2::from_elem((8, 8), 42.0f32);
        let out = bilateral_filter(&flat, 9, 75.0, 75.0);
        assert!(out.iter().all(|v| (v - 42.0).abs() < 1e-3));
    }

    #[test]
    fn test_adaptive_threshold() {
        let mut src = Array2::from_elem((21, 21), 200.0f32);
        src[[10, 10]] = 20.0;
        let out = adaptive_gaussian_threshold(&src, 11, 2.0);
        assert_eq!(out[[10, 10]], 0.0);
        assert_eq!(out[[0, 0]], 255.0);
        assert_eq!(out[[10, 12]], 255.0);
    }

    #[test]
    fn test_apply_binarizes() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(40, 30, |x, _| Luma([if x < 20 { 30 } else { 220 }])));
        let out = ImagePreprocessor::new(PreprocessConfig::default()).apply(&img).unwrap();
        assert_eq!(out.dimensions(), (40, 30));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_apply_rejects_even_block() {
        let config = PreprocessConfig {
            threshold_block_size: 10,
            ..PreprocessConfig::default()
        };
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(ImagePreprocessor::new(config).apply(&img).is_err());
    }
}
