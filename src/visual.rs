//! Visual similarity scoring: screenshot preprocessing, MSE/SSIM comparison
//! against reference renders, logo template matching and OCR.

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::point::Point;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::VisualConfig;

/// Half-width of the 5x5 median / morphology kernels
const KERNEL_RADIUS: u8 = 2;
const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;

const SSIM_WINDOW: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

#[derive(Error, Debug)]
pub enum VisualError {
    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Template ({template_width}x{template_height}) is larger than the image ({image_width}x{image_height})")]
    TemplateTooLarge {
        template_width: u32,
        template_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Image has no pixels")]
    EmptyImage,

    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// How closely a rendered page matches a reference render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    pub mean_squared_error: f64,
    pub structural_similarity: f64,
}

/// Best template-match position and its correlation score in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub score: f64,
    pub x: u32,
    pub y: u32,
}

/// Optional stages applied after grayscale, denoise and threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessOptions {
    pub opening: bool,
    pub dilate: bool,
    pub erode: bool,
    pub canny: bool,
    pub deskew: bool,
}

pub fn load_gray(path: &Path) -> Result<GrayImage, VisualError> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|source| VisualError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
}

pub fn grayscale(image: &image::DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// 5x5 median blur
pub fn remove_noise(image: &GrayImage) -> GrayImage {
    imageproc::filter::median_filter(image, KERNEL_RADIUS as u32, KERNEL_RADIUS as u32)
}

/// Binary (0/255) threshold at the Otsu level
pub fn otsu_threshold(image: &GrayImage) -> GrayImage {
    threshold(image, otsu_level(image))
}

pub fn dilate(image: &GrayImage) -> GrayImage {
    imageproc::morphology::dilate(image, Norm::LInf, KERNEL_RADIUS)
}

pub fn erode(image: &GrayImage) -> GrayImage {
    imageproc::morphology::erode(image, Norm::LInf, KERNEL_RADIUS)
}

/// Erosion followed by dilation
pub fn opening(image: &GrayImage) -> GrayImage {
    imageproc::morphology::open(image, Norm::LInf, KERNEL_RADIUS)
}

pub fn canny(image: &GrayImage) -> GrayImage {
    imageproc::edges::canny(image, CANNY_LOW, CANNY_HIGH)
}

/// Fold a minimum-area-rectangle angle in [-90, 0) into the rotation that
/// straightens the content.
pub fn deskew_correction(rect_angle: f64) -> f64 {
    if rect_angle < -45.0 {
        -(90.0 + rect_angle)
    } else {
        -rect_angle
    }
}

/// Angle of the minimum-area rectangle around every foreground pixel,
/// normalised to [-90, 0). `None` when the image has no foreground.
pub fn min_area_rect_angle(image: &GrayImage) -> Option<f64> {
    let points: Vec<Point<i32>> = image
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();
    if points.is_empty() {
        return None;
    }

    let corners = imageproc::geometry::min_area_rect(&points);
    let dx = (corners[1].x - corners[0].x) as f64;
    let dy = (corners[1].y - corners[0].y) as f64;
    let mut angle = dy.atan2(dx).to_degrees();
    while angle >= 0.0 {
        angle -= 90.0;
    }
    while angle < -90.0 {
        angle += 90.0;
    }
    Some(angle)
}

/// Rotate the content so its bounding rectangle is axis-aligned.
pub fn deskew(image: &GrayImage) -> GrayImage {
    let Some(angle) = min_area_rect_angle(image) else {
        return image.clone();
    };
    let correction = deskew_correction(angle);
    if correction.abs() < f64::EPSILON {
        return image.clone();
    }
    // imageproc rotates clockwise for positive angles
    rotate_about_center(
        image,
        (-correction.to_radians()) as f32,
        Interpolation::Bicubic,
        Luma([0u8]),
    )
}

/// Grayscale, denoise and threshold, then the optional stages in fixed order.
pub fn preprocess(image: &image::DynamicImage, options: PreprocessOptions) -> GrayImage {
    let mut out = otsu_threshold(&remove_noise(&grayscale(image)));
    if options.opening {
        out = opening(&out);
    }
    if options.dilate {
        out = dilate(&out);
    }
    if options.erode {
        out = erode(&out);
    }
    if options.canny {
        out = canny(&out);
    }
    if options.deskew {
        out = deskew(&out);
    }
    out
}

/// Pixel-wise mean squared error over equal-sized images. Callers go
/// through `compare`, which resizes the reference first.
fn mean_squared_error(a: &GrayImage, b: &GrayImage) -> f64 {
    let n = (a.width() as usize) * (a.height() as usize);
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum / n as f64
}

/// Mean structural similarity with a 7x7 uniform window. Both images
/// must share dimensions; `compare` guarantees it.
fn structural_similarity(a: &GrayImage, b: &GrayImage) -> f64 {
    let (min, max) = b
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    let data_range = if max > min { (max - min) as f64 } else { 255.0 };
    let c1 = (SSIM_K1 * data_range).powi(2);
    let c2 = (SSIM_K2 * data_range).powi(2);

    let width = a.width() as usize;
    let height = a.height() as usize;
    if width == 0 || height == 0 {
        return 1.0;
    }

    if width < SSIM_WINDOW || height < SSIM_WINDOW {
        let stats = WindowStats::accumulate(a.as_raw().iter().zip(b.as_raw().iter()));
        return stats.ssim(c1, c2);
    }

    let pa = a.as_raw();
    let pb = b.as_raw();

    // Column sums over the current band of SSIM_WINDOW rows:
    // x, y, x*x, y*y, x*y
    let mut cols = vec![[0f64; 5]; width];
    let add_row = |cols: &mut Vec<[f64; 5]>, row: usize, sign: f64| {
        let offset = row * width;
        for (x, col) in cols.iter_mut().enumerate() {
            let u = pa[offset + x] as f64;
            let v = pb[offset + x] as f64;
            col[0] += sign * u;
            col[1] += sign * v;
            col[2] += sign * u * u;
            col[3] += sign * v * v;
            col[4] += sign * u * v;
        }
    };
    for row in 0..SSIM_WINDOW {
        add_row(&mut cols, row, 1.0);
    }

    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let cov_norm = n / (n - 1.0);
    let mut total = 0.0;
    let mut count = 0usize;

    for top in 0..=(height - SSIM_WINDOW) {
        let mut window = [0f64; 5];
        for col in cols.iter().take(SSIM_WINDOW) {
            for k in 0..5 {
                window[k] += col[k];
            }
        }
        for left in 0..=(width - SSIM_WINDOW) {
            if left > 0 {
                let leaving = cols[left - 1];
                let entering = cols[left + SSIM_WINDOW - 1];
                for k in 0..5 {
                    window[k] += entering[k] - leaving[k];
                }
            }
            let ux = window[0] / n;
            let uy = window[1] / n;
            let vx = cov_norm * (window[2] / n - ux * ux);
            let vy = cov_norm * (window[3] / n - uy * uy);
            let vxy = cov_norm * (window[4] / n - ux * uy);
            total += ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                / ((ux * ux + uy * uy + c1) * (vx + vy + c2));
            count += 1;
        }

        if top + SSIM_WINDOW < height {
            add_row(&mut cols, top, -1.0);
            add_row(&mut cols, top + SSIM_WINDOW, 1.0);
        }
    }

    total / count as f64
}

/// Running moments for a single global SSIM window
struct WindowStats {
    n: f64,
    sums: [f64; 5],
}

impl WindowStats {
    fn accumulate<'a>(pairs: impl Iterator<Item = (&'a u8, &'a u8)>) -> Self {
        let mut sums = [0f64; 5];
        let mut n = 0.0;
        for (&x, &y) in pairs {
            let (u, v) = (x as f64, y as f64);
            sums[0] += u;
            sums[1] += v;
            sums[2] += u * u;
            sums[3] += v * v;
            sums[4] += u * v;
            n += 1.0;
        }
        Self { n, sums }
    }

    fn ssim(&self, c1: f64, c2: f64) -> f64 {
        let n = self.n;
        let cov_norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
        let ux = self.sums[0] / n;
        let uy = self.sums[1] / n;
        let vx = cov_norm * (self.sums[2] / n - ux * ux);
        let vy = cov_norm * (self.sums[3] / n - uy * uy);
        let vxy = cov_norm * (self.sums[4] / n - ux * uy);
        ((2.0 * ux * uy + c1) * (2.0 * vxy + c2)) / ((ux * ux + uy * uy + c1) * (vx + vy + c2))
    }
}

/// Score `target` against `reference`. A reference of a different size is
/// resized to the target's dimensions first.
pub fn compare(target: &GrayImage, reference: &GrayImage) -> SimilarityScore {
    let resized;
    let reference = if target.dimensions() != reference.dimensions() {
        debug!(
            "Resizing reference from {:?} to {:?} before comparison",
            reference.dimensions(),
            target.dimensions()
        );
        resized = image::imageops::resize(reference, target.width(), target.height(), FilterType::Triangle);
        &resized
    } else {
        reference
    };

    SimilarityScore {
        mean_squared_error: mean_squared_error(target, reference),
        structural_similarity: structural_similarity(target, reference),
    }
}

/// Load both images as grayscale and compare them.
pub fn compare_images(target_path: &Path, reference_path: &Path) -> Result<SimilarityScore, VisualError> {
    let target = load_gray(target_path)?;
    let reference = load_gray(reference_path)?;
    if target.width() == 0 || target.height() == 0 {
        return Err(VisualError::EmptyImage);
    }
    Ok(compare(&target, &reference))
}

/// Locate `template` inside `image` by zero-mean normalised cross-correlation.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Result<TemplateMatch, VisualError> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || iw == 0 || ih == 0 {
        return Err(VisualError::EmptyImage);
    }
    if tw > iw || th > ih {
        return Err(VisualError::TemplateTooLarge {
            template_width: tw,
            template_height: th,
            image_width: iw,
            image_height: ih,
        });
    }

    let tn = (tw * th) as f64;
    let t_mean = template.as_raw().iter().map(|&p| p as f64).sum::<f64>() / tn;
    let t_centered: Vec<f64> = template.as_raw().iter().map(|&p| p as f64 - t_mean).collect();
    let t_norm = t_centered.iter().map(|v| v * v).sum::<f64>().sqrt();

    let integral = Integral::new(image);
    let raw = image.as_raw();
    let (iw_us, tw_us) = (iw as usize, tw as usize);

    let mut best = TemplateMatch { score: f64::NEG_INFINITY, x: 0, y: 0 };
    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let (sum, sum_sq) = integral.window(x, y, tw, th);
            let i_var = sum_sq - sum * sum / tn;

            let mut cross = 0.0;
            for ty in 0..th as usize {
                let row = (y as usize + ty) * iw_us + x as usize;
                let trow = ty * tw_us;
                for tx in 0..tw_us {
                    cross += raw[row + tx] as f64 * t_centered[trow + tx];
                }
            }

            let denom = i_var.max(0.0).sqrt() * t_norm;
            let score = if denom > f64::EPSILON {
                cross / denom
            } else if i_var.abs() <= f64::EPSILON && t_norm <= f64::EPSILON {
                1.0
            } else {
                0.0
            };
            if score > best.score {
                best = TemplateMatch { score, x, y };
            }
        }
    }

    Ok(best)
}

/// Summed-area tables of pixel values and their squares
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0f64; stride * (h + 1)];
        let mut sum_sq = vec![0f64; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { width: stride, sum, sum_sq }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let s = self.width;
        let (x0, y0, x1, y1) = (x as usize, y as usize, (x + w) as usize, (y + h) as usize);
        let pick = |t: &Vec<f64>| t[y1 * s + x1] - t[y0 * s + x1] - t[y1 * s + x0] + t[y0 * s + x0];
        (pick(&self.sum), pick(&self.sum_sq))
    }
}

/// Shrink so the longer side is at most `max_side`, returning the scale used.
pub fn downscale(image: &GrayImage, max_side: u32) -> (GrayImage, f64) {
    let longest = image.width().max(image.height());
    if longest <= max_side || longest == 0 {
        return (image.clone(), 1.0);
    }
    let scale = max_side as f64 / longest as f64;
    let w = ((image.width() as f64 * scale).round() as u32).max(1);
    let h = ((image.height() as f64 * scale).round() as u32).max(1);
    (image::imageops::resize(image, w, h, FilterType::Triangle), scale)
}

/// Longest side pages and logos are scaled to before template matching
const TEMPLATE_MAX_SIDE: u32 = 480;

/// Brand a rendered page appears to impersonate, if any.
///
/// A brand only counts when the page is not served from one of its own
/// domains. Evidence is checked cheapest first: OCR keywords, reference
/// SSIM, then logo template match. Reference or logo files that fail to
/// load are skipped.
pub fn impersonated_brand(
    screenshot: &GrayImage,
    root_domain: &str,
    config: &VisualConfig,
    ocr: Option<&str>,
) -> Option<String> {
    let ocr = ocr.map(|text| text.to_lowercase());

    for brand in config.brands.iter().filter(|b| !b.owns(root_domain)) {
        if let Some(text) = &ocr {
            if brand.keywords.iter().any(|k| !k.is_empty() && text.contains(&k.to_lowercase())) {
                debug!("OCR text on {} mentions {}", root_domain, brand.name);
                return Some(brand.name.clone());
            }
        }

        if let Some(reference_path) = &brand.reference_image {
            match load_gray(reference_path) {
                Ok(reference) => {
                    let score = compare(screenshot, &reference);
                    debug!("SSIM of {} against {}: {:.3}", root_domain, brand.name, score.structural_similarity);
                    if score.structural_similarity >= config.ssim_threshold {
                        return Some(brand.name.clone());
                    }
                }
                Err(e) => debug!("Skipping reference for {}: {}", brand.name, e),
            }
        }

        if let Some(logo_path) = &brand.logo {
            match load_gray(logo_path) {
                Ok(logo) => {
                    let (page, scale) = downscale(screenshot, TEMPLATE_MAX_SIDE);
                    let logo = if scale < 1.0 {
                        let w = ((logo.width() as f64 * scale).round() as u32).max(1);
                        let h = ((logo.height() as f64 * scale).round() as u32).max(1);
                        image::imageops::resize(&logo, w, h, FilterType::Triangle)
                    } else {
                        logo
                    };
                    match match_template(&page, &logo) {
                        Ok(found) if found.score >= config.template_threshold => {
                            debug!("{} logo found on {} at ({}, {})", brand.name, root_domain, found.x, found.y);
                            return Some(brand.name.clone());
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Template match for {} skipped: {}", brand.name, e),
                    }
                }
                Err(e) => debug!("Skipping logo for {}: {}", brand.name, e),
            }
        }
    }

    None
}

/// Text in a rendered page, for brand-impersonation checks.
#[cfg(feature = "ocr")]
pub fn ocr_text(image: &GrayImage) -> Result<String, VisualError> {
    use std::io::Cursor;
    use tesseract::Tesseract;

    let prepared = otsu_threshold(&remove_noise(image));
    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(prepared).write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)?;

    let mut tess = Tesseract::new(None, Some("eng"))
        .map_err(|e| VisualError::Ocr(format!("Tesseract init failed: {}", e)))?
        .set_image_from_mem(&png)
        .map_err(|e| VisualError::Ocr(format!("Failed to set image: {}", e)))?;
    tess.get_text()
        .map_err(|e| VisualError::Ocr(format!("Text extraction failed: {}", e)))
}

#[cfg(not(feature = "ocr"))]
pub fn ocr_text(_image: &GrayImage) -> Result<String, VisualError> {
    Err(VisualError::Ocr("built without the `ocr` feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]))
    }

    fn blocks(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Luma([230u8]) } else { Luma([20u8]) }
        })
    }

    #[test]
    fn test_identical_images_are_perfect_match() {
        let img = gradient(64, 48);
        let score = compare(&img, &img);
        assert_eq!(score.mean_squared_error, 0.0);
        assert!((score.structural_similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_image_against_itself() {
        let img = GrayImage::from_pixel(32, 32, Luma([128u8]));
        let score = compare(&img, &img);
        assert_eq!(score.mean_squared_error, 0.0);
        assert!((score.structural_similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_images_use_global_window() {
        let img = gradient(4, 3);
        let score = compare(&img, &img);
        assert!((score.structural_similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_different_images_score_lower() {
        let a = blocks(64, 64);
        let b = GrayImage::from_fn(64, 64, |x, y| Luma([255 - a.get_pixel(x, y)[0]]));
        let score = compare(&a, &b);
        assert!(score.mean_squared_error > 1000.0);
        assert!(score.structural_similarity < 0.0);
        assert!(score.structural_similarity >= -1.0);
    }

    #[test]
    fn test_mismatched_sizes_resize_reference() {
        let target = blocks(80, 60);
        let reference = blocks(160, 120);
        let score = compare(&target, &reference);
        assert!(score.structural_similarity.is_finite());
        assert!(score.mean_squared_error.is_finite());
    }

    #[test]
    fn test_compare_accepts_reference_smaller_than_window() {
        let target = GrayImage::from_pixel(40, 30, Luma([90u8]));
        let reference = GrayImage::from_pixel(3, 3, Luma([90u8]));
        for score in [compare(&target, &reference), compare(&reference, &target)] {
            // Resampling a flat image may round by one level
            assert!(score.mean_squared_error <= 1.0);
            assert!(score.structural_similarity > 0.99);
        }
    }

    #[test]
    fn test_mse_has_no_wraparound() {
        let a = GrayImage::from_pixel(2, 2, Luma([10u8]));
        let b = GrayImage::from_pixel(2, 2, Luma([20u8]));
        assert_eq!(mean_squared_error(&a, &b), 100.0);
        assert_eq!(mean_squared_error(&b, &a), 100.0);
    }

    #[test]
    fn test_otsu_threshold_is_binary() {
        let out = otsu_threshold(&gradient(40, 40));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_preprocess_keeps_dimensions() {
        let img = DynamicImage::ImageLuma8(blocks(50, 30));
        let out = preprocess(
            &img,
            PreprocessOptions { opening: true, dilate: true, erode: true, canny: true, deskew: false },
        );
        assert_eq!(out.dimensions(), (50, 30));
    }

    #[test]
    fn test_deskew_correction_folding() {
        assert_eq!(deskew_correction(-90.0), 0.0);
        assert_eq!(deskew_correction(-80.0), -10.0);
        assert_eq!(deskew_correction(-10.0), 10.0);
        assert_eq!(deskew_correction(-45.0), 45.0);
    }

    #[test]
    fn test_deskew_blank_image_unchanged() {
        let img = GrayImage::new(20, 20);
        assert_eq!(deskew(&img), img);
    }

    #[test]
    fn test_min_area_rect_of_axis_aligned_block() {
        let mut img = GrayImage::new(40, 40);
        for y in 10..20 {
            for x in 5..30 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let angle = min_area_rect_angle(&img).unwrap();
        assert!((-90.0..0.0).contains(&angle));
        assert!(deskew_correction(angle).abs() < 1e-6);
    }

    #[test]
    fn test_template_found_at_its_location() {
        let page = gradient(60, 40);
        let template = image::imageops::crop_imm(&page, 17, 9, 12, 8).to_image();
        let found = match_template(&page, &template).unwrap();
        assert_eq!((found.x, found.y), (17, 9));
        assert!((found.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_template_larger_than_image_errors() {
        let page = gradient(10, 10);
        let template = gradient(20, 5);
        assert!(matches!(match_template(&page, &template), Err(VisualError::TemplateTooLarge { .. })));
    }

    #[test]
    fn test_compare_images_missing_file_errors() {
        let result = compare_images(Path::new("/nonexistent/a.png"), Path::new("/nonexistent/b.png"));
        assert!(matches!(result, Err(VisualError::ImageLoad { .. })));
    }

    #[test]
    fn test_compare_images_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        blocks(40, 40).save(&a).unwrap();
        blocks(20, 20).save(&b).unwrap();
        let score = compare_images(&a, &b).unwrap();
        assert!(score.structural_similarity.is_finite());
    }

    fn brand_config(reference: Option<PathBuf>) -> VisualConfig {
        VisualConfig {
            ssim_threshold: 0.85,
            template_threshold: 0.8,
            ocr_enabled: true,
            brands: vec![crate::config::BrandConfig {
                name: "paypal".to_string(),
                domains: vec!["paypal.com".to_string()],
                keywords: vec!["paypal".to_string()],
                reference_image: reference,
                logo: None,
            }],
        }
    }

    #[test]
    fn test_reference_match_on_foreign_domain() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("paypal.png");
        let shot = blocks(64, 64);
        shot.save(&reference).unwrap();
        let config = brand_config(Some(reference));

        assert_eq!(impersonated_brand(&shot, "paypa1-login.test", &config, None).as_deref(), Some("paypal"));
        assert_eq!(impersonated_brand(&shot, "paypal.com", &config, None), None);
    }

    #[test]
    fn test_ocr_keywords_flag_brand() {
        let config = brand_config(None);
        let shot = gradient(16, 16);
        assert_eq!(
            impersonated_brand(&shot, "secure-verify.test", &config, Some("Log in to your PayPal account")).as_deref(),
            Some("paypal")
        );
        assert_eq!(impersonated_brand(&shot, "secure-verify.test", &config, Some("Welcome")), None);
    }

    #[test]
    fn test_missing_reference_is_skipped() {
        let config = brand_config(Some(PathBuf::from("/nonexistent/ref.png")));
        assert_eq!(impersonated_brand(&blocks(32, 32), "other.test", &config, None), None);
    }

    #[test]
    fn test_downscale_limits_longest_side() {
        let (small, scale) = downscale(&gradient(400, 100), 200);
        assert_eq!(small.dimensions(), (200, 50));
        assert!((scale - 0.5).abs() < 1e-9);
        let (same, scale) = downscale(&gradient(50, 20), 200);
        assert_eq!(same.dimensions(), (50, 20));
        assert_eq!(scale, 1.0);
    }
}
