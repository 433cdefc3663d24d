//! Image preprocessing ahead of OCR.
//!
//! A fixed, deterministic stage order turns a photographed or scanned region
//! into something OCR engines handle well:
//!
//! 1. perspective correction (deskew to the dominant quadrilateral)
//! 2. tile-based contrast equalization with a bounded clip
//! 3. median denoise
//! 4. unsharp-mask sharpening
//! 5. block-local adaptive binarization, with a brightness guard that falls
//!    back to the pre-binarization grayscale when thresholding eats the page
//! 6. conversion back to RGB for downstream uniformity
//!
//! The function is pure: same input image, same output image. It never
//! touches engine or page state, so a failure here is contained to one
//! region and the caller simply keeps the original crop.

use crate::error::PreprocessError;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::adaptive_threshold;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use tracing::debug;

/// Edge-detection thresholds for the perspective pass.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Douglas-Peucker tolerance as a fraction of the contour perimeter.
const DP_EPSILON_FRACTION: f64 = 0.02;
/// How many of the largest contours are inspected for a quadrilateral.
const QUAD_CANDIDATES: usize = 5;
/// Tile grid dimension for contrast equalization.
const EQUALIZE_TILES: u32 = 8;
/// Histogram clip limit, as a multiple of the uniform bin height.
const EQUALIZE_CLIP: f32 = 3.0;
/// Block radius for adaptive binarization.
const BINARIZE_RADIUS: u32 = 15;
/// Binarized images darker than this mean are considered destroyed and the
/// grayscale stage output is used instead.
const MIN_BINARY_BRIGHTNESS: f64 = 50.0;

/// Run the full preprocessing chain on one region image.
pub fn preprocess(image: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    // ── Step 1: perspective correction ──────────────────────────────────
    let rgb = correct_perspective(image.to_rgb8())?;

    // ── Step 2: contrast ────────────────────────────────────────────────
    let gray = DynamicImage::ImageRgb8(rgb).to_luma8();
    let gray = equalize_tiles(&gray, EQUALIZE_TILES, EQUALIZE_CLIP);

    // ── Step 3: denoise ─────────────────────────────────────────────────
    let gray = median_filter(&gray, 1, 1);

    // ── Step 4: sharpen ─────────────────────────────────────────────────
    let gray = unsharp_mask(&gray, 3.0, 0.5);

    // ── Step 5: binarize, with brightness guard ─────────────────────────
    let binary = adaptive_threshold(&gray, BINARIZE_RADIUS);
    let result = if mean_luma(&binary) < MIN_BINARY_BRIGHTNESS {
        debug!("binarization produced a mostly black image; keeping grayscale");
        gray
    } else {
        binary
    };

    // ── Step 6: back to RGB ─────────────────────────────────────────────
    Ok(DynamicImage::ImageRgb8(
        DynamicImage::ImageLuma8(result).to_rgb8(),
    ))
}

/// Deskew the image to the dominant quadrilateral, if one is found.
///
/// Blur + canny edges, then the five largest contours are simplified with
/// Douglas-Peucker; the first one that reduces to four vertices is taken as
/// the document boundary and warped to an upright rectangle. No candidate
/// quadrilateral means the image passes through untouched.
fn correct_perspective(rgb: RgbImage) -> Result<RgbImage, PreprocessError> {
    let gray = DynamicImage::ImageRgb8(rgb.clone()).to_luma8();
    let blurred = gaussian_blur_f32(&gray, 2.0);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let mut contours = find_contours::<i32>(&edges);
    contours.sort_by(|a, b| {
        polygon_area(&b.points)
            .partial_cmp(&polygon_area(&a.points))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for contour in contours.iter().take(QUAD_CANDIDATES) {
        let epsilon = DP_EPSILON_FRACTION * arc_length(&contour.points, true);
        let poly = approximate_polygon_dp(&contour.points, epsilon, true);
        if poly.len() == 4 {
            debug!(area = polygon_area(&contour.points), "deskewing to detected quad");
            return warp_to_rect(&rgb, &poly);
        }
    }

    Ok(rgb)
}

/// Warp the quadrilateral onto an upright rectangle sized to the longer of
/// each pair of opposing edges.
fn warp_to_rect(rgb: &RgbImage, quad: &[Point<i32>]) -> Result<RgbImage, PreprocessError> {
    let [tl, tr, br, bl] = order_corners(quad);

    let width = edge_len(tl, tr).max(edge_len(bl, br)).round() as u32;
    let height = edge_len(tl, bl).max(edge_len(tr, br)).round() as u32;
    if width < 2 || height < 2 {
        return Err(PreprocessError::DegenerateQuad(format!(
            "target rectangle collapsed to {width}x{height}"
        )));
    }

    let dst = [
        (0.0, 0.0),
        (width as f32 - 1.0, 0.0),
        (width as f32 - 1.0, height as f32 - 1.0),
        (0.0, height as f32 - 1.0),
    ];
    let projection = Projection::from_control_points([tl, tr, br, bl], dst).ok_or_else(|| {
        PreprocessError::DegenerateQuad(
            "no projective transform fits the detected corners".to_string(),
        )
    })?;

    let mut out = RgbImage::new(width, height);
    warp_into(
        rgb,
        &projection,
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
        &mut out,
    );
    Ok(out)
}

/// Order four corners as top-left, top-right, bottom-right, bottom-left.
///
/// The top-left corner has the smallest coordinate sum and the bottom-right
/// the largest; the remaining two are told apart by the x-y difference.
fn order_corners(quad: &[Point<i32>]) -> [(f32, f32); 4] {
    let pts: Vec<(f32, f32)> = quad.iter().map(|p| (p.x as f32, p.y as f32)).collect();

    let by_sum = |p: &&(f32, f32)| p.0 + p.1;
    let by_diff = |p: &&(f32, f32)| p.0 - p.1;

    let tl = *pts
        .iter()
        .min_by(|a, b| by_sum(a).total_cmp(&by_sum(b)))
        .unwrap_or(&pts[0]);
    let br = *pts
        .iter()
        .max_by(|a, b| by_sum(a).total_cmp(&by_sum(b)))
        .unwrap_or(&pts[0]);
    let tr = *pts
        .iter()
        .max_by(|a, b| by_diff(a).total_cmp(&by_diff(b)))
        .unwrap_or(&pts[0]);
    let bl = *pts
        .iter()
        .min_by(|a, b| by_diff(a).total_cmp(&by_diff(b)))
        .unwrap_or(&pts[0]);

    [tl, tr, br, bl]
}

fn edge_len(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0i64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (sum.abs() as f64) / 2.0
}

/// Tile-based histogram equalization with a bounded clip.
///
/// Each tile gets its own clipped-histogram tone mapping; pixels are mapped
/// by bilinear interpolation between the four nearest tile mappings so tile
/// boundaries do not show. A tile whose histogram occupies a single bin maps
/// identically (a flat region stays flat rather than jumping to black).
fn equalize_tiles(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let tile_w = width.div_ceil(tiles).max(1);
    let tile_h = height.div_ceil(tiles).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    // Per-tile tone mappings.
    let mut mappings: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let total: u32 = (x1 - x0) * (y1 - y0);

            // Clip the histogram and spread the excess evenly.
            let limit = ((clip_limit * total as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let spread = excess / 256;
            for bin in hist.iter_mut() {
                *bin += spread;
            }

            let mut mapping = [0u8; 256];
            let mut cdf = 0u32;
            let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
            let denom = total.saturating_sub(cdf_min);
            for (value, &count) in hist.iter().enumerate() {
                cdf += count;
                mapping[value] = if denom == 0 {
                    // Single occupied bin: identity, not a jump to black.
                    value as u8
                } else {
                    ((cdf.saturating_sub(cdf_min)) as f32 * 255.0 / denom as f32)
                        .round()
                        .clamp(0.0, 255.0) as u8
                };
            }
            mappings.push(mapping);
        }
    }

    let mapping_at = |tx: u32, ty: u32| &mappings[(ty * tiles_x + tx) as usize];

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = pixel[0] as usize;

        // Position in tile-center space.
        let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = (gx.floor().max(0.0) as u32).min(tiles_x - 1);
        let ty0 = (gy.floor().max(0.0) as u32).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fx = (gx - tx0 as f32).clamp(0.0, 1.0);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);

        let m00 = mapping_at(tx0, ty0)[v] as f32;
        let m10 = mapping_at(tx1, ty0)[v] as f32;
        let m01 = mapping_at(tx0, ty1)[v] as f32;
        let m11 = mapping_at(tx1, ty1)[v] as f32;
        let top = m00 * (1.0 - fx) + m10 * fx;
        let bottom = m01 * (1.0 - fx) + m11 * fx;
        let value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0);

        out.put_pixel(x, y, image::Luma([value as u8]));
    }
    out
}

/// Unsharp mask: add back a scaled difference against a heavily blurred copy.
fn unsharp_mask(gray: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, sigma);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let original = pixel[0] as f32;
        let blur = blurred.get_pixel(x, y)[0] as f32;
        let sharpened = (original + amount * (original - blur)).clamp(0.0, 255.0);
        out.put_pixel(x, y, image::Luma([sharpened as u8]));
    }
    out
}

/// Mean pixel brightness in [0, 255].
fn mean_luma(gray: &GrayImage) -> f64 {
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    sum as f64 / count as f64
}
