//! Region segmentation: find text-bearing rectangles on a page.
//!
//! Detection is deliberately shallow: adaptive binarization followed by
//! connected-component bounding boxes finds word/line-level ink, then a
//! greedy single-pass merge glues nearby boxes into regions. There is no
//! paragraph modelling; the goal is only to hand OCR engines crops with less
//! empty margin, never to understand layout.
//!
//! The pass never returns an empty set. A page where nothing is detected is
//! still a page; the whole image is returned as the single region so OCR
//! always gets a chance.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

/// Block radius for the detection binarization.
const DETECT_RADIUS: u32 = 15;

/// An axis-aligned pixel rectangle, inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Region {
    fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn union(&self, other: &Region) -> Region {
        Region {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    fn expand(&self, margin: u32) -> Region {
        Region {
            min_x: self.min_x.saturating_sub(margin),
            min_y: self.min_y.saturating_sub(margin),
            max_x: self.max_x.saturating_add(margin),
            max_y: self.max_y.saturating_add(margin),
        }
    }

    fn intersects(&self, other: &Region) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// Segment a page into text-bearing crops of the original image.
///
/// `merge_epsilon` is the pixel margin within which detected boxes are glued
/// together; merged boxes with width or height at most `min_region` are
/// dropped as specks. Zero surviving regions yields the whole page.
pub fn segment(image: &DynamicImage, merge_epsilon: u32, min_region: u32) -> Vec<DynamicImage> {
    let gray = image.to_luma8();
    let binary = adaptive_threshold(&gray, DETECT_RADIUS);

    let regions = detect_regions(&binary, merge_epsilon, min_region);
    debug!(regions = regions.len(), "segmented page");

    if regions.is_empty() {
        return vec![image.clone()];
    }

    regions
        .iter()
        .map(|r| image.crop_imm(r.min_x, r.min_y, r.width(), r.height()))
        .collect()
}

/// Detect merged ink regions in a binarized image (ink black on white).
///
/// A surviving region exceeds `min_region` in both dimensions; anything
/// thinner or shorter is below OCR-legible size and dropped.
pub fn detect_regions(binary: &GrayImage, merge_epsilon: u32, min_region: u32) -> Vec<Region> {
    let boxes = component_boxes(binary);
    let merged = merge_boxes(&boxes, merge_epsilon);
    merged
        .into_iter()
        .filter(|r| r.width() > min_region && r.height() > min_region)
        .collect()
}

/// Bounding box per connected component of ink pixels.
fn component_boxes(binary: &GrayImage) -> Vec<Region> {
    if binary.width() == 0 || binary.height() == 0 {
        return Vec::new();
    }

    let labels = connected_components(binary, Connectivity::Eight, Luma([255u8]));

    let mut boxes: Vec<Option<Region>> = Vec::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0] as usize;
        if label == 0 {
            continue;
        }
        if boxes.len() < label {
            boxes.resize(label, None);
        }
        match &mut boxes[label - 1] {
            Some(region) => region.include(x, y),
            slot @ None => *slot = Some(Region::point(x, y)),
        }
    }

    boxes.into_iter().flatten().collect()
}

/// Greedy single-pass merge in detection order.
///
/// Each box joins the first already-merged box whose bounds, expanded by
/// `margin`, touch it; otherwise it starts a new merged box. One pass only,
/// so two merged boxes that become adjacent through later unions are not
/// re-merged. The order dependence is accepted; OCR engines tolerate a
/// region split better than this pass tolerates quadratic re-scanning.
fn merge_boxes(boxes: &[Region], margin: u32) -> Vec<Region> {
    let mut merged: Vec<Region> = Vec::new();
    for b in boxes {
        match merged.iter_mut().find(|m| m.expand(margin).intersects(b)) {
            Some(m) => *m = m.union(b),
            None => merged.push(*b),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White canvas with black rectangles painted on.
    fn canvas(width: u32, height: u32, blocks: &[Region]) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for b in blocks {
            for y in b.min_y..=b.max_y {
                for x in b.min_x..=b.max_x {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    fn rect(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Region {
        Region {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[test]
    fn blank_page_yields_whole_page() {
        let page = DynamicImage::new_rgb8(200, 100);
        let regions = segment(&page, 50, 10);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].width(), regions[0].height()), (200, 100));
    }

    #[test]
    fn distant_blocks_stay_separate() {
        let binary = canvas(
            400,
            400,
            &[rect(20, 20, 59, 59), rect(300, 300, 339, 339)],
        );
        let regions = detect_regions(&binary, 50, 10);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn nearby_blocks_merge_into_one() {
        // Gap of 30 px, under the 50 px merge margin.
        let binary = canvas(400, 200, &[rect(20, 20, 59, 59), rect(90, 20, 129, 59)]);
        let regions = detect_regions(&binary, 50, 10);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0], rect(20, 20, 129, 59));
    }

    #[test]
    fn specks_are_discarded() {
        // A 5x5 blob fits inside the 10x10 minimum and is dropped.
        let binary = canvas(200, 200, &[rect(100, 100, 104, 104)]);
        let regions = detect_regions(&binary, 50, 10);
        assert!(regions.is_empty());
    }

    #[test]
    fn regions_exceed_the_minimum_in_both_dimensions() {
        // An 80x3 ink line is wide but not tall enough: dropped. Every
        // surviving region must exceed the minimum in width AND height.
        let binary = canvas(200, 100, &[rect(10, 40, 89, 42)]);
        assert!(detect_regions(&binary, 50, 10).is_empty());

        // A 3x80 column fails the same way on width.
        let binary = canvas(100, 200, &[rect(40, 10, 42, 89)]);
        assert!(detect_regions(&binary, 50, 10).is_empty());

        // 11x11 clears the 10 px minimum on both axes and survives.
        let binary = canvas(200, 200, &[rect(50, 50, 60, 60)]);
        let regions = detect_regions(&binary, 50, 10);
        assert_eq!(regions.len(), 1);
        assert!(regions.iter().all(|r| r.width() > 10 && r.height() > 10));
    }

    #[test]
    fn merge_is_single_pass_in_detection_order() {
        // a and c are far apart; b bridges them. b merges into a (first
        // match), and c then touches the grown a-box and merges too.
        let a = rect(0, 0, 9, 9);
        let b = rect(50, 0, 59, 9);
        let c = rect(100, 0, 109, 9);
        let merged = merge_boxes(&[a, b, c], 50);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], rect(0, 0, 109, 9));
    }

    #[test]
    fn crops_match_detected_bounds() {
        let mut img = image::RgbImage::from_pixel(300, 150, image::Rgb([255, 255, 255]));
        for y in 30..60 {
            for x in 40..120 {
                img.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }
        let crops = segment(&DynamicImage::ImageRgb8(img), 50, 10);
        assert_eq!(crops.len(), 1);
        // The crop covers the painted block (binarization may ring slightly).
        assert!(crops[0].width() >= 80);
        assert!(crops[0].height() >= 30);
    }
}
