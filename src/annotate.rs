use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::aggregate::AnalysisResult;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Copy of `image` with every remapped detection outlined.
pub fn annotate(image: &RgbImage, result: &AnalysisResult) -> RgbImage {
    let mut palette = image.clone();
    for detection in result.boxes_by_region.values().flatten() {
        let [x1, y1, x2, y2] = detection.bbox;
        let width = (x2 - x1).round().max(1.0) as u32;
        let height = (y2 - y1).round().max(1.0) as u32;
        let rect = Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut palette, rect, BOX_COLOR);
    }
    palette
}
