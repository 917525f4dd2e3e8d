use std::time::Instant;

use fast_image_resize::images::Image as fir_Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::imageops::crop_imm;
use image::RgbImage;
use tracing::debug;

use crate::error::AnalysisError;
use crate::region::BoundingBox;

/// A region crop stretched to the square detector input, plus what is needed to map
/// detections back: the box origin and the crop's extent before resizing.
#[derive(Debug, Clone)]
pub struct NormalizedCrop {
    pub image: RgbImage,
    pub origin_x: u32,
    pub origin_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
}

/// Cuts `bbox` out of `image` and resizes it to `size`×`size`, each axis independently.
///
/// The stretch is not aspect preserving; [`crate::remap`] undoes it with per-axis scales.
/// A zero-area box cannot be resized and yields `Ok(None)`, which callers count as zero
/// detections.
pub fn normalize_crop(
    image: &RgbImage,
    bbox: &BoundingBox,
    size: u32,
) -> Result<Option<NormalizedCrop>, AnalysisError> {
    if bbox.is_degenerate() {
        return Ok(None);
    }

    let now = Instant::now();
    let (crop_width, crop_height) = (bbox.width(), bbox.height());
    let cropped = crop_imm(image, bbox.x_min, bbox.y_min, crop_width, crop_height).to_image();

    let src_image = fir_Image::from_vec_u8(crop_width, crop_height, cropped.into_raw(), PixelType::U8x3)?;
    let mut dst_image = fir_Image::new(size, size, PixelType::U8x3);
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new().resize(&src_image, &mut dst_image, &options)?;

    let resized = RgbImage::from_raw(size, size, dst_image.into_vec())
        .ok_or(fast_image_resize::ImageBufferError::InvalidBufferSize)?;
    debug!("crop {crop_width}x{crop_height} -> {size}x{size} in {:?}", now.elapsed());

    Ok(Some(NormalizedCrop {
        image: resized,
        origin_x: bbox.x_min,
        origin_y: bbox.y_min,
        crop_width,
        crop_height,
    }))
}
