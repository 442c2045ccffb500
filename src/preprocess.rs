use std::path::Path;

use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
use ndarray::{Array, Array4, Axis};

use crate::{config::PixelScaling, error::AppError};

pub const CHANNELS: usize = 3;

/// Decodes the stored upload and turns it into a (1, height, width, 3) batch.
pub fn load_and_prepare(
    path: &Path,
    width: u32,
    height: u32,
    scaling: PixelScaling,
) -> Result<Array4<f32>, AppError> {
    // Sniff the format from content, uploads may lack an extension.
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    prepare(&img, width, height, scaling)
}

/// Resizes straight to the target without keeping the aspect ratio, matching how the
/// model's training images were loaded.
pub fn prepare(
    img: &DynamicImage,
    width: u32,
    height: u32,
    scaling: PixelScaling,
) -> Result<Array4<f32>, AppError> {
    let resized = img.resize_exact(width, height, FilterType::Nearest).to_rgb8();

    let scale = match scaling {
        PixelScaling::Raw => 1.0,
        PixelScaling::UnitRange => 1.0 / 255.0,
    };
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 * scale)
        .collect();
    let len = data.len();

    // Raw RGB buffer is already row-major HWC.
    let array = Array::from_shape_vec((height as usize, width as usize, CHANNELS), data)
        .map_err(|_| AppError::ShapeMismatch {
            expected: vec![Some(height as i64), Some(width as i64), Some(CHANNELS as i64)],
            got: vec![len],
        })?;

    Ok(array.insert_axis(Axis(0)))
}
