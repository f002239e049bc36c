//! Pixel helpers shared by the ONNX capabilities: crops and resizes through
//! `image::imageops`, then NCHW tensor packing.

use crate::capabilities::StageError;
use crate::types::{BoundingBox, Image};
use image::imageops::{self, FilterType};
use image::{GenericImageView, GrayImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array3, Array4};

/// Borrowed view of an [`Image`] as an `image` buffer.
pub type RgbView<'a> = ImageBuffer<Rgb<u8>, &'a [u8]>;

/// Axis-aligned crop window in whole source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f64,
            height: height as f64,
        }
    }

    /// Square window centred on `face`, side = longest face side × `scale`,
    /// snapped to the pixel grid.
    pub fn square_around(face: &BoundingBox, scale: f64) -> Self {
        let side = (face.width.max(face.height) as f64 * scale).round().max(1.0);
        let cx = face.xleft as f64 + face.width as f64 / 2.0;
        let cy = face.ytop as f64 + face.height as f64 / 2.0;
        Self {
            x: (cx - side / 2.0).round(),
            y: (cy - side / 2.0).round(),
            width: side,
            height: side,
        }
    }

    /// Map a point normalized to `[0, 1]` inside the window back to source pixels.
    pub fn denormalize(&self, nx: f64, ny: f64) -> (f64, f64) {
        (self.x + nx * self.width, self.y + ny * self.height)
    }
}

pub fn rgb_view(image: &Image) -> Result<RgbView<'_>, StageError> {
    ImageBuffer::from_raw(image.width as u32, image.height as u32, image.data.as_slice())
        .ok_or_else(|| {
            StageError::InvalidInput(format!(
                "{}x{} image with {} bytes",
                image.width,
                image.height,
                image.data.len()
            ))
        })
}

/// Copy a `(rows, cols, 3)` array into an owned 3-channel buffer, channel
/// order untouched.
pub fn array_to_rgb(pixels: &Array3<u8>) -> Result<RgbImage, StageError> {
    let (rows, cols, channels) = pixels.dim();
    if channels != 3 {
        return Err(StageError::InvalidInput(format!(
            "expected 3 channels, got {channels}"
        )));
    }
    RgbImage::from_raw(cols as u32, rows as u32, pixels.iter().copied().collect())
        .ok_or_else(|| StageError::InvalidInput(format!("{cols}x{rows} pixel array")))
}

/// Crop `roi` from `src`, zero outside the source, and resize it to a
/// `size`×`size` square with a triangle filter.
pub fn crop_resize<I>(src: &I, roi: Roi, size: u32) -> RgbImage
where
    I: GenericImageView<Pixel = Rgb<u8>>,
{
    let (w, h) = src.dimensions();
    if roi == Roi::full(w as usize, h as usize) {
        return imageops::resize(src, size, size, FilterType::Triangle);
    }
    let mut canvas = RgbImage::new(roi.width.max(1.0) as u32, roi.height.max(1.0) as u32);
    imageops::replace(&mut canvas, src, -(roi.x as i64), -(roi.y as i64));
    imageops::resize(&canvas, size, size, FilterType::Triangle)
}

/// Pack into a `(1, 3, h, w)` tensor. `channel_order[i]` is the pixel channel
/// written to tensor channel `i`; `normalize(i, value)` maps each sample.
pub fn to_tensor<N>(pixels: &RgbImage, channel_order: [usize; 3], normalize: N) -> Array4<f32>
where
    N: Fn(usize, f32) -> f32,
{
    let (w, h) = pixels.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in pixels.enumerate_pixels() {
        for (i, &c) in channel_order.iter().enumerate() {
            tensor[[0, i, y as usize, x as usize]] = normalize(i, pixel[c] as f32);
        }
    }
    tensor
}

/// Nearest-neighbour resize of a square `size`×`size` label mask to
/// `cols`×`rows`. Labels are never blended.
pub fn resize_mask(
    mask: Vec<u8>,
    size: usize,
    rows: usize,
    cols: usize,
) -> Result<Vec<u8>, StageError> {
    let len = mask.len();
    let labels = GrayImage::from_raw(size as u32, size as u32, mask).ok_or_else(|| {
        StageError::InvalidOutput(format!("{len} mask values for a {size}x{size} plane"))
    })?;
    Ok(imageops::resize(&labels, cols as u32, rows as u32, FilterType::Nearest).into_raw())
}
