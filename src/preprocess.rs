use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::RgbaImage;

use crate::{error::InferenceError, surface::Bitmap};

/// Side length of the square images the classifier was trained on.
pub const INPUT_SIZE: usize = 28;

/// A classifier input: one 28x28 single channel image with values in `[0, 1]`,
/// light ink on a dark background.
#[derive(Debug, Clone)]
pub struct InputTensor<B: Backend> {
    tensor: Tensor<B, 4>,
}

impl<B: Backend> InputTensor<B> {
    /// Batch, height, width, channels.
    pub const SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, 1];

    pub fn zeros(device: &B::Device) -> Self {
        Self {
            tensor: Tensor::zeros(Self::SHAPE, device),
        }
    }

    pub fn try_from_tensor(tensor: Tensor<B, 4>) -> Result<Self, InferenceError> {
        let dims = tensor.dims();

        if dims != Self::SHAPE {
            return Err(InferenceError::InvalidInput {
                dims: dims.to_vec(),
            });
        }

        Ok(Self { tensor })
    }

    pub fn dims(&self) -> [usize; 4] {
        self.tensor.dims()
    }

    pub fn into_inner(self) -> Tensor<B, 4> {
        self.tensor
    }
}

/// Converts the drawn raster into the classifier input.
///
/// The steps run in a fixed order: capture at native resolution, bilinear resize,
/// scale to `[0, 1]`, invert. Resizing happens on raw intensities so the
/// interpolation always sees the `[0, 255]` domain.
pub fn preprocess<B: Backend>(
    bitmap: &Bitmap,
    device: &B::Device,
) -> Result<InputTensor<B>, InferenceError> {
    let (width, height) = bitmap.dimensions();

    if width == 0 || height == 0 {
        return Err(InferenceError::InvalidInput {
            dims: vec![height as usize, width as usize],
        });
    }

    let resized = Tensor::<B, 4>::from_data(
        TensorData::new(resize_bilinear(bitmap, INPUT_SIZE), InputTensor::<B>::SHAPE),
        device,
    );
    let normalized = resized.div_scalar(255.0);
    let inverted = invert(normalized).clamp(0.0, 1.0);

    InputTensor::try_from_tensor(inverted)
}

/// Same as [`preprocess`] for an RGBA raster such as a canvas `ImageData`.
///
/// Alpha is ignored; the raster is expected to be painted on an opaque background.
pub fn preprocess_rgba<B: Backend>(
    raster: &RgbaImage,
    device: &B::Device,
) -> Result<InputTensor<B>, InferenceError> {
    preprocess(&image::imageops::grayscale(raster), device)
}

/// Maps every value `v` to `1 - v`.
pub fn invert<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.neg().add_scalar(1.0)
}

/// Resamples the raw intensities of `bitmap` to a `size` x `size` grid, row-major.
///
/// Output pixel `i` samples the source at `i * source_len / size` on each axis and
/// blends the two neighbouring pixels. Neighbours past the last row or column are
/// clamped to it, so any non-empty raster can be resized.
fn resize_bilinear(bitmap: &Bitmap, size: usize) -> Vec<f32> {
    let (width, height) = bitmap.dimensions();
    let columns: Vec<_> = (0..size).map(|x| sample_axis(x, size, width)).collect();
    let rows: Vec<_> = (0..size).map(|y| sample_axis(y, size, height)).collect();

    let columns = &columns;
    let intensity = |x: u32, y: u32| f32::from(bitmap.get_pixel(x, y).0[0]);

    rows.iter()
        .flat_map(move |&(top, bottom, dy)| {
            columns.iter().map(move |&(left, right, dx)| {
                let upper = intensity(left, top) * (1.0 - dx) + intensity(right, top) * dx;
                let lower = intensity(left, bottom) * (1.0 - dx) + intensity(right, bottom) * dx;

                upper * (1.0 - dy) + lower * dy
            })
        })
        .collect()
}

/// Low neighbour, high neighbour and the weight of the high one.
fn sample_axis(index: usize, size: usize, len: u32) -> (u32, u32, f32) {
    let last = len - 1;
    let position = index as f32 * len as f32 / size as f32;
    let low = (position.floor() as u32).min(last);
    let high = (low + 1).min(last);

    (low, high, (position - low as f32).clamp(0.0, 1.0))
}
