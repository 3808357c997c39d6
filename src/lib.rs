//! Recognition of hand-drawn digits.
//!
//! A [`DrawingSurface`](surface::DrawingSurface) turns pointer input into a raster,
//! [`preprocess`](preprocess::preprocess) turns the raster into a `[1, 28, 28, 1]`
//! tensor and an [`InferenceAdapter`](inference::InferenceAdapter) scores it with a
//! classifier fetched once per session.

pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod session;
pub mod surface;

#[cfg(any(feature = "ndarray", feature = "wgpu"))]
pub mod state;

#[cfg(all(target_family = "wasm", any(feature = "ndarray", feature = "wgpu")))]
pub mod web;

pub use config::RecognizerConfig;
pub use error::{Error, InferenceError, LoadError};
pub use inference::{
    argmax, predict, BytesModelSource, HttpModelSource, InferenceAdapter, ModelHandle,
    ModelSource, Prediction,
};
pub use model::{Model, ModelConfig};
pub use preprocess::{invert, preprocess, preprocess_rgba, InputTensor, INPUT_SIZE};
pub use session::{Session, Status};
pub use surface::{Bitmap, Bounds, DrawingSurface, EventResponse, Point, PointerEvent};

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;
