//! Backend selection.
//!
//! Training and inference run on the CPU `NdArray` backend; training wraps it
//! in `Autodiff`.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};

/// Backend used for inference and record conversion.
pub type InferenceBackend = NdArray<f32>;

/// Backend used by the fit loop.
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// The default device.
#[must_use]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

