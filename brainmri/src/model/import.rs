//! Pretrained VGG16 weights in the torchvision `features.*` layout.
//!
//! torchvision and timm publish VGG16 as one `features` sequence where every
//! convolution is followed by a ReLU and every block by a max-pool, so the
//! 13 convolutions sit at `features.{0,2,5,7,10,12,14,17,19,21,24,26,28}`.
//! Those kernels expect normalized RGB in `0..=1`, while the classifier
//! feeds mean-centered BGR in `0..=255`; the first convolution is rewritten
//! for that input on import.

use super::{artifact_path, BackboneLayout, Vgg16Backbone, IMAGENET_MEAN_BGR};
use crate::errors::{PipelineError, Result};
use crate::utils::ensure_parent;
use burn::module::{Module, Param};
use burn::record::CompactRecorder;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use safetensors::{Dtype, SafeTensors};
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-channel mean the torchvision kernels were trained with, RGB order.
pub const TORCHVISION_MEAN_RGB: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation, RGB order.
pub const TORCHVISION_STD_RGB: [f32; 3] = [0.229, 0.224, 0.225];

/// Whether `path` names a safetensors file rather than a burn record.
#[must_use]
pub fn is_safetensors(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "safetensors")
}

/// `features.N` position of every convolution, in forward order.
#[must_use]
pub fn feature_indices(layout: BackboneLayout) -> Vec<usize> {
    let mut indices = Vec::with_capacity(layout.conv_layers());
    let mut index = 0;
    for widths in layout.blocks() {
        for _ in widths.iter() {
            indices.push(index);
            index += 2;
        }
        index += 1;
    }
    indices
}

/// Rewrites a `[out, 3, kh, kw]` kernel trained on normalized RGB so it
/// gives the same response to mean-centered BGR in `0..=255`. Exact away
/// from the zero-padded border.
#[must_use]
pub fn fold_input_normalization(weight: &[f32], bias: &[f32], shape: [usize; 4]) -> (Vec<f32>, Vec<f32>) {
    let [out, channels, kh, kw] = shape;
    let taps = kh * kw;
    let mut folded = vec![0.0; weight.len()];
    let mut folded_bias = bias.to_vec();
    for o in 0..out {
        for rgb in 0..channels {
            let bgr = channels - 1 - rgb;
            let scale = 1.0 / (255.0 * TORCHVISION_STD_RGB[rgb]);
            let offset = (IMAGENET_MEAN_BGR[bgr] / 255.0 - TORCHVISION_MEAN_RGB[rgb]) / TORCHVISION_STD_RGB[rgb];
            let src = (o * channels + rgb) * taps;
            let dst = (o * channels + bgr) * taps;
            for k in 0..taps {
                let w = weight[src + k];
                folded[dst + k] = w * scale;
                folded_bias[o] += w * offset;
            }
        }
    }
    (folded, folded_bias)
}

fn format_error(path: &Path, message: impl std::fmt::Display) -> PipelineError {
    PipelineError::Recorder(format!("{}: {message}", path.display()))
}

fn read_f32(tensors: &SafeTensors<'_>, name: &str, path: &Path) -> Result<(Vec<f32>, Vec<usize>)> {
    let view = tensors.tensor(name).map_err(|e| format_error(path, e))?;
    if view.dtype() != Dtype::F32 {
        return Err(format_error(path, format!("{name} is {:?}, expected F32", view.dtype())));
    }
    let values = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((values, view.shape().to_vec()))
}

/// Builds a backbone from torchvision/timm VGG16 safetensors weights.
pub fn import_torchvision_backbone<B: Backend>(
    layout: BackboneLayout,
    path: &Path,
    device: &B::Device,
) -> Result<Vgg16Backbone<B>> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| format_error(path, e))?;

    let mut backbone = Vgg16Backbone::<B>::new(layout, 3, device);
    let mut features = feature_indices(layout).into_iter();
    let mut first = true;
    for block in &mut backbone.blocks {
        for conv in &mut block.convs {
            let index = features
                .next()
                .ok_or_else(|| format_error(path, "more convolutions than feature indices"))?;
            let expected = conv.weight.val().dims();
            let (weight, weight_shape) = read_f32(&tensors, &format!("features.{index}.weight"), path)?;
            let (bias, _) = read_f32(&tensors, &format!("features.{index}.bias"), path)?;
            if weight_shape != expected || bias.len() != expected[0] {
                return Err(format_error(
                    path,
                    format!("features.{index} is {weight_shape:?}, the {layout:?} layout needs {expected:?}"),
                ));
            }

            let (weight, bias) = if first {
                fold_input_normalization(&weight, &bias, expected)
            } else {
                (weight, bias)
            };
            first = false;

            conv.weight = Param::from_tensor(Tensor::from_data(TensorData::new(weight, expected), device));
            conv.bias = Some(Param::from_tensor(Tensor::from_data(
                TensorData::new(bias, [expected[0]]),
                device,
            )));
        }
    }

    info!("Imported {} convolutions from {}", layout.conv_layers(), path.display());
    Ok(backbone)
}

/// Imports safetensors weights and writes them as a backbone record at
/// `<output>.mpk`, returning that path.
pub fn convert_torchvision_weights<B: Backend>(
    layout: BackboneLayout,
    input: &Path,
    output: &Path,
    device: &B::Device,
) -> Result<PathBuf> {
    let record = artifact_path(output, "mpk");
    ensure_parent(&record)?;
    import_torchvision_backbone::<B>(layout, input, device)?
        .save_file(&record, &CompactRecorder::new())
        .map_err(|e| format_error(&record, e))?;
    info!("Backbone record saved to: {}", record.display());
    Ok(record)
}
