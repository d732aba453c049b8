//! VGG16 convolutional backbone without the ImageNet classifier.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Channel widths of the backbone, one inner slice per block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackboneLayout {
    /// The ImageNet VGG16 widths.
    #[default]
    Vgg16,
    /// Same depth with narrow layers, for tests and smoke runs.
    Tiny,
}

const VGG16_BLOCKS: [&[usize]; 5] = [&[64, 64], &[128, 128], &[256, 256, 256], &[512, 512, 512], &[512, 512, 512]];
const TINY_BLOCKS: [&[usize]; 5] = [&[4, 4], &[8, 8], &[8, 8, 8], &[8, 8, 8], &[8, 8, 8]];

impl BackboneLayout {
    /// Output channels of every convolution, grouped by block.
    #[must_use]
    pub fn blocks(self) -> [&'static [usize]; 5] {
        match self {
            Self::Vgg16 => VGG16_BLOCKS,
            Self::Tiny => TINY_BLOCKS,
        }
    }

    /// Number of convolution layers.
    #[must_use]
    pub fn conv_layers(self) -> usize {
        self.blocks().iter().map(|b| b.len()).sum()
    }

    /// Length of the backbone's layer list: the input, every convolution
    /// and one pool per block. `fine_tune_at` indexes into this list.
    #[must_use]
    pub fn layer_count(self) -> usize {
        1 + self.conv_layers() + self.blocks().len()
    }

    /// Position of every convolution in the layer list, in forward order.
    #[must_use]
    pub fn conv_layer_indices(self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.conv_layers());
        let mut index = 1;
        for widths in self.blocks() {
            for _ in widths.iter() {
                indices.push(index);
                index += 1;
            }
            index += 1;
        }
        indices
    }

    /// Channels produced by the last block.
    #[must_use]
    pub fn output_channels(self) -> usize {
        self.blocks()[4].last().copied().unwrap_or_default()
    }
}

/// Whether the layer at `layer_index` is updated during training. Every
/// layer is frozen when `fine_tune_at` is 0.
#[must_use]
pub fn is_trainable(fine_tune_at: usize, layer_index: usize) -> bool {
    fine_tune_at > 0 && layer_index >= fine_tune_at
}

/// Convolutions followed by a 2x2 max-pool.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    pub(crate) convs: Vec<Conv2d<B>>,
    activation: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    fn new(in_channels: usize, widths: &[usize], device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(widths.len());
        let mut channels = in_channels;
        for &out in widths {
            convs.push(
                Conv2dConfig::new([channels, out], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            channels = out;
        }
        Self {
            convs,
            activation: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(x, |x, conv| self.activation.forward(conv.forward(x)));
        self.pool.forward(x)
    }
}

/// Thirteen 3x3 convolutions with ReLU in five pooled blocks.
#[derive(Module, Debug)]
pub struct Vgg16Backbone<B: Backend> {
    pub(crate) blocks: Vec<VggBlock<B>>,
}

impl<B: Backend> Vgg16Backbone<B> {
    /// Randomly initialized backbone for `in_channels` inputs.
    pub fn new(layout: BackboneLayout, in_channels: usize, device: &B::Device) -> Self {
        let mut channels = in_channels;
        let blocks = layout
            .blocks()
            .iter()
            .map(|widths| {
                let block = VggBlock::new(channels, widths, device);
                channels = widths.last().copied().unwrap_or(channels);
                block
            })
            .collect();
        Self { blocks }
    }

    /// `[batch, 3, h, w]` to `[batch, c, h / 32, w / 32]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    /// Stops gradients for every convolution whose layer index is below
    /// `fine_tune_at`; with `fine_tune_at == 0` every convolution is frozen.
    #[must_use]
    pub fn freeze(self, layout: BackboneLayout, fine_tune_at: usize) -> Self {
        let mut indices = layout.conv_layer_indices().into_iter();
        let blocks = self
            .blocks
            .into_iter()
            .map(|block| {
                let convs = block
                    .convs
                    .into_iter()
                    .map(|conv| match indices.next() {
                        Some(index) if is_trainable(fine_tune_at, index) => conv,
                        _ => conv.no_grad(),
                    })
                    .collect();
                VggBlock {
                    convs,
                    activation: block.activation,
                    pool: block.pool,
                }
            })
            .collect();
        Self { blocks }
    }
}
