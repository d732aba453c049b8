//! Writes a VGG16 backbone record usable as `base_model.weights_path`.
//!
//! ```text
//! convert_weights weights/vgg16.safetensors --output weights/vgg16_notop
//! convert_weights --random --tiny --output weights/tiny_backbone
//! ```

use anyhow::Context;
use brainmri::backend::{default_device, InferenceBackend};
use brainmri::components::base_model::write_random_backbone;
use brainmri::model::{artifact_path, convert_torchvision_weights, BackboneLayout};
use brainmri::prelude::*;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Converts torchvision or timm VGG16 weights into a backbone record.
#[derive(Parser, Debug)]
#[command(name = "convert_weights", version)]
struct Args {
    /// VGG16 weights in the torchvision `features.*` layout (`.safetensors`).
    #[arg(required_unless_present = "random")]
    input: Option<PathBuf>,

    /// Record prefix; `.mpk` is appended.
    #[arg(long, default_value = "weights/vgg16_notop")]
    output: PathBuf,

    /// Narrow test layout instead of the ImageNet widths.
    #[arg(long)]
    tiny: bool,

    /// Write randomly initialized weights instead of converting a file.
    #[arg(long, conflicts_with = "input")]
    random: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let layout = if args.tiny {
        BackboneLayout::Tiny
    } else {
        BackboneLayout::Vgg16
    };

    let record = match args.input {
        Some(input) => convert_torchvision_weights::<InferenceBackend>(layout, &input, &args.output, &default_device())
            .with_context(|| format!("converting {}", input.display()))?,
        None => {
            write_random_backbone(layout, &args.output)?;
            artifact_path(&args.output, "mpk")
        }
    };
    info!("Set base_model.weights_path to {} in config/config.yaml", args.output.display());
    info!("Record written to: {}", record.display());
    Ok(())
}
