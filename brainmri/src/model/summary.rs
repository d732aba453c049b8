//! Layer table, text summary and structural diagram of a classifier.
//!
//! Everything here is derived from the [`ClassifierConfig`] alone; no
//! tensors are allocated.

use super::{vgg::is_trainable, ClassifierConfig, IMAGENET_MEAN_BGR};
use crate::charts::escape_xml;

const RULE_WIDTH: usize = 80;

/// One row of the model summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer name, e.g. `block1_conv1`.
    pub name: String,
    /// Layer type, e.g. `Conv2D`.
    pub kind: &'static str,
    /// Output shape in `(None, h, w, c)` form.
    pub output_shape: String,
    /// Parameter count.
    pub params: usize,
    /// Whether the parameters are updated during training.
    pub trainable: bool,
}

fn shape(dims: &[usize]) -> String {
    let parts: Vec<String> = dims.iter().map(ToString::to_string).collect();
    format!("(None, {})", parts.join(", "))
}

/// Rows from input to logit, in forward order.
#[must_use]
pub fn layer_table(config: &ClassifierConfig) -> Vec<LayerInfo> {
    let [mut height, mut width, mut channels] = config.input_shape;
    let mut rows = vec![LayerInfo {
        name: "input_layer".to_string(),
        kind: "InputLayer",
        output_shape: shape(&[height, width, channels]),
        params: 0,
        trainable: false,
    }];

    if let Some(pipeline) = config.training_augmentation() {
        rows.push(LayerInfo {
            name: format!("augmentation ({} layers)", pipeline.layers().len()),
            kind: "Sequential",
            output_shape: shape(&[height, width, channels]),
            params: 0,
            trainable: false,
        });
    }
    rows.push(LayerInfo {
        name: "preprocess_input".to_string(),
        kind: "Preprocessing",
        output_shape: shape(&[height, width, channels]),
        params: 0,
        trainable: false,
    });

    let mut conv_indices = config.layout.conv_layer_indices().into_iter();
    for (b, widths) in config.layout.blocks().iter().enumerate() {
        for (c, &out) in widths.iter().enumerate() {
            rows.push(LayerInfo {
                name: format!("block{}_conv{}", b + 1, c + 1),
                kind: "Conv2D",
                output_shape: shape(&[height, width, out]),
                params: 3 * 3 * channels * out + out,
                trainable: conv_indices
                    .next()
                    .is_some_and(|index| is_trainable(config.fine_tune_at, index)),
            });
            channels = out;
        }
        height /= 2;
        width /= 2;
        rows.push(LayerInfo {
            name: format!("block{}_pool", b + 1),
            kind: "MaxPooling2D",
            output_shape: shape(&[height, width, channels]),
            params: 0,
            trainable: false,
        });
    }

    rows.push(LayerInfo {
        name: "global_average_pooling2d".to_string(),
        kind: "GlobalAveragePooling2D",
        output_shape: shape(&[channels]),
        params: 0,
        trainable: false,
    });
    rows.push(LayerInfo {
        name: "dense".to_string(),
        kind: "Dense",
        output_shape: shape(&[1]),
        params: channels + 1,
        trainable: true,
    });
    rows
}

/// Groups digits by thousands: `14714688` to `14,714,688`.
#[must_use]
pub fn thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Keras-style text summary with parameter totals.
#[must_use]
pub fn render_summary(config: &ClassifierConfig) -> String {
    let rows = layer_table(config);
    let thin = "_".repeat(RULE_WIDTH);
    let thick = "=".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str("Model: \"brainmri_classifier\"\n");
    out.push_str(&thin);
    out.push('\n');
    out.push_str(&format!(
        " {:<38}{:<22}{:<12}{}\n",
        "Layer (type)", "Output Shape", "Param #", "Trainable"
    ));
    out.push_str(&thick);
    out.push('\n');

    for row in &rows {
        let trainable = match (row.params, row.trainable) {
            (0, _) => "-",
            (_, true) => "Y",
            (_, false) => "N",
        };
        out.push_str(&format!(
            " {:<38}{:<22}{:<12}{}\n",
            format!("{} ({})", row.name, row.kind),
            row.output_shape,
            thousands(row.params),
            trainable
        ));
    }

    let total: usize = rows.iter().map(|r| r.params).sum();
    let trainable: usize = rows.iter().filter(|r| r.trainable).map(|r| r.params).sum();
    out.push_str(&thick);
    out.push('\n');
    out.push_str(&format!("Total params: {}\n", thousands(total)));
    out.push_str(&format!("Trainable params: {}\n", thousands(trainable)));
    out.push_str(&format!("Non-trainable params: {}\n", thousands(total - trainable)));
    out.push_str(&format!(
        "Preprocessing: RGB to BGR, mean subtraction {IMAGENET_MEAN_BGR:?}\n"
    ));
    out.push_str(&thin);
    out.push('\n');
    out
}

/// Vertical box-and-arrow diagram with one box per layer, as SVG.
#[must_use]
pub fn render_diagram(config: &ClassifierConfig) -> String {
    const WIDTH: usize = 460;
    const BOX_W: usize = 360;
    const BOX_H: usize = 40;
    const GAP: usize = 20;
    const MARGIN: usize = 20;

    let rows = layer_table(config);
    let height = 2 * MARGIN + rows.len() * BOX_H + rows.len().saturating_sub(1) * GAP;
    let x = (WIDTH - BOX_W) / 2;
    let cx = WIDTH / 2;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}">"#
    ));
    svg.push('\n');
    svg.push_str(r##"<defs><marker id="arrow" markerWidth="8" markerHeight="8" refX="4" refY="4" orient="auto"><path d="M0,0 L8,4 L0,8 z" fill="#555"/></marker></defs>"##);
    svg.push('\n');
    svg.push_str(&format!(r#"<rect width="{WIDTH}" height="{height}" fill="white"/>"#));
    svg.push('\n');

    for (i, row) in rows.iter().enumerate() {
        let y = MARGIN + i * (BOX_H + GAP);
        let fill = match (row.params, row.trainable) {
            (0, _) => "#eef2f7",
            (_, true) => "#d4edda",
            (_, false) => "#f8d7da",
        };
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{BOX_W}" height="{BOX_H}" rx="4" fill="{fill}" stroke="#555"/>"##
        ));
        svg.push_str(&format!(
            r#"<text x="{cx}" y="{}" font-family="sans-serif" font-size="12" text-anchor="middle">{}: {}</text>"#,
            y + 17,
            escape_xml(&row.name),
            row.kind
        ));
        svg.push_str(&format!(
            r##"<text x="{cx}" y="{}" font-family="sans-serif" font-size="11" fill="#444" text-anchor="middle">output: {}</text>"##,
            y + 32,
            escape_xml(&row.output_shape)
        ));
        svg.push('\n');
        if i + 1 < rows.len() {
            svg.push_str(&format!(
                r##"<line x1="{cx}" y1="{}" x2="{cx}" y2="{}" stroke="#555" marker-end="url(#arrow)"/>"##,
                y + BOX_H,
                y + BOX_H + GAP - 4
            ));
            svg.push('\n');
        }
    }
    svg.push_str("</svg>\n");
    svg
}
