use std::fmt::Write as _;

use crate::{
    document::model::LayerKind,
    flatten::{DocumentSnapshot, LayerRecord},
    foundation::core::Canvas,
};

const NAME_COL: usize = 30;
const RULE_WIDTH: usize = 120;

/// Fixed-width table of the flattened layers, one row per layer in id order.
pub fn format_layer_table(layers: &[LayerRecord]) -> String {
    let mut out = format!(
        "{:<5} {:<5} {:<NAME_COL$} {:<8} {:<7} {:<36} {}\n",
        "ID", "LEVEL", "NAME", "TYPE", "VISIBLE", "POSITION (left, top, right, bottom)", "SIZE (w x h)"
    );
    out.push_str(&"-".repeat(RULE_WIDTH));
    out.push('\n');

    for layer in layers {
        let name = format!("{}{}", "  ".repeat(layer.level as usize), layer.name);
        let _ = writeln!(
            out,
            "{:<5} {:<5} {:<NAME_COL$} {:<8} {:<7} {:<36} {}x{}",
            layer.id,
            layer.level,
            name,
            layer.kind.label(),
            if layer.visible { "yes" } else { "no" },
            layer.bbox.to_string(),
            layer.bbox.width(),
            layer.bbox.height(),
        );
    }
    out
}

fn format_text_details(layers: &[LayerRecord]) -> String {
    let mut out = String::new();
    for layer in layers {
        if let LayerKind::Text(attrs) = &layer.kind {
            let _ = writeln!(
                out,
                "- id {}: font \"{}\" {}px, color {}, align {}",
                layer.id,
                attrs.font,
                attrs.size,
                attrs.color,
                attrs.align.label(),
            );
        }
    }
    out
}

/// Instruction text for one layout request.
///
/// Deterministic: the same snapshot and target always produce the same bytes.
pub fn build_layout_prompt(snapshot: &DocumentSnapshot, target: Canvas) -> String {
    let (ow, oh) = (snapshot.width, snapshot.height);
    let (tw, th) = (target.width, target.height);
    let scale = (f64::from(tw) / f64::from(ow)).min(f64::from(th) / f64::from(oh));
    let table = format_layer_table(&snapshot.layers);
    let text_details = format_text_details(&snapshot.layers);

    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "\
# Layered document resize

Adapt a layered design from {ow}x{oh} to {tw}x{th}. The attached image shows the design with a red
box and id label around every layer. Keep the design balanced, professional and legible.

## Layers

```
{table}```
"
    );
    if !text_details.is_empty() {
        let _ = write!(prompt, "\nText layers:\n{text_details}");
    }
    let _ = write!(
        prompt,
        "
## Rules

- Resize proportionally only. Never change a layer's aspect ratio.
- Every new box must lie within [0, {tw}] x [0, {th}].
- Keep each layer's visibility exactly as listed.
- Background layers may be cropped or scaled to cover the whole canvas.
- Text layers must stay whole and legible. Scale font size with the layout and never cut text.
- Product and foreground images must stay whole and must not overlap text.
- Decorative shapes may be scaled and repositioned freely.
- Group rows are structural. Report them, but their pixels come from their children.
- Suggested base scale: min({tw}/{ow}, {th}/{oh}) = {scale:.4}.

## Reply format

Reply with a JSON array only, one object per layer id, no prose:

[
  {{
    \"id\": 0,
    \"name\": \"layer name\",
    \"type\": \"pixel | text | shape | group\",
    \"level\": 0,
    \"visible\": true,
    \"original_coords\": {{\"left\": 0, \"top\": 0, \"right\": 0, \"bottom\": 0}},
    \"new_coords\": {{\"left\": 0, \"top\": 0, \"right\": 0, \"bottom\": 0}},
    \"adjustment_reason\": \"why the layer moved\",
    \"warnings\": []
  }}
]
"
    );
    prompt
}

#[cfg(test)]
#[path = "../tests/unit/prompt.rs"]
mod tests;
