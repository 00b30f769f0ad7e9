//! Detection image: the composed document with an id-labelled box around every layer.
//!
//! The overlay is built as an SVG document and rasterized with `resvg`, then composited over the
//! straight-alpha composition from [`compose_layers`].

use std::{fmt::Write as _, sync::OnceLock};

use image::{Rgba, RgbaImage};

use crate::{
    compose::{compose_layers, composite_at},
    flatten::{DocumentSnapshot, LayerBitmaps},
    foundation::error::{RefitError, RefitResult},
    report::encode_png,
};

/// Visual parameters of the detection overlay.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetectionStyle {
    /// Box outline and label background color, `#rrggbb`.
    pub stroke: String,
    /// Box outline width in pixels.
    pub stroke_width: f32,
    /// Label font size in pixels.
    pub label_font_px: f32,
    /// Label text color, `#rrggbb`.
    pub label_color: String,
}

impl Default for DetectionStyle {
    fn default() -> Self {
        Self {
            stroke: "#ff0000".to_string(),
            stroke_width: 3.0,
            label_font_px: 40.0,
            label_color: "#ffffff".to_string(),
        }
    }
}

impl DetectionStyle {
    /// Reject non-positive sizes and colors that are not `#rrggbb`.
    pub fn validate(&self) -> RefitResult<()> {
        for (what, v) in [
            ("stroke_width", self.stroke_width),
            ("label_font_px", self.label_font_px),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(RefitError::config(format!(
                    "detection {what} must be finite and > 0"
                )));
            }
        }
        for (what, c) in [("stroke", &self.stroke), ("label_color", &self.label_color)] {
            if !is_hex_color(c) {
                return Err(RefitError::config(format!(
                    "detection {what} must be #rrggbb, got '{c}'"
                )));
            }
        }
        Ok(())
    }
}

/// PNG-encoded detection image handed to the oracle.
#[derive(Clone, Debug)]
pub struct DetectionImage {
    /// Width in pixels (equals the document canvas).
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// PNG bytes.
    pub png: Vec<u8>,
}

/// Render the detection image for a snapshot.
///
/// Every layer with a non-degenerate bbox gets a box, hidden layers and groups included, so the
/// oracle can refer to any id in the table.
#[tracing::instrument(skip_all, fields(layers = snapshot.layers.len()))]
pub fn render_detection(
    snapshot: &DocumentSnapshot,
    bitmaps: &LayerBitmaps,
    style: &DetectionStyle,
) -> RefitResult<DetectionImage> {
    let mut canvas = compose_layers(snapshot, bitmaps);
    let overlay = rasterize_overlay(&overlay_svg(snapshot, style), snapshot.width, snapshot.height)?;
    composite_at(&mut canvas, &overlay, 0, 0, 1.0);

    let png = encode_png(&canvas)?;
    Ok(DetectionImage {
        width: snapshot.width,
        height: snapshot.height,
        png,
    })
}

/// SVG source of the box/label overlay.
pub fn overlay_svg(snapshot: &DocumentSnapshot, style: &DetectionStyle) -> String {
    let (w, h) = (snapshot.width, snapshot.height);
    let font = style.label_font_px;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );

    for layer in &snapshot.layers {
        let b = layer.bbox;
        if b.is_degenerate() {
            continue;
        }
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="{}" stroke-width="{}"/>"#,
            b.left,
            b.top,
            b.width(),
            b.height(),
            style.stroke,
            style.stroke_width
        );

        let label = layer.id.to_string();
        let label_w = (label.len() as f32) * font * 0.62 + font * 0.3;
        let label_h = font * 1.2;
        // Above the box when there is room, otherwise tucked inside its top edge.
        let label_top = if (b.top as f32) >= label_h {
            b.top as f32 - label_h
        } else {
            b.top as f32
        };
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{label_top}" width="{label_w}" height="{label_h}" fill="{}"/>"#,
            b.left, style.stroke
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="{font}" fill="{}">{label}</text>"#,
            b.left as f32 + font * 0.15,
            label_top + font,
            style.label_color
        );
    }

    svg.push_str("</svg>");
    svg
}

fn rasterize_overlay(svg: &str, width: u32, height: u32) -> RefitResult<RgbaImage> {
    let opts = usvg::Options {
        fontdb: overlay_fontdb(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| RefitError::render(format!("parse detection overlay: {e}")))?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| RefitError::render("failed to allocate detection pixmap"))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::identity(),
        &mut pixmap.as_mut(),
    );

    // tiny-skia stores premultiplied pixels; composition works in straight alpha.
    let mut out = RgbaImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(out)
}

fn overlay_fontdb() -> std::sync::Arc<usvg::fontdb::Database> {
    static FONTDB: OnceLock<std::sync::Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTDB
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            tracing::debug!(faces = db.len(), "loaded system fonts for detection labels");
            std::sync::Arc::new(db)
        })
        .clone()
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
#[path = "../tests/unit/detect.rs"]
mod tests;
