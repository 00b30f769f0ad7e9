use std::{path::Path, sync::Arc};

use image::RgbaImage;

use crate::{
    compose::composite_at,
    foundation::core::{BBox, Canvas},
    foundation::error::RefitResult,
};

/// Horizontal alignment of a text layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
}

impl TextAlign {
    /// Lowercase name, matching the serialized form.
    pub fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }
}

/// Typographic attributes carried by text layers.
///
/// Every field has a neutral default so documents with partial text metadata still load.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextAttrs {
    /// Font family name.
    pub font: String,
    /// Font size in pixels.
    pub size: f32,
    /// Fill color as `#rrggbb`.
    pub color: String,
    /// Paragraph alignment.
    pub align: TextAlign,
    /// Text content, when the document exposes it.
    pub content: String,
}

impl Default for TextAttrs {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            size: 16.0,
            color: "#000000".to_string(),
            align: TextAlign::Left,
            content: String::new(),
        }
    }
}

impl TextAttrs {
    /// Replace unusable values with defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            font: if self.font.trim().is_empty() {
                defaults.font
            } else {
                self.font
            },
            size: if self.size.is_finite() && self.size > 0.0 {
                self.size
            } else {
                defaults.size
            },
            color: if self.color.trim().is_empty() {
                defaults.color
            } else {
                self.color
            },
            align: self.align,
            content: self.content,
        }
    }
}

/// What a layer is. Text-only attributes live in the `Text` payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerKind {
    /// Raster pixels.
    Pixel,
    /// Typeset text, rasterized by the document reader.
    Text(TextAttrs),
    /// Vector shape, rasterized by the document reader.
    Shape,
    /// Structural container; paints nothing by itself.
    Group,
}

impl LayerKind {
    /// Stable lowercase label used in prompts and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pixel => "pixel",
            Self::Text(_) => "text",
            Self::Shape => "shape",
            Self::Group => "group",
        }
    }

    /// True for structural containers.
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }
}

/// A raster together with its top-left position in document space.
#[derive(Clone, Debug)]
pub struct PositionedRaster {
    /// Left edge of the raster.
    pub left: i32,
    /// Top edge of the raster.
    pub top: i32,
    /// Straight-alpha RGBA8 pixels.
    pub image: Arc<RgbaImage>,
}

impl PositionedRaster {
    /// Rectangle covered by the raster.
    pub fn bbox(&self) -> BBox {
        BBox::from_origin_size(self.left, self.top, self.image.width(), self.image.height())
    }
}

/// A node in the document forest.
#[derive(Clone, Debug)]
pub struct DocNode {
    /// Display name.
    pub name: String,
    /// Layer kind.
    pub kind: LayerKind,
    /// Authored visibility.
    pub visible: bool,
    /// Layer opacity in `[0, 1]`.
    pub opacity: f32,
    /// Bounds in document space; may extend past the canvas or be empty for groups.
    pub bbox: BBox,
    /// Own pixels anchored at `bbox.left/top`. Groups carry none.
    pub pixels: Option<Arc<RgbaImage>>,
    /// Child nodes, bottom-most first.
    pub children: Vec<DocNode>,
}

impl DocNode {
    /// Leaf node whose bbox is derived from its raster.
    pub fn leaf(
        name: impl Into<String>,
        kind: LayerKind,
        left: i32,
        top: i32,
        pixels: RgbaImage,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            visible: true,
            opacity: 1.0,
            bbox: BBox::from_origin_size(left, top, pixels.width(), pixels.height()),
            pixels: Some(Arc::new(pixels)),
            children: Vec::new(),
        }
    }

    /// Group node with an empty own bbox; the flattener back-fills it from the composite.
    pub fn group(name: impl Into<String>, children: Vec<DocNode>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Group,
            visible: true,
            opacity: 1.0,
            bbox: BBox::default(),
            pixels: None,
            children,
        }
    }

    /// Builder-style visibility override.
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Builder-style opacity override.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// True for structural containers.
    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Child nodes, bottom-most first.
    pub fn children(&self) -> &[DocNode] {
        &self.children
    }

    /// The node's own pixels, if it has any.
    pub fn own_bitmap(&self) -> Option<PositionedRaster> {
        self.pixels.as_ref().map(|image| PositionedRaster {
            left: self.bbox.left,
            top: self.bbox.top,
            image: Arc::clone(image),
        })
    }

    /// Render this node (and, for groups, its visible descendants) to a raster.
    ///
    /// `force_visible` renders the node even when it is authored hidden; hidden descendants stay
    /// hidden. The node itself is never mutated.
    pub fn composite(&self, force_visible: bool) -> Option<PositionedRaster> {
        if !force_visible && !self.visible {
            return None;
        }
        if !self.is_group() {
            return self.own_bitmap();
        }

        let parts: Vec<(PositionedRaster, f32)> = self
            .children
            .iter()
            .filter_map(|child| child.composite(false).map(|r| (r, child.opacity)))
            .collect();
        let extent = parts
            .iter()
            .map(|(r, _)| r.bbox())
            .filter(|b| !b.is_degenerate())
            .reduce(BBox::union)?;

        let mut out = RgbaImage::new(extent.width(), extent.height());
        for (raster, opacity) in &parts {
            composite_at(
                &mut out,
                &raster.image,
                raster.left.saturating_sub(extent.left),
                raster.top.saturating_sub(extent.top),
                *opacity,
            );
        }
        Some(PositionedRaster {
            left: extent.left,
            top: extent.top,
            image: Arc::new(out),
        })
    }
}

/// An opened layered document.
#[derive(Clone, Debug)]
pub struct LoadedDocument {
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    /// Top-level nodes, bottom-most first.
    pub roots: Vec<DocNode>,
}

impl LoadedDocument {
    /// Canvas dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }
}

/// Opens layered documents. Binary formats are decoded by whatever implements this.
pub trait DocumentLoader {
    /// Open a document from a file.
    fn open_path(&self, path: &Path) -> RefitResult<LoadedDocument>;

    /// Open a document from in-memory bytes.
    fn open_bytes(&self, bytes: &[u8]) -> RefitResult<LoadedDocument>;
}

#[cfg(test)]
#[path = "../../tests/unit/document/model.rs"]
mod tests;
