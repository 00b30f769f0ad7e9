use std::sync::Arc;

use image::RgbaImage;

use crate::{
    document::model::{DocNode, LayerKind, LoadedDocument},
    foundation::core::{BBox, Canvas},
    foundation::error::RefitResult,
};

/// One flattened layer, addressed by its pre-order id.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerRecord {
    /// Pre-order position in the document forest; ids are exactly `0..N`.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Kind, with text attributes inline.
    pub kind: LayerKind,
    /// Id of the enclosing group, always smaller than `id`.
    pub parent_id: Option<u32>,
    /// Visible in the rendered document: the layer and every enclosing group are visible.
    pub visible: bool,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Bounds clamped to the canvas; never inverted.
    pub bbox: BBox,
    /// Nesting depth; top-level layers are level 0.
    pub level: u32,
}

/// Immutable, flat view of a document for one run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentSnapshot {
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    /// Layers in paint order (pre-order DFS).
    pub layers: Vec<LayerRecord>,
}

impl DocumentSnapshot {
    /// Canvas dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Look up a layer by id.
    pub fn layer(&self, id: u32) -> Option<&LayerRecord> {
        self.layers.get(id as usize).filter(|l| l.id == id)
    }
}

/// Per-layer own pixels, indexed by layer id and cropped to the clamped bbox.
#[derive(Clone, Debug, Default)]
pub struct LayerBitmaps {
    by_id: Vec<Option<Arc<RgbaImage>>>,
}

impl LayerBitmaps {
    /// Bitmap for `id`; `None` for groups, degenerate layers and unknown ids.
    pub fn get(&self, id: u32) -> Option<&Arc<RgbaImage>> {
        self.by_id.get(id as usize).and_then(Option::as_ref)
    }

    /// Number of layers that carry a bitmap.
    pub fn painted_count(&self) -> usize {
        self.by_id.iter().filter(|b| b.is_some()).count()
    }
}

/// Output of [`flatten`].
#[derive(Clone, Debug)]
pub struct Extraction {
    /// Layer table.
    pub snapshot: DocumentSnapshot,
    /// Own bitmaps, produced once per run.
    pub bitmaps: LayerBitmaps,
}

struct Pending<'a> {
    node: &'a DocNode,
    level: u32,
    parent_id: Option<u32>,
    ancestors_visible: bool,
}

/// Walk the document forest in pre-order and build the layer table plus bitmap cache.
#[tracing::instrument(skip_all, fields(width = doc.width, height = doc.height))]
pub fn flatten(doc: &LoadedDocument) -> RefitResult<Extraction> {
    doc.canvas().validate()?;

    let mut layers = Vec::new();
    let mut by_id = Vec::new();
    let mut stack: Vec<Pending<'_>> = doc
        .roots
        .iter()
        .rev()
        .map(|node| Pending {
            node,
            level: 0,
            parent_id: None,
            ancestors_visible: true,
        })
        .collect();
    let mut next_id: u32 = 0;

    while let Some(pending) = stack.pop() {
        let id = next_id;
        next_id += 1;

        let (record, bitmap) = flatten_node(&pending, id, doc.width, doc.height);
        let (level, visible) = (record.level, record.visible);
        layers.push(record);
        by_id.push(bitmap);

        stack.extend(pending.node.children().iter().rev().map(|child| Pending {
            node: child,
            level: level + 1,
            parent_id: Some(id),
            ancestors_visible: visible,
        }));
    }

    tracing::debug!(layers = layers.len(), "flattened document");
    Ok(Extraction {
        snapshot: DocumentSnapshot {
            width: doc.width,
            height: doc.height,
            layers,
        },
        bitmaps: LayerBitmaps { by_id },
    })
}

fn flatten_node(
    pending: &Pending<'_>,
    id: u32,
    width: u32,
    height: u32,
) -> (LayerRecord, Option<Arc<RgbaImage>>) {
    let node = pending.node;
    let mut bbox = node.bbox;
    if bbox.is_degenerate()
        && let Some(raster) = node.composite(true)
    {
        // An all-zero bbox carries no anchor, so the composite's own corner is used.
        let (left, top) = if bbox == BBox::default() {
            (raster.left, raster.top)
        } else {
            (bbox.left, bbox.top)
        };
        bbox = BBox::from_origin_size(left, top, raster.image.width(), raster.image.height());
    }
    let bbox = bbox.clamp(width, height);

    let bitmap = if node.is_group() || bbox.is_degenerate() {
        None
    } else {
        node.own_bitmap().and_then(|raster| {
            let src = raster.bbox();
            let region = src.intersect(bbox)?;
            if region == src {
                return Some(raster.image);
            }
            let cropped = image::imageops::crop_imm(
                raster.image.as_ref(),
                (region.left - src.left) as u32,
                (region.top - src.top) as u32,
                region.width(),
                region.height(),
            )
            .to_image();
            Some(Arc::new(cropped))
        })
    };

    let kind = match &node.kind {
        LayerKind::Text(attrs) => LayerKind::Text(attrs.clone().normalized()),
        other => other.clone(),
    };
    let opacity = if node.opacity.is_finite() {
        node.opacity.clamp(0.0, 1.0)
    } else {
        1.0
    };

    let record = LayerRecord {
        id,
        name: node.name.clone(),
        kind,
        parent_id: pending.parent_id,
        visible: pending.ancestors_visible && node.visible,
        opacity,
        bbox,
        level: pending.level,
    };
    (record, bitmap)
}

#[cfg(test)]
#[path = "../tests/unit/flatten.rs"]
mod tests;
