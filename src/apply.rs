use std::sync::Arc;

use image::{RgbaImage, imageops::FilterType};
use rayon::prelude::*;

use crate::{
    compose::composite_at,
    flatten::{DocumentSnapshot, LayerBitmaps},
    foundation::core::{BBox, Canvas},
    foundation::error::RefitResult,
    validate::LayoutProposal,
};

/// Largest side a resampled layer may have.
pub const MAX_LAYER_DIM: u32 = 16_384;

/// Where the applier gets each layer's own pixels.
pub trait BitmapSource: Sync {
    /// Own bitmap of layer `id`, if it has one.
    fn bitmap(&self, id: u32) -> Option<Arc<RgbaImage>>;
}

impl BitmapSource for LayerBitmaps {
    fn bitmap(&self, id: u32) -> Option<Arc<RgbaImage>> {
        self.get(id).cloned()
    }
}

/// Category of a non-fatal problem met while applying a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyWarningKind {
    /// The layer was not painted.
    Skipped,
    /// The layer was painted but part of it fell outside the canvas.
    Clipped,
}

/// Non-fatal problem attached to the result.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApplyWarning {
    /// Affected layer.
    pub layer_id: u32,
    /// Category.
    pub kind: ApplyWarningKind,
    /// Human-readable detail.
    pub message: String,
}

/// Why a layer was not painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The proposal has no entry for the layer.
    NoProposal,
    /// The proposal marks the layer invisible.
    Hidden,
    /// The proposed box covers no pixels.
    DegenerateBox,
    /// Groups paint through their children.
    Group,
    /// The layer has no own pixels.
    NoBitmap,
    /// The proposed box exceeds the resample size limit.
    Oversized,
}

impl SkipReason {
    fn describe(self) -> &'static str {
        match self {
            Self::NoProposal => "no proposal entry",
            Self::Hidden => "proposal marks the layer invisible",
            Self::DegenerateBox => "proposed box is empty",
            Self::Group => "group layers paint through their children",
            Self::NoBitmap => "layer has no pixels",
            Self::Oversized => "proposed box exceeds the resample limit",
        }
    }
}

/// What happened to one layer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LayerOutcome {
    /// Painted onto the output.
    Painted {
        /// Target box from the proposal.
        target: BBox,
        /// Region of the canvas that received pixels; `None` when fully off-canvas.
        painted: Option<BBox>,
        /// Whether the bitmap was resampled.
        resampled: bool,
    },
    /// Left out of the output.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
}

/// Per-layer record of an apply pass.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppliedLayer {
    /// Layer id.
    pub id: u32,
    /// Layer name.
    pub name: String,
    /// Outcome.
    pub outcome: LayerOutcome,
}

/// Output canvas plus per-layer bookkeeping.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    /// The adapted raster.
    pub canvas: RgbaImage,
    /// One entry per snapshot layer, in id order.
    pub layers: Vec<AppliedLayer>,
    /// Skips and clips.
    pub warnings: Vec<ApplyWarning>,
}

struct PlanStep {
    target: BBox,
    opacity: f32,
    image: Arc<RgbaImage>,
}

/// A layer ready to composite: pixels already sized for the canvas region they cover.
struct Prepared {
    image: Arc<RgbaImage>,
    left: i32,
    top: i32,
    resampled: bool,
}

/// Paint every layer of `snapshot` onto a fresh `target` canvas at its proposed box.
///
/// Layers are resampled in parallel batches of one per worker thread, and each batch is
/// composited in ascending id order before the next starts. Only the part of a box that lands on
/// the canvas is resampled, so memory stays bounded by the target size whatever boxes the
/// proposal asks for.
#[tracing::instrument(skip_all, fields(layers = snapshot.layers.len(), target_w = target.width, target_h = target.height))]
pub fn apply_layout(
    snapshot: &DocumentSnapshot,
    bitmaps: &dyn BitmapSource,
    proposal: &LayoutProposal,
    target: Canvas,
) -> RefitResult<ApplyOutcome> {
    target.validate()?;

    let plan: Vec<Result<PlanStep, SkipReason>> = snapshot
        .layers
        .iter()
        .map(|layer| -> Result<PlanStep, SkipReason> {
            let entry = proposal.get(layer.id).ok_or(SkipReason::NoProposal)?;
            if layer.kind.is_group() {
                return Err(SkipReason::Group);
            }
            if !entry.visible {
                return Err(SkipReason::Hidden);
            }
            let target_box = entry.new_bbox;
            if target_box.is_degenerate() {
                return Err(SkipReason::DegenerateBox);
            }
            if target_box.width() > MAX_LAYER_DIM || target_box.height() > MAX_LAYER_DIM {
                return Err(SkipReason::Oversized);
            }
            let image = bitmaps
                .bitmap(layer.id)
                .filter(|img| img.width() > 0 && img.height() > 0)
                .ok_or(SkipReason::NoBitmap)?;
            Ok(PlanStep {
                target: target_box,
                opacity: layer.opacity,
                image,
            })
        })
        .collect();

    let bounds = target.bounds();
    let batch = rayon::current_num_threads().max(1);
    let mut canvas = RgbaImage::new(target.width, target.height);
    let mut layers = Vec::with_capacity(snapshot.layers.len());
    let mut warnings = Vec::new();

    for (batch_layers, batch_steps) in snapshot.layers.chunks(batch).zip(plan.chunks(batch)) {
        let prepared: Vec<Option<Prepared>> = batch_steps
            .par_iter()
            .map(|step| step.as_ref().ok().and_then(|s| prepare(s, bounds)))
            .collect();

        for ((layer, step), ready) in batch_layers.iter().zip(batch_steps).zip(prepared) {
            let outcome = match step {
                Ok(step) => {
                    let (painted, resampled) = match ready {
                        Some(p) => {
                            let placement =
                                composite_at(&mut canvas, &p.image, p.left, p.top, step.opacity);
                            (placement.painted, p.resampled)
                        }
                        None => (None, false),
                    };
                    if painted != Some(step.target) {
                        warnings.push(ApplyWarning {
                            layer_id: layer.id,
                            kind: ApplyWarningKind::Clipped,
                            message: format!(
                                "box {} extends past the {}x{} canvas",
                                step.target, target.width, target.height
                            ),
                        });
                    }
                    LayerOutcome::Painted {
                        target: step.target,
                        painted,
                        resampled,
                    }
                }
                Err(reason) => {
                    let reason = *reason;
                    tracing::debug!(layer = layer.id, name = %layer.name, ?reason, "skipping layer");
                    warnings.push(ApplyWarning {
                        layer_id: layer.id,
                        kind: ApplyWarningKind::Skipped,
                        message: reason.describe().to_string(),
                    });
                    LayerOutcome::Skipped { reason }
                }
            };
            layers.push(AppliedLayer {
                id: layer.id,
                name: layer.name.clone(),
                outcome,
            });
        }
    }

    Ok(ApplyOutcome {
        canvas,
        layers,
        warnings,
    })
}

/// Size a layer for its box. `None` when the box misses the canvas entirely.
fn prepare(step: &PlanStep, bounds: BBox) -> Option<Prepared> {
    let visible = step.target.intersect(bounds)?;
    let (w, h) = (step.target.width(), step.target.height());

    if step.image.dimensions() == (w, h) {
        return Some(Prepared {
            image: Arc::clone(&step.image),
            left: step.target.left,
            top: step.target.top,
            resampled: false,
        });
    }
    let image = if visible == step.target {
        image::imageops::resize(step.image.as_ref(), w, h, FilterType::Lanczos3)
    } else {
        resample_visible(&step.image, step.target, visible)
    };
    Some(Prepared {
        image: Arc::new(image),
        left: visible.left,
        top: visible.top,
        resampled: true,
    })
}

/// Resample only the source pixels behind `visible`, cut on whole source pixels.
fn resample_visible(src: &RgbaImage, target: BBox, visible: BBox) -> RgbaImage {
    let span = |lo: i32, hi: i32, origin: i32, extent: u32, limit: u32| -> (u32, u32) {
        let scale = f64::from(limit) / f64::from(extent);
        let from_origin = |v: i32| (i64::from(v) - i64::from(origin)) as f64 * scale;
        let start = from_origin(lo).floor().clamp(0.0, f64::from(limit - 1)) as u32;
        let end = from_origin(hi)
            .ceil()
            .clamp(f64::from(start + 1), f64::from(limit)) as u32;
        (start, end - start)
    };
    let (x, cw) = span(visible.left, visible.right, target.left, target.width(), src.width());
    let (y, ch) = span(visible.top, visible.bottom, target.top, target.height(), src.height());

    let crop = image::imageops::crop_imm(src, x, y, cw, ch).to_image();
    image::imageops::resize(&crop, visible.width(), visible.height(), FilterType::Lanczos3)
}

#[cfg(test)]
#[path = "../tests/unit/apply.rs"]
mod tests;
