use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use image::RgbaImage;

use crate::{
    apply::{AppliedLayer, ApplyWarning, LayerOutcome},
    foundation::core::{BBox, Canvas},
    foundation::error::{RefitError, RefitResult},
    pipeline::PipelineState,
    validate::{LayoutProposal, ProposalWarning, RecoveryTier},
};

/// Everything a caller needs to audit one run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayoutReport {
    /// Source canvas.
    pub original_size: Canvas,
    /// Output canvas.
    pub target_size: Canvas,
    /// Layers in the snapshot.
    pub layer_count: usize,
    /// Oracle attempts used.
    pub oracle_attempts: u32,
    /// How the layout array was recovered from the reply.
    pub recovery_tier: RecoveryTier,
    /// Per-layer outcomes in id order.
    pub layers: Vec<AppliedLayer>,
    /// Skips and clips from the apply pass.
    pub warnings: Vec<ApplyWarning>,
    /// Reply items dropped or adjusted during validation.
    pub validation_warnings: Vec<ProposalWarning>,
    /// States visited, in order.
    pub states: Vec<PipelineState>,
}

/// A finished run: the adapted raster plus its report.
#[derive(Clone, Debug)]
pub struct LayoutResult {
    /// Output raster at the target size.
    pub canvas: RgbaImage,
    /// Audit report.
    pub report: LayoutReport,
    /// The proposal that was applied.
    pub proposal: LayoutProposal,
}

impl LayoutResult {
    /// PNG-encode the output raster.
    pub fn encode_png(&self) -> RefitResult<Vec<u8>> {
        encode_png(&self.canvas)
    }

    /// Compact metadata stored next to the PNG.
    pub fn metadata(&self) -> ResultMetadata {
        ResultMetadata::from_report(&self.report)
    }
}

/// Where one painted layer ended up.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LayerPlacement {
    /// Layer id.
    pub id: u32,
    /// Layer name.
    pub name: String,
    /// Box the layer was painted into.
    pub new_coords: BBox,
}

/// Metadata persisted alongside an output PNG.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultMetadata {
    /// Source canvas.
    pub original_size: Canvas,
    /// Output canvas.
    pub target_size: Canvas,
    /// Layers in the source snapshot.
    pub layer_count: usize,
    /// Painted layers.
    pub layers: Vec<LayerPlacement>,
}

impl ResultMetadata {
    /// Summarize a report.
    pub fn from_report(report: &LayoutReport) -> Self {
        let layers = report
            .layers
            .iter()
            .filter_map(|l| match l.outcome {
                LayerOutcome::Painted { target, .. } => Some(LayerPlacement {
                    id: l.id,
                    name: l.name.clone(),
                    new_coords: target,
                }),
                LayerOutcome::Skipped { .. } => None,
            })
            .collect();
        Self {
            original_size: report.original_size,
            target_size: report.target_size,
            layer_count: report.layer_count,
            layers,
        }
    }
}

/// PNG-encode a straight-alpha RGBA raster.
pub fn encode_png(img: &RgbaImage) -> RefitResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| RefitError::render(format!("encode png: {e}")))?;
    Ok(buf)
}

/// Persistence for finished results.
pub trait OutputStore {
    /// Store the PNG and its metadata; return an opaque id.
    fn store(&self, png: &[u8], metadata: &ResultMetadata) -> RefitResult<String>;
}

/// Writes `<id>.png` and `<id>_metadata.json` into a directory.
#[derive(Clone, Debug)]
pub struct FsOutputStore {
    dir: PathBuf,
}

impl FsOutputStore {
    /// Store rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the PNG for `id`.
    pub fn png_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    /// Path of the metadata file for `id`.
    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}_metadata.json"))
    }

    fn fresh_id(&self) -> String {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let base = format!("resized_{millis}");
        let mut id = base.clone();
        let mut n = 1;
        while self.png_path(&id).exists() {
            id = format!("{base}_{n}");
            n += 1;
        }
        id
    }
}

impl OutputStore for FsOutputStore {
    fn store(&self, png: &[u8], metadata: &ResultMetadata) -> RefitResult<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create output dir '{}'", self.dir.display()))?;
        let id = self.fresh_id();

        let png_path = self.png_path(&id);
        std::fs::write(&png_path, png)
            .with_context(|| format!("write '{}'", png_path.display()))?;

        let json = serde_json::to_vec_pretty(metadata).context("serialize result metadata")?;
        let meta_path = self.metadata_path(&id);
        std::fs::write(&meta_path, json)
            .with_context(|| format!("write '{}'", meta_path.display()))?;

        tracing::info!(id = %id, dir = %self.dir.display(), "stored result");
        Ok(id)
    }
}

#[cfg(test)]
#[path = "../tests/unit/report.rs"]
mod tests;
