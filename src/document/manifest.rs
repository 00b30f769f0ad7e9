use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::{
    document::model::{DocNode, DocumentLoader, LayerKind, LoadedDocument, TextAttrs},
    foundation::core::BBox,
    foundation::error::{RefitError, RefitResult},
};

/// JSON description of a layered document.
///
/// Leaves reference encoded rasters (PNG/JPEG/WebP) relative to the manifest directory, or carry
/// a solid `fill`. This is the hand-off format for external readers of binary layered formats.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DocumentManifest {
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    /// Top-level layers, bottom-most first.
    pub layers: Vec<ManifestLayer>,
}

/// Layer kind as spelled in a manifest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// Raster layer.
    #[default]
    Pixel,
    /// Text layer.
    Text,
    /// Shape layer.
    Shape,
    /// Group.
    Group,
}

/// One manifest layer.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ManifestLayer {
    /// Display name.
    pub name: String,
    /// Layer kind.
    #[serde(default)]
    pub kind: ManifestKind,
    /// Authored visibility.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Opacity in `[0, 1]`.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Bounds in document space. Optional for `source` layers (taken from the raster size).
    #[serde(default)]
    pub bbox: BBox,
    /// Encoded raster path, relative to the assets root.
    #[serde(default)]
    pub source: Option<String>,
    /// Solid straight-alpha RGBA fill covering `bbox`.
    #[serde(default)]
    pub fill: Option<[u8; 4]>,
    /// Text attributes for text layers.
    #[serde(default)]
    pub text: Option<TextAttrs>,
    /// Children of a group.
    #[serde(default)]
    pub children: Vec<ManifestLayer>,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

/// [`DocumentLoader`] for JSON document manifests.
#[derive(Clone, Debug, Default)]
pub struct ManifestLoader {
    assets_root: Option<PathBuf>,
}

impl ManifestLoader {
    /// Loader that resolves `source` paths next to the manifest (or the working directory for
    /// in-memory manifests).
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that resolves `source` paths against a fixed directory.
    pub fn with_assets_root(root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: Some(root.into()),
        }
    }

    /// Turn an already-parsed manifest into a document.
    pub fn build(&self, manifest: &DocumentManifest, root: &Path) -> RefitResult<LoadedDocument> {
        if manifest.width == 0 || manifest.height == 0 {
            return Err(RefitError::document(format!(
                "document canvas must be non-empty, got {}x{}",
                manifest.width, manifest.height
            )));
        }
        let roots = manifest
            .layers
            .iter()
            .map(|layer| build_node(layer, root))
            .collect::<RefitResult<Vec<_>>>()?;
        Ok(LoadedDocument {
            width: manifest.width,
            height: manifest.height,
            roots,
        })
    }
}

impl DocumentLoader for ManifestLoader {
    fn open_path(&self, path: &Path) -> RefitResult<LoadedDocument> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read document manifest '{}'", path.display()))
            .map_err(RefitError::document_from)?;
        let manifest = parse_manifest(&bytes)?;
        let root = match &self.assets_root {
            Some(root) => root.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        self.build(&manifest, &root)
    }

    fn open_bytes(&self, bytes: &[u8]) -> RefitResult<LoadedDocument> {
        let manifest = parse_manifest(bytes)?;
        let root = self
            .assets_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        self.build(&manifest, &root)
    }
}

fn parse_manifest(bytes: &[u8]) -> RefitResult<DocumentManifest> {
    serde_json::from_slice(bytes)
        .context("parse document manifest JSON")
        .map_err(RefitError::document_from)
}

fn build_node(layer: &ManifestLayer, root: &Path) -> RefitResult<DocNode> {
    let kind = match layer.kind {
        ManifestKind::Pixel => LayerKind::Pixel,
        ManifestKind::Text => LayerKind::Text(layer.text.clone().unwrap_or_default()),
        ManifestKind::Shape => LayerKind::Shape,
        ManifestKind::Group => LayerKind::Group,
    };
    let opacity = if layer.opacity.is_finite() {
        layer.opacity.clamp(0.0, 1.0)
    } else {
        1.0
    };

    let mut bbox = layer.bbox;
    let pixels = if kind.is_group() {
        None
    } else if let Some(source) = &layer.source {
        let decoded = decode_layer_raster(&root.join(source))
            .with_context(|| format!("layer '{}'", layer.name))
            .map_err(RefitError::document_from)?;
        if bbox.is_degenerate() {
            bbox = BBox::from_origin_size(bbox.left, bbox.top, decoded.width(), decoded.height());
            Some(decoded)
        } else if decoded.dimensions() != (bbox.width(), bbox.height()) {
            tracing::debug!(
                layer = %layer.name,
                raster_w = decoded.width(),
                raster_h = decoded.height(),
                %bbox,
                "fitting layer raster to its bbox"
            );
            Some(image::imageops::resize(
                &decoded,
                bbox.width(),
                bbox.height(),
                FilterType::Lanczos3,
            ))
        } else {
            Some(decoded)
        }
    } else if let Some(fill) = layer.fill {
        (!bbox.is_degenerate())
            .then(|| RgbaImage::from_pixel(bbox.width(), bbox.height(), Rgba(fill)))
    } else {
        None
    };

    let children = layer
        .children
        .iter()
        .map(|child| build_node(child, root))
        .collect::<RefitResult<Vec<_>>>()?;

    Ok(DocNode {
        name: layer.name.clone(),
        kind,
        visible: layer.visible,
        opacity,
        bbox,
        pixels: pixels.map(Arc::new),
        children,
    })
}

/// Decode an encoded raster file into straight RGBA8.
pub fn decode_layer_raster(path: &Path) -> anyhow::Result<RgbaImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read layer raster '{}'", path.display()))?;
    let dyn_img = image::load_from_memory(&bytes)
        .with_context(|| format!("decode layer raster '{}'", path.display()))?;
    Ok(dyn_img.to_rgba8())
}

#[cfg(test)]
#[path = "../../tests/unit/document/manifest.rs"]
mod tests;
