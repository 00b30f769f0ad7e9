//! Refit adapts layered designs to new canvas sizes.
//!
//! A run flattens the document into a stable id-addressed layer table, renders a detection image
//! with every layer boxed and labelled, asks a layout oracle (a multimodal model) where each layer
//! should go, recovers and sanitizes the JSON it answers with, then resamples and composites every
//! layer onto the target canvas:
//!
//! - Open a [`LoadedDocument`] through a [`DocumentLoader`] (e.g. [`ManifestLoader`])
//! - Build a [`LayoutPipeline`] around a [`LayoutOracle`] and a [`PipelineConfig`]
//! - [`LayoutPipeline::run`] returns a [`LayoutResult`] or a typed [`RefitError`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Flat-layer resampling and compositing onto the target canvas.
pub mod apply;
/// Straight-alpha compositing primitives.
pub mod compose;
/// Run configuration.
pub mod config;
/// Detection image rendering.
pub mod detect;
/// Layered document model and loaders.
pub mod document;
/// Document flattening.
pub mod flatten;
/// Layout oracles and retry.
pub mod oracle;
/// The run state machine.
pub mod pipeline;
/// Oracle instruction text.
pub mod prompt;
/// Results, metadata and output stores.
pub mod report;
/// Oracle reply recovery and validation.
pub mod validate;

pub use crate::foundation::core::{BBox, Canvas};
pub use crate::foundation::error::{OracleError, RefitError, RefitResult, ValidationError};

pub use crate::apply::{
    ApplyOutcome, ApplyWarning, ApplyWarningKind, BitmapSource, LayerOutcome, SkipReason,
    apply_layout,
};
pub use crate::config::PipelineConfig;
pub use crate::detect::{DetectionImage, DetectionStyle, render_detection};
pub use crate::document::manifest::{DocumentManifest, ManifestLoader};
pub use crate::document::model::{
    DocNode, DocumentLoader, LayerKind, LoadedDocument, TextAlign, TextAttrs,
};
pub use crate::flatten::{DocumentSnapshot, Extraction, LayerBitmaps, LayerRecord, flatten};
pub use crate::oracle::gemini::{GeminiConfig, GeminiOracle};
pub use crate::oracle::{LayoutOracle, OracleReply, ReplayOracle, RetryPolicy, send_with_retry};
pub use crate::pipeline::{FailureReason, LayoutPipeline, PipelineState, RunOutcome};
pub use crate::prompt::build_layout_prompt;
pub use crate::report::{
    FsOutputStore, LayoutReport, LayoutResult, OutputStore, ResultMetadata, encode_png,
};
pub use crate::validate::{LayoutProposal, ProposalEntry, RecoveryTier, validate_response};
