//! The run driver: one document in, one adapted raster (or a typed failure) out.
//!
//! ```text
//! Idle -> Extracting -> DetectionRendered -> AwaitingOracle -> Validating -> Applying -> Done
//!              \______________\__________________\_______________\______________\-> Failed
//! ```
//!
//! CPU-heavy stages run on the blocking pool; the oracle call is the only I/O wait. Nothing is
//! persisted here, so dropping the run future at any point leaves no side effects behind.

use std::sync::Arc;

use anyhow::Context as _;

use crate::{
    apply::apply_layout,
    config::PipelineConfig,
    detect::render_detection,
    document::model::LoadedDocument,
    flatten::flatten,
    foundation::error::{RefitError, RefitResult},
    oracle::{LayoutOracle, send_with_retry},
    prompt::build_layout_prompt,
    report::{LayoutReport, LayoutResult},
    validate::validate_response,
};

/// Why a run ended in [`PipelineState::Failed`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "stage", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The document could not be flattened or its detection image rendered.
    Extraction(String),
    /// The oracle failed for good.
    Oracle(String),
    /// No layout could be recovered from the oracle reply.
    Validation(String),
    /// A blocking worker died while applying a validated layout. Per-layer problems never get
    /// here; they are warnings on the result.
    Internal(String),
}

/// Stage of a run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Flattening the document, producing layer bitmaps and the detection image.
    Extracting,
    /// Detection image ready.
    DetectionRendered,
    /// Waiting on the oracle.
    AwaitingOracle,
    /// Recovering the layout from the reply.
    Validating,
    /// Resampling and compositing.
    Applying,
    /// Finished with a result.
    Done,
    /// Finished without a result. Terminal.
    Failed(FailureReason),
}

impl PipelineState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, DetectionRendered)
                | (DetectionRendered, AwaitingOracle)
                | (AwaitingOracle, Validating)
                | (Validating, Applying)
                | (Applying, Done)
                | (Extracting | DetectionRendered | AwaitingOracle | Validating | Applying, Failed(_))
        )
    }

    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Ordered record of the states one run visited.
#[derive(Clone, Debug)]
pub struct RunTrace {
    states: Vec<PipelineState>,
}

impl Default for RunTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTrace {
    /// Trace positioned at `Idle`.
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Idle],
        }
    }

    /// Current state.
    pub fn current(&self) -> &PipelineState {
        // Never empty: starts at Idle and only grows.
        &self.states[self.states.len() - 1]
    }

    /// States visited so far.
    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.current().can_transition_to(&next),
            "illegal transition {:?} -> {next:?}",
            self.current()
        );
        tracing::debug!(from = ?self.current(), to = ?next, "pipeline transition");
        self.states.push(next);
    }

    fn fail(&mut self, reason: FailureReason) {
        tracing::warn!(?reason, "pipeline failed");
        self.advance(PipelineState::Failed(reason));
    }

    fn into_states(self) -> Vec<PipelineState> {
        self.states
    }
}

/// A finished run with its state history, successful or not.
#[derive(Debug)]
pub struct RunOutcome {
    /// States visited; the last one is terminal.
    pub states: Vec<PipelineState>,
    /// The result or the error that ended the run.
    pub result: RefitResult<LayoutResult>,
}

/// Drives documents through flatten, detection, oracle, validation and apply.
#[derive(Clone)]
pub struct LayoutPipeline {
    oracle: Arc<dyn LayoutOracle>,
    config: PipelineConfig,
}

impl std::fmt::Debug for LayoutPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LayoutPipeline {
    /// Validate `config` and build a pipeline around `oracle`.
    pub fn new(oracle: Arc<dyn LayoutOracle>, config: PipelineConfig) -> RefitResult<Self> {
        config.validate()?;
        Ok(Self { oracle, config })
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Adapt `doc` to the configured target.
    pub async fn run(&self, doc: LoadedDocument) -> RefitResult<LayoutResult> {
        self.run_traced(doc).await.result
    }

    /// Like [`Self::run`], also returning the visited states.
    #[tracing::instrument(skip_all, fields(target_w = self.config.target.width, target_h = self.config.target.height))]
    pub async fn run_traced(&self, doc: LoadedDocument) -> RunOutcome {
        let mut trace = RunTrace::new();
        let result = self.drive(doc, &mut trace).await;
        RunOutcome {
            states: trace.into_states(),
            result,
        }
    }

    async fn drive(&self, doc: LoadedDocument, trace: &mut RunTrace) -> RefitResult<LayoutResult> {
        let target = self.config.target;
        let original = doc.canvas();

        trace.advance(PipelineState::Extracting);
        let style = self.config.detection.clone();
        let extracted = blocking(move || {
            let extraction = flatten(&doc)?;
            let detection = render_detection(&extraction.snapshot, &extraction.bitmaps, &style)?;
            Ok((extraction, detection))
        })
        .await;
        let (extraction, detection) = match extracted {
            Ok(v) => v,
            Err(err) => {
                trace.fail(FailureReason::Extraction(err.to_string()));
                return Err(err);
            }
        };
        trace.advance(PipelineState::DetectionRendered);

        let prompt = build_layout_prompt(&extraction.snapshot, target);
        trace.advance(PipelineState::AwaitingOracle);
        let reply = match send_with_retry(
            self.oracle.as_ref(),
            &prompt,
            &detection.png,
            &self.config.retry,
        )
        .await
        {
            Ok(reply) => reply,
            Err(err) => {
                trace.fail(FailureReason::Oracle(err.to_string()));
                return Err(RefitError::Oracle(err));
            }
        };
        drop(detection);

        trace.advance(PipelineState::Validating);
        let validated = match validate_response(&reply.text, &extraction.snapshot) {
            Ok(v) => v,
            Err(err) => {
                trace.fail(FailureReason::Validation(err.to_string()));
                return Err(RefitError::Validation(err));
            }
        };

        trace.advance(PipelineState::Applying);
        let proposal = validated.proposal;
        let applied = blocking(move || {
            let outcome =
                apply_layout(&extraction.snapshot, &extraction.bitmaps, &proposal, target)?;
            Ok((extraction.snapshot, proposal, outcome))
        })
        .await;
        let (snapshot, proposal, outcome) = match applied {
            Ok(v) => v,
            Err(err) => {
                trace.fail(FailureReason::Internal(err.to_string()));
                return Err(err);
            }
        };

        trace.advance(PipelineState::Done);
        tracing::info!(
            layers = snapshot.layers.len(),
            attempts = reply.attempts,
            warnings = outcome.warnings.len(),
            "layout applied"
        );
        let report = LayoutReport {
            original_size: original,
            target_size: target,
            layer_count: snapshot.layers.len(),
            oracle_attempts: reply.attempts,
            recovery_tier: validated.tier,
            layers: outcome.layers,
            warnings: outcome.warnings,
            validation_warnings: validated.warnings,
            states: trace.states().to_vec(),
        };
        Ok(LayoutResult {
            canvas: outcome.canvas,
            report,
            proposal,
        })
    }
}

async fn blocking<T, F>(f: F) -> RefitResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> RefitResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("pipeline worker task failed")?
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
