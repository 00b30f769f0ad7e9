use std::time::Duration;

/// Convenience result type used across refit.
pub type RefitResult<T> = Result<T, RefitError>;

/// Top-level error taxonomy for a layout-adaptation run.
#[derive(thiserror::Error, Debug)]
pub enum RefitError {
    /// The input document could not be read or is structurally invalid. Never retried.
    #[error("document error: {0}")]
    Document(String),

    /// The oracle failed and the retry budget (if any) is exhausted.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// The oracle replied, but no JSON layout could be recovered from the reply.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid caller-supplied configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Raster production or encoding failed.
    #[error("render error: {0}")]
    Render(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RefitError {
    /// Build a [`RefitError::Document`] value.
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Build a [`RefitError::Document`] from an error chain, keeping every context layer.
    pub fn document_from(err: anyhow::Error) -> Self {
        Self::Document(format!("{err:#}"))
    }

    /// Build a [`RefitError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`RefitError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

/// Failure modes of a single oracle round trip.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The attempt did not finish inside its wall-clock deadline.
    #[error("oracle request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider rejected the call for rate or quota reasons.
    #[error("oracle quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Connection, transport or 5xx failure.
    #[error("transient oracle failure: {0}")]
    TransientNetwork(String),

    /// Bad credentials, malformed request, or an unusable reply. Never retried.
    #[error("fatal oracle failure: {0}")]
    Fatal(String),
}

impl OracleError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// No JSON layout array could be recovered from the oracle reply.
///
/// The raw reply is kept verbatim so callers can persist it for diagnosis.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "oracle reply ({} bytes) holds no parseable JSON layout array; raw reply preserved",
    .raw.len()
)]
pub struct ValidationError {
    raw: String,
}

impl ValidationError {
    /// Wrap an unparseable oracle reply.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The oracle reply exactly as received.
    pub fn raw_response(&self) -> &str {
        &self.raw
    }

    /// Take ownership of the preserved reply.
    pub fn into_raw_response(self) -> String {
        self.raw
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
