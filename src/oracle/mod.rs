//! The layout oracle: an external model that proposes where each layer should go.
//!
//! The pipeline only sees [`LayoutOracle`]. [`gemini::GeminiOracle`] talks to the Gemini
//! `generateContent` API; [`ReplayOracle`] returns canned text for offline runs and tests.

use async_trait::async_trait;

use crate::foundation::error::OracleError;

/// Gemini HTTP oracle.
pub mod gemini;
/// Deadline, backoff and retry loop.
pub mod retry;

pub use retry::{OracleReply, RetryPolicy, send_with_retry};

/// One round trip to a layout oracle.
#[async_trait]
pub trait LayoutOracle: Send + Sync {
    /// Send the instruction text and the PNG detection image; return the raw reply text.
    async fn send_layout(&self, prompt: &str, detection_png: &[u8]) -> Result<String, OracleError>;
}

/// Oracle that always answers with the same text.
#[derive(Clone, Debug)]
pub struct ReplayOracle {
    reply: String,
}

impl ReplayOracle {
    /// Oracle replying with `reply` on every call.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl LayoutOracle for ReplayOracle {
    async fn send_layout(
        &self,
        _prompt: &str,
        _detection_png: &[u8],
    ) -> Result<String, OracleError> {
        Ok(self.reply.clone())
    }
}
