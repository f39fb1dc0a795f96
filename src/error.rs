//! Error taxonomy for the sync and enrichment passes.
//!
//! Components return [`PipelineError`] at their seams so the orchestrators
//! can tell a rate limit from a hard remote failure from a local write
//! failure. The CLI layer wraps everything in `anyhow`.

use std::time::Duration;

use crate::models::RecordId;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// HTTP 429. Retried by the fetcher with the advised delay.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Retry attempts or the total wait budget ran out on a rate limit.
    #[error("rate limit retry budget exhausted after {attempts} attempts ({waited:?} waited)")]
    RateLimitBudgetExhausted { attempts: u32, waited: Duration },

    /// Any other non-success status from the remote API.
    #[error("remote API error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The annotation service failed for one record.
    #[error("annotation failed: {0}")]
    Annotation(String),

    #[error("record not found: {id}")]
    NotFound { id: RecordId },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error came from local persistence rather than the network.
    pub fn is_local(&self) -> bool {
        matches!(self, PipelineError::Io(_) | PipelineError::Serde(_))
    }
}
