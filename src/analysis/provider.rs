// Analysis provider trait and types
//
// Defines the interface to the external transcription/analysis service.
// The service receives a time-limited audio URL plus mime type and
// returns structured speech segments; transcript text goes back in for
// summaries and stance-tagged claims.

use async_trait::async_trait;
use std::fmt;

use crate::transcript::{Claim, TranscriptSegment};

/// Error types for analysis service calls.
///
/// Rate limiting is its own variant so callers can honor the service's
/// retry-after hint instead of treating it like a generic failure.
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// The service throttled the request; wait at least this long
    RateLimited { retry_after_ms: u64 },
    /// API key missing or rejected
    AuthenticationFailed(String),
    /// Request failed (network, timeout, 5xx)
    RequestFailed(String),
    /// The service answered with a body we cannot use
    InvalidResponse(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::RateLimited { retry_after_ms } => {
                write!(f, "Rate limited, retry after {}ms", retry_after_ms)
            }
            AnalysisError::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            AnalysisError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            AnalysisError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Raw transcription result for one audio chunk. Timestamps are relative
/// to the start of the submitted audio; the caller applies the chunk's
/// global offset.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Summary fields as returned by the service, before being tied to a run
#[derive(Debug, Clone)]
pub struct SummaryBody {
    pub short_summary: String,
    pub long_summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub open_items: Vec<String>,
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Transcribe audio reachable at a time-limited URL
    async fn transcribe(
        &self,
        audio_url: &str,
        mime_type: &str,
    ) -> Result<TranscriptionResult, AnalysisError>;

    /// Produce a structured summary of transcript text
    async fn summarize(&self, transcript_text: &str) -> Result<SummaryBody, AnalysisError>;

    /// Extract stance-tagged claims from transcript text
    async fn extract_claims(&self, transcript_text: &str) -> Result<Vec<Claim>, AnalysisError>;
}
