// HTTP analysis provider
//
// Talks to an analysis service over a small JSON API. No vendor-specific
// shape is assumed beyond: audio reference in, segments out; text in,
// summary or claims out.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::provider::{AnalysisError, AnalysisProvider, SummaryBody, TranscriptionResult};
use crate::transcript::{Claim, TranscriptSegment};

/// Default wait when the service rate-limits without a Retry-After hint
const DEFAULT_RETRY_AFTER_MS: u64 = 30_000;

/// HTTP provider configuration
#[derive(Debug, Clone)]
pub struct HttpAnalysisConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for HttpAnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8500".to_string(),
            api_key: String::new(),
            model: "scribe-large".to_string(),
            timeout_secs: 600,
        }
    }
}

pub struct HttpAnalysisProvider {
    config: HttpAnalysisConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    audio_url: &'a str,
    mime_type: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    language: Option<String>,
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    #[serde(default)]
    segment_id: Option<String>,
    speaker: String,
    start_ms: i64,
    end_ms: i64,
    text: String,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    short_summary: String,
    long_summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default)]
    open_items: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsResponse {
    claims: Vec<Claim>,
}

impl HttpAnalysisProvider {
    pub fn new(config: HttpAnalysisConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
        context: &str,
    ) -> Result<Resp, AnalysisError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::RequestFailed(format!("{}: {}", context, e)))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            log::warn!(
                "Analysis service rate limited during {}, retry after {}ms",
                context,
                retry_after_ms
            );
            return Err(AnalysisError::RateLimited { retry_after_ms });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalysisError::AuthenticationFailed(format!(
                "{} returned {}",
                context, status
            )));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RequestFailed(format!(
                "{} returned {}: {}",
                context,
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(format!("{}: {}", context, e)))
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn transcribe(
        &self,
        audio_url: &str,
        mime_type: &str,
    ) -> Result<TranscriptionResult, AnalysisError> {
        let request = TranscribeRequest {
            audio_url,
            mime_type,
            model: &self.config.model,
        };

        let response: TranscribeResponse = self
            .post_json("/v1/transcribe", &request, "transcription")
            .await?;

        let segments = response
            .segments
            .into_iter()
            .enumerate()
            .map(|(index, seg)| {
                if seg.end_ms < seg.start_ms {
                    return Err(AnalysisError::InvalidResponse(format!(
                        "segment {} ends before it starts",
                        index
                    )));
                }
                Ok(TranscriptSegment {
                    segment_id: seg
                        .segment_id
                        .unwrap_or_else(|| format!("seg-{:04}", index + 1)),
                    speaker: seg.speaker,
                    start_ms: seg.start_ms,
                    end_ms: seg.end_ms,
                    text: seg.text,
                    confidence: seg.confidence.clamp(0.0, 1.0),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TranscriptionResult {
            language: response.language.unwrap_or_else(|| "en".to_string()),
            segments,
        })
    }

    async fn summarize(&self, transcript_text: &str) -> Result<SummaryBody, AnalysisError> {
        let request = TextRequest {
            text: transcript_text,
            model: &self.config.model,
        };

        let response: SummaryResponse = self
            .post_json("/v1/summarize", &request, "summarization")
            .await?;

        Ok(SummaryBody {
            short_summary: response.short_summary,
            long_summary: response.long_summary,
            key_points: response.key_points,
            decisions: response.decisions,
            open_items: response.open_items,
        })
    }

    async fn extract_claims(&self, transcript_text: &str) -> Result<Vec<Claim>, AnalysisError> {
        let request = TextRequest {
            text: transcript_text,
            model: &self.config.model,
        };

        let response: ClaimsResponse = self
            .post_json("/v1/claims", &request, "claims extraction")
            .await?;

        Ok(response.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_segment_parsing() {
        let json = r#"{
            "language": "en",
            "segments": [
                {"speaker": "S1", "start_ms": 0, "end_ms": 1500, "text": "hello", "confidence": 0.93}
            ]
        }"#;
        let parsed: TranscribeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].speaker, "S1");
        assert!(parsed.segments[0].segment_id.is_none());
    }

    #[test]
    fn test_summary_defaults_for_optional_lists() {
        let json = r#"{"short_summary": "s", "long_summary": "l"}"#;
        let parsed: SummaryResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.key_points.is_empty());
        assert!(parsed.decisions.is_empty());
    }
}
