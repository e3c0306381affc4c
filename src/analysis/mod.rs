// External analysis service integration for workshop-scribe

mod http;
mod provider;

pub use http::{HttpAnalysisConfig, HttpAnalysisProvider};
pub use provider::{AnalysisError, AnalysisProvider, SummaryBody, TranscriptionResult};
