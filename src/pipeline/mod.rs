// Processing pipeline for workshop-scribe

pub mod gate;
mod orchestrator;
pub mod policy;
mod steps;

pub use gate::GateConfig;
pub use orchestrator::{Pipeline, PipelineConfig, PipelineOutcome};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed, ordered list of pipeline steps
pub const STEP_ORDER: [StepName; 11] = [
    StepName::LoadMetadata,
    StepName::EnsureAudioAccess,
    StepName::MaybeSplitAudio,
    StepName::TranscribeChunks,
    StepName::MergeTranscripts,
    StepName::Summarize,
    StepName::ClaimsExtract,
    StepName::Group,
    StepName::IndexForSearch,
    StepName::Notify,
    StepName::Finalize,
];

/// One named stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    LoadMetadata,
    EnsureAudioAccess,
    MaybeSplitAudio,
    TranscribeChunks,
    MergeTranscripts,
    Summarize,
    ClaimsExtract,
    Group,
    IndexForSearch,
    Notify,
    Finalize,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::LoadMetadata => "load_metadata",
            StepName::EnsureAudioAccess => "ensure_audio_access",
            StepName::MaybeSplitAudio => "maybe_split_audio",
            StepName::TranscribeChunks => "transcribe_chunks",
            StepName::MergeTranscripts => "merge_transcripts",
            StepName::Summarize => "summarize",
            StepName::ClaimsExtract => "claims_extract",
            StepName::Group => "group",
            StepName::IndexForSearch => "index_for_search",
            StepName::Notify => "notify",
            StepName::Finalize => "finalize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        STEP_ORDER.iter().copied().find(|step| step.as_str() == s)
    }

    /// Position in the fixed step order
    pub fn index(&self) -> usize {
        STEP_ORDER
            .iter()
            .position(|step| step == self)
            .expect("step is in STEP_ORDER")
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_round_trip() {
        for (i, step) in STEP_ORDER.iter().enumerate() {
            assert_eq!(step.index(), i);
            assert_eq!(StepName::parse(step.as_str()), Some(*step));
        }
        assert_eq!(StepName::parse("bogus"), None);
    }

    #[test]
    fn test_finalize_is_last() {
        assert_eq!(STEP_ORDER.last(), Some(&StepName::Finalize));
    }
}
