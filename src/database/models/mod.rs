// Database models for workshop-scribe

mod artifact;
mod chunk;
mod recording;
mod run;
mod semaphore;
mod upload;

pub use artifact::{Artifact, ArtifactKind};
pub use chunk::RecordingChunk;
pub use recording::{InvalidStatusTransition, Recording, RecordingStatus};
pub use run::{ProcessingRun, RunStatus};
pub use semaphore::SemaphoreSlot;
pub use upload::{BatchStatus, ImportBatch, UploadState};
