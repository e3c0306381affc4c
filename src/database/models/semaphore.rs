// Database models - SemaphoreSlot
use serde::{Deserialize, Serialize};

/// An ephemeral concurrency lease. A crashed holder's slot self-expires
/// at `expires_at` instead of deadlocking the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemaphoreSlot {
    pub id: String,
    pub org_id: String,
    pub acquired_by: String,
    pub acquired_at: String,
    pub expires_at: String,
}
