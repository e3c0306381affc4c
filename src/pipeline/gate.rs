// Concurrency gate for the external analysis service
//
// A cooperative wait loop over the shared semaphore lease table. The
// external service is the scarce resource, so every call site acquires
// a slot first and releases it when the call returns.

use anyhow::Result;
use std::time::Duration;

use crate::database::models::SemaphoreSlot;
use crate::database::DatabaseManager;

/// Gate parameters
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Maximum in-flight analysis calls per org
    pub max_concurrent: i64,
    /// Lease lifetime; a crashed holder frees itself after this
    pub ttl_seconds: i64,
    /// Sleep between failed acquire attempts
    pub wait_interval: Duration,
    /// Give up after this many failed attempts
    pub max_wait_attempts: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            ttl_seconds: 600,
            wait_interval: Duration::from_secs(10),
            max_wait_attempts: 30,
        }
    }
}

/// Acquire a slot, waiting and retrying while the gate is full.
/// Exhausting the wait bound is a hard failure for the calling step,
/// surfaced to that step's retry policy.
pub async fn acquire_slot(
    db: &DatabaseManager,
    org_id: &str,
    holder: &str,
    config: &GateConfig,
) -> Result<SemaphoreSlot> {
    let mut attempts = 0u32;

    loop {
        if let Some(slot) =
            db.acquire_slot(org_id, holder, config.max_concurrent, config.ttl_seconds)?
        {
            return Ok(slot);
        }

        attempts += 1;
        if attempts >= config.max_wait_attempts {
            anyhow::bail!(
                "Failed to acquire analysis slot for {} after {} attempts",
                holder,
                attempts
            );
        }

        log::debug!(
            "Analysis gate full, waiting {:?} before retry {} (holder {})",
            config.wait_interval,
            attempts,
            holder
        );
        tokio::time::sleep(config.wait_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_gate(max_concurrent: i64, max_wait_attempts: u32) -> GateConfig {
        GateConfig {
            max_concurrent,
            ttl_seconds: 300,
            wait_interval: Duration::from_millis(5),
            max_wait_attempts,
        }
    }

    #[tokio::test]
    async fn test_acquire_immediate_when_free() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let slot = acquire_slot(&db, "org_1", "rec-chunk-0", &fast_gate(2, 3))
            .await
            .unwrap();
        assert_eq!(slot.acquired_by, "rec-chunk-0");
    }

    #[tokio::test]
    async fn test_wait_bound_is_hard_failure() {
        let db = DatabaseManager::open_in_memory().unwrap();
        db.acquire_slot("org_1", "holder-a", 1, 300).unwrap();

        let result = acquire_slot(&db, "org_1", "holder-b", &fast_gate(1, 3)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_acquire_after_release() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let held = db.acquire_slot("org_1", "holder-a", 1, 300).unwrap().unwrap();

        // Release while another task is waiting on the gate
        db.release_slot("org_1", &held.id).unwrap();

        let slot = acquire_slot(&db, "org_1", "holder-b", &fast_gate(1, 5))
            .await
            .unwrap();
        assert_eq!(slot.acquired_by, "holder-b");
    }
}
