// Analysis semaphore repository for workshop-scribe
// A lease table bounding concurrent calls to the external analysis service.
// Slots carry a TTL so a crashed holder cannot deadlock the gate.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection};

use super::models::SemaphoreSlot;
use super::DatabaseManager;
use crate::ids;

impl DatabaseManager {
    /// Try to acquire a slot. Purges expired slots first, then inserts a
    /// new lease only when fewer than `max_concurrent` are active.
    /// Returns None when the gate is full.
    ///
    /// The count-then-insert window is an accepted approximation: slots
    /// are leases with TTL, not hard locks.
    pub fn acquire_slot(
        &self,
        org_id: &str,
        acquired_by: &str,
        max_concurrent: i64,
        ttl_seconds: i64,
    ) -> Result<Option<SemaphoreSlot>> {
        self.with_connection(|conn| {
            acquire_slot_impl(conn, org_id, acquired_by, max_concurrent, ttl_seconds)
        })
    }

    /// Release a slot by deleting its lease
    pub fn release_slot(&self, org_id: &str, slot_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM analysis_semaphore WHERE id = ? AND org_id = ?",
                params![slot_id, org_id],
            )
            .context("Failed to release semaphore slot")?;
            Ok(())
        })
    }

    /// Count active (non-expired) slots for the org
    pub fn count_active_slots(&self, org_id: &str) -> Result<i64> {
        self.with_connection(|conn| count_active_impl(conn, org_id))
    }
}

fn acquire_slot_impl(
    conn: &Connection,
    org_id: &str,
    acquired_by: &str,
    max_concurrent: i64,
    ttl_seconds: i64,
) -> Result<Option<SemaphoreSlot>> {
    clean_expired_impl(conn, org_id)?;

    let active = count_active_impl(conn, org_id)?;
    if active >= max_concurrent {
        return Ok(None);
    }

    let id = ids::generate_id(ids::SEMAPHORE);
    let now = Utc::now();
    let acquired_at = now.to_rfc3339();
    let expires_at = (now + ChronoDuration::seconds(ttl_seconds)).to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO analysis_semaphore (id, org_id, acquired_by, acquired_at, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![id, org_id, acquired_by, acquired_at, expires_at],
    )
    .context("Failed to insert semaphore slot")?;

    Ok(Some(SemaphoreSlot {
        id,
        org_id: org_id.to_string(),
        acquired_by: acquired_by.to_string(),
        acquired_at,
        expires_at,
    }))
}

fn clean_expired_impl(conn: &Connection, org_id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "DELETE FROM analysis_semaphore WHERE org_id = ? AND expires_at < ?",
        params![org_id, now],
    )
    .context("Failed to clean expired semaphore slots")?;
    Ok(())
}

fn count_active_impl(conn: &Connection, org_id: &str) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM analysis_semaphore WHERE org_id = ? AND expires_at >= ?",
            params![org_id, now],
            |row| row.get(0),
        )
        .context("Failed to count active semaphore slots")?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_up_to_capacity() {
        let db = DatabaseManager::open_in_memory().unwrap();

        let first = db.acquire_slot("org_1", "rec-chunk-0", 2, 300).unwrap();
        let second = db.acquire_slot("org_1", "rec-chunk-1", 2, 300).unwrap();
        let third = db.acquire_slot("org_1", "rec-chunk-2", 2, 300).unwrap();

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(third.is_none());
        assert_eq!(db.count_active_slots("org_1").unwrap(), 2);
    }

    #[test]
    fn test_release_frees_capacity() {
        let db = DatabaseManager::open_in_memory().unwrap();

        let slot = db
            .acquire_slot("org_1", "rec-summarize", 1, 300)
            .unwrap()
            .unwrap();
        assert!(db.acquire_slot("org_1", "other", 1, 300).unwrap().is_none());

        db.release_slot("org_1", &slot.id).unwrap();
        assert!(db.acquire_slot("org_1", "other", 1, 300).unwrap().is_some());
    }

    #[test]
    fn test_expired_slot_is_garbage_collected() {
        let db = DatabaseManager::open_in_memory().unwrap();

        // TTL of zero: the lease is already expired by the next acquire
        let slot = db.acquire_slot("org_1", "crashed", 1, 0).unwrap();
        assert!(slot.is_some());

        std::thread::sleep(std::time::Duration::from_millis(5));

        let next = db.acquire_slot("org_1", "recovered", 1, 300).unwrap();
        assert!(next.is_some());
        assert_eq!(db.count_active_slots("org_1").unwrap(), 1);
    }

    #[test]
    fn test_slots_scoped_by_org() {
        let db = DatabaseManager::open_in_memory().unwrap();

        assert!(db.acquire_slot("org_1", "a", 1, 300).unwrap().is_some());
        assert!(db.acquire_slot("org_2", "b", 1, 300).unwrap().is_some());
    }
}
