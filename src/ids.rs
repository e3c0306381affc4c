// Prefixed entity id generation
use uuid::Uuid;

pub const RECORDING: &str = "rec";
pub const RUN: &str = "run";
pub const CHUNK: &str = "chk";
pub const ARTIFACT: &str = "art";
pub const SEMAPHORE: &str = "sem";
pub const BATCH: &str = "batch";

/// Generate a prefixed id, e.g. `rec_3f2a...`
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_has_prefix() {
        let id = generate_id(RECORDING);
        assert!(id.starts_with("rec_"));
        assert!(id.len() > 10);
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id(RUN), generate_id(RUN));
    }
}
