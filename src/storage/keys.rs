// Deterministic object-store key layout
//
// Keys encode org, recording and time range so they can be reconstructed
// without a database lookup.

/// Key for the raw uploaded file
pub fn raw_key(org_id: &str, recording_id: &str, file_name: &str) -> String {
    format!("org/{}/recording/{}/raw/{}", org_id, recording_id, file_name)
}

/// Key for a derived audio chunk
pub fn chunk_key(
    org_id: &str,
    recording_id: &str,
    chunk_index: i64,
    start_ms: i64,
    end_ms: i64,
    ext: &str,
) -> String {
    format!(
        "org/{}/recording/{}/chunks/{}_{}_{}.{}",
        org_id, recording_id, chunk_index, start_ms, end_ms, ext
    )
}

/// Key for a run-scoped artifact file
pub fn artifact_key(org_id: &str, recording_id: &str, run_id: &str, file_name: &str) -> String {
    format!(
        "org/{}/recording/{}/runs/{}/{}",
        org_id, recording_id, run_id, file_name
    )
}

/// Extract (org_id, recording_id) from any recording-scoped key
pub fn parse_recording_key(key: &str) -> Option<(String, String)> {
    let mut parts = key.split('/');
    if parts.next()? != "org" {
        return None;
    }
    let org_id = parts.next()?;
    if parts.next()? != "recording" {
        return None;
    }
    let recording_id = parts.next()?;
    if org_id.is_empty() || recording_id.is_empty() {
        return None;
    }
    Some((org_id.to_string(), recording_id.to_string()))
}
