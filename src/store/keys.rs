/// Key layout for Fjall partitions
///
/// Partition structure:
/// - `jobs`: job:{publish_id} -> PublishJob (JSON)
/// - `dedup`: evt:{fingerprint} -> first-seen unix seconds (string)
/// - `metadata`: meta:{key} -> value (string)

/// Encode a job key: job:{publish_id}
pub fn encode_job_key(publish_id: &str) -> Vec<u8> {
    format!("job:{}", publish_id).into_bytes()
}

/// Decode a job key back to its publish_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Encode a dedup key: evt:{fingerprint}
pub fn encode_dedup_key(fingerprint: &str) -> Vec<u8> {
    format!("evt:{}", fingerprint).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
