//! Hashing - SHA-256 Fingerprints
//!
//! Content addresses for exported images and reproducible job hashes.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::templates::Template;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of one generation request.
///
/// job_hash = sha256(canonical_template + student_name + engine_version).
/// `savedAt` is excluded so re-saving an unchanged layout keeps the hash.
pub fn compute_job_hash(template: &Template, student_name: &str, engine_version: &str) -> Result<String, serde_json::Error> {
    let mut layout = serde_json::to_value(template)?;
    if let Some(obj) = layout.as_object_mut() {
        obj.remove("savedAt");
    }
    let combined = format!("{}:{}:{}", canonical_json(&layout)?, student_name, engine_version);
    Ok(sha256_hex(combined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": {"y": 2, "b": 3}, "m": [{"k": 1, "c": 2}]});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":{"b":3,"y":2},"m":[{"c":2,"k":1}],"z":1}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_job_hash_ignores_saved_at() {
        let mut t = Template::empty("t", "T");
        let h1 = compute_job_hash(&t, "Ada", "1.0.0").unwrap();
        t.saved_at = Some(Utc::now());
        assert_eq!(compute_job_hash(&t, "Ada", "1.0.0").unwrap(), h1);
        assert_ne!(compute_job_hash(&t, "Grace", "1.0.0").unwrap(), h1);
        t.name_placeholder.x += 1.0;
        assert_ne!(compute_job_hash(&t, "Ada", "1.0.0").unwrap(), h1);
    }
}
