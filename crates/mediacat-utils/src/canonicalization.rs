//! Canonical JSON serialization (RFC 8785 / JCS), used wherever two
//! serializations of the same logical value must compare byte-equal —
//! notably the Stage-1 structured-text round-trip fixed point and the
//! content-hash used for batch `custom_id` generation.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CanonicalizationError {
    #[error("failed to serialize value to JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to canonicalize JSON: {0}")]
    Canonicalize(String),
}

/// Serialize `value` to JCS canonical JSON text.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalizationError> {
    let json_value = serde_json::to_value(value)?;
    serde_json_canonicalizer::to_string(&json_value)
        .map_err(|e| CanonicalizationError::Canonicalize(e.to_string()))
}

/// Content hash (blake3 hex) of the canonical form of `value`. Used to build
/// stable batch `custom_id`s: `"{stage_tag}_{index}_{hash(payload)}"`.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, CanonicalizationError> {
    let canonical = to_canonical_json(value)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        b: u32,
        a: u32,
    }

    #[test]
    fn canonical_json_is_deterministic_regardless_of_field_order() {
        let a = to_canonical_json(&Sample { b: 1, a: 2 }).unwrap();
        let b = to_canonical_json(&serde_json::json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_is_stable_for_equal_values() {
        let h1 = content_hash(&Sample { a: 1, b: 2 }).unwrap();
        let h2 = content_hash(&serde_json::json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(h1, h2);
    }
}
