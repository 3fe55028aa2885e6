//! Stable JSON canonicalization and block hashing (§4.9, §9 Design Notes,
//! §8 round-trip law: `stable_stringify(x) = stable_stringify(y) ⇔
//! block_hash(x) = block_hash(y)`).

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonicalizes `value` by recursively sorting object keys; array order is
/// preserved; scalars are encoded as plain JSON. Returns the resulting
/// compact JSON string.
pub fn stable_stringify(value: &Value) -> String {
    let canon = canonicalize(value);
    serde_json::to_string(&canon).expect("canonical json never fails to serialize")
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 of the canonical stringification, hex-encoded.
pub fn block_hash(value: &Value) -> String {
    let canon = stable_stringify(value);
    let digest = Sha256::digest(canon.as_bytes());
    hex::encode(digest)
}

/// SHA-256 of raw text bytes, hex-encoded. Used for `articles.content_sha256`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_stringify_is_independent_of_key_order() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn stable_stringify_preserves_array_order() {
        let a = json!({"x": [1, 2, 3]});
        let b = json!({"x": [3, 2, 1]});
        assert_ne!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn block_hash_matches_iff_stable_stringify_matches() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        let c = json!({"a": 2, "b": 2});
        assert_eq!(block_hash(&a), block_hash(&b));
        assert_ne!(block_hash(&a), block_hash(&c));
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }
}
