//! Hash Chain
//!
//! Content-addressed keys for pipeline stages. A key is the truncated SHA-256
//! of the parent key followed by the stage's ordered arguments, each turned
//! into text by [`canonical_string`] and joined with a unit separator.
//!
//! Canonical text rules:
//! - missing parent / JSON null → `None`
//! - booleans → `true` / `false`
//! - integers → decimal digits; floats → shortest round-trip form that always
//!   carries a fraction or exponent (`1.0`, `0.25`, `1e21`)
//! - strings → the string itself, unquoted
//! - arrays and objects → compact JSON with keys sorted
//!
//! A float and the string with the same text produce the same key. Keys are
//! only cache keys, never integrity checks.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const HASH_LENGTH: usize = 20;

/// Text standing in for an absent parent or a null argument.
pub const NONE_TEXT: &str = "None";

const SEPARATOR: char = '\u{1f}';

/// Canonical text of one hash argument.
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => NONE_TEXT.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:?}", n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key of a child entry derived from its parent key and ordered arguments.
pub fn next_hash(parent: Option<&str>, args: &[Value]) -> String {
    let mut base = String::from(parent.unwrap_or(NONE_TEXT));
    for arg in args {
        base.push(SEPARATOR);
        base.push_str(&canonical_string(arg));
    }
    truncated_digest(base.as_bytes())
}

/// Key of a RAW entry, derived from the audio content itself.
pub fn content_digest(bytes: &[u8]) -> String {
    truncated_digest(bytes)
}

fn truncated_digest(bytes: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(bytes));
    digest.truncate(HASH_LENGTH);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_hash_has_fixed_length() {
        let hash = next_hash(None, &[json!("Hello")]);
        assert_eq!(hash.len(), HASH_LENGTH);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let args = [json!(0), json!(false), json!(true)];
        assert_eq!(next_hash(Some("abc"), &args), next_hash(Some("abc"), &args));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(
            next_hash(None, &[json!(true), json!(false)]),
            next_hash(None, &[json!(false), json!(true)])
        );
    }

    #[test]
    fn test_parent_changes_hash() {
        let args = [json!(1.0)];
        assert_ne!(next_hash(Some("a"), &args), next_hash(Some("b"), &args));
        assert_ne!(next_hash(None, &args), next_hash(Some("a"), &args));
    }

    #[test]
    fn test_argument_boundaries_matter() {
        assert_ne!(
            next_hash(None, &[json!("ab"), json!("c")]),
            next_hash(None, &[json!("a"), json!("bc")])
        );
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(canonical_string(&json!(null)), "None");
        assert_eq!(canonical_string(&json!(true)), "true");
        assert_eq!(canonical_string(&json!(-3)), "-3");
        assert_eq!(canonical_string(&json!(1.0)), "1.0");
        assert_eq!(canonical_string(&json!(0.25)), "0.25");
        assert_eq!(canonical_string(&json!("x y")), "x y");
        assert_eq!(canonical_string(&json!({"b": 1, "a": [true]})), r#"{"a":[true],"b":1}"#);
    }

    #[test]
    fn test_float_and_string_collide() {
        assert_eq!(
            next_hash(None, &[json!(1.0)]),
            next_hash(None, &[json!("1.0")])
        );
        assert_ne!(next_hash(None, &[json!(1.0)]), next_hash(None, &[json!(1)]));
    }

    #[test]
    fn test_content_digest() {
        assert_eq!(content_digest(b"abc"), "ba7816bf8f01cfea4141");
    }

    proptest! {
        // Changing any single option value changes the key.
        #[test]
        fn prop_single_option_change_changes_hash(
            values in prop::collection::vec(-1000i64..1000, 1..6),
            index in 0usize..6,
            delta in 1i64..50,
        ) {
            let index = index % values.len();
            let args: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            let mut changed = args.clone();
            changed[index] = json!(values[index] + delta);
            prop_assert_ne!(next_hash(Some("parent"), &args), next_hash(Some("parent"), &changed));
        }
    }
}
