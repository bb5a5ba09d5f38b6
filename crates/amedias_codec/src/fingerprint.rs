//! Non-cryptographic change-detection fingerprints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical JSON serialization of a state.
///
/// Object keys come out sorted; array order is preserved, so fingerprints are
/// order-sensitive where order carries meaning.
pub fn canonical_json(state: &Value) -> String {
    state.to_string()
}

/// A short digest of a state's canonical serialization.
///
/// Equal serializations always produce equal fingerprints. Fingerprints only
/// gate change detection; they are not a MAC and collisions are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a state.
    pub fn of(state: &Value) -> Self {
        Self(hash_text(&canonical_json(state)))
    }

    /// Wraps a fingerprint received from elsewhere (for example a URL).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `state` hashes to this fingerprint.
    pub fn matches(&self, state: &Value) -> bool {
        *self == Self::of(state)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a state.
pub fn fingerprint(state: &Value) -> Fingerprint {
    Fingerprint::of(state)
}

/// 32-bit shift-and-add hash over UTF-16 code units, rendered in base 36.
///
/// `h = h * 31 + unit` with wrapping `i32` arithmetic, then the absolute
/// value. Only fingerprints computed from the same canonical text compare
/// equal; a digest made by another serializer (different key order or number
/// formatting, such as `61` against `61.0`) is not comparable.
fn hash_text(text: &str) -> String {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    to_base36(i64::from(hash).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn hash_known_values() {
        assert_eq!(hash_text(""), "0");
        assert_eq!(hash_text("a"), "2p");
        assert_eq!(hash_text("ab"), "2e9");
    }

    #[test]
    fn hash_wraps_and_takes_absolute_value() {
        let long = "z".repeat(500);
        let digest = hash_text(&long);
        assert!(!digest.starts_with('-'));
        assert!(digest.len() <= 7);
    }

    #[test]
    fn base36_extremes() {
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(2_147_483_648), "zik0zk");
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn fingerprint_is_order_sensitive_for_arrays() {
        let a = json!({"reimbursements": [1, 2]});
        let b = json!({"reimbursements": [2, 1]});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = json!({"calc": {"nomina1": 1800, "nomina2": 1500}});
        let changed = json!({"calc": {"nomina1": 1800, "nomina2": 1501}});
        assert_ne!(fingerprint(&base), fingerprint(&changed));
        assert!(fingerprint(&base).matches(&base));
        assert!(!fingerprint(&base).matches(&changed));
    }

    #[test]
    fn integer_and_float_forms_are_not_comparable() {
        assert_eq!(canonical_json(&json!({"importe": 61.0})), r#"{"importe":61.0}"#);
        assert_ne!(
            Fingerprint::of(&json!({"importe": 61})),
            Fingerprint::of(&json!({"importe": 61.0}))
        );
    }

    #[test]
    fn fingerprint_display_and_raw() {
        let fp = fingerprint(&json!("a"));
        assert_eq!(Fingerprint::from_raw(fp.as_str()), fp);
        assert_eq!(fp.to_string(), fp.as_str());
    }

    proptest! {
        #[test]
        fn equal_serializations_give_equal_fingerprints(
            n1 in 0u32..100_000,
            n2 in 0u32..100_000,
            tab in "[a-z]{1,8}",
        ) {
            let a = json!({"activeTab": tab, "calc": {"nomina1": n1, "nomina2": n2}});
            let b: Value = serde_json::from_str(&a.to_string()).unwrap();
            prop_assert_eq!(fingerprint(&a), fingerprint(&b));
        }
    }
}
