//! Fingerprint signature canonicalization and hashing (spec.md §4.2 step 6,
//! §8 property 1).
//!
//! The signature is sorted JSON so that two shipments with the same
//! multiset of `(collection, qty)` and the same total weight always hash
//! identically, regardless of the order collections were discovered in.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Round to one decimal place the way spec.md §4.2 step 6 requires for
/// `totalWeight`.
pub fn round_1dp(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Build the canonical signature string: collection ids sorted ascending,
/// each mapped to its total quantity, followed by a final `"weight"` key.
///
/// `collection_quantities` need not be pre-sorted — `BTreeMap` does that.
pub fn build_signature(collection_quantities: &BTreeMap<String, i64>, total_weight: f64) -> String {
    let mut parts: Vec<String> = collection_quantities
        .iter()
        .map(|(collection, qty)| format!("\"{}\":{}", collection, qty))
        .collect();
    parts.push(format!("\"weight\":{}", format_weight(total_weight)));
    format!("{{{}}}", parts.join(","))
}

/// Render a weight as spec.md's worked examples do: integral weights print
/// without a trailing `.0` (e.g. `104`, not `104.0`); fractional weights
/// keep exactly one decimal place since `total_weight` is always pre-rounded
/// by `round_1dp`.
fn format_weight(weight: f64) -> String {
    let rounded = round_1dp(weight);
    if (rounded.fract()).abs() < f64::EPSILON {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}

/// First 32 hex chars (128 bits) of the SHA-256 digest of `signature`
/// (spec.md §4.2 step 6, §9 open question).
pub fn hash_signature(signature: &str) -> String {
    let digest = Sha256::digest(signature.as_bytes());
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_under_input_permutation() {
        let mut a = BTreeMap::new();
        a.insert("C_JERKY".to_string(), 8);
        a.insert("C_TREATS".to_string(), 3);

        let mut b = BTreeMap::new();
        b.insert("C_TREATS".to_string(), 3);
        b.insert("C_JERKY".to_string(), 8);

        assert_eq!(build_signature(&a, 104.0), build_signature(&b, 104.0));
        assert_eq!(hash_signature(&build_signature(&a, 104.0)), hash_signature(&build_signature(&b, 104.0)));
    }

    #[test]
    fn matches_worked_example_s1() {
        let mut collections = BTreeMap::new();
        collections.insert("C_JERKY".to_string(), 8);
        let sig = build_signature(&collections, 104.0);
        assert_eq!(sig, r#"{"C_JERKY":8,"weight":104}"#);
    }

    #[test]
    fn hash_is_32_hex_chars() {
        let mut collections = BTreeMap::new();
        collections.insert("C_JERKY".to_string(), 8);
        let sig = build_signature(&collections, 104.0);
        let hash = hash_signature(&sig);
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_multisets_hash_differently() {
        let mut a = BTreeMap::new();
        a.insert("C_JERKY".to_string(), 8);
        let mut b = BTreeMap::new();
        b.insert("C_JERKY".to_string(), 9);
        assert_ne!(
            hash_signature(&build_signature(&a, 104.0)),
            hash_signature(&build_signature(&b, 104.0))
        );
    }

    #[test]
    fn round_1dp_matches_spec_rounding() {
        assert_eq!(round_1dp(103.96), 104.0);
        assert_eq!(round_1dp(103.94), 103.9);
    }
}
