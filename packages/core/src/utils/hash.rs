use highway::{HighwayHash, HighwayHasher, Key};
use std::collections::HashMap;

/// Fixed key so digests stay stable across processes and versions.
/// Renderers key change-detection off these hashes.
pub const DIGEST_KEY: Key = Key([
    0x0123456789abcdfe,
    0xfedcba9876543210,
    0x0011223344556677,
    0x8899aabbccddeeff,
]);

/// Reference key for the interned empty string. Interning never stores the
/// empty string itself; resolution special-cases this key instead.
pub const EMPTY_REF: &str = "16248035215404677707";

pub fn digest_hasher() -> HighwayHasher {
    HighwayHasher::new(DIGEST_KEY)
}

/// Stable, non-cryptographic 64-bit hash for schema-reference interning.
pub fn hash_string_non_cryptographic(s: &str) -> u64 {
    let mut hasher = digest_hasher();
    hasher.append(s.as_bytes());
    hasher.finalize64()
}

/// Intern `s` into `refs`, returning the reference key. The empty string
/// maps to the sentinel without touching the table.
pub fn intern(refs: &mut HashMap<String, String>, s: &str) -> String {
    if s.is_empty() {
        return EMPTY_REF.to_string();
    }
    let key = hash_string_non_cryptographic(s).to_string();
    refs.entry(key.clone()).or_insert_with(|| s.to_string());
    key
}

/// Resolve a reference key against `refs`. Raw strings that never went
/// through the interner pass through unchanged.
pub fn resolve_ref<'a>(key: &'a str, refs: &'a HashMap<String, String>) -> &'a str {
    if key == EMPTY_REF {
        return "";
    }
    refs.get(key).map(|s| s.as_str()).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_roundtrip() {
        let mut refs = HashMap::new();
        let schema = r#"{"type":"object"}"#;
        let key = intern(&mut refs, schema);
        assert_ne!(key, schema);
        assert_eq!(resolve_ref(&key, &refs), schema);
    }

    #[test]
    fn empty_string_uses_sentinel() {
        let mut refs = HashMap::new();
        let key = intern(&mut refs, "");
        assert_eq!(key, EMPTY_REF);
        assert!(refs.is_empty());
        assert_eq!(resolve_ref(EMPTY_REF, &refs), "");
    }

    #[test]
    fn raw_strings_pass_through() {
        let refs = HashMap::new();
        assert_eq!(resolve_ref("not interned", &refs), "not interned");
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(
            hash_string_non_cryptographic("stable"),
            hash_string_non_cryptographic("stable")
        );
        assert_ne!(
            hash_string_non_cryptographic("a"),
            hash_string_non_cryptographic("b")
        );
    }
}
