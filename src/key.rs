//! Deterministic cache key derivation.
//!
//! Keys are SHA-256 digests over a canonical length-prefixed encoding of
//! `(model_id, input)`. Folding the model id into the digest means a model
//! upgrade invalidates old entries without any manual flush, and the raw
//! input never appears in the shared store's keyspace.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::KeyDerivationError;

/// Digest length in bytes.
pub const KEY_LEN: usize = 32;

/// An opaque, collision-resistant cache key.
///
/// Immutable once derived; equal `(input, model_id)` pairs always produce
/// the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; KEY_LEN]);

impl CacheKey {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Key under which the entry lives in the shared store.
    pub fn storage_key(&self) -> String {
        format!("memo:{}", hex::encode(self.0))
    }

    /// Key under which the stampede lease for this entry lives.
    ///
    /// Separate namespace so a lease can never shadow a value.
    pub fn lock_key(&self) -> String {
        format!("memo:lock:{}", hex::encode(self.0))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars are plenty for log correlation.
        write!(f, "CacheKey({}…)", &hex::encode(self.0)[..8])
    }
}

/// Derives cache keys for one model's entries.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    model_id: String,
}

impl KeyDeriver {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Derive the key for an input under this deriver's model.
    ///
    /// Pure and deterministic. Each field is prefixed with its `u32`
    /// little-endian byte length, so `("ab", "c")` and `("a", "bc")` can
    /// never collide. Fields longer than `u32::MAX` bytes are a
    /// non-retryable encoding error.
    pub fn derive(&self, input: &str) -> Result<CacheKey, KeyDerivationError> {
        let model = self.model_id.as_bytes();
        let data = input.as_bytes();

        let model_len = u32::try_from(model.len())
            .map_err(|_| KeyDerivationError::ModelIdTooLarge(model.len()))?;
        let data_len = u32::try_from(data.len())
            .map_err(|_| KeyDerivationError::InputTooLarge(data.len()))?;

        let mut hasher = Sha256::new();
        hasher.update(model_len.to_le_bytes());
        hasher.update(model);
        hasher.update(data_len.to_le_bytes());
        hasher.update(data);

        Ok(CacheKey(hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_key() {
        let deriver = KeyDeriver::new("model-a");
        let k1 = deriver.derive("hello").unwrap();
        let k2 = deriver.derive("hello").unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_model_change_changes_key() {
        let a = KeyDeriver::new("model-a");
        let b = KeyDeriver::new("model-b");
        assert_ne!(a.derive("hello").unwrap(), b.derive("hello").unwrap());
    }

    #[test]
    fn test_distinct_inputs_distinct_keys() {
        let deriver = KeyDeriver::new("model-a");
        assert_ne!(
            deriver.derive("hello").unwrap(),
            deriver.derive("world").unwrap()
        );
    }

    #[test]
    fn test_length_prefix_prevents_boundary_ambiguity() {
        // Without length prefixes these would hash the same byte stream.
        let a = KeyDeriver::new("ab");
        let b = KeyDeriver::new("a");
        assert_ne!(a.derive("c").unwrap(), b.derive("bc").unwrap());
    }

    #[test]
    fn test_storage_and_lock_keys_disjoint() {
        let key = KeyDeriver::new("m").derive("x").unwrap();
        assert!(key.storage_key().starts_with("memo:"));
        assert!(key.lock_key().starts_with("memo:lock:"));
        assert_ne!(key.storage_key(), key.lock_key());
        // 32-byte digest renders as 64 hex chars.
        assert_eq!(key.to_string().len(), 64);
    }
}
