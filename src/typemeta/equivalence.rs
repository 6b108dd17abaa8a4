// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `EquivalenceHash`: a truncated MD5 digest of a type's serialized
//! `MinimalTypeObject`/`CompleteTypeObject`, used to build `TypeIdentifier`
//! values that don't carry the full object inline.

use std::fmt;

/// 14-byte MD5 prefix identifying a `TypeObject` by content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EquivalenceHash([u8; 14]);

impl EquivalenceHash {
    pub fn from_bytes(bytes: [u8; 14]) -> Self {
        EquivalenceHash(bytes)
    }

    pub fn zero() -> Self {
        EquivalenceHash([0u8; 14])
    }

    pub fn as_bytes(&self) -> &[u8; 14] {
        &self.0
    }

    /// Computes the hash of an already-XCDR2-serialized `TypeObject`
    /// (`xtypes/equivalence.rs`'s `compute`: MD5, truncated to 14 bytes).
    #[cfg(feature = "xtypes")]
    pub fn compute(cdr2_data: &[u8]) -> Self {
        use md5::{Digest, Md5};
        let digest = Md5::digest(cdr2_data);
        let mut bytes = [0u8; 14];
        bytes.copy_from_slice(&digest[..14]);
        EquivalenceHash(bytes)
    }
}

impl fmt::Debug for EquivalenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EquivalenceHash({self})")
    }
}

impl fmt::Display for EquivalenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 14]> for EquivalenceHash {
    fn from(bytes: [u8; 14]) -> Self {
        EquivalenceHash(bytes)
    }
}

impl AsRef<[u8]> for EquivalenceHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_all_zero_bytes() {
        assert_eq!(EquivalenceHash::zero().as_bytes(), &[0u8; 14]);
    }

    #[test]
    fn display_is_lowercase_hex() {
        let h = EquivalenceHash::from_bytes([0xAB; 14]);
        assert_eq!(h.to_string(), "ab".repeat(14));
    }

    #[cfg(feature = "xtypes")]
    #[test]
    fn compute_is_deterministic() {
        let a = EquivalenceHash::compute(b"some type object bytes");
        let b = EquivalenceHash::compute(b"some type object bytes");
        assert_eq!(a, b);
        let c = EquivalenceHash::compute(b"different bytes");
        assert_ne!(a, c);
    }
}
