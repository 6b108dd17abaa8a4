// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `TypeIdentifier`: the compact, content-addressed reference to a type
//! used inside `TypeObject`s and `TypeInformation`.
//!
//! Plain (primitive, small-bound string/sequence/array) shapes are
//! "fully-descriptive" and carry their own definition inline; anything
//! larger is instead addressed by an [`EquivalenceHash`] computed over its
//! `MinimalTypeObject`/`CompleteTypeObject` encoding.

use super::equivalence::EquivalenceHash;
use super::type_kind::TK_NONE;

/// `EquivalenceKind`: which flavour of `TypeObject` an `EK_*`-style
/// `TypeIdentifier` variant refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquivalenceKind {
    Minimal,
    Complete,
}

impl EquivalenceKind {
    pub const fn as_u8(self) -> u8 {
        match self {
            EquivalenceKind::Minimal => 0x10,
            EquivalenceKind::Complete => 0x20,
        }
    }
}

/// Bound class for string/sequence `TypeIdentifier`s: `SMALL` fits a bound
/// in a single byte; anything larger needs the `_LARGE` variant's 4-byte
/// bound field.
const SMALL_BOUND_MAX: u32 = u8::MAX as u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeIdentifier {
    /// A base scalar: carries only its `TK_*` tag.
    Primitive(u8),
    StringSmall { bound: u8 },
    StringLarge { bound: u32 },
    WStringSmall { bound: u8 },
    WStringLarge { bound: u32 },
    /// Content-addressed reference to a `MinimalTypeObject`.
    Minimal(EquivalenceHash),
    /// Content-addressed reference to a `CompleteTypeObject`.
    Complete(EquivalenceHash),
    /// A member of a strongly-connected component of mutually-recursive
    /// types (not produced by this compiler; modeled for completeness).
    StronglyConnected { component: EquivalenceHash, member_index: i32 },
}

impl TypeIdentifier {
    pub fn primitive(tk: u8) -> Self {
        TypeIdentifier::Primitive(tk)
    }

    /// Picks `StringSmall`/`StringLarge` from a bound the same way
    /// `xtypes/type_id.rs`'s constructor does: `u8::try_from` deciding the
    /// variant.
    pub fn string(bound: u32) -> Self {
        match u8::try_from(bound) {
            Ok(b) if bound <= SMALL_BOUND_MAX => TypeIdentifier::StringSmall { bound: b },
            _ => TypeIdentifier::StringLarge { bound },
        }
    }

    pub fn wstring(bound: u32) -> Self {
        match u8::try_from(bound) {
            Ok(b) if bound <= SMALL_BOUND_MAX => TypeIdentifier::WStringSmall { bound: b },
            _ => TypeIdentifier::WStringLarge { bound },
        }
    }

    pub fn minimal(hash: EquivalenceHash) -> Self {
        TypeIdentifier::Minimal(hash)
    }

    pub fn complete(hash: EquivalenceHash) -> Self {
        TypeIdentifier::Complete(hash)
    }

    /// A primitive, or a small-bound string/wstring: carries its full
    /// definition inline, with no companion `TypeObject` required.
    pub fn is_fully_descriptive(&self) -> bool {
        matches!(
            self,
            TypeIdentifier::Primitive(_)
                | TypeIdentifier::StringSmall { .. }
                | TypeIdentifier::WStringSmall { .. }
        )
    }

    pub fn is_hashed(&self) -> bool {
        matches!(
            self,
            TypeIdentifier::Minimal(_) | TypeIdentifier::Complete(_)
        )
    }

    pub fn equivalence_kind(&self) -> Option<EquivalenceKind> {
        match self {
            TypeIdentifier::Minimal(_) => Some(EquivalenceKind::Minimal),
            TypeIdentifier::Complete(_) => Some(EquivalenceKind::Complete),
            _ => None,
        }
    }
}

impl Default for TypeIdentifier {
    fn default() -> Self {
        TypeIdentifier::Primitive(TK_NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_picks_small_variant_under_256() {
        assert!(matches!(
            TypeIdentifier::string(40),
            TypeIdentifier::StringSmall { bound: 40 }
        ));
    }

    #[test]
    fn string_picks_large_variant_at_or_above_256() {
        assert!(matches!(
            TypeIdentifier::string(300),
            TypeIdentifier::StringLarge { bound: 300 }
        ));
    }

    #[test]
    fn fully_descriptive_predicate_excludes_hashed_variants() {
        assert!(TypeIdentifier::primitive(crate::typemeta::type_kind::TK_INT32)
            .is_fully_descriptive());
        assert!(!TypeIdentifier::minimal(EquivalenceHash::zero()).is_fully_descriptive());
    }

    #[test]
    fn equivalence_kind_matches_variant() {
        assert_eq!(
            TypeIdentifier::complete(EquivalenceHash::zero()).equivalence_kind(),
            Some(EquivalenceKind::Complete)
        );
        assert_eq!(TypeIdentifier::string(4).equivalence_kind(), None);
    }
}
