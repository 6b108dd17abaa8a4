// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `MinimalTypeObject`/`CompleteTypeObject`: the X-Types structural
//! descriptions this compiler emits alongside the op-code stream.
//! `Complete` carries names and annotations; `Minimal` strips them, since
//! only its hash (not its content) is ever compared between participants.

use super::type_identifier::TypeIdentifier;
use crate::ast::Extensibility;

/// Flags common to every aggregated-type member (`CommonStructMember`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberFlags {
    pub try_construct: u8,
    pub is_external: bool,
    pub is_optional: bool,
    pub is_must_understand: bool,
    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimalStructMember {
    pub member_id: u32,
    pub flags: MemberFlags,
    pub type_id: TypeIdentifier,
    /// MD5 of the member's name, per X-Types §7.3.4.6 — `Complete` carries
    /// the name itself; `Minimal` carries only this digest.
    pub name_hash: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteStructMember {
    pub member_id: u32,
    pub flags: MemberFlags,
    pub type_id: TypeIdentifier,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimalStructType {
    pub extensibility: Extensibility,
    pub base_type: Option<TypeIdentifier>,
    pub members: Vec<MinimalStructMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteStructType {
    pub extensibility: Extensibility,
    pub base_type: Option<TypeIdentifier>,
    pub type_name: String,
    pub members: Vec<CompleteStructMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimalUnionMember {
    pub member_id: u32,
    pub flags: MemberFlags,
    pub type_id: TypeIdentifier,
    pub labels: Vec<i32>,
    pub is_default: bool,
    pub name_hash: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteUnionMember {
    pub member_id: u32,
    pub flags: MemberFlags,
    pub type_id: TypeIdentifier,
    pub labels: Vec<i32>,
    pub is_default: bool,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimalUnionType {
    pub extensibility: Extensibility,
    pub discriminator_type: TypeIdentifier,
    pub discriminator_is_key: bool,
    pub members: Vec<MinimalUnionMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteUnionType {
    pub extensibility: Extensibility,
    pub type_name: String,
    pub discriminator_type: TypeIdentifier,
    pub discriminator_is_key: bool,
    pub members: Vec<CompleteUnionMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumLiteral {
    pub value: i32,
    pub is_default: bool,
    /// `None` for `Minimal` (name-hashed only, like struct members).
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub bit_bound: u8,
    pub type_name: Option<String>,
    pub literals: Vec<EnumLiteral>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitflagLiteral {
    pub position: u8,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskType {
    pub bit_bound: u8,
    pub type_name: Option<String>,
    pub flags: Vec<BitflagLiteral>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasType {
    pub type_name: Option<String>,
    pub aliased_type: TypeIdentifier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionKind {
    Sequence { bound: Option<u32> },
    Array { dims: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionType {
    pub kind: CollectionKind,
    pub element_type: TypeIdentifier,
}

/// The closed sum of `TypeObject` shapes this compiler emits, parameterized
/// over whether names/annotations survive (`Complete`) or are stripped to
/// their hash (`Minimal`), matching `xtypes/type_object/structs.rs`'s
/// `CompleteStructType`/`MinimalStructType` split generalized across every
/// constructed-type shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeObject {
    CompleteStruct(CompleteStructType),
    MinimalStruct(MinimalStructType),
    CompleteUnion(CompleteUnionType),
    MinimalUnion(MinimalUnionType),
    Enum(EnumType),
    Bitmask(BitmaskType),
    Alias(AliasType),
    Collection(CollectionType),
}

impl TypeObject {
    pub fn is_minimal(&self) -> bool {
        matches!(
            self,
            TypeObject::MinimalStruct(_) | TypeObject::MinimalUnion(_)
        ) || matches!(self, TypeObject::Enum(e) if e.type_name.is_none())
            || matches!(self, TypeObject::Bitmask(b) if b.type_name.is_none())
            || matches!(self, TypeObject::Alias(a) if a.type_name.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_struct_is_recognized_as_minimal() {
        let t = TypeObject::MinimalStruct(MinimalStructType {
            extensibility: Extensibility::Final,
            base_type: None,
            members: vec![],
        });
        assert!(t.is_minimal());
    }

    #[test]
    fn complete_struct_is_not_minimal() {
        let t = TypeObject::CompleteStruct(CompleteStructType {
            extensibility: Extensibility::Final,
            base_type: None,
            type_name: "S".into(),
            members: vec![],
        });
        assert!(!t.is_minimal());
    }
}
