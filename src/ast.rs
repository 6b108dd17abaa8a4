// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The parsed, annotated AST ("pstate") that the compiler consumes.
//!
//! The IDL lexer/parser is out of scope for this crate; a caller builds a
//! [`Pstate`] arena directly and hands it to the descriptor generator.
//! Every type the compiler sees is a node in this arena, addressed by the
//! stable [`NodeId`] index rather than a pointer.

use std::fmt;
use std::sync::Arc;

/// Stable identity of an AST node: used as table dedup keys, relocation
/// targets, and base-type references wherever a pointer would otherwise be
/// dereferenced.
pub type NodeId = u32;

/// Source location, carried purely so compile errors can point somewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub file: Arc<str>,
    pub line: u32,
}

impl Loc {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    pub fn unknown() -> Self {
        Self::new("<generated>", 0)
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Extensibility kind of an aggregated type (struct/union).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extensibility {
    Final,
    Appendable,
    Mutable,
}

/// Recovery policy for a one-bit deserialization error on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TryConstruct {
    /// Discard the whole sample (the default).
    Discard,
    UseDefault,
    Trim,
}

impl Default for TryConstruct {
    fn default() -> Self {
        TryConstruct::Discard
    }
}

/// Per-member annotation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberFlags {
    pub key: bool,
    pub optional: bool,
    pub must_understand: bool,
    pub external: bool,
    pub try_construct: TryConstruct,
}

/// Base (primitive) scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Boolean,
    Byte,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Char8,
    Char16,
}

impl BaseType {
    /// Natural width in bytes, used by the key planner and the interpreter.
    pub const fn width(self) -> u32 {
        match self {
            BaseType::Boolean | BaseType::Byte | BaseType::Int8 | BaseType::UInt8 => 1,
            BaseType::Int16 | BaseType::UInt16 | BaseType::Char16 => 2,
            BaseType::Int32 | BaseType::UInt32 | BaseType::Float32 | BaseType::Char8 => 4,
            BaseType::Int64 | BaseType::UInt64 | BaseType::Float64 => 8,
        }
    }

    pub const fn is_signed_int(self) -> bool {
        matches!(
            self,
            BaseType::Int8 | BaseType::Int16 | BaseType::Int32 | BaseType::Int64
        )
    }
}

/// A single member of a struct or a union case.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Stable 32-bit member id (declaration order for FINAL/APPENDABLE,
    /// explicit or hashed for MUTABLE).
    pub member_id: u32,
    pub name: String,
    pub type_ref: NodeId,
    pub flags: MemberFlags,
}

/// One labelled case of a union.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionCase {
    pub member: Member,
    /// Case labels (empty + `is_default == true` for the `default:` case).
    pub labels: Vec<i32>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub extensibility: Extensibility,
    /// Base type for single inheritance, if any.
    pub base: Option<NodeId>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub extensibility: Extensibility,
    pub discriminant: NodeId,
    pub key: bool,
    pub cases: Vec<UnionCase>,
}

impl UnionDef {
    pub fn has_explicit_default(&self) -> bool {
        self.cases.iter().any(|c| c.is_default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumLiteral {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub literals: Vec<EnumLiteral>,
}

impl EnumDef {
    pub fn max_value(&self) -> i32 {
        self.literals.iter().map(|l| l.value).max().unwrap_or(0)
    }

    /// Non-consecutive literal values cannot be range-checked cheaply at
    /// decode time, so such enums are rejected outright at compile time
    /// rather than accepted with an unenforceable range check.
    pub fn is_consecutive(&self) -> bool {
        let mut values: Vec<i32> = self.literals.iter().map(|l| l.value).collect();
        values.sort_unstable();
        values.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskFlag {
    pub name: String,
    pub position: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskDef {
    /// Highest declared bit position + 1, rounded up to {8,16,32,64}.
    pub bit_bound: u8,
    pub flags: Vec<BitmaskFlag>,
}

impl BitmaskDef {
    pub fn bitset(&self) -> u64 {
        self.flags.iter().fold(0u64, |acc, f| acc | (1u64 << f.position))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDef {
    pub element: NodeId,
    /// `None` means unbounded.
    pub bound: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDef {
    pub element: NodeId,
    /// One entry per dimension; multi-dimensional arrays are flattened by
    /// the emitter into a single total length (product of dims).
    pub dims: Vec<u32>,
}

impl ArrayDef {
    pub fn total_len(&self) -> u32 {
        self.dims.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasDef {
    pub target: NodeId,
}

/// The closed sum of type shapes the compiler understands.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Base(BaseType),
    String { bound: Option<u32> },
    WString { bound: Option<u32> },
    Struct(StructDef),
    Union(UnionDef),
    Enum(EnumDef),
    Bitmask(BitmaskDef),
    Sequence(SequenceDef),
    Array(ArrayDef),
    Alias(AliasDef),
    /// An unresolved forward declaration; resolving it is a parser-layer
    /// concern, so encountering one here is always a compile error.
    Forward,
}

impl TypeKind {
    pub fn is_aggregated(&self) -> bool {
        matches!(self, TypeKind::Struct(_) | TypeKind::Union(_))
    }

    pub fn is_constructed(&self) -> bool {
        matches!(
            self,
            TypeKind::Struct(_)
                | TypeKind::Union(_)
                | TypeKind::Enum(_)
                | TypeKind::Bitmask(_)
                | TypeKind::Sequence(_)
                | TypeKind::Array(_)
                | TypeKind::Alias(_)
        )
    }
}

/// A named (or anonymous, for sequences/arrays/strings synthesized by the
/// mangler) node in the type graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub scope: Vec<String>,
    pub loc: Loc,
    pub kind: TypeKind,
}

/// The parsed program: a flat arena of [`Node`]s plus the id of the root
/// (top-level) type to compile.
#[derive(Debug, Default)]
pub struct Pstate {
    nodes: Vec<Node>,
}

impl Pstate {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(
        &mut self,
        name: impl Into<String>,
        scope: Vec<String>,
        loc: Loc,
        kind: TypeKind,
    ) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            id,
            name: name.into(),
            scope,
            loc,
            kind,
        });
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small builder helpers shared by the unit tests of every module that
    //! needs a sample AST (the emitter, key planner, type-meta builder, ...).
    use super::*;

    pub fn base(pstate: &mut Pstate, bt: BaseType) -> NodeId {
        pstate.push(format!("{bt:?}"), vec![], Loc::unknown(), TypeKind::Base(bt))
    }

    pub fn member(name: &str, id: u32, type_ref: NodeId, key: bool) -> Member {
        Member {
            member_id: id,
            name: name.to_string(),
            type_ref,
            flags: MemberFlags {
                key,
                ..Default::default()
            },
        }
    }

    pub fn member_optional(name: &str, id: u32, type_ref: NodeId) -> Member {
        Member {
            member_id: id,
            name: name.to_string(),
            type_ref,
            flags: MemberFlags {
                optional: true,
                ..Default::default()
            },
        }
    }

    /// `struct S { @key long id; long payload; };`
    pub fn key_only_struct(pstate: &mut Pstate) -> NodeId {
        let i32_ty = base(pstate, BaseType::Int32);
        let def = StructDef {
            extensibility: Extensibility::Final,
            base: None,
            members: vec![
                member("id", 0, i32_ty, true),
                member("payload", 1, i32_ty, false),
            ],
        };
        pstate.push("S", vec![], Loc::unknown(), TypeKind::Struct(def))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn enum_consecutive_detection() {
        let consecutive = EnumDef {
            literals: vec![
                EnumLiteral {
                    name: "A".into(),
                    value: 0,
                },
                EnumLiteral {
                    name: "B".into(),
                    value: 1,
                },
            ],
        };
        assert!(consecutive.is_consecutive());

        let gapped = EnumDef {
            literals: vec![
                EnumLiteral {
                    name: "A".into(),
                    value: 0,
                },
                EnumLiteral {
                    name: "B".into(),
                    value: 5,
                },
            ],
        };
        assert!(!gapped.is_consecutive());
    }

    #[test]
    fn array_total_len_is_dimension_product() {
        let def = ArrayDef {
            element: 0,
            dims: vec![3, 4, 2],
        };
        assert_eq!(def.total_len(), 24);
    }

    #[test]
    fn pstate_assigns_stable_sequential_ids() {
        let mut pstate = Pstate::new();
        let a = base(&mut pstate, BaseType::Int32);
        let b = key_only_struct(&mut pstate);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert!(matches!(pstate.get(b).kind, TypeKind::Struct(_)));
    }
}
