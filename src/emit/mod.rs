// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The op-code emitter and the constructed-type table it populates.

pub mod emitter;
pub mod ops;

use crate::ast::NodeId;
use ops::Instruction;

/// Index into [`Descriptor::constructed_types`]: an arena index standing in
/// for what a generated descriptor table would address by pointer (see
/// `ops.rs`'s module doc for why [`ops::Instruction::Offset`] also had to
/// move away from `offsetof`).
pub type TypeId = u32;

/// Which shape a [`ConstructedType`]'s op stream has, so [`crate::interp`]
/// can dispatch without re-consulting the AST it was compiled from — the
/// interpreter only ever sees a [`Descriptor`] plus a sample, its whole
/// runtime input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtKind {
    Struct,
    Union,
    Enum,
    Bitmask,
    /// A standalone sequence/array reached only through another container's
    /// element relocation.
    Container,
}

/// One row of the constructed-type table: a reachable struct, union, enum,
/// bitmask, sequence, array, or alias, together with its own op stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructedType {
    pub node: NodeId,
    pub name: String,
    pub scope: String,
    pub kind: CtKind,
    pub instructions: Vec<Instruction>,
    /// Byte offset (within this type's own stream) of its `PLC`/`DLC`
    /// opcode, if one was emitted (`MUTABLE`/`APPENDABLE` extensibility).
    pub pl_offset: Option<usize>,
    /// Filled in by [`emitter::resolve_relocations`]: this type's starting
    /// index once every constructed type is concatenated into one flat
    /// stream (the layout the runtime interpreter actually walks).
    pub offset_in_flat_stream: u32,
    pub has_key_member: bool,
    /// For a struct/union, the local (pre-flattening) index within
    /// `instructions` of each declared member's leading opcode (`PLM` for
    /// MUTABLE, `ADR` otherwise), in declaration order. [`crate::keys`]
    /// uses this to recover a key member's op-offset without re-parsing
    /// the instruction words.
    pub member_op_offsets: Vec<u32>,
}

/// Flags describing aggregate properties of the whole descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorFlags {
    pub fixed_key: bool,
    pub fixed_key_xcdr2: bool,
    /// Every reachable member has a statically known size (no strings,
    /// sequences, externally-owned members, or optionals).
    pub fixed_size: bool,
    /// The root type (or something it contains by value) is a union.
    pub contains_union: bool,
    pub restrict_data_representation: bool,
    pub xtypes_metadata: bool,
}

/// The full output of compiling one root AST node: every constructed type
/// reachable from it, the key metadata [`crate::keys::plan`] derives from
/// it, and the aggregate flags the runtime needs up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub constructed_types: Vec<ConstructedType>,
    pub root: TypeId,
    pub flags: DescriptorFlags,
    pub keys: Vec<crate::keys::KeyMeta>,
    /// Flat `KOF(len), SINGLE(op_offset|member_id) × len` stream, one group
    /// per entry in `keys`, in the same order.
    pub key_offsets: Vec<Instruction>,
}

impl Descriptor {
    pub fn root_type(&self) -> &ConstructedType {
        &self.constructed_types[self.root as usize]
    }

    /// The root type's op stream, relocations already resolved to relative
    /// `int16` offsets — what [`crate::interp`] actually executes.
    pub fn root_ops(&self) -> &[Instruction] {
        &self.root_type().instructions
    }
}
