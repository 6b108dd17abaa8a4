// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Walks a [`Pstate`] and produces a [`Descriptor`].
//!
//! The walk is a single recursive descent from the root type, memoized by
//! [`NodeId`] so that a type referenced twice (directly or through a
//! typedef) gets exactly one row in the constructed-type table.
//!
//! There is no generated Rust struct behind any of this: each member's
//! static size (used for `MEMBER_SIZE` words and by the key planner) is an
//! estimate computed from the type graph alone, not a `std::mem::size_of`.
//! Nested aggregates are costed at `0` since their true size depends on
//! alignment this crate never computes; see `DESIGN.md`.

use super::ops::{flag, op, Instruction, OpWord, Reloc, RelocKind, Ty};
use super::{ConstructedType, Descriptor, DescriptorFlags, TypeId};
use crate::ast::{
    BaseType, Extensibility, Loc, Member, NodeId, Pstate, TypeKind, UnionCase,
};
use crate::error::{CompileError, CompileResult};
use crate::mangle;
use std::collections::HashMap;

/// Upper bound on a relocation's relative offset and on the flat stream's
/// total length: all relocation offsets must fit in `int16`.
const MAX_REL_OFFSET: i64 = i16::MAX as i64;
const MIN_REL_OFFSET: i64 = i16::MIN as i64;

pub fn compile(pstate: &Pstate, root: NodeId) -> CompileResult<Descriptor> {
    let mut cx = Emitter {
        pstate,
        visited: HashMap::new(),
        types: Vec::new(),
    };
    let root_tid = cx.visit(root)?;
    let mut types = cx.types;
    resolve_relocations(&mut types)?;
    let total: usize = types.iter().map(|t| t.instructions.len()).sum();
    if total > MAX_REL_OFFSET as usize {
        return Err(CompileError::OutOfRange {
            what: format!("flat instruction stream has {total} words, exceeds int16 range"),
            loc: Loc::unknown(),
        });
    }
    let flags = compute_flags(pstate, &types, root_tid);
    let mut desc = Descriptor {
        constructed_types: types,
        root: root_tid,
        flags,
        keys: Vec::new(),
        key_offsets: Vec::new(),
    };
    crate::keys::plan(pstate, &mut desc)?;
    Ok(desc)
}

struct Emitter<'a> {
    pstate: &'a Pstate,
    visited: HashMap<NodeId, TypeId>,
    types: Vec<ConstructedType>,
}

/// What one of the per-shape emit helpers hands back to [`Emitter::visit`].
struct Emitted {
    instructions: Vec<Instruction>,
    pl_offset: Option<usize>,
    has_key_member: bool,
    member_op_offsets: Vec<u32>,
}

/// Follows `Alias` chains to the first non-alias node: a typedef never
/// gets its own `ADR` encoding, only the concrete type it ultimately
/// names.
pub(crate) fn unalias(pstate: &Pstate, mut id: NodeId) -> NodeId {
    loop {
        match &pstate.get(id).kind {
            TypeKind::Alias(a) => id = a.target,
            _ => return id,
        }
    }
}

impl<'a> Emitter<'a> {
    /// Registers (or returns the existing) table entry for `id`, emitting
    /// its op stream on first visit. `id` is unaliased first: an alias and
    /// its target share one table row, named after the alias's own scope if
    /// `id` was named, else the target's.
    fn visit(&mut self, id: NodeId) -> CompileResult<TypeId> {
        let resolved = unalias(self.pstate, id);
        if let Some(tid) = self.visited.get(&resolved) {
            return Ok(*tid);
        }
        // Reserve the slot before recursing so a cyclic reference (a struct
        // that contains, transitively, a member of its own type via a
        // sequence/optional) resolves to this row instead of looping.
        let tid = self.types.len() as TypeId;
        self.visited.insert(resolved, tid);
        let node = self.pstate.get(resolved);
        let name = mangle::flat_name(self.pstate, resolved);
        let scope = mangle::scoped_name(self.pstate, resolved);
        let ct_kind = match &node.kind {
            TypeKind::Struct(_) => super::CtKind::Struct,
            TypeKind::Union(_) => super::CtKind::Union,
            TypeKind::Enum(_) => super::CtKind::Enum,
            TypeKind::Bitmask(_) => super::CtKind::Bitmask,
            _ => super::CtKind::Container,
        };
        self.types.push(ConstructedType {
            node: resolved,
            name,
            scope,
            kind: ct_kind,
            instructions: Vec::new(),
            pl_offset: None,
            offset_in_flat_stream: 0,
            has_key_member: false,
            member_op_offsets: Vec::new(),
        });

        let emitted = match &node.kind {
            TypeKind::Struct(def) => self.emit_struct(resolved, def)?,
            TypeKind::Union(def) => self.emit_union(resolved, def)?,
            TypeKind::Enum(def) => Emitted {
                instructions: self.emit_enum_entry(def, node.loc.clone())?,
                pl_offset: None,
                has_key_member: false,
                member_op_offsets: Vec::new(),
            },
            TypeKind::Bitmask(def) => Emitted {
                instructions: self.emit_bitmask_entry(def),
                pl_offset: None,
                has_key_member: false,
                member_op_offsets: Vec::new(),
            },
            TypeKind::Sequence(_) | TypeKind::Array(_) => self.emit_container_entry(resolved)?,
            TypeKind::Base(_) | TypeKind::String { .. } | TypeKind::WString { .. } => {
                return Err(CompileError::Internal(format!(
                    "scalar node {resolved} reached visit(); scalars never get a table row"
                )));
            }
            TypeKind::Alias(_) => unreachable!("unaliased above"),
            TypeKind::Forward => {
                return Err(CompileError::Unsupported {
                    what: "unresolved forward declaration".into(),
                    loc: node.loc.clone(),
                });
            }
        };

        self.types[tid as usize].instructions = emitted.instructions;
        self.types[tid as usize].pl_offset = emitted.pl_offset;
        self.types[tid as usize].has_key_member = emitted.has_key_member;
        self.types[tid as usize].member_op_offsets = emitted.member_op_offsets;
        Ok(tid)
    }

    fn emit_struct(&mut self, id: NodeId, def: &crate::ast::StructDef) -> CompileResult<Emitted> {
        let loc = self.pstate.get(id).loc.clone();
        let mut out = Vec::new();
        let mut pl_offset = None;
        let mutable = def.extensibility == Extensibility::Mutable;

        match def.extensibility {
            Extensibility::Final => {}
            Extensibility::Appendable => {
                pl_offset = Some(out.len());
                out.push(Instruction::Opcode(OpWord::new(op::DLC, 0, 0, 0, 0, 0)));
            }
            Extensibility::Mutable => {
                pl_offset = Some(out.len());
                out.push(Instruction::Opcode(OpWord::new(op::PLC, 0, 0, 0, 0, 0)));
            }
        }

        let mut has_key_member = false;
        if let Some(base_id) = def.base {
            let base_tid = self.visit(base_id)?;
            if mutable {
                out.push(Instruction::Opcode(OpWord::new(
                    op::PLM,
                    flag::BASE,
                    0,
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::BaseMembers,
                    target: base_tid,
                    resolved: None,
                }));
            } else {
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    flag::BASE,
                    Ty::Stu.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(0));
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::BaseMembers,
                    target: base_tid,
                    resolved: None,
                }));
            }
            has_key_member |= self.types[base_tid as usize].has_key_member;
        }

        let mut member_op_offsets = Vec::with_capacity(def.members.len());
        for (idx, m) in def.members.iter().enumerate() {
            has_key_member |= m.flags.key;
            member_op_offsets.push(out.len() as u32);
            let member_ops = self.emit_member(m, idx as u32, mutable)?;
            out.extend(member_ops);
        }

        out.push(Instruction::rts());
        let _ = loc;
        Ok(Emitted {
            instructions: out,
            pl_offset,
            has_key_member,
            member_op_offsets,
        })
    }

    /// Emits one member's contribution: an optional `PLM` header (MUTABLE
    /// structs only), the `ADR`/`JEQ4`-family opcode, and its operand
    /// words. `field_index` stands in for `offsetof` here.
    fn emit_member(
        &mut self,
        m: &Member,
        field_index: u32,
        mutable: bool,
    ) -> CompileResult<Vec<Instruction>> {
        let mut out = Vec::new();
        // The PLM carries a relative jump to the member's own ADR. Because
        // we build each member's instructions as one contiguous unit (never
        // incrementally patched once written), that jump is always exactly
        // one word — unlike the original compiler, which appends members
        // one at a time into a shared array and must shift earlier PLM
        // jumps when an aggregated case inserts an out-of-line sub-program
        // ahead of them.
        if mutable {
            out.push(Instruction::Opcode(OpWord::new(
                op::PLM,
                0,
                0,
                0,
                0,
                0,
            )));
        }

        let mut adr_flags = 0u8;
        if m.flags.key {
            adr_flags |= flag::KEY;
        }
        if m.flags.optional {
            adr_flags |= flag::OPT;
        }
        if m.flags.external {
            adr_flags |= flag::EXT;
        }
        if m.flags.must_understand {
            adr_flags |= flag::MU;
        }

        self.emit_typed_member(m.type_ref, adr_flags, field_index, &mut out)?;

        if m.flags.external || m.flags.optional {
            let size = static_size(self.pstate, m.type_ref);
            out.push(Instruction::MemberSize(size));
        }

        Ok(out)
    }

    /// Appends the `ADR`-family opcode and operands describing `type_ref`
    /// (already unaliased) at `field_index`, shared by struct members and
    /// union cases.
    fn emit_typed_member(
        &mut self,
        type_ref: NodeId,
        adr_flags: u8,
        field_index: u32,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let resolved = unalias(self.pstate, type_ref);
        let node = self.pstate.get(resolved);
        let loc = node.loc.clone();
        match &node.kind {
            TypeKind::Base(bt) => {
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    prim_ty(*bt).as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
            }
            TypeKind::String { bound } => {
                let ty = if bound.is_some() { Ty::BStr } else { Ty::Str };
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    ty.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                if let Some(b) = bound {
                    out.push(Instruction::Single(*b));
                }
            }
            TypeKind::WString { bound } => {
                // This core does not model UTF-16 transcoding; treated as a
                // bounded/unbounded string for framing purposes only.
                let ty = if bound.is_some() { Ty::BStr } else { Ty::Str };
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    ty.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                if let Some(b) = bound {
                    out.push(Instruction::Single(*b));
                }
            }
            TypeKind::Enum(def) => {
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    Ty::Enu.as_u8(),
                    enum_size_class(def),
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                out.push(Instruction::Constant(i64::from(def.max_value())));
            }
            TypeKind::Bitmask(def) => {
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    Ty::Bmk.as_u8(),
                    bitmask_size_class(def),
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                let bitset = def.bitset();
                out.push(Instruction::Single((bitset >> 32) as u32));
                out.push(Instruction::Single(bitset as u32));
            }
            TypeKind::Struct(_) => {
                let tid = self.visit(resolved)?;
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    Ty::Stu.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::Elem,
                    target: tid,
                    resolved: None,
                }));
            }
            TypeKind::Union(_) => {
                let tid = self.visit(resolved)?;
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    Ty::Uni.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::Elem,
                    target: tid,
                    resolved: None,
                }));
            }
            TypeKind::Sequence(seq) => {
                let ty = if seq.bound.is_some() { Ty::BSeq } else { Ty::Seq };
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    ty.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                if let Some(b) = seq.bound {
                    out.push(Instruction::Single(b));
                }
                self.emit_element_operands(seq.element, out)?;
            }
            TypeKind::Array(arr) => {
                out.push(Instruction::Opcode(OpWord::new(
                    op::ADR,
                    adr_flags,
                    Ty::Arr.as_u8(),
                    0,
                    0,
                    0,
                )));
                out.push(Instruction::Offset(field_index));
                out.push(Instruction::Single(arr.total_len()));
                self.emit_element_operands(arr.element, out)?;
            }
            TypeKind::Alias(_) => unreachable!("unaliased above"),
            TypeKind::Forward => {
                return Err(CompileError::Unsupported {
                    what: "unresolved forward declaration".into(),
                    loc,
                });
            }
        }
        Ok(())
    }

    /// The trailing operand words shared by sequence and array members: the
    /// element's static size, followed by either an inline `Couple`
    /// primitive-element shorthand or a `Reloc` to the element's own table
    /// entry for constructed element types.
    fn emit_element_operands(
        &mut self,
        elem: NodeId,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let resolved = unalias(self.pstate, elem);
        out.push(Instruction::MemberSize(static_size(self.pstate, resolved)));
        let node = self.pstate.get(resolved);
        match &node.kind {
            TypeKind::Base(bt) => {
                out.push(Instruction::Couple(0, u16::from(prim_ty(*bt).as_u8())));
            }
            TypeKind::String { .. } | TypeKind::WString { .. } => {
                out.push(Instruction::Couple(0, Ty::Str.as_u8() as u16));
            }
            _ => {
                let tid = self.visit(resolved)?;
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::Elem,
                    target: tid,
                    resolved: None,
                }));
            }
        }
        Ok(())
    }

    fn emit_union(&mut self, id: NodeId, def: &crate::ast::UnionDef) -> CompileResult<Emitted> {
        let loc = self.pstate.get(id).loc.clone();
        let mut out = Vec::new();
        let pl_offset = match def.extensibility {
            Extensibility::Final => None,
            Extensibility::Appendable => {
                let i = out.len();
                out.push(Instruction::Opcode(OpWord::new(op::DLC, 0, 0, 0, 0, 0)));
                Some(i)
            }
            Extensibility::Mutable => {
                let i = out.len();
                out.push(Instruction::Opcode(OpWord::new(op::PLC, 0, 0, 0, 0, 0)));
                Some(i)
            }
        };

        let disc_op_offset = out.len() as u32;
        let disc = unalias(self.pstate, def.discriminant);
        let disc_node = self.pstate.get(disc);
        let mut disc_flags = flag::MU;
        if def.key {
            disc_flags |= flag::KEY;
        }
        if def.has_explicit_default() {
            disc_flags |= flag::DEF;
        }
        let (disc_ty, disc_subtype, enum_max) = match &disc_node.kind {
            TypeKind::Base(bt) => (prim_ty(*bt), 0u8, None),
            TypeKind::Enum(e) => (Ty::Enu, enum_size_class(e), Some(e.max_value())),
            other => {
                return Err(CompileError::Unsupported {
                    what: format!("union discriminant of type {other:?}"),
                    loc,
                })
            }
        };
        out.push(Instruction::Opcode(OpWord::new(
            op::ADR,
            disc_flags,
            disc_ty.as_u8(),
            disc_subtype,
            0,
            0,
        )));
        out.push(Instruction::Offset(0));
        if let Some(max) = enum_max {
            out.push(Instruction::Constant(i64::from(max)));
        }

        let total_labels: usize = def.cases.iter().map(|c| c.labels.len().max(1)).sum();
        let first_case_offset = (out.len() + 1) as u16;
        out.push(Instruction::Couple(total_labels as u16, first_case_offset));

        let mut has_key_member = false;
        for (case_idx, case) in def.cases.iter().enumerate() {
            has_key_member |= case.member.flags.key;
            self.emit_union_case(case, case_idx as u32 + 1, &mut out)?;
        }

        out.push(Instruction::rts());
        Ok(Emitted {
            instructions: out,
            pl_offset,
            has_key_member,
            member_op_offsets: vec![disc_op_offset],
        })
    }

    fn emit_union_case(
        &mut self,
        case: &UnionCase,
        field_index: u32,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let resolved = unalias(self.pstate, case.member.type_ref);
        let aggregated = self.pstate.get(resolved).kind.is_aggregated();
        let labels = if case.is_default {
            vec![0i32]
        } else {
            case.labels.clone()
        };
        for label in labels {
            let mut jeq_flags = 0u8;
            if aggregated {
                jeq_flags |= flag::EXT;
            }
            let opcode_index = out.len();
            out.push(Instruction::Opcode(OpWord::new(
                op::JEQ4,
                jeq_flags,
                0,
                0,
                0,
                0,
            )));
            out.push(Instruction::Constant(i64::from(label)));
            out.push(Instruction::Offset(field_index));
            if aggregated {
                let tid = self.visit(resolved)?;
                out.push(Instruction::Reloc(Reloc {
                    kind: RelocKind::Jeq,
                    target: tid,
                    resolved: None,
                }));
            } else {
                let mut tmp = Vec::new();
                self.emit_typed_member(case.member.type_ref, 0, field_index, &mut tmp)?;
                // `emit_typed_member` always emits its own ADR+OFFSET pair;
                // a JEQ4 case needs only the type/subtype nibble it carries,
                // so fold those back into the opcode word already pushed.
                if let Instruction::Opcode(w) = tmp[0] {
                    out[opcode_index] = Instruction::Opcode(OpWord::new(
                        op::JEQ4,
                        jeq_flags,
                        w.ty(),
                        w.subtype(),
                        w.size(),
                        0,
                    ));
                }
                out.push(Instruction::MemberSize(static_size(self.pstate, resolved)));
            }
        }
        Ok(())
    }

    /// The constructed-type table's own row for an enum reached via
    /// sequence/array/typedef: enums/bitmasks store their description
    /// inline in the referring `ADR`, but are *also* reachable as their
    /// own table row.
    fn emit_enum_entry(
        &mut self,
        def: &crate::ast::EnumDef,
        loc: Loc,
    ) -> CompileResult<Vec<Instruction>> {
        if !def.is_consecutive() {
            return Err(CompileError::Unsupported {
                what: "enum with non-consecutive literal values".into(),
                loc,
            });
        }
        Ok(vec![
            Instruction::Opcode(OpWord::new(
                op::ADR,
                0,
                Ty::Enu.as_u8(),
                enum_size_class(def),
                0,
                0,
            )),
            Instruction::Offset(0),
            Instruction::Constant(i64::from(def.max_value())),
            Instruction::rts(),
        ])
    }

    fn emit_bitmask_entry(&mut self, def: &crate::ast::BitmaskDef) -> Vec<Instruction> {
        let bitset = def.bitset();
        vec![
            Instruction::Opcode(OpWord::new(
                op::ADR,
                0,
                Ty::Bmk.as_u8(),
                bitmask_size_class(def),
                0,
                0,
            )),
            Instruction::Offset(0),
            Instruction::Single((bitset >> 32) as u32),
            Instruction::Single(bitset as u32),
            Instruction::rts(),
        ]
    }

    /// A standalone table row for a sequence/array reached only through
    /// another sequence/array's `ELEM_OFFSET` (an anonymous nested
    /// container, e.g. `sequence<sequence<long>>`), built the same way a
    /// member of that type would be, but addressed at field index 0.
    fn emit_container_entry(&mut self, id: NodeId) -> CompileResult<Emitted> {
        let mut out = Vec::new();
        let dummy_flags = 0u8;
        self.emit_typed_member(id, dummy_flags, 0, &mut out)?;
        out.push(Instruction::rts());
        Ok(Emitted {
            instructions: out,
            pl_offset: None,
            has_key_member: false,
            member_op_offsets: Vec::new(),
        })
    }
}

fn prim_ty(bt: BaseType) -> Ty {
    match bt.width() {
        1 => Ty::Bool1By,
        2 => Ty::U2By,
        4 => Ty::U4By,
        _ => Ty::U8By,
    }
}

fn enum_size_class(def: &crate::ast::EnumDef) -> u8 {
    let max = def.max_value().max(0) as u32;
    if max <= u16::MAX as u32 {
        1
    } else {
        2
    }
}

fn bitmask_size_class(def: &crate::ast::BitmaskDef) -> u8 {
    match def.bit_bound {
        0..=16 => 1,
        17..=32 => 2,
        _ => 3,
    }
}

/// Static size estimate used for `MEMBER_SIZE` words and by the key
/// planner. This is a size *class*, not `sizeof`: nested aggregates have no
/// generated Rust layout to measure here, so they cost `0` and the caller
/// must not rely on this for anything but wire-size bookkeeping of scalar
/// and string-ish leaves.
pub(crate) fn static_size(pstate: &Pstate, id: NodeId) -> u32 {
    let resolved = unalias(pstate, id);
    match &pstate.get(resolved).kind {
        TypeKind::Base(bt) => bt.width(),
        TypeKind::String { .. } | TypeKind::WString { .. } => 4,
        TypeKind::Enum(_) => 4,
        TypeKind::Bitmask(def) => match def.bit_bound {
            0..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        },
        TypeKind::Array(arr) => static_size(pstate, arr.element) * arr.total_len().max(1),
        TypeKind::Struct(_) | TypeKind::Union(_) | TypeKind::Sequence(_) => 0,
        TypeKind::Alias(_) => unreachable!("unaliased above"),
        TypeKind::Forward => 0,
    }
}

/// Resolves every [`Reloc`] in the flat instruction stream (every
/// constructed type's instructions concatenated in table order) to a
/// relative `int16` offset, failing if any exceeds that range.
pub fn resolve_relocations(types: &mut [ConstructedType]) -> CompileResult<()> {
    let mut cum = 0u32;
    for t in types.iter_mut() {
        t.offset_in_flat_stream = cum;
        cum += t.instructions.len() as u32;
    }
    for i in 0..types.len() {
        let base = types[i].offset_in_flat_stream;
        for pos in 0..types[i].instructions.len() {
            let reloc = match types[i].instructions[pos] {
                Instruction::Reloc(r) => r,
                _ => continue,
            };
            let target_off = types[reloc.target as usize].offset_in_flat_stream;
            let from = i64::from(base) + pos as i64;
            let delta = i64::from(target_off) - from;
            if !(MIN_REL_OFFSET..=MAX_REL_OFFSET).contains(&delta) {
                return Err(CompileError::OutOfRange {
                    what: format!(
                        "relocation from word {from} to type at {target_off} exceeds int16 range"
                    ),
                    loc: Loc::unknown(),
                });
            }
            types[i].instructions[pos] = Instruction::Reloc(Reloc {
                resolved: Some(delta as i16),
                ..reloc
            });
        }
    }
    Ok(())
}

fn compute_flags(pstate: &Pstate, types: &[ConstructedType], root: TypeId) -> DescriptorFlags {
    let root_ct = &types[root as usize];
    let fixed_size = !has_variable_size(pstate, root_ct);
    DescriptorFlags {
        fixed_key: false,
        fixed_key_xcdr2: false,
        fixed_size,
        contains_union: matches!(pstate.get(root_ct.node).kind, TypeKind::Union(_)),
        restrict_data_representation: false,
        xtypes_metadata: false,
    }
}

fn has_variable_size(_pstate: &Pstate, ct: &ConstructedType) -> bool {
    ct.instructions.iter().any(|ins| {
        matches!(
            ins,
            Instruction::Opcode(w)
                if matches!(
                    w.ty(),
                    t if t == Ty::Str.as_u8()
                        || t == Ty::BStr.as_u8()
                        || t == Ty::Seq.as_u8()
                        || t == Ty::BSeq.as_u8()
                ) || w.has_flag(flag::OPT)
                    || w.has_flag(flag::EXT)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::test_support::*;
    use crate::ast::{
        ArrayDef, BitmaskFlag, EnumLiteral, SequenceDef, StructDef, UnionDef,
    };

    #[test]
    fn key_only_struct_compiles_with_one_table_row() {
        let mut pstate = Pstate::new();
        let root = key_only_struct(&mut pstate);
        let desc = compile(&pstate, root).expect("compiles");
        assert_eq!(desc.constructed_types.len(), 1);
        assert!(desc.flags.fixed_key);
        assert!(desc.flags.fixed_key_xcdr2);
        assert_eq!(desc.keys.len(), 1);
        assert_eq!(desc.keys[0].name, "id");
        assert!(desc.flags.fixed_size);
        assert!(desc.root_ops().last().unwrap().is_rts());
    }

    #[test]
    fn nested_struct_member_gets_its_own_table_row_once() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let inner = pstate.push(
            "Inner",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("v", 0, i32_ty, false)],
            }),
        );
        let outer = pstate.push(
            "Outer",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![
                    member("a", 0, inner, false),
                    member("b", 1, inner, false),
                ],
            }),
        );
        let desc = compile(&pstate, outer).expect("compiles");
        // One row for Outer, one for Inner, even though Inner is referenced twice.
        assert_eq!(desc.constructed_types.len(), 2);
    }

    #[test]
    fn non_consecutive_enum_is_rejected() {
        let mut pstate = Pstate::new();
        let en = pstate.push(
            "Color",
            vec![],
            Loc::unknown(),
            TypeKind::Enum(crate::ast::EnumDef {
                literals: vec![
                    EnumLiteral { name: "RED".into(), value: 0 },
                    EnumLiteral { name: "BLUE".into(), value: 9 },
                ],
            }),
        );
        let outer = pstate.push(
            "Outer",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("c", 0, en, false)],
            }),
        );
        let err = compile(&pstate, outer).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }

    #[test]
    fn mutable_struct_emits_plc_and_plm_headers() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let root = pstate.push(
            "M",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Mutable,
                base: None,
                members: vec![member("a", 0, i32_ty, false)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        let ops = desc.root_ops();
        assert!(matches!(ops[0], Instruction::Opcode(w) if w.op() == op::PLC));
        assert!(matches!(ops[1], Instruction::Opcode(w) if w.op() == op::PLM));
    }

    #[test]
    fn appendable_struct_emits_dlc_header() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let root = pstate.push(
            "A",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Appendable,
                base: None,
                members: vec![member("a", 0, i32_ty, false)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        assert!(matches!(desc.root_ops()[0], Instruction::Opcode(w) if w.op() == op::DLC));
    }

    #[test]
    fn union_emits_one_jeq4_quadruple_per_label() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let bt_ty = base(&mut pstate, BaseType::Boolean);
        let def = UnionDef {
            extensibility: Extensibility::Final,
            discriminant: i32_ty,
            key: false,
            cases: vec![UnionCase {
                member: member("flag", 0, bt_ty, false),
                labels: vec![1, 2, 3],
                is_default: false,
            }],
        };
        let root = pstate.push("U", vec![], Loc::unknown(), TypeKind::Union(def));
        let desc = compile(&pstate, root).expect("compiles");
        let jeq_count = desc
            .root_ops()
            .iter()
            .filter(|i| matches!(i, Instruction::Opcode(w) if w.op() == op::JEQ4))
            .count();
        assert_eq!(jeq_count, 3);
    }

    #[test]
    fn sequence_of_struct_relocates_to_element_table_row() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let elem = pstate.push(
            "Elem",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("v", 0, i32_ty, false)],
            }),
        );
        let seq = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::Sequence(SequenceDef { element: elem, bound: None }),
        );
        let root = pstate.push(
            "Outer",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("items", 0, seq, false)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        assert_eq!(desc.constructed_types.len(), 2);
        let has_reloc = desc
            .root_ops()
            .iter()
            .any(|i| matches!(i, Instruction::Reloc(r) if r.kind == RelocKind::Elem));
        assert!(has_reloc);
    }

    #[test]
    fn bitmask_member_emits_two_single_words_for_bitset() {
        let mut pstate = Pstate::new();
        let bm = pstate.push(
            "Flags",
            vec![],
            Loc::unknown(),
            TypeKind::Bitmask(crate::ast::BitmaskDef {
                bit_bound: 64,
                flags: vec![
                    BitmaskFlag { name: "A".into(), position: 0 },
                    BitmaskFlag { name: "B".into(), position: 40 },
                ],
            }),
        );
        let root = pstate.push(
            "Outer",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("f", 0, bm, false)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        let single_count = desc
            .root_ops()
            .iter()
            .filter(|i| matches!(i, Instruction::Single(_)))
            .count();
        assert_eq!(single_count, 2);
    }

    #[test]
    fn array_member_carries_flattened_total_length() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let arr = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::Array(ArrayDef { element: i32_ty, dims: vec![2, 3] }),
        );
        let root = pstate.push(
            "Outer",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("grid", 0, arr, false)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        assert!(desc
            .root_ops()
            .iter()
            .any(|i| matches!(i, Instruction::Single(6))));
    }
}
