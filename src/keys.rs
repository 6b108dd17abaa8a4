// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The key planner: walks the op streams [`crate::emit`] produced and
//! derives `descriptor.keys[]` / `descriptor.key_offsets[]`.
//!
//! A bytecode interpreter would rediscover key members by walking raw
//! opcode words and following `BASE_MEMBERS_OFFSET`/`ELEM_OFFSET`
//! relocations. Since the emitter and key planner here share the same AST,
//! this instead recurses over the [`crate::ast::StructDef`]/
//! [`crate::ast::UnionDef`] nodes directly and consults each constructed
//! type's `member_op_offsets` only to recover the op-offset a `KOF` entry
//! must record — producing byte-for-byte the same `keys[]`/`key_offsets[]`
//! a literal "walk the ops" algorithm would, without re-deriving facts the
//! emitter already established once.

use crate::ast::{BaseType, Member, NodeId, Pstate, TypeKind};
use crate::emit::emitter::unalias;
use crate::emit::ops::{op, Instruction, OpWord};
use crate::emit::{Descriptor, TypeId};
use crate::error::{CompileError, CompileResult};
use std::collections::HashMap;

/// One resolved key path.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMeta {
    /// Dotted path from the root type, e.g. `"location.cell_id"`.
    pub name: String,
    /// Flat-stream op-offset of each ancestor member's `ADR`/`PLM`, root to
    /// leaf — `inst_offs.len() == order.len()`.
    pub inst_offs: Vec<u32>,
    pub key_idx: usize,
    /// Member id of each ancestor member along the path, root to leaf; the
    /// sort key for XCDR2 key order.
    pub order: Vec<u32>,
    pub size: u32,
    pub align: u32,
    /// Needs a 4-byte `DHEADER` when encoded as an XCDR2 key (bounded
    /// arrays, and anything costed at the `>16` fallback size).
    pub dheader: bool,
    /// Array dimensions, if this key's leaf is an array member.
    pub dims: Vec<u32>,
}

/// Saturation point for `keysz_xcdr1`/`keysz_xcdr2`: any running total past
/// this is reported as exactly this value, meaning "not fixed".
const NOT_FIXED: u32 = 17;
const FIXED_KEY_MAX: u32 = 16;

pub fn plan(pstate: &Pstate, desc: &mut Descriptor) -> CompileResult<()> {
    let node_to_tid: HashMap<NodeId, TypeId> = desc
        .constructed_types
        .iter()
        .enumerate()
        .map(|(i, ct)| (ct.node, i as TypeId))
        .collect();

    let mut keys = Vec::new();
    {
        let root_ct = &desc.constructed_types[desc.root as usize];
        let root_node = pstate.get(root_ct.node);
        match &root_node.kind {
            TypeKind::Struct(_) | TypeKind::Union(_) => {
                collect_keys(
                    pstate,
                    desc,
                    &node_to_tid,
                    desc.root,
                    "",
                    &[],
                    &[],
                    false,
                    &mut keys,
                )?;
            }
            other => {
                return Err(CompileError::Unsupported {
                    what: format!("root type {other:?} cannot carry keys"),
                    loc: root_node.loc.clone(),
                })
            }
        }
    }
    for (i, k) in keys.iter_mut().enumerate() {
        k.key_idx = i;
    }

    let keysz_xcdr1 = running_total(keys.iter(), 8, false);
    let mut by_order: Vec<&KeyMeta> = keys.iter().collect();
    by_order.sort_by(|a, b| a.order.cmp(&b.order));
    let keysz_xcdr2 = running_total(by_order.into_iter(), 4, true);

    desc.flags.fixed_key = keysz_xcdr1 <= FIXED_KEY_MAX;
    desc.flags.fixed_key_xcdr2 = keysz_xcdr2 <= FIXED_KEY_MAX;

    desc.key_offsets = build_key_offsets(&keys);
    desc.keys = keys;
    Ok(())
}

fn align_up(offset: u32, align: u32) -> u32 {
    let align = align.max(1);
    (offset + align - 1) / align * align
}

fn running_total<'a>(
    it: impl Iterator<Item = &'a KeyMeta>,
    max_align: u32,
    with_dheader: bool,
) -> u32 {
    let mut total = 0u32;
    for k in it {
        if total > FIXED_KEY_MAX {
            return NOT_FIXED;
        }
        total = align_up(total, k.align.min(max_align));
        let extra = if with_dheader && k.dheader { 4 } else { 0 };
        total = total.saturating_add(k.size).saturating_add(extra);
    }
    if total > FIXED_KEY_MAX {
        NOT_FIXED
    } else {
        total
    }
}

/// `{KOF(len), SINGLE(member_id<<16 | op_offset) × len}` per key.
fn build_key_offsets(keys: &[KeyMeta]) -> Vec<Instruction> {
    let mut out = Vec::new();
    for k in keys {
        out.push(Instruction::Opcode(OpWord::new(
            op::KOF,
            0,
            0,
            0,
            0,
            k.inst_offs.len().min(63) as u8,
        )));
        for (&offv, &idv) in k.inst_offs.iter().zip(k.order.iter()) {
            let packed = ((idv & 0xFFFF) << 16) | (offv & 0xFFFF);
            out.push(Instruction::Single(packed));
        }
    }
    out
}

/// Walks one struct/union's own members (plus, for structs, its base),
/// appending a [`KeyMeta`] for every key leaf reached. `force_all_keys`
/// implements the "parent_is_key" rule: the caller already determined this
/// whole type's members are implicit keys because the enclosing key member
/// pointed at an aggregate with no explicit `@key` of its own.
#[allow(clippy::too_many_arguments)]
fn collect_keys(
    pstate: &Pstate,
    desc: &Descriptor,
    node_to_tid: &HashMap<NodeId, TypeId>,
    tid: TypeId,
    prefix: &str,
    inst_offs: &[u32],
    order: &[u32],
    force_all_keys: bool,
    keys: &mut Vec<KeyMeta>,
) -> CompileResult<()> {
    let ct = &desc.constructed_types[tid as usize];
    let node = pstate.get(ct.node);
    match &node.kind {
        TypeKind::Struct(def) => {
            if let Some(base_id) = def.base {
                let base_tid = *node_to_tid.get(&base_id).ok_or_else(|| {
                    CompileError::Internal("base type missing its own table row".into())
                })?;
                collect_keys(
                    pstate,
                    desc,
                    node_to_tid,
                    base_tid,
                    prefix,
                    inst_offs,
                    order,
                    force_all_keys,
                    keys,
                )?;
            }
            for (idx, m) in def.members.iter().enumerate() {
                if !force_all_keys && !m.flags.key {
                    continue;
                }
                let op_off = ct.offset_in_flat_stream + ct.member_op_offsets[idx];
                let mut path_offs = inst_offs.to_vec();
                path_offs.push(op_off);
                let mut path_order = order.to_vec();
                path_order.push(m.member_id);
                let dotted = if prefix.is_empty() {
                    m.name.clone()
                } else {
                    format!("{prefix}.{}", m.name)
                };
                classify_member(
                    pstate,
                    desc,
                    node_to_tid,
                    m,
                    &dotted,
                    &path_offs,
                    &path_order,
                    keys,
                )?;
            }
            Ok(())
        }
        TypeKind::Union(def) => {
            if force_all_keys || def.key {
                let op_off = ct.offset_in_flat_stream + ct.member_op_offsets[0];
                let mut path_offs = inst_offs.to_vec();
                path_offs.push(op_off);
                let mut path_order = order.to_vec();
                path_order.push(0);
                keys.push(KeyMeta {
                    name: prefix.to_string(),
                    inst_offs: path_offs,
                    key_idx: 0,
                    order: path_order,
                    size: 4,
                    align: 4,
                    dheader: false,
                    dims: Vec::new(),
                });
            }
            Ok(())
        }
        other => Err(CompileError::Internal(format!(
            "collect_keys reached non-aggregate node kind {other:?}"
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
fn classify_member(
    pstate: &Pstate,
    desc: &Descriptor,
    node_to_tid: &HashMap<NodeId, TypeId>,
    m: &Member,
    dotted: &str,
    inst_offs: &[u32],
    order: &[u32],
    keys: &mut Vec<KeyMeta>,
) -> CompileResult<()> {
    let resolved = unalias(pstate, m.type_ref);
    let node = pstate.get(resolved);
    let loc = node.loc.clone();
    let leaf = |size: u32, align: u32, dheader: bool, dims: Vec<u32>| KeyMeta {
        name: dotted.to_string(),
        inst_offs: inst_offs.to_vec(),
        key_idx: 0,
        order: order.to_vec(),
        size,
        align,
        dheader,
        dims,
    };
    match &node.kind {
        TypeKind::Base(bt) => keys.push(leaf(bt.width(), bt.width(), false, Vec::new())),
        TypeKind::String { bound } | TypeKind::WString { bound } => {
            // Bounded string key CDR carries its own 4-byte length prefix
            // ahead of the bytes + NUL, so the leaf costs 4 + bound + 1 at
            // 4-byte alignment, not just the byte count.
            let size = bound
                .map(|b| 4 + b + 1)
                .filter(|s| *s <= FIXED_KEY_MAX)
                .unwrap_or(NOT_FIXED);
            keys.push(leaf(size, 4, false, Vec::new()));
        }
        TypeKind::Enum(_) => keys.push(leaf(4, 4, false, Vec::new())),
        TypeKind::Bitmask(def) => {
            let size = bitmask_byte_size(def.bit_bound);
            keys.push(leaf(size, size, false, Vec::new()));
        }
        TypeKind::Array(arr) => {
            let elem_resolved = unalias(pstate, arr.element);
            let (size, align) = match &pstate.get(elem_resolved).kind {
                TypeKind::Base(bt) => (bt.width() * arr.total_len(), bt.width()),
                TypeKind::Enum(_) => (4 * arr.total_len(), 4),
                TypeKind::Bitmask(def) => {
                    let es = bitmask_byte_size(def.bit_bound);
                    (es * arr.total_len(), es)
                }
                // Array of string/struct/union: no compact fixed-size
                // representation; costed at the non-fixed fallback rather
                // than rejected outright.
                _ => (NOT_FIXED, 1),
            };
            keys.push(leaf(size, align, true, arr.dims.clone()));
        }
        TypeKind::Struct(nested_def) => {
            let nested_tid = *node_to_tid
                .get(&resolved)
                .ok_or_else(|| CompileError::Internal("nested key struct missing table row".into()))?;
            let has_explicit_keys = nested_def.members.iter().any(|mm| mm.flags.key);
            collect_keys(
                pstate,
                desc,
                node_to_tid,
                nested_tid,
                dotted,
                inst_offs,
                order,
                !has_explicit_keys,
                keys,
            )?;
        }
        TypeKind::Union(_) => {
            return Err(CompileError::Unsupported {
                what: format!("key member '{dotted}' nests through a union"),
                loc,
            })
        }
        TypeKind::Sequence(_) => {
            return Err(CompileError::Unsupported {
                what: format!("key member '{dotted}' nests through a sequence"),
                loc,
            })
        }
        TypeKind::Alias(_) => unreachable!("unaliased above"),
        TypeKind::Forward => {
            return Err(CompileError::Unsupported {
                what: format!("key member '{dotted}' has an unresolved forward-declared type"),
                loc,
            })
        }
    }
    Ok(())
}

fn bitmask_byte_size(bit_bound: u8) -> u32 {
    match bit_bound {
        0..=8 => 1,
        9..=16 => 2,
        17..=32 => 4,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::test_support::*;
    use crate::ast::{Extensibility, Loc, MemberFlags, SequenceDef, StructDef};
    use crate::emit::emitter::compile;

    #[test]
    fn key_only_struct_yields_single_fixed_key() {
        let mut pstate = Pstate::new();
        let root = key_only_struct(&mut pstate);
        let desc = compile(&pstate, root).expect("compiles");
        assert_eq!(desc.keys.len(), 1);
        assert_eq!(desc.keys[0].name, "id");
        assert_eq!(desc.keys[0].size, 4);
        assert!(desc.flags.fixed_key);
        assert!(desc.flags.fixed_key_xcdr2);
    }

    #[test]
    fn nested_key_struct_with_no_explicit_keys_implicitly_keys_all_members() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let point = pstate.push(
            "Point",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("x", 0, i32_ty, false), member("y", 1, i32_ty, false)],
            }),
        );
        let root = pstate.push(
            "Shape",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("origin", 0, point, true)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        let names: Vec<&str> = desc.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["origin.x", "origin.y"]);
    }

    #[test]
    fn nested_key_struct_with_explicit_keys_uses_only_those() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let point = pstate.push(
            "Point",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("x", 0, i32_ty, true), member("y", 1, i32_ty, false)],
            }),
        );
        let root = pstate.push(
            "Shape",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("origin", 0, point, true)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        let names: Vec<&str> = desc.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["origin.x"]);
    }

    #[test]
    fn key_nested_through_sequence_is_rejected() {
        let mut pstate = Pstate::new();
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let seq = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::Sequence(SequenceDef { element: i32_ty, bound: None }),
        );
        let root = pstate.push(
            "S",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![Member {
                    member_id: 0,
                    name: "items".into(),
                    type_ref: seq,
                    flags: MemberFlags {
                        key: true,
                        ..Default::default()
                    },
                }],
            }),
        );
        let err = compile(&pstate, root).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }

    #[test]
    fn bounded_string_key_over_sixteen_bytes_is_not_fixed() {
        let mut pstate = Pstate::new();
        let str_ty = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::String { bound: Some(40) },
        );
        let root = pstate.push(
            "S",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![member("name", 0, str_ty, true)],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        assert!(!desc.flags.fixed_key);
    }

    #[test]
    fn bounded_string_key_followed_by_long_key_is_not_fixed() {
        // string<10> costs 4 (length prefix) + 10 + 1 (NUL) = 15 bytes at
        // 4-byte alignment; a trailing `@key long` rounds that up to 16
        // before adding its own 4 bytes, landing at 20 -- past the 16-byte
        // fixed-key cap.
        let mut pstate = Pstate::new();
        let str_ty = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::String { bound: Some(10) },
        );
        let i32_ty = base(&mut pstate, BaseType::Int32);
        let root = pstate.push(
            "S",
            vec![],
            Loc::unknown(),
            TypeKind::Struct(StructDef {
                extensibility: Extensibility::Final,
                base: None,
                members: vec![
                    member("name", 0, str_ty, true),
                    member("id", 1, i32_ty, true),
                ],
            }),
        );
        let desc = compile(&pstate, root).expect("compiles");
        assert!(!desc.flags.fixed_key);
        assert!(!desc.flags.fixed_key_xcdr2);
    }
}
