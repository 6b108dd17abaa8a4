// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The serializer interpreter: walks a [`Descriptor`]'s op stream against a
//! [`Value`] tree to produce or consume CDR bytes, a dynamic encoder/decoder
//! generalized from walking a typed value tree to walking an op stream.
//!
//! Base scalars carry only a width class in the op stream (`Ty::Bool1By`
//! .. `Ty::U8By`), not a signedness or float-ness — there is no generated
//! struct field here to recover that from. Encoding accepts any [`Value`]
//! scalar whose width matches; decoding
//! always produces the canonical unsigned variant of that width (`U8`,
//! `U16`, `U32`, `U64`). Round-tripping a `Value` through encode then
//! decode therefore reproduces the same *bytes*, not always the same enum
//! variant — see `DESIGN.md`.
//!
//! A `MUTABLE` type's inherited base is re-framed here as a pseudo-member
//! with a reserved id ([`MUTABLE_BASE_ID`]) rather than the bare inline
//! jump the op stream itself uses for it, so the base's bytes get their
//! own `EMHEADER`/length and can be skipped by a reader that predates the
//! base type the same way any other unrecognised member would be. Also
//! documented in `DESIGN.md`.

use super::value::{StructValue, UnionValue, Value};
use crate::emit::ops::{flag, op, Instruction, OpWord, Ty};
use crate::emit::{CtKind, ConstructedType, Descriptor, TypeId};
use crate::error::RuntimeError;
use crate::wire::cursor::{Cursor, CursorMut};
use crate::wire::pl_cdr2;

/// Reserved member id used to frame a `MUTABLE` type's inherited
/// base as one `EMHEADER`-wrapped unit. Declared member ids in this crate
/// come from small ascending indices, so this sentinel is chosen well out
/// of their range.
const MUTABLE_BASE_ID: u32 = 0x3FFF_FFFE;

fn bad_data(reason: impl Into<String>) -> RuntimeError {
    let reason = reason.into();
    log::debug!("[SER] bad data while walking op stream: {reason}");
    RuntimeError::BadData {
        reason,
        op_offset: 0,
    }
}

/// Serializes `value` against `desc`'s root type.
pub fn encode(desc: &Descriptor, value: &Value) -> Result<Vec<u8>, RuntimeError> {
    let mut cur = CursorMut::new();
    encode_ct(desc, desc.root, value, &mut cur)?;
    Ok(cur.into_bytes())
}

/// Deserializes `bytes` against `desc`'s root type.
pub fn decode(desc: &Descriptor, bytes: &[u8]) -> Result<Value, RuntimeError> {
    let mut cur = Cursor::new(bytes);
    decode_ct(desc, desc.root, &mut cur)
}

/// Computes the canonical XCDR2 key-CDR for `value`: every key member's own
/// bytes, concatenated with no DHEADER/EMHEADER framing, in the same
/// ascending-member-id order `keys::plan` sorted `desc.key_offsets` into.
/// Two samples that agree on every `@key` member produce identical bytes
/// here regardless of what their non-key members hold.
pub fn key_cdr(desc: &Descriptor, value: &Value) -> Result<Vec<u8>, RuntimeError> {
    let mut cur = CursorMut::new();
    let mut i = 0;
    while i < desc.key_offsets.len() {
        let len = match desc.key_offsets.get(i) {
            Some(Instruction::Opcode(w)) if w.op() == op::KOF => w.order_or_len() as usize,
            other => {
                return Err(bad_data(format!(
                    "expected a KOF entry in the key-offset stream, found {other:?}"
                )))
            }
        };
        i += 1;
        let mut path = Vec::with_capacity(len);
        for _ in 0..len {
            match desc.key_offsets.get(i) {
                Some(Instruction::Single(packed)) => path.push(*packed & 0xFFFF),
                other => {
                    return Err(bad_data(format!(
                        "expected a SINGLE key-offset entry, found {other:?}"
                    )))
                }
            }
            i += 1;
        }
        encode_key_path(desc, &path, value, &mut cur)?;
    }
    Ok(cur.into_bytes())
}

/// Walks one key's root-to-leaf chain of flat op-stream offsets, descending
/// through [`Value::Struct`] fields (hopping over `.base` wherever the
/// owning type's table row sits in an ancestor's flat-stream range) until
/// the leaf member is reached, then writes that member's bytes with the
/// same per-type dispatch [`encode_member`] uses for ordinary encoding.
fn encode_key_path(
    desc: &Descriptor,
    path: &[u32],
    root_value: &Value,
    cur: &mut CursorMut,
) -> Result<(), RuntimeError> {
    let mut tid = desc.root;
    let mut value = root_value;
    for (level, &flat_off) in path.iter().enumerate() {
        let (owner_tid, local) = locate_in_flat_stream(desc, flat_off)?;
        value = descend_to_owner(desc, tid, value, owner_tid)?;
        tid = owner_tid;
        let ct = &desc.constructed_types[tid as usize];

        if ct.kind == CtKind::Union {
            let uv = value
                .as_union()
                .ok_or_else(|| bad_data(format!("expected a union value for '{}'", ct.scope)))?;
            cur.write_i32(uv.discriminant);
            return Ok(());
        }

        let field_index = locate_field(ct, local)?;
        let (adr_local, w) = leading_member_word(ct, local)?;
        let sv = value
            .as_struct()
            .ok_or_else(|| bad_data(format!("expected a struct value for '{}'", ct.scope)))?;
        let field_value = sv.fields.get(field_index).ok_or_else(|| {
            bad_data(format!("field {field_index} missing in '{}'", ct.scope))
        })?;

        if level == path.len() - 1 {
            encode_member(desc, &ct.instructions, adr_local, w, field_value, cur)?;
            return Ok(());
        }
        let next_tid = nested_target(ct, adr_local, w)?.ok_or_else(|| {
            bad_data(format!(
                "key path continues past non-aggregate member {field_index} of '{}'",
                ct.scope
            ))
        })?;
        value = field_value;
        tid = next_tid;
    }
    Ok(())
}

/// Finds the constructed type whose flat-stream range contains `flat_off`,
/// and the position within its own `instructions` the offset corresponds
/// to.
fn locate_in_flat_stream(desc: &Descriptor, flat_off: u32) -> Result<(TypeId, usize), RuntimeError> {
    for (idx, ct) in desc.constructed_types.iter().enumerate() {
        let start = ct.offset_in_flat_stream;
        let end = start + ct.instructions.len() as u32;
        if flat_off >= start && flat_off < end {
            return Ok((idx as TypeId, (flat_off - start) as usize));
        }
    }
    Err(bad_data(format!(
        "key offset {flat_off} is not within any constructed type's flat-stream range"
    )))
}

/// Reverses `ct.member_op_offsets`: which declared member (by its own
/// declaration-order index, matching [`StructValue::fields`]) owns the
/// leading opcode at local position `local`.
fn locate_field(ct: &ConstructedType, local: usize) -> Result<usize, RuntimeError> {
    ct.member_op_offsets
        .iter()
        .position(|&off| off as usize == local)
        .ok_or_else(|| {
            bad_data(format!(
                "key-offset position {local} is not a declared member of '{}'",
                ct.scope
            ))
        })
}

/// Resolves a key path step's leading opcode: `PLM` (`MUTABLE`) sits one
/// word ahead of the `ADR` it jumps to, while `FINAL`/`APPENDABLE` members
/// start directly on their `ADR`. Returns the `ADR`'s own local index and
/// word either way.
fn leading_member_word(ct: &ConstructedType, local: usize) -> Result<(usize, OpWord), RuntimeError> {
    match ct.instructions.get(local) {
        Some(Instruction::Opcode(w)) if w.op() == op::PLM => match ct.instructions.get(local + 1) {
            Some(Instruction::Opcode(adr)) => Ok((local + 1, *adr)),
            other => Err(bad_data(format!("PLM missing its ADR: {other:?}"))),
        },
        Some(Instruction::Opcode(w)) if w.op() == op::ADR => Ok((local, *w)),
        other => Err(bad_data(format!(
            "expected an ADR or PLM at key-offset position {local}, found {other:?}"
        ))),
    }
}

/// If the member at `adr_local` addresses a nested struct/union, the table
/// id its `Reloc` points at -- `None` for a leaf (scalar/string/enum/
/// bitmask/array) member.
fn nested_target(ct: &ConstructedType, adr_local: usize, w: OpWord) -> Result<Option<TypeId>, RuntimeError> {
    if w.ty() != Ty::Stu.as_u8() && w.ty() != Ty::Uni.as_u8() {
        return Ok(None);
    }
    match ct.instructions.get(adr_local + 2) {
        Some(Instruction::Reloc(r)) => Ok(Some(r.target)),
        other => Err(bad_data(format!(
            "nested key member is missing its relocation: {other:?}"
        ))),
    }
}

/// Steps `value` through `StructValue::base` until it reaches the struct
/// owned by `owner_tid`, following the same `ADR|BASE`/`PLM|BASE`
/// relocation ordinary decoding uses to find a type's base.
fn descend_to_owner<'a>(
    desc: &Descriptor,
    mut tid: TypeId,
    mut value: &'a Value,
    owner_tid: TypeId,
) -> Result<&'a Value, RuntimeError> {
    while tid != owner_tid {
        let ct = &desc.constructed_types[tid as usize];
        let base_tid = base_of(ct)?.ok_or_else(|| {
            bad_data(format!(
                "key path expects an ancestor of '{}' that its base chain doesn't have",
                ct.scope
            ))
        })?;
        let sv = value
            .as_struct()
            .ok_or_else(|| bad_data(format!("expected a struct value for '{}'", ct.scope)))?;
        value = sv
            .base
            .as_deref()
            .ok_or_else(|| bad_data(format!("'{}' expects a base value", ct.scope)))?;
        tid = base_tid;
    }
    Ok(value)
}

/// Dispatches on a constructed type's shape (struct / union / enum /
/// bitmask / anonymous container each get one table row).
fn encode_ct(
    desc: &Descriptor,
    tid: TypeId,
    value: &Value,
    cur: &mut CursorMut,
) -> Result<(), RuntimeError> {
    let ct = &desc.constructed_types[tid as usize];
    match ct.kind {
        CtKind::Struct => encode_struct(desc, ct, value, cur),
        CtKind::Union => encode_union(desc, ct, value, cur),
        CtKind::Enum | CtKind::Bitmask | CtKind::Container => {
            let w = leading_opcode(ct, 0)?;
            encode_member(desc, &ct.instructions, 0, w, value, cur).map(|_| ())
        }
    }
}

fn decode_ct(desc: &Descriptor, tid: TypeId, cur: &mut Cursor<'_>) -> Result<Value, RuntimeError> {
    let ct = &desc.constructed_types[tid as usize];
    match ct.kind {
        CtKind::Struct => decode_struct(desc, ct, cur),
        CtKind::Union => decode_union(desc, ct, cur),
        CtKind::Enum | CtKind::Bitmask | CtKind::Container => {
            let w = leading_opcode(ct, 0)?;
            let (_, v) = decode_member(desc, &ct.instructions, 0, w, cur)?;
            Ok(v)
        }
    }
}

fn leading_opcode(ct: &ConstructedType, at: usize) -> Result<OpWord, RuntimeError> {
    match ct.instructions.get(at) {
        Some(Instruction::Opcode(w)) => Ok(*w),
        other => Err(bad_data(format!(
            "expected opcode word at local offset {at} in type '{}', found {other:?}",
            ct.scope
        ))),
    }
}

/// Returns the body's starting instruction index and whether this type's
/// own stream opens with a `DLC` (`APPENDABLE`) or `PLC` (`MUTABLE`)
/// header word.
fn header_kind(ct: &ConstructedType) -> Result<(usize, bool, bool), RuntimeError> {
    match ct.instructions.first() {
        Some(Instruction::Opcode(w)) if w.op() == op::DLC => Ok((1, true, false)),
        Some(Instruction::Opcode(w)) if w.op() == op::PLC => Ok((1, false, true)),
        Some(Instruction::Opcode(_)) => Ok((0, false, false)),
        other => Err(bad_data(format!("empty or malformed instruction stream: {other:?}"))),
    }
}

/// Finds the base type a constructed type's leading `ADR|BASE`/`PLM|BASE`
/// entry points its relocation at, if it has one.
fn base_of(ct: &ConstructedType) -> Result<Option<TypeId>, RuntimeError> {
    let (start, _, _) = header_kind(ct)?;
    match ct.instructions.get(start) {
        Some(Instruction::Opcode(w)) if w.op() == op::ADR && w.has_flag(flag::BASE) => {
            match ct.instructions.get(start + 2) {
                Some(Instruction::Reloc(r)) => Ok(Some(r.target)),
                other => Err(bad_data(format!("ADR|BASE missing its relocation: {other:?}"))),
            }
        }
        Some(Instruction::Opcode(w)) if w.op() == op::PLM && w.has_flag(flag::BASE) => {
            match ct.instructions.get(start + 1) {
                Some(Instruction::Reloc(r)) => Ok(Some(r.target)),
                other => Err(bad_data(format!("PLM|BASE missing its relocation: {other:?}"))),
            }
        }
        _ => Ok(None),
    }
}

/// Number of instruction words (opcode included) a member's full operand
/// list occupies, derived purely from the op stream's own shape — used to
/// step `i` without having to encode or decode a value first.
fn member_span(w: OpWord) -> usize {
    let ty = w.ty();
    let base = if ty == Ty::Str.as_u8() {
        2
    } else if ty == Ty::BStr.as_u8() {
        3
    } else if ty == Ty::Enu.as_u8() {
        3
    } else if ty == Ty::Bmk.as_u8() {
        4
    } else if ty == Ty::Stu.as_u8() || ty == Ty::Uni.as_u8() {
        3
    } else if ty == Ty::Seq.as_u8() {
        4
    } else if ty == Ty::BSeq.as_u8() {
        5
    } else if ty == Ty::Arr.as_u8() {
        5
    } else {
        2
    };
    // `emit_member` appends one extra trailing `MemberSize` word for
    // `@external`/`@optional` members, after the type-specific operands.
    if w.has_flag(flag::OPT) || w.has_flag(flag::EXT) {
        base + 1
    } else {
        base
    }
}

/// Scans a `FINAL`/`APPENDABLE` struct's own-member region (after any
/// base entry) and returns each member's `(field_index, opcode position)`
/// in declaration order.
fn final_members(
    ct: &ConstructedType,
    mut i: usize,
) -> Result<Vec<(u32, usize)>, RuntimeError> {
    let mut out = Vec::new();
    while let Some(instr) = ct.instructions.get(i) {
        match instr {
            Instruction::Opcode(w) if w.op() == op::RTS => break,
            Instruction::Opcode(w) if w.op() == op::ADR => {
                let field_index = read_offset(&ct.instructions, i + 1)?;
                out.push((field_index, i));
                i += member_span(*w);
            }
            other => {
                return Err(bad_data(format!(
                    "unexpected instruction {other:?} in struct '{}'",
                    ct.scope
                )))
            }
        }
    }
    Ok(out)
}

/// Scans a `MUTABLE` struct's own-member region and returns each
/// `(member_id, opcode position, opcode word)`.
fn mutable_members(
    ct: &ConstructedType,
    mut i: usize,
) -> Result<Vec<(u32, usize, OpWord)>, RuntimeError> {
    let mut out = Vec::new();
    while let Some(instr) = ct.instructions.get(i) {
        match instr {
            Instruction::Opcode(w) if w.op() == op::RTS => break,
            Instruction::Opcode(w) if w.op() == op::PLM => {
                let member_w = match ct.instructions.get(i + 1) {
                    Some(Instruction::Opcode(w2)) => *w2,
                    other => return Err(bad_data(format!("PLM missing its ADR: {other:?}"))),
                };
                let field_index = read_offset(&ct.instructions, i + 2)?;
                out.push((field_index, i + 1, member_w));
                i += 1 + member_span(member_w);
            }
            other => {
                return Err(bad_data(format!(
                    "unexpected instruction {other:?} in mutable struct '{}'",
                    ct.scope
                )))
            }
        }
    }
    Ok(out)
}

fn encode_struct(
    desc: &Descriptor,
    ct: &ConstructedType,
    value: &Value,
    cur: &mut CursorMut,
) -> Result<(), RuntimeError> {
    let sv = value
        .as_struct()
        .ok_or_else(|| bad_data(format!("expected a struct value for '{}'", ct.scope)))?;
    let (start, appendable, mutable) = header_kind(ct)?;
    if mutable {
        let body = |cur: &mut CursorMut| -> Result<(), RuntimeError> {
            let base_target = base_of(ct)?;
            let members_start = if base_target.is_some() { start + 2 } else { start };
            if let Some(target) = base_target {
                let base_val = sv
                    .base
                    .as_deref()
                    .ok_or_else(|| bad_data(format!("'{}' expects a base value", ct.scope)))?;
                pl_cdr2::encode_member(cur, MUTABLE_BASE_ID, true, |c| {
                    encode_ct(desc, target, base_val, c)
                })?;
            }
            for (field_index, pos, member_w) in mutable_members(ct, members_start)? {
                let field = sv.fields.get(field_index as usize).ok_or_else(|| {
                    bad_data(format!("field {field_index} missing in '{}'", ct.scope))
                })?;
                if matches!(field, Value::Absent) {
                    continue;
                }
                pl_cdr2::encode_member(cur, field_index, member_w.has_flag(flag::MU), |c| {
                    encode_member(desc, &ct.instructions, pos, member_w, field, c).map(|_| ())
                })?;
            }
            Ok(())
        };
        return pl_cdr2::encode_delimited(cur, body);
    }

    let base_target = base_of(ct)?;
    let members_start = if base_target.is_some() { start + 3 } else { start };
    let body = |cur: &mut CursorMut| -> Result<(), RuntimeError> {
        if let Some(target) = base_target {
            let base_val = sv
                .base
                .as_deref()
                .ok_or_else(|| bad_data(format!("'{}' expects a base value", ct.scope)))?;
            encode_ct(desc, target, base_val, cur)?;
        }
        for (field_index, pos) in final_members(ct, members_start)? {
            let w = leading_opcode(ct, pos)?;
            let field = sv.fields.get(field_index as usize).ok_or_else(|| {
                bad_data(format!("field {field_index} missing in '{}'", ct.scope))
            })?;
            if w.has_flag(flag::OPT) {
                cur.write_bool(!matches!(field, Value::Absent));
                if matches!(field, Value::Absent) {
                    continue;
                }
            }
            encode_member(desc, &ct.instructions, pos, w, field, cur)?;
        }
        Ok(())
    };
    if appendable {
        pl_cdr2::encode_delimited(cur, body)
    } else {
        body(cur)
    }
}

fn decode_struct(
    desc: &Descriptor,
    ct: &ConstructedType,
    cur: &mut Cursor<'_>,
) -> Result<Value, RuntimeError> {
    let (start, appendable, mutable) = header_kind(ct)?;
    if mutable {
        let end = pl_cdr2::decode_delimited_header(cur)?;
        let base_target = base_of(ct)?;
        let members_start = if base_target.is_some() { start + 2 } else { start };
        let members = mutable_members(ct, members_start)?;
        let mut base: Option<Box<Value>> = None;
        let mut fields: Vec<Option<Value>> = Vec::new();
        while cur.offset() < end {
            let m = pl_cdr2::decode_member_header(cur)?;
            if base_target.is_some() && m.member_id == MUTABLE_BASE_ID {
                base = Some(Box::new(decode_ct(desc, base_target.unwrap(), cur)?));
            } else if let Some((field_index, pos, member_w)) =
                members.iter().find(|(id, _, _)| *id == m.member_id)
            {
                let (_, v) = decode_member(desc, &ct.instructions, *pos, *member_w, cur)?;
                set_field(&mut fields, *field_index, v);
            }
            if cur.offset() < m.payload_end {
                cur.skip(m.payload_end - cur.offset())?;
            }
        }
        return Ok(Value::Struct(StructValue {
            base,
            fields: fields.into_iter().map(|f| f.unwrap_or(Value::Absent)).collect(),
        }));
    }

    let end = if appendable {
        Some(pl_cdr2::decode_delimited_header(cur)?)
    } else {
        None
    };
    let base_target = base_of(ct)?;
    let members_start = if base_target.is_some() { start + 3 } else { start };
    let base = match base_target {
        Some(target) => Some(Box::new(decode_ct(desc, target, cur)?)),
        None => None,
    };
    let mut fields: Vec<Option<Value>> = Vec::new();
    for (field_index, pos) in final_members(ct, members_start)? {
        let w = leading_opcode(ct, pos)?;
        if w.has_flag(flag::OPT) {
            let present = cur.read_bool()?;
            if !present {
                set_field(&mut fields, field_index, Value::Absent);
                continue;
            }
        }
        let (_, v) = decode_member(desc, &ct.instructions, pos, w, cur)?;
        set_field(&mut fields, field_index, v);
    }
    if let Some(end) = end {
        if cur.offset() < end {
            cur.skip(end - cur.offset())?;
        }
    }
    Ok(Value::Struct(StructValue {
        base,
        fields: fields.into_iter().map(|f| f.unwrap_or(Value::Absent)).collect(),
    }))
}

fn set_field(fields: &mut Vec<Option<Value>>, index: u32, v: Value) {
    let index = index as usize;
    if fields.len() <= index {
        fields.resize_with(index + 1, || None);
    }
    fields[index] = Some(v);
}

fn encode_union(
    desc: &Descriptor,
    ct: &ConstructedType,
    value: &Value,
    cur: &mut CursorMut,
) -> Result<(), RuntimeError> {
    let uv = value
        .as_union()
        .ok_or_else(|| bad_data(format!("expected a union value for '{}'", ct.scope)))?;
    let (start, appendable, mutable) = header_kind(ct)?;
    // A MUTABLE union gets the same DHEADER framing as an APPENDABLE one at
    // the wire level; unlike a struct it has only one active member, so
    // there is no per-case EMHEADER to additionally frame.
    let appendable = appendable || mutable;
    let body = |cur: &mut CursorMut| -> Result<(), RuntimeError> {
        let disc_w = leading_opcode(ct, start)?;
        let disc_has_max = matches!(ct.instructions.get(start + 2), Some(Instruction::Constant(_)));
        let disc_consumed = if disc_has_max { 3 } else { 2 };
        encode_discriminant(disc_w.ty(), uv.discriminant, cur);
        let couple_at = start + disc_consumed;
        let (total, first) = match ct.instructions.get(couple_at) {
            Some(Instruction::Couple(t, f)) => (*t as usize, *f as usize),
            other => return Err(bad_data(format!("union missing case table Couple: {other:?}"))),
        };
        let mut i = first;
        let mut matched = false;
        for _ in 0..total {
            let w = match ct.instructions.get(i) {
                Some(Instruction::Opcode(w)) if w.op() == op::JEQ4 => *w,
                other => return Err(bad_data(format!("expected JEQ4 entry: {other:?}"))),
            };
            let label = match ct.instructions.get(i + 1) {
                Some(Instruction::Constant(c)) => *c,
                other => return Err(bad_data(format!("JEQ4 missing label: {other:?}"))),
            };
            if label as i32 == uv.discriminant {
                matched = true;
                if w.has_flag(flag::EXT) {
                    let target = match ct.instructions.get(i + 3) {
                        Some(Instruction::Reloc(r)) => r.target,
                        other => {
                            return Err(bad_data(format!(
                                "aggregated JEQ4 missing reloc: {other:?}"
                            )))
                        }
                    };
                    encode_ct(desc, target, &uv.value, cur)?;
                } else {
                    encode_jeq_scalar(w, &uv.value, cur)?;
                }
                break;
            }
            i += 4;
        }
        if !matched {
            return Err(bad_data(format!(
                "no union case matches discriminant {}",
                uv.discriminant
            )));
        }
        Ok(())
    };
    if appendable {
        pl_cdr2::encode_delimited(cur, body)
    } else {
        body(cur)
    }
}

fn decode_union(
    desc: &Descriptor,
    ct: &ConstructedType,
    cur: &mut Cursor<'_>,
) -> Result<Value, RuntimeError> {
    let (start, appendable, mutable) = header_kind(ct)?;
    // A MUTABLE union gets the same DHEADER framing as an APPENDABLE one at
    // the wire level; unlike a struct it has only one active member, so
    // there is no per-case EMHEADER to additionally frame.
    let appendable = appendable || mutable;
    let end = if appendable {
        Some(pl_cdr2::decode_delimited_header(cur)?)
    } else {
        None
    };
    let disc_w = leading_opcode(ct, start)?;
    let disc_has_max = matches!(ct.instructions.get(start + 2), Some(Instruction::Constant(_)));
    let disc_consumed = if disc_has_max { 3 } else { 2 };
    let disc = decode_scalar_ty(disc_w.ty(), cur)?;
    let discriminant = match disc {
        Value::U32(v) => v as i32,
        Value::U16(v) => v as i32,
        Value::U8(v) => v as i32,
        Value::U64(v) => v as i32,
        Value::Enum(v) => v,
        other => return Err(bad_data(format!("unexpected discriminant shape: {other:?}"))),
    };
    let couple_at = start + disc_consumed;
    let (total, first) = match ct.instructions.get(couple_at) {
        Some(Instruction::Couple(t, f)) => (*t as usize, *f as usize),
        other => return Err(bad_data(format!("union missing case table Couple: {other:?}"))),
    };
    let mut i = first;
    let mut result = None;
    for _ in 0..total {
        let cw = match ct.instructions.get(i) {
            Some(Instruction::Opcode(w)) if w.op() == op::JEQ4 => *w,
            other => return Err(bad_data(format!("expected JEQ4 entry: {other:?}"))),
        };
        let label = match ct.instructions.get(i + 1) {
            Some(Instruction::Constant(c)) => *c,
            other => return Err(bad_data(format!("JEQ4 missing label: {other:?}"))),
        };
        if label as i32 == discriminant {
            result = Some(if cw.has_flag(flag::EXT) {
                let target = match ct.instructions.get(i + 3) {
                    Some(Instruction::Reloc(r)) => r.target,
                    other => {
                        return Err(bad_data(format!("aggregated JEQ4 missing reloc: {other:?}")))
                    }
                };
                decode_ct(desc, target, cur)?
            } else {
                decode_jeq_scalar(cw, cur)?
            });
            break;
        }
        i += 4;
    }
    let value = result
        .ok_or_else(|| bad_data(format!("no union case matches discriminant {discriminant}")))?;
    if let Some(end) = end {
        if cur.offset() < end {
            cur.skip(end - cur.offset())?;
        }
    }
    Ok(Value::Union(UnionValue {
        discriminant,
        value: Box::new(value),
    }))
}

fn read_offset(instrs: &[Instruction], at: usize) -> Result<u32, RuntimeError> {
    match instrs.get(at) {
        Some(Instruction::Offset(v)) => Ok(*v),
        other => Err(bad_data(format!("expected OFFSET word, found {other:?}"))),
    }
}

fn width_for_ty(ty: u8) -> usize {
    if ty == Ty::Bool1By.as_u8() {
        1
    } else if ty == Ty::U2By.as_u8() {
        2
    } else if ty == Ty::U4By.as_u8() {
        4
    } else {
        8
    }
}

fn bitmask_wire_width(subtype: u8) -> usize {
    match subtype {
        1 => 2,
        2 => 4,
        _ => 8,
    }
}

fn encode_scalar_ty(_ty: u8, value: &Value, cur: &mut CursorMut) -> Result<(), RuntimeError> {
    match value {
        Value::Bool(b) => cur.write_bool(*b),
        Value::I8(v) => cur.write_i8(*v),
        Value::U8(v) => cur.write_u8(*v),
        Value::I16(v) => cur.write_i16(*v),
        Value::U16(v) => cur.write_u16(*v),
        Value::I32(v) => cur.write_i32(*v),
        Value::U32(v) => cur.write_u32(*v),
        Value::I64(v) => cur.write_i64(*v),
        Value::U64(v) => cur.write_u64(*v),
        Value::F32(v) => cur.write_f32(*v),
        Value::F64(v) => cur.write_f64(*v),
        Value::Enum(v) => cur.write_i32(*v),
        other => return Err(bad_data(format!("cannot encode {other:?} as a scalar"))),
    }
    Ok(())
}

/// Writes a union discriminant at its declared width; unlike a regular
/// member's [`Value`], the live discriminant is always kept as a plain
/// `i32` in [`UnionValue`], so this narrows it on the way out instead of
/// going through [`encode_scalar_ty`]'s by-variant dispatch.
fn encode_discriminant(ty: u8, discriminant: i32, cur: &mut CursorMut) {
    if ty == Ty::Enu.as_u8() {
        cur.write_i32(discriminant);
        return;
    }
    match width_for_ty(ty) {
        1 => cur.write_u8(discriminant as u8),
        2 => cur.write_u16(discriminant as u16),
        4 => cur.write_i32(discriminant),
        _ => cur.write_i64(discriminant as i64),
    }
}

fn decode_scalar_ty(ty: u8, cur: &mut Cursor<'_>) -> Result<Value, RuntimeError> {
    if ty == Ty::Enu.as_u8() {
        return Ok(Value::Enum(cur.read_i32()?));
    }
    Ok(match width_for_ty(ty) {
        1 => Value::U8(cur.read_u8()?),
        2 => Value::U16(cur.read_u16()?),
        4 => Value::U32(cur.read_u32()?),
        _ => Value::U64(cur.read_u64()?),
    })
}

/// Encodes a non-aggregated JEQ4 union case's value. `emit_union_case`
/// folds only the case type's `ty`/`subtype`/`size` nibbles back into the
/// opcode word it already pushed, discarding any extra operand words a
/// sequence or array element descriptor would need — so those two shapes
/// are reported as unsupported here rather than decoded wrong.
fn encode_jeq_scalar(w: OpWord, value: &Value, cur: &mut CursorMut) -> Result<(), RuntimeError> {
    let ty = w.ty();
    if ty == Ty::Str.as_u8() || ty == Ty::BStr.as_u8() {
        return match value {
            Value::Str(s) => {
                cur.write_str(s);
                Ok(())
            }
            other => Err(bad_data(format!("expected a string, found {other:?}"))),
        };
    }
    if ty == Ty::Bmk.as_u8() {
        return match value {
            Value::Bitmask(v) => {
                match bitmask_wire_width(w.subtype()) {
                    2 => cur.write_u16(*v as u16),
                    4 => cur.write_u32(*v as u32),
                    _ => cur.write_u64(*v),
                }
                Ok(())
            }
            other => Err(bad_data(format!("expected a bitmask, found {other:?}"))),
        };
    }
    if ty == Ty::Seq.as_u8() || ty == Ty::BSeq.as_u8() || ty == Ty::Arr.as_u8() {
        return Err(RuntimeError::Unsupported(
            "union case of sequence/array type without an aggregated element descriptor".into(),
        ));
    }
    encode_scalar_ty(ty, value, cur)
}

fn decode_jeq_scalar(w: OpWord, cur: &mut Cursor<'_>) -> Result<Value, RuntimeError> {
    let ty = w.ty();
    if ty == Ty::Str.as_u8() || ty == Ty::BStr.as_u8() {
        return Ok(Value::Str(cur.read_str()?));
    }
    if ty == Ty::Bmk.as_u8() {
        let v = match bitmask_wire_width(w.subtype()) {
            2 => cur.read_u16()? as u64,
            4 => cur.read_u32()? as u64,
            _ => cur.read_u64()?,
        };
        return Ok(Value::Bitmask(v));
    }
    if ty == Ty::Seq.as_u8() || ty == Ty::BSeq.as_u8() || ty == Ty::Arr.as_u8() {
        return Err(RuntimeError::Unsupported(
            "union case of sequence/array type without an aggregated element descriptor".into(),
        ));
    }
    decode_scalar_ty(ty, cur)
}

/// Encodes one `ADR`-addressed member starting at `i`, the index of its
/// opcode word. Returns the number of instruction words the member's full
/// operand list occupies (opcode included) — equal to [`member_span`] for
/// the same opcode.
fn encode_member(
    desc: &Descriptor,
    instrs: &[Instruction],
    i: usize,
    w: OpWord,
    value: &Value,
    cur: &mut CursorMut,
) -> Result<usize, RuntimeError> {
    let ty = w.ty();
    if ty == Ty::Str.as_u8() || ty == Ty::BStr.as_u8() {
        let s = match value {
            Value::Str(s) => s,
            other => return Err(bad_data(format!("expected a string, found {other:?}"))),
        };
        cur.write_str(s);
        return Ok(member_span(w));
    }
    if ty == Ty::Enu.as_u8() {
        let v = match value {
            Value::Enum(v) => *v,
            other => return Err(bad_data(format!("expected an enum, found {other:?}"))),
        };
        cur.write_i32(v);
        return Ok(member_span(w));
    }
    if ty == Ty::Bmk.as_u8() {
        let v = match value {
            Value::Bitmask(v) => *v,
            other => return Err(bad_data(format!("expected a bitmask, found {other:?}"))),
        };
        match bitmask_wire_width(w.subtype()) {
            2 => cur.write_u16(v as u16),
            4 => cur.write_u32(v as u32),
            _ => cur.write_u64(v),
        }
        return Ok(member_span(w));
    }
    if ty == Ty::Stu.as_u8() || ty == Ty::Uni.as_u8() {
        let target = match instrs.get(i + 2) {
            Some(Instruction::Reloc(r)) => r.target,
            other => return Err(bad_data(format!("ADR missing its relocation: {other:?}"))),
        };
        encode_ct(desc, target, value, cur)?;
        return Ok(member_span(w));
    }
    if ty == Ty::Seq.as_u8() || ty == Ty::BSeq.as_u8() {
        let items = match value {
            Value::Sequence(v) => v,
            other => return Err(bad_data(format!("expected a sequence, found {other:?}"))),
        };
        let mut n = 2; // past ADR + Offset
        if ty == Ty::BSeq.as_u8() {
            let bound = match instrs.get(i + n) {
                Some(Instruction::Single(b)) => *b,
                other => return Err(bad_data(format!("bounded sequence missing its bound: {other:?}"))),
            };
            if items.len() as u32 > bound {
                return Err(bad_data("sequence exceeds its bound"));
            }
            n += 1;
        }
        cur.write_u32(items.len() as u32);
        let elem = element_spec(instrs, i + n)?;
        for item in items {
            encode_element(desc, &elem, item, cur)?;
        }
        return Ok(member_span(w));
    }
    if ty == Ty::Arr.as_u8() {
        let items = match value {
            Value::Array(v) => v,
            other => return Err(bad_data(format!("expected an array, found {other:?}"))),
        };
        let total_len = match instrs.get(i + 2) {
            Some(Instruction::Single(n)) => *n,
            other => return Err(bad_data(format!("array missing its total length: {other:?}"))),
        };
        if items.len() as u32 != total_len {
            return Err(bad_data("array length mismatch"));
        }
        let elem = element_spec(instrs, i + 3)?;
        for item in items {
            encode_element(desc, &elem, item, cur)?;
        }
        return Ok(member_span(w));
    }
    encode_scalar_ty(ty, value, cur)?;
    Ok(member_span(w))
}

fn decode_member(
    desc: &Descriptor,
    instrs: &[Instruction],
    i: usize,
    w: OpWord,
    cur: &mut Cursor<'_>,
) -> Result<(usize, Value), RuntimeError> {
    let ty = w.ty();
    if ty == Ty::Str.as_u8() || ty == Ty::BStr.as_u8() {
        return Ok((member_span(w), Value::Str(cur.read_str()?)));
    }
    if ty == Ty::Enu.as_u8() {
        return Ok((member_span(w), Value::Enum(cur.read_i32()?)));
    }
    if ty == Ty::Bmk.as_u8() {
        let v = match bitmask_wire_width(w.subtype()) {
            2 => cur.read_u16()? as u64,
            4 => cur.read_u32()? as u64,
            _ => cur.read_u64()?,
        };
        return Ok((member_span(w), Value::Bitmask(v)));
    }
    if ty == Ty::Stu.as_u8() || ty == Ty::Uni.as_u8() {
        let target = match instrs.get(i + 2) {
            Some(Instruction::Reloc(r)) => r.target,
            other => return Err(bad_data(format!("ADR missing its relocation: {other:?}"))),
        };
        return Ok((member_span(w), decode_ct(desc, target, cur)?));
    }
    if ty == Ty::Seq.as_u8() || ty == Ty::BSeq.as_u8() {
        let mut n = 2; // past ADR + Offset
        let mut bound = None;
        if ty == Ty::BSeq.as_u8() {
            bound = match instrs.get(i + n) {
                Some(Instruction::Single(b)) => Some(*b),
                other => return Err(bad_data(format!("bounded sequence missing its bound: {other:?}"))),
            };
            n += 1;
        }
        let len = cur.read_u32()?;
        if let Some(b) = bound {
            if len > b {
                return Err(bad_data("sequence exceeds its bound"));
            }
        }
        let elem = element_spec(instrs, i + n)?;
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(decode_element(desc, &elem, cur)?);
        }
        return Ok((member_span(w), Value::Sequence(items)));
    }
    if ty == Ty::Arr.as_u8() {
        let total_len = match instrs.get(i + 2) {
            Some(Instruction::Single(n)) => *n,
            other => return Err(bad_data(format!("array missing its total length: {other:?}"))),
        };
        let elem = element_spec(instrs, i + 3)?;
        let mut items = Vec::with_capacity(total_len as usize);
        for _ in 0..total_len {
            items.push(decode_element(desc, &elem, cur)?);
        }
        return Ok((member_span(w), Value::Array(items)));
    }
    Ok((member_span(w), decode_scalar_ty(ty, cur)?))
}

/// What a sequence/array's trailing `MEMBER_SIZE` + `Couple`/`Reloc` pair
/// describes: either a primitive element (`Couple`'s low word is the
/// element's own `Ty`) or a constructed element reached by relocation.
enum ElementSpec {
    Primitive(u8),
    Nested(TypeId),
}

fn element_spec(instrs: &[Instruction], at: usize) -> Result<ElementSpec, RuntimeError> {
    match instrs.get(at + 1) {
        Some(Instruction::Couple(_, ty)) => Ok(ElementSpec::Primitive(*ty as u8)),
        Some(Instruction::Reloc(r)) => Ok(ElementSpec::Nested(r.target)),
        other => Err(bad_data(format!("expected element descriptor, found {other:?}"))),
    }
}

fn encode_element(
    desc: &Descriptor,
    spec: &ElementSpec,
    value: &Value,
    cur: &mut CursorMut,
) -> Result<(), RuntimeError> {
    match spec {
        ElementSpec::Primitive(ty) if *ty == Ty::Str.as_u8() => match value {
            Value::Str(s) => {
                cur.write_str(s);
                Ok(())
            }
            other => Err(bad_data(format!("expected a string element, found {other:?}"))),
        },
        ElementSpec::Primitive(ty) => encode_scalar_ty(*ty, value, cur),
        ElementSpec::Nested(target) => encode_ct(desc, *target, value, cur),
    }
}

fn decode_element(
    desc: &Descriptor,
    spec: &ElementSpec,
    cur: &mut Cursor<'_>,
) -> Result<Value, RuntimeError> {
    match spec {
        ElementSpec::Primitive(ty) if *ty == Ty::Str.as_u8() => Ok(Value::Str(cur.read_str()?)),
        ElementSpec::Primitive(ty) => decode_scalar_ty(*ty, cur),
        ElementSpec::Nested(target) => decode_ct(desc, *target, cur),
    }
}
