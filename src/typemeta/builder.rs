// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builds `TypeObject`s from the AST and serializes the `TypeInformation`/
//! `TypeMapping` blobs the descriptor carries alongside the op-code stream.
//!
//! Every reachable constructed type gets one `Minimal` and one `Complete`
//! `TypeObject`; `Minimal`'s bytes feed [`EquivalenceHash::compute`] to
//! produce the `TypeIdentifier` most discovery traffic actually carries
//! (`Complete` objects are exchanged only on request, per X-Types, and so
//! are hashed separately for the rarer `Complete`-keyed lookup).
//!
//! This is a deliberately reduced XCDR2 encoding of `TypeObject`: enough
//! structure (discriminator tag, extensibility, member id/flags/type,
//! name) to produce a stable, collision-resistant hash input and a
//! decodable `TypeMapping` blob, but not a byte-for-byte rendition of the
//! X-Types Annex encoding a wire-interoperable implementation would need.
//! See `DESIGN.md`.

use super::equivalence::EquivalenceHash;
use super::type_identifier::TypeIdentifier;
use super::type_kind::base_type_kind;
use super::type_object::{
    AliasType, BitflagLiteral, BitmaskType, CollectionKind, CollectionType, CompleteStructMember,
    CompleteStructType, CompleteUnionMember, CompleteUnionType, EnumLiteral, EnumType,
    MemberFlags as ObjMemberFlags, MinimalStructMember, MinimalStructType, MinimalUnionMember,
    MinimalUnionType, TypeObject,
};
use crate::ast::{BaseType, Loc, NodeId, Pstate, TryConstruct, TypeKind};
use crate::emit::emitter::unalias;
use crate::error::{CompileError, CompileResult};
use crate::wire::cursor::CursorMut;
use std::collections::HashMap;

/// Every `TypeObject` (both flavours) and `TypeIdentifier` reachable from a
/// compiled root, plus the serialized blobs a `TopicDescriptor` embeds.
pub struct TypeMeta {
    pub minimal_objects: HashMap<NodeId, TypeObject>,
    pub complete_objects: HashMap<NodeId, TypeObject>,
    pub minimal_ids: HashMap<NodeId, TypeIdentifier>,
    pub complete_ids: HashMap<NodeId, TypeIdentifier>,
    pub root: NodeId,
}

impl TypeMeta {
    /// `TypeInformation`: `{ minimal: (dependent_typeids, identifier),
    /// complete: (dependent_typeids, identifier) }` for the root type,
    /// XCDR2-encoded.
    pub fn type_information_blob(&self) -> Vec<u8> {
        let mut c = CursorMut::new();
        encode_type_id(&mut c, &self.minimal_ids[&self.root]);
        encode_type_id(&mut c, &self.complete_ids[&self.root]);
        let mut deps: Vec<&NodeId> = self.minimal_ids.keys().filter(|n| **n != self.root).collect();
        deps.sort_unstable();
        c.write_u32(deps.len() as u32);
        for n in deps {
            encode_type_id(&mut c, &self.minimal_ids[n]);
        }
        c.into_bytes()
    }

    /// `TypeMapping`: every `(TypeIdentifier, TypeObject)` pair this
    /// compiler knows about, keyed by its hashed identifier, so a peer that
    /// only has a hash can ask for the object behind it.
    pub fn type_mapping_blob(&self) -> Vec<u8> {
        let mut c = CursorMut::new();
        let mut nodes: Vec<&NodeId> = self.minimal_ids.keys().collect();
        nodes.sort_unstable();
        c.write_u32(nodes.len() as u32);
        for n in nodes {
            encode_type_id(&mut c, &self.minimal_ids[n]);
            encode_type_object(&mut c, &self.minimal_objects[n]);
        }
        c.into_bytes()
    }
}

pub fn build(pstate: &Pstate, root: NodeId) -> CompileResult<TypeMeta> {
    let mut b = Builder {
        pstate,
        minimal_objects: HashMap::new(),
        complete_objects: HashMap::new(),
        minimal_ids: HashMap::new(),
        complete_ids: HashMap::new(),
        in_progress: Vec::new(),
    };
    let resolved_root = unalias(pstate, root);
    b.visit(resolved_root)?;
    Ok(TypeMeta {
        minimal_objects: b.minimal_objects,
        complete_objects: b.complete_objects,
        minimal_ids: b.minimal_ids,
        complete_ids: b.complete_ids,
        root: resolved_root,
    })
}

struct Builder<'a> {
    pstate: &'a Pstate,
    minimal_objects: HashMap<NodeId, TypeObject>,
    complete_objects: HashMap<NodeId, TypeObject>,
    minimal_ids: HashMap<NodeId, TypeIdentifier>,
    complete_ids: HashMap<NodeId, TypeIdentifier>,
    /// Guards against infinite recursion on self-referential aggregates;
    /// a node being built gets a zero hash placeholder until it completes.
    in_progress: Vec<NodeId>,
}

impl<'a> Builder<'a> {
    fn type_id_of(&mut self, id: NodeId) -> CompileResult<TypeIdentifier> {
        let resolved = unalias(self.pstate, id);
        let node = self.pstate.get(resolved);
        Ok(match &node.kind {
            TypeKind::Base(bt) => TypeIdentifier::primitive(base_type_kind(*bt)),
            TypeKind::String { bound } => TypeIdentifier::string(bound.unwrap_or(0)),
            TypeKind::WString { bound } => TypeIdentifier::wstring(bound.unwrap_or(0)),
            _ => {
                if !self.minimal_ids.contains_key(&resolved) {
                    self.visit(resolved)?;
                }
                self.minimal_ids[&resolved].clone()
            }
        })
    }

    fn visit(&mut self, id: NodeId) -> CompileResult<()> {
        if self.minimal_ids.contains_key(&id) {
            return Ok(());
        }
        if self.in_progress.contains(&id) {
            // Cyclic reference: placeholder, patched once the enclosing
            // call completes and re-inserts the real hash.
            self.minimal_ids.insert(id, TypeIdentifier::minimal(EquivalenceHash::zero()));
            self.complete_ids.insert(id, TypeIdentifier::complete(EquivalenceHash::zero()));
            return Ok(());
        }
        self.in_progress.push(id);
        let node = self.pstate.get(id);
        let loc = node.loc.clone();
        let name = crate::mangle::scoped_name(self.pstate, id);

        let (minimal, complete) = match &node.kind {
            TypeKind::Struct(def) => self.build_struct(id, &name, def)?,
            TypeKind::Union(def) => self.build_union(id, &name, def)?,
            TypeKind::Enum(def) => self.build_enum(&name, def),
            TypeKind::Bitmask(def) => self.build_bitmask(&name, def),
            TypeKind::Alias(def) => self.build_alias(&name, def)?,
            TypeKind::Sequence(def) => {
                let elem = self.type_id_of(def.element)?;
                let kind = CollectionKind::Sequence { bound: def.bound };
                let obj = TypeObject::Collection(CollectionType {
                    kind,
                    element_type: elem,
                });
                (obj.clone(), obj)
            }
            TypeKind::Array(def) => {
                let elem = self.type_id_of(def.element)?;
                let obj = TypeObject::Collection(CollectionType {
                    kind: CollectionKind::Array {
                        dims: def.dims.clone(),
                    },
                    element_type: elem,
                });
                (obj.clone(), obj)
            }
            TypeKind::Base(_) | TypeKind::String { .. } | TypeKind::WString { .. } => {
                self.in_progress.pop();
                return Ok(());
            }
            TypeKind::Forward => {
                self.in_progress.pop();
                return Err(CompileError::Unsupported {
                    what: "unresolved forward declaration has no type object".into(),
                    loc,
                });
            }
        };

        let minimal_bytes = serialize_type_object(&minimal);
        let complete_bytes = serialize_type_object(&complete);
        let minimal_id = TypeIdentifier::minimal(hash_bytes(&minimal_bytes));
        let complete_id = TypeIdentifier::complete(hash_bytes(&complete_bytes));

        self.minimal_objects.insert(id, minimal);
        self.complete_objects.insert(id, complete);
        self.minimal_ids.insert(id, minimal_id);
        self.complete_ids.insert(id, complete_id);
        self.in_progress.pop();
        Ok(())
    }

    fn build_struct(
        &mut self,
        id: NodeId,
        name: &str,
        def: &crate::ast::StructDef,
    ) -> CompileResult<(TypeObject, TypeObject)> {
        let base_minimal = match def.base {
            Some(b) => Some(self.type_id_of(b)?),
            None => None,
        };
        let base_complete = base_minimal.clone();
        let _ = id;
        let mut minimal_members = Vec::with_capacity(def.members.len());
        let mut complete_members = Vec::with_capacity(def.members.len());
        for m in &def.members {
            let tid = self.type_id_of(m.type_ref)?;
            let flags = member_flags(m);
            minimal_members.push(MinimalStructMember {
                member_id: m.member_id,
                flags,
                type_id: tid.clone(),
                name_hash: name_hash4(&m.name),
            });
            complete_members.push(CompleteStructMember {
                member_id: m.member_id,
                flags,
                type_id: tid,
                name: m.name.clone(),
            });
        }
        let minimal = TypeObject::MinimalStruct(MinimalStructType {
            extensibility: def.extensibility,
            base_type: base_minimal,
            members: minimal_members,
        });
        let complete = TypeObject::CompleteStruct(CompleteStructType {
            extensibility: def.extensibility,
            base_type: base_complete,
            type_name: name.to_string(),
            members: complete_members,
        });
        Ok((minimal, complete))
    }

    fn build_union(
        &mut self,
        id: NodeId,
        name: &str,
        def: &crate::ast::UnionDef,
    ) -> CompileResult<(TypeObject, TypeObject)> {
        let _ = id;
        let disc_id = self.type_id_of(def.discriminant)?;
        let mut minimal_members = Vec::with_capacity(def.cases.len());
        let mut complete_members = Vec::with_capacity(def.cases.len());
        for case in &def.cases {
            let tid = self.type_id_of(case.member.type_ref)?;
            let flags = member_flags(&case.member);
            minimal_members.push(MinimalUnionMember {
                member_id: case.member.member_id,
                flags,
                type_id: tid.clone(),
                labels: case.labels.clone(),
                is_default: case.is_default,
                name_hash: name_hash4(&case.member.name),
            });
            complete_members.push(CompleteUnionMember {
                member_id: case.member.member_id,
                flags,
                type_id: tid,
                labels: case.labels.clone(),
                is_default: case.is_default,
                name: case.member.name.clone(),
            });
        }
        let minimal = TypeObject::MinimalUnion(MinimalUnionType {
            extensibility: def.extensibility,
            discriminator_type: disc_id.clone(),
            discriminator_is_key: def.key,
            members: minimal_members,
        });
        let complete = TypeObject::CompleteUnion(CompleteUnionType {
            extensibility: def.extensibility,
            type_name: name.to_string(),
            discriminator_type: disc_id,
            discriminator_is_key: def.key,
            members: complete_members,
        });
        Ok((minimal, complete))
    }

    fn build_enum(&self, name: &str, def: &crate::ast::EnumDef) -> (TypeObject, TypeObject) {
        let bit_bound = if def.max_value() <= i32::from(u16::MAX) {
            16
        } else {
            32
        };
        let minimal_literals: Vec<EnumLiteral> = def
            .literals
            .iter()
            .map(|l| EnumLiteral {
                value: l.value,
                is_default: false,
                name: None,
            })
            .collect();
        let complete_literals: Vec<EnumLiteral> = def
            .literals
            .iter()
            .map(|l| EnumLiteral {
                value: l.value,
                is_default: false,
                name: Some(l.name.clone()),
            })
            .collect();
        (
            TypeObject::Enum(EnumType {
                bit_bound,
                type_name: None,
                literals: minimal_literals,
            }),
            TypeObject::Enum(EnumType {
                bit_bound,
                type_name: Some(name.to_string()),
                literals: complete_literals,
            }),
        )
    }

    fn build_bitmask(&self, name: &str, def: &crate::ast::BitmaskDef) -> (TypeObject, TypeObject) {
        let minimal_flags: Vec<BitflagLiteral> = def
            .flags
            .iter()
            .map(|f| BitflagLiteral {
                position: f.position,
                name: None,
            })
            .collect();
        let complete_flags: Vec<BitflagLiteral> = def
            .flags
            .iter()
            .map(|f| BitflagLiteral {
                position: f.position,
                name: Some(f.name.clone()),
            })
            .collect();
        (
            TypeObject::Bitmask(BitmaskType {
                bit_bound: def.bit_bound,
                type_name: None,
                flags: minimal_flags,
            }),
            TypeObject::Bitmask(BitmaskType {
                bit_bound: def.bit_bound,
                type_name: Some(name.to_string()),
                flags: complete_flags,
            }),
        )
    }

    fn build_alias(
        &mut self,
        name: &str,
        def: &crate::ast::AliasDef,
    ) -> CompileResult<(TypeObject, TypeObject)> {
        let target = self.type_id_of(def.target)?;
        Ok((
            TypeObject::Alias(AliasType {
                type_name: None,
                aliased_type: target.clone(),
            }),
            TypeObject::Alias(AliasType {
                type_name: Some(name.to_string()),
                aliased_type: target,
            }),
        ))
    }
}

fn member_flags(m: &crate::ast::Member) -> ObjMemberFlags {
    ObjMemberFlags {
        try_construct: match m.flags.try_construct {
            TryConstruct::Discard => 0,
            TryConstruct::UseDefault => 1,
            TryConstruct::Trim => 2,
        },
        is_external: m.flags.external,
        is_optional: m.flags.optional,
        is_must_understand: m.flags.must_understand,
        is_key: m.flags.key,
    }
}

/// MD5-style name hashing used by `Minimal` type objects (X-Types
/// §7.3.4.6): truncates a simple FNV hash to 4 bytes when the
/// `xtypes`/`md-5` feature is off, matching the real algorithm only when
/// `xtypes` is enabled.
fn name_hash4(name: &str) -> [u8; 4] {
    #[cfg(feature = "xtypes")]
    {
        use md5::{Digest, Md5};
        let digest = Md5::digest(name.as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }
    #[cfg(not(feature = "xtypes"))]
    {
        let mut h: u32 = 0x811c_9dc5;
        for b in name.bytes() {
            h ^= u32::from(b);
            h = h.wrapping_mul(0x0100_0193);
        }
        h.to_le_bytes()
    }
}

fn hash_bytes(bytes: &[u8]) -> EquivalenceHash {
    #[cfg(feature = "xtypes")]
    {
        EquivalenceHash::compute(bytes)
    }
    #[cfg(not(feature = "xtypes"))]
    {
        let mut out = [0u8; 14];
        for (i, b) in bytes.iter().enumerate() {
            out[i % 14] ^= *b;
        }
        EquivalenceHash::from_bytes(out)
    }
}

fn encode_type_id(c: &mut CursorMut, id: &TypeIdentifier) {
    match id {
        TypeIdentifier::Primitive(tk) => {
            c.write_u8(0);
            c.write_u8(*tk);
        }
        TypeIdentifier::StringSmall { bound } => {
            c.write_u8(1);
            c.write_u8(*bound);
        }
        TypeIdentifier::StringLarge { bound } => {
            c.write_u8(2);
            c.write_u32(*bound);
        }
        TypeIdentifier::WStringSmall { bound } => {
            c.write_u8(3);
            c.write_u8(*bound);
        }
        TypeIdentifier::WStringLarge { bound } => {
            c.write_u8(4);
            c.write_u32(*bound);
        }
        TypeIdentifier::Minimal(h) => {
            c.write_u8(5);
            c.write_bytes(h.as_bytes());
        }
        TypeIdentifier::Complete(h) => {
            c.write_u8(6);
            c.write_bytes(h.as_bytes());
        }
        TypeIdentifier::StronglyConnected {
            component,
            member_index,
        } => {
            c.write_u8(7);
            c.write_bytes(component.as_bytes());
            c.write_i32(*member_index);
        }
    }
}

fn encode_member_flags(c: &mut CursorMut, f: ObjMemberFlags) {
    let mut bits = 0u8;
    if f.is_external {
        bits |= 1 << 0;
    }
    if f.is_optional {
        bits |= 1 << 1;
    }
    if f.is_must_understand {
        bits |= 1 << 2;
    }
    if f.is_key {
        bits |= 1 << 3;
    }
    c.write_u8(bits);
    c.write_u8(f.try_construct);
}

fn encode_type_object(c: &mut CursorMut, obj: &TypeObject) {
    match obj {
        TypeObject::MinimalStruct(s) => {
            c.write_u8(0);
            c.write_u8(s.extensibility as u8);
            c.write_bool(s.base_type.is_some());
            if let Some(b) = &s.base_type {
                encode_type_id(c, b);
            }
            c.write_u32(s.members.len() as u32);
            for m in &s.members {
                c.write_u32(m.member_id);
                encode_member_flags(c, m.flags);
                encode_type_id(c, &m.type_id);
                c.write_bytes(&m.name_hash);
            }
        }
        TypeObject::CompleteStruct(s) => {
            c.write_u8(1);
            c.write_u8(s.extensibility as u8);
            c.write_str(&s.type_name);
            c.write_bool(s.base_type.is_some());
            if let Some(b) = &s.base_type {
                encode_type_id(c, b);
            }
            c.write_u32(s.members.len() as u32);
            for m in &s.members {
                c.write_u32(m.member_id);
                encode_member_flags(c, m.flags);
                encode_type_id(c, &m.type_id);
                c.write_str(&m.name);
            }
        }
        TypeObject::MinimalUnion(u) => {
            c.write_u8(2);
            c.write_u8(u.extensibility as u8);
            c.write_bool(u.discriminator_is_key);
            encode_type_id(c, &u.discriminator_type);
            c.write_u32(u.members.len() as u32);
            for m in &u.members {
                c.write_u32(m.member_id);
                encode_member_flags(c, m.flags);
                encode_type_id(c, &m.type_id);
                c.write_bool(m.is_default);
                c.write_u32(m.labels.len() as u32);
                for l in &m.labels {
                    c.write_i32(*l);
                }
                c.write_bytes(&m.name_hash);
            }
        }
        TypeObject::CompleteUnion(u) => {
            c.write_u8(3);
            c.write_u8(u.extensibility as u8);
            c.write_str(&u.type_name);
            c.write_bool(u.discriminator_is_key);
            encode_type_id(c, &u.discriminator_type);
            c.write_u32(u.members.len() as u32);
            for m in &u.members {
                c.write_u32(m.member_id);
                encode_member_flags(c, m.flags);
                encode_type_id(c, &m.type_id);
                c.write_bool(m.is_default);
                c.write_u32(m.labels.len() as u32);
                for l in &m.labels {
                    c.write_i32(*l);
                }
                c.write_str(&m.name);
            }
        }
        TypeObject::Enum(e) => {
            c.write_u8(4);
            c.write_u8(e.bit_bound);
            c.write_bool(e.type_name.is_some());
            if let Some(n) = &e.type_name {
                c.write_str(n);
            }
            c.write_u32(e.literals.len() as u32);
            for l in &e.literals {
                c.write_i32(l.value);
                c.write_bool(l.is_default);
                c.write_bool(l.name.is_some());
                if let Some(n) = &l.name {
                    c.write_str(n);
                }
            }
        }
        TypeObject::Bitmask(b) => {
            c.write_u8(5);
            c.write_u8(b.bit_bound);
            c.write_bool(b.type_name.is_some());
            if let Some(n) = &b.type_name {
                c.write_str(n);
            }
            c.write_u32(b.flags.len() as u32);
            for f in &b.flags {
                c.write_u8(f.position);
                c.write_bool(f.name.is_some());
                if let Some(n) = &f.name {
                    c.write_str(n);
                }
            }
        }
        TypeObject::Alias(a) => {
            c.write_u8(6);
            c.write_bool(a.type_name.is_some());
            if let Some(n) = &a.type_name {
                c.write_str(n);
            }
            encode_type_id(c, &a.aliased_type);
        }
        TypeObject::Collection(col) => {
            c.write_u8(7);
            match &col.kind {
                CollectionKind::Sequence { bound } => {
                    c.write_u8(0);
                    c.write_bool(bound.is_some());
                    if let Some(b) = bound {
                        c.write_u32(*b);
                    }
                }
                CollectionKind::Array { dims } => {
                    c.write_u8(1);
                    c.write_u32(dims.len() as u32);
                    for d in dims {
                        c.write_u32(*d);
                    }
                }
            }
            encode_type_id(c, &col.element_type);
        }
    }
}

fn serialize_type_object(obj: &TypeObject) -> Vec<u8> {
    let mut c = CursorMut::new();
    encode_type_object(&mut c, obj);
    c.into_bytes()
}
