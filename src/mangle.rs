// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Printer / name mangler.
//!
//! Maps an AST node to a flat, C-compatible identifier (scopes joined by
//! `_`) and a scoped identifier (joined by `::`). Anonymous sequence/array
//! types are given a synthesized name so the emitter can deduplicate
//! constructed-type table entries by identifier rather than by AST identity
//! alone.

use crate::ast::{BaseType, NodeId, Pstate, TypeKind};

/// Scoped identifier, e.g. `Outer::Inner::Field`.
pub fn scoped_name(pstate: &Pstate, id: NodeId) -> String {
    let node = pstate.get(id);
    let mut parts: Vec<&str> = node.scope.iter().map(String::as_str).collect();
    parts.push(&node.name);
    parts.join("::")
}

/// Flat, C-compatible identifier, e.g. `Outer_Inner_Field`.
pub fn flat_name(pstate: &Pstate, id: NodeId) -> String {
    let node = pstate.get(id);
    let mut parts: Vec<&str> = node.scope.iter().map(String::as_str).collect();
    parts.push(&node.name);
    parts.join("_")
}

fn base_type_token(bt: BaseType) -> &'static str {
    match bt {
        BaseType::Boolean => "boolean",
        BaseType::Byte => "octet",
        BaseType::Int8 => "int8",
        BaseType::Int16 => "int16",
        BaseType::Int32 => "int32",
        BaseType::Int64 => "int64",
        BaseType::UInt8 => "uint8",
        BaseType::UInt16 => "uint16",
        BaseType::UInt32 => "uint32",
        BaseType::UInt64 => "uint64",
        BaseType::Float32 => "float32",
        BaseType::Float64 => "float64",
        BaseType::Char8 => "char8",
        BaseType::Char16 => "char16",
    }
}

/// Element-type token used when synthesizing the name of an anonymous
/// container. Bounded strings carry their bound as a numeric suffix
/// (`string_40` for `string<40>`).
fn element_token(pstate: &Pstate, elem: NodeId) -> String {
    match &pstate.get(elem).kind {
        TypeKind::Base(bt) => base_type_token(*bt).to_string(),
        TypeKind::String { bound: Some(b) } => format!("string_{b}"),
        TypeKind::String { bound: None } => "string".to_string(),
        TypeKind::WString { bound: Some(b) } => format!("wstring_{b}"),
        TypeKind::WString { bound: None } => "wstring".to_string(),
        TypeKind::Sequence(seq) => {
            // Nested anonymous sequence: add one more `sequence_` prefix
            // layer per level of nesting.
            format!("sequence_{}", element_token(pstate, seq.element))
        }
        _ => flat_name(pstate, elem),
    }
}

/// Deterministic, collision-free name for an anonymous sequence type, of the
/// form `dds_sequence_<element>`, with additional `sequence_` prefixes per
/// nesting level.
pub fn anon_sequence_name(pstate: &Pstate, elem: NodeId) -> String {
    format!("dds_sequence_{}", element_token(pstate, elem))
}

/// Deterministic, collision-free name for an anonymous array type.
pub fn anon_array_name(pstate: &Pstate, elem: NodeId, dims: &[u32]) -> String {
    let dim_suffix = dims
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("_");
    format!("dds_array_{}_{dim_suffix}", element_token(pstate, elem))
}

/// The identifier under which the emitter's constructed-type table
/// deduplicates entries: the scoped name for named types, the synthesized
/// anonymous name for sequence/array/string literals used inline.
pub fn dedup_key(pstate: &Pstate, id: NodeId) -> String {
    let node = pstate.get(id);
    match &node.kind {
        TypeKind::Sequence(seq) if node.name.is_empty() => anon_sequence_name(pstate, seq.element),
        TypeKind::Array(arr) if node.name.is_empty() => {
            anon_array_name(pstate, arr.element, &arr.dims)
        }
        _ => scoped_name(pstate, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Loc, SequenceDef};

    #[test]
    fn flat_name_joins_scope_with_underscore() {
        let mut pstate = Pstate::new();
        let id = pstate.push(
            "Temperature",
            vec!["Sensors".into(), "Outdoor".into()],
            Loc::unknown(),
            TypeKind::Base(BaseType::Float64),
        );
        assert_eq!(flat_name(&pstate, id), "Sensors_Outdoor_Temperature");
        assert_eq!(scoped_name(&pstate, id), "Sensors::Outdoor::Temperature");
    }

    #[test]
    fn anon_sequence_name_is_deterministic() {
        let mut pstate = Pstate::new();
        let elem = pstate.push("", vec![], Loc::unknown(), TypeKind::Base(BaseType::Int32));
        let name1 = anon_sequence_name(&pstate, elem);
        let name2 = anon_sequence_name(&pstate, elem);
        assert_eq!(name1, name2);
        assert_eq!(name1, "dds_sequence_int32");
    }

    #[test]
    fn anon_sequence_name_nests_with_repeated_prefix() {
        let mut pstate = Pstate::new();
        let inner_elem = pstate.push("", vec![], Loc::unknown(), TypeKind::Base(BaseType::UInt8));
        let inner_seq_node = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::Sequence(SequenceDef {
                element: inner_elem,
                bound: None,
            }),
        );
        let name = anon_sequence_name(&pstate, inner_seq_node);
        assert_eq!(name, "dds_sequence_sequence_uint8");
    }

    #[test]
    fn bounded_string_carries_bound_suffix() {
        let mut pstate = Pstate::new();
        let str_ty = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::String { bound: Some(40) },
        );
        let seq = pstate.push(
            "",
            vec![],
            Loc::unknown(),
            TypeKind::Sequence(SequenceDef {
                element: str_ty,
                bound: None,
            }),
        );
        assert_eq!(anon_sequence_name(&pstate, seq), "dds_sequence_string_40");
    }
}
