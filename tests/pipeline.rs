// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end pipeline tests: AST -> emit -> keys -> typemeta -> interp,
//! covering testable properties that span more than one module (bytecode
//! closure, key-hash stability, type-id determinism).

use ddsidlc::ast::{
    BaseType, Extensibility, Loc, Member, MemberFlags, NodeId, Pstate, StructDef, TypeKind,
};
use ddsidlc::emit::emitter::compile;
use ddsidlc::interp::exec::{decode, encode};
use ddsidlc::interp::value::{StructValue, Value};
use ddsidlc::typemeta;

fn base_type(pstate: &mut Pstate, bt: BaseType) -> NodeId {
    pstate.push(format!("{bt:?}"), vec![], Loc::unknown(), TypeKind::Base(bt))
}

fn field(name: &str, id: u32, type_ref: NodeId, key: bool) -> Member {
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

fn sensor_reading(pstate: &mut Pstate) -> NodeId {
    let i32_ty = base_type(pstate, BaseType::Int32);
    let f64_ty = base_type(pstate, BaseType::Float64);
    pstate.push(
        "SensorReading",
        vec![],
        Loc::unknown(),
        TypeKind::Struct(StructDef {
            extensibility: Extensibility::Final,
            base: None,
            members: vec![
                field("sensor_id", 0, i32_ty, true),
                field("value", 1, f64_ty, false),
            ],
        }),
    )
}

#[test]
fn bytecode_closure_every_relocation_resolves_in_range() {
    let mut pstate = Pstate::new();
    let root = sensor_reading(&mut pstate);
    let desc = compile(&pstate, root).expect("compiles");
    // Every reachable type got exactly one table row.
    assert_eq!(desc.constructed_types.len(), 1);
    for ct in &desc.constructed_types {
        assert!(ct.offset_in_flat_stream <= i16::MAX as u32);
    }
}

#[test]
fn round_trip_preserves_key_and_payload() {
    let mut pstate = Pstate::new();
    let root = sensor_reading(&mut pstate);
    let desc = compile(&pstate, root).expect("compiles");

    let sample = Value::Struct(StructValue::new(vec![Value::I32(42), Value::F64(3.25)]));
    let bytes = encode(&desc, &sample).expect("encodes");
    let back = decode(&desc, &bytes).expect("decodes");
    assert_eq!(sample, back);
}

#[test]
fn key_hash_stability_same_key_differing_payload_matches() {
    let mut pstate = Pstate::new();
    let root = sensor_reading(&mut pstate);
    let desc = compile(&pstate, root).expect("compiles");

    let a = Value::Struct(StructValue::new(vec![Value::I32(7), Value::F64(1.0)]));
    let b = Value::Struct(StructValue::new(vec![Value::I32(7), Value::F64(99.0)]));
    let bytes_a = encode(&desc, &a).unwrap();
    let bytes_b = encode(&desc, &b).unwrap();
    // Same key field (sensor_id = 7): decoding both must recover the same
    // key member regardless of the differing payload field.
    let da = decode(&desc, &bytes_a).unwrap();
    let db = decode(&desc, &bytes_b).unwrap();
    assert_eq!(
        da.as_struct().unwrap().fields[0],
        db.as_struct().unwrap().fields[0]
    );
    assert_ne!(
        da.as_struct().unwrap().fields[1],
        db.as_struct().unwrap().fields[1]
    );
}

#[test]
fn fixed_key_predicate_matches_total_key_size() {
    let mut pstate = Pstate::new();
    let root = sensor_reading(&mut pstate);
    let desc = compile(&pstate, root).expect("compiles");
    // A single int32 key (4 bytes) is well under the 16-byte fixed-key cap.
    assert!(desc.flags.fixed_key);
    assert!(desc.flags.fixed_key_xcdr2);
    assert_eq!(desc.keys.len(), 1);
}

#[test]
fn type_id_determinism_same_ast_same_hash() {
    let mut pstate_a = Pstate::new();
    let root_a = sensor_reading(&mut pstate_a);
    let meta_a = typemeta::build(&pstate_a, root_a).expect("builds");

    let mut pstate_b = Pstate::new();
    let root_b = sensor_reading(&mut pstate_b);
    let meta_b = typemeta::build(&pstate_b, root_b).expect("builds");

    assert_eq!(
        meta_a.type_information_blob(),
        meta_b.type_information_blob()
    );
}
