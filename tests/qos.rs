// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end QoS tests: profile loading from disk, `QosStore` mutability
//! enforcement, and RxO matching across a multi-policy mismatch, at the
//! crate's public boundary.

use ddsidlc::qos::loaders::yaml;
use ddsidlc::qos::{match_rxo, DurabilityKind, History, PolicyId, Qos, QosStore, ReliabilityKind};
use ddsidlc::RuntimeError;
use std::io::Write;

#[test]
fn yaml_profile_loads_from_a_real_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    write!(
        file,
        r#"
default_profile: sensor_feed
profiles:
  sensor_feed:
    reliability: RELIABLE
    durability: TRANSIENT_LOCAL
    history:
      kind: KEEP_LAST
      depth: 16
"#
    )
    .expect("write profile yaml");

    let set = yaml::load_file(file.path()).expect("loads from disk");
    let qos = set.default_profile().expect("has a default profile");
    assert_eq!(qos.reliability.kind, ReliabilityKind::Reliable);
    assert_eq!(qos.durability, DurabilityKind::TransientLocal);
    assert_eq!(qos.history, History::KeepLast(16));
}

#[test]
fn yaml_profile_file_with_invalid_qos_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    write!(
        file,
        "profiles:\n  bad:\n    history:\n      kind: KEEP_LAST\n      depth: 0\n"
    )
    .expect("write profile yaml");

    assert!(yaml::load_file(file.path()).is_err());
}

#[test]
fn store_set_qos_enforces_policy_mutability_end_to_end() {
    let store = QosStore::new(Qos::default());

    let mut mutable_change = store.get();
    mutable_change.transport_priority = 5;
    store
        .set_qos(mutable_change.clone())
        .expect("transport_priority is mutable");
    assert_eq!(store.get().transport_priority, 5);

    let mut immutable_change = store.get();
    immutable_change.durability = DurabilityKind::TransientLocal;
    assert_eq!(
        store.set_qos(immutable_change),
        Err(RuntimeError::ImmutablePolicy)
    );
    // The rejected change must not have partially applied.
    assert_eq!(store.get().durability, DurabilityKind::Volatile);
}

#[test]
fn rxo_match_reports_first_failing_policy_in_priority_order() {
    // Durability and reliability both mismatch; durability is checked
    // first, so that's the id `match_rxo` must report.
    let reader = Qos {
        durability: DurabilityKind::TransientLocal,
        reliability: ddsidlc::qos::Reliability {
            kind: ReliabilityKind::Reliable,
            ..Default::default()
        },
        ..Qos::default()
    };
    let writer = Qos {
        durability: DurabilityKind::Volatile,
        reliability: ddsidlc::qos::Reliability {
            kind: ReliabilityKind::BestEffort,
            ..Default::default()
        },
        ..Qos::default()
    };

    let result = match_rxo(&reader, &writer, false, false);
    assert!(!result.matched);
    assert_eq!(result.incompatible_policy_id, Some(PolicyId::Durability));
}

#[test]
fn rxo_match_succeeds_when_writer_offers_at_least_as_much() {
    let reader = Qos::default();
    let mut writer = Qos::default();
    writer.durability = DurabilityKind::TransientLocal;
    writer.reliability.kind = ReliabilityKind::Reliable;

    assert!(match_rxo(&reader, &writer, false, false).matched);
}
