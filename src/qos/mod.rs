// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS model and RxO compatibility matcher, covering the full ~20-policy
//! DDS QoS set rather than a reduced subset.
//!
//! The atomic per-entity swap in [`QosStore`] uses `arc_swap::ArcSwap` for
//! lock-free hot-reloadable configuration.

pub mod loaders;
pub mod policy;
pub mod rxo;

pub use policy::{
    DestinationOrderKind, DurabilityKind, DurabilityService, EntityKind, History,
    IgnoreLocalKind, Liveliness, LivelinessKind, Mutability, OwnershipKind, Partition,
    Presentation, PresentationScope, Reliability, ReliabilityKind, ResourceLimits,
    PolicyId, PolicyValue, ReaderDataLifecycle,
};
pub use rxo::{match_rxo, MatchResult};

use crate::error::{RuntimeError, RuntimeResult};
use arc_swap::ArcSwap;
use std::time::Duration;

/// The full set of QoS policy values for one entity. Conceptually a map
/// from policy id to policy value; realized as a flat struct rather than
/// an actual runtime map, since the policy set is closed and known at
/// compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Qos {
    pub durability: DurabilityKind,
    pub durability_service: DurabilityService,
    pub presentation: Presentation,
    pub deadline: Duration,
    pub latency_budget: Duration,
    pub ownership: OwnershipKind,
    pub ownership_strength: i32,
    pub liveliness: Liveliness,
    pub time_based_filter: Duration,
    pub partition: Partition,
    pub reliability: Reliability,
    pub destination_order: DestinationOrderKind,
    pub history: History,
    pub resource_limits: ResourceLimits,
    pub autoenable_created_entities: bool,
    pub autodispose_unregistered_instances: bool,
    pub reader_data_lifecycle: ReaderDataLifecycle,
    pub transport_priority: i32,
    pub lifespan: Duration,
    pub writer_batching: bool,
    pub ignore_local: IgnoreLocalKind,
    pub entity_name: Option<String>,
}

impl Default for Qos {
    fn default() -> Self {
        Qos {
            durability: DurabilityKind::default(),
            durability_service: DurabilityService::default(),
            presentation: Presentation::default(),
            deadline: Duration::MAX,
            latency_budget: Duration::ZERO,
            ownership: OwnershipKind::default(),
            ownership_strength: 0,
            liveliness: Liveliness {
                kind: LivelinessKind::Automatic,
                lease_duration: Duration::MAX,
            },
            time_based_filter: Duration::ZERO,
            partition: Partition::default(),
            reliability: Reliability::default(),
            destination_order: DestinationOrderKind::default(),
            history: History::KeepLast(1),
            resource_limits: ResourceLimits::default(),
            autoenable_created_entities: true,
            autodispose_unregistered_instances: true,
            reader_data_lifecycle: ReaderDataLifecycle::default(),
            transport_priority: 0,
            lifespan: Duration::MAX,
            writer_batching: false,
            ignore_local: IgnoreLocalKind::default(),
            entity_name: None,
        }
    }
}

impl Qos {
    /// Per-policy validity checks, each failing with a specific reason.
    /// Applied at entity-creation time; see `DESIGN.md` for the design
    /// decision on when `resource_limits` is checked against `history`.
    pub fn validate(&self) -> Result<(), String> {
        if let History::KeepLast(0) = self.history {
            return Err("history depth must be > 0 for KeepLast".into());
        }
        self.resource_limits.check_against_history(self.history)?;
        if self.deadline < self.time_based_filter {
            return Err("deadline.period must be >= time_based_filter.minimum_separation".into());
        }
        if self.ownership == OwnershipKind::Shared && self.ownership_strength != 0 {
            return Err("ownership_strength is only meaningful with EXCLUSIVE ownership".into());
        }
        Ok(())
    }

    /// Which policies differ from `other`, the set `set_qos` diffs against
    /// the prior value to decide whether the change may be applied.
    fn changed_policies(&self, other: &Qos) -> Vec<PolicyId> {
        let mut changed = Vec::new();
        macro_rules! check {
            ($field:ident, $id:expr) => {
                if self.$field != other.$field {
                    changed.push($id);
                }
            };
        }
        check!(durability, PolicyId::Durability);
        check!(durability_service, PolicyId::DurabilityService);
        check!(presentation, PolicyId::Presentation);
        check!(deadline, PolicyId::Deadline);
        check!(latency_budget, PolicyId::LatencyBudget);
        check!(ownership, PolicyId::Ownership);
        check!(ownership_strength, PolicyId::OwnershipStrength);
        check!(liveliness, PolicyId::Liveliness);
        check!(time_based_filter, PolicyId::TimeBasedFilter);
        check!(partition, PolicyId::Partition);
        check!(reliability, PolicyId::Reliability);
        check!(destination_order, PolicyId::DestinationOrder);
        check!(history, PolicyId::History);
        check!(resource_limits, PolicyId::ResourceLimits);
        check!(autoenable_created_entities, PolicyId::EntityFactory);
        check!(
            autodispose_unregistered_instances,
            PolicyId::WriterDataLifecycle
        );
        check!(reader_data_lifecycle, PolicyId::ReaderDataLifecycle);
        check!(transport_priority, PolicyId::TransportPriority);
        check!(lifespan, PolicyId::Lifespan);
        check!(writer_batching, PolicyId::WriterBatching);
        check!(ignore_local, PolicyId::IgnoreLocal);
        check!(entity_name, PolicyId::EntityName);
        changed
    }
}

/// Per-entity QoS storage with a lock-free atomic swap: `set_qos` swaps the
/// whole policy table atomically with no global QoS lock, so readers never
/// observe a torn update.
pub struct QosStore {
    current: ArcSwap<Qos>,
}

impl QosStore {
    pub fn new(initial: Qos) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn get(&self) -> Qos {
        (**self.current.load()).clone()
    }

    /// Applies `new_qos` if every changed policy is mutable: returns
    /// `IMMUTABLE_POLICY` if any changed policy is `Immutable`,
    /// `UNSUPPORTED` if any changed policy is `MutableInSpecNotImpl`,
    /// otherwise swaps the whole table atomically.
    pub fn set_qos(&self, new_qos: Qos) -> RuntimeResult<()> {
        new_qos
            .validate()
            .map_err(RuntimeError::IllegalOperation)?;
        let current = self.get();
        for id in current.changed_policies(&new_qos) {
            match policy::mutability(id) {
                Mutability::Immutable => return Err(RuntimeError::ImmutablePolicy),
                Mutability::MutableInSpecNotImpl => {
                    return Err(RuntimeError::Unsupported(format!(
                        "{id:?} is mutable per the OMG spec but not implemented by this core"
                    )))
                }
                Mutability::Mutable => {}
            }
        }
        self.current.store(std::sync::Arc::new(new_qos));
        Ok(())
    }
}

/// Table-driven answer to "does policy `id` apply to an entity of kind
/// `kind`".
pub fn policy_applies(id: PolicyId, kind: EntityKind) -> bool {
    use EntityKind::*;
    use PolicyId::*;
    match id {
        Durability | Reliability | DestinationOrder | History | Liveliness
        | LatencyBudget | Deadline => matches!(kind, Topic | Reader | Writer),
        TimeBasedFilter | ReaderDataLifecycle => matches!(kind, Reader),
        OwnershipStrength | TransportPriority | WriterBatching | WriterDataLifecycle => {
            matches!(kind, Writer)
        }
        Lifespan | DurabilityService => matches!(kind, Topic | Writer),
        ResourceLimits => matches!(kind, Topic | Reader | Writer),
        Ownership => matches!(kind, Topic | Reader | Writer),
        Presentation => matches!(kind, Publisher | Subscriber),
        Partition => matches!(kind, Publisher | Subscriber),
        EntityFactory | IgnoreLocal | EntityName => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_qos_round_trips_mutable_policy() {
        let store = QosStore::new(Qos::default());
        let mut next = store.get();
        next.lifespan = Duration::from_secs(30);
        store.set_qos(next.clone()).unwrap();
        assert_eq!(store.get(), next);
    }

    #[test]
    fn set_qos_rejects_immutable_change() {
        let store = QosStore::new(Qos::default());
        let mut next = store.get();
        next.history = History::KeepLast(5);
        assert_eq!(store.set_qos(next), Err(RuntimeError::ImmutablePolicy));
    }

    #[test]
    fn set_qos_unrelated_policy_untouched() {
        let store = QosStore::new(Qos::default());
        let mut next = store.get();
        next.transport_priority = 7;
        store.set_qos(next).unwrap();
        assert_eq!(store.get().durability, DurabilityKind::Volatile);
    }

    #[test]
    fn set_qos_reports_unsupported_for_spec_only_mutable() {
        let store = QosStore::new(Qos::default());
        let mut next = store.get();
        next.presentation.coherent_access = true;
        assert!(matches!(
            store.set_qos(next),
            Err(RuntimeError::Unsupported(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_depth_keep_last() {
        let qos = Qos {
            history: History::KeepLast(0),
            ..Qos::default()
        };
        assert!(qos.validate().is_err());
    }

    #[test]
    fn validate_rejects_deadline_shorter_than_time_based_filter() {
        let qos = Qos {
            deadline: Duration::from_millis(10),
            time_based_filter: Duration::from_millis(50),
            ..Qos::default()
        };
        assert!(qos.validate().is_err());
    }

    #[test]
    fn policy_applicability_matches_spec_table() {
        assert!(policy_applies(PolicyId::Partition, EntityKind::Publisher));
        assert!(!policy_applies(PolicyId::Partition, EntityKind::Reader));
        assert!(policy_applies(PolicyId::TimeBasedFilter, EntityKind::Reader));
        assert!(!policy_applies(PolicyId::TimeBasedFilter, EntityKind::Writer));
    }
}
