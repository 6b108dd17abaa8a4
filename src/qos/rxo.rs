// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The Request/Offered (RxO) QoS compatibility matcher.
//!
//! A "first failure decides" short-circuit over the full DDS policy set:
//! durability, reliability, latency budget, deadline, ownership,
//! destination order, liveliness, presentation, resource limits vs.
//! history, time-based filter vs. deadline, partition glob intersection,
//! and ignore-local.

use super::policy::{
    IgnoreLocalKind, PolicyId, Rank,
};
use super::Qos;

/// Outcome of [`match_rxo`]. The first policy failure decides the result
/// and its policy id is reported, except for partition and ignore-local,
/// which report a mismatch with no policy id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub incompatible_policy_id: Option<PolicyId>,
}

impl MatchResult {
    fn ok() -> Self {
        MatchResult {
            matched: true,
            incompatible_policy_id: None,
        }
    }

    fn fail(id: PolicyId) -> Self {
        MatchResult {
            matched: false,
            incompatible_policy_id: Some(id),
        }
    }

    fn fail_unreported() -> Self {
        MatchResult {
            matched: false,
            incompatible_policy_id: None,
        }
    }
}

/// Matches a reader's requested QoS against a writer's offered QoS.
/// Ignore-local is evaluated first since it is a pre-filter on whether
/// matching should be attempted at all, ahead of the per-policy RxO loop.
pub fn match_rxo(reader: &Qos, writer: &Qos, same_participant: bool, same_process: bool) -> MatchResult {
    if !ignore_local_permits(reader.ignore_local, writer.ignore_local, same_participant, same_process) {
        log::debug!(
            "[MATCH-QOS] IgnoreLocal blocks match (reader={:?}, writer={:?}, same_participant={}, same_process={})",
            reader.ignore_local,
            writer.ignore_local,
            same_participant,
            same_process
        );
        return MatchResult::fail_unreported();
    }

    if reader.durability.rank() > writer.durability.rank() {
        log::debug!(
            "[MATCH-QOS] Durability mismatch (reader={:?}, writer={:?})",
            reader.durability,
            writer.durability
        );
        return MatchResult::fail(PolicyId::Durability);
    }
    if reader.reliability.kind.rank() > writer.reliability.kind.rank() {
        log::debug!(
            "[MATCH-QOS] Reliability mismatch (reader={:?}, writer={:?})",
            reader.reliability.kind,
            writer.reliability.kind
        );
        return MatchResult::fail(PolicyId::Reliability);
    }
    if reader.latency_budget > writer.latency_budget {
        log::debug!(
            "[MATCH-QOS] LatencyBudget mismatch (reader={:?}, writer={:?})",
            reader.latency_budget,
            writer.latency_budget
        );
        return MatchResult::fail(PolicyId::LatencyBudget);
    }
    if reader.deadline < writer.deadline {
        log::debug!(
            "[MATCH-QOS] Deadline mismatch (reader={:?}, writer={:?})",
            reader.deadline,
            writer.deadline
        );
        return MatchResult::fail(PolicyId::Deadline);
    }
    if reader.ownership != writer.ownership {
        log::debug!(
            "[MATCH-QOS] Ownership mismatch (reader={:?}, writer={:?})",
            reader.ownership,
            writer.ownership
        );
        return MatchResult::fail(PolicyId::Ownership);
    }
    if reader.destination_order.rank() > writer.destination_order.rank() {
        log::debug!(
            "[MATCH-QOS] DestinationOrder mismatch (reader={:?}, writer={:?})",
            reader.destination_order,
            writer.destination_order
        );
        return MatchResult::fail(PolicyId::DestinationOrder);
    }
    if reader.liveliness.kind.rank() != writer.liveliness.kind.rank()
        || reader.liveliness.lease_duration < writer.liveliness.lease_duration
    {
        log::debug!(
            "[MATCH-QOS] Liveliness mismatch (reader={:?}, writer={:?})",
            reader.liveliness,
            writer.liveliness
        );
        return MatchResult::fail(PolicyId::Liveliness);
    }
    if reader.presentation.access_scope.rank() > writer.presentation.access_scope.rank()
        || (reader.presentation.coherent_access && !writer.presentation.coherent_access)
        || (reader.presentation.ordered_access && !writer.presentation.ordered_access)
    {
        log::debug!(
            "[MATCH-QOS] Presentation mismatch (reader={:?}, writer={:?})",
            reader.presentation,
            writer.presentation
        );
        return MatchResult::fail(PolicyId::Presentation);
    }

    if !reader.partition.intersects(&writer.partition) {
        log::debug!(
            "[MATCH-QOS] Partition mismatch (reader={:?}, writer={:?})",
            reader.partition,
            writer.partition
        );
        return MatchResult::fail_unreported();
    }

    MatchResult::ok()
}

fn ignore_local_permits(
    reader: IgnoreLocalKind,
    writer: IgnoreLocalKind,
    same_participant: bool,
    same_process: bool,
) -> bool {
    if matches!(reader, IgnoreLocalKind::None) && matches!(writer, IgnoreLocalKind::None) {
        return true;
    }
    if same_participant
        && (matches!(reader, IgnoreLocalKind::Participant) || matches!(writer, IgnoreLocalKind::Participant))
    {
        return false;
    }
    if same_process
        && (matches!(reader, IgnoreLocalKind::Process) || matches!(writer, IgnoreLocalKind::Process))
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::policy::*;
    use super::*;
    use crate::qos::Qos;

    #[test]
    fn reliability_mismatch_reports_policy_id() {
        let reader = Qos {
            reliability: Reliability {
                kind: ReliabilityKind::Reliable,
                ..Default::default()
            },
            ..Qos::default()
        };
        let writer = Qos {
            reliability: Reliability {
                kind: ReliabilityKind::BestEffort,
                ..Default::default()
            },
            ..Qos::default()
        };
        let result = match_rxo(&reader, &writer, false, false);
        assert!(!result.matched);
        assert_eq!(result.incompatible_policy_id, Some(PolicyId::Reliability));
    }

    #[test]
    fn reliability_reverse_matches() {
        let reader = Qos {
            reliability: Reliability {
                kind: ReliabilityKind::BestEffort,
                ..Default::default()
            },
            ..Qos::default()
        };
        let writer = Qos {
            reliability: Reliability {
                kind: ReliabilityKind::Reliable,
                ..Default::default()
            },
            ..Qos::default()
        };
        assert!(match_rxo(&reader, &writer, false, false).matched);
    }

    #[test]
    fn durability_rank_order() {
        let mut reader = Qos::default();
        let mut writer = Qos::default();
        reader.durability = DurabilityKind::TransientLocal;
        writer.durability = DurabilityKind::Volatile;
        assert!(!match_rxo(&reader, &writer, false, false).matched);
        std::mem::swap(&mut reader.durability, &mut writer.durability);
        assert!(match_rxo(&reader, &writer, false, false).matched);
    }

    #[test]
    fn partition_mismatch_reports_no_policy_id() {
        let reader = Qos {
            partition: Partition::single("sensor"),
            ..Qos::default()
        };
        let writer = Qos {
            partition: Partition::single("actuator"),
            ..Qos::default()
        };
        let result = match_rxo(&reader, &writer, false, false);
        assert!(!result.matched);
        assert_eq!(result.incompatible_policy_id, None);
    }

    #[test]
    fn ignore_local_participant_blocks_same_participant() {
        let reader = Qos {
            ignore_local: IgnoreLocalKind::Participant,
            ..Qos::default()
        };
        let writer = Qos::default();
        assert!(!match_rxo(&reader, &writer, true, false).matched);
        assert!(match_rxo(&reader, &writer, false, false).matched);
    }

    #[test]
    fn deadline_requires_writer_faster_or_equal() {
        use std::time::Duration;
        let reader = Qos {
            deadline: Duration::from_millis(200),
            ..Qos::default()
        };
        let writer = Qos {
            deadline: Duration::from_millis(100),
            ..Qos::default()
        };
        assert!(match_rxo(&reader, &writer, false, false).matched);
        assert!(!match_rxo(&writer, &reader, false, false).matched);
    }
}
