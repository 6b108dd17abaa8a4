// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML QoS profile loader.
//!
//! ```yaml
//! default_profile: reliable_sensor
//! profiles:
//!   reliable_sensor:
//!     reliability: RELIABLE
//!     durability: TRANSIENT_LOCAL
//!     history:
//!       kind: KEEP_LAST
//!       depth: 100
//! ```

use super::ProfileSet;
use crate::qos::{DestinationOrderKind, DurabilityKind, History, OwnershipKind, Qos, Reliability, ReliabilityKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct YamlDocument {
    #[serde(default)]
    profiles: HashMap<String, YamlProfile>,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct YamlProfile {
    reliability: Option<String>,
    durability: Option<String>,
    destination_order: Option<String>,
    ownership: Option<String>,
    history: Option<YamlHistory>,
    deadline_ms: Option<u64>,
    latency_budget_ms: Option<u64>,
    lifespan_ms: Option<u64>,
    transport_priority: Option<i32>,
    partition: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct YamlHistory {
    kind: String,
    #[serde(default)]
    depth: u32,
}

/// Parse errors are returned as `String` — the loader is config-file I/O,
/// not part of the return-code compiler/runtime error taxonomies.
pub fn load_str(yaml: &str) -> Result<ProfileSet, String> {
    let doc: YamlDocument =
        serde_yaml::from_str(yaml).map_err(|e| format!("invalid QoS YAML: {e}"))?;
    let mut profiles = HashMap::with_capacity(doc.profiles.len());
    for (name, p) in doc.profiles {
        profiles.insert(name.clone(), resolve(&name, p)?);
    }
    Ok(ProfileSet {
        profiles,
        default_profile: doc.default_profile,
    })
}

pub fn load_file(path: &std::path::Path) -> Result<ProfileSet, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {e}", path.display()))?;
    load_str(&text)
}

fn resolve(name: &str, p: YamlProfile) -> Result<Qos, String> {
    let mut qos = Qos::default();
    if let Some(r) = p.reliability {
        qos.reliability = Reliability {
            kind: match r.as_str() {
                "RELIABLE" => ReliabilityKind::Reliable,
                "BEST_EFFORT" => ReliabilityKind::BestEffort,
                other => return Err(format!("profile {name}: unknown reliability {other}")),
            },
            ..qos.reliability
        };
    }
    if let Some(d) = p.durability {
        qos.durability = match d.as_str() {
            "VOLATILE" => DurabilityKind::Volatile,
            "TRANSIENT_LOCAL" => DurabilityKind::TransientLocal,
            "TRANSIENT" => DurabilityKind::Transient,
            "PERSISTENT" => DurabilityKind::Persistent,
            other => return Err(format!("profile {name}: unknown durability {other}")),
        };
    }
    if let Some(o) = p.destination_order {
        qos.destination_order = match o.as_str() {
            "BY_RECEPTION_TIMESTAMP" => DestinationOrderKind::ByReceptionTimestamp,
            "BY_SOURCE_TIMESTAMP" => DestinationOrderKind::BySourceTimestamp,
            other => return Err(format!("profile {name}: unknown destination_order {other}")),
        };
    }
    if let Some(o) = p.ownership {
        qos.ownership = match o.as_str() {
            "SHARED" => OwnershipKind::Shared,
            "EXCLUSIVE" => OwnershipKind::Exclusive,
            other => return Err(format!("profile {name}: unknown ownership {other}")),
        };
    }
    if let Some(h) = p.history {
        qos.history = match h.kind.as_str() {
            "KEEP_ALL" => History::KeepAll,
            "KEEP_LAST" => History::KeepLast(h.depth),
            other => return Err(format!("profile {name}: unknown history kind {other}")),
        };
    }
    if let Some(ms) = p.deadline_ms {
        qos.deadline = Duration::from_millis(ms);
    }
    if let Some(ms) = p.latency_budget_ms {
        qos.latency_budget = Duration::from_millis(ms);
    }
    if let Some(ms) = p.lifespan_ms {
        qos.lifespan = Duration::from_millis(ms);
    }
    if let Some(tp) = p.transport_priority {
        qos.transport_priority = tp;
    }
    if let Some(names) = p.partition {
        qos.partition = crate::qos::Partition { names };
    }
    qos.validate().map_err(|e| format!("profile {name}: {e}"))?;
    Ok(qos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_named_profile_with_default() {
        let yaml = r#"
default_profile: reliable_sensor
profiles:
  reliable_sensor:
    reliability: RELIABLE
    durability: TRANSIENT_LOCAL
    history:
      kind: KEEP_LAST
      depth: 100
"#;
        let set = load_str(yaml).unwrap();
        let qos = set.default_profile().unwrap();
        assert_eq!(qos.reliability.kind, ReliabilityKind::Reliable);
        assert_eq!(qos.durability, DurabilityKind::TransientLocal);
        assert_eq!(qos.history, History::KeepLast(100));
    }

    #[test]
    fn rejects_unknown_enum_value() {
        let yaml = "profiles:\n  p:\n    reliability: MAYBE\n";
        assert!(load_str(yaml).is_err());
    }

    #[test]
    fn rejects_profile_failing_validation() {
        let yaml = "profiles:\n  p:\n    history:\n      kind: KEEP_LAST\n      depth: 0\n";
        assert!(load_str(yaml).is_err());
    }
}
