// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML QoS profile loader for the `CycloneDDS/Domain/Qos` configuration
//! surface, `roxmltree`-based parsing of a vendor QoS profile document.
//!
//! ```xml
//! <Qos>
//!   <Reliability><Kind>RELIABLE</Kind></Reliability>
//!   <Durability><Kind>TRANSIENT_LOCAL</Kind></Durability>
//!   <History><Kind>KEEP_LAST</Kind><Depth>100</Depth></History>
//! </Qos>
//! ```

use crate::qos::{DurabilityKind, History, Qos, Reliability, ReliabilityKind};
use roxmltree::Document;

pub fn load_str(xml: &str) -> Result<Qos, String> {
    let doc = Document::parse(xml).map_err(|e| format!("invalid QoS XML: {e}"))?;
    let root = doc.root_element();
    let mut qos = Qos::default();

    if let Some(kind) = text_of(&root, &["Reliability", "Kind"]) {
        qos.reliability = Reliability {
            kind: match kind.as_str() {
                "RELIABLE" => ReliabilityKind::Reliable,
                "BEST_EFFORT" => ReliabilityKind::BestEffort,
                other => return Err(format!("unknown <Reliability><Kind>: {other}")),
            },
            ..qos.reliability
        };
    }
    if let Some(kind) = text_of(&root, &["Durability", "Kind"]) {
        qos.durability = match kind.as_str() {
            "VOLATILE" => DurabilityKind::Volatile,
            "TRANSIENT_LOCAL" => DurabilityKind::TransientLocal,
            "TRANSIENT" => DurabilityKind::Transient,
            "PERSISTENT" => DurabilityKind::Persistent,
            other => return Err(format!("unknown <Durability><Kind>: {other}")),
        };
    }
    if let Some(kind) = text_of(&root, &["History", "Kind"]) {
        let depth: u32 = text_of(&root, &["History", "Depth"])
            .map(|d| d.parse())
            .transpose()
            .map_err(|_| "non-numeric <History><Depth>".to_string())?
            .unwrap_or(1);
        qos.history = match kind.as_str() {
            "KEEP_ALL" => History::KeepAll,
            "KEEP_LAST" => History::KeepLast(depth),
            other => return Err(format!("unknown <History><Kind>: {other}")),
        };
    }

    qos.validate()?;
    Ok(qos)
}

fn text_of(root: &roxmltree::Node, path: &[&str]) -> Option<String> {
    let mut node = *root;
    for segment in path {
        node = node
            .children()
            .find(|c| c.is_element() && c.tag_name().name() == *segment)?;
    }
    node.text().map(str::trim).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reliability_and_history() {
        let xml = r#"<Qos>
            <Reliability><Kind>RELIABLE</Kind></Reliability>
            <History><Kind>KEEP_LAST</Kind><Depth>42</Depth></History>
        </Qos>"#;
        let qos = load_str(xml).unwrap();
        assert_eq!(qos.reliability.kind, ReliabilityKind::Reliable);
        assert_eq!(qos.history, History::KeepLast(42));
    }

    #[test]
    fn defaults_when_elements_absent() {
        let qos = load_str("<Qos/>").unwrap();
        assert_eq!(qos, Qos::default());
    }

    #[test]
    fn rejects_unknown_kind() {
        let xml = "<Qos><Durability><Kind>BOGUS</Kind></Durability></Qos>";
        assert!(load_str(xml).is_err());
    }
}
