//! Change-notification message types.
//!
//! A [`ChangeEvent`] is built once per successful mutation and handed to
//! [`ChangeNotifier::broadcast`](super::ChangeNotifier::broadcast). Only the
//! resource kind and id travel to subscribers; the origin session is used
//! server-side to suppress the echo and is never sent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of vault resource a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Credential,
    Card,
    File,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Credential => "credential",
            Self::Card => "card",
            Self::File => "file",
        };
        f.write_str(name)
    }
}

/// A mutation of one resource, produced by the session `origin_session_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ResourceKind,
    pub resource_id: String,
    pub origin_session_id: String,
}

impl ChangeEvent {
    pub fn new(
        kind: ResourceKind,
        resource_id: impl Into<String>,
        origin_session_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource_id: resource_id.into(),
            origin_session_id: origin_session_id.into(),
        }
    }

    /// The frame pushed to subscribers.
    pub fn notice(&self) -> ChangeNotice {
        ChangeNotice {
            source: self.kind,
            id: self.resource_id.clone(),
        }
    }
}

/// Wire form of a change, one JSON text frame per notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub source: ResourceKind,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_drops_origin_session() {
        let event = ChangeEvent::new(ResourceKind::Card, "card-1", "session-a");
        let json = serde_json::to_value(event.notice()).unwrap();

        assert_eq!(json, serde_json::json!({"source": "card", "id": "card-1"}));
    }

    #[test]
    fn resource_kind_display_matches_wire_name() {
        for kind in [ResourceKind::Credential, ResourceKind::Card, ResourceKind::File] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, serde_json::Value::String(kind.to_string()));
        }
    }
}
