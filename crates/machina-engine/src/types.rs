//! Serializable machine description — the diagnostics contract.

use std::collections::BTreeMap;

use serde::Serialize;

/// Topology snapshot of a machine, produced by
/// [`Engine::describe`](crate::engine::Engine::describe).
///
/// **Invariant**: `transitions` uses `BTreeMap`, never `HashMap`, and
/// `states` is sorted by name — serialized output must be deterministic
/// so two snapshots of the same machine compare equal.
#[derive(Debug, Clone, Serialize)]
pub struct MachineDef {
    pub name: String,
    /// Terminal outcomes in declaration order.
    pub outcomes: Vec<String>,
    pub initial_state: Option<String>,
    /// Registered states, sorted by name.
    pub states: Vec<StateDef>,
}

/// One registered state within a [`MachineDef`].
#[derive(Debug, Clone, Serialize)]
pub struct StateDef {
    /// Name the state is registered under.
    pub name: String,
    /// The state's own debug label.
    pub label: String,
    /// The state's outcome set in declaration order.
    pub outcomes: Vec<String>,
    /// Outcome → successor state name or machine outcome.
    pub transitions: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_deterministic_key_order() {
        let def = MachineDef {
            name: "m".into(),
            outcomes: vec!["ok".into()],
            initial_state: Some("A".into()),
            states: vec![StateDef {
                name: "A".into(),
                label: "a-state".into(),
                outcomes: vec!["done".into(), "fail".into()],
                transitions: BTreeMap::from([
                    ("fail".to_string(), "ok".to_string()),
                    ("done".to_string(), "ok".to_string()),
                ]),
            }],
        };
        let json = serde_json::to_string(&def).unwrap();
        // BTreeMap keys serialize sorted.
        assert!(json.contains(r#""transitions":{"done":"ok","fail":"ok"}"#));
    }
}
