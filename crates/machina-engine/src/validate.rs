//! Machine graph validation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::MachineError;
use crate::state::{OutcomeSet, State};

/// Validate a machine's registry for structural correctness.
///
/// Always checked: the initial state is set and registered, and every
/// transition target is either a registered state or one of the machine's
/// own outcomes. Under `forced`, every outcome of every registered state
/// must additionally be routed — a transition source for that state or a
/// machine outcome — and nested machines are validated recursively with
/// the same flag.
///
/// Cycles in the transition graph are legal and not flagged.
pub fn check_machine(
    states: &HashMap<String, Arc<dyn State>>,
    transitions: &HashMap<String, HashMap<String, String>>,
    initial_state: Option<&str>,
    outcomes: &OutcomeSet,
    forced: bool,
) -> Result<(), MachineError> {
    let initial = initial_state.ok_or_else(|| MachineError::Validation {
        message: "initial state is not set".into(),
    })?;
    if !states.contains_key(initial) {
        return Err(MachineError::Validation {
            message: format!("initial state {initial:?} is not registered"),
        });
    }

    for (name, state) in states {
        let state_transitions = transitions.get(name);

        if forced {
            for outcome in state.outcomes().iter() {
                let is_source = state_transitions.is_some_and(|t| t.contains_key(outcome));
                if !is_source && !outcomes.contains(outcome) {
                    return Err(MachineError::Validation {
                        message: format!(
                            "outcome {outcome:?} of state {name:?} is neither a transition source nor a machine outcome"
                        ),
                    });
                }
            }
        }

        if let Some(table) = state_transitions {
            for (source, target) in table {
                if !states.contains_key(target) && !outcomes.contains(target) {
                    return Err(MachineError::Validation {
                        message: format!(
                            "transition {source:?} -> {target:?} of state {name:?} targets neither a registered state nor a machine outcome"
                        ),
                    });
                }
            }
        }

        // Nested machines are checked with the same strictness.
        if let Some(nested) = state.as_engine() {
            nested.validate(forced)?;
        }
    }

    Ok(())
}
