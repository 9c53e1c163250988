//! Parallel state — concurrent fan-out over child states with
//! outcome-predicate aggregation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::blackboard::Blackboard;
use crate::errors::MachineError;
use crate::state::{Outcome, OutcomeSet, State, StateFlags};

/// Map from child name to an outcome — expected outcomes in predicate
/// tables, actual outcomes in the intermediate snapshot.
pub type ChildOutcomes = HashMap<String, Outcome>;

/// Runs every child concurrently, then aggregates their outcomes through
/// a predicate table.
///
/// A table entry `outcome -> {child: expected, ...}` is *satisfied* when
/// every listed child produced its expected outcome; children not listed
/// are irrelevant to that entry. Exactly one satisfied entry wins; none
/// resolves to the default outcome; more than one is an error.
pub struct ParallelState {
    children: HashMap<String, Arc<dyn State>>,
    default_outcome: Outcome,
    outcome_table: HashMap<Outcome, ChildOutcomes>,
    intermediate: Arc<Mutex<ChildOutcomes>>,
    outcomes: OutcomeSet,
    flags: StateFlags,
}

impl std::fmt::Debug for ParallelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelState")
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("default_outcome", &self.default_outcome)
            .field("outcome_table", &self.outcome_table)
            .field("outcomes", &self.outcomes)
            .field("flags", &self.flags)
            .finish()
    }
}

impl ParallelState {
    /// Build a parallel composition. Every child referenced by the table
    /// must be present in `children`, and every expected outcome must be
    /// in that child's outcome set. The state's own outcome set is the
    /// default outcome followed by the table's outcomes in sorted order.
    pub fn new(
        children: HashMap<String, Arc<dyn State>>,
        default_outcome: impl Into<String>,
        outcome_table: HashMap<String, ChildOutcomes>,
    ) -> Result<Self, MachineError> {
        let default_outcome = default_outcome.into();

        for (outcome, prerequisites) in &outcome_table {
            for (child_name, expected) in prerequisites {
                let child = children.get(child_name).ok_or_else(|| {
                    MachineError::InvalidArgument {
                        message: format!(
                            "predicate for outcome {outcome:?} references unknown child {child_name:?}"
                        ),
                    }
                })?;
                if !child.outcomes().contains(expected) {
                    return Err(MachineError::InvalidArgument {
                        message: format!(
                            "child {child_name:?} has no outcome {expected:?} (required by predicate {outcome:?})"
                        ),
                    });
                }
            }
        }

        let mut table_outcomes: Vec<String> = outcome_table.keys().cloned().collect();
        table_outcomes.sort();
        let outcomes = OutcomeSet::new(
            std::iter::once(default_outcome.clone()).chain(table_outcomes),
        )?;

        Ok(Self {
            children,
            default_outcome,
            outcome_table,
            intermediate: Arc::new(Mutex::new(HashMap::new())),
            outcomes,
            flags: StateFlags::new(),
        })
    }

    /// Registered child names, sorted.
    pub fn child_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.children.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn default_outcome(&self) -> &str {
        &self.default_outcome
    }

    /// Snapshot of the child outcomes recorded by the most recent run.
    pub fn intermediate_outcomes(&self) -> ChildOutcomes {
        self.intermediate.lock().clone()
    }

    fn satisfied_outcomes(&self, intermediate: &ChildOutcomes) -> Vec<Outcome> {
        let mut satisfied: Vec<Outcome> = self
            .outcome_table
            .iter()
            .filter(|(_, prerequisites)| {
                prerequisites
                    .iter()
                    .all(|(child, expected)| intermediate.get(child) == Some(expected))
            })
            .map(|(outcome, _)| outcome.clone())
            .collect();
        satisfied.sort();
        satisfied
    }
}

#[async_trait]
impl State for ParallelState {
    fn outcomes(&self) -> &OutcomeSet {
        &self.outcomes
    }

    fn flags(&self) -> &StateFlags {
        &self.flags
    }

    fn label(&self) -> String {
        format!(
            "parallel({} children, default {:?})",
            self.children.len(),
            self.default_outcome
        )
    }

    async fn execute(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        self.intermediate.lock().clear();
        tracing::debug!(children = self.children.len(), "parallel fan-out");

        let mut tasks: FuturesUnordered<tokio::task::JoinHandle<Result<(), MachineError>>> =
            FuturesUnordered::new();
        for (name, child) in &self.children {
            let name = name.clone();
            let child = Arc::clone(child);
            let bb = bb.clone();
            let intermediate = Arc::clone(&self.intermediate);
            tasks.push(tokio::spawn(async move {
                let outcome = child.execute(&bb).await?;
                tracing::debug!(child = %name, outcome = %outcome, "parallel child finished");
                intermediate.lock().insert(name, outcome);
                Ok(())
            }));
        }

        // Barrier join: every child runs to completion before the first
        // captured failure is re-raised.
        let mut first_error: Option<MachineError> = None;
        while let Some(joined) = tasks.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(MachineError::Execution {
                    message: format!("parallel child task panicked: {e}"),
                })
            });
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if self.flags.is_cancelled() {
            return Ok(self.default_outcome.clone());
        }

        let intermediate = self.intermediate.lock().clone();
        let satisfied = self.satisfied_outcomes(&intermediate);
        if satisfied.len() > 1 {
            return Err(MachineError::AmbiguousOutcome {
                outcomes: satisfied,
            });
        }
        match satisfied.into_iter().next() {
            Some(outcome) => Ok(outcome),
            None => Ok(self.default_outcome.clone()),
        }
    }

    /// Fan the cancellation out to every child, then mark this state.
    /// Cooperative: the join barrier still waits for children to return.
    fn cancel(&self) {
        for child in self.children.values() {
            child.cancel();
        }
        self.flags.set_cancelled();
    }
}
