//! State abstraction — lifecycle flags, outcome sets, and the execution
//! contract every state variant implements.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::blackboard::Blackboard;
use crate::engine::Engine;
use crate::errors::MachineError;

/// A state's result string, drawn from its declared [`OutcomeSet`].
pub type Outcome = String;

/// An order-preserving, duplicate-free set of outcome labels.
///
/// Declaration order is meaningful: the first outcome is what an engine
/// resolves to when it is cancelled mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeSet {
    labels: Vec<String>,
}

impl OutcomeSet {
    /// Build from an iterator of labels, dropping duplicates while keeping
    /// first-seen order. An empty set is rejected: every state must be
    /// able to report something.
    pub fn new<I, S>(outcomes: I) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = Vec::new();
        for outcome in outcomes {
            let outcome = outcome.into();
            if !labels.contains(&outcome) {
                labels.push(outcome);
            }
        }
        if labels.is_empty() {
            return Err(MachineError::InvalidArgument {
                message: "a state must declare at least one outcome".into(),
            });
        }
        Ok(Self { labels })
    }

    pub fn contains(&self, outcome: &str) -> bool {
        self.labels.iter().any(|label| label == outcome)
    }

    /// The first outcome in declaration order. Never empty by construction.
    pub fn first(&self) -> &str {
        &self.labels[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for OutcomeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels.join(", "))
    }
}

/// Atomic lifecycle flags shared by every state implementation.
///
/// `active` is true exactly while an invocation is in flight; `cancelled`
/// is a cooperative signal that state bodies may poll.
#[derive(Debug, Default)]
pub struct StateFlags {
    active: AtomicBool,
    cancelled: AtomicBool,
}

impl StateFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn clear_cancelled(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// An executable unit with a fixed outcome set and cooperative
/// cancellation.
///
/// Implementors provide [`execute`](State::execute); callers should go
/// through [`invoke`](State::invoke), which wraps execution in the
/// lifecycle contract (flag handling and outcome validation).
#[async_trait]
pub trait State: Send + Sync {
    /// The outcomes this state may legally return.
    fn outcomes(&self) -> &OutcomeSet;

    /// The state's lifecycle flags.
    fn flags(&self) -> &StateFlags;

    /// Human-readable label for diagnostics and error messages.
    fn label(&self) -> String;

    /// The state body. Reads and writes the shared blackboard and returns
    /// one of the declared outcomes.
    async fn execute(&self, bb: &Blackboard) -> Result<Outcome, MachineError>;

    /// Request cooperative cancellation. Composite states override this to
    /// fan the signal out to their children.
    fn cancel(&self) {
        self.flags().set_cancelled();
    }

    /// Downcast hook for nested-machine validation. The engine overrides
    /// this to return itself; leaf states keep the default.
    fn as_engine(&self) -> Option<&Engine> {
        None
    }

    /// Full lifecycle invocation: clear `cancelled`, mark `active`, run
    /// [`execute`](State::execute), clear `active` again (on error paths
    /// too), then require the returned outcome to be a member of the
    /// outcome set.
    async fn invoke(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        let flags = self.flags();
        flags.clear_cancelled();
        flags.set_active(true);
        let result = self.execute(bb).await;
        flags.set_active(false);
        let outcome = result?;
        if !self.outcomes().contains(&outcome) {
            return Err(MachineError::InvalidOutcome {
                state: self.label(),
                outcome,
            });
        }
        Ok(outcome)
    }
}
