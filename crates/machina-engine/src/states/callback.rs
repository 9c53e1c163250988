//! Callback state — a leaf state delegating to a user-supplied function.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::blackboard::Blackboard;
use crate::errors::MachineError;
use crate::state::{Outcome, OutcomeSet, State, StateFlags};

/// Boxed async function invoked by [`CallbackState::execute`]. Takes a
/// handle to the shared blackboard and returns one of the state's
/// declared outcomes.
pub type StateFn =
    Box<dyn Fn(Blackboard) -> BoxFuture<'static, Result<Outcome, MachineError>> + Send + Sync>;

/// The simplest leaf state: execution delegates to a stored function.
///
/// A state constructed without a function fails with
/// [`MachineError::NotConfigured`] when executed.
pub struct CallbackState {
    func: Option<StateFn>,
    outcomes: OutcomeSet,
    flags: StateFlags,
    label: String,
}

impl CallbackState {
    /// Create a state with outcomes but no function yet.
    pub fn new<I, S>(outcomes: I) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            func: None,
            outcomes: OutcomeSet::new(outcomes)?,
            flags: StateFlags::new(),
            label: "callback".into(),
        })
    }

    /// Create a state from an async function.
    pub fn with_fn<I, S, F, Fut>(outcomes: I, func: F) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Blackboard) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, MachineError>> + Send + 'static,
    {
        let mut state = Self::new(outcomes)?;
        state.func = Some(Box::new(move |bb| Box::pin(func(bb))));
        Ok(state)
    }

    /// Create a state from a synchronous closure.
    pub fn from_sync<I, S, F>(outcomes: I, func: F) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Blackboard) -> Result<Outcome, MachineError> + Send + Sync + 'static,
    {
        Self::with_fn(outcomes, move |bb| {
            let result = func(&bb);
            async move { result }
        })
    }

    /// Override the default `"callback"` debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl State for CallbackState {
    fn outcomes(&self) -> &OutcomeSet {
        &self.outcomes
    }

    fn flags(&self) -> &StateFlags {
        &self.flags
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn execute(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        match &self.func {
            Some(func) => func(bb.clone()).await,
            None => Err(MachineError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_the_stored_function() {
        let state = CallbackState::with_fn(["done"], |bb: Blackboard| async move {
            bb.set("ran", true)?;
            Ok("done".to_string())
        })
        .unwrap();

        let bb = Blackboard::new();
        assert_eq!(state.invoke(&bb).await.unwrap(), "done");
        assert_eq!(bb.get::<bool>("ran"), Some(true));
    }

    #[tokio::test]
    async fn missing_function_is_not_configured() {
        let state = CallbackState::new(["done"]).unwrap();
        let err = state.invoke(&Blackboard::new()).await.unwrap_err();
        assert!(matches!(err, MachineError::NotConfigured));
    }

    #[tokio::test]
    async fn sync_closures_are_supported() {
        let state = CallbackState::from_sync(["odd", "even"], |bb: &Blackboard| {
            let n = bb.get::<i64>("n").unwrap_or(0);
            Ok(if n % 2 == 0 { "even" } else { "odd" }.to_string())
        })
        .unwrap();

        let bb = Blackboard::new();
        bb.set("n", 3i64).unwrap();
        assert_eq!(state.invoke(&bb).await.unwrap(), "odd");
    }

    #[tokio::test]
    async fn undeclared_outcome_fails_invoke() {
        let state = CallbackState::with_fn(["done"], |_bb| async { Ok("wrong".to_string()) })
            .unwrap()
            .with_label("dishonest");
        let err = state.invoke(&Blackboard::new()).await.unwrap_err();
        match err {
            MachineError::InvalidOutcome { state, outcome } => {
                assert_eq!(state, "dishonest");
                assert_eq!(outcome, "wrong");
            }
            other => panic!("expected InvalidOutcome, got: {other}"),
        }
    }

    #[test]
    fn label_builder() {
        let state = CallbackState::new(["done"]).unwrap().with_label("fetch");
        assert_eq!(state.label(), "fetch");
    }
}
