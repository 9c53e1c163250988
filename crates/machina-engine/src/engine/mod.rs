//! Engine — drives a directed graph of states by outcome-keyed
//! transitions.
//!
//! States are registered under unique names; each registration carries a
//! transition table mapping the state's outcomes to successor names or to
//! the engine's own terminal outcomes. The [`Engine`] is itself a
//! [`State`], so machines nest arbitrarily.
//!
//! ```rust,ignore
//! let mut engine = Engine::new(["ok", "err"])?;
//! engine.add_state("fetch", fetch_state, transitions)?;
//! engine.set_initial_state("fetch")?;
//! let outcome = engine.run(&bb).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::blackboard::Blackboard;
use crate::errors::{CallbackStage, MachineError};
use crate::state::{Outcome, OutcomeSet, State, StateFlags};
use crate::types::{MachineDef, StateDef};
use crate::validate::check_machine;

/// Configuration knobs for the run loop.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Maximum state invocations per run. `None` means unbounded. Cyclic
    /// graphs are legal; this is the brake against unintended loops.
    pub max_steps: Option<u64>,
}

/// Observes the start of a run: `(blackboard, initial_state, user_args)`.
pub type StartCallback =
    Box<dyn Fn(&Blackboard, &str, &[String]) -> Result<(), MachineError> + Send + Sync>;

/// Observes a transition: `(blackboard, from, to, outcome, user_args)`.
pub type TransitionCallback =
    Box<dyn Fn(&Blackboard, &str, &str, &str, &[String]) -> Result<(), MachineError> + Send + Sync>;

/// Observes the end of a run: `(blackboard, final_outcome, user_args)`.
pub type EndCallback =
    Box<dyn Fn(&Blackboard, &str, &[String]) -> Result<(), MachineError> + Send + Sync>;

/// A composite state that drives registered child states through an
/// outcome-keyed transition graph until a terminal outcome is produced.
pub struct Engine {
    name: String,
    outcomes: OutcomeSet,
    flags: StateFlags,
    config: EngineConfig,
    states: HashMap<String, Arc<dyn State>>,
    transitions: HashMap<String, HashMap<Outcome, String>>,
    initial_state: Option<String>,
    /// Published for external observers; written only by the run loop
    /// and read by `current_state()` / `cancel()`.
    current_state: Mutex<Option<String>>,
    is_valid: AtomicBool,
    start_callbacks: Vec<(StartCallback, Vec<String>)>,
    transition_callbacks: Vec<(TransitionCallback, Vec<String>)>,
    end_callbacks: Vec<(EndCallback, Vec<String>)>,
}

impl Engine {
    /// Create an engine with the given terminal outcome set. The first
    /// outcome in declaration order doubles as the result of a cancelled
    /// run.
    pub fn new<I, S>(outcomes: I) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            name: "engine".into(),
            outcomes: OutcomeSet::new(outcomes)?,
            flags: StateFlags::new(),
            config: EngineConfig::default(),
            states: HashMap::new(),
            transitions: HashMap::new(),
            initial_state: None,
            current_state: Mutex::new(None),
            is_valid: AtomicBool::new(false),
            start_callbacks: Vec::new(),
            transition_callbacks: Vec::new(),
            end_callbacks: Vec::new(),
        })
    }

    /// Override the default `"engine"` debug label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a state under a unique name together with its transition
    /// table (outcome → successor state name or engine outcome).
    ///
    /// A duplicate name, or a name that collides with an engine outcome,
    /// is silently ignored. Empty transition labels and sources outside
    /// the state's outcome set are rejected. The first registered state
    /// becomes the initial state until [`set_initial_state`] says
    /// otherwise. Any successful registration invalidates the machine.
    ///
    /// [`set_initial_state`]: Engine::set_initial_state
    pub fn add_state(
        &mut self,
        name: impl Into<String>,
        state: Arc<dyn State>,
        transitions: HashMap<String, String>,
    ) -> Result<(), MachineError> {
        let name = name.into();
        if self.states.contains_key(&name) {
            tracing::warn!(machine = %self.name, state = %name, "ignoring duplicate state registration");
            return Ok(());
        }
        if self.outcomes.contains(&name) {
            tracing::warn!(machine = %self.name, state = %name, "ignoring state whose name collides with an engine outcome");
            return Ok(());
        }

        for (source, target) in &transitions {
            if source.is_empty() || target.is_empty() {
                return Err(MachineError::InvalidArgument {
                    message: format!("transition labels for state {name:?} must be non-empty"),
                });
            }
            if !state.outcomes().contains(source) {
                return Err(MachineError::InvalidArgument {
                    message: format!(
                        "state {name:?} has no outcome {source:?} to transition from"
                    ),
                });
            }
        }

        if self.initial_state.is_none() {
            self.initial_state = Some(name.clone());
        }
        self.transitions.insert(name.clone(), transitions);
        self.states.insert(name, state);
        self.is_valid.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Choose the starting state. Fails if `name` is not registered.
    pub fn set_initial_state(&mut self, name: impl Into<String>) -> Result<(), MachineError> {
        let name = name.into();
        if !self.states.contains_key(&name) {
            return Err(MachineError::InvalidArgument {
                message: format!("cannot set initial state to {name:?}: not registered"),
            });
        }
        self.initial_state = Some(name);
        self.is_valid.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn initial_state(&self) -> Option<&str> {
        self.initial_state.as_deref()
    }

    /// Name of the in-flight state, if a run is active.
    pub fn current_state(&self) -> Option<String> {
        self.current_state.lock().clone()
    }

    /// Registered state names, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.states.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::SeqCst)
    }

    pub fn add_start_callback<F>(&mut self, callback: F, args: Vec<String>)
    where
        F: Fn(&Blackboard, &str, &[String]) -> Result<(), MachineError> + Send + Sync + 'static,
    {
        self.start_callbacks.push((Box::new(callback), args));
    }

    pub fn add_transition_callback<F>(&mut self, callback: F, args: Vec<String>)
    where
        F: Fn(&Blackboard, &str, &str, &str, &[String]) -> Result<(), MachineError>
            + Send
            + Sync
            + 'static,
    {
        self.transition_callbacks.push((Box::new(callback), args));
    }

    pub fn add_end_callback<F>(&mut self, callback: F, args: Vec<String>)
    where
        F: Fn(&Blackboard, &str, &[String]) -> Result<(), MachineError> + Send + Sync + 'static,
    {
        self.end_callbacks.push((Box::new(callback), args));
    }

    /// Check the machine graph. With `forced` false a previously valid
    /// machine passes immediately; with `forced` true the walk also
    /// requires every child outcome to be routed (a transition source or
    /// an engine outcome) and descends into nested machines with the same
    /// strictness.
    pub fn validate(&self, forced: bool) -> Result<(), MachineError> {
        if !forced && self.is_valid.load(Ordering::SeqCst) {
            return Ok(());
        }
        check_machine(
            &self.states,
            &self.transitions,
            self.initial_state.as_deref(),
            &self.outcomes,
            forced,
        )?;
        self.is_valid.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Serializable snapshot of the registered topology.
    pub fn describe(&self) -> MachineDef {
        let mut states: Vec<StateDef> = self
            .states
            .iter()
            .map(|(name, state)| StateDef {
                name: name.clone(),
                label: state.label(),
                outcomes: state.outcomes().iter().map(String::from).collect(),
                transitions: self
                    .transitions
                    .get(name)
                    .into_iter()
                    .flatten()
                    .map(|(source, target)| (source.clone(), target.clone()))
                    .collect(),
            })
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        MachineDef {
            name: self.name.clone(),
            outcomes: self.outcomes.iter().map(String::from).collect(),
            initial_state: self.initial_state.clone(),
            states,
        }
    }

    /// Run the machine against `bb` through the full state lifecycle.
    pub async fn run(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        self.invoke(bb).await
    }

    /// Run against a fresh blackboard; returns it alongside the outcome.
    pub async fn run_default(&self) -> Result<(Blackboard, Outcome), MachineError> {
        let bb = Blackboard::new();
        let outcome = self.invoke(&bb).await?;
        Ok((bb, outcome))
    }

    fn invoke_start_callbacks(&self, bb: &Blackboard, initial: &str) -> Result<(), MachineError> {
        for (callback, args) in &self.start_callbacks {
            callback(bb, initial, args).map_err(|e| MachineError::Callback {
                stage: CallbackStage::Start,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn invoke_transition_callbacks(
        &self,
        bb: &Blackboard,
        from: &str,
        to: &str,
        outcome: &str,
    ) -> Result<(), MachineError> {
        for (callback, args) in &self.transition_callbacks {
            callback(bb, from, to, outcome, args).map_err(|e| MachineError::Callback {
                stage: CallbackStage::Transition,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn invoke_end_callbacks(&self, bb: &Blackboard, outcome: &str) -> Result<(), MachineError> {
        for (callback, args) in &self.end_callbacks {
            callback(bb, outcome, args).map_err(|e| MachineError::Callback {
                stage: CallbackStage::End,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn run_loop(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        self.validate(false)?;
        let initial = self
            .initial_state
            .clone()
            .ok_or_else(|| MachineError::Validation {
                message: "initial state is not set".into(),
            })?;

        self.invoke_start_callbacks(bb, &initial)?;
        *self.current_state.lock() = Some(initial.clone());

        let mut current = initial;
        let mut steps: u64 = 0;
        let final_outcome = loop {
            if let Some(limit) = self.config.max_steps {
                steps += 1;
                if steps > limit {
                    return Err(MachineError::StepLimit { limit });
                }
            }

            let state = self
                .states
                .get(&current)
                .cloned()
                .ok_or_else(|| MachineError::Validation {
                    message: format!("state {current:?} is not registered"),
                })?;

            let outcome = state.invoke(bb).await?;

            // Cancellation is observed at the step boundary only; the
            // just-finished state ran to completion.
            if self.flags.is_cancelled() {
                let fallback = self.outcomes.first().to_string();
                tracing::debug!(machine = %self.name, outcome = %fallback, "run cancelled, resolving to default outcome");
                break fallback;
            }

            match self.transitions.get(&current).and_then(|map| map.get(&outcome)) {
                Some(next) if self.states.contains_key(next) => {
                    self.invoke_transition_callbacks(bb, &current, next, &outcome)?;
                    tracing::debug!(machine = %self.name, from = %current, to = %next, outcome = %outcome, "transition");
                    *self.current_state.lock() = Some(next.clone());
                    current = next.clone();
                }
                // Validation guarantees a non-state target is one of the
                // engine's own outcomes.
                Some(next) => break next.clone(),
                None if self.outcomes.contains(&outcome) => break outcome,
                None => {
                    return Err(MachineError::UnhandledOutcome {
                        state: current,
                        outcome,
                    })
                }
            }
        };

        self.invoke_end_callbacks(bb, &final_outcome)?;
        tracing::debug!(machine = %self.name, outcome = %final_outcome, "run finished");
        Ok(final_outcome)
    }
}

#[async_trait]
impl State for Engine {
    fn outcomes(&self) -> &OutcomeSet {
        &self.outcomes
    }

    fn flags(&self) -> &StateFlags {
        &self.flags
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, bb: &Blackboard) -> Result<Outcome, MachineError> {
        self.run_loop(bb).await
    }

    /// Set the engine's own flag, then cancel the in-flight child, best
    /// effort: the child is looked up from a snapshot of `current_state`.
    fn cancel(&self) {
        self.flags.set_cancelled();
        let current = self.current_state.lock().clone();
        if let Some(name) = current {
            if let Some(state) = self.states.get(&name) {
                state.cancel();
            }
        }
    }

    fn as_engine(&self) -> Option<&Engine> {
        Some(self)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("initial_state", &self.initial_state)
            .field("is_valid", &self.is_valid())
            .finish()
    }
}
