//! Hierarchical state machines with parallel composition and a shared
//! typed blackboard.
//!
//! An [`Engine`] drives user-defined [`State`]s through an outcome-keyed
//! transition table: each state returns one of its declared outcome
//! strings, the table maps it to the next state, and an outcome with no
//! mapping ends the run as one of the engine's own terminal outcomes.
//! The engine is itself a `State`, so machines nest arbitrarily, and
//! [`ParallelState`] composes children that run concurrently and are
//! aggregated through a predicate table. Every state shares one
//! [`Blackboard`] — a concurrent, type-checked key/value store.
//!
//! The crate is a library meant to be embedded: it has no CLI, no
//! persistence, and no opinion about logging output beyond emitting
//! `tracing` events.

pub mod blackboard;
pub mod engine;
pub mod errors;
pub mod state;
pub mod states;
pub mod types;
pub mod validate;

// Re-export the public surface at the crate level.

// blackboard
pub use blackboard::{Blackboard, BlackboardValue};

// engine
pub use engine::{EndCallback, Engine, EngineConfig, StartCallback, TransitionCallback};

// errors
pub use errors::{BlackboardError, CallbackStage, MachineError};

// state
pub use state::{Outcome, OutcomeSet, State, StateFlags};

// states
pub use states::{CallbackState, ChildOutcomes, ParallelState, StateFn};

// types
pub use types::{MachineDef, StateDef};

// validate
pub use validate::check_machine;
