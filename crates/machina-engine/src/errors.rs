//! Error types for every engine component.

use std::fmt;

use thiserror::Error;

/// Which callback list an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    Start,
    Transition,
    End,
}

impl fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackStage::Start => write!(f, "start"),
            CallbackStage::Transition => write!(f, "transition"),
            CallbackStage::End => write!(f, "end"),
        }
    }
}

/// Errors from [`Blackboard`](crate::blackboard::Blackboard) typed access.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlackboardError {
    /// Typed access disagrees with the stored entry's type.
    #[error("type mismatch for key {key:?}: stored {stored}, requested {requested}")]
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },
}

/// Errors from state execution and machine operations.
///
/// States and the engine share one error type because they are mutually
/// recursive: an [`Engine`](crate::engine::Engine) is itself a
/// [`State`](crate::state::State).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MachineError {
    /// A construction or registration argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    /// A callback state was executed without a function.
    #[error("no callback function configured")]
    NotConfigured,
    /// `execute` returned a value outside the state's outcome set.
    #[error("invalid outcome {outcome:?} from state {state}")]
    InvalidOutcome { state: String, outcome: String },
    /// An outcome had no transition and is not a machine outcome.
    #[error("unhandled outcome {outcome:?} from state {state}")]
    UnhandledOutcome { state: String, outcome: String },
    /// The machine graph is malformed.
    #[error("validation failed: {message}")]
    Validation { message: String },
    /// More than one parallel predicate was satisfied by the same run.
    #[error("ambiguous parallel outcome: {outcomes:?} satisfied simultaneously")]
    AmbiguousOutcome { outcomes: Vec<String> },
    /// A user callback failed; carries the original message.
    #[error("{stage} callback failed: {message}")]
    Callback {
        stage: CallbackStage,
        message: String,
    },
    /// A state body failed.
    #[error("state execution failed: {message}")]
    Execution { message: String },
    /// The run loop exceeded the configured step limit.
    #[error("run exceeded the step limit of {limit}")]
    StepLimit { limit: u64 },
    /// A blackboard operation failed inside a state body.
    #[error(transparent)]
    Blackboard(#[from] BlackboardError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_stage_display() {
        assert_eq!(CallbackStage::Start.to_string(), "start");
        assert_eq!(CallbackStage::Transition.to_string(), "transition");
        assert_eq!(CallbackStage::End.to_string(), "end");
    }

    #[test]
    fn blackboard_error_converts() {
        let err = BlackboardError::TypeMismatch {
            key: "k".into(),
            stored: "i64",
            requested: "alloc::string::String",
        };
        let machine: MachineError = err.into();
        assert!(machine.to_string().contains("type mismatch for key \"k\""));
    }

    #[test]
    fn callback_error_carries_stage_and_message() {
        let err = MachineError::Callback {
            stage: CallbackStage::End,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "end callback failed: boom");
    }
}
