//! Built-in state implementations.
//!
//! [`CallbackState`] wraps a user function as a leaf state.
//! [`ParallelState`] composes child states that run concurrently.

mod callback;
mod parallel;

pub use callback::{CallbackState, StateFn};
pub use parallel::{ChildOutcomes, ParallelState};
