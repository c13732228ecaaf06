//! Instruction execution engine.
//!
//! The engine is the per-instruction half of the machine: the
//! [`interpreter`] dispatches one instruction against a thread's private
//! state and returns a [`StepResult`] describing the required machine-level
//! effect, and [`trace`] records what happened. The scheduling loop that
//! drives the engine lives in [`crate::machine`].

pub mod interpreter;
pub mod result;
pub mod trace;

pub use interpreter::{execute, ExecError};
pub use result::StepResult;
pub use trace::{TraceEvent, TraceFlags, TraceLog, WakeSource};
