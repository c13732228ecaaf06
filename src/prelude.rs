//! # weftvm Prelude
//!
//! Convenience re-exports of the types needed to assemble programs, build a
//! machine, run it and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all host-facing operations
pub use crate::Error;

/// The result type used throughout the host-facing API
pub use crate::Result;

/// Runtime values on thread stacks and in variable bindings
pub use crate::Value;

// ================================================================================================
// Programs
// ================================================================================================

/// Immutable instruction sequences shared across threads
pub use crate::program::{Instruction, Opcode, Program};

// ================================================================================================
// Machine
// ================================================================================================

/// The virtual machine and its configuration
pub use crate::machine::{ExecutionLimits, Machine, MachineConfig};

/// Run results and per-thread reports
pub use crate::machine::{RunOutcome, RunReport, ThreadReport};

// ================================================================================================
// Threads and Scheduling
// ================================================================================================

/// Scheduling policies
pub use crate::thread::scheduler::SchedulePolicy;

/// Thread lifecycle states and blocked reasons
pub use crate::thread::state::{BlockedOn, ThreadState};

/// Synchronization primitive states
pub use crate::thread::sync::{
    AtomicCounter, LockState, MailboxState, SemaphoreState, SyncError,
};

// ================================================================================================
// Diagnostics
// ================================================================================================

/// Execution faults scoped to a single thread
pub use crate::engine::ExecError;

/// Trace events and category filters
pub use crate::engine::{TraceEvent, TraceFlags, TraceLog};
