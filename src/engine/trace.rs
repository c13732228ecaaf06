//! Execution tracing for debugging and tests.
//!
//! The machine reports what it does through [`TraceEvent`]s: thread
//! lifecycle, scheduling decisions, blocking and waking, sync violations and
//! terminal outcomes. Events render as human-readable lines (this is a
//! debugging surface, not a stable machine-parseable format) and are
//! collected in a bounded in-memory [`TraceLog`]; each recorded event is
//! also forwarded to the `log` facade so embedders see diagnostics through
//! their usual logger.
//!
//! Categories are selected with [`TraceFlags`]; per-step events are by far
//! the noisiest and are off unless [`TraceFlags::STEPS`] is set.

use std::fmt;

use bitflags::bitflags;

use crate::thread::state::BlockedOn;

bitflags! {
    /// Diagnostic categories recorded by the trace log.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TraceFlags: u32 {
        /// Thread spawn, completion and fault events.
        const LIFECYCLE = 1 << 0;
        /// Blocking, waking and sync-violation events.
        const SYNC = 1 << 1;
        /// One event per executed instruction.
        const STEPS = 1 << 2;
        /// Terminal scheduler verdicts (deadlock, budget exhaustion).
        const VERDICTS = 1 << 3;
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        TraceFlags::LIFECYCLE | TraceFlags::SYNC | TraceFlags::VERDICTS
    }
}

/// How a blocked thread was returned to the runnable set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeSource {
    /// Explicit hand-off from a release, send, or thread termination.
    /// This is the canonical wake path.
    Handoff,

    /// The safety-net re-poll of blocked reasons, which only runs when
    /// nothing else is runnable.
    Poll,
}

impl fmt::Display for WakeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeSource::Handoff => write!(f, "hand-off"),
            WakeSource::Poll => write!(f, "poll"),
        }
    }
}

/// A diagnostic event recorded during a run.
#[derive(Clone, Debug)]
pub enum TraceEvent {
    /// A thread was registered with the machine.
    ThreadSpawned {
        /// Thread name.
        name: String,
        /// Scheduling priority.
        priority: i32,
    },

    /// A thread executed one instruction.
    Step {
        /// Machine cycle number (1-based).
        step: u64,
        /// Executing thread.
        thread: String,
        /// Program counter before execution.
        pc: usize,
        /// The instruction, rendered.
        instruction: String,
        /// Operand stack before execution, bottom first.
        stack: String,
        /// Thread-private variable bindings before execution.
        variables: String,
    },

    /// A thread blocked on a resource.
    ThreadBlocked {
        /// Blocked thread.
        thread: String,
        /// What it is waiting for.
        reason: BlockedOn,
    },

    /// A blocked thread became runnable again.
    ThreadWoken {
        /// Woken thread.
        thread: String,
        /// Which wake path fired.
        source: WakeSource,
    },

    /// A thread ran off the end of its program.
    ThreadCompleted {
        /// Completed thread.
        name: String,
    },

    /// A thread was terminated by an execution fault.
    ThreadFaulted {
        /// Faulted thread.
        name: String,
        /// Rendered fault, naming the offending opcode.
        error: String,
    },

    /// A reported no-op synchronization failure (e.g. releasing an unowned
    /// lock). The thread keeps running.
    SyncViolation {
        /// Offending thread.
        thread: String,
        /// Resource name.
        resource: String,
        /// Rendered violation.
        error: String,
    },

    /// Every live thread is blocked and none can proceed.
    DeadlockDetected {
        /// The stuck threads.
        waiting: Vec<String>,
    },

    /// The step budget was exhausted before a terminal state.
    BudgetExhausted {
        /// Cycles executed.
        steps: u64,
    },
}

impl TraceEvent {
    /// Returns the category this event belongs to.
    #[must_use]
    pub fn category(&self) -> TraceFlags {
        match self {
            TraceEvent::ThreadSpawned { .. }
            | TraceEvent::ThreadCompleted { .. }
            | TraceEvent::ThreadFaulted { .. } => TraceFlags::LIFECYCLE,
            TraceEvent::Step { .. } => TraceFlags::STEPS,
            TraceEvent::ThreadBlocked { .. }
            | TraceEvent::ThreadWoken { .. }
            | TraceEvent::SyncViolation { .. } => TraceFlags::SYNC,
            TraceEvent::DeadlockDetected { .. } | TraceEvent::BudgetExhausted { .. } => {
                TraceFlags::VERDICTS
            }
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::ThreadSpawned { name, priority } => {
                write!(f, "spawned thread {name} (priority {priority})")
            }
            TraceEvent::Step {
                step,
                thread,
                pc,
                instruction,
                stack,
                variables,
            } => {
                write!(
                    f,
                    "step {step}: {thread} pc={pc} {instruction} stack={stack} vars={variables}"
                )
            }
            TraceEvent::ThreadBlocked { thread, reason } => {
                write!(f, "{thread} blocked on {reason}")
            }
            TraceEvent::ThreadWoken { thread, source } => {
                write!(f, "{thread} woken ({source})")
            }
            TraceEvent::ThreadCompleted { name } => write!(f, "{name} completed"),
            TraceEvent::ThreadFaulted { name, error } => {
                write!(f, "{name} faulted: {error}")
            }
            TraceEvent::SyncViolation {
                thread,
                resource,
                error,
            } => {
                write!(f, "{thread} sync violation on {resource}: {error}")
            }
            TraceEvent::DeadlockDetected { waiting } => {
                write!(f, "deadlock detected: {}", waiting.join(", "))
            }
            TraceEvent::BudgetExhausted { steps } => {
                write!(f, "step budget exhausted after {steps} steps")
            }
        }
    }
}

/// Bounded in-memory event collector.
///
/// Keeps at most `capacity` events, discarding the oldest once full (the
/// tail of a run matters more than the head when diagnosing a hang), and
/// counts everything it ever saw.
#[derive(Debug)]
pub struct TraceLog {
    flags: TraceFlags,
    events: Vec<TraceEvent>,
    capacity: usize,
    recorded: u64,
}

impl TraceLog {
    /// Creates a log recording the given categories, keeping at most
    /// `capacity` events in memory.
    #[must_use]
    pub fn new(flags: TraceFlags, capacity: usize) -> Self {
        TraceLog {
            flags,
            events: Vec::new(),
            capacity,
            recorded: 0,
        }
    }

    /// Returns `true` when the given category is being recorded.
    #[must_use]
    pub fn enabled(&self, category: TraceFlags) -> bool {
        self.flags.intersects(category)
    }

    /// Records an event if its category is enabled.
    pub fn record(&mut self, event: TraceEvent) {
        if !self.enabled(event.category()) {
            return;
        }

        let category = event.category();
        if category == TraceFlags::STEPS {
            log::trace!("{event}");
        } else if category == TraceFlags::VERDICTS {
            log::warn!("{event}");
        } else {
            log::debug!("{event}");
        }

        self.recorded += 1;
        if self.events.len() == self.capacity {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    /// Returns the retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Returns the total number of events recorded, including discarded
    /// ones.
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded
    }
}
