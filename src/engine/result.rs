//! Step result types.
//!
//! The interpreter executes one instruction against a thread's private state
//! and returns a [`StepResult`] describing what the machine must do next.
//! Anything that touches shared machine state — resource tables, the thread
//! registry, the spawn table, real time — is expressed as a result variant
//! and applied by the machine, keeping instruction semantics free of
//! registry bookkeeping.

use crate::value::Value;

/// Outcome of dispatching a single instruction.
///
/// `Continue` and every resource variant advance the program counter by one;
/// `Jump` sets it absolutely. Blocking is decided by the machine when it
/// applies an acquire/receive variant against the named resource.
#[derive(Clone, Debug, PartialEq)]
pub enum StepResult {
    /// Proceed to the next sequential instruction.
    Continue,

    /// Transfer control within the thread's program.
    Jump {
        /// Index of the next instruction to execute.
        target: usize,
    },

    /// Emit a line of program output.
    Output {
        /// The formatted line, including the thread prefix.
        line: String,
    },

    /// Spawn a thread running the spawn-table program at `index`.
    ///
    /// The machine validates the index, creates the thread at the creator's
    /// priority plus one, and pushes the new thread's name onto the
    /// creator's stack.
    Spawn {
        /// Spawn-table index as popped from the stack (validated by the
        /// machine; negatives are a fault).
        index: i64,
    },

    /// Block until the named thread stops running.
    Join {
        /// Target thread name.
        thread: String,
    },

    /// Create a lock and push its generated name.
    CreateLock,

    /// Acquire the named lock or block FIFO behind its owner.
    AcquireLock {
        /// Lock name.
        name: String,
    },

    /// Release the named lock, handing ownership to the oldest waiter.
    ReleaseLock {
        /// Lock name.
        name: String,
    },

    /// Create a semaphore with `count` permits and push its generated name.
    CreateSemaphore {
        /// Initial permit count (negatives are a fault).
        count: i64,
    },

    /// Consume a permit from the named semaphore or block FIFO.
    AcquireSemaphore {
        /// Semaphore name.
        name: String,
    },

    /// Release a permit, waking the oldest waiter if any.
    ReleaseSemaphore {
        /// Semaphore name.
        name: String,
    },

    /// Create a mailbox and push its generated name.
    CreateMailbox,

    /// Send a message to the named mailbox (direct delivery to a blocked
    /// receiver when one is queued).
    Send {
        /// Mailbox name.
        name: String,
        /// Message payload.
        message: Value,
    },

    /// Receive from the named mailbox or block FIFO as a receiver.
    Receive {
        /// Mailbox name.
        name: String,
    },

    /// Create an atomic counter and push its generated name.
    CreateCounter {
        /// Initial counter value.
        initial: i64,
    },

    /// Increment the named counter and push the new value.
    CounterIncrement {
        /// Counter name.
        name: String,
    },

    /// Decrement the named counter and push the new value.
    CounterDecrement {
        /// Counter name.
        name: String,
    },

    /// Push the named counter's current value.
    CounterGet {
        /// Counter name.
        name: String,
    },

    /// Pace execution for the given duration.
    Sleep {
        /// Milliseconds to sleep (honored only when pacing is enabled).
        millis: u64,
    },
}
