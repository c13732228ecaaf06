//! Thread lifecycle states and blocked reasons.

use std::fmt;

/// Thread execution state.
///
/// Threads progress through these states during their lifetime;
/// `Completed` and `Faulted` are terminal and a thread never leaves them.
///
/// # State transitions
///
/// ```text
/// Runnable -> Completed
///     |           ^
///     v           |
/// Blocked --------'
///     |
///     v
/// Faulted
/// ```
///
/// A `Blocked` thread carries the [`BlockedOn`] reason it is waiting for.
/// The canonical way back to `Runnable` is an explicit hand-off from the
/// releasing side (lock release, semaphore release, mailbox send, or the
/// joined thread terminating); the machine additionally re-polls blocked
/// reasons as a safety net when nothing else is runnable.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Ready to execute the instruction at its program counter.
    #[default]
    Runnable,

    /// Waiting on a synchronization resource or another thread.
    Blocked(BlockedOn),

    /// Ran off the end of its program. Terminal.
    Completed,

    /// Terminated early by an execution fault. Terminal.
    Faulted,
}

impl ThreadState {
    /// Returns `true` while the thread can still make progress
    /// (runnable or blocked).
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, ThreadState::Runnable | ThreadState::Blocked(_))
    }

    /// Returns `true` for the terminal states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Returns the blocked reason, if the thread is blocked.
    #[must_use]
    pub fn blocked_on(&self) -> Option<&BlockedOn> {
        match self {
            ThreadState::Blocked(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns the state label used in reports and diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ThreadState::Runnable => "runnable",
            ThreadState::Blocked(_) => "waiting",
            ThreadState::Completed => "terminated",
            ThreadState::Faulted => "faulted",
        }
    }
}

/// What a blocked thread is waiting for.
///
/// Each variant names the resource that refused the thread, so blocked state
/// is introspectable: the machine re-queries the named resource to decide
/// whether the thread may proceed, reports expose the reason directly, and
/// deadlock diagnostics can say *what* every stuck thread is waiting on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockedOn {
    /// Waiting to acquire the named lock.
    Lock(String),

    /// Waiting for a permit from the named semaphore.
    Semaphore(String),

    /// Waiting to receive from the named mailbox.
    Mailbox(String),

    /// Waiting for the named thread to stop running.
    Join(String),
}

impl BlockedOn {
    /// Returns the name of the resource or thread being waited on.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            BlockedOn::Lock(name)
            | BlockedOn::Semaphore(name)
            | BlockedOn::Mailbox(name)
            | BlockedOn::Join(name) => name,
        }
    }
}

impl fmt::Display for BlockedOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockedOn::Lock(name) => write!(f, "lock {name}"),
            BlockedOn::Semaphore(name) => write!(f, "semaphore {name}"),
            BlockedOn::Mailbox(name) => write!(f, "mailbox {name}"),
            BlockedOn::Join(name) => write!(f, "join {name}"),
        }
    }
}
