//! Synchronization primitives for thread coordination.
//!
//! The machine coordinates its threads through four named primitives: locks
//! (mutual exclusion with ownership hand-off), counting semaphores, mailboxes
//! (FIFO message channels with direct delivery to blocked receivers), and
//! atomic counters. All of them live in a [`SyncState`] registry owned by the
//! machine; threads refer to them by name.
//!
//! # Waiter queues and hand-off
//!
//! Every blocking primitive keeps a FIFO queue of waiting thread names —
//! "first blocked, first served" per resource. Waking is a *hand-off*: a lock
//! release transfers ownership straight to the oldest waiter, a semaphore
//! release passes the permit to the oldest waiter without touching the count,
//! and a send delivers its message straight to the oldest blocked receiver
//! instead of buffering it. The two mailbox queues are therefore never both
//! non-empty.
//!
//! # Single-stepped atomicity
//!
//! Exactly one thread executes one instruction at any instant, so every
//! operation here runs to completion unobserved. The primitives model
//! *application-level* coordination between program threads; they need no
//! hardware atomics of their own.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::value::Value;

/// Errors from synchronization operations.
///
/// These describe misuse by the *program* (releasing a lock it does not
/// hold). They are surfaced as diagnostics, not thread faults: a bad release
/// is a reported no-op and the thread keeps running.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A thread released a lock owned by a different thread.
    #[error("thread does not own the lock")]
    NotOwner,

    /// A thread released a lock that is not held at all.
    #[error("lock is not held")]
    NotLocked,
}

/// How an opportunistically woken thread resumes.
#[derive(Clone, Debug, PartialEq)]
pub enum Wake {
    /// Resume with no stack effect (lock acquired, permit consumed, join
    /// target finished).
    Resume,

    /// Resume with a value pushed onto the thread's stack (a delivered
    /// mailbox message).
    ResumeWith(Value),
}

/// Mutual-exclusion lock with a FIFO waiter queue and ownership hand-off.
///
/// At most one owner at a time; a queued waiter never simultaneously holds
/// ownership. The lock is not reentrant: an owner that acquires again queues
/// behind itself and deadlocks, which the deadlock detector will report.
#[derive(Clone, Debug, Default)]
pub struct LockState {
    locked: bool,
    owner: Option<String>,
    waiters: VecDeque<String>,
}

impl LockState {
    /// Attempts to acquire the lock for `thread`.
    ///
    /// Returns `true` when the caller became the owner. On `false` the
    /// caller has been appended to the FIFO waiter queue and must block.
    pub fn acquire(&mut self, thread: &str) -> bool {
        if self.locked {
            self.waiters.push_back(thread.to_string());
            false
        } else {
            self.locked = true;
            self.owner = Some(thread.to_string());
            true
        }
    }

    /// Releases the lock.
    ///
    /// When waiters are queued, ownership transfers to the oldest one and
    /// its name is returned so the machine can mark it runnable; otherwise
    /// the lock becomes free.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotLocked`] when the lock is not held, and
    /// [`SyncError::NotOwner`] when `thread` is not the owner. Both are
    /// reported no-ops: the lock state is unchanged.
    pub fn release(&mut self, thread: &str) -> Result<Option<String>, SyncError> {
        if !self.locked {
            return Err(SyncError::NotLocked);
        }
        if self.owner.as_deref() != Some(thread) {
            return Err(SyncError::NotOwner);
        }

        if let Some(next) = self.waiters.pop_front() {
            self.owner = Some(next.clone());
            Ok(Some(next))
        } else {
            self.locked = false;
            self.owner = None;
            Ok(None)
        }
    }

    /// Returns `true` while the lock is held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the current owner's name, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns the queued waiter names in FIFO order.
    #[must_use]
    pub fn waiters(&self) -> &VecDeque<String> {
        &self.waiters
    }
}

/// Counting semaphore with a FIFO waiter queue.
///
/// A release with queued waiters wakes the oldest one and leaves `count`
/// unchanged — the released permit passes directly to the waiter. The count
/// and the waiter queue are therefore never both positive/non-empty.
#[derive(Clone, Debug)]
pub struct SemaphoreState {
    count: i64,
    waiters: VecDeque<String>,
}

impl SemaphoreState {
    /// Creates a semaphore with `count` initial permits.
    ///
    /// Zero permits makes a rendezvous semaphore; positive counts model a
    /// resource pool. Validation of negative counts happens at the opcode
    /// boundary.
    #[must_use]
    pub fn new(count: i64) -> Self {
        SemaphoreState {
            count,
            waiters: VecDeque::new(),
        }
    }

    /// Attempts to consume a permit for `thread`.
    ///
    /// Returns `true` when a permit was available. On `false` the caller has
    /// been appended to the FIFO waiter queue and must block.
    pub fn acquire(&mut self, thread: &str) -> bool {
        if self.count > 0 {
            self.count -= 1;
            true
        } else {
            self.waiters.push_back(thread.to_string());
            false
        }
    }

    /// Releases one permit.
    ///
    /// When waiters are queued the oldest is returned for waking and the
    /// count stays unchanged; otherwise the count increments.
    pub fn release(&mut self) -> Option<String> {
        if let Some(next) = self.waiters.pop_front() {
            Some(next)
        } else {
            self.count += 1;
            None
        }
    }

    /// Returns the number of available permits.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Returns the queued waiter names in FIFO order.
    #[must_use]
    pub fn waiters(&self) -> &VecDeque<String> {
        &self.waiters
    }
}

/// FIFO message mailbox with a FIFO queue of blocked receivers.
///
/// Invariant: the message buffer and the receiver queue are never both
/// non-empty. A send that finds a blocked receiver hands its message over
/// directly instead of buffering it.
#[derive(Clone, Debug, Default)]
pub struct MailboxState {
    messages: VecDeque<Value>,
    receivers: VecDeque<String>,
}

impl MailboxState {
    /// Sends a message.
    ///
    /// When a receiver is blocked, returns `(receiver, message)` for direct
    /// delivery — the machine pushes the message onto that thread's stack
    /// and marks it runnable. Otherwise the message is buffered and `None`
    /// is returned.
    pub fn send(&mut self, message: Value) -> Option<(String, Value)> {
        if let Some(receiver) = self.receivers.pop_front() {
            Some((receiver, message))
        } else {
            self.messages.push_back(message);
            None
        }
    }

    /// Receives the oldest buffered message for `thread`.
    ///
    /// Returns the message when the buffer is non-empty. On `None` the
    /// caller has been appended to the receiver queue and must block.
    pub fn receive(&mut self, thread: &str) -> Option<Value> {
        if let Some(message) = self.messages.pop_front() {
            Some(message)
        } else {
            self.receivers.push_back(thread.to_string());
            None
        }
    }

    /// Returns the buffered messages in delivery order.
    #[must_use]
    pub fn messages(&self) -> &VecDeque<Value> {
        &self.messages
    }

    /// Returns the blocked receiver names in FIFO order.
    #[must_use]
    pub fn receivers(&self) -> &VecDeque<String> {
        &self.receivers
    }
}

/// Named shared integer with single-step atomicity.
#[derive(Clone, Copy, Debug)]
pub struct AtomicCounter {
    value: i64,
}

impl AtomicCounter {
    /// Creates a counter with the given initial value.
    #[must_use]
    pub fn new(value: i64) -> Self {
        AtomicCounter { value }
    }

    /// Increments and returns the new value.
    pub fn increment(&mut self) -> i64 {
        self.value += 1;
        self.value
    }

    /// Decrements and returns the new value.
    pub fn decrement(&mut self) -> i64 {
        self.value -= 1;
        self.value
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value
    }
}

/// Central registry of all synchronization primitives, keyed by name.
///
/// Owned and exclusively mutated by the machine on behalf of whichever
/// thread is currently stepping. Resources never reference each other.
#[derive(Debug, Default)]
pub struct SyncState {
    locks: HashMap<String, LockState>,
    semaphores: HashMap<String, SemaphoreState>,
    mailboxes: HashMap<String, MailboxState>,
    counters: HashMap<String, AtomicCounter>,
}

impl SyncState {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        SyncState::default()
    }

    /// Registers a lock under `name`. Returns `false` if the name is taken.
    pub fn insert_lock(&mut self, name: String) -> bool {
        if self.locks.contains_key(&name) {
            return false;
        }
        self.locks.insert(name, LockState::default());
        true
    }

    /// Registers a semaphore under `name`. Returns `false` if the name is
    /// taken.
    pub fn insert_semaphore(&mut self, name: String, count: i64) -> bool {
        if self.semaphores.contains_key(&name) {
            return false;
        }
        self.semaphores.insert(name, SemaphoreState::new(count));
        true
    }

    /// Registers a mailbox under `name`. Returns `false` if the name is
    /// taken.
    pub fn insert_mailbox(&mut self, name: String) -> bool {
        if self.mailboxes.contains_key(&name) {
            return false;
        }
        self.mailboxes.insert(name, MailboxState::default());
        true
    }

    /// Registers a counter under `name`. Returns `false` if the name is
    /// taken.
    pub fn insert_counter(&mut self, name: String, initial: i64) -> bool {
        if self.counters.contains_key(&name) {
            return false;
        }
        self.counters.insert(name, AtomicCounter::new(initial));
        true
    }

    /// Looks up a lock by name.
    #[must_use]
    pub fn lock(&self, name: &str) -> Option<&LockState> {
        self.locks.get(name)
    }

    /// Looks up a lock by name for mutation.
    pub fn lock_mut(&mut self, name: &str) -> Option<&mut LockState> {
        self.locks.get_mut(name)
    }

    /// Looks up a semaphore by name.
    #[must_use]
    pub fn semaphore(&self, name: &str) -> Option<&SemaphoreState> {
        self.semaphores.get(name)
    }

    /// Looks up a semaphore by name for mutation.
    pub fn semaphore_mut(&mut self, name: &str) -> Option<&mut SemaphoreState> {
        self.semaphores.get_mut(name)
    }

    /// Looks up a mailbox by name.
    #[must_use]
    pub fn mailbox(&self, name: &str) -> Option<&MailboxState> {
        self.mailboxes.get(name)
    }

    /// Looks up a mailbox by name for mutation.
    pub fn mailbox_mut(&mut self, name: &str) -> Option<&mut MailboxState> {
        self.mailboxes.get_mut(name)
    }

    /// Looks up a counter by name.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<&AtomicCounter> {
        self.counters.get(name)
    }

    /// Looks up a counter by name for mutation.
    pub fn counter_mut(&mut self, name: &str) -> Option<&mut AtomicCounter> {
        self.counters.get_mut(name)
    }

    /// Returns the number of registered locks.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Returns the number of registered semaphores.
    #[must_use]
    pub fn semaphore_count(&self) -> usize {
        self.semaphores.len()
    }

    /// Returns the number of registered mailboxes.
    #[must_use]
    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }

    /// Returns the number of registered counters.
    #[must_use]
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Checks whether a thread blocked on a lock could proceed right now.
    ///
    /// True when hand-off already made it the owner, or the lock is free and
    /// the thread is at the head of the waiter queue (FIFO is never jumped).
    #[must_use]
    pub fn lock_waiter_can_proceed(&self, name: &str, thread: &str) -> bool {
        self.locks.get(name).is_some_and(|lock| {
            lock.owner() == Some(thread)
                || (!lock.is_locked() && Self::head_or_absent(&lock.waiters, thread))
        })
    }

    /// Checks whether a thread blocked on a semaphore could proceed.
    #[must_use]
    pub fn semaphore_waiter_can_proceed(&self, name: &str, thread: &str) -> bool {
        self.semaphores
            .get(name)
            .is_some_and(|sem| sem.count() > 0 && Self::head_or_absent(&sem.waiters, thread))
    }

    /// Checks whether a thread blocked on a mailbox receive could proceed.
    #[must_use]
    pub fn mailbox_waiter_can_proceed(&self, name: &str, thread: &str) -> bool {
        self.mailboxes.get(name).is_some_and(|mailbox| {
            !mailbox.messages.is_empty() && Self::head_or_absent(&mailbox.receivers, thread)
        })
    }

    /// Re-performs a blocked lock acquisition for the safety-net wake path.
    ///
    /// Unlike the original polling design this consumes the resource rather
    /// than just clearing a flag, so a woken thread always actually holds
    /// what it blocked for.
    pub fn resolve_lock_waiter(&mut self, name: &str, thread: &str) -> Option<Wake> {
        let lock = self.locks.get_mut(name)?;
        if lock.owner() == Some(thread) {
            return Some(Wake::Resume);
        }
        if !lock.is_locked() && Self::head_or_absent(&lock.waiters, thread) {
            lock.waiters.retain(|waiter| waiter != thread);
            lock.locked = true;
            lock.owner = Some(thread.to_string());
            return Some(Wake::Resume);
        }
        None
    }

    /// Re-performs a blocked semaphore acquisition for the safety-net wake
    /// path.
    pub fn resolve_semaphore_waiter(&mut self, name: &str, thread: &str) -> Option<Wake> {
        let sem = self.semaphores.get_mut(name)?;
        if sem.count > 0 && Self::head_or_absent(&sem.waiters, thread) {
            sem.count -= 1;
            sem.waiters.retain(|waiter| waiter != thread);
            return Some(Wake::Resume);
        }
        None
    }

    /// Re-performs a blocked mailbox receive for the safety-net wake path.
    pub fn resolve_mailbox_waiter(&mut self, name: &str, thread: &str) -> Option<Wake> {
        let mailbox = self.mailboxes.get_mut(name)?;
        if !mailbox.messages.is_empty() && Self::head_or_absent(&mailbox.receivers, thread) {
            let message = mailbox.messages.pop_front()?;
            mailbox.receivers.retain(|receiver| receiver != thread);
            return Some(Wake::ResumeWith(message));
        }
        None
    }

    fn head_or_absent(queue: &VecDeque<String>, thread: &str) -> bool {
        match queue.front() {
            Some(head) => head == thread || !queue.iter().any(|waiter| waiter == thread),
            None => true,
        }
    }
}
