//! Thread selection policies.
//!
//! The scheduler answers one question per machine cycle: of the currently
//! runnable threads, which one executes its next instruction? Three policies
//! are available, selected by name at machine construction:
//!
//! - `round_robin` — an insertion-ordered rotation. The first runnable
//!   thread from the head of the rotation is picked and rotated to the tail,
//!   so every runnable thread is revisited within a bounded number of turns.
//! - `priority` — the runnable thread with the highest priority wins; ties
//!   go to the least recently run thread (smallest logical tick), which
//!   keeps a tier of equal-priority threads from starving each other.
//! - `random` — uniform over the runnable set, driven by a seeded
//!   [`XorShift64`] so runs remain replayable. Correctly synchronized
//!   programs must produce the same result under any seed, which makes this
//!   policy the stress tester for the other two.
//!
//! The scheduler holds no thread state of its own beyond the rotation; the
//! machine owns the threads and passes a snapshot of the runnable set as
//! [`Candidate`]s each cycle.

use std::collections::VecDeque;
use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{error::Error, rng::XorShift64, Result};

/// Scheduling policy, selectable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SchedulePolicy {
    /// Insertion-ordered rotation over runnable threads.
    #[default]
    RoundRobin,

    /// Highest priority first, least-recently-run among equals.
    Priority,

    /// Seeded uniform choice over the runnable set.
    Random,
}

impl SchedulePolicy {
    /// Parses a policy from its configuration name.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPolicy`] when the name is not one of `round_robin`,
    /// `priority` or `random`.
    pub fn parse(name: &str) -> Result<Self> {
        SchedulePolicy::from_str(name).map_err(|_| Error::UnknownPolicy {
            name: name.to_string(),
        })
    }
}

/// A runnable thread offered to the scheduler for selection.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    /// Thread name.
    pub name: &'a str,
    /// Scheduling priority (higher is preferred).
    pub priority: i32,
    /// Logical tick of the thread's last executed instruction.
    pub last_scheduled: u64,
}

/// Picks the next thread to run according to the active policy.
#[derive(Debug)]
pub struct Scheduler {
    policy: SchedulePolicy,
    rotation: VecDeque<String>,
    rng: XorShift64,
}

impl Scheduler {
    /// Creates a scheduler with the given policy and random seed.
    ///
    /// The seed only matters for [`SchedulePolicy::Random`]; the other
    /// policies are deterministic by construction.
    #[must_use]
    pub fn new(policy: SchedulePolicy, seed: u64) -> Self {
        Scheduler {
            policy,
            rotation: VecDeque::new(),
            rng: XorShift64::new(seed),
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Adds a newly spawned thread to the tail of the rotation.
    pub fn register(&mut self, name: impl Into<String>) {
        self.rotation.push_back(name.into());
    }

    /// Drops a terminated thread from the rotation.
    pub fn deregister(&mut self, name: &str) {
        self.rotation.retain(|entry| entry != name);
    }

    /// Iterates thread names in rotation order.
    ///
    /// The machine uses this to enumerate threads deterministically (the
    /// rotation preserves insertion order, shifted by round-robin turns).
    pub fn rotation(&self) -> impl Iterator<Item = &str> {
        self.rotation.iter().map(String::as_str)
    }

    /// Selects one thread from the runnable set.
    ///
    /// Returns `None` only when `candidates` is empty. Candidates must be
    /// passed in rotation order so that the priority tie-break and the
    /// random draw are reproducible across runs.
    pub fn select(&mut self, candidates: &[Candidate<'_>]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.policy {
            SchedulePolicy::RoundRobin => self.select_round_robin(candidates),
            SchedulePolicy::Priority => Self::select_priority(candidates),
            SchedulePolicy::Random => {
                let index = self.rng.next_usize(candidates.len());
                candidates[index].name.to_string()
            }
        };

        log::trace!("scheduler[{}] selected {chosen}", self.policy);
        Some(chosen)
    }

    /// Head-of-rotation scan; the chosen thread rotates to the tail.
    fn select_round_robin(&mut self, candidates: &[Candidate<'_>]) -> String {
        let position = self
            .rotation
            .iter()
            .position(|name| candidates.iter().any(|c| c.name == name));

        match position {
            Some(index) => {
                let chosen = self.rotation.remove(index).unwrap_or_default();
                self.rotation.push_back(chosen.clone());
                chosen
            }
            // A runnable thread that never registered; take the oldest.
            None => candidates[0].name.to_string(),
        }
    }

    /// Highest priority, least recently run among equals; the first of a
    /// full tie wins, keeping selection deterministic.
    fn select_priority(candidates: &[Candidate<'_>]) -> String {
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.priority > best.priority
                || (candidate.priority == best.priority
                    && candidate.last_scheduled < best.last_scheduled)
            {
                best = *candidate;
            }
        }
        best.name.to_string()
    }
}
