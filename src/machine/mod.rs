//! The virtual machine: thread registry, resource tables and the step loop.
//!
//! A [`Machine`] owns everything a run touches — threads, locks, semaphores,
//! mailboxes, counters, global bindings, the spawn table and the scheduler —
//! and is the sole mutator of all of it. Each cycle it computes the runnable
//! set, checks for deadlock, asks the scheduling policy for one thread,
//! executes exactly one of that thread's instructions and applies the
//! resulting state transition. Nothing here is process-global: machines are
//! plain values and any number can coexist.
//!
//! # Waking blocked threads
//!
//! The canonical wake path is the explicit hand-off performed while applying
//! a release, a send or a thread termination: the resource names exactly the
//! thread to wake and the machine marks it runnable on the spot. As a safety
//! net, when a cycle finds nothing runnable the machine re-polls every
//! blocked thread's [`BlockedOn`] reason and re-performs the blocked
//! acquisition where it now succeeds. Deadlock is declared only when that
//! pass wakes nobody and live threads remain.
//!
//! # Fault containment
//!
//! Execution faults ([`ExecError`]) are caught at the single-step boundary:
//! the offending thread is reported and terminated, its joiners are woken,
//! and — deliberately — nothing it holds is released. Other threads and the
//! machine itself keep running.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    engine::{
        interpreter, trace::WakeSource, ExecError, StepResult, TraceEvent, TraceFlags, TraceLog,
    },
    error::Error,
    program::{Opcode, Program},
    thread::{
        scheduler::{Candidate, Scheduler},
        state::BlockedOn,
        sync::{SyncState, Wake},
        VmThread,
    },
    value::Value,
    Result,
};

pub use config::{ExecutionLimits, MachineConfig};

/// Terminal state of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every thread reached a terminal state.
    Completed,

    /// Every live thread was blocked and none of their wait reasons could
    /// be satisfied.
    Deadlock {
        /// Names of the stuck threads, in spawn order.
        waiting: Vec<String>,
    },

    /// The step budget ran out before a terminal state was reached.
    StepBudgetExceeded,
}

/// Result of [`Machine::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,

    /// Total scheduler cycles executed.
    pub steps: u64,
}

/// Final-state snapshot of one thread.
#[derive(Clone, Debug)]
pub struct ThreadReport {
    /// Thread name.
    pub name: String,

    /// State label: `runnable`, `waiting`, `terminated` or `faulted`.
    pub state: &'static str,

    /// The blocked reason, when the thread is waiting.
    pub blocked_on: Option<BlockedOn>,

    /// Whether the blocked reason is currently satisfiable, when waiting.
    pub wait_satisfiable: Option<bool>,

    /// Program counter.
    pub pc: usize,

    /// Scheduling priority.
    pub priority: i32,

    /// Instructions executed by this thread.
    pub steps_executed: u64,
}

/// The cooperative virtual machine.
pub struct Machine {
    config: MachineConfig,
    scheduler: Scheduler,
    sync: SyncState,
    globals: HashMap<String, Value>,
    programs: Vec<Arc<Program>>,
    threads: HashMap<String, VmThread>,
    spawn_order: Vec<String>,
    trace: TraceLog,
    output: Vec<String>,
    tick: u64,
    next_thread_id: usize,
}

impl Machine {
    /// Creates a machine with the given configuration.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        let scheduler = Scheduler::new(config.policy, config.seed);
        let trace = TraceLog::new(config.trace, config.trace_capacity);
        Machine {
            config,
            scheduler,
            sync: SyncState::new(),
            globals: HashMap::new(),
            programs: Vec::new(),
            threads: HashMap::new(),
            spawn_order: Vec::new(),
            trace,
            output: Vec::new(),
            tick: 0,
            next_thread_id: 0,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Adds a program to the spawn table and returns its index.
    ///
    /// `THREAD_CREATE` spawns by this index; the host spawns with
    /// [`Machine::spawn`].
    pub fn define_program(&mut self, program: Program) -> usize {
        self.programs.push(Arc::new(program));
        self.programs.len() - 1
    }

    /// Returns the number of programs in the spawn table.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Spawns a thread running the given spawn-table program.
    ///
    /// Without an explicit name the thread is named `thread-N`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProgram`] for an out-of-range id and
    /// [`Error::DuplicateThread`] when the name is taken.
    pub fn spawn(&mut self, program: usize, name: Option<&str>, priority: i32) -> Result<String> {
        self.spawn_at(program, name, priority, 0)
    }

    /// Spawns a thread starting at an arbitrary instruction offset.
    ///
    /// Offsets at or past the end of the program produce a thread that
    /// terminates on its first scheduling turn.
    ///
    /// # Errors
    ///
    /// Same as [`Machine::spawn`].
    pub fn spawn_at(
        &mut self,
        program: usize,
        name: Option<&str>,
        priority: i32,
        start_pc: usize,
    ) -> Result<String> {
        let Some(program) = self.programs.get(program).cloned() else {
            return Err(Error::UnknownProgram { id: program });
        };

        let name = match name {
            Some(name) => {
                if self.threads.contains_key(name) {
                    return Err(Error::DuplicateThread {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.fresh_thread_name(),
        };

        self.register_thread(VmThread::new(name.clone(), program, start_pc, priority));
        Ok(name)
    }

    /// Creates a lock, auto-named `lock-N` unless a name is given.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateResource`] when the explicit name is taken.
    pub fn create_lock(&mut self, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => {
                if self.sync.lock(name).is_some() {
                    return Err(Error::DuplicateResource {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.fresh_lock_name(),
        };
        self.sync.insert_lock(name.clone());
        Ok(name)
    }

    /// Creates a semaphore with `count` initial permits, auto-named
    /// `semaphore-N` unless a name is given.
    ///
    /// # Errors
    ///
    /// [`Error::NegativePermits`] for a negative count and
    /// [`Error::DuplicateResource`] when the explicit name is taken.
    pub fn create_semaphore(&mut self, count: i64, name: Option<&str>) -> Result<String> {
        if count < 0 {
            return Err(Error::NegativePermits { count });
        }
        let name = match name {
            Some(name) => {
                if self.sync.semaphore(name).is_some() {
                    return Err(Error::DuplicateResource {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.fresh_semaphore_name(),
        };
        self.sync.insert_semaphore(name.clone(), count);
        Ok(name)
    }

    /// Creates a mailbox, auto-named `queue-N` unless a name is given.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateResource`] when the explicit name is taken.
    pub fn create_mailbox(&mut self, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => {
                if self.sync.mailbox(name).is_some() {
                    return Err(Error::DuplicateResource {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.fresh_mailbox_name(),
        };
        self.sync.insert_mailbox(name.clone());
        Ok(name)
    }

    /// Creates an atomic counter, auto-named `counter-N` unless a name is
    /// given.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateResource`] when the explicit name is taken.
    pub fn create_counter(&mut self, initial: i64, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => {
                if self.sync.counter(name).is_some() {
                    return Err(Error::DuplicateResource {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.fresh_counter_name(),
        };
        self.sync.insert_counter(name.clone(), initial);
        Ok(name)
    }

    /// Sets a global binding.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Returns a global binding.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Returns the current value of a counter.
    #[must_use]
    pub fn counter_value(&self, name: &str) -> Option<i64> {
        self.sync.counter(name).map(|counter| counter.get())
    }

    /// Returns the resource registry for inspection.
    #[must_use]
    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    /// Returns a thread by name.
    #[must_use]
    pub fn thread(&self, name: &str) -> Option<&VmThread> {
        self.threads.get(name)
    }

    /// Returns the captured output lines in emission order.
    #[must_use]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Returns the diagnostic trace.
    #[must_use]
    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// Runs the step loop until a terminal state or the step budget.
    ///
    /// Per cycle: compute the runnable set (re-polling blocked reasons only
    /// when it is empty), detect completion or deadlock, let the policy pick
    /// one thread, execute one instruction, pace. The returned report names
    /// the terminal state and the number of cycles executed.
    pub fn run(&mut self) -> RunReport {
        let max_steps = self.config.limits.max_steps;
        let mut steps: u64 = 0;

        let outcome = loop {
            let mut runnable = self.runnable_names();
            if runnable.is_empty() {
                runnable = self.opportunistic_wake();
            }

            if runnable.is_empty() {
                let waiting = self.live_thread_names();
                if waiting.is_empty() {
                    break RunOutcome::Completed;
                }
                self.trace.record(TraceEvent::DeadlockDetected {
                    waiting: waiting.clone(),
                });
                break RunOutcome::Deadlock { waiting };
            }

            if steps >= max_steps {
                self.trace.record(TraceEvent::BudgetExhausted { steps });
                break RunOutcome::StepBudgetExceeded;
            }

            let chosen = self.select_thread(&runnable);
            steps += 1;
            self.tick += 1;
            self.step_thread(&chosen, steps);

            if !self.config.step_interval.is_zero() {
                std::thread::sleep(self.config.step_interval);
            }
        };

        RunReport { outcome, steps }
    }

    /// Returns a final-state snapshot for one thread.
    #[must_use]
    pub fn thread_report(&self, name: &str) -> Option<ThreadReport> {
        let thread = self.threads.get(name)?;
        let blocked_on = thread.state().blocked_on().cloned();
        let wait_satisfiable = blocked_on
            .as_ref()
            .map(|reason| self.blocked_can_proceed(name, reason));

        Some(ThreadReport {
            name: thread.name().to_string(),
            state: thread.state().label(),
            blocked_on,
            wait_satisfiable,
            pc: thread.pc(),
            priority: thread.priority(),
            steps_executed: thread.steps_executed(),
        })
    }

    /// Returns final-state snapshots for all threads, in spawn order.
    #[must_use]
    pub fn thread_reports(&self) -> Vec<ThreadReport> {
        self.spawn_order
            .iter()
            .filter_map(|name| self.thread_report(name))
            .collect()
    }

    fn register_thread(&mut self, thread: VmThread) {
        let name = thread.name().to_string();
        self.trace.record(TraceEvent::ThreadSpawned {
            name: name.clone(),
            priority: thread.priority(),
        });
        self.scheduler.register(name.clone());
        self.spawn_order.push(name.clone());
        self.threads.insert(name, thread);
    }

    fn fresh_thread_name(&mut self) -> String {
        loop {
            let candidate = format!("thread-{}", self.next_thread_id);
            self.next_thread_id += 1;
            if !self.threads.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn fresh_lock_name(&self) -> String {
        let mut index = self.sync.lock_count();
        loop {
            let candidate = format!("lock-{index}");
            if self.sync.lock(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }

    fn fresh_semaphore_name(&self) -> String {
        let mut index = self.sync.semaphore_count();
        loop {
            let candidate = format!("semaphore-{index}");
            if self.sync.semaphore(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }

    fn fresh_mailbox_name(&self) -> String {
        let mut index = self.sync.mailbox_count();
        loop {
            let candidate = format!("queue-{index}");
            if self.sync.mailbox(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }

    fn fresh_counter_name(&self) -> String {
        let mut index = self.sync.counter_count();
        loop {
            let candidate = format!("counter-{index}");
            if self.sync.counter(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }

    /// Runnable thread names in rotation order.
    fn runnable_names(&self) -> Vec<String> {
        self.scheduler
            .rotation()
            .filter(|name| {
                self.threads
                    .get(*name)
                    .is_some_and(VmThread::is_runnable)
            })
            .map(str::to_string)
            .collect()
    }

    /// Live (runnable or blocked) thread names in spawn order.
    fn live_thread_names(&self) -> Vec<String> {
        self.spawn_order
            .iter()
            .filter(|name| self.threads.get(*name).is_some_and(VmThread::is_live))
            .cloned()
            .collect()
    }

    /// Safety-net wake pass: re-performs each blocked thread's acquisition
    /// where it now succeeds. Returns the threads it woke, in rotation
    /// order.
    fn opportunistic_wake(&mut self) -> Vec<String> {
        let blocked: Vec<(String, BlockedOn)> = self
            .scheduler
            .rotation()
            .filter_map(|name| {
                let reason = self.threads.get(name)?.state().blocked_on()?.clone();
                Some((name.to_string(), reason))
            })
            .collect();

        let mut woken = Vec::new();
        for (name, reason) in blocked {
            let wake = match &reason {
                BlockedOn::Lock(lock) => self.sync.resolve_lock_waiter(lock, &name),
                BlockedOn::Semaphore(sem) => self.sync.resolve_semaphore_waiter(sem, &name),
                BlockedOn::Mailbox(mailbox) => self.sync.resolve_mailbox_waiter(mailbox, &name),
                BlockedOn::Join(target) => {
                    let finished = self.threads.get(target).is_none_or(|t| !t.is_live());
                    finished.then_some(Wake::Resume)
                }
            };

            if let Some(wake) = wake {
                let delivery = match wake {
                    Wake::Resume => None,
                    Wake::ResumeWith(value) => Some(value),
                };
                self.wake_thread(&name, WakeSource::Poll, delivery);
                woken.push(name);
            }
        }
        woken
    }

    /// Whether a blocked reason is currently satisfiable, without consuming
    /// anything. Used for reports.
    fn blocked_can_proceed(&self, thread: &str, reason: &BlockedOn) -> bool {
        match reason {
            BlockedOn::Lock(lock) => self.sync.lock_waiter_can_proceed(lock, thread),
            BlockedOn::Semaphore(sem) => self.sync.semaphore_waiter_can_proceed(sem, thread),
            BlockedOn::Mailbox(mailbox) => self.sync.mailbox_waiter_can_proceed(mailbox, thread),
            BlockedOn::Join(target) => self.threads.get(target).is_none_or(|t| !t.is_live()),
        }
    }

    fn select_thread(&mut self, runnable: &[String]) -> String {
        let candidates: Vec<Candidate<'_>> = runnable
            .iter()
            .filter_map(|name| {
                let thread = self.threads.get(name)?;
                Some(Candidate {
                    name: name.as_str(),
                    priority: thread.priority(),
                    last_scheduled: thread.last_scheduled(),
                })
            })
            .collect();

        // The runnable set is non-empty, so selection cannot fail.
        self.scheduler
            .select(&candidates)
            .unwrap_or_else(|| runnable[0].clone())
    }

    /// Executes one instruction on the named thread.
    fn step_thread(&mut self, name: &str, step: u64) {
        let Some(thread) = self.threads.get_mut(name) else {
            return;
        };

        if thread.at_end() {
            self.complete_thread(name);
            return;
        }

        let Some(instruction) = thread.current_instruction().cloned() else {
            return;
        };
        let opcode = instruction.opcode();
        let pc = thread.pc();
        let tick = self.tick;
        thread.mark_scheduled(tick);

        if self.trace.enabled(TraceFlags::STEPS) {
            let snapshot = &self.threads[name];
            let stack = format!(
                "[{}]",
                snapshot
                    .stack()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut bindings: Vec<String> = snapshot
                .variables()
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            bindings.sort();
            let variables = format!("{{{}}}", bindings.join(", "));
            self.trace.record(TraceEvent::Step {
                step,
                thread: name.to_string(),
                pc,
                instruction: instruction.to_string(),
                stack,
                variables,
            });
        }

        let result = match self.threads.get_mut(name) {
            Some(thread) => interpreter::execute(thread, &mut self.globals, &instruction),
            None => return,
        };

        match result {
            Ok(step_result) => self.apply_result(name, opcode, step_result),
            Err(error) => self.fault_thread(name, opcode, &error),
        }
    }

    /// Applies the machine-level effect of one executed instruction.
    #[allow(clippy::too_many_lines)]
    fn apply_result(&mut self, name: &str, opcode: Opcode, result: StepResult) {
        match result {
            StepResult::Continue => self.advance(name),

            StepResult::Jump { target } => {
                if let Some(thread) = self.threads.get_mut(name) {
                    thread.set_pc(target);
                }
            }

            StepResult::Output { line } => {
                self.advance(name);
                if self.config.echo_output {
                    println!("{line}");
                }
                self.output.push(line);
            }

            StepResult::Sleep { millis } => {
                self.advance(name);
                if self.config.honor_sleep && millis > 0 {
                    std::thread::sleep(std::time::Duration::from_millis(millis));
                }
            }

            StepResult::Spawn { index } => {
                let count = self.programs.len();
                let in_range = usize::try_from(index).map_or(false, |index| index < count);
                if !in_range {
                    self.fault_thread(
                        name,
                        opcode,
                        &ExecError::SpawnIndexOutOfRange { index, count },
                    );
                    return;
                }
                #[allow(clippy::cast_sign_loss)]
                let program = self.programs[index as usize].clone();
                let priority = self
                    .threads
                    .get(name)
                    .map_or(0, |thread| thread.priority() + 1);
                let child = self.fresh_thread_name();
                self.register_thread(VmThread::new(child.clone(), program, 0, priority));

                if let Some(thread) = self.threads.get_mut(name) {
                    thread.push(Value::Str(child));
                    thread.advance_pc();
                }
            }

            StepResult::Join { thread: target } => {
                let target_live = self.threads.get(&target).map(VmThread::is_live);
                match target_live {
                    None => {
                        self.fault_thread(name, opcode, &ExecError::UnknownThread { name: target });
                    }
                    Some(false) => self.advance(name),
                    Some(true) => {
                        if let Some(thread) = self.threads.get_mut(&target) {
                            thread.add_joiner(name);
                        }
                        self.advance(name);
                        self.block(name, BlockedOn::Join(target));
                    }
                }
            }

            StepResult::CreateLock => {
                let lock = self.fresh_lock_name();
                self.sync.insert_lock(lock.clone());
                self.push_and_advance(name, Value::Str(lock));
            }

            StepResult::AcquireLock { name: lock } => {
                let Some(state) = self.sync.lock_mut(&lock) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownLock { name: lock });
                    return;
                };
                let acquired = state.acquire(name);
                self.advance(name);
                if !acquired {
                    self.block(name, BlockedOn::Lock(lock));
                }
            }

            StepResult::ReleaseLock { name: lock } => {
                let Some(state) = self.sync.lock_mut(&lock) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownLock { name: lock });
                    return;
                };
                match state.release(name) {
                    Ok(Some(next)) => {
                        self.advance(name);
                        self.wake_thread(&next, WakeSource::Handoff, None);
                    }
                    Ok(None) => self.advance(name),
                    Err(error) => {
                        self.advance(name);
                        self.trace.record(TraceEvent::SyncViolation {
                            thread: name.to_string(),
                            resource: lock,
                            error: error.to_string(),
                        });
                    }
                }
            }

            StepResult::CreateSemaphore { count } => {
                if count < 0 {
                    self.fault_thread(
                        name,
                        opcode,
                        &ExecError::NegativeSemaphoreCount { count },
                    );
                    return;
                }
                let sem = self.fresh_semaphore_name();
                self.sync.insert_semaphore(sem.clone(), count);
                self.push_and_advance(name, Value::Str(sem));
            }

            StepResult::AcquireSemaphore { name: sem } => {
                let Some(state) = self.sync.semaphore_mut(&sem) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownSemaphore { name: sem });
                    return;
                };
                let acquired = state.acquire(name);
                self.advance(name);
                if !acquired {
                    self.block(name, BlockedOn::Semaphore(sem));
                }
            }

            StepResult::ReleaseSemaphore { name: sem } => {
                let Some(state) = self.sync.semaphore_mut(&sem) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownSemaphore { name: sem });
                    return;
                };
                let woken = state.release();
                self.advance(name);
                if let Some(next) = woken {
                    self.wake_thread(&next, WakeSource::Handoff, None);
                }
            }

            StepResult::CreateMailbox => {
                let mailbox = self.fresh_mailbox_name();
                self.sync.insert_mailbox(mailbox.clone());
                self.push_and_advance(name, Value::Str(mailbox));
            }

            StepResult::Send {
                name: mailbox,
                message,
            } => {
                let Some(state) = self.sync.mailbox_mut(&mailbox) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownMailbox { name: mailbox });
                    return;
                };
                let delivery = state.send(message);
                self.advance(name);
                if let Some((receiver, message)) = delivery {
                    self.wake_thread(&receiver, WakeSource::Handoff, Some(message));
                }
            }

            StepResult::Receive { name: mailbox } => {
                let Some(state) = self.sync.mailbox_mut(&mailbox) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownMailbox { name: mailbox });
                    return;
                };
                match state.receive(name) {
                    Some(message) => self.push_and_advance(name, message),
                    None => {
                        self.advance(name);
                        self.block(name, BlockedOn::Mailbox(mailbox));
                    }
                }
            }

            StepResult::CreateCounter { initial } => {
                let counter = self.fresh_counter_name();
                self.sync.insert_counter(counter.clone(), initial);
                self.push_and_advance(name, Value::Str(counter));
            }

            StepResult::CounterIncrement { name: counter } => {
                let Some(state) = self.sync.counter_mut(&counter) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownCounter { name: counter });
                    return;
                };
                let value = state.increment();
                self.push_and_advance(name, Value::Int(value));
            }

            StepResult::CounterDecrement { name: counter } => {
                let Some(state) = self.sync.counter_mut(&counter) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownCounter { name: counter });
                    return;
                };
                let value = state.decrement();
                self.push_and_advance(name, Value::Int(value));
            }

            StepResult::CounterGet { name: counter } => {
                let Some(state) = self.sync.counter(&counter) else {
                    self.fault_thread(name, opcode, &ExecError::UnknownCounter { name: counter });
                    return;
                };
                let value = state.get();
                self.push_and_advance(name, Value::Int(value));
            }
        }
    }

    fn advance(&mut self, name: &str) {
        if let Some(thread) = self.threads.get_mut(name) {
            thread.advance_pc();
        }
    }

    fn push_and_advance(&mut self, name: &str, value: Value) {
        if let Some(thread) = self.threads.get_mut(name) {
            thread.push(value);
            thread.advance_pc();
        }
    }

    fn block(&mut self, name: &str, reason: BlockedOn) {
        if let Some(thread) = self.threads.get_mut(name) {
            thread.block(reason.clone());
        }
        self.trace.record(TraceEvent::ThreadBlocked {
            thread: name.to_string(),
            reason,
        });
    }

    /// Wakes a blocked thread, optionally delivering a value to its stack.
    fn wake_thread(&mut self, name: &str, source: WakeSource, delivery: Option<Value>) {
        let Some(thread) = self.threads.get_mut(name) else {
            return;
        };
        if thread.state().blocked_on().is_none() {
            return;
        }
        if let Some(value) = delivery {
            thread.push(value);
        }
        thread.wake();
        self.trace.record(TraceEvent::ThreadWoken {
            thread: name.to_string(),
            source,
        });
    }

    /// Marks a thread completed and wakes everything joined on it.
    fn complete_thread(&mut self, name: &str) {
        let joiners = match self.threads.get_mut(name) {
            Some(thread) => {
                thread.complete();
                thread.take_joiners()
            }
            None => return,
        };
        self.scheduler.deregister(name);
        self.trace.record(TraceEvent::ThreadCompleted {
            name: name.to_string(),
        });
        for joiner in joiners {
            self.wake_thread(&joiner, WakeSource::Handoff, None);
        }
    }

    /// Terminates a thread on an execution fault.
    ///
    /// Resources the thread holds are left as they are: a lock owned by a
    /// dead thread stays owned, which the deadlock detector will surface.
    fn fault_thread(&mut self, name: &str, opcode: Opcode, error: &ExecError) {
        log::warn!("thread {name} faulted executing {opcode}: {error}");
        let joiners = match self.threads.get_mut(name) {
            Some(thread) => {
                thread.fault();
                thread.take_joiners()
            }
            None => return,
        };
        self.scheduler.deregister(name);
        self.trace.record(TraceEvent::ThreadFaulted {
            name: name.to_string(),
            error: format!("{opcode}: {error}"),
        });
        for joiner in joiners {
            self.wake_thread(&joiner, WakeSource::Handoff, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Instruction;

    fn machine() -> Machine {
        Machine::new(MachineConfig::testing())
    }

    fn push_str(name: &str) -> Instruction {
        Instruction::Push(Value::from(name))
    }

    #[test]
    fn test_empty_machine_completes_immediately() {
        let mut vm = machine();
        let report = vm.run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps, 0);
    }

    #[test]
    fn test_single_thread_arithmetic() {
        let mut vm = machine();
        let program = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(6)),
            Instruction::Push(Value::Int(7)),
            Instruction::Mul,
            Instruction::GlobalStore("answer".to_string()),
        ]));
        vm.spawn(program, Some("main"), 0).unwrap();

        let report = vm.run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(vm.global("answer"), Some(&Value::Int(42)));
        assert_eq!(vm.thread_report("main").unwrap().state, "terminated");
    }

    #[test]
    fn test_spawn_at_offset_skips_prefix() {
        let mut vm = machine();
        let program = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(1)),
            Instruction::GlobalStore("skipped".to_string()),
            Instruction::Push(Value::Int(2)),
            Instruction::GlobalStore("ran".to_string()),
        ]));
        vm.spawn_at(program, Some("offset"), 0, 2).unwrap();

        assert_eq!(vm.run().outcome, RunOutcome::Completed);
        assert_eq!(vm.global("skipped"), None);
        assert_eq!(vm.global("ran"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_spawn_validation() {
        let mut vm = machine();
        assert!(matches!(
            vm.spawn(0, None, 0),
            Err(Error::UnknownProgram { id: 0 })
        ));

        let program = vm.define_program(Program::new(vec![Instruction::Nop]));
        vm.spawn(program, Some("a"), 0).unwrap();
        assert!(matches!(
            vm.spawn(program, Some("a"), 0),
            Err(Error::DuplicateThread { .. })
        ));
    }

    #[test]
    fn test_resource_creation_names() {
        let mut vm = machine();
        assert_eq!(vm.create_lock(None).unwrap(), "lock-0");
        assert_eq!(vm.create_lock(None).unwrap(), "lock-1");
        assert_eq!(vm.create_lock(Some("buffer_lock")).unwrap(), "buffer_lock");
        assert!(vm.create_lock(Some("buffer_lock")).is_err());

        assert_eq!(vm.create_semaphore(5, None).unwrap(), "semaphore-0");
        assert!(matches!(
            vm.create_semaphore(-1, None),
            Err(Error::NegativePermits { count: -1 })
        ));

        assert_eq!(vm.create_mailbox(None).unwrap(), "queue-0");
        assert_eq!(vm.create_counter(0, Some("consumed")).unwrap(), "consumed");
    }

    #[test]
    fn test_thread_create_opcode_spawns_child() {
        let mut vm = machine();
        let child = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(1)),
            Instruction::GlobalStore("child_ran".to_string()),
        ]));
        let parent = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(child as i64)),
            Instruction::ThreadCreate,
            Instruction::ThreadJoin,
        ]));
        vm.spawn(parent, Some("parent"), 0).unwrap();

        let report = vm.run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(vm.global("child_ran"), Some(&Value::Int(1)));

        // The child inherited the creator's priority plus one.
        let child_report = vm
            .thread_reports()
            .into_iter()
            .find(|r| r.name != "parent")
            .unwrap();
        assert_eq!(child_report.priority, 1);
        assert_eq!(child_report.state, "terminated");
    }

    #[test]
    fn test_join_terminated_thread_is_noop() {
        let mut vm = machine();
        let quick = vm.define_program(Program::new(vec![Instruction::Nop]));
        let joiner = vm.define_program(Program::new(vec![
            push_str("quick"),
            Instruction::ThreadJoin,
        ]));
        vm.spawn(quick, Some("quick"), 5).unwrap();
        vm.spawn(joiner, Some("joiner"), 0).unwrap();

        assert_eq!(vm.run().outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_join_unknown_thread_faults() {
        let mut vm = machine();
        let program = vm.define_program(Program::new(vec![
            push_str("nobody"),
            Instruction::ThreadJoin,
        ]));
        vm.spawn(program, Some("main"), 0).unwrap();

        assert_eq!(vm.run().outcome, RunOutcome::Completed);
        assert_eq!(vm.thread_report("main").unwrap().state, "faulted");
    }

    #[test]
    fn test_fault_is_contained_to_thread() {
        let mut vm = machine();
        let bad = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(1)),
            Instruction::Push(Value::Int(0)),
            Instruction::Div,
        ]));
        let good = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(1)),
            Instruction::GlobalStore("ok".to_string()),
        ]));
        vm.spawn(bad, Some("bad"), 0).unwrap();
        vm.spawn(good, Some("good"), 0).unwrap();

        let report = vm.run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(vm.thread_report("bad").unwrap().state, "faulted");
        assert_eq!(vm.thread_report("good").unwrap().state, "terminated");
        assert_eq!(vm.global("ok"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_unknown_resource_faults_thread() {
        let mut vm = machine();
        let program = vm.define_program(Program::new(vec![
            push_str("ghost"),
            Instruction::LockAcquire,
        ]));
        vm.spawn(program, Some("main"), 0).unwrap();

        vm.run();
        assert_eq!(vm.thread_report("main").unwrap().state, "faulted");
    }

    #[test]
    fn test_unowned_release_is_reported_noop() {
        let mut vm = machine();
        vm.create_lock(Some("l")).unwrap();
        let program = vm.define_program(Program::new(vec![
            push_str("l"),
            Instruction::LockRelease,
            Instruction::Push(Value::Int(1)),
            Instruction::GlobalStore("survived".to_string()),
        ]));
        vm.spawn(program, Some("main"), 0).unwrap();

        assert_eq!(vm.run().outcome, RunOutcome::Completed);
        assert_eq!(vm.global("survived"), Some(&Value::Int(1)));
        assert!(vm
            .trace()
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::SyncViolation { .. })));
    }

    #[test]
    fn test_faulted_holder_orphans_lock() {
        let mut vm = machine();
        vm.create_lock(Some("l")).unwrap();
        let holder = vm.define_program(Program::new(vec![
            push_str("l"),
            Instruction::LockAcquire,
            Instruction::Pop, // stack underflow fault while holding the lock
        ]));
        let contender = vm.define_program(Program::new(vec![
            push_str("l"),
            Instruction::LockAcquire,
        ]));
        vm.spawn(holder, Some("holder"), 0).unwrap();
        vm.spawn(contender, Some("contender"), 0).unwrap();

        let report = vm.run();
        assert!(matches!(report.outcome, RunOutcome::Deadlock { .. }));
        assert_eq!(vm.thread_report("holder").unwrap().state, "faulted");
        assert_eq!(vm.sync().lock("l").unwrap().owner(), Some("holder"));
    }

    #[test]
    fn test_step_budget() {
        let mut vm = Machine::new(MachineConfig::testing().with_max_steps(100));
        let spin = vm.define_program(Program::new(vec![Instruction::Nop, Instruction::Jump(0)]));
        vm.spawn(spin, Some("spinner"), 0).unwrap();

        let report = vm.run();
        assert_eq!(report.outcome, RunOutcome::StepBudgetExceeded);
        assert_eq!(report.steps, 100);
        assert_eq!(vm.thread_report("spinner").unwrap().state, "runnable");
    }

    #[test]
    fn test_output_capture() {
        let mut vm = machine();
        let program = vm.define_program(Program::new(vec![
            Instruction::Push(Value::Int(3)),
            Instruction::Print(Some("made {}".to_string())),
        ]));
        vm.spawn(program, Some("p"), 0).unwrap();
        vm.run();
        assert_eq!(vm.output(), ["[p] made 3"]);
    }

    #[test]
    fn test_report_includes_wait_state() {
        let mut vm = machine();
        vm.create_semaphore(0, Some("s")).unwrap();
        let program = vm.define_program(Program::new(vec![
            push_str("s"),
            Instruction::SemaphoreAcquire,
        ]));
        vm.spawn(program, Some("waiter"), 0).unwrap();

        let report = vm.run();
        assert!(matches!(report.outcome, RunOutcome::Deadlock { .. }));

        let waiter = vm.thread_report("waiter").unwrap();
        assert_eq!(waiter.state, "waiting");
        assert_eq!(
            waiter.blocked_on,
            Some(BlockedOn::Semaphore("s".to_string()))
        );
        assert_eq!(waiter.wait_satisfiable, Some(false));
    }
}
