//! Machine configuration.
//!
//! Configuration is split between [`MachineConfig`] (policy, pacing, seed,
//! diagnostics) and [`ExecutionLimits`] (the step budget). Both offer
//! `with_*` builder methods; [`MachineConfig::testing`] is the preset for
//! test harnesses — no pacing, no real sleeps, bounded trace.
//!
//! # Default values
//!
//! | Setting | Default |
//! |---------|---------|
//! | `policy` | `round_robin` |
//! | `seed` | `1` |
//! | `step_interval` | 10 ms |
//! | `limits.max_steps` | 50,000 |
//! | `trace` | lifecycle + sync + verdicts |
//! | `trace_capacity` | 4,096 events |
//! | `echo_output` | `false` |
//! | `honor_sleep` | `true` |

use std::time::Duration;

use crate::{
    engine::TraceFlags,
    thread::scheduler::SchedulePolicy,
    Result,
};

/// Bounds on a single run.
///
/// The step budget is the machine's only global safety net: any program,
/// correct or not, halts within `max_steps` cycles, so test harnesses can
/// never hang on a broken program.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionLimits {
    /// Maximum scheduler cycles before the run is forced to halt.
    pub max_steps: u64,
}

impl ExecutionLimits {
    /// Creates limits with the default step budget.
    #[must_use]
    pub fn new() -> Self {
        ExecutionLimits { max_steps: 50_000 }
    }

    /// Sets the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Machine construction parameters.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// Scheduling policy.
    pub policy: SchedulePolicy,

    /// Seed for the random policy. Runs with the same seed replay the same
    /// schedule.
    pub seed: u64,

    /// Pacing delay between scheduler cycles. Zero disables pacing.
    pub step_interval: Duration,

    /// Execution limits (step budget).
    pub limits: ExecutionLimits,

    /// Diagnostic categories to record.
    pub trace: TraceFlags,

    /// Maximum trace events retained in memory.
    pub trace_capacity: usize,

    /// Echo `PRINT` output to stdout as it is produced (it is always
    /// captured on the machine either way).
    pub echo_output: bool,

    /// Honor `SLEEP` instructions with real delays. Test configurations
    /// turn this off so sleeps cost nothing.
    pub honor_sleep: bool,
}

impl MachineConfig {
    /// Creates the default configuration (round-robin, 10 ms pacing).
    #[must_use]
    pub fn new() -> Self {
        MachineConfig {
            policy: SchedulePolicy::RoundRobin,
            seed: 1,
            step_interval: Duration::from_millis(10),
            limits: ExecutionLimits::default(),
            trace: TraceFlags::default(),
            trace_capacity: 4_096,
            echo_output: false,
            honor_sleep: true,
        }
    }

    /// Preset for tests: no pacing, sleeps are free, default trace.
    #[must_use]
    pub fn testing() -> Self {
        MachineConfig {
            step_interval: Duration::ZERO,
            honor_sleep: false,
            ..MachineConfig::new()
        }
    }

    /// Sets the scheduling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the scheduling policy from its configuration name.
    ///
    /// # Errors
    ///
    /// [`crate::Error::UnknownPolicy`] when the name is not one of
    /// `round_robin`, `priority` or `random`.
    pub fn with_policy_name(mut self, name: &str) -> Result<Self> {
        self.policy = SchedulePolicy::parse(name)?;
        Ok(self)
    }

    /// Sets the random-policy seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the pacing delay between cycles.
    #[must_use]
    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }

    /// Sets the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    /// Sets the recorded diagnostic categories.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceFlags) -> Self {
        self.trace = trace;
        self
    }

    /// Enables per-step debug diagnostics (all categories).
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.trace = TraceFlags::all();
        self
    }

    /// Sets whether output lines echo to stdout.
    #[must_use]
    pub fn with_echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::new()
    }
}
