// Copyright 2025 Mara Holt
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # weftvm
//!
//! A deterministic cooperative-multithreading virtual machine: a stack-based
//! bytecode interpreter whose "threads" are interleaved one instruction at a
//! time by a pluggable scheduler, coordinated through locks, counting
//! semaphores, FIFO mailboxes and atomic counters.
//!
//! Concurrency here means *interleaving*, not simultaneity: at most one
//! thread executes one instruction per machine cycle, so every resource
//! transition is serialized by construction and every run is replayable —
//! including "random" schedules, which are driven by a seed. That makes the
//! machine a workbench for the classic coordination problems (bounded
//! buffers, rendezvous, crossed-lock deadlocks) with none of the flakiness
//! of real threads.
//!
//! ## Features
//!
//! - **Cooperative scheduling** — `round_robin`, `priority` (with
//!   least-recently-run tie-breaking) and seeded `random` policies
//! - **Synchronization primitives** — FIFO locks with ownership hand-off,
//!   counting semaphores, mailboxes with direct delivery to blocked
//!   receivers, atomic counters
//! - **Deadlock detection** — a run ends in [`RunOutcome::Deadlock`] when
//!   every live thread is blocked and no blocked reason can be satisfied
//! - **Bounded execution** — a step budget guarantees every run halts, so
//!   broken programs cannot hang a test harness
//! - **Fault containment** — stack underflows, division by zero and unknown
//!   resource references terminate the offending thread only
//!
//! ## Example
//!
//! A sender hands a message to a blocked receiver through a mailbox:
//!
//! ```rust
//! use weftvm::{Machine, MachineConfig, Program, RunOutcome, Value};
//! use weftvm::program::Instruction;
//!
//! let mut vm = Machine::new(MachineConfig::testing());
//! vm.create_mailbox(Some("box"))?;
//! vm.set_global("box", Value::from("box"));
//!
//! let receiver = vm.define_program(Program::new(vec![
//!     Instruction::Load("box".into()),
//!     Instruction::QueueReceive,
//!     Instruction::GlobalStore("got".into()),
//! ]));
//! let sender = vm.define_program(Program::new(vec![
//!     Instruction::Load("box".into()),
//!     Instruction::Push(Value::Int(7)),
//!     Instruction::QueueSend,
//! ]));
//! vm.spawn(receiver, Some("rx"), 0)?;
//! vm.spawn(sender, Some("tx"), 0)?;
//!
//! let report = vm.run();
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(vm.global("got"), Some(&Value::Int(7)));
//! # Ok::<(), weftvm::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`program`] — the closed instruction set and immutable programs
//! - [`engine`] — single-instruction dispatch, fault taxonomy, tracing
//! - [`thread`] — per-thread state, scheduling policies, sync primitives
//! - [`machine`] — the registries and the step loop that tie it together
//!
//! The machine owns all shared state and is its sole mutator; there are no
//! process-wide tables, so independent machines can run side by side (e.g.
//! one per test).

pub mod engine;
pub mod machine;
pub mod prelude;
pub mod program;
pub mod thread;

mod error;
mod rng;
mod value;

pub use error::{Error, Result};
pub use machine::{ExecutionLimits, Machine, MachineConfig, RunOutcome, RunReport, ThreadReport};
pub use program::{Instruction, Opcode, Program};
pub use thread::SchedulePolicy;
pub use value::Value;
