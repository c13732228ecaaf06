//! Single-instruction execution.
//!
//! [`execute`] dispatches exactly one instruction against the executing
//! thread's stack and variables (plus the machine's global bindings) and
//! reports everything else as a [`StepResult`] for the machine to apply.
//! Dispatch is exhaustive over the closed [`Instruction`] sum type — there
//! is no unknown-opcode path here; unrecognized mnemonics are rejected when
//! a program is assembled.
//!
//! Every error this module returns is scoped to the offending thread: the
//! machine catches it at the step boundary, reports it, and terminates that
//! thread without touching the others.

use std::collections::HashMap;

use thiserror::Error;

use crate::{
    engine::result::StepResult,
    program::{Instruction, Opcode},
    thread::VmThread,
    value::Value,
};

/// Faults raised while executing a thread's instruction.
///
/// Each of these terminates the offending thread only. Resources the thread
/// holds at that point are deliberately left untouched — a thread that dies
/// owning a lock orphans it, and programs that need stronger guarantees must
/// release defensively.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExecError {
    /// A stack operation found too few operands.
    #[error("stack underflow on {opcode}")]
    StackUnderflow {
        /// The instruction that underflowed.
        opcode: Opcode,
    },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An operand had the wrong type for the instruction.
    #[error("type mismatch in {opcode}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The instruction being executed.
        opcode: Opcode,
        /// What the instruction needed.
        expected: &'static str,
        /// What was actually on the stack.
        found: &'static str,
    },

    /// `LOAD` named a variable bound neither in the thread nor globally.
    #[error("variable {name} not found")]
    UndefinedVariable {
        /// The unbound variable name.
        name: String,
    },

    /// A lock opcode named a lock that was never created.
    #[error("lock {name} not found")]
    UnknownLock {
        /// The unknown lock name.
        name: String,
    },

    /// A semaphore opcode named a semaphore that was never created.
    #[error("semaphore {name} not found")]
    UnknownSemaphore {
        /// The unknown semaphore name.
        name: String,
    },

    /// A mailbox opcode named a mailbox that was never created.
    #[error("mailbox {name} not found")]
    UnknownMailbox {
        /// The unknown mailbox name.
        name: String,
    },

    /// A counter opcode named a counter that was never created.
    #[error("counter {name} not found")]
    UnknownCounter {
        /// The unknown counter name.
        name: String,
    },

    /// `THREAD_JOIN` named a thread that was never created.
    #[error("thread {name} not found")]
    UnknownThread {
        /// The unknown thread name.
        name: String,
    },

    /// `SEMAPHORE_CREATE` was given a negative permit count.
    #[error("semaphore created with negative count {count}")]
    NegativeSemaphoreCount {
        /// The rejected count.
        count: i64,
    },

    /// `THREAD_CREATE` popped an index outside the spawn table.
    #[error("spawn index {index} out of range ({count} programs defined)")]
    SpawnIndexOutOfRange {
        /// The rejected index.
        index: i64,
        /// Number of programs in the spawn table.
        count: usize,
    },
}

/// Executes one instruction.
///
/// Stack and thread-private variable effects are applied directly; shared
/// state transitions come back as a [`StepResult`]. The caller advances the
/// program counter for every result except [`StepResult::Jump`].
///
/// # Errors
///
/// Any [`ExecError`]; the caller terminates the thread.
pub fn execute(
    thread: &mut VmThread,
    globals: &mut HashMap<String, Value>,
    instruction: &Instruction,
) -> Result<StepResult, ExecError> {
    match instruction {
        // ================================================================
        // Stack operations
        // ================================================================
        Instruction::Push(value) => {
            thread.push(value.clone());
            Ok(StepResult::Continue)
        }
        Instruction::Pop => {
            pop(thread, Opcode::Pop)?;
            Ok(StepResult::Continue)
        }
        Instruction::Dup => {
            let top = thread
                .peek()
                .cloned()
                .ok_or(ExecError::StackUnderflow { opcode: Opcode::Dup })?;
            thread.push(top);
            Ok(StepResult::Continue)
        }

        // ================================================================
        // Arithmetic
        // ================================================================
        Instruction::Add => binary_int(thread, Opcode::Add, |a, b| Ok(a.wrapping_add(b))),
        Instruction::Sub => binary_int(thread, Opcode::Sub, |a, b| Ok(a.wrapping_sub(b))),
        Instruction::Mul => binary_int(thread, Opcode::Mul, |a, b| Ok(a.wrapping_mul(b))),
        Instruction::Div => binary_int(thread, Opcode::Div, |a, b| {
            a.checked_div(b).ok_or(ExecError::DivisionByZero)
        }),
        Instruction::Mod => binary_int(thread, Opcode::Mod, |a, b| {
            a.checked_rem(b).ok_or(ExecError::DivisionByZero)
        }),

        // ================================================================
        // Variables
        // ================================================================
        Instruction::Load(name) => {
            let value = thread
                .variable(name)
                .or_else(|| globals.get(name))
                .cloned()
                .ok_or_else(|| ExecError::UndefinedVariable { name: name.clone() })?;
            thread.push(value);
            Ok(StepResult::Continue)
        }
        Instruction::Store(name) => {
            let value = pop(thread, Opcode::Store)?;
            thread.set_variable(name.clone(), value);
            Ok(StepResult::Continue)
        }
        Instruction::GlobalStore(name) => {
            let value = pop(thread, Opcode::GlobalStore)?;
            globals.insert(name.clone(), value);
            Ok(StepResult::Continue)
        }

        // ================================================================
        // Control flow
        // ================================================================
        Instruction::Jump(target) => Ok(StepResult::Jump { target: *target }),
        Instruction::JumpIf(target) => {
            let condition = pop_int(thread, Opcode::JumpIf)?;
            if condition >= 0 {
                Ok(StepResult::Jump { target: *target })
            } else {
                Ok(StepResult::Continue)
            }
        }

        // ================================================================
        // Threading
        // ================================================================
        Instruction::ThreadCreate => {
            let index = pop_int(thread, Opcode::ThreadCreate)?;
            Ok(StepResult::Spawn { index })
        }
        Instruction::ThreadJoin => {
            let name = pop_str(thread, Opcode::ThreadJoin)?;
            Ok(StepResult::Join { thread: name })
        }

        // ================================================================
        // Locks
        // ================================================================
        Instruction::LockCreate => Ok(StepResult::CreateLock),
        Instruction::LockAcquire => {
            let name = pop_str(thread, Opcode::LockAcquire)?;
            Ok(StepResult::AcquireLock { name })
        }
        Instruction::LockRelease => {
            let name = pop_str(thread, Opcode::LockRelease)?;
            Ok(StepResult::ReleaseLock { name })
        }

        // ================================================================
        // Semaphores
        // ================================================================
        Instruction::SemaphoreCreate => {
            let count = pop_int(thread, Opcode::SemaphoreCreate)?;
            Ok(StepResult::CreateSemaphore { count })
        }
        Instruction::SemaphoreAcquire => {
            let name = pop_str(thread, Opcode::SemaphoreAcquire)?;
            Ok(StepResult::AcquireSemaphore { name })
        }
        Instruction::SemaphoreRelease => {
            let name = pop_str(thread, Opcode::SemaphoreRelease)?;
            Ok(StepResult::ReleaseSemaphore { name })
        }

        // ================================================================
        // Mailboxes
        // ================================================================
        Instruction::QueueCreate => Ok(StepResult::CreateMailbox),
        Instruction::QueueSend => {
            let message = pop(thread, Opcode::QueueSend)?;
            let name = pop_str(thread, Opcode::QueueSend)?;
            Ok(StepResult::Send { name, message })
        }
        Instruction::QueueReceive => {
            let name = pop_str(thread, Opcode::QueueReceive)?;
            Ok(StepResult::Receive { name })
        }

        // ================================================================
        // Atomic counters
        // ================================================================
        Instruction::AtomicCreate => {
            let initial = pop_int(thread, Opcode::AtomicCreate)?;
            Ok(StepResult::CreateCounter { initial })
        }
        Instruction::AtomicIncrement => {
            let name = pop_str(thread, Opcode::AtomicIncrement)?;
            Ok(StepResult::CounterIncrement { name })
        }
        Instruction::AtomicDecrement => {
            let name = pop_str(thread, Opcode::AtomicDecrement)?;
            Ok(StepResult::CounterDecrement { name })
        }
        Instruction::AtomicGet => {
            let name = pop_str(thread, Opcode::AtomicGet)?;
            Ok(StepResult::CounterGet { name })
        }

        // ================================================================
        // Pacing and output
        // ================================================================
        Instruction::Sleep => {
            let millis = pop_int(thread, Opcode::Sleep)?;
            if millis < 0 {
                return Err(ExecError::TypeMismatch {
                    opcode: Opcode::Sleep,
                    expected: "non-negative duration",
                    found: "negative int",
                });
            }
            #[allow(clippy::cast_sign_loss)]
            Ok(StepResult::Sleep {
                millis: millis as u64,
            })
        }

        Instruction::Print(template) => {
            let message = match template {
                Some(template) => match thread.peek() {
                    Some(top) if template.contains("{}") => {
                        template.replace("{}", &top.to_string())
                    }
                    _ => template.clone(),
                },
                None => match thread.peek() {
                    Some(top) => top.to_string(),
                    // Nothing to print; the original treats this as a no-op.
                    None => return Ok(StepResult::Continue),
                },
            };
            Ok(StepResult::Output {
                line: format!("[{}] {}", thread.name(), message),
            })
        }

        Instruction::Nop => Ok(StepResult::Continue),
    }
}

fn pop(thread: &mut VmThread, opcode: Opcode) -> Result<Value, ExecError> {
    thread.pop().ok_or(ExecError::StackUnderflow { opcode })
}

fn pop_int(thread: &mut VmThread, opcode: Opcode) -> Result<i64, ExecError> {
    let value = pop(thread, opcode)?;
    value.as_int().ok_or(ExecError::TypeMismatch {
        opcode,
        expected: "int",
        found: value.type_name(),
    })
}

fn pop_str(thread: &mut VmThread, opcode: Opcode) -> Result<String, ExecError> {
    match pop(thread, opcode)? {
        Value::Str(name) => Ok(name),
        other => Err(ExecError::TypeMismatch {
            opcode,
            expected: "str",
            found: other.type_name(),
        }),
    }
}

fn binary_int(
    thread: &mut VmThread,
    opcode: Opcode,
    op: impl Fn(i64, i64) -> Result<i64, ExecError>,
) -> Result<StepResult, ExecError> {
    let b = pop_int(thread, opcode)?;
    let a = pop_int(thread, opcode)?;
    thread.push(Value::Int(op(a, b)?));
    Ok(StepResult::Continue)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::program::Program;

    fn test_thread() -> VmThread {
        VmThread::new("t", Arc::new(Program::default()), 0, 0)
    }

    fn run(thread: &mut VmThread, instruction: Instruction) -> Result<StepResult, ExecError> {
        let mut globals = HashMap::new();
        execute(thread, &mut globals, &instruction)
    }

    #[test]
    fn test_push_pop_dup() {
        let mut thread = test_thread();
        run(&mut thread, Instruction::Push(Value::Int(3))).unwrap();
        run(&mut thread, Instruction::Dup).unwrap();
        assert_eq!(thread.stack(), &[Value::Int(3), Value::Int(3)]);
        run(&mut thread, Instruction::Pop).unwrap();
        assert_eq!(thread.stack(), &[Value::Int(3)]);
    }

    #[test]
    fn test_arithmetic() {
        let mut thread = test_thread();
        for (instruction, a, b, expected) in [
            (Instruction::Add, 7, 5, 12),
            (Instruction::Sub, 7, 5, 2),
            (Instruction::Mul, 7, 5, 35),
            (Instruction::Div, 7, 5, 1),
            (Instruction::Mod, 7, 5, 2),
        ] {
            thread.push(Value::Int(a));
            thread.push(Value::Int(b));
            run(&mut thread, instruction).unwrap();
            assert_eq!(thread.pop(), Some(Value::Int(expected)));
        }
    }

    #[test]
    fn test_division_by_zero() {
        let mut thread = test_thread();
        thread.push(Value::Int(1));
        thread.push(Value::Int(0));
        assert_eq!(
            run(&mut thread, Instruction::Div),
            Err(ExecError::DivisionByZero)
        );

        thread.push(Value::Int(1));
        thread.push(Value::Int(0));
        assert_eq!(
            run(&mut thread, Instruction::Mod),
            Err(ExecError::DivisionByZero)
        );
    }

    #[test]
    fn test_stack_underflow() {
        let mut thread = test_thread();
        assert_eq!(
            run(&mut thread, Instruction::Pop),
            Err(ExecError::StackUnderflow { opcode: Opcode::Pop })
        );

        thread.push(Value::Int(1));
        assert_eq!(
            run(&mut thread, Instruction::Add),
            Err(ExecError::StackUnderflow { opcode: Opcode::Add })
        );
    }

    #[test]
    fn test_arithmetic_type_mismatch() {
        let mut thread = test_thread();
        thread.push(Value::Int(1));
        thread.push(Value::from("two"));
        assert_eq!(
            run(&mut thread, Instruction::Add),
            Err(ExecError::TypeMismatch {
                opcode: Opcode::Add,
                expected: "int",
                found: "str",
            })
        );
    }

    #[test]
    fn test_load_prefers_thread_variable() {
        let mut thread = test_thread();
        thread.set_variable("x", Value::Int(1));
        let mut globals = HashMap::from([("x".to_string(), Value::Int(9))]);

        execute(&mut thread, &mut globals, &Instruction::Load("x".to_string())).unwrap();
        assert_eq!(thread.pop(), Some(Value::Int(1)));
    }

    #[test]
    fn test_load_falls_back_to_globals() {
        let mut thread = test_thread();
        let mut globals = HashMap::from([("g".to_string(), Value::from("lock-0"))]);

        execute(&mut thread, &mut globals, &Instruction::Load("g".to_string())).unwrap();
        assert_eq!(thread.pop(), Some(Value::from("lock-0")));

        assert_eq!(
            execute(&mut thread, &mut globals, &Instruction::Load("missing".to_string())),
            Err(ExecError::UndefinedVariable {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_global_store() {
        let mut thread = test_thread();
        thread.push(Value::Int(16));
        let mut globals = HashMap::new();
        execute(
            &mut thread,
            &mut globals,
            &Instruction::GlobalStore("total".to_string()),
        )
        .unwrap();
        assert_eq!(globals.get("total"), Some(&Value::Int(16)));
    }

    #[test]
    fn test_jump_if_takes_non_negative() {
        let mut thread = test_thread();

        thread.push(Value::Int(0));
        assert_eq!(
            run(&mut thread, Instruction::JumpIf(9)).unwrap(),
            StepResult::Jump { target: 9 }
        );

        thread.push(Value::Int(-1));
        assert_eq!(
            run(&mut thread, Instruction::JumpIf(9)).unwrap(),
            StepResult::Continue
        );

        // Bools widen: true is non-negative.
        thread.push(Value::Bool(true));
        assert_eq!(
            run(&mut thread, Instruction::JumpIf(9)).unwrap(),
            StepResult::Jump { target: 9 }
        );
    }

    #[test]
    fn test_resource_ops_pop_names() {
        let mut thread = test_thread();

        thread.push(Value::from("buffer_lock"));
        assert_eq!(
            run(&mut thread, Instruction::LockAcquire).unwrap(),
            StepResult::AcquireLock {
                name: "buffer_lock".to_string()
            }
        );

        thread.push(Value::from("q"));
        thread.push(Value::Int(7));
        assert_eq!(
            run(&mut thread, Instruction::QueueSend).unwrap(),
            StepResult::Send {
                name: "q".to_string(),
                message: Value::Int(7),
            }
        );

        thread.push(Value::Int(3));
        assert_eq!(
            run(&mut thread, Instruction::SemaphoreCreate).unwrap(),
            StepResult::CreateSemaphore { count: 3 }
        );
    }

    #[test]
    fn test_resource_name_must_be_str() {
        let mut thread = test_thread();
        thread.push(Value::Int(1));
        assert_eq!(
            run(&mut thread, Instruction::LockAcquire),
            Err(ExecError::TypeMismatch {
                opcode: Opcode::LockAcquire,
                expected: "str",
                found: "int",
            })
        );
    }

    #[test]
    fn test_print_template_substitution() {
        let mut thread = test_thread();
        thread.push(Value::Int(4));

        let result = run(
            &mut thread,
            Instruction::Print(Some("Produced item {}".to_string())),
        )
        .unwrap();
        assert_eq!(
            result,
            StepResult::Output {
                line: "[t] Produced item 4".to_string()
            }
        );
        // Substitution peeks without popping.
        assert_eq!(thread.stack(), &[Value::Int(4)]);
    }

    #[test]
    fn test_print_empty_stack_is_noop() {
        let mut thread = test_thread();
        assert_eq!(
            run(&mut thread, Instruction::Print(None)).unwrap(),
            StepResult::Continue
        );
    }

    #[test]
    fn test_sleep_rejects_negative() {
        let mut thread = test_thread();
        thread.push(Value::Int(-5));
        assert!(matches!(
            run(&mut thread, Instruction::Sleep),
            Err(ExecError::TypeMismatch { .. })
        ));
    }
}
