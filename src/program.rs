//! Programs and their instructions.
//!
//! A [`Program`] is an immutable, ordered list of [`Instruction`]s. Threads
//! referencing the same program share it read-only; each thread keeps its own
//! program counter, operand stack and variable bindings.
//!
//! Instruction kinds form a closed sum type: every opcode the machine can
//! execute is a variant of [`Instruction`], and dispatch over them is
//! exhaustive. The string-mnemonic surface still exists for hosts that
//! assemble programs from text — [`Instruction::parse`] maps a mnemonic plus
//! operand list to a typed instruction and rejects unknown names and
//! malformed operands up front, so no "unknown opcode" path survives into
//! execution.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{error::Error, value::Value, Result};

/// Instruction mnemonics.
///
/// This enum carries no operands; it exists for the textual surface
/// (mnemonic parsing, diagnostics, error messages). The executable form is
/// [`Instruction`], which pairs each kind with its typed operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Opcode {
    Push,
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Load,
    Store,
    GlobalStore,
    Jump,
    JumpIf,
    ThreadCreate,
    ThreadJoin,
    LockCreate,
    LockAcquire,
    LockRelease,
    SemaphoreCreate,
    SemaphoreAcquire,
    SemaphoreRelease,
    QueueCreate,
    QueueSend,
    QueueReceive,
    AtomicCreate,
    AtomicIncrement,
    AtomicDecrement,
    AtomicGet,
    Sleep,
    Print,
    Nop,
}

/// A single executable instruction.
///
/// Operands that are fixed at assembly time (literals, variable names, jump
/// targets, print templates) live in the variant; operands that vary at run
/// time (resource names, counts, messages) travel on the operand stack.
///
/// # Stack conventions
///
/// - `*_CREATE` instructions push the new resource's auto-generated name;
///   `SEMAPHORE_CREATE` and `ATOMIC_CREATE` first pop the initial count.
/// - `LOCK_ACQUIRE` / `LOCK_RELEASE` / `SEMAPHORE_*` / `QUEUE_*` /
///   `ATOMIC_*` pop the resource name from the stack.
/// - `QUEUE_SEND` pops the message, then the mailbox name.
/// - `THREAD_CREATE` pops a spawn-table index and pushes the new thread's
///   name; `THREAD_JOIN` pops a thread name.
///
/// # Jump targets
///
/// `Jump(t)` and a taken `JumpIf(t)` set the program counter to `t`: the
/// instruction at index `t` executes next. A target at or past the end of
/// the program terminates the thread, the same as running off the end.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Push a literal value.
    Push(Value),
    /// Discard the top of stack.
    Pop,
    /// Duplicate the top of stack.
    Dup,
    /// Pop two integers, push their sum.
    Add,
    /// Pop two integers, push `a - b` (b on top).
    Sub,
    /// Pop two integers, push their product.
    Mul,
    /// Pop two integers, push `a / b`. Zero divisor faults the thread.
    Div,
    /// Pop two integers, push `a % b`. Zero divisor faults the thread.
    Mod,
    /// Push the named variable: thread-private bindings first, then the
    /// machine's globals.
    Load(String),
    /// Pop the top of stack into a thread-private variable.
    Store(String),
    /// Pop the top of stack into the machine's global bindings.
    GlobalStore(String),
    /// Unconditional transfer within the thread's program.
    Jump(usize),
    /// Pop a condition; transfer when its integer view is non-negative.
    JumpIf(usize),
    /// Pop a spawn-table index, spawn a thread running that program at the
    /// creator's priority plus one, push the new thread's name.
    ThreadCreate,
    /// Pop a thread name and block until that thread stops running.
    ThreadJoin,
    /// Create a lock, push its name.
    LockCreate,
    /// Pop a lock name; become owner or block FIFO behind the current one.
    LockAcquire,
    /// Pop a lock name; hand ownership to the oldest waiter, or unlock.
    LockRelease,
    /// Pop an initial permit count, create a semaphore, push its name.
    SemaphoreCreate,
    /// Pop a semaphore name; consume a permit or block FIFO.
    SemaphoreAcquire,
    /// Pop a semaphore name; wake the oldest waiter or bank a permit.
    SemaphoreRelease,
    /// Create a mailbox, push its name.
    QueueCreate,
    /// Pop a message, then a mailbox name; deliver directly to the oldest
    /// blocked receiver or buffer the message.
    QueueSend,
    /// Pop a mailbox name; push the oldest buffered message or block.
    QueueReceive,
    /// Pop an initial value, create an atomic counter, push its name.
    AtomicCreate,
    /// Pop a counter name, increment it, push the new value.
    AtomicIncrement,
    /// Pop a counter name, decrement it, push the new value.
    AtomicDecrement,
    /// Pop a counter name, push its current value.
    AtomicGet,
    /// Pop a millisecond count and pace execution for that long.
    Sleep,
    /// Emit an output line. With a template, `{}` is substituted with the
    /// current top of stack (not popped); without one, the top of stack is
    /// printed as-is.
    Print(Option<String>),
    /// Do nothing.
    Nop,
}

impl Instruction {
    /// Returns the mnemonic for this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Push(_) => Opcode::Push,
            Instruction::Pop => Opcode::Pop,
            Instruction::Dup => Opcode::Dup,
            Instruction::Add => Opcode::Add,
            Instruction::Sub => Opcode::Sub,
            Instruction::Mul => Opcode::Mul,
            Instruction::Div => Opcode::Div,
            Instruction::Mod => Opcode::Mod,
            Instruction::Load(_) => Opcode::Load,
            Instruction::Store(_) => Opcode::Store,
            Instruction::GlobalStore(_) => Opcode::GlobalStore,
            Instruction::Jump(_) => Opcode::Jump,
            Instruction::JumpIf(_) => Opcode::JumpIf,
            Instruction::ThreadCreate => Opcode::ThreadCreate,
            Instruction::ThreadJoin => Opcode::ThreadJoin,
            Instruction::LockCreate => Opcode::LockCreate,
            Instruction::LockAcquire => Opcode::LockAcquire,
            Instruction::LockRelease => Opcode::LockRelease,
            Instruction::SemaphoreCreate => Opcode::SemaphoreCreate,
            Instruction::SemaphoreAcquire => Opcode::SemaphoreAcquire,
            Instruction::SemaphoreRelease => Opcode::SemaphoreRelease,
            Instruction::QueueCreate => Opcode::QueueCreate,
            Instruction::QueueSend => Opcode::QueueSend,
            Instruction::QueueReceive => Opcode::QueueReceive,
            Instruction::AtomicCreate => Opcode::AtomicCreate,
            Instruction::AtomicIncrement => Opcode::AtomicIncrement,
            Instruction::AtomicDecrement => Opcode::AtomicDecrement,
            Instruction::AtomicGet => Opcode::AtomicGet,
            Instruction::Sleep => Opcode::Sleep,
            Instruction::Print(_) => Opcode::Print,
            Instruction::Nop => Opcode::Nop,
        }
    }

    /// Assembles an instruction from a mnemonic and operand list.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownOpcode`] when the mnemonic names no instruction, and
    /// [`Error::InvalidOperand`] when the operand list does not match the
    /// instruction's shape (wrong arity or type).
    pub fn parse(mnemonic: &str, operands: &[Value]) -> Result<Instruction> {
        let opcode = Opcode::from_str(mnemonic).map_err(|_| Error::UnknownOpcode {
            name: mnemonic.to_string(),
        })?;

        let invalid = |expected: &'static str| Error::InvalidOperand { opcode, expected };

        let instruction = match opcode {
            Opcode::Push => match operands {
                [value] => Instruction::Push(value.clone()),
                _ => return Err(invalid("one literal value")),
            },
            Opcode::Load | Opcode::Store | Opcode::GlobalStore => match operands {
                [Value::Str(name)] => {
                    let name = name.clone();
                    match opcode {
                        Opcode::Load => Instruction::Load(name),
                        Opcode::Store => Instruction::Store(name),
                        _ => Instruction::GlobalStore(name),
                    }
                }
                _ => return Err(invalid("one variable name")),
            },
            Opcode::Jump | Opcode::JumpIf => match operands {
                [Value::Int(target)] if *target >= 0 => {
                    #[allow(clippy::cast_sign_loss)]
                    let target = *target as usize;
                    if opcode == Opcode::Jump {
                        Instruction::Jump(target)
                    } else {
                        Instruction::JumpIf(target)
                    }
                }
                _ => return Err(invalid("one non-negative instruction index")),
            },
            Opcode::Print => match operands {
                [] => Instruction::Print(None),
                [Value::Str(template)] => Instruction::Print(Some(template.clone())),
                _ => return Err(invalid("an optional message template")),
            },
            _ => {
                if !operands.is_empty() {
                    return Err(invalid("no operands"));
                }
                match opcode {
                    Opcode::Pop => Instruction::Pop,
                    Opcode::Dup => Instruction::Dup,
                    Opcode::Add => Instruction::Add,
                    Opcode::Sub => Instruction::Sub,
                    Opcode::Mul => Instruction::Mul,
                    Opcode::Div => Instruction::Div,
                    Opcode::Mod => Instruction::Mod,
                    Opcode::ThreadCreate => Instruction::ThreadCreate,
                    Opcode::ThreadJoin => Instruction::ThreadJoin,
                    Opcode::LockCreate => Instruction::LockCreate,
                    Opcode::LockAcquire => Instruction::LockAcquire,
                    Opcode::LockRelease => Instruction::LockRelease,
                    Opcode::SemaphoreCreate => Instruction::SemaphoreCreate,
                    Opcode::SemaphoreAcquire => Instruction::SemaphoreAcquire,
                    Opcode::SemaphoreRelease => Instruction::SemaphoreRelease,
                    Opcode::QueueCreate => Instruction::QueueCreate,
                    Opcode::QueueSend => Instruction::QueueSend,
                    Opcode::QueueReceive => Instruction::QueueReceive,
                    Opcode::AtomicCreate => Instruction::AtomicCreate,
                    Opcode::AtomicIncrement => Instruction::AtomicIncrement,
                    Opcode::AtomicDecrement => Instruction::AtomicDecrement,
                    Opcode::AtomicGet => Instruction::AtomicGet,
                    Opcode::Sleep => Instruction::Sleep,
                    Opcode::Nop => Instruction::Nop,
                    // Operand-bearing opcodes are handled above.
                    Opcode::Push
                    | Opcode::Load
                    | Opcode::Store
                    | Opcode::GlobalStore
                    | Opcode::Jump
                    | Opcode::JumpIf
                    | Opcode::Print => unreachable!(),
                }
            }
        };

        Ok(instruction)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(value) => write!(f, "PUSH {value}"),
            Instruction::Load(name) => write!(f, "LOAD {name}"),
            Instruction::Store(name) => write!(f, "STORE {name}"),
            Instruction::GlobalStore(name) => write!(f, "GLOBAL_STORE {name}"),
            Instruction::Jump(target) => write!(f, "JUMP {target}"),
            Instruction::JumpIf(target) => write!(f, "JUMP_IF {target}"),
            Instruction::Print(Some(template)) => write!(f, "PRINT {template:?}"),
            other => write!(f, "{}", other.opcode()),
        }
    }
}

/// An immutable instruction sequence shared read-only across threads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Creates a program from an instruction sequence.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Program { instructions }
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the program holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the instruction at `pc`, or `None` past the end.
    #[must_use]
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// Returns the full instruction slice.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Program::new(iter.into_iter().collect())
    }
}
