use thiserror::Error;

use crate::program::Opcode;

/// The generic Error type, which provides coverage for all errors this library
/// can return from its host-facing API.
///
/// These are errors a *host* makes while assembling programs or configuring a
/// machine: unknown mnemonics, malformed operands, duplicate names, bad policy
/// strings. Faults raised by a running thread (stack underflow, division by
/// zero, unknown resource references) are deliberately **not** represented
/// here — they are scoped to the offending thread, reported through the trace,
/// and terminate only that thread. See
/// [`ExecError`](crate::engine::ExecError).
///
/// # Examples
///
/// ```rust
/// use weftvm::{Error, program::Instruction, Value};
///
/// match Instruction::parse("FROBNICATE", &[]) {
///     Err(Error::UnknownOpcode { name }) => assert_eq!(name, "FROBNICATE"),
///     other => panic!("expected UnknownOpcode, got {other:?}"),
/// }
///
/// match Instruction::parse("PUSH", &[]) {
///     Err(Error::InvalidOperand { .. }) => {}
///     other => panic!("expected InvalidOperand, got {other:?}"),
/// }
/// # let _ = Value::Int(0);
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A mnemonic did not name any instruction this machine knows.
    ///
    /// Instruction kinds are a closed set; an unrecognized name can only
    /// occur while assembling a program, never during execution.
    #[error("unknown opcode: {name}")]
    UnknownOpcode {
        /// The unrecognized mnemonic.
        name: String,
    },

    /// An instruction was assembled with the wrong operands.
    #[error("invalid operand for {opcode}: expected {expected}")]
    InvalidOperand {
        /// The instruction being assembled.
        opcode: Opcode,
        /// Description of the expected operand shape.
        expected: &'static str,
    },

    /// A scheduling policy name did not match `round_robin`, `priority` or
    /// `random`.
    #[error("unknown scheduling policy: {name}")]
    UnknownPolicy {
        /// The unrecognized policy name.
        name: String,
    },

    /// A lock, semaphore, mailbox or counter was created with a name that is
    /// already registered for that resource kind.
    #[error("resource name already in use: {name}")]
    DuplicateResource {
        /// The conflicting name.
        name: String,
    },

    /// A semaphore was created with a negative permit count.
    #[error("semaphore requires a non-negative permit count, got {count}")]
    NegativePermits {
        /// The rejected count.
        count: i64,
    },

    /// A thread was spawned with a name that is already registered.
    #[error("thread name already in use: {name}")]
    DuplicateThread {
        /// The conflicting name.
        name: String,
    },

    /// A spawn referenced a program id that was never defined on the machine.
    #[error("unknown program id: {id}")]
    UnknownProgram {
        /// The out-of-range program id.
        id: usize,
    },
}

/// Result type alias used throughout the crate's host-facing API.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            Error::UnknownOpcode {
                name: "BOGUS".to_string(),
            },
            Error::UnknownPolicy {
                name: "fifo".to_string(),
            },
            Error::DuplicateResource {
                name: "lock-0".to_string(),
            },
            Error::DuplicateThread {
                name: "worker".to_string(),
            },
            Error::UnknownProgram { id: 7 },
        ];

        for err in errors {
            assert!(!format!("{err}").is_empty());
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
