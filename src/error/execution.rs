//! This module contains errors pertaining to the execution of bytecode by the
//! replay interpreter.

use thiserror::Error;

use crate::{
    error::{container, resolution},
    vm::value::Address,
};

/// Errors that occur during the execution of bytecode by a
/// [`crate::vm::Context`].
///
/// These are also the errors returned from hooks; in particular
/// [`Error::Breakpoint`] is the distinguished error that breakpoint hooks use
/// to pause execution.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Jump target {target:#x} is not a valid program counter")]
    InvalidJump { target: u64 },

    #[error("Return data slice [{offset}..{end}) is out of bounds in {available} bytes")]
    ReturnDataOutOfBounds {
        offset:    u64,
        end:       u64,
        available: usize,
    },

    #[error("Invalid opcode {byte:#04x}")]
    InvalidOpcode { byte: u8 },

    #[error("No instruction exists at pc {pc}")]
    NoLineAtPc { pc: u64 },

    #[error("A stack item was requested but none was available")]
    StackUnderflow,

    #[error("Not enough code for the immediate of the push at pc {pc}")]
    PushOutOfCode { pc: u64 },

    #[error("Breakpoint: {reason}")]
    Breakpoint { reason: String },

    #[error("Reverted with {} bytes of return data", data.len())]
    Reverted { data: Vec<u8> },

    #[error("The `{name}` opcode is not supported by the replay interpreter")]
    UnsupportedOpcode { name: String },

    #[error("The precompiled contract at {address} rejected its input: {message}")]
    PrecompileFailed { address: Address, message: String },

    #[error(transparent)]
    Resolution(#[from] resolution::Error),
}

impl Error {
    /// Checks whether this error is the distinguished breakpoint error, which
    /// is recoverable by resuming execution.
    #[must_use]
    pub fn is_breakpoint(&self) -> bool {
        matches!(self, Self::Breakpoint { .. })
    }
}

/// An execution error with the program counter at which it surfaced.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, pc: u64) -> Self::Located {
        container::Located {
            location: pc,
            payload:  self,
        }
    }
}

impl LocatedError {
    /// Checks whether the contained error is the distinguished breakpoint
    /// error.
    #[must_use]
    pub fn is_breakpoint(&self) -> bool {
        self.payload.is_breakpoint()
    }
}
