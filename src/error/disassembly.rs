//! This module contains the error type that pertains to the disassembly
//! process.

use thiserror::Error;

/// Errors that occur while constructing the library's rich
/// [`crate::opcode::Opcode`] types.
///
/// Note that disassembly of a full bytecode buffer never fails; these errors
/// only arise when an opcode is constructed directly with invalid parameters.
/// Trailing garbage in a buffer degrades to a warning instead (see
/// [`crate::disassembly::disassemble`]).
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Invalid number of topics {_0:?} provided to the `LOG` opcode")]
    InvalidTopicCount(u8),

    #[error("Invalid size {_0:?} provided to the `PUSH` opcode")]
    InvalidPushSize(u8),

    #[error("Invalid stack item {item:?} provided for the `{name}` opcode")]
    InvalidStackItem { item: u8, name: String },
}

/// The result type for functions that may return disassembly errors.
pub type Result<T> = std::result::Result<T, Error>;
