//! This module contains constants that are needed throughout the codebase.

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The base byte value for the `DUP` opcode.
///
/// This is constructed such that for `DUPN`, `DUP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
///
/// This is constructed such that for `SWAPN`, `SWAP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The maximum stack depth for a real EVM.
///
/// The replay interpreter does not enforce this limit (it is a debugging tool,
/// not a consensus engine), but the constant is used to size allocations.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of a word on the EVM in bytes.
pub const WORD_SIZE_BYTES: usize = 32;

/// The number of recent blocks for which `BLOCKHASH` can produce a hash.
pub const BLOCKHASH_WINDOW: u64 = 256;

/// The number of trailing bytes that encode the length of the CBOR metadata
/// blob that `solc` appends to deployed bytecode.
pub const METADATA_LENGTH_FIELD_BYTES: usize = 2;

/// The highest address on the Berlin-era precompiled contract list.
pub const PRECOMPILE_MAX_ADDRESS: u8 = 0x09;
