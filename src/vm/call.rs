//! This module contains the per-invocation execution state: the message that
//! started the call and the [`Call`] frame itself.

use serde::{Deserialize, Serialize};

use crate::{
    utility::serde_hex,
    vm::{
        memory::Memory,
        stack::Stack,
        value::{Address, Word},
    },
};

/// The message that initiated a call: its payload, gas, sender and value.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Msg {
    /// The call data.
    #[serde(with = "serde_hex")]
    pub data: Vec<u8>,

    /// The gas available to the call; reported by the `GAS` opcode but never
    /// decremented.
    pub gas: u64,

    /// The immediate sender of the call.
    pub sender: Address,

    /// The value transferred with the call.
    pub value: Word,
}

/// One invocation frame: the outer transaction, or any nested
/// `CALL`/`DELEGATECALL`/`STATICCALL`.
///
/// Frames stack up in [`crate::vm::Context::call_stack`]; the bottom frame is
/// the outer transaction and is never popped.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Call {
    /// The message that created this frame.
    pub msg: Msg,

    /// The account the frame executes as; `address(this)` in Solidity terms.
    pub this: Address,

    /// The account whose code is executing, when it differs from `this`.
    ///
    /// This is only ever set for `DELEGATECALL` frames: when A delegate-calls
    /// B, the frame has `this = A` and `code_override = Some(B)`.
    pub code_override: Option<Address>,

    /// The frame's transient memory.
    pub memory: Memory,

    /// The frame's operand stack.
    pub stack: Stack<Word>,

    /// The program counter, as a byte offset into the executing code.
    pub pc: u64,

    /// The memory offset in this frame where a callee's return data is to be
    /// copied. Recorded by the call opcodes and honoured by `RETURN`.
    pub outer_return_offset: u64,

    /// The size of the return window at `outer_return_offset`.
    pub outer_return_size: u64,

    /// The return data of the most recent completed inner call. Empty until
    /// an inner call returns.
    #[serde(with = "serde_hex")]
    pub inner_return: Vec<u8>,
}

impl Call {
    /// Gets the address whose code this frame is executing: the override for
    /// `DELEGATECALL` frames, and `this` everywhere else.
    #[must_use]
    pub fn code_address(&self) -> Address {
        self.code_override.unwrap_or(self.this)
    }
}
