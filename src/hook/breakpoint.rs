//! This module contains the built-in breakpoint hooks: break at a program
//! counter, and break at an opcode.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    disassembly::Line,
    error::{
        execution::{Error, Result},
        persistence,
    },
    hook::Hook,
    opcode,
    vm::{value::Address, Context},
};

/// Breaks when execution reaches a program counter, optionally only inside a
/// particular contract's code.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BpPc {
    /// When set, the breakpoint only fires while this contract's code is
    /// executing.
    pub contract: Option<Address>,

    /// The program counter to break at.
    pub pc: u64,
}

impl BpPc {
    /// Creates a breakpoint at `pc` in any contract.
    #[must_use]
    pub fn new(pc: u64) -> Self {
        Self { contract: None, pc }
    }

    /// Creates a breakpoint at `pc` scoped to `contract`'s code.
    #[must_use]
    pub fn in_contract(pc: u64, contract: Address) -> Self {
        Self {
            contract: Some(contract),
            pc,
        }
    }
}

impl Display for BpPc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.contract {
            None => write!(f, "@ pc: {:#x}", self.pc),
            Some(contract) => write!(f, "@ pc: {:#x} of {contract}", self.pc),
        }
    }
}

impl Hook for BpPc {
    fn type_name(&self) -> &'static str {
        "BpPc"
    }

    fn pre_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        if let Some(contract) = self.contract {
            if contract != ctx.call().code_address() {
                return Ok(());
            }
        }
        if line.pc != self.pc {
            return Ok(());
        }
        Err(Error::Breakpoint {
            reason: self.to_string(),
        })
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Breaks when execution reaches an opcode, optionally only inside a
/// particular contract's code.
///
/// Useful for stopping at the next `SHA3` or the next `SSTORE` without
/// knowing where it lives.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BpOpCode {
    /// When set, the breakpoint only fires while this contract's code is
    /// executing.
    pub contract: Option<Address>,

    /// The byte value of the opcode to break at.
    pub opcode: u8,
}

impl BpOpCode {
    /// Creates a breakpoint at `opcode` in any contract.
    #[must_use]
    pub fn new(opcode: u8) -> Self {
        Self {
            contract: None,
            opcode,
        }
    }
}

impl Display for BpOpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mnemonic = opcode::text_code(self.opcode);
        match &self.contract {
            None => write!(f, "@ opcode: {mnemonic}"),
            Some(contract) => write!(f, "@ opcode: {mnemonic} of {contract}"),
        }
    }
}

impl Hook for BpOpCode {
    fn type_name(&self) -> &'static str {
        "BpOpCode"
    }

    fn pre_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        if let Some(contract) = self.contract {
            if contract != ctx.call().code_address() {
                return Ok(());
            }
        }
        if line.opcode_byte() != self.opcode {
            return Ok(());
        }
        Err(Error::Breakpoint {
            reason: self.to_string(),
        })
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
