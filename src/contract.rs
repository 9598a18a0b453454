//! This module contains the types for the concrete contracts known to a
//! replay context: their code and their cached account state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    disassembly::{self, InstructionStream},
    utility::serde_hex,
    vm::value::Word,
};

/// The code of a contract, as both the raw bytes and their disassembly.
///
/// The two representations are kept consistent: [`Code::set`] installs both
/// at once, and the disassembly is regenerated (rather than persisted) when a
/// context is loaded from disk.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Code {
    /// The raw bytes of the deployed contract.
    #[serde(with = "serde_hex")]
    binary: Vec<u8>,

    /// The disassembled form of `binary`, absent until the code is set.
    #[serde(skip)]
    asm: Option<InstructionStream>,
}

impl Code {
    /// Installs `binary` as this contract's code, disassembling it in the
    /// same step so that the raw bytes and the instruction stream can never
    /// disagree.
    pub fn set(&mut self, binary: Vec<u8>) {
        self.asm = Some(disassembly::disassemble(&binary));
        self.binary = binary;
    }

    /// Regenerates the disassembly from the raw bytes if it is absent, which
    /// is the case after deserializing a persisted context.
    pub fn ensure_disassembled(&mut self) {
        if self.asm.is_none() && !self.binary.is_empty() {
            self.asm = Some(disassembly::disassemble(&self.binary));
        }
    }

    /// Gets the raw bytes of the code.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.binary
    }

    /// Checks whether any code has been installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binary.is_empty()
    }

    /// Gets the disassembled form of the code, if any code is installed.
    #[must_use]
    pub fn asm(&self) -> Option<&InstructionStream> {
        self.asm.as_ref()
    }
}

/// An account known to the replay context: its code, its balance and its
/// storage.
///
/// Balance and storage entries are caches filled lazily; an absent entry
/// means "not fetched yet", not "zero".
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Contract {
    /// The account's code; empty for accounts only touched as balance or
    /// storage targets.
    pub code: Code,

    /// The account's balance at the pre-state block, if it has been fetched.
    pub balance: Option<Word>,

    /// The cached storage of the account, keyed by slot.
    pub storage: HashMap<Word, Word>,
}

impl Contract {
    /// Creates a new contract with no code, no balance and no storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
