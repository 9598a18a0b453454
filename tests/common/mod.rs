//! This module contains common testing utilities for exercising the replay
//! interpreter end to end.
#![cfg(test)]
#![allow(unused)] // Not every helper is used by every test binary.

use evm_replay::{
    vm::value::{Address, Word},
    Context, Contract,
};

/// Constructs a context executing `code` at the zero address, with no call
/// data.
pub fn new_context_with_code(code: Vec<u8>) -> Context {
    let mut ctx = Context::new();
    let mut contract = Contract::new();
    contract.code.set(code);
    ctx.contracts.insert(ctx.this(), contract);
    ctx
}

/// Constructs a context executing hex-encoded `code` at the zero address.
pub fn new_context_with_hex(code: &str) -> Context {
    new_context_with_code(hex::decode(code).expect("test bytecode is valid hex"))
}

/// Installs `code` as the contract at `address` in `ctx`.
pub fn install_contract(ctx: &mut Context, address: Address, code: Vec<u8>) {
    let mut contract = Contract::new();
    contract.code.set(code);
    ctx.contracts.insert(address, contract);
}

/// A short test address with the given low byte.
pub fn address(low: u8) -> Address {
    Address::from_word(Word::from(low))
}
