//! Opcodes that perform arithmetic operations on the EVM.

use crate::{
    error::execution::Result,
    opcode::{gas, Opcode},
    vm::Context,
};

/// The `ADD` opcode performs integer addition.
///
/// # Semantics
///
/// | Stack Index | Input | Output            |
/// | :---------: | :---: | :---------------: |
/// | 1           | a     | (a + b) mod 2^256 |
/// | 2           | b     |                   |
///
/// # Errors
///
/// If there are not enough operands on the stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Add;

impl Opcode for Add {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.wrapping_add(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "ADD".into()
    }

    fn as_byte(&self) -> u8 {
        0x01
    }
}

/// The `MUL` opcode performs integer multiplication, wrapping modulo 2^256.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mul;

impl Opcode for Mul {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.wrapping_mul(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "MUL".into()
    }

    fn as_byte(&self) -> u8 {
        0x02
    }
}

/// The `SUB` opcode performs integer subtraction, wrapping modulo 2^256.
///
/// # Semantics
///
/// | Stack Index | Input | Output            |
/// | :---------: | :---: | :---------------: |
/// | 1           | a     | (a - b) mod 2^256 |
/// | 2           | b     |                   |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sub;

impl Opcode for Sub {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.wrapping_sub(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SUB".into()
    }

    fn as_byte(&self) -> u8 {
        0x03
    }
}

/// The `DIV` opcode performs unsigned integer division.
///
/// Division by zero pushes zero rather than trapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Div;

impl Opcode for Div {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.div(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "DIV".into()
    }

    fn as_byte(&self) -> u8 {
        0x04
    }
}

/// The `SDIV` opcode performs signed integer division over the two's
/// complement interpretation of the operands, truncating toward zero.
///
/// Division by zero pushes zero; `MIN / -1` wraps to `MIN`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SDiv;

impl Opcode for SDiv {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.sdiv(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SDIV".into()
    }

    fn as_byte(&self) -> u8 {
        0x05
    }
}

/// The `MOD` opcode computes the unsigned remainder; a zero modulus pushes
/// zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mod;

impl Opcode for Mod {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.rem(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "MOD".into()
    }

    fn as_byte(&self) -> u8 {
        0x06
    }
}

/// The `SMOD` opcode computes the signed remainder, which takes the sign of
/// the dividend; a zero modulus pushes zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SMod;

impl Opcode for SMod {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.srem(b));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SMOD".into()
    }

    fn as_byte(&self) -> u8 {
        0x07
    }
}

/// The `ADDMOD` opcode computes `(a + b) % m` over the full-width sum, with a
/// zero modulus pushing zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddMod;

impl Opcode for AddMod {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        let modulus = stack.pop()?;
        stack.push(a.addmod(b, modulus));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        8
    }

    fn stack_in(&self) -> usize {
        3
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "ADDMOD".into()
    }

    fn as_byte(&self) -> u8 {
        0x08
    }
}

/// The `MULMOD` opcode computes `(a * b) % m` over the full-width product,
/// with a zero modulus pushing zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MulMod;

impl Opcode for MulMod {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        let modulus = stack.pop()?;
        stack.push(a.mulmod(b, modulus));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        8
    }

    fn stack_in(&self) -> usize {
        3
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "MULMOD".into()
    }

    fn as_byte(&self) -> u8 {
        0x09
    }
}

/// The `EXP` opcode performs exponentiation modulo 2^256.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Exp;

impl Opcode for Exp {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let base = stack.pop()?;
        let exponent = stack.pop()?;
        stack.push(base.exp(exponent));
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::exp_cost(ctx)
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "EXP".into()
    }

    fn as_byte(&self) -> u8 {
        0x0a
    }
}

/// The `SIGNEXTEND` opcode sign-extends a value from `(b + 1) * 8` bits to
/// the full word width.
///
/// # Semantics
///
/// | Stack Index | Input | Output              |
/// | :---------: | :---: | :-----------------: |
/// | 1           | b     | SIGNEXTEND(x, b)    |
/// | 2           | x     |                     |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignExtend;

impl Opcode for SignExtend {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let byte_count = stack.pop()?;
        let value = stack.pop()?;
        stack.push(value.signextend(byte_count));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SIGNEXTEND".into()
    }

    fn as_byte(&self) -> u8 {
        0x0b
    }
}
