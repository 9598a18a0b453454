//! Opcodes that perform comparison, bitwise and shift operations on the EVM.

use crate::{
    error::execution::Result,
    opcode::Opcode,
    vm::Context,
};

/// The `LT` opcode performs an unsigned less-than comparison, pushing 1 for
/// true and 0 for false.
///
/// # Semantics
///
/// | Stack Index | Input | Output  |
/// | :---------: | :---: | :-----: |
/// | 1           | a     | a < b   |
/// | 2           | b     |         |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lt;

impl Opcode for Lt {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.lt(b).into());
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
        "LT".into()
    }

    fn as_byte(&self) -> u8 {
        0x10
    }
}

/// The `GT` opcode performs an unsigned greater-than comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Gt;

impl Opcode for Gt {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.gt(b).into());
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
        "GT".into()
    }

    fn as_byte(&self) -> u8 {
        0x11
    }
}

/// The `SLT` opcode performs a signed less-than comparison over the two's
/// complement interpretation of its operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SLt;

impl Opcode for SLt {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.slt(b).into());
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
        "SLT".into()
    }

    fn as_byte(&self) -> u8 {
        0x12
    }
}

/// The `SGT` opcode performs a signed greater-than comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SGt;

impl Opcode for SGt {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.sgt(b).into());
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
        "SGT".into()
    }

    fn as_byte(&self) -> u8 {
        0x13
    }
}

/// The `EQ` opcode performs an equality comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Eq;

impl Opcode for Eq {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push((a == b).into());
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
        "EQ".into()
    }

    fn as_byte(&self) -> u8 {
        0x14
    }
}

/// The `ISZERO` opcode pushes 1 when its operand is zero and 0 otherwise.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IsZero;

impl Opcode for IsZero {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        stack.push(a.is_zero().into());
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "ISZERO".into()
    }

    fn as_byte(&self) -> u8 {
        0x15
    }
}

/// The `AND` opcode performs a bitwise conjunction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct And;

impl Opcode for And {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.and(b));
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
        "AND".into()
    }

    fn as_byte(&self) -> u8 {
        0x16
    }
}

/// The `OR` opcode performs a bitwise disjunction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Or;

impl Opcode for Or {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.or(b));
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
        "OR".into()
    }

    fn as_byte(&self) -> u8 {
        0x17
    }
}

/// The `XOR` opcode performs a bitwise exclusive or.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Xor;

impl Opcode for Xor {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        let b = stack.pop()?;
        stack.push(a.xor(b));
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
        "XOR".into()
    }

    fn as_byte(&self) -> u8 {
        0x18
    }
}

/// The `NOT` opcode performs a bitwise negation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Not;

impl Opcode for Not {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let a = stack.pop()?;
        stack.push(a.not());
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "NOT".into()
    }

    fn as_byte(&self) -> u8 {
        0x19
    }
}

/// The `BYTE` opcode extracts a single byte from a word, counting from the
/// most significant byte.
///
/// # Semantics
///
/// | Stack Index | Input | Output          |
/// | :---------: | :---: | :-------------: |
/// | 1           | i     | BYTE(x, i)      |
/// | 2           | x     |                 |
///
/// Indices of 32 and above produce zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Byte;

impl Opcode for Byte {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let index = stack.pop()?;
        let value = stack.pop()?;
        stack.push(value.byte(index));
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
        "BYTE".into()
    }

    fn as_byte(&self) -> u8 {
        0x1a
    }
}

/// The `SHL` opcode shifts its second operand left by its first operand bits.
///
/// # Semantics
///
/// | Stack Index | Input | Output       |
/// | :---------: | :---: | :----------: |
/// | 1           | shift | value << shift |
/// | 2           | value |              |
///
/// Shifts of 256 or more produce zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Shl;

impl Opcode for Shl {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let shift = stack.pop()?;
        let value = stack.pop()?;
        stack.push(value.shl(shift));
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
        "SHL".into()
    }

    fn as_byte(&self) -> u8 {
        0x1b
    }
}

/// The `SHR` opcode performs a logical right shift with zero fill.
///
/// Shifts of 256 or more produce zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Shr;

impl Opcode for Shr {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let shift = stack.pop()?;
        let value = stack.pop()?;
        stack.push(value.shr(shift));
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
        "SHR".into()
    }

    fn as_byte(&self) -> u8 {
        0x1c
    }
}

/// The `SAR` opcode performs an arithmetic right shift, filling with the sign
/// bit.
///
/// Shifts of 256 or more produce zero for non-negative values and the
/// all-ones word for negative values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sar;

impl Opcode for Sar {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let shift = stack.pop()?;
        let value = stack.pop()?;
        stack.push(value.sar(shift));
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
        "SAR".into()
    }

    fn as_byte(&self) -> u8 {
        0x1d
    }
}
