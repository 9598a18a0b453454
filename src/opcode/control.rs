//! Opcodes that alter the flow of execution: jumps, calls, returns and the
//! halting instructions.

use crate::{
    error::execution::{Error, Result},
    opcode::Opcode,
    resolver,
    vm::{self, precompile, value::Word, Context, Msg},
};

/// The `STOP` opcode halts execution of the current call with no return
/// data.
///
/// Returning from an inner call pops the frame and pushes 1 onto the caller's
/// stack; returning from the outer transaction marks the context as done.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stop;

impl Opcode for Stop {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        if ctx.depth() > 1 {
            ctx.pop_call()?;
            ctx.stack_mut().push(Word::ONE);
        } else {
            ctx.set_done();
        }
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "STOP".into()
    }

    fn as_byte(&self) -> u8 {
        0x00
    }
}

/// The `JUMP` opcode sets the program counter to the target popped from the
/// stack.
///
/// The driver does not increment the program counter after a jump; this
/// opcode is wholly responsible for it.
///
/// # Errors
///
/// If the target is outside the code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Jump;

impl Opcode for Jump {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let target = ctx.stack_mut().pop()?;
        jump_to(ctx, target)
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        8
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "JUMP".into()
    }

    fn as_byte(&self) -> u8 {
        0x56
    }
}

/// The `JUMPI` opcode jumps to the target when the condition is non-zero and
/// falls through otherwise.
///
/// Both branches set the program counter themselves (the fall-through branch
/// performs the `pc + 1`), and the driver skips its own increment for this
/// opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JumpI;

impl Opcode for JumpI {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let target = stack.pop()?;
        let condition = stack.pop()?;

        if condition.is_zero() {
            ctx.call_mut().pc += 1;
            Ok(())
        } else {
            jump_to(ctx, target)
        }
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        10
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "JUMPI".into()
    }

    fn as_byte(&self) -> u8 {
        0x57
    }
}

/// Validates `target` against the executing code and sets the program
/// counter.
fn jump_to(ctx: &mut Context, target: Word) -> Result<()> {
    let code_len = ctx.code()?.bytes().len() as u64;
    match target.to_u64() {
        Some(target) if target < code_len => {
            ctx.call_mut().pc = target;
            Ok(())
        }
        _ => Err(Error::InvalidJump {
            target: target.low_u64(),
        }),
    }
}

/// The `PC` opcode pushes the program counter of the current instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pc;

impl Opcode for Pc {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let pc = ctx.pc();
        ctx.stack_mut().push(Word::from(pc));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        2
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "PC".into()
    }

    fn as_byte(&self) -> u8 {
        0x58
    }
}

/// The `JUMPDEST` opcode marks a valid jump target and otherwise does
/// nothing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JumpDest;

impl Opcode for JumpDest {
    fn execute(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        1
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "JUMPDEST".into()
    }

    fn as_byte(&self) -> u8 {
        0x5b
    }
}

/// Performs the common body of `CALL` and `STATICCALL`: dispatch to a
/// precompile inline, or push a new frame for the callee.
fn perform_call(
    ctx: &mut Context,
    target: Word,
    value: Word,
    in_offset: Word,
    in_size: Word,
    ret_offset: Word,
    ret_size: Word,
) -> Result<()> {
    let target = target.to_address();
    let input = ctx.memory().slice(in_offset.low_u64(), in_size.low_u64());

    if precompile::is_precompile(target) {
        let output = precompile::run(target, &input)?;

        ctx.call_mut().inner_return = output.clone();
        let copied_len = output.len().min(ret_size.low_u64() as usize);
        ctx.memory_mut().set(ret_offset.low_u64(), &output[..copied_len]);

        ctx.stack_mut().push(Word::ONE);
        return Ok(());
    }

    // Fetch (and disassemble) the callee code before descending into it.
    resolver::ensure_code(ctx, target)?;

    let caller = ctx.call();
    let new_call = vm::Call {
        msg: Msg {
            data:   input,
            sender: caller.this,
            value,
            gas:    caller.msg.gas,
        },
        this: target,
        outer_return_offset: ret_offset.low_u64(),
        outer_return_size: ret_size.low_u64(),
        ..vm::Call::default()
    };
    ctx.push_call(new_call);
    Ok(())
}

/// The `CALL` opcode performs a message call into another account.
///
/// # Semantics
///
/// Pops, from the top down: gas, target, value, input offset, input size,
/// return offset, return size.
///
/// - A call with an empty input window is treated as a bare value transfer:
///   1 is pushed and execution continues without descending.
/// - A call to a precompiled contract runs it inline, copies its output into
///   the return window, and pushes 1.
/// - Otherwise a new frame is pushed; the recorded return window is honoured
///   when the callee returns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Call;

impl Opcode for Call {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let _gas = stack.pop()?;
        let target = stack.pop()?;
        let value = stack.pop()?;
        let in_offset = stack.pop()?;
        let in_size = stack.pop()?;
        let ret_offset = stack.pop()?;
        let ret_size = stack.pop()?;

        // An empty input window is a plain transfer: `addr.call{value: v}("")`.
        if in_size.is_zero() {
            // Just assume it succeeded.
            stack.push(Word::ONE);
            return Ok(());
        }

        perform_call(ctx, target, value, in_offset, in_size, ret_offset, ret_size)
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        7
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CALL".into()
    }

    fn as_byte(&self) -> u8 {
        0xf1
    }
}

/// The `DELEGATECALL` opcode runs another account's code in the current
/// account's context.
///
/// The callee observes the current frame's `this`, sender and value; only the
/// executing code changes. Storage reads and writes keep targeting the
/// calling account.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DelegateCall;

impl Opcode for DelegateCall {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let _gas = stack.pop()?;
        let target = stack.pop()?;
        let in_offset = stack.pop()?;
        let in_size = stack.pop()?;
        let ret_offset = stack.pop()?;
        let ret_size = stack.pop()?;

        let target = target.to_address();
        resolver::ensure_code(ctx, target)?;

        let input = ctx.memory().slice(in_offset.low_u64(), in_size.low_u64());
        let caller = ctx.call();
        let new_call = vm::Call {
            msg: Msg {
                data:   input,
                sender: caller.msg.sender,
                value:  caller.msg.value,
                gas:    caller.msg.gas,
            },
            // address(this) does not change under delegatecall; only the code
            // is taken from the target.
            this: caller.this,
            code_override: Some(target),
            outer_return_offset: ret_offset.low_u64(),
            outer_return_size: ret_size.low_u64(),
            ..vm::Call::default()
        };
        ctx.push_call(new_call);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        6
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "DELEGATECALL".into()
    }

    fn as_byte(&self) -> u8 {
        0xf4
    }
}

/// The `STATICCALL` opcode behaves as a `CALL` with a value of zero.
///
/// The replay interpreter does not enforce the static-context write ban; the
/// debugged contract already ran on a real chain that did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StaticCall;

impl Opcode for StaticCall {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let _gas = stack.pop()?;
        let target = stack.pop()?;
        let in_offset = stack.pop()?;
        let in_size = stack.pop()?;
        let ret_offset = stack.pop()?;
        let ret_size = stack.pop()?;

        perform_call(
            ctx,
            target,
            Word::ZERO,
            in_offset,
            in_size,
            ret_offset,
            ret_size,
        )
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        6
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "STATICCALL".into()
    }

    fn as_byte(&self) -> u8 {
        0xfa
    }
}

/// The `RETURN` opcode halts the current call, returning a window of its
/// memory.
///
/// Returning from an inner call copies the output into the window the caller
/// reserved, records it as the caller's inner return data, pops the frame and
/// pushes 1 onto the caller's stack. Returning from the outer transaction
/// marks the context as done.
///
/// # Note
///
/// On a real EVM the output copy is performed by the call opcodes when the
/// callee completes. A single-stepping debugger cannot do it there, so the
/// copy happens here instead; the observable state is the same.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Return;

impl Opcode for Return {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let offset = stack.pop()?;
        let size = stack.pop()?;
        let output = ctx.memory().slice(offset.low_u64(), size.low_u64());

        if ctx.depth() > 1 {
            let finished = ctx.pop_call()?;

            let copied_len = output.len().min(finished.outer_return_size as usize);
            ctx.memory_mut()
                .set(finished.outer_return_offset, &output[..copied_len]);
            ctx.call_mut().inner_return = output;

            ctx.stack_mut().push(Word::ONE);
        } else {
            ctx.set_done();
        }
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "RETURN".into()
    }

    fn as_byte(&self) -> u8 {
        0xf3
    }
}

/// The `REVERT` opcode aborts the transaction, surfacing the revert data to
/// the driver.
///
/// The context's `done` flag is not set; the caller may inspect or repair the
/// state and resume.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Revert;

impl Opcode for Revert {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let offset = stack.pop()?;
        let size = stack.pop()?;
        let data = ctx.memory().slice(offset.low_u64(), size.low_u64());
        Err(Error::Reverted { data })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "REVERT".into()
    }

    fn as_byte(&self) -> u8 {
        0xfd
    }
}

/// The designated invalid opcode `0xfe`, emitted by the Solidity compiler for
/// assertion failures.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Assert;

impl Opcode for Assert {
    fn execute(&self, _ctx: &mut Context) -> Result<()> {
        Err(Error::UnsupportedOpcode {
            name: "ASSERT".into(),
        })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "INVALID".into()
    }

    fn as_byte(&self) -> u8 {
        0xfe
    }
}

/// The `CREATE` opcode is not supported by the replay interpreter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Create;

impl Opcode for Create {
    fn execute(&self, _ctx: &mut Context) -> Result<()> {
        Err(Error::UnsupportedOpcode {
            name: "CREATE".into(),
        })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CREATE".into()
    }

    fn as_byte(&self) -> u8 {
        0xf0
    }
}

/// The `CREATE2` opcode is not supported by the replay interpreter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Create2;

impl Opcode for Create2 {
    fn execute(&self, _ctx: &mut Context) -> Result<()> {
        Err(Error::UnsupportedOpcode {
            name: "CREATE2".into(),
        })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CREATE2".into()
    }

    fn as_byte(&self) -> u8 {
        0xf5
    }
}

/// The `CALLCODE` opcode is not supported by the replay interpreter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallCode;

impl Opcode for CallCode {
    fn execute(&self, _ctx: &mut Context) -> Result<()> {
        Err(Error::UnsupportedOpcode {
            name: "CALLCODE".into(),
        })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CALLCODE".into()
    }

    fn as_byte(&self) -> u8 {
        0xf2
    }
}

/// The `SELFDESTRUCT` opcode is not supported by the replay interpreter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SelfDestruct;

impl Opcode for SelfDestruct {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        ctx.stack_mut().pop()?;
        Err(Error::UnsupportedOpcode {
            name: "SELFDESTRUCT".into(),
        })
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        0
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "SELFDESTRUCT".into()
    }

    fn as_byte(&self) -> u8 {
        0xff
    }
}
