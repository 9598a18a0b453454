//! This module contains the [`Opcode`] trait and the concrete implementation
//! of each opcode that the replay interpreter supports.

pub mod arithmetic;
pub mod control;
pub mod environment;
pub mod gas;
pub mod logic;
mod macros;
pub mod memory;

use std::{any::Any, fmt::Debug, rc::Rc};

use downcast_rs::{impl_downcast, Downcast};

use crate::{
    constant::{
        DUP_OPCODE_BASE_VALUE,
        LOG_OPCODE_BASE_VALUE,
        PUSH_OPCODE_BASE_VALUE,
        SWAP_OPCODE_BASE_VALUE,
    },
    error::execution::Result,
    vm::Context,
};

/// This trait forms the core of the operation table. Each supported opcode
/// implements it, providing both the static metadata (byte value, mnemonic,
/// stack arity, immediate size) and the dynamic behaviour (execution and gas
/// cost) for that opcode.
///
/// # Object Safety
///
/// This trait must remain
/// [object safe](https://doc.rust-lang.org/reference/items/traits.html#object-safety)
/// as the implementors of the trait are used through dynamic dispatch.
///
/// # Terminology
///
/// When referring to stack slots, we treat index 0 as being the top of the
/// stack.
pub trait Opcode
where
    Self: Any + Debug + Downcast,
{
    /// Executes the opcode described by `self`, modifying the state of `ctx`
    /// as necessary.
    ///
    /// In the general case an opcode does not modify the program counter; the
    /// driver advances it. The two exceptions are `JUMP` and `JUMPI`, which
    /// set the counter themselves (see [`crate::vm::Context::run`]), and the
    /// `PUSH` family, which advance it over their immediate bytes.
    ///
    /// # Errors
    ///
    /// If the state of the context does not allow execution of the opcode, or
    /// if execution would yield an invalid state.
    fn execute(&self, ctx: &mut Context) -> Result<()>;

    /// Computes the gas cost of executing this opcode against the current
    /// state of `ctx`.
    ///
    /// The driver never deducts these costs; they exist for inspection by
    /// hooks and clients of the library.
    fn gas_cost(&self, ctx: &Context) -> u64;

    /// The number of immediate bytes following the opcode in the bytecode.
    fn immediate_size(&self) -> u64 {
        0
    }

    /// The number of items the opcode pops from the stack.
    fn stack_in(&self) -> usize;

    /// The number of items the opcode pushes onto the stack.
    fn stack_out(&self) -> usize;

    /// Gets the mnemonic of the opcode to aid in debugging and display.
    fn as_text_code(&self) -> String;

    /// Gets the byte representation of the opcode.
    fn as_byte(&self) -> u8;

    /// Encodes the instruction as a sequence of bytes.
    ///
    /// # Note
    ///
    /// The default implementation delegates to [`Opcode::as_byte`], as this is
    /// the correct encoding for every opcode except the `PUSH` family.
    fn encode(&self) -> Vec<u8> {
        vec![self.as_byte()]
    }
}

impl_downcast!(Opcode);

/// A type for an [`Opcode`] that is dynamically dispatched.
pub type DynOpcode = Rc<dyn Opcode>;

/// Looks up the operation for `byte`, returning [`None`] for byte values that
/// do not encode an opcode the interpreter knows.
///
/// This is the operation table: one entry for every supported opcode from
/// `0x00` to `0xff`, including the parametric `PUSH`/`DUP`/`SWAP`/`LOG`
/// families.
#[allow(clippy::too_many_lines)] // It is a table; splitting it helps nobody
#[must_use]
pub fn for_byte(byte: u8) -> Option<DynOpcode> {
    let op: DynOpcode = match byte {
        0x00 => Rc::new(control::Stop),
        0x01 => Rc::new(arithmetic::Add),
        0x02 => Rc::new(arithmetic::Mul),
        0x03 => Rc::new(arithmetic::Sub),
        0x04 => Rc::new(arithmetic::Div),
        0x05 => Rc::new(arithmetic::SDiv),
        0x06 => Rc::new(arithmetic::Mod),
        0x07 => Rc::new(arithmetic::SMod),
        0x08 => Rc::new(arithmetic::AddMod),
        0x09 => Rc::new(arithmetic::MulMod),
        0x0a => Rc::new(arithmetic::Exp),
        0x0b => Rc::new(arithmetic::SignExtend),
        0x10 => Rc::new(logic::Lt),
        0x11 => Rc::new(logic::Gt),
        0x12 => Rc::new(logic::SLt),
        0x13 => Rc::new(logic::SGt),
        0x14 => Rc::new(logic::Eq),
        0x15 => Rc::new(logic::IsZero),
        0x16 => Rc::new(logic::And),
        0x17 => Rc::new(logic::Or),
        0x18 => Rc::new(logic::Xor),
        0x19 => Rc::new(logic::Not),
        0x1a => Rc::new(logic::Byte),
        0x1b => Rc::new(logic::Shl),
        0x1c => Rc::new(logic::Shr),
        0x1d => Rc::new(logic::Sar),
        0x20 => Rc::new(environment::Sha3),
        0x30 => Rc::new(environment::Address),
        0x31 => Rc::new(environment::Balance),
        0x32 => Rc::new(environment::Origin),
        0x33 => Rc::new(environment::Caller),
        0x34 => Rc::new(environment::CallValue),
        0x35 => Rc::new(memory::CallDataLoad),
        0x36 => Rc::new(memory::CallDataSize),
        0x37 => Rc::new(memory::CallDataCopy),
        0x38 => Rc::new(memory::CodeSize),
        0x39 => Rc::new(memory::CodeCopy),
        0x3a => Rc::new(environment::GasPrice),
        0x3b => Rc::new(memory::ExtCodeSize),
        0x3c => Rc::new(memory::ExtCodeCopy),
        0x3d => Rc::new(memory::ReturnDataSize),
        0x3e => Rc::new(memory::ReturnDataCopy),
        0x3f => Rc::new(environment::ExtCodeHash),
        0x40 => Rc::new(environment::BlockHash),
        0x41 => Rc::new(environment::CoinBase),
        0x42 => Rc::new(environment::Timestamp),
        0x43 => Rc::new(environment::Number),
        0x44 => Rc::new(environment::Difficulty),
        0x45 => Rc::new(environment::GasLimit),
        0x46 => Rc::new(environment::ChainId),
        0x47 => Rc::new(environment::SelfBalance),
        0x48 => Rc::new(environment::BaseFee),
        0x50 => Rc::new(memory::Pop),
        0x51 => Rc::new(memory::MLoad),
        0x52 => Rc::new(memory::MStore),
        0x53 => Rc::new(memory::MStore8),
        0x54 => Rc::new(memory::SLoad),
        0x55 => Rc::new(memory::SStore),
        0x56 => Rc::new(control::Jump),
        0x57 => Rc::new(control::JumpI),
        0x58 => Rc::new(control::Pc),
        0x59 => Rc::new(memory::MSize),
        0x5a => Rc::new(environment::Gas),
        0x5b => Rc::new(control::JumpDest),
        0x60..=0x7f => Rc::new(memory::PushN::from_byte(byte - PUSH_OPCODE_BASE_VALUE)),
        0x80..=0x8f => Rc::new(memory::DupN::from_byte(byte - DUP_OPCODE_BASE_VALUE)),
        0x90..=0x9f => Rc::new(memory::SwapN::from_byte(byte - SWAP_OPCODE_BASE_VALUE)),
        0xa0..=0xa4 => Rc::new(environment::LogN::from_byte(byte - LOG_OPCODE_BASE_VALUE)),
        0xf0 => Rc::new(control::Create),
        0xf1 => Rc::new(control::Call),
        0xf2 => Rc::new(control::CallCode),
        0xf3 => Rc::new(control::Return),
        0xf4 => Rc::new(control::DelegateCall),
        0xf5 => Rc::new(control::Create2),
        0xfa => Rc::new(control::StaticCall),
        0xfd => Rc::new(control::Revert),
        0xfe => Rc::new(control::Assert),
        0xff => Rc::new(control::SelfDestruct),
        _ => return None,
    };
    Some(op)
}

/// Gets the mnemonic for `byte`, falling back to an `INVALID` rendering for
/// byte values outside the operation table.
#[must_use]
pub fn text_code(byte: u8) -> String {
    for_byte(byte).map_or_else(|| format!("INVALID({byte:#04x})"), |op| op.as_text_code())
}


#[cfg(test)]
mod test {
    use crate::opcode;

    #[test]
    fn table_covers_the_berlin_opcode_set() {
        // Spot checks across every family.
        for byte in [
            0x00u8, 0x01, 0x0b, 0x10, 0x1d, 0x20, 0x30, 0x48, 0x50, 0x5b, 0x60, 0x7f, 0x80,
            0x8f, 0x90, 0x9f, 0xa0, 0xa4, 0xf0, 0xf1, 0xf3, 0xf4, 0xfa, 0xfd, 0xfe, 0xff,
        ] {
            let op = opcode::for_byte(byte).expect("opcode missing from table");
            assert_eq!(op.as_byte(), byte);
        }
    }

    #[test]
    fn unknown_bytes_are_absent() {
        for byte in [0x0cu8, 0x0f, 0x1e, 0x21, 0x49, 0x5c, 0x5f, 0xa5, 0xef, 0xfb] {
            assert!(opcode::for_byte(byte).is_none());
        }
    }

    #[test]
    fn parametric_opcodes_know_their_parameters() {
        let push4 = opcode::for_byte(0x63).unwrap();
        assert_eq!(push4.immediate_size(), 4);
        assert_eq!(push4.as_text_code(), "PUSH4");

        let dup16 = opcode::for_byte(0x8f).unwrap();
        assert_eq!(dup16.as_text_code(), "DUP16");

        let log2 = opcode::for_byte(0xa2).unwrap();
        assert_eq!(log2.stack_in(), 4);
    }

    #[test]
    fn text_code_falls_back_for_unknown_bytes() {
        assert_eq!(opcode::text_code(0x01), "ADD");
        assert_eq!(opcode::text_code(0x0c), "INVALID(0x0c)");
    }

    #[test]
    fn bytecode_macro_assembles_runnable_programs() -> anyhow::Result<()> {
        use crate::{
            bytecode,
            opcode::{arithmetic, control, memory, test_util},
            vm::value::Word,
        };

        let code = bytecode![
            memory::PushN::new(1, vec![0x03]).unwrap(),
            memory::PushN::new(1, vec![0x04]).unwrap(),
            arithmetic::Add,
            control::Stop,
        ];
        assert_eq!(code, vec![0x60, 0x03, 0x60, 0x04, 0x01, 0x00]);

        let mut ctx = test_util::new_context_with_code_and_stack(code, vec![])?;
        ctx.run(-1)?;
        assert!(ctx.done);
        assert_eq!(*ctx.stack().peek()?, Word::from(7u64));
        Ok(())
    }
}
