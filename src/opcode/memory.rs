//! Opcodes that interact with the various data locations available to an
//! execution: call data, code, return data, transient memory, persistent
//! storage and the stack itself.

use crate::{
    constant::{
        DUP_OPCODE_BASE_VALUE,
        PUSH_OPCODE_BASE_VALUE,
        PUSH_OPCODE_MAX_BYTES,
        SWAP_OPCODE_BASE_VALUE,
    },
    error::{
        disassembly,
        execution::{Error, Result},
    },
    opcode::{gas, Opcode},
    resolver,
    vm::{value::Word, Context},
};

/// Reads `size` bytes from `data` starting at `start`, zero-padded on the
/// right past the end of the buffer. Overflow safe.
fn get_data(data: &[u8], start: u64, size: u64) -> Vec<u8> {
    let length = data.len() as u64;
    let start = start.min(length);
    let end = start.saturating_add(size).min(length);

    let mut out = data[start as usize..end as usize].to_vec();
    out.resize(size as usize, 0);
    out
}

/// The `CALLDATALOAD` opcode reads a 32-byte word from the message data.
///
/// # Semantics
///
/// | Stack Index | Input  | Output                        |
/// | :---------: | :----: | :---------------------------: |
/// | 1           | offset | msg.data\[offset..offset+32\] |
///
/// Reads past the end of the data are zero-padded, and an offset that does
/// not fit in 64 bits produces zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallDataLoad;

impl Opcode for CallDataLoad {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let offset = ctx.stack_mut().pop()?;
        let value = match offset.to_u64() {
            Some(offset) => Word::from_be_slice(&get_data(&ctx.msg().data, offset, 32)),
            None => Word::ZERO,
        };
        ctx.stack_mut().push(value);
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
        "CALLDATALOAD".into()
    }

    fn as_byte(&self) -> u8 {
        0x35
    }
}

/// The `CALLDATASIZE` opcode pushes the length of the message data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallDataSize;

impl Opcode for CallDataSize {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let size = ctx.msg().data.len();
        ctx.stack_mut().push(Word::from(size));
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
        "CALLDATASIZE".into()
    }

    fn as_byte(&self) -> u8 {
        0x36
    }
}

/// The `CALLDATACOPY` opcode copies a window of the message data into
/// memory, zero-padding reads past the end of the data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallDataCopy;

impl Opcode for CallDataCopy {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let mem_offset = stack.pop()?;
        let data_offset = stack.pop()?;
        let length = stack.pop()?;

        let data_offset = data_offset.to_u64().unwrap_or(u64::MAX);
        let copied = get_data(&ctx.msg().data, data_offset, length.low_u64());
        ctx.memory_mut().set(mem_offset.low_u64(), &copied);
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::copy_cost(ctx, 3, 0, 2)
    }

    fn stack_in(&self) -> usize {
        3
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CALLDATACOPY".into()
    }

    fn as_byte(&self) -> u8 {
        0x37
    }
}

/// The `CODESIZE` opcode pushes the length of the currently executing code.
///
/// Under `DELEGATECALL` this is the length of the code actually running, not
/// of the calling account's own code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CodeSize;

impl Opcode for CodeSize {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let address = ctx.call().code_address();
        let code = resolver::ensure_code(ctx, address)?;
        ctx.stack_mut().push(Word::from(code.len()));
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
        "CODESIZE".into()
    }

    fn as_byte(&self) -> u8 {
        0x38
    }
}

/// The `CODECOPY` opcode copies a window of the currently executing code into
/// memory, zero-padded past the end of the code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CodeCopy;

impl Opcode for CodeCopy {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let mem_offset = stack.pop()?;
        let code_offset = stack.pop()?;
        let length = stack.pop()?;

        let code_offset = code_offset.to_u64().unwrap_or(u64::MAX);
        let address = ctx.call().code_address();
        let code = resolver::ensure_code(ctx, address)?;

        let copied = get_data(&code, code_offset, length.low_u64());
        ctx.memory_mut().set(mem_offset.low_u64(), &copied);
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::copy_cost(ctx, 3, 0, 2)
    }

    fn stack_in(&self) -> usize {
        3
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "CODECOPY".into()
    }

    fn as_byte(&self) -> u8 {
        0x39
    }
}

/// The `EXTCODESIZE` opcode pushes the length of the target account's code,
/// fetching it through the resolver on a cache miss.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtCodeSize;

impl Opcode for ExtCodeSize {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let target = ctx.stack_mut().pop()?.to_address();
        let code = resolver::ensure_code(ctx, target)?;
        ctx.stack_mut().push(Word::from(code.len()));
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        700
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "EXTCODESIZE".into()
    }

    fn as_byte(&self) -> u8 {
        0x3b
    }
}

/// The `EXTCODECOPY` opcode copies a window of another account's code into
/// memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtCodeCopy;

impl Opcode for ExtCodeCopy {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let target = stack.pop()?.to_address();
        let mem_offset = stack.pop()?;
        let code_offset = stack.pop()?;
        let length = stack.pop()?;

        let code_offset = code_offset.to_u64().unwrap_or(u64::MAX);
        let code = resolver::ensure_code(ctx, target)?;

        let copied = get_data(&code, code_offset, length.low_u64());
        ctx.memory_mut().set(mem_offset.low_u64(), &copied);
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::copy_cost(ctx, 700, 1, 3)
    }

    fn stack_in(&self) -> usize {
        4
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "EXTCODECOPY".into()
    }

    fn as_byte(&self) -> u8 {
        0x3c
    }
}

/// The `RETURNDATASIZE` opcode pushes the length of the return data from the
/// most recent inner call.
///
/// Before any inner call has returned, the return buffer is empty and the
/// opcode pushes zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReturnDataSize;

impl Opcode for ReturnDataSize {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let size = ctx.call().inner_return.len();
        ctx.stack_mut().push(Word::from(size));
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
        "RETURNDATASIZE".into()
    }

    fn as_byte(&self) -> u8 {
        0x3d
    }
}

/// The `RETURNDATACOPY` opcode copies a window of the most recent inner
/// call's return data into memory.
///
/// # Errors
///
/// Unlike the other copy opcodes, reads past the end of the return data are
/// an error rather than zero-padded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReturnDataCopy;

impl Opcode for ReturnDataCopy {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let mem_offset = stack.pop()?;
        let data_offset = stack.pop()?;
        let length = stack.pop()?;

        let available = ctx.call().inner_return.len();
        let out_of_bounds = |offset: u64, end: u64| Error::ReturnDataOutOfBounds {
            offset,
            end,
            available,
        };

        let offset = data_offset.to_u64().ok_or(out_of_bounds(u64::MAX, u64::MAX))?;
        let end = data_offset.wrapping_add(length);
        let end = end
            .to_u64()
            .filter(|end| *end <= available as u64)
            .ok_or(out_of_bounds(offset, offset.saturating_add(length.low_u64())))?;

        let copied = ctx.call().inner_return[offset as usize..end as usize].to_vec();
        ctx.memory_mut().set(mem_offset.low_u64(), &copied);
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::copy_cost(ctx, 3, 0, 2)
    }

    fn stack_in(&self) -> usize {
        3
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "RETURNDATACOPY".into()
    }

    fn as_byte(&self) -> u8 {
        0x3e
    }
}

/// The `POP` opcode discards the top of the stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pop;

impl Opcode for Pop {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        ctx.stack_mut().pop()?;
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        2
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "POP".into()
    }

    fn as_byte(&self) -> u8 {
        0x50
    }
}

/// The `MLOAD` opcode reads the 32-byte word at the given memory offset,
/// zero-padded past the end of the memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MLoad;

impl Opcode for MLoad {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let offset = ctx.stack_mut().pop()?;
        let value = ctx.memory().word_at(offset.low_u64());
        ctx.stack_mut().push(value);
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
        "MLOAD".into()
    }

    fn as_byte(&self) -> u8 {
        0x51
    }
}

/// The `MSTORE` opcode writes a 32-byte word at the given memory offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MStore;

impl Opcode for MStore {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let offset = stack.pop()?;
        let value = stack.pop()?;
        ctx.memory_mut().set_word(offset.low_u64(), value);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "MSTORE".into()
    }

    fn as_byte(&self) -> u8 {
        0x52
    }
}

/// The `MSTORE8` opcode writes the low byte of its value operand at the given
/// memory offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MStore8;

impl Opcode for MStore8 {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let offset = stack.pop()?;
        let value = stack.pop()?;
        ctx.memory_mut().set(offset.low_u64(), &[value.low_u64() as u8]);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "MSTORE8".into()
    }

    fn as_byte(&self) -> u8 {
        0x53
    }
}

/// The `MSIZE` opcode pushes the current size of the memory in bytes, which
/// is always a multiple of 32.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MSize;

impl Opcode for MSize {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let size = ctx.memory().len();
        ctx.stack_mut().push(Word::from(size));
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
        "MSIZE".into()
    }

    fn as_byte(&self) -> u8 {
        0x59
    }
}

/// The `SLOAD` opcode reads a word from the executing account's persistent
/// storage.
///
/// A slot missing from the local cache is fetched through the environment
/// resolver at the pre-state block and cached. Under `DELEGATECALL` the
/// storage read belongs to the calling account.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SLoad;

impl Opcode for SLoad {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let slot = ctx.stack_mut().pop()?;
        let this = ctx.this();
        let value = resolver::ensure_storage(ctx, this, slot)?;
        ctx.stack_mut().push(value);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        800
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SLOAD".into()
    }

    fn as_byte(&self) -> u8 {
        0x54
    }
}

/// The `SSTORE` opcode writes a word into the executing account's persistent
/// storage, creating the slot unconditionally.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SStore;

impl Opcode for SStore {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let slot = stack.pop()?;
        let value = stack.pop()?;
        ctx.contract_mut().storage.insert(slot, value);
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::sstore_cost(ctx)
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        "SSTORE".into()
    }

    fn as_byte(&self) -> u8 {
        0x55
    }
}

/// The `PUSH1` through `PUSH32` opcodes read `n` immediate bytes from the
/// code and push them as a big-endian word.
///
/// The opcode advances the program counter over its immediate bytes itself;
/// the driver adds the final `+1` for the opcode byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PushN {
    byte_count: u8,
    bytes:      Vec<u8>,
}

impl PushN {
    /// Construct a new instance of the `PUSHN` opcode for some `n`, carrying
    /// the provided big-endian immediate `bytes`.
    ///
    /// The carried bytes only matter for [`Opcode::encode`]; during execution
    /// the immediate is always read from the live code buffer.
    ///
    /// # Errors
    ///
    /// If `n` is not in the range `1..=32` or `bytes` is not `n` bytes long.
    pub fn new(n: u8, bytes: impl Into<Vec<u8>>) -> disassembly::Result<Self> {
        let bytes: Vec<u8> = bytes.into();
        if n > 0 && n <= PUSH_OPCODE_MAX_BYTES && bytes.len() == n as usize {
            Ok(Self {
                byte_count: n,
                bytes,
            })
        } else {
            Err(disassembly::Error::InvalidPushSize(n))
        }
    }

    /// Constructs the opcode directly from the offset past the `PUSH` base
    /// byte, which the operation table guarantees to be in range.
    #[must_use]
    pub(crate) fn from_byte(byte_count: u8) -> Self {
        Self {
            byte_count,
            bytes: vec![],
        }
    }

    /// Gets the number of immediate bytes this push consumes.
    #[must_use]
    pub fn byte_size(&self) -> u8 {
        self.byte_count
    }
}

impl Opcode for PushN {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let n = u64::from(self.byte_count);
        let pc = ctx.pc();

        let immediate = {
            let code = ctx.code()?.bytes();
            if pc + 1 + n > code.len() as u64 {
                return Err(Error::PushOutOfCode { pc });
            }
            code[(pc + 1) as usize..(pc + 1 + n) as usize].to_vec()
        };

        ctx.stack_mut().push(Word::from_be_slice(&immediate));
        // Skip over the immediate; the driver adds one more for the opcode
        // byte itself.
        ctx.call_mut().pc += n;
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn immediate_size(&self) -> u64 {
        u64::from(self.byte_count)
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        format!("PUSH{}", self.byte_count)
    }

    fn as_byte(&self) -> u8 {
        PUSH_OPCODE_BASE_VALUE + self.byte_count
    }

    fn encode(&self) -> Vec<u8> {
        let mut encoding = vec![self.as_byte()];
        encoding.extend(&self.bytes);
        encoding
    }
}

/// The `DUP1` through `DUP16` opcodes duplicate the `n`-th stack item onto
/// the top of the stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DupN {
    item: u8,
}

impl DupN {
    /// Constructs a new instance of the `DUPN` opcode.
    ///
    /// # Errors
    ///
    /// If the provided `n` is not in the range `1..=16`.
    pub fn new(n: u8) -> disassembly::Result<Self> {
        if n > 0 && n <= 16 {
            Ok(Self { item: n })
        } else {
            Err(disassembly::Error::InvalidStackItem {
                item: n,
                name: "DUP".into(),
            })
        }
    }

    /// Constructs the opcode directly from the offset past the `DUP` base
    /// byte, which the operation table guarantees to be in range.
    #[must_use]
    pub(crate) fn from_byte(item: u8) -> Self {
        Self { item }
    }

    /// Gets the stack item that this opcode duplicates.
    #[must_use]
    pub fn n(&self) -> u8 {
        self.item
    }
}

impl Opcode for DupN {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        ctx.stack_mut().dup(self.item as usize)
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        format!("DUP{}", self.item)
    }

    fn as_byte(&self) -> u8 {
        DUP_OPCODE_BASE_VALUE + self.item
    }
}

/// The `SWAP1` through `SWAP16` opcodes exchange the top of the stack with
/// the item `n` positions below it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SwapN {
    item: u8,
}

impl SwapN {
    /// Constructs a new instance of the `SWAPN` opcode.
    ///
    /// # Errors
    ///
    /// If the provided `n` is not in the range `1..=16`.
    pub fn new(n: u8) -> disassembly::Result<Self> {
        if n > 0 && n <= 16 {
            Ok(Self { item: n })
        } else {
            Err(disassembly::Error::InvalidStackItem {
                item: n,
                name: "SWAP".into(),
            })
        }
    }

    /// Constructs the opcode directly from the offset past the `SWAP` base
    /// byte, which the operation table guarantees to be in range.
    #[must_use]
    pub(crate) fn from_byte(item: u8) -> Self {
        Self { item }
    }

    /// Gets the depth of the stack item that this opcode swaps with.
    #[must_use]
    pub fn n(&self) -> u8 {
        self.item
    }
}

impl Opcode for SwapN {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        ctx.stack_mut().swap(self.item as usize)
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        3
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        format!("SWAP{}", self.item)
    }

    fn as_byte(&self) -> u8 {
        SWAP_OPCODE_BASE_VALUE + self.item
    }
}
