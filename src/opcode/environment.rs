//! Opcodes that read the transaction, block and account environment of the
//! execution.

use crate::{
    constant::BLOCKHASH_WINDOW,
    error::{
        disassembly,
        execution::Result,
    },
    opcode::{gas, Opcode},
    utility,
    vm::{value::Word, Context},
};

/// The `SHA3` opcode hashes a region of memory with keccak-256 and pushes the
/// digest.
///
/// # Semantics
///
/// | Stack Index | Input  | Output                             |
/// | :---------: | :----: | :--------------------------------: |
/// | 1           | offset | keccak256(mem\[offset..offset+size\]) |
/// | 2           | size   |                                    |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sha3;

impl Opcode for Sha3 {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        let offset = stack.pop()?;
        let size = stack.pop()?;

        let data = ctx.memory().slice(offset.low_u64(), size.low_u64());
        let digest = utility::keccak256(&data);

        ctx.stack_mut().push(Word::from_be_slice(&digest));
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::sha3_cost(ctx)
    }

    fn stack_in(&self) -> usize {
        2
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SHA3".into()
    }

    fn as_byte(&self) -> u8 {
        0x20
    }
}

/// The `ADDRESS` opcode pushes the address of the currently executing
/// account.
///
/// Under `DELEGATECALL` this remains the caller's account, not the account
/// whose code is running.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Address;

impl Opcode for Address {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let this = ctx.this();
        ctx.stack_mut().push(this.to_word());
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
        "ADDRESS".into()
    }

    fn as_byte(&self) -> u8 {
        0x30
    }
}

/// The `BALANCE` opcode pushes the balance of the target account, fetching it
/// through the environment resolver (at the pre-state block) when the local
/// cache misses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Balance;

impl Opcode for Balance {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let target = ctx.stack_mut().pop()?.to_address();
        let balance = crate::resolver::ensure_balance(ctx, target)?;
        ctx.stack_mut().push(balance);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        20
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "BALANCE".into()
    }

    fn as_byte(&self) -> u8 {
        0x31
    }
}

/// The `ORIGIN` opcode pushes the externally owned account that signed the
/// transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Origin;

impl Opcode for Origin {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let origin = ctx.tx.origin;
        ctx.stack_mut().push(origin.to_word());
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
        "ORIGIN".into()
    }

    fn as_byte(&self) -> u8 {
        0x32
    }
}

/// The `CALLER` opcode pushes the immediate sender of the current call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Caller;

impl Opcode for Caller {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let sender = ctx.msg().sender;
        ctx.stack_mut().push(sender.to_word());
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
        "CALLER".into()
    }

    fn as_byte(&self) -> u8 {
        0x33
    }
}

/// The `CALLVALUE` opcode pushes the value deposited with the current call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallValue;

impl Opcode for CallValue {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let value = ctx.msg().value;
        ctx.stack_mut().push(value);
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
        "CALLVALUE".into()
    }

    fn as_byte(&self) -> u8 {
        0x34
    }
}

/// The `GASPRICE` opcode pushes the gas price of the transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GasPrice;

impl Opcode for GasPrice {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let price = ctx.tx.gas_price;
        ctx.stack_mut().push(Word::from(price));
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
        "GASPRICE".into()
    }

    fn as_byte(&self) -> u8 {
        0x3a
    }
}

/// The `EXTCODEHASH` opcode pushes the keccak-256 hash of the target
/// account's code, fetching the code through the resolver on a cache miss.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtCodeHash;

impl Opcode for ExtCodeHash {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let target = ctx.stack_mut().pop()?.to_address();
        let code = crate::resolver::ensure_code(ctx, target)?;
        let digest = utility::keccak256(&code);
        ctx.stack_mut().push(Word::from_be_slice(&digest));
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
        "EXTCODEHASH".into()
    }

    fn as_byte(&self) -> u8 {
        0x3f
    }
}

/// The `BLOCKHASH` opcode pushes the hash of one of the 256 most recent
/// blocks, or zero for a block number outside that window.
///
/// In-window hashes are served from the local cache, falling back to the
/// environment resolver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockHash;

impl Opcode for BlockHash {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let requested = ctx.stack_mut().pop()?;

        let upper = ctx.block.number;
        let lower = upper.saturating_sub(BLOCKHASH_WINDOW);

        let result = match requested.to_u64() {
            Some(number) if number >= lower && number < upper => {
                crate::resolver::ensure_block_hash(ctx, number)?
            }
            _ => Word::ZERO,
        };
        ctx.stack_mut().push(result);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        20
    }

    fn stack_in(&self) -> usize {
        1
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "BLOCKHASH".into()
    }

    fn as_byte(&self) -> u8 {
        0x40
    }
}

/// The `COINBASE` opcode pushes the beneficiary address of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CoinBase;

impl Opcode for CoinBase {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let coinbase = ctx.block.coinbase;
        ctx.stack_mut().push(coinbase.to_word());
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
        "COINBASE".into()
    }

    fn as_byte(&self) -> u8 {
        0x41
    }
}

/// The `TIMESTAMP` opcode pushes the timestamp of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timestamp;

impl Opcode for Timestamp {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let timestamp = ctx.block.timestamp;
        ctx.stack_mut().push(Word::from(timestamp));
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
        "TIMESTAMP".into()
    }

    fn as_byte(&self) -> u8 {
        0x42
    }
}

/// The `NUMBER` opcode pushes the number of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Number;

impl Opcode for Number {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let number = ctx.block.number;
        ctx.stack_mut().push(Word::from(number));
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
        "NUMBER".into()
    }

    fn as_byte(&self) -> u8 {
        0x43
    }
}

/// The `DIFFICULTY` opcode pushes the difficulty of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Difficulty;

impl Opcode for Difficulty {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let difficulty = ctx.block.difficulty;
        ctx.stack_mut().push(Word::from(difficulty));
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
        "DIFFICULTY".into()
    }

    fn as_byte(&self) -> u8 {
        0x44
    }
}

/// The `GASLIMIT` opcode pushes the gas limit of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GasLimit;

impl Opcode for GasLimit {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let limit = ctx.block.gas_limit;
        ctx.stack_mut().push(Word::from(limit));
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
        "GASLIMIT".into()
    }

    fn as_byte(&self) -> u8 {
        0x45
    }
}

/// The `CHAINID` opcode pushes the identifier of the chain the transaction
/// executes on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChainId;

impl Opcode for ChainId {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let id = ctx.chain.id;
        ctx.stack_mut().push(Word::from(id));
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
        "CHAINID".into()
    }

    fn as_byte(&self) -> u8 {
        0x46
    }
}

/// The `SELFBALANCE` opcode pushes the balance of the currently executing
/// account, resolving it lazily like `BALANCE`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SelfBalance;

impl Opcode for SelfBalance {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let this = ctx.this();
        let balance = crate::resolver::ensure_balance(ctx, this)?;
        ctx.stack_mut().push(balance);
        Ok(())
    }

    fn gas_cost(&self, _ctx: &Context) -> u64 {
        5
    }

    fn stack_in(&self) -> usize {
        0
    }

    fn stack_out(&self) -> usize {
        1
    }

    fn as_text_code(&self) -> String {
        "SELFBALANCE".into()
    }

    fn as_byte(&self) -> u8 {
        0x47
    }
}

/// The `BASEFEE` opcode pushes the base fee of the current block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BaseFee;

impl Opcode for BaseFee {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let base_fee = ctx.block.base_fee;
        ctx.stack_mut().push(Word::from(base_fee));
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
        "BASEFEE".into()
    }

    fn as_byte(&self) -> u8 {
        0x48
    }
}

/// The `GAS` opcode pushes the gas remaining for the current message.
///
/// The replay driver does not deduct gas, so this is simply the gas the
/// message was given.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Gas;

impl Opcode for Gas {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let gas = ctx.msg().gas;
        ctx.stack_mut().push(Word::from(gas));
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
        "GAS".into()
    }

    fn as_byte(&self) -> u8 {
        0x5a
    }
}

/// The `LOG0` through `LOG4` opcodes emit a log record with `n` topics.
///
/// The replay interpreter consumes the operands without recording the event;
/// the symbolic tracer reconstructs logs at a higher level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LogN {
    topic_count: u8,
}

impl LogN {
    /// Constructs a new instance of the `LOGN` opcode for `topic_count`
    /// topics.
    ///
    /// # Errors
    ///
    /// If `topic_count` exceeds the maximum of four topics.
    pub fn new(topic_count: u8) -> disassembly::Result<Self> {
        if topic_count <= 4 {
            Ok(Self { topic_count })
        } else {
            Err(disassembly::Error::InvalidTopicCount(topic_count))
        }
    }

    /// Constructs the opcode directly from the offset past the `LOG` base
    /// byte, which the operation table guarantees to be in range.
    #[must_use]
    pub(crate) fn from_byte(topic_count: u8) -> Self {
        Self { topic_count }
    }

    /// Gets the number of topics this log records.
    #[must_use]
    pub fn n(&self) -> u8 {
        self.topic_count
    }
}

impl Opcode for LogN {
    fn execute(&self, ctx: &mut Context) -> Result<()> {
        let stack = ctx.stack_mut();
        // Offset and size of the logged data, then one word per topic.
        stack.pop()?;
        stack.pop()?;
        for _ in 0..self.topic_count {
            stack.pop()?;
        }
        Ok(())
    }

    fn gas_cost(&self, ctx: &Context) -> u64 {
        gas::log_cost(ctx, u64::from(self.topic_count))
    }

    fn stack_in(&self) -> usize {
        2 + self.topic_count as usize
    }

    fn stack_out(&self) -> usize {
        0
    }

    fn as_text_code(&self) -> String {
        format!("LOG{}", self.topic_count)
    }

    fn as_byte(&self) -> u8 {
        crate::constant::LOG_OPCODE_BASE_VALUE + self.topic_count
    }
}

#[cfg(test)]
mod test {
    use crate::{
        opcode::{environment, test_util, Opcode},
        vm::value::Word,
    };

    #[test]
    fn sha3_hashes_the_addressed_memory() -> anyhow::Result<()> {
        let mut ctx = test_util::new_context_with_stack(vec![
            Word::from(32u64), // size
            Word::ZERO,        // offset
        ])?;
        ctx.memory_mut().set_word(0, Word::ONE);
        environment::Sha3.execute(&mut ctx)?;

        // keccak256 of a 32-byte big-endian one; the well-known slot-zero
        // mapping constant.
        assert_eq!(
            ctx.stack().peek()?.to_string(),
            "0xb10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6"
        );
        Ok(())
    }

    #[test]
    fn log_consumes_data_window_and_topics() -> anyhow::Result<()> {
        let mut ctx = test_util::new_context_with_stack(vec![
            Word::from(0xaau64), // topic 2
            Word::from(0xbbu64), // topic 1
            Word::from(32u64),   // size
            Word::ZERO,          // offset
        ])?;
        environment::LogN::new(2)?.execute(&mut ctx)?;
        assert!(ctx.stack().is_empty());
        Ok(())
    }

    #[test]
    fn blockhash_outside_window_is_zero() -> anyhow::Result<()> {
        let mut ctx = test_util::new_context_with_stack(vec![Word::from(100u64)])?;
        ctx.block.number = 1000;
        environment::BlockHash.execute(&mut ctx)?;
        assert_eq!(*ctx.stack().peek()?, Word::ZERO);
        Ok(())
    }

    #[test]
    fn blockhash_in_window_reads_the_cache() -> anyhow::Result<()> {
        let mut ctx = test_util::new_context_with_stack(vec![Word::from(999u64)])?;
        ctx.block.number = 1000;
        let hash = Word::from_hex_str("0xabcdef").unwrap();
        ctx.block_hashes.insert(999, hash);
        environment::BlockHash.execute(&mut ctx)?;
        assert_eq!(*ctx.stack().peek()?, hash);
        Ok(())
    }
}
