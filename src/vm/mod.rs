//! This module contains the replay interpreter's core: the [`Context`] that
//! owns all execution state for a single transaction replay, and the driver
//! loop that steps bytecode under the observation of the hook chain.

pub mod call;
pub mod memory;
pub mod precompile;
pub mod stack;
pub mod value;

use std::{collections::HashMap, fs, path::Path, rc::Rc};

pub use call::{Call, Msg};
pub use memory::Memory;
use serde::{Deserialize, Serialize};
pub use stack::Stack;

use crate::{
    contract::{Code, Contract},
    disassembly::Line,
    error::{
        container::Locatable,
        execution::{self, LocatedError},
        persistence,
        resolution,
    },
    hook::{HookRegistry, Hooks, PersistedHook},
    resolver::DynNodeClient,
    vm::value::{Address, Word},
};

/// The chain a replayed transaction executed on.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Chain {
    /// The chain identifier, as reported by the `CHAINID` opcode.
    pub id: u64,

    /// The URL of the archive node used for lazy state resolution, when one
    /// is configured. Persisted so a reloaded context knows where to
    /// reconnect.
    pub node_url: String,
}

/// The metadata of the transaction being replayed.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Tx {
    /// The transaction hash, when the context was built from a live
    /// transaction.
    pub hash: Option<Word>,

    /// The externally owned account that signed the transaction.
    pub origin: Address,

    /// The gas price of the transaction.
    pub gas_price: u64,
}

/// The block environment of the transaction being replayed.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Block {
    /// The block number.
    pub number: u64,

    /// The block timestamp.
    pub timestamp: u64,

    /// The block difficulty.
    pub difficulty: u64,

    /// The block's beneficiary address.
    pub coinbase: Address,

    /// The block gas limit.
    pub gas_limit: u64,

    /// The block base fee.
    pub base_fee: u64,
}

/// The complete execution state for a single transaction replay.
///
/// A context is driven by [`Context::run`] (or [`Context::step`]) from a
/// single thread; hooks observe each instruction and may pause execution by
/// returning the distinguished breakpoint error.
#[derive(Debug, Default)]
pub struct Context {
    /// Whether the outer transaction has completed. Fatal errors do not set
    /// this; a faulted context remains resumable.
    pub done: bool,

    /// The chain configuration.
    pub chain: Chain,

    /// The transaction metadata.
    pub tx: Tx,

    /// The block environment.
    pub block: Block,

    /// Every account the replay has touched, keyed by address. Contracts are
    /// created lazily the first time any opcode references them.
    pub contracts: HashMap<Address, Contract>,

    /// The stack of live invocation frames. The bottom frame is the outer
    /// transaction and exists for the whole lifetime of the context.
    pub call_stack: Stack<Call>,

    /// The ordered chain of observer hooks.
    pub hooks: Hooks,

    /// The cache of block hashes served to `BLOCKHASH`, keyed by block
    /// number.
    pub block_hashes: HashMap<u64, Word>,

    /// The archive-node client used for lazy state resolution, when
    /// attached.
    client: Option<DynNodeClient>,
}

impl Context {
    /// Creates an empty context whose call stack holds the outer transaction
    /// frame.
    #[must_use]
    pub fn new() -> Self {
        let mut ctx = Self::default();
        ctx.call_stack.push(Call::default());
        ctx
    }

    /// Creates the built-in demonstration context: a small storage contract
    /// with two slots preloaded and call data selecting its getter.
    #[must_use]
    pub fn sample() -> Self {
        let mut ctx = Self::new();

        let mut contract = Contract::new();
        contract.code.set(
            hex::decode(SAMPLE_CONTRACT_HEX).expect("the sample bytecode is valid hex"),
        );
        contract.storage.insert(Word::ZERO, Word::ONE);
        contract
            .storage
            .insert(Word::from(0xc0feeu64), Word::from(0xdeadu64));
        ctx.contracts.insert(ctx.this(), contract);

        ctx.msg_mut().data = hex::decode("3bc5de30").expect("the sample selector is valid hex");
        ctx
    }

    /// Runs the interpreter.
    ///
    /// A positive `steps` executes that many instructions; a negative value
    /// runs until the transaction completes or an error surfaces.
    ///
    /// On the very first iteration of each `run` call, errors from the
    /// pre-instruction hooks are ignored so that resuming from a breakpoint
    /// does not immediately re-trigger the same breakpoint. Later iterations
    /// surface them, as do post-instruction hook errors always.
    ///
    /// # Errors
    ///
    /// Any execution, hook or resolution error, located at the program
    /// counter of the faulting instruction. A [`LocatedError::is_breakpoint`]
    /// error is recoverable by calling `run` again.
    pub fn run(&mut self, mut steps: i64) -> std::result::Result<(), LocatedError> {
        let mut is_first_step = true;

        while steps != 0 && !self.done {
            let pc = self.pc();
            let line = self.line().locate(pc)?;
            let op = line.op.clone();

            // 1. Run hooks before executing the current line.
            let pre_result = self.with_hooks(|hooks, ctx| hooks.pre_run_all(ctx, &line));
            if let Err(error) = pre_result {
                if !is_first_step {
                    return Err(error.locate(pc));
                }
            }
            is_first_step = false;

            op.execute(self).map_err(|e| e.locate(pc))?;

            // The jumps set the program counter themselves, including the
            // fall-through branch of JUMPI; everything else gets the +1 for
            // the opcode byte here.
            if !matches!(op.as_byte(), 0x56 | 0x57) {
                self.call_mut().pc += 1;
            }

            // 2. Run hooks after executing the current line.
            self.with_hooks(|hooks, ctx| hooks.post_run_all(ctx, &line))
                .map_err(|e| e.locate(pc))?;

            steps -= 1;
        }
        Ok(())
    }

    /// Executes a single instruction.
    ///
    /// # Errors
    ///
    /// As for [`Context::run`].
    pub fn step(&mut self) -> std::result::Result<(), LocatedError> {
        self.run(1)
    }

    /// Temporarily detaches the hook chain so it can observe `self` without
    /// aliasing it.
    fn with_hooks<R>(&mut self, f: impl FnOnce(&mut Hooks, &Context) -> R) -> R {
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = f(&mut hooks, self);
        self.hooks = hooks;
        result
    }

    /// Gets the current (innermost) call frame.
    #[must_use]
    pub fn call(&self) -> &Call {
        self.call_stack
            .peek()
            .expect("the call stack always holds the outer transaction frame")
    }

    /// Gets the current call frame mutably.
    pub fn call_mut(&mut self) -> &mut Call {
        self.call_stack
            .peek_at_mut(0)
            .expect("the call stack always holds the outer transaction frame")
    }

    /// Pushes a new invocation frame, as the call opcodes do when descending
    /// into a callee.
    pub fn push_call(&mut self, call: Call) {
        self.call_stack.push(call);
    }

    /// Pops the innermost invocation frame, returning it.
    ///
    /// # Errors
    ///
    /// If only the outer transaction frame remains; that frame is never
    /// popped.
    pub fn pop_call(&mut self) -> execution::Result<Call> {
        if self.depth() <= 1 {
            return Err(execution::Error::StackUnderflow);
        }
        self.call_stack.pop()
    }

    /// Gets the current call depth; 1 while only the outer transaction frame
    /// is live.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Gets the operand stack of the current frame.
    #[must_use]
    pub fn stack(&self) -> &Stack<Word> {
        &self.call().stack
    }

    /// Gets the operand stack of the current frame mutably.
    pub fn stack_mut(&mut self) -> &mut Stack<Word> {
        &mut self.call_mut().stack
    }

    /// Gets the memory of the current frame.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.call().memory
    }

    /// Gets the memory of the current frame mutably.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.call_mut().memory
    }

    /// Gets the message of the current frame.
    #[must_use]
    pub fn msg(&self) -> &Msg {
        &self.call().msg
    }

    /// Gets the message of the current frame mutably.
    pub fn msg_mut(&mut self) -> &mut Msg {
        &mut self.call_mut().msg
    }

    /// Gets `address(this)` of the current frame.
    #[must_use]
    pub fn this(&self) -> Address {
        self.call().this
    }

    /// Gets the program counter of the current frame.
    #[must_use]
    pub fn pc(&self) -> u64 {
        self.call().pc
    }

    /// Gets the code executing in the current frame.
    ///
    /// # Errors
    ///
    /// If the executing account is not present in the contract map, which
    /// indicates the frame was constructed without resolving its code.
    pub fn code(&self) -> execution::Result<&Code> {
        let address = self.call().code_address();
        self.contracts
            .get(&address)
            .map(|contract| &contract.code)
            .ok_or(execution::Error::Resolution(resolution::Error::NoCode {
                address,
            }))
    }

    /// Gets the disassembled line at the current program counter.
    ///
    /// # Errors
    ///
    /// If no code is installed for the executing account, or no instruction
    /// starts at the current counter.
    pub fn line(&self) -> execution::Result<Rc<Line>> {
        let pc = self.pc();
        let code = self.code()?;
        let asm = code.asm().ok_or(execution::Error::NoLineAtPc { pc })?;
        asm.line_at_pc(pc).cloned()
    }

    /// Gets the contract of the executing account, creating an empty entry
    /// if the account has never been touched.
    pub fn contract_mut(&mut self) -> &mut Contract {
        let this = self.this();
        self.contracts.entry(this).or_default()
    }

    /// Gets the attached node client, if any.
    #[must_use]
    pub fn client(&self) -> Option<&DynNodeClient> {
        self.client.as_ref()
    }

    /// Attaches a node client for lazy state resolution.
    pub fn set_client(&mut self, client: DynNodeClient) {
        self.client = Some(client);
    }

    /// Marks the outer transaction as completed.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    /// Serializes the persistent state of the context to a JSON value.
    ///
    /// The disassemblies and the node client are not captured: the former are
    /// regenerated on load and the latter must be reattached by the caller.
    ///
    /// # Errors
    ///
    /// If a hook fails to serialize.
    pub fn to_json(&self) -> persistence::Result<serde_json::Value> {
        let persisted = PersistedContext {
            done: self.done,
            chain: self.chain.clone(),
            tx: self.tx.clone(),
            block: self.block.clone(),
            contracts: self.contracts.clone(),
            call_stack: self.call_stack.clone(),
            block_hashes: self.block_hashes.clone(),
            hooks: self.hooks.to_persisted()?,
        };
        Ok(serde_json::to_value(persisted)?)
    }

    /// Saves the context to the file at `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// If serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> persistence::Result<()> {
        let value = self.to_json()?;
        fs::write(path, serde_json::to_string_pretty(&value)?)?;
        Ok(())
    }

    /// Loads a context from the file at `path`.
    ///
    /// Hooks are reconstructed through `registry`, and every contract's code
    /// is re-disassembled. The node client is *not* reconnected: when
    /// `chain.node_url` is set, attach a client with
    /// [`Context::set_client`] before resuming resolution-dependent
    /// execution.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed, or a hook entry names a type
    /// tag that `registry` does not know.
    pub fn load(path: impl AsRef<Path>, registry: &HookRegistry) -> persistence::Result<Self> {
        let bytes = fs::read(path)?;
        let persisted: PersistedContext = serde_json::from_slice(&bytes)?;

        let mut contracts = persisted.contracts;
        for contract in contracts.values_mut() {
            contract.code.ensure_disassembled();
        }

        Ok(Self {
            done: persisted.done,
            chain: persisted.chain,
            tx: persisted.tx,
            block: persisted.block,
            contracts,
            call_stack: persisted.call_stack,
            hooks: Hooks::from_persisted(persisted.hooks, registry)?,
            block_hashes: persisted.block_hashes,
            client: None,
        })
    }
}

/// The on-disk shape of a persisted context.
#[derive(Debug, Deserialize, Serialize)]
struct PersistedContext {
    #[serde(default)]
    done: bool,
    chain: Chain,
    tx: Tx,
    block: Block,
    contracts: HashMap<Address, Contract>,
    call_stack: Stack<Call>,
    block_hashes: HashMap<u64, Word>,
    hooks: Vec<PersistedHook>,
}

/// The deployed bytecode of the sample contract: one storage word with a
/// getter (selector `3bc5de30`) and a setter (selector `5b4b73a9`).
const SAMPLE_CONTRACT_HEX: &str = "608060405234801561001057600080fd5b50600436106100365760003560e01c80633bc5de301461003b5780635b4b73a914610059575b600080fd5b610043610075565b60405161005091906100a1565b60405180910390f35b610073600480360381019061006e91906100ed565b61007e565b005b60008054905090565b8060008190555050565b6000819050919050565b61009b81610088565b82525050565b60006020820190506100b66000830184610092565b92915050565b600080fd5b6100ca81610088565b81146100d557600080fd5b50565b6000813590506100e7816100c1565b92915050565b600060208284031215610103576101026100bc565b5b6000610111848285016100d8565b9150509291505056fea2646970667358221220e5f07a97a4abeb88a5fcf07910fb20896f7f95326c9a7a8f1f2a2686532f5a3164736f6c634300080d0033";
