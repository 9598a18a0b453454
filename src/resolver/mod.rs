//! This module contains the lazy environment resolver: the seam to an
//! archive node, and the cache-through fetchers that supply code, storage,
//! balances and block hashes on demand during a replay.
//!
//! # Pre-image Semantics
//!
//! A replayed transaction must observe the chain as it was *before* the
//! transaction executed. Code is therefore fetched at the transaction's block
//! number, while storage and balances are fetched at the block before it;
//! block hashes are fetched at their own numbers.

use std::{fmt::Debug, rc::Rc};

use tracing::debug;

use crate::{
    contract::Contract,
    error::resolution::{Error, Result},
    vm::{
        value::{Address, Word},
        Call, Context, Msg,
    },
};

/// The metadata of a transaction fetched from a node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxInfo {
    /// The transaction hash.
    pub hash: Word,

    /// The signing account.
    pub from: Address,

    /// The called account; [`None`] for contract-creation transactions,
    /// which cannot be replayed.
    pub to: Option<Address>,

    /// The call data.
    pub input: Vec<u8>,

    /// The gas limit of the transaction.
    pub gas: u64,

    /// The gas price of the transaction.
    pub gas_price: u64,

    /// The transferred value.
    pub value: Word,

    /// The number of the block the transaction was included in.
    pub block_number: u64,
}

/// The metadata of a block fetched from a node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,

    /// The block hash.
    pub hash: Word,

    /// The block timestamp.
    pub timestamp: u64,

    /// The block difficulty.
    pub difficulty: u64,

    /// The block's beneficiary address.
    pub coinbase: Address,

    /// The block gas limit.
    pub gas_limit: u64,

    /// The block base fee; zero for pre-London blocks.
    pub base_fee: u64,
}

/// The interface to an archive node.
///
/// The RPC transport itself lives outside this crate; any synchronous
/// JSON-RPC client can implement this trait and be attached to a context
/// with [`Context::set_client`]. Tests substitute an in-memory
/// implementation.
pub trait NodeClient
where
    Self: Debug,
{
    /// Gets the identifier of the chain the node serves.
    ///
    /// # Errors
    ///
    /// If the node request fails.
    fn chain_id(&self) -> Result<u64>;

    /// Gets the hash of the block at `number`.
    ///
    /// # Errors
    ///
    /// If the node request fails or no such block exists.
    fn block_hash(&self, number: u64) -> Result<Word>;

    /// Gets the code of `address` as of `block`.
    ///
    /// # Errors
    ///
    /// If the node request fails.
    fn code_at(&self, address: Address, block: u64) -> Result<Vec<u8>>;

    /// Gets the storage word of `address` at `slot` as of `block`.
    ///
    /// # Errors
    ///
    /// If the node request fails.
    fn storage_at(&self, address: Address, slot: Word, block: u64) -> Result<Word>;

    /// Gets the balance of `address` as of `block`.
    ///
    /// # Errors
    ///
    /// If the node request fails.
    fn balance_at(&self, address: Address, block: u64) -> Result<Word>;

    /// Gets the metadata of the transaction with `hash`.
    ///
    /// # Errors
    ///
    /// If the node request fails or no such transaction exists.
    fn transaction(&self, hash: Word) -> Result<TxInfo>;

    /// Gets the metadata of the block at `number`.
    ///
    /// # Errors
    ///
    /// If the node request fails or no such block exists.
    fn block(&self, number: u64) -> Result<BlockInfo>;
}

/// A dynamically dispatched [`NodeClient`].
pub type DynNodeClient = Rc<dyn NodeClient>;

/// Gets the contract at `address`, creating an empty entry if the account
/// has never been touched.
pub fn ensure_contract_at<'c>(ctx: &'c mut Context, address: Address) -> &'c mut Contract {
    ctx.contracts.entry(address).or_default()
}

/// Gets the code of `address`, fetching and caching it (together with its
/// disassembly) on a local miss.
///
/// # Errors
///
/// If no client is attached, the target is unresolvable, or the fetch
/// fails.
pub fn ensure_code(ctx: &mut Context, address: Address) -> Result<Vec<u8>> {
    let block_number = ctx.block.number;

    let contract = ensure_contract_at(ctx, address);
    if !contract.code.is_empty() {
        return Ok(contract.code.bytes().to_vec());
    }

    let client = ctx.client().cloned().ok_or_else(|| Error::NoClient {
        what: format!("code of {address}"),
    })?;
    if address.is_zero() || block_number == 0 {
        return Err(Error::UnresolvableTarget);
    }
    debug!(%address, block_number, "fetching contract code");
    let binary = client.code_at(address, block_number)?;

    let contract = ensure_contract_at(ctx, address);
    contract.code.set(binary.clone());
    Ok(binary)
}

/// Gets a storage word of `address`, fetching it at the pre-state block and
/// caching it on a local miss.
///
/// # Errors
///
/// If no client is attached, the target is unresolvable, or the fetch
/// fails.
pub fn ensure_storage(ctx: &mut Context, address: Address, slot: Word) -> Result<Word> {
    let block_number = ctx.block.number;

    let contract = ensure_contract_at(ctx, address);
    if let Some(value) = contract.storage.get(&slot) {
        return Ok(*value);
    }

    let client = ctx.client().cloned().ok_or_else(|| Error::NoClient {
        what: format!("storage slot {slot} of {address}"),
    })?;
    if address.is_zero() || block_number == 0 {
        return Err(Error::UnresolvableTarget);
    }
    // An archive node reports storage as of the end of a block, so the state
    // this transaction started from is that of the block before it.
    debug!(%address, %slot, block_number, "fetching storage slot");
    let value = client.storage_at(address, slot, block_number - 1)?;

    ensure_contract_at(ctx, address).storage.insert(slot, value);
    Ok(value)
}

/// Gets the balance of `address` at the pre-state block, caching it on a
/// local miss.
///
/// # Errors
///
/// If no client is attached, the target is unresolvable, or the fetch
/// fails.
pub fn ensure_balance(ctx: &mut Context, address: Address) -> Result<Word> {
    let block_number = ctx.block.number;

    let contract = ensure_contract_at(ctx, address);
    if let Some(balance) = contract.balance {
        return Ok(balance);
    }

    let client = ctx.client().cloned().ok_or_else(|| Error::NoClient {
        what: format!("balance of {address}"),
    })?;
    if address.is_zero() || block_number == 0 {
        return Err(Error::UnresolvableTarget);
    }
    debug!(%address, block_number, "fetching balance");
    let balance = client.balance_at(address, block_number - 1)?;

    ensure_contract_at(ctx, address).balance = Some(balance);
    Ok(balance)
}

/// Gets the hash of the block at `number`, caching it on a local miss.
///
/// # Errors
///
/// If no client is attached or the fetch fails.
pub fn ensure_block_hash(ctx: &mut Context, number: u64) -> Result<Word> {
    if let Some(hash) = ctx.block_hashes.get(&number) {
        return Ok(*hash);
    }

    let client = ctx.client().cloned().ok_or_else(|| Error::NoClient {
        what: format!("hash of block {number}"),
    })?;
    debug!(number, "fetching block hash");
    let hash = client.block_hash(number)?;

    ctx.block_hashes.insert(number, hash);
    Ok(hash)
}

/// Builds a replay context for the transaction with `tx_hash`, fetching the
/// transaction, its block and the called contract's code through `client`.
///
/// # Errors
///
/// If any fetch fails, or the transaction is a contract creation.
pub fn from_transaction(client: DynNodeClient, tx_hash: Word) -> Result<Context> {
    let chain_id = client.chain_id()?;
    let tx = client.transaction(tx_hash)?;
    let block = client.block(tx.block_number)?;

    let to = tx.to.ok_or_else(|| Error::ContractCreation {
        hash: tx_hash.to_string(),
    })?;

    let mut ctx = Context::new();
    ctx.set_client(client);

    ctx.tx = crate::vm::Tx {
        hash: Some(tx.hash),
        origin: tx.from,
        gas_price: tx.gas_price,
    };
    ctx.block = crate::vm::Block {
        number: block.number,
        timestamp: block.timestamp,
        difficulty: block.difficulty,
        coinbase: block.coinbase,
        gas_limit: block.gas_limit,
        base_fee: block.base_fee,
    };
    ctx.block_hashes.insert(block.number, block.hash);
    ctx.chain = crate::vm::Chain {
        id: chain_id,
        node_url: String::new(),
    };

    *ctx.call_mut() = Call {
        this: to,
        msg: Msg {
            data: tx.input,
            gas: tx.gas,
            sender: tx.from,
            value: tx.value,
        },
        ..Call::default()
    };

    ensure_code(&mut ctx, to)?;
    Ok(ctx)
}
