//! This module contains errors produced by the lazy environment resolver when
//! it cannot supply a piece of chain state.

use thiserror::Error;

use crate::vm::value::Address;

/// Errors that occur while resolving chain state (code, storage, balances and
/// block hashes) that is not present in the local caches.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("No node client is attached; cannot fetch {what}")]
    NoClient { what: String },

    #[error("The node request failed: {message}")]
    Rpc { message: String },

    #[error("Cannot resolve state for the zero address or block zero")]
    UnresolvableTarget,

    #[error("No such transaction: {hash}")]
    UnknownTransaction { hash: String },

    #[error("Transaction {hash} creates a contract and cannot be replayed")]
    ContractCreation { hash: String },

    #[error("No code was found at {address}")]
    NoCode { address: Address },
}

/// The result type for resolver functions.
pub type Result<T> = std::result::Result<T, Error>;
