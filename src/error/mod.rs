//! This module contains the error types for the library, organised by the
//! subsystem they pertain to.
//!
//! # Anyhow
//!
//! All of the errors implement [`std::error::Error`], and hence can be used
//! with [`anyhow::Error`] internally. It is _not_ recommended to use that
//! error type in the interface of the library, as this forces clients to also
//! use `anyhow`.

pub mod container;
pub mod disassembly;
pub mod execution;
pub mod persistence;
pub mod resolution;
