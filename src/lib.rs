//! This library implements an interactive replay debugger and symbolic
//! tracer for [EVM](https://ethereum.org/en/developers/docs/evm/) bytecode.
//! It single-steps or runs compiled bytecode to completion, recovers a
//! symbolic, high-level trace of what each concrete execution actually
//! computed, and simplifies that trace into readable pseudo-expressions,
//! recognising, for example, `(CALLDATALOAD(0x0) >> 0xe0)` as the function
//! selector.
//!
//! # How it Works
//!
//! 1. Contract bytecode is disassembled into a
//!    [`disassembly::InstructionStream`]: the instruction at every program
//!    counter, with trailing compiler metadata stripped.
//! 2. A [`vm::Context`] drives the code concretely: a 256-bit operand stack,
//!    byte-addressable memory, per-account storage, and a call stack of
//!    nested invocations. Chain state the replay does not have locally
//!    (code, storage slots, balances, block hashes) is fetched on demand
//!    through the [`resolver`]'s [`resolver::NodeClient`] seam and cached.
//! 3. A chain of [`hook::Hook`]s observes every instruction. Breakpoints are
//!    hooks that return a distinguished error; tracers are hooks that record.
//! 4. The [`trace::HighLevelTracer`] shadows the concrete run with a
//!    symbolic one, building an expression DAG of [`trace::Node`]s.
//! 5. The [`trace::optimize`] pass rewrites the DAG to a fixed point with
//!    peephole rules, and [`trace::printer`] renders it with one indented
//!    block per call frame.
//!
//! # Basic Usage
//!
//! ```
//! use evm_replay::{trace, vm::Context};
//!
//! // The built-in sample: a small storage contract called with the
//! // selector of its getter.
//! let mut ctx = Context::sample();
//!
//! // Shadow the run with the symbolic tracer.
//! let tracer = trace::HighLevelTracer::new(&ctx);
//! ctx.hooks.attach(Box::new(tracer));
//!
//! // Run the transaction to completion.
//! ctx.run(-1).unwrap();
//! assert!(ctx.done);
//!
//! // Simplify the recovered trace to a fixed point and render it.
//! let mut root = ctx.hooks.get_mut(0).unwrap()
//!     .downcast_ref::<trace::HighLevelTracer>().unwrap()
//!     .root();
//! let optimizers = trace::default_optimizers();
//! loop {
//!     let (new_root, modified) = trace::optimize(&root, &optimizers);
//!     root = new_root;
//!     if !modified {
//!         break;
//!     }
//! }
//!
//! let rendered = trace::print(&root);
//! assert!(rendered.contains("func_sig"));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod contract;
pub mod disassembly;
pub mod error;
pub mod hook;
pub mod opcode;
pub mod resolver;
pub mod trace;
pub mod utility;
pub mod vm;

// Re-exports to provide the library interface.
pub use contract::Contract;
pub use hook::{Hook, HookRegistry};
pub use opcode::Opcode;
pub use resolver::NodeClient;
pub use vm::Context;
