//! This module contains the [`ParamTracer`], a hook that snapshots the stack
//! and memory deltas of each executed instruction.

use serde::{Deserialize, Serialize};

use crate::{
    disassembly::Line,
    error::{execution::Result, persistence},
    hook::Hook,
    utility::serde_hex,
    vm::{value::Word, Context},
};

/// Opcodes that read memory, and hence need a memory snapshot before
/// execution.
const READS_MEMORY: [u8; 7] = [0x20, 0x51, 0x52, 0x53, 0xf1, 0xf4, 0xfa];

/// Opcodes after which the memory may have changed, and hence need a memory
/// snapshot after execution.
const WRITES_MEMORY: [u8; 13] = [
    0x20, 0x51, 0x52, 0x53, 0xf1, 0xf4, 0xfa, 0x39, 0x37, 0x3e, 0x3c, 0xf3, 0xfd,
];

/// A hook that captures, for each executed instruction, the stack operands it
/// consumed, the results it produced, the program counters around it, and
/// (for the memory-touching opcodes only) full memory snapshots.
///
/// Memory is only copied for the opcodes that use it, to keep the tracer
/// cheap on the long stretches of pure stack code.
///
/// Other hooks build on these snapshots: the low-level tracer renders them,
/// and the symbolic tracer consumes them to drive its expression
/// construction.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ParamTracer {
    /// The operands of the current instruction, cloned from the top of the
    /// stack before execution (bottom-to-top order).
    pub stack_pre: Vec<Word>,

    /// The results of the current instruction, cloned from the top of the
    /// stack after execution (bottom-to-top order).
    pub stack_post: Vec<Word>,

    /// The program counter before execution.
    pub pc_pre: u64,

    /// The program counter after execution.
    pub pc_post: u64,

    /// A snapshot of the full memory before execution, for the opcodes in
    /// [`READS_MEMORY`]; stale otherwise.
    #[serde(with = "serde_hex")]
    pub mem_pre: Vec<u8>,

    /// A snapshot of the full memory after execution, for the opcodes in
    /// [`WRITES_MEMORY`]; stale otherwise.
    #[serde(with = "serde_hex")]
    pub mem_post: Vec<u8>,
}

impl ParamTracer {
    /// Creates a tracer with empty snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the pre-execution operand at `depth`, where depth 0 is the top
    /// of the stack.
    ///
    /// # Panics
    ///
    /// If the current instruction has fewer operands; the operation table's
    /// arity guarantees the depths each consumer may use.
    #[must_use]
    pub fn pre(&self, depth: usize) -> Word {
        self.stack_pre[self.stack_pre.len() - 1 - depth]
    }

    /// Reads the post-execution result at `depth`, where depth 0 is the top
    /// of the stack.
    ///
    /// # Panics
    ///
    /// As for [`ParamTracer::pre`].
    #[must_use]
    pub fn post(&self, depth: usize) -> Word {
        self.stack_post[self.stack_post.len() - 1 - depth]
    }

    /// The shared body of [`Hook::pre_run`], callable by hooks that embed
    /// this tracer.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer operands than the instruction consumes.
    pub fn capture_pre(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.pc_pre = ctx.pc();
        // The operands: the top `stack_in` items for this opcode.
        self.stack_pre = ctx.stack().clone_top(line.op.stack_in())?;

        if READS_MEMORY.contains(&line.opcode_byte()) {
            self.mem_pre = ctx.memory().data().to_vec();
        }
        Ok(())
    }

    /// The shared body of [`Hook::post_run`], callable by hooks that embed
    /// this tracer.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer results than the instruction produces.
    pub fn capture_post(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.pc_post = ctx.pc();
        self.stack_post = ctx.stack().clone_top(line.op.stack_out())?;

        if WRITES_MEMORY.contains(&line.opcode_byte()) {
            self.mem_post = ctx.memory().data().to_vec();
        }
        Ok(())
    }
}

impl Hook for ParamTracer {
    fn type_name(&self) -> &'static str {
        "ParamTracer"
    }

    fn pre_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.capture_pre(ctx, line)
    }

    fn post_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.capture_post(ctx, line)
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
