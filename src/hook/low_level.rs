//! This module contains the low-level tracers: a per-instruction
//! human-readable log of what each opcode computed, and a bare instruction
//! log.
//!
//! Both emit through `tracing` under the `evm_replay::trace` target, so the
//! embedding application decides where the trace ends up.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    disassembly::Line,
    error::{execution::Result, persistence},
    hook::{param_tracer::ParamTracer, Hook},
    utility,
    vm::Context,
};

/// A hook that renders every executed instruction as a human-readable line,
/// using the operand/result snapshots of an embedded [`ParamTracer`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LowLevelTracer {
    /// The embedded snapshot tracer this renderer reads from.
    pub params: ParamTracer,
}

impl LowLevelTracer {
    /// Creates a new low-level tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the just-executed instruction, if its family has a rendering.
    fn render(&self, line: &Line) -> Option<String> {
        let t = &self.params;
        let mnemonic = line.op.as_text_code();

        let rendered = match line.opcode_byte() {
            // SHA3 shows the hashed pre-image next to the digest.
            0x20 => {
                let offset = t.pre(0).low_u64() as usize;
                let size = t.pre(1).low_u64() as usize;
                let end = (offset + size).min(t.mem_pre.len());
                let image = &t.mem_pre[offset.min(t.mem_pre.len())..end];
                format!(
                    "SHA3 memory [\n{}] -> {}",
                    utility::hex_dump(image, offset),
                    t.post(0)
                )
            }
            // MLOAD
            0x51 => format!("{} = mem[{}]", t.post(0), t.pre(0)),
            // MSTORE / MSTORE8
            0x52 | 0x53 => format!("mem[{}] = {}", t.pre(0), t.pre(1)),
            // SLOAD
            0x54 => format!("{} = storage[{}]", t.post(0), t.pre(0)),
            // SSTORE
            0x55 => format!("storage[{}] = {}", t.pre(0), t.pre(1)),
            // The call family shows the callee and the selector.
            0xf1 | 0xf4 | 0xfa => {
                let (callee, in_offset, in_size) = if line.opcode_byte() == 0xf1 {
                    // A CALL with no input is a bare transfer.
                    if t.pre(4).is_zero() {
                        return Some(format!(
                            "transfer value: {} -> {}",
                            t.pre(2),
                            t.pre(1).to_address()
                        ));
                    }
                    (t.pre(1), t.pre(3), t.pre(4))
                } else {
                    (t.pre(1), t.pre(2), t.pre(3))
                };

                let offset = in_offset.low_u64() as usize;
                let end = (offset + in_size.low_u64() as usize).min(t.mem_pre.len());
                let input = &t.mem_pre[offset.min(t.mem_pre.len())..end];
                let selector = hex::encode(&input[..input.len().min(4)]);
                format!("{mnemonic} -> {}, fn: {selector}", callee.to_address())
            }
            // LOGn lists its topics.
            0xa0..=0xa4 => {
                let topic_count = (line.opcode_byte() - 0xa0) as usize;
                let topics = (0..topic_count)
                    .map(|i| t.pre(2 + i).to_string())
                    .join(", ");
                format!("{mnemonic} ({topics})")
            }
            // Environment getters with no operands.
            0x30 | 0x32 | 0x33 | 0x34 | 0x36 | 0x38 | 0x3a | 0x3d | 0x41..=0x48 | 0x58 | 0x59
            | 0x5a => {
                format!("{} = {mnemonic}", t.post(0))
            }
            // One-operand computations.
            0x15 | 0x19 | 0x31 | 0x35 | 0x3b | 0x3f | 0x40 => {
                format!("{mnemonic} ({}) -> {}", t.pre(0), t.post(0))
            }
            // Two-operand computations.
            0x01..=0x0b | 0x10..=0x14 | 0x16..=0x18 | 0x1a..=0x1d => {
                format!("{mnemonic} ({}, {}) -> {}", t.pre(0), t.pre(1), t.post(0))
            }
            _ => return None,
        };

        Some(rendered)
    }
}

impl Hook for LowLevelTracer {
    fn type_name(&self) -> &'static str {
        "LowLevelTracer"
    }

    fn pre_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.params.capture_pre(ctx, line)
    }

    fn post_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.params.capture_post(ctx, line)?;
        if let Some(rendered) = self.render(line) {
            info!(target: "evm_replay::trace", "{rendered}");
        }
        Ok(())
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A hook that logs every executed instruction as `pc  mnemonic`, producing
/// the classic full execution log.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OpLog;

impl Hook for OpLog {
    fn type_name(&self) -> &'static str {
        "OpLog"
    }

    fn pre_run(&mut self, _ctx: &Context, line: &Line) -> Result<()> {
        info!(
            target: "evm_replay::trace",
            "{}\t {}",
            line.pc,
            line.op.as_text_code()
        );
        Ok(())
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
