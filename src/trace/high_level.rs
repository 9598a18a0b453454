//! This module contains the [`HighLevelTracer`], the hook that shadows a
//! concrete execution with a symbolic one, building the expression DAG that
//! the optimizers and printer turn into a readable account of what the
//! transaction computed.

use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    disassembly::Line,
    error::{
        execution::{Error, Result},
        persistence,
    },
    hook::{param_tracer::ParamTracer, Hook},
    vm::{
        precompile,
        value::{Address, Word},
        Context,
    },
};

use super::node::{node, Node, NodeRef};

/// One symbolic invocation frame, shadowing a concrete call frame.
///
/// The frame owns the symbolic operand stack mirroring the machine stack,
/// the map of live memory windows, the map of storage accesses, and the
/// [`Node::Call`] whose body is the frame's ordered trace.
#[derive(Debug)]
struct Frame {
    /// The call node collecting this frame's trace entries.
    call: NodeRef,

    /// The symbolic operand stack; kept depth-equal with the machine stack.
    stack: Vec<NodeRef>,

    /// The latest memory window covering each concrete offset.
    mem_map: HashMap<u64, NodeRef>,

    /// The storage access for each concrete slot.
    storage_map: HashMap<Word, NodeRef>,

    /// The caller-side return window recorded when this frame was entered,
    /// honoured when it returns.
    ret_window: (u64, u64),
}

impl Frame {
    fn new(op: u8, target: Address, input: &[u8], ret_window: (u64, u64)) -> Self {
        Self {
            call: Node::call(op, target, input.to_vec()),
            stack: vec![],
            mem_map: HashMap::new(),
            storage_map: HashMap::new(),
            ret_window,
        }
    }

    fn push(&mut self, n: NodeRef) {
        self.stack.push(n);
    }

    fn pop(&mut self) -> Result<NodeRef> {
        self.stack.pop().ok_or(Error::StackUnderflow)
    }

    /// Appends a trace entry to the frame's call body.
    fn add_trace(&mut self, n: NodeRef) {
        if let Node::Call { body, .. } = &mut *self.call.borrow_mut() {
            body.push(n);
        }
    }

    /// The memory windows whose concrete offset falls inside
    /// `[start, start + size)`, in address order.
    fn windows_in(&self, start: u64, size: u64) -> Vec<NodeRef> {
        self.mem_map
            .iter()
            .filter(|(offset, _)| **offset >= start && **offset < start + size)
            .sorted_by_key(|(offset, _)| **offset)
            .map(|(_, window)| window.clone())
            .collect()
    }

    /// As [`Frame::windows_in`], but with an inclusive upper bound; log
    /// data ranges are collected this way.
    fn windows_in_inclusive(&self, start: u64, size: u64) -> Vec<NodeRef> {
        self.mem_map
            .iter()
            .filter(|(offset, _)| **offset >= start && **offset <= start + size)
            .sorted_by_key(|(offset, _)| **offset)
            .map(|(_, window)| window.clone())
            .collect()
    }
}

/// A hook that records each executed instruction into a symbolic expression
/// DAG.
///
/// The tracer maintains a stack of symbolic frames mirroring the concrete
/// call stack. Stack-shuffling opcodes are replayed structurally; computing
/// opcodes pop their symbolic operands and push a node tagged with the
/// concrete result; the memory, storage, hashing, logging and call opcodes
/// additionally append entries to the current frame's trace.
///
/// Construction records only; simplification is a separate pass (see
/// [`crate::trace::optimize`]) over the finished DAG.
#[derive(Debug)]
pub struct HighLevelTracer {
    /// The embedded snapshot tracer supplying concrete operands and results.
    params: ParamTracer,

    /// The symbolic frames; the bottom one shadows the outer transaction.
    frames: Vec<Frame>,
}

impl HighLevelTracer {
    /// Creates a tracer whose root frame shadows the current call of `ctx`.
    ///
    /// Attach the tracer before the first step of the run, as the trace is
    /// only coherent when it observes every instruction.
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        let call = ctx.call();
        let root = Frame::new(0xf1, call.this, &call.msg.data, (0, 0));
        Self {
            params: ParamTracer::new(),
            frames: vec![root],
        }
    }

    /// Gets the root of the symbolic trace: the call node of the outer
    /// transaction.
    #[must_use]
    pub fn root(&self) -> NodeRef {
        self.frames[0].call.clone()
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("the tracer always holds the outer frame")
    }

    /// Records the effect of the instruction that just executed.
    #[allow(clippy::too_many_lines)] // It is a dispatch table over the opcode set
    fn record(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        let byte = line.opcode_byte();

        match byte {
            // Environment getters: no symbolic operands, one tagged result.
            0x30 | 0x32..=0x34 | 0x36 | 0x38 | 0x3a | 0x41..=0x48 | 0x58 | 0x59 | 0x5a => {
                let value = self.params.post(0);
                self.frame().push(node(Node::Nullary { op: byte, value }));
            }

            // One-operand computations.
            0x15 | 0x19 | 0x31 | 0x35 | 0x3b | 0x3f | 0x40 => {
                let value = self.params.post(0);
                let frame = self.frame();
                let x = frame.pop()?;
                frame.push(node(Node::Unary { op: byte, x, value }));
            }

            // Two-operand computations.
            0x01..=0x07 | 0x0a | 0x0b | 0x10..=0x14 | 0x16..=0x18 | 0x1a..=0x1d => {
                let value = self.params.post(0);
                let frame = self.frame();
                let mut x = frame.pop()?;
                let mut y = frame.pop()?;

                // The shift family (and SIGNEXTEND/BYTE) reads better with
                // the value first: `value << shift`.
                if matches!(byte, 0x0b | 0x1a..=0x1d) {
                    std::mem::swap(&mut x, &mut y);
                }

                frame.push(node(Node::Binary {
                    op: byte,
                    x,
                    y,
                    value,
                }));
            }

            // Three-operand computations.
            0x08 | 0x09 => {
                let value = self.params.post(0);
                let frame = self.frame();
                let x = frame.pop()?;
                let y = frame.pop()?;
                let z = frame.pop()?;
                frame.push(node(Node::Ternary {
                    op: byte,
                    x,
                    y,
                    z,
                    value,
                }));
            }

            // CALLDATACOPY consumes its operands without a trace entry.
            0x37 => {
                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;
                frame.pop()?;
            }

            0x50 => {
                self.frame().pop()?;
            }

            // SHA3: collect the windows inside the hashed range as the
            // pre-image.
            0x20 => {
                let vm_offset = self.params.pre(0).low_u64();
                let vm_size = self.params.pre(1).low_u64();
                let value = self.params.post(0);

                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;

                let inputs = frame.windows_in(vm_offset, vm_size);
                let sha3 = node(Node::Sha3 {
                    id: uuid::Uuid::new_v4(),
                    inputs,
                    offset: vm_offset,
                    size: vm_size,
                    value,
                });
                frame.push(sha3.clone());
                frame.add_trace(node(Node::Sha3Calc { sha3 }));
            }

            // MLOAD: resolve the read against the known windows.
            0x51 => {
                let offset = self.params.pre(0).low_u64();
                let mem_pre = self.params.mem_pre.clone();

                let frame = self.frame();
                frame.pop()?;

                let mut window = frame.mem_map.get(&offset).cloned();
                if window.is_none() {
                    window = derive_interior_window(frame, offset);
                }
                let window = match window {
                    Some(window) => window,
                    None => {
                        // Nothing known covers this offset; name it and seed
                        // it from the concrete pre-memory.
                        let vm_bytes = if (offset as usize) < mem_pre.len() {
                            let end = (offset as usize + 32).min(mem_pre.len());
                            mem_pre[offset as usize..end].to_vec()
                        } else {
                            vec![]
                        };
                        node(Node::Memory {
                            offset: Node::constant(Word::from(offset)),
                            value: Node::label("Unknown_Memory"),
                            vm_offset: offset,
                            vm_bytes,
                        })
                    }
                };

                frame.push(window);
            }

            // MSTORE / MSTORE8: a new window shadows the offset.
            0x52 | 0x53 => {
                let vm_offset = self.params.pre(0).low_u64();
                let vm_size: u64 = if byte == 0x53 { 1 } else { 32 };
                let vm_bytes = ctx.memory().slice(vm_offset, vm_size);

                let frame = self.frame();
                let offset = frame.pop()?;
                let value = frame.pop()?;

                let window = node(Node::Memory {
                    offset,
                    value,
                    vm_offset,
                    vm_bytes,
                });
                frame.mem_map.insert(vm_offset, window.clone());
                frame.add_trace(node(Node::MemoryWrite {
                    memory: window,
                    dump: false,
                }));
            }

            // SLOAD: a cache hit re-uses the known access; a miss means the
            // chain supplied the value, which is semantically a write.
            0x54 => {
                let vm_slot = self.params.pre(0);
                let value = self.params.post(0);

                let frame = self.frame();
                let slot = frame.pop()?;

                if let Some(existing) = frame.storage_map.get(&vm_slot).cloned() {
                    frame.push(existing);
                } else {
                    let storage = node(Node::Storage {
                        slot,
                        value: Node::constant(value),
                    });
                    frame.storage_map.insert(vm_slot, storage.clone());
                    frame.push(storage.clone());
                    frame.add_trace(node(Node::StorageWrite {
                        storage,
                        online_fetch: true,
                    }));
                }
            }

            0x55 => {
                let vm_slot = self.params.pre(0);

                let frame = self.frame();
                let slot = frame.pop()?;
                let value = frame.pop()?;

                let storage = node(Node::Storage { slot, value });
                frame.storage_map.insert(vm_slot, storage.clone());
                frame.add_trace(node(Node::StorageWrite {
                    storage,
                    online_fetch: false,
                }));
            }

            0x56 => {
                self.frame().pop()?;
            }

            0x57 => {
                let taken = !self.params.pre(1).is_zero();
                let pc = self.params.pc_pre;

                let frame = self.frame();
                frame.pop()?;
                let cond = frame.pop()?;
                frame.add_trace(node(Node::If { cond, taken, pc }));
            }

            0x5b => {}

            // PUSHn.
            0x60..=0x7f => {
                let value = self.params.post(0);
                self.frame().push(Node::constant(value));
            }

            // DUPn / SWAPn replay structurally, sharing the duplicated
            // handle.
            0x80..=0x8f => {
                let depth = (byte - 0x7f) as usize;
                let frame = self.frame();
                let item = frame
                    .stack
                    .len()
                    .checked_sub(depth)
                    .and_then(|index| frame.stack.get(index).cloned())
                    .ok_or(Error::StackUnderflow)?;
                frame.push(item);
            }
            0x90..=0x9f => {
                let depth = (byte - 0x8f) as usize;
                let frame = self.frame();
                let top = frame.stack.len().checked_sub(1).ok_or(Error::StackUnderflow)?;
                let target = top.checked_sub(depth).ok_or(Error::StackUnderflow)?;
                frame.stack.swap(top, target);
            }

            // LOGn.
            0xa0..=0xa4 => {
                let topic_count = (byte - 0xa0) as usize;
                let vm_start = self.params.pre(0).low_u64();
                let vm_size = self.params.pre(1).low_u64();

                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;
                let mut topics = vec![];
                for _ in 0..topic_count {
                    topics.push(frame.pop()?);
                }

                let mem = frame.windows_in_inclusive(vm_start, vm_size);
                frame.add_trace(node(Node::Log { topics, mem }));
            }

            // The call family.
            0xf1 | 0xf4 | 0xfa => self.record_call(ctx, byte)?,

            // STOP: an inner frame folds back into its caller.
            0x00 => {
                if self.frames.len() > 1 {
                    self.frames.pop();
                    self.frame().push(Node::constant(Word::ONE));
                }
            }

            // RETURN: fold the frame and surface its output window to the
            // caller.
            0xf3 => {
                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;

                if self.frames.len() == 1 {
                    return Ok(());
                }
                let finished = self
                    .frames
                    .pop()
                    .expect("a frame above the root was just observed");
                let (offset, size) = finished.ret_window;

                // The machine has already popped back to the caller; its
                // memory now holds the copied return data.
                let vm_bytes = ctx.memory().slice(offset, size);
                let window = node(Node::Memory {
                    offset: Node::constant(Word::from(offset)),
                    value: Node::return_value(),
                    vm_offset: offset,
                    vm_bytes,
                });

                let caller = self.frame();
                caller.mem_map.insert(offset, window.clone());
                caller.add_trace(node(Node::MemoryWrite {
                    memory: window,
                    dump: false,
                }));
                caller.push(Node::constant(Word::ONE));
            }

            // RETURNDATASIZE is only ever an opaque length.
            0x3d => {
                self.frame().push(Node::label("ReturnDataSize"));
            }

            // RETURNDATACOPY / CODECOPY: a labelled window lands in memory.
            0x3e | 0x39 => {
                let mem_offset = self.params.pre(0).low_u64();
                let length = self.params.pre(2).low_u64();
                let mem_post = &self.params.mem_post;
                let end = ((mem_offset + length) as usize).min(mem_post.len());
                let vm_bytes = mem_post
                    .get(mem_offset as usize..end)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();

                let label = if byte == 0x3e { "ReturnValue" } else { "CodeCopy" };

                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;
                frame.pop()?;

                let window = node(Node::Memory {
                    offset: Node::constant(Word::from(mem_offset)),
                    value: Node::label(label),
                    vm_offset: mem_offset,
                    vm_bytes,
                });
                frame.mem_map.insert(mem_offset, window.clone());
                frame.add_trace(node(Node::MemoryWrite {
                    memory: window,
                    dump: false,
                }));
            }

            // REVERT aborts the transaction; mark the trace.
            0xfd => {
                let frame = self.frame();
                frame.pop()?;
                frame.pop()?;
                frame.add_trace(Node::label("Reverted"));
            }

            _ => {
                return Err(Error::UnsupportedOpcode {
                    name: line.op.as_text_code(),
                })
            }
        }

        Ok(())
    }

    /// Records a `CALL`/`DELEGATECALL`/`STATICCALL`: a bare transfer, an
    /// inline precompile, or a descent into a new symbolic frame.
    fn record_call(&mut self, ctx: &Context, byte: u8) -> Result<()> {
        let is_call = byte == 0xf1;
        let target = self.params.pre(1).to_address();

        // CALL carries a value operand the other two do not, shifting the
        // window operands one slot deeper.
        let (in_offset, in_size, ret_offset, ret_size) = if is_call {
            (
                self.params.pre(3).low_u64(),
                self.params.pre(4).low_u64(),
                self.params.pre(5).low_u64(),
                self.params.pre(6).low_u64(),
            )
        } else {
            (
                self.params.pre(2).low_u64(),
                self.params.pre(3).low_u64(),
                self.params.pre(4).low_u64(),
                self.params.pre(5).low_u64(),
            )
        };

        {
            let frame = self.frame();
            for _ in 0..6 {
                frame.pop()?;
            }
            if is_call {
                frame.pop()?;
            }
        }

        // An empty input window on CALL is a bare value transfer.
        if is_call && in_size == 0 {
            let amount = self.params.pre(2);
            let frame = self.frame();
            frame.add_trace(node(Node::MoneyTransfer { to: target, amount }));
            frame.push(Node::constant(Word::ONE));
            return Ok(());
        }

        if precompile::is_precompile(target) {
            let mem_post = &self.params.mem_post;
            let end = ((ret_offset + ret_size) as usize).min(mem_post.len());
            let vm_bytes = mem_post
                .get(ret_offset as usize..end)
                .map(<[u8]>::to_vec)
                .unwrap_or_default();

            let frame = self.frame();
            let input = frame.mem_map.get(&in_offset).cloned();
            frame.add_trace(node(Node::Precompiled { to: target, input }));

            let return_value = Node::return_value();
            let window = node(Node::Memory {
                offset: Node::constant(Word::from(ret_offset)),
                value: return_value.clone(),
                vm_offset: ret_offset,
                vm_bytes,
            });
            frame.mem_map.insert(ret_offset, window.clone());
            frame.add_trace(node(Node::Return {
                return_value,
                memory: window,
            }));
            frame.push(Node::constant(Word::ONE));
            return Ok(());
        }

        // The machine has already descended; its current frame is the
        // callee.
        let callee = ctx.call();
        let new_frame = Frame::new(
            byte,
            callee.code_address(),
            &callee.msg.data,
            (ret_offset, ret_size),
        );
        let call_node = new_frame.call.clone();
        self.frame().add_trace(call_node);
        self.frames.push(new_frame);
        Ok(())
    }
}

impl Hook for HighLevelTracer {
    fn type_name(&self) -> &'static str {
        "HighLevelTracer"
    }

    fn pre_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.params.capture_pre(ctx, line)
    }

    fn post_run(&mut self, ctx: &Context, line: &Line) -> Result<()> {
        self.params.capture_post(ctx, line)?;
        self.record(ctx, line)?;

        // Any divergence between the machine stack and the symbolic stack
        // means an opcode was mishandled; catch it at the instruction that
        // caused it.
        assert_eq!(
            self.frame().stack.len(),
            ctx.stack().len(),
            "symbolic stack diverged from the machine stack at pc {:#x}",
            self.params.pc_pre,
        );
        Ok(())
    }

    fn to_value(&self) -> persistence::Result<serde_json::Value> {
        // The trace is a run artefact, not persistent state: it is rebuilt
        // by replaying with a fresh tracer attached.
        Ok(serde_json::Value::Null)
    }
}

/// Finds a known window that an `MLOAD` at `offset` reads the interior of,
/// and derives a shifted window for the read.
///
/// A single write (a `RETURN` landing, a `CODECOPY`) can cover a large
/// range that later loads address piecemeal; the derived window keeps the
/// symbolic offset anchored to the original write.
fn derive_interior_window(frame: &mut Frame, offset: u64) -> Option<NodeRef> {
    let mut derived = None;

    let candidates: Vec<NodeRef> = frame
        .mem_map
        .values()
        .cloned()
        .sorted_by_key(|window| match &*window.borrow() {
            Node::Memory { vm_offset, .. } => *vm_offset,
            _ => u64::MAX,
        })
        .collect();

    for candidate in candidates {
        let shifted = {
            let borrowed = candidate.borrow();
            let Node::Memory {
                offset: sym_offset,
                value,
                vm_offset,
                vm_bytes,
            } = &*borrowed
            else {
                continue;
            };

            let covers = offset >= *vm_offset
                && (offset - *vm_offset + 32) as usize <= vm_bytes.len();
            if !covers {
                continue;
            }

            let delta = offset - *vm_offset;
            node(Node::Memory {
                offset: node(Node::Binary {
                    op: 0x01, // the read sits at (original offset + delta)
                    x: sym_offset.clone(),
                    y: Node::constant(Word::from(delta)),
                    value: Word::ZERO,
                }),
                value: value.clone(),
                vm_offset: offset,
                vm_bytes: vm_bytes[delta as usize..].to_vec(),
            })
        };

        frame.mem_map.insert(offset, shifted.clone());
        derived = Some(shifted);
    }

    derived
}

#[cfg(test)]
mod test {
    use super::HighLevelTracer;
    use crate::{
        trace::{node::Node, optimize, printer},
        vm::{value::Word, Context},
    };

    /// Runs the sample contract to completion under the tracer and returns
    /// the finished trace root.
    fn traced_sample_run() -> anyhow::Result<crate::trace::node::NodeRef> {
        let mut ctx = Context::sample();
        let tracer = HighLevelTracer::new(&ctx);
        ctx.hooks.attach(Box::new(tracer));
        ctx.run(-1)?;

        let root = ctx
            .hooks
            .get_mut(0)
            .unwrap()
            .downcast_ref::<HighLevelTracer>()
            .unwrap()
            .root();
        Ok(root)
    }

    #[test]
    fn shadows_the_whole_sample_run() -> anyhow::Result<()> {
        let root = traced_sample_run()?;
        // The selector comparison and the storage read both appear in the
        // raw trace.
        let rendered = printer::print(&root);
        assert!(rendered.contains("CALL -> "));
        assert!(rendered.contains("func: 3bc5de30"));
        assert!(rendered.contains("Storage["));
        assert!(rendered.contains("if "));
        Ok(())
    }

    #[test]
    fn the_raw_trace_contains_the_selector_idiom() -> anyhow::Result<()> {
        let root = traced_sample_run()?;
        let rendered = printer::print(&root);
        assert!(rendered.contains("(CALLDATALOAD(0x0) >> 0xe0)"));
        Ok(())
    }

    #[test]
    fn optimizing_the_trace_names_the_selector() -> anyhow::Result<()> {
        let mut root = traced_sample_run()?;
        let optimizers = optimize::default_optimizers();
        loop {
            let (new_root, modified) = optimize::optimize(&root, &optimizers);
            root = new_root;
            if !modified {
                break;
            }
        }

        let rendered = printer::print(&root);
        assert!(rendered.contains("func_sig"));
        assert!(!rendered.contains("0xe0"));
        Ok(())
    }

    #[test]
    fn a_cache_missing_sload_reads_as_an_online_write() -> anyhow::Result<()> {
        let root = traced_sample_run()?;
        let rendered = printer::print(&root);
        // Slot zero was served from the preloaded cache; from the replay's
        // point of view that is still an externally supplied value.
        assert!(rendered.contains("= online Storage["));
        Ok(())
    }

    #[test]
    fn dup_shares_the_symbolic_node() -> anyhow::Result<()> {
        // PUSH1 3; DUP1; ADD; STOP. The addition's operands must be the
        // same node, not two equal copies.
        let mut ctx = crate::opcode::test_util::new_context_with_code_and_stack(
            vec![0x60, 0x03, 0x80, 0x01, 0x00],
            vec![],
        )?;
        let tracer = HighLevelTracer::new(&ctx);
        ctx.hooks.attach(Box::new(tracer));
        ctx.run(-1)?;

        let tracer = ctx
            .hooks
            .get_mut(0)
            .unwrap()
            .downcast_ref::<HighLevelTracer>()
            .unwrap();
        let top = tracer.frames[0]
            .stack
            .last()
            .expect("the addition left its result on the stack")
            .clone();
        match &*top.borrow() {
            Node::Binary { x, y, value, .. } => {
                assert!(std::rc::Rc::ptr_eq(x, y));
                assert_eq!(*value, Word::from(6u64));
            }
            other => panic!("expected the ADD node on top, found {other:?}"),
        }
        Ok(())
    }
}
