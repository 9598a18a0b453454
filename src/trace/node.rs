//! This module contains the symbolic IR that the high-level tracer builds:
//! a DAG of tagged expression nodes mirroring what a concrete execution
//! computed.
//!
//! # Ownership
//!
//! A node may be referenced from several parents at once: a memory window
//! sits in the frame's memory map *and* inside a trace entry, and a hash node
//! is both pushed on the symbolic stack and wrapped by its trace marker. The
//! nodes therefore live behind [`NodeRef`] handles (`Rc<RefCell<_>>`), which
//! preserves the DAG shape and lets the optimizers rewrite shared children in
//! place.
//!
//! # Identity
//!
//! [`Node::Sha3`] and [`Node::ReturnValue`] print as generated variables.
//! Their identity is a [`Uuid`] rather than their structural value, so two
//! hashes of identical bytes still print as distinct variables.

use std::{
    cell::RefCell,
    fmt::{Display, Formatter},
    rc::Rc,
};

use ethnum::U256;
use uuid::Uuid;

use crate::{
    trace::{optimize, printer},
    utility,
    vm::value::{Address, Word},
};

/// A shared handle to a node in the symbolic DAG.
pub type NodeRef = Rc<RefCell<Node>>;

/// Wraps a node into a fresh [`NodeRef`].
#[must_use]
pub fn node(n: Node) -> NodeRef {
    Rc::new(RefCell::new(n))
}

/// One node of the symbolic expression DAG.
///
/// The walker's child enumeration and the printer's rendering are both
/// defined over these variants; a flat enum keeps pattern matching in the
/// peephole optimizers direct.
#[derive(Clone, Debug)]
pub enum Node {
    /// A literal word, from a `PUSH` or synthesized by a rewrite.
    Const { value: Word },

    /// A free-form marker, such as `func_sig` or `Reverted`.
    Label { text: String },

    /// An environment getter with no operands, tagged with the concrete
    /// value it produced.
    Nullary { op: u8, value: Word },

    /// A one-operand computation.
    Unary { op: u8, x: NodeRef, value: Word },

    /// A two-operand computation; `x` is the first operand as read (for the
    /// shift family the operands are stored value-first).
    Binary {
        op: u8,
        x: NodeRef,
        y: NodeRef,
        value: Word,
    },

    /// A three-operand computation.
    Ternary {
        op: u8,
        x: NodeRef,
        y: NodeRef,
        z: NodeRef,
        value: Word,
    },

    /// A conditional jump, recording which way the concrete execution went.
    If { cond: NodeRef, taken: bool, pc: u64 },

    /// An ordered sequence of trace entries. Currently only used as the
    /// anchor for whole-tree rewriting.
    Block { body: Vec<NodeRef> },

    /// One invocation in the symbolic trace: the outer transaction or a
    /// nested call, with its ordered trace entries as the body.
    Call {
        op: u8,
        target: Address,
        input: Vec<u8>,
        body: Vec<NodeRef>,
    },

    /// A named window of concrete memory: a symbolic offset and value, plus
    /// the concrete offset and bytes observed by the machine.
    Memory {
        offset: NodeRef,
        value: NodeRef,
        vm_offset: u64,
        vm_bytes: Vec<u8>,
    },

    /// A trace entry recording that a memory window was written.
    MemoryWrite { memory: NodeRef, dump: bool },

    /// A storage slot access: the symbolic slot and the value read from or
    /// written into it.
    Storage { slot: NodeRef, value: NodeRef },

    /// A trace entry recording a storage write. A cache-missing `SLOAD`
    /// that went to the chain is also recorded as a write, flagged with
    /// `online_fetch`: semantically the chain supplied the value.
    StorageWrite { storage: NodeRef, online_fetch: bool },

    /// A keccak-256 computation over a set of memory windows.
    Sha3 {
        id: Uuid,
        inputs: Vec<NodeRef>,
        offset: u64,
        size: u64,
        value: Word,
    },

    /// A trace marker whose rendering shows the full pre-image of a
    /// [`Node::Sha3`].
    Sha3Calc { sha3: NodeRef },

    /// The otherwise-opaque value returned by an inner call; prints as a
    /// generated variable.
    ReturnValue { id: Uuid },

    /// A trace entry recording an inner call's return data landing in the
    /// caller's memory.
    Return { return_value: NodeRef, memory: NodeRef },

    /// An emitted log: its topics and the memory windows inside its data
    /// range.
    Log { topics: Vec<NodeRef>, mem: Vec<NodeRef> },

    /// An inline-executed precompiled contract call.
    Precompiled { to: Address, input: Option<NodeRef> },

    /// A bare value transfer (a `CALL` with no input data).
    MoneyTransfer { to: Address, amount: Word },
}

impl Node {
    /// Creates a constant node.
    #[must_use]
    pub fn constant(value: Word) -> NodeRef {
        node(Node::Const { value })
    }

    /// Creates a label node.
    #[must_use]
    pub fn label(text: impl Into<String>) -> NodeRef {
        node(Node::Label { text: text.into() })
    }

    /// Creates a fresh return-value variable.
    #[must_use]
    pub fn return_value() -> NodeRef {
        node(Node::ReturnValue { id: Uuid::new_v4() })
    }

    /// Creates an invocation node with an empty body.
    #[must_use]
    pub fn call(op: u8, target: Address, input: Vec<u8>) -> NodeRef {
        node(Node::Call {
            op,
            target,
            input,
            body: vec![],
        })
    }

    /// Gets the concrete value this node was tagged with, for the variants
    /// that carry one.
    #[must_use]
    pub fn value(&self) -> Option<Word> {
        match self {
            Node::Const { value }
            | Node::Nullary { value, .. }
            | Node::Unary { value, .. }
            | Node::Binary { value, .. }
            | Node::Ternary { value, .. }
            | Node::Sha3 { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Structural equality over the pattern-matchable subset of the IR:
/// constants, labels, and unary/binary computations. Node variants outside
/// that subset never compare equal.
#[must_use]
pub fn structurally_equal(a: &NodeRef, b: &NodeRef) -> bool {
    match (&*a.borrow(), &*b.borrow()) {
        (Node::Const { value: va }, Node::Const { value: vb }) => va == vb,
        (Node::Label { text: ta }, Node::Label { text: tb }) => ta == tb,
        (Node::Unary { op: oa, x: xa, .. }, Node::Unary { op: ob, x: xb, .. }) => {
            oa == ob && structurally_equal(xa, xb)
        }
        (
            Node::Binary {
                op: oa,
                x: xa,
                y: ya,
                ..
            },
            Node::Binary {
                op: ob,
                x: xb,
                y: yb,
                ..
            },
        ) => oa == ob && structurally_equal(xa, xb) && structurally_equal(ya, yb),
        _ => false,
    }
}

/// Renders the single-line (or, for the trace markers, multi-line) textual
/// form of each node.
///
/// The indented layout of a whole trace is the printer's job; these
/// renderings are its building blocks.
impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Const { value } => write!(f, "{value}"),
            Node::Label { text } => write!(f, "{text}"),
            Node::Nullary { op, .. } => write!(f, "{}", printer::pretty_op(*op)),
            Node::Unary { op, x, .. } => {
                write!(f, "{}({})", printer::pretty_op(*op), x.borrow())
            }
            Node::Binary { op, x, y, .. } => {
                write!(
                    f,
                    "({} {} {})",
                    x.borrow(),
                    printer::pretty_op(*op),
                    y.borrow()
                )
            }
            Node::Ternary { op, x, y, z, .. } => {
                write!(
                    f,
                    "{}({}, {}, {})",
                    printer::pretty_op(*op),
                    x.borrow(),
                    y.borrow(),
                    z.borrow()
                )
            }
            Node::If { cond, taken, .. } => {
                let arm = if *taken { "<yes>" } else { "<no>" };
                write!(f, "if {} {arm}", cond.borrow())
            }
            Node::Block { body } => {
                writeln!(f, "{{")?;
                for child in body {
                    writeln!(f, "\t{}", child.borrow())?;
                }
                write!(f, "}}")
            }
            Node::Call { .. } => write!(f, "use the printer to render a call trace"),
            Node::Memory { offset, .. } => write!(f, "Memory[{}]", offset.borrow()),
            Node::MemoryWrite { memory, dump } => {
                let memory = memory.borrow();
                let Node::Memory {
                    offset,
                    value,
                    vm_bytes,
                    ..
                } = &*memory
                else {
                    return write!(f, "MemoryWrite(?)");
                };
                write!(f, "Memory[{}] = {}", offset.borrow(), value.borrow())?;

                // A stored word is sometimes text, such as a revert reason;
                // show the decoding alongside when it is printable.
                if let Some(text) = utf8_word(&value.borrow()) {
                    write!(f, " (\"{text}\")")?;
                }
                if *dump {
                    write!(f, "\n{}", utility::hex_dump(vm_bytes, 0))?;
                }
                Ok(())
            }
            Node::Storage { slot, .. } => write!(f, "Storage[{}]", slot.borrow()),
            Node::StorageWrite {
                storage,
                online_fetch,
            } => {
                let storage = storage.borrow();
                let Node::Storage { slot, value } = &*storage else {
                    return write!(f, "StorageWrite(?)");
                };
                if *online_fetch {
                    write!(f, "{} = online Storage[{}]", value.borrow(), slot.borrow())
                } else {
                    write!(f, "Storage[{}] = {}", slot.borrow(), value.borrow())?;
                    // Show the folded number when the written expression
                    // evaluates to a constant it does not already look like.
                    if let Some(folded) = optimize::evaluate_const(value) {
                        if folded.to_string() != value.borrow().to_string() {
                            write!(f, " ({folded})")?;
                        }
                    }
                    Ok(())
                }
            }
            Node::Sha3 { id, .. } => write!(f, "Sha3_{}", utility::clip_uuid(id)),
            Node::Sha3Calc { sha3 } => {
                let sha3 = sha3.borrow();
                let Node::Sha3 { inputs, value, .. } = &*sha3 else {
                    return write!(f, "Sha3Calc(?)");
                };
                writeln!(f)?;
                writeln!(f, "{} = [", sha3)?;
                for memory in sorted_by_vm_offset(inputs) {
                    write_memory_window(f, &memory)?;
                }
                writeln!(f, "] -> {value}")
            }
            Node::ReturnValue { id } => write!(f, "ReturnVal_{}", utility::clip_uuid(id)),
            Node::Return {
                return_value,
                memory,
            } => {
                let memory = memory.borrow();
                let bytes = match &*memory {
                    Node::Memory { vm_bytes, .. } => vm_bytes.as_slice(),
                    _ => &[],
                };
                write!(
                    f,
                    "{}: [\n{}]",
                    return_value.borrow(),
                    utility::hex_dump(bytes, 0)
                )
            }
            Node::Log { topics, mem } => {
                let topics = topics
                    .iter()
                    .map(|topic| topic.borrow().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "Log ({topics})")?;
                writeln!(f, "Memory: [")?;
                for memory in sorted_by_vm_offset(mem) {
                    write_memory_window(f, &memory)?;
                }
                writeln!(f, "]")
            }
            Node::Precompiled { to, input } => {
                let bytes = input
                    .as_ref()
                    .map(|memory| match &*memory.borrow() {
                        Node::Memory { vm_bytes, .. } => vm_bytes.clone(),
                        _ => vec![],
                    })
                    .unwrap_or_default();
                write!(
                    f,
                    "Call Precompiled {to}, input: [\n{}]",
                    utility::hex_dump(&bytes, 0)
                )
            }
            Node::MoneyTransfer { to, amount } => {
                writeln!(
                    f,
                    "Transfer {}({}) -> {}",
                    U256::from(*amount),
                    amount,
                    to
                )
            }
        }
    }
}

/// Writes one memory window of a multi-window rendering: its symbolic value,
/// then the hex dump of its concrete bytes at their true offsets.
fn write_memory_window(f: &mut Formatter<'_>, memory: &NodeRef) -> std::fmt::Result {
    let memory = memory.borrow();
    let Node::Memory {
        value,
        vm_offset,
        vm_bytes,
        ..
    } = &*memory
    else {
        return Ok(());
    };
    writeln!(f, "{}:", value.borrow())?;
    write!(f, "{}", utility::hex_dump(vm_bytes, *vm_offset as usize))
}

/// Sorts memory-window handles ascending by their concrete offset, so dumps
/// read in address order.
fn sorted_by_vm_offset(windows: &[NodeRef]) -> Vec<NodeRef> {
    let mut sorted = windows.to_vec();
    sorted.sort_by_key(|window| match &*window.borrow() {
        Node::Memory { vm_offset, .. } => *vm_offset,
        _ => u64::MAX,
    });
    sorted
}

/// Decodes a node's rendered value as UTF-8 text when it is a word whose
/// bytes are printable.
fn utf8_word(value: &Node) -> Option<String> {
    let word = Word::from_hex_str(&value.to_string())?;
    let bytes = word.to_be_bytes();
    let trimmed: Vec<u8> = bytes.iter().copied().skip_while(|byte| *byte == 0).collect();
    if trimmed.is_empty() {
        return None;
    }
    let text = String::from_utf8(trimmed).ok()?;
    text.chars()
        .all(|ch| !ch.is_control())
        .then_some(text)
}

#[cfg(test)]
mod test {
    use super::{structurally_equal, Node};
    use crate::vm::value::Word;

    #[test]
    fn renders_expressions_in_infix_form() {
        let selector = super::node(Node::Binary {
            op: 0x1c, // SHR
            x: super::node(Node::Unary {
                op: 0x35, // CALLDATALOAD
                x: Node::constant(Word::ZERO),
                value: Word::ZERO,
            }),
            y: Node::constant(Word::from(0xe0u64)),
            value: Word::ZERO,
        });
        assert_eq!(selector.borrow().to_string(), "(CALLDATALOAD(0x0) >> 0xe0)");
    }

    #[test]
    fn equality_ignores_tagged_values() {
        let a = super::node(Node::Unary {
            op: 0x15,
            x: Node::constant(Word::ONE),
            value: Word::from(7u64),
        });
        let b = super::node(Node::Unary {
            op: 0x15,
            x: Node::constant(Word::ONE),
            value: Word::from(9u64),
        });
        assert!(structurally_equal(&a, &b));
    }

    #[test]
    fn equality_is_structural_not_referential() {
        let a = Node::constant(Word::from(4u64));
        let b = Node::constant(Word::from(4u64));
        let c = Node::constant(Word::from(5u64));
        assert!(structurally_equal(&a, &b));
        assert!(structurally_equal(&a, &a));
        assert!(!structurally_equal(&a, &c));

        // Different variants never compare equal.
        let label = Node::label("4");
        assert!(!structurally_equal(&a, &label));
    }

    #[test]
    fn distinct_hashes_print_as_distinct_variables() {
        let a = super::node(Node::Sha3 {
            id: uuid::Uuid::new_v4(),
            inputs: vec![],
            offset: 0,
            size: 32,
            value: Word::ONE,
        });
        let b = super::node(Node::Sha3 {
            id: uuid::Uuid::new_v4(),
            inputs: vec![],
            offset: 0,
            size: 32,
            value: Word::ONE,
        });
        assert_ne!(a.borrow().to_string(), b.borrow().to_string());
    }

    #[test]
    fn memory_writes_reveal_text_payloads() {
        let text_word = Word::from_be_slice(b"SafeMath: subtraction overflow");
        let write = super::node(Node::MemoryWrite {
            memory: super::node(Node::Memory {
                offset: Node::constant(Word::from(0x84u64)),
                value: Node::constant(text_word),
                vm_offset: 0x84,
                vm_bytes: vec![],
            }),
            dump: false,
        });
        let rendered = write.borrow().to_string();
        assert!(rendered.contains("(\"SafeMath: subtraction overflow\")"));
    }
}
