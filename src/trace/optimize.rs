//! This module contains the peephole optimizers that rewrite the symbolic
//! DAG into readable pseudo-expressions, and the driver that applies them.

use std::fmt::Debug;

use crate::{
    trace::{
        node::{structurally_equal, Node, NodeRef},
        walker::{walk, Cursor},
    },
    vm::value::Word,
};

/// Opcode bytes the optimizers match on.
const ADD: u8 = 0x01;
const SUB: u8 = 0x03;
const ISZERO: u8 = 0x15;
const AND: u8 = 0x16;
const NOT: u8 = 0x19;
const SHL: u8 = 0x1b;
const SHR: u8 = 0x1c;
const SAR: u8 = 0x1d;
const CALLDATALOAD: u8 = 0x35;

/// A single rewriting rule applied at every node of a walk.
pub trait Optimizer
where
    Self: Debug,
{
    /// Applies the rule at the cursor, returning whether the DAG was
    /// modified.
    fn apply(&self, cursor: &mut Cursor) -> bool;
}

/// The standard set of rewriting rules, in application order.
#[must_use]
pub fn default_optimizers() -> Vec<Box<dyn Optimizer>> {
    vec![
        Box::new(FunSig),
        Box::new(CounterUnary),
        Box::new(CounterBinary),
        Box::new(ProxyEip1967),
        Box::new(SignCast),
    ]
}

/// Runs a single walk over the DAG rooted at `root`, applying every rule in
/// `optimizers` at every node.
///
/// Returns the (possibly replaced) root and whether anything changed; run to
/// a fixed point by iterating until the flag comes back `false`.
pub fn optimize(root: &NodeRef, optimizers: &[Box<dyn Optimizer>]) -> (NodeRef, bool) {
    let mut modified = false;
    let new_root = walk(root, &mut |cursor| {
        for optimizer in optimizers {
            if optimizer.apply(cursor) {
                modified = true;
            }
        }
    });
    (new_root, modified)
}

/// Evaluates a node to a constant where the expression is built from
/// constants under NOT, ADD, SUB and the shift operators.
///
/// The masks matched by [`SignCast`] are often spelled `((0x1 << k) - 0x1)`
/// in compiled code; this folding is what lets them be recognised.
#[must_use]
pub fn evaluate_const(n: &NodeRef) -> Option<Word> {
    match &*n.borrow() {
        Node::Const { value } => Some(*value),
        Node::Unary { op: NOT, x, .. } => Some(evaluate_const(x)?.not()),
        Node::Binary { op, x, y, .. } => {
            let x = evaluate_const(x)?;
            let y = evaluate_const(y)?;
            match *op {
                ADD => Some(x.wrapping_add(y)),
                SUB => Some(x.wrapping_sub(y)),
                SHL => Some(x.shl(y)),
                SHR => Some(x.shr(y)),
                SAR => Some(x.sar(y)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Replaces the selector-extraction idiom
/// `(CALLDATALOAD(0x0) >> 0xe0)` with the label `func_sig`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FunSig;

impl FunSig {
    /// The exact shape of the selector extraction.
    fn sample() -> NodeRef {
        crate::trace::node::node(Node::Binary {
            op: SHR,
            x: crate::trace::node::node(Node::Unary {
                op: CALLDATALOAD,
                x: Node::constant(Word::ZERO),
                value: Word::ZERO,
            }),
            y: Node::constant(Word::from(0xe0u64)),
            value: Word::ZERO,
        })
    }
}

impl Optimizer for FunSig {
    fn apply(&self, cursor: &mut Cursor) -> bool {
        if structurally_equal(&Self::sample(), cursor.node()) {
            cursor.replace(Node::label("func_sig"));
            return true;
        }
        false
    }
}

/// Replaces the well-known EIP-1967 proxy slot constants with readable
/// labels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProxyEip1967;

/// `keccak256("eip1967.proxy.implementation") - 1`.
const PROXY_EIP1967_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// `keccak256("eip1967.proxy.admin") - 1`.
const PROXY_EIP1967_ADMIN: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";

impl Optimizer for ProxyEip1967 {
    fn apply(&self, cursor: &mut Cursor) -> bool {
        let value = match &*cursor.node().borrow() {
            Node::Const { value } => *value,
            _ => return false,
        };

        let slot = Word::from_hex_str(PROXY_EIP1967_SLOT)
            .expect("the EIP-1967 slot constant is valid hex");
        let admin = Word::from_hex_str(PROXY_EIP1967_ADMIN)
            .expect("the EIP-1967 admin constant is valid hex");

        if value == slot {
            cursor.replace(Node::label("PROXY_EIP1967_SLOT"));
            true
        } else if value == admin {
            cursor.replace(Node::label("PROXY_EIP1967_ADMIN"));
            true
        } else {
            false
        }
    }
}

/// Collapses a self-cancelling pair of unary operators: `!(!(x))` and
/// `~(~(x))` reduce to `x`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterUnary;

impl Optimizer for CounterUnary {
    fn apply(&self, cursor: &mut Cursor) -> bool {
        let inner_x = {
            let outer = cursor.node().borrow();
            let Node::Unary { op: outer_op, x, .. } = &*outer else {
                return false;
            };
            if !matches!(*outer_op, ISZERO | NOT) {
                return false;
            }
            let inner = x.borrow();
            match &*inner {
                Node::Unary { op: inner_op, x, .. } if inner_op == outer_op => x.clone(),
                _ => return false,
            }
        };

        cursor.replace(inner_x);
        true
    }
}

/// Collapses an add/sub pair around the same constant:
/// `(c + (x - c))` and `(c - (x + c))` reduce to `x`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterBinary;

fn is_counter_op(op1: u8, op2: u8) -> bool {
    matches!((op1, op2), (ADD, SUB) | (SUB, ADD))
}

impl Optimizer for CounterBinary {
    fn apply(&self, cursor: &mut Cursor) -> bool {
        let inner_x = {
            let outer = cursor.node().borrow();
            let Node::Binary {
                op: outer_op,
                x: outer_x,
                y: outer_y,
                ..
            } = &*outer
            else {
                return false;
            };
            let inner = outer_y.borrow();
            let Node::Binary {
                op: inner_op,
                x: inner_x,
                y: inner_y,
                ..
            } = &*inner
            else {
                return false;
            };
            if !is_counter_op(*outer_op, *inner_op) {
                return false;
            }
            if !matches!(&*outer_x.borrow(), Node::Const { .. }) {
                return false;
            }
            if !structurally_equal(outer_x, inner_y) {
                return false;
            }
            inner_x.clone()
        };

        cursor.replace(inner_x);
        true
    }
}

/// Removes the truncating masks that compilers insert around address and
/// fixed-width casts: `(mask & x)` or `(x & mask)` reduces to `x` when
/// `mask` evaluates to a recognised all-ones pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignCast;

/// The recognised cast masks: 20-byte (address) low and high, 16-byte low
/// and high, and the full-width mask.
const CAST_MASKS: [&str; 5] = [
    "0xffffffffffffffffffffffffffffffffffffffff",
    "0xffffffffffffffffffffffffffffffffffffffff000000000000000000000000",
    "0xffffffffffffffffffffffffffffffff",
    "0xffffffffffffffffffffffffffffffff00000000000000000000000000000000",
    "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
];

impl SignCast {
    /// Checks whether the operand evaluates to one of the recognised masks.
    ///
    /// The mask is often not a literal: compiled code writes it as
    /// `((0x1 << 0xa0) - 0x1)` or under a `NOT`, so the operand is
    /// constant-folded first.
    fn is_mask(operand: &NodeRef) -> bool {
        let Some(value) = evaluate_const(operand) else {
            return false;
        };
        CAST_MASKS.iter().any(|mask| {
            Word::from_hex_str(mask).expect("the cast masks are valid hex") == value
        })
    }
}

impl Optimizer for SignCast {
    fn apply(&self, cursor: &mut Cursor) -> bool {
        let replacement = {
            let borrowed = cursor.node().borrow();
            let Node::Binary { op: AND, x, y, .. } = &*borrowed else {
                return false;
            };
            if Self::is_mask(x) {
                y.clone()
            } else if Self::is_mask(y) {
                x.clone()
            } else {
                return false;
            }
        };

        cursor.replace(replacement);
        true
    }
}

#[cfg(test)]
mod test {
    use super::{
        default_optimizers,
        optimize,
        CounterBinary,
        CounterUnary,
        FunSig,
        Optimizer,
        SignCast,
    };
    use crate::{
        trace::node::{node, Node, NodeRef},
        vm::value::Word,
    };

    fn unary(op: u8, x: NodeRef) -> NodeRef {
        node(Node::Unary {
            op,
            x,
            value: Word::ZERO,
        })
    }

    fn binary(op: u8, x: NodeRef, y: NodeRef) -> NodeRef {
        node(Node::Binary {
            op,
            x,
            y,
            value: Word::ZERO,
        })
    }

    fn single(optimizer: impl Optimizer + 'static) -> Vec<Box<dyn Optimizer>> {
        vec![Box::new(optimizer)]
    }

    #[test]
    fn recognises_the_function_selector_idiom() {
        // (0x11223344 == (CALLDATALOAD(0x0) >> 0xe0))
        let root = binary(
            0x14, // EQ
            Node::constant(Word::from(0x1122_3344u64)),
            binary(
                0x1c, // SHR
                unary(0x35, Node::constant(Word::ZERO)), // CALLDATALOAD
                Node::constant(Word::from(0xe0u64)),
            ),
        );

        let (optimized, modified) = optimize(&root, &single(FunSig));
        assert!(modified);
        assert_eq!(
            optimized.borrow().to_string(),
            "(0x11223344 == func_sig)"
        );
    }

    #[test]
    fn collapses_counteracting_binary_ops() {
        // (0x4 + (x - 0x4)) -> x
        let root = binary(
            0x01, // ADD
            Node::constant(Word::from(4u64)),
            binary(
                0x03, // SUB
                Node::label("x"),
                Node::constant(Word::from(4u64)),
            ),
        );

        let (optimized, modified) = optimize(&root, &single(CounterBinary));
        assert!(modified);
        assert_eq!(optimized.borrow().to_string(), "x");
    }

    #[test]
    fn collapses_double_negation() {
        // !(!(x)) -> x
        let root = unary(0x15, unary(0x15, Node::label("x")));

        let (optimized, modified) = optimize(&root, &single(CounterUnary));
        assert!(modified);
        assert_eq!(optimized.borrow().to_string(), "x");
    }

    #[test]
    fn mixed_unary_operators_do_not_collapse() {
        // !(~(x)) must stay as it is.
        let root = unary(0x15, unary(0x19, Node::label("x")));
        let (_, modified) = optimize(&root, &single(CounterUnary));
        assert!(!modified);
    }

    #[test]
    fn strips_computed_cast_masks() {
        // ((CALLER << 0x60) & ~((0x1 << 0x60) - 0x1)) -> (CALLER << 0x60)
        //
        // The mask here is NOT of (2^96 - 1), which is the high 20-byte
        // mask.
        let shifted_caller = binary(
            0x1b, // SHL: value first, shift second
            node(Node::Nullary {
                op: 0x33, // CALLER
                value: Word::ZERO,
            }),
            Node::constant(Word::from(0x60u64)),
        );
        let mask = unary(
            0x19, // NOT
            binary(
                0x03, // SUB
                binary(
                    0x1b, // SHL
                    Node::constant(Word::ONE),
                    Node::constant(Word::from(0x60u64)),
                ),
                Node::constant(Word::ONE),
            ),
        );
        let root = binary(0x16, shifted_caller, mask);

        let (optimized, modified) = optimize(&root, &single(SignCast));
        assert!(modified);
        assert_eq!(optimized.borrow().to_string(), "(CALLER << 0x60)");
    }

    #[test]
    fn repeated_application_reaches_a_fixed_point() {
        // !(!(!(!(func-sig-shape)))) with an outer counter pair and the
        // selector idiom inside; a few rounds must fully simplify it and
        // then report no further changes.
        let selector = binary(
            0x1c,
            unary(0x35, Node::constant(Word::ZERO)),
            Node::constant(Word::from(0xe0u64)),
        );
        let mut root = selector;
        for _ in 0..2 {
            root = unary(0x15, unary(0x15, root));
        }

        let optimizers = default_optimizers();
        let mut rounds = 0;
        loop {
            let (new_root, modified) = optimize(&root, &optimizers);
            root = new_root;
            if !modified {
                break;
            }
            rounds += 1;
            assert!(rounds < 10, "optimization failed to reach a fixed point");
        }
        assert_eq!(root.borrow().to_string(), "func_sig");
    }
}
