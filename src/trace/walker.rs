//! This module contains the generic traversal over the symbolic DAG: a
//! post-order walk that hands the visitor a [`Cursor`] through which the
//! current node can be replaced and, inside ordered lists, deleted or
//! surrounded with insertions.

use crate::trace::node::{node, Node, NodeRef};

/// The field of a parent node that holds the child currently under the
/// cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    /// The first operand of a computation.
    X,
    /// The second operand of a computation.
    Y,
    /// The third operand of a computation.
    Z,
    /// The condition of an `If`.
    Cond,
    /// The symbolic offset of a memory window.
    Offset,
    /// The value of a memory window or storage access.
    Val,
    /// The memory window of a write or return entry.
    Memory,
    /// The storage access of a storage-write entry.
    Storage,
    /// The slot of a storage access.
    Slot,
    /// The hash wrapped by a `Sha3Calc`.
    Sha3,
    /// The variable of a return entry.
    ReturnValue,
    /// The input window of a precompiled call.
    Input,
    /// The ordered input windows of a hash. List field.
    Inputs,
    /// The topics of a log. List field.
    Topics,
    /// The memory windows of a log. List field.
    Mem,
    /// The trace entries of a call or block. List field.
    Body,
}

/// The iteration state of the list currently being walked, adjusted by the
/// cursor's insert and delete operations.
#[derive(Debug)]
struct ListIter {
    index: usize,
    step: isize,
}

/// The visitor's handle onto the current node.
///
/// Replacement works everywhere. Insertion and deletion only make sense
/// inside ordered lists (a hash's inputs, a log's topics or windows, a call
/// body) and panic elsewhere; that is a visitor bug, not an input condition.
pub struct Cursor<'i> {
    parent: NodeRef,
    field: Field,
    iter: Option<&'i mut ListIter>,
    node: NodeRef,
}

impl Cursor<'_> {
    /// Gets the node under the cursor.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Gets the index of the node within its containing list, or [`None`]
    /// when the node is not a list element.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.iter.as_ref().map(|iter| iter.index)
    }

    /// Replaces the node under the cursor with `new`.
    ///
    /// The replacement is not itself walked.
    pub fn replace(&mut self, new: NodeRef) {
        match self.index() {
            Some(index) => self.with_list(|list| list[index] = new),
            None => self.with_single(|slot| *slot = new),
        }
    }

    /// Deletes the node under the cursor from its containing list.
    ///
    /// # Panics
    ///
    /// If the node is not a list element.
    pub fn delete(&mut self) {
        let index = self.index().expect("delete outside of a list");
        self.with_list(|list| {
            list.remove(index);
        });
        if let Some(iter) = self.iter.as_mut() {
            iter.step -= 1;
        }
    }

    /// Inserts `new` after the node under the cursor in its containing list.
    ///
    /// The walk does not visit `new`.
    ///
    /// # Panics
    ///
    /// If the node is not a list element.
    pub fn insert_after(&mut self, new: NodeRef) {
        let index = self.index().expect("insert_after outside of a list");
        self.with_list(|list| list.insert(index + 1, new));
        if let Some(iter) = self.iter.as_mut() {
            iter.step += 1;
        }
    }

    /// Inserts `new` before the node under the cursor in its containing
    /// list.
    ///
    /// The walk does not visit `new`.
    ///
    /// # Panics
    ///
    /// If the node is not a list element.
    pub fn insert_before(&mut self, new: NodeRef) {
        let index = self.index().expect("insert_before outside of a list");
        self.with_list(|list| list.insert(index, new));
        if let Some(iter) = self.iter.as_mut() {
            iter.index += 1;
        }
    }

    /// Runs `f` over the single child slot this cursor points at.
    fn with_single(&self, f: impl FnOnce(&mut NodeRef)) {
        let mut parent = self.parent.borrow_mut();
        let slot: &mut NodeRef = match (&mut *parent, self.field) {
            (Node::Unary { x, .. }, Field::X)
            | (Node::Binary { x, .. }, Field::X)
            | (Node::Ternary { x, .. }, Field::X) => x,
            (Node::Binary { y, .. }, Field::Y) | (Node::Ternary { y, .. }, Field::Y) => y,
            (Node::Ternary { z, .. }, Field::Z) => z,
            (Node::If { cond, .. }, Field::Cond) => cond,
            (Node::Memory { offset, .. }, Field::Offset) => offset,
            (Node::Memory { value, .. }, Field::Val)
            | (Node::Storage { value, .. }, Field::Val) => value,
            (Node::MemoryWrite { memory, .. }, Field::Memory)
            | (Node::Return { memory, .. }, Field::Memory) => memory,
            (Node::Storage { slot, .. }, Field::Slot) => slot,
            (Node::StorageWrite { storage, .. }, Field::Storage) => storage,
            (Node::Sha3Calc { sha3 }, Field::Sha3) => sha3,
            (Node::Return { return_value, .. }, Field::ReturnValue) => return_value,
            (Node::Precompiled {
                input: Some(input), ..
            }, Field::Input) => input,
            (parent, field) => {
                unreachable!("no child slot {field:?} on {parent:?}")
            }
        };
        f(slot);
    }

    /// Runs `f` over the list this cursor's node is an element of.
    fn with_list(&self, f: impl FnOnce(&mut Vec<NodeRef>)) {
        let mut parent = self.parent.borrow_mut();
        let list = list_field(&mut parent, self.field);
        f(list);
    }
}

/// Gets the list field `field` of `parent`.
fn list_field<'n>(parent: &'n mut Node, field: Field) -> &'n mut Vec<NodeRef> {
    match (parent, field) {
        (Node::Sha3 { inputs, .. }, Field::Inputs) => inputs,
        (Node::Log { topics, .. }, Field::Topics) => topics,
        (Node::Log { mem, .. }, Field::Mem) => mem,
        (Node::Block { body, .. }, Field::Body) | (Node::Call { body, .. }, Field::Body) => body,
        (parent, field) => unreachable!("no list field {field:?} on {parent:?}"),
    }
}

/// The visitor callback type.
pub type WalkFn<'f> = dyn FnMut(&mut Cursor) + 'f;

/// Walks the DAG rooted at `root` post-order (children first, then the node
/// itself), invoking `f` at every node, and returns the (possibly replaced)
/// root.
pub fn walk(root: &NodeRef, f: &mut WalkFn) -> NodeRef {
    // Anchoring the root in a single-element block lets the visitor replace
    // the root like any other node.
    let holder = node(Node::Block {
        body: vec![root.clone()],
    });
    walk_list(&holder, Field::Body, f);

    let holder = holder.borrow();
    match &*holder {
        Node::Block { body } => body.first().cloned().unwrap_or_else(|| root.clone()),
        _ => root.clone(),
    }
}

/// The child slots of each variant, in visiting order.
enum ChildSpec {
    One(Field, NodeRef),
    List(Field),
}

fn children_of(n: &NodeRef) -> Vec<ChildSpec> {
    use ChildSpec::{List, One};

    match &*n.borrow() {
        Node::Const { .. }
        | Node::Label { .. }
        | Node::Nullary { .. }
        | Node::ReturnValue { .. }
        | Node::MoneyTransfer { .. } => vec![],
        Node::Unary { x, .. } => vec![One(Field::X, x.clone())],
        Node::Binary { x, y, .. } => {
            vec![One(Field::X, x.clone()), One(Field::Y, y.clone())]
        }
        Node::Ternary { x, y, z, .. } => vec![
            One(Field::X, x.clone()),
            One(Field::Y, y.clone()),
            One(Field::Z, z.clone()),
        ],
        Node::If { cond, .. } => vec![One(Field::Cond, cond.clone())],
        Node::Block { .. } | Node::Call { .. } => vec![List(Field::Body)],
        Node::Memory { offset, value, .. } => vec![
            One(Field::Offset, offset.clone()),
            One(Field::Val, value.clone()),
        ],
        Node::MemoryWrite { memory, .. } => vec![One(Field::Memory, memory.clone())],
        Node::Storage { slot, value } => vec![
            One(Field::Slot, slot.clone()),
            One(Field::Val, value.clone()),
        ],
        Node::StorageWrite { storage, .. } => vec![One(Field::Storage, storage.clone())],
        Node::Sha3 { .. } => vec![List(Field::Inputs)],
        Node::Sha3Calc { sha3 } => vec![One(Field::Sha3, sha3.clone())],
        Node::Return {
            return_value,
            memory,
        } => vec![
            One(Field::ReturnValue, return_value.clone()),
            One(Field::Memory, memory.clone()),
        ],
        Node::Log { .. } => vec![List(Field::Topics), List(Field::Mem)],
        Node::Precompiled { input, .. } => match input {
            Some(input) => vec![One(Field::Input, input.clone())],
            None => vec![],
        },
    }
}

/// Walks one node: its children first, then the node itself.
fn walk_node(parent: &NodeRef, field: Field, iter: Option<&mut ListIter>, n: &NodeRef, f: &mut WalkFn) {
    for child in children_of(n) {
        match child {
            ChildSpec::One(child_field, child_node) => {
                walk_node(n, child_field, None, &child_node, f);
            }
            ChildSpec::List(child_field) => walk_list(n, child_field, f),
        }
    }

    let mut cursor = Cursor {
        parent: parent.clone(),
        field,
        iter,
        node: n.clone(),
    };
    f(&mut cursor);
}

/// Walks every element of the list field `field` of `parent`, re-reading the
/// list between elements so cursor mutations take effect immediately.
fn walk_list(parent: &NodeRef, field: Field, f: &mut WalkFn) {
    let mut iter = ListIter { index: 0, step: 1 };
    loop {
        let element = {
            let mut borrowed = parent.borrow_mut();
            let list = list_field(&mut borrowed, field);
            if iter.index >= list.len() {
                break;
            }
            list[iter.index].clone()
        };

        iter.step = 1;
        walk_node(parent, field, Some(&mut iter), &element, f);
        iter.index = iter.index.saturating_add_signed(iter.step);
    }
}

#[cfg(test)]
mod test {
    use super::walk;
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

    #[test]
    fn visits_children_before_parents() {
        let inner = Node::constant(Word::ONE);
        let outer = unary(0x15, unary(0x15, inner));

        let mut visited = vec![];
        walk(&outer, &mut |cursor| {
            visited.push(match &*cursor.node().borrow() {
                Node::Const { .. } => "const",
                Node::Unary { .. } => "unary",
                _ => "other",
            });
        });
        assert_eq!(visited, vec!["const", "unary", "unary"]);
    }

    #[test]
    fn the_root_itself_can_be_replaced() {
        let root = unary(0x15, Node::constant(Word::ONE));
        let new_root = walk(&root, &mut |cursor| {
            if matches!(&*cursor.node().borrow(), Node::Unary { .. }) {
                cursor.replace(Node::label("gone"));
            }
        });
        assert_eq!(new_root.borrow().to_string(), "gone");
    }

    #[test]
    fn list_elements_can_be_deleted_mid_walk() {
        let body = node(Node::Call {
            op: 0xf1,
            target: crate::vm::value::Address::ZERO,
            input: vec![],
            body: vec![
                Node::label("keep-1"),
                Node::label("drop"),
                Node::label("keep-2"),
            ],
        });

        walk(&body, &mut |cursor| {
            let is_drop = matches!(
                &*cursor.node().borrow(),
                Node::Label { text } if text == "drop"
            );
            if is_drop {
                cursor.delete();
            }
        });

        match &*body.borrow() {
            Node::Call { body, .. } => {
                let texts: Vec<String> =
                    body.iter().map(|child| child.borrow().to_string()).collect();
                assert_eq!(texts, vec!["keep-1", "keep-2"]);
            }
            _ => unreachable!(),
        };
    }

    #[test]
    fn insertions_are_not_revisited() {
        let body = node(Node::Block {
            body: vec![Node::label("seed")],
        });

        let mut visits = 0;
        walk(&body, &mut |cursor| {
            let is_seed = matches!(
                &*cursor.node().borrow(),
                Node::Label { text } if text == "seed"
            );
            if is_seed {
                visits += 1;
                cursor.insert_before(Node::label("before"));
                cursor.insert_after(Node::label("after"));
            }
        });

        assert_eq!(visits, 1);
        match &*body.borrow() {
            Node::Block { body } => {
                let texts: Vec<String> =
                    body.iter().map(|child| child.borrow().to_string()).collect();
                assert_eq!(texts, vec!["before", "seed", "after"]);
            }
            _ => unreachable!(),
        };
    }
}
