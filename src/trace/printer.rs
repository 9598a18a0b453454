//! This module contains the pretty-printer for the symbolic trace: an
//! indented rendering of a [`Node::Call`] tree and the operator
//! prettification shared with the node renderings.

use crate::{
    opcode,
    trace::node::{Node, NodeRef},
};

/// Renders the opcode at `byte` the way a person reads it: the familiar
/// operators become symbols and everything else keeps its mnemonic.
#[must_use]
pub fn pretty_op(byte: u8) -> String {
    let symbol = match byte {
        0x01 => "+",
        0x03 => "-",
        0x02 => "*",
        0x04 => "/",
        0x06 => "%",
        0x10 | 0x12 => "<",
        0x11 | 0x13 => ">",
        0x14 => "==",
        0x15 => "!",
        0x16 => "&",
        0x17 => "|",
        0x1b => "<<",
        0x1c => ">>",
        _ => return opcode::text_code(byte),
    };
    symbol.into()
}

/// Pretty-prints the symbolic trace rooted at `root` with four-space
/// indentation.
///
/// Call nodes open a brace, indent their body, and close it; the multi-line
/// trace markers (hash calculations, logs, returns and precompile calls) are
/// re-indented line by line; everything else prints on a single line.
#[must_use]
pub fn print(root: &NodeRef) -> String {
    let mut printer = Printer {
        indent_level: 0,
        out: String::new(),
    };
    printer.print_node(root);
    printer.out
}

struct Printer {
    indent_level: usize,
    out: String,
}

impl Printer {
    const INDENT: &'static str = "    ";

    /// Appends one line at the current indentation.
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent_level {
            self.out.push_str(Self::INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn print_node(&mut self, n: &NodeRef) {
        enum Layout {
            Call(String, Vec<NodeRef>),
            MultiLine(String),
            Single(String),
        }

        let layout = match &*n.borrow() {
            Node::Call {
                op,
                target,
                input,
                body,
            } => {
                let selector = hex::encode(&input[..input.len().min(4)]);
                let header = format!(
                    "{} -> {target}, func: {selector} {{",
                    opcode::text_code(*op)
                );
                Layout::Call(header, body.clone())
            }
            rendered @ (Node::Sha3Calc { .. }
            | Node::Log { .. }
            | Node::Return { .. }
            | Node::Precompiled { .. }) => Layout::MultiLine(rendered.to_string()),
            rendered => Layout::Single(rendered.to_string()),
        };

        match layout {
            Layout::Call(header, body) => {
                self.line("");
                self.line(&header);
                self.indent_level += 1;
                for child in &body {
                    self.print_node(child);
                }
                self.indent_level -= 1;
                self.line("}");
            }
            Layout::MultiLine(rendered) => {
                for row in rendered.split('\n') {
                    self.line(row);
                }
            }
            Layout::Single(rendered) => self.line(&rendered),
        }
    }
}
