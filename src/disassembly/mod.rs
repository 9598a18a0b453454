//! This module contains the representation of disassembled bytecode: the
//! individual [`Line`]s and the [`InstructionStream`] that indexes them by
//! both line number and program counter.

mod disassembler;

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    rc::Rc,
};

pub use disassembler::disassemble;

use crate::{
    error::execution::{Error, Result},
    opcode::DynOpcode,
};

/// A single disassembled instruction.
#[derive(Clone, Debug)]
pub struct Line {
    /// The byte offset of the instruction in the code.
    pub pc: u64,

    /// The ordinal of the instruction in the disassembly listing.
    pub line_num: usize,

    /// The operation at this line.
    pub op: DynOpcode,

    /// The immediate bytes following the opcode; non-empty only for the
    /// `PUSH` family.
    pub immediate: Vec<u8>,
}

impl Line {
    /// Gets the byte value of the operation at this line.
    #[must_use]
    pub fn opcode_byte(&self) -> u8 {
        self.op.as_byte()
    }
}

/// Two lines are equal when they decode the same operation at the same
/// place; the opcode handles themselves have no identity worth comparing.
impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.pc == other.pc
            && self.line_num == other.line_num
            && self.op.as_byte() == other.op.as_byte()
            && self.immediate == other.immediate
    }
}

impl Eq for Line {}

/// Renders the line as a listing row: the program counter, the mnemonic, and
/// any immediate bytes in hex.
impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>8} {:>12}  {}",
            self.pc,
            self.op.as_text_code(),
            hex::encode(&self.immediate)
        )
    }
}

/// The disassembled form of a contract's code.
///
/// The stream is immutable once constructed and is shared by reference
/// throughout a run; lines are indexed both sequentially and by program
/// counter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstructionStream {
    /// The lines in code order.
    lines: Vec<Rc<Line>>,

    /// An index from program counter to the line starting there.
    by_pc: HashMap<u64, Rc<Line>>,
}

impl InstructionStream {
    /// Constructs a stream from disassembled lines.
    pub(crate) fn new(lines: Vec<Line>) -> Self {
        let lines: Vec<Rc<Line>> = lines.into_iter().map(Rc::new).collect();
        let by_pc = lines.iter().map(|line| (line.pc, line.clone())).collect();
        Self { lines, by_pc }
    }

    /// Gets the number of instructions in the stream.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Looks up the line starting at exactly `pc`.
    ///
    /// # Errors
    ///
    /// If no instruction starts at `pc`, which includes counters pointing
    /// into the middle of a `PUSH` immediate.
    pub fn line_at_pc(&self, pc: u64) -> Result<&Rc<Line>> {
        self.by_pc.get(&pc).ok_or(Error::NoLineAtPc { pc })
    }

    /// Gets the line at the given listing `row`, if one exists.
    #[must_use]
    pub fn at_row(&self, row: usize) -> Option<&Rc<Line>> {
        self.lines.get(row)
    }

    /// Gets the lines in a listing window of `radius` rows around the
    /// instruction at `pc`, for disassembly display.
    ///
    /// # Errors
    ///
    /// If no instruction starts at `pc`.
    pub fn context_around(&self, pc: u64, radius: usize) -> Result<&[Rc<Line>]> {
        let center = self.line_at_pc(pc)?.line_num;
        let start = center.saturating_sub(radius);
        let end = (center + radius).min(self.lines.len());
        Ok(&self.lines[start..end])
    }

    /// Iterates over the lines in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Line>> {
        self.lines.iter()
    }
}
