//! This module contains the helper functions used by the per-opcode gas cost
//! implementations.
//!
//! The replay driver computes but never enforces gas; these functions exist
//! so that hooks and clients can inspect what an execution would have cost.

use crate::vm::{Context, value::Word};

/// The per-byte cost of the exponent for the `EXP` opcode (EIP-158).
pub const EXP_BYTE_GAS: u64 = 50;

/// The linear coefficient of the memory expansion cost.
pub const MEMORY_GAS: u64 = 3;

/// The divisor of the quadratic component of the memory expansion cost.
pub const QUAD_COEFF_DIV: u64 = 512;

/// The per-word cost of the copying opcodes.
pub const COPY_GAS: u64 = 3;

/// The base and per-topic cost of the `LOG` opcodes.
pub const LOG_GAS: u64 = 375;

/// The per-byte cost of `LOG` data.
pub const LOG_DATA_GAS: u64 = 8;

/// Rounds a byte length up to a number of 32-byte words.
#[must_use]
pub fn to_word_size(byte_len: u64) -> u64 {
    byte_len.div_ceil(32)
}

/// The cost of the `EXP` opcode: a base of 10 plus [`EXP_BYTE_GAS`] for each
/// byte in the minimal representation of the exponent.
///
/// The exponent is the second stack operand; an absent operand costs as if
/// the exponent were zero.
#[must_use]
pub fn exp_cost(ctx: &Context) -> u64 {
    let exponent = ctx
        .stack()
        .peek_at(1)
        .copied()
        .unwrap_or(Word::ZERO);
    let byte_len = (256 - leading_zero_bits(exponent) + 7) / 8;
    byte_len * EXP_BYTE_GAS + 10
}

/// The cost of the `SHA3` opcode: 30 plus 6 per word of hashed input.
#[must_use]
pub fn sha3_cost(ctx: &Context) -> u64 {
    let length = ctx
        .stack()
        .peek_at(1)
        .map_or(0, |word| word.low_u64());
    30 + to_word_size(length) * 6
}

/// The cost of the `SSTORE` opcode: 20000 when clearing a previously non-zero
/// slot, 5000 otherwise.
///
/// Only the locally cached storage is consulted; a slot that has never been
/// fetched is costed as if it were zero.
#[must_use]
pub fn sstore_cost(ctx: &Context) -> u64 {
    let slot = ctx.stack().peek_at(0).copied().unwrap_or(Word::ZERO);
    let new_value = ctx.stack().peek_at(1).copied().unwrap_or(Word::ZERO);
    let old_value = ctx
        .contracts
        .get(&ctx.this())
        .and_then(|contract| contract.storage.get(&slot))
        .copied()
        .unwrap_or(Word::ZERO);

    if !old_value.is_zero() && new_value.is_zero() {
        20000
    } else {
        5000
    }
}

/// The cost of expanding the memory from `current_size` to `new_size` bytes.
///
/// Only the newly expanded region is charged for, with the standard linear
/// plus quadratic formula.
#[must_use]
pub fn memory_expansion_cost(current_size: u64, new_size: u64) -> u64 {
    if new_size == 0 {
        return 0;
    }
    let new_words = to_word_size(new_size);
    let new_size = new_words * 32;

    if new_size > current_size {
        let lin = new_words * MEMORY_GAS;
        let quad = (new_words * new_words) / QUAD_COEFF_DIV;
        lin + quad
    } else {
        0
    }
}

/// The cost of a memory-copying opcode: `base_gas` plus memory expansion plus
/// [`COPY_GAS`] per copied word.
///
/// The destination offset and length live at the given stack depths, which
/// differ between the copy opcodes (`EXTCODECOPY` has an extra address
/// operand).
#[must_use]
pub fn copy_cost(ctx: &Context, base_gas: u64, offset_depth: usize, len_depth: usize) -> u64 {
    let offset = ctx
        .stack()
        .peek_at(offset_depth)
        .map_or(0, |word| word.low_u64());
    let length = ctx
        .stack()
        .peek_at(len_depth)
        .map_or(0, |word| word.low_u64());

    let expand = memory_expansion_cost(ctx.memory().len(), offset + length);
    base_gas + expand + to_word_size(length) * COPY_GAS
}

/// The cost of a `LOG` opcode with `topic_count` topics.
#[must_use]
pub fn log_cost(ctx: &Context, topic_count: u64) -> u64 {
    let size = ctx.stack().peek_at(1).map_or(0, |word| word.low_u64());
    LOG_GAS + LOG_DATA_GAS * size + topic_count * LOG_GAS
}

/// Counts the leading zero bits of a word.
fn leading_zero_bits(word: Word) -> u64 {
    for (index, byte) in word.to_be_bytes().iter().enumerate() {
        if *byte != 0 {
            return index as u64 * 8 + u64::from(byte.leading_zeros());
        }
    }
    256
}

#[cfg(test)]
mod test {
    use super::{memory_expansion_cost, to_word_size};

    #[test]
    fn rounds_byte_lengths_up_to_words() {
        assert_eq!(to_word_size(0), 0);
        assert_eq!(to_word_size(1), 1);
        assert_eq!(to_word_size(32), 1);
        assert_eq!(to_word_size(33), 2);
    }

    #[test]
    fn charges_only_for_newly_expanded_memory() {
        assert_eq!(memory_expansion_cost(0, 0), 0);
        // One fresh word: 3 linear + 0 quadratic.
        assert_eq!(memory_expansion_cost(0, 32), 3);
        // Already large enough.
        assert_eq!(memory_expansion_cost(64, 32), 0);
        // The quadratic term kicks in for large sizes.
        let words = 1024u64;
        let expected = words * 3 + (words * words) / 512;
        assert_eq!(memory_expansion_cost(0, words * 32), expected);
    }
}
