//! This module contains the routine for turning a buffer of raw bytes into an
//! [`InstructionStream`].

use tracing::warn;

use crate::{
    constant::METADATA_LENGTH_FIELD_BYTES,
    disassembly::{InstructionStream, Line},
    opcode,
};

/// Disassembles the input `bytes` into an [`InstructionStream`].
///
/// # CBOR Metadata
///
/// `solc` appends a CBOR-encoded metadata blob to deployed bytecode, with the
/// blob's length encoded big-endian in the final two bytes. When that framing
/// is plausible the blob is stripped before scanning; otherwise the whole
/// buffer is scanned as code.
///
/// # Trailing Garbage
///
/// Disassembly never fails. An unknown opcode, or a `PUSH` whose immediate
/// runs past the end of the code, ends the scan with a warning; the lines
/// produced so far remain valid. In practice both conditions only occur in
/// metadata that the length framing failed to describe.
#[must_use]
pub fn disassemble(bytes: &[u8]) -> InstructionStream {
    let code = strip_metadata(bytes);
    let code_len = code.len() as u64;

    let mut lines = Vec::new();
    let mut pc: u64 = 0;

    while pc < code_len {
        let byte = code[pc as usize];
        let Some(op) = opcode::for_byte(byte) else {
            warn!(
                pc,
                code_len,
                byte = format!("{byte:#04x}"),
                "stopping disassembly at invalid opcode"
            );
            break;
        };

        let immediate_size = op.immediate_size();
        if pc + 1 + immediate_size > code_len {
            // Usually an unstripped remnant of the CBOR metadata; see
            // https://docs.soliditylang.org/en/latest/metadata.html
            warn!(
                pc,
                code_len,
                mnemonic = op.as_text_code(),
                required = immediate_size,
                "stopping disassembly at truncated immediate"
            );
            break;
        }

        let immediate = code[(pc + 1) as usize..(pc + 1 + immediate_size) as usize].to_vec();
        lines.push(Line {
            pc,
            line_num: lines.len(),
            op,
            immediate,
        });

        pc += 1 + immediate_size;
    }

    InstructionStream::new(lines)
}

/// Strips the trailing CBOR metadata blob when the final two bytes describe a
/// length that fits inside the buffer.
fn strip_metadata(bytes: &[u8]) -> &[u8] {
    if bytes.len() <= METADATA_LENGTH_FIELD_BYTES {
        return bytes;
    }
    let length_field = &bytes[bytes.len() - METADATA_LENGTH_FIELD_BYTES..];
    let meta_len = u16::from_be_bytes([length_field[0], length_field[1]]) as usize;

    match bytes.len().checked_sub(meta_len + METADATA_LENGTH_FIELD_BYTES) {
        Some(code_len) => &bytes[..code_len],
        None => {
            warn!(
                meta_len,
                total = bytes.len(),
                "implausible metadata length field; disassembling the whole buffer"
            );
            bytes
        }
    }
}

#[cfg(test)]
mod test {
    use super::disassemble;

    #[test]
    fn decodes_a_simple_program() -> anyhow::Result<()> {
        // PUSH1 0x03; PUSH1 0x04; ADD; STOP -- with a two-byte zero length
        // field standing in for the metadata framing.
        let stream = disassemble(&[0x60, 0x03, 0x60, 0x04, 0x01, 0x00, 0x00, 0x00]);

        assert_eq!(stream.line_count(), 4);
        let add = stream.line_at_pc(4)?;
        assert_eq!(add.op.as_text_code(), "ADD");
        assert_eq!(add.line_num, 2);

        let push = stream.line_at_pc(2)?;
        assert_eq!(push.immediate, vec![0x04]);

        // pc 1 is inside the first immediate, so no line starts there.
        assert!(stream.line_at_pc(1).is_err());
        Ok(())
    }

    #[test]
    fn strips_the_metadata_blob() {
        // Two code bytes, then a 3-byte blob, then the 0x0003 length field.
        let bytes = [0x5b, 0x00, 0xa1, 0xa2, 0xa3, 0x00, 0x03];
        let stream = disassemble(&bytes);
        assert_eq!(stream.line_count(), 2);
    }

    #[test]
    fn implausible_metadata_length_is_ignored() {
        // The trailing 0x0cff length cannot fit in a 4-byte buffer, so the
        // whole buffer is scanned; the scan then ends at the unknown 0x0c.
        let stream = disassemble(&[0x5b, 0x00, 0x0c, 0xff]);
        assert_eq!(stream.line_count(), 2);
    }

    #[test]
    fn stops_at_an_unknown_opcode_keeping_prior_lines() {
        let stream = disassemble(&[0x60, 0x01, 0x0c, 0x5b, 0x00, 0x00]);
        // PUSH1 0x01 decodes; 0x0c is unknown and ends the scan.
        assert_eq!(stream.line_count(), 1);
    }

    #[test]
    fn stops_at_a_truncated_push() {
        // Zero length field, then PUSH4 with only two immediate bytes left.
        let stream = disassemble(&[0x00, 0x63, 0x01, 0x02, 0x00, 0x00]);
        assert_eq!(stream.line_count(), 1);
    }

    #[test]
    fn lines_render_as_listing_rows() -> anyhow::Result<()> {
        let stream = disassemble(&[0x60, 0x80, 0x60, 0x40, 0x52]);
        let mstore = stream.line_at_pc(4)?;
        assert_eq!(mstore.to_string(), "       4       MSTORE  ");

        let push = stream.line_at_pc(0)?;
        assert_eq!(push.to_string(), "       0        PUSH1  80");
        Ok(())
    }

    #[test]
    fn listing_windows_clamp_at_the_edges() -> anyhow::Result<()> {
        let stream = disassemble(&[0x60, 0x80, 0x60, 0x40, 0x52, 0x00]);
        assert_eq!(stream.line_count(), 4);

        // A window around the first line cannot reach before the start.
        let around_start = stream.context_around(0, 2)?;
        assert_eq!(around_start.len(), 2);
        assert_eq!(around_start[0].pc, 0);

        // A window of radius one around a middle line shows the line above
        // it and the line itself.
        let around_middle = stream.context_around(4, 1)?;
        assert_eq!(around_middle.first().unwrap().pc, 2);
        assert_eq!(around_middle.last().unwrap().pc, 4);
        Ok(())
    }

    #[test]
    fn disassembly_is_idempotent() -> anyhow::Result<()> {
        let bytes = [0x60, 0x03, 0x60, 0x04, 0x01, 0x56, 0x5b, 0x00, 0x00, 0x00];
        let first = disassemble(&bytes);
        let second = disassemble(&bytes);

        assert_eq!(first.line_count(), second.line_count());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a, b);
        }
        Ok(())
    }
}
