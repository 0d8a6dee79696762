//! One-instruction disassembly, shared by the debugger's display pane.

use crate::opcodes::{Mode, OPCODE_TABLE};

pub struct Disassembled {
    /// Total instruction length in bytes, including the opcode.
    pub len: u16,
    pub mnemonic: &'static str,
    /// Hex dump of the raw instruction bytes, space separated.
    pub bytes: String,
    /// The operand rendered in assembler syntax; empty for implied.
    pub operand: String,
    pub undocumented: bool,
}

/// Decode the instruction at `bytes[0..]`, where `addr` is its address
/// (needed to render relative-branch targets).
pub fn disassemble(bytes: &[u8], addr: u16) -> Disassembled {
    let opcode = bytes.first().copied().unwrap_or(0);
    let entry = &OPCODE_TABLE[opcode as usize];
    let info = entry.family.info();

    let len = 1 + entry.mode.operand_len();
    let b = bytes.get(1).copied().unwrap_or(0);
    let w = (bytes.get(2).copied().unwrap_or(0) as u16) << 8 | b as u16;

    let raw = match len {
        1 => format!("{:02x}", opcode),
        2 => format!("{:02x} {:02x}", opcode, b),
        _ => format!("{:02x} {:02x} {:02x}", opcode, b, w >> 8),
    };

    let target = addr
        .wrapping_add(len)
        .wrapping_add(b as i8 as i16 as u16);

    let operand = match entry.mode {
        Mode::Implied => String::new(),
        Mode::Accumulator => "A".to_string(),
        Mode::Immediate => format!("#${:02x}", b),
        Mode::Relative => format!("${:04x}", target),
        Mode::ZeroPage => format!("${:02x}", b),
        Mode::ZeroPageX => format!("${:02x},X", b),
        Mode::ZeroPageY => format!("${:02x},Y", b),
        Mode::Absolute => format!("${:04x}", w),
        Mode::AbsoluteX => format!("${:04x},X", w),
        Mode::AbsoluteY => format!("${:04x},Y", w),
        Mode::Indirect => format!("(${:04x})", w),
        Mode::IndirectX => format!("(${:02x},X)", b),
        Mode::IndirectY => format!("(${:02x}),Y", b),
    };

    Disassembled {
        len,
        mnemonic: info.mnemonic,
        bytes: raw,
        operand,
        undocumented: entry.undocumented,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_common_modes() {
        let lda = disassemble(&[0xa9, 0x03], 0x8000);
        assert_eq!(lda.len, 2);
        assert_eq!(lda.mnemonic, "lda");
        assert_eq!(lda.operand, "#$03");
        assert!(!lda.undocumented);

        let sta = disassemble(&[0x8d, 0x00, 0x02], 0x8000);
        assert_eq!(sta.len, 3);
        assert_eq!(sta.operand, "$0200");

        let slo = disassemble(&[0x03, 0x10], 0x8000);
        assert!(slo.undocumented);
    }

    #[test]
    fn relative_targets_resolve_against_the_next_instruction() {
        // BCC with displacement -2 loops back onto itself.
        let bcc = disassemble(&[0x90, 0xfe], 0x0200);
        assert_eq!(bcc.operand, "$0200");

        // Displacement +4 from the following instruction.
        let bne = disassemble(&[0xd0, 0x04], 0x0200);
        assert_eq!(bne.operand, "$0206");
    }
}
