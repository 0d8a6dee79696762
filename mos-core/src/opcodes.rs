//! The 6502 opcode tables.
//!
//! The decode tables are data, not code: a 256-entry descriptor table indexed
//! by the opcode byte, plus a per-family info table carrying the mnemonic and
//! the load/store/legal attributes the execution engine keys off of.

/// The thirteen addressing modes of the 6502.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,     // imp
    Accumulator, // a
    Immediate,   // imm
    ZeroPage,    // zp
    ZeroPageX,   // zpx
    ZeroPageY,   // zpy
    Relative,    // rel
    Absolute,    // abs
    AbsoluteX,   // abx
    AbsoluteY,   // aby
    Indirect,    // ind
    IndirectX,   // izx
    IndirectY,   // izy
}

impl Mode {
    /// How many operand bytes follow the opcode byte.
    pub fn operand_len(self) -> u16 {
        match self {
            Mode::Implied | Mode::Accumulator => 0,
            Mode::Immediate
            | Mode::ZeroPage
            | Mode::ZeroPageX
            | Mode::ZeroPageY
            | Mode::Relative
            | Mode::IndirectX
            | Mode::IndirectY => 1,
            Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY | Mode::Indirect => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Implied => "Implicit",
            Mode::Accumulator => "Accumulator",
            Mode::Immediate => "Immediate",
            Mode::ZeroPage => "Zero-Page",
            Mode::ZeroPageX => "Zero-Page X",
            Mode::ZeroPageY => "Zero-Page Y",
            Mode::Relative => "Relative",
            Mode::Absolute => "Absolute",
            Mode::AbsoluteX => "Absolute X",
            Mode::AbsoluteY => "Absolute Y",
            Mode::Indirect => "Indirect",
            Mode::IndirectX => "Indirect X",
            Mode::IndirectY => "Indirect Y",
        }
    }
}

/// Every instruction family, documented and undocumented. 75 in all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // Logical and arithmetic commands:
    ORA,
    AND,
    EOR,
    ADC,
    SBC,
    CMP,
    CPX,
    CPY,
    DEC,
    DEX,
    DEY,
    INC,
    INX,
    INY,
    ASL,
    ROL,
    LSR,
    ROR,
    // Move commands
    LDA,
    STA,
    LDX,
    STX,
    LDY,
    STY,
    TAX,
    TXA,
    TAY,
    TYA,
    TSX,
    TXS,
    PLA,
    PHA,
    PLP,
    PHP,
    // Jump / Flag commands
    BPL,
    BMI,
    BVC,
    BVS,
    BCC,
    BCS,
    BNE,
    BEQ,
    BRK,
    RTI,
    JSR,
    RTS,
    JMP,
    BIT,
    CLC,
    SEC,
    CLD,
    SED,
    CLI,
    SEI,
    CLV,
    NOP,
    // Undocumented
    SLO,
    RLA,
    SRE,
    RRA,
    SAX,
    LAX,
    DCP,
    ISC,
    ANC,
    ALR,
    ARR,
    XAA,
    AXS,
    AHX,
    SHY,
    SHX,
    TAS,
    LAS,
    KIL,
}

/// Per-family attributes consumed by the execution engine and the tools.
///
/// `loads` means the operand value is fetched before the semantics run;
/// `stores` means the result is written back afterwards (to A in accumulator
/// mode, to memory otherwise). `legal` distinguishes the documented set.
pub struct InstructionInfo {
    pub mnemonic: &'static str,
    pub loads: bool,
    pub stores: bool,
    pub legal: bool,
}

impl Instruction {
    pub fn info(self) -> &'static InstructionInfo {
        &INSTRUCTION_INFO[self as usize]
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Instruction::BPL
                | Instruction::BMI
                | Instruction::BVC
                | Instruction::BVS
                | Instruction::BCC
                | Instruction::BCS
                | Instruction::BNE
                | Instruction::BEQ
        )
    }
}

const fn info(
    mnemonic: &'static str,
    loads: bool,
    stores: bool,
    legal: bool,
) -> InstructionInfo {
    InstructionInfo {
        mnemonic,
        loads,
        stores,
        legal,
    }
}

/// Indexed by `Instruction as usize` -- declaration order above.
#[rustfmt::skip]
pub const INSTRUCTION_INFO: [InstructionInfo; 75] = [
    info("ora", true,  false, true),
    info("and", true,  false, true),
    info("eor", true,  false, true),
    info("adc", true,  false, true),
    info("sbc", true,  false, true),
    info("cmp", true,  false, true),
    info("cpx", true,  false, true),
    info("cpy", true,  false, true),
    info("dec", true,  true,  true),
    info("dex", false, false, true),
    info("dey", false, false, true),
    info("inc", true,  true,  true),
    info("inx", false, false, true),
    info("iny", false, false, true),
    info("asl", true,  true,  true),
    info("rol", true,  true,  true),
    info("lsr", true,  true,  true),
    info("ror", true,  true,  true),
    info("lda", true,  false, true),
    info("sta", false, true,  true),
    info("ldx", true,  false, true),
    info("stx", false, true,  true),
    info("ldy", true,  false, true),
    info("sty", false, true,  true),
    info("tax", false, false, true),
    info("txa", false, false, true),
    info("tay", false, false, true),
    info("tya", false, false, true),
    info("tsx", false, false, true),
    info("txs", false, false, true),
    info("pla", false, false, true),
    info("pha", false, false, true),
    info("plp", false, false, true),
    info("php", false, false, true),
    info("bpl", false, false, true),
    info("bmi", false, false, true),
    info("bvc", false, false, true),
    info("bvs", false, false, true),
    info("bcc", false, false, true),
    info("bcs", false, false, true),
    info("bne", false, false, true),
    info("beq", false, false, true),
    info("brk", false, false, true),
    info("rti", false, false, true),
    info("jsr", false, false, true),
    info("rts", false, false, true),
    info("jmp", false, false, true),
    info("bit", true,  false, true),
    info("clc", false, false, true),
    info("sec", false, false, true),
    info("cld", false, false, true),
    info("sed", false, false, true),
    info("cli", false, false, true),
    info("sei", false, false, true),
    info("clv", false, false, true),
    info("nop", false, false, true),
    info("slo", false, false, false),
    info("rla", false, false, false),
    info("sre", false, false, false),
    info("rra", false, false, false),
    info("sax", false, false, false),
    info("lax", false, false, false),
    info("dcp", false, false, false),
    info("isc", false, false, false),
    info("anc", false, false, false),
    info("alr", false, false, false),
    info("arr", false, false, false),
    info("xaa", false, false, false),
    info("axs", false, false, false),
    info("ahx", false, false, false),
    info("shy", false, false, false),
    info("shx", false, false, false),
    info("tas", false, false, false),
    info("las", false, false, false),
    info("kil", false, false, false),
];

pub fn match_instruction(string: &str) -> Option<Instruction> {
    let instruction = match string.to_lowercase().as_ref() {
        "ora" => Instruction::ORA,
        "and" => Instruction::AND,
        "eor" => Instruction::EOR,
        "adc" => Instruction::ADC,
        "sbc" => Instruction::SBC,
        "cmp" => Instruction::CMP,
        "cpx" => Instruction::CPX,
        "cpy" => Instruction::CPY,
        "dec" => Instruction::DEC,
        "dex" => Instruction::DEX,
        "dey" => Instruction::DEY,
        "inc" => Instruction::INC,
        "inx" => Instruction::INX,
        "iny" => Instruction::INY,
        "asl" => Instruction::ASL,
        "rol" => Instruction::ROL,
        "lsr" => Instruction::LSR,
        "ror" => Instruction::ROR,
        "lda" => Instruction::LDA,
        "sta" => Instruction::STA,
        "ldx" => Instruction::LDX,
        "stx" => Instruction::STX,
        "ldy" => Instruction::LDY,
        "sty" => Instruction::STY,
        "tax" => Instruction::TAX,
        "txa" => Instruction::TXA,
        "tay" => Instruction::TAY,
        "tya" => Instruction::TYA,
        "tsx" => Instruction::TSX,
        "txs" => Instruction::TXS,
        "pla" => Instruction::PLA,
        "pha" => Instruction::PHA,
        "plp" => Instruction::PLP,
        "php" => Instruction::PHP,
        "bpl" => Instruction::BPL,
        "bmi" => Instruction::BMI,
        "bvc" => Instruction::BVC,
        "bvs" => Instruction::BVS,
        "bcc" => Instruction::BCC,
        "bcs" => Instruction::BCS,
        "bne" => Instruction::BNE,
        "beq" => Instruction::BEQ,
        "brk" => Instruction::BRK,
        "rti" => Instruction::RTI,
        "jsr" => Instruction::JSR,
        "rts" => Instruction::RTS,
        "jmp" => Instruction::JMP,
        "bit" => Instruction::BIT,
        "clc" => Instruction::CLC,
        "sec" => Instruction::SEC,
        "cld" => Instruction::CLD,
        "sed" => Instruction::SED,
        "cli" => Instruction::CLI,
        "sei" => Instruction::SEI,
        "clv" => Instruction::CLV,
        "nop" => Instruction::NOP,
        "slo" => Instruction::SLO,
        "rla" => Instruction::RLA,
        "sre" => Instruction::SRE,
        "rra" => Instruction::RRA,
        "sax" => Instruction::SAX,
        "lax" => Instruction::LAX,
        "dcp" => Instruction::DCP,
        "isc" => Instruction::ISC,
        "anc" => Instruction::ANC,
        "alr" => Instruction::ALR,
        "arr" => Instruction::ARR,
        "xaa" => Instruction::XAA,
        "axs" => Instruction::AXS,
        "ahx" => Instruction::AHX,
        "shy" => Instruction::SHY,
        "shx" => Instruction::SHX,
        "tas" => Instruction::TAS,
        "las" => Instruction::LAS,
        "kil" => Instruction::KIL,
        _ => return None,
    };
    Some(instruction)
}

/// One entry of the 256-entry decode table.
pub struct Opcode {
    pub family: Instruction,
    pub mode: Mode,
    pub cycles: u8,
    /// One extra cycle when the effective address crosses a page boundary.
    pub page_penalty: bool,
    /// Undocumented encoding. A family can have both kinds: the canonical
    /// NOP is $EA while a dozen undocumented bytes alias it.
    pub undocumented: bool,
}

const fn op(
    family: Instruction,
    mode: Mode,
    cycles: u8,
    page_penalty: bool,
    undocumented: bool,
) -> Opcode {
    Opcode {
        family,
        mode,
        cycles,
        page_penalty,
        undocumented,
    }
}

/// Find the opcode byte encoding `(family, mode)`, if one exists.
///
/// A linear scan of the table, the way the assembler resolves addressing
/// modes. Documented encodings win over undocumented aliases.
pub fn opcode_lookup(family: Instruction, mode: Mode) -> Option<u8> {
    let matches = |entry: &&Opcode| entry.family == family && entry.mode == mode;
    OPCODE_TABLE
        .iter()
        .position(|entry| matches(&entry) && !entry.undocumented)
        .or_else(|| OPCODE_TABLE.iter().position(|entry| matches(&entry)))
        .map(|index| index as u8)
}

use Instruction::*;
use Mode::*;

#[rustfmt::skip]
pub const OPCODE_TABLE: [Opcode; 256] = [
    op(BRK, Implied, 7, false, false), // 0x00
    op(ORA, IndirectX, 6, false, false), // 0x01
    op(KIL, Implied, 0, false, true), // 0x02
    op(SLO, IndirectX, 8, false, true), // 0x03
    op(NOP, ZeroPage, 3, false, true), // 0x04
    op(ORA, ZeroPage, 3, false, false), // 0x05
    op(ASL, ZeroPage, 5, false, false), // 0x06
    op(SLO, ZeroPage, 5, false, true), // 0x07
    op(PHP, Implied, 3, false, false), // 0x08
    op(ORA, Immediate, 2, false, false), // 0x09
    op(ASL, Accumulator, 2, false, false), // 0x0a
    op(ANC, Immediate, 2, false, true), // 0x0b
    op(NOP, Absolute, 4, false, true), // 0x0c
    op(ORA, Absolute, 4, false, false), // 0x0d
    op(ASL, Absolute, 6, false, false), // 0x0e
    op(SLO, Absolute, 6, false, true), // 0x0f
    op(BPL, Relative, 2, true, false), // 0x10
    op(ORA, IndirectY, 5, true, false), // 0x11
    op(KIL, Implied, 0, false, true), // 0x12
    op(SLO, IndirectY, 8, false, true), // 0x13
    op(NOP, ZeroPageX, 4, false, true), // 0x14
    op(ORA, ZeroPageX, 4, false, false), // 0x15
    op(ASL, ZeroPageX, 6, false, false), // 0x16
    op(SLO, ZeroPageX, 6, false, true), // 0x17
    op(CLC, Implied, 2, false, false), // 0x18
    op(ORA, AbsoluteY, 4, true, false), // 0x19
    op(NOP, Implied, 2, false, true), // 0x1a
    op(SLO, AbsoluteY, 7, false, true), // 0x1b
    op(NOP, AbsoluteX, 4, true, true), // 0x1c
    op(ORA, AbsoluteX, 4, true, false), // 0x1d
    op(ASL, AbsoluteX, 7, false, false), // 0x1e
    op(SLO, AbsoluteX, 7, false, true), // 0x1f
    op(JSR, Absolute, 6, false, false), // 0x20
    op(AND, IndirectX, 6, false, false), // 0x21
    op(KIL, Implied, 0, false, true), // 0x22
    op(RLA, IndirectX, 8, false, true), // 0x23
    op(BIT, ZeroPage, 3, false, false), // 0x24
    op(AND, ZeroPage, 3, false, false), // 0x25
    op(ROL, ZeroPage, 5, false, false), // 0x26
    op(RLA, ZeroPage, 5, false, true), // 0x27
    op(PLP, Implied, 4, false, false), // 0x28
    op(AND, Immediate, 2, false, false), // 0x29
    op(ROL, Accumulator, 2, false, false), // 0x2a
    op(ANC, Immediate, 2, false, true), // 0x2b
    op(BIT, Absolute, 4, false, false), // 0x2c
    op(AND, Absolute, 4, false, false), // 0x2d
    op(ROL, Absolute, 6, false, false), // 0x2e
    op(RLA, Absolute, 6, false, true), // 0x2f
    op(BMI, Relative, 2, true, false), // 0x30
    op(AND, IndirectY, 5, true, false), // 0x31
    op(KIL, Implied, 0, false, true), // 0x32
    op(RLA, IndirectY, 8, false, true), // 0x33
    op(NOP, ZeroPageX, 4, false, true), // 0x34
    op(AND, ZeroPageX, 4, false, false), // 0x35
    op(ROL, ZeroPageX, 6, false, false), // 0x36
    op(RLA, ZeroPageX, 6, false, true), // 0x37
    op(SEC, Implied, 2, false, false), // 0x38
    op(AND, AbsoluteY, 4, true, false), // 0x39
    op(NOP, Implied, 2, false, true), // 0x3a
    op(RLA, AbsoluteY, 7, false, true), // 0x3b
    op(NOP, AbsoluteX, 4, true, true), // 0x3c
    op(AND, AbsoluteX, 4, true, false), // 0x3d
    op(ROL, AbsoluteX, 7, false, false), // 0x3e
    op(RLA, AbsoluteX, 7, false, true), // 0x3f
    op(RTI, Implied, 6, false, false), // 0x40
    op(EOR, IndirectX, 6, false, false), // 0x41
    op(KIL, Implied, 0, false, true), // 0x42
    op(SRE, IndirectX, 8, false, true), // 0x43
    op(NOP, ZeroPage, 3, false, true), // 0x44
    op(EOR, ZeroPage, 3, false, false), // 0x45
    op(LSR, ZeroPage, 5, false, false), // 0x46
    op(SRE, ZeroPage, 5, false, true), // 0x47
    op(PHA, Implied, 3, false, false), // 0x48
    op(EOR, Immediate, 2, false, false), // 0x49
    op(LSR, Accumulator, 2, false, false), // 0x4a
    op(ALR, Immediate, 2, false, true), // 0x4b
    op(JMP, Absolute, 3, false, false), // 0x4c
    op(EOR, Absolute, 4, false, false), // 0x4d
    op(LSR, Absolute, 6, false, false), // 0x4e
    op(SRE, Absolute, 6, false, true), // 0x4f
    op(BVC, Relative, 2, true, false), // 0x50
    op(EOR, IndirectY, 5, true, false), // 0x51
    op(KIL, Implied, 0, false, true), // 0x52
    op(SRE, IndirectY, 8, false, true), // 0x53
    op(NOP, ZeroPageX, 4, false, true), // 0x54
    op(EOR, ZeroPageX, 4, false, false), // 0x55
    op(LSR, ZeroPageX, 6, false, false), // 0x56
    op(SRE, ZeroPageX, 6, false, true), // 0x57
    op(CLI, Implied, 2, false, false), // 0x58
    op(EOR, AbsoluteY, 4, true, false), // 0x59
    op(NOP, Implied, 2, false, true), // 0x5a
    op(SRE, AbsoluteY, 7, false, true), // 0x5b
    op(NOP, AbsoluteX, 4, true, true), // 0x5c
    op(EOR, AbsoluteX, 4, true, false), // 0x5d
    op(LSR, AbsoluteX, 7, false, false), // 0x5e
    op(SRE, AbsoluteX, 7, false, true), // 0x5f
    op(RTS, Implied, 6, false, false), // 0x60
    op(ADC, IndirectX, 6, false, false), // 0x61
    op(KIL, Implied, 0, false, true), // 0x62
    op(RRA, IndirectX, 8, false, true), // 0x63
    op(NOP, ZeroPage, 3, false, true), // 0x64
    op(ADC, ZeroPage, 3, false, false), // 0x65
    op(ROR, ZeroPage, 5, false, false), // 0x66
    op(RRA, ZeroPage, 5, false, true), // 0x67
    op(PLA, Implied, 4, false, false), // 0x68
    op(ADC, Immediate, 2, false, false), // 0x69
    op(ROR, Accumulator, 2, false, false), // 0x6a
    op(ARR, Immediate, 2, false, true), // 0x6b
    op(JMP, Indirect, 5, false, false), // 0x6c
    op(ADC, Absolute, 4, false, false), // 0x6d
    op(ROR, Absolute, 6, false, false), // 0x6e
    op(RRA, Absolute, 6, false, true), // 0x6f
    op(BVS, Relative, 2, true, false), // 0x70
    op(ADC, IndirectY, 5, true, false), // 0x71
    op(KIL, Implied, 0, false, true), // 0x72
    op(RRA, IndirectY, 8, false, true), // 0x73
    op(NOP, ZeroPageX, 4, false, true), // 0x74
    op(ADC, ZeroPageX, 4, false, false), // 0x75
    op(ROR, ZeroPageX, 6, false, false), // 0x76
    op(RRA, ZeroPageX, 6, false, true), // 0x77
    op(SEI, Implied, 2, false, false), // 0x78
    op(ADC, AbsoluteY, 4, true, false), // 0x79
    op(NOP, Implied, 2, false, true), // 0x7a
    op(RRA, AbsoluteY, 7, false, true), // 0x7b
    op(NOP, AbsoluteX, 4, true, true), // 0x7c
    op(ADC, AbsoluteX, 4, true, false), // 0x7d
    op(ROR, AbsoluteX, 7, false, false), // 0x7e
    op(RRA, AbsoluteX, 7, false, true), // 0x7f
    op(NOP, Immediate, 2, false, true), // 0x80
    op(STA, IndirectX, 6, false, false), // 0x81
    op(NOP, Immediate, 2, false, true), // 0x82
    op(SAX, IndirectX, 6, false, true), // 0x83
    op(STY, ZeroPage, 3, false, false), // 0x84
    op(STA, ZeroPage, 3, false, false), // 0x85
    op(STX, ZeroPage, 3, false, false), // 0x86
    op(SAX, ZeroPage, 3, false, true), // 0x87
    op(DEY, Implied, 2, false, false), // 0x88
    op(NOP, Immediate, 2, false, true), // 0x89
    op(TXA, Implied, 2, false, false), // 0x8a
    op(XAA, Immediate, 2, false, true), // 0x8b
    op(STY, Absolute, 4, false, false), // 0x8c
    op(STA, Absolute, 4, false, false), // 0x8d
    op(STX, Absolute, 4, false, false), // 0x8e
    op(SAX, Absolute, 4, false, true), // 0x8f
    op(BCC, Relative, 2, true, false), // 0x90
    op(STA, IndirectY, 6, false, false), // 0x91
    op(KIL, Implied, 0, false, true), // 0x92
    op(AHX, IndirectY, 6, false, true), // 0x93
    op(STY, ZeroPageX, 4, false, false), // 0x94
    op(STA, ZeroPageX, 4, false, false), // 0x95
    op(STX, ZeroPageY, 4, false, false), // 0x96
    op(SAX, ZeroPageY, 4, false, true), // 0x97
    op(TYA, Implied, 2, false, false), // 0x98
    op(STA, AbsoluteY, 5, false, false), // 0x99
    op(TXS, Implied, 2, false, false), // 0x9a
    op(TAS, AbsoluteY, 5, false, true), // 0x9b
    op(SHY, AbsoluteX, 5, false, true), // 0x9c
    op(STA, AbsoluteX, 5, false, false), // 0x9d
    op(SHX, AbsoluteY, 5, false, true), // 0x9e
    op(AHX, AbsoluteY, 5, false, true), // 0x9f
    op(LDY, Immediate, 2, false, false), // 0xa0
    op(LDA, IndirectX, 6, false, false), // 0xa1
    op(LDX, Immediate, 2, false, false), // 0xa2
    op(LAX, IndirectX, 6, false, true), // 0xa3
    op(LDY, ZeroPage, 3, false, false), // 0xa4
    op(LDA, ZeroPage, 3, false, false), // 0xa5
    op(LDX, ZeroPage, 3, false, false), // 0xa6
    op(LAX, ZeroPage, 3, false, true), // 0xa7
    op(TAY, Implied, 2, false, false), // 0xa8
    op(LDA, Immediate, 2, false, false), // 0xa9
    op(TAX, Implied, 2, false, false), // 0xaa
    op(LAX, Immediate, 2, false, true), // 0xab
    op(LDY, Absolute, 4, false, false), // 0xac
    op(LDA, Absolute, 4, false, false), // 0xad
    op(LDX, Absolute, 4, false, false), // 0xae
    op(LAX, Absolute, 4, false, true), // 0xaf
    op(BCS, Relative, 2, true, false), // 0xb0
    op(LDA, IndirectY, 5, true, false), // 0xb1
    op(KIL, Implied, 0, false, true), // 0xb2
    op(LAX, IndirectY, 5, true, true), // 0xb3
    op(LDY, ZeroPageX, 4, false, false), // 0xb4
    op(LDA, ZeroPageX, 4, false, false), // 0xb5
    op(LDX, ZeroPageY, 4, false, false), // 0xb6
    op(LAX, ZeroPageY, 4, false, true), // 0xb7
    op(CLV, Implied, 2, false, false), // 0xb8
    op(LDA, AbsoluteY, 4, true, false), // 0xb9
    op(TSX, Implied, 2, false, false), // 0xba
    op(LAS, AbsoluteY, 4, true, true), // 0xbb
    op(LDY, AbsoluteX, 4, true, false), // 0xbc
    op(LDA, AbsoluteX, 4, true, false), // 0xbd
    op(LDX, AbsoluteY, 4, true, false), // 0xbe
    op(LAX, AbsoluteY, 4, true, true), // 0xbf
    op(CPY, Immediate, 2, false, false), // 0xc0
    op(CMP, IndirectX, 6, false, false), // 0xc1
    op(NOP, Immediate, 2, false, true), // 0xc2
    op(DCP, IndirectX, 8, false, true), // 0xc3
    op(CPY, ZeroPage, 3, false, false), // 0xc4
    op(CMP, ZeroPage, 3, false, false), // 0xc5
    op(DEC, ZeroPage, 5, false, false), // 0xc6
    op(DCP, ZeroPage, 5, false, true), // 0xc7
    op(INY, Implied, 2, false, false), // 0xc8
    op(CMP, Immediate, 2, false, false), // 0xc9
    op(DEX, Implied, 2, false, false), // 0xca
    op(AXS, Immediate, 2, false, true), // 0xcb
    op(CPY, Absolute, 4, false, false), // 0xcc
    op(CMP, Absolute, 4, false, false), // 0xcd
    op(DEC, Absolute, 6, false, false), // 0xce
    op(DCP, Absolute, 6, false, true), // 0xcf
    op(BNE, Relative, 2, true, false), // 0xd0
    op(CMP, IndirectY, 5, true, false), // 0xd1
    op(KIL, Implied, 0, false, true), // 0xd2
    op(DCP, IndirectY, 8, false, true), // 0xd3
    op(NOP, ZeroPageX, 4, false, true), // 0xd4
    op(CMP, ZeroPageX, 4, false, false), // 0xd5
    op(DEC, ZeroPageX, 6, false, false), // 0xd6
    op(DCP, ZeroPageX, 6, false, true), // 0xd7
    op(CLD, Implied, 2, false, false), // 0xd8
    op(CMP, AbsoluteY, 4, true, false), // 0xd9
    op(NOP, Implied, 2, false, true), // 0xda
    op(DCP, AbsoluteY, 7, false, true), // 0xdb
    op(NOP, AbsoluteX, 4, true, true), // 0xdc
    op(CMP, AbsoluteX, 4, true, false), // 0xdd
    op(DEC, AbsoluteX, 7, false, false), // 0xde
    op(DCP, AbsoluteX, 7, false, true), // 0xdf
    op(CPX, Immediate, 2, false, false), // 0xe0
    op(SBC, IndirectX, 6, false, false), // 0xe1
    op(NOP, Immediate, 2, false, true), // 0xe2
    op(ISC, IndirectX, 8, false, true), // 0xe3
    op(CPX, ZeroPage, 3, false, false), // 0xe4
    op(SBC, ZeroPage, 3, false, false), // 0xe5
    op(INC, ZeroPage, 5, false, false), // 0xe6
    op(ISC, ZeroPage, 5, false, true), // 0xe7
    op(INX, Implied, 2, false, false), // 0xe8
    op(SBC, Immediate, 2, false, false), // 0xe9
    op(NOP, Implied, 2, false, false), // 0xea
    op(SBC, Immediate, 2, false, true), // 0xeb
    op(CPX, Absolute, 4, false, false), // 0xec
    op(SBC, Absolute, 4, false, false), // 0xed
    op(INC, Absolute, 6, false, false), // 0xee
    op(ISC, Absolute, 6, false, true), // 0xef
    op(BEQ, Relative, 2, true, false), // 0xf0
    op(SBC, IndirectY, 5, true, false), // 0xf1
    op(KIL, Implied, 0, false, true), // 0xf2
    op(ISC, IndirectY, 8, false, true), // 0xf3
    op(NOP, ZeroPageX, 4, false, true), // 0xf4
    op(SBC, ZeroPageX, 4, false, false), // 0xf5
    op(INC, ZeroPageX, 6, false, false), // 0xf6
    op(ISC, ZeroPageX, 6, false, true), // 0xf7
    op(SED, Implied, 2, false, false), // 0xf8
    op(SBC, AbsoluteY, 4, true, false), // 0xf9
    op(NOP, Implied, 2, false, true), // 0xfa
    op(ISC, AbsoluteY, 7, false, true), // 0xfb
    op(NOP, AbsoluteX, 4, true, true), // 0xfc
    op(SBC, AbsoluteX, 4, true, false), // 0xfd
    op(INC, AbsoluteX, 7, false, false), // 0xfe
    op(ISC, AbsoluteX, 7, false, true), // 0xff
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_round_trip() {
        // Every (family, mode) pair present in the table must survive an
        // encode/decode round trip. Duplicate encodings are fine as long as
        // the decoded pair matches.
        for entry in OPCODE_TABLE.iter() {
            let byte = opcode_lookup(entry.family, entry.mode)
                .unwrap_or_else(|| panic!("no encoding for {:?} {:?}", entry.family, entry.mode));
            let decoded = &OPCODE_TABLE[byte as usize];
            assert_eq!(decoded.family, entry.family);
            assert_eq!(decoded.mode, entry.mode);
        }
    }

    #[test]
    fn info_table_is_aligned() {
        // The parallel info table must line up with the enum declaration
        // order: the mnemonic must match back to the same family.
        for entry in OPCODE_TABLE.iter() {
            let mnemonic = entry.family.info().mnemonic;
            assert_eq!(match_instruction(mnemonic), Some(entry.family));
        }
    }

    #[test]
    fn operand_lengths() {
        assert_eq!(Mode::Implied.operand_len(), 0);
        assert_eq!(Mode::Immediate.operand_len(), 1);
        assert_eq!(Mode::Absolute.operand_len(), 2);
        assert_eq!(OPCODE_TABLE[0xa9].mode, Mode::Immediate);
        assert_eq!(OPCODE_TABLE[0xa9].family, Instruction::LDA);
        assert_eq!(OPCODE_TABLE[0x00].family, Instruction::BRK);
        assert_eq!(OPCODE_TABLE[0x00].cycles, 7);
    }
}
