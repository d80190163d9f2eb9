//! Static 6502 instruction table: one [`OpcodeInfo`] per opcode byte,
//! indexed both by opcode and by `(mnemonic, mode)` for the assembler.
//!
//! Grounded on the register/opcode naming conventions of a from-scratch
//! 6502 core (`cpu-6502-rs`, see DESIGN.md) and on the standard NMOS 6502
//! instruction matrix; undocumented opcodes use the names commonly used in
//! 6502 documentation (SLO/RLA/SRE/RRA/DCP/ISC/LAX/SAX/ANC/ALR/ARR/...).

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirectX,
    IndirectIndexedY,
    Relative,
}

impl AddressingMode {
    /// Operand size in bytes, excluding the opcode byte itself.
    pub fn operand_size(self) -> u8 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndexedIndirectX
            | AddressingMode::IndirectIndexedY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub cycles: u8,
    pub page_cross_cycles: u8,
    pub is_illegal: bool,
}

impl OpcodeInfo {
    /// Total instruction length, opcode byte included.
    pub fn instruction_length(&self) -> u8 {
        1 + self.mode.operand_size()
    }
}

use AddressingMode::*;

/// `(opcode, mnemonic, mode, cycles, page_cross_cycles, is_illegal)`. Any
/// byte not listed here defaults to the JAM/halt fallback (§4.1: "unknown
/// bytes yield an entry with `isIllegal = true`").
const ENTRIES: &[(u8, &str, AddressingMode, u8, u8, bool)] = &[
    // --- official instructions ---
    (0x00, "BRK", Implied, 7, 0, false),
    (0x01, "ORA", IndexedIndirectX, 6, 0, false),
    (0x05, "ORA", ZeroPage, 3, 0, false),
    (0x06, "ASL", ZeroPage, 5, 0, false),
    (0x08, "PHP", Implied, 3, 0, false),
    (0x09, "ORA", Immediate, 2, 0, false),
    (0x0A, "ASL", Accumulator, 2, 0, false),
    (0x0D, "ORA", Absolute, 4, 0, false),
    (0x0E, "ASL", Absolute, 6, 0, false),
    (0x10, "BPL", Relative, 2, 0, false),
    (0x11, "ORA", IndirectIndexedY, 5, 1, false),
    (0x15, "ORA", ZeroPageX, 4, 0, false),
    (0x16, "ASL", ZeroPageX, 6, 0, false),
    (0x18, "CLC", Implied, 2, 0, false),
    (0x19, "ORA", AbsoluteY, 4, 1, false),
    (0x1D, "ORA", AbsoluteX, 4, 1, false),
    (0x1E, "ASL", AbsoluteX, 7, 0, false),
    (0x20, "JSR", Absolute, 6, 0, false),
    (0x21, "AND", IndexedIndirectX, 6, 0, false),
    (0x24, "BIT", ZeroPage, 3, 0, false),
    (0x25, "AND", ZeroPage, 3, 0, false),
    (0x26, "ROL", ZeroPage, 5, 0, false),
    (0x28, "PLP", Implied, 4, 0, false),
    (0x29, "AND", Immediate, 2, 0, false),
    (0x2A, "ROL", Accumulator, 2, 0, false),
    (0x2C, "BIT", Absolute, 4, 0, false),
    (0x2D, "AND", Absolute, 4, 0, false),
    (0x2E, "ROL", Absolute, 6, 0, false),
    (0x30, "BMI", Relative, 2, 0, false),
    (0x31, "AND", IndirectIndexedY, 5, 1, false),
    (0x35, "AND", ZeroPageX, 4, 0, false),
    (0x36, "ROL", ZeroPageX, 6, 0, false),
    (0x38, "SEC", Implied, 2, 0, false),
    (0x39, "AND", AbsoluteY, 4, 1, false),
    (0x3D, "AND", AbsoluteX, 4, 1, false),
    (0x3E, "ROL", AbsoluteX, 7, 0, false),
    (0x40, "RTI", Implied, 6, 0, false),
    (0x41, "EOR", IndexedIndirectX, 6, 0, false),
    (0x45, "EOR", ZeroPage, 3, 0, false),
    (0x46, "LSR", ZeroPage, 5, 0, false),
    (0x48, "PHA", Implied, 3, 0, false),
    (0x49, "EOR", Immediate, 2, 0, false),
    (0x4A, "LSR", Accumulator, 2, 0, false),
    (0x4C, "JMP", Absolute, 3, 0, false),
    (0x4D, "EOR", Absolute, 4, 0, false),
    (0x4E, "LSR", Absolute, 6, 0, false),
    (0x50, "BVC", Relative, 2, 0, false),
    (0x51, "EOR", IndirectIndexedY, 5, 1, false),
    (0x55, "EOR", ZeroPageX, 4, 0, false),
    (0x56, "LSR", ZeroPageX, 6, 0, false),
    (0x58, "CLI", Implied, 2, 0, false),
    (0x59, "EOR", AbsoluteY, 4, 1, false),
    (0x5D, "EOR", AbsoluteX, 4, 1, false),
    (0x5E, "LSR", AbsoluteX, 7, 0, false),
    (0x60, "RTS", Implied, 6, 0, false),
    (0x61, "ADC", IndexedIndirectX, 6, 0, false),
    (0x65, "ADC", ZeroPage, 3, 0, false),
    (0x66, "ROR", ZeroPage, 5, 0, false),
    (0x68, "PLA", Implied, 4, 0, false),
    (0x69, "ADC", Immediate, 2, 0, false),
    (0x6A, "ROR", Accumulator, 2, 0, false),
    (0x6C, "JMP", Indirect, 5, 0, false),
    (0x6D, "ADC", Absolute, 4, 0, false),
    (0x6E, "ROR", Absolute, 6, 0, false),
    (0x70, "BVS", Relative, 2, 0, false),
    (0x71, "ADC", IndirectIndexedY, 5, 1, false),
    (0x75, "ADC", ZeroPageX, 4, 0, false),
    (0x76, "ROR", ZeroPageX, 6, 0, false),
    (0x78, "SEI", Implied, 2, 0, false),
    (0x79, "ADC", AbsoluteY, 4, 1, false),
    (0x7D, "ADC", AbsoluteX, 4, 1, false),
    (0x7E, "ROR", AbsoluteX, 7, 0, false),
    (0x81, "STA", IndexedIndirectX, 6, 0, false),
    (0x84, "STY", ZeroPage, 3, 0, false),
    (0x85, "STA", ZeroPage, 3, 0, false),
    (0x86, "STX", ZeroPage, 3, 0, false),
    (0x88, "DEY", Implied, 2, 0, false),
    (0x8A, "TXA", Implied, 2, 0, false),
    (0x8C, "STY", Absolute, 4, 0, false),
    (0x8D, "STA", Absolute, 4, 0, false),
    (0x8E, "STX", Absolute, 4, 0, false),
    (0x90, "BCC", Relative, 2, 0, false),
    (0x91, "STA", IndirectIndexedY, 6, 0, false),
    (0x94, "STY", ZeroPageX, 4, 0, false),
    (0x95, "STA", ZeroPageX, 4, 0, false),
    (0x96, "STX", ZeroPageY, 4, 0, false),
    (0x98, "TYA", Implied, 2, 0, false),
    (0x99, "STA", AbsoluteY, 5, 0, false),
    (0x9A, "TXS", Implied, 2, 0, false),
    (0x9D, "STA", AbsoluteX, 5, 0, false),
    (0xA0, "LDY", Immediate, 2, 0, false),
    (0xA1, "LDA", IndexedIndirectX, 6, 0, false),
    (0xA2, "LDX", Immediate, 2, 0, false),
    (0xA4, "LDY", ZeroPage, 3, 0, false),
    (0xA5, "LDA", ZeroPage, 3, 0, false),
    (0xA6, "LDX", ZeroPage, 3, 0, false),
    (0xA8, "TAY", Implied, 2, 0, false),
    (0xA9, "LDA", Immediate, 2, 0, false),
    (0xAA, "TAX", Implied, 2, 0, false),
    (0xAC, "LDY", Absolute, 4, 0, false),
    (0xAD, "LDA", Absolute, 4, 0, false),
    (0xAE, "LDX", Absolute, 4, 0, false),
    (0xB0, "BCS", Relative, 2, 0, false),
    (0xB1, "LDA", IndirectIndexedY, 5, 1, false),
    (0xB4, "LDY", ZeroPageX, 4, 0, false),
    (0xB5, "LDA", ZeroPageX, 4, 0, false),
    (0xB6, "LDX", ZeroPageY, 4, 0, false),
    (0xB8, "CLV", Implied, 2, 0, false),
    (0xB9, "LDA", AbsoluteY, 4, 1, false),
    (0xBA, "TSX", Implied, 2, 0, false),
    (0xBC, "LDY", AbsoluteX, 4, 1, false),
    (0xBD, "LDA", AbsoluteX, 4, 1, false),
    (0xBE, "LDX", AbsoluteY, 4, 1, false),
    (0xC0, "CPY", Immediate, 2, 0, false),
    (0xC1, "CMP", IndexedIndirectX, 6, 0, false),
    (0xC4, "CPY", ZeroPage, 3, 0, false),
    (0xC5, "CMP", ZeroPage, 3, 0, false),
    (0xC6, "DEC", ZeroPage, 5, 0, false),
    (0xC8, "INY", Implied, 2, 0, false),
    (0xC9, "CMP", Immediate, 2, 0, false),
    (0xCA, "DEX", Implied, 2, 0, false),
    (0xCC, "CPY", Absolute, 4, 0, false),
    (0xCD, "CMP", Absolute, 4, 0, false),
    (0xCE, "DEC", Absolute, 6, 0, false),
    (0xD0, "BNE", Relative, 2, 0, false),
    (0xD1, "CMP", IndirectIndexedY, 5, 1, false),
    (0xD5, "CMP", ZeroPageX, 4, 0, false),
    (0xD6, "DEC", ZeroPageX, 6, 0, false),
    (0xD8, "CLD", Implied, 2, 0, false),
    (0xD9, "CMP", AbsoluteY, 4, 1, false),
    (0xDD, "CMP", AbsoluteX, 4, 1, false),
    (0xDE, "DEC", AbsoluteX, 7, 0, false),
    (0xE0, "CPX", Immediate, 2, 0, false),
    (0xE1, "SBC", IndexedIndirectX, 6, 0, false),
    (0xE4, "CPX", ZeroPage, 3, 0, false),
    (0xE5, "SBC", ZeroPage, 3, 0, false),
    (0xE6, "INC", ZeroPage, 5, 0, false),
    (0xE8, "INX", Implied, 2, 0, false),
    (0xE9, "SBC", Immediate, 2, 0, false),
    (0xEA, "NOP", Implied, 2, 0, false),
    (0xEC, "CPX", Absolute, 4, 0, false),
    (0xED, "SBC", Absolute, 4, 0, false),
    (0xEE, "INC", Absolute, 6, 0, false),
    (0xF0, "BEQ", Relative, 2, 0, false),
    (0xF1, "SBC", IndirectIndexedY, 5, 1, false),
    (0xF5, "SBC", ZeroPageX, 4, 0, false),
    (0xF6, "INC", ZeroPageX, 6, 0, false),
    (0xF8, "SED", Implied, 2, 0, false),
    (0xF9, "SBC", AbsoluteY, 4, 1, false),
    (0xFD, "SBC", AbsoluteX, 4, 1, false),
    (0xFE, "INC", AbsoluteX, 7, 0, false),
    // --- undocumented opcodes (documented "unofficial" naming) ---
    (0x1A, "NOP", Implied, 2, 0, true),
    (0x3A, "NOP", Implied, 2, 0, true),
    (0x5A, "NOP", Implied, 2, 0, true),
    (0x7A, "NOP", Implied, 2, 0, true),
    (0xDA, "NOP", Implied, 2, 0, true),
    (0xFA, "NOP", Implied, 2, 0, true),
    (0x80, "NOP", Immediate, 2, 0, true),
    (0x82, "NOP", Immediate, 2, 0, true),
    (0x89, "NOP", Immediate, 2, 0, true),
    (0xC2, "NOP", Immediate, 2, 0, true),
    (0xE2, "NOP", Immediate, 2, 0, true),
    (0x04, "NOP", ZeroPage, 3, 0, true),
    (0x44, "NOP", ZeroPage, 3, 0, true),
    (0x64, "NOP", ZeroPage, 3, 0, true),
    (0x14, "NOP", ZeroPageX, 4, 0, true),
    (0x34, "NOP", ZeroPageX, 4, 0, true),
    (0x54, "NOP", ZeroPageX, 4, 0, true),
    (0x74, "NOP", ZeroPageX, 4, 0, true),
    (0xD4, "NOP", ZeroPageX, 4, 0, true),
    (0xF4, "NOP", ZeroPageX, 4, 0, true),
    (0x0C, "NOP", Absolute, 4, 0, true),
    (0x1C, "NOP", AbsoluteX, 4, 1, true),
    (0x3C, "NOP", AbsoluteX, 4, 1, true),
    (0x5C, "NOP", AbsoluteX, 4, 1, true),
    (0x7C, "NOP", AbsoluteX, 4, 1, true),
    (0xDC, "NOP", AbsoluteX, 4, 1, true),
    (0xFC, "NOP", AbsoluteX, 4, 1, true),
    (0x03, "SLO", IndexedIndirectX, 8, 0, true),
    (0x07, "SLO", ZeroPage, 5, 0, true),
    (0x0F, "SLO", Absolute, 6, 0, true),
    (0x13, "SLO", IndirectIndexedY, 8, 0, true),
    (0x17, "SLO", ZeroPageX, 6, 0, true),
    (0x1B, "SLO", AbsoluteY, 7, 0, true),
    (0x1F, "SLO", AbsoluteX, 7, 0, true),
    (0x23, "RLA", IndexedIndirectX, 8, 0, true),
    (0x27, "RLA", ZeroPage, 5, 0, true),
    (0x2F, "RLA", Absolute, 6, 0, true),
    (0x33, "RLA", IndirectIndexedY, 8, 0, true),
    (0x37, "RLA", ZeroPageX, 6, 0, true),
    (0x3B, "RLA", AbsoluteY, 7, 0, true),
    (0x3F, "RLA", AbsoluteX, 7, 0, true),
    (0x43, "SRE", IndexedIndirectX, 8, 0, true),
    (0x47, "SRE", ZeroPage, 5, 0, true),
    (0x4F, "SRE", Absolute, 6, 0, true),
    (0x53, "SRE", IndirectIndexedY, 8, 0, true),
    (0x57, "SRE", ZeroPageX, 6, 0, true),
    (0x5B, "SRE", AbsoluteY, 7, 0, true),
    (0x5F, "SRE", AbsoluteX, 7, 0, true),
    (0x63, "RRA", IndexedIndirectX, 8, 0, true),
    (0x67, "RRA", ZeroPage, 5, 0, true),
    (0x6F, "RRA", Absolute, 6, 0, true),
    (0x73, "RRA", IndirectIndexedY, 8, 0, true),
    (0x77, "RRA", ZeroPageX, 6, 0, true),
    (0x7B, "RRA", AbsoluteY, 7, 0, true),
    (0x7F, "RRA", AbsoluteX, 7, 0, true),
    (0x83, "SAX", IndexedIndirectX, 6, 0, true),
    (0x87, "SAX", ZeroPage, 3, 0, true),
    (0x8F, "SAX", Absolute, 4, 0, true),
    (0x97, "SAX", ZeroPageY, 4, 0, true),
    (0xA3, "LAX", IndexedIndirectX, 6, 0, true),
    (0xA7, "LAX", ZeroPage, 3, 0, true),
    (0xAF, "LAX", Absolute, 4, 0, true),
    (0xB3, "LAX", IndirectIndexedY, 5, 1, true),
    (0xB7, "LAX", ZeroPageY, 4, 0, true),
    (0xBF, "LAX", AbsoluteY, 4, 1, true),
    (0xC3, "DCP", IndexedIndirectX, 8, 0, true),
    (0xC7, "DCP", ZeroPage, 5, 0, true),
    (0xCF, "DCP", Absolute, 6, 0, true),
    (0xD3, "DCP", IndirectIndexedY, 8, 0, true),
    (0xD7, "DCP", ZeroPageX, 6, 0, true),
    (0xDB, "DCP", AbsoluteY, 7, 0, true),
    (0xDF, "DCP", AbsoluteX, 7, 0, true),
    (0xE3, "ISC", IndexedIndirectX, 8, 0, true),
    (0xE7, "ISC", ZeroPage, 5, 0, true),
    (0xEF, "ISC", Absolute, 6, 0, true),
    (0xF3, "ISC", IndirectIndexedY, 8, 0, true),
    (0xF7, "ISC", ZeroPageX, 6, 0, true),
    (0xFB, "ISC", AbsoluteY, 7, 0, true),
    (0xFF, "ISC", AbsoluteX, 7, 0, true),
    (0x0B, "ANC", Immediate, 2, 0, true),
    (0x2B, "ANC", Immediate, 2, 0, true),
    (0x4B, "ALR", Immediate, 2, 0, true),
    (0x6B, "ARR", Immediate, 2, 0, true),
    (0x8B, "XAA", Immediate, 2, 0, true),
    (0xCB, "AXS", Immediate, 2, 0, true),
    (0xEB, "SBC", Immediate, 2, 0, true),
    (0x9B, "TAS", AbsoluteY, 5, 0, true),
    (0x9C, "SHY", AbsoluteX, 5, 0, true),
    (0x9E, "SHX", AbsoluteY, 5, 0, true),
    (0x93, "AHX", IndirectIndexedY, 6, 0, true),
    (0x9F, "AHX", AbsoluteY, 5, 0, true),
    (0xBB, "LAS", AbsoluteY, 4, 1, true),
];

const JAM: OpcodeInfo =
    OpcodeInfo { mnemonic: "JAM", mode: Implied, cycles: 2, page_cross_cycles: 0, is_illegal: true };

fn build_table() -> [OpcodeInfo; 256] {
    let mut table = [JAM; 256];
    for &(opcode, mnemonic, mode, cycles, page_cross_cycles, is_illegal) in ENTRIES {
        table[opcode as usize] =
            OpcodeInfo { mnemonic, mode, cycles, page_cross_cycles, is_illegal };
    }
    table
}

fn build_index() -> HashMap<(&'static str, AddressingMode), u8> {
    let mut index = HashMap::new();
    for (opcode, info) in build_table().iter().enumerate() {
        index.entry((info.mnemonic, info.mode)).or_insert(opcode as u8);
    }
    index
}

static TABLE: OnceLock<[OpcodeInfo; 256]> = OnceLock::new();
static INDEX: OnceLock<HashMap<(&'static str, AddressingMode), u8>> = OnceLock::new();

/// Static lookup over the 6502 instruction set (§4.1).
pub struct OpcodeTable;

impl OpcodeTable {
    pub fn lookup(byte: u8) -> OpcodeInfo {
        TABLE.get_or_init(build_table)[byte as usize]
    }

    pub fn instruction_length(byte: u8) -> u8 {
        Self::lookup(byte).instruction_length()
    }

    pub fn opcode(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
        let upper = mnemonic.to_ascii_uppercase();
        INDEX.get_or_init(build_index).get(&(leak_upper(&upper), mode)).copied().or_else(|| {
            // The interned index only contains the canonical `&'static str`
            // instances baked into ENTRIES; compare by value as a fallback
            // so callers can pass owned/borrowed strings freely.
            (0..=255u16).map(|b| b as u8).find(|&b| {
                let info = Self::lookup(b);
                info.mnemonic.eq_ignore_ascii_case(&upper) && info.mode == mode
            })
        })
    }

    pub fn opcodes_for(mnemonic: &str) -> HashMap<AddressingMode, u8> {
        let upper = mnemonic.to_ascii_uppercase();
        let mut out = HashMap::new();
        for b in 0..=255u16 {
            let info = Self::lookup(b as u8);
            if info.mnemonic.eq_ignore_ascii_case(&upper) {
                out.entry(info.mode).or_insert(b as u8);
            }
        }
        out
    }

    pub fn is_branch(mnemonic: &str) -> bool {
        matches!(
            mnemonic.to_ascii_uppercase().as_str(),
            "BCC" | "BCS" | "BEQ" | "BMI" | "BNE" | "BPL" | "BVC" | "BVS"
        )
    }

    pub fn is_jump(mnemonic: &str) -> bool {
        matches!(mnemonic.to_ascii_uppercase().as_str(), "JMP" | "JSR")
    }

    pub fn is_subroutine_call(mnemonic: &str) -> bool {
        mnemonic.eq_ignore_ascii_case("JSR")
    }

    pub fn is_return(mnemonic: &str) -> bool {
        matches!(mnemonic.to_ascii_uppercase().as_str(), "RTS" | "RTI")
    }

    /// Two's-complement 16-bit wrap-around branch target (§8).
    pub fn branch_target(pc_after_fetch: u16, offset: i8) -> u16 {
        pc_after_fetch.wrapping_add(offset as i16 as u16)
    }
}

/// This is a shim so `opcode()`'s fast path can look itself up in `INDEX`
/// without allocating; it only ever needs to compare against the
/// `&'static str`s baked into `ENTRIES`, which all happen to already be
/// upper case.
fn leak_upper(s: &str) -> &'static str {
    for (_, mnemonic, ..) in ENTRIES {
        if mnemonic.eq_ignore_ascii_case(s) {
            return mnemonic;
        }
    }
    "???"
}

pub const ROM_START: u16 = 0xC000;
pub const BRK_OPCODE: u8 = 0x00;
