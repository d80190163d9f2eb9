//! Two-pass 6502 assembler, recursive-descent expression evaluator's
//! consumer, and the interactive line-at-a-time wrapper the monitor uses
//! while typing (§4.2).

use crate::error::AssemblerError;
use crate::expr;
use crate::opcodes::{AddressingMode, OpcodeTable};
use crate::symtab::SymbolTable;

/// One assembled source line: the address its bytes were placed at, the
/// bytes themselves (empty for label-only and most pseudo-op lines), and
/// the original source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyResult {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    One,
    Two,
    /// Single-line assembly for the interactive monitor: like `Two`, an
    /// undefined label is a hard error rather than a forward-reference
    /// guess, but like `One`, a label definition is duplicate-checked
    /// instead of silently overwriting the symbol table.
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PseudoOp {
    Org,
    Byte,
    Word,
    Reserve,
    Hex,
    Asc,
    Dci,
    Equ,
    End,
}

fn pseudo_op_kind(tok: &str) -> Option<PseudoOp> {
    match tok.to_ascii_uppercase().as_str() {
        "ORG" => Some(PseudoOp::Org),
        "DB" | "BYTE" | "DFB" => Some(PseudoOp::Byte),
        "DW" | "WORD" | "DFW" => Some(PseudoOp::Word),
        "DS" | "BLOCK" => Some(PseudoOp::Reserve),
        "HEX" => Some(PseudoOp::Hex),
        "ASC" => Some(PseudoOp::Asc),
        "DCI" => Some(PseudoOp::Dci),
        "EQU" => Some(PseudoOp::Equ),
        "END" => Some(PseudoOp::End),
        _ => None,
    }
}

fn is_known_leading_token(tok: &str) -> bool {
    pseudo_op_kind(tok).is_some() || !OpcodeTable::opcodes_for(tok).is_empty()
}

/// Splits leading whitespace-delimited token from the rest of the line.
fn split_first_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

enum Indirect<'a> {
    IndexedX(&'a str),
    IndirectY(&'a str),
    Plain(&'a str),
}

fn parse_indirect(operand: &str) -> Option<Indirect<'_>> {
    if !operand.starts_with('(') {
        return None;
    }
    let body = &operand[1..];
    if let Some(inner) = strip_suffix_ci(body, ",X)") {
        return Some(Indirect::IndexedX(inner));
    }
    if let Some(without_suffix) = strip_suffix_ci(operand, "),Y") {
        return Some(Indirect::IndirectY(&without_suffix[1..]));
    }
    body.strip_suffix(')').map(Indirect::Plain)
}

/// Two-pass assembler over a full source listing, with per-line assembly
/// exposed for interactive use (`assemble_line`). Forward references are
/// handled by assembling every line twice: the first pass may guess at
/// an ambiguous zero-page/absolute choice when the operand depends on an
/// as-yet-undefined label, and pins that guess so the second pass keeps
/// the exact same instruction lengths (and therefore the exact same
/// addresses) even once the real value is known.
pub struct Assembler {
    pub symtab: SymbolTable,
    pc: u16,
}

impl Assembler {
    pub fn new() -> Self {
        Self::new_at(0)
    }

    pub fn new_at(origin: u16) -> Self {
        Self { symtab: SymbolTable::new(), pc: origin }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// Assembles one line against the current PC and symbol table. On
    /// success the PC advances by `bytes.len()`; on failure it is left
    /// untouched. Undefined identifiers always fail here — multi-pass
    /// forward-reference resolution is only available through
    /// [`Assembler::assemble`].
    pub fn assemble_line(&mut self, text: &str) -> Result<AssemblyResult, AssemblerError> {
        let outcome = self.process_line(text, Pass::Interactive, None)?;
        Ok(outcome.result)
    }

    /// Assembles a full multi-line source text in two passes, resolving
    /// forward references. Returns one [`AssemblyResult`] per source line
    /// up to (and including) a line containing `END`, if present.
    pub fn assemble(&mut self, source: &str) -> Result<Vec<AssemblyResult>, AssemblerError> {
        let lines: Vec<&str> = source.lines().collect();
        let origin = self.pc;
        let mut forced_modes: Vec<Option<AddressingMode>> = vec![None; lines.len()];
        let mut end_at = lines.len();

        for (i, line) in lines.iter().enumerate() {
            let outcome = self.process_line(line, Pass::One, None)?;
            forced_modes[i] = outcome.mode_used;
            if outcome.ended {
                end_at = i + 1;
                break;
            }
        }

        self.pc = origin;
        let mut results = Vec::with_capacity(end_at);
        for (i, line) in lines.iter().enumerate().take(end_at) {
            let outcome = self.process_line(line, Pass::Two, forced_modes[i])?;
            results.push(outcome.result);
        }
        Ok(results)
    }

    fn define_or_set(&mut self, pass: Pass, name: &str, value: i32) -> Result<(), AssemblerError> {
        match pass {
            Pass::One | Pass::Interactive => self.symtab.define(name, value),
            Pass::Two => {
                self.symtab.set(name, value);
                Ok(())
            }
        }
    }

    fn eval(&mut self, text: &str, pass: Pass) -> Result<(i32, bool), AssemblerError> {
        match expr::evaluate(text, &mut self.symtab, self.pc as i32) {
            Ok(v) => Ok((v, false)),
            Err(AssemblerError::UndefinedLabel(name)) if pass == Pass::One => {
                let _ = name;
                Ok((0, true))
            }
            Err(e) => Err(e),
        }
    }

    fn process_line(
        &mut self,
        raw_line: &str,
        pass: Pass,
        forced_mode: Option<AddressingMode>,
    ) -> Result<LineOutcome, AssemblerError> {
        let address = self.pc;
        let source = raw_line.to_string();
        let code = strip_comment(raw_line).trim();

        if code.is_empty() {
            return Ok(LineOutcome {
                result: AssemblyResult { address, bytes: Vec::new(), source },
                mode_used: None,
                ended: false,
            });
        }

        let (tok1, rest1) = split_first_token(code);
        let (label, remainder) = if let Some(bare) = tok1.strip_suffix(':') {
            (Some(bare.to_string()), rest1)
        } else if is_known_leading_token(tok1) {
            (None, code)
        } else {
            (Some(tok1.to_string()), rest1)
        };

        if remainder.is_empty() {
            if let Some(name) = &label {
                self.define_or_set(pass, name, address as i32)?;
            }
            return Ok(LineOutcome {
                result: AssemblyResult { address, bytes: Vec::new(), source },
                mode_used: None,
                ended: false,
            });
        }

        let (op_tok, operand) = split_first_token(remainder);

        if let Some(pseudo) = pseudo_op_kind(op_tok) {
            return self.process_pseudo_op(pseudo, label.as_deref(), operand, pass, address, source);
        }

        if let Some(name) = &label {
            self.define_or_set(pass, name, address as i32)?;
        }
        self.process_instruction(op_tok, operand, pass, forced_mode, address, source)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_pseudo_op(
        &mut self,
        pseudo: PseudoOp,
        label: Option<&str>,
        operand: &str,
        pass: Pass,
        address: u16,
        source: String,
    ) -> Result<LineOutcome, AssemblerError> {
        match pseudo {
            PseudoOp::Org => {
                let (value, _) = self.eval(operand, pass)?;
                let target = value as u16;
                self.pc = target;
                if let Some(name) = label {
                    self.define_or_set(pass, name, target as i32)?;
                }
                Ok(LineOutcome {
                    result: AssemblyResult { address: target, bytes: Vec::new(), source },
                    mode_used: None,
                    ended: false,
                })
            }
            PseudoOp::Equ => {
                let name = label.ok_or_else(|| {
                    AssemblerError::InvalidPseudoOp("EQU requires a label".to_string())
                })?;
                let (value, _) = self.eval(operand, pass)?;
                self.define_or_set(pass, name, value)?;
                Ok(LineOutcome {
                    result: AssemblyResult { address, bytes: Vec::new(), source },
                    mode_used: None,
                    ended: false,
                })
            }
            PseudoOp::End => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                Ok(LineOutcome {
                    result: AssemblyResult { address, bytes: Vec::new(), source },
                    mode_used: None,
                    ended: true,
                })
            }
            PseudoOp::Byte => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                let mut bytes = Vec::new();
                for item in operand.split(',') {
                    let item = item.trim();
                    let (value, _) = self.eval(item, pass)?;
                    if !(-128..=255).contains(&value) {
                        return Err(AssemblerError::ValueOutOfRange {
                            context: "DB".to_string(),
                            value,
                            lo: -128,
                            hi: 255,
                        });
                    }
                    bytes.push((value & 0xFF) as u8);
                }
                self.pc = self.pc.wrapping_add(bytes.len() as u16);
                Ok(LineOutcome { result: AssemblyResult { address, bytes, source }, mode_used: None, ended: false })
            }
            PseudoOp::Word => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                let mut bytes = Vec::new();
                for item in operand.split(',') {
                    let item = item.trim();
                    let (value, _) = self.eval(item, pass)?;
                    if !(-32768..=65535).contains(&value) {
                        return Err(AssemblerError::ValueOutOfRange {
                            context: "DW".to_string(),
                            value,
                            lo: -32768,
                            hi: 65535,
                        });
                    }
                    let word = (value as i64 & 0xFFFF) as u16;
                    bytes.extend_from_slice(&word.to_le_bytes());
                }
                self.pc = self.pc.wrapping_add(bytes.len() as u16);
                Ok(LineOutcome { result: AssemblyResult { address, bytes, source }, mode_used: None, ended: false })
            }
            PseudoOp::Reserve => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                let (value, _) = self.eval(operand, pass)?;
                if value < 0 {
                    return Err(AssemblerError::InvalidOperand(format!(
                        "DS/BLOCK count must be non-negative, got {value}"
                    )));
                }
                let bytes = vec![0u8; value as usize];
                self.pc = self.pc.wrapping_add(bytes.len() as u16);
                Ok(LineOutcome { result: AssemblyResult { address, bytes, source }, mode_used: None, ended: false })
            }
            PseudoOp::Hex => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                let digits: String = operand.chars().filter(|c| !c.is_whitespace()).collect();
                if digits.len() % 2 != 0 || digits.is_empty() {
                    return Err(AssemblerError::InvalidOperand(
                        "HEX requires an even number of hex digits".to_string(),
                    ));
                }
                let mut bytes = Vec::with_capacity(digits.len() / 2);
                let chars: Vec<char> = digits.chars().collect();
                for pair in chars.chunks(2) {
                    let text: String = pair.iter().collect();
                    let byte = u8::from_str_radix(&text, 16)
                        .map_err(|_| AssemblerError::InvalidOperand(format!("invalid hex byte {text}")))?;
                    bytes.push(byte);
                }
                self.pc = self.pc.wrapping_add(bytes.len() as u16);
                Ok(LineOutcome { result: AssemblyResult { address, bytes, source }, mode_used: None, ended: false })
            }
            PseudoOp::Asc | PseudoOp::Dci => {
                if let Some(name) = label {
                    self.define_or_set(pass, name, address as i32)?;
                }
                let text = operand.trim();
                let inner = text
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .ok_or_else(|| {
                        AssemblerError::SyntaxError(format!("expected a quoted string, got {text}"))
                    })?;
                let mut bytes = inner.as_bytes().to_vec();
                if pseudo == PseudoOp::Dci {
                    if let Some(last) = bytes.last_mut() {
                        *last |= 0x80;
                    }
                }
                self.pc = self.pc.wrapping_add(bytes.len() as u16);
                Ok(LineOutcome { result: AssemblyResult { address, bytes, source }, mode_used: None, ended: false })
            }
        }
    }

    fn process_instruction(
        &mut self,
        mnemonic: &str,
        operand: &str,
        pass: Pass,
        forced_mode: Option<AddressingMode>,
        address: u16,
        source: String,
    ) -> Result<LineOutcome, AssemblerError> {
        let modes = OpcodeTable::opcodes_for(mnemonic);
        if modes.is_empty() {
            return Err(AssemblerError::InvalidInstruction(mnemonic.to_string()));
        }
        let mnemonic_upper = mnemonic.to_ascii_uppercase();
        let operand = operand.trim();

        let (mode, operand_bytes) = if OpcodeTable::is_branch(&mnemonic_upper) {
            let (target, forward_ref) = self.eval(operand, pass)?;
            let pc_after = self.pc.wrapping_add(2);
            let offset = target - pc_after as i32;
            if !forward_ref && !(-128..=127).contains(&offset) {
                return Err(AssemblerError::BranchOutOfRange(offset));
            }
            (AddressingMode::Relative, vec![offset as i8 as u8])
        } else if operand.is_empty() {
            if modes.contains_key(&AddressingMode::Accumulator) {
                (AddressingMode::Accumulator, Vec::new())
            } else if modes.contains_key(&AddressingMode::Implied) {
                (AddressingMode::Implied, Vec::new())
            } else {
                return Err(AssemblerError::InvalidAddressingMode(
                    mnemonic_upper,
                    "(no operand)".to_string(),
                ));
            }
        } else if operand.eq_ignore_ascii_case("A") && modes.contains_key(&AddressingMode::Accumulator) {
            (AddressingMode::Accumulator, Vec::new())
        } else if let Some(rest) = operand.strip_prefix('#') {
            let (value, forward_ref) = self.eval(rest, pass)?;
            if !forward_ref && !(-128..=255).contains(&value) {
                return Err(AssemblerError::ValueOutOfRange {
                    context: format!("{mnemonic_upper} immediate"),
                    value,
                    lo: -128,
                    hi: 255,
                });
            }
            (AddressingMode::Immediate, vec![(value & 0xFF) as u8])
        } else if let Some(indirect) = parse_indirect(operand) {
            match indirect {
                Indirect::IndexedX(inner) => {
                    let (value, _) = self.eval(inner, pass)?;
                    (AddressingMode::IndexedIndirectX, vec![(value & 0xFF) as u8])
                }
                Indirect::IndirectY(inner) => {
                    let (value, _) = self.eval(inner, pass)?;
                    (AddressingMode::IndirectIndexedY, vec![(value & 0xFF) as u8])
                }
                Indirect::Plain(inner) => {
                    let (value, _) = self.eval(inner, pass)?;
                    let bytes = (value as u16).to_le_bytes().to_vec();
                    (AddressingMode::Indirect, bytes)
                }
            }
        } else if let Some(inner) = strip_suffix_ci(operand, ",X") {
            let (value, forward_ref) = self.eval(inner, pass)?;
            self.resolve_indexed(
                forced_mode,
                forward_ref,
                value,
                &modes,
                AddressingMode::ZeroPageX,
                AddressingMode::AbsoluteX,
            )?
        } else if let Some(inner) = strip_suffix_ci(operand, ",Y") {
            let (value, forward_ref) = self.eval(inner, pass)?;
            self.resolve_indexed(
                forced_mode,
                forward_ref,
                value,
                &modes,
                AddressingMode::ZeroPageY,
                AddressingMode::AbsoluteY,
            )?
        } else {
            let (value, forward_ref) = self.eval(operand, pass)?;
            self.resolve_indexed(
                forced_mode,
                forward_ref,
                value,
                &modes,
                AddressingMode::ZeroPage,
                AddressingMode::Absolute,
            )?
        };

        let opcode = OpcodeTable::opcode(&mnemonic_upper, mode).ok_or_else(|| {
            AssemblerError::InvalidAddressingMode(mnemonic_upper.clone(), operand.to_string())
        })?;

        let mut bytes = Vec::with_capacity(1 + operand_bytes.len());
        bytes.push(opcode);
        bytes.extend_from_slice(&operand_bytes);
        self.pc = self.pc.wrapping_add(bytes.len() as u16);

        Ok(LineOutcome {
            result: AssemblyResult { address, bytes, source },
            mode_used: Some(mode),
            ended: false,
        })
    }

    /// Chooses between a zero-page-family mode and its absolute
    /// counterpart. When the first pass had to guess because of a forward
    /// reference, `forced_mode` pins the second pass to the same choice so
    /// instruction lengths (and therefore every later address) stay
    /// identical across both passes.
    #[allow(clippy::too_many_arguments)]
    fn resolve_indexed(
        &self,
        forced_mode: Option<AddressingMode>,
        forward_ref: bool,
        value: i32,
        modes: &std::collections::HashMap<AddressingMode, u8>,
        zp_mode: AddressingMode,
        abs_mode: AddressingMode,
    ) -> Result<(AddressingMode, Vec<u8>), AssemblerError> {
        if let Some(mode) = forced_mode {
            let bytes = Self::encode_for_mode(mode, value);
            return Ok((mode, bytes));
        }
        if forward_ref {
            // Unknown value: always guess absolute so the instruction's
            // length cannot shrink once the real value is known.
            return Ok((abs_mode, (value as u16).to_le_bytes().to_vec()));
        }
        if (0..=255).contains(&value) && modes.contains_key(&zp_mode) {
            Ok((zp_mode, vec![(value & 0xFF) as u8]))
        } else {
            Ok((abs_mode, (value as u16).to_le_bytes().to_vec()))
        }
    }

    fn encode_for_mode(mode: AddressingMode, value: i32) -> Vec<u8> {
        if mode.operand_size() == 1 {
            vec![(value & 0xFF) as u8]
        } else {
            (value as u16).to_le_bytes().to_vec()
        }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

struct LineOutcome {
    result: AssemblyResult,
    mode_used: Option<AddressingMode>,
    ended: bool,
}

/// Wraps an [`Assembler`] for line-at-a-time interactive use: a failed
/// line leaves the PC untouched, and results can be rendered in the
/// monitor's disassembly-like listing format.
pub struct InteractiveAssembler {
    assembler: Assembler,
}

impl InteractiveAssembler {
    pub fn new(origin: u16) -> Self {
        Self { assembler: Assembler::new_at(origin) }
    }

    pub fn assemble_line(&mut self, text: &str) -> Result<AssemblyResult, AssemblerError> {
        self.assembler.assemble_line(text)
    }

    pub fn reset(&mut self, to: u16) {
        self.assembler.set_pc(to);
    }

    pub fn pc(&self) -> u16 {
        self.assembler.pc()
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.assembler.symtab
    }

    /// `"$ADDR  BB BB BB  SOURCE"`.
    pub fn format(&self, result: &AssemblyResult) -> String {
        let hex = result.bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ");
        format!("${:04X}  {:<8}  {}", result.address, hex, result.source.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_fill_loop_assembles_to_exact_bytes() {
        let mut asm = Assembler::new();
        let source = "START LDA #$00\n    TAX\nLOOP STA $D400,X\n    INX\n    BNE LOOP\n    RTS";
        let results = asm.assemble(&format!("ORG $0600\n{source}")).unwrap();
        let all_bytes: Vec<u8> = results.iter().flat_map(|r| r.bytes.clone()).collect();
        assert_eq!(all_bytes, vec![0xA9, 0x00, 0xAA, 0x9D, 0x00, 0xD4, 0xE8, 0xD0, 0xFA, 0x60]);
        assert_eq!(asm.symtab.lookup("START"), Some(0x0600));
        assert_eq!(asm.symtab.lookup("LOOP"), Some(0x0603));
    }

    #[test]
    fn label_only_line_produces_zero_bytes() {
        let mut asm = Assembler::new_at(0x0600);
        let result = asm.assemble_line("START:").unwrap();
        assert!(result.bytes.is_empty());
        assert_eq!(asm.symtab.lookup("START"), Some(0x0600));
    }

    #[test]
    fn immediate_mode_emits_two_bytes() {
        let mut asm = Assembler::new_at(0x0600);
        let result = asm.assemble_line("LDA #$42").unwrap();
        assert_eq!(result.bytes, vec![0xA9, 0x42]);
    }

    #[test]
    fn zero_page_chosen_when_value_fits() {
        let mut asm = Assembler::new_at(0x0600);
        let result = asm.assemble_line("LDA $10").unwrap();
        assert_eq!(result.bytes, vec![0xA5, 0x10]);
    }

    #[test]
    fn absolute_chosen_when_value_does_not_fit() {
        let mut asm = Assembler::new_at(0x0600);
        let result = asm.assemble_line("LDA $1000").unwrap();
        assert_eq!(result.bytes, vec![0xAD, 0x00, 0x10]);
    }

    #[test]
    fn indexed_indirect_x_and_indirect_y() {
        let mut asm = Assembler::new_at(0x0600);
        assert_eq!(asm.assemble_line("LDA ($10,X)").unwrap().bytes, vec![0xA1, 0x10]);
        assert_eq!(asm.assemble_line("LDA ($20),Y").unwrap().bytes, vec![0xB1, 0x20]);
        assert_eq!(asm.assemble_line("JMP ($1234)").unwrap().bytes, vec![0x6C, 0x34, 0x12]);
    }

    #[test]
    fn accumulator_mode_for_asl() {
        let mut asm = Assembler::new_at(0x0600);
        assert_eq!(asm.assemble_line("ASL A").unwrap().bytes, vec![0x0A]);
        assert_eq!(asm.assemble_line("ASL").unwrap().bytes, vec![0x0A]);
    }

    #[test]
    fn implied_mode_for_nop() {
        let mut asm = Assembler::new_at(0x0600);
        assert_eq!(asm.assemble_line("NOP").unwrap().bytes, vec![0xEA]);
    }

    #[test]
    fn branch_out_of_range_fails() {
        let mut asm = Assembler::new_at(0x0600);
        let err = asm.assemble_line("BNE $1000").unwrap_err();
        assert_eq!(err, AssemblerError::BranchOutOfRange(0x1000 - 0x0602));
    }

    #[test]
    fn undefined_label_fails_and_leaves_pc_untouched() {
        let mut asm = Assembler::new_at(0x0600);
        let err = asm.assemble_line("LDA MISSING").unwrap_err();
        assert_eq!(err, AssemblerError::UndefinedLabel("MISSING".to_string()));
        assert_eq!(asm.pc(), 0x0600);
    }

    #[test]
    fn duplicate_label_fails() {
        let mut asm = Assembler::new_at(0x0600);
        asm.assemble_line("START:").unwrap();
        let err = asm.assemble_line("START:").unwrap_err();
        assert_eq!(err, AssemblerError::DuplicateLabel("START".to_string()));
    }

    #[test]
    fn equ_defines_without_advancing_pc() {
        let mut asm = Assembler::new_at(0x0600);
        asm.assemble_line("SCREEN EQU $D400").unwrap();
        assert_eq!(asm.symtab.lookup("SCREEN"), Some(0xD400));
        assert_eq!(asm.pc(), 0x0600);
    }

    #[test]
    fn byte_and_word_pseudo_ops() {
        let mut asm = Assembler::new_at(0x0600);
        assert_eq!(asm.assemble_line("DB $01,$02,3").unwrap().bytes, vec![1, 2, 3]);
        assert_eq!(asm.assemble_line("DW $1234").unwrap().bytes, vec![0x34, 0x12]);
    }

    #[test]
    fn ds_reserves_zero_bytes() {
        let mut asm = Assembler::new_at(0x0600);
        let result = asm.assemble_line("DS 4").unwrap();
        assert_eq!(result.bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn hex_and_asc_and_dci() {
        let mut asm = Assembler::new_at(0x0600);
        assert_eq!(asm.assemble_line("HEX A9003D").unwrap().bytes, vec![0xA9, 0x00, 0x3D]);
        assert_eq!(asm.assemble_line("ASC \"HI\"").unwrap().bytes, vec![b'H', b'I']);
        assert_eq!(asm.assemble_line("DCI \"HI\"").unwrap().bytes, vec![b'H', b'I' | 0x80]);
    }

    #[test]
    fn end_stops_further_assembly() {
        let mut asm = Assembler::new();
        let results = asm.assemble("ORG $0600\nLDA #$00\nEND\nLDA #$FF").unwrap();
        let all_bytes: Vec<u8> = results.iter().flat_map(|r| r.bytes.clone()).collect();
        assert_eq!(all_bytes, vec![0xA9, 0x00]);
    }

    #[test]
    fn forward_reference_resolves_with_consistent_addresses() {
        let mut asm = Assembler::new();
        let source = "ORG $0600\n JMP TARGET\nTARGET LDA #$01";
        let results = asm.assemble(source).unwrap();
        assert_eq!(asm.symtab.lookup("TARGET"), Some(0x0603));
        assert_eq!(results[1].bytes, vec![0x4C, 0x03, 0x06]);
    }

    #[test]
    fn interactive_assembler_formats_lines() {
        let mut ia = InteractiveAssembler::new(0x0600);
        let result = ia.assemble_line("LDA #$00").unwrap();
        assert_eq!(ia.format(&result), "$0600  A9 00     LDA #$00");
        assert_eq!(ia.pc(), 0x0602);
    }

    #[test]
    fn interactive_assembler_reset_moves_pc_without_clearing_symbols() {
        let mut ia = InteractiveAssembler::new(0x0600);
        ia.assemble_line("START:").unwrap();
        ia.reset(0x2000);
        assert_eq!(ia.pc(), 0x2000);
        assert_eq!(ia.symbol_table().lookup("START"), Some(0x0600));
    }
}
