//! Instruction encoding, the label/patch bookkeeping, and the inline
//! assembler used by `asm { ... }` blocks.
//!
//! Grounded directly on the predecessor's `codegen.cc`/`decoder.cc` pair:
//! `codegen.cc`'s `Codegen` built up a `Vec<Instruction>` plus a side table
//! of labels (name -> index, `-1` meaning "referenced but not yet
//! defined"); `decoder.cc` documents the bit layout each `Instruction`
//! packs into. We keep both halves, but split "label not yet known" into
//! an explicit side list of [Patch]es rather than a sentinel `-1`, so that
//! `finalize` can report every dangling reference at once instead of
//! crashing the first time one is read back.

use crate::error::AssemblyError;
use crate::util::Position;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Op {
    Lis = 0,
    Word = 1,
    Add = 2,
    Sub = 3,
    Mult = 4,
    Div = 5,
    Slt = 6,
    Mfhi = 7,
    Mflo = 8,
    Lw = 9,
    Sw = 10,
    Beq = 11,
    Bne = 12,
    Jr = 13,
    Jalr = 14,
}

impl Op {
    pub fn from_ordinal(ord: u32) -> Option<Self> {
        Some(match ord {
            0 => Op::Lis,
            1 => Op::Word,
            2 => Op::Add,
            3 => Op::Sub,
            4 => Op::Mult,
            5 => Op::Div,
            6 => Op::Slt,
            7 => Op::Mfhi,
            8 => Op::Mflo,
            9 => Op::Lw,
            10 => Op::Sw,
            11 => Op::Beq,
            12 => Op::Bne,
            13 => Op::Jr,
            14 => Op::Jalr,
            _ => return None,
        })
    }

    fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "lis" => Op::Lis,
            "add" => Op::Add,
            "sub" => Op::Sub,
            "mult" => Op::Mult,
            "div" => Op::Div,
            "slt" => Op::Slt,
            "mfhi" => Op::Mfhi,
            "mflo" => Op::Mflo,
            "lw" => Op::Lw,
            "sw" => Op::Sw,
            "beq" => Op::Beq,
            "bne" => Op::Bne,
            "jr" => Op::Jr,
            "jalr" => Op::Jalr,
            _ => return None,
        })
    }
}

/// A single 32-bit instruction word, already encoded. Kept as a plain
/// `u32` rather than a tagged struct — `decoder.cc`'s bit layout (§6) is
/// applied once at `encode` time and once at decode time in the emulator,
/// so there's no reason to carry the pre-encoded fields around in between.
pub type Word = u32;

fn r_form(op: Op, s: u32, t: u32, d: u32) -> Word {
    ((op as u32) << 28) | ((s & 0x1f) << 23) | ((t & 0x1f) << 18) | ((d & 0x1f) << 13)
}

fn i_form(op: Op, s: u32, t: u32, imm: i16) -> Word {
    ((op as u32) << 28) | ((s & 0x1f) << 23) | ((t & 0x1f) << 18) | (imm as u16 as u32)
}

fn check_reg(n: i64, pos: &Position) -> Result<u32, (AssemblyError, Position)> {
    if (0..=31).contains(&n) {
        Ok(n as u32)
    } else {
        Err((AssemblyError::BadRegister(n), pos.clone()))
    }
}

fn check_imm16(n: i64, pos: &Position) -> Result<i16, (AssemblyError, Position)> {
    if (-32768..=32767).contains(&n) {
        Ok(n as i16)
    } else {
        Err((AssemblyError::ImmediateOutOfRange(n), pos.clone()))
    }
}

/// What kind of substitution a [Patch] performs once its label resolves.
#[derive(Copy, Clone, Debug)]
pub enum PatchKind {
    /// Replace the whole word with the label's byte address (`index * 4`).
    Word,
    /// OR the low 16 bits of the existing word with a signed branch
    /// offset, `labelIndex - patchIndex - 1` instructions.
    Branch,
}

#[derive(Clone, Debug)]
pub struct Patch {
    pub kind: PatchKind,
    pub instr_index: usize,
    pub label: String,
    pub pos: Position,
}

/// Instruction-emitting half of the original `Codegen`: every helper here
/// appends to `code` and optionally records a [Patch], mirroring
/// `loadLabel`/`labelHere` 1:1. No Typer/SymbolTable access happens here —
/// this is pure assembler, driven by [crate::compiler::Compiler].
#[derive(Default)]
pub struct Codegen {
    code: Vec<Word>,
    labels: Vec<(String, Option<usize>)>,
    patches: Vec<Patch>,
}

impl Codegen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pos(&self) -> usize {
        self.code.len()
    }

    fn push(&mut self, word: Word) -> usize {
        self.code.push(word);
        self.code.len() - 1
    }

    /// Binds the current instruction index to `name`. Errors if that name
    /// was already bound (a label may be referenced by a patch before it's
    /// defined, but never defined twice).
    pub fn label_here(&mut self, pos: Position, name: impl Into<String>) -> Result<(), (AssemblyError, Position)> {
        let name = name.into();
        if let Some((_, slot)) = self.labels.iter_mut().find(|(n, _)| *n == name) {
            if slot.is_some() {
                return Err((AssemblyError::DuplicateLabel(name), pos));
            }
            *slot = Some(self.code.len());
        } else {
            self.labels.push((name, Some(self.code.len())));
        }
        Ok(())
    }

    fn label_id(&mut self, name: &str) -> usize {
        if let Some(i) = self.labels.iter().position(|(n, _)| n == name) {
            return i;
        }
        self.labels.push((name.to_string(), None));
        self.labels.len() - 1
    }

    pub fn word(&mut self, value: i32) -> usize {
        self.push(value as u32)
    }

    /// A `.word` that refers to a label by name; patched to that label's
    /// byte address at [Codegen::finalize] time.
    pub fn word_label(&mut self, pos: Position, label: impl Into<String>) -> usize {
        let idx = self.push(0);
        self.patches.push(Patch {
            kind: PatchKind::Word,
            instr_index: idx,
            label: label.into(),
            pos,
        });
        idx
    }

    pub fn lis(&mut self, d: u32, value: i32) -> usize {
        self.push(r_form(Op::Lis, 0, 0, d));
        self.word(value)
    }

    pub fn lis_label(&mut self, pos: Position, d: u32, label: impl Into<String>) -> usize {
        self.push(r_form(Op::Lis, 0, 0, d));
        self.word_label(pos, label)
    }

    pub fn add(&mut self, d: u32, s: u32, t: u32) -> usize {
        self.push(r_form(Op::Add, s, t, d))
    }

    pub fn sub(&mut self, d: u32, s: u32, t: u32) -> usize {
        self.push(r_form(Op::Sub, s, t, d))
    }

    pub fn mult(&mut self, s: u32, t: u32) -> usize {
        self.push(r_form(Op::Mult, s, t, 0))
    }

    pub fn div(&mut self, s: u32, t: u32) -> usize {
        self.push(r_form(Op::Div, s, t, 0))
    }

    pub fn slt(&mut self, d: u32, s: u32, t: u32) -> usize {
        self.push(r_form(Op::Slt, s, t, d))
    }

    pub fn mfhi(&mut self, d: u32) -> usize {
        self.push(r_form(Op::Mfhi, 0, 0, d))
    }

    pub fn mflo(&mut self, d: u32) -> usize {
        self.push(r_form(Op::Mflo, 0, 0, d))
    }

    pub fn lw(&mut self, t: u32, imm: i16, s: u32) -> usize {
        self.push(i_form(Op::Lw, s, t, imm))
    }

    pub fn sw(&mut self, t: u32, imm: i16, s: u32) -> usize {
        self.push(i_form(Op::Sw, s, t, imm))
    }

    pub fn jr(&mut self, s: u32) -> usize {
        self.push(r_form(Op::Jr, s, 0, 0))
    }

    pub fn jalr(&mut self, s: u32) -> usize {
        self.push(r_form(Op::Jalr, s, 0, 0))
    }

    /// A branch to a not-yet-known label; records a [Patch] to be filled
    /// in at [Codegen::finalize] time with the instruction-count offset.
    pub fn beq_label(&mut self, pos: Position, s: u32, t: u32, label: impl Into<String>) -> usize {
        let idx = self.push(i_form(Op::Beq, s, t, 0));
        self.patches.push(Patch { kind: PatchKind::Branch, instr_index: idx, label: label.into(), pos });
        idx
    }

    pub fn bne_label(&mut self, pos: Position, s: u32, t: u32, label: impl Into<String>) -> usize {
        let idx = self.push(i_form(Op::Bne, s, t, 0));
        self.patches.push(Patch { kind: PatchKind::Branch, instr_index: idx, label: label.into(), pos });
        idx
    }

    /// Immediate (already-known) branch, used for the handful of
    /// fixed-distance branches the expression lowering emits directly
    /// (e.g. the equality/`&&`/`||` sequences in §4.8) instead of going
    /// through a named label.
    pub fn beq_imm(&mut self, s: u32, t: u32, offset: i16) -> usize {
        self.push(i_form(Op::Beq, s, t, offset))
    }

    pub fn bne_imm(&mut self, s: u32, t: u32, offset: i16) -> usize {
        self.push(i_form(Op::Bne, s, t, offset))
    }

    /// Assembles one line of inline `asm { ... }` text (already stitched
    /// back from tokens by the parser; see
    /// [crate::parser::render_asm_token]). Grounded in spec §4.7's
    /// `Codegen::parse`: `.word <int|label>`, `<label>:`, and any mnemonic
    /// with `$n` register operands and `imm($reg)` memory operands.
    pub fn assemble_inline(&mut self, pos: Position, text: &str) -> Result<(), (AssemblyError, Position)> {
        for line in text.split(';') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.assemble_line(pos.clone(), line)?;
        }
        Ok(())
    }

    fn assemble_line(&mut self, pos: Position, line: &str) -> Result<(), (AssemblyError, Position)> {
        if let Some(label) = line.strip_suffix(':') {
            return self.label_here(pos, label.trim());
        }
        if let Some(rest) = line.strip_prefix(".word") {
            let rest = rest.trim();
            return if let Ok(n) = rest.parse::<i64>() {
                let imm = check_imm32(n, &pos)?;
                self.word(imm);
                Ok(())
            } else {
                self.word_label(pos, rest.to_string());
                Ok(())
            };
        }

        let mut parts = line.split_whitespace();
        let mnemonic = parts
            .next()
            .ok_or_else(|| (AssemblyError::InvalidAssemblyLine(line.to_string()), pos.clone()))?;
        let op = Op::from_mnemonic(mnemonic)
            .ok_or_else(|| (AssemblyError::InvalidAssemblyLine(line.to_string()), pos.clone()))?;
        let operands: Vec<&str> = line[mnemonic.len()..]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        match op {
            Op::Lis => {
                let d = parse_reg(operands.first(), &pos)?;
                let value = parse_imm_or_label(operands.get(1), &pos)?;
                match value {
                    Operand::Imm(v) => {
                        self.lis(d, check_imm32(v, &pos)?);
                    }
                    Operand::Label(l) => {
                        self.lis_label(pos, d, l);
                    }
                }
            }
            Op::Add => self.three_reg(&operands, &pos, Op::Add)?,
            Op::Sub => self.three_reg(&operands, &pos, Op::Sub)?,
            Op::Slt => self.three_reg(&operands, &pos, Op::Slt)?,
            Op::Mult => {
                let s = parse_reg(operands.first(), &pos)?;
                let t = parse_reg(operands.get(1), &pos)?;
                self.mult(s, t);
            }
            Op::Div => {
                let s = parse_reg(operands.first(), &pos)?;
                let t = parse_reg(operands.get(1), &pos)?;
                self.div(s, t);
            }
            Op::Mfhi => {
                let d = parse_reg(operands.first(), &pos)?;
                self.mfhi(d);
            }
            Op::Mflo => {
                let d = parse_reg(operands.first(), &pos)?;
                self.mflo(d);
            }
            Op::Lw | Op::Sw => {
                let t = parse_reg(operands.first(), &pos)?;
                let (imm, s) = parse_mem_operand(operands.get(1), &pos)?;
                if matches!(op, Op::Lw) {
                    self.lw(t, imm, s);
                } else {
                    self.sw(t, imm, s);
                }
            }
            Op::Beq | Op::Bne => {
                let s = parse_reg(operands.first(), &pos)?;
                let t = parse_reg(operands.get(1), &pos)?;
                let target = parse_imm_or_label(operands.get(2), &pos)?;
                match (op, target) {
                    (Op::Beq, Operand::Imm(v)) => {
                        self.beq_imm(s, t, check_imm16(v, &pos)?);
                    }
                    (Op::Beq, Operand::Label(l)) => {
                        self.beq_label(pos, s, t, l);
                    }
                    (Op::Bne, Operand::Imm(v)) => {
                        self.bne_imm(s, t, check_imm16(v, &pos)?);
                    }
                    (Op::Bne, Operand::Label(l)) => {
                        self.bne_label(pos, s, t, l);
                    }
                    _ => unreachable!(),
                }
            }
            Op::Jr => {
                let s = parse_reg(operands.first(), &pos)?;
                self.jr(s);
            }
            Op::Jalr => {
                let s = parse_reg(operands.first(), &pos)?;
                self.jalr(s);
            }
            Op::Word => unreachable!(".word is handled above"),
        }
        Ok(())
    }

    fn three_reg(&mut self, operands: &[&str], pos: &Position, op: Op) -> Result<(), (AssemblyError, Position)> {
        let d = parse_reg(operands.first(), pos)?;
        let s = parse_reg(operands.get(1), pos)?;
        let t = parse_reg(operands.get(2), pos)?;
        match op {
            Op::Add => self.add(d, s, t),
            Op::Sub => self.sub(d, s, t),
            Op::Slt => self.slt(d, s, t),
            _ => unreachable!(),
        };
        Ok(())
    }

    /// Resolves every [Patch] against `labels`, and returns the final word
    /// stream. Corresponds to the predecessor's label-resolution step that
    /// ran implicitly as each `getLabel`-produced index was consumed; here
    /// it's a single explicit pass so that every dangling reference is
    /// reported, not just the first.
    pub fn finalize(mut self) -> Result<Vec<Word>, Vec<(AssemblyError, Position)>> {
        let mut errors = Vec::new();
        for patch in &self.patches {
            let label_idx = match self.labels.iter().find(|(n, _)| *n == patch.label) {
                Some((_, Some(idx))) => *idx,
                _ => {
                    errors.push((
                        AssemblyError::UndefinedLabel(patch.label.clone()),
                        patch.pos.clone(),
                    ));
                    continue;
                }
            };
            match patch.kind {
                PatchKind::Word => {
                    self.code[patch.instr_index] = (label_idx as u32) * 4;
                }
                PatchKind::Branch => {
                    let offset = label_idx as i64 - patch.instr_index as i64 - 1;
                    if !(-32768..=32767).contains(&offset) {
                        errors.push((
                            AssemblyError::BranchOutOfRange { offset: offset as i32 },
                            patch.pos.clone(),
                        ));
                        continue;
                    }
                    self.code[patch.instr_index] |= (offset as i16 as u16) as u32;
                }
            }
        }
        if errors.is_empty() {
            Ok(self.code)
        } else {
            Err(errors)
        }
    }
}

fn check_imm32(n: i64, pos: &Position) -> Result<i32, (AssemblyError, Position)> {
    if (i32::MIN as i64..=i32::MAX as i64).contains(&n) {
        Ok(n as i32)
    } else {
        Err((AssemblyError::ImmediateOutOfRange(n), pos.clone()))
    }
}

enum Operand {
    Imm(i64),
    Label(String),
}

fn parse_reg(operand: Option<&&str>, pos: &Position) -> Result<u32, (AssemblyError, Position)> {
    let s = operand.ok_or_else(|| (AssemblyError::BadRegister(-1), pos.clone()))?;
    let s = s.strip_prefix('$').ok_or_else(|| (AssemblyError::BadRegister(-1), pos.clone()))?;
    let n: i64 = s.parse().map_err(|_| (AssemblyError::BadRegister(-1), pos.clone()))?;
    check_reg(n, pos)
}

fn parse_imm_or_label(operand: Option<&&str>, pos: &Position) -> Result<Operand, (AssemblyError, Position)> {
    let s = operand.ok_or_else(|| (AssemblyError::InvalidAssemblyLine(String::new()), pos.clone()))?;
    if let Ok(n) = s.parse::<i64>() {
        Ok(Operand::Imm(n))
    } else {
        Ok(Operand::Label(s.to_string()))
    }
}

/// Parses an `imm($reg)` memory operand, as used by `lw`/`sw`.
fn parse_mem_operand(operand: Option<&&str>, pos: &Position) -> Result<(i16, u32), (AssemblyError, Position)> {
    let s = operand.ok_or_else(|| (AssemblyError::InvalidAssemblyLine(String::new()), pos.clone()))?;
    let open = s.find('(').ok_or_else(|| (AssemblyError::InvalidAssemblyLine(s.to_string()), pos.clone()))?;
    let close = s.find(')').ok_or_else(|| (AssemblyError::InvalidAssemblyLine(s.to_string()), pos.clone()))?;
    let imm_str = s[..open].trim();
    let imm: i64 = imm_str.parse().map_err(|_| (AssemblyError::InvalidAssemblyLine(s.to_string()), pos.clone()))?;
    let imm = check_imm16(imm, pos)?;
    let reg_str = s[open + 1..close].trim();
    let reg = parse_reg(Some(&reg_str), pos)?;
    Ok((imm, reg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_form_packs_fields() {
        let w = r_form(Op::Add, 3, 5, 7);
        assert_eq!((w >> 28) & 0xf, Op::Add as u32);
        assert_eq!((w >> 23) & 0x1f, 3);
        assert_eq!((w >> 18) & 0x1f, 5);
        assert_eq!((w >> 13) & 0x1f, 7);
    }

    #[test]
    fn i_form_keeps_signed_immediate() {
        let w = i_form(Op::Lw, 1, 2, -1);
        assert_eq!(w & 0xffff, 0xffff);
    }

    #[test]
    fn label_patch_resolves_to_instruction_offset() {
        let mut gen = Codegen::new();
        gen.beq_label(Position::synthetic(), 1, 2, "end");
        gen.add(3, 3, 3);
        gen.label_here(Position::synthetic(), "end").unwrap();
        let code = gen.finalize().unwrap();
        // label "end" is at instruction index 1; patch was instruction 0.
        // offset = 1 - 0 - 1 = 0
        assert_eq!(code[0] & 0xffff, 0);
    }

    #[test]
    fn word_patch_resolves_to_byte_address() {
        let mut gen = Codegen::new();
        gen.word(0);
        gen.word_label(Position::synthetic(), "there");
        gen.label_here(Position::synthetic(), "there").unwrap();
        let code = gen.finalize().unwrap();
        assert_eq!(code[1], 2 * 4);
    }

    #[test]
    fn undefined_label_is_an_error() {
        let mut gen = Codegen::new();
        gen.beq_label(Position::synthetic(), 0, 0, "nowhere");
        assert!(gen.finalize().is_err());
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut gen = Codegen::new();
        gen.label_here(Position::synthetic(), "x").unwrap();
        assert!(gen.label_here(Position::synthetic(), "x").is_err());
    }

    #[test]
    fn out_of_range_branch_offset_is_rejected() {
        let mut gen = Codegen::new();
        gen.beq_label(Position::synthetic(), 0, 0, "far");
        for _ in 0..70_000 {
            gen.add(0, 0, 0);
        }
        gen.label_here(Position::synthetic(), "far").unwrap();
        assert!(gen.finalize().is_err());
    }

    #[test]
    fn assembles_inline_mnemonics() {
        let mut gen = Codegen::new();
        gen.assemble_inline(Position::synthetic(), "lis $1, 42; sw $1, 0($30)").unwrap();
        let code = gen.finalize().unwrap();
        assert_eq!(code.len(), 3); // lis expands to two words
        assert_eq!(code[1], 42);
    }

    #[test]
    fn assembles_label_and_word_directive() {
        let mut gen = Codegen::new();
        gen.assemble_inline(Position::synthetic(), "top: .word 7; jr $31").unwrap();
        let code = gen.finalize().unwrap();
        assert_eq!(code[0], 7);
    }

    #[test]
    fn bad_register_number_is_rejected() {
        let mut gen = Codegen::new();
        assert!(gen.assemble_inline(Position::synthetic(), "add $1, $2, $40").is_err());
    }
}
