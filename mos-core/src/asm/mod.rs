//! The two-pass assembler.
//!
//! Pass 1 (parser) builds an ordered opdata IR and a symbol table of
//! expression trees. Layout then walks the IR with a location cursor,
//! deciding zero-page versus absolute for the syntactically-ambiguous
//! modes; symbol resolution iterates the table to a fix-point; the final
//! passes coerce operands (relative-branch fix-ups included) and encode
//! opcodes out of the 256-entry table. Emission of the four artefacts
//! (.bin/.hex/.map/.dbg) lives in `emit`.

pub mod emit;
pub mod parser;

use std::collections::BTreeMap;

use colored::*;
use log::{debug, info, warn};
use thiserror::Error;

use crate::opcodes::{opcode_lookup, Instruction, Mode};

/// Where the location cursor starts unless `.org` says otherwise.
pub const DEFAULT_ORIGIN: u16 = 0x8000;

/// Gaps below this many bytes are NOP-filled in the binary image; at or
/// above it the binary is split when splitting is enabled.
pub const DEFAULT_GAP_THRESHOLD: usize = 1024;

/// The fill byte for binary gaps: NOP.
pub const GAP_FILL_BYTE: u8 = 0xEA;

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("{file}:{line}: error: {msg}")]
    Parse { file: String, line: u32, msg: String },
    #[error("{file}:{line}: error: unresolved symbol '{name}'")]
    Unresolved { file: String, line: u32, name: String },
    #[error("{file}:{line}: error: branch out of range")]
    BranchOutOfRange { file: String, line: u32 },
    #[error("{file}:{line}: error: {msg}")]
    Width { file: String, line: u32, msg: String },
    #[error("{file}:{line}: error: illegal addressing mode '{mode}' for '{mnemonic}'")]
    IllegalMode {
        file: String,
        line: u32,
        mnemonic: &'static str,
        mode: &'static str,
    },
    #[error("output overlaps itself at ${offset:04x}")]
    Overlap { offset: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An operand expression tree. Evaluation produces fresh `Byte`/`Word`
/// results; shared nodes are never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Word(u16),
    Label(String),
    Arith(ArithOp, Box<Value>, Box<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

/// A fully-reduced operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Byte(u8),
    Word(u16),
}

impl Resolved {
    pub fn word(self) -> u16 {
        match self {
            Resolved::Byte(b) => b as u16,
            Resolved::Word(w) => w,
        }
    }

    pub fn width(self) -> Width {
        match self {
            Resolved::Byte(_) => Width::Byte,
            Resolved::Word(_) => Width::Word,
        }
    }
}

#[derive(Debug)]
pub enum SymbolKind {
    /// A `name:` label; the address is filled in during layout.
    Address(Option<u16>),
    /// A `name = expr` assignment, reduced by the fix-point loop.
    Equ(Value),
}

#[derive(Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub file: String,
    pub line: u32,
}

#[derive(Debug)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            symbols: BTreeMap::new(),
        }
    }

    pub fn define_label(&mut self, name: &str, file: &str, line: u32) -> Result<(), String> {
        if self.symbols.contains_key(name) {
            return Err(format!("duplicate symbol '{}'", name));
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                kind: SymbolKind::Address(None),
                file: file.to_string(),
                line,
            },
        );
        Ok(())
    }

    pub fn assign(
        &mut self,
        name: &str,
        value: Value,
        file: &str,
        line: u32,
    ) -> Result<(), String> {
        if self.symbols.contains_key(name) {
            return Err(format!("duplicate symbol '{}'", name));
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                kind: SymbolKind::Equ(value),
                file: file.to_string(),
                line,
            },
        );
        Ok(())
    }

    fn set_address(&mut self, name: &str, addr: u16) {
        if let Some(symbol) = self.symbols.get_mut(name) {
            debug!("updating symbol '{}' to ${:04x}", name, addr);
            symbol.kind = SymbolKind::Address(Some(addr));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.symbols.iter()
    }

    /// The concrete value of a symbol, if it has reached one.
    pub fn resolved(&self, name: &str) -> Option<Resolved> {
        match &self.get(name)?.kind {
            SymbolKind::Address(Some(addr)) => Some(Resolved::Word(*addr)),
            SymbolKind::Address(None) => None,
            SymbolKind::Equ(Value::Byte(b)) => Some(Resolved::Byte(*b)),
            SymbolKind::Equ(Value::Word(w)) => Some(Resolved::Word(*w)),
            SymbolKind::Equ(_) => None,
        }
    }
}

/// Guard against definition cycles when chasing symbol references.
const MAX_EVAL_DEPTH: u32 = 16;

/// Evaluate an expression tree against the symbol table. `cur_offset`
/// supplies the `*` location counter where one exists (operand position);
/// outside of operands `*` does not resolve. Returns `None` while anything
/// in the tree is still unresolved.
pub fn eval_value(
    value: &Value,
    symbols: &SymbolTable,
    cur_offset: Option<u16>,
    depth: u32,
) -> Option<Resolved> {
    if depth > MAX_EVAL_DEPTH {
        return None;
    }

    match value {
        Value::Byte(b) => Some(Resolved::Byte(*b)),
        Value::Word(w) => Some(Resolved::Word(*w)),
        Value::Label(name) if name == "*" => cur_offset.map(Resolved::Word),
        Value::Label(name) => match &symbols.get(name)?.kind {
            SymbolKind::Address(Some(addr)) => Some(Resolved::Word(*addr)),
            SymbolKind::Address(None) => None,
            SymbolKind::Equ(inner) => eval_value(inner, symbols, cur_offset, depth + 1),
        },
        Value::Arith(op, left, right) => {
            let left = eval_value(left, symbols, cur_offset, depth + 1)?;
            let right = eval_value(right, symbols, cur_offset, depth + 1)?;

            let l = left.word() as i64;
            let r = right.word() as i64;
            let raw = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => {
                    if r == 0 {
                        return None;
                    }
                    l / r
                }
            };
            let word = (raw & 0xFFFF) as u16;

            // Byte arithmetic stays a byte while it fits; anything wider
            // or involving a word operand is a word.
            if left.width() == Width::Byte && right.width() == Width::Byte && word <= 0xFF {
                Some(Resolved::Byte(word as u8))
            } else {
                Some(Resolved::Word(word))
            }
        }
    }
}

/// The width an expression will have once resolved, for layout decisions.
/// Unresolved labels are addresses, hence words.
fn value_width(value: &Value, symbols: &SymbolTable, offset: u16) -> Width {
    match eval_value(value, symbols, Some(offset), 0) {
        Some(resolved) => resolved.width(),
        None => Width::Word,
    }
}

/// Tentative addressing mode out of the parser; `Unknown*` carries only the
/// bare/`,X`/`,Y` syntactic shape until layout decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    Known(Mode),
    Unknown,
    UnknownX,
    UnknownY,
}

#[derive(Debug)]
pub struct InstrData {
    pub family: Instruction,
    pub mode: TokenMode,
    pub operand: Option<Value>,
    pub len: u16,
    pub offset: u16,
    pub opcode: u8,
    pub promote: bool,
    pub resolved: Option<Resolved>,
    pub line: u32,
}

#[derive(Debug)]
pub struct DataItem {
    pub value: Value,
    pub forced: Option<Width>,
    pub len: u16,
    pub offset: u16,
    pub resolved: Option<Resolved>,
    pub line: u32,
}

#[derive(Debug)]
pub enum OpData {
    Instruction(InstrData),
    Data(DataItem),
    Label(String),
    Offset(u16),
}

#[derive(Debug)]
pub struct Assembly {
    pub file: String,
    pub items: Vec<OpData>,
    pub symbols: SymbolTable,
}

/// Run every pass over `source`, producing an assembly ready for emission.
pub fn assemble_str(source: &str, file: &str) -> Result<Assembly, AsmError> {
    info!("pass 1: parsing {}", file);
    let (items, symbols) = parser::parse(source, file)?;

    let mut assembly = Assembly {
        file: file.to_string(),
        items,
        symbols,
    };

    assembly.resolve_symbols(false)?;
    info!("pass 2: symbol resolution and addressing modes");
    assembly.layout()?;
    assembly.resolve_symbols(true)?;
    info!("pass 3: finalizing operands");
    assembly.finalize()?;
    info!("pass 4: encoding opcodes");
    assembly.encode()?;

    Ok(assembly)
}

impl Assembly {
    /// Reduce every assignment in the symbol table to a concrete value,
    /// iterating until a pass makes no progress. In strict mode a leftover
    /// symbol is an error naming its declaration site.
    fn resolve_symbols(&mut self, strict: bool) -> Result<(), AsmError> {
        loop {
            let mut changed = false;

            let names: Vec<String> = self
                .symbols
                .iter()
                .filter(|(_, symbol)| {
                    matches!(
                        symbol.kind,
                        SymbolKind::Equ(ref value)
                            if !matches!(value, Value::Byte(_) | Value::Word(_))
                    )
                })
                .map(|(name, _)| name.clone())
                .collect();

            for name in names {
                let value = match &self.symbols.get(&name).unwrap().kind {
                    SymbolKind::Equ(value) => value.clone(),
                    _ => continue,
                };
                if let Some(resolved) = eval_value(&value, &self.symbols, None, 0) {
                    let concrete = match resolved {
                        Resolved::Byte(b) => Value::Byte(b),
                        Resolved::Word(w) => Value::Word(w),
                    };
                    if let Some(symbol) = self.symbols.symbols.get_mut(&name) {
                        symbol.kind = SymbolKind::Equ(concrete);
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        if strict {
            for (name, symbol) in self.symbols.iter() {
                let unresolved = match &symbol.kind {
                    SymbolKind::Address(None) => true,
                    SymbolKind::Equ(Value::Byte(_)) | SymbolKind::Equ(Value::Word(_)) => false,
                    SymbolKind::Equ(_) => true,
                    SymbolKind::Address(Some(_)) => false,
                };
                if unresolved {
                    return Err(AsmError::Unresolved {
                        file: symbol.file.clone(),
                        line: symbol.line,
                        name: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Pass 2: walk the IR with the location cursor, assigning offsets and
    /// pinning down the Unknown addressing modes.
    fn layout(&mut self) -> Result<(), AsmError> {
        let mut offset = DEFAULT_ORIGIN;
        let file = self.file.clone();

        // Split borrows: the symbol table is read for widths and written
        // for label addresses, never for the same key.
        let symbols = &mut self.symbols;

        for item in &mut self.items {
            match item {
                OpData::Offset(org) => offset = *org,
                OpData::Label(name) => symbols.set_address(name, offset),
                OpData::Data(data) => {
                    data.len = match data.forced {
                        Some(Width::Byte) => 1,
                        Some(Width::Word) => 2,
                        None => match value_width(&data.value, symbols, offset) {
                            Width::Byte => 1,
                            Width::Word => 2,
                        },
                    };
                    data.offset = offset;
                    offset = offset.wrapping_add(data.len);
                }
                OpData::Instruction(instr) => {
                    match instr.mode {
                        TokenMode::Known(Mode::Implied) => {
                            // Some assemblers write accumulator-mode shifts
                            // with no operand; swap when the lookup misses.
                            if opcode_lookup(instr.family, Mode::Implied).is_none()
                                && opcode_lookup(instr.family, Mode::Accumulator).is_some()
                            {
                                instr.mode = TokenMode::Known(Mode::Accumulator);
                            }
                            instr.len = 1;
                        }
                        TokenMode::Known(Mode::Accumulator) => {
                            if opcode_lookup(instr.family, Mode::Accumulator).is_none()
                                && opcode_lookup(instr.family, Mode::Implied).is_some()
                            {
                                instr.mode = TokenMode::Known(Mode::Implied);
                            }
                            instr.len = 1;
                        }
                        TokenMode::Known(mode) => {
                            instr.len = 1 + mode.operand_len();
                        }
                        TokenMode::Unknown | TokenMode::UnknownX | TokenMode::UnknownY => {
                            let (zp, abs) = match instr.mode {
                                TokenMode::Unknown => (Mode::ZeroPage, Mode::Absolute),
                                TokenMode::UnknownX => (Mode::ZeroPageX, Mode::AbsoluteX),
                                _ => (Mode::ZeroPageY, Mode::AbsoluteY),
                            };

                            let operand = instr.operand.as_ref().ok_or_else(|| {
                                AsmError::Parse {
                                    file: file.clone(),
                                    line: instr.line,
                                    msg: "instruction needs an operand".into(),
                                }
                            })?;

                            let width = value_width(operand, symbols, offset);
                            if width == Width::Byte
                                && opcode_lookup(instr.family, zp).is_some()
                            {
                                instr.mode = TokenMode::Known(zp);
                                instr.len = 2;
                            } else {
                                if width == Width::Byte {
                                    warn!(
                                        "{}:{}: extending presumed zero-page operand to absolute",
                                        file, instr.line
                                    );
                                    instr.promote = true;
                                }
                                instr.mode = TokenMode::Known(abs);
                                instr.len = 3;
                            }
                        }
                    }

                    instr.offset = offset;
                    offset = offset.wrapping_add(instr.len);
                }
            }
        }

        Ok(())
    }

    /// Pass 3: evaluate every operand, fix up relative branches, and check
    /// operand widths against the settled addressing modes.
    fn finalize(&mut self) -> Result<(), AsmError> {
        let file = self.file.clone();

        for item in &mut self.items {
            match item {
                OpData::Instruction(instr) => {
                    let mode = match instr.mode {
                        TokenMode::Known(mode) => mode,
                        _ => unreachable!("layout pins every addressing mode"),
                    };

                    let resolved = match &instr.operand {
                        Some(operand) => {
                            let resolved =
                                eval_value(operand, &self.symbols, Some(instr.offset), 0).ok_or_else(
                                    || AsmError::Parse {
                                        file: file.clone(),
                                        line: instr.line,
                                        msg: "operand does not resolve".into(),
                                    },
                                )?;
                            if instr.promote {
                                Some(Resolved::Word(resolved.word()))
                            } else {
                                Some(resolved)
                            }
                        }
                        None => None,
                    };

                    instr.resolved = match mode {
                        Mode::Implied | Mode::Accumulator => None,
                        Mode::Relative => {
                            let resolved = resolved.ok_or_else(|| AsmError::Parse {
                                file: file.clone(),
                                line: instr.line,
                                msg: "branch needs a target".into(),
                            })?;
                            match resolved {
                                // A direct byte is taken as the raw encoded
                                // displacement.
                                Resolved::Byte(b) => Some(Resolved::Byte(b)),
                                Resolved::Word(target) => {
                                    let effective = instr.offset.wrapping_add(2);
                                    let delta = target as i32 - effective as i32;
                                    if !(-128..=127).contains(&delta) {
                                        return Err(AsmError::BranchOutOfRange {
                                            file: file.clone(),
                                            line: instr.line,
                                        });
                                    }
                                    debug!(
                                        "{}:{}: fixed up branch to ${:02x}",
                                        file,
                                        instr.line,
                                        (delta as i8) as u8
                                    );
                                    Some(Resolved::Byte((delta as i8) as u8))
                                }
                            }
                        }
                        Mode::Immediate
                        | Mode::ZeroPage
                        | Mode::ZeroPageX
                        | Mode::ZeroPageY
                        | Mode::IndirectX
                        | Mode::IndirectY => {
                            let resolved = resolved.ok_or_else(|| AsmError::Parse {
                                file: file.clone(),
                                line: instr.line,
                                msg: "instruction needs an operand".into(),
                            })?;
                            match resolved {
                                Resolved::Byte(b) => Some(Resolved::Byte(b)),
                                Resolved::Word(_) => {
                                    return Err(AsmError::Width {
                                        file: file.clone(),
                                        line: instr.line,
                                        msg: "addressing mode requires BYTE, operand is WORD"
                                            .into(),
                                    });
                                }
                            }
                        }
                        Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY | Mode::Indirect => {
                            let resolved = resolved.ok_or_else(|| AsmError::Parse {
                                file: file.clone(),
                                line: instr.line,
                                msg: "instruction needs an operand".into(),
                            })?;
                            // Bytes promote to words by zero-extension.
                            Some(Resolved::Word(resolved.word()))
                        }
                    };
                }
                OpData::Data(data) => {
                    let resolved = eval_value(&data.value, &self.symbols, Some(data.offset), 0)
                        .ok_or_else(|| AsmError::Parse {
                            file: file.clone(),
                            line: data.line,
                            msg: "data value does not resolve".into(),
                        })?;

                    data.resolved = Some(match (data.forced, resolved) {
                        (Some(Width::Byte), Resolved::Word(w)) => {
                            if w > 0xFF {
                                return Err(AsmError::Width {
                                    file: file.clone(),
                                    line: data.line,
                                    msg: format!(
                                        "value ${:04x} does not fit in a byte",
                                        w
                                    ),
                                });
                            }
                            Resolved::Byte(w as u8)
                        }
                        (Some(Width::Byte), byte) => byte,
                        (Some(Width::Word), any) => Resolved::Word(any.word()),
                        (None, any) => any,
                    });
                }
                OpData::Label(_) | OpData::Offset(_) => {}
            }
        }

        Ok(())
    }

    /// Pass 4: table scan for every `(family, mode)` pair.
    fn encode(&mut self) -> Result<(), AsmError> {
        let file = self.file.clone();
        for item in &mut self.items {
            if let OpData::Instruction(instr) = item {
                let mode = match instr.mode {
                    TokenMode::Known(mode) => mode,
                    _ => unreachable!("layout pins every addressing mode"),
                };
                instr.opcode = opcode_lookup(instr.family, mode).ok_or_else(|| {
                    AsmError::IllegalMode {
                        file: file.clone(),
                        line: instr.line,
                        mnemonic: instr.family.info().mnemonic,
                        mode: mode.name(),
                    }
                })?;
            }
        }
        Ok(())
    }

    /// The encoded byte runs of the assembly, in IR order.
    pub fn chunks(&self) -> Vec<(u16, Vec<u8>)> {
        let mut chunks = Vec::new();
        for item in &self.items {
            match item {
                OpData::Instruction(instr) => {
                    let mut bytes = vec![instr.opcode];
                    match (instr.len, instr.resolved) {
                        (2, Some(resolved)) => bytes.push(resolved.word() as u8),
                        (3, Some(resolved)) => {
                            bytes.extend_from_slice(&resolved.word().to_le_bytes())
                        }
                        _ => {}
                    }
                    chunks.push((instr.offset, bytes));
                }
                OpData::Data(data) => {
                    let resolved = data.resolved.expect("finalize resolves all data");
                    let bytes = match data.len {
                        1 => vec![resolved.word() as u8],
                        _ => resolved.word().to_le_bytes().to_vec(),
                    };
                    chunks.push((data.offset, bytes));
                }
                OpData::Label(_) | OpData::Offset(_) => {}
            }
        }
        chunks
    }

    /// Flatten the assembly into one contiguous image with NOP gap fill;
    /// returns the load origin and the bytes. Backwards offsets are an
    /// overlap error.
    pub fn program_image(&self) -> Result<(u16, Vec<u8>), AsmError> {
        let chunks = self.chunks();
        let origin = match chunks.first() {
            Some((offset, _)) => *offset,
            None => return Ok((DEFAULT_ORIGIN, Vec::new())),
        };

        let mut image: Vec<u8> = Vec::new();
        for (offset, bytes) in &chunks {
            let position = origin as usize + image.len();
            let target = *offset as usize;
            if target < position {
                return Err(AsmError::Overlap { offset: *offset });
            }
            image.resize(image.len() + (target - position), GAP_FILL_BYTE);
            image.extend_from_slice(bytes);
        }

        Ok((origin, image))
    }
}

/// Render a source-located diagnostic with a few lines of context, the way
/// the assembler CLI reports failures.
pub fn render_diagnostic(source: &str, line: u32, message: &str) -> String {
    let error_row_index = line as usize - 1;
    let range = 3;
    let min = error_row_index.saturating_sub(range);
    let max = error_row_index + range;

    let mut out = String::from("\n");
    for (row_index, row_text) in source.lines().enumerate() {
        if row_index > max {
            break;
        }
        if row_index < min {
            continue;
        }

        let gutter = format!("{:>4}: ", row_index + 1);
        out.push_str(&format!("{}", gutter.cyan()));
        out.push_str(&format!("{}", row_text.bright_white()));
        out.push('\n');

        if row_index == error_row_index {
            out.push_str(&format!("      {}\n", message.bright_red()));
        }
    }
    out
}

#[cfg(test)]
mod tests;
