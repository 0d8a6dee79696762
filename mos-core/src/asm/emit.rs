//! Artefact emission: raw binary (with gap fill or island splitting),
//! Intel HEX, the human-readable map listing, and the debug-info file the
//! remote debugger loads.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::asm::{
    AsmError, Assembly, OpData, Resolved, SymbolKind, TokenMode, Value, DEFAULT_GAP_THRESHOLD,
    GAP_FILL_BYTE,
};
use crate::debuginfo::{DBG_MAGIC, RECORD_ADDRESS, RECORD_SYMBOL};
use crate::opcodes::Mode;

pub struct EmitOptions {
    pub bin: bool,
    pub map: bool,
    pub hex: bool,
    pub debug: bool,
    /// Split the binary into per-island files on large gaps instead of
    /// NOP-filling.
    pub split: bool,
    pub gap_threshold: usize,
}

impl Default for EmitOptions {
    fn default() -> EmitOptions {
        EmitOptions {
            bin: true,
            map: true,
            hex: false,
            debug: true,
            split: false,
            gap_threshold: DEFAULT_GAP_THRESHOLD,
        }
    }
}

/// Write the selected artefacts next to `source_path`. Returns the paths
/// written. Nothing is written unless the assembly fully succeeded, so a
/// failed run never leaves partial artefacts behind.
pub fn emit(
    assembly: &Assembly,
    source_path: &Path,
    options: &EmitOptions,
) -> Result<Vec<PathBuf>, AsmError> {
    let mut written = Vec::new();

    if options.bin {
        written.extend(emit_bin(assembly, source_path, options)?);
    }
    if options.hex {
        let path = source_path.with_extension("hex");
        emit_hex(assembly, &path)?;
        written.push(path);
    }
    if options.map {
        let path = source_path.with_extension("map");
        fs::write(&path, render_map(assembly))?;
        written.push(path);
    }
    if options.debug {
        let path = source_path.with_extension("dbg");
        emit_debug(assembly, source_path, &path)?;
        written.push(path);
    }

    for path in &written {
        info!("wrote {}", path.display());
    }

    Ok(written)
}

fn emit_bin(
    assembly: &Assembly,
    source_path: &Path,
    options: &EmitOptions,
) -> Result<Vec<PathBuf>, AsmError> {
    let chunks = assembly.chunks();
    let mut written = Vec::new();

    let first_path = source_path.with_extension("bin");
    let mut file = File::create(&first_path)?;
    written.push(first_path);

    let mut position: Option<u32> = None;

    for (offset, bytes) in &chunks {
        let offset = *offset as u32;
        if let Some(position) = position {
            if offset < position {
                return Err(AsmError::Overlap {
                    offset: offset as u16,
                });
            }
        }

        let gap = match position {
            Some(position) => (offset - position) as usize,
            None => 0,
        };

        if gap > 0 {
            if options.split && gap >= options.gap_threshold {
                // Close this island and start the next file at its offset.
                let island = source_path.with_file_name(format!("{:04x}.bin", offset));
                file = File::create(&island)?;
                written.push(island);
            } else {
                if gap >= options.gap_threshold {
                    warn!(
                        "filling a {} byte gap at ${:04x}; consider -s",
                        gap,
                        offset as u16
                    );
                }
                file.write_all(&vec![GAP_FILL_BYTE; gap])?;
            }
        }

        file.write_all(bytes)?;
        position = Some(offset + bytes.len() as u32);
    }

    Ok(written)
}

fn emit_hex(assembly: &Assembly, path: &Path) -> Result<(), AsmError> {
    fs::write(path, render_hex(assembly))?;
    Ok(())
}

/// Intel HEX: `:LLAAAATTDD..CC` data records of up to 16 bytes, flushed on
/// any address discontinuity, closed with the EOF record.
pub fn render_hex(assembly: &Assembly) -> String {
    let mut out = String::new();
    let mut record_addr: u16 = 0;
    let mut record: Vec<u8> = Vec::new();

    let flush = |record_addr: u16, record: &mut Vec<u8>, out: &mut String| {
        if record.is_empty() {
            return;
        }
        let mut sum = record.len() as u32 + (record_addr >> 8) as u32 + (record_addr & 0xFF) as u32;
        out.push_str(&format!(":{:02X}{:04X}00", record.len(), record_addr));
        for byte in record.iter() {
            sum += *byte as u32;
            out.push_str(&format!("{:02X}", byte));
        }
        let checksum = (0x100 - (sum & 0xFF)) & 0xFF;
        out.push_str(&format!("{:02X}\n", checksum));
        record.clear();
    };

    for (offset, bytes) in assembly.chunks() {
        for (index, byte) in bytes.iter().enumerate() {
            let addr = offset.wrapping_add(index as u16);
            let next = record_addr.wrapping_add(record.len() as u16);
            if !record.is_empty() && (addr != next || record.len() == 16) {
                flush(record_addr, &mut record, &mut out);
            }
            if record.is_empty() {
                record_addr = addr;
            }
            record.push(*byte);
            if record.len() == 16 {
                flush(record_addr, &mut record, &mut out);
            }
        }
    }
    flush(record_addr, &mut record, &mut out);

    out.push_str(":00000001FF\n");
    out
}

fn operand_syntax(mode: Mode, resolved: Option<Resolved>) -> String {
    let word = resolved.map(|r| r.word()).unwrap_or(0);
    let byte = word as u8;
    match mode {
        Mode::Implied => String::new(),
        Mode::Accumulator => "A".to_string(),
        Mode::Immediate => format!("#${:02x}", byte),
        Mode::Relative => format!("${:02x}", byte),
        Mode::ZeroPage => format!("${:02x}", byte),
        Mode::ZeroPageX => format!("${:02x},X", byte),
        Mode::ZeroPageY => format!("${:02x},Y", byte),
        Mode::Absolute => format!("${:04x}", word),
        Mode::AbsoluteX => format!("${:04x},X", word),
        Mode::AbsoluteY => format!("${:04x},Y", word),
        Mode::Indirect => format!("(${:04x})", word),
        Mode::IndirectX => format!("(${:02x},X)", byte),
        Mode::IndirectY => format!("(${:02x}),Y", byte),
    }
}

/// The human-readable listing: symbol table, then offsets, encoded bytes,
/// and reconstructed syntax per item.
pub fn render_map(assembly: &Assembly) -> String {
    let mut out = String::new();

    out.push_str("Symbol Table:\n");
    out.push_str("=======================================================\n\n");

    for (name, symbol) in assembly.symbols.iter() {
        let rendered = match &symbol.kind {
            SymbolKind::Address(Some(addr)) => format!("${:04x}", addr),
            SymbolKind::Equ(Value::Byte(b)) => format!("${:02x}", b),
            SymbolKind::Equ(Value::Word(w)) => format!("${:04x}", w),
            _ => continue,
        };
        out.push_str(&format!("{:<40}{}\n", name, rendered));
    }

    out.push_str("\n\nOutput:\n");
    out.push_str("=======================================================\n\n");

    for item in &assembly.items {
        match item {
            OpData::Instruction(instr) => {
                let mut bytes = format!("{:04x}: {:02x} ", instr.offset, instr.opcode);
                if let Some(resolved) = instr.resolved {
                    match instr.len {
                        2 => bytes.push_str(&format!("{:02x} ", resolved.word() as u8)),
                        3 => {
                            let [lo, hi] = resolved.word().to_le_bytes();
                            bytes.push_str(&format!("{:02x} {:02x}", lo, hi));
                        }
                        _ => {}
                    }
                }
                let mode = match instr.mode {
                    TokenMode::Known(mode) => mode,
                    _ => Mode::Implied,
                };
                out.push_str(&format!(
                    "{:<20}{} {}\n",
                    bytes,
                    instr.family.info().mnemonic,
                    operand_syntax(mode, instr.resolved)
                ));
            }
            OpData::Data(data) => {
                let resolved = data.resolved.expect("finalize resolves all data");
                let bytes = match data.len {
                    1 => format!("{:04x}: {:02x}", data.offset, resolved.word() as u8),
                    _ => {
                        let [lo, hi] = resolved.word().to_le_bytes();
                        format!("{:04x}: {:02x} {:02x}", data.offset, lo, hi)
                    }
                };
                out.push_str(&format!(
                    "{:<20}.data ${:02x}\n",
                    bytes,
                    resolved.word()
                ));
            }
            OpData::Label(_) | OpData::Offset(_) => {}
        }
    }

    out
}

/// The debug-info file: magic word, then one address record per
/// instruction offset change, then the symbol table.
fn emit_debug(assembly: &Assembly, source_path: &Path, path: &Path) -> Result<(), AsmError> {
    // The debugger resolves lines through this path, so it must survive a
    // change of working directory.
    let canonical = fs::canonicalize(source_path)?;
    let canonical = canonical.to_string_lossy();

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(&DBG_MAGIC.to_le_bytes());

    let mut previous: Option<u16> = None;
    for item in &assembly.items {
        if let OpData::Instruction(instr) = item {
            if previous == Some(instr.offset) {
                continue;
            }
            previous = Some(instr.offset);

            out.extend_from_slice(&RECORD_ADDRESS.to_le_bytes());
            out.extend_from_slice(&instr.offset.to_le_bytes());
            out.extend_from_slice(&instr.line.to_le_bytes());
            let path_len = (canonical.len() + 1) as u16;
            out.extend_from_slice(&path_len.to_le_bytes());
            out.extend_from_slice(canonical.as_bytes());
            out.push(0);
        }
    }

    for (name, symbol) in assembly.symbols.iter() {
        let value = match &symbol.kind {
            SymbolKind::Address(Some(addr)) => *addr,
            SymbolKind::Equ(Value::Byte(b)) => *b as u16,
            SymbolKind::Equ(Value::Word(w)) => *w,
            _ => continue,
        };
        out.extend_from_slice(&RECORD_SYMBOL.to_le_bytes());
        let name_len = (name.len() + 1) as u16;
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&value.to_le_bytes());
    }

    fs::write(path, out)?;
    Ok(())
}
