//! Loader for the assembler's debug-info file.
//!
//! The file opens with a magic word and carries two record kinds: address
//! records mapping a program-counter value to a source `(file, line)` pair,
//! and symbol records mapping names to addresses. Loading builds three
//! ordered indices: address to a seekable (file, byte-offset) pair for line
//! retrieval, name to address, and address to name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

pub const DBG_MAGIC: u32 = 0xDEAD_BEEF;
pub const RECORD_ADDRESS: u16 = 0;
pub const RECORD_SYMBOL: u16 = 1;

#[derive(Debug, Error)]
pub enum DebugInfoError {
    #[error("cannot read debug info: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a debug info file (bad magic)")]
    BadMagic,
    #[error("unknown debug record type {0}")]
    UnknownRecord(u16),
    #[error("truncated debug record")]
    Truncated,
}

/// One source file referenced by address records, with the forward-scanning
/// cursor that amortises line lookups during the load.
struct SourceFile {
    reader: BufReader<File>,
    current_line: u32,
    offset: u64,
}

struct LineRef {
    file_index: usize,
    offset: u64,
}

pub struct DebugInfo {
    files: Vec<(String, SourceFile)>,
    lines: BTreeMap<u16, LineRef>,
    /// Lowercased name -> address; lookups are case-insensitive.
    symbols_by_name: BTreeMap<String, u16>,
    symbols_by_addr: BTreeMap<u16, String>,
}

fn read_u16(reader: &mut impl Read) -> Result<Option<u16>, DebugInfoError> {
    let mut buf = [0u8; 2];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u16::from_le_bytes(buf))),
        Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, DebugInfoError> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| DebugInfoError::Truncated)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_exact_u16(reader: &mut impl Read) -> Result<u16, DebugInfoError> {
    read_u16(reader)?.ok_or(DebugInfoError::Truncated)
}

/// Read a length-prefixed, NUL-terminated string payload.
fn read_string(reader: &mut impl Read, len: u16) -> Result<String, DebugInfoError> {
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|_| DebugInfoError::Truncated)?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl DebugInfo {
    pub fn load(path: &Path) -> Result<DebugInfo, DebugInfoError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| DebugInfoError::BadMagic)?;
        if u32::from_le_bytes(magic) != DBG_MAGIC {
            return Err(DebugInfoError::BadMagic);
        }

        let mut info = DebugInfo {
            files: Vec::new(),
            lines: BTreeMap::new(),
            symbols_by_name: BTreeMap::new(),
            symbols_by_addr: BTreeMap::new(),
        };

        while let Some(record_type) = read_u16(&mut reader)? {
            match record_type {
                RECORD_ADDRESS => info.load_address_record(&mut reader)?,
                RECORD_SYMBOL => info.load_symbol_record(&mut reader)?,
                other => return Err(DebugInfoError::UnknownRecord(other)),
            }
        }

        Ok(info)
    }

    fn load_address_record(
        &mut self,
        reader: &mut impl Read,
    ) -> Result<(), DebugInfoError> {
        let addr = read_exact_u16(reader)?;
        let line = read_u32(reader)?;
        let path_len = read_exact_u16(reader)?;
        let path = read_string(reader, path_len)?;

        let file_index = match self.find_or_open(&path) {
            Some(index) => index,
            // A missing source file only costs the annotations for it.
            None => return Ok(()),
        };

        let source = &mut self.files[file_index].1;
        if let Some(offset) = source.seek_to_line(line) {
            // Last record wins on duplicate addresses.
            self.lines.insert(addr, LineRef { file_index, offset });
        }
        Ok(())
    }

    fn load_symbol_record(&mut self, reader: &mut impl Read) -> Result<(), DebugInfoError> {
        let name_len = read_exact_u16(reader)?;
        let name = read_string(reader, name_len)?;
        let value = read_exact_u16(reader)?;

        self.symbols_by_name.insert(name.to_lowercase(), value);
        self.symbols_by_addr.insert(value, name);
        Ok(())
    }

    fn find_or_open(&mut self, path: &str) -> Option<usize> {
        if let Some(index) = self.files.iter().position(|(name, _)| name == path) {
            return Some(index);
        }
        let file = File::open(path).ok()?;
        self.files.push((
            path.to_string(),
            SourceFile {
                reader: BufReader::new(file),
                current_line: 1,
                offset: 0,
            },
        ));
        Some(self.files.len() - 1)
    }

    /// The source text of the line generating the instruction at `addr`.
    pub fn getline(&mut self, addr: u16) -> Option<String> {
        let line_ref = self.lines.get(&addr)?;
        let source = &mut self.files[line_ref.file_index].1;

        source.reader.seek(SeekFrom::Start(line_ref.offset)).ok()?;
        let mut text = String::new();
        source.reader.read_line(&mut text).ok()?;
        // The cursor position is unknown after a manual seek.
        source.current_line = 0;
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        Some(text)
    }

    /// Case-insensitive symbol lookup, for the debugger's expression
    /// evaluator.
    pub fn lookup_symbol(&self, name: &str) -> Option<u16> {
        self.symbols_by_name.get(&name.to_lowercase()).copied()
    }

    /// The symbol declared at exactly `addr`, for annotating disassembly.
    pub fn lookup_addr(&self, addr: u16) -> Option<&str> {
        self.symbols_by_addr.get(&addr).map(String::as_str)
    }

    pub fn has_line(&self, addr: u16) -> bool {
        self.lines.contains_key(&addr)
    }
}

impl SourceFile {
    /// Scan forward to `line`, returning the byte offset of its start. The
    /// cursor only rewinds when a record asks for an earlier line.
    fn seek_to_line(&mut self, line: u32) -> Option<u64> {
        if line == 0 {
            return None;
        }

        if self.current_line == 0 || line < self.current_line {
            self.reader.seek(SeekFrom::Start(0)).ok()?;
            self.current_line = 1;
            self.offset = 0;
        } else {
            self.reader.seek(SeekFrom::Start(self.offset)).ok()?;
        }

        while self.current_line < line {
            let mut text = String::new();
            let read = self.reader.read_line(&mut text).ok()?;
            if read == 0 {
                // Past EOF; give up on this record.
                self.current_line = 1;
                self.offset = 0;
                return None;
            }
            self.current_line += 1;
            self.offset += read as u64;
        }

        Some(self.offset)
    }
}
