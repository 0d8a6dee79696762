//! Debugger session state and command processing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Child;

use tui::style::{Color, Modifier, Style};
use tui::text::{Span, Spans};

use mos_core::cpu::Cpu;
use mos_core::debuginfo::DebugInfo;
use mos_core::disasm::disassemble;
use mos_core::hardware::HwFamily;
use mos_core::stepwise::{CAP_BP, PARAM_A, PARAM_BP_DEL, PARAM_BP_SET, PARAM_IP, PARAM_P,
    PARAM_SP, PARAM_X, PARAM_Y};

use crate::store::AddrStore;
use crate::transport::{AsyncMessage, Transport};

const LOG_LIMIT: usize = 200;

/// Free-running stops after this many steps with an unchanged IP.
const STALL_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Dump,
    Disasm,
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Quit,
    Version,
    Dump,
    Disasm,
    Load,
    Set,
    Next,
    Break,
    Run,
    Follow,
    Di,
    Watch,
}

const TOKENS: &[(&str, Token)] = &[
    ("quit", Token::Quit),
    ("version", Token::Version),
    ("dump", Token::Dump),
    ("disasm", Token::Disasm),
    ("load", Token::Load),
    ("set", Token::Set),
    ("next", Token::Next),
    ("break", Token::Break),
    ("run", Token::Run),
    ("follow", Token::Follow),
    ("di", Token::Di),
    ("watch", Token::Watch),
];

enum TokenMatch {
    Found(Token),
    Ambiguous,
    Unknown,
}

/// Prefix-match a command word the way the original tokenizer did: exact
/// wins, a unique prefix works, several candidates is ambiguous.
fn match_token(word: &str) -> TokenMatch {
    let lower = word.to_lowercase();
    let mut found = None;
    let mut count = 0;

    for (name, token) in TOKENS {
        if *name == lower {
            return TokenMatch::Found(*token);
        }
        if name.starts_with(&lower) {
            found = Some(*token);
            count += 1;
        }
    }

    match count {
        1 => TokenMatch::Found(found.unwrap()),
        0 => TokenMatch::Unknown,
        _ => TokenMatch::Ambiguous,
    }
}

pub struct App {
    pub transport: Transport,
    pub regs: Cpu,
    pub display_mode: DisplayMode,
    pub disasm_addr: u16,
    pub dump_addr: u16,
    pub watch_addr: u16,
    pub follow: bool,
    pub running: bool,
    stall_count: u32,
    pub breakpoints: AddrStore,
    pub watches: AddrStore,
    pub debuginfo: Option<DebugInfo>,
    pub log: VecDeque<String>,
    pub input: String,
    pub quit: bool,
    pub emulator: Option<Child>,
    pub serial_path: Option<String>,
}

impl App {
    pub fn new(transport: Transport) -> App {
        App {
            transport,
            regs: Cpu::new(),
            display_mode: DisplayMode::Dump,
            disasm_addr: 0x8000,
            dump_addr: 0x8000,
            watch_addr: 0,
            follow: true,
            running: false,
            stall_count: 0,
            breakpoints: AddrStore::new(),
            watches: AddrStore::new(),
            debuginfo: None,
            log: VecDeque::new(),
            input: String::new(),
            quit: false,
            emulator: None,
            serial_path: None,
        }
    }

    pub fn logln(&mut self, text: impl Into<String>) {
        self.log.push_back(text.into());
        while self.log.len() > LOG_LIMIT {
            self.log.pop_front();
        }
    }

    pub fn refresh_regs(&mut self) {
        match self.transport.regs() {
            Ok(regs) => self.regs = regs,
            Err(e) => self.logln(format!("error reading registers: {}", e)),
        }
    }

    pub fn drain_async(&mut self) {
        for message in self.transport.drain_async() {
            match message {
                AsyncMessage::Text(text) => self.logln(text),
                AsyncMessage::Hardware { family, info } => {
                    if family == HwFamily::Serial.tag() {
                        self.serial_path = Some(info.clone());
                    }
                    self.logln(format!("hardware: {}", info));
                }
            }
        }
    }

    /// Evaluate a numeric argument: `$` hex, `%` binary, `#` decimal, bare
    /// hex, else a debug-info symbol.
    pub fn eval(&self, text: &str) -> Option<u16> {
        if let Some(hex) = text.strip_prefix('$') {
            return u16::from_str_radix(hex, 16).ok();
        }
        if let Some(bin) = text.strip_prefix('%') {
            return u16::from_str_radix(bin, 2).ok();
        }
        if let Some(dec) = text.strip_prefix('#') {
            return dec.parse().ok();
        }
        if let Ok(value) = u16::from_str_radix(text, 16) {
            return Some(value);
        }
        self.debuginfo.as_ref()?.lookup_symbol(text)
    }

    fn breakpoint_toggle(&mut self, addr: u16) {
        let set = self.breakpoints.toggle(addr);
        if self.transport.caps & CAP_BP != 0 {
            let op = if set { PARAM_BP_SET } else { PARAM_BP_DEL };
            if let Err(e) = self.transport.breakpoint(op, addr) {
                self.logln(format!("error forwarding breakpoint: {}", e));
            }
        }
        self.logln(if set {
            "Breakpoint set"
        } else {
            "Breakpoint unset"
        });
    }

    /// One step of the free-run/next machinery: execute, track the display,
    /// and stop on client-side breakpoints or a stalled IP.
    pub fn step(&mut self) {
        let old_ip = self.regs.ip;

        match self.transport.next() {
            Ok(regs) => self.regs = regs,
            Err(e) => {
                self.logln(format!("error stepping: {}", e));
                self.running = false;
                return;
            }
        }

        if self.running && self.regs.ip == old_ip {
            self.stall_count += 1;
            if self.stall_count > STALL_LIMIT {
                self.running = false;
                self.logln("Processor stalled");
            }
        } else {
            self.stall_count = 0;
        }

        if (self.follow || !self.running) && self.display_mode == DisplayMode::Disasm {
            self.disasm_addr = self.regs.ip;
        }

        if self.running && self.breakpoints.contains(self.regs.ip) {
            self.running = false;
            self.logln(format!("Breakpoint ${:04x} reached", self.regs.ip));
        }
    }

    pub fn process_command(&mut self, line: &str) {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = words.first() else {
            return;
        };

        let token = match match_token(first) {
            TokenMatch::Found(token) => token,
            TokenMatch::Ambiguous => {
                self.logln("Ambiguous command");
                return;
            }
            TokenMatch::Unknown => {
                self.logln("Unknown command");
                return;
            }
        };

        match token {
            Token::Quit => {
                self.quit = true;
            }
            Token::Version => match self.transport.version() {
                Ok(version) => self.logln(format!("Remote version: {}", version)),
                Err(e) => self.logln(format!("error: {}", e)),
            },
            Token::Dump => {
                if words.len() != 2 {
                    self.logln("Usage: dump <$addr>");
                    return;
                }
                match self.eval(words[1]) {
                    Some(addr) => {
                        self.dump_addr = addr;
                        self.display_mode = DisplayMode::Dump;
                    }
                    None => self.logln("Invalid addr"),
                }
            }
            Token::Disasm => {
                if words.len() != 2 {
                    self.logln("Usage: disasm <$addr>");
                    return;
                }
                match self.eval(words[1]) {
                    Some(addr) => {
                        self.disasm_addr = addr;
                        self.display_mode = DisplayMode::Disasm;
                    }
                    None => self.logln("Invalid addr"),
                }
            }
            Token::Load => {
                if words.len() != 3 {
                    self.logln("Usage: load <file> <$addr>");
                    return;
                }
                let Some(addr) = self.eval(words[2]) else {
                    self.logln("Invalid addr");
                    return;
                };
                self.load_binary(Path::new(words[1]), addr);
            }
            Token::Set => {
                if words.len() != 3 {
                    self.logln("Usage: set <reg> <$value>");
                    return;
                }
                let Some(value) = self.eval(words[2]) else {
                    self.logln("Invalid value");
                    return;
                };
                let register = match words[1].to_lowercase().as_str() {
                    "a" => PARAM_A,
                    "x" => PARAM_X,
                    "y" => PARAM_Y,
                    "p" => PARAM_P,
                    "sp" => PARAM_SP,
                    "ip" => PARAM_IP,
                    _ => {
                        self.logln("Bad register");
                        return;
                    }
                };
                match self.transport.set_register(register, value) {
                    Ok(()) => {
                        self.logln("Set");
                        self.refresh_regs();
                        if register == PARAM_IP
                            && self.follow
                            && self.display_mode == DisplayMode::Disasm
                        {
                            self.disasm_addr = value;
                        }
                    }
                    Err(e) => self.logln(format!("error setting: {}", e)),
                }
            }
            Token::Next => self.step(),
            Token::Break => {
                if words.len() > 2 {
                    self.logln("Usage: break [<$addr>]");
                    return;
                }
                // With no argument, break on the current instruction.
                let addr = if words.len() == 1 {
                    Some(self.regs.ip)
                } else {
                    self.eval(words[1])
                };
                match addr {
                    Some(addr) => self.breakpoint_toggle(addr),
                    None => self.logln("Invalid addr"),
                }
            }
            Token::Run => {
                self.running = true;
                self.stall_count = 0;
                self.logln("Free-running: <ENTER> to stop");
            }
            Token::Follow => {
                self.follow = !self.follow;
                self.logln(format!(
                    "Follow mode is now {}",
                    if self.follow { "on" } else { "off" }
                ));
            }
            Token::Di => {
                if words.len() != 2 {
                    self.logln("Usage: di <filename>");
                    return;
                }
                match DebugInfo::load(&PathBuf::from(words[1])) {
                    Ok(info) => {
                        self.debuginfo = Some(info);
                        self.logln("Loaded.");
                    }
                    Err(e) => self.logln(format!("Error loading debug symbols: {}", e)),
                }
            }
            Token::Watch => {
                if words.len() != 2 {
                    self.logln("Usage: watch <addr>");
                    return;
                }
                match self.eval(words[1]) {
                    Some(addr) => {
                        let set = self.watches.toggle(addr);
                        self.logln(if set { "Watch set" } else { "Watch unset" });
                    }
                    None => self.logln("Invalid addr"),
                }
            }
        }
    }

    fn load_binary(&mut self, path: &Path, addr: u16) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.logln(format!("Error loading: {}", e));
                return;
            }
        };

        // Keep each WRITEMEM comfortably inside the extra-data field.
        let mut offset = addr;
        for chunk in bytes.chunks(1024) {
            if let Err(e) = self.transport.write_mem(offset, chunk) {
                self.logln(format!("Error loading: {}", e));
                return;
            }
            offset = offset.wrapping_add(chunk.len() as u16);
        }
        self.logln(format!("Loaded {} bytes at ${:04x}", bytes.len(), addr));
    }

    // --- pane rendering -------------------------------------------------

    pub fn register_lines(&self) -> Vec<Spans<'static>> {
        let regs = &self.regs;
        let p = regs.p;
        let bit = |mask: u8| if p & mask != 0 { '1' } else { '0' };
        vec![
            Spans::from(format!(
                " A:   ${:02x}     X:   ${:02x}",
                regs.a, regs.x
            )),
            Spans::from(format!(
                " Y:   ${:02x}     SP:  ${:02x}",
                regs.y, regs.sp
            )),
            Spans::from(format!(
                " IP:  ${:04x}   P:   ${:02x}",
                regs.ip, regs.p
            )),
            Spans::from(String::new()),
            Spans::from("  Flags: NV-BDIZC".to_string()),
            Spans::from(format!(
                "         {}{}-{}{}{}{}{}",
                bit(0x80),
                bit(0x40),
                bit(0x10),
                bit(0x08),
                bit(0x04),
                bit(0x02),
                bit(0x01)
            )),
        ]
    }

    pub fn stack_lines(&mut self, height: u16) -> Vec<Spans<'static>> {
        let rows = height.saturating_sub(2);
        let sp = self.regs.sp;

        let stack = match self.transport.read_mem(0x0100, 256) {
            Ok(stack) => stack,
            Err(e) => return vec![Spans::from(format!("error: {}", e))],
        };

        // Keep the window pinned to the top of the stack until SP moves far
        // enough down to centre it.
        let mut start: u16 = 0x01ff;
        if (255 - sp as u16) > rows / 2 {
            start = 0x0100 + sp as u16 + rows / 2;
            start = start.max(0x00ff + rows).min(0x01ff);
        }

        let mut lines = Vec::new();
        for offset in 0..rows {
            let addr = match start.checked_sub(offset) {
                Some(addr) if addr >= 0x0100 => addr,
                _ => break,
            };
            let marker = if (addr & 0xff) as u8 == sp { " =>" } else { "   " };
            lines.push(Spans::from(format!(
                "{} ${:04x}: ${:02x}",
                marker,
                addr,
                stack[(addr - 0x0100) as usize]
            )));
        }
        lines
    }

    pub fn display_lines(&mut self, height: u16) -> Vec<Spans<'static>> {
        match self.display_mode {
            DisplayMode::Dump => self.dump_lines(height),
            DisplayMode::Disasm => self.disasm_lines(height),
            DisplayMode::Watch => self.watch_lines(height),
        }
    }

    fn dump_lines(&mut self, height: u16) -> Vec<Spans<'static>> {
        let rows = height.saturating_sub(2) as u32;
        let base = self.dump_addr;
        let available = (0x10000 - base as u32).min(rows * 16) as u16;

        let data = match self.transport.read_mem(base, available) {
            Ok(data) => data,
            Err(e) => return vec![Spans::from(format!("error: {}", e))],
        };

        let watch_style = Style::default().fg(Color::Red);
        let mut lines = Vec::new();

        for row in 0..rows {
            let line_addr = base as u32 + row * 16;
            if line_addr > 0xffff {
                break;
            }
            let mut spans: Vec<Span> = vec![Span::raw(format!("     {:04x}: ", line_addr))];

            let mut ascii: Vec<Span> = Vec::new();
            for pos in 0..16u32 {
                let index = (row * 16 + pos) as usize;
                match data.get(index) {
                    Some(byte) => {
                        let addr = (line_addr + pos) as u16;
                        let hex = format!("{:02x}", byte);
                        let printable = if (0x20..0x7f).contains(byte) {
                            *byte as char
                        } else {
                            '.'
                        };
                        if self.watches.contains(addr) {
                            spans.push(Span::styled(hex, watch_style));
                            ascii.push(Span::styled(printable.to_string(), watch_style));
                        } else {
                            spans.push(Span::raw(hex));
                            ascii.push(Span::raw(printable.to_string()));
                        }
                        spans.push(Span::raw(if pos == 7 { "  " } else { " " }));
                    }
                    None => spans.push(Span::raw(if pos == 7 { "    " } else { "   " })),
                }
            }

            spans.push(Span::raw("  "));
            spans.extend(ascii);
            lines.push(Spans::from(spans));
        }

        lines
    }

    fn disasm_lines(&mut self, height: u16) -> Vec<Spans<'static>> {
        let rows = height.saturating_sub(2) as u32;
        let base = self.disasm_addr;
        let available = (0x10000 - base as u32).min(rows * 3) as u16;

        let data = match self.transport.read_mem(base, available) {
            Ok(data) => data,
            Err(e) => return vec![Spans::from(format!("error: {}", e))],
        };

        let breakpoint_style = Style::default().fg(Color::Red);
        let source_style = Style::default().fg(Color::Cyan);
        let current_style = Style::default().add_modifier(Modifier::BOLD);

        let mut lines = Vec::new();
        let mut pos = base as u32;

        for _ in 0..rows {
            if pos > 0xffff {
                break;
            }
            let addr = pos as u16;
            let offset = (pos - base as u32) as usize;
            let decoded = disassemble(&data[offset.min(data.len())..], addr);

            let mut spans: Vec<Span> = Vec::new();
            if self.breakpoints.contains(addr) {
                spans.push(Span::styled(" *", breakpoint_style));
            } else {
                spans.push(Span::raw("  "));
            }
            spans.push(Span::raw(if self.regs.ip == addr { "=> " } else { "   " }));

            let body = format!(
                "{:04X}: {:<9}  {} {:<10}{}",
                addr,
                decoded.bytes,
                decoded.mnemonic,
                decoded.operand,
                if decoded.undocumented { " ?? " } else { "    " }
            );
            if self.regs.ip == addr {
                spans.push(Span::styled(body, current_style));
            } else {
                spans.push(Span::raw(body));
            }

            if let Some(info) = self.debuginfo.as_mut() {
                if let Some(source) = info.getline(addr) {
                    spans.push(Span::styled(tidy_source(&source), source_style));
                }
            }

            lines.push(Spans::from(spans));
            pos += decoded.len as u32;
        }

        lines
    }

    fn watch_lines(&mut self, height: u16) -> Vec<Spans<'static>> {
        let rows = height.saturating_sub(2);
        let mut lines = Vec::new();

        if self.watches.is_empty() {
            return vec![Spans::from("     (no watches)")];
        }

        let mut addr = self.watch_addr;
        for _ in 0..rows {
            let Some(hit) = self.watches.next_at_or_after(addr) else {
                break;
            };
            let value = match self.transport.read_mem(hit, 1) {
                Ok(data) => data[0],
                Err(_) => break,
            };
            let mut line = format!("     {:04x}: {:02x}", hit, value);
            if let Some(name) = self
                .debuginfo
                .as_ref()
                .and_then(|info| info.lookup_addr(hit))
            {
                line.push_str(&format!("  {}", name));
            }
            lines.push(Spans::from(line));
            match hit.checked_add(1) {
                Some(next) => addr = next,
                None => break,
            }
        }
        lines
    }

    pub fn status_line(&self) -> String {
        let mut status = format!(" caps: ${:04x}", self.transport.caps);
        if let Some(serial) = &self.serial_path {
            status.push_str(&format!("   serial: {}", serial));
        }
        status
    }
}

/// Straighten out the formatting of a source line before it lands in the
/// disassembly gutter: comments gone, whitespace runs collapsed, bare
/// instructions indented past the label column.
fn tidy_source(line: &str) -> String {
    let line = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let words: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = words.first() else {
        return String::new();
    };

    if mos_core::opcodes::match_instruction(first).is_some() {
        format!("               {}", words.join(" "))
    } else {
        format!("{:<14} {}", first, words[1..].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_source_aligns_labels_and_instructions() {
        assert_eq!(
            tidy_source("   lda   #$01   ; load it"),
            "               lda #$01"
        );
        assert_eq!(tidy_source("loop:  clc"), "loop:          clc");
        assert_eq!(tidy_source("; just a comment"), "");
    }

    #[test]
    fn prefix_matching_works_like_the_original() {
        assert!(matches!(match_token("next"), TokenMatch::Found(Token::Next)));
        assert!(matches!(match_token("n"), TokenMatch::Found(Token::Next)));
        assert!(matches!(match_token("ru"), TokenMatch::Found(Token::Run)));
        // "d" could be dump, disasm or di.
        assert!(matches!(match_token("d"), TokenMatch::Ambiguous));
        assert!(matches!(match_token("di"), TokenMatch::Found(Token::Di)));
        assert!(matches!(match_token("dis"), TokenMatch::Found(Token::Disasm)));
        assert!(matches!(match_token("frob"), TokenMatch::Unknown));
    }
}
