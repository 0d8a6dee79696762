//! A 16550-style UART mapped over eight registers, wired to a host pty.
//!
//! A background listener thread pulls bytes off the pty into a bounded
//! receive FIFO; the CPU-facing side drains the FIFO through RBR and pushes
//! transmitted bytes straight back out the pty. The state lock is never held
//! across the blocking pty read.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::hardware::pty::open_pty;
use crate::hardware::{
    config_bool, config_u16, DeviceError, Hardware, HwCallbacks, HwConfig, HwFamily, MemOp,
    Region,
};

const DEVICE: &str = "uart-16550";

/// Receive FIFO depth before overrun sets in.
const RX_FIFO_DEPTH: usize = 1024;

// Line control register.
pub const LCR_DLAB: u8 = 0x80; /* divisor latch access bit */

// Line status register.
pub const LSR_DR: u8 = 0x01; /* data ready */
pub const LSR_OE: u8 = 0x02; /* overrun error */
pub const LSR_THRE: u8 = 0x20; /* transmitter holding register empty */
pub const LSR_TEMT: u8 = 0x40; /* transmitter empty */

// Register offsets (several share a slot, switched by DLAB or read/write).
const REG_RBR_THR_DLL: u16 = 0;
const REG_IER_DLM: u16 = 1;
const REG_IIR_FCR: u16 = 2;
const REG_LCR: u16 = 3;
const REG_MCR: u16 = 4;
const REG_LSR: u16 = 5;
const REG_MSR: u16 = 6;
const REG_SCR: u16 = 7;

#[derive(Default)]
struct UartState {
    ier: u8,
    iir: u8,
    fcr: u8,
    lcr: u8,
    mcr: u8,
    lsr: u8,
    msr: u8,
    scr: u8,
    dll: u8,
    dlm: u8,
    rx: VecDeque<u8>,
}

impl UartState {
    fn receive_byte(&mut self, byte: u8) {
        if self.rx.len() >= RX_FIFO_DEPTH {
            // Dropped a byte; latch the overrun bit until LSR is read.
            self.lsr |= LSR_OE;
            info!("uart-16550: rx fifo overrun, byte dropped");
        } else {
            self.rx.push_back(byte);
            self.lsr |= LSR_DR;
        }
    }
}

pub struct Uart16550 {
    regions: [Region; 1],
    base: u16,
    pty: File,
    path: String,
    state: Arc<Mutex<UartState>>,
}

pub fn init(config: &HwConfig, callbacks: HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError> {
    let start = config_u16(config, DEVICE, "mem_start")?;
    // The register window is fixed; mem_end is derived.
    let end = start + 7;
    let raw = config_bool(config, "raw", true);

    let (pty, path) = open_pty(DEVICE, raw)?;

    info!("opened pty for 16550 uart at {}", path);
    (callbacks.notify)(HwFamily::Serial, &path);

    let state = Arc::new(Mutex::new(UartState {
        // Transmit side never buffers, so it is always empty.
        lsr: LSR_THRE | LSR_TEMT,
        ..UartState::default()
    }));

    let listener = pty.try_clone().map_err(|source| DeviceError::Io {
        device: DEVICE,
        source,
    })?;
    let listener_state = Arc::clone(&state);
    thread::Builder::new()
        .name("uart-16550-rx".into())
        .spawn(move || listener_proc(listener, listener_state))
        .map_err(|source| DeviceError::Io {
            device: DEVICE,
            source,
        })?;

    Ok(Box::new(Uart16550 {
        regions: [Region::rw(start, end)],
        base: start,
        pty,
        path,
        state,
    }))
}

/// Blocking pty reader; enqueues into the receive FIFO under the state lock.
fn listener_proc(mut pty: File, state: Arc<Mutex<UartState>>) {
    let mut byte = [0u8; 1];
    loop {
        match pty.read(&mut byte) {
            Ok(0) => {
                warn!("uart-16550: EOF on pty");
                return;
            }
            Ok(_) => {
                state.lock().unwrap().receive_byte(byte[0]);
                debug!("uart-16550: got byte ${:02x}", byte[0]);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("uart-16550: pty read failed: {}", e);
                return;
            }
        }
    }
}

impl Hardware for Uart16550 {
    fn family(&self) -> HwFamily {
        HwFamily::Serial
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn memop(&self, addr: u16, op: MemOp, data: u8) -> u8 {
        let offset = addr - self.base;
        let mut state = self.state.lock().unwrap();
        let read = op == MemOp::Read;
        let dlab = state.lcr & LCR_DLAB != 0;

        match offset {
            REG_RBR_THR_DLL => {
                if dlab {
                    if read {
                        return state.dll;
                    }
                    state.dll = data;
                } else if read {
                    let byte = state.rx.pop_front().unwrap_or(0);
                    if state.rx.is_empty() {
                        state.lsr &= !LSR_DR;
                    }
                    return byte;
                } else {
                    // THR write goes straight out the pty; drop the lock
                    // first, the pty is the contention point.
                    drop(state);
                    if let Err(e) = (&self.pty).write_all(&[data]) {
                        warn!("uart-16550: pty write failed: {}", e);
                    }
                }
            }
            REG_IER_DLM => {
                if dlab {
                    if read {
                        return state.dlm;
                    }
                    state.dlm = data;
                } else {
                    if read {
                        return state.ier;
                    }
                    state.ier = data;
                }
            }
            REG_IIR_FCR => {
                if read {
                    return state.iir;
                }
                state.fcr = data;
            }
            REG_LCR => {
                if read {
                    return state.lcr;
                }
                state.lcr = data;
            }
            REG_MCR => {
                if read {
                    return state.mcr;
                }
                state.mcr = data;
            }
            REG_LSR => {
                if read {
                    let lsr = state.lsr;
                    // Reading LSR clears the sticky error bits.
                    state.lsr &= !LSR_OE;
                    return lsr;
                }
                state.lsr = data;
            }
            REG_MSR => {
                if read {
                    return state.msr;
                }
                state.msr = data;
            }
            REG_SCR => {
                if read {
                    return state.scr;
                }
                state.scr = data;
            }
            _ => {}
        }

        0
    }

    fn describe(&self) -> String {
        format!("16550 uart on {}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_uart() -> Box<dyn Hardware> {
        let mut config = HwConfig::new();
        config.insert("mem_start".into(), "0xc000".into());
        init(&config, HwCallbacks::silent()).expect("pty available in test environment")
    }

    #[test]
    fn regions_cover_the_eight_registers() {
        let uart = test_uart();
        assert_eq!(uart.regions()[0].start, 0xc000);
        assert_eq!(uart.regions()[0].end, 0xc007);
    }

    #[test]
    fn lsr_reports_transmitter_empty_and_clears_overrun() {
        let uart = test_uart();
        let lsr = uart.memop(0xc005, MemOp::Read, 0);
        assert_eq!(lsr & LSR_THRE, LSR_THRE);
        assert_eq!(lsr & LSR_TEMT, LSR_TEMT);
        assert_eq!(lsr & LSR_DR, 0);
    }

    #[test]
    fn dlab_switches_the_divisor_latches() {
        let uart = test_uart();
        uart.memop(0xc003, MemOp::Write, LCR_DLAB);
        uart.memop(0xc000, MemOp::Write, 0x34);
        uart.memop(0xc001, MemOp::Write, 0x12);
        assert_eq!(uart.memop(0xc000, MemOp::Read, 0), 0x34);
        assert_eq!(uart.memop(0xc001, MemOp::Read, 0), 0x12);

        uart.memop(0xc003, MemOp::Write, 0);
        // With DLAB clear, register 1 is IER again.
        uart.memop(0xc001, MemOp::Write, 0x05);
        assert_eq!(uart.memop(0xc001, MemOp::Read, 0), 0x05);
    }

    #[test]
    fn scratch_register_round_trips() {
        let uart = test_uart();
        uart.memop(0xc007, MemOp::Write, 0x5a);
        assert_eq!(uart.memop(0xc007, MemOp::Read, 0), 0x5a);
    }
}
