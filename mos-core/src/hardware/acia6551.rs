//! A 6551-style ACIA: four registers over a host pty, with a ring-buffered
//! receive side fed by a listener thread.

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

const DEVICE: &str = "acia-6551";

const RX_FIFO_DEPTH: usize = 1024;

// Status register bits.
pub const SR_RDRF: u8 = 0x08; /* receive data register full */
pub const SR_TDRE: u8 = 0x10; /* transmit data register empty */
pub const SR_OR: u8 = 0x04; /* overrun */

const REG_DATA: u16 = 0;
const REG_STATUS: u16 = 1;
const REG_CMD: u16 = 2;
const REG_CTL: u16 = 3;

struct AciaState {
    sr: u8,
    cmd: u8,
    ctl: u8,
    rx: VecDeque<u8>,
}

impl AciaState {
    fn receive_byte(&mut self, byte: u8) {
        if self.rx.len() >= RX_FIFO_DEPTH {
            self.sr |= SR_OR;
            info!("acia-6551: rx buffer overrun, byte dropped");
        } else {
            self.rx.push_back(byte);
            self.sr |= SR_RDRF;
        }
    }

    /// A write to the status register is a program reset: the command
    /// register and the overrun bit reset and the rx fifo empties. RDRF is
    /// left alone; it stays latched until the fifo drains through a read.
    fn program_reset(&mut self) {
        self.cmd &= 0x70;
        self.cmd |= 0x02;
        self.sr &= !SR_OR;
        self.rx.clear();
    }
}

pub struct Acia6551 {
    regions: [Region; 1],
    base: u16,
    pty: File,
    path: String,
    state: Arc<Mutex<AciaState>>,
}

pub fn init(config: &HwConfig, callbacks: HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError> {
    let start = config_u16(config, DEVICE, "mem_start")?;
    let end = start + 3;
    let raw = config_bool(config, "raw", true);

    let (pty, path) = open_pty(DEVICE, raw)?;

    info!("opened pty for 6551 acia at {}", path);
    (callbacks.notify)(HwFamily::Serial, &path);

    let state = Arc::new(Mutex::new(AciaState {
        sr: SR_TDRE,
        cmd: 0x02, /* rx irq disabled */
        ctl: 0,
        rx: VecDeque::new(),
    }));

    let listener = pty.try_clone().map_err(|source| DeviceError::Io {
        device: DEVICE,
        source,
    })?;
    let listener_state = Arc::clone(&state);
    thread::Builder::new()
        .name("acia-6551-rx".into())
        .spawn(move || listener_proc(listener, listener_state))
        .map_err(|source| DeviceError::Io {
            device: DEVICE,
            source,
        })?;

    Ok(Box::new(Acia6551 {
        regions: [Region::rw(start, end)],
        base: start,
        pty,
        path,
        state,
    }))
}

fn listener_proc(mut pty: File, state: Arc<Mutex<AciaState>>) {
    let mut byte = [0u8; 1];
    loop {
        match pty.read(&mut byte) {
            Ok(0) => {
                warn!("acia-6551: EOF on pty");
                return;
            }
            Ok(_) => {
                state.lock().unwrap().receive_byte(byte[0]);
                debug!("acia-6551: got byte ${:02x}", byte[0]);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("acia-6551: pty read failed: {}", e);
                return;
            }
        }
    }
}

impl Hardware for Acia6551 {
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

        match offset {
            REG_DATA => {
                if read {
                    let byte = state.rx.pop_front().unwrap_or(0);
                    if state.rx.is_empty() {
                        state.sr &= !SR_RDRF;
                    }
                    return byte;
                }
                drop(state);
                if let Err(e) = (&self.pty).write_all(&[data]) {
                    warn!("acia-6551: pty write failed: {}", e);
                }
            }
            REG_STATUS => {
                if read {
                    return state.sr;
                }
                state.program_reset();
            }
            REG_CMD => {
                if read {
                    return state.cmd;
                }
                state.cmd = data;
            }
            REG_CTL => {
                if read {
                    return state.ctl;
                }
                state.ctl = data;
            }
            _ => {}
        }

        0
    }

    fn describe(&self) -> String {
        format!("6551 acia on {}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_acia() -> Box<dyn Hardware> {
        let mut config = HwConfig::new();
        config.insert("mem_start".into(), "0xd000".into());
        init(&config, HwCallbacks::silent()).expect("pty available in test environment")
    }

    #[test]
    fn regions_cover_the_four_registers() {
        let acia = test_acia();
        assert_eq!(acia.regions()[0].start, 0xd000);
        assert_eq!(acia.regions()[0].end, 0xd003);
    }

    #[test]
    fn status_starts_transmit_empty() {
        let acia = test_acia();
        let sr = acia.memop(0xd001, MemOp::Read, 0);
        assert_eq!(sr & SR_TDRE, SR_TDRE);
        assert_eq!(sr & SR_RDRF, 0);
    }

    #[test]
    fn program_reset_restores_the_command_register() {
        let acia = test_acia();
        acia.memop(0xd002, MemOp::Write, 0xff);
        assert_eq!(acia.memop(0xd002, MemOp::Read, 0), 0xff);
        // Writing the status register is a program reset.
        acia.memop(0xd001, MemOp::Write, 0);
        assert_eq!(acia.memop(0xd002, MemOp::Read, 0), 0x72);
    }
}
