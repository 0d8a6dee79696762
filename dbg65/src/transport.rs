//! The client end of the three-fifo stepwise channel.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use mos_core::cpu::{Cpu, CPU_RECORD_LEN};
use mos_core::stepwise::{
    fifo_path, open_fifo, Command, Response, ASYNC_HWNOTIFY, ASYNC_NOTIFICATION, CMD_BP,
    CMD_CAPS, CMD_NEXT, CMD_READMEM, CMD_REGS, CMD_SET, CMD_STOP, CMD_VER, CMD_WRITEMEM,
    COMMAND_LEN, RESPONSE_LEN, RESPONSE_OK,
};

pub enum AsyncMessage {
    Text(String),
    Hardware { family: u16, info: String },
}

pub struct Transport {
    cmd: File,
    rsp: File,
    asy: File,
    pub caps: u16,
}

/// Whether a fifo currently has a reader on the other end: a non-blocking
/// write-only open of a readerless fifo fails with ENXIO.
pub fn is_writable(path: &Path) -> bool {
    match nix::fcntl::open(
        path,
        OFlag::O_WRONLY | OFlag::O_NONBLOCK,
        nix::sys::stat::Mode::empty(),
    ) {
        Ok(fd) => {
            let _ = nix::unistd::close(fd);
            true
        }
        Err(_) => false,
    }
}

impl Transport {
    /// Open the three fifos under `base` and fetch the remote capabilities.
    pub fn attach(base: &Path) -> Result<Transport> {
        let cmd = open_fifo(&fifo_path(base, "-cmd")).context("opening -cmd fifo")?;
        let rsp = open_fifo(&fifo_path(base, "-rsp")).context("opening -rsp fifo")?;
        let asy = open_fifo(&fifo_path(base, "-asy")).context("opening -asy fifo")?;

        let mut transport = Transport {
            cmd,
            rsp,
            asy,
            caps: 0,
        };
        let (response, _) = transport.command(Command::new(CMD_CAPS, 0, 0), &[])?;
        transport.caps = response.value;
        Ok(transport)
    }

    /// One command, one in-order response.
    pub fn command(&mut self, command: Command, extra: &[u8]) -> Result<(Response, Vec<u8>)> {
        let mut command = command;
        command.extra_len = extra.len() as u16;
        self.cmd
            .write_all(&command.to_bytes())
            .context("writing command")?;
        if !extra.is_empty() {
            self.cmd.write_all(extra).context("writing command data")?;
        }

        let mut frame = [0u8; RESPONSE_LEN];
        self.rsp.read_exact(&mut frame).context("reading response")?;
        let response = Response::from_bytes(&frame);

        let mut payload = vec![0u8; response.extra_len as usize];
        if response.extra_len > 0 {
            self.rsp
                .read_exact(&mut payload)
                .context("reading response data")?;
        }

        Ok((response, payload))
    }

    fn expect_ok(&mut self, command: Command, extra: &[u8]) -> Result<Vec<u8>> {
        let (response, payload) = self.command(command, extra)?;
        if response.status != RESPONSE_OK {
            let text = String::from_utf8_lossy(&payload)
                .trim_end_matches('\0')
                .to_string();
            bail!("{}", if text.is_empty() { "remote error".into() } else { text });
        }
        Ok(payload)
    }

    pub fn version(&mut self) -> Result<String> {
        let payload = self.expect_ok(Command::new(CMD_VER, 0, 0), &[])?;
        Ok(String::from_utf8_lossy(&payload)
            .trim_end_matches('\0')
            .to_string())
    }

    fn cpu_record(payload: &[u8]) -> Result<Cpu> {
        let bytes: [u8; CPU_RECORD_LEN] = payload
            .try_into()
            .map_err(|_| anyhow::anyhow!("short register record"))?;
        Ok(Cpu::from_bytes(&bytes))
    }

    pub fn regs(&mut self) -> Result<Cpu> {
        let payload = self.expect_ok(Command::new(CMD_REGS, 0, 0), &[])?;
        Self::cpu_record(&payload)
    }

    /// Execute one instruction, returning the post-step registers.
    pub fn next(&mut self) -> Result<Cpu> {
        let payload = self.expect_ok(Command::new(CMD_NEXT, 0, 0), &[])?;
        Self::cpu_record(&payload)
    }

    pub fn read_mem(&mut self, addr: u16, len: u16) -> Result<Vec<u8>> {
        self.expect_ok(Command::new(CMD_READMEM, addr, len), &[])
    }

    pub fn write_mem(&mut self, addr: u16, bytes: &[u8]) -> Result<()> {
        self.expect_ok(Command::new(CMD_WRITEMEM, addr, 0), bytes)?;
        Ok(())
    }

    pub fn set_register(&mut self, register: u16, value: u16) -> Result<()> {
        self.expect_ok(Command::new(CMD_SET, register, value), &[])?;
        Ok(())
    }

    pub fn breakpoint(&mut self, op: u16, addr: u16) -> Result<()> {
        self.expect_ok(Command::new(CMD_BP, op, addr), &[])?;
        Ok(())
    }

    /// Best-effort STOP on the way out.
    pub fn stop(&mut self) {
        let _ = self.command(Command::new(CMD_STOP, 0, 0), &[]);
    }

    /// Pull any queued async notifications without blocking.
    pub fn drain_async(&mut self) -> Vec<AsyncMessage> {
        let mut messages = Vec::new();

        let fd = self.asy.as_raw_fd();
        let flags = match fcntl(fd, FcntlArg::F_GETFL) {
            Ok(flags) => OFlag::from_bits_truncate(flags),
            Err(_) => return messages,
        };
        if fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).is_err() {
            return messages;
        }

        loop {
            let mut frame = [0u8; COMMAND_LEN];
            match self.asy.read_exact(&mut frame) {
                Ok(()) => {
                    let header = Command::from_bytes(&frame);
                    let mut payload = vec![0u8; header.extra_len as usize];
                    if header.extra_len > 0 && self.asy.read_exact(&mut payload).is_err() {
                        break;
                    }
                    let text = String::from_utf8_lossy(&payload)
                        .trim_end_matches('\0')
                        .to_string();
                    match header.cmd {
                        ASYNC_NOTIFICATION => messages.push(AsyncMessage::Text(text)),
                        ASYNC_HWNOTIFY => messages.push(AsyncMessage::Hardware {
                            family: header.param1,
                            info: text,
                        }),
                        _ => {}
                    }
                }
                Err(_) => break,
            }
        }

        let _ = fcntl(fd, FcntlArg::F_SETFL(flags));
        messages
    }
}
