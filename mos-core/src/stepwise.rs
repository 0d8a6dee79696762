//! The stepwise debugger protocol: dense little-endian frames over three
//! named pipes (`-cmd`, `-rsp`, `-asy`), and the server loop the emulator
//! runs on its protocol thread.
//!
//! Every command elicits exactly one response on the rsp channel, in order.
//! Async notifications (human text, hardware resource announcements) travel
//! only on the asy channel, framed like commands.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::{self, SFlag};
use thiserror::Error;

use crate::cpu::Cpu;
use crate::hardware::{HwCallbacks, HwFamily};
use crate::memory::{Bus, MemoryFabric};

pub const DEFAULT_FIFO_BASE: &str = "/tmp/stepwise";

pub const CMD_NOP: u8 = 0x00;
pub const CMD_VER: u8 = 0x01;
pub const CMD_REGS: u8 = 0x02;
pub const CMD_READMEM: u8 = 0x03;
pub const CMD_WRITEMEM: u8 = 0x04;
pub const CMD_SET: u8 = 0x06;
pub const CMD_NEXT: u8 = 0x07;
pub const CMD_CAPS: u8 = 0x08;
pub const CMD_BP: u8 = 0x09;
pub const CMD_RUN: u8 = 0x0A;
pub const CMD_STOP: u8 = 0xFF;

pub const PARAM_A: u16 = 0x01;
pub const PARAM_X: u16 = 0x02;
pub const PARAM_Y: u16 = 0x03;
pub const PARAM_P: u16 = 0x04;
pub const PARAM_SP: u16 = 0x05;
pub const PARAM_IP: u16 = 0x06;

pub const PARAM_BP_SET: u16 = 0x01;
pub const PARAM_BP_DEL: u16 = 0x02;

pub const CAP_BP: u16 = 0x01;
pub const CAP_WATCH: u16 = 0x02;
pub const CAP_RUN: u16 = 0x04;

pub const RESPONSE_OK: u8 = 0x00;
pub const RESPONSE_ERROR: u8 = 0x01;

/// Async frame kinds on the `-asy` channel.
pub const ASYNC_NOTIFICATION: u8 = 0x00;
pub const ASYNC_HWNOTIFY: u8 = 0x01;

pub const COMMAND_LEN: usize = 7;
pub const RESPONSE_LEN: usize = 5;

/// How many instructions a free run executes between polls of the command
/// pipe for a queued STOP.
const RUN_POLL_INTERVAL: u32 = 256;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("fifo {0} exists and is not a fifo")]
    NotAFifo(PathBuf),
    #[error("short read on command stream")]
    ShortRead,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fifo setup failed: {0}")]
    Nix(#[from] nix::Error),
}

/// The command frame: `u8 cmd, u16 p1, u16 p2, u16 extra_len`, packed
/// little-endian with no interior padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Command {
    pub cmd: u8,
    pub param1: u16,
    pub param2: u16,
    pub extra_len: u16,
}

impl Command {
    pub fn new(cmd: u8, param1: u16, param2: u16) -> Command {
        Command {
            cmd,
            param1,
            param2,
            extra_len: 0,
        }
    }

    pub fn to_bytes(self) -> [u8; COMMAND_LEN] {
        let mut bytes = [0u8; COMMAND_LEN];
        bytes[0] = self.cmd;
        bytes[1..3].copy_from_slice(&self.param1.to_le_bytes());
        bytes[3..5].copy_from_slice(&self.param2.to_le_bytes());
        bytes[5..7].copy_from_slice(&self.extra_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; COMMAND_LEN]) -> Command {
        Command {
            cmd: bytes[0],
            param1: u16::from_le_bytes([bytes[1], bytes[2]]),
            param2: u16::from_le_bytes([bytes[3], bytes[4]]),
            extra_len: u16::from_le_bytes([bytes[5], bytes[6]]),
        }
    }
}

/// The response frame: `u8 status, u16 value, u16 extra_len`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Response {
    pub status: u8,
    pub value: u16,
    pub extra_len: u16,
}

impl Response {
    pub fn to_bytes(self) -> [u8; RESPONSE_LEN] {
        let mut bytes = [0u8; RESPONSE_LEN];
        bytes[0] = self.status;
        bytes[1..3].copy_from_slice(&self.value.to_le_bytes());
        bytes[3..5].copy_from_slice(&self.extra_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; RESPONSE_LEN]) -> Response {
        Response {
            status: bytes[0],
            value: u16::from_le_bytes([bytes[1], bytes[2]]),
            extra_len: u16::from_le_bytes([bytes[3], bytes[4]]),
        }
    }
}

/// Create `path` as a fifo (mode 0600) if missing; reject non-fifo files.
pub fn ensure_fifo(path: &Path) -> Result<(), StepError> {
    match stat::stat(path) {
        Ok(st) => {
            if st.st_mode & SFlag::S_IFMT.bits() != SFlag::S_IFIFO.bits() {
                return Err(StepError::NotAFifo(path.to_path_buf()));
            }
        }
        Err(nix::errno::Errno::ENOENT) => {
            debug!("creating fifo {}", path.display());
            nix::unistd::mkfifo(
                path,
                stat::Mode::S_IRUSR | stat::Mode::S_IWUSR,
            )?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn fifo_path(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Open a fifo read/write; on Linux this never blocks waiting for a peer,
/// which is exactly what lets either end start first.
pub fn open_fifo(path: &Path) -> Result<File, StepError> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

fn read_frame(file: &mut File, buf: &mut [u8]) -> Result<(), StepError> {
    file.read_exact(buf).map_err(|_| StepError::ShortRead)
}

/// The emulator side of the protocol. Owns the cmd/rsp pipes and the
/// server-side breakpoint store backing CAP_BP/CAP_RUN.
pub struct StepServer {
    cmd: File,
    rsp: File,
    breakpoints: BTreeSet<u16>,
    /// A frame read while free-running, serviced after RUN's response so
    /// the one-response-per-command order holds.
    pending: Option<(Command, Vec<u8>)>,
}

impl StepServer {
    /// Create the command and response fifos under `base` and open them.
    pub fn open(base: &Path) -> Result<StepServer, StepError> {
        let cmd_path = fifo_path(base, "-cmd");
        let rsp_path = fifo_path(base, "-rsp");
        ensure_fifo(&cmd_path)?;
        ensure_fifo(&rsp_path)?;

        debug!("opening cmd fifo {}", cmd_path.display());
        let cmd = open_fifo(&cmd_path)?;
        debug!("opening rsp fifo {}", rsp_path.display());
        let rsp = open_fifo(&rsp_path)?;

        Ok(StepServer {
            cmd,
            rsp,
            breakpoints: BTreeSet::new(),
            pending: None,
        })
    }

    /// Serve commands until STOP. Runs on the emulator's protocol thread
    /// and is the only mutator of the CPU.
    pub fn run(&mut self, cpu: &mut Cpu, mem: &MemoryFabric) -> Result<(), StepError> {
        info!("stepwise server waiting for commands");
        loop {
            let (command, extra) = match self.pending.take() {
                Some(queued) => queued,
                None => self.read_command()?,
            };

            debug!("received command {:02x}", command.cmd);

            if command.cmd == CMD_STOP {
                info!("exiting emulator at debugger request");
                self.respond(RESPONSE_OK, 0, &[])?;
                return Ok(());
            }

            self.eval(&command, &extra, cpu, mem)?;
        }
    }

    fn read_command(&mut self) -> Result<(Command, Vec<u8>), StepError> {
        let mut frame = [0u8; COMMAND_LEN];
        read_frame(&mut self.cmd, &mut frame)?;
        let command = Command::from_bytes(&frame);

        let mut extra = vec![0u8; command.extra_len as usize];
        if command.extra_len > 0 {
            debug!("reading {} bytes of extra data", command.extra_len);
            read_frame(&mut self.cmd, &mut extra)?;
        }

        Ok((command, extra))
    }

    fn respond(&mut self, status: u8, value: u16, extra: &[u8]) -> Result<(), StepError> {
        let response = Response {
            status,
            value,
            extra_len: extra.len() as u16,
        };
        self.rsp.write_all(&response.to_bytes())?;
        if !extra.is_empty() {
            self.rsp.write_all(extra)?;
        }
        Ok(())
    }

    fn respond_error(&mut self, message: &str) -> Result<(), StepError> {
        let mut payload = message.as_bytes().to_vec();
        payload.push(0);
        self.respond(RESPONSE_ERROR, 0, &payload)
    }

    fn eval(
        &mut self,
        command: &Command,
        extra: &[u8],
        cpu: &mut Cpu,
        mem: &MemoryFabric,
    ) -> Result<(), StepError> {
        match command.cmd {
            CMD_NOP => self.respond(RESPONSE_OK, 0, &[]),
            CMD_VER => {
                let mut version = env!("CARGO_PKG_VERSION").as_bytes().to_vec();
                version.push(0);
                self.respond(RESPONSE_OK, 0, &version)
            }
            CMD_REGS => {
                let record = cpu.to_bytes();
                self.respond(RESPONSE_OK, 0, &record)
            }
            CMD_READMEM => {
                let start = command.param1;
                let len = command.param2;
                debug!("reading ${:04x} bytes from ${:04x}", len, start);
                let bytes: Vec<u8> = (0..len)
                    .map(|i| mem.read8(start.wrapping_add(i)))
                    .collect();
                self.respond(RESPONSE_OK, 0, &bytes)
            }
            CMD_WRITEMEM => {
                let start = command.param1;
                debug!("writing ${:04x} bytes to ${:04x}", extra.len(), start);
                for (i, byte) in extra.iter().enumerate() {
                    mem.write8(start.wrapping_add(i as u16), *byte);
                }
                self.respond(RESPONSE_OK, 0, &[])
            }
            CMD_SET => {
                match command.param1 {
                    PARAM_A => cpu.a = command.param2 as u8,
                    PARAM_X => cpu.x = command.param2 as u8,
                    PARAM_Y => cpu.y = command.param2 as u8,
                    PARAM_P => cpu.p = command.param2 as u8,
                    PARAM_SP => cpu.sp = command.param2 as u8,
                    PARAM_IP => cpu.ip = command.param2,
                    _ => return self.respond_error("Bad register specified"),
                }
                self.respond(RESPONSE_OK, 0, &[])
            }
            CMD_NEXT => match cpu.execute(mem) {
                Ok(_) => {
                    let record = cpu.to_bytes();
                    self.respond(RESPONSE_OK, 0, &record)
                }
                Err(e) => self.respond_error(&e.to_string()),
            },
            CMD_CAPS => self.respond(RESPONSE_OK, CAP_BP | CAP_RUN, &[]),
            CMD_BP => match command.param1 {
                PARAM_BP_SET => {
                    self.breakpoints.insert(command.param2);
                    self.respond(RESPONSE_OK, 0, &[])
                }
                PARAM_BP_DEL => {
                    self.breakpoints.remove(&command.param2);
                    self.respond(RESPONSE_OK, 0, &[])
                }
                _ => self.respond_error("Bad breakpoint operation"),
            },
            CMD_RUN => self.run_free(cpu, mem),
            unknown => {
                error!("unknown command from debugger: {}", unknown);
                self.respond_error("unknown command")
            }
        }
    }

    /// CAP_RUN: step until IP lands on a server-side breakpoint, polling
    /// the command pipe now and then so a queued STOP ends the run.
    fn run_free(&mut self, cpu: &mut Cpu, mem: &MemoryFabric) -> Result<(), StepError> {
        if self.breakpoints.is_empty() {
            return self.respond_error("no breakpoints set");
        }

        let mut executed: u32 = 0;
        loop {
            if let Err(e) = cpu.execute(mem) {
                warn!("free run stopped: {}", e);
                return self.respond_error(&e.to_string());
            }

            if self.breakpoints.contains(&cpu.ip) {
                break;
            }

            executed += 1;
            if executed % RUN_POLL_INTERVAL == 0 {
                if let Some(queued) = self.poll_command()? {
                    self.pending = Some(queued);
                    break;
                }
            }
        }

        self.respond(RESPONSE_OK, 0, &[])
    }

    /// Non-blocking probe of the command pipe. Command frames are written
    /// in one piece and fit well inside PIPE_BUF, so a successful read
    /// always yields a whole frame.
    fn poll_command(&mut self) -> Result<Option<(Command, Vec<u8>)>, StepError> {
        let fd = self.cmd.as_raw_fd();
        let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
        fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;

        let mut frame = [0u8; COMMAND_LEN];
        let result = self.cmd.read_exact(&mut frame);

        fcntl(fd, FcntlArg::F_SETFL(flags))?;

        match result {
            Ok(()) => {
                let command = Command::from_bytes(&frame);
                let mut extra = vec![0u8; command.extra_len as usize];
                if command.extra_len > 0 {
                    read_frame(&mut self.cmd, &mut extra)?;
                }
                Ok(Some((command, extra)))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(_) => Err(StepError::ShortRead),
        }
    }
}

/// The async-notification side of the channel. Cloneable; devices hold one
/// through their callback table.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<Mutex<Option<File>>>,
}

impl Notifier {
    /// A notifier with no channel: notifications only reach the log.
    pub fn disabled() -> Notifier {
        Notifier {
            sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn open(base: &Path) -> Result<Notifier, StepError> {
        let asy_path = fifo_path(base, "-asy");
        ensure_fifo(&asy_path)?;
        let asy = open_fifo(&asy_path)?;
        Ok(Notifier {
            sink: Arc::new(Mutex::new(Some(asy))),
        })
    }

    fn send(&self, kind: u8, param1: u16, payload: &[u8]) {
        let mut sink = self.sink.lock().unwrap();
        if let Some(file) = sink.as_mut() {
            let frame = Command {
                cmd: kind,
                param1,
                param2: 0,
                extra_len: payload.len() as u16,
            };
            let result = file
                .write_all(&frame.to_bytes())
                .and_then(|_| file.write_all(payload));
            if let Err(e) = result {
                warn!("async notification dropped: {}", e);
            }
        }
    }

    /// Free-form text to whatever is driving the emulator.
    pub fn notify_text(&self, message: &str) {
        info!("{}", message);
        let mut payload = message.as_bytes().to_vec();
        payload.push(0);
        self.send(ASYNC_NOTIFICATION, 0, &payload);
    }

    /// Announce a hardware resource (pty path, display port).
    pub fn notify_hw(&self, family: HwFamily, info: &str) {
        let mut payload = info.as_bytes().to_vec();
        payload.push(0);
        self.send(ASYNC_HWNOTIFY, family.tag(), &payload);
    }

    /// The callback table device factories receive.
    pub fn callbacks(&self) -> HwCallbacks {
        let notifier = self.clone();
        HwCallbacks {
            notify: Arc::new(move |family, info| notifier.notify_hw(family, info)),
            irq_change: Arc::new(|| {}),
            nmi_change: Arc::new(|| {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPU_RECORD_LEN;
    use crate::hardware::HwConfig;

    #[test]
    fn frames_pack_dense_and_little_endian() {
        let command = Command {
            cmd: CMD_READMEM,
            param1: 0x1234,
            param2: 0x0010,
            extra_len: 3,
        };
        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes, [0x03, 0x34, 0x12, 0x10, 0x00, 0x03, 0x00]);

        let round = Command::from_bytes(&bytes);
        assert_eq!(round.param1, 0x1234);
        assert_eq!(round.extra_len, 3);

        let response = Response {
            status: RESPONSE_OK,
            value: CAP_BP | CAP_RUN,
            extra_len: 0,
        };
        let bytes = response.to_bytes();
        assert_eq!(bytes.len(), 5);
        assert_eq!(Response::from_bytes(&bytes).value, CAP_BP | CAP_RUN);
    }

    /// Drive a live server over real fifos: one thread serves, the test
    /// plays debugger.
    #[test]
    fn server_round_trip_over_fifos() {
        let base = std::env::temp_dir().join(format!("stepwise-test-{}", std::process::id()));

        let mut server = StepServer::open(&base).unwrap();
        let server_thread = std::thread::spawn(move || {
            let mut cpu = Cpu::new();
            let mut fabric = MemoryFabric::new(HwCallbacks::silent());
            let mut config = HwConfig::new();
            config.insert("mem_start".into(), "0x0000".into());
            config.insert("mem_end".into(), "0xffff".into());
            fabric.load_module("ram", &config).unwrap();
            cpu.reset(&fabric);
            server.run(&mut cpu, &fabric).unwrap();
        });

        let mut cmd = open_fifo(&fifo_path(&base, "-cmd")).unwrap();
        let mut rsp = open_fifo(&fifo_path(&base, "-rsp")).unwrap();

        let mut send = |command: Command, extra: &[u8]| -> (Response, Vec<u8>) {
            cmd.write_all(&command.to_bytes()).unwrap();
            if !extra.is_empty() {
                cmd.write_all(extra).unwrap();
            }
            let mut frame = [0u8; RESPONSE_LEN];
            rsp.read_exact(&mut frame).unwrap();
            let response = Response::from_bytes(&frame);
            let mut payload = vec![0u8; response.extra_len as usize];
            rsp.read_exact(&mut payload).unwrap();
            (response, payload)
        };

        // REGS returns exactly the packed record width.
        let (response, payload) = send(Command::new(CMD_REGS, 0, 0), &[]);
        assert_eq!(response.status, RESPONSE_OK);
        assert_eq!(payload.len(), CPU_RECORD_LEN);

        // SET A then read it back through REGS.
        let (response, _) = send(Command::new(CMD_SET, PARAM_A, 0x42), &[]);
        assert_eq!(response.status, RESPONSE_OK);
        let (_, payload) = send(Command::new(CMD_REGS, 0, 0), &[]);
        let cpu = Cpu::from_bytes(&payload.try_into().unwrap());
        assert_eq!(cpu.a, 0x42);

        // WRITEMEM then READMEM round trip.
        let (response, _) = send(
            Command {
                cmd: CMD_WRITEMEM,
                param1: 0x0200,
                param2: 0,
                extra_len: 3,
            },
            &[0xde, 0xad, 0xbe],
        );
        assert_eq!(response.status, RESPONSE_OK);
        let (_, payload) = send(Command::new(CMD_READMEM, 0x0200, 3), &[]);
        assert_eq!(payload, vec![0xde, 0xad, 0xbe]);

        // Write a program: LDA #$01 at $0300, then NEXT executes it.
        let (_, _) = send(
            Command {
                cmd: CMD_WRITEMEM,
                param1: 0x0300,
                param2: 0,
                extra_len: 2,
            },
            &[0xa9, 0x01],
        );
        let (_, _) = send(Command::new(CMD_SET, PARAM_IP, 0x0300), &[]);
        let (response, payload) = send(Command::new(CMD_NEXT, 0, 0), &[]);
        assert_eq!(response.status, RESPONSE_OK);
        let cpu = Cpu::from_bytes(&payload.try_into().unwrap());
        assert_eq!(cpu.a, 0x01);
        assert_eq!(cpu.ip, 0x0302);

        // Capabilities advertise in-emulator breakpoints and free-run.
        let (response, _) = send(Command::new(CMD_CAPS, 0, 0), &[]);
        assert_eq!(response.value & CAP_BP, CAP_BP);
        assert_eq!(response.value & CAP_RUN, CAP_RUN);

        // RUN with no breakpoints is refused rather than running away.
        let (response, _) = send(Command::new(CMD_RUN, 0, 0), &[]);
        assert_eq!(response.status, RESPONSE_ERROR);

        // Set a breakpoint and free-run into it: a two-instruction loop
        // at $0300 with the breakpoint on the second instruction.
        let (_, _) = send(
            Command {
                cmd: CMD_WRITEMEM,
                param1: 0x0300,
                param2: 0,
                extra_len: 5,
            },
            // lda #$01 / jmp $0300
            &[0xa9, 0x01, 0x4c, 0x00, 0x03],
        );
        let (_, _) = send(Command::new(CMD_SET, PARAM_IP, 0x0300), &[]);
        let (response, _) = send(Command::new(CMD_BP, PARAM_BP_SET, 0x0302), &[]);
        assert_eq!(response.status, RESPONSE_OK);
        let (response, _) = send(Command::new(CMD_RUN, 0, 0), &[]);
        assert_eq!(response.status, RESPONSE_OK);
        let (_, payload) = send(Command::new(CMD_REGS, 0, 0), &[]);
        let cpu = Cpu::from_bytes(&payload.try_into().unwrap());
        assert_eq!(cpu.ip, 0x0302);

        // STOP ends the session with a final OK.
        let (response, _) = send(Command::new(CMD_STOP, 0, 0), &[]);
        assert_eq!(response.status, RESPONSE_OK);

        server_thread.join().unwrap();

        let _ = std::fs::remove_file(fifo_path(&base, "-cmd"));
        let _ = std::fs::remove_file(fifo_path(&base, "-rsp"));
    }
}
