//! The device contract the memory fabric dispatches against.
//!
//! A device registers one or more address regions with read/write permission
//! bits and services 8-bit memory operations against them. Devices that need
//! host attention participate in the fabric's event-loop tick; devices with
//! background work (a PTY reader) spawn their own threads and guard shared
//! state with a per-device mutex.

pub mod acia6551;
pub mod pty;
pub mod ram;
pub mod skeleton;
pub mod uart16550;
pub mod video;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwFamily {
    Video,
    Io,
    Serial,
    Memory,
    Other,
}

impl HwFamily {
    /// The numeric tag used by async HW notifications on the wire.
    pub fn tag(self) -> u16 {
        match self {
            HwFamily::Video => 0x01,
            HwFamily::Io => 0x02,
            HwFamily::Serial => 0x04,
            HwFamily::Memory => 0x08,
            HwFamily::Other => 0x10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Read,
    Write,
}

/// An inclusive address range with permission bits.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub start: u16,
    pub end: u16,
    pub readable: bool,
    pub writable: bool,
}

impl Region {
    pub fn rw(start: u16, end: u16) -> Region {
        Region {
            start,
            end,
            readable: true,
            writable: true,
        }
    }

    pub fn accepts(&self, addr: u16, op: MemOp) -> bool {
        addr >= self.start
            && addr <= self.end
            && match op {
                MemOp::Read => self.readable,
                MemOp::Write => self.writable,
            }
    }
}

/// The uniform contract every device presents to the fabric.
pub trait Hardware: Send + Sync {
    fn family(&self) -> HwFamily;
    fn regions(&self) -> &[Region];

    /// Service one 8-bit operation. Returns the byte read; writes return 0.
    fn memop(&self, addr: u16, op: MemOp, data: u8) -> u8;

    /// Whether this device wants a slot in the host event-loop tick.
    fn wants_eventloop(&self) -> bool {
        false
    }

    /// One event-loop turn. Only the sole waiting device may block.
    fn eventloop(&self, _blocking: bool) {}

    fn irq_asserted(&self) -> bool {
        false
    }

    fn nmi_asserted(&self) -> bool {
        false
    }

    fn clear_nmi(&self) {}

    /// A human description of the device's host resource (pty path, ...).
    fn describe(&self) -> String;
}

/// Parsed `args` map of one configuration section.
pub type HwConfig = BTreeMap<String, String>;

/// Callbacks handed to a device factory. Logging goes through the `log`
/// crate; these cover the emulator-level channels.
#[derive(Clone)]
pub struct HwCallbacks {
    /// Surface a host resource to whatever is driving the emulator
    /// (async notification channel when the stepwise server is up).
    pub notify: Arc<dyn Fn(HwFamily, &str) + Send + Sync>,
    pub irq_change: Arc<dyn Fn() + Send + Sync>,
    pub nmi_change: Arc<dyn Fn() + Send + Sync>,
}

impl HwCallbacks {
    /// Callbacks that drop notifications, for hosts without a debug channel.
    pub fn silent() -> HwCallbacks {
        HwCallbacks {
            notify: Arc::new(|_, _| {}),
            irq_change: Arc::new(|| {}),
            nmi_change: Arc::new(|| {}),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unknown memory module '{0}'")]
    UnknownModule(String),
    #[error("{device}: missing required arg '{key}'")]
    MissingArg { device: &'static str, key: &'static str },
    #[error("{device}: bad value '{value}' for arg '{key}'")]
    BadArg {
        device: &'static str,
        key: &'static str,
        value: String,
    },
    #[error("{device}: {source}")]
    Io {
        device: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{device}: {msg}")]
    Init { device: &'static str, msg: String },
}

/// Parse a u16 config value: `0x…`/`$…` hex, leading-0 octal, else decimal.
pub fn parse_u16(value: &str) -> Option<u16> {
    let value = value.trim();
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if let Some(hex) = value.strip_prefix('$') {
        u32::from_str_radix(hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        u32::from_str_radix(&value[1..], 8)
    } else {
        value.parse::<u32>()
    }
    .ok()?;

    u16::try_from(parsed).ok()
}

pub fn config_u16(
    config: &HwConfig,
    device: &'static str,
    key: &'static str,
) -> Result<u16, DeviceError> {
    let value = config
        .get(key)
        .ok_or(DeviceError::MissingArg { device, key })?;
    parse_u16(value).ok_or_else(|| DeviceError::BadArg {
        device,
        key,
        value: value.clone(),
    })
}

pub fn config_bool(config: &HwConfig, key: &str, default: bool) -> bool {
    match config.get(key) {
        Some(value) => {
            matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_parsing_accepts_the_config_radixes() {
        assert_eq!(parse_u16("0x8000"), Some(0x8000));
        assert_eq!(parse_u16("$c000"), Some(0xc000));
        assert_eq!(parse_u16("0755"), Some(0o755));
        assert_eq!(parse_u16("1024"), Some(1024));
        assert_eq!(parse_u16("65536"), None);
        assert_eq!(parse_u16("zzz"), None);
    }

    #[test]
    fn region_permissions() {
        let region = Region {
            start: 0x1000,
            end: 0x1fff,
            readable: true,
            writable: false,
        };
        assert!(region.accepts(0x1000, MemOp::Read));
        assert!(region.accepts(0x1fff, MemOp::Read));
        assert!(!region.accepts(0x1234, MemOp::Write));
        assert!(!region.accepts(0x2000, MemOp::Read));
    }
}
