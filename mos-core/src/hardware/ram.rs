//! Plain RAM or ROM backed by a byte buffer, optionally preloaded from a
//! file. ROM is simply a region without the writable permission bit, so the
//! fabric never routes writes here.

use std::fs::File;
use std::io::Read;
use std::sync::Mutex;

use crate::hardware::{
    config_bool, config_u16, DeviceError, Hardware, HwCallbacks, HwConfig, HwFamily, MemOp,
    Region,
};

const DEVICE: &str = "ram";

pub struct Ram {
    regions: [Region; 1],
    mem: Mutex<Vec<u8>>,
    description: String,
}

pub fn init(config: &HwConfig, _callbacks: HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError> {
    let start = config_u16(config, DEVICE, "mem_start")?;
    let end = config_u16(config, DEVICE, "mem_end")?;
    if end < start {
        return Err(DeviceError::Init {
            device: DEVICE,
            msg: format!("mem_end ${:04x} below mem_start ${:04x}", end, start),
        });
    }

    let is_rom = config_bool(config, "is_rom", false);
    let size = end as usize - start as usize + 1;
    let mut mem = vec![0u8; size];

    if let Some(backing_file) = config.get("backing_file") {
        let mut file = File::open(backing_file).map_err(|source| DeviceError::Io {
            device: DEVICE,
            source,
        })?;
        // A short file leaves the tail zeroed; a long one is truncated.
        let mut loaded = 0;
        while loaded < size {
            let n = file.read(&mut mem[loaded..]).map_err(|source| DeviceError::Io {
                device: DEVICE,
                source,
            })?;
            if n == 0 {
                break;
            }
            loaded += n;
        }
    }

    Ok(Box::new(Ram {
        regions: [Region {
            start,
            end,
            readable: true,
            writable: !is_rom,
        }],
        mem: Mutex::new(mem),
        description: format!(
            "{} ${:04x}-${:04x}",
            if is_rom { "rom" } else { "ram" },
            start,
            end
        ),
    }))
}

impl Hardware for Ram {
    fn family(&self) -> HwFamily {
        HwFamily::Memory
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn memop(&self, addr: u16, op: MemOp, data: u8) -> u8 {
        let offset = (addr - self.regions[0].start) as usize;
        let mut mem = self.mem.lock().unwrap();
        match op {
            MemOp::Read => mem[offset],
            MemOp::Write => {
                mem[offset] = data;
                0
            }
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> HwConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_back_writes() {
        let ram = init(
            &config(&[("mem_start", "0x0000"), ("mem_end", "0x7fff")]),
            HwCallbacks::silent(),
        )
        .unwrap();
        ram.memop(0x1234, MemOp::Write, 0x42);
        assert_eq!(ram.memop(0x1234, MemOp::Read, 0), 0x42);
    }

    #[test]
    fn rom_region_is_not_writable() {
        let rom = init(
            &config(&[
                ("mem_start", "0xe000"),
                ("mem_end", "0xffff"),
                ("is_rom", "yes"),
            ]),
            HwCallbacks::silent(),
        )
        .unwrap();
        assert!(!rom.regions()[0].writable);
        assert!(rom.regions()[0].readable);
    }

    #[test]
    fn missing_start_is_an_error() {
        assert!(init(&config(&[("mem_end", "0xffff")]), HwCallbacks::silent()).is_err());
    }
}
