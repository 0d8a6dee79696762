//! The memory fabric: routes 8-bit reads and writes to registered devices
//! and fans the host event-loop tick out to the devices that asked for it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error};

use crate::hardware::{
    acia6551, ram, skeleton, uart16550, video, DeviceError, Hardware, HwCallbacks, HwConfig,
    MemOp,
};

/// What the CPU engine sees: a flat 16-bit address space.
///
/// Implementations use interior mutability; the engine and the protocol
/// server share one fabric by reference.
pub trait Bus {
    fn read8(&self, addr: u16) -> u8;
    fn write8(&self, addr: u16, data: u8);

    /// Read a 16-bit little-endian word.
    fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read8(addr);
        let hi = self.read8(addr.wrapping_add(1));
        (hi as u16) << 8 | lo as u16
    }

    /// Level-triggered IRQ line, ORed across devices.
    fn irq_asserted(&self) -> bool {
        false
    }

    /// Edge-triggered NMI: returns true at most once per assertion.
    fn take_nmi(&self) -> bool {
        false
    }
}

type Factory = fn(&HwConfig, HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError>;

/// The compile-time module registry. The configuration selects devices by
/// these names; adding a device means adding a line here, the fabric itself
/// never changes.
fn module_factory(module: &str) -> Option<Factory> {
    Some(match module {
        "ram" => ram::init,
        "uart-16550" => uart16550::init,
        "acia-6551" => acia6551::init,
        "video" => video::init,
        "skeleton" => skeleton::init,
        _ => return None,
    })
}

pub struct MemoryFabric {
    /// Registered devices, newest first: the head of the list shadows older
    /// devices on overlapping ranges. Mutated only during startup.
    devices: Vec<Arc<dyn Hardware>>,
    callbacks: HwCallbacks,
}

impl MemoryFabric {
    pub fn new(callbacks: HwCallbacks) -> MemoryFabric {
        MemoryFabric {
            devices: Vec::new(),
            callbacks,
        }
    }

    /// Instantiate `module` with `config` and register it at the head of
    /// the dispatch list. Any factory failure is fatal to startup.
    pub fn load_module(&mut self, module: &str, config: &HwConfig) -> Result<(), DeviceError> {
        debug!("loading module {}", module);

        let factory =
            module_factory(module).ok_or_else(|| DeviceError::UnknownModule(module.into()))?;
        let device = factory(config, self.callbacks.clone())?;

        for region in device.regions() {
            debug!(
                "loaded {} at ${:04x} - ${:04x} read: {} write: {}",
                module, region.start, region.end, region.readable, region.writable
            );
        }

        self.devices.insert(0, Arc::from(device));
        Ok(())
    }

    /// Register an already-built device (tests, embedders).
    pub fn register(&mut self, device: Box<dyn Hardware>) {
        self.devices.insert(0, Arc::from(device));
    }

    pub fn devices(&self) -> &[Arc<dyn Hardware>] {
        &self.devices
    }

    fn eventloop_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|device| device.wants_eventloop())
            .count()
    }

    /// One turn of the host event loop. With a single waiting device the
    /// callback may block; with several, all run non-blocking; with none,
    /// sleep briefly rather than spin.
    pub fn run_eventloop(&self) {
        let count = self.eventloop_count();

        if count == 0 {
            thread::sleep(Duration::from_millis(100));
            return;
        }

        for device in &self.devices {
            if device.wants_eventloop() {
                device.eventloop(count == 1);
            }
        }
    }
}

impl Bus for MemoryFabric {
    fn read8(&self, addr: u16) -> u8 {
        for device in &self.devices {
            for region in device.regions() {
                if region.accepts(addr, MemOp::Read) {
                    return device.memop(addr, MemOp::Read, 0);
                }
            }
        }

        error!("no readable memory at ${:04x}", addr);
        0
    }

    fn write8(&self, addr: u16, data: u8) {
        for device in &self.devices {
            for region in device.regions() {
                if region.accepts(addr, MemOp::Write) {
                    device.memop(addr, MemOp::Write, data);
                    return;
                }
            }
        }

        error!("no writable memory at ${:04x}", addr);
    }

    fn irq_asserted(&self) -> bool {
        self.devices.iter().any(|device| device.irq_asserted())
    }

    fn take_nmi(&self) -> bool {
        let mut asserted = false;
        for device in &self.devices {
            if device.nmi_asserted() {
                device.clear_nmi();
                asserted = true;
            }
        }
        asserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HwFamily, Region};
    use std::sync::Mutex;

    /// A one-region device that always answers with a fixed byte and
    /// remembers the last write.
    struct Fixed {
        regions: [Region; 1],
        answer: u8,
        last_write: Mutex<Option<(u16, u8)>>,
    }

    impl Fixed {
        fn boxed(start: u16, end: u16, answer: u8) -> Box<Fixed> {
            Box::new(Fixed {
                regions: [Region::rw(start, end)],
                answer,
                last_write: Mutex::new(None),
            })
        }
    }

    impl Hardware for Fixed {
        fn family(&self) -> HwFamily {
            HwFamily::Other
        }
        fn regions(&self) -> &[Region] {
            &self.regions
        }
        fn memop(&self, addr: u16, op: MemOp, data: u8) -> u8 {
            match op {
                MemOp::Read => self.answer,
                MemOp::Write => {
                    *self.last_write.lock().unwrap() = Some((addr, data));
                    0
                }
            }
        }
        fn describe(&self) -> String {
            "fixed test device".into()
        }
    }

    #[test]
    fn dispatch_hits_the_owning_device() {
        let mut fabric = MemoryFabric::new(HwCallbacks::silent());
        fabric.register(Fixed::boxed(0x1000, 0x1fff, 0xaa));
        fabric.register(Fixed::boxed(0x2000, 0x2fff, 0xbb));

        assert_eq!(fabric.read8(0x1000), 0xaa);
        assert_eq!(fabric.read8(0x2abc), 0xbb);
    }

    #[test]
    fn dispatch_misses_read_zero() {
        let fabric = MemoryFabric::new(HwCallbacks::silent());
        assert_eq!(fabric.read8(0x4242), 0);
        // A miss on write is dropped, not fatal.
        fabric.write8(0x4242, 0xff);
    }

    #[test]
    fn newer_device_shadows_the_overlap() {
        let mut fabric = MemoryFabric::new(HwCallbacks::silent());
        fabric.register(Fixed::boxed(0x0000, 0xffff, 0x11));
        fabric.register(Fixed::boxed(0x8000, 0x8fff, 0x22));

        assert_eq!(fabric.read8(0x0100), 0x11);
        assert_eq!(fabric.read8(0x8123), 0x22);
        assert_eq!(fabric.read8(0x9000), 0x11);
    }

    #[test]
    fn unknown_module_is_an_error() {
        let mut fabric = MemoryFabric::new(HwCallbacks::silent());
        let config = HwConfig::new();
        assert!(fabric.load_module("warp-drive", &config).is_err());
    }
}
