//! Empty template for new devices. Copy this file, register a factory name
//! in the memory fabric's module registry, and fill in the memop.

use std::sync::Mutex;

use crate::hardware::{
    config_u16, DeviceError, Hardware, HwCallbacks, HwConfig, HwFamily, MemOp, Region,
};

const DEVICE: &str = "skeleton";

#[derive(Default)]
struct SkeletonState {}

pub struct Skeleton {
    regions: [Region; 1],
    #[allow(dead_code)]
    state: Mutex<SkeletonState>,
}

pub fn init(config: &HwConfig, _callbacks: HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError> {
    let start = config_u16(config, DEVICE, "mem_start")?;
    let end = config_u16(config, DEVICE, "mem_end")?;

    Ok(Box::new(Skeleton {
        regions: [Region::rw(start, end)],
        state: Mutex::new(SkeletonState::default()),
    }))
}

impl Hardware for Skeleton {
    fn family(&self) -> HwFamily {
        HwFamily::Io
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn memop(&self, _addr: u16, _op: MemOp, _data: u8) -> u8 {
        0
    }

    fn describe(&self) -> String {
        "skeleton device".into()
    }
}
