//! The emulator configuration: a TOML tree with one top-level `memory`
//! table of named sections, each selecting a device module and its args.
//!
//! ```toml
//! [memory.ram0]
//! module = "ram"
//! [memory.ram0.args]
//! mem_start = "0x0000"
//! mem_end   = "0x7fff"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::hardware::HwConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
pub struct EmulatorConfig {
    /// Named memory sections; devices register in section-name order, and
    /// later registrations shadow earlier ones on overlapping ranges.
    #[serde(default)]
    pub memory: BTreeMap<String, MemoryBlock>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryBlock {
    /// Module identifier resolved through the fabric's registry.
    pub module: String,
    #[serde(default)]
    pub args: HwConfig,
}

impl EmulatorConfig {
    pub fn load(path: &Path) -> Result<EmulatorConfig, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_sections() {
        let config: EmulatorConfig = toml::from_str(
            r#"
            [memory.ram0]
            module = "ram"
            [memory.ram0.args]
            mem_start = "0x0000"
            mem_end = "0x7fff"

            [memory.rom0]
            module = "ram"
            [memory.rom0.args]
            mem_start = "0x8000"
            mem_end = "0xffff"
            is_rom = "yes"
            "#,
        )
        .unwrap();

        assert_eq!(config.memory.len(), 2);
        let ram0 = &config.memory["ram0"];
        assert_eq!(ram0.module, "ram");
        assert_eq!(ram0.args["mem_start"], "0x0000");
        assert_eq!(config.memory["rom0"].args["is_rom"], "yes");
    }

    #[test]
    fn memory_is_optional() {
        let config: EmulatorConfig = toml::from_str("").unwrap();
        assert!(config.memory.is_empty());
    }
}
