//! Text-mode video: an 80x24 cell framebuffer in a 4 KiB register window,
//! rendered through a 2560-byte 8x10 glyph ROM into an ARGB pixel surface.
//!
//! The host presentation layer is deliberately absent; the surface and the
//! dirty-flag/event-loop contract are the interface a host (SDL, VNC, a test)
//! consumes.

use std::fs::File;
use std::io::Read;
use std::sync::Mutex;

use crate::hardware::{
    config_u16, DeviceError, Hardware, HwCallbacks, HwConfig, HwFamily, MemOp, Region,
};

const DEVICE: &str = "video";

pub const COLUMNS: usize = 80;
pub const ROWS: usize = 24;
pub const CELLS: usize = COLUMNS * ROWS; // offsets [0..1919]

pub const GLYPH_WIDTH: usize = 8;
pub const GLYPH_HEIGHT: usize = 10;
pub const CHARMAP_SIZE: usize = GLYPH_HEIGHT * 256; // 2560 bytes

pub const SURFACE_WIDTH: usize = COLUMNS * GLYPH_WIDTH; // 640
pub const SURFACE_HEIGHT: usize = ROWS * GLYPH_HEIGHT * 2; // 480, line-doubled

const VIDEO_MEMORY_SIZE: usize = 4096;
const COLOR_REGISTER: u16 = 0x0FFE;
const MODE_REGISTER: u16 = 0x0FFF;

/// The fixed 16-entry palette, indexed by a colour-register nibble.
#[rustfmt::skip]
pub const PALETTE: [(u8, u8, u8); 16] = [
    (0xff, 0xff, 0xff), // 0: white
    (0xff, 0x00, 0x00), // 1: red
    (0x00, 0xff, 0x00), // 2: green
    (0x00, 0x00, 0xff), // 3: blue
    (0x00, 0xff, 0xff), // 4: cyan
    (0xff, 0x00, 0xff), // 5: magenta
    (0xff, 0xff, 0x00), // 6: yellow
    (0xa0, 0xa0, 0xa0), // 7: light gray
    (0x60, 0x60, 0x60), // 8: dark gray
    (0x7f, 0x00, 0x00), // 9: dark red
    (0x00, 0x7f, 0x00), // A: dark green
    (0x00, 0x00, 0x7f), // B: dark blue
    (0x00, 0x7f, 0x7f), // C: dark cyan
    (0xff, 0x00, 0x7f), // D: dark magenta
    (0x7f, 0x7f, 0x00), // E: dark yellow
    (0x00, 0x00, 0x00), // F: black
];

fn argb(rgb: (u8, u8, u8)) -> u32 {
    0xFF00_0000 | (rgb.0 as u32) << 16 | (rgb.1 as u32) << 8 | rgb.2 as u32
}

struct VideoState {
    vram: Vec<u8>,
    charmap: Vec<u8>,
    color_register: u8,
    mode_register: u8,
    dirty: bool,
    surface: Vec<u32>,
}

pub struct Video {
    regions: [Region; 1],
    base: u16,
    state: Mutex<VideoState>,
}

pub fn init(config: &HwConfig, _callbacks: HwCallbacks) -> Result<Box<dyn Hardware>, DeviceError> {
    Ok(Box::new(Video::from_config(config)?))
}

impl Video {
    pub fn from_config(config: &HwConfig) -> Result<Video, DeviceError> {
        let start = config_u16(config, DEVICE, "mem_start")?;
        let end = config_u16(config, DEVICE, "mem_end")?;

        let rom_path = config.get("video_rom").ok_or(DeviceError::MissingArg {
            device: DEVICE,
            key: "video_rom",
        })?;

        let mut charmap = vec![0u8; CHARMAP_SIZE];
        let mut rom = File::open(rom_path).map_err(|source| DeviceError::Io {
            device: DEVICE,
            source,
        })?;
        rom.read_exact(&mut charmap)
            .map_err(|source| DeviceError::Io {
                device: DEVICE,
                source,
            })?;

        Ok(Video {
            regions: [Region::rw(start, end)],
            base: start,
            state: Mutex::new(VideoState {
                vram: vec![0u8; VIDEO_MEMORY_SIZE],
                charmap,
                color_register: 0x0F, // white on black
                mode_register: 0,
                dirty: true,
                surface: vec![0u32; SURFACE_WIDTH * SURFACE_HEIGHT],
            }),
        })
    }
}

impl VideoState {
    /// Re-render every cell through the glyph ROM, line-doubled vertically.
    fn render(&mut self) {
        let fg = argb(PALETTE[(self.color_register >> 4) as usize]);
        let bg = argb(PALETTE[(self.color_register & 0x0F) as usize]);

        for row in 0..ROWS {
            for col in 0..COLUMNS {
                let code = self.vram[row * COLUMNS + col] as usize;
                for glyph_row in 0..GLYPH_HEIGHT {
                    let bits = self.charmap[code * GLYPH_HEIGHT + glyph_row];
                    let y = (row * GLYPH_HEIGHT + glyph_row) * 2;
                    for glyph_col in 0..GLYPH_WIDTH {
                        let lit = bits & (0x80 >> glyph_col) != 0;
                        let pixel = if lit { fg } else { bg };
                        let x = col * GLYPH_WIDTH + glyph_col;
                        self.surface[y * SURFACE_WIDTH + x] = pixel;
                        self.surface[(y + 1) * SURFACE_WIDTH + x] = pixel;
                    }
                }
            }
        }

        self.dirty = false;
    }
}

impl Video {
    /// Snapshot the rendered surface (tests and embedding hosts).
    pub fn surface(&self) -> Vec<u32> {
        self.state.lock().unwrap().surface.clone()
    }
}

impl Hardware for Video {
    fn family(&self) -> HwFamily {
        HwFamily::Video
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn memop(&self, addr: u16, op: MemOp, data: u8) -> u8 {
        let offset = addr - self.base;
        let mut state = self.state.lock().unwrap();

        match op {
            MemOp::Read => match offset {
                COLOR_REGISTER => state.color_register,
                MODE_REGISTER => state.mode_register,
                offset if (offset as usize) < CELLS => state.vram[offset as usize],
                _ => 0,
            },
            MemOp::Write => {
                match offset {
                    COLOR_REGISTER => {
                        state.color_register = data;
                        state.dirty = true;
                    }
                    MODE_REGISTER => {
                        state.mode_register = data;
                        state.dirty = true;
                    }
                    offset if (offset as usize) < CELLS => {
                        state.vram[offset as usize] = data;
                        state.dirty = true;
                    }
                    _ => {}
                }
                0
            }
        }
    }

    fn wants_eventloop(&self) -> bool {
        true
    }

    fn eventloop(&self, _blocking: bool) {
        let mut state = self.state.lock().unwrap();
        if state.dirty {
            state.render();
        }
    }

    fn describe(&self) -> String {
        format!("text video {}x{}", COLUMNS, ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_video() -> (Video, tempdir::RomFile) {
        let rom = tempdir::RomFile::new();
        let mut config = HwConfig::new();
        config.insert("mem_start".into(), "0xe000".into());
        config.insert("mem_end".into(), "0xefff".into());
        config.insert("video_rom".into(), rom.path.clone());
        (Video::from_config(&config).unwrap(), rom)
    }

    /// A throwaway glyph ROM on disk; glyph for code N is ten bytes of N.
    mod tempdir {
        use super::{CHARMAP_SIZE, GLYPH_HEIGHT};
        use std::fs::File;
        use std::io::Write;

        pub struct RomFile {
            pub path: String,
        }

        impl RomFile {
            pub fn new() -> RomFile {
                let path = std::env::temp_dir().join(format!(
                    "video-rom-test-{}.bin",
                    std::process::id()
                ));
                let mut file = File::create(&path).unwrap();
                let mut rom = vec![0u8; CHARMAP_SIZE];
                for (code, chunk) in rom.chunks_mut(GLYPH_HEIGHT).enumerate() {
                    chunk.fill(code as u8);
                }
                file.write_all(&rom).unwrap();
                RomFile {
                    path: path.to_string_lossy().into_owned(),
                }
            }
        }

        impl Drop for RomFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn cells_and_registers_read_back() {
        let (video, _rom) = test_video();
        video.memop(0xe000, MemOp::Write, b'A');
        assert_eq!(video.memop(0xe000, MemOp::Read, 0), b'A');

        video.memop(0xe000 + COLOR_REGISTER, MemOp::Write, 0x1F);
        assert_eq!(video.memop(0xe000 + COLOR_REGISTER, MemOp::Read, 0), 0x1F);

        video.memop(0xe000 + MODE_REGISTER, MemOp::Write, 1);
        assert_eq!(video.memop(0xe000 + MODE_REGISTER, MemOp::Read, 0), 1);
    }

    #[test]
    fn offsets_past_the_cells_read_zero() {
        let (video, _rom) = test_video();
        assert_eq!(video.memop(0xe000 + CELLS as u16, MemOp::Read, 0), 0);
        assert_eq!(video.memop(0xe000 + 0x0ffd, MemOp::Read, 0), 0);
    }

    #[test]
    fn eventloop_renders_dirty_cells() {
        let (video, _rom) = test_video();
        // Glyph 0xFF is all-ones rows: a solid foreground block.
        video.memop(0xe000, MemOp::Write, 0xFF);
        video.memop(0xe000 + COLOR_REGISTER, MemOp::Write, 0x0F); // white on black
        video.eventloop(false);

        let surface = video.surface();
        assert_eq!(surface[0], 0xFFFF_FFFF); // white pixel
        // A cell that still holds glyph 0 (all-zero rows) renders background.
        assert_eq!(surface[GLYPH_WIDTH], 0xFF00_0000); // black pixel
    }
}
