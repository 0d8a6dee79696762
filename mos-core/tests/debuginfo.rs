//! End-to-end: assemble a source file on disk, emit the artefacts, and load
//! the debug info back the way the debugger does.

use std::fs;
use std::path::PathBuf;

use mos_core::asm::emit::{emit, EmitOptions};
use mos_core::asm::assemble_str;
use mos_core::debuginfo::DebugInfo;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mos-asm-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn debug_info_round_trips_lines_and_symbols() {
    let source = "\
.org $0200
start:
lda #$01
sta $00
loop:
clc
adc #$01
bcc loop
";
    let dir = scratch_dir("dbg");
    let source_path = dir.join("prog.s");
    fs::write(&source_path, source).unwrap();

    let assembly = assemble_str(source, "prog.s").unwrap();
    let written = emit(
        &assembly,
        &source_path,
        &EmitOptions {
            hex: true,
            ..EmitOptions::default()
        },
    )
    .unwrap();

    // bin, hex, map and dbg all landed next to the source.
    assert!(written.iter().any(|p| p.extension().unwrap() == "bin"));
    assert!(written.iter().any(|p| p.extension().unwrap() == "hex"));
    assert!(written.iter().any(|p| p.extension().unwrap() == "map"));
    let dbg_path = dir.join("prog.dbg");
    assert!(dbg_path.exists());

    let mut info = DebugInfo::load(&dbg_path).unwrap();

    // Symbols resolve in both directions, case-insensitively.
    assert_eq!(info.lookup_symbol("start"), Some(0x0200));
    assert_eq!(info.lookup_symbol("LOOP"), Some(0x0204));
    assert_eq!(info.lookup_addr(0x0204), Some("loop"));
    assert_eq!(info.lookup_addr(0x0205), None);

    // Address records map instructions back to their source lines.
    assert_eq!(info.getline(0x0200).as_deref(), Some("lda #$01"));
    assert_eq!(info.getline(0x0204).as_deref(), Some("clc"));
    assert_eq!(info.getline(0x0207).as_deref(), Some("bcc loop"));
    assert_eq!(info.getline(0x0300), None);

    let bin = fs::read(dir.join("prog.bin")).unwrap();
    assert_eq!(bin[0], 0xa9);

    fs::remove_dir_all(&dir).ok();
}
