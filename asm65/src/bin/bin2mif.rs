//! Convert a raw binary image into a memory-initialization listing for
//! seeding HDL block memory: one byte per line, hex by default or binary
//! digits with `-b`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bin2mif", about = "binary to memory-init file converter")]
struct Args {
    /// Emit each byte as eight binary digits instead of hex.
    #[arg(short = 'b')]
    binary: bool,

    input: PathBuf,
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let bytes = fs::read(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let out = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut out = BufWriter::new(out);

    for byte in bytes {
        if args.binary {
            writeln!(out, "{:08b}", byte)?;
        } else {
            writeln!(out, "{:02X}", byte)?;
        }
    }

    out.flush()?;
    Ok(())
}
