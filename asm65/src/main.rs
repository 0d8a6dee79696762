//! The assembler CLI: parse, resolve, encode, and emit the artefact set.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::LevelFilter;

use mos_core::asm::emit::{emit, EmitOptions};
use mos_core::asm::{assemble_str, render_diagnostic, AsmError};

#[derive(Parser)]
#[command(
    name = "asm65",
    about = "6502 assembler",
    disable_help_flag = true
)]
struct Args {
    /// Verbosity, 0 (errors only) to 4 (trace).
    #[arg(short = 'd', value_name = "level", default_value_t = 2)]
    debug: u8,

    /// Split the binary into per-island files on large gaps.
    #[arg(short = 's')]
    split: bool,

    /// Do not write the map file.
    #[arg(short = 'm')]
    no_map: bool,

    /// Do not write the binary file.
    #[arg(short = 'b')]
    no_bin: bool,

    /// Write Intel HEX output.
    #[arg(short = 'h')]
    hex: bool,

    #[arg(long, action = ArgAction::Help, help = "Print help")]
    help: Option<bool>,

    /// Source file to assemble.
    file: PathBuf,
}

fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    simple_logger::SimpleLogger::new()
        .with_level(level_filter(args.debug))
        .init()
        .expect("logger init");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let display_name = args.file.display().to_string();

    let assembly = match assemble_str(&source, &display_name) {
        Ok(assembly) => assembly,
        Err(error) => {
            // Source-located failures get context lines; the exit status
            // tells scripts the assembly failed and nothing was emitted.
            if let Some(line) = error_line(&error) {
                eprint!("{}", render_diagnostic(&source, line, &error.to_string()));
                anyhow::bail!("assembly failed");
            }
            return Err(error.into());
        }
    };

    let options = EmitOptions {
        bin: !args.no_bin,
        map: !args.no_map,
        hex: args.hex,
        split: args.split,
        ..EmitOptions::default()
    };

    emit(&assembly, &args.file, &options).context("emitting output")?;
    Ok(())
}

fn error_line(error: &AsmError) -> Option<u32> {
    match error {
        AsmError::Parse { line, .. }
        | AsmError::Unresolved { line, .. }
        | AsmError::BranchOutOfRange { line, .. }
        | AsmError::Width { line, .. }
        | AsmError::IllegalMode { line, .. } => Some(*line),
        AsmError::Overlap { .. } | AsmError::Io(_) => None,
    }
}
