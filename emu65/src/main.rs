//! The emulator host process.
//!
//! The main thread owns the device event loop (some host toolkits insist on
//! main-thread pumping); the CPU runs on a second thread, driven either by
//! the stepwise protocol server (`-s`) or free-running.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use log::{error, info, LevelFilter};

use mos_core::config::EmulatorConfig;
use mos_core::cpu::Cpu;
use mos_core::memory::MemoryFabric;
use mos_core::stepwise::{Notifier, StepServer, DEFAULT_FIFO_BASE};

#[derive(Parser)]
#[command(name = "emu65", about = "6502 emulator")]
struct Args {
    /// Machine configuration file.
    #[arg(short = 'c', value_name = "config")]
    config: PathBuf,

    /// Start the stepwise-protocol server on the default fifo base path.
    #[arg(short = 's')]
    step: bool,

    /// Verbosity, 0 (errors only) to 4 (trace).
    #[arg(short = 'd', value_name = "level", default_value_t = 2)]
    debug: u8,
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

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    simple_logger::SimpleLogger::new()
        .with_level(level_filter(args.debug))
        .init()
        .expect("logger init");

    let config = EmulatorConfig::load(&args.config)
        .with_context(|| format!("cannot load config {}", args.config.display()))?;

    // The protocol channel opens before devices load so init-time hardware
    // notifications (pty paths) reach the debugger.
    let fifo_base = PathBuf::from(DEFAULT_FIFO_BASE);
    let (server, notifier) = if args.step {
        let server = StepServer::open(&fifo_base).context("opening debug fifos")?;
        let notifier = Notifier::open(&fifo_base).context("opening async fifo")?;
        (Some(server), notifier)
    } else {
        (None, Notifier::disabled())
    };

    let mut fabric = MemoryFabric::new(notifier.callbacks());

    info!("loading memory");
    for (name, block) in &config.memory {
        info!("found memory element: {}", name);
        fabric
            .load_module(&block.module, &block.args)
            .with_context(|| format!("initializing memory element '{}'", name))?;
    }

    for device in fabric.devices() {
        notifier.notify_text(&device.describe());
    }

    let fabric = Arc::new(fabric);
    let mut cpu = Cpu::new();
    cpu.reset(fabric.as_ref());

    let running = Arc::new(AtomicBool::new(true));

    let cpu_thread = {
        let fabric = Arc::clone(&fabric);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("cpu".into())
            .spawn(move || {
                if let Some(mut server) = server {
                    if let Err(e) = server.run(&mut cpu, fabric.as_ref()) {
                        error!("stepwise server failed: {}", e);
                    }
                } else {
                    free_run(&mut cpu, fabric.as_ref(), &running);
                }
                running.store(false, Ordering::SeqCst);
            })
            .context("spawning cpu thread")?
    };

    while running.load(Ordering::SeqCst) {
        fabric.run_eventloop();
    }

    cpu_thread.join().ok();
    Ok(())
}

/// Execute until the program jams. Without the debugger attached this is
/// the whole show; devices keep their own threads.
fn free_run(cpu: &mut Cpu, fabric: &MemoryFabric, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        if let Err(e) = cpu.execute(fabric) {
            error!("{}", e);
            return;
        }
    }
}
