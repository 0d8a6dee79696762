//! The remote TUI debugger: attaches to a running emulator over the
//! three-fifo stepwise channel, or launches one itself with `-e`.

mod app;
mod store;
mod transport;
mod ui;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use termion::event::Key;
use termion::input::TermRead;
use termion::raw::IntoRawMode;
use tui::backend::TermionBackend;
use tui::Terminal;

use mos_core::stepwise::{fifo_path, DEFAULT_FIFO_BASE};

use app::{App, DisplayMode};
use transport::{is_writable, Transport};

#[derive(Parser)]
#[command(name = "dbg65", about = "remote 6502 debugger")]
struct Args {
    /// Emulator binary to launch when the channel is not live.
    #[arg(short = 'e', value_name = "emu-path", default_value = "emu65")]
    emulator: String,

    /// Emulator machine config; implies launching the emulator.
    #[arg(short = 'c', value_name = "config")]
    config: Option<PathBuf>,

    /// Startup script of newline-delimited debugger commands.
    #[arg(short = 's', value_name = "script")]
    script: Option<PathBuf>,

    /// Base path of the fifo triple.
    #[arg(short = 'b', value_name = "fifo-base", default_value = DEFAULT_FIFO_BASE)]
    base: PathBuf,
}

/// Launch the emulator and wait up to two seconds for its command fifo to
/// come alive. The child is killed again if the fifo never shows up.
fn start_emulator(emulator: &str, config: &Path, cmd_path: &Path) -> anyhow::Result<Child> {
    let mut child = ProcessCommand::new(emulator)
        .arg("-c")
        .arg(config)
        .arg("-s")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("cannot start {}", emulator))?;

    for _ in 0..20 {
        if is_writable(cmd_path) {
            return Ok(child);
        }
        thread::sleep(Duration::from_millis(100));
    }

    child.kill().ok();
    child.wait().ok();
    bail!(
        "command fifo {} did not become writable",
        cmd_path.display()
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cmd_path = fifo_path(&args.base, "-cmd");
    let mut emulator_child = None;

    if !is_writable(&cmd_path) {
        match &args.config {
            Some(config) => {
                emulator_child = Some(start_emulator(&args.emulator, config, &cmd_path)?);
            }
            None => bail!("emulator not running (use -c <config> to start one)"),
        }
    }

    let transport = Transport::attach(&args.base).context("attaching to emulator")?;

    let mut app = App::new(transport);
    app.emulator = emulator_child;
    app.logln(format!("Remote caps: ${:04x}", app.transport.caps));
    app.drain_async();
    app.refresh_regs();

    // The startup script runs before the interactive loop, echoed into the
    // command pane.
    if let Some(script) = &args.script {
        let text = fs::read_to_string(script)
            .with_context(|| format!("cannot read script {}", script.display()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            app.logln(format!("> {}", line));
            app.process_command(line);
        }
    }

    let result = run_tui(&mut app);

    // Shut the session down whether or not the TUI survived.
    app.transport.stop();
    if let Some(mut child) = app.emulator.take() {
        child.kill().ok();
        child.wait().ok();
    }

    result
}

fn run_tui(app: &mut App) -> anyhow::Result<()> {
    let stdout = io::stdout().into_raw_mode().context("entering raw mode")?;
    let backend = TermionBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Keystrokes arrive over a channel so the free-run loop can poll them
    // without blocking.
    let (key_tx, key_rx) = mpsc::channel();
    thread::spawn(move || {
        for key in io::stdin().keys().flatten() {
            if key_tx.send(key).is_err() {
                return;
            }
        }
    });

    while !app.quit {
        terminal.draw(|frame| ui::draw(frame, app))?;
        app.drain_async();

        if app.running {
            // Aggregate steps while watching for the interrupt key.
            match key_rx.try_recv() {
                Ok(Key::Char('\n')) => {
                    app.running = false;
                    app.logln("Stopped");
                }
                Ok(_) | Err(mpsc::TryRecvError::Empty) => {
                    for _ in 0..32 {
                        if !app.running {
                            break;
                        }
                        app.step();
                    }
                }
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
            continue;
        }

        match key_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(key) => handle_key(app, key),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    terminal.clear()?;
    Ok(())
}

fn handle_key(app: &mut App, key: Key) {
    match key {
        Key::Char('\n') => {
            let line = std::mem::take(&mut app.input);
            let line = line.trim().to_string();
            if !line.is_empty() {
                app.logln(format!("> {}", line));
                app.process_command(&line);
            }
        }
        Key::Char('\t') => {
            app.display_mode = match app.display_mode {
                DisplayMode::Dump => DisplayMode::Disasm,
                DisplayMode::Disasm => DisplayMode::Watch,
                DisplayMode::Watch => DisplayMode::Dump,
            };
        }
        Key::F(1) => app.display_mode = DisplayMode::Disasm,
        Key::F(2) => app.display_mode = DisplayMode::Dump,
        Key::Backspace => {
            app.input.pop();
        }
        Key::Ctrl('c') => app.quit = true,
        Key::Char(c) => app.input.push(c),
        _ => {}
    }
}
