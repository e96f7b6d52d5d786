//! run-pty - run several commands concurrently under pseudo-terminals.
//!
//! One host terminal is the window onto exactly one child at a time, plus
//! a dashboard listing all of them. Ctrl+Z switches to the dashboard,
//! labels and mouse clicks focus a command, Ctrl+C kills.

use std::io::{self, Write};
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use crossterm::tty::IsTty;

mod ansi;
mod command;
mod config;
mod controller;
mod errors;
mod events;
mod input;
mod labels;
mod ui;

use config::ParsedArgs;
use controller::Controller;
use errors::AppResult;
use ui::Theme;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let descriptions = match config::parse_args(&args) {
        Ok(ParsedArgs::Help) => {
            print!("{}", config::help_text());
            return ExitCode::SUCCESS;
        }
        Ok(ParsedArgs::NoCommands) => return ExitCode::SUCCESS,
        Ok(ParsedArgs::Commands(descriptions)) => descriptions,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if !io::stdin().is_tty() {
        eprintln!("run-pty must be run in a terminal.");
        return ExitCode::FAILURE;
    }

    let _log_guard = init_logging();

    match run(descriptions) {
        Ok(code) => ExitCode::from(code.clamp(0, u8::MAX as i32) as u8),
        Err(e) => {
            // The fatal path: no recovery, but never leave orphans or a
            // broken terminal behind.
            command::force_kill_all_registered();
            let _ = restore_terminal();
            tracing::error!("fatal: {e}");
            eprintln!("run-pty: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(descriptions: Vec<config::CommandDescription>) -> AppResult<i32> {
    let theme = Theme::from_env();
    let (tx, rx) = mpsc::channel();

    setup_terminal()?;
    setup_panic_hook();
    events::spawn_stdin_reader(tx.clone());
    events::spawn_signal_listener(tx.clone());

    let mut controller = Controller::new(descriptions, theme, tx);
    let result = controller.run(&rx);

    if let Err(e) = restore_terminal() {
        tracing::warn!("failed to restore terminal: {e}");
    }
    result
}

/// Raw mode so every keystroke reaches the input router; bracketed paste
/// off so pastes arrive as plain bytes for the focused child.
fn setup_terminal() -> io::Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.write_all(ansi::DISABLE_BRACKETED_PASTE.as_bytes())?;
    stdout.flush()
}

fn restore_terminal() -> io::Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.write_all(
        format!(
            "{}{}{}{}",
            ansi::SHOW_CURSOR,
            ansi::DISABLE_MOUSE,
            ansi::DISABLE_BRACKETED_PASTE,
            ansi::RESET_COLOR
        )
        .as_bytes(),
    )?;
    stdout.flush()
}

/// Restore the terminal and hard-kill the children before reporting a
/// panic; the default hook would print into a raw-mode screen.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        command::force_kill_all_registered();
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

/// Opt-in file logging: the terminal belongs to the children, so
/// diagnostics only ever go to the file named by `RUN_PTY_LOG`.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let path = PathBuf::from(std::env::var_os("RUN_PTY_LOG")?);
    let file_name = path.file_name()?.to_os_string();
    let dir = match path.parent() {
        Some(parent) if parent != std::path::Path::new("") => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUN_PTY_LOG_FILTER")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
