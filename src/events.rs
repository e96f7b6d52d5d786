//! Event plumbing: everything the main loop multiplexes.
//!
//! Producers are detached threads (host stdin, one PTY reader per live
//! child, the signal listener); the consumer is the single controller
//! loop. Producers never touch application state.

use std::io::{self, Read};
use std::sync::mpsc::Sender;
use std::thread;

#[derive(Debug)]
pub enum AppEvent {
    /// Raw bytes from the host terminal.
    Stdin(Vec<u8>),
    /// Output from a command's PTY. `generation` identifies the run; a
    /// restarted command ignores events from its previous PTY.
    PtyData {
        index: usize,
        generation: u64,
        chunk: String,
    },
    /// The PTY reached end of file: the child is gone or going.
    PtyEof { index: usize, generation: u64 },
    /// SIGHUP/SIGINT/SIGTERM: treat like kill-all.
    KillSignal,
    /// The host terminal was resized.
    Resize,
}

/// Read host stdin in a detached thread. The thread dies with the process
/// (reads block and cannot be interrupted portably).
pub fn spawn_stdin_reader(tx: Sender<AppEvent>) {
    thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(AppEvent::Stdin(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// Deliver fatal signals and window resizes into the event channel.
#[cfg(unix)]
pub fn spawn_signal_listener(tx: Sender<AppEvent>) {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGWINCH};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGHUP, SIGINT, SIGTERM, SIGWINCH]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!("failed to install signal handlers: {e}");
            return;
        }
    };
    thread::spawn(move || {
        for signal in signals.forever() {
            let event = if signal == SIGWINCH {
                AppEvent::Resize
            } else {
                AppEvent::KillSignal
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    });
}

/// On Windows, Ctrl+C arrives as a raw stdin byte in raw mode and resizes
/// are picked up by the controller tick.
#[cfg(not(unix))]
pub fn spawn_signal_listener(_tx: Sender<AppEvent>) {}
