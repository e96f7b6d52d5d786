//! One running (or exited) child command: its PTY, scrollback, status
//! state machine and status-rule evaluation.

use std::io::{Read, Write};
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use tracing::{debug, warn};

use crate::ansi;
use crate::config::{CommandDescription, Indicator, StatusRule, presentation_name};
use crate::errors::{AppError, AppResult};
use crate::events::AppEvent;
use crate::ui::Theme;
use crate::ui::focused::history_start;

/// Default per-command scrollback cap in bytes.
pub const DEFAULT_MAX_HISTORY: usize = 1_000_000;

/// A second Ctrl+C within this window escalates to a hard kill.
pub const DOUBLE_PRESS_WINDOW: Duration = Duration::from_millis(500);

/// A kill still pending after this long is "slow" and gets its own UI.
pub const SLOW_KILL_DELAY: Duration = Duration::from_millis(100);

/// Scrollback cap, overridable via `RUN_PTY_MAX_HISTORY`.
pub fn max_history_from_env() -> usize {
    parse_max_history(std::env::var("RUN_PTY_MAX_HISTORY").ok())
}

fn parse_max_history(value: Option<String>) -> usize {
    value
        .and_then(|s| s.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(DEFAULT_MAX_HISTORY)
}

/// Pids of live children, for the force-kill sweep on fatal faults.
static LIVE_PIDS: Mutex<Vec<u32>> = Mutex::new(Vec::new());

fn register_live_pid(pid: u32) {
    if let Ok(mut pids) = LIVE_PIDS.lock() {
        pids.push(pid);
    }
}

fn unregister_live_pid(pid: u32) {
    if let Ok(mut pids) = LIVE_PIDS.lock() {
        pids.retain(|p| *p != pid);
    }
}

/// SIGKILL (or the native equivalent) a single process.
pub fn force_kill_pid(pid: u32) {
    #[cfg(unix)]
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
    #[cfg(windows)]
    unsafe {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if !handle.is_null() {
            TerminateProcess(handle, 1);
            CloseHandle(handle);
        }
    }
}

/// The fatal-fault sweep: hard-kill every child that has not exited yet.
pub fn force_kill_all_registered() {
    if let Ok(mut pids) = LIVE_PIDS.lock() {
        for pid in pids.drain(..) {
            force_kill_pid(pid);
        }
    }
}

/// The live endpoints of one spawned child.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn portable_pty::Child + Send>,
    pub pid: Option<u32>,
}

impl PtyHandle {
    fn write_bytes(&mut self, bytes: &[u8]) {
        // The child may be mid-exit; a failed write is not actionable.
        let _ = self.writer.write_all(bytes);
        let _ = self.writer.flush();
    }

    fn force_kill(&mut self) {
        match self.pid {
            Some(pid) => force_kill_pid(pid),
            None => {
                let _ = self.child.kill();
            }
        }
    }

    fn resize(&self, cols: u16, rows: u16) {
        let _ = self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle").field("pid", &self.pid).finish()
    }
}

/// The command lifecycle. Exactly one live PTY while running or killing,
/// none after exit.
#[derive(Debug)]
pub enum CommandStatus {
    Running {
        pty: PtyHandle,
    },
    Killing {
        pty: PtyHandle,
        /// The kill has outlived [`SLOW_KILL_DELAY`].
        slow: bool,
        /// When the kill began; doubles as the first "press" for the
        /// double-press escalation window.
        killed_at: Instant,
        last_kill_press: Option<Instant>,
    },
    Exit {
        code: u32,
    },
}

impl CommandStatus {
    fn name(&self) -> &'static str {
        match self {
            CommandStatus::Running { .. } => "running",
            CommandStatus::Killing { .. } => "killing",
            CommandStatus::Exit { .. } => "exit",
        }
    }
}

pub struct Command {
    pub index: usize,
    pub label: Option<char>,
    pub title: String,
    pub title_no_sgr: String,
    /// `title: command`, or just the command when the title adds nothing.
    pub title_with_command: String,
    pub cwd: String,
    command: Vec<String>,
    status_rules: Vec<StatusRule>,
    default_status: Option<Indicator>,
    pub status: CommandStatus,
    pub status_from_rules: Option<Indicator>,
    /// Primary-screen scrollback, capped at `max_history` bytes.
    pub history: String,
    /// Output received while on the alternate screen; cleared on every
    /// screen toggle and on restart.
    pub history_alternate_screen: String,
    /// False from the first complete non-SGR escape until restart.
    pub is_simple_log: bool,
    pub is_on_alternate_screen: bool,
    generation: u64,
    max_history: usize,
    theme: Theme,
    tx: Sender<AppEvent>,
}

impl Command {
    pub fn new(
        index: usize,
        description: CommandDescription,
        max_history: usize,
        theme: Theme,
        tx: Sender<AppEvent>,
    ) -> Self {
        let CommandDescription {
            title,
            cwd,
            command,
            status_rules,
            default_status,
        } = description;
        let presentation = presentation_name(&command);
        let title_with_command = if title == presentation {
            presentation
        } else {
            format!("{title}: {presentation}")
        };
        Self {
            index,
            label: crate::labels::label(index),
            title_no_sgr: ansi::strip_sgr(&title),
            title,
            title_with_command,
            cwd,
            command,
            status_rules,
            status_from_rules: default_status.clone(),
            default_status,
            status: CommandStatus::Exit { code: 0 },
            history: String::new(),
            history_alternate_screen: String::new(),
            is_simple_log: true,
            is_on_alternate_screen: false,
            generation: 0,
            max_history,
            theme,
            tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.status {
            CommandStatus::Running { pty } | CommandStatus::Killing { pty, .. } => pty.pid,
            CommandStatus::Exit { .. } => None,
        }
    }

    pub fn is_exited(&self) -> bool {
        matches!(self.status, CommandStatus::Exit { .. })
    }

    /// Spawn the child. Precondition: the command has exited (commands are
    /// constructed in the exited state, so this also covers startup).
    pub fn start(&mut self, cols: u16, rows: u16) -> AppResult<()> {
        if !self.is_exited() {
            return Err(AppError::InvalidTransition {
                action: "start",
                state: self.status.name(),
            });
        }

        let header = history_start(&self.title, &self.title_with_command, &self.cwd, &self.theme);
        #[cfg(windows)]
        let header_lines = header.lines().count();
        self.history = header;
        self.history_alternate_screen.clear();
        self.is_simple_log = true;
        self.is_on_alternate_screen = false;
        self.status_from_rules = self.default_status.clone();
        self.generation += 1;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AppError::Pty(e.to_string()))?;

        let mut builder = CommandBuilder::new(&self.command[0]);
        builder.args(&self.command[1..]);
        builder.cwd(&self.cwd);
        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| AppError::Pty(e.to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AppError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AppError::Pty(e.to_string()))?;
        let pid = child.process_id();
        if let Some(pid) = pid {
            register_live_pid(pid);
        }
        debug!(command = %self.title_no_sgr, ?pid, "spawned");

        let pty = PtyHandle {
            master: pair.master,
            writer,
            child,
            pid,
        };

        let tx = self.tx.clone();
        let index = self.index;
        let generation = self.generation;
        thread::spawn(move || {
            let mut reader = reader;
            let mut buf = [0u8; 8192];
            let mut carry = Vec::new();
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = ansi::decode_chunk(&mut carry, &buf[..n]);
                        if !chunk.is_empty()
                            && tx
                                .send(AppEvent::PtyData {
                                    index,
                                    generation,
                                    chunk,
                                })
                                .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(AppEvent::PtyEof { index, generation });
        });

        self.status = CommandStatus::Running { pty };

        // ConPTY inherits the host cursor; answer the child's implied
        // cursor query with the row the header left it on, so the first
        // output rows don't overwrite the header.
        #[cfg(windows)]
        if let CommandStatus::Running { pty } = &mut self.status {
            pty.write_bytes(format!("\x1b[{header_lines};1R").as_bytes());
        }

        Ok(())
    }

    /// Request the child's death. First call sends Ctrl+C; while killing,
    /// another call within [`DOUBLE_PRESS_WINDOW`] of the previous press
    /// escalates to a hard kill, otherwise it sends Ctrl+C again.
    pub fn kill(&mut self) -> AppResult<()> {
        let now = Instant::now();
        let status = std::mem::replace(&mut self.status, CommandStatus::Exit { code: 0 });
        match status {
            CommandStatus::Running { mut pty } => {
                debug!(command = %self.title_no_sgr, "killing");
                pty.write_bytes(&[ansi::CTRL_C]);
                self.status = CommandStatus::Killing {
                    pty,
                    slow: false,
                    killed_at: now,
                    last_kill_press: None,
                };
                Ok(())
            }
            CommandStatus::Killing {
                mut pty,
                slow,
                killed_at,
                last_kill_press,
            } => {
                let previous = last_kill_press.unwrap_or(killed_at);
                if now.duration_since(previous) < DOUBLE_PRESS_WINDOW {
                    debug!(command = %self.title_no_sgr, "force killing");
                    pty.force_kill();
                } else {
                    pty.write_bytes(&[ansi::CTRL_C]);
                }
                self.status = CommandStatus::Killing {
                    pty,
                    slow,
                    killed_at,
                    last_kill_press: Some(now),
                };
                Ok(())
            }
            CommandStatus::Exit { code } => {
                self.status = CommandStatus::Exit { code };
                Err(AppError::InvalidTransition {
                    action: "kill",
                    state: "exit",
                })
            }
        }
    }

    /// The operator typed into a killing command: they changed their mind.
    pub fn resume(&mut self) {
        let status = std::mem::replace(&mut self.status, CommandStatus::Exit { code: 0 });
        self.status = match status {
            CommandStatus::Killing { pty, .. } => CommandStatus::Running { pty },
            other => other,
        };
    }

    /// Flip the slow-kill flag once the deadline has passed. Returns true
    /// when a cosmetic redraw is due.
    pub fn tick_slow_kill(&mut self, now: Instant) -> bool {
        if let CommandStatus::Killing {
            slow, killed_at, ..
        } = &mut self.status
            && !*slow
            && now.duration_since(*killed_at) >= SLOW_KILL_DELAY
        {
            *slow = true;
            return true;
        }
        false
    }

    /// Poll the child for its exit status. Non-blocking; the controller
    /// retries on subsequent ticks until the status is available.
    pub fn try_finish(&mut self) -> Option<u32> {
        match &mut self.status {
            CommandStatus::Running { pty } | CommandStatus::Killing { pty, .. } => {
                match pty.child.try_wait() {
                    Ok(Some(status)) => {
                        let code = status.exit_code();
                        if let Some(pid) = pty.pid {
                            unregister_live_pid(pid);
                        }
                        debug!(command = %self.title_no_sgr, code, "exited");
                        self.status = CommandStatus::Exit { code };
                        Some(code)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(command = %self.title_no_sgr, "try_wait failed: {e}");
                        if let Some(pid) = pty.pid {
                            unregister_live_pid(pid);
                        }
                        self.status = CommandStatus::Exit { code: 1 };
                        Some(1)
                    }
                }
            }
            CommandStatus::Exit { code } => Some(*code),
        }
    }

    /// Forward operator keystrokes to the child.
    pub fn write_input(&mut self, bytes: &[u8]) {
        if let CommandStatus::Running { pty } | CommandStatus::Killing { pty, .. } =
            &mut self.status
        {
            pty.write_bytes(bytes);
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        if let CommandStatus::Running { pty } | CommandStatus::Killing { pty, .. } = &self.status {
            pty.resize(cols, rows);
        }
    }

    /// Consume one output chunk: update the rule status, the simple-log
    /// and alternate-screen flags, and append to the right scrollback
    /// buffer. Returns true when the rule status changed.
    pub fn push_history(&mut self, chunk: &str) -> bool {
        let changed = self.update_status_from_rules(chunk);

        if self.is_simple_log && ansi::not_simple_log(chunk) {
            self.is_simple_log = false;
        }

        let last_enable = chunk.rfind(ansi::ENABLE_ALTERNATE_SCREEN);
        let last_disable = chunk.rfind(ansi::DISABLE_ALTERNATE_SCREEN);
        match (last_enable, last_disable) {
            (Some(enable), Some(disable)) if enable > disable => self.enter_alternate_screen(),
            (Some(_), None) => self.enter_alternate_screen(),
            (Some(_), Some(_)) | (None, Some(_)) => self.is_on_alternate_screen = false,
            (None, None) => {}
        }

        if self.is_on_alternate_screen {
            self.history_alternate_screen.push_str(chunk);
            trim_history(&mut self.history_alternate_screen, self.max_history);
        } else {
            self.history.push_str(chunk);
            trim_history(&mut self.history, self.max_history);
        }
        changed
    }

    fn enter_alternate_screen(&mut self) {
        if !self.is_on_alternate_screen {
            self.is_on_alternate_screen = true;
            self.history_alternate_screen.clear();
        }
    }

    /// Match every rule against every line touched by this chunk — the
    /// newly completed ones and the still-open current line, since some
    /// programs update a line in place. Every match assigns, so the last
    /// match in scan order wins.
    fn update_status_from_rules(&mut self, chunk: &str) -> bool {
        if self.status_rules.is_empty() {
            return false;
        }
        let active = if self.is_on_alternate_screen {
            &self.history_alternate_screen
        } else {
            &self.history
        };
        let text = format!("{}{}", ansi::last_line(active), chunk);
        let before = self.status_from_rules.clone();
        for line in ansi::split_lines(&text) {
            let stripped = ansi::strip_sgr(line);
            for rule in &self.status_rules {
                if rule.regex.is_match(&stripped) {
                    self.status_from_rules = rule.indicator.clone();
                }
            }
        }
        before != self.status_from_rules
    }

    /// The scrollback replayed when this command regains focus.
    pub fn replay(&self) -> String {
        if self.is_on_alternate_screen {
            format!(
                "{}{}{}",
                self.history,
                ansi::ENABLE_ALTERNATE_SCREEN,
                self.history_alternate_screen
            )
        } else {
            self.history.clone()
        }
    }

    /// The visible last line of the active scrollback buffer.
    pub fn last_line(&self) -> &str {
        let active = if self.is_on_alternate_screen {
            &self.history_alternate_screen
        } else {
            &self.history
        };
        ansi::last_line(active)
    }
}

/// Drop the oldest bytes (on a char boundary) so the rest fits.
fn trim_history(history: &mut String, max: usize) {
    if history.len() > max {
        let mut cut = history.len() - max;
        while !history.is_char_boundary(cut) {
            cut += 1;
        }
        history.drain(..cut);
    }
}
