//! Global state and transitions: output routing, dashboard drawing, the
//! kill-all/restart policy and clean termination.

use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::ansi;
use crate::command::{Command, CommandStatus, max_history_from_env};
use crate::config::CommandDescription;
use crate::errors::AppResult;
use crate::events::AppEvent;
use crate::input::{self, CommandAction, DashboardAction};
use crate::ui::dashboard::{self, CommandRow, DashboardModel, RowState, VisibleSelection};
use crate::ui::focused;
use crate::ui::theme::Theme;

/// Tick granularity for the deadline checks (slow-kill, pending exits,
/// resize polling on hosts without SIGWINCH).
const TICK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Command(usize),
}

/// Dashboard selection. The index is retained while invisible so arrow
/// keys reveal it in place; it also decides what Enter means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Invisible(usize),
    Mousedown(usize),
    Keyboard(usize),
}

impl Selection {
    fn index(self) -> usize {
        match self {
            Selection::Invisible(i) | Selection::Mousedown(i) | Selection::Keyboard(i) => i,
        }
    }

    fn visible(self) -> VisibleSelection {
        match self {
            Selection::Invisible(_) => VisibleSelection::None,
            Selection::Mousedown(i) => VisibleSelection::Mouse(i),
            Selection::Keyboard(i) => VisibleSelection::Keyboard(i),
        }
    }
}

/// Step a selection by one row with wraparound; an invisible selection is
/// first revealed at its stored index.
fn step_selection(selection: Selection, len: usize, delta: isize) -> Selection {
    match selection {
        Selection::Invisible(i) => Selection::Keyboard(i),
        Selection::Mousedown(i) | Selection::Keyboard(i) => {
            let len = len as isize;
            let next = (i as isize + delta).rem_euclid(len);
            Selection::Keyboard(next as usize)
        }
    }
}

pub struct Controller {
    commands: Vec<Command>,
    current_view: View,
    selection: Selection,
    attempted_kill_all: bool,
    /// The status panel currently on screen below the focused command's
    /// output (including its leading separator newline), empty when none.
    last_extra_text: String,
    /// The visible last line of the focused command's output when the
    /// panel was drawn; erasing repositions the cursor after it.
    last_line: String,
    theme: Theme,
    terminal_size: (u16, u16),
    /// Commands whose PTY hit EOF before their exit status was available.
    pending_exits: Vec<usize>,
    shutdown: Option<i32>,
}

impl Controller {
    pub fn new(
        descriptions: Vec<CommandDescription>,
        theme: Theme,
        tx: Sender<AppEvent>,
    ) -> Self {
        let max_history = max_history_from_env();
        let commands = descriptions
            .into_iter()
            .enumerate()
            .map(|(index, description)| {
                Command::new(index, description, max_history, theme, tx.clone())
            })
            .collect();
        Self {
            commands,
            current_view: View::Dashboard,
            selection: Selection::Invisible(0),
            attempted_kill_all: false,
            last_extra_text: String::new(),
            last_line: String::new(),
            theme,
            terminal_size: crossterm::terminal::size().unwrap_or((80, 24)),
            pending_exits: Vec::new(),
            shutdown: None,
        }
    }

    /// Start every command and run the event loop until shutdown.
    /// Returns the process exit code.
    pub fn run(&mut self, rx: &Receiver<AppEvent>) -> AppResult<i32> {
        let (cols, rows) = self.terminal_size;
        for i in 0..self.commands.len() {
            self.commands[i].start(cols, rows)?;
        }
        if self.commands.len() == 1 {
            self.switch_to_command(0)?;
        } else {
            self.switch_to_dashboard()?;
        }

        loop {
            if let Some(code) = self.shutdown {
                return Ok(code);
            }
            match rx.recv_timeout(TICK) {
                Ok(event) => self.handle_event(event)?,
                Err(RecvTimeoutError::Timeout) => self.tick()?,
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
    }

    fn handle_event(&mut self, event: AppEvent) -> AppResult<()> {
        match event {
            AppEvent::Stdin(bytes) => self.on_stdin(&bytes),
            AppEvent::PtyData {
                index,
                generation,
                chunk,
            } => {
                if self.commands[index].generation() == generation {
                    self.on_data(index, &chunk)
                } else {
                    Ok(())
                }
            }
            AppEvent::PtyEof { index, generation } => {
                if self.commands[index].generation() == generation {
                    self.on_eof(index)
                } else {
                    Ok(())
                }
            }
            AppEvent::KillSignal => self.kill_all(),
            AppEvent::Resize => {
                if let Ok(size) = crossterm::terminal::size() {
                    self.apply_resize(size)?;
                }
                Ok(())
            }
        }
    }

    fn tick(&mut self) -> AppResult<()> {
        let now = Instant::now();
        for i in 0..self.commands.len() {
            if self.commands[i].tick_slow_kill(now) {
                match self.current_view {
                    View::Command(focused) if focused == i => {
                        self.redraw_focused(i, "", false)?;
                    }
                    View::Dashboard => self.redraw_dashboard()?,
                    _ => {}
                }
            }
        }
        self.poll_pending_exits()?;
        // SIGWINCH covers Unix; polling covers the rest.
        if let Ok(size) = crossterm::terminal::size()
            && size != self.terminal_size
        {
            self.apply_resize(size)?;
        }
        Ok(())
    }

    // ── Child output ────────────────────────────────────────────────────

    fn on_data(&mut self, index: usize, chunk: &str) -> AppResult<()> {
        let status_changed = self.commands[index].push_history(chunk);
        match self.current_view {
            View::Command(focused) if focused == index => self.redraw_focused(index, chunk, false),
            View::Dashboard if status_changed => self.redraw_dashboard(),
            _ => Ok(()),
        }
    }

    fn on_eof(&mut self, index: usize) -> AppResult<()> {
        match self.commands[index].try_finish() {
            Some(_) => self.on_exit(index),
            None => {
                // EOF raced the process teardown; poll again on ticks.
                if !self.pending_exits.contains(&index) {
                    self.pending_exits.push(index);
                }
                Ok(())
            }
        }
    }

    fn poll_pending_exits(&mut self) -> AppResult<()> {
        let pending = std::mem::take(&mut self.pending_exits);
        for index in pending {
            match self.commands[index].try_finish() {
                Some(_) => self.on_exit(index)?,
                None => self.pending_exits.push(index),
            }
        }
        Ok(())
    }

    fn on_exit(&mut self, index: usize) -> AppResult<()> {
        // An alternate-screen session ends with the child: leave the
        // alternate screen so the exit panel lands on the primary one.
        let alt_screen_ended = self.commands[index].is_on_alternate_screen;
        if alt_screen_ended {
            self.commands[index].push_history(ansi::DISABLE_ALTERNATE_SCREEN);
        }

        let single_clean = self.commands.len() == 1
            && !self.attempted_kill_all
            && matches!(self.commands[0].status, CommandStatus::Exit { code: 0 });

        match self.current_view {
            View::Command(focused) if focused == index => {
                if single_clean {
                    // Nothing left to supervise: finish the output and go.
                    self.finalize_focused_output(alt_screen_ended)?;
                } else {
                    self.redraw_focused(index, "", alt_screen_ended)?;
                }
            }
            View::Dashboard => self.redraw_dashboard()?,
            _ => {}
        }

        if single_clean || (self.attempted_kill_all && self.all_exited()) {
            self.shutdown = Some(0);
        }
        Ok(())
    }

    // ── Focused-view drawing ────────────────────────────────────────────

    /// Cursor-up back to the row the previous panel was drawn from.
    fn move_back(panel: &str) -> String {
        ansi::cursor_up(panel.lines().count().saturating_sub(1))
    }

    /// From that row: park the cursor right after the last output
    /// character and clear the rest of the screen.
    fn erase(last_line: &str) -> String {
        format!(
            "{}{}",
            ansi::cursor_horizontal_absolute(ansi::visible_width(last_line) + 1),
            ansi::CLEAR_DOWN
        )
    }

    /// The bottom panel for the focused command, or `None` while a
    /// non-simple-log child owns the cursor.
    fn panel_text(&self, index: usize) -> Option<String> {
        let command = &self.commands[index];
        match &command.status {
            CommandStatus::Running { .. } => command
                .is_simple_log
                .then(|| focused::running_text(command.pid().unwrap_or(0), &self.theme)),
            CommandStatus::Killing { slow, .. } => {
                if !command.is_simple_log {
                    None
                } else if *slow {
                    Some(focused::killing_text(
                        command.pid().unwrap_or(0),
                        &self.theme,
                    ))
                } else {
                    Some(focused::running_text(
                        command.pid().unwrap_or(0),
                        &self.theme,
                    ))
                }
            }
            CommandStatus::Exit { code } => Some(focused::exit_text(
                *code,
                dashboard::kill_all_label(&self.rows()),
                &self.theme,
            )),
        }
    }

    /// The write sandwich for focused output: erase the previous panel,
    /// emit the chunk, re-render the panel where safe.
    fn redraw_focused(&mut self, index: usize, chunk: &str, alt_screen_ended: bool) -> AppResult<()> {
        let mut out = String::new();
        if !self.last_extra_text.is_empty() {
            out.push_str(&Self::move_back(&self.last_extra_text));
            out.push_str(&Self::erase(&self.last_line));
        }
        out.push_str(chunk);
        if alt_screen_ended {
            out.push_str(ansi::DISABLE_ALTERNATE_SCREEN);
        }

        let new_last_line = self.commands[index].last_line().to_string();
        match self.panel_text(index) {
            Some(panel) => {
                let mut block = String::new();
                if !new_last_line.is_empty() || alt_screen_ended {
                    block.push('\n');
                }
                block.push_str(&panel);
                out.push_str(&block);
                self.last_extra_text = block;
            }
            None => self.last_extra_text.clear(),
        }
        self.last_line = new_last_line;
        write_stdout(&out)
    }

    /// Finish the focused output without drawing an interactive panel —
    /// used when the program is about to exit anyway.
    fn finalize_focused_output(&mut self, alt_screen_ended: bool) -> AppResult<()> {
        let mut out = String::new();
        if !self.last_extra_text.is_empty() {
            out.push_str(&Self::move_back(&self.last_extra_text));
            out.push_str(&Self::erase(&self.last_line));
        }
        if alt_screen_ended {
            out.push_str(ansi::DISABLE_ALTERNATE_SCREEN);
        }
        if !self.last_line.is_empty() || alt_screen_ended {
            out.push('\n');
        }
        self.last_extra_text.clear();
        write_stdout(&out)
    }

    // ── Dashboard drawing ───────────────────────────────────────────────

    fn rows(&self) -> Vec<CommandRow> {
        self.commands
            .iter()
            .map(|command| CommandRow {
                label: command.label,
                title: command.title.clone(),
                state: match &command.status {
                    CommandStatus::Running { .. } => RowState::Running {
                        pid: command.pid().unwrap_or(0),
                    },
                    CommandStatus::Killing { slow, .. } => RowState::Killing {
                        pid: command.pid().unwrap_or(0),
                        slow: *slow,
                    },
                    CommandStatus::Exit { code } => RowState::Exit { code: *code },
                },
                status: command.status_from_rules.clone(),
            })
            .collect()
    }

    fn redraw_dashboard(&mut self) -> AppResult<()> {
        let rows = self.rows();
        let model = DashboardModel {
            rows: &rows,
            width: self.terminal_size.0 as usize,
            attempted_kill_all: self.attempted_kill_all,
            selection: self.selection.visible(),
        };
        let mut out = String::new();
        out.push_str(ansi::HIDE_CURSOR);
        out.push_str(ansi::RESET_COLOR);
        out.push_str(ansi::CLEAR_SCREEN);
        out.push_str(&dashboard::draw_dashboard(&model, &self.theme));
        out.push_str(ansi::ENABLE_MOUSE);
        write_stdout(&out)
    }

    // ── View switching ──────────────────────────────────────────────────

    fn switch_to_dashboard(&mut self) -> AppResult<()> {
        // The host may still be on a focused child's alternate screen.
        if let View::Command(i) = self.current_view
            && self.commands[i].is_on_alternate_screen
        {
            write_stdout(ansi::DISABLE_ALTERNATE_SCREEN)?;
        }
        self.current_view = View::Dashboard;
        self.last_extra_text.clear();
        self.last_line.clear();
        self.redraw_dashboard()
    }

    fn switch_to_command(&mut self, index: usize) -> AppResult<()> {
        self.current_view = View::Command(index);
        self.selection = Selection::Invisible(index);

        let command = &self.commands[index];
        let mut out = String::new();
        out.push_str(ansi::DISABLE_MOUSE);
        out.push_str(ansi::SHOW_CURSOR);
        out.push_str(ansi::RESET_COLOR);
        out.push_str(ansi::CLEAR_SCREEN);
        out.push_str(&command.replay());

        let new_last_line = command.last_line().to_string();
        match self.panel_text(index) {
            Some(panel) => {
                let mut block = String::new();
                if !new_last_line.is_empty() {
                    block.push('\n');
                }
                block.push_str(&panel);
                out.push_str(&block);
                self.last_extra_text = block;
            }
            None => self.last_extra_text.clear(),
        }
        self.last_line = new_last_line;
        write_stdout(&out)
    }

    // ── Input ───────────────────────────────────────────────────────────

    fn on_stdin(&mut self, bytes: &[u8]) -> AppResult<()> {
        match self.current_view {
            View::Dashboard => self.on_dashboard_input(bytes),
            View::Command(index) => self.on_command_input(index, bytes),
        }
    }

    fn on_dashboard_input(&mut self, bytes: &[u8]) -> AppResult<()> {
        match input::dashboard_action(bytes) {
            DashboardAction::KillAll => self.kill_all(),
            DashboardAction::Enter => match self.selection {
                Selection::Invisible(_) => self.restart_exited(),
                Selection::Mousedown(i) | Selection::Keyboard(i) => self.switch_to_command(i),
            },
            DashboardAction::MoveUp => {
                self.selection = step_selection(self.selection, self.commands.len(), -1);
                self.redraw_dashboard()
            }
            DashboardAction::MoveDown => {
                self.selection = step_selection(self.selection, self.commands.len(), 1);
                self.redraw_dashboard()
            }
            DashboardAction::HideSelection => {
                self.selection = Selection::Invisible(self.selection.index());
                self.redraw_dashboard()
            }
            DashboardAction::FocusLabel(c) => {
                match self.commands.iter().position(|cmd| cmd.label == Some(c)) {
                    Some(i) => self.switch_to_command(i),
                    None => Ok(()),
                }
            }
            DashboardAction::Mouse(event) => self.on_dashboard_mouse(event),
            DashboardAction::Ignore => Ok(()),
        }
    }

    fn on_dashboard_mouse(&mut self, event: ansi::MouseEvent) -> AppResult<()> {
        let rows = self.rows();
        let widths: Vec<usize> = dashboard::command_lines(
            &rows,
            self.terminal_size.0 as usize,
            self.selection.visible(),
            &self.theme,
        )
        .iter()
        .map(|line| line.width)
        .collect();
        let hit = input::mouse_hit(event, &widths);

        match event.kind {
            ansi::MouseKind::Down => {
                self.selection = match hit {
                    Some(i) => Selection::Mousedown(i),
                    None => Selection::Invisible(self.selection.index()),
                };
                self.redraw_dashboard()
            }
            ansi::MouseKind::Up => match self.selection {
                Selection::Mousedown(i) if hit == Some(i) => self.switch_to_command(i),
                Selection::Mousedown(i) => {
                    self.selection = Selection::Invisible(i);
                    self.redraw_dashboard()
                }
                _ => Ok(()),
            },
        }
    }

    fn on_command_input(&mut self, index: usize, bytes: &[u8]) -> AppResult<()> {
        let exited = self.commands[index].is_exited();
        match input::command_action(bytes, exited) {
            CommandAction::Kill => self.commands[index].kill(),
            CommandAction::KillAll => self.kill_all(),
            CommandAction::Dashboard => self.switch_to_dashboard(),
            CommandAction::Restart => {
                self.start_command(index)?;
                self.attempted_kill_all = false;
                self.switch_to_command(index)
            }
            CommandAction::Forward(bytes) => {
                // Typing into a killing command retracts the kill.
                if matches!(self.commands[index].status, CommandStatus::Killing { .. }) {
                    self.commands[index].resume();
                    self.redraw_focused(index, "", false)?;
                }
                self.commands[index].write_input(&bytes);
                Ok(())
            }
            CommandAction::Ignore => Ok(()),
        }
    }

    // ── Policy ──────────────────────────────────────────────────────────

    fn all_exited(&self) -> bool {
        self.commands.iter().all(|c| c.is_exited())
    }

    fn kill_all(&mut self) -> AppResult<()> {
        debug!("kill all");
        self.attempted_kill_all = true;
        let alive: Vec<usize> = self
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_exited())
            .map(|(i, _)| i)
            .collect();
        if alive.is_empty() {
            self.switch_to_dashboard()?;
            self.shutdown = Some(0);
            return Ok(());
        }
        for index in alive {
            self.commands[index].kill()?;
        }
        // Watch the children die from the dashboard.
        self.switch_to_dashboard()
    }

    fn restart_exited(&mut self) -> AppResult<()> {
        let exited: Vec<usize> = self
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_exited())
            .map(|(i, _)| i)
            .collect();
        if !exited.is_empty() {
            debug!(count = exited.len(), "restarting exited commands");
            for index in exited {
                self.start_command(index)?;
            }
            // Restarting retracts the intent to exit.
            self.attempted_kill_all = false;
        }
        self.redraw_dashboard()
    }

    fn start_command(&mut self, index: usize) -> AppResult<()> {
        let (cols, rows) = self.terminal_size;
        self.commands[index].start(cols, rows)
    }

    fn apply_resize(&mut self, size: (u16, u16)) -> AppResult<()> {
        self.terminal_size = size;
        for command in &self.commands {
            command.resize(size.0, size.1);
        }
        // A focused PTY reflows and emits by itself; the dashboard is ours.
        if self.current_view == View::Dashboard {
            self.redraw_dashboard()?;
        }
        Ok(())
    }
}

fn write_stdout(out: &str) -> AppResult<()> {
    if out.is_empty() {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    stdout.write_all(out.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_selection_reveals_in_place() {
        assert_eq!(
            step_selection(Selection::Invisible(2), 5, -1),
            Selection::Keyboard(2)
        );
        assert_eq!(
            step_selection(Selection::Invisible(2), 5, 1),
            Selection::Keyboard(2)
        );
    }

    #[test]
    fn test_step_selection_wraps() {
        assert_eq!(
            step_selection(Selection::Keyboard(0), 5, -1),
            Selection::Keyboard(4)
        );
        assert_eq!(
            step_selection(Selection::Keyboard(4), 5, 1),
            Selection::Keyboard(0)
        );
        assert_eq!(
            step_selection(Selection::Mousedown(1), 5, 1),
            Selection::Keyboard(2)
        );
    }

    #[test]
    fn test_move_back_and_erase() {
        // A one-line panel with its separator newline: back up one row.
        assert_eq!(Controller::move_back("\npanel"), "\x1b[1A");
        // A panel drawn directly on the cursor row: stay put.
        assert_eq!(Controller::move_back("panel"), "");
        assert_eq!(
            Controller::move_back("\n[ctrl+c] kill\n[ctrl+z] dashboard"),
            "\x1b[2A"
        );
        assert_eq!(Controller::erase("12345"), "\x1b[6G\x1b[0J");
        assert_eq!(Controller::erase(""), "\x1b[1G\x1b[0J");
    }
}
