//! Panels around a focused command: the scrollback header and the bottom
//! status panel for running, killing and exited states.

use std::path::Path;

use crate::ansi::strip_sgr;
use crate::ui::theme::Theme;

/// First line(s) of a command's scrollback: indicator plus title and
/// command, and the working directory when it adds information.
pub fn history_start(
    title: &str,
    title_with_command: &str,
    cwd: &str,
    theme: &Theme,
) -> String {
    let mut out = format!(
        "{}{} {}\n",
        theme.running_indicator(),
        theme.emoji_width_fix(3),
        title_with_command
    );
    if cwd_is_relevant(cwd, title) {
        if theme.no_color || theme.windows {
            out.push_str(&format!("cwd: {cwd}\n"));
        } else {
            out.push_str(&format!("📂\x1b[3G {cwd}\n"));
        }
    }
    out
}

/// The cwd line is noise when it repeats the title or the directory the
/// multiplexer itself runs in.
fn cwd_is_relevant(cwd: &str, title: &str) -> bool {
    if cwd == "." || cwd == strip_sgr(title) {
        return false;
    }
    match std::env::current_dir() {
        Ok(dir) => Path::new(cwd) != dir,
        Err(_) => true,
    }
}

pub fn running_text(pid: u32, theme: &Theme) -> String {
    format!(
        "{} kill {}\n{} dashboard",
        theme.shortcut("ctrl+c"),
        theme.dim(&format!("(pid {pid})")),
        theme.shortcut("ctrl+z"),
    )
}

pub fn killing_text(pid: u32, theme: &Theme) -> String {
    format!(
        "{} force kill {}\n{} dashboard",
        theme.shortcut("ctrl+c"),
        theme.dim(&format!("(pid {pid})")),
        theme.shortcut("ctrl+z"),
    )
}

/// The panel below an exited command. `kill_all_label` mirrors the
/// dashboard footer's Ctrl+C label.
pub fn exit_text(code: u32, kill_all_label: &str, theme: &Theme) -> String {
    format!(
        "{}{} exit {code}\n{} restart\n{} {kill_all_label}\n{} dashboard",
        theme.exit_indicator(code),
        theme.emoji_width_fix(3),
        theme.shortcut("enter"),
        theme.shortcut("ctrl+c"),
        theme.shortcut("ctrl+z"),
    )
}
