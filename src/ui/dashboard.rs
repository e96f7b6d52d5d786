//! The dashboard: one line per command plus a key legend.

use crate::ansi::visible_width;
use crate::config::Indicator;
use crate::labels;
use crate::ui::theme::Theme;

/// Per-command state as the dashboard needs it.
#[derive(Debug, Clone)]
pub enum RowState {
    Running { pid: u32 },
    Killing { pid: u32, slow: bool },
    Exit { code: u32 },
}

/// View model for one dashboard row.
#[derive(Debug, Clone)]
pub struct CommandRow {
    pub label: Option<char>,
    pub title: String,
    pub state: RowState,
    pub status: Option<Indicator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleSelection {
    None,
    Mouse(usize),
    Keyboard(usize),
}

impl VisibleSelection {
    pub fn index(self) -> Option<usize> {
        match self {
            VisibleSelection::None => None,
            VisibleSelection::Mouse(i) | VisibleSelection::Keyboard(i) => Some(i),
        }
    }
}

#[derive(Debug)]
pub struct DashboardModel<'a> {
    pub rows: &'a [CommandRow],
    pub width: usize,
    pub attempted_kill_all: bool,
    pub selection: VisibleSelection,
}

/// The label of the Ctrl+C action, shared by the dashboard footer and the
/// exited-command panel.
pub fn kill_all_label(rows: &[CommandRow]) -> &'static str {
    if rows
        .iter()
        .all(|r| matches!(r.state, RowState::Exit { .. }))
    {
        "exit"
    } else if rows
        .iter()
        .any(|r| matches!(r.state, RowState::Killing { .. }))
    {
        "kill all (double-press to force)"
    } else {
        "kill all"
    }
}

fn row_parts(row: &CommandRow, theme: &Theme) -> (String, String) {
    let rule_status = || {
        row.status
            .as_ref()
            .map(|i| theme.indicator(i).to_string())
            .unwrap_or_default()
    };
    match row.state {
        RowState::Running { .. } => (theme.running_indicator(), rule_status()),
        // Kills are usually instant; the killing indicator only appears once
        // the kill has proven slow.
        RowState::Killing { slow, .. } => (
            if slow {
                theme.killing_indicator()
            } else {
                theme.running_indicator()
            },
            rule_status(),
        ),
        RowState::Exit { code } => (theme.exit_indicator(code), format!("exit {code}")),
    }
}

/// A rendered row and its printable width (for mouse hit-testing).
#[derive(Debug)]
pub struct DashboardLine {
    pub text: String,
    pub width: usize,
}

/// Render the command table at the given terminal width. Selection is
/// reverse video, or a `→ ` marker under `NO_COLOR`.
pub fn command_lines(
    rows: &[CommandRow],
    width: usize,
    selection: VisibleSelection,
    theme: &Theme,
) -> Vec<DashboardLine> {
    let widest_status = rows
        .iter()
        .map(|row| visible_width(&row_parts(row, theme).1))
        .max()
        .unwrap_or(0);
    let icon_width = if theme.no_color || theme.windows { 1 } else { 2 };

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let selected = selection.index() == Some(i);
            let (icon, status) = row_parts(row, theme);

            let mut line = String::new();
            let mut used = 0;
            if theme.no_color {
                line.push_str(if selected { "→ " } else { "  " });
                used += 2;
            }
            let label_cell = format!(" {} ", row.label.unwrap_or(' '));
            line.push_str(&theme.bold(&label_cell));
            line.push(' ');
            line.push_str(&icon);
            line.push_str(&theme.emoji_width_fix(7));
            used += 4 + icon_width;
            line.push(' ');
            used += 1;
            if widest_status > 0 {
                line.push_str(&status);
                line.push_str(&" ".repeat(widest_status - visible_width(&status) + 1));
                used += widest_status + 1;
            }
            let title = crate::ansi::truncate(&row.title, width.saturating_sub(used));
            let row_width = used + visible_width(&title);
            line.push_str(&title);

            if selected && !theme.no_color {
                // Re-assert reverse video after every reset the line
                // (including user-supplied title SGR) may carry.
                line = format!(
                    "\x1b[7m{}\x1b[m",
                    line.replace("\x1b[0m", "\x1b[0m\x1b[7m")
                        .replace("\x1b[m", "\x1b[m\x1b[7m")
                );
            }

            DashboardLine {
                text: line,
                width: row_width,
            }
        })
        .collect()
}

/// Render the full dashboard: table, blank line, key legend. When a
/// kill-all has completed (every command exited) only the table remains —
/// the program is about to exit.
pub fn draw_dashboard(model: &DashboardModel, theme: &Theme) -> String {
    let mut out = String::new();
    for line in command_lines(model.rows, model.width, model.selection, theme) {
        out.push_str(&line.text);
        out.push('\n');
    }

    let all_exited = model
        .rows
        .iter()
        .all(|r| matches!(r.state, RowState::Exit { .. }));
    if model.attempted_kill_all && all_exited {
        return out;
    }

    let any_exited = model
        .rows
        .iter()
        .any(|r| matches!(r.state, RowState::Exit { .. }));

    let mut hints: Vec<(String, String)> = Vec::new();
    hints.push((
        labels::summarize(model.rows.len()),
        "focus command (or click)".to_string(),
    ));
    hints.push(("ctrl+c".to_string(), kill_all_label(model.rows).to_string()));
    hints.push(("↑/↓".to_string(), "move selection".to_string()));
    match model.selection {
        VisibleSelection::Keyboard(i) => {
            let pid = match model.rows[i].state {
                RowState::Running { pid } | RowState::Killing { pid, .. } => {
                    format!(" (pid {pid})")
                }
                RowState::Exit { .. } => String::new(),
            };
            hints.push(("enter".to_string(), format!("focus selected command{pid}")));
            hints.push(("esc".to_string(), "unselect".to_string()));
        }
        _ => {
            if any_exited {
                hints.push(("enter".to_string(), "restart exited commands".to_string()));
            }
        }
    }

    out.push('\n');
    let key_width = hints
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0);
    for (key, description) in hints {
        out.push_str(&theme.shortcut(&key));
        out.push_str(&" ".repeat(key_width - key.chars().count() + 1));
        out.push_str(&description);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMOJI: Theme = Theme {
        no_color: false,
        windows: false,
    };
    const PLAIN: Theme = Theme {
        no_color: true,
        windows: false,
    };

    fn mixed_rows() -> Vec<CommandRow> {
        let label = |i: usize| labels::label(i);
        vec![
            CommandRow {
                label: label(0),
                title: "npm start".to_string(),
                state: RowState::Exit { code: 0 },
                status: None,
            },
            CommandRow {
                label: label(1),
                title: "npm test".to_string(),
                state: RowState::Exit { code: 68 },
                status: None,
            },
            CommandRow {
                label: label(2),
                title: "make watch".to_string(),
                state: RowState::Killing {
                    pid: 12345,
                    slow: true,
                },
                status: None,
            },
            CommandRow {
                label: label(3),
                title: "backend".to_string(),
                state: RowState::Running { pid: 123456 },
                status: None,
            },
            CommandRow {
                label: label(4),
                title: "a very long custom title that certainly does not fit in eighty columns at all"
                    .to_string(),
                state: RowState::Running { pid: 99 },
                status: None,
            },
        ]
    }

    #[test]
    fn test_dashboard_mixed_states() {
        let rows = mixed_rows();
        let model = DashboardModel {
            rows: &rows,
            width: 80,
            attempted_kill_all: false,
            selection: VisibleSelection::None,
        };
        let out = draw_dashboard(&model, &EMOJI);
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].contains("⚪") && lines[0].contains("exit 0"));
        assert!(lines[1].contains("🔴") && lines[1].contains("exit 68"));
        assert!(lines[2].contains("⭕"));
        assert!(lines[3].contains("🟢"));
        assert!(lines[4].ends_with("…"));

        let widths: Vec<usize> = command_lines(&rows, 80, VisibleSelection::None, &EMOJI)
            .iter()
            .map(|l| l.width)
            .collect();
        assert!(widths.iter().all(|w| *w <= 80), "{widths:?}");

        assert!(out.contains("[1-5]"));
        assert!(out.contains("kill all (double-press to force)"));
        assert!(out.contains("move selection"));
        assert!(out.contains("restart exited commands"));
    }

    #[test]
    fn test_killing_row_without_slow_shows_running_icon() {
        let mut rows = mixed_rows();
        rows[2].state = RowState::Killing {
            pid: 12345,
            slow: false,
        };
        let lines = command_lines(&rows, 80, VisibleSelection::None, &EMOJI);
        assert!(lines[2].text.contains("🟢"));
    }

    #[test]
    fn test_sixty_two_commands() {
        let rows: Vec<CommandRow> = (0..62)
            .map(|i| CommandRow {
                label: labels::label(i),
                title: format!("cmd{i}"),
                state: RowState::Running { pid: i as u32 + 1 },
                status: None,
            })
            .collect();
        let model = DashboardModel {
            rows: &rows,
            width: 80,
            attempted_kill_all: false,
            selection: VisibleSelection::None,
        };
        let out = draw_dashboard(&model, &EMOJI);
        let lines: Vec<&str> = out.lines().collect();
        // The 62nd command has no label: its label cell is blank.
        assert!(lines[61].contains("\x1b[1m   \x1b[m"));
        assert!(out.contains("[1-9/a-z/A-Z]"));
    }

    #[test]
    fn test_kill_all_label_variants() {
        let mut rows = mixed_rows();
        assert_eq!(kill_all_label(&rows), "kill all (double-press to force)");
        rows[2].state = RowState::Running { pid: 1 };
        assert_eq!(kill_all_label(&rows), "kill all");
        for row in &mut rows {
            row.state = RowState::Exit { code: 0 };
        }
        assert_eq!(kill_all_label(&rows), "exit");
    }

    #[test]
    fn test_kill_all_complete_emits_bare_table() {
        let rows: Vec<CommandRow> = mixed_rows()
            .into_iter()
            .map(|mut row| {
                row.state = RowState::Exit { code: 0 };
                row
            })
            .collect();
        let model = DashboardModel {
            rows: &rows,
            width: 80,
            attempted_kill_all: true,
            selection: VisibleSelection::None,
        };
        let out = draw_dashboard(&model, &EMOJI);
        assert_eq!(out.lines().count(), rows.len());
        assert!(out.ends_with('\n'));
        assert!(!out.contains("ctrl+c"));
    }

    #[test]
    fn test_keyboard_selection_hints_and_highlight() {
        let rows = mixed_rows();
        let model = DashboardModel {
            rows: &rows,
            width: 80,
            attempted_kill_all: false,
            selection: VisibleSelection::Keyboard(3),
        };
        let out = draw_dashboard(&model, &EMOJI);
        assert!(out.contains("focus selected command (pid 123456)"));
        assert!(out.contains("unselect"));
        // Enter focuses rather than restarts while a selection is visible.
        assert!(!out.contains("restart exited commands"));
        let lines = command_lines(&rows, 80, VisibleSelection::Keyboard(3), &EMOJI);
        assert!(lines[3].text.starts_with("\x1b[7m"));
    }

    #[test]
    fn test_no_color_selection_marker() {
        let rows = mixed_rows();
        let lines = command_lines(&rows, 80, VisibleSelection::Keyboard(1), &PLAIN);
        assert!(lines[1].text.starts_with("→ "));
        assert!(lines[0].text.starts_with("  "));
        assert!(!lines[1].text.contains('\x1b'));
    }

    #[test]
    fn test_status_column_padding() {
        let mut rows = mixed_rows();
        rows[3].status = Some(Indicator {
            unicode: "⏳".to_string(),
            ascii: "S".to_string(),
        });
        let lines = command_lines(&rows, 80, VisibleSelection::None, &EMOJI);
        // The widest status is "exit 68" (7 chars); running rows pad to it.
        assert!(lines[3].text.contains("⏳       "));
    }
}
