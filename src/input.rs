//! Map host stdin bytes to multiplexer actions.
//!
//! In raw mode each read delivers a whole key (or a pasted run of bytes).
//! The dashboard consumes every key; a focused command only gives up
//! Ctrl+C and Ctrl+Z and receives everything else verbatim.

use crate::ansi::{self, MouseEvent};

const KEY_ENTER: [&str; 2] = ["\r", "\n"];
const KEY_UP: [&str; 3] = ["\x1b[A", "\x1b\x1b[A", "\x1b[1;3A"];
const KEY_DOWN: [&str; 3] = ["\x1b[B", "\x1b\x1b[B", "\x1b[1;3B"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardAction {
    KillAll,
    /// Focus the selection, or restart exited commands when none is
    /// visible.
    Enter,
    MoveUp,
    MoveDown,
    HideSelection,
    /// A label key: focus that command directly.
    FocusLabel(char),
    Mouse(MouseEvent),
    Ignore,
}

pub fn dashboard_action(bytes: &[u8]) -> DashboardAction {
    if bytes == [ansi::CTRL_C] {
        return DashboardAction::KillAll;
    }
    let Ok(s) = std::str::from_utf8(bytes) else {
        return DashboardAction::Ignore;
    };
    if KEY_ENTER.contains(&s) || s == "o" {
        return DashboardAction::Enter;
    }
    if KEY_UP.contains(&s) || s == "k" {
        return DashboardAction::MoveUp;
    }
    if KEY_DOWN.contains(&s) || s == "j" {
        return DashboardAction::MoveDown;
    }
    if s == ansi::KEY_ESC {
        return DashboardAction::HideSelection;
    }
    if let Some(mouse) = ansi::parse_mouse(s) {
        return DashboardAction::Mouse(mouse);
    }
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return DashboardAction::FocusLabel(c);
    }
    DashboardAction::Ignore
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Ctrl+C on a live command.
    Kill,
    /// Ctrl+C on an exited command.
    KillAll,
    /// Ctrl+Z.
    Dashboard,
    /// Enter on an exited command.
    Restart,
    /// Everything else on a live command goes to its PTY.
    Forward(Vec<u8>),
    /// Everything else on an exited command is discarded.
    Ignore,
}

pub fn command_action(bytes: &[u8], exited: bool) -> CommandAction {
    if bytes == [ansi::CTRL_C] {
        return if exited {
            CommandAction::KillAll
        } else {
            CommandAction::Kill
        };
    }
    if bytes == [ansi::CTRL_Z] {
        return CommandAction::Dashboard;
    }
    if exited {
        if KEY_ENTER.iter().any(|k| k.as_bytes() == bytes) {
            CommandAction::Restart
        } else {
            CommandAction::Ignore
        }
    } else {
        CommandAction::Forward(bytes.to_vec())
    }
}

/// Resolve a mouse event to the dashboard row it landed on, if any.
/// `row_widths` are the printable widths of the rendered command lines at
/// the current terminal width.
pub fn mouse_hit(event: MouseEvent, row_widths: &[usize]) -> Option<usize> {
    (event.y < row_widths.len() && event.x < row_widths[event.y]).then_some(event.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::MouseKind;

    #[test]
    fn test_dashboard_keys() {
        assert_eq!(dashboard_action(&[0x03]), DashboardAction::KillAll);
        assert_eq!(dashboard_action(b"\r"), DashboardAction::Enter);
        assert_eq!(dashboard_action(b"o"), DashboardAction::Enter);
        assert_eq!(dashboard_action(b"\x1b[A"), DashboardAction::MoveUp);
        assert_eq!(dashboard_action(b"\x1b\x1b[A"), DashboardAction::MoveUp);
        assert_eq!(dashboard_action(b"k"), DashboardAction::MoveUp);
        assert_eq!(dashboard_action(b"\x1b[B"), DashboardAction::MoveDown);
        assert_eq!(dashboard_action(b"\x1b[1;3B"), DashboardAction::MoveDown);
        assert_eq!(dashboard_action(b"j"), DashboardAction::MoveDown);
        assert_eq!(dashboard_action(b"\x1b"), DashboardAction::HideSelection);
        assert_eq!(dashboard_action(b"3"), DashboardAction::FocusLabel('3'));
        assert_eq!(dashboard_action(b"Z"), DashboardAction::FocusLabel('Z'));
        assert_eq!(dashboard_action(b"\x1b[Z"), DashboardAction::Ignore);
    }

    #[test]
    fn test_dashboard_mouse() {
        match dashboard_action(b"\x1b[<0;3;2M") {
            DashboardAction::Mouse(event) => {
                assert_eq!(event.kind, MouseKind::Down);
                assert_eq!((event.x, event.y), (2, 1));
            }
            other => panic!("expected mouse, got {other:?}"),
        }
        // Other buttons are not ours.
        assert_eq!(dashboard_action(b"\x1b[<2;3;2M"), DashboardAction::Ignore);
    }

    #[test]
    fn test_command_keys_live() {
        assert_eq!(command_action(&[0x03], false), CommandAction::Kill);
        assert_eq!(command_action(&[0x1a], false), CommandAction::Dashboard);
        assert_eq!(
            command_action(b"ls\r", false),
            CommandAction::Forward(b"ls\r".to_vec())
        );
        // Even Enter is the child's business while it runs.
        assert_eq!(
            command_action(b"\r", false),
            CommandAction::Forward(b"\r".to_vec())
        );
    }

    #[test]
    fn test_command_keys_exited() {
        assert_eq!(command_action(&[0x03], true), CommandAction::KillAll);
        assert_eq!(command_action(&[0x1a], true), CommandAction::Dashboard);
        assert_eq!(command_action(b"\r", true), CommandAction::Restart);
        assert_eq!(command_action(b"x", true), CommandAction::Ignore);
    }

    #[test]
    fn test_mouse_hit() {
        let widths = [10, 20];
        let down = |x, y| MouseEvent {
            kind: MouseKind::Down,
            x,
            y,
        };
        assert_eq!(mouse_hit(down(0, 0), &widths), Some(0));
        assert_eq!(mouse_hit(down(19, 1), &widths), Some(1));
        assert_eq!(mouse_hit(down(10, 0), &widths), None);
        assert_eq!(mouse_hit(down(0, 2), &widths), None);
    }
}
