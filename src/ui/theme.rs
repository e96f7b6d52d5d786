//! Indicator and styling selection.
//!
//! Three render modes: emoji (Unix with color), SGR-colored ASCII
//! (Windows), and plain ASCII (`NO_COLOR` anywhere). Emoji render
//! double-width but some hosts report them single-width, so a
//! cursor-column fix-up is emitted right after each emoji indicator.

use crate::ansi::cursor_horizontal_absolute;
use crate::config::Indicator;

/// Exit codes treated as clean: 0, and 130 as the canonical Ctrl+C exit.
pub const CLEAN_EXIT_CODES: [u32; 2] = [0, 130];

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub no_color: bool,
    pub windows: bool,
}

impl Theme {
    pub fn from_env() -> Self {
        Self {
            no_color: std::env::var_os("NO_COLOR").is_some(),
            windows: cfg!(windows),
        }
    }

    fn emoji(&self) -> bool {
        !self.no_color && !self.windows
    }

    pub fn running_indicator(&self) -> String {
        if self.no_color {
            "›".to_string()
        } else if self.windows {
            "\x1b[92m●\x1b[m".to_string()
        } else {
            "🟢".to_string()
        }
    }

    pub fn killing_indicator(&self) -> String {
        if self.no_color {
            "○".to_string()
        } else if self.windows {
            "\x1b[91m○\x1b[m".to_string()
        } else {
            "⭕".to_string()
        }
    }

    pub fn exit_indicator(&self, code: u32) -> String {
        if CLEAN_EXIT_CODES.contains(&code) {
            if self.no_color {
                "●".to_string()
            } else if self.windows {
                "\x1b[97m●\x1b[m".to_string()
            } else {
                "⚪".to_string()
            }
        } else if self.no_color {
            "×".to_string()
        } else if self.windows {
            "\x1b[91m●\x1b[m".to_string()
        } else {
            "🔴".to_string()
        }
    }

    /// The form of a rule-selected indicator for this mode.
    pub fn indicator<'a>(&self, indicator: &'a Indicator) -> &'a str {
        if self.emoji() {
            &indicator.unicode
        } else {
            &indicator.ascii
        }
    }

    /// Pin the cursor to `col` after an emoji indicator; empty otherwise.
    pub fn emoji_width_fix(&self, col: usize) -> String {
        if self.emoji() {
            cursor_horizontal_absolute(col)
        } else {
            String::new()
        }
    }

    pub fn bold(&self, s: &str) -> String {
        if self.no_color {
            s.to_string()
        } else {
            format!("\x1b[1m{s}\x1b[m")
        }
    }

    pub fn dim(&self, s: &str) -> String {
        if self.no_color {
            s.to_string()
        } else {
            format!("\x1b[2m{s}\x1b[m")
        }
    }

    /// A `[key]` legend entry.
    pub fn shortcut(&self, key: &str) -> String {
        self.bold(&format!("[{key}]"))
    }
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
    const WINDOWS: Theme = Theme {
        no_color: false,
        windows: true,
    };

    #[test]
    fn test_indicators_per_mode() {
        assert_eq!(EMOJI.running_indicator(), "🟢");
        assert_eq!(PLAIN.running_indicator(), "›");
        assert_eq!(WINDOWS.running_indicator(), "\x1b[92m●\x1b[m");
        assert_eq!(EMOJI.killing_indicator(), "⭕");
        assert_eq!(PLAIN.killing_indicator(), "○");
    }

    #[test]
    fn test_exit_codes_0_and_130_are_clean() {
        assert_eq!(EMOJI.exit_indicator(0), "⚪");
        assert_eq!(EMOJI.exit_indicator(130), "⚪");
        assert_eq!(EMOJI.exit_indicator(1), "🔴");
        assert_eq!(PLAIN.exit_indicator(0), "●");
        assert_eq!(PLAIN.exit_indicator(68), "×");
    }

    #[test]
    fn test_rule_indicator_form() {
        let indicator = Indicator {
            unicode: "🚨".to_string(),
            ascii: "E".to_string(),
        };
        assert_eq!(EMOJI.indicator(&indicator), "🚨");
        assert_eq!(PLAIN.indicator(&indicator), "E");
        assert_eq!(WINDOWS.indicator(&indicator), "E");
    }

    #[test]
    fn test_emoji_width_fix_only_in_emoji_mode() {
        assert_eq!(EMOJI.emoji_width_fix(3), "\x1b[3G");
        assert_eq!(PLAIN.emoji_width_fix(3), "");
        assert_eq!(WINDOWS.emoji_width_fix(3), "");
    }

    #[test]
    fn test_no_color_suppresses_styling() {
        assert_eq!(PLAIN.bold("x"), "x");
        assert_eq!(PLAIN.shortcut("enter"), "[enter]");
        assert_eq!(EMOJI.shortcut("enter"), "\x1b[1m[enter]\x1b[m");
    }
}
