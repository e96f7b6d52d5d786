//! ANSI byte-stream classification.
//!
//! Pure helpers over UTF-8 text from child PTYs: strip or preserve SGR
//! styling, decide whether a stream is still a "simple log" that a status
//! panel can be appended to, and parse the few host sequences the
//! multiplexer itself consumes (SGR-1006 mouse reports).

use std::sync::LazyLock;

use regex::Regex;

pub const CTRL_C: u8 = 0x03;
pub const CTRL_Z: u8 = 0x1a;
pub const KEY_ESC: &str = "\x1b";

pub const ENABLE_ALTERNATE_SCREEN: &str = "\x1b[?1049h";
pub const DISABLE_ALTERNATE_SCREEN: &str = "\x1b[?1049l";
pub const ENABLE_MOUSE: &str = "\x1b[?1000;1006h";
pub const DISABLE_MOUSE: &str = "\x1b[?1000;1006l";
pub const DISABLE_BRACKETED_PASTE: &str = "\x1b[?2004l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";
pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const RESET_COLOR: &str = "\x1b[m";
pub const CLEAR_DOWN: &str = "\x1b[0J";

/// Clear the whole screen and park the cursor at the top left.
/// Windows terminals don't all understand the scrollback-erase (3J) form.
#[cfg(not(windows))]
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[3J\x1b[H";
#[cfg(windows)]
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[0f";

/// Select Graphic Rendition: `ESC [ digits (; digits)* m`, including the
/// bare `ESC [ m` reset.
static SGR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[(?:\d+(?:;\d+)*)?m").unwrap());

/// Any CSI sequence (parameter bytes, intermediate bytes, final byte).
static CSI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;:<=>?]*[ -/]*[@-~]").unwrap());

/// SGR-1006 mouse report for button 0: `ESC [ < 0 ; X ; Y (M|m)`.
static MOUSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\x1B\[<0;(\d+);(\d+)([Mm])$").unwrap());

pub fn cursor_up(n: usize) -> String {
    if n == 0 {
        String::new()
    } else {
        format!("\x1b[{n}A")
    }
}

/// Cursor Horizontal Absolute: move to the given 1-based column.
pub fn cursor_horizontal_absolute(col: usize) -> String {
    format!("\x1b[{col}G")
}

/// Remove every SGR sequence, leaving all other bytes untouched.
pub fn strip_sgr(s: &str) -> String {
    SGR_REGEX.replace_all(s, "").into_owned()
}

/// Printable length: SGR sequences contribute nothing, every other code
/// point takes one slot.
fn printable_len(s: &str) -> usize {
    strip_sgr(s).chars().count()
}

/// Printable length ignoring all CSI sequences, not just SGR. Used for
/// cursor repositioning after erasing a status panel and for dashboard
/// mouse hit-testing.
pub fn visible_width(s: &str) -> usize {
    CSI_REGEX.replace_all(s, "").chars().count()
}

/// Truncate to at most `max_width` printable slots. SGR sequences are
/// carried into the prefix without counting toward the width; when the
/// input is cut, the result holds at most `max_width - 1` printable code
/// points followed by `…`.
pub fn truncate(s: &str, max_width: usize) -> String {
    if printable_len(s) <= max_width {
        return s.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    let mut last = 0;
    for m in SGR_REGEX.find_iter(s) {
        for ch in s[last..m.start()].chars() {
            if used == budget {
                out.push('…');
                return out;
            }
            out.push(ch);
            used += 1;
        }
        out.push_str(m.as_str());
        last = m.end();
    }
    for ch in s[last..].chars() {
        if used == budget {
            out.push('…');
            return out;
        }
        out.push(ch);
        used += 1;
    }
    out.push('…');
    out
}

/// True when the chunk contains a complete CSI sequence other than SGR,
/// a device-status report (`6n`) or show-cursor (`?25h`) — the latter two
/// are emitted spuriously by the PTY backend at spawn on Windows. A chunk
/// that ends mid-escape never matches; judgement is deferred to the chunk
/// that completes the sequence.
pub fn not_simple_log(chunk: &str) -> bool {
    CSI_REGEX.find_iter(chunk).any(|m| {
        let seq = m.as_str();
        !(is_sgr(seq) || seq == "\x1b[6n" || seq == SHOW_CURSOR)
    })
}

fn is_sgr(seq: &str) -> bool {
    SGR_REGEX
        .find(seq)
        .is_some_and(|m| m.start() == 0 && m.end() == seq.len())
}

/// The substring after the last `\n` or `\r`, with a leading SGR reset
/// consumed so a reset emitted right after a newline doesn't count as
/// line content.
pub fn last_line(s: &str) -> &str {
    let start = s.rfind(['\n', '\r']).map(|i| i + 1).unwrap_or(0);
    let tail = &s[start..];
    for reset in ["\x1b[0m", "\x1b[m"] {
        if let Some(rest) = tail.strip_prefix(reset) {
            return rest;
        }
    }
    tail
}

/// Split on `\r\n`, `\n`, or a lone `\r` — the three line terminators
/// terminals produce. The final (possibly still-open) line is included.
pub fn split_lines(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                out.push(&s[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                out.push(&s[start..i]);
                i += 1;
                if i < bytes.len() && bytes[i] == b'\n' {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    out.push(&s[start..]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseKind,
    /// 0-based column.
    pub x: usize,
    /// 0-based row.
    pub y: usize,
}

/// Parse an SGR-1006 mouse report for button 0. Anything else is `None`.
pub fn parse_mouse(s: &str) -> Option<MouseEvent> {
    let caps = MOUSE_REGEX.captures(s)?;
    let x: usize = caps[1].parse().ok()?;
    let y: usize = caps[2].parse().ok()?;
    let kind = if &caps[3] == "M" {
        MouseKind::Down
    } else {
        MouseKind::Up
    };
    Some(MouseEvent {
        kind,
        x: x.saturating_sub(1),
        y: y.saturating_sub(1),
    })
}

/// Length of an incomplete UTF-8 sequence at the end of `bytes`, if any.
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    for back in 1..=3 {
        if back > bytes.len() {
            break;
        }
        let b = bytes[bytes.len() - back];
        if b < 0x80 {
            return 0;
        }
        let need = if b >= 0xF0 {
            4
        } else if b >= 0xE0 {
            3
        } else if b >= 0xC0 {
            2
        } else {
            0 // continuation byte, keep scanning backwards
        };
        if need > back {
            return back;
        }
        if need != 0 {
            return 0;
        }
    }
    0
}

/// Decode a raw PTY read into text, carrying an incomplete trailing UTF-8
/// sequence over to the next call so multi-byte characters split across
/// reads survive intact. Truly invalid bytes are replaced.
pub fn decode_chunk(carry: &mut Vec<u8>, incoming: &[u8]) -> String {
    carry.extend_from_slice(incoming);
    let keep = incomplete_utf8_suffix(carry);
    let split = carry.len() - keep;
    let text = String::from_utf8_lossy(&carry[..split]).into_owned();
    carry.drain(..split);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sgr() {
        assert_eq!(strip_sgr("\x1b[1mbold\x1b[m"), "bold");
        assert_eq!(strip_sgr("\x1b[38;5;196mred\x1b[0m rest"), "red rest");
        assert_eq!(strip_sgr("no escapes"), "no escapes");
        // Non-SGR sequences survive.
        assert_eq!(strip_sgr("\x1b[2Jcleared"), "\x1b[2Jcleared");
    }

    #[test]
    fn test_strip_sgr_idempotent() {
        let s = "\x1b[1ma\x1b[31mb\x1b[mc";
        assert_eq!(strip_sgr(&strip_sgr(s)), strip_sgr(s));
    }

    #[test]
    fn test_truncate_short_input_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("hello world", 5), "hell…");
    }

    #[test]
    fn test_truncate_preserves_sgr() {
        let s = "\x1b[1mhello world\x1b[m";
        // SGR does not count toward the width.
        assert_eq!(truncate(s, 20), s);
        assert_eq!(truncate(s, 5), "\x1b[1mhell…");
    }

    #[test]
    fn test_truncate_roundtrip_with_strip() {
        let s = "\x1b[31mhello world\x1b[m";
        let t = truncate(s, 7);
        assert_eq!(strip_sgr(&t), truncate(&strip_sgr(s), 7));
    }

    #[test]
    fn test_truncate_tiny_width() {
        assert_eq!(truncate("abc", 1), "…");
        assert_eq!(truncate("\x1b[1mabc", 1), "\x1b[1m…");
    }

    #[test]
    fn test_not_simple_log_plain_and_sgr() {
        assert!(!not_simple_log("plain text\n"));
        assert!(!not_simple_log("\x1b[32mgreen\x1b[m\n"));
    }

    #[test]
    fn test_not_simple_log_permits_spawn_noise() {
        assert!(!not_simple_log("\x1b[6n"));
        assert!(!not_simple_log("\x1b[?25h"));
    }

    #[test]
    fn test_not_simple_log_cursor_control() {
        assert!(not_simple_log("\x1b[2J"));
        assert!(not_simple_log("\x1b[1A"));
        assert!(not_simple_log("\x1b[?1049h"));
        assert!(not_simple_log("\x1b[?25l"));
    }

    #[test]
    fn test_not_simple_log_defers_split_escape() {
        // A chunk ending mid-sequence is not judged yet.
        assert!(!not_simple_log("text \x1b[1"));
        // A complete cursor-position sequence is.
        assert!(not_simple_log("\x1b[12;4H"));
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\nb\nc"), "c");
        assert_eq!(last_line("a\rb"), "b");
        assert_eq!(last_line("no newline"), "no newline");
        assert_eq!(last_line("a\n"), "");
        assert_eq!(last_line("a\n\x1b[0mtail"), "tail");
        assert_eq!(last_line("a\n\x1b[mtail"), "tail");
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\nb\rc"), vec!["a", "b", "c"]);
        assert_eq!(split_lines("open"), vec!["open"]);
        assert_eq!(split_lines("done\n"), vec!["done", ""]);
    }

    #[test]
    fn test_parse_mouse() {
        assert_eq!(
            parse_mouse("\x1b[<0;5;3M"),
            Some(MouseEvent {
                kind: MouseKind::Down,
                x: 4,
                y: 2
            })
        );
        assert_eq!(
            parse_mouse("\x1b[<0;1;1m"),
            Some(MouseEvent {
                kind: MouseKind::Up,
                x: 0,
                y: 0
            })
        );
        assert_eq!(parse_mouse("\x1b[<2;5;3M"), None);
        assert_eq!(parse_mouse("x"), None);
    }

    #[test]
    fn test_visible_width_ignores_csi() {
        assert_eq!(visible_width("abc"), 3);
        assert_eq!(visible_width("\x1b[1mab\x1b[3Gc"), 3);
    }

    #[test]
    fn test_decode_chunk_carries_split_utf8() {
        let mut carry = Vec::new();
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte é.
        let first = decode_chunk(&mut carry, &bytes[..2]);
        assert_eq!(first, "h");
        let rest = decode_chunk(&mut carry, &bytes[2..]);
        assert_eq!(rest, "éllo");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_decode_chunk_replaces_invalid() {
        let mut carry = Vec::new();
        let text = decode_chunk(&mut carry, &[b'a', 0xFF, b'b']);
        assert_eq!(text, "a\u{FFFD}b");
    }
}
