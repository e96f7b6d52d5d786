//! Keyboard labels for commands.
//!
//! Commands are addressed by a fixed 61-character alphabet: the digits
//! `1-9`, then `a-z`, then `A-Z`. Commands past the 61st get no label.

/// The full label alphabet, in assignment order.
pub const ALPHABET: &str = "123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const GROUPS: [&str; 3] = ["123456789", "abcdefghijklmnopqrstuvwxyz", "ABCDEFGHIJKLMNOPQRSTUVWXYZ"];

/// Label for the i-th command, or `None` from the 62nd on.
pub fn label(index: usize) -> Option<char> {
    ALPHABET.chars().nth(index)
}

/// Collapse the first `n` labels into a compact range string such as
/// `1-9/a-c`. Each group contributes either a single character or
/// `first-last`; exhausted input stops the summary.
pub fn summarize(n: usize) -> String {
    let mut remaining = n.min(ALPHABET.len());
    let mut parts = Vec::new();
    for group in GROUPS {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(group.len());
        let first = &group[..1];
        if take == 1 {
            parts.push(first.to_string());
        } else {
            parts.push(format!("{}-{}", first, &group[take - 1..take]));
        }
        remaining -= take;
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_length() {
        assert_eq!(ALPHABET.len(), 61);
    }

    #[test]
    fn test_label_assignment() {
        assert_eq!(label(0), Some('1'));
        assert_eq!(label(8), Some('9'));
        assert_eq!(label(9), Some('a'));
        assert_eq!(label(34), Some('z'));
        assert_eq!(label(35), Some('A'));
        assert_eq!(label(60), Some('Z'));
        assert_eq!(label(61), None);
        assert_eq!(label(100), None);
    }

    #[test]
    fn test_summarize_table() {
        let cases = [
            (0, ""),
            (1, "1"),
            (2, "1-2"),
            (8, "1-8"),
            (9, "1-9"),
            (10, "1-9/a"),
            (11, "1-9/a-b"),
            (12, "1-9/a-c"),
            (34, "1-9/a-y"),
            (35, "1-9/a-z"),
            (36, "1-9/a-z/A"),
            (37, "1-9/a-z/A-B"),
            (38, "1-9/a-z/A-C"),
            (60, "1-9/a-z/A-Y"),
            (61, "1-9/a-z/A-Z"),
            (62, "1-9/a-z/A-Z"),
        ];
        for (n, expected) in cases {
            assert_eq!(summarize(n), expected, "summarize({n})");
        }
    }
}
