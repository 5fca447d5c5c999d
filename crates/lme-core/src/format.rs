//! Session rendering for tool output.

use crate::session::Session;

/// Rule printed between ranked sessions.
pub const RULE_WIDTH: usize = 60;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Capitalize the first letter of every alphabetic run and lowercase the rest,
/// so `"assistant"` renders as `"Assistant"` and `"tool_call"` as `"Tool_Call"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn push_turns(lines: &mut Vec<String>, session: &Session) {
    for turn in &session.turns {
        lines.push(format!("{}: {}", title_case(&turn.role), turn.content));
        lines.push(String::new());
    }
}

/// `Session ID`, `Date`, a blank line, then one `Role: content` paragraph per
/// turn.
pub fn format_session(session: &Session) -> String {
    let mut lines = vec![
        format!("Session ID: {}", session.session_id),
        format!("Date: {}", session.date),
        String::new(),
    ];
    push_turns(&mut lines, session);
    lines.join("\n")
}

/// File-style rendering with an index banner and turn count.
pub fn format_file(session: &Session, index: usize) -> String {
    let mut lines = vec![
        format!("=== File [{index}] ==="),
        format!("Session ID: {}", session.session_id),
        format!("Date: {}", session.date),
        format!("Turns: {}", session.turns.len()),
        String::new(),
    ];
    push_turns(&mut lines, session);
    lines.join("\n")
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Window of roughly `max_len / 2` characters on each side of the first
/// case-insensitive occurrence of `needle`, with `...` on cut edges. Without a
/// match, the first `max_len` characters.
pub fn snippet_around(text: &str, needle: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let hay: Vec<char> = chars.iter().flat_map(|c| c.to_lowercase()).collect();
    let pat: Vec<char> = needle.chars().flat_map(|c| c.to_lowercase()).collect();

    // Lowercasing can change length for a few scripts; fall back to the head.
    let found = if hay.len() == chars.len() && !pat.is_empty() {
        hay.windows(pat.len()).position(|w| w == pat.as_slice())
    } else {
        None
    };
    let Some(idx) = found else {
        return chars.iter().take(max_len).collect();
    };

    let half = max_len / 2;
    let start = idx.saturating_sub(half);
    let end = (idx + pat.len() + half).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;

    fn session() -> Session {
        Session::new(
            "s1",
            "2023/05/20",
            vec![Turn::new("user", "hi"), Turn::new("assistant", "hello")],
        )
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("user"), "User");
        assert_eq!(title_case("ASSISTANT"), "Assistant");
        assert_eq!(title_case("tool_call"), "Tool_Call");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_format_session() {
        assert_eq!(
            format_session(&session()),
            "Session ID: s1\nDate: 2023/05/20\n\nUser: hi\n\nAssistant: hello\n"
        );
    }

    #[test]
    fn test_format_file() {
        let out = format_file(&session(), 4);
        assert!(out.starts_with("=== File [4] ===\nSession ID: s1\nDate: 2023/05/20\nTurns: 2\n\n"));
        assert!(out.ends_with("Assistant: hello\n"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 10), "ab");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
    }

    #[test]
    fn test_snippet_window_and_ellipses() {
        let text = format!("{}needle{}", "a".repeat(80), "b".repeat(80));
        let s = snippet_around(&text, "NEEDLE", 100);
        assert_eq!(s, format!("...{}needle{}...", "a".repeat(50), "b".repeat(50)));
    }

    #[test]
    fn test_snippet_short_text_no_ellipses() {
        assert_eq!(snippet_around("my Password is x", "password", 100), "my Password is x");
    }

    #[test]
    fn test_snippet_multibyte_does_not_panic() {
        let text = "émoji 🎉 party with the café crowd";
        assert_eq!(snippet_around(text, "café", 4), "...e café c...");
        assert_eq!(snippet_around(text, "missing", 5), "émoji");
    }
}
