use lme_core::format::{format_session, rule};
use lme_core::Session;

/// One ranked hit: an optional score line followed by the session.
pub(crate) struct Hit<'a> {
    pub score_line: Option<String>,
    pub session: &'a Session,
}

/// Header, blank line, then each hit behind a horizontal rule.
pub(crate) fn ranked(header: String, hits: &[Hit<'_>]) -> String {
    let mut lines = vec![header, String::new()];
    for hit in hits {
        lines.push(rule());
        if let Some(score) = &hit.score_line {
            lines.push(score.clone());
        }
        lines.push(format_session(hit.session));
    }
    lines.join("\n")
}

/// `[idx] date - id (n turns)`
pub(crate) fn listing_line(index: usize, session: &Session) -> String {
    format!(
        "[{index}] {} - {} ({} turns)",
        session.date,
        session.session_id,
        session.turns.len()
    )
}

pub(crate) fn invalid_index(kind: &str, index: i64, len: usize) -> String {
    format!(
        "Error: Invalid {kind} index {index}. Valid range: 0-{}",
        len as i64 - 1
    )
}

/// Checked conversion of a model-supplied index.
pub(crate) fn in_range(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < len)
}
