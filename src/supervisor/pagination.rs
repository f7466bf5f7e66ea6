//! Line-indexed windowed access to a session's accumulated output.
//!
//! The line split is recomputed against the then-current buffer on every
//! call; the buffer is bounded by the governor's output ceiling, so the
//! rescan cost is acceptable and there is no stale-cache hazard.

use serde::Serialize;

/// Default window size when the caller passes a non-positive limit.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One window of session output plus range metadata.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OutputPage {
    /// The requested lines joined with the original separator.
    pub text: String,
    /// Total lines in the buffer at the time of the call.
    pub total_lines: usize,
    /// First line of the window (0-indexed).
    pub start_line: usize,
    /// One past the last line of the window.
    pub end_line: usize,
    /// Whether lines beyond `end_line` exist.
    pub has_more: bool,
}

/// Serve a line window of `output`.
///
/// `offset` is clamped into `[0, line_count - 1]` (negative treated as
/// zero); a non-positive `limit` falls back to [`DEFAULT_PAGE_LIMIT`].
/// `full` overrides both and returns the entire buffer.
#[must_use]
pub fn paginate(output: &str, offset: i64, limit: i64, full: bool) -> OutputPage {
    let lines: Vec<&str> = output.lines().collect();
    let total_lines = lines.len();

    if full {
        return OutputPage {
            text: output.to_owned(),
            total_lines,
            start_line: 0,
            end_line: total_lines,
            has_more: false,
        };
    }

    let limit = usize::try_from(limit)
        .ok()
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = usize::try_from(offset).unwrap_or(0);
    let start_line = offset.min(total_lines.saturating_sub(1));
    let end_line = start_line.saturating_add(limit).min(total_lines);

    OutputPage {
        text: lines[start_line..end_line].join("\n"),
        total_lines,
        start_line,
        end_line,
        has_more: end_line < total_lines,
    }
}
