//! Append-only output accumulator with size and line-count tracking.

use serde::Serialize;

/// Accumulated stdout for one session.
///
/// Append-only; `size_bytes` always equals the byte length of the stored
/// text and is the authoritative value for ceiling checks.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputBuffer {
    data: String,
    newline_count: usize,
}

impl OutputBuffer {
    /// Append a chunk of process output.
    pub fn append(&mut self, chunk: &str) {
        self.newline_count += chunk.matches('\n').count();
        self.data.push_str(chunk);
    }

    /// Byte length of the accumulated output.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Number of lines under `str::lines` semantics: a trailing newline
    /// does not open an empty final line, and an empty buffer has zero.
    #[must_use]
    pub fn line_count(&self) -> usize {
        if self.data.is_empty() {
            0
        } else if self.data.ends_with('\n') {
            self.newline_count
        } else {
            self.newline_count + 1
        }
    }

    /// Borrow the accumulated text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Whether anything has been accumulated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
