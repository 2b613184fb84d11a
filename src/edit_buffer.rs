//! Non-overlapping text edits applied to a buffer in one descending sweep.
//!
//! Every pass produces a sequence of `(range, replacement)` edits rather than
//! mutating the buffer as it walks it — splicing while scanning would shift
//! the offsets the scan still needs. Applying right-to-left (descending start
//! offset) means earlier edits never invalidate the byte ranges of edits not
//! yet applied.

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
    pub tag: &'static str,
}

impl Edit {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>, tag: &'static str) -> Self {
        Edit { start, end, replacement: replacement.into(), tag }
    }
}

#[derive(Default)]
pub struct EditBuffer {
    edits: Vec<Edit>,
}

impl EditBuffer {
    pub fn new() -> Self {
        EditBuffer::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Whether `start..end` overlaps any edit already recorded.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.edits.iter().any(|e| start < e.end && e.start < end)
    }

    /// Apply every recorded edit to `source` in one descending-offset sweep.
    /// Errors if two edits overlap — every pass is responsible for not
    /// recording overlapping spans (§3 invariant).
    pub fn apply(mut self, source: &str) -> Result<String> {
        self.edits.sort_by(|a, b| b.start.cmp(&a.start));

        for w in self.edits.windows(2) {
            let (later, earlier) = (&w[0], &w[1]);
            if later.start < earlier.end {
                bail!(
                    "overlapping edits: [{}, {}) ({}) and [{}, {}) ({})",
                    earlier.start, earlier.end, earlier.tag,
                    later.start, later.end, later.tag,
                );
            }
        }

        let mut out = source.to_string();
        for edit in &self.edits {
            if edit.end > out.len() || edit.start > edit.end {
                bail!("edit {} out of bounds: [{}, {})", edit.tag, edit.start, edit.end);
            }
            out.replace_range(edit.start..edit.end, &edit.replacement);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_edits_right_to_left() {
        let mut buf = EditBuffer::new();
        buf.push(Edit::new(2, 3, "XX", "t"));
        buf.push(Edit::new(0, 1, "YY", "t"));
        let out = buf.apply("abc").unwrap();
        assert_eq!(out, "YYbXX");
    }

    #[test]
    fn rejects_overlapping_edits() {
        let mut buf = EditBuffer::new();
        buf.push(Edit::new(0, 3, "a", "t"));
        buf.push(Edit::new(2, 4, "b", "t"));
        assert!(buf.apply("abcdef").is_err());
    }

    #[test]
    fn empty_buffer_is_identity() {
        let buf = EditBuffer::new();
        assert_eq!(buf.apply("unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn overlaps_detects_partial_overlap() {
        let mut buf = EditBuffer::new();
        buf.push(Edit::new(5, 10, "x", "t"));
        assert!(buf.overlaps(8, 12));
        assert!(!buf.overlaps(10, 12));
    }
}
