//! Source buffer (§3 "Source Buffer", component A).
//!
//! An owning byte string plus line/column offset utilities. Input is
//! treated as an opaque byte sequence — non-ASCII bytes are preserved
//! transparently and spans are never allowed to straddle a UTF-8 boundary
//! (callers that construct spans from byte offsets go through
//! `offset_to_pos`/`pos_to_offset`, which only ever land on line starts and
//! ASCII delimiters found by the passes).

use crate::node::Pos;

/// An owning source buffer with a precomputed line-start index.
pub struct SourceBuffer {
    path: String,
    bytes: Vec<u8>,
    /// Byte offset of the start of each line; `line_starts[0] == 0`.
    line_starts: Vec<usize>,
}

impl SourceBuffer {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let line_starts = compute_line_starts(&bytes);
        SourceBuffer { path: path.into(), bytes, line_starts }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Number of newline bytes in the buffer.
    pub fn newline_count(&self) -> usize {
        self.bytes.iter().filter(|&&b| b == b'\n').count()
    }

    /// The text of one 1-based line, without its trailing newline.
    pub fn line_text(&self, line: u32) -> &str {
        let start = self.line_byte_start(line);
        let end = self.line_byte_end(line);
        std::str::from_utf8(&self.bytes[start..end]).unwrap_or("")
    }

    fn line_byte_start(&self, line: u32) -> usize {
        self.line_starts
            .get((line.saturating_sub(1)) as usize)
            .copied()
            .unwrap_or(self.bytes.len())
    }

    fn line_byte_end(&self, line: u32) -> usize {
        let start = self.line_byte_start(line);
        self.bytes[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|rel| start + rel)
            .unwrap_or(self.bytes.len())
    }

    /// Convert a byte offset into a 1-based (line, column) position.
    pub fn offset_to_pos(&self, offset: usize) -> Pos {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        Pos::new((line_idx + 1) as u32, (offset - line_start + 1) as u32)
    }

    /// Convert a 1-based (line, column) position into a byte offset.
    pub fn pos_to_offset(&self, pos: Pos) -> usize {
        self.line_byte_start(pos.line) + (pos.col.saturating_sub(1)) as usize
    }
}

fn compute_line_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}
