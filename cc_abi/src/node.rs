//! Stub-AST node representation (§3 "Stub-AST Node").
//!
//! The stub AST is a flat, read-only array of span-bearing records produced
//! by the (out-of-scope) C parser front end. Unlike a full syntax tree it
//! carries no child lists — passes locate related nodes by scanning the
//! array for spans nested inside a parent's line range. Kind numbers and
//! aux2 bit assignments are part of the emitted-C ABI contract (§6) and
//! must stay stable; the numeric tag is kept only at this boundary; every
//! consumer in the pipeline matches on the `NodeKind` enum instead.

use serde::{Deserialize, Serialize};

/// A 1-based (line, column) position. Comparisons are lexicographic on
/// (line, column), matching source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl PartialOrd for Pos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.line, self.col).cmp(&(other.line, other.col))
    }
}

/// A byte-oriented span expressed in both line/column and resolved
/// byte-offset form. Spans never straddle UTF-8 boundaries (§3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        Span { start, end }
    }

    /// Number of source lines the span occupies (inclusive).
    pub fn line_count(&self) -> u32 {
        self.end.line - self.start.line + 1
    }

    pub fn is_multiline(&self) -> bool {
        self.end.line != self.start.line
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Node kinds the core lowering pipeline consumes (§3). The front end may
/// emit other kinds; unrecognized ones are preserved as `Other(u32)` so a
/// pass can skip them without losing the original numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Stmt,
    Arena,
    Call,
    Await,
    DeclItem,
    Assign,
    Return,
    Other(u32),
}

impl NodeKind {
    pub fn from_raw(raw: u32) -> NodeKind {
        match raw {
            3 => NodeKind::Stmt,
            4 => NodeKind::Arena,
            5 => NodeKind::Call,
            6 => NodeKind::Await,
            12 => NodeKind::DeclItem,
            14 => NodeKind::Assign,
            15 => NodeKind::Return,
            other => NodeKind::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            NodeKind::Stmt => 3,
            NodeKind::Arena => 4,
            NodeKind::Call => 5,
            NodeKind::Await => 6,
            NodeKind::DeclItem => 12,
            NodeKind::Assign => 14,
            NodeKind::Return => 15,
            NodeKind::Other(raw) => raw,
        }
    }
}

/// A single stub-AST record (§3). `parent` indexes another entry in the
/// same `StubAst` array, or is `None` for a root node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub file: String,
    pub span: Span,
    pub aux1: i64,
    pub aux2: u32,
    pub aux_s1: Option<String>,
    pub aux_s2: Option<String>,
}

/// Wire format for one node as the front end emits it: numeric kind tag,
/// separate line/col fields rather than a nested `Span` (§3, §9 "keep the
/// numeric tags only at the parse boundary").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawNode {
    pub kind: u32,
    pub parent_index: Option<usize>,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: u32,
    pub col_end: u32,
    pub aux1: i64,
    pub aux2: u32,
    pub aux_s1: Option<String>,
    pub aux_s2: Option<String>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Node {
            kind: NodeKind::from_raw(raw.kind),
            parent: raw.parent_index,
            file: raw.file,
            span: Span::new(Pos::new(raw.line_start, raw.col_start), Pos::new(raw.line_end, raw.col_end)),
            aux1: raw.aux1,
            aux2: raw.aux2,
            aux_s1: raw.aux_s1,
            aux_s2: raw.aux_s2,
        }
    }
}

impl Node {
    /// Whether this CALL node is marked as a UFCS call (aux2 bit 1).
    pub fn is_ufcs_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call) && crate::bitmask::call_aux2::is_ufcs(self.aux2)
    }

    /// Whether this DECL_ITEM carries `@async`.
    pub fn is_async_decl(&self) -> bool {
        matches!(self.kind, NodeKind::DeclItem) && crate::bitmask::decl_aux2::is_async(self.aux2)
    }

    pub fn is_noblock_decl(&self) -> bool {
        matches!(self.kind, NodeKind::DeclItem) && crate::bitmask::decl_aux2::is_noblock(self.aux2)
    }

    pub fn is_latency_sensitive_decl(&self) -> bool {
        matches!(self.kind, NodeKind::DeclItem)
            && crate::bitmask::decl_aux2::is_latency_sensitive(self.aux2)
    }

    /// Callee/method name (CALL.aux_s1) or declared name (DECL_ITEM.aux_s1).
    pub fn name(&self) -> Option<&str> {
        self.aux_s1.as_deref()
    }

    /// Receiver type name on a UFCS CALL, or the signature prefix on a
    /// DECL_ITEM.
    pub fn secondary_name(&self) -> Option<&str> {
        self.aux_s2.as_deref()
    }

    pub fn occurrence_on_line(&self) -> u32 {
        crate::bitmask::call_aux2::occurrence(self.aux2)
    }
}
