//! Stub-AST view (§3, component B).
//!
//! A read-only array of `Node`s indexed by the passes. The stub AST is not
//! a tree: passes locate related nodes by scanning for spans nested inside
//! a parent's line range rather than following child pointers, mirroring
//! how the C front end hands the array over flat. `StubAst` wraps the
//! array with the handful of lookups every pass needs: nodes overlapping a
//! line range, the nearest enclosing DECL_ITEM, and nodes of a given kind
//! in source order.

use anyhow::{Context, Result};

use crate::node::{Node, NodeKind, RawNode};

pub struct StubAst {
    nodes: Vec<Node>,
}

impl StubAst {
    pub fn new(nodes: Vec<Node>) -> Self {
        StubAst { nodes }
    }

    /// Load a stub AST from the front end's JSON fixture format: an array
    /// of `RawNode` records with numeric kind tags (§4.11).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: Vec<RawNode> = serde_json::from_slice(bytes).context("parsing stub-AST JSON fixture")?;
        Ok(StubAst::new(raw.into_iter().map(Node::from).collect()))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    /// All nodes of a given kind, in array (source) order.
    pub fn of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// All CALL nodes flagged as UFCS calls.
    pub fn ufcs_calls(&self) -> impl Iterator<Item = &Node> {
        self.of_kind(NodeKind::Call).filter(|n| n.is_ufcs_call())
    }

    /// All AWAIT nodes.
    pub fn awaits(&self) -> impl Iterator<Item = &Node> {
        self.of_kind(NodeKind::Await)
    }

    /// The DECL_ITEM enclosing `line`, if any — the one whose span contains
    /// `line` with the tightest (smallest) span.
    pub fn enclosing_decl(&self, line: u32) -> Option<&Node> {
        self.of_kind(NodeKind::DeclItem)
            .filter(|n| n.span.start.line <= line && line <= n.span.end.line)
            .min_by_key(|n| n.span.line_count())
    }

    /// Whether `line` falls inside an `@async` function body.
    pub fn line_is_in_async_fn(&self, line: u32) -> bool {
        self.enclosing_decl(line).is_some_and(|d| d.is_async_decl())
    }

    /// Nodes whose span is fully contained in `[start_line, end_line]`.
    pub fn nodes_in_range(&self, start_line: u32, end_line: u32) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(move |n| n.span.start.line >= start_line && n.span.end.line <= end_line)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
