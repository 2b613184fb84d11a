//! Closure descriptor (§3 "Closure Descriptor", §4.2 Closure Pass).

use crate::node::Pos;
use bitflags::bitflags;

bitflags! {
    /// Per-capture flags recorded during capture analysis (§4.2, §4.3).
    pub struct CaptureFlags: u8 {
        const IS_SLICE = 0b01;
        const MOVE_ONLY = 0b10;
    }
}

#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub ty: String,
    pub flags: CaptureFlags,
}

impl Capture {
    pub fn is_move_only(&self) -> bool {
        self.flags.contains(CaptureFlags::MOVE_ONLY)
    }

    pub fn is_slice(&self) -> bool {
        self.flags.contains(CaptureFlags::IS_SLICE)
    }
}

/// Up to two closure parameters, per §4.2's "up to two parameters" limit.
#[derive(Debug, Clone, Default)]
pub struct ClosureParams {
    pub params: Vec<(String, String)>, // (name, type), len <= 2
}

impl ClosureParams {
    pub fn count(&self) -> usize {
        self.params.len()
    }
}

/// A single closure literal, scanned and recorded by the Closure Pass
/// (§4.2). `id` is globally unique across the translation unit, assigned
/// by a monotonically-increasing generator threaded through the scan
/// (§9 "Globally mutable closure id counter").
#[derive(Debug, Clone)]
pub struct ClosureDescriptor {
    pub id: u32,
    pub start: Pos,
    pub end: Pos,
    pub params: ClosureParams,
    pub captures: Vec<Capture>,
    pub body: String,
    pub enclosing_nursery_id: Option<u32>,
}

impl ClosureDescriptor {
    pub fn has_captures(&self) -> bool {
        !self.captures.is_empty()
    }

    pub fn move_only_captures(&self) -> impl Iterator<Item = &Capture> {
        self.captures.iter().filter(|c| c.is_move_only())
    }
}

/// Monotonic id generator for closures, threaded explicitly through scans
/// rather than held as global mutable state (§9). Starts at 1.
pub struct IdGen(u32);

impl IdGen {
    pub fn new() -> Self {
        IdGen(0)
    }

    pub fn next(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }
}

impl Default for IdGen {
    fn default() -> Self {
        IdGen::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_gen_starts_at_one_and_increments() {
        let mut gen = IdGen::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
    }

    #[test]
    fn move_only_captures_filters_by_flag() {
        let c1 = Capture { name: "a".into(), ty: "CCSlice".into(), flags: CaptureFlags::IS_SLICE | CaptureFlags::MOVE_ONLY };
        let c2 = Capture { name: "b".into(), ty: "int".into(), flags: CaptureFlags::empty() };
        let desc = ClosureDescriptor {
            id: 1,
            start: Pos::new(1, 1),
            end: Pos::new(1, 10),
            params: ClosureParams::default(),
            captures: vec![c1, c2],
            body: "()".into(),
            enclosing_nursery_id: None,
        };
        let names: Vec<_> = desc.move_only_captures().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
