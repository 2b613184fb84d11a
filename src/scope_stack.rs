//! A vector of scope frames shared by the Slice Check, Closure, and
//! Arena/Defer/Nursery passes — replaces the "array of pointer arrays"
//! idiom with one `Vec<Frame>`, frames popped on a closing brace (§9).

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub ty: String,
    pub is_move_only_slice: bool,
    pub moved: bool,
}

#[derive(Debug, Default)]
pub struct Frame {
    pub decls: Vec<Decl>,
    /// Active `@defer` items recorded at this depth, innermost-last (§4.7).
    pub defers: Vec<DeferItem>,
    /// Nursery id opened at this depth, if any (§4.7).
    pub nursery_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DeferItem {
    pub line: u32,
    pub name: Option<String>,
    pub stmt_text: String,
    pub active: bool,
}

#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { frames: vec![Frame::default()] }
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the current frame, returning its defers in LIFO fire order.
    pub fn pop_scope(&mut self) -> Frame {
        self.frames.pop().unwrap_or_default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: impl Into<String>, is_move_only_slice: bool) {
        self.frames.last_mut().unwrap().decls.push(Decl {
            name: name.into(),
            ty: ty.into(),
            is_move_only_slice,
            moved: false,
        });
    }

    /// Find a declaration by name, searching from the innermost frame out.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Decl> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(decl) = frame.decls.iter_mut().find(|d| d.name == name) {
                return Some(decl);
            }
        }
        None
    }

    pub fn find(&self, name: &str) -> Option<&Decl> {
        for frame in self.frames.iter().rev() {
            if let Some(decl) = frame.decls.iter().find(|d| d.name == name) {
                return Some(decl);
            }
        }
        None
    }

    /// Every declared name visible at the current depth or above, for
    /// capture analysis (§4.2): anything at depth ≥ 1 is a capture
    /// candidate; globals (depth 0) are excluded.
    pub fn visible_above_global(&self) -> impl Iterator<Item = &Decl> {
        self.frames.iter().skip(1).flat_map(|f| f.decls.iter())
    }

    pub fn add_defer(&mut self, item: DeferItem) {
        self.frames.last_mut().unwrap().defers.push(item);
    }

    pub fn cancel_defer(&mut self, name: &str) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(d) = frame.defers.iter_mut().find(|d| d.name.as_deref() == Some(name)) {
                d.active = false;
                return;
            }
        }
    }

    pub fn set_current_nursery(&mut self, id: u32) {
        self.frames.last_mut().unwrap().nursery_id = Some(id);
    }

    pub fn enclosing_nursery(&self) -> Option<u32> {
        self.frames.iter().rev().find_map(|f| f.nursery_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_shadow_in_inner_scopes() {
        let mut stack = ScopeStack::new();
        stack.declare("x", "int", false);
        stack.push_scope();
        stack.declare("x", "CCSlice", true);
        assert!(stack.find("x").unwrap().is_move_only_slice);
        stack.pop_scope();
        assert!(!stack.find("x").unwrap().is_move_only_slice);
    }

    #[test]
    fn defers_fire_in_lifo_order_on_pop() {
        let mut stack = ScopeStack::new();
        stack.add_defer(DeferItem { line: 1, name: None, stmt_text: "a();".into(), active: true });
        stack.add_defer(DeferItem { line: 2, name: None, stmt_text: "b();".into(), active: true });
        let frame = stack.pop_scope();
        let active: Vec<_> = frame.defers.iter().rev().filter(|d| d.active).map(|d| d.stmt_text.as_str()).collect();
        assert_eq!(active, vec!["b();", "a();"]);
    }

    #[test]
    fn cancelled_defer_is_skipped_on_fire() {
        let mut stack = ScopeStack::new();
        stack.add_defer(DeferItem { line: 1, name: Some("d".into()), stmt_text: "a();".into(), active: true });
        stack.cancel_defer("d");
        let frame = stack.pop_scope();
        assert!(!frame.defers[0].active);
    }

    #[test]
    fn globals_are_excluded_from_capture_candidates() {
        let mut stack = ScopeStack::new();
        stack.declare("g", "int", false);
        stack.push_scope();
        stack.declare("local", "int", false);
        let names: Vec<_> = stack.visible_above_global().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["local"]);
    }

    #[test]
    fn enclosing_nursery_looks_up_the_stack() {
        let mut stack = ScopeStack::new();
        stack.set_current_nursery(1);
        stack.push_scope();
        assert_eq!(stack.enclosing_nursery(), Some(1));
    }
}
