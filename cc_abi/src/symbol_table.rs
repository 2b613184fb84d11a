//! Symbol table (§3, component D): function name → attribute bitset lookup.

use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    pub struct FnAttrs: u32 {
        const ASYNC = 0b001;
        const NOBLOCK = 0b010;
        const LATENCY_SENSITIVE = 0b100;
    }
}

#[derive(Default)]
pub struct SymbolTable {
    attrs: HashMap<String, FnAttrs>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, attrs: FnAttrs) {
        self.attrs.insert(name.into(), attrs);
    }

    pub fn attrs_of(&self, name: &str) -> FnAttrs {
        self.attrs.get(name).copied().unwrap_or(FnAttrs::empty())
    }

    pub fn is_async(&self, name: &str) -> bool {
        self.attrs_of(name).contains(FnAttrs::ASYNC)
    }

    pub fn is_noblock(&self, name: &str) -> bool {
        self.attrs_of(name).contains(FnAttrs::NOBLOCK)
    }

    /// Per §4.4: unknown callees are assumed blocking, so this returns
    /// `false` for any name never declared.
    pub fn is_blocking(&self, name: &str) -> bool {
        !self.is_async(name) && !self.is_noblock(name)
    }

    pub fn is_latency_sensitive(&self, name: &str) -> bool {
        self.attrs_of(name).contains(FnAttrs::LATENCY_SENSITIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_callee_is_assumed_blocking() {
        let st = SymbolTable::new();
        assert!(st.is_blocking("mystery_fn"));
    }

    #[test]
    fn async_and_noblock_declarations_are_not_blocking() {
        let mut st = SymbolTable::new();
        st.declare("do_io", FnAttrs::ASYNC);
        st.declare("fast_path", FnAttrs::NOBLOCK);
        assert!(!st.is_blocking("do_io"));
        assert!(!st.is_blocking("fast_path"));
        assert!(st.is_async("do_io"));
        assert!(!st.is_async("fast_path"));
    }
}
