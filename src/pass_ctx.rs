//! `PassCtx`: the one place that owns everything a pass needs (§9 "cyclic
//! include of pipeline state"). Each pass borrows from it rather than the
//! pipeline threading five separate parameters through every call.

use cc_abi::{ClosureDescriptor, Diagnostics, SpawnThunk, StubAst, SymbolTable};

use crate::type_registry::TypeRegistry;

pub struct PassCtx {
    pub source: String,
    pub ast: StubAst,
    pub symbols: SymbolTable,
    pub type_registry: TypeRegistry,
    pub diagnostics: Diagnostics,
    pub closures: Vec<ClosureDescriptor>,
    pub closure_id_gen: cc_abi::IdGen,
    pub spawn_thunks: Vec<SpawnThunk>,
    pub spawn_thunk_id_gen: cc_abi::IdGen,
}

impl PassCtx {
    pub fn new(source: String, ast: StubAst, symbols: SymbolTable, type_registry: TypeRegistry) -> Self {
        PassCtx {
            source,
            ast,
            symbols,
            type_registry,
            diagnostics: Diagnostics::new(),
            closures: Vec::new(),
            closure_id_gen: cc_abi::IdGen::new(),
            spawn_thunks: Vec::new(),
            spawn_thunk_id_gen: cc_abi::IdGen::new(),
        }
    }

    /// Replace the owned buffer with a pass's output, consuming it.
    pub fn set_source(&mut self, new_source: String) {
        self.source = new_source;
    }

    pub fn has_fatal_diagnostics(&self) -> bool {
        self.diagnostics.has_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::{Diagnostic, DiagnosticKind, Severity};

    #[test]
    fn set_source_replaces_buffer() {
        let mut ctx = PassCtx::new("a".into(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        ctx.set_source("b".into());
        assert_eq!(ctx.source, "b");
    }

    #[test]
    fn fatal_diagnostics_are_visible_through_ctx() {
        let mut ctx = PassCtx::new(String::new(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        assert!(!ctx.has_fatal_diagnostics());
        ctx.diagnostics.emit(Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::UseAfterMove,
            file: "t.cc".into(),
            line: 1,
            col: None,
            message: "boom".into(),
        });
        assert!(ctx.has_fatal_diagnostics());
    }
}
