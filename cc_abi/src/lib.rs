//! Data-model and ABI crate: the stub-AST, slice, and closure types shared
//! between every lowering pass, plus the diagnostics sink they report
//! through. Kept separate from the pipeline crate so the numeric-tag
//! boundary (aux2 bitfields, `NodeKind` raw tags, the `CCSlice` layout) has
//! one owner.

pub mod ast;
pub mod bitmask;
pub mod closure_desc;
pub mod diagnostics;
pub mod node;
pub mod slice;
pub mod source;
pub mod spawn_thunk;
pub mod symbol_table;

pub use ast::StubAst;
pub use closure_desc::{Capture, CaptureFlags, ClosureDescriptor, ClosureParams, IdGen};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use node::{Node, NodeKind, Pos, Span};
pub use slice::{SliceFlags, SliceId, SliceValue};
pub use source::SourceBuffer;
pub use spawn_thunk::SpawnThunk;
pub use symbol_table::{FnAttrs, SymbolTable};
