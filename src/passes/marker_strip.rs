//! Marker Strip (§4.8): final byte-level pass removing residual `@async`,
//! `@noblock`, `@latency_sensitive` attribute tokens (with their trailing
//! space) so the output is valid C.

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;

const MARKERS: &[&str] = &["@async", "@noblock", "@latency_sensitive"];

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut edits = EditBuffer::new();
    let source = &ctx.source;

    for marker in MARKERS {
        let mut search_from = 0usize;
        while let Some(rel) = source[search_from..].find(marker) {
            let start = search_from + rel;
            let end = start + marker.len();
            let followed_by_word_boundary = source.as_bytes().get(end).is_some_and(|&b| {
                !(b.is_ascii_alphanumeric() || b == b'_')
            });
            if followed_by_word_boundary {
                let strip_end = if source.as_bytes().get(end) == Some(&b' ') { end + 1 } else { end };
                if !edits.overlaps(start, strip_end) {
                    edits.push(Edit::new(start, strip_end, String::new(), "marker_strip"));
                }
            }
            search_from = end;
        }
    }

    log::debug!("marker_strip: removed {} marker(s)", crate::util::fmt_count_human(edits.len()));
    if !edits.is_empty() {
        let out = edits.apply(&ctx.source)?;
        ctx.set_source(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::{StubAst, SymbolTable};
    use crate::type_registry::TypeRegistry;

    fn ctx(src: &str) -> PassCtx {
        PassCtx::new(src.to_string(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new())
    }

    #[test]
    fn strips_async_marker_with_trailing_space() {
        let mut c = ctx("@async int f(void) { return 0; }\n");
        run(&mut c).unwrap();
        assert_eq!(c.source, "int f(void) { return 0; }\n");
    }

    #[test]
    fn strips_all_three_marker_kinds() {
        let mut c = ctx("@async @noblock @latency_sensitive void f(void);\n");
        run(&mut c).unwrap();
        assert_eq!(c.source, "void f(void);\n");
    }

    #[test]
    fn does_not_strip_identifiers_that_merely_contain_a_marker_name() {
        let mut c = ctx("int async_helper(void);\n");
        run(&mut c).unwrap();
        assert_eq!(c.source, "int async_helper(void);\n");
    }

    #[test]
    fn is_idempotent() {
        let mut c = ctx("@async void f(void);\n");
        run(&mut c).unwrap();
        let once = c.source.clone();
        run(&mut c).unwrap();
        assert_eq!(c.source, once);
    }
}
