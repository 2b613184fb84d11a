//! Async State-Machine Lowering (§4.6): turn an `@async fn` whose body is
//! exactly `return expr;` or `return await callee();` into a poll-based
//! state machine returning a `CCTaskIntptr`, preserving the function's
//! original line count so downstream `#line` directives stay valid.

use cc_abi::{NodeKind, Pos, SourceBuffer};

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;

enum BodyShape {
    Direct(String),
    AwaitCall(String),
}

fn classify_body(body: &str) -> Option<BodyShape> {
    let body = body.trim();
    let inner = body.strip_prefix('{')?.strip_suffix('}')?.trim();
    let stmt = inner.strip_prefix("return")?.trim();
    let stmt = stmt.strip_suffix(';')?.trim();
    if stmt.is_empty() {
        return None;
    }
    // Reject bodies with more than one statement.
    if inner.matches(';').count() > 1 {
        return None;
    }
    if let Some(rest) = stmt.strip_prefix("await ") {
        Some(BodyShape::AwaitCall(rest.trim().to_string()))
    } else {
        Some(BodyShape::Direct(stmt.to_string()))
    }
}

fn render_direct(name: &str, expr: &str) -> String {
    format!(
        "typedef struct {{ int state; intptr_t result; }} __cc_frame_{name};\n\
         static int __cc_poll_{name}(__cc_frame_{name} *f) {{\n\
         switch (f->state) {{\n\
         case 0: f->result = (intptr_t)({expr}); f->state = 1; return CC_TASK_READY;\n\
         }}\n\
         return CC_TASK_READY;\n\
         }}\n\
         static void __cc_drop_{name}(void *p) {{ free(p); }}\n\
         CCTaskIntptr {name}(void) {{\n\
         __cc_frame_{name} *f = calloc(1, sizeof(*f));\n\
         return cc_task_intptr_make_poll((void*)__cc_poll_{name}, f, __cc_drop_{name});\n\
         }}\n",
        name = name,
    )
}

fn render_await(name: &str, callee_call: &str) -> String {
    format!(
        "typedef struct {{ int state; CCTaskIntptr inner; intptr_t result; }} __cc_frame_{name};\n\
         static int __cc_poll_{name}(__cc_frame_{name} *f) {{\n\
         switch (f->state) {{\n\
         case 0: f->inner = {callee_call}; f->state = 1; /* fallthrough */\n\
         case 1:\n\
         if (!cc_task_intptr_poll(&f->inner, &f->result)) return CC_TASK_PENDING;\n\
         f->state = 2; return CC_TASK_READY;\n\
         case 2: return CC_TASK_READY;\n\
         }}\n\
         return CC_TASK_READY;\n\
         }}\n\
         static void __cc_drop_{name}(void *p) {{\n\
         __cc_frame_{name} *f = p;\n\
         cc_task_intptr_free(&f->inner);\n\
         free(f);\n\
         }}\n\
         CCTaskIntptr {name}(void) {{\n\
         __cc_frame_{name} *f = calloc(1, sizeof(*f));\n\
         return cc_task_intptr_make_poll((void*)__cc_poll_{name}, f, __cc_drop_{name});\n\
         }}\n",
        name = name,
        callee_call = callee_call,
    )
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut edits = EditBuffer::new();

    let async_decls: Vec<_> = ctx
        .ast
        .of_kind(NodeKind::DeclItem)
        .filter(|n| n.is_async_decl())
        .cloned()
        .collect();

    let buf = SourceBuffer::new("", ctx.source.as_bytes().to_vec());
    for decl in &async_decls {
        let Some(name) = decl.name() else { continue };
        let start_line = decl.span.start.line;
        let end_line = decl.span.end.line;

        let start_off = buf.pos_to_offset(Pos::new(start_line, 1));
        let end_off = buf.pos_to_offset(Pos::new(end_line + 1, 1));
        if start_off >= end_off || end_off > ctx.source.len() {
            continue;
        }
        let region = &ctx.source[start_off..end_off];

        let Some(body_start) = region.find('{') else { continue };
        let body = &region[body_start..];

        let Some(shape) = classify_body(body) else { continue };

        let rendered = match &shape {
            BodyShape::Direct(expr) => render_direct(name, expr),
            BodyShape::AwaitCall(call) => render_await(name, call),
        };

        let original_lines = region.matches('\n').count().max(1);
        let rendered_lines = rendered.matches('\n').count();
        if rendered_lines > original_lines {
            // Would need more lines than the original occupied; skip (§4.6).
            continue;
        }
        let padded = format!("{rendered}{}", "\n".repeat(original_lines - rendered_lines));

        edits.push(Edit::new(start_off, end_off, padded, "async_lowering"));
    }

    log::debug!("async_lowering: rewrote {} function(s)", crate::util::fmt_count_human(edits.len()));
    if !edits.is_empty() {
        let out = edits.apply(&ctx.source)?;
        ctx.set_source(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::{bitmask::decl_aux2, Node, Pos, Span, StubAst, SymbolTable};
    use crate::type_registry::TypeRegistry;

    fn async_fn_ctx(src: &str, end_line: u32, fn_name: &str) -> PassCtx {
        let mut aux2 = 0u32;
        decl_aux2::set_async(&mut aux2, true);
        let nodes = vec![Node {
            kind: NodeKind::DeclItem,
            parent: None,
            file: "t.cc".into(),
            span: Span::new(Pos::new(1, 1), Pos::new(end_line, 1)),
            aux1: 0,
            aux2,
            aux_s1: Some(fn_name.to_string()),
            aux_s2: Some("int f(void)".into()),
        }];
        PassCtx::new(src.to_string(), StubAst::new(nodes), SymbolTable::new(), TypeRegistry::new())
    }

    #[test]
    fn direct_return_lowers_to_task_returning_entry() {
        let src = "int f(void) { return 5; }\n";
        let mut ctx = async_fn_ctx(src, 1, "f");
        run(&mut ctx).unwrap();
        assert!(ctx.source.contains("CCTaskIntptr f(void)"));
        assert!(ctx.source.contains("cc_task_intptr_make_poll"));
    }

    #[test]
    fn await_call_return_lowers_with_inner_task_field() {
        let src = "int f(void) { return await g(); }\n";
        let mut ctx = async_fn_ctx(src, 1, "f");
        run(&mut ctx).unwrap();
        assert!(ctx.source.contains("CCTaskIntptr inner;"));
        assert!(ctx.source.contains("cc_task_intptr_poll(&f->inner"));
    }

    #[test]
    fn non_matching_body_shape_is_left_untouched() {
        let src = "int f(void) { int x = 1; return x; }\n";
        let mut ctx = async_fn_ctx(src, 1, "f");
        run(&mut ctx).unwrap();
        assert_eq!(ctx.source, src);
    }
}
