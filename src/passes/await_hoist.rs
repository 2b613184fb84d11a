//! Await-Hoist Pass (§4.5): lift `await` used as a sub-expression into a
//! preceding pair of statements, leaving the statement root referencing a
//! temporary instead.

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;

/// Whether `stmt` (already trimmed, without its trailing `;`) is one of the
/// three statement-root await forms that need no hoisting.
fn is_await_at_statement_root(stmt: &str) -> bool {
    let stmt = stmt.trim();
    if stmt.starts_with("await ") || stmt == "await" {
        return true;
    }
    if let Some(rest) = stmt.strip_prefix("return ") {
        return rest.trim_start().starts_with("await");
    }
    if let Some(eq) = stmt.find('=') {
        if stmt.as_bytes().get(eq + 1) != Some(&b'=') {
            return stmt[eq + 1..].trim_start().starts_with("await");
        }
    }
    false
}

/// Byte offsets of every top-level `await` keyword occurrence in `stmt`,
/// in left-to-right order.
fn find_await_positions(stmt: &str) -> Vec<usize> {
    let bytes = stmt.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i + 5 <= bytes.len() {
        let at_word_start = i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        if at_word_start && &stmt[i..i + 5] == "await" {
            let after = i + 5;
            let word_end_ok = after >= bytes.len() || !(bytes[after].is_ascii_alphanumeric() || bytes[after] == b'_');
            if word_end_ok {
                out.push(i);
            }
        }
        i += 1;
    }
    out
}

/// The `await <expr>` span starting at `start` within `stmt`: the keyword
/// plus the following primary expression up to the next top-level
/// `,`/`;`/`)` or end of string.
fn await_expr_end(stmt: &str, start: usize) -> usize {
    let bytes = stmt.as_bytes();
    let mut i = start + 5;
    let mut depth = 0i32;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            b',' | b';' if depth == 0 => break,
            _ => {}
        }
        i += 1;
    }
    i
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut edits = EditBuffer::new();
    let mut offset = 0usize;
    let mut counter = 0u32;

    for (idx, raw_line) in ctx.source.split_inclusive('\n').enumerate() {
        let line_no = (idx + 1) as u32;
        let line_body = raw_line.strip_suffix('\n').unwrap_or(raw_line);

        if !ctx.ast.line_is_in_async_fn(line_no) {
            offset += raw_line.len();
            continue;
        }

        let trimmed = line_body.trim().trim_end_matches(';');
        if trimmed.is_empty() || is_await_at_statement_root(trimmed) {
            offset += raw_line.len();
            continue;
        }

        let positions = find_await_positions(trimmed);
        if positions.is_empty() {
            offset += raw_line.len();
            continue;
        }

        // Nested awaits on the same line hoist innermost-first: process in
        // descending start order so an outer hoisted assignment can already
        // see the inner temporary (§4.5, §9).
        let leading_ws = line_body.len() - line_body.trim_start().len();
        let line_start_offset = offset + leading_ws;
        let mut rewritten = trimmed.to_string();
        let mut prelude = String::new();

        for &pos in positions.iter().rev() {
            let end = await_expr_end(trimmed, pos);
            let expr = &trimmed[pos..end];
            counter += 1;
            let tmp = format!("__cc_aw_l{line_no}_{counter}");
            prelude.push_str(&format!("intptr_t {tmp} = 0;\n{tmp} = {expr};\n"));
            rewritten.replace_range(pos..end, &tmp);
        }

        let full_end = offset + line_body.len();
        let replacement = format!("{prelude}{rewritten};");
        edits.push(Edit::new(line_start_offset, full_end, replacement, "await_hoist"));

        offset += raw_line.len();
    }

    log::debug!("await_hoist: rewrote {} statement(s)", crate::util::fmt_count_human(edits.len()));
    if !edits.is_empty() {
        let out = edits.apply(&ctx.source)?;
        ctx.set_source(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::{bitmask::decl_aux2, Node, NodeKind, Pos, Span, StubAst, SymbolTable};
    use crate::type_registry::TypeRegistry;

    fn async_ctx(src: &str) -> PassCtx {
        let mut aux2 = 0u32;
        decl_aux2::set_async(&mut aux2, true);
        let nodes = vec![Node {
            kind: NodeKind::DeclItem,
            parent: None,
            file: "t.cc".into(),
            span: Span::new(Pos::new(1, 1), Pos::new(10, 1)),
            aux1: 0,
            aux2,
            aux_s1: Some("f".into()),
            aux_s2: None,
        }];
        PassCtx::new(src.to_string(), StubAst::new(nodes), SymbolTable::new(), TypeRegistry::new())
    }

    #[test]
    fn statement_root_await_is_left_alone() {
        let mut ctx = async_ctx("x = await g();\n");
        run(&mut ctx).unwrap();
        assert_eq!(ctx.source, "x = await g();\n");
    }

    #[test]
    fn sub_expression_await_is_hoisted_to_a_temporary() {
        let mut ctx = async_ctx("use(await g());\n");
        run(&mut ctx).unwrap();
        assert!(ctx.source.contains("intptr_t __cc_aw_l1_1 = 0;"));
        assert!(ctx.source.contains("__cc_aw_l1_1 = await g();"));
        assert!(ctx.source.contains("use(__cc_aw_l1_1);"));
    }

    #[test]
    fn return_await_is_left_alone() {
        let mut ctx = async_ctx("return await g();\n");
        run(&mut ctx).unwrap();
        assert_eq!(ctx.source, "return await g();\n");
    }
}
