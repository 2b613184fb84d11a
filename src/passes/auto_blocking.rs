//! Auto-Blocking Pass (§4.4): inside `@async` bodies, wrap calls to
//! synchronous functions in `await cc_run_blocking_task_intptr(closure)`.
//! Callee signatures come from the enclosing `DECL_ITEM.aux_s2`; a callee
//! with no recorded signature is left untouched (§4.4 "Restrictions").

use cc_abi::NodeKind;

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;

struct SyncCall {
    callee: String,
    args: String,
    form: CallForm,
    dest: Option<String>,
}

#[derive(PartialEq)]
enum CallForm {
    Stmt,
    Return,
    Assign,
}

fn find_sync_call(stmt: &str) -> Option<(String, String, CallForm, Option<String>)> {
    let trimmed = stmt.trim().trim_end_matches(';').trim();
    if let Some(rest) = trimmed.strip_prefix("return ") {
        let (callee, args) = parse_call(rest.trim())?;
        return Some((callee, args, CallForm::Return, None));
    }
    if let Some(eq) = trimmed.find('=') {
        if trimmed.as_bytes().get(eq + 1) != Some(&b'=') {
            let lhs = trimmed[..eq].trim();
            let rhs = trimmed[eq + 1..].trim();
            if lhs.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !lhs.is_empty() {
                let (callee, args) = parse_call(rhs)?;
                return Some((callee, args, CallForm::Assign, Some(lhs.to_string())));
            }
        }
    }
    let (callee, args) = parse_call(trimmed)?;
    Some((callee, args, CallForm::Stmt, None))
}

fn parse_call(expr: &str) -> Option<(String, String)> {
    let expr = expr.trim();
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let name = expr[..open].trim();
    if name.is_empty() || !name.chars().next().unwrap().is_ascii_alphabetic() {
        return None;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let args = &expr[open + 1..expr.len() - 1];
    Some((name.to_string(), args.trim().to_string()))
}

fn callee_signature<'a>(ctx: &'a PassCtx, name: &str) -> Option<&'a str> {
    ctx.ast
        .of_kind(NodeKind::DeclItem)
        .find(|n| n.name() == Some(name))
        .and_then(|n| n.secondary_name())
}

fn split_args(args: &str) -> Vec<&str> {
    if args.is_empty() {
        return Vec::new();
    }
    args.split(',').map(str::trim).collect()
}

fn render_lowering(call: &SyncCall, line: u32) -> String {
    let args = split_args(&call.args);
    let mut bindings = String::new();
    let mut intptr_args = Vec::new();
    for (i, a) in args.iter().enumerate() {
        let tmp = format!("__cc_ab_l{line}_arg{i}");
        bindings.push_str(&format!("intptr_t {tmp} = (intptr_t)({a}); "));
        intptr_args.push(tmp);
    }
    let call_expr = format!("{}({})", call.callee, intptr_args.join(", "));

    let closure_body = match call.form {
        CallForm::Stmt => format!("(void)({call_expr});"),
        CallForm::Return | CallForm::Assign => format!("return (void*)(intptr_t){call_expr};"),
    };
    let closure = format!("(() => {{ {closure_body} }})");
    let awaited = format!("await cc_run_blocking_task_intptr({closure})");

    match call.form {
        CallForm::Stmt => format!("{{ {bindings}{awaited}; }}"),
        CallForm::Return => format!("{{ {bindings}return {awaited}; }}"),
        CallForm::Assign => {
            let dest = call.dest.as_deref().unwrap_or("__cc_ab_result");
            format!("{{ {bindings}{dest} = (intptr_t){awaited}; }}")
        }
    }
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut edits = EditBuffer::new();
    let mut offset = 0usize;

    for (idx, raw_line) in ctx.source.split_inclusive('\n').enumerate() {
        let line_no = (idx + 1) as u32;
        let line_body = raw_line.strip_suffix('\n').unwrap_or(raw_line);

        if !ctx.ast.line_is_in_async_fn(line_no) {
            offset += raw_line.len();
            continue;
        }

        let trimmed = line_body.trim();
        if let Some((callee, args, form, dest)) = find_sync_call(trimmed) {
            if ctx.symbols.is_async(&callee) || ctx.symbols.is_noblock(&callee) {
                offset += raw_line.len();
                continue;
            }
            if callee_signature(ctx, &callee).is_none() {
                offset += raw_line.len();
                continue;
            }
            let call = SyncCall { callee, args, form, dest };
            let rendered = render_lowering(&call, line_no);
            let leading_ws = line_body.len() - line_body.trim_start().len();
            let start = offset + leading_ws;
            let end = offset + line_body.len();
            edits.push(Edit::new(start, end, rendered, "auto_blocking"));
        }

        offset += raw_line.len();
    }

    log::debug!("auto_blocking: rewrote {} call(s)", crate::util::fmt_count_human(edits.len()));
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

    fn async_decl_with_callee(body_lines: u32, callee: &str, sig: &str) -> Vec<Node> {
        let mut aux2 = 0u32;
        decl_aux2::set_async(&mut aux2, true);
        vec![
            Node {
                kind: NodeKind::DeclItem,
                parent: None,
                file: "t.cc".into(),
                span: Span::new(Pos::new(1, 1), Pos::new(body_lines, 1)),
                aux1: 0,
                aux2,
                aux_s1: Some("handler".into()),
                aux_s2: None,
            },
            Node {
                kind: NodeKind::DeclItem,
                parent: None,
                file: "t.cc".into(),
                span: Span::new(Pos::new(100, 1), Pos::new(100, 1)),
                aux1: 0,
                aux2: 0,
                aux_s1: Some(callee.to_string()),
                aux_s2: Some(sig.to_string()),
            },
        ]
    }

    #[test]
    fn stmt_call_is_wrapped_in_blocking_task_await() {
        let nodes = async_decl_with_callee(3, "puts", "void puts(const char*)");
        let mut ctx = PassCtx::new("puts(\"hi\");\n".into(), StubAst::new(nodes), SymbolTable::new(), TypeRegistry::new());
        run(&mut ctx).unwrap();
        assert!(ctx.source.contains("await cc_run_blocking_task_intptr"));
        assert!(!ctx.source.trim().starts_with("puts(\"hi\");"));
    }

    #[test]
    fn callee_with_no_known_signature_is_left_untouched() {
        let mut aux2 = 0u32;
        decl_aux2::set_async(&mut aux2, true);
        let nodes = vec![Node {
            kind: NodeKind::DeclItem,
            parent: None,
            file: "t.cc".into(),
            span: Span::new(Pos::new(1, 1), Pos::new(3, 1)),
            aux1: 0,
            aux2,
            aux_s1: Some("handler".into()),
            aux_s2: None,
        }];
        let mut ctx = PassCtx::new("mystery();\n".into(), StubAst::new(nodes), SymbolTable::new(), TypeRegistry::new());
        run(&mut ctx).unwrap();
        assert_eq!(ctx.source, "mystery();\n");
    }

    #[test]
    fn async_callee_is_skipped() {
        let nodes = async_decl_with_callee(3, "do_io", "void do_io(void)");
        let mut symbols = SymbolTable::new();
        symbols.declare("do_io", cc_abi::FnAttrs::ASYNC);
        let mut ctx = PassCtx::new("do_io();\n".into(), StubAst::new(nodes), symbols, TypeRegistry::new());
        run(&mut ctx).unwrap();
        assert_eq!(ctx.source, "do_io();\n");
    }
}
