//! Closure Pass (§4.2): scan closure literals, infer captures, and rewrite
//! each literal occurrence into a call to its (not-yet-emitted) factory
//! function. The factory/env/entry definitions themselves are emitted later
//! by the Emitter (§4.9), once every closure in the translation unit has
//! been scanned.

use cc_abi::{Capture, CaptureFlags, ClosureDescriptor, ClosureParams, DiagnosticKind, Pos};

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;
use crate::scope_stack::ScopeStack;

struct Literal {
    start: usize,
    end: usize,
    params: ClosureParams,
    body: String,
}

/// Find one closure literal starting at or after `from`, in `(params) =>
/// body` or `ident => body` form. Returns its byte span and parsed pieces.
fn find_next_literal(s: &str, from: usize) -> Option<Literal> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'=' && bytes[i + 1] == b'>' {
            let (params, lit_start) = parse_params_before(s, i)?;
            let body_start = skip_ws_fwd(s, i + 2);
            let (body, end) = parse_body(s, body_start)?;
            return Some(Literal { start: lit_start, end, params, body });
        }
        i += 1;
    }
    None
}

fn skip_ws_fwd(s: &str, mut i: usize) -> usize {
    let bytes = s.as_bytes();
    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    i
}

/// Parse the parameter list immediately preceding `=>`: either `(params)`
/// or a bare identifier. Up to two parameters (§4.2).
fn parse_params_before(s: &str, arrow_pos: usize) -> Option<(ClosureParams, usize)> {
    let bytes = s.as_bytes();
    let mut i = arrow_pos;
    while i > 0 && (bytes[i - 1] as char).is_whitespace() {
        i -= 1;
    }
    if i == 0 {
        return None;
    }
    if bytes[i - 1] == b')' {
        let mut depth = 0i32;
        let close = i - 1;
        let mut j = close;
        loop {
            match bytes[j] {
                b')' => depth += 1,
                b'(' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            if j == 0 {
                return None;
            }
            j -= 1;
        }
        let inner = &s[j + 1..close];
        let params = parse_param_list(inner);
        Some((params, j))
    } else {
        let mut j = i;
        while j > 0 && (bytes[j - 1].is_ascii_alphanumeric() || bytes[j - 1] == b'_') {
            j -= 1;
        }
        if j == i {
            return None;
        }
        let name = s[j..i].to_string();
        let mut params = ClosureParams::default();
        params.params.push((name, "intptr_t".to_string()));
        Some((params, j))
    }
}

fn parse_param_list(inner: &str) -> ClosureParams {
    let mut params = ClosureParams::default();
    let inner = inner.trim();
    if inner.is_empty() {
        return params;
    }
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut words: Vec<&str> = part.split_whitespace().collect();
        let name = words.pop().unwrap_or_default().to_string();
        let ty = if words.is_empty() { "intptr_t".to_string() } else { words.join(" ") };
        params.params.push((name, ty));
    }
    params
}

/// Parse the closure body: a braced block, or a single expression up to the
/// statement-terminating `;`/`,`/`)` at depth 0.
fn parse_body(s: &str, start: usize) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    if start >= bytes.len() {
        return None;
    }
    if bytes[start] == b'{' {
        let mut depth = 0i32;
        let mut i = start;
        while i < bytes.len() {
            match bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((s[start..=i].to_string(), i + 1));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    } else {
        let mut i = start;
        let mut depth = 0i32;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' if depth > 0 => depth -= 1,
                b')' | b',' | b';' if depth == 0 => {
                    return Some((s[start..i].trim().to_string(), i));
                }
                _ => {}
            }
            i += 1;
        }
        Some((s[start..].trim().to_string(), bytes.len()))
    }
}

/// Identifiers referenced in `body` that are not keywords or preceded by
/// `.`/`->` (member access), for capture analysis (§4.2).
fn referenced_identifiers(body: &str) -> Vec<String> {
    const KEYWORDS: &[&str] = &[
        "if", "else", "for", "while", "return", "int", "void", "char", "const", "struct",
        "break", "continue", "do", "switch", "case", "default", "sizeof", "await",
    ];
    let bytes = body.as_bytes();
    let mut names = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let preceded_by_member = start >= 1
                && (bytes[start - 1] == b'.'
                    || (start >= 2 && bytes[start - 2] == b'-' && bytes[start - 1] == b'>'));
            let name = &body[start..i];
            if !preceded_by_member && !KEYWORDS.contains(&name) && !names.iter().any(|n: &String| n == name) {
                names.push(name.to_string());
            }
        } else {
            i += 1;
        }
    }
    names
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut scopes = ScopeStack::new();
    let mut edits = EditBuffer::new();
    let mut search_from = 0usize;

    loop {
        let Some(lit) = find_next_literal(&ctx.source, search_from) else { break };

        let id = ctx.closure_id_gen.next();
        let mut captures = Vec::new();
        let mut capture_error = None;
        for name in referenced_identifiers(&lit.body) {
            if lit.params.params.iter().any(|(p, _)| *p == name) {
                continue;
            }
            if let Some(decl) = scopes.find(&name) {
                let mut flags = CaptureFlags::empty();
                if decl.ty == "CCSlice" {
                    flags |= CaptureFlags::IS_SLICE;
                }
                if decl.is_move_only_slice {
                    flags |= CaptureFlags::MOVE_ONLY;
                }
                captures.push(Capture { name: name.clone(), ty: decl.ty.clone(), flags });
            } else if name != "cc_move" {
                // Unknown identifier: might be a global function/name, not a capture.
                // Only flag as an unknown-capture failure if it *looks* like a local
                // (declared nowhere, including globals) and is clearly not a call.
                let is_call = lit.body.contains(&format!("{name}("));
                if !is_call && decl_is_plausible_capture(&name) {
                    capture_error = Some(name.clone());
                }
            }
        }

        if let Some(name) = capture_error {
            ctx.diagnostics.error(
                DiagnosticKind::UnknownCapture,
                ctx.ast.nodes().first().map(|n| n.file.as_str()).unwrap_or("<input>"),
                1,
                None,
                format!("closure {id}: cannot infer type of capture '{name}'"),
            );
        }

        let enclosing_nursery_id = scopes.enclosing_nursery();
        ctx.closures.push(ClosureDescriptor {
            id,
            start: Pos::new(1, 1),
            end: Pos::new(1, 1),
            params: lit.params,
            captures: captures.clone(),
            body: lit.body.clone(),
            enclosing_nursery_id,
        });

        let call_args: Vec<String> = captures
            .iter()
            .map(|c| if c.is_move_only() { format!("cc_move({})", c.name) } else { c.name.clone() })
            .collect();
        // Never shrink the line count (§3): a multi-line literal collapses to
        // one line of replacement text, so pad with the newlines it had.
        let original_lines = ctx.source[lit.start..lit.end].matches('\n').count();
        let replacement = format!(
            "__cc_closure_make_{id}({}){}",
            call_args.join(", "),
            "\n".repeat(original_lines),
        );
        edits.push(Edit::new(lit.start, lit.end, replacement, "closure"));

        search_from = lit.end;
    }

    log::debug!("closure: rewrote {} literal(s)", crate::util::fmt_count_human(edits.len()));
    if !edits.is_empty() {
        let out = edits.apply(&ctx.source)?;
        ctx.set_source(out);
    }
    Ok(())
}

/// Heuristic: a lowercase identifier that isn't a type name (PascalCase /
/// `CC`-prefixed) is plausibly meant as a captured local rather than a
/// forward-declared global the scan hasn't seen yet.
fn decl_is_plausible_capture(name: &str) -> bool {
    !name.starts_with("cc_") && !name.starts_with("CC") && name.chars().next().is_some_and(|c| c.is_lowercase())
        && name.len() > 1
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
    fn no_capture_closure_becomes_factory_call_with_no_args() {
        let mut c = ctx("spawn(() => { doit(); });\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("__cc_closure_make_1()"));
        assert_eq!(c.closures.len(), 1);
        assert!(!c.closures[0].has_captures());
    }

    #[test]
    fn single_param_ident_arrow_form_is_recognized() {
        let mut c = ctx("let f = x => x + 1;\n");
        run(&mut c).unwrap();
        assert_eq!(c.closures.len(), 1);
        assert_eq!(c.closures[0].params.count(), 1);
    }

    #[test]
    fn ids_increment_across_multiple_literals_in_one_scan() {
        let mut c = ctx("spawn(() => { a(); });\nspawn(() => { b(); });\n");
        run(&mut c).unwrap();
        assert_eq!(c.closures[0].id, 1);
        assert_eq!(c.closures[1].id, 2);
    }

    #[test]
    fn multiline_literal_rewrite_preserves_line_count() {
        let src = "spawn(() => {\n    stmt1();\n    stmt2();\n});\n";
        let mut c = ctx(src);
        run(&mut c).unwrap();
        assert_eq!(c.source.matches('\n').count(), src.matches('\n').count());
    }

    #[test]
    fn referenced_identifiers_skips_member_access() {
        let ids = referenced_identifiers("foo.bar(); baz();");
        assert!(ids.contains(&"foo".to_string()));
        assert!(!ids.contains(&"bar".to_string()));
        assert!(ids.contains(&"baz".to_string()));
    }
}
