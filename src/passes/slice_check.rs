//! Slice Check Pass (§4.3): flag use-after-move and copy-of-move-only
//! slice locals by walking the buffer line by line with a scope stack of
//! declarations and moved-name marks.

use cc_abi::DiagnosticKind;

use crate::pass_ctx::PassCtx;
use crate::scope_stack::ScopeStack;

const SLICE_DECL_PREFIXES: &[&str] = &["CCSlice", "T[:]", "T[:!]"];

fn is_slice_decl(ty: &str) -> bool {
    SLICE_DECL_PREFIXES.iter().any(|p| ty == *p) || ty.ends_with("[:]") || ty.ends_with("[:!]")
}

fn is_move_only_decl(ty: &str) -> bool {
    ty.ends_with("[:!]") || ty == "CCSlice!"
}

/// Strip a `[:]`/`[:!]` move-sugar suffix glued directly onto a declarator
/// name (`s[:!]`, no space before the sigil), returning the bare name and
/// whether the sigil marks it move-only.
fn strip_slice_sigil(word: &str) -> (&str, bool) {
    if let Some(stripped) = word.strip_suffix("[:!]") {
        (stripped, true)
    } else if let Some(stripped) = word.strip_suffix("[:]") {
        (stripped, false)
    } else {
        (word, false)
    }
}

/// A single declaration statement: `T name = ...;` or `T name;`. Returns
/// the declared name, its type word(s), and whether it's move-only —
/// either because the type word carries `[:!]` or because the sigil is
/// glued onto the name instead (`CCSlice s[:!]`).
fn parse_decl(stmt: &str) -> Option<(String, String, bool)> {
    let stmt = stmt.trim();
    let body = stmt.split('=').next().unwrap_or(stmt).trim();
    let mut words: Vec<&str> = body.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }
    let raw_name = words.pop()?.trim_end_matches(';');
    let (name, sigil_move_only) = strip_slice_sigil(raw_name);
    if name.is_empty() || !name.chars().next().unwrap().is_ascii_alphabetic() {
        return None;
    }
    let ty = words.join(" ");
    if ty.is_empty() {
        return None;
    }
    let move_only = is_move_only_decl(&ty) || sigil_move_only;
    Some((name.to_string(), ty, move_only))
}

fn parse_cc_move_arg(stmt: &str) -> Option<String> {
    let idx = stmt.find("cc_move(")?;
    let rest = &stmt[idx + "cc_move(".len()..];
    let close = rest.find(')')?;
    Some(rest[..close].trim().to_string())
}

fn parse_assignment(stmt: &str) -> Option<(String, String)> {
    let stmt = stmt.trim().trim_end_matches(';');
    let eq = stmt.find('=')?;
    if stmt.as_bytes().get(eq + 1) == Some(&b'=') {
        return None; // `==` comparison, not assignment
    }
    if eq > 0 && matches!(stmt.as_bytes()[eq - 1], b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/') {
        return None; // compound/relational operator, not a plain assignment
    }
    let lhs = stmt[..eq].trim();
    let rhs = stmt[eq + 1..].trim();
    if lhs.is_empty() || !lhs.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((lhs.to_string(), rhs.to_string()))
}

fn in_string_or_char(line: &str, pos: usize) -> bool {
    let bytes = line.as_bytes();
    let mut in_str = false;
    let mut in_char = false;
    let mut i = 0;
    while i < pos && i < bytes.len() {
        match bytes[i] {
            b'"' if !in_char => in_str = !in_str,
            b'\'' if !in_str => in_char = !in_char,
            _ => {}
        }
        i += 1;
    }
    in_str || in_char
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut scopes = ScopeStack::new();
    let file = ctx.ast.nodes().first().map(|n| n.file.clone()).unwrap_or_else(|| "<input>".to_string());

    for (line_idx, raw_line) in ctx.source.lines().enumerate() {
        let line_no = (line_idx + 1) as u32;
        let line = strip_line_comment(raw_line);

        if line.contains('{') && !line.contains('}') {
            scopes.push_scope();
        }

        for stmt in line.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }

            if let Some(name) = parse_cc_move_arg(stmt) {
                if let Some(decl) = scopes.find_mut(&name) {
                    if decl.is_move_only_slice {
                        decl.moved = true;
                    }
                }
                continue;
            }

            if let Some((lhs, rhs)) = parse_assignment(stmt) {
                check_copy_of_move_only(&rhs, &scopes, &file, line_no, &mut ctx.diagnostics);

                if let Some(decl) = scopes.find_mut(&lhs) {
                    decl.moved = false;
                }
                continue;
            }

            if let Some((name, ty, move_only)) = parse_decl(stmt) {
                // A declaration with an initializer (`CCSlice b = a;`) is a
                // copy just like a plain assignment, so it's checked the
                // same way before the new name shadows anything.
                if let Some((_, rhs)) = stmt.split_once('=') {
                    let rhs = rhs.trim().trim_end_matches(';');
                    check_copy_of_move_only(rhs, &scopes, &file, line_no, &mut ctx.diagnostics);
                }
                scopes.declare(&name, if is_slice_decl(&ty) { "CCSlice" } else { &ty }, move_only);
                continue;
            }

            check_reads(stmt, &mut scopes, &file, line_no, &mut ctx.diagnostics);
        }

        if line.contains('}') {
            scopes.pop_scope();
        }
    }

    Ok(())
}

/// Flag `rhs` as a copy of a move-only slice unless it's wrapped in
/// `cc_move(...)`. Shared by plain assignment and declaration-with-
/// initializer, since both bind a new copy of whatever `rhs` evaluates to.
fn check_copy_of_move_only(
    rhs: &str,
    scopes: &ScopeStack,
    file: &str,
    line_no: u32,
    diagnostics: &mut cc_abi::Diagnostics,
) {
    let rhs_is_move = rhs.trim_start().starts_with("cc_move(");
    let rhs_ident = rhs.trim();
    let rhs_is_move_only_slice = scopes.find(rhs_ident).is_some_and(|d| d.is_move_only_slice && !d.moved);

    if rhs_is_move_only_slice && !rhs_is_move {
        diagnostics.error(
            DiagnosticKind::CopyOfMoveOnly,
            file,
            line_no,
            None,
            format!("copy of move-only slice '{rhs_ident}'"),
        );
    }
}

fn strip_line_comment(line: &str) -> &str {
    line.find("//").map(|i| &line[..i]).unwrap_or(line)
}

fn check_reads(stmt: &str, scopes: &mut ScopeStack, file: &str, line_no: u32, diagnostics: &mut cc_abi::Diagnostics) {
    let bytes = stmt.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let name = &stmt[start..i];
            if in_string_or_char(stmt, start) {
                continue;
            }
            if let Some(decl) = scopes.find(name) {
                if decl.moved {
                    diagnostics.error(
                        DiagnosticKind::UseAfterMove,
                        file,
                        line_no,
                        None,
                        format!("use after move of slice '{name}'"),
                    );
                }
            }
        } else {
            i += 1;
        }
    }
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
    fn use_after_move_is_reported_at_third_reference() {
        let mut c = ctx("CCSlice s[:!] = make();\ncc_move(s);\nuse(s);\n");
        run(&mut c).unwrap();
        assert!(c.diagnostics.entries().iter().any(|d| d.kind == DiagnosticKind::UseAfterMove));
    }

    #[test]
    fn reassignment_clears_the_moved_mark() {
        let mut c = ctx("CCSlice s[:!] = make();\ncc_move(s);\ns = make();\nuse(s);\n");
        run(&mut c).unwrap();
        assert!(!c.diagnostics.entries().iter().any(|d| d.kind == DiagnosticKind::UseAfterMove));
    }

    #[test]
    fn copy_of_move_only_without_cc_move_is_an_error() {
        let mut c = ctx("CCSlice a[:!] = make();\nCCSlice b = a;\n");
        run(&mut c).unwrap();
        assert!(c.diagnostics.entries().iter().any(|d| d.kind == DiagnosticKind::CopyOfMoveOnly));
    }

    #[test]
    fn plain_int_locals_never_trigger_slice_diagnostics() {
        let mut c = ctx("int x = 1;\nint y = x;\nuse(x);\n");
        run(&mut c).unwrap();
        assert!(c.diagnostics.is_empty());
    }
}
