//! UFCS Pass (§4.1): rewrite `recv.method(args)` / `recv->method(args)`
//! into free-function calls through the channel/string/slice/container/
//! free-form/fallback dispatch tables, introducing statement-expression
//! temporaries for multi-segment chains.

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;
use crate::passes::UfcsOptions;
use crate::type_registry::TypeRegistry;

const CHANNEL_OPS: &[&str] = &["send", "recv", "send_take", "try_send", "try_recv", "close"];
const STRING_OPS: &[&str] = &[
    "as_slice", "append", "push", "push_char", "push_int", "push_uint", "push_float", "clear",
];
const SLICE_OPS: &[&str] = &[
    "len", "trim", "trim_left", "trim_right", "is_empty", "at", "sub", "starts_with", "ends_with", "eq",
];

/// A single parsed `recv.method(args)` / `recv->method(args)` occurrence.
struct CallSite {
    /// Byte offset where `recv` begins.
    start: usize,
    /// Byte offset just past the closing `)`.
    end: usize,
    receiver: String,
    method: String,
    args: String,
    /// Further `.method(args)` segments chained onto this call, if any.
    chain: Vec<(String, String)>,
}

/// Render the free-function dispatch for one `(recv, method, args)` triple
/// per the seven-rule precedence order (§4.1).
pub fn dispatch(recv: &str, method: &str, args: &str, opts: UfcsOptions, type_registry: &TypeRegistry) -> String {
    if method == "free" && is_pointer_receiver(recv, opts) {
        return format!("cc_chan_free({recv})");
    }

    if CHANNEL_OPS.contains(&method) {
        if opts.inside_await && (method == "send" || method == "recv") {
            return format!("cc_chan_{method}_task(({recv}).raw, &val, sizeof(val))");
        }
        return format!("chan_{method}({recv}, {args})", args = nonempty(args));
    }

    if STRING_OPS.contains(&method) {
        let op = if method == "append" { "push" } else { method };
        return format!("cc_string_{op}(&{recv}, {args})", args = nonempty(args));
    }

    if SLICE_OPS.contains(&method) {
        return format!("CCSlice_{method}(&{recv}, {args})", args = nonempty(args));
    }

    if (recv == "std_out" || recv == "std_err") && method == "write" {
        return writer_sink(recv, args);
    }

    if let Some(container_ty) = type_registry.container_type_of(recv) {
        let recv_arg = addr_of_decision(recv, opts);
        return format!("{container_ty}_{method}({recv_arg}{sep}{args})", sep = sep(args), args = args);
    }

    if let Some(recv_type) = type_registry.type_of(recv) {
        if !recv_type.is_empty() {
            let recv_arg = addr_of_decision(recv, opts);
            return format!("{recv_type}_{method}({recv_arg}{sep}{args})", sep = sep(args), args = args);
        }
    }

    let recv_arg = addr_of_decision(recv, opts);
    format!("{method}({recv_arg}{sep}{args})", sep = sep(args), args = args)
}

fn sep(args: &str) -> &'static str {
    if args.is_empty() { "" } else { ", " }
}

fn nonempty(args: &str) -> &str {
    args
}

fn is_pointer_receiver(_recv: &str, opts: UfcsOptions) -> bool {
    opts.receiver_is_pointer
}

/// `&recv` for a plain identifier receiver with no pointer marker; anything
/// else (pointer, call expression, field access) passes through unchanged.
fn addr_of_decision(recv: &str, opts: UfcsOptions) -> String {
    if opts.receiver_is_pointer {
        return recv.to_string();
    }
    if is_plain_identifier(recv) {
        format!("&{recv}")
    } else {
        recv.to_string()
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn writer_sink(recv: &str, arg: &str) -> String {
    let trimmed = arg.trim();
    if trimmed.starts_with('"') {
        format!("cc_std_{}_write(cc_slice_from_buffer({}, sizeof({}) - 1))", sink_suffix(recv), trimmed, trimmed)
    } else if let Some(rest) = trimmed.strip_prefix('&') {
        format!("cc_std_{}_write(&{})", sink_suffix(recv), rest)
    } else if is_plain_identifier(trimmed) {
        format!("cc_std_{}_write_string(&{})", sink_suffix(recv), trimmed)
    } else {
        format!("cc_std_{}_write({})", sink_suffix(recv), trimmed)
    }
}

fn sink_suffix(recv: &str) -> &str {
    if recv == "std_out" { "out" } else { "err" }
}

/// Scan one line for `recv.method(args)` / `recv->method(args)` occurrences,
/// bounded by the nearest top-level delimiter on the left and matching
/// parenthesis depth on the right (§4.1 "Span discovery").
fn find_call_sites(line: &str) -> Vec<CallSite> {
    let bytes = line.as_bytes();
    let mut sites = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let (sep_len, is_dot) = if bytes[i] == b'.' {
            (1, true)
        } else if i + 1 < bytes.len() && bytes[i] == b'-' && bytes[i + 1] == b'>' {
            (2, false)
        } else {
            i += 1;
            continue;
        };
        let method_start = i + sep_len;
        let Some(method_end) = scan_ident_end(line, method_start) else {
            i += 1;
            continue;
        };
        if method_end == method_start {
            i += 1;
            continue;
        }
        let mut after = skip_ws(line, method_end);
        if after >= bytes.len() || bytes[after] != b'(' {
            i += 1;
            continue;
        }
        let Some(close) = match_paren(line, after) else {
            i += 1;
            continue;
        };
        let recv_start = scan_receiver_start(line, i);
        if recv_start == i {
            i += 1;
            continue;
        }
        let receiver = line[recv_start..i].trim().to_string();
        let method = line[method_start..method_end].to_string();
        let args = line[after + 1..close].trim().to_string();
        let _ = is_dot;
        after = close + 1;
        sites.push(CallSite { start: recv_start, end: after, receiver, method, args, chain: Vec::new() });
        i = after;
    }
    merge_chains(sites)
}

fn scan_ident_end(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    Some(end)
}

fn skip_ws(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    i
}

fn match_paren(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    let mut in_str: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = in_str {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                in_str = None;
            }
        } else {
            match b {
                b'"' | b'\'' => in_str = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

const TOP_LEVEL_STOPS: &[u8] = b",;=+-*/%&|^!~<>?:";

fn scan_receiver_start(s: &str, dot_pos: usize) -> usize {
    let bytes = s.as_bytes();
    let mut i = dot_pos;
    let mut depth = 0i32;
    while i > 0 {
        let b = bytes[i - 1];
        match b {
            b')' | b']' => depth += 1,
            b'(' | b'[' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            _ if depth == 0 && (b == b' ' || TOP_LEVEL_STOPS.contains(&b)) => break,
            _ => {}
        }
        i -= 1;
    }
    i
}

/// Fold consecutive call sites whose receiver is the previous site's full
/// span into one chained `CallSite` (§4.1 "Chain semantics").
fn merge_chains(mut sites: Vec<CallSite>) -> Vec<CallSite> {
    let mut merged: Vec<CallSite> = Vec::new();
    for site in sites.drain(..) {
        if let Some(last) = merged.last_mut() {
            if site.start == last.end {
                last.chain.push((site.method, site.args));
                last.end = site.end;
                continue;
            }
        }
        merged.push(site);
    }
    merged
}

fn render_site(site: &CallSite, opts: UfcsOptions, type_registry: &TypeRegistry) -> String {
    if site.chain.is_empty() {
        return dispatch(&site.receiver, &site.method, &site.args, opts, type_registry);
    }
    let mut out = String::from("({ ");
    // A bare identifier receiver needs no temporary: `&a` is cheap to
    // re-evaluate, so the first stage dispatches against it directly
    // (§8 scenario 2). Only a non-trivial receiver expression gets bound
    // to `__ufcs_recv` first, to avoid evaluating it more than once.
    let mut prev = if is_plain_identifier(&site.receiver) {
        site.receiver.clone()
    } else {
        out.push_str(&format!("__ufcs_recv = {}; ", site.receiver));
        "__ufcs_recv".to_string()
    };
    let mut stages: Vec<(String, String, String)> = Vec::new();
    stages.push((site.method.clone(), site.args.clone(), String::new()));
    for (m, a) in &site.chain {
        stages.push((m.clone(), a.clone(), String::new()));
    }
    let last_idx = stages.len() - 1;
    for (idx, (method, args, _)) in stages.iter().enumerate() {
        let call = dispatch(&prev, method, args, opts, type_registry);
        if idx == last_idx {
            out.push_str(&call);
            out.push_str("; ");
        } else {
            let tmp = format!("__ufcs_tmp{}", idx + 1);
            out.push_str(&format!("{tmp} = {call}; "));
            prev = tmp;
        }
    }
    out.push('}');
    out.push(')');
    out
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let opts = UfcsOptions::default();
    let mut edits = EditBuffer::new();
    let mut offset = 0usize;
    for line in ctx.source.split_inclusive('\n') {
        let line_body = line.strip_suffix('\n').unwrap_or(line);
        for site in find_call_sites(line_body) {
            let rendered = render_site(&site, opts, &ctx.type_registry);
            edits.push(Edit::new(offset + site.start, offset + site.end, rendered, "ufcs"));
        }
        offset += line.len();
    }
    log::debug!("ufcs: rewrote {} call site(s)", crate::util::fmt_count_human(edits.len()));
    if !edits.is_empty() {
        let out = edits.apply(&ctx.source)?;
        ctx.set_source(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::StubAst;
    use cc_abi::SymbolTable;

    fn ctx(src: &str) -> PassCtx {
        PassCtx::new(src.to_string(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new())
    }

    #[test]
    fn string_append_dispatches_to_cc_string_push() {
        let reg = TypeRegistry::new();
        let out = dispatch("s", "append", "\"x\"", UfcsOptions::default(), &reg);
        assert_eq!(out, "cc_string_push(&s, \"x\")");
    }

    #[test]
    fn slice_len_takes_address_of_plain_identifier() {
        let reg = TypeRegistry::new();
        let out = dispatch("buf", "len", "", UfcsOptions::default(), &reg);
        assert_eq!(out, "CCSlice_len(&buf)");
    }

    #[test]
    fn pointer_receiver_is_not_prefixed_with_ampersand() {
        let reg = TypeRegistry::new();
        let opts = UfcsOptions { receiver_is_pointer: true, ..Default::default() };
        let out = dispatch("p", "frobnicate", "1", opts, &reg);
        assert_eq!(out, "frobnicate(p, 1)");
    }

    #[test]
    fn container_method_dispatches_through_type_registry() {
        let mut reg = TypeRegistry::new();
        reg.declare_var("items", "Vec_int");
        let out = dispatch("items", "push", "5", UfcsOptions::default(), &reg);
        assert_eq!(out, "Vec_int_push(&items, 5)");
    }

    #[test]
    fn single_segment_call_rewrites_without_temporaries() {
        let mut c = ctx("s.append(\"x\");\n");
        run(&mut c).unwrap();
        assert_eq!(c.source, "cc_string_push(&s, \"x\");\n");
    }

    #[test]
    fn two_segment_chain_with_plain_identifier_receiver_skips_recv_temporary() {
        let mut c = ctx("a.b(1).c(2);\n");
        run(&mut c).unwrap();
        assert!(!c.source.contains("__ufcs_recv"));
        assert!(c.source.contains("__ufcs_tmp1 = b(&a, 1);"));
        assert!(c.source.contains("c(&__ufcs_tmp1, 2);"));
    }

    #[test]
    fn two_segment_chain_with_non_trivial_receiver_binds_recv_temporary() {
        let mut c = ctx("f(x).b(1).c(2);\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("__ufcs_recv = f(x);"));
        assert!(c.source.contains("__ufcs_tmp1 = b(&__ufcs_recv, 1);"));
        assert!(c.source.contains("c(&__ufcs_tmp1, 2);"));
    }

    #[test]
    fn writer_sink_overloads_on_string_literal_argument() {
        let mut c = ctx("std_out.write(\"hi\");\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("cc_std_out_write(cc_slice_from_buffer(\"hi\", sizeof(\"hi\") - 1))"));
    }

    #[test]
    fn plain_c_without_dot_calls_is_untouched() {
        let mut c = ctx("int main(void) { return 0; }\n");
        run(&mut c).unwrap();
        assert_eq!(c.source, "int main(void) { return 0; }\n");
    }
}
