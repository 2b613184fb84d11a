//! Arena / Defer / Nursery / Spawn Lowering (§4.7): line-driven transforms
//! applied late in the pipeline, once closure literals have already been
//! rewritten into factory calls by the Closure Pass.

use cc_abi::SpawnThunk;

use crate::edit_buffer::{Edit, EditBuffer};
use crate::pass_ctx::PassCtx;

/// Find the byte offset of the `}` matching the `{` at `open`.
fn match_brace(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

struct Counters {
    arena: u32,
    nursery: u32,
}

fn lower_arenas(source: &str, counters: &mut Counters) -> EditBuffer {
    let mut edits = EditBuffer::new();
    let mut search_from = 0usize;
    while let Some(rel) = source[search_from..].find("@arena ") {
        let kw_start = search_from + rel;
        let header_end = match source[kw_start..].find('{') {
            Some(p) => kw_start + p,
            None => break,
        };
        let header = source[kw_start + "@arena ".len()..header_end].trim();
        let Some(eq) = header.find('=') else {
            search_from = header_end + 1;
            continue;
        };
        let name = header[..eq].trim();
        let size_expr = header[eq + 1..].trim();
        let Some(close) = match_brace(source, header_end) else { break };

        counters.arena += 1;
        let id = counters.arena;
        let inner_start = header_end + 1;
        let inner = &source[inner_start..close];

        let opening = format!(
            "{{ CCArena __cc_arena{id} = cc_heap_arena({size_expr}); CCArena* {name} = &__cc_arena{id};{inner}cc_heap_arena_free(&__cc_arena{id}); }}",
        );
        edits.push(Edit::new(kw_start, close + 1, opening, "arena"));
        search_from = close + 1;
    }
    edits
}

fn lower_nurseries(source: &str, counters: &mut Counters) -> EditBuffer {
    let mut edits = EditBuffer::new();
    let mut search_from = 0usize;
    while let Some(rel) = source[search_from..].find("@nursery") {
        let kw_start = search_from + rel;
        let Some(brace_rel) = source[kw_start..].find('{') else { break };
        let header_end = kw_start + brace_rel;
        let Some(close) = match_brace(source, header_end) else { break };

        counters.nursery += 1;
        let id = counters.nursery;
        let inner_start = header_end + 1;
        let inner = &source[inner_start..close];

        let opening = format!(
            "{{ CCNursery* __cc_nursery{id} = cc_nursery_create(); assert(__cc_nursery{id});{inner}cc_nursery_wait(__cc_nursery{id}); cc_nursery_free(__cc_nursery{id}); }}",
        );
        edits.push(Edit::new(kw_start, close + 1, opening, "nursery"));
        search_from = close + 1;
    }
    edits
}

/// The nearest nursery variable enclosing byte offset `pos`, found by
/// scanning backward for a `CCNursery* <name> = cc_nursery_create();`
/// whose matching `cc_nursery_free(<name>)` hasn't appeared yet. Nurseries
/// are lowered before spawns run, so by this point every `@nursery` block
/// in `source` already has this exact shape.
fn find_enclosing_nursery_var(source: &str, pos: usize) -> Option<String> {
    let prefix = &source[..pos];
    let mut search_end = prefix.len();
    while let Some(idx) = prefix[..search_end].rfind("CCNursery* ") {
        let after = &prefix[idx + "CCNursery* ".len()..];
        if let Some(eq_pos) = after.find(" = cc_nursery_create();") {
            let name = after[..eq_pos].trim().to_string();
            let free_marker = format!("cc_nursery_free({name})");
            if !prefix[idx..].contains(&free_marker) {
                return Some(name);
            }
        }
        search_end = idx;
    }
    None
}

/// Recognize a bare function call used as the whole spawn argument —
/// `fn()` or `fn(42)` — as opposed to a closure value. `name` must not be a
/// closure factory call, since `spawn(__cc_closure_make_N())` is itself a
/// zero-capture closure value and stays on the closure0 path. The single
/// argument, if any, must be an integer literal (§4.7's 5th spawn shape).
fn parse_bare_call(s: &str) -> Option<(String, Option<String>)> {
    let s = s.trim();
    let open = s.find('(')?;
    if !s.ends_with(')') {
        return None;
    }
    let name = &s[..open];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    if name.starts_with("__cc_closure_make_") {
        return None;
    }
    let inner = s[open + 1..s.len() - 1].trim();
    if inner.is_empty() {
        return Some((name.to_string(), None));
    }
    let digits = inner.strip_prefix('-').unwrap_or(inner);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return Some((name.to_string(), Some(inner.to_string())));
    }
    None
}

/// Lower `spawn(...)` call sites. By the time this runs, a `spawn(() => {
/// ... })` literal has already become `spawn(__cc_closure_make_N(...))` via
/// the Closure Pass, so every closure-value shape here is a plain call-
/// argument count dispatch rather than literal recognition (§4.7). The one
/// exception is a bare function call (`spawn(fn())` / `spawn(fn(42))`),
/// which has no closure ABI to lean on and instead gets a thunk-argument
/// struct routed through `cc_nursery_spawn`. A `spawn` with no enclosing
/// nursery on the scope stack is left as-is with a TODO marker rather than
/// guessed at, since there's no nursery handle to call into.
fn lower_spawns(source: &str, thunks: &mut Vec<SpawnThunk>, id_gen: &mut cc_abi::IdGen) -> EditBuffer {
    let mut edits = EditBuffer::new();
    let mut search_from = 0usize;
    while let Some(rel) = source[search_from..].find("spawn(") {
        let kw_start = search_from + rel;
        let open = kw_start + "spawn".len();
        let Some(close) = match_paren_from(source, open) else { break };
        let semi = source[close + 1..].find(';').map(|p| close + 1 + p + 1);
        let end = semi.unwrap_or(close + 1);

        let Some(nursery_var) = find_enclosing_nursery_var(source, kw_start) else {
            edits.push(Edit::new(kw_start, kw_start, "/* TODO: spawn outside nursery */ ".to_string(), "spawn_todo"));
            search_from = end;
            continue;
        };

        let args_str = &source[open + 1..close];
        let args = split_top_level(args_str);

        if args.len() == 1 {
            if let Some((fn_name, arg)) = parse_bare_call(args[0].trim()) {
                let id = id_gen.next();
                thunks.push(SpawnThunk { id, fn_name, arg: arg.clone() });
                let init = match &arg {
                    Some(v) => format!("__cc_spawn_arg{id}->arg = {v}; "),
                    None => String::new(),
                };
                let rendered = format!(
                    "{{ struct __cc_spawn_thunk_{id}* __cc_spawn_arg{id} = malloc(sizeof(*__cc_spawn_arg{id})); {init}cc_nursery_spawn({nursery_var}, __cc_spawn_trampoline_{id}, __cc_spawn_arg{id}); }}",
                );
                edits.push(Edit::new(kw_start, end, rendered, "spawn"));
                search_from = end;
                continue;
            }
        }

        let rendered = match args.len() {
            0 => String::new(),
            1 => format!(
                "{{ CCClosure0 __cc_spawned = {}; cc_nursery_spawn_closure0({nursery_var}, __cc_spawned); }}",
                args[0].trim()
            ),
            2 => format!(
                "{{ CCClosure1 __cc_spawned = {}; cc_nursery_spawn_closure1({nursery_var}, __cc_spawned, (intptr_t)({})); }}",
                args[0].trim(),
                args[1].trim(),
            ),
            _ => format!(
                "{{ CCClosure2 __cc_spawned = {}; cc_nursery_spawn_closure2({nursery_var}, __cc_spawned, (intptr_t)({}), (intptr_t)({})); }}",
                args[0].trim(),
                args[1].trim(),
                args[2].trim(),
            ),
        };
        if !rendered.is_empty() {
            edits.push(Edit::new(kw_start, end, rendered, "spawn"));
        }
        search_from = end;
    }
    edits
}

fn match_paren_from(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Remove `@defer name: stmt;` / `@defer stmt;` / `cancel name;` lines,
/// recording defers so their statements can be reissued in LIFO order
/// before the next closing brace at the same nesting depth (§4.7).
fn lower_defers(source: &str) -> (EditBuffer, Vec<(usize, String)>) {
    let mut edits = EditBuffer::new();
    let mut active: Vec<(String, String)> = Vec::new(); // (name, stmt)
    let mut fired_markers = Vec::new();
    let mut offset = 0usize;

    for raw_line in source.split_inclusive('\n') {
        let line = raw_line.strip_suffix('\n').unwrap_or(raw_line);
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("@defer ") {
            let (name, stmt) = match rest.split_once(':') {
                Some((n, s)) => (Some(n.trim().to_string()), s.trim().to_string()),
                None => (None, rest.trim().to_string()),
            };
            active.push((name.unwrap_or_default(), stmt));
            edits.push(Edit::new(offset, offset + raw_line.len(), String::new(), "defer"));
        } else if let Some(rest) = trimmed.strip_prefix("cancel ") {
            let name = rest.trim_end_matches(';').trim();
            if let Some(entry) = active.iter_mut().find(|(n, _)| n == name) {
                entry.1.clear();
            }
            edits.push(Edit::new(offset, offset + raw_line.len(), String::new(), "defer"));
        } else if trimmed == "}" {
            if !active.is_empty() {
                let epilogue: String = active
                    .iter()
                    .rev()
                    .filter(|(_, stmt)| !stmt.is_empty())
                    .map(|(_, stmt)| format!("{stmt}\n"))
                    .collect();
                fired_markers.push((offset, epilogue));
                active.clear();
            }
        }
        offset += raw_line.len();
    }

    (edits, fired_markers)
}

pub fn run(ctx: &mut PassCtx) -> anyhow::Result<()> {
    let mut counters = Counters { arena: 0, nursery: 0 };

    let arena_edits = lower_arenas(&ctx.source, &mut counters);
    log::debug!("block_lowering: rewrote {} arena(s)", crate::util::fmt_count_human(arena_edits.len()));
    if !arena_edits.is_empty() {
        ctx.set_source(arena_edits.apply(&ctx.source)?);
    }

    let (defer_edits, fires) = lower_defers(&ctx.source);
    log::debug!("block_lowering: rewrote {} defer(s)", crate::util::fmt_count_human(defer_edits.len() + fires.len()));
    if !defer_edits.is_empty() || !fires.is_empty() {
        let mut edits = defer_edits;
        for (pos, epilogue) in fires {
            if !epilogue.is_empty() {
                edits.push(Edit::new(pos, pos, epilogue, "defer_fire"));
            }
        }
        ctx.set_source(edits.apply(&ctx.source)?);
    }

    let nursery_edits = lower_nurseries(&ctx.source, &mut counters);
    log::debug!("block_lowering: rewrote {} nursery site(s)", crate::util::fmt_count_human(nursery_edits.len()));
    if !nursery_edits.is_empty() {
        ctx.set_source(nursery_edits.apply(&ctx.source)?);
    }

    let spawn_edits = lower_spawns(&ctx.source, &mut ctx.spawn_thunks, &mut ctx.spawn_thunk_id_gen);
    log::debug!("block_lowering: rewrote {} spawn(s)", crate::util::fmt_count_human(spawn_edits.len()));
    if !spawn_edits.is_empty() {
        ctx.set_source(spawn_edits.apply(&ctx.source)?);
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
    fn nursery_and_single_arg_spawn_lower_per_scenario_three() {
        let mut c = ctx("@nursery {\nspawn(__cc_closure_make_1());\n}\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("__cc_nursery1 = cc_nursery_create();"));
        assert!(c.source.contains("cc_nursery_spawn_closure0(__cc_nursery1, __cc_spawned)"));
        assert!(c.source.contains("cc_nursery_wait(__cc_nursery1); cc_nursery_free(__cc_nursery1);"));
    }

    #[test]
    fn arena_opens_and_frees_on_close_brace() {
        let mut c = ctx("@arena pool = 4096 {\nuse(pool);\n}\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("CCArena __cc_arena1 = cc_heap_arena(4096);"));
        assert!(c.source.contains("CCArena* pool = &__cc_arena1;"));
        assert!(c.source.contains("cc_heap_arena_free(&__cc_arena1);"));
    }

    #[test]
    fn defers_fire_in_lifo_order_before_closing_brace() {
        let mut c = ctx("{\n@defer a: free(a);\n@defer b: free(b);\n}\n");
        run(&mut c).unwrap();
        let pos_b = c.source.find("free(b);").unwrap();
        let pos_a = c.source.find("free(a);").unwrap();
        assert!(pos_b < pos_a);
    }

    #[test]
    fn cancelled_defer_does_not_fire() {
        let mut c = ctx("{\n@defer a: free(a);\ncancel a;\n}\n");
        run(&mut c).unwrap();
        assert!(!c.source.contains("free(a);"));
    }

    #[test]
    fn two_arg_spawn_uses_closure1_variant() {
        let mut c = ctx("@nursery {\nspawn(c, 7);\n}\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("cc_nursery_spawn_closure1(__cc_nursery1, __cc_spawned, (intptr_t)(7));"));
    }

    #[test]
    fn spawn_outside_any_nursery_gets_a_todo_marker_instead_of_a_guess() {
        let mut c = ctx("spawn(c);\n");
        run(&mut c).unwrap();
        assert!(c.source.contains("/* TODO: spawn outside nursery */ spawn(c);"));
    }

    #[test]
    fn spawn_of_zero_arg_function_call_uses_thunk_and_nursery_spawn() {
        let mut c = ctx("@nursery {\nspawn(do_work());\n}\n");
        run(&mut c).unwrap();
        assert_eq!(c.spawn_thunks.len(), 1);
        assert_eq!(c.spawn_thunks[0].fn_name, "do_work");
        assert_eq!(c.spawn_thunks[0].arg, None);
        assert!(c.source.contains("struct __cc_spawn_thunk_1* __cc_spawn_arg1 = malloc(sizeof(*__cc_spawn_arg1));"));
        assert!(c.source.contains("cc_nursery_spawn(__cc_nursery1, __cc_spawn_trampoline_1, __cc_spawn_arg1);"));
    }

    #[test]
    fn spawn_of_function_call_with_int_literal_fills_in_thunk_arg() {
        let mut c = ctx("@nursery {\nspawn(do_work(42));\n}\n");
        run(&mut c).unwrap();
        assert_eq!(c.spawn_thunks[0].arg, Some("42".to_string()));
        assert!(c.source.contains("__cc_spawn_arg1->arg = 42;"));
    }

    #[test]
    fn spawn_of_zero_capture_closure_factory_call_still_uses_closure0_path() {
        let mut c = ctx("@nursery {\nspawn(__cc_closure_make_1());\n}\n");
        run(&mut c).unwrap();
        assert!(c.spawn_thunks.is_empty());
        assert!(c.source.contains("cc_nursery_spawn_closure0(__cc_nursery1, __cc_spawned)"));
    }
}
