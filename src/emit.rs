//! Emitter (§4.9, component M): wraps the fully-lowered buffer with fixed
//! runtime includes, closure forward declarations and definitions, and the
//! `#line` directive that lets compile errors in the emitted C map back to
//! the original CC source.

use std::fmt::Write as _;

use cc_abi::{ClosureDescriptor, SpawnThunk};

use crate::pass_ctx::PassCtx;

const RUNTIME_INCLUDES: &[&str] = &[
    "cc_nursery.h",
    "cc_closure.h",
    "cc_slice.h",
    "cc_runtime.h",
    "std/task_intptr.h",
];

pub struct Emitter {
    pub emit_line_directives: bool,
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter { emit_line_directives: true }
    }
}

impl Emitter {
    pub fn new(emit_line_directives: bool) -> Self {
        Emitter { emit_line_directives }
    }

    pub fn emit(&self, ctx: &PassCtx, input_path: &str) -> String {
        let mut out = String::new();

        for inc in RUNTIME_INCLUDES {
            let _ = writeln!(out, "#include \"{inc}\"");
        }
        out.push('\n');

        for closure in &ctx.closures {
            let _ = writeln!(out, "{}", forward_decl(closure));
        }
        for thunk in &ctx.spawn_thunks {
            let _ = writeln!(out, "{}", spawn_thunk_forward_decl(thunk));
        }
        if !ctx.closures.is_empty() || !ctx.spawn_thunks.is_empty() {
            out.push('\n');
        }

        if self.emit_line_directives {
            let _ = writeln!(out, "#line 1 \"{input_path}\"");
        }
        out.push_str(&ctx.source);
        if !ctx.source.ends_with('\n') {
            out.push('\n');
        }

        if !ctx.closures.is_empty() {
            out.push('\n');
            for closure in &ctx.closures {
                out.push_str(&definition(closure));
                out.push('\n');
            }
        }

        if !ctx.spawn_thunks.is_empty() {
            out.push('\n');
            for thunk in &ctx.spawn_thunks {
                out.push_str(&spawn_thunk_definition(thunk));
                out.push('\n');
            }
        }

        out
    }
}

fn spawn_thunk_forward_decl(thunk: &SpawnThunk) -> String {
    format!(
        "struct __cc_spawn_thunk_{0} {{ int arg; }};\nstatic void __cc_spawn_trampoline_{0}(void*);",
        thunk.id
    )
}

fn spawn_thunk_definition(thunk: &SpawnThunk) -> String {
    let mut out = String::new();
    let call = match &thunk.arg {
        Some(_) => format!("(void){}(t->arg);", thunk.fn_name),
        None => format!("(void){}();", thunk.fn_name),
    };
    let _ = writeln!(out, "static void __cc_spawn_trampoline_{}(void* raw) {{", thunk.id);
    let _ = writeln!(out, "    struct __cc_spawn_thunk_{}* t = raw;", thunk.id);
    let _ = writeln!(out, "    {call}");
    let _ = writeln!(out, "    free(t);");
    let _ = writeln!(out, "}}");
    out
}

fn entry_signature(closure: &ClosureDescriptor) -> String {
    let extra: Vec<&str> = match closure.params.count() {
        0 => vec![],
        1 => vec!["intptr_t arg0"],
        _ => vec!["intptr_t arg0", "intptr_t arg1"],
    };
    let mut params = vec!["void* __env".to_string()];
    params.extend(extra.iter().map(|s| s.to_string()));
    format!("static void* __cc_closure_entry_{}({})", closure.id, params.join(", "))
}

fn forward_decl(closure: &ClosureDescriptor) -> String {
    format!("{};", entry_signature(closure))
}

fn closure_type_name(closure: &ClosureDescriptor) -> &'static str {
    match closure.params.count() {
        0 => "CCClosure0",
        1 => "CCClosure1",
        _ => "CCClosure2",
    }
}

fn definition(closure: &ClosureDescriptor) -> String {
    let id = closure.id;
    let mut out = String::new();

    if closure.has_captures() {
        let _ = writeln!(out, "typedef struct {{");
        for c in &closure.captures {
            let _ = writeln!(out, "    {} {};", c.ty, c.name);
        }
        let _ = writeln!(out, "}} __cc_closure_env_{id};");
        let _ = writeln!(out, "static void __cc_closure_drop_{id}(void* env) {{ free(env); }}");
    }

    let _ = writeln!(out, "{} {{", entry_signature(closure));
    if closure.has_captures() {
        let _ = writeln!(out, "    __cc_closure_env_{id}* env = __env;");
        for c in &closure.captures {
            if c.is_move_only() {
                let _ = writeln!(out, "    {} {} = cc_move(env->{});", c.ty, c.name, c.name);
            } else {
                let _ = writeln!(out, "    {} {} = env->{};", c.ty, c.name, c.name);
            }
        }
    }
    for (i, (name, ty)) in closure.params.params.iter().enumerate() {
        let _ = writeln!(out, "    {ty} {name} = ({ty})arg{i};");
    }
    let body = closure.body.trim();
    if body.starts_with('{') {
        let _ = writeln!(out, "    {body}");
    } else {
        let _ = writeln!(out, "    (void)({body});");
    }
    let _ = writeln!(out, "    return NULL;");
    let _ = writeln!(out, "}}");

    let factory_params: Vec<String> = closure.captures.iter().map(|c| format!("{} {}", c.ty, c.name)).collect();
    let ty = closure_type_name(closure);
    let _ = writeln!(out, "static {ty} __cc_closure_make_{id}({}) {{", factory_params.join(", "));
    if closure.has_captures() {
        let _ = writeln!(out, "    __cc_closure_env_{id}* env = malloc(sizeof(*env));");
        for c in &closure.captures {
            let _ = writeln!(out, "    env->{0} = {0};", c.name);
        }
        let _ = writeln!(
            out,
            "    return ({ty}){{ (void* (*)(void*{args}))__cc_closure_entry_{id}, env, __cc_closure_drop_{id} }};",
            args = if closure.params.count() > 0 { ", ..." } else { "" },
        );
    } else {
        let _ = writeln!(
            out,
            "    return ({ty}){{ (void* (*)(void*{args}))__cc_closure_entry_{id}, NULL, NULL }};",
            args = if closure.params.count() > 0 { ", ..." } else { "" },
        );
    }
    let _ = writeln!(out, "}}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_abi::{Capture, CaptureFlags, ClosureParams, Pos, StubAst, SymbolTable};
    use crate::type_registry::TypeRegistry;

    #[test]
    fn emits_runtime_includes_and_line_directive() {
        let ctx = PassCtx::new("int x;\n".into(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        let out = Emitter::default().emit(&ctx, "a.cc");
        assert!(out.contains("#include \"cc_nursery.h\""));
        assert!(out.contains("#line 1 \"a.cc\""));
        assert!(out.contains("int x;"));
    }

    #[test]
    fn line_directives_can_be_disabled() {
        let ctx = PassCtx::new("int x;\n".into(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        let out = Emitter::new(false).emit(&ctx, "a.cc");
        assert!(!out.contains("#line"));
    }

    #[test]
    fn closure_with_move_only_capture_emits_env_struct_and_move_in_entry() {
        let mut ctx = PassCtx::new(String::new(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        ctx.closures.push(ClosureDescriptor {
            id: 1,
            start: Pos::new(1, 1),
            end: Pos::new(1, 1),
            params: ClosureParams::default(),
            captures: vec![Capture { name: "s".into(), ty: "CCSlice".into(), flags: CaptureFlags::IS_SLICE | CaptureFlags::MOVE_ONLY }],
            body: "{ use(s); }".into(),
            enclosing_nursery_id: None,
        });
        let out = Emitter::default().emit(&ctx, "a.cc");
        assert!(out.contains("__cc_closure_env_1"));
        assert!(out.contains("cc_move(env->s)"));
    }

    #[test]
    fn spawn_thunk_gets_forward_declared_struct_and_trampoline_definition() {
        let mut ctx = PassCtx::new("int x;\n".into(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        ctx.spawn_thunks.push(SpawnThunk { id: 1, fn_name: "do_work".into(), arg: Some("42".into()) });
        let out = Emitter::default().emit(&ctx, "a.cc");
        assert!(out.contains("struct __cc_spawn_thunk_1 { int arg; };"));
        assert!(out.contains("static void __cc_spawn_trampoline_1(void* raw) {"));
        assert!(out.contains("do_work(t->arg);"));
    }

    #[test]
    fn closure_with_no_captures_skips_env_struct() {
        let mut ctx = PassCtx::new(String::new(), StubAst::new(vec![]), SymbolTable::new(), TypeRegistry::new());
        ctx.closures.push(ClosureDescriptor {
            id: 1,
            start: Pos::new(1, 1),
            end: Pos::new(1, 1),
            params: ClosureParams::default(),
            captures: vec![],
            body: "{ doit(); }".into(),
            enclosing_nursery_id: None,
        });
        let out = Emitter::default().emit(&ctx, "a.cc");
        assert!(!out.contains("__cc_closure_env_1"));
        assert!(out.contains("__cc_closure_make_1"));
    }
}
