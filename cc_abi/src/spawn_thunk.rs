//! Spawn thunk descriptor (§4.7 "`spawn(fn())` / `spawn(fn(int-literal))`").
//!
//! A bare function call passed to `spawn` has no closure ABI to lean on, so
//! the Nursery / Spawn Lowering pass records one of these per site and the
//! Emitter materializes a tiny per-site argument struct plus a trampoline
//! that recovers the argument and calls the function, for `cc_nursery_spawn`.

/// One `spawn(fn())` / `spawn(fn(N))` call site. `arg` holds the int-literal
/// text when the call passed one, `None` for a zero-argument call.
#[derive(Debug, Clone)]
pub struct SpawnThunk {
    pub id: u32,
    pub fn_name: String,
    pub arg: Option<String>,
}
