//! Small formatting helpers shared by the driver and the pipeline's
//! verbose logging.

use cc_abi::Diagnostics;

/// Render every recorded diagnostic as `file:line[:col]: level: message`,
/// one per line (§4.10 contract).
pub fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    diagnostics
        .entries()
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 0 if any fatal diagnostic was recorded, else 1; matches the exit-status
/// propagation described in §7.
pub fn exit_status(diagnostics: &Diagnostics) -> i32 {
    if diagnostics.has_fatal() { 1 } else { 0 }
}

/// Human-readable rewrite count for verbose pass-exit logging, e.g. "12"
/// or "1.2k".
pub fn fmt_count_human(n: usize) -> String {
    if n < 1000 {
        return n.to_string();
    }
    let thousands = n as f64 / 1000.0;
    format!("{thousands:.1}k")
}
