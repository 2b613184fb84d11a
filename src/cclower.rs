//! Driver / CLI (§4.11): a thin binary that wires a `PassCtx`, runs the
//! lowering pipeline, and emits the lowered C — deliberately small, since
//! the C parser front end that produces the real stub AST lives outside
//! this crate.

mod edit_buffer;
mod emit;
mod pass_ctx;
mod passes;
mod scope_stack;
mod type_registry;
mod util;

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cc_abi::{StubAst, SymbolTable};
use clap::Parser;
use either::Either;
use owo_colors::OwoColorize;

use crate::emit::Emitter;
use crate::pass_ctx::PassCtx;
use crate::passes::{run_pipeline, PassSet, PipelineConfig};
use crate::type_registry::TypeRegistry;

/// Lower a CC source file to portable C.
#[derive(Parser, Debug)]
#[command(name = "cclower", about = "Lower CC (structured-concurrency C) source to plain C")]
struct Cli {
    /// CC source file to lower
    input: PathBuf,

    /// Stub-AST JSON fixture produced by the (external) CC front end
    #[arg(long)]
    ast: Option<PathBuf>,

    /// Output path; defaults to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit `#line` directives mapping back to the CC source
    #[arg(long, default_value_t = true)]
    emit_line_directives: bool,

    /// Raise log verbosity
    #[arg(short, long)]
    verbose: bool,

    /// Run only the named pass (repeatable); default is every pass
    #[arg(long = "only-pass", value_name = "PASS")]
    only_pass: Vec<String>,
}

fn pass_set_from_names(names: &[String]) -> Result<PassSet> {
    let mut set = PassSet::empty();
    for name in names {
        let flag = match name.as_str() {
            "ufcs" => PassSet::UFCS,
            "closure" => PassSet::CLOSURE,
            "slice-check" => PassSet::SLICE_CHECK,
            "auto-blocking" => PassSet::AUTO_BLOCKING,
            "await-hoist" => PassSet::AWAIT_HOIST,
            "async-lowering" => PassSet::ASYNC_LOWER,
            "block-lowering" => PassSet::BLOCK_LOWER,
            "marker-strip" => PassSet::MARKER_STRIP,
            other => anyhow::bail!("unknown pass name '{other}'"),
        };
        set |= flag;
    }
    Ok(set)
}

fn run(cli: Cli) -> Result<i32> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let ast = match &cli.ast {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            StubAst::from_json(&bytes)?
        }
        None => StubAst::new(Vec::new()),
    };

    let enabled_passes = if cli.only_pass.is_empty() {
        PassSet::default()
    } else {
        pass_set_from_names(&cli.only_pass)?
    };
    let config = PipelineConfig { enabled_passes, verbose: cli.verbose, keep_going: false };

    let mut ctx = PassCtx::new(source, ast, SymbolTable::new(), TypeRegistry::new());
    run_pipeline(&mut ctx, &config)?;

    if ctx.has_fatal_diagnostics() {
        for line in util::render_diagnostics(&ctx.diagnostics).lines() {
            eprintln!("{}", line.red());
        }
        return Ok(util::exit_status(&ctx.diagnostics));
    }

    let emitter = Emitter::new(cli.emit_line_directives);
    let output = emitter.emit(&ctx, &cli.input.to_string_lossy());

    let mut sink: Either<fs::File, std::io::Stdout> = match &cli.output {
        Some(path) => Either::Left(fs::File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Either::Right(std::io::stdout()),
    };
    sink.write_all(output.as_bytes()).context("writing lowered output")?;

    Ok(0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    env_logger::Builder::new()
        .filter_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    match run(cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {e:#}", "error".red());
            ExitCode::FAILURE
        }
    }
}
