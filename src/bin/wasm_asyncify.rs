//! Thin command-line driver for the `wasm_asyncify` library, in the spirit
//! of the teacher's own `src/bin/instantiate.rs`: read a module, run one
//! library call, write the result. No WAT compiling and no host runtime;
//! both are out of scope, and an input ending in `.wat` is rejected with a
//! message pointing at an external compiler.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use wasm_asyncify::{AsyncifyConfig, Matcher};

/// Rewrites a WebAssembly module for Binaryen-compatible asyncify support.
#[derive(Parser, Debug)]
#[command(name = "wasm-asyncify", version, about)]
struct Args {
    /// Input `.wasm` module.
    input: PathBuf,

    /// Output path; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Patterns (exact/wildcard/WIT) selecting asynchronous imports.
    #[arg(long = "instrument", value_name = "PATTERN")]
    instrument: Vec<String>,

    /// Declared-function-name patterns forced into the instrumented set,
    /// overriding reachability analysis entirely.
    #[arg(long = "only", value_name = "PATTERN")]
    only: Vec<String>,

    /// Declared-function-name patterns added to the instrumented set.
    #[arg(long = "add", value_name = "PATTERN")]
    add: Vec<String>,

    /// Declared-function-name patterns removed from the instrumented set.
    #[arg(long = "remove", value_name = "PATTERN")]
    remove: Vec<String>,

    /// Re-propagate `--add` backward through the call graph.
    #[arg(long)]
    propagate_add_list: bool,

    /// Ignore `--instrument` import matching entirely (use with `--only`).
    #[arg(long)]
    ignore_imports: bool,

    /// Treat `call_indirect`/`call_ref` as non-async edges.
    #[arg(long)]
    ignore_indirect: bool,

    /// Insert runtime state-transition assertions into the five helpers.
    #[arg(long)]
    asserts: bool,

    /// Import `asyncify_state`/`asyncify_data` from `"env"`.
    #[arg(long)]
    import_globals: bool,

    /// Export `asyncify_state`/`asyncify_data`.
    #[arg(long)]
    export_globals: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<()> {
    if args.input.extension().and_then(|e| e.to_str()) == Some("wat") {
        bail!(
            "{} looks like WAT text; pre-compile it to .wasm first (wat2wasm is not bundled here)",
            args.input.display()
        );
    }

    let input = fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;

    let config = build_config(&args)?;
    let output = wasm_asyncify::rewrite(&input, &config)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("rewriting module")?;

    match args.output {
        Some(path) => fs::write(&path, output).with_context(|| format!("writing {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&output).context("writing to stdout")?;
        }
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<AsyncifyConfig> {
    let mut config = AsyncifyConfig::new();

    if !args.instrument.is_empty() {
        let matchers = args.instrument.iter().map(|p| parse_import_matcher(p)).collect::<Result<Vec<_>>>()?;
        config = config.with_matcher(Matcher::any_of(matchers));
    }
    for pattern in &args.only {
        config = config.with_only(parse_function_matcher(pattern));
    }
    for pattern in &args.add {
        config = config.with_add(parse_function_matcher(pattern));
    }
    for pattern in &args.remove {
        config = config.with_remove(parse_function_matcher(pattern));
    }

    config.propagate_add_list = args.propagate_add_list;
    config.ignore_imports = args.ignore_imports;
    config.ignore_indirect = args.ignore_indirect;
    config.asserts = args.asserts;
    config.import_globals = args.import_globals;
    config.export_globals = args.export_globals;

    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(config)
}

/// Picks an import-matcher shape from the pattern's own punctuation: any
/// `*` is a wildcard, an `@...#` is WIT, anything else is exact.
fn parse_import_matcher(pattern: &str) -> Result<Matcher> {
    let matcher = if pattern.contains('*') {
        Matcher::wildcard(pattern).map_err(|e| anyhow::anyhow!("{e}"))?
    } else if pattern.contains('#') {
        Matcher::wit(pattern).map_err(|e| anyhow::anyhow!("{e}"))?
    } else {
        Matcher::exact(pattern)
    };
    Ok(matcher)
}

/// `--only`/`--add`/`--remove` patterns match declared function names; a
/// trailing `*` makes it a prefix match, otherwise it's exact.
fn parse_function_matcher(pattern: &str) -> Matcher {
    match pattern.strip_suffix('*') {
        Some(prefix) => Matcher::function_prefix(prefix),
        None => Matcher::function_name(pattern),
    }
}
