//! A command line interface for the Tern scripting engine.
//!
//! Runs script files, or serves a Debug Adapter Protocol session with `--dap`.
#![allow(clippy::print_stdout)]

mod debug;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tern_engine::Context;

/// CLI configuration for Tern.
#[derive(Debug, Parser)]
#[command(author, version, about, name = "tern")]
struct Opt {
    /// The script file(s) to execute. Reads standard input when none is given.
    #[arg(name = "FILE", value_hint = clap::ValueHint::FilePath)]
    files: Vec<PathBuf>,

    /// Start a Debug Adapter Protocol server instead of running scripts.
    #[arg(long, conflicts_with = "FILE")]
    dap: bool,

    /// Serve the DAP session on this TCP port of 127.0.0.1 instead of stdio.
    #[arg(long, requires = "dap")]
    port: Option<u16>,

    /// Maximum script call depth.
    #[arg(long, default_value_t = tern_engine::context::DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Log verbosity. Logs always go to standard error.
    #[arg(long, env = "TERN_LOG", default_value = "warn")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Opt::parse();

    SimpleLogger::new()
        .with_level(args.log_level)
        .init()
        .wrap_err("failed to initialize logging")?;

    if args.dap {
        return run_dap(args.port);
    }

    let mut context = Context::default();
    context.set_max_call_depth(args.max_call_depth);
    context.set_output(|line| println!("{line}"));

    if args.files.is_empty() {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .wrap_err("failed to read standard input")?;
        return run_source(&mut context, Path::new("<stdin>"), &source);
    }

    for file in &args.files {
        let source = std::fs::read_to_string(file)
            .wrap_err_with(|| format!("failed to read `{}`", file.display()))?;
        run_source(&mut context, file, &source)?;
    }
    Ok(())
}

fn run_source(context: &mut Context, path: &Path, source: &str) -> Result<()> {
    log::debug!("running {}", path.display());
    context
        .eval(path.to_string_lossy().into_owned().into(), source)
        .map(drop)
        .map_err(|err| eyre!("{}: {err}", path.display()))
}

#[cfg(feature = "dap")]
fn run_dap(port: Option<u16>) -> Result<()> {
    use debug::dap::{DapTransportMode, run_dap_server};

    let mode = port.map_or(DapTransportMode::Stdio, DapTransportMode::Tcp);
    run_dap_server(mode).wrap_err("debug adapter failed")
}

#[cfg(not(feature = "dap"))]
fn run_dap(_port: Option<u16>) -> Result<()> {
    Err(eyre!("this build of tern has no debug adapter; enable the `dap` feature"))
}
