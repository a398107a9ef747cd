mod app;
mod output;

use anyhow::Context;
use clap::Parser;
use jvmaot::{ClassSource, Compiler, CompilerConfig};

use crate::app::Cli;

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // jvmaot info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("jvmaot", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?,
        None => CompilerConfig::default(),
    };
    if let Some(main_class) = &cli.main_class {
        config.main_class = Some(main_class.clone());
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if cli.project {
        config.generate_project_files = true;
    }
    for source in &cli.sources {
        log::warn!("ignoring native source directory {}", source.display());
    }

    let mut compiler = Compiler::new(config);
    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("input {} does not exist", input.display());
        }
        compiler.add_source(ClassSource::from_path(input));
    }

    let report = compiler
        .run(&cli.output)
        .with_context(|| format!("compilation into {} failed", cli.output.display()))?;
    output::print_report(&report, cli.json)
}
