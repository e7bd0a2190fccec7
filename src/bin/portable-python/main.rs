//! portable-python CLI - build self-contained python distributions

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use portable_python::util::GlobalContext;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("portable_python=debug")
    } else {
        EnvFilter::new("portable_python=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(!cli.no_color);
    ctx.set_dryrun(cli.dryrun);

    match cli.command {
        Commands::Build(args) => commands::build::execute(&ctx, args),
        Commands::Inspect(args) => commands::inspect::execute(&ctx, args),
        Commands::List(args) => commands::list::execute(args),
        Commands::Scan(args) => commands::scan::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
