//! CLI tool to run a batch definition file through `sbebatch`.

use clap::Parser;
use seabird_batch::{BatchRunner, DEFAULT_PROGRAM, parse_batch};
use std::fs;
use std::io::{self, Write};
use std::process;
use tracing_subscriber::EnvFilter;

/// Chain Sea-Bird processing modules into one sbebatch script and run it.
#[derive(Parser)]
#[command(name = "sbe-batch")]
struct Cli {
    /// Batch definition file (one module per line)
    definition: String,

    /// Input file pattern for the first module, e.g. "raw*.hex"
    input: String,

    /// Print the generated script to stdout instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Batch executable to invoke
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: String,

    /// Working directory for the batch executable
    #[arg(short, long)]
    workdir: Option<String>,

    /// Log rendered stages and the invoked command on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let definition = match fs::read_to_string(&cli.definition) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading definition file '{}': {e}", cli.definition);
            process::exit(1);
        }
    };

    let batch = match parse_batch(&definition) {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("Error in '{}': {e}", cli.definition);
            process::exit(1);
        }
    };

    if cli.dry_run {
        match batch.render(&cli.input) {
            Ok(script) => {
                if let Err(e) = writeln!(io::stdout(), "{script}") {
                    eprintln!("Error writing output: {e}");
                    process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Batch error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let mut runner = BatchRunner::new().program(cli.program);
    if let Some(dir) = cli.workdir {
        runner = runner.working_dir(dir);
    }

    tracing::debug!(stages = batch.len(), input = %cli.input, "starting batch");
    if let Err(e) = batch.run_with(&runner, &cli.input) {
        eprintln!("Batch error: {e}");
        process::exit(1);
    }
}
