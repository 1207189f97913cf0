//! symcheck: validate a symbol container file and print layouts from it.
//!
//! Logs go to stderr so stdout only carries the report.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use symcontainer::{parse_isf_file, IsfError, Options};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "symcheck", version, about = "Validate a symbol container and query its layouts")]
struct Cli {
    /// Symbol container file (.json or .json.xz)
    file: PathBuf,
    /// Architecture pointer width in bytes (default: the `pointer` base type)
    #[arg(long)]
    pointer_size: Option<u64>,
    /// Print the layout of this user type (repeatable)
    #[arg(long = "type", value_name = "NAME")]
    types: Vec<String>,
    /// Print the address of this symbol (repeatable)
    #[arg(long = "symbol", value_name = "NAME")]
    symbols: Vec<String>,
    /// Print the nearest symbol at or below this address, hex or decimal (repeatable)
    #[arg(long = "address", value_name = "ADDR", value_parser = report::parse_address)]
    addresses: Vec<u64>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut options = Options::default();
    if let Some(size) = cli.pointer_size {
        options = options.with_pointer_size(size);
    }

    tracing::info!("Loading symbol container: {}", cli.file.display());
    let container = match parse_isf_file(&cli.file, &options) {
        Ok(c) => c,
        Err(IsfError::Invalid(diags)) => {
            print!("{}", report::render_diagnostics(&diags));
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", report::render_summary(&container));
    let mut missing = false;
    for name in &cli.types {
        match report::render_type(&container, name) {
            Ok(text) => print!("{}", text),
            Err(e) => {
                println!("{}", e);
                missing = true;
            }
        }
    }
    for name in &cli.symbols {
        match container.symbol(name) {
            Ok(s) => println!("{}", report::render_symbol(name, s)),
            Err(e) => {
                println!("{}", e);
                missing = true;
            }
        }
    }
    for &address in &cli.addresses {
        match container.symbol_at_or_below(address) {
            Ok(near) => println!("{:#x} = {}", address, report::render_nearest(&near)),
            Err(e) => {
                println!("{}", e);
                missing = true;
            }
        }
    }

    Ok(if missing { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
