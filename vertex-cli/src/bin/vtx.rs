//! The `vtx` binary: assembles a Vtx source file (or stdin) directly into
//! a Vertex ROM image, with no Storn stage and no import/export linking.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use vertex_cli::driver::build_vtx;
use vertex_cli::CliError;

/// Assemble a Vtx source file into a Vertex ROM image.
#[derive(Parser)]
#[command(name = "vtx", about = "Vtx assembler")]
struct Args {
    /// Source file (stdin if omitted).
    input: Option<String>,

    /// Output ROM file (stdout if omitted).
    #[arg(short, long)]
    output: Option<String>,

    /// Address to start the program from, accepting a `0x`-prefixed hex
    /// literal or a plain decimal number. Defaults to the end of memory.
    #[arg(short, long, value_parser = parse_address)]
    address: Option<u16>,
}

fn parse_address(text: &str) -> Result<u16, String> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        text.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let source = match &args.input {
        Some(path) => fs::read_to_string(path).map_err(|source| CliError::Read { path: path.clone(), source })?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(|source| CliError::Read { path: "<stdin>".to_string(), source })?;
            buf
        }
    };

    let module = build_vtx(&source, args.address)?;

    match &args.output {
        Some(path) => fs::write(path, &module.bytes).map_err(|source| CliError::Write { path: path.clone(), source })?,
        None => io::stdout().write_all(&module.bytes).map_err(|source| CliError::Write { path: "<stdout>".to_string(), source })?,
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("vtx: {error}");
            ExitCode::FAILURE
        }
    }
}
