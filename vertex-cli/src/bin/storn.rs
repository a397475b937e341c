//! The `storn` binary: compiles a Storn source file (or stdin) down to a
//! Vertex ROM image, optionally keeping the intermediate Vtx assembly and
//! an export map for other modules to import against.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use vertex_cli::driver::{build_storn, exports_document, load_imports, render_exports};
use vertex_cli::CliError;

/// Compile a Storn source file into a Vertex ROM image.
#[derive(Parser)]
#[command(name = "storn", about = "Storn compiler")]
struct Args {
    /// Source file (stdin if omitted).
    input: Option<String>,

    /// Output ROM file (stdout if omitted).
    #[arg(short, long)]
    output: Option<String>,

    /// File to write the generated Vtx assembly to.
    #[arg(short = 's', long)]
    assembly: Option<String>,

    /// Address to start the program from, accepting a `0x`-prefixed hex
    /// literal or a plain decimal number. Defaults to the end of memory.
    #[arg(short, long, value_parser = parse_address)]
    address: Option<u16>,

    /// File to read import data (exported routines from other modules) from.
    #[arg(short, long)]
    imports: Option<String>,

    /// File to write this module's export data to.
    #[arg(short, long)]
    export: Option<String>,
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

    let imports = match &args.imports {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| CliError::Read { path: path.clone(), source })?;
            load_imports(&text)?
        }
        None => vertex_asm::ModuleInterchange::empty(),
    };

    let build = build_storn(&source, &imports, args.address)?;

    if let Some(path) = &args.assembly {
        fs::write(path, &build.assembly).map_err(|source| CliError::Write { path: path.clone(), source })?;
    }

    if let Some(path) = &args.export {
        let doc = exports_document(&build.module);
        let text = render_exports(&doc)?;
        fs::write(path, text).map_err(|source| CliError::Write { path: path.clone(), source })?;
    }

    match &args.output {
        Some(path) => fs::write(path, &build.module.bytes).map_err(|source| CliError::Write { path: path.clone(), source })?,
        None => io::stdout().write_all(&build.module.bytes).map_err(|source| CliError::Write { path: "<stdout>".to_string(), source })?,
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("storn: {error}");
            ExitCode::FAILURE
        }
    }
}
