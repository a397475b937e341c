//! The `vertex-microcode` binary: rasterises the instruction table into a
//! 256 KiB control-ROM image, ready to burn onto the hardware's control
//! store. Takes no input; the table is fixed at compile time.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use vertex_cli::CliError;

/// Generate the Vertex CPU's control ROM.
#[derive(Parser)]
#[command(name = "vertex-microcode", about = "Vertex control-ROM generator")]
struct Args {
    /// Output path for the control ROM image.
    #[arg(default_value = "control.rom")]
    output: String,
}

fn run(args: Args) -> Result<(), CliError> {
    let rom = vertex_isa::instruction_set().control_rom();
    let bytes = vertex_isa::rom::control_rom_bytes(&rom);
    fs::write(&args.output, bytes).map_err(|source| CliError::Write { path: args.output.clone(), source })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("vertex-microcode: {error}");
            ExitCode::FAILURE
        }
    }
}
