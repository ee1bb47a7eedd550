//! The virtual machine binary.  Loads a Pendragon binary at a given data
//! load address and runs it to completion.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pendragon::machine::{Binary, StdLineIo, Vm, VmConfig};

#[derive(Debug, Parser)]
#[command(version, about = "The Pendragon virtual machine", long_about = None)]
struct Args {
    /// The program binary
    binary: PathBuf,
    /// Load address for the data segment (decimal or 0x-prefixed hex)
    #[arg(value_parser = parse_address)]
    load_address: u16,
}

fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| format!("'{text}' is not a 16-bit address"))
}

fn run(args: &Args) -> Result<(), String> {
    let image = std::fs::read(&args.binary)
        .map_err(|err| format!("cannot read {}: {err}", args.binary.display()))?;
    let binary = Binary::parse(&image).map_err(|err| err.to_string())?;

    let mut vm = Vm::new(VmConfig::default()).map_err(|err| err.to_string())?;
    vm.load(&binary, args.load_address)
        .map_err(|err| err.to_string())?;
    vm.run(&mut StdLineIo).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Runtime error: {message}");
            ExitCode::FAILURE
        }
    }
}
