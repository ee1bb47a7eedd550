//! The assembler binary.  Takes a source file, assembles it into the
//! Pendragon binary format, and writes the result.
//!
//! Run with `--help` for more info.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use pendragon::pipeline;

#[derive(Debug, Parser)]
#[command(version, about = "Assembler for the Pendragon VM", long_about = None)]
struct Args {
    /// The input assembly file
    file: PathBuf,
    /// Output binary path
    #[arg(short, long, default_value = "out.bin")]
    out: PathBuf,
    /// Print per-pass progress and segment sizes
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// Program name for the header: input file stem, extension dropped.
fn program_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Info);
    }
    logger.init();

    let source = match std::fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Assembly error: cannot read {}: {err}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let output = match pipeline::assemble(&source, &program_name(&args.file)) {
        Ok(output) => output,
        Err(errors) => {
            for error in &errors {
                eprintln!("Assembly error: {error}");
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = std::fs::write(&args.out, &output.binary) {
        eprintln!("Assembly error: cannot write {}: {err}", args.out.display());
        return ExitCode::FAILURE;
    }

    if args.verbose {
        println!("Assembled to: {}", args.out.display());
        println!("Data segment: {} bytes", output.data_size);
        println!("Code segment: {} bytes", output.code_size);
    } else {
        println!("Assembly successful: {}", args.out.display());
    }
    ExitCode::SUCCESS
}
