//! fwtrace CLI
//!
//! Classifies a raw Cortex-M firmware image and prints one line per
//! location. Set `RUST_LOG=fwtrace=debug` to follow the tracer on stderr.

use clap::Parser;
use fwtrace::{analyze_file, render_report};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Static firmware analyzer.
///
/// Reconstructs the vector table of a raw firmware image and classifies
/// every reachable location as code or literal data.
#[derive(Parser, Debug)]
#[command(name = "fwtrace")]
#[command(author, about, long_about = None)]
struct Args {
    /// Firmware image to analyze
    #[arg(short = 'i', long = "inputfile", value_name = "PATH")]
    input_file: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match analyze_file(&args.input_file) {
        Ok(image) => {
            print!("{}", render_report(&image));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error analyzing {}: {}", args.input_file.display(), e);
            ExitCode::FAILURE
        }
    }
}
