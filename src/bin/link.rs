use std::fs;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use vmtool::diagnostics::{error, info};
use vmtool::{exe, linker, object};

#[derive(Parser)]
#[command(name = "vmld", about = "Link .vmo object files into a .vmc executable")]
struct Cli {
    #[arg(short = 'o', long)]
    output: String,

    #[arg(required = true)]
    inputs: Vec<String>,

    /// Report the section layout chosen for each input object
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut objects = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                error(format!("failed to read {path}: {e}"));
                return ExitCode::FAILURE;
            }
        };
        match object::read(path, bytes) {
            Ok(o) => objects.push(o),
            Err(e) => {
                error(e);
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.verbose {
        for obj in &objects {
            info(format!("{}: text={} bytes, data={} bytes", obj.path, obj.text.len(), obj.data.len()));
        }
    }

    let image = match linker::link(&objects) {
        Ok(i) => i,
        Err(e) => {
            error(e);
            return ExitCode::FAILURE;
        }
    };

    if cli.verbose {
        info(format!("entry point: 0x{:08X}", image.entry));
    }

    let bytes = exe::write(&image);
    if let Err(e) = fs::write(&cli.output, bytes) {
        error(format!("failed to write {}: {e}", cli.output));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
