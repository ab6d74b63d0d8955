use std::fs;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use vmtool::diagnostics::error;
use vmtool::object;

#[derive(Parser)]
#[command(name = "vmas", about = "Assemble VM source files into .vmo object files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into a .vmo object file
    Assemble {
        input: String,
        #[arg(short = 'o', long)]
        output: Option<String>,
    },
    /// Print a .vmo object file's sections, symbols, and relocations
    Dump { file: String },
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
    match cli.command {
        Command::Assemble { input, output } => run_assemble(&input, output),
        Command::Dump { file } => run_dump(&file),
    }
}

fn run_assemble(input: &str, output: Option<String>) -> ExitCode {
    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            error(format!("failed to read {input}: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let module = match vmtool::assemble(&source) {
        Ok(m) => m,
        Err(e) => {
            error(e);
            return ExitCode::FAILURE;
        }
    };

    let bytes = object::write(&module);
    let output_path = output.unwrap_or_else(|| default_output_path(input));
    if let Err(e) = fs::write(&output_path, bytes) {
        error(format!("failed to write {output_path}: {e}"));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn default_output_path(input: &str) -> String {
    match input.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.vmo"),
        None => format!("{input}.vmo"),
    }
}

fn run_dump(file: &str) -> ExitCode {
    let bytes = match fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            error(format!("failed to read {file}: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let obj = match object::read(file, bytes) {
        Ok(o) => o,
        Err(e) => {
            error(e);
            return ExitCode::FAILURE;
        }
    };

    println!("text: {} bytes", obj.text.len());
    println!("data: {} bytes", obj.data.len());
    println!("symbols:");
    for s in &obj.symbols {
        println!("  {:<20} section={:?} value=0x{:08X} global={}", s.name, s.section, s.value, s.global);
    }
    println!("relocations:");
    for r in &obj.relocations {
        println!("  offset=0x{:08X} section={:?} name={}", r.offset, r.section, r.name);
    }
    ExitCode::SUCCESS
}
