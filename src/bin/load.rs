use std::fs;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use vmtool::diagnostics::error;
use vmtool::loader;

#[derive(Parser)]
#[command(name = "vmload", about = "Load a .vmc executable and report its entry point")]
struct Cli {
    file: String,

    /// Base offset to load the text/data sections at (zero-filled below it)
    #[arg(long, default_value_t = 0)]
    base: u32,
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

    let bytes = match fs::read(&cli.file) {
        Ok(b) => b,
        Err(e) => {
            error(format!("failed to read {}: {e}", cli.file));
            return ExitCode::FAILURE;
        }
    };

    let image = match loader::load(&cli.file, bytes, cli.base) {
        Ok(i) => i,
        Err(e) => {
            error(e);
            return ExitCode::FAILURE;
        }
    };

    println!("entry point: 0x{:08X}", image.entry);
    println!("text: {} bytes", image.text_len);
    println!("data: {} bytes", image.data_len);
    println!("memory image: {} bytes", image.memory.len());
    ExitCode::SUCCESS
}
