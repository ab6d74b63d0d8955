//! Pretty-printing messages to the console.

use colored::Colorize;

/// Pretty-print an error message to the console.
pub fn error(message: impl std::fmt::Display) {
    let title = "error:".red().bold();
    eprintln!("{title} {message}");
}

/// Pretty-print a warning message tied to a source line.
pub fn warning(message: impl std::fmt::Display, line_number: usize) {
    let title = "warning:".yellow().bold();
    eprintln!("{title} line {line_number}: {message}");
}

/// Pretty-print an informational message (linker layout reports, etc).
pub fn info(message: impl std::fmt::Display) {
    let title = "info:".cyan().bold();
    eprintln!("{title} {message}");
}

/// Pretty-print a note attached to a preceding error or warning.
pub fn note(message: impl std::fmt::Display) {
    let title = "note:".blue().bold();
    eprintln!("{title} {message}");
}
