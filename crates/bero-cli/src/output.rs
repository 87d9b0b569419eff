//! Styled terminal output helpers.

use console::style;

/// Print an error line.
pub fn error(message: &str) {
    eprintln!("{} {}", style("error:").red().bold(), message);
}

/// Print a warning line.
pub fn warning(message: &str) {
    eprintln!("{} {}", style("warning:").yellow().bold(), message);
}

/// Print a status line.
pub fn status(action: &str, detail: &str) {
    println!("{} {}", style(action).cyan().bold(), detail);
}
