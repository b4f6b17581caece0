//! Operator-facing messages
//!
//! Tailed output owns stdout, so every message here is written to stderr.

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

fn print_marked(color: Color, mark: &str, msg: &str) {
    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(color),
        Print(mark),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_marked(Color::Green, "✓ ", msg);
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    print_marked(Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    print_marked(Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    print_marked(Color::Cyan, "ℹ ", msg);
}
