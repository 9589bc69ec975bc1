//! CLI command implementations.

pub mod create;
pub mod delete;
pub mod image;
pub mod info;
pub mod ip;
pub mod list;
pub mod modify;
pub mod net;
pub mod parsers;
pub mod prov;
pub mod ssh;
pub mod start;
pub mod stop;

use std::io::Write;

/// Ask a y/N question on the terminal. Anything but `y`/`yes` declines.
pub fn confirm(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    let _ = std::io::stderr().flush();

    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}

/// Truncate a string to max length, adding "..." if needed.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
