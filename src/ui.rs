//! Terminal output for the tsclient CLI

use colored::*;
use terminal_size::{terminal_size, Height, Width};

/// Column width for `print_field` labels
const LABEL_WIDTH: usize = 16;

fn rule() -> String {
    let (Width(width), _) = terminal_size().unwrap_or((Width(80), Height(24)));
    "─".repeat(width as usize)
}

/// Banner with the command name and the identity host it talks to
pub fn print_header(title: &str, host: &str) {
    let rule = rule();
    println!("{}", rule.black().bold());
    println!(
        "  {} {}  •  {}",
        "tsclient".yellow().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).black().bold(),
        title.cyan()
    );
    println!("  {}", host.black().bold());
    println!("{}", rule.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

/// Aligned `label  value` row
pub fn print_field(label: &str, value: &str) {
    println!("  {:<width$} {}", label.bold(), value, width = LABEL_WIDTH);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "!".yellow().bold(), msg.yellow());
}

/// Errors go to stderr so `tsclient token` output stays pipeable
pub fn print_error(msg: &str) {
    eprintln!("  {} {}", "✗".red().bold(), msg.red());
}

pub fn print_waiting(msg: &str) {
    println!("  {} {}...", "…".magenta(), msg);
}

/// Show the first and last few characters of a secret
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
