use colored::Colorize;
use declarative::{Diagnostic, Diagnostics, Severity};
use indicatif::{ProgressBar, ProgressStyle};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// One-line rendering of a diagnostic, without colour
pub fn diagnostic_line(diagnostic: &Diagnostic) -> String {
    let mut line = diagnostic.summary.clone();
    if let Some(attribute) = &diagnostic.attribute {
        line.push_str(&format!(" [{attribute}]"));
    }
    if !diagnostic.detail.is_empty() {
        line.push_str(&format!(": {}", diagnostic.detail));
    }
    if diagnostic.retryable {
        line.push_str(" (retryable)");
    }
    line
}

/// Print diagnostics under an address
pub fn diagnostics(address: &str, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        let line = format!("{address}: {}", diagnostic_line(diagnostic));
        match diagnostic.severity {
            Severity::Error => error(&line),
            Severity::Warning => warn(&line),
        }
    }
}

/// Progress bar over `len` lifecycle calls
pub fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=>-"));
    pb.set_style(style);
    pb
}
