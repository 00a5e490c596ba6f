//! Terminal output for the command-line interface.
//!
//! Colored status lines, the run summary and the style table.

use comfy_table::{presets, Attribute, Cell, Table};
use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::harvest::HarvestSummary;
use crate::models::CitationStyle;

/// Check if stderr is a terminal (where progress bars are drawn).
pub fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// Status icons for different operations.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
    }
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
}

/// Print a styled status message.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => println!("{} {}", icon.green().bold(), msg),
        Status::Error => println!("{} {}", icon.red().bold(), msg),
        Status::Warning => println!("{} {}", icon.yellow().bold(), msg),
        Status::Info => println!("{} {}", icon.cyan().bold(), msg),
    }
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("━━━ {} ━━━", title).bold().cyan());
}

/// Truncate text to at most `max_chars` characters, ending in "...".
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }
    let truncated: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", truncated)
}

/// Print the outcome of a harvest run.
pub fn print_summary(summary: &HarvestSummary) {
    print_section("Harvest summary");

    let status = if summary.failures.is_empty() {
        Status::Success
    } else {
        Status::Warning
    };
    print_status(
        status,
        &format!("{} of {} articles extracted", summary.records, summary.links),
    );

    for failed in &summary.failures {
        print_status(
            Status::Error,
            &format!(
                "{} after {} attempts: {}",
                truncate_with_ellipsis(failed.link.as_str(), 80),
                failed.attempts,
                failed.error
            ),
        );
    }

    for file in &summary.files {
        print_status(Status::Info, &format!("wrote {}", file.display()));
    }
}

/// Table of the supported citation styles and their export tokens.
pub fn styles_table(default: CitationStyle) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(vec!["Style", "Token", ""]);

    for style in CitationStyle::ALL {
        let marker = if style == default { "default" } else { "" };
        let name = Cell::new(style.name());
        let name = if style == default {
            name.add_attribute(Attribute::Bold)
        } else {
            name
        };
        table.add_row(vec![name, Cell::new(style.token()), Cell::new(marker)]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_icon() {
        assert_eq!(status_icon(Status::Success), "✓");
        assert_eq!(status_icon(Status::Error), "✗");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("Hello", 10), "Hello");
        assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
        assert_eq!(truncate_with_ellipsis("Hello", 3), "...");
        assert_eq!(truncate_with_ellipsis("Ünïcödé text", 7), "Ünïc...");
    }

    #[test]
    fn test_styles_table_lists_every_style() {
        let rendered = styles_table(CitationStyle::Chicago).to_string();
        for style in CitationStyle::ALL {
            assert!(rendered.contains(style.token()));
        }
        assert!(rendered.contains("default"));
    }
}
