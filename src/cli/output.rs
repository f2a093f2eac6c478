//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::env;

use crate::domain::models::{ActionLogStatus, CommandStatus, NotificationSeverity, SeverityLevel};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// First eight characters of an id, for tables.
pub fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

/// Bordered table with bold headers.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

/// Status cell, colored unless the terminal opts out.
pub fn status_cell(text: &str, color: Color) -> Cell {
    if supports_color() {
        Cell::new(text).fg(color)
    } else {
        Cell::new(text)
    }
}

pub fn command_status_color(status: CommandStatus) -> Color {
    match status {
        CommandStatus::Pending => Color::Yellow,
        CommandStatus::Executing => Color::Cyan,
        CommandStatus::Completed => Color::Green,
        CommandStatus::Failed => Color::Red,
    }
}

pub fn log_status_color(status: ActionLogStatus) -> Color {
    match status {
        ActionLogStatus::Pending | ActionLogStatus::Executing => Color::Yellow,
        ActionLogStatus::Completed => Color::Green,
        ActionLogStatus::Failed => Color::Red,
        ActionLogStatus::Skipped => Color::DarkGrey,
    }
}

pub fn severity_color(severity: SeverityLevel) -> Color {
    match severity {
        SeverityLevel::Low => Color::DarkGrey,
        SeverityLevel::Medium => Color::Yellow,
        SeverityLevel::High => Color::Magenta,
        SeverityLevel::Critical => Color::Red,
    }
}

pub fn notification_color(severity: NotificationSeverity) -> Color {
    match severity {
        NotificationSeverity::Info => Color::Green,
        NotificationSeverity::Warning => Color::Yellow,
        NotificationSeverity::Critical => Color::Red,
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer description", 10), "a much ...");
        assert_eq!(truncate("ääääää", 5), "ää...");
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::nil();
        assert_eq!(short_id(&id), "00000000");
    }

    #[test]
    fn test_table_renders_headers() {
        let mut t = table(&["ID", "Status"]);
        t.add_row(vec![Cell::new("abc"), Cell::new("pending")]);
        let rendered = t.to_string();
        assert!(rendered.contains("ID"));
        assert!(rendered.contains("pending"));
    }
}
