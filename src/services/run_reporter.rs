//! Per-cycle operator summary.
//!
//! One notification per cluster per cycle, never one per action.

use std::fmt::Write as _;

use crate::domain::models::{Command, Notification, NotificationSeverity};
use crate::services::command_dispatcher::DispatchOutcome;

/// Lines listed per section before the rest is summarized as a count.
const MAX_LISTED: usize = 10;

/// Summarize a cycle's dispatch outcomes and exhausted commands.
///
/// Returns `None` when nothing was attempted and nothing is exhausted.
pub fn report(cluster_id: &str, outcomes: &[DispatchOutcome], exhausted: &[Command]) -> Option<Notification> {
    if outcomes.is_empty() && exhausted.is_empty() {
        return None;
    }

    let (succeeded, failed): (Vec<&DispatchOutcome>, Vec<&DispatchOutcome>) =
        outcomes.iter().partition(|o| o.succeeded());

    let severity = if !exhausted.is_empty() {
        NotificationSeverity::Critical
    } else if !failed.is_empty() {
        NotificationSeverity::Warning
    } else {
        NotificationSeverity::Info
    };

    let mut title = format!(
        "Auto-heal on {}: {} succeeded, {} failed",
        cluster_id,
        succeeded.len(),
        failed.len()
    );
    if !exhausted.is_empty() {
        let _ = write!(title, ", {} exhausted", exhausted.len());
    }

    let mut message = String::new();
    if !succeeded.is_empty() {
        message.push_str("Dispatched:\n");
        push_lines(&mut message, succeeded.iter().map(|o| {
            let reused = if o.reused { " (already queued)" } else { "" };
            format!("{} on {}{}", o.action_type, o.target, reused)
        }));
    }
    if !failed.is_empty() {
        message.push_str("Failed:\n");
        push_lines(&mut message, failed.iter().map(|o| {
            format!(
                "{} on {}: {}",
                o.action_type,
                o.target,
                o.error.as_deref().unwrap_or("unknown error")
            )
        }));
    }
    if !exhausted.is_empty() {
        message.push_str("Retries exhausted, operator action required:\n");
        push_lines(&mut message, exhausted.iter().map(|c| {
            format!(
                "{} on {} after {} retries: {}",
                c.action_type,
                c.target_label(),
                c.retry_count,
                c.error_message.as_deref().unwrap_or("no error reported")
            )
        }));
    }

    Some(Notification::new(cluster_id, title, message.trim_end(), severity))
}

fn push_lines(message: &mut String, lines: impl ExactSizeIterator<Item = String>) {
    let total = lines.len();
    for line in lines.take(MAX_LISTED) {
        let _ = writeln!(message, "  - {}", line);
    }
    if total > MAX_LISTED {
        let _ = writeln!(message, "  ... and {} more", total - MAX_LISTED);
    }
}
