//! Shared utility functions for log output.

/// Single-line preview of model output for log lines.
///
/// Collapses whitespace and cuts at `max_chars` characters (char-boundary safe).
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", cut)
}
