//! Shared helper functions for CLI commands

use chrono::{DateTime, Local, Utc};
use std::fmt::Display;

/// Truncate a string to `max_len` characters, adding "..." if truncated
///
/// Counts characters, not bytes, so multi-byte titles never split.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// First line of a possibly multi-line text, truncated for a table cell
pub fn first_line(s: &str, max_len: usize) -> String {
    truncate_str(s.lines().next().unwrap_or(""), max_len)
}

/// Local-time rendering used in tables
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Display an optional value, `-` when absent
pub fn or_dash<T: Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

/// Read text from an argument, or from stdin when the argument is `-`
pub fn text_arg(value: &str) -> miette::Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut buf = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
        .map_err(|e| miette::miette!("cannot read stdin: {}", e))?;
    Ok(buf.trim_end_matches('\n').to_string())
}

/// Ask before a destructive step; false when declined
pub fn confirm(prompt: &str) -> miette::Result<bool> {
    dialoguer::Confirm::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| miette::miette!("cannot prompt for confirmation ({}); pass --yes", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("one\ntwo", 20), "one");
        assert_eq!(first_line("", 20), "");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(Some(3)), "3");
        assert_eq!(or_dash(None::<String>), "-");
    }

    #[test]
    fn test_text_arg_passthrough() {
        assert_eq!(text_arg("plain").unwrap(), "plain");
    }
}
