// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize document name (cyan)
pub fn colorize_source(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize page/chunk location (yellow)
pub fn colorize_location(page: u32, chunk_id: u32, use_color: bool) -> String {
    let location = format!("p{page}#{chunk_id}");
    if use_color {
        location.yellow().to_string()
    } else {
        location
    }
}

/// Colorize similarity score (green)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let score = format!("{score:.3}");
    if use_color {
        score.green().to_string()
    } else {
        score
    }
}

/// Colorize secondary text (dimmed)
pub fn colorize_dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize headings (bold)
pub fn colorize_heading(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shortens `text` to `max_chars` characters, appending an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_output_without_color() {
        assert_eq!(colorize_location(3, 2, false), "p3#2");
        assert_eq!(colorize_score(0.70711, false), "0.707");
        assert_eq!(colorize_source("doc.pdf", false), "doc.pdf");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
