//! Utility functions for file names and message formatting.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use unicode_segmentation::UnicodeSegmentation;

/// Characters that are not allowed in a file name on common filesystems
static RE_UNSAFE_FILENAME_CHARS: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"[\\/*?:"<>|]"#);

/// Make an API-provided file name safe to use as a single path component.
///
/// Replaces `\ / * ? : " < > |` with `_` and trims surrounding whitespace.
/// Names that would still be empty or a directory alias become `file`.
///
/// # Examples
///
/// ```
/// use terabox_courier::utils::sanitize_filename;
/// assert_eq!(sanitize_filename("a/b:c?.mp4"), "a_b_c_.mp4");
/// assert_eq!(sanitize_filename(".."), "file");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = RE_UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "_");
    match cleaned.as_ref() {
        "" | "." | ".." => "file".to_string(),
        other => other.to_string(),
    }
}

/// Splits a long message into parts that fit within Telegram's message limit.
///
/// Lines are kept whole where possible. A single line longer than
/// `max_length` is split by grapheme clusters, so multi-byte characters are
/// never cut.
///
/// # Examples
///
/// ```
/// use terabox_courier::utils::split_long_message;
/// let long_msg = "🔹 1. Someone\n🆔 123456789\n\n".repeat(300);
/// let parts = split_long_message(&long_msg, 4000);
/// assert!(parts.len() > 1);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }

    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.lines() {
        if line.len() > max_length {
            if !current.trim().is_empty() {
                parts.push(current.trim_end().to_string());
            }
            current.clear();

            for grapheme in line.graphemes(true) {
                if current.len() + grapheme.len() > max_length {
                    parts.push(current.clone());
                    current.clear();
                }
                current.push_str(grapheme);
            }
            current.push('\n');
            continue;
        }

        // +1 for newline
        if current.len() + line.len() + 1 > max_length && !current.trim().is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        parts.push(current.trim_end().to_string());
    }

    parts
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use terabox_courier::utils::truncate_str;
/// assert_eq!(truncate_str("Привет, мир!", 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}
