//! File and folder name sanitization.
//!
//! Every display name passes through here before a materialized path is
//! constructed from it. The rules strip path-traversal sequences, replace
//! characters that are unsafe in paths or object keys, and reject file
//! extensions that are executable on common platforms.

use crate::{Error, Result};

/// Maximum length of a sanitized name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// File extensions that are rejected outright.
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "jar", "vbs", "ps1", "sh",
];

/// Characters replaced with `_` wherever they appear in a name.
const UNSAFE_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*', '#', '%'];

/// Shared cleanup applied to both file and folder names.
fn clean(name: &str) -> String {
    let mut cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect();

    // Collapse traversal sequences left over after separator replacement.
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }

    cleaned.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Truncate to the maximum length on a character boundary.
fn truncate(name: String) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        name
    } else {
        name.chars().take(MAX_NAME_LEN).collect()
    }
}

/// Sanitize a folder display name.
///
/// # Errors
/// - Returns `InvalidArgument` if nothing safe remains after cleanup
pub fn sanitize_folder_name(name: &str) -> Result<String> {
    let cleaned = truncate(clean(name));
    if cleaned.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "Folder name '{}' is empty after sanitization",
            name
        )));
    }
    Ok(cleaned)
}

/// Sanitize a file display name.
///
/// # Errors
/// - Returns `InvalidArgument` if nothing safe remains after cleanup
/// - Returns `InvalidArgument` for blocked executable extensions
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let cleaned = truncate(clean(name));
    if cleaned.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "File name '{}' is empty after sanitization",
            name
        )));
    }

    if let Some(ext) = cleaned.rsplit('.').next() {
        let ext = ext.to_ascii_lowercase();
        if cleaned.contains('.') && BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "File extension '.{}' is not allowed",
                ext
            )));
        }
    }

    Ok(cleaned)
}
