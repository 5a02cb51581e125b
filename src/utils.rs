//! Small shared helpers.

/// Truncates a string to at most `max_chars` characters, adding "..." if
/// truncated. UTF-8 safe: counts characters, not bytes.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    // Byte length <= max_chars implies char count <= max_chars.
    if s.len() <= max_chars {
        return s.to_string();
    }
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }

    let suffix = "...";
    if max_chars <= suffix.len() {
        return suffix.chars().take(max_chars).collect();
    }
    let head: String = s.chars().take(max_chars - suffix.len()).collect();
    format!("{}{}", head, suffix)
}
