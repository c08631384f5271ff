/// Truncate `text` to at most `max_chars` characters, appending `ellipsis` only
/// when something was cut. Counts Unicode scalar values, so multi-byte
/// characters are never split.
pub fn truncate_title(text: &str, max_chars: usize, ellipsis: &str) -> String {
    let text = text.trim();
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ellipsis),
        None => text.to_string(),
    }
}
