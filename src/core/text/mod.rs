//! Text preparation for speech synthesis requests.
//!
//! Raw input passes through three stages before it is wrapped in SSML:
//!
//! 1. [`replace_incompatible`] removes control characters the service rejects.
//! 2. [`escape_xml`] escapes markup-significant characters.
//! 3. [`splitter`] cuts the text into chunks that fit a single request frame.

pub mod segment;
pub mod splitter;

pub use segment::{Granularity, segment};
pub use splitter::{
    ByteBudget, MAX_SAFE_INTEGER, SmartSplit, SplitError, SplitOptions, SplitResult, Splitter,
    split_stream,
};

/// Returns `true` for control characters the synthesis service does not accept.
///
/// Tab, line feed and carriage return are kept.
fn is_incompatible(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{0008}' | '\u{000B}'..='\u{000C}' | '\u{000E}'..='\u{001F}')
}

/// Replaces every incompatible control character with a single space.
///
/// The replacement is one-for-one so byte offsets into the text are preserved.
pub fn replace_incompatible(text: &str) -> String {
    if !text.chars().any(is_incompatible) {
        return text.to_string();
    }
    text.chars()
        .map(|c| if is_incompatible(c) { ' ' } else { c })
        .collect()
}

/// Escapes `&`, `<`, `>`, `"` and `'` as XML entity references.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Byte offset of the entity reference left open at the end of `text`.
///
/// An open reference is an `&` with no `;` after it. When several are open the
/// first one wins, so the returned offset is safe to cut at.
pub(crate) fn truncated_entity_start(text: &str) -> Option<usize> {
    let tail_start = text.rfind(';').map_or(0, |i| i + 1);
    text[tail_start..].find('&').map(|i| tail_start + i)
}
