//! Clean-up applied to free-text metadata before it becomes part of a record.

/// Author used when the package document names nobody.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Collapses every run of whitespace (including newlines) into a single space
/// and trims both ends.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the cleaned title, or `None` if nothing is left after clean-up.
pub(crate) fn title(raw: &str) -> Option<String> {
    Some(collapse_whitespace(raw)).filter(|title| !title.is_empty())
}

/// Normalises a creator name into "First Last" order.
///
/// Catalogue-style names ("Herbert, Frank") are flipped. Names with more than
/// one comma ("King, Martin Luther, Jr.") are left alone since there is no
/// reliable way to reorder them.
pub(crate) fn author(raw: Option<&str>) -> String {
    let name = raw.map(collapse_whitespace).unwrap_or_default();
    if name.is_empty() {
        return UNKNOWN_AUTHOR.to_string();
    }
    let mut parts = name.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(last), Some(first), None) if !last.trim().is_empty() && !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        },
        _ => name,
    }
}

/// Trims an optional field, discarding it entirely if it is blank.
pub(crate) fn optional(raw: Option<&str>) -> Option<String> {
    raw.map(collapse_whitespace).filter(|value| !value.is_empty())
}
