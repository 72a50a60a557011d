//! Download filename derivation.
//!
//! Titles arrive as arbitrary user text; the attachment name written into the
//! `Content-Disposition` header may only contain `[A-Za-z0-9_.-]`. Every other
//! character, multi-byte ones included, becomes a single underscore.

/// Derive a safe attachment stem from an optional title.
///
/// Absent or blank titles fall back to `default_name`, which is sanitized the
/// same way so a misconfigured default can never break the header.
pub fn derive_filename(title: Option<&str>, default_name: &str) -> String {
    let source = match title {
        Some(title) if !title.trim().is_empty() => title,
        _ => default_name,
    };
    sanitize(source)
}

/// Replace every character outside the allowed set with `_`.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|ch| if is_allowed(ch) { ch } else { '_' })
        .collect()
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}
