use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder written in place of every literal.
pub const LITERAL_PLACEHOLDER: &str = "?";

/// Literal anonymizer for captured query text.
///
/// Replaces quoted string literals (including `N'...'` and doubled `''` escapes),
/// hexadecimal literals and numeric literals with [`LITERAL_PLACEHOLDER`], so that
/// reported statements keep their shape without leaking the values they carried.
///
/// ### WARNING
/// Regex-based and therefore **best-effort**: it does not understand comments or
/// dialect-specific quoting. Digits that are part of identifiers (`table1`, `@p0`)
/// are left alone because they are not on a word boundary.
static LITERAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        N?'(?:[^']|'')*'                      # string literal
        | \b0[xX][0-9A-Fa-f]+\b               # hex literal
        | \b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b  # numeric literal
        ",
    )
    .unwrap()
});

pub fn anonymize(query_text: &str) -> String {
    LITERAL_REGEX
        .replace_all(query_text, LITERAL_PLACEHOLDER)
        .into_owned()
}

/// Anonymize an optional text field in place.
pub fn anonymize_in_place(text: &mut Option<String>) {
    if let Some(t) = text.as_mut() {
        *t = anonymize(t);
    }
}
