// 🧹 Normalizer - Canonical comparison keys for raw facility fields
//
// Every relationship in the network is an exact match on a normalized key:
// lower-case, ASCII alphanumerics only. Garbage in yields a short or empty
// key, which the grouper's length thresholds then throw away.

/// Normalize a raw field into a comparison key.
///
/// Lower-cases, keeps only `[a-z0-9]`. `None` yields an empty string.
/// Never fails.
pub fn normalize(raw: Option<&str>) -> String {
    match raw {
        Some(value) => normalize_str(value),
        None => String::new(),
    }
}

/// Same as [`normalize`] for a value that is known to be present.
pub fn normalize_str(raw: &str) -> String {
    raw.chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Count the ASCII digits of a field or key.
///
/// Phone keys are judged by this count, not by their length: a placeholder
/// such as "Not Available" normalizes to a long key with no digits at all.
pub fn digit_count(value: &str) -> usize {
    value.chars().filter(|c| c.is_ascii_digit()).count()
}

// ============================================================================
// TESTS
// ============================================================================
