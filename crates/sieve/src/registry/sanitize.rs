//! Identifier sanitization shared by the registry and its callers.

/// Normalize a patient identifier for comparison.
///
/// Drops whitespace, control characters and zero-width/format characters
/// anywhere in the value, then lowercases. Registry rows and file tags go
/// through the same function, so a value read from either side compares
/// equal to the other whenever the two differ only by that noise.
///
/// # Example
///
/// ```
/// use sieve::registry::sanitize;
///
/// assert_eq!(sanitize(" P001\u{200B}\n"), "p001");
/// assert_eq!(sanitize(&sanitize(" P001 ")), sanitize(" P001 "));
/// ```
pub fn sanitize(id: &str) -> String {
    id.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_noise(*c))
        .collect()
}

/// Whether an identifier sanitizes to nothing.
pub fn is_blank(id: &str) -> bool {
    id.chars().all(is_noise)
}

fn is_noise(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}
