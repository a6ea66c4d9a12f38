//! File naming on acceptance.

/// Rewrite an accepted file name with the view and laterality of its reference.
///
/// Names follow `<a>_<b>_<view>_<laterality>[_...].<ext>`: segments 2 and 3
/// (zero-based) are replaced. Returns `None` when the stem has fewer than four
/// `_`-separated segments, in which case the caller keeps the original name.
///
/// # Example
///
/// ```
/// use sieve::curation::accepted_name;
///
/// assert_eq!(
///     accepted_name("A12_MG_XX_X_001.dcm", "MLO", "R").as_deref(),
///     Some("A12_MG_MLO_R_001.dcm")
/// );
/// assert_eq!(accepted_name("scan.dcm", "CC", "L"), None);
/// ```
pub fn accepted_name(file_name: &str, view_position: &str, laterality: &str) -> Option<String> {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    let mut segments: Vec<String> = stem.split('_').map(str::to_string).collect();
    if segments.len() < 4 {
        return None;
    }
    segments[2] = segment_safe(view_position);
    segments[3] = segment_safe(laterality);

    let stem = segments.join("_");
    Some(match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    })
}

/// Keep a tag value from adding segments or path components.
fn segment_safe(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == '_' || c.is_whitespace() {
                '-'
            } else {
                c
            }
        })
        .collect()
}
