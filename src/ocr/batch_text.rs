//! Splitting a combined batch result into per-image segments.
//!
//! Grammar: zero or more `IMAGE <digits>:` markers, each followed by that
//! image's text up to the next marker or end of input. Text before the
//! first marker is ignored.

const MARKER: &str = "IMAGE ";

/// Split `text` into one trimmed segment per marker, in marker order.
///
/// Empty segments are kept so positions stay aligned with the batch. If
/// there are no markers at all, a non-empty input becomes a single
/// segment and an empty one yields nothing.
pub fn parse_batch_text(text: &str) -> Vec<String> {
    let markers = find_markers(text);
    if markers.is_empty() {
        let whole = text.trim();
        return if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        };
    }

    markers
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start))| {
            let end = markers.get(i + 1).map(|&(start, _)| start).unwrap_or(text.len());
            text[body_start..end].trim().to_string()
        })
        .collect()
}

/// Byte ranges of every marker as (marker start, body start).
fn find_markers(text: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(rel) = text[from..].find(MARKER) {
        let start = from + rel;
        let digits_start = start + MARKER.len();
        let digits = text[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let colon = digits_start + digits;
        if digits > 0 && text.as_bytes().get(colon) == Some(&b':') {
            found.push((start, colon + 1));
            from = colon + 1;
        } else {
            from = digits_start;
        }
    }
    found
}
