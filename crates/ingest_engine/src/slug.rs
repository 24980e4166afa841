use unicode_normalization::UnicodeNormalization;

/// Derive a stable, URL-safe identifier from a title or URL segment.
///
/// NFKD-fold, drop anything outside ASCII, lowercase, collapse whitespace
/// and hyphen runs into single hyphens, strip leading/trailing hyphens.
/// Idempotent: `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(input: &str) -> String {
    let folded: String = input.nfkd().filter(char::is_ascii).collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_hyphen = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            pending_hyphen = false;
        } else if c.is_ascii_whitespace() || c == '-' {
            pending_hyphen = true;
        }
        // Remaining punctuation is dropped without acting as a separator.
    }
    out
}

/// Slug for a work, taken from the last path segment of its listing URL.
pub fn slug_from_url(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or(path);
    let segment = segment.strip_suffix(".html").unwrap_or(segment);
    slugify(segment)
}
