use chrono::NaiveDateTime;
use scraper::ElementRef;

/// Date/time layout used on tender detail pages, e.g. `04-Dec-2025 10:00 AM`.
pub const PORTAL_DATE_FORMAT: &str = "%d-%b-%Y %I:%M %p";

/// Reformat a portal timestamp as `YYYY-MM-DD`.
///
/// Anything that does not parse, including empty input, becomes an empty string.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    NaiveDateTime::parse_from_str(raw, PORTAL_DATE_FORMAT)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Text content of an element with every text fragment trimmed and the pieces joined
/// without separator.
pub fn stripped_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Field name as written in a label cell: surrounding whitespace and trailing colons removed.
pub fn field_key(label: &str) -> &str {
    label.trim().trim_end_matches(':').trim_end()
}
