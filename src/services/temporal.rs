use chrono::{Datelike, NaiveDate};

/// Ordered parse attempts for source dates. The ISO form and the US slash
/// form are the contract; the rest show up in manually edited exports.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"];

pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    None
}

/// Renormalizes a source date to ISO-8601 when it parses, otherwise keeps
/// the raw string so the consumer can still display it.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match parse_flexible_date(trimmed) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => trimmed.to_string(),
    }
}

/// Inclusive calendar-month span between two dates: any day within a month
/// occupies that whole month, and a single-day span counts as 1. Clamped to
/// a minimum of 1 even when end < start, since a line item always occupies
/// at least its own active month.
///
/// When either date fails to parse, falls back to counting comma-separated
/// month-name tokens in the auxiliary months field, else 0.
pub fn months_spanned(start: &str, end: &str, months_field: &str) -> i64 {
    match (parse_flexible_date(start), parse_flexible_date(end)) {
        (Some(s), Some(e)) => {
            let span = (e.year() as i64 - s.year() as i64) * 12
                + (e.month() as i64 - s.month() as i64)
                + 1;
            span.max(1)
        }
        _ => months_field
            .split(',')
            .filter(|token| !token.trim().is_empty())
            .count() as i64,
    }
}
