use chrono::Utc;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Renders a cell number the way the source export would have written it:
/// integral values without a trailing ".0", everything else via Display.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Currency fields carry the raw source value behind a dollar sign, with
/// no locale formatting or rounding. Absent values render as "$0.00".
pub fn currency_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "$0.00".to_string()
    } else {
        format!("${}", trimmed)
    }
}

pub fn parse_quantity(raw: &str) -> f64 {
    raw.trim().replace(',', "").parse::<f64>().unwrap_or(0.0)
}
