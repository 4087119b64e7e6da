/// Utility helpers shared by the collector, the services and the
/// storage layer.
///
/// This module contains:
/// - JSON value → key / price text conversion
/// - Timestamp normalization
/// - Address cleanup for the geocoder
/// - Local time helpers
///
/// IMPORTANT:
/// - No I/O happens here.
/// - Everything except `now_local` is deterministic and unit tested.
///
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde_json::Value;

/// Canonical timestamp layout used for records and refresh columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width product keys are padded to before persistence.
pub const PRODUCT_KEY_WIDTH: usize = 14;

/// Convert an identifier that may arrive as JSON string or number
/// into a key string.
///
/// Examples:
/// - "abc"  -> Some("abc")
/// - 4411   -> Some("4411")
/// - null   -> None
/// - ""     -> None
///
pub fn json_key(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Safe price extraction (no float noise, no scientific notation).
///
/// Strings are passed through unchanged; numbers are formatted with
/// at most `PRICE_DECIMALS` decimals and trailing zeros removed.
const PRICE_DECIMALS: usize = 6;

pub fn price_text(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Some(i.to_string());
            }
            let f = n.as_f64()?;
            let s = format!("{:.*}", PRICE_DECIMALS, f);
            Some(s.trim_end_matches('0').trim_end_matches('.').to_string())
        }
        _ => None,
    }
}

/// Normalize an upstream timestamp into `YYYY-MM-DD HH:MM:SS`.
///
/// A trailing zone indicator (`Z` or `±HH:MM`) is dropped before
/// parsing; the wall-clock value is kept as reported. Anything that
/// still fails to parse becomes `None` instead of an error.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = strip_zone(raw.trim());
    if trimmed.is_empty() {
        return None;
    }

    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    for layout in LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Some(ts.format(TIMESTAMP_FORMAT).to_string());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
}

fn strip_zone(s: &str) -> &str {
    let s = s.trim_end_matches(['Z', 'z']);

    // ±HH:MM or ±HHMM after the time part
    if let Some(pos) = s.rfind(['+', '-']) {
        let (head, tail) = s.split_at(pos);
        let digits: String = tail[1..].chars().filter(|c| *c != ':').collect();
        if head.contains(['T', ' '])
            && head.contains(':')
            && (digits.len() == 4 || digits.len() == 2)
            && digits.chars().all(|c| c.is_ascii_digit())
        {
            return head;
        }
    }
    s
}

/// Parse a timestamp stored by the gateway.
pub fn parse_stored_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Left-pad a numeric product key with zeros to the stored width.
///
/// Keys longer than the width are returned unchanged.
pub fn pad_product_key(key: &str) -> String {
    format!("{:0>width$}", key.trim(), width = PRODUCT_KEY_WIDTH)
}

/// Clean a vendor address before sending it to the geocoder.
///
/// - Upper-case
/// - Remove municipality markers, e.g. "(MUNICÍPIO 4113700)"
/// - Collapse whitespace and stray commas
/// - Append region and country when missing
///
/// Example:
///     "Rua  Maranhao, 143, Londrina (Município"
///  -> "RUA MARANHAO, 143, LONDRINA, PR, BRASIL"
///
pub fn clean_address(raw: &str, region: &str, country: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let region = region.to_uppercase();
    let country = country.to_uppercase();

    let mut e = raw
        .to_uppercase()
        .replace("(MUNICÍPIO", "")
        .replace("MUNICÍPIO", "")
        .replace("(MUNICIPIO", "")
        .replace("MUNICIPIO", "")
        .replace([')', '('], "");

    e = e.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut parts: Vec<String> = e
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let tail_has_region = parts
        .iter()
        .rev()
        .take(2)
        .any(|p| *p == region);
    if !region.is_empty() && !tail_has_region {
        parts.push(region);
    }
    if !country.is_empty() && !parts.iter().any(|p| p.contains(&country)) {
        parts.push(country);
    }

    parts.join(", ")
}

/// Current local time for the configured UTC offset (hours).
pub fn now_local(utc_offset_hours: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or(Utc.fix());
    Utc::now().with_timezone(&offset)
}

/// Whether the product list is old enough to be rebuilt.
///
/// A missing timestamp counts as due.
pub fn refresh_due(last: Option<NaiveDateTime>, today: NaiveDate, max_age_days: i64) -> bool {
    match last {
        Some(ts) => (today - ts.date()).num_days() > max_age_days,
        None => true,
    }
}
