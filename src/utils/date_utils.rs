use chrono::NaiveDate;

/// Date formats seen across broker flex exports.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parses a broker date string. Datetime values ("2023-06-01, 14:30:05" or
/// "2023-06-01 14:30:05") are reduced to their date part.
pub fn parse_broker_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let date_part = trimmed
        .split(|c| c == ' ' || c == ',')
        .next()
        .unwrap_or(trimmed);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// First calendar day of the given year.
pub fn year_start(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).expect("January 1st always exists")
}

/// Last calendar day of the given year.
pub fn year_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).expect("December 31st always exists")
}

/// Sentinel acquisition date for start-of-year fallback lots: the last day
/// of the previous year. Downstream consumers recognize it as boundary data.
pub fn soy_sentinel_date(tax_year: i32) -> NaiveDate {
    year_end(tax_year - 1)
}
