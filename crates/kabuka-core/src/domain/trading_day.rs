use time::macros::format_description;
use time::Date;

use crate::ValidationError;

/// Parse an ISO `YYYY-MM-DD` calendar date.
pub fn parse_trading_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: value.to_owned(),
        }
    })
}

/// Parse a decimal cell, tolerating thousands separators (`1,234.5`).
pub fn parse_decimal(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let cleaned = value.trim().replace(',', "");
    cleaned
        .parse::<f64>()
        .map_err(|_| ValidationError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}
