//! Reference-date parsing.

use chrono::{Local, NaiveDate};

use abr_common::{AbrError, Result};

/// Accepted input formats, tried in order.
const FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"];

/// Parse an optional reference date; `None` means today.
pub fn parse_reference_date(input: Option<&str>) -> Result<NaiveDate> {
    let Some(raw) = input else {
        return Ok(Local::now().date_naive());
    };

    let trimmed = raw.trim();
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(AbrError::InputFormat(format!(
        "unparseable reference date '{trimmed}', expected YYYY-MM-DD, DD/MM/YYYY or YYYYMMDD"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_reference_date(Some("2024-03-15")).unwrap(), expected);
        assert_eq!(parse_reference_date(Some("15/03/2024")).unwrap(), expected);
        assert_eq!(parse_reference_date(Some("20240315")).unwrap(), expected);
    }

    #[test]
    fn test_none_defaults_to_today() {
        assert_eq!(parse_reference_date(None).unwrap(), Local::now().date_naive());
    }

    #[test]
    fn test_rejects_garbage() {
        let err = parse_reference_date(Some("15th of March")).unwrap_err();
        assert_eq!(err.kind(), "input-format");

        let err = parse_reference_date(Some("2024-13-40")).unwrap_err();
        assert_eq!(err.kind(), "input-format");
    }
}
