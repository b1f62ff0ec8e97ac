//! Terminal-number parsing and decomposition.

use std::collections::BTreeMap;

use abr_common::{AbrError, Result};

/// A terminal number decomposed into its numbering-plan lookup key.
///
/// Standard Brazilian numbers are `cn` (2-digit national code) followed
/// by a 4-digit (fixed, 10 digits total) or 5-digit (mobile, 11 digits
/// total) prefix and a 4-digit suffix. Non-standard lengths keep the -1
/// sentinel key and simply find no designation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberKey {
    pub terminal_number: i64,
    pub cn: i16,
    pub prefix: i32,
}

impl NumberKey {
    fn from_digits(digits: &str) -> Option<Self> {
        let terminal_number: i64 = digits.parse().ok()?;
        let (cn, prefix) = match digits.len() {
            10 => (digits[..2].parse().ok()?, digits[2..6].parse().ok()?),
            11 => (digits[..2].parse().ok()?, digits[2..7].parse().ok()?),
            _ => (-1, -1),
        };
        Some(Self {
            terminal_number,
            cn,
            prefix,
        })
    }
}

/// Parse and deduplicate a resolution batch.
///
/// Every entry must be a non-empty digit string; anything else fails
/// the whole call, since a partially-resolved batch is worse than a
/// rejected one. Output is sorted by terminal number.
pub fn parse_batch<S: AsRef<str>>(numbers: &[S]) -> Result<Vec<NumberKey>> {
    if numbers.is_empty() {
        return Err(AbrError::InputFormat("empty number batch".to_string()));
    }

    let mut keys: BTreeMap<i64, NumberKey> = BTreeMap::new();
    for entry in numbers {
        let trimmed = entry.as_ref().trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AbrError::InputFormat(format!(
                "'{trimmed}' is not a valid terminal number (digits only)"
            )));
        }
        let key = NumberKey::from_digits(trimmed).ok_or_else(|| {
            AbrError::InputFormat(format!("'{trimmed}' is out of range for a terminal number"))
        })?;
        keys.insert(key.terminal_number, key);
    }
    Ok(keys.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_number_decomposition() {
        let keys = parse_batch(&["11987654321"]).unwrap();
        assert_eq!(
            keys,
            vec![NumberKey {
                terminal_number: 11987654321,
                cn: 11,
                prefix: 98765,
            }]
        );
    }

    #[test]
    fn test_fixed_number_decomposition() {
        let keys = parse_batch(&["1132109876"]).unwrap();
        assert_eq!(keys[0].cn, 11);
        assert_eq!(keys[0].prefix, 3210);
    }

    #[test]
    fn test_non_standard_length_gets_sentinel_key() {
        let keys = parse_batch(&["0800123456789"]).unwrap();
        assert_eq!(keys[0].cn, -1);
        assert_eq!(keys[0].prefix, -1);
        assert_eq!(keys[0].terminal_number, 800123456789);
    }

    #[test]
    fn test_batch_deduplicates_and_sorts() {
        let keys = parse_batch(&["21912345678", "11987654321", "21912345678"]).unwrap();
        let numbers: Vec<_> = keys.iter().map(|k| k.terminal_number).collect();
        assert_eq!(numbers, vec![11987654321, 21912345678]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty: &[&str] = &[];
        let err = parse_batch(empty).unwrap_err();
        assert_eq!(err.kind(), "input-format");
    }

    #[test]
    fn test_non_digit_entry_rejects_whole_batch() {
        let err = parse_batch(&["11987654321", "11 9876-5432"]).unwrap_err();
        assert_eq!(err.kind(), "input-format");
    }

    #[test]
    fn test_whitespace_trimmed() {
        let keys = parse_batch(&[" 11987654321 "]).unwrap();
        assert_eq!(keys[0].terminal_number, 11987654321);
    }
}
