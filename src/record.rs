use crate::NumlogError;

/// Number of decimal digits in a record
pub const RECORD_DIGITS: usize = 9;

/// Line terminator written after every stored record
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Width of one slot in the record store: the digits plus the line terminator
pub const SLOT_WIDTH: usize = RECORD_DIGITS + LINE_ENDING.len();

/// Largest index a record can normalize to
pub const MAX_INDEX: u32 = 999_999_999;

/// Validate a 9-digit record and convert it to its index.
///
/// Leading zeros are stripped before parsing, so `"000000000"` is index 0.
pub fn normalize(text: &str) -> Result<u32, NumlogError> {
    if text.len() != RECORD_DIGITS || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NumlogError::InvalidRecord(text.to_string()));
    }

    let stripped = text.trim_start_matches('0');
    if stripped.is_empty() {
        return Ok(0);
    }

    stripped
        .parse::<u32>()
        .map_err(|_| NumlogError::InvalidRecord(text.to_string()))
}

/// Byte offset of the slot holding `index`
pub fn slot_offset(index: u32) -> u64 {
    index as u64 * SLOT_WIDTH as u64
}

/// Zero-padded 9-digit text for an index
pub fn format_record(index: u32) -> String {
    format!("{:0width$}", index, width = RECORD_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_all_zeros() {
        assert_eq!(normalize("000000000").unwrap(), 0);
    }

    #[test]
    fn test_normalize_strips_leading_zeros() {
        assert_eq!(normalize("000000005").unwrap(), 5);
        assert_eq!(normalize("010203040").unwrap(), 10_203_040);
        assert_eq!(normalize("123456789").unwrap(), 123_456_789);
        assert_eq!(normalize("999999999").unwrap(), MAX_INDEX);
    }

    #[test]
    fn test_normalize_rejects_wrong_length() {
        for text in ["", "12345678", "1234567890", "0"] {
            let err = normalize(text).unwrap_err();
            assert!(matches!(err, NumlogError::InvalidRecord(ref t) if t == text));
        }
    }

    #[test]
    fn test_normalize_rejects_non_digits() {
        for text in ["abc", "12345678a", "-12345678", "+12345678", " 12345678", "1234 5678", "12345678\r"] {
            assert!(normalize(text).is_err(), "{:?} should be rejected", text);
        }
    }

    #[test]
    fn test_normalize_rejects_non_ascii_digits() {
        // Arabic-Indic digits are numeric but not ASCII
        assert!(normalize("١٢٣٤٥٦٧٨٩").is_err());
        assert!(normalize("12345678٩").is_err());
    }

    #[test]
    fn test_terminate_keyword_is_not_a_record() {
        assert!(normalize("terminate").is_err());
    }

    #[test]
    fn test_slot_offset_and_format() {
        assert_eq!(slot_offset(0), 0);
        assert_eq!(slot_offset(3), 3 * SLOT_WIDTH as u64);
        assert_eq!(slot_offset(MAX_INDEX), MAX_INDEX as u64 * SLOT_WIDTH as u64);
        assert_eq!(format_record(5), "000000005");
        assert_eq!(format_record(MAX_INDEX), "999999999");
    }
}
