//! Phone number parsing and formatting over the `phonenumber` crate.

use phonenumber::{country, Mode};
use tracing::warn;

/// Common renderings of a parsed phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneFormats {
    /// National convention, e.g. `020 8366 1177`.
    pub national: String,
    /// International convention, e.g. `+44 20 8366 1177`.
    pub full_pretty: String,
    /// E.164, e.g. `+442083661177`.
    pub full_compact: String,
}

/// A parsed phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPhone {
    pub country_code: u16,
    pub national_number: u64,
    pub is_valid: bool,
    pub formatted: PhoneFormats,
}

/// Parse a raw phone number, optionally against a default region.
///
/// Numbers without an international prefix need `region` to resolve.
/// Empty input or a parse failure produces `None`; the failure is logged,
/// not surfaced.
pub fn parse_full(phone: &str, region: Option<country::Id>) -> Option<ParsedPhone> {
    let phone = phone.trim();
    if phone.is_empty() {
        return None;
    }

    let parsed = match phonenumber::parse(region, phone) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(phone, error = %e, "Failed to parse phone number");
            return None;
        }
    };

    Some(ParsedPhone {
        country_code: parsed.country().code(),
        national_number: parsed.national().value(),
        is_valid: phonenumber::is_valid(&parsed),
        formatted: PhoneFormats {
            national: parsed.format().mode(Mode::National).to_string(),
            full_pretty: parsed.format().mode(Mode::International).to_string(),
            full_compact: parsed.format().mode(Mode::E164).to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_international_number() {
        let parsed = parse_full("+44 20 8366 1177", None).unwrap();
        assert_eq!(parsed.country_code, 44);
        assert_eq!(parsed.national_number, 2083661177);
        assert!(parsed.is_valid);
        assert_eq!(parsed.formatted.full_compact, "+442083661177");
    }

    #[test]
    fn test_parse_national_number_with_region() {
        let parsed = parse_full("020 8366 1177", Some(country::Id::GB)).unwrap();
        assert_eq!(parsed.country_code, 44);
        assert_eq!(parsed.formatted.full_compact, "+442083661177");
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(parse_full("", None), None);
        assert_eq!(parse_full("   ", None), None);
    }

    #[test]
    fn test_unparseable_input_is_none() {
        assert_eq!(parse_full("not a phone", None), None);
    }
}
