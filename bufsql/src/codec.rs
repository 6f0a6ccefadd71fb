//! Buffer line encoding.
//!
//! A line is a `;`-separated list of `key:value` pairs:
//!
//! ```text
//! state:on; machine : press-4 ;temp:21.5
//! ```
//!
//! Whitespace around keys and values is insignificant and empty pairs
//! (`;;`) are skipped. Only the first `:` of a pair splits it, so values may
//! contain colons (`date:2020-01-01 00:00:00`).

use thiserror::Error;

use crate::record::Record;

pub const PAIR_SEPARATOR: char = ';';
pub const KEY_VALUE_SEPARATOR: char = ':';

/// Why a line could not be decoded. Only used for diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("pair '{token}' has no ':' separator")]
    MissingSeparator { token: String },

    #[error("pair '{token}' has an empty key or value")]
    EmptyPart { token: String },

    #[error("line is not valid UTF-8 after byte {valid_up_to}")]
    InvalidUtf8 { valid_up_to: usize },
}

/// Line codec for the buffer file.
pub struct LineCodec;

impl LineCodec {
    /// Decode one raw line. Any bad pair fails the whole line.
    pub fn decode(line: &str) -> Result<Record, DecodeError> {
        let mut record = Record::new();
        for token in line.split(PAIR_SEPARATOR) {
            if token.trim().is_empty() {
                continue;
            }
            let (key, value) = Self::decode_pair(token)?;
            record.insert(key, value);
        }
        Ok(record)
    }

    /// Decode a raw buffer line, rejecting bytes that are not UTF-8.
    pub fn decode_bytes(line: &[u8]) -> Result<Record, DecodeError> {
        let text = std::str::from_utf8(line).map_err(|e| DecodeError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        Self::decode(text)
    }

    fn decode_pair(token: &str) -> Result<(&str, &str), DecodeError> {
        let (key, value) = token
            .split_once(KEY_VALUE_SEPARATOR)
            .ok_or_else(|| DecodeError::MissingSeparator {
                token: token.trim().to_string(),
            })?;

        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(DecodeError::EmptyPart {
                token: token.trim().to_string(),
            });
        }
        Ok((key, value))
    }

    /// Encode a record the way a producer writes it, without the newline.
    pub fn encode(record: &Record) -> String {
        let separator = PAIR_SEPARATOR.to_string();
        record
            .iter()
            .map(|(k, v)| format!("{k}{KEY_VALUE_SEPARATOR}{v}"))
            .collect::<Vec<_>>()
            .join(separator.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trims_and_skips_empty_pairs() {
        let record = LineCodec::decode(" state : on ;; machine:press-4 ;\r").unwrap();
        let pairs: Vec<_> = record.iter().collect();
        assert_eq!(pairs, vec![("state", "on"), ("machine", "press-4")]);
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let record = LineCodec::decode("date:2020-01-01 00:00:00").unwrap();
        assert_eq!(record.get("date"), Some("2020-01-01 00:00:00"));
    }

    #[test]
    fn test_missing_colon_fails_whole_line() {
        let err = LineCodec::decode("foo;bar:baz").unwrap_err();
        assert_eq!(err, DecodeError::MissingSeparator { token: "foo".into() });
    }

    #[test]
    fn test_empty_key_or_value_fails() {
        assert!(matches!(
            LineCodec::decode("state:on;temp:"),
            Err(DecodeError::EmptyPart { .. })
        ));
        assert!(matches!(
            LineCodec::decode(" : 5"),
            Err(DecodeError::EmptyPart { .. })
        ));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let record = LineCodec::decode("state:on;state:off").unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("state"), Some("off"));
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        assert_eq!(
            LineCodec::decode_bytes(b"bad\xffline"),
            Err(DecodeError::InvalidUtf8 { valid_up_to: 3 })
        );
        assert!(LineCodec::decode_bytes("state:grün".as_bytes()).is_ok());
    }

    #[test]
    fn test_encode_matches_decode() {
        let line = "state:on;date:2020-01-01 00:00:00";
        let record = LineCodec::decode(line).unwrap();
        assert_eq!(LineCodec::encode(&record), line);
    }
}
