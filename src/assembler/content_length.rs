//! Extraction of the declared body length from request headers.

use super::RequestError;
use crate::headers::{Headers, VALUE_SEPARATOR};

/// Name of the header declaring the request body length.
pub const CONTENT_LENGTH: &str = "content-length";

/// Parse the declared body length, if any.
///
/// The header may carry several NUL-separated values. Each must be a plain
/// decimal integer and all of them must agree.
///
/// # Errors
///
/// Returns [`RequestError::InvalidContentLength`] for a value that is not a
/// non-negative integer and [`RequestError::ConflictingContentLength`] when
/// two values differ.
///
/// # Examples
///
/// ```
/// use quicframe::{assembler::parse_content_length, headers::Headers};
///
/// let headers: Headers = [("content-length", "2\u{0}2")].into_iter().collect();
/// assert_eq!(parse_content_length(&headers), Ok(Some(2)));
/// ```
pub fn parse_content_length(headers: &Headers) -> Result<Option<u64>, RequestError> {
    let Some(raw) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };

    let mut declared = None;
    for value in raw.split(VALUE_SEPARATOR) {
        let parsed = parse_value(value)?;
        match declared {
            None => declared = Some(parsed),
            Some(first) if first != parsed => {
                return Err(RequestError::ConflictingContentLength {
                    first,
                    conflicting: parsed,
                });
            }
            Some(_) => {}
        }
    }
    Ok(declared)
}

fn parse_value(value: &str) -> Result<u64, RequestError> {
    let invalid = || RequestError::InvalidContentLength {
        value: value.to_owned(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}
