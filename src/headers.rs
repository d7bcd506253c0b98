//! Request header lists and header block decoding.
//!
//! A stream's request headers arrive as one header block. The block is
//! decoded by a [`HeaderBlockDecoder`] into an ordered [`Headers`] list. A
//! name that occurs more than once keeps its first position and collects all
//! values separated by NUL, so conflicting values stay visible to later
//! validation instead of being overwritten.

use std::collections::HashMap;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Separator placed between multiple values of one header name.
pub const VALUE_SEPARATOR: char = '\0';

/// Ordered list of header names and values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl Headers {
    /// Create an empty header list.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Value stored for `name`, NUL-joined when the name repeated.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let &index = self.positions.get(name)?;
        self.entries.get(index).map(|(_, v)| v.as_str())
    }

    /// Add a value for `name`, joining it onto an existing entry with
    /// [`VALUE_SEPARATOR`].
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.value_mut(&name) {
            existing.push(VALUE_SEPARATOR);
            existing.push_str(&value);
        } else {
            self.push(name, value);
        }
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.value_mut(&name) {
            *existing = value;
        } else {
            self.push(name, value);
        }
    }

    fn value_mut(&mut self, name: &str) -> Option<&mut String> {
        let &index = self.positions.get(name)?;
        self.entries.get_mut(index).map(|(_, v)| v)
    }

    fn push(&mut self, name: String, value: String) {
        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
    }

    /// Iterate over name/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Errors raised while decoding a header block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderDecodeError {
    /// The block ended before a length prefix or field was complete.
    #[error("header block truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required to read the next element.
        needed: usize,
        /// Bytes left in the block.
        remaining: usize,
    },
    /// A header name was empty.
    #[error("header name is empty")]
    EmptyName,
    /// A header name or value was not valid UTF-8.
    #[error("header field is not valid UTF-8")]
    InvalidUtf8,
}

/// Headers decoded from a block plus the number of block bytes consumed.
///
/// Bytes after `consumed` belong to the request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Decoded request headers.
    pub headers: Headers,
    /// Length of the header block within the input.
    pub consumed: usize,
}

/// Decoder for the negotiated header block format.
pub trait HeaderBlockDecoder {
    /// Decode `block` into headers.
    ///
    /// # Errors
    ///
    /// Returns a [`HeaderDecodeError`] when the block is malformed.
    fn decode(&self, block: &[u8]) -> Result<DecodedBlock, HeaderDecodeError>;
}

/// Uncompressed, length-prefixed header block format.
///
/// The block is a big-endian `u32` pair count followed by that many pairs,
/// each a `u32`-prefixed name and a `u32`-prefixed value.
///
/// # Examples
///
/// ```
/// use quicframe::headers::{HeaderBlockDecoder, Headers, LengthPrefixedDecoder};
///
/// let headers: Headers = [(":method", "GET"), (":path", "/")].into_iter().collect();
/// let block = LengthPrefixedDecoder::encode(&headers);
/// let decoded = LengthPrefixedDecoder.decode(&block).expect("valid block");
/// assert_eq!(decoded.headers, headers);
/// assert_eq!(decoded.consumed, block.len());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthPrefixedDecoder;

impl LengthPrefixedDecoder {
    /// Encode `headers` into a length-prefixed block.
    #[must_use]
    pub fn encode(headers: &Headers) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(prefix_len(headers.len()));
        for (name, value) in headers.iter() {
            buf.put_u32(prefix_len(name.len()));
            buf.put_slice(name.as_bytes());
            buf.put_u32(prefix_len(value.len()));
            buf.put_slice(value.as_bytes());
        }
        buf.to_vec()
    }
}

fn prefix_len(len: usize) -> u32 { u32::try_from(len).unwrap_or(u32::MAX) }

fn read_u32(buf: &mut &[u8]) -> Result<usize, HeaderDecodeError> {
    if buf.remaining() < 4 {
        return Err(HeaderDecodeError::Truncated {
            needed: 4,
            remaining: buf.remaining(),
        });
    }
    Ok(buf.get_u32() as usize)
}

fn read_field(buf: &mut &[u8]) -> Result<String, HeaderDecodeError> {
    let len = read_u32(buf)?;
    if buf.remaining() < len {
        return Err(HeaderDecodeError::Truncated {
            needed: len,
            remaining: buf.remaining(),
        });
    }
    let (field, rest) = buf.split_at(len);
    *buf = rest;
    String::from_utf8(field.to_vec()).map_err(|_| HeaderDecodeError::InvalidUtf8)
}

impl HeaderBlockDecoder for LengthPrefixedDecoder {
    fn decode(&self, block: &[u8]) -> Result<DecodedBlock, HeaderDecodeError> {
        let mut buf = block;
        let count = read_u32(&mut buf)?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let name = read_field(&mut buf)?;
            if name.is_empty() {
                return Err(HeaderDecodeError::EmptyName);
            }
            let value = read_field(&mut buf)?;
            headers.append(name, value);
        }
        Ok(DecodedBlock {
            headers,
            consumed: block.len() - buf.remaining(),
        })
    }
}
