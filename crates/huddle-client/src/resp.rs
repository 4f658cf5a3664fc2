//! RESP2 codec.
//!
//! Frames a TCP byte stream into [`RespValue`]s and serializes requests.
//! Requests go out as arrays of bulk strings; replies may be any type.
//!
//! Decoding is incremental. Scalars are consumed once complete; arrays are
//! built up in the codec as their elements arrive, so a large reply split
//! over many reads is scanned once.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Longest header or simple-string line accepted, without the CRLF.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Largest bulk string accepted.
const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted.
const MAX_DEPTH: usize = 32;

/// Upper bound on capacity reserved from an array header.
const MAX_PREALLOC: usize = 1024;

const CRLF: &[u8] = b"\r\n";

/// One RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    Simple(String),
    /// `-ERR message`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$3\r\nfoo`
    Bulk(Bytes),
    /// `*2\r\n...`
    Array(Vec<RespValue>),
    /// `$-1` or `*-1`
    Null,
}

impl RespValue {
    /// Request frame: an array of bulk strings.
    pub fn command<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Array(
            args.into_iter()
                .map(|arg| Self::Bulk(Bytes::copy_from_slice(arg.as_ref().as_bytes())))
                .collect(),
        )
    }

    /// Text content of a simple or bulk string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Simple(s) => Some(s),
            Self::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

/// Codec failure. Fatal to the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Header or simple-string line too long.
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,

    /// Bulk string length out of range.
    #[error("bulk string of {0} bytes exceeds limit")]
    BulkTooLarge(i64),

    /// Arrays nested too deeply.
    #[error("arrays nested deeper than {MAX_DEPTH}")]
    TooDeep,

    /// Unknown type byte.
    #[error("unknown RESP type byte 0x{0:02x}")]
    UnknownType(u8),

    /// Malformed frame.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// Socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tokio codec for RESP2.
///
/// Holds the arrays still waiting for elements between calls.
#[derive(Debug, Default)]
pub struct RespCodec {
    open: Vec<OpenArray>,
}

#[derive(Debug)]
struct OpenArray {
    remaining: usize,
    items: Vec<RespValue>,
}

impl RespCodec {
    /// Codec with no partial frame.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        'tokens: loop {
            let Some((token, consumed)) = parse_token(src)? else {
                return Ok(None);
            };
            src.advance(consumed);

            let mut value = match token {
                Token::Value(value) => value,
                Token::ArrayHeader(len) => {
                    if self.open.len() >= MAX_DEPTH {
                        return Err(CodecError::TooDeep);
                    }
                    if len == 0 {
                        RespValue::Array(Vec::new())
                    } else {
                        let items = Vec::with_capacity(len.min(MAX_PREALLOC));
                        self.open.push(OpenArray { remaining: len, items });
                        continue;
                    }
                },
            };

            // Fold the finished value into its parents, closing every array
            // it completes
            while let Some(parent) = self.open.last_mut() {
                parent.items.push(value);
                parent.remaining -= 1;
                if parent.remaining > 0 {
                    continue 'tokens;
                }
                value = RespValue::Array(std::mem::take(&mut parent.items));
                self.open.pop();
            }
            return Ok(Some(value));
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_value(&item, dst);
        Ok(())
    }
}

/// One decoded unit: a complete scalar or the header of an array.
#[derive(Debug)]
enum Token {
    Value(RespValue),
    ArrayHeader(usize),
}

/// Parse one token at the front of `buf`. Returns it and the bytes it
/// spans, or `None` if the buffer ends first.
fn parse_token(buf: &[u8]) -> Result<Option<(Token, usize)>, CodecError> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, 1)? else {
        return Ok(None);
    };

    let value = match tag {
        b'+' => RespValue::Simple(text(line)?),
        b'-' => RespValue::Error(text(line)?),
        b':' => RespValue::Integer(integer(line)?),
        b'$' => {
            let len = integer(line)?;
            if len < 0 {
                return Ok(Some((Token::Value(RespValue::Null), next)));
            }
            let len = usize::try_from(len)
                .ok()
                .filter(|&l| l <= MAX_BULK_LENGTH)
                .ok_or(CodecError::BulkTooLarge(len))?;

            let end = next + len;
            let Some(terminator) = buf.get(end..end + CRLF.len()) else {
                return Ok(None);
            };
            if terminator != CRLF {
                return Err(CodecError::Malformed("bulk string not terminated by CRLF"));
            }
            let bulk = RespValue::Bulk(Bytes::copy_from_slice(&buf[next..end]));
            return Ok(Some((Token::Value(bulk), end + CRLF.len())));
        },
        b'*' => {
            let len = integer(line)?;
            let token = match usize::try_from(len) {
                Ok(len) => Token::ArrayHeader(len),
                Err(_) => Token::Value(RespValue::Null),
            };
            return Ok(Some((token, next)));
        },
        other => return Err(CodecError::UnknownType(other)),
    };

    Ok(Some((Token::Value(value), next)))
}

/// Line starting at `start` without its CRLF, and the position after it.
fn read_line(buf: &[u8], start: usize) -> Result<Option<(&[u8], usize)>, CodecError> {
    let rest = buf.get(start..).unwrap_or_default();
    match rest.windows(2).position(|w| w == CRLF) {
        Some(len) if len > MAX_LINE_LENGTH => Err(CodecError::LineTooLong),
        Some(len) => Ok(Some((&rest[..len], start + len + 2))),
        None if rest.len() > MAX_LINE_LENGTH => Err(CodecError::LineTooLong),
        None => Ok(None),
    }
}

fn text(line: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| CodecError::Malformed("line is not UTF-8"))
}

fn integer(line: &[u8]) -> Result<i64, CodecError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CodecError::Malformed("invalid integer"))
}

fn write_value(value: &RespValue, dst: &mut BytesMut) {
    match value {
        RespValue::Simple(s) => write_line(dst, b'+', s.as_bytes()),
        RespValue::Error(s) => write_line(dst, b'-', s.as_bytes()),
        RespValue::Integer(n) => write_line(dst, b':', n.to_string().as_bytes()),
        RespValue::Bulk(b) => {
            write_line(dst, b'$', b.len().to_string().as_bytes());
            dst.reserve(b.len() + CRLF.len());
            dst.put_slice(b);
            dst.put_slice(CRLF);
        },
        RespValue::Array(items) => {
            write_line(dst, b'*', items.len().to_string().as_bytes());
            for item in items {
                write_value(item, dst);
            }
        },
        RespValue::Null => write_line(dst, b'$', b"-1"),
    }
}

fn write_line(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.reserve(1 + body.len() + CRLF.len());
    dst.put_u8(tag);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}
