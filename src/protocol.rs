//! Wire protocol for RespVault
//!
//! RESP-style frames, each terminated by CRLF:
//!
//! ```text
//! +OK\r\n                  simple string
//! -message\r\n             error
//! :42\r\n                  integer
//! $3\r\nfoo\r\n            bulk string ($-1\r\n is the null bulk string)
//! *2\r\n<frame><frame>     array       (*-1\r\n is the null array)
//! ```
//!
//! Parsing uses nom's streaming combinators, so a frame that has only been
//! partially received reports "need more input" rather than failing.

use crate::error::{RespVaultError, Result};
use bytes::Bytes;
use nom::{
    bytes::streaming::{tag, take, take_until},
    character::complete::i64 as signed_decimal,
    combinator::{all_consuming, map},
    error::{ContextError, ErrorKind, ParseError, VerboseError},
    sequence::terminated,
    IResult,
};

const CRLF: &[u8] = b"\r\n";

type FrameResult<'a, T> = IResult<&'a [u8], T, VerboseError<&'a [u8]>>;

/// Bounds a decoder enforces on incoming frames
///
/// A server reading requests from untrusted peers uses [`FrameLimits::REQUEST`].
/// A client reading replies uses [`FrameLimits::REPLY`], which lifts the line
/// cap because status replies may echo a whole stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Longest header or simple line accepted without a CRLF terminator
    pub max_line_len: usize,
    pub max_bulk_len: usize,
    pub max_array_len: usize,
    pub max_depth: usize,
}

impl FrameLimits {
    pub const REQUEST: FrameLimits = FrameLimits {
        max_line_len: 64 * 1024,
        max_bulk_len: 512 * 1024 * 1024,
        max_array_len: 1024 * 1024,
        max_depth: 32,
    };

    pub const REPLY: FrameLimits = FrameLimits {
        max_line_len: usize::MAX,
        ..FrameLimits::REQUEST
    };
}

/// A single value on the wire
///
/// `Null` and an empty `Bulk` are different values, as are `NullArray` and an
/// empty `Array`. Decoding an encoded value gives the same value back as long
/// as it fits the decoder's [`FrameLimits`]; see [`Value::check_limits`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Value>),
    NullArray,
}

impl Value {
    /// Build a bulk string by copying `data`
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Value::Bulk(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Build a bulk string, or the null bulk string for `None`
    pub fn optional_bulk(data: Option<Bytes>) -> Self {
        data.map_or(Value::Null, Value::Bulk)
    }

    /// Serialize the value to bytes for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Append the encoded frame to `buf`
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Simple(text) => {
                buf.push(b'+');
                write_line(buf, text);
            }
            Value::Error(message) => {
                buf.push(b'-');
                write_line(buf, message);
            }
            Value::Integer(n) => buf.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Value::Bulk(data) => {
                buf.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Value::Null => buf.extend_from_slice(b"$-1\r\n"),
            Value::Array(items) => {
                buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
            Value::NullArray => buf.extend_from_slice(b"*-1\r\n"),
        }
    }

    /// Fail if a decoder bound by `limits` would reject this value
    pub fn check_limits(&self, limits: &FrameLimits) -> Result<()> {
        self.check_at(limits, 0)
    }

    fn check_at(&self, limits: &FrameLimits, depth: usize) -> Result<()> {
        let exceeded = |what: &str| -> Result<()> {
            Err(RespVaultError::Protocol(format!("{} exceeds frame limits", what)))
        };
        match self {
            Value::Simple(text) | Value::Error(text) if text.len() > limits.max_line_len => {
                exceeded("line")
            }
            Value::Bulk(data) if data.len() > limits.max_bulk_len => exceeded("bulk string"),
            Value::Array(_) if depth >= limits.max_depth => exceeded("array nesting"),
            Value::Array(items) if items.len() > limits.max_array_len => exceeded("array length"),
            Value::Array(items) => items
                .iter()
                .try_for_each(|item| item.check_at(limits, depth + 1)),
            _ => Ok(()),
        }
    }
}

/// Line text may not carry CR or LF; they would split the frame.
fn write_line(buf: &mut Vec<u8>, text: &str) {
    buf.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.extend_from_slice(CRLF);
}

/// Check whether `buf` starts with one complete, valid frame
///
/// Returns the frame's length, or `None` if more bytes are needed. A valid or
/// partial frame is scanned without allocating, and bulk payloads are skipped
/// by length, so calling this after every read stays cheap.
pub fn check_frame(buf: &[u8], limits: &FrameLimits) -> Result<Option<usize>> {
    match skip(buf, 0, limits) {
        Ok((rest, ())) => Ok(Some(buf.len() - rest.len())),
        Err(nom::Err::Incomplete(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode a frame already validated by [`check_frame`]
///
/// Bulk payloads are slices of `frame`, not copies.
pub fn decode_frame(frame: &Bytes, limits: &FrameLimits) -> Result<Value> {
    let (_, value) = build(frame, frame, 0, limits)?;
    Ok(value)
}

/// Check then decode one frame from the front of `buf`
///
/// Returns the value and the number of bytes it occupied, or `None` when
/// `buf` holds only part of a frame.
pub fn parse_frame(buf: &[u8], limits: &FrameLimits) -> Result<Option<(Value, usize)>> {
    match check_frame(buf, limits)? {
        Some(len) => {
            let frame = Bytes::copy_from_slice(&buf[..len]);
            Ok(Some((decode_frame(&frame, limits)?, len)))
        }
        None => Ok(None),
    }
}

fn skip<'a>(input: &'a [u8], depth: usize, limits: &FrameLimits) -> FrameResult<'a, ()> {
    let (rest, kind) = type_byte(input)?;
    let rest = match kind {
        b'+' | b'-' => text(rest, limits)?.0,
        b':' => decimal(rest, limits, "malformed integer")?.0,
        b'$' => bulk(rest, limits)?.0,
        b'*' => {
            let (mut rest, len) = array_len(rest, depth, limits)?;
            for _ in 0..len.unwrap_or(0) {
                rest = skip(rest, depth + 1, limits)?.0;
            }
            rest
        }
        _ => return reject(input, "bad request: unknown type byte"),
    };
    Ok((rest, ()))
}

fn build<'a>(
    input: &'a [u8],
    source: &Bytes,
    depth: usize,
    limits: &FrameLimits,
) -> FrameResult<'a, Value> {
    let (rest, kind) = type_byte(input)?;
    match kind {
        b'+' => text(rest, limits).map(|(rest, s)| (rest, Value::Simple(s.to_owned()))),
        b'-' => text(rest, limits).map(|(rest, s)| (rest, Value::Error(s.to_owned()))),
        b':' => decimal(rest, limits, "malformed integer").map(|(rest, n)| (rest, Value::Integer(n))),
        b'$' => bulk(rest, limits).map(|(rest, payload)| {
            let value = match payload {
                None => Value::Null,
                Some([]) => Value::Bulk(Bytes::new()),
                Some(payload) => Value::Bulk(source.slice_ref(payload)),
            };
            (rest, value)
        }),
        b'*' => {
            let (mut rest, len) = array_len(rest, depth, limits)?;
            let Some(len) = len else {
                return Ok((rest, Value::NullArray));
            };
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                let (next, item) = build(rest, source, depth + 1, limits)?;
                items.push(item);
                rest = next;
            }
            Ok((rest, Value::Array(items)))
        }
        _ => reject(input, "bad request: unknown type byte"),
    }
}

fn type_byte(input: &[u8]) -> FrameResult<'_, u8> {
    map(take(1usize), |b: &[u8]| b[0])(input)
}

fn line<'a>(input: &'a [u8], limits: &FrameLimits) -> FrameResult<'a, &'a [u8]> {
    match terminated(take_until("\r\n"), tag("\r\n"))(input) {
        Err(nom::Err::Incomplete(_)) if input.len() > limits.max_line_len => {
            reject(input, "line too long")
        }
        other => other,
    }
}

fn text<'a>(input: &'a [u8], limits: &FrameLimits) -> FrameResult<'a, &'a str> {
    let (rest, raw) = line(input, limits)?;
    match std::str::from_utf8(raw) {
        Ok(text) => Ok((rest, text)),
        Err(_) => reject(input, "invalid UTF-8 in line"),
    }
}

fn decimal<'a>(input: &'a [u8], limits: &FrameLimits, what: &'static str) -> FrameResult<'a, i64> {
    let (rest, raw) = line(input, limits)?;
    let parsed: FrameResult<'_, i64> = all_consuming(signed_decimal)(raw);
    match parsed {
        Ok((_, n)) => Ok((rest, n)),
        Err(_) => reject(input, what),
    }
}

/// Length header shared by bulk strings and arrays; `-1` means null.
fn length<'a>(
    input: &'a [u8],
    limits: &FrameLimits,
    what: &'static str,
    max: usize,
) -> FrameResult<'a, Option<usize>> {
    let (rest, n) = decimal(input, limits, what)?;
    if n == -1 {
        return Ok((rest, None));
    }
    match usize::try_from(n) {
        Ok(n) if n <= max => Ok((rest, Some(n))),
        _ => reject(input, what),
    }
}

fn bulk<'a>(input: &'a [u8], limits: &FrameLimits) -> FrameResult<'a, Option<&'a [u8]>> {
    let (rest, len) = length(input, limits, "malformed bulk length", limits.max_bulk_len)?;
    let Some(len) = len else {
        return Ok((rest, None));
    };
    let payload: FrameResult<'a, &'a [u8]> = terminated(take(len), tag("\r\n"))(rest);
    match payload {
        Ok((rest, payload)) => Ok((rest, Some(payload))),
        Err(nom::Err::Incomplete(needed)) => Err(nom::Err::Incomplete(needed)),
        Err(_) => reject(rest, "malformed bulk payload"),
    }
}

fn array_len<'a>(
    input: &'a [u8],
    depth: usize,
    limits: &FrameLimits,
) -> FrameResult<'a, Option<usize>> {
    if depth >= limits.max_depth {
        return reject(input, "array nesting too deep");
    }
    length(input, limits, "malformed array length", limits.max_array_len)
}

fn reject<'a, T>(input: &'a [u8], what: &'static str) -> FrameResult<'a, T> {
    let err = VerboseError::from_error_kind(input, ErrorKind::Verify);
    Err(nom::Err::Failure(VerboseError::add_context(input, what, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RespVaultError;

    fn parse_complete(input: &[u8]) -> Value {
        let (value, consumed) = parse_frame(input, &FrameLimits::REQUEST).unwrap().expect("complete frame");
        assert_eq!(consumed, input.len());
        value
    }

    fn protocol_error(input: &[u8]) -> String {
        match parse_frame(input, &FrameLimits::REQUEST) {
            Err(RespVaultError::Protocol(detail)) => detail,
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_each_variant() {
        assert_eq!(Value::Simple("OK".into()).to_bytes(), b"+OK\r\n");
        assert_eq!(Value::Error("boom".into()).to_bytes(), b"-boom\r\n");
        assert_eq!(Value::Integer(-42).to_bytes(), b":-42\r\n");
        assert_eq!(Value::bulk("foo").to_bytes(), b"$3\r\nfoo\r\n");
        assert_eq!(Value::bulk("").to_bytes(), b"$0\r\n\r\n");
        assert_eq!(Value::Null.to_bytes(), b"$-1\r\n");
        assert_eq!(Value::Array(vec![]).to_bytes(), b"*0\r\n");
        assert_eq!(Value::NullArray.to_bytes(), b"*-1\r\n");
        assert_eq!(
            Value::Array(vec![Value::bulk("GET"), Value::bulk("a")]).to_bytes(),
            b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n"
        );
    }

    #[test]
    fn test_encode_strips_line_breaks_from_text() {
        assert_eq!(
            Value::Simple("two\r\nlines".into()).to_bytes(),
            b"+two  lines\r\n"
        );
    }

    #[test]
    fn test_empty_bulk_is_not_null() {
        assert_eq!(parse_complete(b"$0\r\n\r\n"), Value::Bulk(Bytes::new()));
        assert_eq!(parse_complete(b"$-1\r\n"), Value::Null);
        assert_eq!(parse_complete(b"*0\r\n"), Value::Array(vec![]));
        assert_eq!(parse_complete(b"*-1\r\n"), Value::NullArray);
    }

    #[test]
    fn test_round_trip_nested_values() {
        let value = Value::Array(vec![
            Value::bulk("MSET"),
            Value::Array(vec![Value::bulk("k"), Value::bulk("")]),
            Value::Null,
            Value::NullArray,
            Value::Array(vec![]),
            Value::Integer(-1_234_567),
            Value::Simple("status".into()),
            Value::Error("ERR bad".into()),
            Value::bulk(b"binary\r\n\x00\xff"),
        ]);
        assert_eq!(parse_complete(&value.to_bytes()), value);
    }

    #[test]
    fn test_partial_frames_need_more_input() {
        let encoded = Value::Array(vec![Value::bulk("SET"), Value::bulk("key"), Value::bulk("value")])
            .to_bytes();
        for end in 0..encoded.len() {
            assert!(
                parse_frame(&encoded[..end], &FrameLimits::REQUEST).unwrap().is_none(),
                "prefix of length {} should be incomplete",
                end
            );
        }
        assert!(parse_frame(&encoded, &FrameLimits::REQUEST).unwrap().is_some());
    }

    #[test]
    fn test_reports_consumed_length_with_trailing_data() {
        let (value, consumed) = parse_frame(b":1\r\n:2\r\n", &FrameLimits::REQUEST).unwrap().unwrap();
        assert_eq!(value, Value::Integer(1));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_unknown_type_byte() {
        assert!(protocol_error(b"?oops\r\n").contains("bad request"));
        assert!(protocol_error(b"*1\r\n!x\r\n").contains("bad request"));
    }

    #[test]
    fn test_malformed_numbers() {
        assert_eq!(protocol_error(b":12a\r\n"), "malformed integer");
        assert_eq!(protocol_error(b"$x\r\n"), "malformed bulk length");
        assert_eq!(protocol_error(b"*\r\n"), "malformed array length");
    }

    #[test]
    fn test_negative_lengths_below_null() {
        assert_eq!(protocol_error(b"$-2\r\n"), "malformed bulk length");
        assert_eq!(protocol_error(b"*-5\r\n"), "malformed array length");
    }

    #[test]
    fn test_bulk_payload_must_end_with_crlf() {
        assert_eq!(protocol_error(b"$3\r\nfooXY"), "malformed bulk payload");
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = b"*1\r\n".repeat(FrameLimits::REQUEST.max_depth + 1);
        input.extend_from_slice(b":1\r\n");
        assert_eq!(protocol_error(&input), "array nesting too deep");
    }

    #[test]
    fn test_unterminated_line_limit() {
        let mut input = vec![b'+'];
        input.extend(std::iter::repeat(b'a').take(FrameLimits::REQUEST.max_line_len + 1));
        assert_eq!(protocol_error(&input), "line too long");
    }

    #[test]
    fn test_simple_string_must_be_utf8() {
        assert_eq!(protocol_error(b"+\xff\xfe\r\n"), "invalid UTF-8 in line");
    }

    #[test]
    fn test_reply_limits_accept_long_unterminated_line() {
        let mut input = vec![b'+'];
        input.extend(std::iter::repeat(b'a').take(FrameLimits::REQUEST.max_line_len + 1));
        assert_eq!(check_frame(&input, &FrameLimits::REPLY).unwrap(), None);

        input.extend_from_slice(b"\r\n");
        assert_eq!(
            check_frame(&input, &FrameLimits::REPLY).unwrap(),
            Some(input.len())
        );
    }

    #[test]
    fn test_custom_limits_apply() {
        let tight = FrameLimits {
            max_bulk_len: 4,
            max_array_len: 2,
            ..FrameLimits::REQUEST
        };
        assert!(check_frame(b"$4\r\nabcd\r\n", &tight).unwrap().is_some());
        assert!(check_frame(b"$5\r\n", &tight).is_err());
        assert!(check_frame(b"*3\r\n", &tight).is_err());
    }

    #[test]
    fn test_check_frame_stops_at_frame_boundary() {
        let frame = Value::Array(vec![Value::bulk("SET"), Value::bulk("k"), Value::bulk("v")])
            .to_bytes();
        let mut buf = frame.clone();
        buf.extend_from_slice(b"*1\r\n");
        assert_eq!(
            check_frame(&buf, &FrameLimits::REQUEST).unwrap(),
            Some(frame.len())
        );
    }

    #[test]
    fn test_decode_slices_bulk_payloads_from_frame() {
        let frame = Bytes::from(Value::Array(vec![Value::bulk("GET"), Value::bulk("key")]).to_bytes());
        let value = decode_frame(&frame, &FrameLimits::REQUEST).unwrap();
        let Value::Array(items) = value else {
            panic!("expected array");
        };
        let Value::Bulk(key) = &items[1] else {
            panic!("expected bulk");
        };
        let frame_range = frame.as_ptr() as usize..frame.as_ptr() as usize + frame.len();
        assert!(frame_range.contains(&(key.as_ptr() as usize)));
        assert_eq!(&key[..], b"key");
    }

    #[test]
    fn test_check_limits_matches_decoder() {
        let mut deep = Value::Integer(1);
        for _ in 0..FrameLimits::REQUEST.max_depth {
            deep = Value::Array(vec![deep]);
        }
        assert!(deep.check_limits(&FrameLimits::REQUEST).is_ok());
        assert!(parse_frame(&deep.to_bytes(), &FrameLimits::REQUEST).is_ok());

        let too_deep = Value::Array(vec![deep]);
        assert!(matches!(
            too_deep.check_limits(&FrameLimits::REQUEST),
            Err(RespVaultError::Protocol(_))
        ));
        assert!(parse_frame(&too_deep.to_bytes(), &FrameLimits::REQUEST).is_err());

        let tight = FrameLimits {
            max_line_len: 3,
            max_bulk_len: 3,
            ..FrameLimits::REQUEST
        };
        assert!(Value::Simple("abcd".into()).check_limits(&tight).is_err());
        assert!(Value::bulk("abcd").check_limits(&tight).is_err());
        assert!(Value::bulk("abc").check_limits(&tight).is_ok());
    }
}
