use std::collections::HashMap;

use nom::bytes::complete::{tag, take, take_till};
use nom::character::complete::digit1;
use nom::error::{ErrorKind, ParseError};
use nom::{IResult, Parser};

use crate::error::DecodeError;
use crate::BencodeType;

type ParseResult<'a, T> = IResult<&'a [u8], T, DecodeError>;

impl<'a> ParseError<&'a [u8]> for DecodeError {
    fn from_error_kind(input: &'a [u8], _kind: ErrorKind) -> Self {
        match input.first() {
            None => DecodeError::UnexpectedEof,
            Some(byte) => DecodeError::UnexpectedByte(*byte),
        }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Deepest list/dict nesting accepted before decoding is abandoned
pub const MAX_DEPTH: usize = 512;

fn fail(e: DecodeError) -> nom::Err<DecodeError> {
    nom::Err::Failure(e)
}

/// Decode a single bencoded value spanning all of `data`
///
/// Duplicate dict keys are accepted and the last value wins. Bytes left over after the
/// outermost value are an error, as is nesting lists and dicts deeper than [`MAX_DEPTH`].
pub fn decode(data: &[u8]) -> Result<BencodeType, DecodeError> {
    let (rest, value) = value(data, 0).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => DecodeError::UnexpectedEof,
    })?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingData {
            remaining: rest.len(),
        });
    }
    Ok(value)
}

fn value(input: &[u8], depth: usize) -> ParseResult<'_, BencodeType> {
    match input.first() {
        None => Err(fail(DecodeError::UnexpectedEof)),
        Some(b'i') => integer(input),
        Some(b'l' | b'd') if depth >= MAX_DEPTH => {
            Err(fail(DecodeError::NestingTooDeep { limit: MAX_DEPTH }))
        }
        Some(b'l') => list(input, depth + 1),
        Some(b'd') => dict(input, depth + 1),
        Some(b'0'..=b'9') => {
            let (input, bytes) = byte_string(input)?;
            Ok((input, BencodeType::ByteString(bytes.to_vec())))
        }
        Some(byte) => Err(fail(DecodeError::UnexpectedByte(*byte))),
    }
}

/// `i<digits>e`
fn integer(input: &[u8]) -> ParseResult<'_, BencodeType> {
    let (input, digits) = take_till::<_, _, DecodeError>(|byte: u8| byte == b'e').parse(&input[1..])?;
    if input.is_empty() {
        return Err(fail(DecodeError::InvalidInteger));
    }
    let (input, _) = tag::<_, _, DecodeError>("e")
        .parse(input)
        .map_err(|_| fail(DecodeError::InvalidInteger))?;
    let integer = parse_integer(digits).ok_or_else(|| fail(DecodeError::InvalidInteger))?;
    Ok((input, BencodeType::Integer(integer)))
}

/// Optional `-` followed by at least one digit, with no leading zeros and no `-0`
fn parse_integer(digits: &[u8]) -> Option<i64> {
    let (negative, magnitude) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };
    if magnitude.is_empty() || !magnitude.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if magnitude[0] == b'0' && (negative || magnitude.len() > 1) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// `<length>:<bytes>`
fn byte_string(input: &[u8]) -> ParseResult<'_, &[u8]> {
    let (input, (digits, _)) = (
        digit1::<&[u8], DecodeError>,
        tag::<_, &[u8], DecodeError>(":"),
    )
        .parse(input)
        .map_err(|_| fail(DecodeError::InvalidString))?;
    if digits.len() > 1 && digits[0] == b'0' {
        return Err(fail(DecodeError::InvalidString));
    }
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| fail(DecodeError::InvalidString))?;
    take::<_, &[u8], DecodeError>(len)
        .parse(input)
        .map_err(|_| fail(DecodeError::UnexpectedEof))
}

/// `l<values>e`
fn list(input: &[u8], depth: usize) -> ParseResult<'_, BencodeType> {
    let mut input = &input[1..];
    let mut items = Vec::new();
    loop {
        match input.first() {
            None => return Err(fail(DecodeError::UnexpectedEof)),
            Some(b'e') => return Ok((&input[1..], BencodeType::List(items))),
            Some(_) => {
                let (rest, item) = value(input, depth)?;
                items.push(item);
                input = rest;
            }
        }
    }
}

/// `d<key><value>...e`, keys must be byte strings
fn dict(input: &[u8], depth: usize) -> ParseResult<'_, BencodeType> {
    let mut input = &input[1..];
    let mut map = HashMap::new();
    loop {
        match input.first() {
            None => return Err(fail(DecodeError::UnexpectedEof)),
            Some(b'e') => return Ok((&input[1..], BencodeType::Dict(map))),
            Some(_) => {
                let (rest, key) = value(input, depth)?;
                let key = match key {
                    BencodeType::ByteString(key) => key,
                    _ => return Err(fail(DecodeError::DictKeyNotString)),
                };
                let (rest, item) = value(rest, depth)?;
                map.insert(key, item);
                input = rest;
            }
        }
    }
}
