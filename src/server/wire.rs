use std::{fmt, str::FromStr};

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Largest number a client may send.
pub const MAX_NUMBER: u32 = 999_999_999;
/// Every number travels as exactly this many ASCII digits, zero-padded.
pub const NUMBER_WIDTH: usize = 9;
/// The command that shuts the whole server down.
pub const TERMINATE: &str = "terminate";

// a valid line plus an optional carriage return
const MAX_LINE_LENGTH: usize = NUMBER_WIDTH + 1;

/// A number in `0..=999_999_999`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(u32);

impl Number {
    /// Returns `None` if `value` is outside the number domain.
    pub fn new(value: u32) -> Option<Self> {
        (value <= MAX_NUMBER).then_some(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Position of this number inside a dense, domain-sized table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = NUMBER_WIDTH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected 9 characters, got {0}")]
    Length(usize),
    #[error("line contains a non-digit character")]
    NotNumeric,
}

impl FromStr for Number {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NUMBER_WIDTH {
            return Err(ParseError::Length(s.len()));
        }
        // parse() would let a leading '+' through
        s.bytes().try_fold(0u32, |acc, b| {
            if b.is_ascii_digit() {
                Ok(acc * 10 + u32::from(b - b'0'))
            } else {
                Err(ParseError::NotNumeric)
            }
        })
        .map(Self)
    }
}

/// A decoded client line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// Stop the server
    Terminate,
    /// A number to deduplicate
    Number(Number),
}

impl FromStr for Line {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == TERMINATE {
            Ok(Self::Terminate)
        } else {
            s.parse().map(Self::Number)
        }
    }
}

/// Splits a connection's byte stream into newline-terminated lines.
///
/// Lines are capped at a handful of bytes, so a client that never sends a
/// newline can't make us buffer without bound. A trailing partial line at
/// end-of-stream is dropped: only complete lines count.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        self.0.decode(buf)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        let line = self.0.decode(buf)?;
        if line.is_none() {
            buf.clear();
            *self = Self::new();
        }
        Ok(line)
    }
}
