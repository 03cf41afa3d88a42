use std::{collections::HashMap, ops::Range};

use crate::error::TorrentParserError;

const MAX_DEPTH: usize = 64;

pub(crate) enum Field {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<Field>),
    Dict(HashMap<String, Field>),
}

impl Field {
    pub fn field_type(&self) -> String {
        match self {
            Field::String(_) => "String".to_string(),
            Field::Integer(_) => "Integer".to_string(),
            Field::List(_) => "List".to_string(),
            Field::Dict(_) => "Dict".to_string(),
        }
    }
}

/// Reads bencoded fields out of a byte buffer.
///
/// While reading the root dictionary the reader remembers the exact byte
/// range of its `info` value, so the info hash can be taken over the bytes
/// as they were written rather than over a re-encoding.
pub(crate) struct FieldReader<'a> {
    buffer: &'a [u8],
    pos: usize,
    info_span: Option<Range<usize>>,
}

impl<'a> FieldReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        FieldReader {
            buffer,
            pos: 0,
            info_span: None,
        }
    }

    pub fn next_field(&mut self) -> Result<Option<Field>, TorrentParserError> {
        if self.is_exhausted() {
            return Ok(None);
        }
        self.read_field(0).map(Some)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    /// Raw bytes of the root dictionary's `info` value, if one was read.
    pub fn info_bytes(&self) -> Option<&'a [u8]> {
        let buffer = self.buffer;
        self.info_span.clone().map(|span| &buffer[span])
    }

    fn peek(&self, what: &str) -> Result<u8, TorrentParserError> {
        self.buffer
            .get(self.pos)
            .copied()
            .ok_or_else(|| unexpected_end(what))
    }

    fn read_field(&mut self, depth: usize) -> Result<Field, TorrentParserError> {
        if depth > MAX_DEPTH {
            return Err(TorrentParserError::InvalidStructure(
                "Nesting too deep".to_string(),
            ));
        }

        match self.peek("field")? {
            b'0'..=b'9' => self.read_string().map(Field::String),
            b'i' => self.read_integer().map(Field::Integer),
            b'l' => self.read_list(depth),
            b'd' => self.read_dict(depth),
            other => Err(TorrentParserError::UnknownSpecifier(other)),
        }
    }

    // consumes everything up to and including `delimiter`
    fn read_until(&mut self, delimiter: u8, what: &str) -> Result<&'a [u8], TorrentParserError> {
        let buffer = self.buffer;
        let rest = &buffer[self.pos..];
        let end = rest
            .iter()
            .position(|&c| c == delimiter)
            .ok_or_else(|| unexpected_end(what))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn read_string(&mut self) -> Result<Vec<u8>, TorrentParserError> {
        let length = self.read_until(b':', "string length")?;
        if !length.iter().all(u8::is_ascii_digit) {
            return Err(TorrentParserError::InvalidStructure(
                "Expected colon for string".to_string(),
            ));
        }
        let length = String::from_utf8(length.to_vec())?.parse::<usize>()?;

        let buffer = self.buffer;
        let end = self
            .pos
            .checked_add(length)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                TorrentParserError::InvalidStructure(format!(
                    "Unexpected end for string, expected length {}, ending at {}",
                    length,
                    buffer.len() - self.pos
                ))
            })?;
        let field = buffer[self.pos..end].to_vec();
        self.pos = end;
        Ok(field)
    }

    fn read_integer(&mut self) -> Result<i64, TorrentParserError> {
        // skip the 'i'
        self.pos += 1;
        let digits = String::from_utf8(self.read_until(b'e', "integer")?.to_vec())?;
        if digits.starts_with("-0") || (digits.starts_with('0') && digits.len() > 1) {
            return Err(TorrentParserError::InvalidStructure(format!(
                "Leading zero in integer {}",
                digits
            )));
        }
        Ok(digits.parse::<i64>()?)
    }

    fn read_list(&mut self, depth: usize) -> Result<Field, TorrentParserError> {
        self.pos += 1;
        let mut list = Vec::new();
        while self.peek("list")? != b'e' {
            list.push(self.read_field(depth + 1)?);
        }
        self.pos += 1;
        Ok(Field::List(list))
    }

    fn read_dict(&mut self, depth: usize) -> Result<Field, TorrentParserError> {
        self.pos += 1;
        let mut dict = HashMap::new();
        while self.peek("dict")? != b'e' {
            let key = match self.read_field(depth + 1)? {
                Field::String(key) => String::from_utf8(key)?,
                other => {
                    return Err(TorrentParserError::FieldTypeError {
                        expected: "String".to_string(),
                        found: other.field_type(),
                    });
                }
            };

            let start = self.pos;
            let value = self.read_field(depth + 1)?;
            if depth == 0 && key == "info" {
                self.info_span = Some(start..self.pos);
            }
            dict.insert(key, value);
        }
        self.pos += 1;
        Ok(Field::Dict(dict))
    }
}

fn unexpected_end(what: &str) -> TorrentParserError {
    TorrentParserError::InvalidStructure(format!("Unexpected end for {}", what))
}
