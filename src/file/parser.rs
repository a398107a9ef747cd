//! Cursor-based byte stream parser for classfile decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a bounds-checked cursor over a
//! byte slice. Classfile structures are read big-endian and constant pool strings use the JVM's
//! modified UTF-8 encoding.
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::advance_by`] - Move forward by specified bytes
//! - [`crate::file::parser::Parser::align`] - Align to byte boundaries (switch padding)
//! - [`crate::file::parser::Parser::pos`] - Get current position
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_be`] - Read primitive types (big-endian)
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a run of raw bytes
//! - [`crate::file::parser::Parser::read_modified_utf8`] - Decode a modified UTF-8 string
//!
//! # Usage Examples
//!
//! ```rust
//! use jvmaot::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFEBABE);
//! parser.advance_by(2)?;
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! # Ok::<(), jvmaot::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Error::OutOfBounds,
    Result,
};

/// A generic binary data parser with an internal position cursor.
///
/// The parser never reads past the end of its slice; every read either succeeds completely
/// or fails with [`crate::Error::OutOfBounds`] without moving the cursor.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the buffer is allowed, which leaves the parser exhausted.
    ///
    /// # Arguments
    /// * `pos` - The position to move the cursor to
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Arguments
    /// * `step` - Amount of bytes to advance
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(OutOfBounds),
        }
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Align the position to a specific boundary, relative to `base`.
    ///
    /// `tableswitch` and `lookupswitch` pad their operands to a 4-byte boundary measured from
    /// the start of the method's code array, which is usually not the start of the buffer.
    ///
    /// # Arguments
    /// * `base` - Offset the alignment is measured from
    /// * `alignment` - The boundary to align to (must be a power of 2)
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if aligning would exceed the data length.
    pub fn align(&mut self, base: usize, alignment: usize) -> Result<()> {
        let relative = self.position.saturating_sub(base);
        let padding = (alignment - (relative % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Peek at a big-endian value of type `T` without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `T` would exceed the data length.
    pub fn peek_be<T: ClassIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_be_at::<T>(self.data, &mut temp_position)
    }

    /// Read a type `T` from the current position in big-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..start + len])
    }

    /// Decode `len` bytes of modified UTF-8 into a `String`.
    ///
    /// Modified UTF-8 differs from standard UTF-8 in two ways: U+0000 is written as the two
    /// bytes `C0 80`, and supplementary characters are written as two 3-byte encoded UTF-16
    /// surrogates. Unpaired surrogates are replaced with U+FFFD.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain, or
    /// [`crate::Error::Malformed`] on an invalid byte sequence.
    pub fn read_modified_utf8(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
            return Ok(bytes.iter().map(|b| char::from(*b)).collect());
        }

        let mut units: Vec<u16> = Vec::with_capacity(len);
        let mut index = 0;
        while index < bytes.len() {
            let first = u16::from(bytes[index]);
            let continuation = |at: usize| -> Result<u16> {
                match bytes.get(at) {
                    Some(b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
                    _ => Err(malformed_error!("Invalid modified UTF-8 sequence at {}", at)),
                }
            };

            if first & 0x80 == 0 {
                units.push(first);
                index += 1;
            } else if first & 0xE0 == 0xC0 {
                units.push(((first & 0x1F) << 6) | continuation(index + 1)?);
                index += 2;
            } else if first & 0xF0 == 0xE0 {
                units.push(
                    ((first & 0x0F) << 12) | (continuation(index + 1)? << 6) | continuation(index + 2)?,
                );
                index += 3;
            } else {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 lead byte {:#04x} at {}",
                    first,
                    index
                ));
            }
        }

        Ok(char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x00, 0x2A, 0x00, 0x00, 0x00, 0x01];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_be::<u16>().unwrap(), 42);
        assert_eq!(parser.read_be::<u32>().unwrap(), 1);
        assert!(!parser.has_more_data());
        assert!(parser.read_be::<u8>().is_err());
    }

    #[test]
    fn test_align_relative_to_base() {
        let data = [0u8; 16];
        let mut parser = Parser::new(&data);
        parser.seek(5).unwrap();
        parser.align(2, 4).unwrap();
        assert_eq!(parser.pos(), 6);
        parser.align(2, 4).unwrap();
        assert_eq!(parser.pos(), 6);
    }

    #[test]
    fn test_modified_utf8_null_and_supplementary() {
        // "a\0" followed by U+1F600 as a surrogate pair
        let data = [
            b'a', 0xC0, 0x80, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80,
        ];
        let mut parser = Parser::new(&data);
        let text = parser.read_modified_utf8(data.len()).unwrap();
        assert_eq!(text, "a\0\u{1F600}");
    }

    #[test]
    fn test_modified_utf8_rejects_bad_lead() {
        let data = [0xF8, 0x80];
        let mut parser = Parser::new(&data);
        assert!(parser.read_modified_utf8(2).is_err());
    }

    #[test]
    fn test_read_bytes_bounds() {
        let data = [1, 2, 3];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_bytes(2).unwrap(), &[1, 2]);
        assert!(parser.read_bytes(2).is_err());
        assert_eq!(parser.pos(), 2);
    }
}
