//! Code-point character streams and the UTF decoders behind them.

use crate::error::DecodeError;
use crate::stream::{DecodePolicy, SymbolStream, EOF};

const REPLACEMENT: u32 = 0xFFFD;

/// An in-memory character stream holding decoded Unicode code points.
///
/// `size()` and every index are in code points; a supplementary-plane
/// character occupies exactly one position.
#[derive(Debug, Clone)]
pub struct CodePointStream {
    code_points: Vec<u32>,
    position: usize,
    name: String,
}

impl CodePointStream {
    /// Decode from a string slice (always well-formed).
    #[must_use]
    pub fn from_str(text: &str) -> Self {
        Self {
            code_points: text.chars().map(u32::from).collect(),
            position: 0,
            name: "<string>".to_owned(),
        }
    }

    /// Decode UTF-8 bytes under `policy`.
    ///
    /// # Errors
    ///
    /// Under [`DecodePolicy::Report`], returns the first malformed
    /// sequence as a [`DecodeError`].
    pub fn from_utf8(bytes: &[u8], policy: DecodePolicy) -> Result<Self, DecodeError> {
        let mut code_points = Vec::with_capacity(bytes.len());
        let mut offset = 0;
        while offset < bytes.len() {
            match next_utf8(bytes, offset) {
                Some((cp, len)) => {
                    code_points.push(cp);
                    offset += len;
                }
                None => match policy {
                    DecodePolicy::Replace => {
                        code_points.push(REPLACEMENT);
                        offset += 1;
                    }
                    DecodePolicy::Report => {
                        return Err(DecodeError::InvalidUtf8 { offset });
                    }
                },
            }
        }
        Ok(Self {
            code_points,
            position: 0,
            name: "<utf8>".to_owned(),
        })
    }

    /// Decode UTF-16 code units under `policy`.
    ///
    /// # Errors
    ///
    /// Under [`DecodePolicy::Report`], returns the first unpaired
    /// surrogate as a [`DecodeError`].
    pub fn from_utf16(units: &[u16], policy: DecodePolicy) -> Result<Self, DecodeError> {
        let mut code_points = Vec::with_capacity(units.len());
        let mut offset = 0;
        while offset < units.len() {
            let unit = units[offset];
            if (0xD800..0xDC00).contains(&unit) {
                // high surrogate: needs a low surrogate next
                match units.get(offset + 1) {
                    Some(&low) if (0xDC00..0xE000).contains(&low) => {
                        let cp = 0x10000
                            + ((u32::from(unit) - 0xD800) << 10)
                            + (u32::from(low) - 0xDC00);
                        code_points.push(cp);
                        offset += 2;
                        continue;
                    }
                    _ => {}
                }
                match policy {
                    DecodePolicy::Replace => code_points.push(REPLACEMENT),
                    DecodePolicy::Report => {
                        return Err(DecodeError::UnpairedSurrogate { unit, offset });
                    }
                }
                offset += 1;
            } else if (0xDC00..0xE000).contains(&unit) {
                match policy {
                    DecodePolicy::Replace => code_points.push(REPLACEMENT),
                    DecodePolicy::Report => {
                        return Err(DecodeError::UnpairedSurrogate { unit, offset });
                    }
                }
                offset += 1;
            } else {
                code_points.push(u32::from(unit));
                offset += 1;
            }
        }
        Ok(Self {
            code_points,
            position: 0,
            name: "<utf16>".to_owned(),
        })
    }

    /// Validate UTF-32 values under `policy`.
    ///
    /// # Errors
    ///
    /// Under [`DecodePolicy::Report`], returns the first non-scalar value
    /// as a [`DecodeError`].
    pub fn from_utf32(values: &[u32], policy: DecodePolicy) -> Result<Self, DecodeError> {
        let mut code_points = Vec::with_capacity(values.len());
        for (offset, &value) in values.iter().enumerate() {
            if char::from_u32(value).is_some() {
                code_points.push(value);
            } else {
                match policy {
                    DecodePolicy::Replace => code_points.push(REPLACEMENT),
                    DecodePolicy::Report => {
                        return Err(DecodeError::InvalidScalar { value, offset });
                    }
                }
            }
        }
        Ok(Self {
            code_points,
            position: 0,
            name: "<utf32>".to_owned(),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The decoded code points.
    #[must_use]
    pub fn code_points(&self) -> &[u32] {
        &self.code_points
    }

    /// The text between two code-point indices, for action replay and
    /// diagnostics.
    #[must_use]
    pub fn text(&self, start: usize, end: usize) -> String {
        self.code_points[start.min(self.code_points.len())..end.min(self.code_points.len())]
            .iter()
            .map(|&cp| char::from_u32(cp).unwrap_or('\u{FFFD}'))
            .collect()
    }
}

impl SymbolStream for CodePointStream {
    fn la(&mut self, k: isize) -> i32 {
        if k == 0 {
            return EOF;
        }
        let offset = if k > 0 { k - 1 } else { k };
        let Some(index) = self.position.checked_add_signed(offset) else {
            return EOF;
        };
        self.code_points
            .get(index)
            .map_or(EOF, |&cp| cp as i32)
    }

    fn index(&self) -> usize {
        self.position
    }

    fn size(&self) -> usize {
        self.code_points.len()
    }

    fn consume(&mut self) {
        if self.position < self.code_points.len() {
            self.position += 1;
        }
    }

    fn seek(&mut self, index: usize) {
        self.position = index.min(self.code_points.len());
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Decode one UTF-8 sequence starting at `offset`, rejecting overlong
/// forms, surrogates, and out-of-range values.
fn next_utf8(bytes: &[u8], offset: usize) -> Option<(u32, usize)> {
    let first = *bytes.get(offset)?;
    let (len, init) = match first {
        0x00..=0x7F => return Some((u32::from(first), 1)),
        0xC2..=0xDF => (2, u32::from(first & 0x1F)),
        0xE0..=0xEF => (3, u32::from(first & 0x0F)),
        0xF0..=0xF4 => (4, u32::from(first & 0x07)),
        _ => return None,
    };

    let mut value = init;
    for i in 1..len {
        let byte = *bytes.get(offset + i)?;
        if byte & 0xC0 != 0x80 {
            return None;
        }
        value = (value << 6) | u32::from(byte & 0x3F);
    }

    let valid = match len {
        2 => (0x80..0x800).contains(&value),
        3 => (0x800..0x10000).contains(&value) && !(0xD800..0xE000).contains(&value),
        _ => (0x10000..=0x10FFFF).contains(&value),
    };
    valid.then_some((value, len))
}
