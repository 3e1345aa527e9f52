//! UTF-8 byte offset <-> UTF-16 code unit offset conversion.
//!
//! Offsets that fall inside a scalar value are floored to the start of that
//! scalar; offsets past the end clamp to the end of the text.

/// A span in engine coordinates (UTF-8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteSpan {
    pub start: usize,
    pub len: usize,
}

/// A span in host toolkit coordinates (UTF-16 code units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Utf16Span {
    pub start: usize,
    pub len: usize,
}

impl ByteSpan {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Saturates at `usize::MAX`; conversions clamp to the text end anyway.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    /// `None` when `start + len` overflows.
    pub fn checked_end(&self) -> Option<usize> {
        self.start.checked_add(self.len)
    }

    pub fn to_utf16(self, text: &str) -> Utf16Span {
        let start = utf8_to_utf16(text, self.start);
        let end = utf8_to_utf16(text, self.end());
        Utf16Span {
            start,
            len: end - start,
        }
    }

    /// Substring addressed by this span, if it lies on scalar boundaries.
    pub fn slice(self, text: &str) -> Option<&str> {
        text.get(self.start..self.end())
    }
}

impl Utf16Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    pub fn to_bytes(self, text: &str) -> ByteSpan {
        let start = utf16_to_utf8(text, self.start);
        let end = utf16_to_utf8(text, self.end());
        ByteSpan {
            start,
            len: end - start,
        }
    }
}

/// Convert a byte offset into `text` to a UTF-16 code unit offset.
pub fn utf8_to_utf16(text: &str, byte_offset: usize) -> usize {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        if idx + ch.len_utf8() > byte_offset {
            break;
        }
        units += ch.len_utf16();
    }
    units
}

/// Convert a UTF-16 code unit offset into `text` to a byte offset.
pub fn utf16_to_utf8(text: &str, utf16_offset: usize) -> usize {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        let next = units + ch.len_utf16();
        if next > utf16_offset {
            return idx;
        }
        units = next;
    }
    text.len()
}
