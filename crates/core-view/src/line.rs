use std::ops::Range;

use core_text::{ByteSpan, Utf16Span, utf8_to_utf16};
use serde::{Deserialize, Serialize};

use crate::{StyleId, ViewError};

/// One style annotation in byte coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleSpan {
    pub start: usize,
    pub len: usize,
    pub style_id: StyleId,
}

impl StyleSpan {
    pub fn span(&self) -> ByteSpan {
        ByteSpan::new(self.start, self.len)
    }
}

/// One display row as supplied by the engine. Offsets are UTF-8 bytes into `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineWire", into = "LineWire")]
pub struct Line {
    pub text: String,
    pub cursor: Option<usize>,
    /// Half-open; never empty.
    pub selection: Option<Range<usize>>,
    /// In render order.
    pub styles: Vec<StyleSpan>,
    placeholder: bool,
}

impl Line {
    pub fn new(
        text: impl Into<String>,
        cursor: Option<usize>,
        selection: Option<Range<usize>>,
        styles: Vec<StyleSpan>,
    ) -> Result<Self, ViewError> {
        let text = text.into();
        let len = text.len();
        if let Some(c) = cursor {
            if c > len {
                return Err(ViewError::MalformedLine(format!("cursor {c} past end {len}")));
            }
        }
        let selection = match selection {
            Some(r) if r.start > r.end || r.end > len => {
                return Err(ViewError::MalformedLine(format!(
                    "selection {}..{} outside 0..{len}",
                    r.start, r.end
                )));
            }
            Some(r) if r.is_empty() => None,
            other => other,
        };
        if let Some(bad) = styles
            .iter()
            .find(|s| s.span().checked_end().is_none_or(|end| end > len))
        {
            return Err(ViewError::MalformedLine(format!(
                "style span {}+{} past end {len}",
                bad.start, bad.len
            )));
        }
        Ok(Self {
            text,
            cursor,
            selection,
            styles,
            placeholder: false,
        })
    }

    /// Plain text line with no cursor, selection, or styles.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cursor: None,
            selection: None,
            styles: Vec::new(),
            placeholder: false,
        }
    }

    /// Paint-only stand-in while the real line is being fetched.
    pub fn placeholder() -> Self {
        Self {
            placeholder: true,
            ..Self::plain("")
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn cursor_utf16(&self) -> Option<usize> {
        self.cursor.map(|c| utf8_to_utf16(&self.text, c))
    }

    pub fn selection_utf16(&self) -> Option<Range<usize>> {
        self.selection
            .as_ref()
            .map(|r| utf8_to_utf16(&self.text, r.start)..utf8_to_utf16(&self.text, r.end))
    }

    /// Style spans in the host toolkit's UTF-16 coordinates.
    pub fn styles_utf16(&self) -> impl Iterator<Item = (Utf16Span, StyleId)> + '_ {
        self.styles
            .iter()
            .map(|s| (s.span().to_utf16(&self.text), s.style_id))
    }
}

/// Wire shape: styles are flat `(start, len, id)` triplets, a negative cursor means none.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LineWire {
    text: String,
    #[serde(default)]
    cursor: Option<i64>,
    #[serde(default)]
    selection: Option<(usize, usize)>,
    #[serde(default)]
    styles: Vec<u64>,
}

impl TryFrom<LineWire> for Line {
    type Error = ViewError;

    fn try_from(wire: LineWire) -> Result<Self, Self::Error> {
        if wire.styles.len() % 3 != 0 {
            return Err(ViewError::MalformedLine(format!(
                "{} style values is not a sequence of triplets",
                wire.styles.len()
            )));
        }
        let styles = wire
            .styles
            .chunks_exact(3)
            .map(|t| {
                let out_of_range =
                    |what: &str, v: u64| ViewError::MalformedLine(format!("style {what} {v} out of range"));
                let style_id = StyleId::try_from(t[2]).map_err(|_| out_of_range("id", t[2]))?;
                Ok(StyleSpan {
                    start: usize::try_from(t[0]).map_err(|_| out_of_range("start", t[0]))?,
                    len: usize::try_from(t[1]).map_err(|_| out_of_range("length", t[1]))?,
                    style_id,
                })
            })
            .collect::<Result<Vec<_>, ViewError>>()?;
        let cursor = wire.cursor.and_then(|c| usize::try_from(c).ok());
        let selection = wire.selection.map(|(start, end)| start..end);
        Line::new(wire.text, cursor, selection, styles)
    }
}

impl From<Line> for LineWire {
    fn from(line: Line) -> Self {
        LineWire {
            text: line.text,
            cursor: line.cursor.map(|c| c as i64),
            selection: line.selection.map(|r| (r.start, r.end)),
            styles: line
                .styles
                .iter()
                .flat_map(|s| [s.start as u64, s.len as u64, u64::from(s.style_id)])
                .collect(),
        }
    }
}
