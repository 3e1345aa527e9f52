use ahash::AHashMap;
use core_text::ByteSpan;
use serde::{Deserialize, Serialize};

use crate::{Line, ViewError};

pub type StyleId = u32;

/// Style attributes. Colors are packed ARGB (`0xAARRGGBB`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub foreground: u32,
    pub background: u32,
    pub italic: bool,
    pub bold: bool,
    pub underline: bool,
}

impl Style {
    /// (a, r, g, b)
    pub fn foreground_argb(&self) -> (u8, u8, u8, u8) {
        split_argb(self.foreground)
    }

    pub fn background_argb(&self) -> (u8, u8, u8, u8) {
        split_argb(self.background)
    }

    /// Layer `over` on top of `self`: colors from `over` win when set, attributes accumulate.
    pub fn merged(&self, over: &Style) -> Style {
        Style {
            foreground: if over.foreground != 0 { over.foreground } else { self.foreground },
            background: if over.background != 0 { over.background } else { self.background },
            italic: self.italic || over.italic,
            bold: self.bold || over.bold,
            underline: self.underline || over.underline,
        }
    }
}

fn split_argb(color: u32) -> (u8, u8, u8, u8) {
    let [a, r, g, b] = color.to_be_bytes();
    (a, r, g, b)
}

/// A span paired with its resolved attributes, in line order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSpan {
    pub span: ByteSpan,
    pub style_id: StyleId,
    pub style: Style,
}

/// Session-scoped style id registry.
#[derive(Debug, Default)]
pub struct StyleMap {
    styles: AHashMap<StyleId, Style>,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert. Redefinition takes effect for every later lookup.
    pub fn define(&mut self, id: StyleId, style: Style) {
        if self.styles.insert(id, style).is_some() {
            tracing::trace!(target: "view.styles", id, "style_redefined");
        }
    }

    pub fn define_all(&mut self, styles: impl IntoIterator<Item = (StyleId, Style)>) {
        for (id, style) in styles {
            self.define(id, style);
        }
    }

    pub fn style(&self, id: StyleId) -> Result<&Style, ViewError> {
        self.styles.get(&id).ok_or(ViewError::UndefinedStyle(id))
    }

    pub fn contains(&self, id: StyleId) -> bool {
        self.styles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Resolve every span of `line`. Fails on the first id that was never defined.
    pub fn resolve(&self, line: &Line) -> Result<Vec<ResolvedSpan>, ViewError> {
        line.styles
            .iter()
            .map(|s| {
                Ok(ResolvedSpan {
                    span: s.span(),
                    style_id: s.style_id,
                    style: *self.style(s.style_id)?,
                })
            })
            .collect()
    }
}
