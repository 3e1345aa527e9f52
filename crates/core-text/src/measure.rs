//! Text measurement for engine-side layout.
//!
//! The engine asks the front end how wide a string renders in the current
//! font. Answers are memoized per string until the font changes.

use ahash::AHashMap;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Rendered extent in measurement units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Front-end font measurement.
pub trait TextMeasure: Send {
    fn measure(&self, text: &str) -> Size;
}

impl<F> TextMeasure for F
where
    F: Fn(&str) -> Size + Send,
{
    fn measure(&self, text: &str) -> Size {
        self(text)
    }
}

/// Fixed cell grid measurement (terminal front ends, tests).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMeasure {
    pub cell_width: f64,
    pub line_height: f64,
}

impl Default for MonospaceMeasure {
    fn default() -> Self {
        Self {
            cell_width: 1.0,
            line_height: 1.0,
        }
    }
}

impl MonospaceMeasure {
    /// Column count, one grapheme cluster at a time. Clusters that unicode-width reports
    /// as zero (lone combining marks) still occupy one cell, wide clusters are capped at two.
    pub fn columns(text: &str) -> usize {
        text.graphemes(true)
            .map(|g| UnicodeWidthStr::width(g).clamp(1, 2))
            .sum()
    }
}

impl TextMeasure for MonospaceMeasure {
    fn measure(&self, text: &str) -> Size {
        Size {
            width: Self::columns(text) as f64 * self.cell_width,
            height: self.line_height,
        }
    }
}

/// Memoizing wrapper around a [`TextMeasure`].
pub struct WidthCache {
    inner: Box<dyn TextMeasure>,
    entries: AHashMap<String, Size>,
    hits: u64,
    misses: u64,
}

impl WidthCache {
    pub fn new(inner: impl TextMeasure + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            entries: AHashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn measure(&mut self, text: &str) -> Size {
        if let Some(size) = self.entries.get(text) {
            self.hits += 1;
            return *size;
        }
        self.misses += 1;
        let size = self.inner.measure(text);
        self.entries.insert(text.to_string(), size);
        size
    }

    /// Drop every memoized answer (font face or size changed).
    pub fn clear(&mut self) {
        tracing::debug!(target: "text.measure", entries = self.entries.len(), "width_cache_cleared");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl std::fmt::Debug for WidthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidthCache")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
