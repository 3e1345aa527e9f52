//! Text helpers shared by the view model and the session.
//!
//! Engine offsets are UTF-8 byte offsets. Host toolkits usually index strings
//! in UTF-16 code units, so every consumer that hands a span to the toolkit
//! goes through [`offsets`].

pub mod measure;
pub mod offsets;

pub use measure::{MonospaceMeasure, Size, TextMeasure, WidthCache};
pub use offsets::{ByteSpan, Utf16Span, utf8_to_utf16, utf16_to_utf8};
