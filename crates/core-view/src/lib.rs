//! Front-end view model: the subset of document lines and style definitions
//! the renderer currently needs.
//!
//! Invariants:
//! * Cached lines are only ever engine-supplied. A miss is answered by going back to the engine;
//!   the placeholder line exists for painting only and is never stored.
//! * Lines are replaced wholesale, never patched in place.
//! * A fetch that was in flight when its line got invalidated is discarded on arrival.
//! * A style id must be defined before a line referencing it is resolved for rendering.

mod cache;
mod line;
mod style;

pub use cache::{FetchOutcome, LineCache, LineRange};
pub use line::{Line, StyleSpan};
pub use style::{ResolvedSpan, Style, StyleId, StyleMap};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("style {0} referenced before it was defined")]
    UndefinedStyle(StyleId),
    #[error("malformed line: {0}")]
    MalformedLine(String),
}
