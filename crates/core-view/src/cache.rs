//! Line cache keyed by document line index.
//!
//! The cache is mutated only from the session's confinement context. Fetch
//! bookkeeping lives here so at most one request per line is in flight, and so
//! a reply that raced with an invalidation of its line is never stored.

use std::collections::{BTreeMap, BTreeSet};

use core_text::Size;

use crate::Line;

/// Half-open range of line indices. `end == None` extends to the end of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line + 1)
    }

    pub fn to_end(start: usize) -> Self {
        Self { start, end: None }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end <= self.start)
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && self.end.is_none_or(|end| line < end)
    }
}

/// What happened to a fetched line on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Stored,
    /// The line was invalidated while the fetch was in flight; the reply was discarded.
    Stale,
    /// No fetch was outstanding for this line (duplicate or late reply); stored anyway.
    Unsolicited,
}

#[derive(Debug)]
pub struct LineCache {
    lines: BTreeMap<usize, Line>,
    in_flight: BTreeSet<usize>,
    stale: BTreeSet<usize>,
    total_lines: Option<usize>,
    document_size: Size,
    placeholder: Line,
}

impl Default for LineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCache {
    pub fn new() -> Self {
        Self {
            lines: BTreeMap::new(),
            in_flight: BTreeSet::new(),
            stale: BTreeSet::new(),
            total_lines: None,
            document_size: Size::default(),
            placeholder: Line::placeholder(),
        }
    }

    /// Last engine-supplied content, if cached.
    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(&index)
    }

    /// Cached line or the paint-only placeholder.
    pub fn get_or_placeholder(&self, index: usize) -> &Line {
        self.lines.get(&index).unwrap_or(&self.placeholder)
    }

    /// True when a request must be issued for `index`: not cached, not already requested, and not
    /// known to be past the end of the document.
    pub fn needs_fetch(&self, index: usize) -> bool {
        !self.lines.contains_key(&index)
            && !self.in_flight.contains(&index)
            && self.total_lines.is_none_or(|total| index < total)
    }

    pub fn is_in_flight(&self, index: usize) -> bool {
        self.in_flight.contains(&index)
    }

    /// Record that a request for `index` was sent. Returns false if one was already outstanding.
    pub fn begin_fetch(&mut self, index: usize) -> bool {
        self.in_flight.insert(index)
    }

    /// Store a reply for `index`.
    pub fn complete_fetch(&mut self, index: usize, line: Line) -> FetchOutcome {
        let was_in_flight = self.in_flight.remove(&index);
        if self.stale.remove(&index) {
            tracing::debug!(target: "view.cache", line = index, "fetch_discarded_stale");
            return FetchOutcome::Stale;
        }
        self.lines.insert(index, line);
        if was_in_flight {
            FetchOutcome::Stored
        } else {
            FetchOutcome::Unsolicited
        }
    }

    /// Forget an outstanding request without storing anything (request failed).
    pub fn abort_fetch(&mut self, index: usize) {
        self.in_flight.remove(&index);
        self.stale.remove(&index);
    }

    /// Purge every cached line in `range` and mark in-flight fetches in it stale. Returns the
    /// number of cached lines dropped.
    pub fn invalidate(&mut self, range: LineRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        let doomed: Vec<usize> = match range.end {
            Some(end) => self.lines.range(range.start..end).map(|(k, _)| *k).collect(),
            None => self.lines.range(range.start..).map(|(k, _)| *k).collect(),
        };
        for k in &doomed {
            self.lines.remove(k);
        }
        let racing: Vec<usize> = self
            .in_flight
            .iter()
            .copied()
            .filter(|i| range.contains(*i))
            .collect();
        self.stale.extend(racing.iter().copied());
        tracing::debug!(
            target: "view.cache",
            start = range.start,
            end = ?range.end,
            dropped = doomed.len(),
            racing = racing.len(),
            "lines_invalidated"
        );
        doomed.len()
    }

    /// Drop everything (engine restarted, document replaced).
    pub fn clear(&mut self) {
        self.lines.clear();
        self.stale.extend(self.in_flight.iter().copied());
    }

    pub fn total_lines(&self) -> Option<usize> {
        self.total_lines
    }

    /// New authoritative line count. Lines past the end are purged.
    pub fn set_total_lines(&mut self, total: usize) {
        if self.total_lines != Some(total) {
            self.invalidate(LineRange::to_end(total));
        }
        self.total_lines = Some(total);
    }

    pub fn document_size(&self) -> Size {
        self.document_size
    }

    pub fn set_document_size(&mut self, size: Size) {
        self.document_size = size;
    }

    pub fn cached_len(&self) -> usize {
        self.lines.len()
    }

    /// Indices of lines whose requests are outstanding.
    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.in_flight.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> LineCache {
        let mut cache = LineCache::new();
        for i in 0..n {
            cache.begin_fetch(i);
            cache.complete_fetch(i, Line::plain(format!("line {i}")));
        }
        cache
    }

    #[test]
    fn range_forms() {
        assert!(LineRange::new(3, 3).is_empty());
        assert!(LineRange::new(4, 2).is_empty());
        assert!(LineRange::single(2).contains(2));
        assert!(!LineRange::single(2).contains(3));
        assert!(LineRange::to_end(5).contains(10_000));
    }

    #[test]
    fn invalidate_single_bounded_unbounded_and_empty() {
        let mut cache = filled(10);
        assert_eq!(cache.invalidate(LineRange::new(4, 4)), 0);
        assert_eq!(cache.invalidate(LineRange::single(1)), 1);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.invalidate(LineRange::new(2, 5)), 3);
        assert_eq!(cache.invalidate(LineRange::to_end(8)), 2);
        let left: Vec<usize> = (0..10).filter(|i| cache.get(*i).is_some()).collect();
        assert_eq!(left, vec![0, 5, 6, 7]);
    }

    #[test]
    fn miss_needs_fetch_once() {
        let mut cache = LineCache::new();
        assert!(cache.needs_fetch(0));
        assert!(cache.begin_fetch(0));
        assert!(!cache.needs_fetch(0));
        assert!(!cache.begin_fetch(0));
        assert_eq!(cache.complete_fetch(0, Line::plain("x")), FetchOutcome::Stored);
        assert!(!cache.needs_fetch(0));
    }

    #[test]
    fn reply_racing_an_invalidation_is_discarded() {
        let mut cache = LineCache::new();
        cache.begin_fetch(3);
        cache.invalidate(LineRange::new(0, 10));
        assert_eq!(cache.complete_fetch(3, Line::plain("old")), FetchOutcome::Stale);
        assert!(cache.get(3).is_none());
        assert!(cache.needs_fetch(3));
    }

    #[test]
    fn placeholder_is_never_stored() {
        let cache = LineCache::new();
        assert!(cache.get_or_placeholder(7).is_placeholder());
        assert!(cache.get(7).is_none());
        assert!(cache.needs_fetch(7));
    }

    #[test]
    fn total_lines_truncates_and_bounds_fetches() {
        let mut cache = filled(6);
        cache.set_total_lines(4);
        assert_eq!(cache.cached_len(), 4);
        assert!(!cache.needs_fetch(4));
        assert_eq!(cache.total_lines(), Some(4));
    }

    #[test]
    fn unsolicited_reply_is_stored() {
        let mut cache = LineCache::new();
        assert_eq!(cache.complete_fetch(2, Line::plain("x")), FetchOutcome::Unsolicited);
        assert_eq!(cache.get(2).map(|l| l.text.as_str()), Some("x"));
    }
}
