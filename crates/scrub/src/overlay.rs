use foundation::{FrameIndex, FrameRange};
use streaming::Annotation;

/// An annotation as drawn over the visible strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpan {
    pub id: u64,
    pub state: String,
    pub pending: bool,
    /// The part of the annotation inside the visible range.
    pub span: FrameRange,
    pub full: FrameRange,
}

/// A fetch the caller should issue, identified by a ticket so stale replies can be dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OverlayFetch {
    pub range: FrameRange,
    ticket: u64,
}

/// Keeps the annotations for a padded range around the visible frames.
///
/// Fetches are planned here and performed by the caller; at most one is
/// outstanding. The records themselves are owned by the annotation service.
#[derive(Debug)]
pub struct AnnotationOverlayResolver {
    total_frames: u32,
    padding: u32,
    covered: Option<FrameRange>,
    records: Vec<Annotation>,
    pending: Option<OverlayFetch>,
    next_ticket: u64,
    revision: u64,
}

impl AnnotationOverlayResolver {
    pub fn new(total_frames: u32, padding: u32) -> Self {
        Self {
            total_frames,
            padding,
            covered: None,
            records: Vec::new(),
            pending: None,
            next_ticket: 0,
            revision: 0,
        }
    }

    /// Bumped whenever the cached records change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn covered(&self) -> Option<FrameRange> {
        self.covered
    }

    /// Returns the range to fetch if `visible` is not already covered and no
    /// fetch is outstanding.
    pub fn plan_fetch(&mut self, visible: FrameRange) -> Option<OverlayFetch> {
        if self.pending.is_some() || self.total_frames == 0 {
            return None;
        }
        if self.covered.is_some_and(|covered| covered.covers(&visible)) {
            return None;
        }
        let last: FrameIndex = self.total_frames - 1;
        let range = FrameRange::new(
            visible.start.saturating_sub(self.padding).min(last),
            visible.end.saturating_add(self.padding).min(last),
        );
        self.next_ticket += 1;
        let fetch = OverlayFetch {
            range,
            ticket: self.next_ticket,
        };
        self.pending = Some(fetch);
        Some(fetch)
    }

    /// Installs the reply to `fetch`. Replies to superseded fetches are ignored.
    pub fn apply(&mut self, fetch: OverlayFetch, records: Vec<Annotation>) -> bool {
        if self.pending != Some(fetch) {
            return false;
        }
        self.pending = None;
        self.covered = Some(fetch.range);
        self.records = records;
        self.revision += 1;
        true
    }

    pub fn fail(&mut self, fetch: OverlayFetch) {
        if self.pending == Some(fetch) {
            self.pending = None;
        }
    }

    /// Forces a refetch on the next plan; current records stay visible until then.
    pub fn invalidate(&mut self) {
        self.covered = None;
        self.pending = None;
    }

    /// Annotations overlapping `visible`, clipped to it, ordered by start then id.
    pub fn overlay(&self, visible: FrameRange) -> Vec<OverlaySpan> {
        let mut spans: Vec<OverlaySpan> = self
            .records
            .iter()
            .filter_map(|a| {
                let full = a.range();
                full.intersect(&visible).map(|span| OverlaySpan {
                    id: a.id,
                    state: a.state.clone(),
                    pending: a.pending,
                    span,
                    full,
                })
            })
            .collect();
        spans.sort_by_key(|s| (s.span.start, s.id));
        spans
    }
}
