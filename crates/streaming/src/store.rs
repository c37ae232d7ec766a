use std::collections::HashMap;
use std::sync::Arc;

use foundation::{round_to_multiple, FrameIndex};

use crate::decode::DecodedFrame;
use crate::levels::LevelSet;

/// Shared, immutable decoded image. Dropping the last clone releases the pixels.
pub type ImageHandle = Arc<DecodedFrame>;

/// A decoded frame and the modulo level it was loaded at.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub index: FrameIndex,
    pub modulo: u32,
    pub image: ImageHandle,
}

impl FrameRecord {
    pub fn new(index: FrameIndex, modulo: u32, image: DecodedFrame) -> Self {
        Self {
            index,
            modulo,
            image: Arc::new(image),
        }
    }

    /// Smaller modulo means finer.
    pub fn is_finer_than(&self, other: &FrameRecord) -> bool {
        self.modulo < other.modulo
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Inserted,
    /// Replaced a coarser record for the same index.
    Upgraded,
    /// An equal or finer record was already present.
    Kept,
}

/// The record chosen to paint a requested frame.
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub requested: FrameIndex,
    pub record: FrameRecord,
}

impl ResolvedFrame {
    pub fn is_exact(&self) -> bool {
        self.record.index == self.requested
    }
}

/// Frame index → decoded image, one live record per index.
///
/// A record is only ever replaced by a strictly finer one. `revision` moves on
/// every change so readers can detect updates without diffing.
#[derive(Debug, Default)]
pub struct FrameStore {
    records: HashMap<FrameIndex, FrameRecord>,
    revision: u64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, index: FrameIndex) -> Option<&FrameRecord> {
        self.records.get(&index)
    }

    /// Decoded pixel bytes held by the store.
    pub fn bytes(&self) -> usize {
        self.records.values().map(|r| r.image.byte_len()).sum()
    }

    pub fn install(&mut self, record: FrameRecord) -> InstallOutcome {
        let outcome = match self.records.get(&record.index) {
            None => InstallOutcome::Inserted,
            Some(existing) if record.is_finer_than(existing) => InstallOutcome::Upgraded,
            Some(_) => return InstallOutcome::Kept,
        };
        self.records.insert(record.index, record);
        self.revision += 1;
        outcome
    }

    pub fn remove(&mut self, index: FrameIndex) -> Option<FrameRecord> {
        let removed = self.records.remove(&index);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    /// Keeps only the records for which `keep` holds. Returns how many were released.
    pub fn retain(&mut self, mut keep: impl FnMut(&FrameRecord) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| keep(record));
        let released = before - self.records.len();
        if released > 0 {
            self.revision += 1;
        }
        released
    }

    /// Drops every record. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        let released = self.records.len();
        self.records.clear();
        self.revision += 1;
        released
    }

    /// Picks the record to show for `frame`.
    ///
    /// The exact record wins. Otherwise `frame` is rounded to the nearest
    /// multiple of each level's modulo, coarsest level first; the walk stops at
    /// the first level without a record (finer levels load after coarser ones),
    /// and the finest hit so far is returned.
    pub fn resolve(&self, frame: FrameIndex, levels: &LevelSet, total_frames: u32) -> Option<ResolvedFrame> {
        if let Some(record) = self.records.get(&frame) {
            return Some(ResolvedFrame {
                requested: frame,
                record: record.clone(),
            });
        }

        let mut best = None;
        for level in levels.iter() {
            let Some(probe) = round_to_multiple(frame, level.modulo, total_frames) else {
                break;
            };
            match self.records.get(&probe) {
                Some(record) => best = Some(record),
                None => break,
            }
        }

        best.map(|record| ResolvedFrame {
            requested: frame,
            record: record.clone(),
        })
    }
}
