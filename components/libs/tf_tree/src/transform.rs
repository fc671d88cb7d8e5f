use crate::error::{TransformError, TransformResult};
use crate::interpolation::interpolate_transforms;
use crate::FrameIdString;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use tf_clock::{TfDuration, TfTime, TfTimeRange};
use tf_spatial_payloads::RigidTransform;

/// One timestamped rigid transform of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TransformSample {
    pub stamp: TfTime,
    pub transform: RigidTransform,
}

impl TransformSample {
    pub fn new(stamp: TfTime, transform: RigidTransform) -> Self {
        Self { stamp, transform }
    }
}

/// A transform message as delivered by the ingestion side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StampedTransform {
    pub parent_frame: FrameIdString,
    pub child_frame: FrameIdString,
    pub stamp: TfTime,
    pub transform: RigidTransform,
}

impl StampedTransform {
    pub fn new(parent: &str, child: &str, stamp: TfTime, transform: RigidTransform) -> Self {
        Self {
            parent_frame: parent.into(),
            child_frame: child.into(),
            stamp,
            transform,
        }
    }

    pub fn sample(&self) -> TransformSample {
        TransformSample::new(self.stamp, self.transform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A sample with the same stamp already existed and was overwritten.
    Replaced,
    /// Older than what the buffer retains, nothing was stored.
    Dropped,
}

/// Time ordered samples of a single edge.
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    samples: VecDeque<TransformSample>,
    max_capacity: usize,
    max_storage_time: TfDuration,
    is_static: bool,
    /// Index of the sample that started the last bracketing, playback mostly moves forward.
    hint: Cell<usize>,
}

impl TransformBuffer {
    pub fn new(max_capacity: usize, max_storage_time: TfDuration) -> Self {
        Self {
            samples: VecDeque::new(),
            max_capacity: max_capacity.max(1),
            max_storage_time,
            is_static: false,
            hint: Cell::new(0),
        }
    }

    /// A buffer holding a single sample valid at every time.
    pub fn new_static(transform: RigidTransform) -> Self {
        let mut samples = VecDeque::with_capacity(1);
        samples.push_back(TransformSample::new(TfTime::MIN, transform));
        Self {
            samples,
            max_capacity: 1,
            max_storage_time: TfDuration::MAX,
            is_static: true,
            hint: Cell::new(0),
        }
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TransformSample> {
        self.samples.back()
    }

    pub fn earliest(&self) -> Option<&TransformSample> {
        self.samples.front()
    }

    pub fn time_range(&self) -> Option<TfTimeRange> {
        Some(TfTimeRange {
            start: self.samples.front()?.stamp,
            end: self.samples.back()?.stamp,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformSample> {
        self.samples.iter()
    }

    /// Inserts keeping stamp order. Appending in order is O(1), late samples are O(log n) to
    /// locate plus the shift of the deque.
    pub fn insert(&mut self, sample: TransformSample) -> InsertOutcome {
        if self.is_static {
            self.samples.clear();
            self.samples
                .push_back(TransformSample::new(TfTime::MIN, sample.transform));
            return InsertOutcome::Replaced;
        }
        if self.would_evict(sample.stamp) {
            return InsertOutcome::Dropped;
        }

        let outcome = match self.samples.back() {
            None => {
                self.samples.push_back(sample);
                InsertOutcome::Inserted
            }
            Some(last) if last.stamp < sample.stamp => {
                self.samples.push_back(sample);
                InsertOutcome::Inserted
            }
            Some(_) => {
                let pos = self.samples.partition_point(|s| s.stamp < sample.stamp);
                match self.samples.get_mut(pos) {
                    Some(existing) if existing.stamp == sample.stamp => {
                        existing.transform = sample.transform;
                        InsertOutcome::Replaced
                    }
                    _ => {
                        self.samples.insert(pos, sample);
                        InsertOutcome::Inserted
                    }
                }
            }
        };
        self.evict();
        outcome
    }

    /// True when a sample at `stamp` would be the first one evicted after insertion.
    fn would_evict(&self, stamp: TfTime) -> bool {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return false;
        };
        if stamp < last.stamp.saturating_sub(self.max_storage_time) {
            return true;
        }
        self.samples.len() >= self.max_capacity && stamp < first.stamp
    }

    /// Drops the oldest samples over capacity or over the storage horizon.
    /// The newest sample always survives.
    fn evict(&mut self) {
        while self.samples.len() > self.max_capacity {
            self.samples.pop_front();
        }
        let Some(latest) = self.samples.back().map(|s| s.stamp) else {
            return;
        };
        let horizon = latest.saturating_sub(self.max_storage_time);
        while self.samples.len() > 1 && self.samples.front().is_some_and(|s| s.stamp < horizon) {
            self.samples.pop_front();
        }
        if self.hint.get() >= self.samples.len() {
            self.hint.set(0);
        }
    }

    /// Forgets the playback position used to speed up bracketing.
    pub fn reset_hint(&self) {
        self.hint.set(0);
    }

    /// Finds `(before, after)` with `before.stamp <= time <= after.stamp`.
    fn bracket(&self, time: TfTime) -> Option<(usize, usize)> {
        let len = self.samples.len();
        let hint = self.hint.get();
        if hint + 1 < len
            && self.samples[hint].stamp <= time
            && time <= self.samples[hint + 1].stamp
        {
            return Some((hint, hint + 1));
        }
        let pos = self.samples.partition_point(|s| s.stamp <= time);
        if pos == 0 || pos > len {
            return None;
        }
        let before = pos - 1;
        let after = if pos == len { before } else { pos };
        self.hint.set(before);
        Some((before, after))
    }

    /// The transform of this edge at `time`.
    ///
    /// Exact stamps are returned as stored, times between two samples are interpolated, and
    /// times outside the known span are answered with the nearest sample only when they are
    /// within `tolerance` of it. `None` means the time is out of range.
    pub fn query(&self, time: TfTime, tolerance: TfDuration) -> Option<RigidTransform> {
        if self.is_static {
            return self.samples.front().map(|s| s.transform);
        }
        let range = self.time_range()?;
        if !range.contains_with_tolerance(time, tolerance) {
            return None;
        }
        if !range.contains(time) {
            let nearest = if time < range.start {
                self.samples.front()
            } else {
                self.samples.back()
            };
            return nearest.map(|s| s.transform);
        }

        let (before, after) = self.bracket(time)?;
        let before = &self.samples[before];
        if before.stamp == time {
            return Some(before.transform);
        }
        interpolate_transforms(before, &self.samples[after], time).ok()
    }
}

/// An edge of the tree with its history.
#[derive(Debug, Clone)]
pub struct TransformEdge {
    pub parent: FrameIdString,
    pub child: FrameIdString,
    pub buffer: TransformBuffer,
}

impl TransformEdge {
    pub fn query(&self, time: TfTime, tolerance: TfDuration) -> TransformResult<RigidTransform> {
        self.buffer.query(time, tolerance).ok_or_else(|| {
            let range = self.buffer.time_range().unwrap_or(TfTimeRange {
                start: TfTime::MIN,
                end: TfTime::MIN,
            });
            TransformError::OutOfRange {
                parent: self.parent.clone(),
                child: self.child.clone(),
                time,
                earliest: range.start,
                latest: range.end,
            }
        })
    }
}

/// Owner of every edge history, keyed by child frame since a child has a single parent.
#[derive(Debug, Default)]
pub struct TransformStore {
    edges: HashMap<FrameIdString, TransformEdge>,
}

impl TransformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, child: &str) -> Option<&TransformEdge> {
        self.edges.get(child)
    }

    /// Returns the edge of `child`, replacing any edge it had under another parent or of
    /// another kind (static vs. timed).
    pub fn get_or_create(
        &mut self,
        parent: &str,
        child: &str,
        make_buffer: impl FnOnce() -> TransformBuffer,
        is_static: bool,
    ) -> &mut TransformEdge {
        let stale = self
            .edges
            .get(child)
            .is_some_and(|edge| edge.parent != parent || edge.buffer.is_static() != is_static);
        if stale {
            self.edges.remove(child);
        }
        self.edges
            .entry(child.into())
            .or_insert_with(|| TransformEdge {
                parent: parent.into(),
                child: child.into(),
                buffer: make_buffer(),
            })
    }

    pub fn remove(&mut self, child: &str) -> Option<TransformEdge> {
        self.edges.remove(child)
    }

    pub fn edges(&self) -> impl Iterator<Item = &TransformEdge> {
        self.edges.values()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }
}
