use crate::config::TransformTreeConfig;
use crate::error::{ApplyError, FrameRole, TransformError, TransformResult};
use crate::frames::{FrameEntry, FrameRegistry, Frames, ParentChange};
use crate::path::{find_path, FramePath};
use crate::transform::{
    InsertOutcome, StampedTransform, TransformBuffer, TransformSample, TransformStore,
};
use crate::FrameIdString;
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use tf_clock::TfTime;
use tf_spatial_payloads::{Pose, RigidTransform};

/// What an ingested sample did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// Same edge and same stamp as an existing sample, which was overwritten.
    Replaced,
    /// The child frame moved under a new parent, the previous edge history was dropped.
    Reparented { previous_parent: FrameIdString },
    /// The sample is older than the edge retains and was discarded.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

type CacheKey = (FrameIdString, FrameIdString, TfTime);

struct CacheEntry {
    transform: RigidTransform,
    last_access: u64,
}

/// Composed lookups memoized until the next mutation of the tree.
struct LookupCache {
    entries: HashMap<CacheKey, CacheEntry>,
    max_size: usize,
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl LookupCache {
    fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            max_size,
            access_counter: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<RigidTransform> {
        self.access_counter += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.access_counter;
                self.hits += 1;
                Some(entry.transform)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: CacheKey, transform: RigidTransform) {
        if self.max_size == 0 {
            return;
        }
        // If the cache is at capacity, remove the least recently used entry
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                transform,
                last_access: self.access_counter,
            },
        );
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// The frame tree of a visualization session and its transform history.
///
/// Ingestion needs `&mut self` while every query only borrows the tree, so a whole resolution
/// pass runs against a frozen set of samples.
pub struct TransformTree {
    config: TransformTreeConfig,
    frames: FrameRegistry,
    store: TransformStore,
    cache: RefCell<LookupCache>,
}

impl TransformTree {
    pub fn new() -> Self {
        Self::with_config(TransformTreeConfig::default())
    }

    pub fn with_config(config: TransformTreeConfig) -> Self {
        let cache = RefCell::new(LookupCache::new(config.cache_size));
        Self {
            config,
            frames: FrameRegistry::new(),
            store: TransformStore::new(),
            cache,
        }
    }

    pub fn config(&self) -> &TransformTreeConfig {
        &self.config
    }

    /// Ensures a frame exists, it is a root until an edge names it as a child.
    pub fn add_frame(&mut self, frame_id: &str) {
        self.frames.add_frame(frame_id);
    }

    /// Records a timed sample of the `parent -> child` edge.
    pub fn add_transform(
        &mut self,
        parent: &str,
        child: &str,
        stamp: TfTime,
        transform: RigidTransform,
    ) -> TransformResult<IngestOutcome> {
        self.ingest(parent, child, TransformSample::new(stamp, transform), false)
    }

    pub fn add_stamped(&mut self, stamped: &StampedTransform) -> TransformResult<IngestOutcome> {
        self.ingest(
            &stamped.parent_frame,
            &stamped.child_frame,
            stamped.sample(),
            false,
        )
    }

    /// Records a `parent -> child` edge valid at every time, like a sensor mount.
    pub fn add_static_transform(
        &mut self,
        parent: &str,
        child: &str,
        transform: RigidTransform,
    ) -> TransformResult<IngestOutcome> {
        self.ingest(parent, child, TransformSample::new(TfTime::MIN, transform), true)
    }

    fn ingest(
        &mut self,
        parent: &str,
        child: &str,
        sample: TransformSample,
        is_static: bool,
    ) -> TransformResult<IngestOutcome> {
        let change = match self
            .frames
            .set_parent(parent, child, self.config.reparent_policy)
        {
            Ok(change) => change,
            Err(e) => {
                warn!("Dropping transform sample: {e}");
                return Err(e);
            }
        };

        let previous_parent = match change {
            ParentChange::Reparented { previous } => {
                warn!("Frame '{child}' reparented from '{previous}' to '{parent}'");
                self.store.remove(child);
                Some(previous)
            }
            ParentChange::Unchanged | ParentChange::Attached => None,
        };

        let max_samples = self.config.max_samples_per_edge;
        let max_storage_time = self.config.max_storage_time;
        let edge = self.store.get_or_create(
            parent,
            child,
            || {
                if is_static {
                    TransformBuffer::new_static(sample.transform)
                } else {
                    TransformBuffer::new(max_samples, max_storage_time)
                }
            },
            is_static,
        );
        let stamp = sample.stamp;
        let inserted = edge.buffer.insert(sample);
        if inserted == InsertOutcome::Dropped {
            debug!(
                "Dropping sample of '{parent}' -> '{child}' at {stamp}, older than the retained history"
            );
        } else {
            self.invalidate_cache();
        }

        Ok(match (previous_parent, inserted) {
            (Some(previous_parent), _) => IngestOutcome::Reparented { previous_parent },
            (None, InsertOutcome::Replaced) => IngestOutcome::Replaced,
            (None, InsertOutcome::Inserted) => IngestOutcome::Inserted,
            (None, InsertOutcome::Dropped) => IngestOutcome::Dropped,
        })
    }

    pub fn has_frame(&self, frame_id: &str) -> bool {
        self.frames.contains(frame_id)
    }

    pub fn has_parent(&self, frame_id: &str) -> bool {
        self.frames.parent_of(frame_id).is_some()
    }

    pub fn parent_of(&self, frame_id: &str) -> Option<&FrameIdString> {
        self.frames.parent_of(frame_id)
    }

    pub fn root_of(&self, frame_id: &str) -> TransformResult<FrameIdString> {
        self.frames.root_of(frame_id)
    }

    /// Snapshot of the known frame names, unaffected by later ingestion.
    pub fn frames(&self) -> Frames {
        self.frames.frames()
    }

    pub fn frame_list(&self) -> Vec<FrameEntry> {
        self.frames.frame_list()
    }

    pub fn default_render_frame(&self) -> Option<FrameIdString> {
        self.frames.default_render_frame()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn edge_count(&self) -> usize {
        self.store.len()
    }

    /// Sample count of the edge ending at `child`.
    pub fn sample_count(&self, child: &str) -> usize {
        self.store.get(child).map_or(0, |edge| edge.buffer.len())
    }

    pub fn find_path(&self, from: &str, to: &str) -> TransformResult<FramePath> {
        find_path(&self.frames, from, to)
    }

    /// The transform mapping coordinates of `source` into `target` at `time`.
    pub fn lookup_transform(
        &self,
        source: &str,
        target: &str,
        time: TfTime,
    ) -> TransformResult<RigidTransform> {
        let path = self.find_path(source, target)?;
        if path.is_trivial() {
            return Ok(RigidTransform::IDENTITY);
        }

        let key: CacheKey = (source.into(), target.into(), time);
        if let Some(cached) = self.cache.borrow_mut().get(&key) {
            return Ok(cached);
        }

        let mut source_to_ancestor = RigidTransform::IDENTITY;
        for frame in &path.up {
            source_to_ancestor = self.edge_transform(frame, time)? * source_to_ancestor;
        }
        let mut target_to_ancestor = RigidTransform::IDENTITY;
        for frame in &path.down {
            target_to_ancestor = target_to_ancestor * self.edge_transform(frame, time)?;
        }
        let result = (target_to_ancestor.inverse() * source_to_ancestor).normalized();

        self.cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    fn edge_transform(&self, child: &str, time: TfTime) -> TransformResult<RigidTransform> {
        let edge = self.store.get(child).ok_or_else(|| {
            // the registry knows the edge, the store must too
            TransformError::NoPath {
                from: child.into(),
                to: self
                    .frames
                    .parent_of(child)
                    .cloned()
                    .unwrap_or_else(|| child.into()),
            }
        })?;
        edge.query(time, self.config.tolerance)
    }

    /// Resolves `input`, a pose expressed in `source` at `source_time`, into `destination`
    /// at `destination_time`, bridging the two instants through `fixed`.
    ///
    /// Nothing is produced unless both halves resolve. The error names the frame at fault.
    pub fn apply(
        &self,
        input: &Pose,
        destination: &str,
        source: &str,
        fixed: &str,
        source_time: TfTime,
        destination_time: TfTime,
    ) -> Result<Pose, ApplyError> {
        if source == destination {
            return Ok(*input);
        }

        let source_to_fixed = self
            .lookup_transform(source, fixed, source_time)
            .map_err(|cause| blame(cause, source, FrameRole::Source, fixed))?;
        let fixed_to_destination = self
            .lookup_transform(fixed, destination, destination_time)
            .map_err(|cause| blame(cause, destination, FrameRole::Destination, fixed))?;

        Ok((fixed_to_destination * source_to_fixed * *input).normalized())
    }

    /// Earliest stamp over every timed edge, static edges excluded.
    pub fn earliest_dynamic_time(&self) -> Option<TfTime> {
        self.store
            .edges()
            .filter(|edge| !edge.buffer.is_static())
            .filter_map(|edge| edge.buffer.earliest().map(|s| s.stamp))
            .min()
    }

    /// Must be called when playback jumps, memoized lookups and sample hints are dropped.
    pub fn handle_time_discontinuity(&mut self, previous_time: TfTime) {
        debug!("Time discontinuity from {previous_time}, dropping cached lookups");
        self.invalidate_cache();
        for edge in self.store.edges() {
            edge.buffer.reset_hint();
        }
    }

    /// Forgets every frame, edge and sample.
    pub fn reset(&mut self) {
        debug!(
            "Resetting transform tree with {} frames and {} edges",
            self.frames.len(),
            self.store.len()
        );
        self.frames.clear();
        self.store.clear();
        self.invalidate_cache();
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    fn invalidate_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        if !cache.entries.is_empty() {
            debug!("Invalidating {} cached lookups", cache.entries.len());
            cache.clear();
        }
    }
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes a lookup failure to one of the frames of an `apply` call.
/// `own` is the end of the half that failed, the other end is always the fixed frame.
fn blame(cause: TransformError, own: &str, role: FrameRole, fixed: &str) -> ApplyError {
    let (role, frame) = match &cause {
        TransformError::FrameNotFound(missing) if missing == fixed && own != fixed => {
            (FrameRole::Fixed, fixed)
        }
        _ => (role, own),
    };
    ApplyError {
        role,
        frame: frame.into(),
        cause,
    }
}
