use crate::config::TransformTreeConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::publish::AdvertisementRegistry;
use crate::renderable::{PoseState, RenderablePose};
use crate::transform::StampedTransform;
use crate::tree::TransformTree;
use log::{debug, info};
use std::collections::VecDeque;
use tf_clock::TfTime;

/// A transform message waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingTransform {
    Timed(StampedTransform),
    Static(StampedTransform),
}

/// Counters of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ingested: usize,
    pub rejected: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// One visualization session: the tree, the samples received since the last tick and the
/// playback clock.
///
/// Samples are only absorbed at the start of a tick, so every resolution of a tick sees the
/// same history.
pub struct TransformSession {
    tree: TransformTree,
    pending: VecDeque<PendingTransform>,
    current_time: Option<TfTime>,
    advertisements: AdvertisementRegistry,
    renderables_invalidated: bool,
}

impl TransformSession {
    pub fn new(config: TransformTreeConfig) -> Self {
        Self {
            tree: TransformTree::with_config(config),
            pending: VecDeque::new(),
            current_time: None,
            advertisements: AdvertisementRegistry::new(),
            renderables_invalidated: false,
        }
    }

    pub fn tree(&self) -> &TransformTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TransformTree {
        &mut self.tree
    }

    pub fn advertisements(&mut self) -> &mut AdvertisementRegistry {
        &mut self.advertisements
    }

    pub fn current_time(&self) -> Option<TfTime> {
        self.current_time
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn enqueue(&mut self, transform: StampedTransform) {
        self.pending.push_back(PendingTransform::Timed(transform));
    }

    pub fn enqueue_static(&mut self, transform: StampedTransform) {
        self.pending.push_back(PendingTransform::Static(transform));
    }

    /// Drains the queue into the tree in arrival order.
    /// Returns how many samples were accepted and rejected.
    pub fn flush_ingestion(&mut self) -> (usize, usize) {
        let mut accepted = 0;
        let mut rejected = 0;
        while let Some(pending) = self.pending.pop_front() {
            let result = match &pending {
                PendingTransform::Timed(stamped) => self.tree.add_stamped(stamped),
                PendingTransform::Static(stamped) => self.tree.add_static_transform(
                    &stamped.parent_frame,
                    &stamped.child_frame,
                    stamped.transform,
                ),
            };
            match result {
                Ok(_) => accepted += 1,
                Err(_) => rejected += 1,
            }
        }
        (accepted, rejected)
    }

    /// Moves the playback clock. A seek invalidates the lookups cached around the old time and,
    /// when it lands before every retained sample, clears the whole tree.
    /// Returns true when the tree was cleared.
    pub fn set_current_time(&mut self, time: TfTime, did_seek: bool) -> bool {
        let previous = self.current_time.replace(time);
        if !did_seek {
            return false;
        }

        self.tree.handle_time_discontinuity(previous.unwrap_or(time));
        match self.tree.earliest_dynamic_time() {
            Some(earliest) if time < earliest => {
                info!("Seek to {time} is before the earliest retained transform {earliest}, resetting");
                self.reset();
                true
            }
            _ => {
                debug!("Seek to {time}, keeping retained transforms");
                false
            }
        }
    }

    /// Forgets every frame and sample, including the ones not flushed yet.
    pub fn reset(&mut self) {
        info!("Resetting transform session");
        self.tree.reset();
        self.pending.clear();
        self.renderables_invalidated = true;
    }

    /// Absorbs the queued samples then resolves every renderable into `render_frame`.
    pub fn tick<'a, S: DiagnosticsSink>(
        &mut self,
        renderables: impl IntoIterator<Item = &'a mut RenderablePose>,
        render_frame: &str,
        fixed_frame: &str,
        sink: &mut S,
    ) -> TickReport {
        let (ingested, rejected) = self.flush_ingestion();
        let mut report = TickReport {
            ingested,
            rejected,
            ..Default::default()
        };

        let invalidated = std::mem::take(&mut self.renderables_invalidated);
        let now = self.current_time.unwrap_or_default();
        for renderable in renderables {
            if invalidated {
                renderable.reset();
            }
            match renderable.update(&self.tree, render_frame, fixed_frame, now, sink) {
                PoseState::Resolved => report.resolved += 1,
                PoseState::Unresolved | PoseState::Stale => report.failed += 1,
            }
        }
        report
    }
}

impl Default for TransformSession {
    fn default() -> Self {
        Self::new(TransformTreeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticStore, SettingsPath};
    use crate::test_utils::translation;
    use tf_spatial_payloads::RigidTransform;

    fn stamped(parent: &str, child: &str, secs: u64, x: f64) -> StampedTransform {
        StampedTransform::new(parent, child, TfTime::from_secs(secs), translation(x, 0.0, 0.0))
    }

    fn car(time: TfTime) -> RenderablePose {
        RenderablePose::new(
            "car",
            SettingsPath::from(["layers", "car"]),
            RigidTransform::IDENTITY,
            time,
        )
    }

    #[test]
    fn test_ingestion_is_deferred_to_tick() {
        let mut session = TransformSession::default();
        session.enqueue(stamped("map", "car", 1, 1.0));
        session.enqueue(stamped("map", "car", 2, 2.0));
        session.enqueue_static(stamped("car", "lidar", 0, 0.5));
        assert_eq!(session.pending_len(), 3);
        assert!(!session.tree().has_frame("car"));

        session.set_current_time(TfTime::from_secs(2), false);
        let mut store = DiagnosticStore::new();
        let mut renderables = vec![car(TfTime::from_secs(2))];
        let report = session.tick(renderables.iter_mut(), "map", "map", &mut store);
        assert_eq!(report.ingested, 3);
        assert_eq!(report.resolved, 1);
        assert_eq!(session.pending_len(), 0);
        assert_eq!(
            renderables[0].displayed_pose().unwrap().translation.x,
            2.0
        );
    }

    #[test]
    fn test_rejected_samples_are_counted() {
        let mut session = TransformSession::default();
        session.enqueue(stamped("a", "b", 1, 1.0));
        session.enqueue(stamped("b", "a", 1, 1.0));
        assert_eq!(session.flush_ingestion(), (1, 1));
    }

    #[test]
    fn test_seek_within_history_keeps_tree() {
        let mut session = TransformSession::default();
        session.enqueue(stamped("map", "car", 1, 1.0));
        session.enqueue(stamped("map", "car", 3, 3.0));
        session.flush_ingestion();
        session.set_current_time(TfTime::from_secs(3), false);
        assert!(!session.set_current_time(TfTime::from_secs(2), true));
        assert!(session.tree().has_frame("car"));
        assert_eq!(session.current_time(), Some(TfTime::from_secs(2)));
    }

    #[test]
    fn test_seek_before_history_resets() {
        let mut session = TransformSession::default();
        session.enqueue(stamped("map", "car", 5, 1.0));
        session.flush_ingestion();
        session.set_current_time(TfTime::from_secs(5), false);

        let mut store = DiagnosticStore::new();
        let mut renderables = vec![car(TfTime::from_secs(5))];
        session.tick(renderables.iter_mut(), "map", "map", &mut store);
        assert_eq!(renderables[0].state(), PoseState::Resolved);

        session.enqueue(stamped("map", "car", 6, 1.0));
        assert!(session.set_current_time(TfTime::from_secs(1), true));
        assert!(!session.tree().has_frame("car"));
        assert_eq!(session.pending_len(), 0);

        // the renderable forgets its pose instead of going stale
        let report = session.tick(renderables.iter_mut(), "map", "map", &mut store);
        assert_eq!(report.failed, 1);
        assert_eq!(renderables[0].state(), PoseState::Unresolved);
        assert!(store.is_active(&renderables[0].settings_path));
    }
}
