//! Missing-transform reporting towards the settings and warnings UI.
//!
//! A resolution failure is keyed by the settings path of the object that failed. Sinks are
//! expected to be idempotent: reporting the same reason twice or clearing a path that is not in
//! error changes nothing.

use crate::error::{ApplyError, FrameRole, TransformError};
use crate::FrameIdString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Identity of a settings node, e.g. `["layers", "car"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettingsPath(Vec<String>);

impl SettingsPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }
}

impl<const N: usize> From<[&str; N]> for SettingsPath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<&[&str]> for SettingsPath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl Display for SettingsPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissingCause {
    FrameNotFound,
    NoPath,
    OutOfRange,
}

impl From<&TransformError> for MissingCause {
    fn from(error: &TransformError) -> Self {
        match error {
            TransformError::FrameNotFound(_) => MissingCause::FrameNotFound,
            TransformError::NoPath { .. } | TransformError::CyclicTransformTree { .. } => {
                MissingCause::NoPath
            }
            _ => MissingCause::OutOfRange,
        }
    }
}

/// Why an object could not be placed in the scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissingTransformReason {
    pub role: FrameRole,
    /// The frame that could not be resolved.
    pub frame: FrameIdString,
    pub cause: MissingCause,
    /// The frame the object is expressed in.
    pub from: FrameIdString,
    /// The frame the object was requested in.
    pub to: FrameIdString,
}

impl MissingTransformReason {
    pub fn from_apply_error(error: &ApplyError, from: &str, to: &str) -> Self {
        Self {
            role: error.role,
            frame: error.frame.clone(),
            cause: MissingCause::from(&error.cause),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn message(&self) -> String {
        match self.cause {
            MissingCause::FrameNotFound => format!("Missing frame {}", self.frame),
            MissingCause::NoPath | MissingCause::OutOfRange => {
                format!("Missing transform from frame {} to frame {}", self.from, self.to)
            }
        }
    }
}

impl Display for MissingTransformReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} frame)", self.message(), self.role)
    }
}

/// Consumer of resolution failures, typically the settings tree of the UI.
pub trait DiagnosticsSink {
    fn report_missing_transform(&mut self, path: &SettingsPath, reason: &MissingTransformReason);
    fn clear_missing_transform(&mut self, path: &SettingsPath);
}

/// In-memory sink holding at most one active diagnostic per path.
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    active: HashMap<SettingsPath, MissingTransformReason>,
    reported: u64,
    cleared: u64,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &SettingsPath) -> Option<&MissingTransformReason> {
        self.active.get(path)
    }

    pub fn is_active(&self, path: &SettingsPath) -> bool {
        self.active.contains_key(path)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of times a diagnostic was raised or changed.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Number of times an active diagnostic was removed.
    pub fn cleared(&self) -> u64 {
        self.cleared
    }

    /// Active diagnostics ordered by path.
    pub fn entries(&self) -> Vec<(&SettingsPath, &MissingTransformReason)> {
        let mut entries: Vec<_> = self.active.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

impl DiagnosticsSink for DiagnosticStore {
    fn report_missing_transform(&mut self, path: &SettingsPath, reason: &MissingTransformReason) {
        if self.active.get(path) != Some(reason) {
            self.active.insert(path.clone(), reason.clone());
            self.reported += 1;
        }
    }

    fn clear_missing_transform(&mut self, path: &SettingsPath) {
        if self.active.remove(path).is_some() {
            self.cleared += 1;
        }
    }
}

/// Forwards only the state changes of each path to the wrapped sink: the first failure, a
/// change of reason and the recovery.
#[derive(Debug, Default)]
pub struct MissingTransformTracker<S> {
    sink: S,
    failing: HashMap<SettingsPath, MissingTransformReason>,
}

impl<S: DiagnosticsSink> MissingTransformTracker<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            failing: HashMap::new(),
        }
    }

    pub fn is_failing(&self, path: &SettingsPath) -> bool {
        self.failing.contains_key(path)
    }

    pub fn failing_count(&self) -> usize {
        self.failing.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Forgets every path without telling the sink, used when the sink itself was reset.
    pub fn forget_all(&mut self) {
        self.failing.clear();
    }
}

impl<S: DiagnosticsSink> DiagnosticsSink for MissingTransformTracker<S> {
    fn report_missing_transform(&mut self, path: &SettingsPath, reason: &MissingTransformReason) {
        if self.failing.get(path) == Some(reason) {
            return;
        }
        self.failing.insert(path.clone(), reason.clone());
        self.sink.report_missing_transform(path, reason);
    }

    fn clear_missing_transform(&mut self, path: &SettingsPath) {
        if self.failing.remove(path).is_some() {
            self.sink.clear_missing_transform(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(cause: MissingCause) -> MissingTransformReason {
        MissingTransformReason {
            role: FrameRole::Source,
            frame: "sensor".into(),
            cause,
            from: "sensor".into(),
            to: "map".into(),
        }
    }

    /// Records every call it receives.
    #[derive(Default)]
    struct CallLog {
        calls: Vec<String>,
    }

    impl DiagnosticsSink for CallLog {
        fn report_missing_transform(
            &mut self,
            path: &SettingsPath,
            reason: &MissingTransformReason,
        ) {
            self.calls.push(format!("report {path}: {}", reason.message()));
        }

        fn clear_missing_transform(&mut self, path: &SettingsPath) {
            self.calls.push(format!("clear {path}"));
        }
    }

    #[test]
    fn test_settings_path() {
        let layers = SettingsPath::from(["layers"]);
        let car = layers.child("car");
        assert_eq!(car, SettingsPath::new(["layers", "car"]));
        assert_eq!(car.to_string(), "layers.car");
        assert_eq!(car.segments().len(), 2);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            reason(MissingCause::NoPath).message(),
            "Missing transform from frame sensor to frame map"
        );
        assert_eq!(reason(MissingCause::FrameNotFound).message(), "Missing frame sensor");
        assert_eq!(
            reason(MissingCause::OutOfRange).to_string(),
            "Missing transform from frame sensor to frame map (source frame)"
        );
    }

    #[test]
    fn test_cause_from_error() {
        assert_eq!(
            MissingCause::from(&TransformError::FrameNotFound("a".into())),
            MissingCause::FrameNotFound
        );
        assert_eq!(
            MissingCause::from(&TransformError::NoPath {
                from: "a".into(),
                to: "b".into()
            }),
            MissingCause::NoPath
        );
        assert_eq!(
            MissingCause::from(&TransformError::InterpolationError("x".into())),
            MissingCause::OutOfRange
        );
    }

    #[test]
    fn test_store_is_idempotent() {
        let mut store = DiagnosticStore::new();
        let path = SettingsPath::from(["layers", "car"]);
        store.report_missing_transform(&path, &reason(MissingCause::NoPath));
        store.report_missing_transform(&path, &reason(MissingCause::NoPath));
        assert_eq!(store.active_count(), 1);
        assert_eq!(store.reported(), 1);

        store.report_missing_transform(&path, &reason(MissingCause::OutOfRange));
        assert_eq!(store.active_count(), 1);
        assert_eq!(store.reported(), 2);
        assert_eq!(store.get(&path).unwrap().cause, MissingCause::OutOfRange);

        store.clear_missing_transform(&path);
        store.clear_missing_transform(&path);
        assert!(!store.is_active(&path));
        assert_eq!(store.cleared(), 1);
    }

    #[test]
    fn test_store_entries_sorted() {
        let mut store = DiagnosticStore::new();
        store.report_missing_transform(&SettingsPath::from(["b"]), &reason(MissingCause::NoPath));
        store.report_missing_transform(&SettingsPath::from(["a"]), &reason(MissingCause::NoPath));
        let paths: Vec<String> = store.entries().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn test_tracker_forwards_transitions_only() {
        let mut tracker = MissingTransformTracker::new(CallLog::default());
        let path = SettingsPath::from(["layers", "car"]);

        tracker.clear_missing_transform(&path);
        tracker.report_missing_transform(&path, &reason(MissingCause::NoPath));
        tracker.report_missing_transform(&path, &reason(MissingCause::NoPath));
        assert!(tracker.is_failing(&path));
        tracker.report_missing_transform(&path, &reason(MissingCause::FrameNotFound));
        tracker.clear_missing_transform(&path);
        tracker.clear_missing_transform(&path);
        assert_eq!(tracker.failing_count(), 0);

        assert_eq!(
            tracker.into_inner().calls,
            vec![
                "report layers.car: Missing transform from frame sensor to frame map",
                "report layers.car: Missing frame sensor",
                "clear layers.car",
            ]
        );
    }
}
