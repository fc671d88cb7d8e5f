use crate::diagnostics::{DiagnosticsSink, MissingTransformReason, SettingsPath};
use crate::tree::TransformTree;
use crate::FrameIdString;
use serde::{Deserialize, Serialize};
use tf_clock::TfTime;
use tf_spatial_payloads::Pose;

/// Resolution state of a renderable between two ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseState {
    /// Never resolved since creation or the last reset.
    #[default]
    Unresolved,
    Resolved,
    /// Resolved in the past, the last resolution failed.
    Stale,
}

/// What a stale renderable shows, decided by the layer owning it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StalePolicy {
    #[default]
    KeepLastPose,
    Hide,
}

/// Placement bookkeeping of one object drawn in the scene.
#[derive(Debug, Clone)]
pub struct RenderablePose {
    pub frame_id: FrameIdString,
    pub settings_path: SettingsPath,
    /// Pose of the object in `frame_id` as carried by its message.
    pub message_pose: Pose,
    pub message_time: TfTime,
    pub stale_policy: StalePolicy,
    state: PoseState,
    last_pose: Option<Pose>,
}

impl RenderablePose {
    pub fn new(
        frame_id: &str,
        settings_path: SettingsPath,
        message_pose: Pose,
        message_time: TfTime,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            settings_path,
            message_pose,
            message_time,
            stale_policy: StalePolicy::default(),
            state: PoseState::Unresolved,
            last_pose: None,
        }
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    /// A new message replaced the content of this renderable.
    pub fn set_message(&mut self, frame_id: &str, pose: Pose, time: TfTime) {
        if self.frame_id != frame_id {
            self.frame_id = frame_id.into();
        }
        self.message_pose = pose;
        self.message_time = time;
    }

    pub fn state(&self) -> PoseState {
        self.state
    }

    /// The pose to draw in the render frame, `None` when the object must be hidden.
    pub fn displayed_pose(&self) -> Option<Pose> {
        match (self.state, self.stale_policy) {
            (PoseState::Resolved, _) | (PoseState::Stale, StalePolicy::KeepLastPose) => {
                self.last_pose
            }
            (PoseState::Stale, StalePolicy::Hide) | (PoseState::Unresolved, _) => None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.displayed_pose().is_some()
    }

    /// Runs one resolution of the object into `render_frame` at `current_time`.
    pub fn update(
        &mut self,
        tree: &TransformTree,
        render_frame: &str,
        fixed_frame: &str,
        current_time: TfTime,
        sink: &mut impl DiagnosticsSink,
    ) -> PoseState {
        match tree.apply(
            &self.message_pose,
            render_frame,
            &self.frame_id,
            fixed_frame,
            self.message_time,
            current_time,
        ) {
            Ok(pose) => {
                self.last_pose = Some(pose);
                self.state = PoseState::Resolved;
                sink.clear_missing_transform(&self.settings_path);
            }
            Err(error) => {
                let reason =
                    MissingTransformReason::from_apply_error(&error, &self.frame_id, render_frame);
                sink.report_missing_transform(&self.settings_path, &reason);
                self.state = match self.state {
                    PoseState::Unresolved => PoseState::Unresolved,
                    PoseState::Resolved | PoseState::Stale => PoseState::Stale,
                };
            }
        }
        self.state
    }

    /// Drops the last known pose, the tree it came from is gone.
    pub fn reset(&mut self) {
        self.state = PoseState::Unresolved;
        self.last_pose = None;
    }
}
