//! Coordinate-frame transform tree.
//!
//! Frames are created on the fly by the transforms ingested between two render ticks, every
//! edge keeps a bounded history of timestamped rigid transforms, and [`TransformTree::apply`]
//! places a pose expressed in one frame at one time into another frame at another time.

#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frames;
pub mod interpolation;
pub mod path;
pub mod publish;
pub mod renderable;
pub mod session;
pub mod transform;
pub mod tree;

#[cfg(test)]
mod test_utils;

use compact_str::CompactString;

/// Frame identifier strings
pub type FrameIdString = CompactString;

pub use config::{read_configuration, ReparentPolicy, TransformTreeConfig};
pub use diagnostics::{
    DiagnosticStore, DiagnosticsSink, MissingCause, MissingTransformReason,
    MissingTransformTracker, SettingsPath,
};
pub use error::{ApplyError, FrameRole, TransformError, TransformResult};
pub use frames::{FrameEntry, Frames};
pub use interpolation::interpolate_transforms;
pub use path::FramePath;
pub use publish::{
    point_to_publish_frame, pose_to_publish_frame, publish_message, AdvertisementRegistry,
    Advertiser, Covariance, PoseDeviation, PoseInFrame, PublishKind,
};
pub use renderable::{PoseState, RenderablePose, StalePolicy};
pub use session::{PendingTransform, TickReport, TransformSession};
pub use transform::{StampedTransform, TransformBuffer, TransformSample, TransformStore};
pub use tree::{CacheStats, IngestOutcome, TransformTree};

pub use tf_clock::{TfDuration, TfTime};
pub use tf_spatial_payloads::{Pose, RigidTransform};
