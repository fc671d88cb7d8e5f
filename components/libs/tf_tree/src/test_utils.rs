/// Test utilities for creating transforms and samples
use crate::transform::TransformSample;
use tf_clock::TfTime;
use tf_spatial_payloads::{DQuat, DVec3, RigidTransform};

/// Create a translation transform
pub fn translation(x: f64, y: f64, z: f64) -> RigidTransform {
    RigidTransform::from_translation(DVec3::new(x, y, z))
}

/// A sample translated along x
pub fn sample_x(stamp_nanos: u64, x: f64) -> TransformSample {
    TransformSample::new(TfTime::from_nanos(stamp_nanos), translation(x, 0.0, 0.0))
}

/// A sample rotated around z by `angle` radians
pub fn yaw(stamp_nanos: u64, angle: f64) -> TransformSample {
    TransformSample::new(
        TfTime::from_nanos(stamp_nanos),
        RigidTransform::from_rotation(DQuat::from_rotation_z(angle)),
    )
}
