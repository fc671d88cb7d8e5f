use crate::error::{TransformError, TransformResult};
use crate::transform::TransformSample;
use tf_clock::TfTime;
use tf_spatial_payloads::{DQuat, RigidTransform};

/// Interpolate between two samples of the same edge at a specific time point.
///
/// The translation is interpolated linearly and the rotation spherically along the shortest
/// arc, the result is normalized. Both endpoints are returned exactly, and when the two samples
/// share a stamp `before` wins.
///
/// # Arguments
/// * `before` - The sample at an earlier time
/// * `after` - The sample at a later time
/// * `time` - The time at which to interpolate (must be between before.stamp and after.stamp)
///
/// # Returns
/// * The interpolated transform
/// * Error if time is outside the valid range
pub fn interpolate_transforms(
    before: &TransformSample,
    after: &TransformSample,
    time: TfTime,
) -> TransformResult<RigidTransform> {
    if time < before.stamp || time > after.stamp {
        return Err(TransformError::InterpolationError(format!(
            "Requested time {time} is outside [{}, {}]",
            before.stamp, after.stamp
        )));
    }

    if time == before.stamp || before.stamp == after.stamp {
        return Ok(before.transform);
    }
    if time == after.stamp {
        return Ok(after.transform);
    }

    let span = (after.stamp - before.stamp).as_nanos() as f64;
    let ratio = (time - before.stamp).as_nanos() as f64 / span;

    let translation = before
        .transform
        .translation
        .lerp(after.transform.translation, ratio);
    let rotation = slerp_shortest(before.transform.rotation, after.transform.rotation, ratio);
    Ok(RigidTransform::new(translation, rotation))
}

/// Spherical interpolation on the shortest arc between two unit quaternions.
pub fn slerp_shortest(from: DQuat, to: DQuat, ratio: f64) -> DQuat {
    let to = if from.dot(to) < 0.0 { -to } else { to };
    from.slerp(to, ratio).normalize()
}
