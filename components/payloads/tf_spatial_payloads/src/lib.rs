use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Mul;
use uom::si::angle::radian;
use uom::si::f64::Angle as Angle64;
use uom::si::f64::Length as Length64;
use uom::si::length::meter;

pub use glam::{DQuat, DVec3};

/// Below this norm a quaternion carries no usable orientation.
const MIN_QUATERNION_NORM: f64 = 1e-9;

/// RigidTransform represents a 3D rigid-body transformation (rotation + translation).
///
/// Applied to a point `p` it yields `rotation * p + translation`. For an edge
/// `parent -> child` the transform maps child coordinates into the parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub translation: DVec3,
    pub rotation: DQuat,
}

/// A pose is the placement of an object in a frame, which is the same math as a transform.
pub type Pose = RigidTransform;

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    /// Builds a transform, normalizing the rotation. Degenerate or non-finite
    /// quaternions fall back to the identity rotation.
    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation: normalize_rotation(rotation),
        }
    }

    /// Builds a transform from raw message fields.
    pub fn from_xyz_xyzw(translation: [f64; 3], rotation: [f64; 4]) -> Self {
        let [x, y, z] = translation;
        let [qx, qy, qz, qw] = rotation;
        Self::new(DVec3::new(x, y, z), DQuat::from_xyzw(qx, qy, qz, qw))
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            rotation: DQuat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self::new(DVec3::ZERO, rotation)
    }

    /// Computes the inverse of this rigid transformation.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.conjugate();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Re-normalizes the rotation to counter drift after long compositions.
    pub fn normalized(self) -> Self {
        Self::new(self.translation, self.rotation)
    }

    /// Compares two transforms, treating `q` and `-q` as the same rotation.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f64) -> bool {
        let rotation_close = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        rotation_close && self.translation.abs_diff_eq(other.translation, max_abs_diff)
    }

    pub fn translation_length(&self) -> [Length64; 3] {
        [
            Length64::new::<meter>(self.translation.x),
            Length64::new::<meter>(self.translation.y),
            Length64::new::<meter>(self.translation.z),
        ]
    }

    /// Magnitude of the rotation around its axis.
    pub fn rotation_angle(&self) -> Angle64 {
        let (_, angle) = self.rotation.to_axis_angle();
        Angle64::new::<radian>(angle)
    }
}

fn normalize_rotation(rotation: DQuat) -> DQuat {
    let norm = rotation.length();
    if !norm.is_finite() || norm < MIN_QUATERNION_NORM {
        DQuat::IDENTITY
    } else {
        rotation / norm
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Composition: `(a * b).transform_point(p) == a.transform_point(b.transform_point(p))`.
impl Mul for RigidTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            translation: self.rotation * rhs.translation + self.translation,
            rotation: self.rotation * rhs.rotation,
        }
    }
}

impl Mul for &RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: Self) -> Self::Output {
        *self * *rhs
    }
}

impl Mul<RigidTransform> for &RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> Self::Output {
        *self * rhs
    }
}

impl Mul<&RigidTransform> for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: &RigidTransform) -> Self::Output {
        self * *rhs
    }
}

impl Display for RigidTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let t = self.translation;
        let q = self.rotation;
        write!(
            f,
            "t=({:.4}, {:.4}, {:.4}) q=({:.4}, {:.4}, {:.4}, {:.4})",
            t.x, t.y, t.z, q.x, q.y, q.z, q.w
        )
    }
}

// Bincode implementations, the wire layout is [tx, ty, tz, qx, qy, qz, qw].
impl Encode for RigidTransform {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.translation.to_array().encode(encoder)?;
        self.rotation.to_array().encode(encoder)
    }
}

impl Decode for RigidTransform {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let translation: [f64; 3] = Decode::decode(decoder)?;
        let rotation: [f64; 4] = Decode::decode(decoder)?;
        Ok(Self::from_xyz_xyzw(translation, rotation))
    }
}

impl<'de> BorrowDecode<'de> for RigidTransform {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let translation: [f64; 3] = Decode::decode(decoder)?;
        let rotation: [f64; 4] = Decode::decode(decoder)?;
        Ok(Self::from_xyz_xyzw(translation, rotation))
    }
}
