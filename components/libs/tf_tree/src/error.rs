use crate::FrameIdString;
use std::fmt::{Display, Formatter};
use tf_clock::TfTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Frame '{0}' does not exist")]
    FrameNotFound(FrameIdString),

    #[error("No path between frame '{from}' and frame '{to}'")]
    NoPath {
        from: FrameIdString,
        to: FrameIdString,
    },

    #[error(
        "Transform '{parent}' -> '{child}' not available at {time}, known samples span [{earliest}, {latest}]"
    )]
    OutOfRange {
        parent: FrameIdString,
        child: FrameIdString,
        time: TfTime,
        earliest: TfTime,
        latest: TfTime,
    },

    #[error("Frame '{child}' already has parent '{previous}', refusing reparent to '{requested}'")]
    AmbiguousReparent {
        child: FrameIdString,
        previous: FrameIdString,
        requested: FrameIdString,
    },

    #[error("Edge '{parent}' -> '{child}' would create a cycle in the transform tree")]
    CyclicTransformTree {
        parent: FrameIdString,
        child: FrameIdString,
    },

    #[error("Error during transform interpolation: {0}")]
    InterpolationError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TransformResult<T> = Result<T, TransformError>;

/// The frame of an `apply` call that could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FrameRole {
    Source,
    Destination,
    Fixed,
}

impl Display for FrameRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameRole::Source => write!(f, "source"),
            FrameRole::Destination => write!(f, "destination"),
            FrameRole::Fixed => write!(f, "fixed"),
        }
    }
}

/// Failure of a pose resolution, naming the frame at fault.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot resolve {role} frame '{frame}': {cause}")]
pub struct ApplyError {
    pub role: FrameRole,
    pub frame: FrameIdString,
    #[source]
    pub cause: TransformError,
}
