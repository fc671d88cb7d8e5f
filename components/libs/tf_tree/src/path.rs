use crate::error::{TransformError, TransformResult};
use crate::frames::FrameRegistry;
use crate::FrameIdString;
use std::collections::HashMap;

/// The chain of edges linking two frames through their lowest common ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    pub ancestor: FrameIdString,
    /// Frames walked from the source up to the ancestor, the ancestor excluded.
    /// Each entry is the child of an edge.
    pub up: Vec<FrameIdString>,
    /// Frames walked from the ancestor down to the target, the ancestor excluded.
    /// Each entry is the child of an edge.
    pub down: Vec<FrameIdString>,
}

impl FramePath {
    pub fn is_trivial(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Resolves the path between two registered frames.
pub fn find_path(frames: &FrameRegistry, from: &str, to: &str) -> TransformResult<FramePath> {
    let from_idx = frames.index_of(from)?;
    let to_idx = frames.index_of(to)?;

    if from_idx == to_idx {
        return Ok(FramePath {
            ancestor: from.into(),
            up: Vec::new(),
            down: Vec::new(),
        });
    }

    let from_chain = frames.ancestor_chain(from_idx)?;
    let to_chain = frames.ancestor_chain(to_idx)?;

    let depth_in_target: HashMap<_, usize> = to_chain
        .iter()
        .enumerate()
        .map(|(depth, idx)| (*idx, depth))
        .collect();

    let (up_len, down_len) = from_chain
        .iter()
        .enumerate()
        .find_map(|(up_len, idx)| depth_in_target.get(idx).map(|down_len| (up_len, *down_len)))
        .ok_or_else(|| TransformError::NoPath {
            from: from.into(),
            to: to.into(),
        })?;

    let up = from_chain[..up_len]
        .iter()
        .map(|idx| frames.name(*idx).clone())
        .collect();
    let down = to_chain[..down_len]
        .iter()
        .rev()
        .map(|idx| frames.name(*idx).clone())
        .collect();

    Ok(FramePath {
        ancestor: frames.name(from_chain[up_len]).clone(),
        up,
        down,
    })
}
