//! Frame registry: the set of known frame names and the parent edges linking them.
//!
//! Frames are created lazily the first time they are named. Each child has at most one
//! parent at any instant; the registry refuses edges that would close a cycle.

use crate::config::ReparentPolicy;
use crate::error::{TransformError, TransformResult};
use crate::FrameIdString;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Frames conventionally used as the world anchor, in order of preference.
pub const PREFERRED_ROOT_FRAMES: [&str; 3] = ["map", "odom", "world"];

/// Result of registering a parent for a child frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentChange {
    /// The child already had this parent.
    Unchanged,
    /// The child had no parent yet.
    Attached,
    /// The child moved away from `previous`.
    Reparented { previous: FrameIdString },
}

/// One row of the hierarchical frame list shown in frame pickers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FrameEntry {
    pub id: FrameIdString,
    pub parent: Option<FrameIdString>,
    /// 0 for roots.
    pub depth: usize,
}

/// Snapshot enumeration of frame names.
///
/// Holding a `Frames` never observes later registrations or a reset. Clones are cheap and
/// keep their position, `restart` replays the same snapshot.
#[derive(Debug, Clone)]
pub struct Frames {
    names: Arc<[FrameIdString]>,
    pos: usize,
}

impl Frames {
    /// Rewinds the enumeration to the first frame.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for Frames {
    type Item = FrameIdString;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.get(self.pos)?.clone();
        self.pos += 1;
        Some(name)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.names.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames {}

#[derive(Debug)]
pub struct FrameRegistry {
    /// Edges point from parent to child.
    graph: DiGraph<FrameIdString, ()>,
    frame_indices: HashMap<FrameIdString, NodeIndex>,
    /// Built on demand by `frames`, dropped whenever a frame is added.
    snapshot: RefCell<Option<Arc<[FrameIdString]>>>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            frame_indices: HashMap::new(),
            snapshot: RefCell::new(None),
        }
    }

    /// Idempotent, returns the index of the frame.
    pub fn add_frame(&mut self, frame_id: &str) -> NodeIndex {
        if let Some(idx) = self.frame_indices.get(frame_id) {
            return *idx;
        }
        let name = FrameIdString::from(frame_id);
        let idx = self.graph.add_node(name.clone());
        self.frame_indices.insert(name, idx);
        self.snapshot.get_mut().take();
        idx
    }

    pub fn contains(&self, frame_id: &str) -> bool {
        self.frame_indices.contains_key(frame_id)
    }

    pub fn index_of(&self, frame_id: &str) -> TransformResult<NodeIndex> {
        self.frame_indices
            .get(frame_id)
            .copied()
            .ok_or_else(|| TransformError::FrameNotFound(frame_id.into()))
    }

    pub fn name(&self, idx: NodeIndex) -> &FrameIdString {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Incoming).next()
    }

    pub fn parent_of(&self, frame_id: &str) -> Option<&FrameIdString> {
        let idx = self.frame_indices.get(frame_id)?;
        self.parent_index(*idx).map(|parent| &self.graph[parent])
    }

    pub fn frames(&self) -> Frames {
        let names = self
            .snapshot
            .borrow_mut()
            .get_or_insert_with(|| self.graph.node_weights().cloned().collect())
            .clone();
        Frames { names, pos: 0 }
    }

    /// Links `child` under `parent`, creating both frames if needed.
    ///
    /// A refused edge leaves the registry untouched, no frame is created for it.
    pub fn set_parent(
        &mut self,
        parent: &str,
        child: &str,
        policy: ReparentPolicy,
    ) -> TransformResult<ParentChange> {
        if parent == child {
            return Err(TransformError::CyclicTransformTree {
                parent: parent.into(),
                child: child.into(),
            });
        }

        let known_parent = self.frame_indices.get(parent).copied();
        let known_child = self.frame_indices.get(child).copied();
        let previous = known_child.and_then(|idx| self.parent_index(idx));

        if let (Some(parent_idx), Some(child_idx)) = (known_parent, known_child) {
            if previous == Some(parent_idx) {
                return Ok(ParentChange::Unchanged);
            }
            if has_path_connecting(&self.graph, child_idx, parent_idx, None) {
                return Err(TransformError::CyclicTransformTree {
                    parent: parent.into(),
                    child: child.into(),
                });
            }
        }
        if let (Some(previous_idx), ReparentPolicy::Reject) = (previous, policy) {
            return Err(TransformError::AmbiguousReparent {
                child: child.into(),
                previous: self.graph[previous_idx].clone(),
                requested: parent.into(),
            });
        }

        let parent_idx = self.add_frame(parent);
        let child_idx = self.add_frame(child);
        let change = match previous {
            None => ParentChange::Attached,
            Some(previous_idx) => {
                if let Some(edge) = self.graph.find_edge(previous_idx, child_idx) {
                    self.graph.remove_edge(edge);
                }
                ParentChange::Reparented {
                    previous: self.graph[previous_idx].clone(),
                }
            }
        };
        self.graph.add_edge(parent_idx, child_idx, ());
        Ok(change)
    }

    /// The frame itself followed by all its ancestors up to its root.
    ///
    /// The walk is bounded by the frame count so a malformed graph cannot loop forever.
    pub fn ancestor_chain(&self, idx: NodeIndex) -> TransformResult<Vec<NodeIndex>> {
        let mut chain = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.parent_index(current) {
            if chain.len() > self.graph.node_count() {
                return Err(TransformError::CyclicTransformTree {
                    parent: self.graph[parent].clone(),
                    child: self.graph[current].clone(),
                });
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    pub fn root_of(&self, frame_id: &str) -> TransformResult<FrameIdString> {
        let idx = self.index_of(frame_id)?;
        let chain = self.ancestor_chain(idx)?;
        let root = chain.last().copied().unwrap_or(idx);
        Ok(self.graph[root].clone())
    }

    fn sorted_children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        children
    }

    fn sorted_roots(&self) -> Vec<NodeIndex> {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| self.parent_index(*idx).is_none())
            .collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        roots
    }

    /// Depth-first listing of every tree, roots and siblings sorted by name.
    pub fn frame_list(&self) -> Vec<FrameEntry> {
        let mut entries = Vec::with_capacity(self.graph.node_count());
        let mut visited = HashSet::with_capacity(self.graph.node_count());
        for root in self.sorted_roots() {
            let mut stack = vec![(root, 0usize)];
            while let Some((idx, depth)) = stack.pop() {
                if !visited.insert(idx) {
                    continue;
                }
                entries.push(FrameEntry {
                    id: self.graph[idx].clone(),
                    parent: self.parent_index(idx).map(|p| self.graph[p].clone()),
                    depth,
                });
                // reversed so the smallest name is popped first
                for child in self.sorted_children(idx).into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        entries
    }

    fn descendant_count(&self, idx: NodeIndex) -> usize {
        let mut count = 0;
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            count += 1;
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
        }
        count
    }

    /// The frame a scene should be rendered in when the user has not picked one.
    pub fn default_render_frame(&self) -> Option<FrameIdString> {
        let roots = self.sorted_roots();
        for preferred in PREFERRED_ROOT_FRAMES {
            if let Some(root) = roots.iter().find(|idx| self.graph[**idx] == preferred) {
                return Some(self.graph[*root].clone());
            }
        }
        // sorted_roots is name ordered, max_by_key keeps the last maximum so walk it reversed
        roots
            .iter()
            .rev()
            .max_by_key(|idx| self.descendant_count(**idx))
            .map(|idx| self.graph[*idx].clone())
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.frame_indices.clear();
        self.snapshot.get_mut().take();
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
