//! Interface to the external, mutable scene graph.
//!
//! The graph owns its nodes. Adapters hold [`NodeHandle`]s and [`DagPath`]s
//! but never own what they refer to; every query is point-in-time and may
//! observe a graph that has been edited since the handle was obtained.
//!
//! # Subscriptions
//!
//! Watches are registered with an explicit context struct
//! ([`Subscription`]) instead of an opaque client pointer: the graph stores
//! the `owner` path and the [`CallbackKind`] and echoes both back in every
//! [`Notification`]. The owner of the subscriptions (the scene delegate)
//! dispatches notifications on those two fields.
//!
//! Notifications are queued by the graph and handed out through
//! [`SceneGraph::take_notifications`]. A host may deliver them before the
//! edit that caused them has been committed, so handlers must not rely on
//! reading the post-edit state.

use std::fmt;

use scenelink_core::ScenePath;
use scenelink_core::bounds::Aabb;
use scenelink_core::math::Mat4;

use crate::error::GraphError;

/// Well-known attribute names reported in [`Notification::attribute`].
pub mod attributes {
    /// Node visibility toggle.
    pub const VISIBILITY: &str = "visibility";
    /// Local transformation matrix.
    pub const MATRIX: &str = "matrix";
    /// Point positions of a shape.
    pub const POINTS: &str = "points";
    /// Face vertex counts of a mesh shape.
    pub const FACE_VERTEX_COUNTS: &str = "faceVertexCounts";
    /// Face vertex indices of a mesh shape.
    pub const FACE_VERTEX_INDICES: &str = "faceVertexIndices";
    /// Bounding box of a shape.
    pub const BOUNDS: &str = "boundingBox";
}

/// Opaque reference to a node in the external graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Wraps a raw graph-defined identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle(#{})", self.0)
    }
}

/// Classification of graph nodes relevant to adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Pure transform; contributes to inclusive transforms, never adapted.
    Transform,
    /// Geometry-carrying leaf adapted as a shape prim.
    Shape,
    /// Transform-only leaf adapted without shape data.
    Locator,
}

/// A root-to-node sequence of handles identifying one placement of a node.
///
/// A node reachable through several parents has one `DagPath` per
/// placement; the graph enumerates them with [`SceneGraph::all_paths_to`].
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct DagPath {
    nodes: Vec<NodeHandle>,
}

impl DagPath {
    /// Creates a path from root-first handles.
    pub fn new(nodes: Vec<NodeHandle>) -> Self {
        Self { nodes }
    }

    /// Root-first handles.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// The node this path ends at.
    pub fn node(&self) -> Option<NodeHandle> {
        self.nodes.last().copied()
    }

    /// Number of nodes in the path.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the path has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Removes and returns the last node.
    pub fn pop(&mut self) -> Option<NodeHandle> {
        self.nodes.pop()
    }

    /// The path with its last node removed.
    pub fn parent(&self) -> DagPath {
        let mut parent = self.clone();
        parent.pop();
        parent
    }

    /// The path extended by `node`.
    pub fn child(&self, node: NodeHandle) -> DagPath {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Self { nodes }
    }

    /// This path followed by each successive parent, down to length 1.
    pub fn ancestors(&self) -> impl Iterator<Item = DagPath> + '_ {
        (1..=self.nodes.len())
            .rev()
            .map(move |len| DagPath::new(self.nodes[..len].to_vec()))
    }
}

impl fmt::Debug for DagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DagPath(")?;
        for node in &self.nodes {
            write!(f, "|{}", node.0)?;
        }
        f.write_str(")")
    }
}

/// Handler selected when a subscription fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// An attribute on the prim's node or one of its ancestors was dirtied.
    TransformNodeDirty,
    /// A parent was added to or removed from a watched path.
    HierarchyChanged,
    /// The watched node or a watched ancestor is about to be removed.
    AncestorPreRemoval,
    /// An intermediate transform of an instance placement was dirtied.
    InstancerNodeDirty,
    /// The transform above one instance placement is about to be removed.
    InstancerNodePreRemoval,
    /// The transform above the canonical placement is about to be removed.
    MasterNodePreRemoval,
    /// A geometry attribute of a shape node was dirtied.
    ShapeGeometryDirty,
}

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Watch {
    /// Any attribute-dirty event on the node.
    NodeDirty(NodeHandle),
    /// Parent added to (or removed from) the node at the end of the path.
    ParentAdded(DagPath),
    /// The node is about to be removed from the graph.
    PreRemoval(NodeHandle),
}

impl Watch {
    /// The node the watch is attached to.
    pub fn node(&self) -> Option<NodeHandle> {
        match self {
            Watch::NodeDirty(node) | Watch::PreRemoval(node) => Some(*node),
            Watch::ParentAdded(path) => path.node(),
        }
    }
}

/// Registration request for a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Path of the adapter that owns the subscription.
    pub owner: ScenePath,
    /// Handler to dispatch to.
    pub callback: CallbackKind,
    /// What to watch.
    pub watch: Watch,
}

/// Releasable handle returned by [`SceneGraph::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Wraps a raw graph-defined identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A fired subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Token of the subscription that fired.
    pub token: SubscriptionToken,
    /// Owner path given at registration.
    pub owner: ScenePath,
    /// Handler given at registration.
    pub callback: CallbackKind,
    /// Node the event happened on.
    pub source: NodeHandle,
    /// Dirtied attribute, for attribute-dirty events.
    pub attribute: Option<String>,
}

impl Notification {
    /// Returns `true` if this is an attribute-dirty event on `name`.
    pub fn is_attribute(&self, name: &str) -> bool {
        self.attribute.as_deref() == Some(name)
    }
}

/// Point-in-time queries and subscriptions on an external scene graph.
///
/// Queries on stale handles or invalid paths return safe defaults (`None`,
/// `false`, empty) rather than errors.
pub trait SceneGraph {
    // --- Queries ---

    /// Kind of the node, `None` if the node no longer exists.
    fn node_kind(&self, node: NodeHandle) -> Option<NodeKind>;

    /// Name of the node, `None` if the node no longer exists.
    fn node_name(&self, node: NodeHandle) -> Option<&str>;

    /// Every path in the graph, depth-first from the roots.
    fn dag_paths(&self) -> Vec<DagPath>;

    /// Every path reaching `node`, in graph-defined order. Index 0 is the
    /// canonical placement. Empty if the node no longer exists.
    fn all_paths_to(&self, node: NodeHandle) -> Vec<DagPath>;

    /// Whether the path still describes a live root-to-node chain.
    fn is_valid(&self, path: &DagPath) -> bool;

    /// Whether every node along the path is visible. `false` for invalid
    /// paths.
    fn is_visible(&self, path: &DagPath) -> bool;

    /// Product of the local transforms along the path, evaluated
    /// `time_offset` time-steps from the current time. `None` for invalid
    /// paths.
    fn inclusive_transform(&self, path: &DagPath, time_offset: f64) -> Option<Mat4>;

    /// Object-space bounds of a shape node.
    fn bounds(&self, node: NodeHandle) -> Option<Aabb>;

    // --- Subscriptions ---

    /// Registers a watch. The graph may refuse.
    fn subscribe(&mut self, subscription: Subscription) -> Result<SubscriptionToken, GraphError>;

    /// Releases watches. Unknown or already released tokens are ignored.
    fn release(&mut self, tokens: &[SubscriptionToken]);

    /// Takes every notification queued since the last call.
    fn take_notifications(&mut self) -> Vec<Notification>;

    // --- Provided ---

    /// Position of `path` among [`all_paths_to`](Self::all_paths_to) its node.
    fn instance_number(&self, path: &DagPath) -> Option<usize> {
        let node = path.node()?;
        self.all_paths_to(node).iter().position(|p| p == path)
    }

    /// Whether the node at the end of `path` is reachable by more than one
    /// path.
    fn is_instanced(&self, path: &DagPath) -> bool {
        path.node()
            .is_some_and(|node| self.all_paths_to(node).len() > 1)
    }

    /// The path to the nearest non-shape node at or above the end of `path`.
    fn transform_path(&self, path: &DagPath) -> DagPath {
        let mut out = path.clone();
        while let Some(node) = out.node() {
            if self.node_kind(node) != Some(NodeKind::Shape) {
                break;
            }
            out.pop();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u64) -> NodeHandle {
        NodeHandle::from_raw(raw)
    }

    #[test]
    fn dag_path_navigation() {
        let path = DagPath::new(vec![n(1), n(2), n(3)]);
        assert_eq!(path.node(), Some(n(3)));
        assert_eq!(path.parent().node(), Some(n(2)));
        assert_eq!(path.parent().child(n(9)).nodes(), &[n(1), n(2), n(9)]);
        assert!(DagPath::default().node().is_none());
    }

    #[test]
    fn ancestors_walk_to_root() {
        let path = DagPath::new(vec![n(1), n(2), n(3)]);
        let ends: Vec<_> = path.ancestors().map(|p| p.node().unwrap()).collect();
        assert_eq!(ends, vec![n(3), n(2), n(1)]);
        assert_eq!(DagPath::default().ancestors().count(), 0);
    }

    #[test]
    fn watch_node() {
        assert_eq!(Watch::NodeDirty(n(4)).node(), Some(n(4)));
        assert_eq!(
            Watch::ParentAdded(DagPath::new(vec![n(1), n(5)])).node(),
            Some(n(5))
        );
        assert_eq!(Watch::ParentAdded(DagPath::default()).node(), None);
    }

    #[test]
    fn debug_formats() {
        assert_eq!(format!("{:?}", DagPath::new(vec![n(1), n(2)])), "DagPath(|1|2)");
        assert_eq!(n(5).to_string(), "#5");
    }
}
