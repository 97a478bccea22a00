use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};

use scenelink_core::bounds::Aabb;
use scenelink_core::math::Mat4;

use crate::error::GraphError;
use crate::graph::{
    DagPath, NodeHandle, NodeKind, Notification, SceneGraph, Subscription, SubscriptionToken,
    Watch, attributes,
};

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    kind: NodeKind,
    parents: Vec<NodeHandle>,
    children: Vec<NodeHandle>,
    visible: bool,
    local: Mat4,
    /// Local transform one time-step ahead, if animated.
    next_local: Option<Mat4>,
    bounds: Option<Aabb>,
}

impl NodeData {
    fn local_at(&self, time_offset: f64) -> Mat4 {
        match self.next_local {
            Some(next) if time_offset > 0.0 => {
                let t = time_offset.min(1.0) as f32;
                self.local + (next - self.local) * t
            }
            _ => self.local,
        }
    }
}

#[derive(Debug, Clone)]
enum Edit {
    Visibility(NodeHandle, bool),
    LocalTransform(NodeHandle, Mat4),
    MotionTransform(NodeHandle, Option<Mat4>),
    Bounds(NodeHandle, Option<Aabb>),
    AddParent { node: NodeHandle, parent: NodeHandle },
    RemoveParent { node: NodeHandle, parent: NodeHandle },
    Reparent { node: NodeHandle, parent: Option<NodeHandle> },
    Delete(NodeHandle),
}

/// In-memory scene graph for tests, benchmarks and embedding.
///
/// Nodes may have several parents, which makes them instanced: every
/// root-to-node chain is a separate placement.
///
/// # Two-phase edits
///
/// Creating nodes (`add_*`) takes effect immediately and notifies nobody;
/// adapters discover nodes by enumeration. Every other mutation is staged:
/// it queues the notifications it causes right away, but the graph state
/// only changes on [`commit`](Self::commit). Handlers that run between the
/// two therefore see the pre-edit state, as they would inside a host's
/// callback delivery.
///
/// ```ignore
/// let mut graph = MemoryGraph::new();
/// let xform = graph.add_transform("pCube1", None);
/// let shape = graph.add_shape("pCubeShape1", xform);
///
/// graph.set_visibility(xform, false); // queues notifications
/// delegate.pump(&mut graph);          // handlers see the old state
/// graph.commit();                     // edit lands
/// delegate.on_idle(&mut graph);       // recreations see the new state
/// ```
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: BTreeMap<NodeHandle, NodeData>,
    roots: Vec<NodeHandle>,
    next_node: u64,
    subscriptions: BTreeMap<SubscriptionToken, Subscription>,
    next_token: u64,
    pending: Vec<Notification>,
    staged: Vec<Edit>,
    stale_paths: HashSet<DagPath>,
    refused: HashSet<NodeHandle>,
    transform_queries: Cell<usize>,
    visibility_queries: Cell<usize>,
    path_queries: Cell<usize>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Construction (immediate) ---

    /// Adds a node under `parent`, or as a root.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        parent: Option<NodeHandle>,
    ) -> NodeHandle {
        self.next_node += 1;
        let handle = NodeHandle::from_raw(self.next_node);
        let parents = match parent {
            Some(p) if self.nodes.contains_key(&p) => vec![p],
            Some(p) => {
                log::warn!("Parent {p} does not exist; adding {handle} as a root");
                Vec::new()
            }
            None => Vec::new(),
        };
        for p in &parents {
            if let Some(data) = self.nodes.get_mut(p) {
                data.children.push(handle);
            }
        }
        if parents.is_empty() {
            self.roots.push(handle);
        }
        self.nodes.insert(
            handle,
            NodeData {
                name: name.into(),
                kind,
                parents,
                children: Vec::new(),
                visible: true,
                local: Mat4::identity(),
                next_local: None,
                bounds: None,
            },
        );
        handle
    }

    /// Adds a transform node.
    pub fn add_transform(&mut self, name: impl Into<String>, parent: Option<NodeHandle>) -> NodeHandle {
        self.add_node(name, NodeKind::Transform, parent)
    }

    /// Adds a shape node under `parent` with unit bounds.
    pub fn add_shape(&mut self, name: impl Into<String>, parent: NodeHandle) -> NodeHandle {
        let handle = self.add_node(name, NodeKind::Shape, Some(parent));
        if let Some(data) = self.nodes.get_mut(&handle) {
            data.bounds = Some(Aabb::UNIT);
        }
        handle
    }

    /// Adds a locator node under `parent`.
    pub fn add_locator(&mut self, name: impl Into<String>, parent: NodeHandle) -> NodeHandle {
        self.add_node(name, NodeKind::Locator, Some(parent))
    }

    // --- Staged edits ---

    /// Toggles node visibility.
    pub fn set_visibility(&mut self, node: NodeHandle, visible: bool) {
        self.notify_dirty(node, attributes::VISIBILITY);
        self.staged.push(Edit::Visibility(node, visible));
    }

    /// Sets the node's local transform at the current time.
    pub fn set_local_transform(&mut self, node: NodeHandle, local: Mat4) {
        self.notify_dirty(node, attributes::MATRIX);
        self.staged.push(Edit::LocalTransform(node, local));
    }

    /// Sets (or clears) the node's local transform one time-step ahead.
    pub fn set_motion_transform(&mut self, node: NodeHandle, next: Option<Mat4>) {
        self.notify_dirty(node, attributes::MATRIX);
        self.staged.push(Edit::MotionTransform(node, next));
    }

    /// Replaces a shape's bounds, as a point edit would.
    pub fn set_bounds(&mut self, node: NodeHandle, bounds: Option<Aabb>) {
        self.notify_dirty(node, attributes::POINTS);
        self.staged.push(Edit::Bounds(node, bounds));
    }

    /// Dirties an arbitrary attribute without changing any state.
    pub fn touch_attribute(&mut self, node: NodeHandle, attribute: &str) {
        self.notify_dirty(node, attribute);
    }

    /// Adds `parent` as an additional parent of `node` (instancing).
    pub fn add_parent(&mut self, node: NodeHandle, parent: NodeHandle) {
        self.notify_hierarchy(node);
        self.staged.push(Edit::AddParent { node, parent });
    }

    /// Removes one parent of `node`. A node left without parents becomes a
    /// root.
    pub fn remove_parent(&mut self, node: NodeHandle, parent: NodeHandle) {
        self.notify_hierarchy(node);
        self.staged.push(Edit::RemoveParent { node, parent });
    }

    /// Replaces every parent of `node` with `parent` (or makes it a root).
    pub fn reparent(&mut self, node: NodeHandle, parent: Option<NodeHandle>) {
        self.notify_hierarchy(node);
        self.staged.push(Edit::Reparent { node, parent });
    }

    /// Deletes `node` together with every descendant that has no surviving
    /// parent. Descendants reachable through other parents survive and see
    /// a hierarchy change.
    pub fn delete(&mut self, node: NodeHandle) {
        let doomed = self.doomed_by(node);
        for d in &doomed {
            self.notify_pre_removal(*d);
        }
        let survivors: Vec<NodeHandle> = doomed
            .iter()
            .filter_map(|d| self.nodes.get(d))
            .flat_map(|data| data.children.iter().copied())
            .filter(|c| !doomed.contains(c))
            .collect();
        for child in survivors {
            self.notify_hierarchy(child);
        }
        self.staged.push(Edit::Delete(node));
    }

    /// Applies every staged edit in order. Returns how many were applied.
    pub fn commit(&mut self) -> usize {
        let edits = std::mem::take(&mut self.staged);
        let count = edits.len();
        for edit in edits {
            self.apply(edit);
        }
        count
    }

    /// Number of edits waiting for [`commit`](Self::commit).
    pub fn staged_edits(&self) -> usize {
        self.staged.len()
    }

    // --- Test hooks ---

    /// Makes `path` report invalid while it is still enumerated.
    pub fn mark_stale(&mut self, path: DagPath) {
        self.stale_paths.insert(path);
    }

    /// Makes every future watch on `node` fail.
    pub fn refuse_watches(&mut self, node: NodeHandle) {
        self.refused.insert(node);
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of live subscriptions registered by `owner`.
    pub fn subscriptions_owned_by(&self, owner: &scenelink_core::ScenePath) -> usize {
        self.subscriptions
            .values()
            .filter(|s| &s.owner == owner)
            .count()
    }

    /// Number of notifications waiting to be taken.
    pub fn pending_notifications(&self) -> usize {
        self.pending.len()
    }

    /// Number of [`inclusive_transform`](SceneGraph::inclusive_transform)
    /// queries answered so far.
    pub fn transform_queries(&self) -> usize {
        self.transform_queries.get()
    }

    /// Number of [`is_visible`](SceneGraph::is_visible) queries answered so
    /// far.
    pub fn visibility_queries(&self) -> usize {
        self.visibility_queries.get()
    }

    /// Number of [`all_paths_to`](SceneGraph::all_paths_to) queries answered
    /// so far.
    pub fn path_queries(&self) -> usize {
        self.path_queries.get()
    }

    /// Resets every query counter.
    pub fn reset_counters(&self) {
        self.transform_queries.set(0);
        self.visibility_queries.set(0);
        self.path_queries.set(0);
    }

    /// Returns `true` if the node currently exists.
    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    // --- Internals ---

    fn notify(&mut self, source: NodeHandle, attribute: Option<&str>, matches: impl Fn(&Watch) -> bool) {
        for (token, sub) in &self.subscriptions {
            if matches(&sub.watch) {
                self.pending.push(Notification {
                    token: *token,
                    owner: sub.owner.clone(),
                    callback: sub.callback,
                    source,
                    attribute: attribute.map(str::to_owned),
                });
            }
        }
    }

    fn notify_dirty(&mut self, node: NodeHandle, attribute: &str) {
        self.notify(node, Some(attribute), |w| *w == Watch::NodeDirty(node));
    }

    fn notify_hierarchy(&mut self, node: NodeHandle) {
        self.notify(node, None, |w| {
            matches!(w, Watch::ParentAdded(path) if path.node() == Some(node))
        });
    }

    fn notify_pre_removal(&mut self, node: NodeHandle) {
        self.notify(node, None, |w| *w == Watch::PreRemoval(node));
    }

    /// `node` plus every descendant whose parents are all doomed.
    fn doomed_by(&self, node: NodeHandle) -> Vec<NodeHandle> {
        if !self.nodes.contains_key(&node) {
            return Vec::new();
        }
        let mut doomed = vec![node];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor];
            cursor += 1;
            let Some(data) = self.nodes.get(&current) else {
                continue;
            };
            for child in &data.children {
                if doomed.contains(child) {
                    continue;
                }
                let orphaned = self
                    .nodes
                    .get(child)
                    .is_some_and(|c| c.parents.iter().all(|p| doomed.contains(p)));
                if orphaned {
                    doomed.push(*child);
                }
            }
        }
        doomed
    }

    fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut stack = vec![node];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(data) = self.nodes.get(&current) {
                stack.extend(data.parents.iter().copied());
            }
        }
        false
    }

    fn link(&mut self, node: NodeHandle, parent: NodeHandle) {
        if !self.nodes.contains_key(&node) || !self.nodes.contains_key(&parent) {
            log::warn!("Cannot parent {node} under {parent}: node missing");
            return;
        }
        if self.is_ancestor(node, parent) {
            log::warn!("Cannot parent {node} under {parent}: would create a cycle");
            return;
        }
        if let Some(data) = self.nodes.get_mut(&node) {
            if data.parents.contains(&parent) {
                return;
            }
            data.parents.push(parent);
        }
        if let Some(data) = self.nodes.get_mut(&parent) {
            data.children.push(node);
        }
        self.roots.retain(|r| *r != node);
    }

    fn unlink(&mut self, node: NodeHandle, parent: NodeHandle) {
        if let Some(data) = self.nodes.get_mut(&parent) {
            data.children.retain(|c| *c != node);
        }
        let orphaned = match self.nodes.get_mut(&node) {
            Some(data) => {
                data.parents.retain(|p| *p != parent);
                data.parents.is_empty()
            }
            None => false,
        };
        if orphaned && !self.roots.contains(&node) {
            self.roots.push(node);
        }
    }

    fn apply(&mut self, edit: Edit) {
        match edit {
            Edit::Visibility(node, visible) => {
                if let Some(data) = self.nodes.get_mut(&node) {
                    data.visible = visible;
                }
            }
            Edit::LocalTransform(node, local) => {
                if let Some(data) = self.nodes.get_mut(&node) {
                    data.local = local;
                }
            }
            Edit::MotionTransform(node, next) => {
                if let Some(data) = self.nodes.get_mut(&node) {
                    data.next_local = next;
                }
            }
            Edit::Bounds(node, bounds) => {
                if let Some(data) = self.nodes.get_mut(&node) {
                    data.bounds = bounds;
                }
            }
            Edit::AddParent { node, parent } => self.link(node, parent),
            Edit::RemoveParent { node, parent } => self.unlink(node, parent),
            Edit::Reparent { node, parent } => {
                let old: Vec<NodeHandle> = self
                    .nodes
                    .get(&node)
                    .map(|d| d.parents.clone())
                    .unwrap_or_default();
                for p in old {
                    self.unlink(node, p);
                }
                if let Some(p) = parent {
                    self.link(node, p);
                }
            }
            Edit::Delete(node) => {
                let doomed = self.doomed_by(node);
                for d in &doomed {
                    let Some(data) = self.nodes.get(d) else {
                        continue;
                    };
                    let (parents, children) = (data.parents.clone(), data.children.clone());
                    for p in parents {
                        if let Some(pd) = self.nodes.get_mut(&p) {
                            pd.children.retain(|c| c != d);
                        }
                    }
                    for c in children.into_iter().filter(|c| !doomed.contains(c)) {
                        self.unlink(c, *d);
                    }
                }
                for d in &doomed {
                    self.nodes.remove(d);
                    self.refused.remove(d);
                }
                self.roots.retain(|r| !doomed.contains(r));
            }
        }
    }

    fn collect_paths(&self, node: NodeHandle, out: &mut Vec<DagPath>) {
        let Some(data) = self.nodes.get(&node) else {
            return;
        };
        if data.parents.is_empty() {
            out.push(DagPath::new(vec![node]));
            return;
        }
        for parent in &data.parents {
            let mut above = Vec::new();
            self.collect_paths(*parent, &mut above);
            out.extend(above.into_iter().map(|p| p.child(node)));
        }
    }

    fn walk(&self, path: DagPath, out: &mut Vec<DagPath>) {
        let Some(data) = path.node().and_then(|n| self.nodes.get(&n)) else {
            return;
        };
        let children = data.children.clone();
        out.push(path.clone());
        for child in children {
            self.walk(path.child(child), out);
        }
    }
}

impl SceneGraph for MemoryGraph {
    fn node_kind(&self, node: NodeHandle) -> Option<NodeKind> {
        self.nodes.get(&node).map(|d| d.kind)
    }

    fn node_name(&self, node: NodeHandle) -> Option<&str> {
        self.nodes.get(&node).map(|d| d.name.as_str())
    }

    fn dag_paths(&self) -> Vec<DagPath> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.walk(DagPath::new(vec![*root]), &mut out);
        }
        out
    }

    fn all_paths_to(&self, node: NodeHandle) -> Vec<DagPath> {
        self.path_queries.set(self.path_queries.get() + 1);
        let mut out = Vec::new();
        self.collect_paths(node, &mut out);
        out
    }

    fn is_valid(&self, path: &DagPath) -> bool {
        if path.is_empty() || self.stale_paths.contains(path) {
            return false;
        }
        let nodes = path.nodes();
        let root_ok = self
            .nodes
            .get(&nodes[0])
            .is_some_and(|d| d.parents.is_empty());
        root_ok
            && nodes.windows(2).all(|pair| {
                self.nodes
                    .get(&pair[1])
                    .is_some_and(|d| d.parents.contains(&pair[0]))
            })
    }

    fn is_visible(&self, path: &DagPath) -> bool {
        self.visibility_queries.set(self.visibility_queries.get() + 1);
        self.is_valid(path)
            && path
                .nodes()
                .iter()
                .all(|n| self.nodes.get(n).is_some_and(|d| d.visible))
    }

    fn inclusive_transform(&self, path: &DagPath, time_offset: f64) -> Option<Mat4> {
        self.transform_queries.set(self.transform_queries.get() + 1);
        if !self.is_valid(path) {
            return None;
        }
        path.nodes().iter().try_fold(Mat4::identity(), |acc, n| {
            self.nodes.get(n).map(|d| acc * d.local_at(time_offset))
        })
    }

    fn bounds(&self, node: NodeHandle) -> Option<Aabb> {
        self.nodes.get(&node).and_then(|d| d.bounds)
    }

    fn subscribe(&mut self, subscription: Subscription) -> Result<SubscriptionToken, GraphError> {
        let node = subscription
            .watch
            .node()
            .ok_or_else(|| GraphError::WatchRefused {
                node: NodeHandle::from_raw(0),
                reason: "empty path".into(),
            })?;
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::StaleNode(node));
        }
        if self.refused.contains(&node) {
            return Err(GraphError::WatchRefused {
                node,
                reason: "watches refused".into(),
            });
        }
        self.next_token += 1;
        let token = SubscriptionToken::from_raw(self.next_token);
        self.subscriptions.insert(token, subscription);
        Ok(token)
    }

    fn release(&mut self, tokens: &[SubscriptionToken]) {
        for token in tokens {
            self.subscriptions.remove(token);
        }
        self.pending.retain(|n| !tokens.contains(&n.token));
    }

    fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}
