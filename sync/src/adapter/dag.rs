//! The shared adapter state machine.

use scenelink_core::bounds::Aabb;
use scenelink_core::math::Mat4;
use scenelink_core::{ScenePath, profile_function};

use super::{AdapterKind, SyncContext};
use crate::callbacks::{self, Reaction};
use crate::dirty::DirtyBits;
use crate::error::SyncError;
use crate::graph::{
    CallbackKind, DagPath, NodeHandle, Notification, SceneGraph, Subscription, SubscriptionToken,
    Watch,
};
use crate::instancing::{self, Interpolation, PrimvarDescriptor};
use crate::lifecycle::LifecycleState;
use crate::params::DelegateParams;
use crate::propagator;
use crate::render_index::{PrimType, RenderIndex};

/// Binds one graph node, reached through one dag path, to one prim in the
/// render index.
///
/// Transform and visibility are cached and only re-read from the graph
/// when a notification has invalidated them and a consumer asks. The
/// adapter owns its subscriptions; [`remove_callbacks`](Self::remove_callbacks)
/// releases all of them in one call.
///
/// An adapter built on instance 0 of a multiply-parented node is
/// *instanced*: its prim carries identity transforms and an instancer
/// entity at [`get_instancer_id`](Self::get_instancer_id) supplies one
/// transform per visible placement.
#[derive(Debug)]
pub struct DagAdapter {
    id: ScenePath,
    dag_path: DagPath,
    node: NodeHandle,
    kind: AdapterKind,
    tokens: Vec<SubscriptionToken>,
    /// Inclusive transform now and one time-step ahead.
    transform: [Mat4; 2],
    invalid_transform: bool,
    is_visible: bool,
    visibility_dirty: bool,
    is_instanced: bool,
    is_populated: bool,
    state: LifecycleState,
}

impl DagAdapter {
    /// Builds an adapter for the node at the end of `dag_path`.
    ///
    /// Reads the initial visibility and instancing from the graph. No
    /// subscriptions are made until [`create_callbacks`](Self::create_callbacks).
    pub fn new(
        id: ScenePath,
        dag_path: DagPath,
        graph: &dyn SceneGraph,
        kind: AdapterKind,
    ) -> Result<Self, SyncError> {
        let node = dag_path.node().ok_or(SyncError::EmptyDagPath)?;
        let is_visible = graph.is_visible(&dag_path);
        let is_instanced =
            graph.is_instanced(&dag_path) && graph.instance_number(&dag_path) == Some(0);
        Ok(Self {
            id,
            dag_path,
            node,
            kind,
            tokens: Vec::new(),
            transform: [Mat4::identity(); 2],
            invalid_transform: true,
            is_visible,
            visibility_dirty: false,
            is_instanced,
            is_populated: false,
            state: LifecycleState::Active,
        })
    }

    // --- Accessors ---

    pub fn id(&self) -> &ScenePath {
        &self.id
    }

    pub fn dag_path(&self) -> &DagPath {
        &self.dag_path
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn kind(&self) -> &AdapterKind {
        &self.kind
    }

    pub fn prim_type(&self) -> PrimType {
        self.kind.prim_type()
    }

    /// Live subscription tokens, in registration order.
    pub fn tokens(&self) -> &[SubscriptionToken] {
        &self.tokens
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    pub fn is_populated(&self) -> bool {
        self.is_populated
    }

    pub fn is_instanced(&self) -> bool {
        self.is_instanced
    }

    /// Whether the next transform query re-reads the graph.
    pub fn is_transform_dirty(&self) -> bool {
        self.invalid_transform
    }

    pub fn is_visibility_dirty(&self) -> bool {
        self.visibility_dirty
    }

    // --- Subscriptions ---

    /// Registers every watch this adapter needs. Watches the graph refuses
    /// are skipped.
    pub fn create_callbacks(&mut self, graph: &mut dyn SceneGraph) {
        if self.is_instanced {
            log::debug!("Creating instanced dag adapter callbacks for prim {}", self.id);
            let master = graph.transform_path(&self.dag_path);
            if let Some(node) = master.node() {
                self.add_callback(graph, CallbackKind::MasterNodePreRemoval, Watch::PreRemoval(node));
            }
            // Losing an instance parent only shows up on the node itself.
            self.add_callback(
                graph,
                CallbackKind::HierarchyChanged,
                Watch::ParentAdded(self.dag_path.clone()),
            );
            for path in graph.all_paths_to(self.node) {
                let placement = path.parent();
                let Some(parent) = placement.node() else {
                    continue;
                };
                self.add_callback(
                    graph,
                    CallbackKind::InstancerNodePreRemoval,
                    Watch::PreRemoval(parent),
                );
                for ancestor in placement.ancestors() {
                    let Some(node) = ancestor.node() else {
                        continue;
                    };
                    self.add_callback(graph, CallbackKind::InstancerNodeDirty, Watch::NodeDirty(node));
                    self.add_callback(graph, CallbackKind::HierarchyChanged, Watch::ParentAdded(ancestor));
                }
            }
            self.add_callback(graph, CallbackKind::AncestorPreRemoval, Watch::PreRemoval(self.node));
        } else {
            log::debug!("Creating non-instanced dag adapter callbacks for prim {}", self.id);
            let ancestors: Vec<DagPath> = self.dag_path.ancestors().collect();
            for ancestor in ancestors {
                let Some(node) = ancestor.node() else {
                    continue;
                };
                self.add_callback(graph, CallbackKind::TransformNodeDirty, Watch::NodeDirty(node));
                self.add_callback(graph, CallbackKind::HierarchyChanged, Watch::ParentAdded(ancestor));
                self.add_callback(graph, CallbackKind::AncestorPreRemoval, Watch::PreRemoval(node));
            }
        }
        if matches!(self.kind, AdapterKind::Shape(_)) {
            self.add_callback(graph, CallbackKind::ShapeGeometryDirty, Watch::NodeDirty(self.node));
        }
    }

    fn add_callback(&mut self, graph: &mut dyn SceneGraph, callback: CallbackKind, watch: Watch) {
        let description = format!("{watch:?}");
        let subscription = Subscription {
            owner: self.id.clone(),
            callback,
            watch,
        };
        match graph.subscribe(subscription) {
            Ok(token) => {
                log::trace!("- Added {callback:?} callback for {description}");
                self.tokens.push(token);
            }
            Err(e) => log::warn!("{}: {callback:?} not registered: {e}", self.id),
        }
    }

    /// Releases every subscription. Safe to call repeatedly.
    pub fn remove_callbacks(&mut self, graph: &mut dyn SceneGraph) {
        if self.tokens.is_empty() {
            return;
        }
        log::debug!("Removing {} callbacks of {}", self.tokens.len(), self.id);
        graph.release(&self.tokens);
        self.tokens.clear();
    }

    /// Releases subscriptions and prims for good. The adapter ends
    /// [`Removed`](LifecycleState::Removed) and ignores any later
    /// notification.
    pub fn teardown(&mut self, graph: &mut dyn SceneGraph, index: &mut dyn RenderIndex) {
        self.remove_callbacks(graph);
        self.remove_prim(index);
        self.state = LifecycleState::Removed;
    }

    // --- Transform ---

    /// Cached transform at the current time, re-read from the graph only if
    /// a notification invalidated it.
    pub fn get_transform(&mut self, graph: &dyn SceneGraph, params: &DelegateParams) -> Mat4 {
        log::trace!("get_transform {}", self.id);
        self.calculate_transform(graph, params);
        self.transform[0]
    }

    /// Writes up to `max_samples` (time, transform) pairs, bounded by the
    /// output slices. Returns how many were written: 0, 1, or 2 when motion
    /// samples are enabled.
    pub fn sample_transform(
        &mut self,
        graph: &dyn SceneGraph,
        params: &DelegateParams,
        max_samples: usize,
        times: &mut [f32],
        samples: &mut [Mat4],
    ) -> usize {
        self.calculate_transform(graph, params);
        let max_samples = max_samples.min(times.len()).min(samples.len());
        if max_samples < 1 {
            return 0;
        }
        times[0] = 0.0;
        samples[0] = self.transform[0];
        if max_samples == 1 || !params.enable_motion_samples {
            return 1;
        }
        times[1] = 1.0;
        samples[1] = self.transform[1];
        2
    }

    fn calculate_transform(&mut self, graph: &dyn SceneGraph, params: &DelegateParams) {
        if !self.invalid_transform {
            return;
        }
        profile_function!();
        if self.is_instanced {
            self.transform = [Mat4::identity(); 2];
        } else {
            let now = graph
                .inclusive_transform(&self.dag_path, 0.0)
                .unwrap_or_else(|| {
                    log::trace!("{} has no valid path; using identity", self.id);
                    Mat4::identity()
                });
            let next = if params.enable_motion_samples {
                graph.inclusive_transform(&self.dag_path, 1.0).unwrap_or(now)
            } else {
                now
            };
            self.transform = [now, next];
        }
        self.invalid_transform = false;
    }

    /// Forces the next transform query to re-read the graph.
    pub fn invalidate_transform(&mut self) {
        self.invalid_transform = true;
    }

    // --- Dirty marking ---

    /// Forwards `bits` to the render index for this prim and its
    /// instancer, if any. Empty bits do nothing.
    ///
    /// For shapes, dirty points imply a dirty extent.
    pub fn mark_dirty(&mut self, index: &mut dyn RenderIndex, bits: DirtyBits) {
        if bits.is_empty() {
            return;
        }
        let mut bits = bits;
        if let AdapterKind::Shape(shape) = &mut self.kind {
            if bits.contains(DirtyBits::POINTS) {
                bits |= DirtyBits::EXTENT;
            }
            if bits.contains(DirtyBits::EXTENT) {
                shape.invalidate_extent();
            }
        }
        let instancer = self.is_instanced.then(|| self.get_instancer_id());
        propagator::propagate(index, &self.id, instancer.as_ref(), bits);
        if bits.contains(DirtyBits::VISIBILITY) {
            self.visibility_dirty = true;
        }
    }

    // --- Visibility ---

    /// Visibility of the prim.
    ///
    /// With `check_dirty`, a pending visibility change is settled by
    /// querying the graph first. Without it the cached value is returned
    /// as is; handlers use that mode because the graph has not applied the
    /// edit they are being told about. A dirty query on a path that is no
    /// longer valid reports not visible.
    pub fn is_visible(&mut self, graph: &dyn SceneGraph, check_dirty: bool) -> bool {
        if check_dirty && self.visibility_dirty {
            if !graph.is_valid(&self.dag_path) {
                return false;
            }
            self.update_visibility(graph);
        }
        self.is_visible
    }

    /// Re-reads visibility from the graph. Returns `true` if it changed.
    ///
    /// Becoming visible invalidates the transform cache, since transform
    /// edits are not tracked while hidden.
    pub fn update_visibility(&mut self, graph: &dyn SceneGraph) -> bool {
        if !graph.is_valid(&self.dag_path) {
            return false;
        }
        let visible = graph.is_visible(&self.dag_path);
        self.visibility_dirty = false;
        if visible == self.is_visible {
            return false;
        }
        self.is_visible = visible;
        if visible {
            self.invalid_transform = true;
        }
        true
    }

    /// Settles a pending visibility change for the render side. A prim that
    /// came back into view also gets [`DirtyBits::TRANSFORM`], so edits
    /// skipped while it was hidden are pulled again.
    pub fn sync_visibility(&mut self, graph: &dyn SceneGraph, index: &mut dyn RenderIndex) -> bool {
        let was_visible = self.is_visible;
        let visible = self.is_visible(graph, true);
        if visible && !was_visible {
            log::trace!("{} is visible again; re-syncing transform", self.id);
            self.mark_dirty(index, DirtyBits::TRANSFORM);
        }
        visible
    }

    // --- Population ---

    /// Inserts the prim (and instancer) into the render index. Does nothing
    /// if already populated.
    pub fn populate(&mut self, index: &mut dyn RenderIndex) -> Result<(), SyncError> {
        if self.is_populated {
            return Ok(());
        }
        let prim_type = self.prim_type();
        if self.is_instanced {
            if !index.is_instancer_supported() {
                return Err(SyncError::InstancerUnsupported);
            }
            let instancer = self.get_instancer_id();
            index.insert_instancer(&instancer, &self.id)?;
            if let Err(e) = index.insert_rprim(prim_type, &self.id, Some(&instancer)) {
                index.remove_instancer(&instancer);
                return Err(e);
            }
        } else {
            index.insert_rprim(prim_type, &self.id, None)?;
        }
        log::debug!("Populated {} as {prim_type:?}", self.id);
        self.is_populated = true;
        Ok(())
    }

    /// Removes the prim (and instancer) from the render index. Returns
    /// `false` if there was nothing to remove.
    pub fn remove_prim(&mut self, index: &mut dyn RenderIndex) -> bool {
        if !self.is_populated {
            return false;
        }
        index.remove_rprim(&self.id);
        if self.is_instanced {
            index.remove_instancer(&self.get_instancer_id());
        }
        self.is_populated = false;
        true
    }

    // --- Instancing ---

    /// Dense indices of the visible instances; empty unless instanced.
    pub fn get_instance_indices(&self, graph: &dyn SceneGraph, _prototype: &ScenePath) -> Vec<usize> {
        if !self.is_instanced {
            return Vec::new();
        }
        instancing::instance_indices(graph, self.node)
    }

    /// Per-instance values of the primvar `key`. Only
    /// [`INSTANCE_TRANSFORM`](instancing::INSTANCE_TRANSFORM) has values.
    pub fn get_instance_primvar(&self, graph: &dyn SceneGraph, key: &str) -> Vec<Mat4> {
        if key != instancing::INSTANCE_TRANSFORM {
            return Vec::new();
        }
        instancing::instance_transforms(graph, self.node)
    }

    /// Path of the instancer entity, or the empty path when not instanced.
    pub fn get_instancer_id(&self) -> ScenePath {
        if !self.is_instanced {
            return ScenePath::empty();
        }
        instancing::instancer_id(&self.id)
    }

    pub fn instance_primvar_descriptors(&self, interpolation: Interpolation) -> Vec<PrimvarDescriptor> {
        if interpolation == Interpolation::Instance {
            instancing::instance_primvar_descriptors()
        } else {
            Vec::new()
        }
    }

    // --- Shape data ---

    /// Object-space extent; empty for adapters without shape data.
    pub fn get_extent(&mut self, graph: &dyn SceneGraph) -> Aabb {
        let node = self.node;
        match &mut self.kind {
            AdapterKind::Shape(shape) => shape.extent(graph, node),
            AdapterKind::Transform => Aabb::EMPTY,
        }
    }

    pub fn primvar_descriptors(&self, interpolation: Interpolation) -> Vec<PrimvarDescriptor> {
        self.kind
            .shape()
            .map(|shape| shape.primvar_descriptors(interpolation))
            .unwrap_or_default()
    }

    // --- Notifications ---

    /// Classifies and carries out one notification.
    ///
    /// Notifications for tokens this adapter no longer holds, or arriving
    /// after it detached, are ignored.
    pub fn handle(&mut self, notification: &Notification, ctx: &mut SyncContext<'_>) -> Reaction {
        if self.state != LifecycleState::Active || !self.tokens.contains(&notification.token) {
            log::trace!("{} ignoring stale {:?}", self.id, notification.callback);
            return Reaction::Ignore;
        }
        let visible = self.is_visible(&*ctx.graph, false);
        let reaction = callbacks::classify(notification, visible);
        log::debug!(
            "{} received {:?} from {} ({}): {reaction:?}",
            self.id,
            notification.callback,
            notification.source,
            notification.attribute.as_deref().unwrap_or("-"),
        );
        match reaction {
            Reaction::Ignore => {}
            Reaction::Mark {
                bits,
                invalidate_transform,
            } => {
                self.mark_dirty(&mut *ctx.index, bits);
                if invalidate_transform {
                    self.invalidate_transform();
                }
            }
            Reaction::Detach { replacement } => {
                ctx.lifecycle
                    .detach(self, &mut *ctx.graph, &mut *ctx.index, replacement);
            }
            Reaction::MarkAndDetach { bits, replacement } => {
                self.mark_dirty(&mut *ctx.index, bits);
                ctx.lifecycle
                    .detach(self, &mut *ctx.graph, &mut *ctx.index, replacement);
            }
        }
        reaction
    }
}

#[cfg(test)]
mod tests {
    use scenelink_core::math::{Vec3, mat4_from_translation, translation_of};

    use super::*;
    use crate::adapter::ShapeData;
    use crate::graph::attributes;
    use crate::lifecycle::LifecycleCoordinator;
    use crate::memory_graph::MemoryGraph;
    use crate::render_index::{IndexCall, MemoryRenderIndex};

    struct Fixture {
        graph: MemoryGraph,
        index: MemoryRenderIndex,
        lifecycle: LifecycleCoordinator,
        xform: NodeHandle,
        adapter: DagAdapter,
    }

    impl Fixture {
        fn new() -> Self {
            let mut graph = MemoryGraph::new();
            let xform = graph.add_transform("pCube1", None);
            let shape = graph.add_shape("pCubeShape1", xform);
            graph.set_local_transform(xform, mat4_from_translation(Vec3::new(1.0, 2.0, 3.0)));
            graph.commit();
            let id = ScenePath::new("/SceneLink/pCube1/pCubeShape1").unwrap();
            let mut adapter = DagAdapter::new(
                id,
                DagPath::new(vec![xform, shape]),
                &graph,
                AdapterKind::Shape(ShapeData::new()),
            )
            .unwrap();
            let mut index = MemoryRenderIndex::new();
            adapter.create_callbacks(&mut graph);
            adapter.populate(&mut index).unwrap();
            index.take_dirty();
            index.clear_calls();
            Self {
                graph,
                index,
                lifecycle: LifecycleCoordinator::new(),
                xform,
                adapter,
            }
        }

        fn deliver(&mut self) -> Vec<Reaction> {
            let batch = self.graph.take_notifications();
            let mut ctx = SyncContext {
                graph: &mut self.graph,
                index: &mut self.index,
                lifecycle: &mut self.lifecycle,
            };
            batch
                .iter()
                .map(|n| self.adapter.handle(n, &mut ctx))
                .collect()
        }
    }

    #[test]
    fn empty_dag_path_is_rejected() {
        let g = MemoryGraph::new();
        let err = DagAdapter::new(
            ScenePath::new("/a").unwrap(),
            DagPath::default(),
            &g,
            AdapterKind::Transform,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::EmptyDagPath));
    }

    #[test]
    fn non_instanced_watches_every_ancestor() {
        let f = Fixture::new();
        // Dirty + hierarchy + pre-removal per path node, plus geometry.
        assert_eq!(f.adapter.tokens().len(), 2 * 3 + 1);
        assert_eq!(f.graph.subscriptions_owned_by(f.adapter.id()), 7);
    }

    #[test]
    fn transform_is_cached() {
        let mut f = Fixture::new();
        let params = DelegateParams::default();
        f.graph.reset_counters();
        let first = f.adapter.get_transform(&f.graph, &params);
        let second = f.adapter.get_transform(&f.graph, &params);
        assert_eq!(first, second);
        assert_eq!(translation_of(&first), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(f.graph.transform_queries(), 1);
    }

    #[test]
    fn translate_edit_invalidates_transform() {
        let mut f = Fixture::new();
        let params = DelegateParams::default();
        f.adapter.get_transform(&f.graph, &params);
        f.graph
            .set_local_transform(f.xform, mat4_from_translation(Vec3::new(5.0, 0.0, 0.0)));
        let reactions = f.deliver();
        assert!(reactions.iter().any(|r| r.bits() == DirtyBits::TRANSFORM));
        assert!(f.adapter.is_transform_dirty());
        f.graph.commit();
        let moved = f.adapter.get_transform(&f.graph, &params);
        assert_eq!(translation_of(&moved), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn visibility_settles_on_dirty_query() {
        let mut f = Fixture::new();
        f.graph.set_visibility(f.xform, false);
        f.deliver();
        assert!(f.adapter.is_visibility_dirty());
        // Not committed yet: cached answer only.
        assert!(f.adapter.is_visible(&f.graph, false));
        f.graph.commit();
        assert!(!f.adapter.is_visible(&f.graph, true));
        assert!(!f.adapter.is_visibility_dirty());
    }

    #[test]
    fn points_edit_dirties_extent() {
        let mut f = Fixture::new();
        let bigger = Aabb::new(Vec3::new(-3.0, -3.0, -3.0), Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(f.adapter.get_extent(&f.graph), Aabb::UNIT);
        f.graph.set_bounds(f.adapter.node(), Some(bigger));
        f.deliver();
        f.graph.commit();
        let dirty = f.index.dirty_bits(f.adapter.id()).unwrap();
        assert!(dirty.contains(DirtyBits::POINTS | DirtyBits::EXTENT));
        assert_eq!(f.adapter.get_extent(&f.graph), bigger);
    }

    #[test]
    fn mark_dirty_adds_extent_for_points() {
        let mut f = Fixture::new();
        f.adapter.mark_dirty(&mut f.index, DirtyBits::POINTS);
        assert_eq!(
            f.index.calls(),
            &[IndexCall::MarkRprimDirty(
                f.adapter.id().clone(),
                DirtyBits::POINTS | DirtyBits::EXTENT
            )]
        );
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let mut f = Fixture::new();
        f.graph.touch_attribute(f.xform, attributes::MATRIX);
        let mut batch = f.graph.take_notifications();
        for n in &mut batch {
            n.token = SubscriptionToken::from_raw(10_000);
        }
        let mut ctx = SyncContext {
            graph: &mut f.graph,
            index: &mut f.index,
            lifecycle: &mut f.lifecycle,
        };
        for n in &batch {
            assert_eq!(f.adapter.handle(n, &mut ctx), Reaction::Ignore);
        }
        assert!(f.index.calls().is_empty());
    }

    #[test]
    fn refused_watches_reduce_coverage() {
        let mut graph = MemoryGraph::new();
        let xform = graph.add_transform("t", None);
        let loc = graph.add_locator("loc", xform);
        graph.refuse_watches(xform);
        let mut adapter = DagAdapter::new(
            ScenePath::new("/SceneLink/t/loc").unwrap(),
            DagPath::new(vec![xform, loc]),
            &graph,
            AdapterKind::Transform,
        )
        .unwrap();
        adapter.create_callbacks(&mut graph);
        assert_eq!(adapter.tokens().len(), 3);
        assert_eq!(adapter.state(), LifecycleState::Active);
    }

    #[test]
    fn remove_callbacks_is_idempotent() {
        let mut f = Fixture::new();
        f.adapter.remove_callbacks(&mut f.graph);
        f.adapter.remove_callbacks(&mut f.graph);
        assert!(f.adapter.tokens().is_empty());
        assert_eq!(f.graph.subscription_count(), 0);
    }
}
