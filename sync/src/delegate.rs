//! The scene delegate: owner of every adapter.
//!
//! The delegate discovers adaptable nodes, routes graph notifications to
//! the adapter that registered them and rebuilds detached adapters on its
//! idle pass. Render-side consumers query it by prim path.
//!
//! ```ignore
//! let mut delegate = SceneDelegate::new(MemoryRenderIndex::new(), DelegateParams::default())?;
//! delegate.populate(&mut graph);
//!
//! loop {
//!     // host edits the graph ...
//!     delegate.pump(&mut graph);    // during notification delivery
//!     // host commits the edit ...
//!     delegate.on_idle(&mut graph); // once the graph is settled
//!     renderer.sync(delegate.render_index_mut().take_dirty());
//! }
//! ```

use std::collections::BTreeMap;

use scenelink_core::bounds::Aabb;
use scenelink_core::math::Mat4;
use scenelink_core::{ScenePath, profile_function, profile_plot};

use crate::adapter::{AdapterKind, DagAdapter, SyncContext};
use crate::callbacks::Reaction;
use crate::dirty::DirtyBits;
use crate::error::SyncError;
use crate::graph::{DagPath, Notification, SceneGraph};
use crate::instancing::{self, Interpolation, PrimvarDescriptor};
use crate::lifecycle::LifecycleCoordinator;
use crate::params::DelegateParams;
use crate::render_index::RenderIndex;

/// Owns the adapters mirroring one scene graph into one render index.
pub struct SceneDelegate<R: RenderIndex> {
    index: R,
    params: DelegateParams,
    root: ScenePath,
    adapters: BTreeMap<ScenePath, DagAdapter>,
    lifecycle: LifecycleCoordinator,
}

impl<R: RenderIndex> SceneDelegate<R> {
    /// Creates an empty delegate. Fails if `params.delegate_root` is not a
    /// valid absolute path.
    pub fn new(index: R, params: DelegateParams) -> Result<Self, SyncError> {
        let root = params.root_path()?;
        Ok(Self {
            index,
            params,
            root,
            adapters: BTreeMap::new(),
            lifecycle: LifecycleCoordinator::new(),
        })
    }

    // --- Population ---

    /// Adapts every canonical shape and locator path in the graph. Returns
    /// the number of prims inserted.
    pub fn populate(&mut self, graph: &mut dyn SceneGraph) -> usize {
        profile_function!();
        let mut inserted = 0;
        for path in graph.dag_paths() {
            match self.insert_dag(graph, &path) {
                Ok(Some(_)) => inserted += 1,
                Ok(None) => {}
                Err(e) => log::warn!("Skipping {path:?}: {e}"),
            }
        }
        log::info!(
            "Populated {inserted} prims under {} ({} adapters)",
            self.root,
            self.adapters.len()
        );
        inserted
    }

    /// Adapts the node at the end of `dag` if it is adaptable, canonical
    /// and of a type the render index supports. Returns the new prim path,
    /// or `None` if the path was skipped.
    pub fn insert_dag(
        &mut self,
        graph: &mut dyn SceneGraph,
        dag: &DagPath,
    ) -> Result<Option<ScenePath>, SyncError> {
        let Some(node) = dag.node() else {
            return Ok(None);
        };
        let Some(kind) = graph.node_kind(node).and_then(AdapterKind::for_node) else {
            return Ok(None);
        };
        if !instancing::is_canonical(graph, dag) {
            return Ok(None);
        }
        let prim_type = kind.prim_type();
        if !self.index.is_rprim_type_supported(prim_type) {
            log::debug!("Render index does not support {prim_type:?}; skipping {dag:?}");
            return Ok(None);
        }
        let mut id = self.prim_path(graph, dag);
        if let Some(existing) = self.adapters.get(&id) {
            if existing.dag_path() == dag {
                return Err(SyncError::DuplicatePath(id));
            }
            // Distinct nodes whose names sanitise to the same path.
            id = self.unique_sibling(&id);
            log::debug!("{dag:?} collides with an existing prim; using {id}");
        }

        let mut adapter = DagAdapter::new(id.clone(), dag.clone(), graph, kind)?;
        adapter.populate(&mut self.index)?;
        adapter.create_callbacks(graph);
        self.adapters.insert(id.clone(), adapter);
        Ok(Some(id))
    }

    /// Removes the adapter at `id`, its prims and its subscriptions, and
    /// cancels any pending recreation. Returns the torn-down adapter, or
    /// `None` for unknown paths.
    pub fn remove_adapter(&mut self, graph: &mut dyn SceneGraph, id: &ScenePath) -> Option<DagAdapter> {
        self.lifecycle.cancel(id);
        let mut adapter = self.adapters.remove(id)?;
        adapter.teardown(graph, &mut self.index);
        log::debug!("Removed adapter {id}");
        Some(adapter)
    }

    /// Removes every adapter.
    pub fn clear(&mut self, graph: &mut dyn SceneGraph) {
        let ids: Vec<ScenePath> = self.adapters.keys().cloned().collect();
        for id in ids {
            self.remove_adapter(graph, &id);
        }
        self.lifecycle.drain();
    }

    fn prim_path(&self, graph: &dyn SceneGraph, dag: &DagPath) -> ScenePath {
        dag.nodes().iter().fold(self.root.clone(), |path, node| {
            path.append_child(graph.node_name(*node).unwrap_or("node"))
        })
    }

    /// First `<name>_<n>` sibling of `id` no adapter has claimed.
    fn unique_sibling(&self, id: &ScenePath) -> ScenePath {
        let parent = id.parent();
        let mut suffix = 1;
        loop {
            let candidate = parent.append_child(&format!("{}_{suffix}", id.name()));
            if !self.adapters.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    // --- Notification delivery ---

    /// Delivers every queued graph notification. Returns how many reached
    /// an adapter.
    pub fn pump(&mut self, graph: &mut dyn SceneGraph) -> usize {
        profile_function!();
        let batch = graph.take_notifications();
        profile_plot!("notifications", batch.len());
        let mut handled = 0;
        for notification in &batch {
            if self.deliver(graph, notification) != Reaction::Ignore {
                handled += 1;
            }
        }
        handled
    }

    /// Dispatches one notification to the adapter named by its owner path.
    /// Notifications for unknown owners are dropped.
    pub fn deliver(&mut self, graph: &mut dyn SceneGraph, notification: &Notification) -> Reaction {
        let Some(adapter) = self.adapters.get_mut(&notification.owner) else {
            log::trace!("No adapter {} for {:?}", notification.owner, notification.callback);
            return Reaction::Ignore;
        };
        let mut ctx = SyncContext {
            graph,
            index: &mut self.index,
            lifecycle: &mut self.lifecycle,
        };
        adapter.handle(notification, &mut ctx)
    }

    /// Rebuilds every detached adapter. Call once the graph has committed
    /// the edits that caused the detachments. Returns the number of
    /// adapters recreated.
    pub fn on_idle(&mut self, graph: &mut dyn SceneGraph) -> usize {
        profile_function!();
        let mut recreated = 0;
        for request in self.lifecycle.drain() {
            if let Some(mut old) = self.adapters.remove(&request.path) {
                old.teardown(graph, &mut self.index);
            }
            let Some(path) = graph.all_paths_to(request.node).into_iter().next() else {
                log::debug!("{} is gone; not recreating {}", request.node, request.path);
                continue;
            };
            match self.insert_dag(graph, &path) {
                Ok(Some(id)) => {
                    log::debug!("Recreated {} as {id}", request.path);
                    recreated += 1;
                }
                Ok(None) => log::debug!("{path:?} no longer adaptable"),
                Err(e) => log::warn!("Failed to recreate {}: {e}", request.path),
            }
        }
        recreated
    }

    /// Replaces the parameters. A new root repopulates everything; toggling
    /// motion samples invalidates every cached transform.
    pub fn set_params(
        &mut self,
        graph: &mut dyn SceneGraph,
        params: DelegateParams,
    ) -> Result<(), SyncError> {
        let root = params.root_path()?;
        let motion_changed = params.enable_motion_samples != self.params.enable_motion_samples;
        self.params = params;
        if root != self.root {
            log::info!("Delegate root changed from {} to {root}", self.root);
            self.clear(graph);
            self.root = root;
            self.populate(graph);
        } else if motion_changed {
            for adapter in self.adapters.values_mut() {
                adapter.invalidate_transform();
                adapter.mark_dirty(&mut self.index, DirtyBits::TRANSFORM);
            }
        }
        Ok(())
    }

    // --- Render-side queries ---

    pub fn get_transform(&mut self, graph: &dyn SceneGraph, id: &ScenePath) -> Option<Mat4> {
        let params = &self.params;
        self.adapters
            .get_mut(id)
            .map(|adapter| adapter.get_transform(graph, params))
    }

    /// Motion samples of the prim at `id`; 0 for unknown prims.
    pub fn sample_transform(
        &mut self,
        graph: &dyn SceneGraph,
        id: &ScenePath,
        max_samples: usize,
        times: &mut [f32],
        samples: &mut [Mat4],
    ) -> usize {
        let params = &self.params;
        self.adapters.get_mut(id).map_or(0, |adapter| {
            adapter.sample_transform(graph, params, max_samples, times, samples)
        })
    }

    /// Settled visibility of the prim at `id`; `false` for unknown prims.
    pub fn get_visible(&mut self, graph: &dyn SceneGraph, id: &ScenePath) -> bool {
        let Some(adapter) = self.adapters.get_mut(id) else {
            return false;
        };
        adapter.sync_visibility(graph, &mut self.index)
    }

    pub fn get_extent(&mut self, graph: &dyn SceneGraph, id: &ScenePath) -> Aabb {
        self.adapters
            .get_mut(id)
            .map_or(Aabb::EMPTY, |adapter| adapter.get_extent(graph))
    }

    pub fn get_instance_indices(&self, graph: &dyn SceneGraph, prototype: &ScenePath) -> Vec<usize> {
        self.adapters
            .get(prototype)
            .map(|adapter| adapter.get_instance_indices(graph, prototype))
            .unwrap_or_default()
    }

    pub fn get_instancer_id(&self, id: &ScenePath) -> ScenePath {
        self.adapters
            .get(id)
            .map(DagAdapter::get_instancer_id)
            .unwrap_or_default()
    }

    /// Per-instance primvar values. `id` may name the prototype or its
    /// instancer.
    pub fn get_instance_primvar(&self, graph: &dyn SceneGraph, id: &ScenePath, key: &str) -> Vec<Mat4> {
        self.adapters
            .get(&id.prim_path())
            .map(|adapter| adapter.get_instance_primvar(graph, key))
            .unwrap_or_default()
    }

    /// Primvars of the prim at `id`, or of the instancer when `id` is an
    /// instancer path.
    pub fn get_primvar_descriptors(&self, id: &ScenePath, interpolation: Interpolation) -> Vec<PrimvarDescriptor> {
        let Some(adapter) = self.adapters.get(&id.prim_path()) else {
            return Vec::new();
        };
        if id.is_property_path() {
            adapter.instance_primvar_descriptors(interpolation)
        } else {
            adapter.primvar_descriptors(interpolation)
        }
    }

    // --- Accessors ---

    pub fn render_index(&self) -> &R {
        &self.index
    }

    pub fn render_index_mut(&mut self) -> &mut R {
        &mut self.index
    }

    pub fn params(&self) -> &DelegateParams {
        &self.params
    }

    pub fn root(&self) -> &ScenePath {
        &self.root
    }

    pub fn adapter(&self, id: &ScenePath) -> Option<&DagAdapter> {
        self.adapters.get(id)
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn adapter_ids(&self) -> impl Iterator<Item = &ScenePath> {
        self.adapters.keys()
    }

    pub fn has_pending_recreations(&self) -> bool {
        self.lifecycle.has_pending()
    }

    pub fn pending_recreations(&self) -> usize {
        self.lifecycle.pending_count()
    }
}
