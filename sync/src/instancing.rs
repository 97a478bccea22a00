//! Resolution of instanced nodes.
//!
//! A node reachable through several paths is adapted once, by the adapter
//! on its canonical path (instance number 0). That adapter inserts a
//! separate instancer entity and answers per-instance queries by walking
//! every path the graph reports, in the graph's order.

use scenelink_core::ScenePath;
use scenelink_core::math::Mat4;

use crate::graph::{DagPath, NodeHandle, SceneGraph};

/// Property suffix of the instancer entity derived from a prototype path.
pub const INSTANCER_PROPERTY: &str = "instancer";

/// Primvar key carrying one transform per visible instance.
pub const INSTANCE_TRANSFORM: &str = "instanceTransform";

/// How a primvar's values map onto the prim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Constant,
    Vertex,
    /// One value per instance.
    Instance,
}

/// Declares one primvar a prim can be asked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimvarDescriptor {
    pub name: &'static str,
    pub interpolation: Interpolation,
}

/// Whether `path` owns the adapter for its node.
pub fn is_canonical(graph: &dyn SceneGraph, path: &DagPath) -> bool {
    graph.instance_number(path) == Some(0)
}

/// Every path to `node` that is valid and visible, in graph order.
pub fn visible_instances(graph: &dyn SceneGraph, node: NodeHandle) -> Vec<DagPath> {
    graph
        .all_paths_to(node)
        .into_iter()
        .filter(|path| graph.is_valid(path) && graph.is_visible(path))
        .collect()
}

/// Instance indices of `node`.
///
/// Skipped paths do not consume a slot, so the result is always the dense
/// run `0..k` where `k` counts the visible instances.
pub fn instance_indices(graph: &dyn SceneGraph, node: NodeHandle) -> Vec<usize> {
    let mut indices = Vec::new();
    for _ in visible_instances(graph, node) {
        indices.push(indices.len());
    }
    indices
}

/// Inclusive transform of every visible instance, aligned with
/// [`instance_indices`].
pub fn instance_transforms(graph: &dyn SceneGraph, node: NodeHandle) -> Vec<Mat4> {
    visible_instances(graph, node)
        .iter()
        .filter_map(|path| graph.inclusive_transform(path, 0.0))
        .collect()
}

/// Path of the instancer entity owned by the prototype at `prim`.
pub fn instancer_id(prim: &ScenePath) -> ScenePath {
    prim.append_property(INSTANCER_PROPERTY)
}

/// Node to recreate from when the transform above the canonical path is
/// about to be removed: the node ending the second path, since the first
/// is the one going away. `None` once the node is about to become a
/// singleton.
pub fn master_replacement(graph: &dyn SceneGraph, node: NodeHandle) -> Option<NodeHandle> {
    let paths = graph.all_paths_to(node);
    if paths.len() < 2 {
        return None;
    }
    paths[1].node()
}

/// Primvars an instancer provides.
pub fn instance_primvar_descriptors() -> Vec<PrimvarDescriptor> {
    vec![PrimvarDescriptor {
        name: INSTANCE_TRANSFORM,
        interpolation: Interpolation::Instance,
    }]
}
