//! Adapters binding one graph node to one render-index entry.
//!
//! Every adapter shares the same invalidation state machine
//! ([`DagAdapter`]). What differs between node kinds is captured by
//! [`AdapterKind`], chosen once at construction:
//!
//! | Kind        | Transform | Shape data (extent, primvars) | Prim type |
//! |-------------|-----------|-------------------------------|-----------|
//! | `Transform` | yes       | no                            | Locator   |
//! | `Shape`     | yes       | yes                           | Mesh      |
//!
//! Instancing is not a kind: any adapter built on the canonical path of a
//! multiply-parented node becomes instanced at construction.

mod dag;
mod shape;

pub use dag::DagAdapter;
pub use shape::ShapeData;

use crate::graph::{NodeKind, SceneGraph};
use crate::lifecycle::LifecycleCoordinator;
use crate::render_index::{PrimType, RenderIndex};

/// Capability data selected when an adapter is built.
#[derive(Debug, Clone)]
pub enum AdapterKind {
    /// Transform only.
    Transform,
    /// Transform plus cached shape data.
    Shape(ShapeData),
}

impl AdapterKind {
    /// Kind used to adapt a node of `node_kind`. Plain transforms are not
    /// adapted.
    pub fn for_node(node_kind: NodeKind) -> Option<Self> {
        match node_kind {
            NodeKind::Shape => Some(AdapterKind::Shape(ShapeData::new())),
            NodeKind::Locator => Some(AdapterKind::Transform),
            NodeKind::Transform => None,
        }
    }

    /// Render-index prim type of adapters of this kind.
    pub fn prim_type(&self) -> PrimType {
        match self {
            AdapterKind::Transform => PrimType::Locator,
            AdapterKind::Shape(_) => PrimType::Mesh,
        }
    }

    pub fn shape(&self) -> Option<&ShapeData> {
        match self {
            AdapterKind::Shape(data) => Some(data),
            AdapterKind::Transform => None,
        }
    }
}

/// Collaborators an adapter needs while handling a notification.
pub struct SyncContext<'a> {
    pub graph: &'a mut dyn SceneGraph,
    pub index: &'a mut dyn RenderIndex,
    pub lifecycle: &'a mut LifecycleCoordinator,
}
