//! Shape-specific adapter data.

use scenelink_core::bounds::Aabb;

use crate::graph::{NodeHandle, SceneGraph, attributes};
use crate::instancing::{Interpolation, PrimvarDescriptor};

/// Cached extent and primvar layout of a shape node.
#[derive(Debug, Clone, Default)]
pub struct ShapeData {
    extent: Aabb,
    extent_valid: bool,
}

impl ShapeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object-space extent, read from the graph on first use after an
    /// invalidation. Shapes without bounds report [`Aabb::EMPTY`].
    pub fn extent(&mut self, graph: &dyn SceneGraph, node: NodeHandle) -> Aabb {
        if !self.extent_valid {
            self.extent = graph.bounds(node).unwrap_or(Aabb::EMPTY);
            self.extent_valid = true;
        }
        self.extent
    }

    pub fn invalidate_extent(&mut self) {
        self.extent_valid = false;
    }

    pub fn is_extent_valid(&self) -> bool {
        self.extent_valid
    }

    /// Primvars the shape provides at `interpolation`.
    pub fn primvar_descriptors(&self, interpolation: Interpolation) -> Vec<PrimvarDescriptor> {
        match interpolation {
            Interpolation::Vertex => vec![PrimvarDescriptor {
                name: attributes::POINTS,
                interpolation,
            }],
            Interpolation::Constant | Interpolation::Instance => Vec::new(),
        }
    }
}
