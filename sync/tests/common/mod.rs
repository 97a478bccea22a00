//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use scenelink_core::ScenePath;
use scenelink_core::math::{Mat4, Vec3, mat4_from_translation};
use scenelink_sync::{
    DelegateParams, DirtyBits, MemoryGraph, MemoryRenderIndex, NodeHandle, SceneDelegate,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn path(s: &str) -> ScenePath {
    ScenePath::new(s).unwrap()
}

pub fn translation(x: f32, y: f32, z: f32) -> Mat4 {
    mat4_from_translation(Vec3::new(x, y, z))
}

/// A graph and the delegate mirroring it.
pub struct Scene {
    pub graph: MemoryGraph,
    pub delegate: SceneDelegate<MemoryRenderIndex>,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_params(DelegateParams::default())
    }

    pub fn with_params(params: DelegateParams) -> Self {
        init_logging();
        Self {
            graph: MemoryGraph::new(),
            delegate: SceneDelegate::new(MemoryRenderIndex::new(), params).unwrap(),
        }
    }

    pub fn with_index(index: MemoryRenderIndex) -> Self {
        init_logging();
        Self {
            graph: MemoryGraph::new(),
            delegate: SceneDelegate::new(index, DelegateParams::default()).unwrap(),
        }
    }

    /// Populates the delegate and discards the insertion dirt.
    pub fn populate(&mut self) -> usize {
        let inserted = self.delegate.populate(&mut self.graph);
        self.reset_index();
        inserted
    }

    /// Delivers queued notifications without committing the edit.
    pub fn pump(&mut self) -> usize {
        self.delegate.pump(&mut self.graph)
    }

    /// Delivers notifications, commits staged edits and runs the idle pass,
    /// as a host would for one edit.
    pub fn settle(&mut self) -> usize {
        self.delegate.pump(&mut self.graph);
        self.graph.commit();
        self.delegate.on_idle(&mut self.graph)
    }

    pub fn reset_index(&mut self) {
        let index = self.delegate.render_index_mut();
        index.take_dirty();
        index.clear_calls();
    }

    pub fn index(&self) -> &MemoryRenderIndex {
        self.delegate.render_index()
    }

    pub fn dirty(&self, id: &ScenePath) -> DirtyBits {
        self.index().dirty_bits(id).unwrap_or_default()
    }

    /// `count` root transforms at x = 0, 1, 2, ... all parenting one shape.
    /// Returns the transforms and the shape.
    pub fn instanced_shape(&mut self, count: usize) -> (Vec<NodeHandle>, NodeHandle) {
        let parents: Vec<NodeHandle> = (0..count)
            .map(|i| self.graph.add_transform(format!("t{i}"), None))
            .collect();
        let shape = self.graph.add_shape("shape", parents[0]);
        for (i, parent) in parents.iter().enumerate() {
            if i > 0 {
                self.graph.add_parent(shape, *parent);
            }
            self.graph
                .set_local_transform(*parent, translation(i as f32, 0.0, 0.0));
        }
        self.graph.commit();
        (parents, shape)
    }
}
