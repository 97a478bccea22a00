//! Error types for scene synchronization.
//!
//! The adapter hot path (dirty marking, transform and visibility queries,
//! instance enumeration) never returns these: stale handles degrade to safe
//! defaults. Errors surface only from construction-time and configuration
//! APIs.

use std::path::PathBuf;

use scenelink_core::{PathError, ScenePath};
use thiserror::Error;

use crate::graph::NodeHandle;
use crate::render_index::PrimType;

/// Errors reported by a [`SceneGraph`](crate::SceneGraph) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} no longer exists")]
    StaleNode(NodeHandle),
    #[error("graph refused to watch node {node}: {reason}")]
    WatchRefused { node: NodeHandle, reason: String },
}

/// Errors reported by the synchronization layer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("path {0} is already present in the render index")]
    DuplicatePath(ScenePath),
    #[error("prim type {0:?} is not supported by the render index")]
    UnsupportedPrimType(PrimType),
    #[error("instancers are not supported by the render index")]
    InstancerUnsupported,
    #[error("cannot adapt an empty dag path")]
    EmptyDagPath,
    #[error("invalid scene path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("scene graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("failed to read {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::DuplicatePath(ScenePath::new("/a/b").unwrap());
        assert_eq!(
            err.to_string(),
            "path /a/b is already present in the render index"
        );

        let err = GraphError::WatchRefused {
            node: NodeHandle::from_raw(3),
            reason: "locked".into(),
        };
        assert_eq!(err.to_string(), "graph refused to watch node #3: locked");
    }

    #[test]
    fn graph_error_converts() {
        let err: SyncError = GraphError::StaleNode(NodeHandle::from_raw(7)).into();
        assert!(matches!(err, SyncError::Graph(GraphError::StaleNode(_))));
    }
}
