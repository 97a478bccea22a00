//! Teardown and deferred recreation of adapters.
//!
//! A structural edit (reparent, delete, instancing change) invalidates the
//! dag path an adapter was built on. The adapter cannot rebuild itself from
//! inside the notification that reported the edit, since the graph has not
//! committed it yet. Instead it detaches: releases its subscriptions,
//! removes its prims and leaves a [`RecreationRequest`] in the
//! [`RecreationQueue`]. The owning delegate drains the queue on its next
//! idle pass.

use std::fmt;

use scenelink_core::ScenePath;

use crate::adapter::DagAdapter;
use crate::callbacks::Replacement;
use crate::graph::{NodeHandle, SceneGraph};
use crate::instancing;
use crate::render_index::RenderIndex;

/// Where an adapter is in its teardown cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Subscribed and reacting to notifications.
    #[default]
    Active,
    /// Torn down for good, nothing scheduled.
    Removed,
    /// Torn down, waiting for the delegate to rebuild it.
    PendingRecreate,
}

/// Ask the delegate to rebuild the adapter at `path` from `node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecreationRequest {
    pub path: ScenePath,
    pub node: NodeHandle,
}

/// Pending recreations, in request order, at most one per path.
#[derive(Default)]
pub struct RecreationQueue {
    requests: Vec<RecreationRequest>,
}

impl RecreationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a request. A request for a path already pending keeps its
    /// position and takes the newer node. Returns `true` if the path was
    /// not pending before.
    pub fn push(&mut self, request: RecreationRequest) -> bool {
        if let Some(existing) = self.requests.iter_mut().find(|r| r.path == request.path) {
            log::trace!("Recreation of {} already pending", request.path);
            existing.node = request.node;
            return false;
        }
        self.requests.push(request);
        true
    }

    /// Drops a pending request. Returns `true` if one was pending.
    pub fn cancel(&mut self, path: &ScenePath) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| &r.path != path);
        self.requests.len() != before
    }

    /// Takes every pending request in order.
    pub fn drain(&mut self) -> Vec<RecreationRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn contains(&self, path: &ScenePath) -> bool {
        self.requests.iter().any(|r| &r.path == path)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl fmt::Debug for RecreationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecreationQueue")
            .field("pending", &self.requests.len())
            .finish()
    }
}

/// Runs adapter teardown and owns the recreation queue.
#[derive(Debug, Default)]
pub struct LifecycleCoordinator {
    queue: RecreationQueue,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tears `adapter` down and schedules its recreation.
    ///
    /// Only active adapters detach; a second structural notification in
    /// the same batch is a no-op. With [`Replacement::SecondInstancePath`]
    /// the node is re-enumerated first, and nothing happens when fewer than
    /// two paths remain.
    ///
    /// Returns `true` if the adapter was detached.
    pub fn detach(
        &mut self,
        adapter: &mut DagAdapter,
        graph: &mut dyn SceneGraph,
        index: &mut dyn RenderIndex,
        replacement: Replacement,
    ) -> bool {
        if adapter.state() != LifecycleState::Active {
            return false;
        }
        let node = match replacement {
            Replacement::SameNode => adapter.node(),
            Replacement::SecondInstancePath => {
                match instancing::master_replacement(graph, adapter.node()) {
                    Some(node) => node,
                    None => {
                        log::debug!(
                            "{} is becoming a singleton; leaving it to hierarchy events",
                            adapter.id()
                        );
                        return false;
                    }
                }
            }
        };

        log::debug!("Detaching {} (recreate from {node})", adapter.id());
        adapter.remove_callbacks(graph);
        adapter.remove_prim(index);
        self.queue.push(RecreationRequest {
            path: adapter.id().clone(),
            node,
        });
        adapter.set_state(LifecycleState::PendingRecreate);
        true
    }

    pub fn cancel(&mut self, path: &ScenePath) -> bool {
        self.queue.cancel(path)
    }

    pub fn drain(&mut self) -> Vec<RecreationRequest> {
        self.queue.drain()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn is_pending(&self, path: &ScenePath) -> bool {
        self.queue.contains(path)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, node: u64) -> RecreationRequest {
        RecreationRequest {
            path: ScenePath::new(path).unwrap(),
            node: NodeHandle::from_raw(node),
        }
    }

    #[test]
    fn queue_preserves_order() {
        let mut q = RecreationQueue::new();
        assert!(q.push(request("/a", 1)));
        assert!(q.push(request("/b", 2)));
        let drained = q.drain();
        assert_eq!(drained, vec![request("/a", 1), request("/b", 2)]);
        assert!(q.is_empty());
    }

    #[test]
    fn duplicates_keep_position_and_take_latest_node() {
        let mut q = RecreationQueue::new();
        q.push(request("/a", 1));
        q.push(request("/b", 2));
        assert!(!q.push(request("/a", 7)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.drain(), vec![request("/a", 7), request("/b", 2)]);
    }

    #[test]
    fn cancel_removes_pending() {
        let mut q = RecreationQueue::new();
        q.push(request("/a", 1));
        let a = ScenePath::new("/a").unwrap();
        assert!(q.contains(&a));
        assert!(q.cancel(&a));
        assert!(!q.cancel(&a));
        assert!(q.is_empty());
    }

    #[test]
    fn default_state_is_active() {
        assert_eq!(LifecycleState::default(), LifecycleState::Active);
    }
}
