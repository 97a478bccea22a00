//! # SceneLink Sync
//!
//! Keeps a render index minimally invalidated while the scene graph it
//! mirrors is edited underneath it.
//!
//! ## Overview
//!
//! - [`SceneGraph`] - point-in-time queries and subscriptions on the
//!   external graph ([`MemoryGraph`] is an in-memory implementation)
//! - [`RenderIndex`] - the render cache adapters write to
//!   ([`MemoryRenderIndex`] records every call)
//! - [`DagAdapter`] - one graph node bound to one prim: cached transform
//!   and visibility, classification of notifications into [`DirtyBits`]
//! - [`LifecycleCoordinator`] - teardown and deferred recreation after
//!   structural edits
//! - [`SceneDelegate`] - owns the adapters, dispatches notifications, answers
//!   render-side queries
//!
//! ## Two-phase delivery
//!
//! Notifications describe edits the graph has not committed yet. Handlers
//! only classify and mark dirty; anything that needs the post-edit graph
//! (rebuilding an adapter, settling visibility) happens later, in
//! [`SceneDelegate::on_idle`] or on the next render-side query.

pub mod adapter;
pub mod callbacks;
pub mod delegate;
pub mod dirty;
pub mod error;
pub mod graph;
pub mod instancing;
pub mod lifecycle;
pub mod memory_graph;
pub mod params;
pub mod propagator;
pub mod render_index;

pub use adapter::{AdapterKind, DagAdapter, ShapeData, SyncContext};
pub use callbacks::{Reaction, Replacement};
pub use delegate::SceneDelegate;
pub use dirty::DirtyBits;
pub use error::{GraphError, SyncError};
pub use graph::{
    CallbackKind, DagPath, NodeHandle, NodeKind, Notification, SceneGraph, Subscription,
    SubscriptionToken, Watch,
};
pub use lifecycle::{LifecycleCoordinator, LifecycleState, RecreationQueue, RecreationRequest};
pub use memory_graph::MemoryGraph;
pub use params::DelegateParams;
pub use render_index::{MemoryRenderIndex, PrimType, RenderIndex};

pub use scenelink_core::ScenePath;
