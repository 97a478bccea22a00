//! Structural edits: reparenting, deletion and instancing changes tear
//! adapters down and rebuild them on the idle pass.

mod common;

use scenelink_sync::render_index::IndexCall;
use scenelink_sync::{
    AdapterKind, DagAdapter, DirtyBits, LifecycleCoordinator, LifecycleState, MemoryRenderIndex,
    Reaction, Replacement, SceneGraph, ShapeData, SyncContext,
};

use common::{Scene, path};

#[test]
fn reparent_recreates_under_new_path() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    let t1 = scene.graph.add_transform("t1", None);
    let shape = scene.graph.add_shape("shape", t0);
    scene.populate();
    let old = path("/SceneLink/t0/shape");
    let new = path("/SceneLink/t1/shape");

    scene.graph.reparent(shape, Some(t1));
    scene.pump();

    // Torn down inside delivery; nothing rebuilt yet.
    assert!(scene.index().rprim(&old).is_none());
    assert_eq!(scene.graph.subscriptions_owned_by(&old), 0);
    assert_eq!(
        scene.delegate.adapter(&old).map(DagAdapter::state),
        Some(LifecycleState::PendingRecreate)
    );
    assert_eq!(scene.delegate.pending_recreations(), 1);

    scene.graph.commit();
    assert_eq!(scene.delegate.on_idle(&mut scene.graph), 1);
    assert!(scene.delegate.adapter(&old).is_none());
    assert!(scene.delegate.adapter(&new).unwrap().is_populated());
    assert_eq!(scene.dirty(&new), DirtyBits::ALL);
    assert!(scene.graph.subscriptions_owned_by(&new) > 0);
}

#[test]
fn reparenting_an_ancestor_recreates_descendant() {
    let mut scene = Scene::new();
    let grp = scene.graph.add_transform("grp", None);
    let t0 = scene.graph.add_transform("t0", None);
    scene.graph.add_shape("shape", t0);
    scene.populate();

    scene.graph.reparent(t0, Some(grp));
    assert_eq!(scene.settle(), 1);
    assert!(scene.delegate.adapter(&path("/SceneLink/grp/t0/shape")).is_some());
    assert_eq!(scene.delegate.adapter_count(), 1);
}

#[test]
fn delete_removes_without_recreation() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    scene.graph.add_shape("shape", t0);
    scene.populate();

    scene.graph.delete(t0);
    assert_eq!(scene.settle(), 0);
    assert_eq!(scene.delegate.adapter_count(), 0);
    assert_eq!(scene.index().rprim_count(), 0);
    assert_eq!(scene.graph.subscription_count(), 0);
    assert!(!scene.delegate.has_pending_recreations());
}

#[test]
fn later_notifications_in_a_batch_are_ignored_after_detach() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    let t1 = scene.graph.add_transform("t1", None);
    let shape = scene.graph.add_shape("shape", t0);
    scene.populate();

    scene.graph.reparent(shape, Some(t1));
    scene.graph.set_visibility(t0, false);
    scene.graph.reparent(shape, None);
    // Only the first structural event reaches the adapter; the rest carry
    // tokens it has already released.
    assert_eq!(scene.pump(), 1);
    assert_eq!(scene.delegate.pending_recreations(), 1);
    assert!(scene.index().calls().iter().all(|c| !matches!(c, IndexCall::MarkRprimDirty(..))));
}

#[test]
fn master_removal_rekeys_on_second_path() {
    let mut scene = Scene::new();
    let (parents, shape) = scene.instanced_shape(3);
    scene.populate();
    let old = path("/SceneLink/t0/shape");
    let new = path("/SceneLink/t1/shape");
    assert!(scene.index().instancer(&path("/SceneLink/t0/shape.instancer")).is_some());

    scene.graph.delete(parents[0]);
    scene.pump();
    assert!(scene.index().rprim(&old).is_none());
    assert_eq!(scene.index().instancer_count(), 0);

    scene.graph.commit();
    assert_eq!(scene.delegate.on_idle(&mut scene.graph), 1);
    let adapter = scene.delegate.adapter(&new).unwrap();
    assert!(adapter.is_instanced());
    assert_eq!(adapter.node(), shape);
    assert!(scene.index().instancer(&path("/SceneLink/t1/shape.instancer")).is_some());
    assert_eq!(
        scene.delegate.get_instance_indices(&scene.graph, &new),
        vec![0, 1]
    );
}

#[test]
fn master_removal_of_a_singleton_is_a_no_op() {
    let mut scene = Scene::new();
    let (parents, shape) = scene.instanced_shape(2);
    let mut index = MemoryRenderIndex::new();
    let canonical = scene.graph.all_paths_to(shape)[0].clone();
    let mut adapter = DagAdapter::new(
        path("/SceneLink/t0/shape"),
        canonical,
        &scene.graph,
        AdapterKind::Shape(ShapeData::new()),
    )
    .unwrap();
    assert!(adapter.is_instanced());
    adapter.populate(&mut index).unwrap();
    adapter.create_callbacks(&mut scene.graph);

    scene.graph.remove_parent(shape, parents[1]);
    scene.graph.commit();

    let mut lifecycle = LifecycleCoordinator::new();
    let detached = lifecycle.detach(
        &mut adapter,
        &mut scene.graph,
        &mut index,
        Replacement::SecondInstancePath,
    );
    assert!(!detached);
    assert_eq!(adapter.state(), LifecycleState::Active);
    assert!(adapter.is_populated());
    assert!(!adapter.tokens().is_empty());
    assert!(!lifecycle.has_pending());
}

#[test]
fn instancer_removal_marks_then_recreates() {
    let mut scene = Scene::new();
    let (parents, _) = scene.instanced_shape(3);
    scene.populate();
    let prototype = path("/SceneLink/t0/shape");
    let instancer = path("/SceneLink/t0/shape.instancer");

    scene.graph.delete(parents[2]);
    scene.pump();
    let calls = scene.index().calls().to_vec();
    let marked = calls.iter().position(|c| {
        *c == IndexCall::MarkInstancerDirty(instancer.clone(), DirtyBits::INSTANCER_TOPOLOGY)
    });
    let removed = calls
        .iter()
        .position(|c| *c == IndexCall::RemoveInstancer(instancer.clone()));
    assert!(marked.unwrap() < removed.unwrap());

    scene.graph.commit();
    assert_eq!(scene.delegate.on_idle(&mut scene.graph), 1);
    assert!(scene.delegate.adapter(&prototype).unwrap().is_instanced());
    assert_eq!(
        scene.delegate.get_instance_indices(&scene.graph, &prototype),
        vec![0, 1]
    );
}

#[test]
fn gaining_a_parent_makes_the_prim_instanced() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    let t1 = scene.graph.add_transform("t1", None);
    let shape = scene.graph.add_shape("shape", t0);
    scene.populate();
    let id = path("/SceneLink/t0/shape");
    assert!(!scene.delegate.adapter(&id).unwrap().is_instanced());

    scene.graph.add_parent(shape, t1);
    assert_eq!(scene.settle(), 1);
    let adapter = scene.delegate.adapter(&id).unwrap();
    assert!(adapter.is_instanced());
    assert_eq!(scene.delegate.adapter_count(), 1);
    assert!(!scene.delegate.get_instancer_id(&id).is_empty());
}

#[test]
fn losing_a_parent_drops_the_instancer() {
    let mut scene = Scene::new();
    let (parents, shape) = scene.instanced_shape(2);
    scene.populate();
    let id = path("/SceneLink/t0/shape");

    scene.graph.remove_parent(shape, parents[1]);
    assert_eq!(scene.settle(), 1);

    let adapter = scene.delegate.adapter(&id).unwrap();
    assert!(!adapter.is_instanced());
    assert_eq!(scene.index().instancer_count(), 0);
    assert!(scene.delegate.get_instancer_id(&id).is_empty());
}

#[test]
fn remove_adapter_cancels_pending_recreation() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    let t1 = scene.graph.add_transform("t1", None);
    let shape = scene.graph.add_shape("shape", t0);
    scene.populate();
    let id = path("/SceneLink/t0/shape");

    scene.graph.reparent(shape, Some(t1));
    scene.pump();
    let removed = scene.delegate.remove_adapter(&mut scene.graph, &id).unwrap();
    assert_eq!(removed.state(), LifecycleState::Removed);
    assert!(removed.tokens().is_empty());
    assert!(!scene.delegate.has_pending_recreations());
    scene.graph.commit();
    assert_eq!(scene.delegate.on_idle(&mut scene.graph), 0);
    assert_eq!(scene.delegate.adapter_count(), 0);
}

#[test]
fn no_subscription_outlives_its_adapter() {
    let mut scene = Scene::new();
    let (parents, _) = scene.instanced_shape(3);
    let solo = scene.graph.add_transform("solo", None);
    scene.graph.add_locator("loc", solo);
    scene.populate();
    assert!(scene.graph.subscription_count() > 0);

    scene.graph.delete(parents[1]);
    scene.graph.delete(solo);
    scene.settle();

    let live: usize = scene
        .delegate
        .adapter_ids()
        .map(|id| scene.graph.subscriptions_owned_by(id))
        .sum();
    assert_eq!(live, scene.graph.subscription_count());

    let ids: Vec<_> = scene.delegate.adapter_ids().cloned().collect();
    for id in &ids {
        scene.delegate.remove_adapter(&mut scene.graph, id);
    }
    assert_eq!(scene.graph.subscription_count(), 0);
}

#[test]
fn removed_adapter_ignores_late_notifications() {
    let mut scene = Scene::new();
    let t0 = scene.graph.add_transform("t0", None);
    scene.graph.add_shape("shape", t0);
    scene.populate();
    let id = path("/SceneLink/t0/shape");

    scene.graph.set_visibility(t0, false);
    let batch = scene.graph.take_notifications();
    assert!(!batch.is_empty());
    let mut removed = scene.delegate.remove_adapter(&mut scene.graph, &id).unwrap();
    assert!(scene.delegate.remove_adapter(&mut scene.graph, &id).is_none());

    let mut index = MemoryRenderIndex::new();
    let mut lifecycle = LifecycleCoordinator::new();
    let mut ctx = SyncContext {
        graph: &mut scene.graph,
        index: &mut index,
        lifecycle: &mut lifecycle,
    };
    for n in &batch {
        assert_eq!(removed.handle(n, &mut ctx), Reaction::Ignore);
    }
    assert_eq!(removed.state(), LifecycleState::Removed);
    assert!(index.calls().is_empty());
}
