//! Forwarding of dirty bits to the render index.

use scenelink_core::ScenePath;

use crate::dirty::DirtyBits;
use crate::render_index::RenderIndex;

/// Marks `prim` dirty with `bits` and, if the prim is drawn through an
/// instancer, marks that instancer with the same bits.
///
/// Returns `false` without touching the index when `bits` is empty.
pub fn propagate(
    index: &mut dyn RenderIndex,
    prim: &ScenePath,
    instancer: Option<&ScenePath>,
    bits: DirtyBits,
) -> bool {
    if bits.is_empty() {
        return false;
    }
    log::debug!("Marking {prim} dirty: {bits:?}");
    index.mark_rprim_dirty(prim, bits);
    if let Some(instancer) = instancer {
        index.mark_instancer_dirty(instancer, bits);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_index::{IndexCall, MemoryRenderIndex, PrimType};

    fn setup() -> (MemoryRenderIndex, ScenePath, ScenePath) {
        let mut index = MemoryRenderIndex::new();
        let prim = ScenePath::new("/SceneLink/shape").unwrap();
        let instancer = prim.append_property("instancer");
        index.insert_instancer(&instancer, &prim).unwrap();
        index
            .insert_rprim(PrimType::Mesh, &prim, Some(&instancer))
            .unwrap();
        index.clear_calls();
        (index, prim, instancer)
    }

    #[test]
    fn empty_bits_never_reach_the_index() {
        let (mut index, prim, instancer) = setup();
        assert!(!propagate(&mut index, &prim, Some(&instancer), DirtyBits::empty()));
        assert!(index.calls().is_empty());
    }

    #[test]
    fn instancer_receives_the_same_bits() {
        let (mut index, prim, instancer) = setup();
        assert!(propagate(&mut index, &prim, Some(&instancer), DirtyBits::TRANSFORM));
        assert_eq!(
            index.calls(),
            &[
                IndexCall::MarkRprimDirty(prim, DirtyBits::TRANSFORM),
                IndexCall::MarkInstancerDirty(instancer, DirtyBits::TRANSFORM),
            ]
        );
    }

    #[test]
    fn plain_prim_marks_once() {
        let (mut index, prim, _) = setup();
        propagate(&mut index, &prim, None, DirtyBits::VISIBILITY);
        assert_eq!(index.calls().len(), 1);
    }
}
