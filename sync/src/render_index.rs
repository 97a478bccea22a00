//! The render cache that adapters populate.
//!
//! The index stores prims keyed by [`ScenePath`] together with the dirty
//! bits accumulated since the renderer last synced them. Adapters only
//! insert, remove and mark dirty; pulling data is the renderer's business.

use std::collections::BTreeMap;

use scenelink_core::ScenePath;

use crate::dirty::DirtyBits;
use crate::error::SyncError;

/// Renderable prim types an adapter can insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    /// Polygon mesh.
    Mesh,
    /// Transform-only marker.
    Locator,
}

/// Write interface of the render cache.
pub trait RenderIndex {
    /// Whether prims of `prim_type` can be inserted.
    fn is_rprim_type_supported(&self, prim_type: PrimType) -> bool;

    /// Whether instancer entities can be inserted.
    fn is_instancer_supported(&self) -> bool;

    /// Inserts a renderable prim, optionally drawn through `instancer`.
    fn insert_rprim(
        &mut self,
        prim_type: PrimType,
        path: &ScenePath,
        instancer: Option<&ScenePath>,
    ) -> Result<(), SyncError>;

    /// Inserts an instancer entity whose prototype is `prototype`.
    fn insert_instancer(&mut self, path: &ScenePath, prototype: &ScenePath) -> Result<(), SyncError>;

    /// Removes a prim. Unknown paths are ignored.
    fn remove_rprim(&mut self, path: &ScenePath);

    /// Removes an instancer. Unknown paths are ignored.
    fn remove_instancer(&mut self, path: &ScenePath);

    /// ORs `bits` into the prim's dirty state. Unknown paths are ignored.
    fn mark_rprim_dirty(&mut self, path: &ScenePath, bits: DirtyBits);

    /// ORs `bits` into the instancer's dirty state. Unknown paths are
    /// ignored.
    fn mark_instancer_dirty(&mut self, path: &ScenePath, bits: DirtyBits);
}

/// One call received by a [`MemoryRenderIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    InsertRprim(ScenePath),
    InsertInstancer(ScenePath),
    RemoveRprim(ScenePath),
    RemoveInstancer(ScenePath),
    MarkRprimDirty(ScenePath, DirtyBits),
    MarkInstancerDirty(ScenePath, DirtyBits),
}

/// A renderable prim stored in a [`MemoryRenderIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RprimEntry {
    pub prim_type: PrimType,
    pub instancer: Option<ScenePath>,
    pub dirty: DirtyBits,
}

/// An instancer stored in a [`MemoryRenderIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancerEntry {
    pub prototype: ScenePath,
    pub dirty: DirtyBits,
}

/// Render index kept in memory, recording every call it receives.
#[derive(Debug, Clone)]
pub struct MemoryRenderIndex {
    rprims: BTreeMap<ScenePath, RprimEntry>,
    instancers: BTreeMap<ScenePath, InstancerEntry>,
    supported: Vec<PrimType>,
    instancers_supported: bool,
    calls: Vec<IndexCall>,
}

impl Default for MemoryRenderIndex {
    fn default() -> Self {
        Self::with_supported(&[PrimType::Mesh, PrimType::Locator])
    }
}

impl MemoryRenderIndex {
    /// Index supporting every prim type and instancers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index supporting only `types` (and instancers).
    pub fn with_supported(types: &[PrimType]) -> Self {
        Self {
            rprims: BTreeMap::new(),
            instancers: BTreeMap::new(),
            supported: types.to_vec(),
            instancers_supported: true,
            calls: Vec::new(),
        }
    }

    /// Disables instancer support.
    pub fn without_instancers(mut self) -> Self {
        self.instancers_supported = false;
        self
    }

    /// Every call received since the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> &[IndexCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Returns and clears the dirty bits of every entry, as a renderer sync
    /// would. Entries with no dirty bits are omitted.
    pub fn take_dirty(&mut self) -> BTreeMap<ScenePath, DirtyBits> {
        let rprims = self
            .rprims
            .iter_mut()
            .map(|(path, entry)| (path, &mut entry.dirty));
        let instancers = self
            .instancers
            .iter_mut()
            .map(|(path, entry)| (path, &mut entry.dirty));
        rprims
            .chain(instancers)
            .filter(|(_, dirty)| !dirty.is_empty())
            .map(|(path, dirty)| (path.clone(), std::mem::take(dirty)))
            .collect()
    }

    pub fn rprim(&self, path: &ScenePath) -> Option<&RprimEntry> {
        self.rprims.get(path)
    }

    pub fn instancer(&self, path: &ScenePath) -> Option<&InstancerEntry> {
        self.instancers.get(path)
    }

    /// Dirty bits of the prim or instancer at `path`.
    pub fn dirty_bits(&self, path: &ScenePath) -> Option<DirtyBits> {
        self.rprims
            .get(path)
            .map(|e| e.dirty)
            .or_else(|| self.instancers.get(path).map(|e| e.dirty))
    }

    pub fn rprim_count(&self) -> usize {
        self.rprims.len()
    }

    pub fn instancer_count(&self) -> usize {
        self.instancers.len()
    }

    pub fn rprim_paths(&self) -> impl Iterator<Item = &ScenePath> {
        self.rprims.keys()
    }

    fn contains(&self, path: &ScenePath) -> bool {
        self.rprims.contains_key(path) || self.instancers.contains_key(path)
    }
}

impl RenderIndex for MemoryRenderIndex {
    fn is_rprim_type_supported(&self, prim_type: PrimType) -> bool {
        self.supported.contains(&prim_type)
    }

    fn is_instancer_supported(&self) -> bool {
        self.instancers_supported
    }

    fn insert_rprim(
        &mut self,
        prim_type: PrimType,
        path: &ScenePath,
        instancer: Option<&ScenePath>,
    ) -> Result<(), SyncError> {
        if !self.is_rprim_type_supported(prim_type) {
            return Err(SyncError::UnsupportedPrimType(prim_type));
        }
        if self.contains(path) {
            return Err(SyncError::DuplicatePath(path.clone()));
        }
        self.calls.push(IndexCall::InsertRprim(path.clone()));
        self.rprims.insert(
            path.clone(),
            RprimEntry {
                prim_type,
                instancer: instancer.cloned(),
                dirty: DirtyBits::ALL,
            },
        );
        Ok(())
    }

    fn insert_instancer(&mut self, path: &ScenePath, prototype: &ScenePath) -> Result<(), SyncError> {
        if !self.instancers_supported {
            return Err(SyncError::InstancerUnsupported);
        }
        if self.contains(path) {
            return Err(SyncError::DuplicatePath(path.clone()));
        }
        self.calls.push(IndexCall::InsertInstancer(path.clone()));
        self.instancers.insert(
            path.clone(),
            InstancerEntry {
                prototype: prototype.clone(),
                dirty: DirtyBits::ALL,
            },
        );
        Ok(())
    }

    fn remove_rprim(&mut self, path: &ScenePath) {
        if self.rprims.remove(path).is_some() {
            self.calls.push(IndexCall::RemoveRprim(path.clone()));
        }
    }

    fn remove_instancer(&mut self, path: &ScenePath) {
        if self.instancers.remove(path).is_some() {
            self.calls.push(IndexCall::RemoveInstancer(path.clone()));
        }
    }

    fn mark_rprim_dirty(&mut self, path: &ScenePath, bits: DirtyBits) {
        let Some(entry) = self.rprims.get_mut(path) else {
            log::trace!("Ignoring dirty mark on unknown prim {path}");
            return;
        };
        entry.dirty |= bits;
        self.calls.push(IndexCall::MarkRprimDirty(path.clone(), bits));
    }

    fn mark_instancer_dirty(&mut self, path: &ScenePath, bits: DirtyBits) {
        let Some(entry) = self.instancers.get_mut(path) else {
            log::trace!("Ignoring dirty mark on unknown instancer {path}");
            return;
        };
        entry.dirty |= bits;
        self.calls
            .push(IndexCall::MarkInstancerDirty(path.clone(), bits));
    }
}
