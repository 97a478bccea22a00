//! Render-index dirty-bit vocabulary.

use bitflags::bitflags;

bitflags! {
    /// Categories of render state that must be re-synchronized before the
    /// next draw. Bits combine freely; the empty set means "nothing to do"
    /// and is never forwarded to the render index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyBits: u32 {
        /// Prim visibility changed.
        const VISIBILITY = 1 << 0;
        /// Prim (or instancer) transform changed.
        const TRANSFORM = 1 << 1;
        /// Instancer topology changed.
        const INSTANCER = 1 << 2;
        /// Instance index list changed.
        const INSTANCE_INDEX = 1 << 3;
        /// Primvar values changed (including per-instance primvars).
        const PRIMVAR = 1 << 4;
        /// Point positions changed.
        const POINTS = 1 << 5;
        /// Object-space extent changed.
        const EXTENT = 1 << 6;
        /// Mesh topology changed.
        const TOPOLOGY = 1 << 7;

        /// Everything that changes when the set of instance placements does.
        const INSTANCER_TOPOLOGY = Self::INSTANCER.bits()
            | Self::INSTANCE_INDEX.bits()
            | Self::PRIMVAR.bits();
        /// Every bit, used when a prim is first inserted.
        const ALL = Self::VISIBILITY.bits()
            | Self::TRANSFORM.bits()
            | Self::INSTANCER.bits()
            | Self::INSTANCE_INDEX.bits()
            | Self::PRIMVAR.bits()
            | Self::POINTS.bits()
            | Self::EXTENT.bits()
            | Self::TOPOLOGY.bits();
    }
}

impl Default for DirtyBits {
    fn default() -> Self {
        Self::empty()
    }
}
