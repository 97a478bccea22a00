//! Classification of graph notifications.
//!
//! [`classify`] is pure: it turns one [`Notification`] into the
//! [`Reaction`] an adapter should carry out. Handlers run while the graph
//! is still mid-edit, so the only state consulted is the adapter's cached
//! visibility, never a fresh graph query.

use crate::dirty::DirtyBits;
use crate::graph::{CallbackKind, Notification, attributes};

/// Which node a recreation request should be keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// The adapter's own node.
    SameNode,
    /// The node ending the second path to the adapter's node.
    SecondInstancePath,
}

/// What an adapter does in response to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Ignore,
    Mark {
        bits: DirtyBits,
        invalidate_transform: bool,
    },
    /// Tear down and schedule a recreation.
    Detach { replacement: Replacement },
    MarkAndDetach {
        bits: DirtyBits,
        replacement: Replacement,
    },
}

impl Reaction {
    /// Dirty bits this reaction raises.
    pub fn bits(&self) -> DirtyBits {
        match self {
            Reaction::Mark { bits, .. } | Reaction::MarkAndDetach { bits, .. } => *bits,
            Reaction::Ignore | Reaction::Detach { .. } => DirtyBits::empty(),
        }
    }

    /// Whether the reaction ends with the adapter detached.
    pub fn detaches(&self) -> bool {
        matches!(
            self,
            Reaction::Detach { .. } | Reaction::MarkAndDetach { .. }
        )
    }
}

/// Classifies `notification` for an adapter whose last known visibility is
/// `currently_visible`.
pub fn classify(notification: &Notification, currently_visible: bool) -> Reaction {
    match notification.callback {
        CallbackKind::TransformNodeDirty => {
            classify_transform_dirty(notification, currently_visible)
        }
        CallbackKind::HierarchyChanged | CallbackKind::AncestorPreRemoval => Reaction::Detach {
            replacement: Replacement::SameNode,
        },
        CallbackKind::InstancerNodeDirty => Reaction::Mark {
            bits: DirtyBits::INSTANCER_TOPOLOGY,
            invalidate_transform: false,
        },
        CallbackKind::InstancerNodePreRemoval => Reaction::MarkAndDetach {
            bits: DirtyBits::INSTANCER_TOPOLOGY,
            replacement: Replacement::SameNode,
        },
        CallbackKind::MasterNodePreRemoval => Reaction::Detach {
            replacement: Replacement::SecondInstancePath,
        },
        CallbackKind::ShapeGeometryDirty => classify_geometry_dirty(notification),
    }
}

fn classify_transform_dirty(notification: &Notification, currently_visible: bool) -> Reaction {
    if notification.is_attribute(attributes::VISIBILITY) {
        // A hidden-and-moved edit arrives as a single visibility event.
        if currently_visible {
            Reaction::Mark {
                bits: DirtyBits::VISIBILITY | DirtyBits::TRANSFORM,
                invalidate_transform: true,
            }
        } else {
            Reaction::Mark {
                bits: DirtyBits::VISIBILITY,
                invalidate_transform: false,
            }
        }
    } else if currently_visible {
        Reaction::Mark {
            bits: DirtyBits::TRANSFORM,
            invalidate_transform: true,
        }
    } else {
        Reaction::Ignore
    }
}

fn classify_geometry_dirty(notification: &Notification) -> Reaction {
    let Some(attribute) = notification.attribute.as_deref() else {
        return Reaction::Ignore;
    };
    let bits = match attribute {
        attributes::POINTS | attributes::BOUNDS => DirtyBits::POINTS | DirtyBits::EXTENT,
        attributes::FACE_VERTEX_COUNTS | attributes::FACE_VERTEX_INDICES => {
            DirtyBits::TOPOLOGY | DirtyBits::POINTS | DirtyBits::EXTENT | DirtyBits::PRIMVAR
        }
        _ => return Reaction::Ignore,
    };
    Reaction::Mark {
        bits,
        invalidate_transform: false,
    }
}
