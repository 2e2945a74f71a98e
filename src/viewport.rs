//! Handles to the rendering surfaces the coordinator drives.
//!
//! The coordinator never renders anything itself. Every viewport is reached
//! through [`ViewportHandle`], and the 3D view through
//! [`VolumeRenderHandle`]. Implementations are shared as `Arc<dyn _>`, so
//! methods take `&self` and implementations keep their own interior state.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::enums::{BlendMode, InteractionStyleKind, Orientation, OverlayWidget};
use crate::presets::VolumeProperty;

/// Role of a viewport in the layout. Conventionally 0 is coronal,
/// 1 sagittal and 2 axial, but any assignment is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewportIndex(pub usize);

impl ViewportIndex {
    pub const CORONAL: ViewportIndex = ViewportIndex(Orientation::Coronal.conventional_index());
    pub const SAGITTAL: ViewportIndex = ViewportIndex(Orientation::Sagittal.conventional_index());
    pub const AXIAL: ViewportIndex = ViewportIndex(Orientation::Axial.conventional_index());
}

impl fmt::Display for ViewportIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewport {}", self.0)
    }
}

impl From<usize> for ViewportIndex {
    fn from(value: usize) -> Self {
        ViewportIndex(value)
    }
}

impl From<Orientation> for ViewportIndex {
    fn from(orientation: Orientation) -> Self {
        ViewportIndex(orientation.conventional_index())
    }
}

pub type SharedViewport = Arc<dyn ViewportHandle>;

/// Configuration handed to an interaction style: the full ordered registry
/// and the index of the viewport the style is attached to.
///
/// Peers are held weakly since the style lives inside one of them.
#[derive(Clone)]
pub struct InteractionStyleConfig {
    pub handles: Vec<(ViewportIndex, Weak<dyn ViewportHandle>)>,
    pub self_index: ViewportIndex,
}

impl InteractionStyleConfig {
    pub fn new(handles: &[(ViewportIndex, SharedViewport)], self_index: ViewportIndex) -> Self {
        Self {
            handles: handles
                .iter()
                .map(|(index, handle)| (*index, Arc::downgrade(handle)))
                .collect(),
            self_index,
        }
    }

    pub fn indices(&self) -> Vec<ViewportIndex> {
        self.handles.iter().map(|(index, _)| *index).collect()
    }

    /// Peers that are still alive, in index order.
    pub fn peers(&self) -> Vec<(ViewportIndex, SharedViewport)> {
        self.handles
            .iter()
            .filter_map(|(index, weak)| weak.upgrade().map(|handle| (*index, handle)))
            .collect()
    }
}

impl fmt::Debug for InteractionStyleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionStyleConfig")
            .field("handles", &self.indices())
            .field("self_index", &self.self_index)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct InteractionStyle {
    pub kind: InteractionStyleKind,
    pub config: InteractionStyleConfig,
}

/// One MPR rendering viewport.
///
/// Implementations must not call back into the coordinator from these
/// methods; they run while the coordinator holds its lock.
pub trait ViewportHandle: Send + Sync {
    fn add_overlay_widget(&self, widget: OverlayWidget);

    fn overlay_widgets(&self) -> Vec<OverlayWidget>;

    fn set_overlay_display(&self, widget: OverlayWidget, visible: bool);

    fn set_interaction_style(&self, style: InteractionStyle);

    fn set_blend_mode(&self, mode: BlendMode);

    fn set_slab_thickness(&self, thickness_mm: f64);

    /// Move this viewport's crosshair centre to a world position (mm).
    fn set_crosshairs_center(&self, world: [f64; 3]);

    /// Cross-viewport crosshair reset, invoked once on the anchor viewport
    /// with every registered handle in index order.
    fn reset_crosshairs(&self, handles: &[(ViewportIndex, SharedViewport)], anchor: ViewportIndex);

    fn request_render(&self);
}

/// The volume-render (3D) view. Presets are applied here only.
pub trait VolumeRenderHandle: Send + Sync {
    fn apply_volume_property(&self, property: &VolumeProperty);

    fn request_render(&self);
}

pub type SharedVolumeView = Arc<dyn VolumeRenderHandle>;
