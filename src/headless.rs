//! In-memory viewport implementations.
//!
//! They render slab projections of a [`SharedVolume`] on the CPU and record
//! every call made on them, which is enough to drive the coordinator end to
//! end without a windowing system.

use image::GrayImage;
use parking_lot::Mutex;
use tracing::trace;

use crate::enums::{BlendMode, InteractionStyleKind, Orientation, OverlayWidget};
use crate::presets::VolumeProperty;
use crate::viewport::{
    InteractionStyle, SharedViewport, ViewportHandle, ViewportIndex, VolumeRenderHandle,
};
use crate::volume::SharedVolume;

#[derive(Debug, Default)]
struct ViewportState {
    widgets: Vec<(OverlayWidget, bool)>,
    style: Option<InteractionStyle>,
    blend_mode: BlendMode,
    slab_thickness_mm: f64,
    crosshairs_center: Option<[f64; 3]>,
    crosshairs_resets: usize,
    render_count: usize,
    last_frame: Option<GrayImage>,
}

pub struct HeadlessViewport {
    orientation: Orientation,
    volume: SharedVolume,
    state: Mutex<ViewportState>,
}

impl HeadlessViewport {
    pub fn new(orientation: Orientation, volume: SharedVolume) -> Self {
        Self {
            orientation,
            volume,
            state: Mutex::new(ViewportState::default()),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn render_count(&self) -> usize {
        self.state.lock().render_count
    }

    pub fn slab_thickness(&self) -> f64 {
        self.state.lock().slab_thickness_mm
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.state.lock().blend_mode
    }

    pub fn crosshairs_visible(&self) -> Option<bool> {
        self.state
            .lock()
            .widgets
            .iter()
            .find(|(widget, _)| *widget == OverlayWidget::Crosshairs)
            .map(|(_, visible)| *visible)
    }

    pub fn crosshairs_center(&self) -> Option<[f64; 3]> {
        self.state.lock().crosshairs_center
    }

    /// Number of times this viewport anchored a crosshair reset.
    pub fn crosshairs_resets(&self) -> usize {
        self.state.lock().crosshairs_resets
    }

    pub fn interaction_style_kind(&self) -> Option<InteractionStyleKind> {
        self.state.lock().style.as_ref().map(|style| style.kind)
    }

    pub fn interaction_style(&self) -> Option<InteractionStyle> {
        self.state.lock().style.clone()
    }

    pub fn last_frame(&self) -> Option<GrayImage> {
        self.state.lock().last_frame.clone()
    }
}

impl ViewportHandle for HeadlessViewport {
    fn add_overlay_widget(&self, widget: OverlayWidget) {
        let mut state = self.state.lock();
        if !state.widgets.iter().any(|(existing, _)| *existing == widget) {
            state.widgets.push((widget, true));
        }
    }

    fn overlay_widgets(&self) -> Vec<OverlayWidget> {
        self.state.lock().widgets.iter().map(|(widget, _)| *widget).collect()
    }

    fn set_overlay_display(&self, widget: OverlayWidget, visible: bool) {
        let mut state = self.state.lock();
        if let Some(entry) = state.widgets.iter_mut().find(|(existing, _)| *existing == widget) {
            entry.1 = visible;
        }
    }

    fn set_interaction_style(&self, style: InteractionStyle) {
        self.state.lock().style = Some(style);
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        self.state.lock().blend_mode = mode;
    }

    fn set_slab_thickness(&self, thickness_mm: f64) {
        self.state.lock().slab_thickness_mm = thickness_mm;
    }

    fn set_crosshairs_center(&self, world: [f64; 3]) {
        self.state.lock().crosshairs_center = Some(world);
    }

    fn reset_crosshairs(&self, handles: &[(ViewportIndex, SharedViewport)], anchor: ViewportIndex) {
        let center = self.volume.read().center();
        self.state.lock().crosshairs_resets += 1;
        trace!(%anchor, peers = handles.len(), ?center, "Crosshairs reset");
        for (_, handle) in handles {
            handle.set_crosshairs_center(center);
        }
    }

    fn request_render(&self) {
        let (blend_mode, thickness, center) = {
            let state = self.state.lock();
            (state.blend_mode, state.slab_thickness_mm, state.crosshairs_center)
        };
        let frame = {
            let volume = self.volume.read();
            let world = center.unwrap_or_else(|| volume.center());
            let index = volume.index_at(self.orientation, world);
            volume.render_slab(self.orientation, index, thickness, blend_mode)
        };

        let mut state = self.state.lock();
        state.render_count += 1;
        if frame.is_some() {
            state.last_frame = frame;
        }
    }
}

#[derive(Debug, Default)]
struct VolumeViewState {
    property: Option<VolumeProperty>,
    render_count: usize,
}

/// Stand-in for the 3D volume-render view.
#[derive(Default)]
pub struct HeadlessVolumeView {
    state: Mutex<VolumeViewState>,
}

impl HeadlessVolumeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_count(&self) -> usize {
        self.state.lock().render_count
    }

    pub fn volume_property(&self) -> Option<VolumeProperty> {
        self.state.lock().property.clone()
    }
}

impl VolumeRenderHandle for HeadlessVolumeView {
    fn apply_volume_property(&self, property: &VolumeProperty) {
        self.state.lock().property = Some(property.clone());
    }

    fn request_render(&self) {
        self.state.lock().render_count += 1;
    }
}
