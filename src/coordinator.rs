//! Broadcast coordinator for the MPR viewports.
//!
//! Viewports register as they are created. Once every expected index has
//! a handle, the coordinator attaches a crosshair overlay and an
//! interaction style to each of them and resets the crosshairs from
//! viewport 0. From then on every state change goes through
//! [`SyncCoordinator`] and is pushed to all peers, each of which is asked
//! to render again.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::enums::{ActiveTool, BlendMode, OverlayWidget, ToolChangeMode};
use crate::load_pipeline::RenderSink;
use crate::presets::{PresetError, PresetLibrary, VolumeProperty};
use crate::readiness::{GateTransition, ReadinessGate, SetupStatus};
use crate::registry::{RegistryError, ViewportRegistry};
use crate::state::{SyncState, slab_thickness_from_ui};
use crate::viewport::{
    InteractionStyle, InteractionStyleConfig, SharedViewport, SharedVolumeView, ViewportHandle,
    ViewportIndex,
};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Unknown transfer function preset {0:?}")]
    UnknownPreset(String),

    #[error("Invalid transfer function preset: {0}")]
    Preset(#[from] PresetError),
}

struct Inner {
    registry: ViewportRegistry,
    gate: ReadinessGate,
    state: SyncState,
    volume_views: Vec<SharedVolumeView>,
}

pub struct SyncCoordinator {
    inner: Mutex<Inner>,
    presets: PresetLibrary,
    tool_change: ToolChangeMode,
}

impl SyncCoordinator {
    pub fn new(config: &SyncConfig, presets: PresetLibrary) -> Self {
        let state = SyncState {
            slab_thickness_mm: config.initial_slab_thickness_mm,
            preset_id: config.default_preset.clone(),
            ..SyncState::default()
        };
        Self {
            inner: Mutex::new(Inner {
                registry: ViewportRegistry::new(config.expected_viewports, config.registration),
                gate: ReadinessGate::new(config.expected_viewports),
                state,
                volume_views: Vec::new(),
            }),
            presets,
            tool_change: config.tool_change,
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock().state.clone()
    }

    pub fn status(&self) -> SetupStatus {
        self.inner.lock().gate.status()
    }

    pub fn presets(&self) -> &PresetLibrary {
        &self.presets
    }

    /// Registered handles in index order.
    pub fn handles(&self) -> Vec<(ViewportIndex, SharedViewport)> {
        self.inner.lock().registry.all()
    }

    /// Register the handle for one viewport.
    ///
    /// The handle is switched to maximum-intensity blending, gets the
    /// current slab thickness and renders once. When this registration
    /// completes the set, the one-time crosshair setup runs.
    pub fn register(
        &self,
        index: ViewportIndex,
        handle: SharedViewport,
    ) -> Result<SetupStatus, CoordinatorError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let replaced = inner.registry.register(index, handle.clone())?;

        handle.set_blend_mode(BlendMode::MaximumIntensity);
        handle.set_slab_thickness(inner.state.slab_thickness_mm);
        handle.request_render();

        match inner.gate.observe(&inner.registry) {
            GateTransition::Pending { missing } => {
                debug!(%index, ?missing, "Viewport registered, waiting for peers");
            }
            GateTransition::BecameReady => {
                info!(viewports = inner.registry.len(), "All viewports registered");
                Self::run_setup(inner);
            }
            GateTransition::AlreadyReady => {
                if replaced.is_some() {
                    debug!(%index, "Viewport replaced after setup");
                    Self::attach_tools(inner, index, handle.as_ref());
                    Self::refresh_styles(inner);
                }
            }
        }
        Ok(inner.gate.status())
    }

    pub fn register_volume_view(&self, view: SharedVolumeView) {
        let mut inner = self.inner.lock();
        if let Some(preset) = self.presets.get(&inner.state.preset_id) {
            match VolumeProperty::from_preset(preset) {
                Ok(property) => view.apply_volume_property(&property),
                Err(err) => tracing::warn!(%err, "Default preset could not be applied"),
            }
        }
        inner.volume_views.push(view);
    }

    /// Apply `mutator` to every registered handle in index order, then
    /// request a render from each. Returns the number of handles reached.
    pub fn broadcast<F>(&self, mutator: F) -> usize
    where
        F: FnMut(ViewportIndex, &dyn ViewportHandle),
    {
        let inner = self.inner.lock();
        Self::broadcast_locked(&inner, mutator)
    }

    /// Set the slab thickness from a slider value in tenths of a millimetre.
    /// Returns the thickness in millimetres.
    pub fn set_slab_thickness(&self, ui_value: f64) -> f64 {
        let thickness = slab_thickness_from_ui(ui_value);
        let mut inner = self.inner.lock();
        inner.state.slab_thickness_mm = thickness;
        let reached =
            Self::broadcast_locked(&inner, |_, handle| handle.set_slab_thickness(thickness));
        debug!(thickness, reached, "Slab thickness broadcast");
        thickness
    }

    /// Flip crosshair visibility on every viewport. Returns the new value.
    pub fn toggle_crosshairs(&self) -> bool {
        let mut inner = self.inner.lock();
        let visible = !inner.state.crosshairs_visible;
        inner.state.crosshairs_visible = visible;
        Self::broadcast_locked(&inner, |_, handle| {
            handle.set_overlay_display(OverlayWidget::Crosshairs, visible)
        });
        visible
    }

    /// Apply a transfer-function preset to the volume-render views only.
    pub fn set_preset(&self, id: &str) -> Result<(), CoordinatorError> {
        let preset = self
            .presets
            .get(id)
            .ok_or_else(|| CoordinatorError::UnknownPreset(id.to_string()))?;
        let property = VolumeProperty::from_preset(preset)?;

        let mut inner = self.inner.lock();
        for view in &inner.volume_views {
            view.apply_volume_property(&property);
        }
        for view in &inner.volume_views {
            view.request_render();
        }
        inner.state.preset_id = id.to_string();
        info!(preset = %preset.name, "Transfer function preset applied");
        Ok(())
    }

    /// Switch the active tool using the configured [`ToolChangeMode`].
    pub fn set_active_tool(&self, tool: ActiveTool) {
        self.set_active_tool_with(tool, self.tool_change);
    }

    pub fn set_active_tool_with(&self, tool: ActiveTool, mode: ToolChangeMode) {
        let mut inner = self.inner.lock();
        inner.state.active_tool = tool;
        if mode == ToolChangeMode::LocalOnly {
            return;
        }

        let visible = tool.uses_crosshairs();
        inner.state.crosshairs_visible = visible;
        let all = inner.registry.all();
        Self::broadcast_locked(&inner, |index, handle| {
            handle.set_interaction_style(InteractionStyle {
                kind: tool.interaction_style(),
                config: InteractionStyleConfig::new(&all, index),
            });
            handle.set_overlay_display(OverlayWidget::Crosshairs, visible);
        });
        debug!(?tool, "Tool change broadcast");
    }

    /// Render every MPR viewport and every volume-render view.
    pub fn rerender_all(&self) {
        let inner = self.inner.lock();
        for handle in inner.registry.handles() {
            handle.request_render();
        }
        for view in &inner.volume_views {
            view.request_render();
        }
    }

    fn broadcast_locked<F>(inner: &Inner, mut mutator: F) -> usize
    where
        F: FnMut(ViewportIndex, &dyn ViewportHandle),
    {
        let all = inner.registry.all();
        for (index, handle) in &all {
            mutator(*index, handle.as_ref());
        }
        for (_, handle) in &all {
            handle.request_render();
        }
        all.len()
    }

    fn run_setup(inner: &Inner) {
        let all = inner.registry.all();
        for (index, handle) in &all {
            Self::attach_tools(inner, *index, handle.as_ref());
        }

        let anchor = ViewportIndex(0);
        if let Some(anchor_handle) = inner.registry.get(anchor) {
            anchor_handle.reset_crosshairs(&all, anchor);
        }
        for (_, handle) in &all {
            handle.request_render();
        }
    }

    fn attach_tools(inner: &Inner, index: ViewportIndex, handle: &dyn ViewportHandle) {
        let all = inner.registry.all();
        handle.add_overlay_widget(OverlayWidget::Crosshairs);
        handle.set_overlay_display(OverlayWidget::Crosshairs, inner.state.crosshairs_visible);
        handle.set_interaction_style(InteractionStyle {
            kind: inner.state.active_tool.interaction_style(),
            config: InteractionStyleConfig::new(&all, index),
        });
    }

    fn refresh_styles(inner: &Inner) {
        let all = inner.registry.all();
        for (index, handle) in &all {
            handle.set_interaction_style(InteractionStyle {
                kind: inner.state.active_tool.interaction_style(),
                config: InteractionStyleConfig::new(&all, *index),
            });
        }
    }
}

impl RenderSink for SyncCoordinator {
    fn render_all(&self) {
        self.rerender_all();
    }
}
