use crate::enums::ActiveTool;

pub const DEFAULT_PRESET_ID: &str = "vtkMRMLVolumePropertyNode4";
pub const DEFAULT_SLAB_THICKNESS_MM: f64 = 0.1;

/// Cross-viewport state kept consistent by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncState {
    pub crosshairs_visible: bool,
    pub slab_thickness_mm: f64,
    pub active_tool: ActiveTool,
    pub preset_id: String,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            crosshairs_visible: true,
            slab_thickness_mm: DEFAULT_SLAB_THICKNESS_MM,
            active_tool: ActiveTool::default(),
            preset_id: DEFAULT_PRESET_ID.to_string(),
        }
    }
}

/// Slab thickness slider values are tenths of a millimetre.
pub fn slab_thickness_from_ui(value: f64) -> f64 {
    value / 10.0
}
