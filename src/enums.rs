use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    /// Index of the volume axis this orientation slices through, in the
    /// (depth, height, width) layout of [`crate::volume::Volume`].
    pub fn axis(self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }

    /// Conventional viewport role: 0 = coronal, 1 = sagittal, 2 = axial.
    pub const fn conventional_index(self) -> usize {
        match self {
            Orientation::Coronal => 0,
            Orientation::Sagittal => 1,
            Orientation::Axial => 2,
        }
    }
}

/// How voxels across the slab are combined into one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Composite,
    MaximumIntensity,
    MinimumIntensity,
    AverageIntensity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveTool {
    #[default]
    Crosshairs,
    Rotate,
    WindowLevel,
    Zoom,
    Pan,
    StackScroll,
    Brush,
    CircleScissors,
    FreehandScissors,
    RectangleScissors,
}

impl ActiveTool {
    pub fn interaction_style(self) -> InteractionStyleKind {
        match self {
            ActiveTool::Crosshairs => InteractionStyleKind::MprCrosshairs,
            ActiveTool::Rotate => InteractionStyleKind::MprRotate,
            _ => InteractionStyleKind::MprWindowLevel,
        }
    }

    pub fn uses_crosshairs(self) -> bool {
        matches!(self, ActiveTool::Crosshairs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionStyleKind {
    MprCrosshairs,
    MprRotate,
    MprWindowLevel,
}

/// Whether a tool switch stays in the coordinator state or is pushed to
/// every viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChangeMode {
    #[default]
    LocalOnly,
    BroadcastAndReconfigureOverlays,
}

/// What happens when a viewport index that already has a handle is
/// registered again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    #[default]
    Reject,
    Replace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayWidget {
    Crosshairs,
}

#[derive(Clone, Copy, Debug, Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
