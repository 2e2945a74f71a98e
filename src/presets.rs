//! Transfer-function presets for the volume-render view.
//!
//! Presets use the 3D Slicer layout: every curve is a string of numbers
//! whose first token is the count of values that follow. Parsing them into
//! a [`VolumeProperty`] is all this module does; interpreting the curves is
//! left to the renderer behind [`crate::viewport::VolumeRenderHandle`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Invalid number {value:?} in preset field {field}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Preset field {field} declares {declared} values but has {found}")]
    CountMismatch {
        field: &'static str,
        declared: usize,
        found: usize,
    },

    #[error("Preset field {field} needs groups of {stride} values, got {found}")]
    Stride {
        field: &'static str,
        stride: usize,
        found: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFunctionPreset {
    pub id: String,
    pub name: String,
    pub color_transfer: String,
    pub scalar_opacity: String,
    pub gradient_opacity: String,
    #[serde(default = "default_flag")]
    pub interpolation: String,
    #[serde(default = "default_flag")]
    pub shade: String,
    pub ambient: String,
    pub diffuse: String,
    pub specular: String,
    pub specular_power: String,
    #[serde(default)]
    pub effective_range: Option<String>,
}

fn default_flag() -> String {
    "1".to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationType {
    Nearest,
    FastLinear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientOpacity {
    pub min_value: f64,
    pub min_opacity: f64,
    pub max_value: f64,
    pub max_opacity: f64,
}

/// Parsed, validated form of a preset, ready to hand to a renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeProperty {
    pub preset_id: String,
    /// `[value, r, g, b]` control points.
    pub rgb_points: Vec<[f64; 4]>,
    /// `[value, opacity]` control points.
    pub scalar_opacity: Vec<[f64; 2]>,
    pub gradient_opacity: GradientOpacity,
    pub interpolation: InterpolationType,
    pub shade: bool,
    pub ambient: f64,
    pub diffuse: f64,
    pub specular: f64,
    pub specular_power: f64,
}

impl VolumeProperty {
    pub fn from_preset(preset: &TransferFunctionPreset) -> Result<Self, PresetError> {
        let colors = parse_counted("colorTransfer", &preset.color_transfer, 4)?;
        let opacities = parse_counted("scalarOpacity", &preset.scalar_opacity, 2)?;
        let gradient = parse_counted("gradientOpacity", &preset.gradient_opacity, 4)?;
        let [min_value, min_opacity, max_value, max_opacity] = match gradient.as_slice() {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => {
                return Err(PresetError::Stride {
                    field: "gradientOpacity",
                    stride: 4,
                    found: gradient.len(),
                });
            }
        };

        Ok(Self {
            preset_id: preset.id.clone(),
            rgb_points: colors
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect(),
            scalar_opacity: opacities.chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
            gradient_opacity: GradientOpacity {
                min_value,
                min_opacity,
                max_value,
                max_opacity,
            },
            interpolation: if preset.interpolation.trim() == "1" {
                InterpolationType::FastLinear
            } else {
                InterpolationType::Nearest
            },
            shade: preset.shade.trim() == "1",
            ambient: parse_scalar("ambient", &preset.ambient)?,
            diffuse: parse_scalar("diffuse", &preset.diffuse)?,
            specular: parse_scalar("specular", &preset.specular)?,
            specular_power: parse_scalar("specularPower", &preset.specular_power)?,
        })
    }

    /// Scalar span covered by the color curve.
    pub fn color_range(&self) -> Option<(f64, f64)> {
        let mut values = self.rgb_points.iter().map(|p| p[0]);
        let first = values.next()?;
        Some(values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

fn parse_scalar(field: &'static str, raw: &str) -> Result<f64, PresetError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| PresetError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

fn parse_counted(field: &'static str, raw: &str, stride: usize) -> Result<Vec<f64>, PresetError> {
    let mut tokens = raw.split_whitespace();
    let declared = match tokens.next() {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| PresetError::InvalidNumber {
                field,
                value: token.to_string(),
            })?,
        None => 0,
    };
    let values = tokens
        .map(|token| parse_scalar(field, token))
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() != declared {
        return Err(PresetError::CountMismatch {
            field,
            declared,
            found: values.len(),
        });
    }
    if values.len() % stride != 0 {
        return Err(PresetError::Stride {
            field,
            stride,
            found: values.len(),
        });
    }
    Ok(values)
}

#[derive(Clone, Debug, Default)]
pub struct PresetLibrary {
    presets: Vec<TransferFunctionPreset>,
}

impl PresetLibrary {
    pub fn new(presets: Vec<TransferFunctionPreset>) -> Self {
        Self { presets }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_presets())
    }

    /// Load presets from a JSON array in the Slicer preset layout.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PresetError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PresetError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn get(&self, id: &str) -> Option<&TransferFunctionPreset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|preset| preset.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

fn preset(
    id: &str,
    name: &str,
    color_transfer: &str,
    scalar_opacity: &str,
    shading: [&str; 4],
) -> TransferFunctionPreset {
    let [ambient, diffuse, specular, specular_power] = shading;
    TransferFunctionPreset {
        id: id.to_string(),
        name: name.to_string(),
        color_transfer: color_transfer.to_string(),
        scalar_opacity: scalar_opacity.to_string(),
        gradient_opacity: "4 0 1 255 1".to_string(),
        interpolation: "1".to_string(),
        shade: "1".to_string(),
        ambient: ambient.to_string(),
        diffuse: diffuse.to_string(),
        specular: specular.to_string(),
        specular_power: specular_power.to_string(),
        effective_range: Some("-3024 3071".to_string()),
    }
}

fn builtin_presets() -> Vec<TransferFunctionPreset> {
    vec![
        preset(
            "vtkMRMLVolumePropertyNode1",
            "CT-AAA",
            "24 -3024 0 0 0 143.556 0.615686 0.356863 0.184314 166.222 0.882353 0.603922 0.290196 \
             214.389 1 1 1 419.736 1 0.937033 0.954531 3071 0.827451 0.658824 1",
            "12 -3024 0 143.556 0 166.222 0.686275 214.389 0.696078 419.736 0.833333 3071 0.803922",
            ["0.1", "0.9", "0.2", "10"],
        ),
        preset(
            "vtkMRMLVolumePropertyNode3",
            "CT-Soft-Tissue",
            "20 -3024 0 0 0 -160 0.55 0.25 0.15 -55 0.88 0.6 0.29 200 1 0.94 0.95 3071 0.83 0.66 1",
            "10 -3024 0 -160 0 40 0.4 120 0.85 3071 1",
            ["0.2", "1", "0", "1"],
        ),
        preset(
            "vtkMRMLVolumePropertyNode4",
            "CT-Bone",
            "16 -3024 0 0 0 -16.4458 0.729412 0.254902 0.301961 641.385 0.905882 0.815686 0.552941 \
             3071 1 1 1",
            "8 -3024 0 -16.4458 0 641.385 0.715686 3071 0.705882",
            ["0.2", "1", "0", "1"],
        ),
        preset(
            "vtkMRMLVolumePropertyNode5",
            "CT-MIP",
            "8 -3024 0 0 0 3071 1 1 1",
            "8 -3024 0 -637.62 0 700 1 3071 1",
            ["0.1", "0.9", "0.2", "10"],
        ),
    ]
}
