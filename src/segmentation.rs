//! Labelmap storage for the 2D segmentation tools.
//!
//! Each enabled element owns one or more 3D labelmaps parallel to the image
//! stack it displays. Every write keeps the previous buffer so it can be
//! undone, up to a fixed number of steps per labelmap.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use ndarray::{Array3, ArrayView2, s};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("{0} is not enabled")]
    UnknownElement(ElementId),

    #[error("{element} has no labelmap {index}")]
    UnknownLabelmap { element: ElementId, index: usize },

    #[error("Image index {index} is out of range ({frames} frames)")]
    ImageIndex { index: usize, frames: usize },

    #[error("Voxel {voxel:?} is outside the labelmap")]
    VoxelOutOfRange { voxel: (usize, usize, usize) },

    #[error("Labelmap buffer has {found} bytes, expected {expected}")]
    BufferSize { expected: usize, found: usize },

    #[error("Invalid byte {0:?} in labelmap text")]
    InvalidText(String),
}

/// Undo steps kept per labelmap unless configured otherwise.
pub const DEFAULT_UNDO_DEPTH: usize = 20;

/// Segment values per voxel, (frames, rows, columns).
#[derive(Clone, Debug)]
pub struct Labelmap3D {
    data: Array3<u16>,
    history: VecDeque<Array3<u16>>,
    undo_depth: usize,
}

impl Labelmap3D {
    pub fn new(dim: (usize, usize, usize)) -> Self {
        Self::with_undo_depth(dim, DEFAULT_UNDO_DEPTH)
    }

    /// An empty labelmap keeping at most `undo_depth` previous buffers.
    pub fn with_undo_depth(dim: (usize, usize, usize), undo_depth: usize) -> Self {
        Self {
            data: Array3::zeros(dim),
            history: VecDeque::with_capacity(undo_depth.min(DEFAULT_UNDO_DEPTH)),
            undo_depth,
        }
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Number of writes that can currently be undone.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Raw buffer in native byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let standard = self.data.as_standard_layout();
        match standard.as_slice() {
            Some(values) => bytemuck::cast_slice::<u16, u8>(values).to_vec(),
            None => Vec::new(),
        }
    }

    /// Comma-separated bytes, the format labelmaps are exported as.
    pub fn to_text(&self) -> String {
        self.to_bytes()
            .iter()
            .map(|byte| byte.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Segments present in the labelmap, excluding background.
    pub fn segments(&self) -> Vec<u16> {
        let mut segments: Vec<u16> = self.data.iter().copied().filter(|v| *v != 0).collect();
        segments.sort_unstable();
        segments.dedup();
        segments
    }

    fn replace(&mut self, data: Array3<u16>) {
        let previous = std::mem::replace(&mut self.data, data);
        self.history.push_back(previous);
        while self.history.len() > self.undo_depth {
            self.history.pop_front();
        }
    }

    fn undo(&mut self) -> bool {
        match self.history.pop_back() {
            Some(previous) => {
                self.data = previous;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct ElementLabelmaps {
    dim: (usize, usize, usize),
    labelmaps: Vec<Labelmap3D>,
    active: usize,
}

#[derive(Debug)]
pub struct SegmentationStore {
    elements: HashMap<ElementId, ElementLabelmaps>,
    undo_depth: usize,
}

impl Default for SegmentationStore {
    fn default() -> Self {
        Self::with_undo_depth(DEFAULT_UNDO_DEPTH)
    }
}

impl SegmentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose labelmaps keep at most `undo_depth` undo steps each.
    pub fn with_undo_depth(undo_depth: usize) -> Self {
        Self {
            elements: HashMap::new(),
            undo_depth,
        }
    }

    /// Enable an element showing a stack of `dim` = (frames, rows, columns)
    /// and give it one empty labelmap. Re-enabling keeps existing labelmaps
    /// when the dimensions match.
    pub fn enable_element(&mut self, element: ElementId, dim: (usize, usize, usize)) {
        let undo_depth = self.undo_depth;
        let entry = self.elements.entry(element).or_insert_with(|| ElementLabelmaps {
            dim,
            labelmaps: vec![Labelmap3D::with_undo_depth(dim, undo_depth)],
            active: 0,
        });
        if entry.dim != dim {
            debug!(%element, ?dim, "Element re-enabled with new dimensions");
            *entry = ElementLabelmaps {
                dim,
                labelmaps: vec![Labelmap3D::with_undo_depth(dim, undo_depth)],
                active: 0,
            };
        }
    }

    pub fn disable_element(&mut self, element: ElementId) -> bool {
        self.elements.remove(&element).is_some()
    }

    /// Add a labelmap to an element and make it active. Returns its index.
    pub fn add_labelmap(&mut self, element: ElementId) -> Result<usize, SegmentationError> {
        let undo_depth = self.undo_depth;
        let entry = self.entry_mut(element)?;
        entry
            .labelmaps
            .push(Labelmap3D::with_undo_depth(entry.dim, undo_depth));
        entry.active = entry.labelmaps.len() - 1;
        Ok(entry.active)
    }

    pub fn set_active_labelmap(
        &mut self,
        element: ElementId,
        index: usize,
    ) -> Result<(), SegmentationError> {
        let entry = self.entry_mut(element)?;
        if index >= entry.labelmaps.len() {
            return Err(SegmentationError::UnknownLabelmap { element, index });
        }
        entry.active = index;
        Ok(())
    }

    /// The active labelmap's slice for one image of the stack.
    pub fn labelmap_2d(
        &self,
        element: ElementId,
        image_index: usize,
    ) -> Result<ArrayView2<'_, u16>, SegmentationError> {
        let labelmap = self.labelmap_3d(element)?;
        let frames = labelmap.dim().0;
        if image_index >= frames {
            return Err(SegmentationError::ImageIndex {
                index: image_index,
                frames,
            });
        }
        Ok(labelmap.data.slice(s![image_index, .., ..]))
    }

    /// The active labelmap of an element.
    pub fn labelmap_3d(&self, element: ElementId) -> Result<&Labelmap3D, SegmentationError> {
        let entry = self.entry(element)?;
        Ok(&entry.labelmaps[entry.active])
    }

    pub fn labelmaps_3d(&self, element: ElementId) -> Result<&[Labelmap3D], SegmentationError> {
        Ok(&self.entry(element)?.labelmaps)
    }

    /// Revert the last write to a labelmap. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(
        &mut self,
        element: ElementId,
        labelmap_index: usize,
    ) -> Result<bool, SegmentationError> {
        Ok(self.labelmap_mut(element, labelmap_index)?.undo())
    }

    /// Replace a labelmap with a raw buffer in native byte order.
    pub fn set_labelmap_3d_for_element(
        &mut self,
        element: ElementId,
        buffer: &[u8],
        labelmap_index: usize,
    ) -> Result<(), SegmentationError> {
        let labelmap = self.labelmap_mut(element, labelmap_index)?;
        let dim = labelmap.dim();
        let expected = dim.0 * dim.1 * dim.2 * std::mem::size_of::<u16>();
        if buffer.len() != expected {
            return Err(SegmentationError::BufferSize {
                expected,
                found: buffer.len(),
            });
        }
        let values = bytemuck::pod_collect_to_vec::<u8, u16>(buffer);
        let data = Array3::from_shape_vec(dim, values).map_err(|_| SegmentationError::BufferSize {
            expected,
            found: buffer.len(),
        })?;
        labelmap.replace(data);
        Ok(())
    }

    /// Import a labelmap from its comma-separated text export.
    pub fn set_labelmap_3d_from_text(
        &mut self,
        element: ElementId,
        text: &str,
        labelmap_index: usize,
    ) -> Result<(), SegmentationError> {
        let bytes = text
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                token
                    .parse::<u8>()
                    .map_err(|_| SegmentationError::InvalidText(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.set_labelmap_3d_for_element(element, &bytes, labelmap_index)
    }

    /// Write `segment` into a set of voxels as one undoable stroke.
    pub fn paint(
        &mut self,
        element: ElementId,
        labelmap_index: usize,
        voxels: &[(usize, usize, usize)],
        segment: u16,
    ) -> Result<(), SegmentationError> {
        let labelmap = self.labelmap_mut(element, labelmap_index)?;
        let (frames, rows, columns) = labelmap.dim();
        if let Some(voxel) = voxels
            .iter()
            .find(|(f, r, c)| *f >= frames || *r >= rows || *c >= columns)
        {
            return Err(SegmentationError::VoxelOutOfRange { voxel: *voxel });
        }
        let mut data = labelmap.data.clone();
        for &(f, r, c) in voxels {
            data[[f, r, c]] = segment;
        }
        labelmap.replace(data);
        Ok(())
    }

    fn entry(&self, element: ElementId) -> Result<&ElementLabelmaps, SegmentationError> {
        self.elements
            .get(&element)
            .ok_or(SegmentationError::UnknownElement(element))
    }

    fn entry_mut(
        &mut self,
        element: ElementId,
    ) -> Result<&mut ElementLabelmaps, SegmentationError> {
        self.elements
            .get_mut(&element)
            .ok_or(SegmentationError::UnknownElement(element))
    }

    fn labelmap_mut(
        &mut self,
        element: ElementId,
        index: usize,
    ) -> Result<&mut Labelmap3D, SegmentationError> {
        self.entry_mut(element)?
            .labelmaps
            .get_mut(index)
            .ok_or(SegmentationError::UnknownLabelmap { element, index })
    }
}
