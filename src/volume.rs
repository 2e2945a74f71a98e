use std::sync::Arc;

use crate::enums::BlendMode;
use crate::enums::Orientation;

use image::GrayImage;
use image::ImageBuffer;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::Slice;
use ndarray::Zip;
use ndarray::s;
use parking_lot::RwLock;
use rayon::prelude::*;

/// A volume that is filled while the viewports already read from it.
pub type SharedVolume = Arc<RwLock<Volume>>;

#[derive(Clone, Debug, Default)]
pub struct Volume {
    pub data: Array3<u16>,
    /// (x, y, z) voxel spacing in millimetres.
    pub spacing: (f32, f32, f32),
}

/// Mapper and property values derived from the volume itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub sample_distance: f64,
    pub scalar_range: (u16, u16),
    pub scalar_opacity_unit_distance: f64,
}

impl Volume {
    pub fn new(data: Array3<u16>, spacing: (f32, f32, f32)) -> Self {
        Self { data, spacing }
    }

    pub fn zeros(dim: (usize, usize, usize), spacing: (f32, f32, f32)) -> Self {
        Self::new(Array3::zeros(dim), spacing)
    }

    pub fn shared(volume: Volume) -> SharedVolume {
        Arc::new(RwLock::new(volume))
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<u16> {
        &mut self.data
    }

    /// Spacing along the axis an orientation slices through.
    pub fn axis_spacing(&self, orientation: Orientation) -> f32 {
        match orientation {
            Orientation::Axial => self.spacing.2,
            Orientation::Coronal => self.spacing.1,
            Orientation::Sagittal => self.spacing.0,
        }
    }

    /// World-space centre of the volume in millimetres, (x, y, z).
    pub fn center(&self) -> [f64; 3] {
        let (depth, height, width) = self.dim();
        [
            width as f64 * self.spacing.0 as f64 / 2.0,
            height as f64 * self.spacing.1 as f64 / 2.0,
            depth as f64 * self.spacing.2 as f64 / 2.0,
        ]
    }

    /// Slice index that contains the world position along `orientation`.
    pub fn index_at(&self, orientation: Orientation, world: [f64; 3]) -> usize {
        let coordinate = match orientation {
            Orientation::Axial => world[2],
            Orientation::Coronal => world[1],
            Orientation::Sagittal => world[0],
        };
        let spacing = self.axis_spacing(orientation).max(f32::EPSILON) as f64;
        let max_index = self.axis_len(orientation).saturating_sub(1);
        ((coordinate / spacing).floor().max(0.0) as usize).min(max_index)
    }

    /// Minimum and maximum voxel value.
    pub fn scalar_range(&self) -> (u16, u16) {
        if self.data.is_empty() {
            return (0, 0);
        }
        self.data
            .par_iter()
            .fold(
                || (u16::MAX, u16::MIN),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (u16::MAX, u16::MIN),
                |(a_lo, a_hi), (b_lo, b_hi)| (a_lo.min(b_lo), a_hi.max(b_hi)),
            )
    }

    pub fn render_settings(&self) -> RenderSettings {
        let (x, y, z) = self.spacing;
        let norm = ((x * x + y * y + z * z) as f64).sqrt();
        RenderSettings {
            sample_distance: 1.2 * norm,
            scalar_range: self.scalar_range(),
            scalar_opacity_unit_distance: 2.5,
        }
    }

    #[inline]
    fn normalize_to_u8(value: f32, (lo, hi): (u16, u16)) -> u8 {
        let span = (hi as f32 - lo as f32).max(1.0);
        (((value - lo as f32) / span) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn axis_len(&self, orientation: Orientation) -> usize {
        self.data.len_of(Axis(orientation.axis()))
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, u16>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Project a slab of `thickness_mm` centred on slice `index` into an
    /// 8-bit image, windowed to the volume's scalar range.
    pub fn render_slab(
        &self,
        orientation: Orientation,
        index: usize,
        thickness_mm: f64,
        blend_mode: BlendMode,
    ) -> Option<GrayImage> {
        let center = self.get_slice_from_axis(index, &orientation)?;
        let spacing = self.axis_spacing(orientation).max(f32::EPSILON) as f64;
        let len = self.axis_len(orientation);
        let half = ((thickness_mm / spacing) / 2.0).floor().clamp(0.0, len as f64) as usize;
        let first = index.saturating_sub(half);
        let last = index.saturating_add(half).min(len - 1);

        let projected = if blend_mode == BlendMode::Composite || first == last {
            center.mapv(|v| v as f32)
        } else {
            let slab = self
                .data
                .slice_axis(Axis(orientation.axis()), Slice::from(first..last + 1));
            let mut acc = slab.index_axis(Axis(orientation.axis()), 0).mapv(|v| v as f32);
            for layer in slab.axis_iter(Axis(orientation.axis())).skip(1) {
                Zip::from(&mut acc).and(&layer).for_each(|a, &v| {
                    let v = v as f32;
                    *a = match blend_mode {
                        BlendMode::MaximumIntensity => a.max(v),
                        BlendMode::MinimumIntensity => a.min(v),
                        _ => *a + v,
                    };
                });
            }
            if blend_mode == BlendMode::AverageIntensity {
                let count = (last - first + 1) as f32;
                acc.mapv_inplace(|a| a / count);
            }
            acc
        };

        let range = self.scalar_range();
        let (height, width) = projected.dim();
        let pixel_data: Vec<u8> = projected
            .as_standard_layout()
            .as_slice()?
            .par_iter()
            .map(|&v| Self::normalize_to_u8(v, range))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        index < self.axis_len(*orientation)
    }
}
