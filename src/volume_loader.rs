use crate::{
    enums::SortBy,
    load_pipeline::FrameError,
    volume::{SharedVolume, Volume},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use futures::{FutureExt, future::BoxFuture};
use ndarray::{Array2, s};
use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Resolves to the number of frames inserted so far.
pub type FrameInsertion = BoxFuture<'static, Result<usize, FrameError>>;

/// A volume whose headers have been read and whose voxels are still to be
/// filled in, one frame at a time.
pub struct PendingVolume {
    volume: SharedVolume,
    frames: Vec<FileDicomObject<InMemDicomObject>>,
    processed: Arc<AtomicUsize>,
}

impl PendingVolume {
    /// The volume the frames are written into. Viewports can render from
    /// it while the load is in flight.
    pub fn volume(&self) -> SharedVolume {
        self.volume.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// One insertion future per frame. Each decodes its pixel data on the
    /// blocking pool and writes the slice at its sorted position.
    pub fn into_insertions(self) -> Vec<FrameInsertion> {
        let (_, rows, columns) = self.volume.read().dim();
        self.frames
            .into_iter()
            .enumerate()
            .map(|(frame, dicom_object)| {
                let volume = self.volume.clone();
                let processed = self.processed.clone();
                async move {
                    let image = tokio::task::spawn_blocking(move || {
                        VolumeLoader::decode_image(&dicom_object)
                    })
                    .await
                    .map_err(|err| FrameError::Task {
                        frame,
                        message: err.to_string(),
                    })?
                    .map_err(|message| FrameError::Decode { frame, message })?;

                    if image.dim() != (rows, columns) {
                        return Err(FrameError::Dimensions {
                            frame,
                            expected: (rows, columns),
                            found: image.dim(),
                        });
                    }
                    volume
                        .write()
                        .data_mut()
                        .slice_mut(s![frame, .., ..])
                        .assign(&image);
                    Ok(processed.fetch_add(1, Ordering::SeqCst) + 1)
                }
                .boxed()
            })
            .collect()
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Read headers from DICOM objects and allocate the volume
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - DICOM file objects, one per slice
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or no object carries spacing information
    pub fn prepare_from_dicom_objects(
        dicom_objects: Vec<FileDicomObject<InMemDicomObject>>,
        sort_by: SortBy,
    ) -> Result<PendingVolume, VolumeLoaderError> {
        let spacing = Self::get_spacing(&dicom_objects).ok_or(VolumeLoaderError::MissingSpacing);

        let mut objects_with_order: Vec<_> = dicom_objects
            .into_iter()
            .filter_map(|dicom_object| {
                let order = Self::get_sort_order(&dicom_object, &sort_by)?;
                let dim = Self::get_dimensions(&dicom_object)?;
                Some((order, dim, dicom_object))
            })
            .collect();

        if objects_with_order.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        let spacing = spacing?;

        Self::sort_objects(&mut objects_with_order, sort_by);

        let (rows, columns) = objects_with_order[0].1;
        if objects_with_order.iter().any(|(_, dim, _)| *dim != (rows, columns)) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }

        let frames: Vec<_> = objects_with_order
            .into_iter()
            .map(|(_, _, dicom_object)| dicom_object)
            .collect();
        debug!(frames = frames.len(), rows, columns, ?spacing, "Volume allocated");

        Ok(PendingVolume {
            volume: Volume::shared(Volume::zeros((frames.len(), rows, columns), spacing)),
            frames,
            processed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn prepare_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<PendingVolume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::prepare_from_dicom_objects(objects?, sort_by)
    }

    /// Prepare a volume from a directory containing .dcm files
    pub fn prepare_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<PendingVolume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::prepare_from_file_paths(&paths, sort_by)
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_dimensions(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<(usize, usize)> {
        let rows = dicom_object.element(tags::ROWS).ok()?.to_int::<u32>().ok()?;
        let columns = dicom_object
            .element(tags::COLUMNS)
            .ok()?
            .to_int::<u32>()
            .ok()?;
        Some((rows as usize, columns as usize))
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Array2<u16>, String> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|err| err.to_string())?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|err| err.to_string())
    }

    fn sort_objects<D, O>(objects_with_order: &mut [(Option<f32>, D, O)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            objects_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            objects_with_order.reverse();
        }
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((pixel_spacing[0], pixel_spacing[1], slice_thickness))
        })
    }
}
