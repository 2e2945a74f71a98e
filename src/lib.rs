//! # MPR-sync library
//!
//! Keeps the three orthogonal multi-planar reconstruction (MPR) viewports
//! of a DICOM viewer and its 3D volume-render view in sync.
//!
//! Viewports register themselves with a [`SyncCoordinator`] in any order.
//! Once every expected index is present the coordinator runs its one-time
//! setup: each viewport gets a crosshair widget and a crosshair interaction
//! style that knows its peers, the crosshairs are reset from viewport 0 and
//! everything is rendered. From then on UI actions are broadcast to all
//! registered viewports:
//!  - slab thickness
//!  - crosshair visibility
//!  - active tool
//!  - transfer-function preset (volume-render view only)
//!
//! Volumes are read from DICOM files with [`VolumeLoader`]. The voxel data
//! is filled in frame by frame while a [`VolumeLoad`] reports progress and
//! re-renders the viewports at fixed percentage steps.
//!
//! Around the core sit the segmentation labelmap store, a client for the
//! remote label-list API and DICOMweb image-id resolution.
//!
//! # Examples
//!
//! ## Loading a directory into synced viewports
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mpr_sync::{
//! #     HeadlessViewport, LoadOptions, Orientation, PresetLibrary, SortBy, SyncConfig,
//! #     SyncCoordinator, ViewportIndex, VolumeLoad, VolumeLoader,
//! # };
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pending = VolumeLoader::prepare_from_directory("dicom", SortBy::InstanceNumber)?;
//! let coordinator = SyncCoordinator::new(&SyncConfig::default(), PresetLibrary::builtin());
//! for (index, orientation) in [
//!     (ViewportIndex::CORONAL, Orientation::Coronal),
//!     (ViewportIndex::SAGITTAL, Orientation::Sagittal),
//!     (ViewportIndex::AXIAL, Orientation::Axial),
//! ] {
//!     coordinator.register(index, Arc::new(HeadlessViewport::new(orientation, pending.volume())))?;
//! }
//! VolumeLoad::new(LoadOptions::default())
//!     .run(pending.into_insertions(), &coordinator)
//!     .await?;
//! coordinator.set_slab_thickness(50.0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod enums;
pub mod headless;
pub mod http;
pub mod label_api;
pub mod load_pipeline;
pub mod presets;
pub mod readiness;
pub mod registry;
pub mod segmentation;
pub mod state;
pub mod study;
pub mod viewport;
pub mod volume;
pub mod volume_loader;

pub use config::{SyncConfig, ViewerConfig};
pub use coordinator::{CoordinatorError, SyncCoordinator};
pub use enums::{ActiveTool, BlendMode, Orientation, SortBy};
pub use headless::{HeadlessViewport, HeadlessVolumeView};
pub use load_pipeline::{LoadError, LoadOptions, LoadReport, RenderSink, VolumeLoad};
pub use presets::PresetLibrary;
pub use viewport::{ViewportHandle, ViewportIndex, VolumeRenderHandle};
pub use volume::{SharedVolume, Volume};
pub use volume_loader::{PendingVolume, VolumeLoader};
