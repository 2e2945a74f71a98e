#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mpr_sync::config::SyncConfig;
use mpr_sync::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use mpr_sync::load_pipeline::RenderSink;
use mpr_sync::{HeadlessViewport, Orientation, PresetLibrary, SharedVolume, SyncCoordinator, Volume};
use ndarray::Array3;
use parking_lot::Mutex;
use serde_json::Value;

/// 4 slices of 6x8 pixels, every voxel distinct.
pub fn ramp_volume() -> SharedVolume {
    let data = Array3::from_shape_fn((4, 6, 8), |(z, y, x)| (z * 48 + y * 8 + x) as u16);
    Volume::shared(Volume::new(data, (1.0, 1.0, 2.0)))
}

/// Viewports in conventional index order: coronal, sagittal, axial.
pub fn conventional_viewports(volume: &SharedVolume) -> Vec<Arc<HeadlessViewport>> {
    [Orientation::Coronal, Orientation::Sagittal, Orientation::Axial]
        .into_iter()
        .map(|orientation| Arc::new(HeadlessViewport::new(orientation, volume.clone())))
        .collect()
}

pub fn coordinator() -> SyncCoordinator {
    SyncCoordinator::new(&SyncConfig::default(), PresetLibrary::builtin())
}

pub fn coordinator_with(config: SyncConfig) -> SyncCoordinator {
    SyncCoordinator::new(&config, PresetLibrary::builtin())
}

#[derive(Default)]
pub struct CountingSink {
    renders: AtomicUsize,
}

impl CountingSink {
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl RenderSink for CountingSink {
    fn render_all(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers requests from a queue and keeps every request it saw.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_json(&self, body: Value) {
        self.responses.lock().push_back(Ok(HttpResponse {
            status: 200,
            body: Some(body),
        }));
    }

    pub fn respond_empty(&self) {
        self.responses.lock().push_back(Ok(HttpResponse {
            status: 204,
            body: None,
        }));
    }

    pub fn respond_error(&self, error: HttpError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().push(request);
        self.responses.lock().pop_front().unwrap_or(Ok(HttpResponse {
            status: 204,
            body: None,
        }))
    }
}
