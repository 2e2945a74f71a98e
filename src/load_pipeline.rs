//! Progress tracking for an in-flight volume load.
//!
//! The loader hands out one future per frame; each resolves to the number
//! of frames inserted so far. [`VolumeLoad::run`] drives them to completion,
//! publishes progress, and asks a [`RenderSink`] to re-render whenever the
//! percentage lands on a multiple of the throttle step, plus once more when
//! every frame is in.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use futures::future::{AbortHandle, AbortRegistration, Abortable, Aborted};
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use web_time::Instant;

pub trait RenderSink: Send + Sync {
    fn render_all(&self);
}

/// Re-render only when progress is an exact multiple of `step` percent.
///
/// Frames that land between steps are not rendered until the next step or
/// the final render, so a coarse step can skip most intermediate frames
/// on small series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderThrottle {
    step: u32,
}

impl RenderThrottle {
    pub const DEFAULT_STEP: u32 = 20;

    pub fn new(step: u32) -> Self {
        Self { step: step.max(1) }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn should_render(&self, percent: u32) -> bool {
        percent % self.step == 0
    }
}

impl Default for RenderThrottle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        percent: u32,
    },
    Complete,
    Failed {
        message: String,
    },
    Cancelled,
    TimedOut,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadState::Idle | LoadState::Loading { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame {frame} could not be decoded: {message}")]
    Decode { frame: usize, message: String },

    #[error("Frame {frame} is {found:?}, expected {expected:?}")]
    Dimensions {
        frame: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Frame {frame} task failed: {message}")]
    Task { frame: usize, message: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Volume load cancelled at {percent}%")]
    Cancelled { percent: u32 },

    #[error("Volume load stalled at {percent}% after {after:?}")]
    TimedOut { after: Duration, percent: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub processed: usize,
    pub percent: u32,
    pub rendered: bool,
}

#[derive(Clone, Debug)]
pub struct LoadReport {
    pub frames: usize,
    pub events: Vec<ProgressEvent>,
    pub renders: usize,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn percentages(&self) -> Vec<u32> {
        self.events.iter().map(|event| event.percent).collect()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    pub throttle: RenderThrottle,
    pub timeout: Option<Duration>,
}

/// Cancels the [`VolumeLoad`] it was taken from.
#[derive(Clone, Debug)]
pub struct LoadCanceller(AbortHandle);

impl LoadCanceller {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}

pub fn percent_complete(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100 / total) as u32
}

pub struct VolumeLoad {
    options: LoadOptions,
    state: watch::Sender<LoadState>,
    abort_handle: AbortHandle,
    abort_registration: AbortRegistration,
}

impl VolumeLoad {
    pub fn new(options: LoadOptions) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        Self {
            options,
            state,
            abort_handle,
            abort_registration,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    pub fn canceller(&self) -> LoadCanceller {
        LoadCanceller(self.abort_handle.clone())
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Drive every frame future to completion.
    ///
    /// # Errors
    ///
    /// The first failing frame ends the load with [`LoadError::Frame`]; the
    /// remaining frames are dropped. Cancellation and the optional timeout
    /// end it with [`LoadError::Cancelled`] and [`LoadError::TimedOut`].
    pub async fn run<I, F, S>(self, frames: I, sink: &S) -> Result<LoadReport, LoadError>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<usize, FrameError>>,
        S: RenderSink + ?Sized,
    {
        let VolumeLoad {
            options,
            state,
            abort_registration,
            ..
        } = self;
        let started = Instant::now();
        let mut pending: FuturesUnordered<F> = frames.into_iter().collect();
        let total = pending.len();
        let mut events = Vec::with_capacity(total);
        let mut stored = 0;

        state.send_replace(LoadState::Loading { percent: 0 });
        info!(frames = total, "Volume load started");

        let progress = async {
            while let Some(result) = pending.next().await {
                let processed = result?;
                let percent = percent_complete(processed, total);
                if percent > stored {
                    stored = percent;
                    state.send_replace(LoadState::Loading { percent });
                }
                let rendered = options.throttle.should_render(percent);
                if rendered {
                    sink.render_all();
                }
                debug!(processed, percent, rendered, "Frame inserted");
                events.push(ProgressEvent {
                    processed,
                    percent,
                    rendered,
                });
            }
            Ok::<(), FrameError>(())
        };
        let progress = Abortable::new(progress, abort_registration);

        let outcome = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, progress).await.ok(),
            None => Some(progress.await),
        };

        match outcome {
            None => {
                let after = started.elapsed();
                warn!(percent = stored, ?after, "Volume load timed out");
                state.send_replace(LoadState::TimedOut);
                Err(LoadError::TimedOut {
                    after,
                    percent: stored,
                })
            }
            Some(Err(Aborted)) => {
                info!(percent = stored, "Volume load cancelled");
                state.send_replace(LoadState::Cancelled);
                Err(LoadError::Cancelled { percent: stored })
            }
            Some(Ok(Err(err))) => {
                warn!(%err, "Volume load failed");
                state.send_replace(LoadState::Failed {
                    message: err.to_string(),
                });
                Err(err.into())
            }
            Some(Ok(Ok(()))) => {
                sink.render_all();
                state.send_replace(LoadState::Complete);
                let renders = events.iter().filter(|event| event.rendered).count() + 1;
                let elapsed = started.elapsed();
                info!(frames = total, renders, ?elapsed, "Volume load complete");
                Ok(LoadReport {
                    frames: total,
                    events,
                    renders,
                    elapsed,
                })
            }
        }
    }
}
