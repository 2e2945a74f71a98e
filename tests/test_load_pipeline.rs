mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use mpr_sync::ViewportIndex;
use mpr_sync::load_pipeline::{
    FrameError, LoadError, LoadOptions, LoadState, RenderSink, RenderThrottle, VolumeLoad,
    percent_complete,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use common::{CountingSink, conventional_viewports, coordinator, ramp_volume};

type Frame = BoxFuture<'static, Result<usize, FrameError>>;

/// `total` frames that each report the running count when they finish.
fn counted_frames(total: usize) -> Vec<Frame> {
    let processed = Arc::new(AtomicUsize::new(0));
    (0..total)
        .map(|_| {
            let processed = processed.clone();
            async move { Ok(processed.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
        })
        .collect()
}

/// Records the published load state every time a render is requested.
struct StateRecorder {
    state: watch::Receiver<LoadState>,
    seen: Mutex<Vec<LoadState>>,
}

impl RenderSink for StateRecorder {
    fn render_all(&self) {
        self.seen.lock().push(self.state.borrow().clone());
    }
}

// ---------------------------------------------------------------------------
// Percentages
// ---------------------------------------------------------------------------

#[test]
fn test_percent_complete_floors() {
    assert_eq!(percent_complete(1, 3), 33);
    assert_eq!(percent_complete(2, 3), 66);
    assert_eq!(percent_complete(3, 3), 100);
    assert_eq!(percent_complete(7, 37), 18);
}

#[test]
fn test_percent_complete_of_empty_load_is_done() {
    assert_eq!(percent_complete(0, 0), 100);
}

#[test]
fn test_percent_complete_pairs_of_ten() {
    let percents: Vec<u32> = [2, 4, 6, 8, 10]
        .iter()
        .map(|&processed| percent_complete(processed, 10))
        .collect();
    assert_eq!(percents, vec![20, 40, 60, 80, 100]);
}

#[test]
fn test_throttle_step_is_clamped() {
    assert_eq!(RenderThrottle::new(0).step(), 1);
    assert_eq!(RenderThrottle::default().step(), 20);
    assert!(RenderThrottle::default().should_render(40));
    assert!(!RenderThrottle::default().should_render(50));
}

// ---------------------------------------------------------------------------
// Driving a load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_renders_on_twenty_percent_steps_plus_final() {
    for total in [1usize, 5, 20, 37] {
        let sink = CountingSink::default();
        let report = VolumeLoad::new(LoadOptions::default())
            .run(counted_frames(total), &sink)
            .await
            .unwrap();

        let expected: Vec<u32> = (1..=total)
            .map(|processed| (processed * 100 / total) as u32)
            .collect();
        assert_eq!(report.percentages(), expected, "{total} frames");

        for event in &report.events {
            assert_eq!(event.rendered, event.percent % 20 == 0, "{total} frames");
        }
        let throttled = expected.iter().filter(|percent| *percent % 20 == 0).count();
        assert_eq!(report.renders, throttled + 1, "{total} frames");
        assert_eq!(sink.renders(), throttled + 1, "{total} frames");
        assert_eq!(report.frames, total);
    }
}

#[tokio::test]
async fn test_ten_frames_render_five_times_plus_final() {
    let sink = CountingSink::default();
    let report = VolumeLoad::new(LoadOptions::default())
        .run(counted_frames(10), &sink)
        .await
        .unwrap();

    let rendered: Vec<u32> = report
        .events
        .iter()
        .filter(|event| event.rendered)
        .map(|event| event.percent)
        .collect();
    assert_eq!(rendered, vec![20, 40, 60, 80, 100]);
    assert_eq!(sink.renders(), 6);
}

#[tokio::test]
async fn test_custom_step_changes_render_cadence() {
    let sink = CountingSink::default();
    let options = LoadOptions {
        throttle: RenderThrottle::new(50),
        timeout: None,
    };
    let report = VolumeLoad::new(options)
        .run(counted_frames(4), &sink)
        .await
        .unwrap();

    assert_eq!(report.percentages(), vec![25, 50, 75, 100]);
    assert_eq!(sink.renders(), 3);
}

#[tokio::test]
async fn test_stored_progress_never_decreases() {
    let load = VolumeLoad::new(LoadOptions {
        throttle: RenderThrottle::new(1),
        timeout: None,
    });
    let sink = StateRecorder {
        state: load.subscribe(),
        seen: Mutex::new(Vec::new()),
    };
    let frames: Vec<Frame> = [3usize, 1, 4]
        .into_iter()
        .map(|processed| future::ready(Ok(processed)).boxed())
        .collect();

    let report = load.run(frames, &sink).await.unwrap();

    assert_eq!(
        report.events.iter().map(|e| e.processed).collect::<Vec<_>>(),
        vec![3, 1, 4]
    );
    assert_eq!(report.percentages(), vec![75, 25, 100]);
    assert_eq!(
        *sink.seen.lock(),
        vec![
            LoadState::Loading { percent: 75 },
            LoadState::Loading { percent: 75 },
            LoadState::Loading { percent: 100 },
            LoadState::Loading { percent: 100 },
        ]
    );
    assert_eq!(*sink.state.borrow(), LoadState::Complete);
}

#[tokio::test]
async fn test_zero_frames_complete_with_single_render() {
    let sink = CountingSink::default();
    let load = VolumeLoad::new(LoadOptions::default());
    let state = load.subscribe();

    let report = load.run(Vec::<Frame>::new(), &sink).await.unwrap();

    assert!(report.events.is_empty());
    assert_eq!(report.renders, 1);
    assert_eq!(sink.renders(), 1);
    assert_eq!(*state.borrow(), LoadState::Complete);
}

#[tokio::test]
async fn test_state_ends_complete() {
    let sink = CountingSink::default();
    let load = VolumeLoad::new(LoadOptions::default());
    let state = load.subscribe();
    assert_eq!(load.state(), LoadState::Idle);

    load.run(counted_frames(3), &sink).await.unwrap();

    assert_eq!(*state.borrow(), LoadState::Complete);
    assert!(state.borrow().is_terminal());
}

#[tokio::test]
async fn test_frame_error_fails_load() {
    let sink = CountingSink::default();
    let load = VolumeLoad::new(LoadOptions::default());
    let state = load.subscribe();
    let mut frames = counted_frames(2);
    frames.push(
        future::ready(Err(FrameError::Decode {
            frame: 2,
            message: "unsupported transfer syntax".to_string(),
        }))
        .boxed(),
    );

    let err = load.run(frames, &sink).await.unwrap_err();

    assert!(matches!(
        err,
        LoadError::Frame(FrameError::Decode { frame: 2, .. })
    ));
    assert!(matches!(*state.borrow(), LoadState::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_load_times_out() {
    let sink = CountingSink::default();
    let options = LoadOptions {
        throttle: RenderThrottle::default(),
        timeout: Some(Duration::from_secs(5)),
    };
    let load = VolumeLoad::new(options);
    let state = load.subscribe();
    let mut frames = counted_frames(1);
    frames.push(future::pending().boxed());

    let err = load.run(frames, &sink).await.unwrap_err();

    match err {
        LoadError::TimedOut { percent, .. } => assert_eq!(percent, 50),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(*state.borrow(), LoadState::TimedOut);
    assert_eq!(sink.renders(), 0);
}

#[tokio::test]
async fn test_cancel_before_run() {
    let sink = CountingSink::default();
    let load = VolumeLoad::new(LoadOptions::default());
    let canceller = load.canceller();
    canceller.cancel();

    let err = load.run(counted_frames(3), &sink).await.unwrap_err();

    assert!(matches!(err, LoadError::Cancelled { percent: 0 }));
    assert!(canceller.is_cancelled());
    assert_eq!(sink.renders(), 0);
}

#[tokio::test]
async fn test_cancel_while_frames_are_pending() {
    let sink = CountingSink::default();
    let load = VolumeLoad::new(LoadOptions::default());
    let state = load.subscribe();
    let canceller = load.canceller();
    let mut frames = counted_frames(1);
    frames.push(future::pending().boxed());

    let (result, ()) = tokio::join!(load.run(frames, &sink), async {
        tokio::task::yield_now().await;
        canceller.cancel();
    });

    assert!(matches!(result, Err(LoadError::Cancelled { percent: 50 })));
    assert_eq!(*state.borrow(), LoadState::Cancelled);
}

// ---------------------------------------------------------------------------
// Coordinator as render sink
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_load_rerenders_every_viewport() {
    let volume = ramp_volume();
    let viewports = conventional_viewports(&volume);
    let coordinator = coordinator();
    for (i, viewport) in viewports.iter().enumerate() {
        coordinator
            .register(ViewportIndex(i), viewport.clone())
            .unwrap();
    }
    let before: Vec<usize> = viewports.iter().map(|v| v.render_count()).collect();

    let report = VolumeLoad::new(LoadOptions::default())
        .run(counted_frames(10), &coordinator)
        .await
        .unwrap();

    assert_eq!(report.renders, 6);
    for (viewport, before) in viewports.iter().zip(before) {
        assert_eq!(viewport.render_count(), before + 6);
    }
}
