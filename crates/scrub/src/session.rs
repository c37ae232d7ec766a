use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use foundation::FrameIndex;
use parking_lot::Mutex;
use runtime::{DragMomentumController, PositionCell, RenderLoop, RenderStats, TickOutcome};
use streaming::{FrameSource, Streamer, VideoMetadata};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{SessionConfig, SessionConfigError};
use crate::error::SessionError;
use crate::overlay::AnnotationOverlayResolver;
use crate::snapshot::{CursorState, DisplaySnapshot, SessionView};

pub type SnapshotReceiver = watch::Receiver<Option<Arc<DisplaySnapshot>>>;

/// One open video: input in, display snapshots out.
///
/// Two tasks run for the lifetime of the session. The driver waits for
/// position changes and starts a loading generation per new center. The
/// animation task runs at the render rate, advancing momentum and publishing
/// snapshots when something visible changed. Input methods never wait on either.
///
/// Must be started inside a Tokio runtime. Dropping the session shuts it down.
pub struct ScrubSession {
    metadata: VideoMetadata,
    config: SessionConfig,
    position: Arc<PositionCell>,
    streamer: Arc<Streamer>,
    overlay: Arc<Mutex<AnnotationOverlayResolver>>,
    momentum: Arc<Mutex<DragMomentumController>>,
    publisher: Arc<watch::Sender<Option<Arc<DisplaySnapshot>>>>,
    snapshots: SnapshotReceiver,
    render_stats: Arc<Mutex<RenderStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for ScrubSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrubSession")
            .field("metadata", &self.metadata)
            .field("current_frame", &self.position.get())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

impl ScrubSession {
    /// Fetches metadata and starts streaming around frame 0.
    pub async fn start(source: Arc<dyn FrameSource>, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let metadata = match source.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("failed to load video metadata: {e}");
                return Err(SessionError::Metadata(e));
            }
        };
        if metadata.total_frames == 0 {
            error!("video has no frames");
            return Err(SessionError::EmptyVideo);
        }

        let position = Arc::new(PositionCell::new(metadata.total_frames, 0));
        let streamer = Streamer::new(&config.streaming, source.clone(), position.clone())
            .map_err(SessionConfigError::from)?;
        let streamer = Arc::new(streamer);
        let overlay = Arc::new(Mutex::new(AnnotationOverlayResolver::new(
            metadata.total_frames,
            config.annotation_padding,
        )));
        let period = config.render.clock().period();
        let momentum = Arc::new(Mutex::new(DragMomentumController::new(config.momentum.clone(), period)));

        let view = SessionView {
            position: position.clone(),
            streamer: streamer.clone(),
            overlay: overlay.clone(),
            momentum: momentum.clone(),
            visible_radius: config.visible_radius,
        };
        let (publisher, snapshots) = watch::channel(None);
        let publisher = Arc::new(publisher);
        let render_stats = Arc::new(Mutex::new(RenderStats::default()));

        let driver = tokio::spawn(drive(source, view.clone()));
        let animation = tokio::spawn(animate(
            RenderLoop::new(view, &config.render),
            publisher.clone(),
            render_stats.clone(),
            period,
        ));

        info!(
            "scrub session started: {} frames at {}x{}",
            metadata.total_frames, metadata.width, metadata.height
        );

        Ok(Self {
            metadata,
            config,
            position,
            streamer,
            overlay,
            momentum,
            publisher,
            snapshots,
            render_stats,
            tasks: Mutex::new(vec![driver, animation]),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.position.get()
    }

    pub fn cursor(&self) -> CursorState {
        self.momentum.lock().phase().into()
    }

    pub fn streamer(&self) -> &Arc<Streamer> {
        &self.streamer
    }

    pub fn render_stats(&self) -> RenderStats {
        *self.render_stats.lock()
    }

    /// Jumps to `frame`, clamped to the video. Stops any coasting.
    pub fn jump_to(&self, frame: i64) -> FrameIndex {
        self.momentum.lock().cancel();
        self.position.set(frame)
    }

    /// Moves by `delta` frames, clamped to the video. Stops any coasting.
    pub fn step(&self, delta: i64) -> FrameIndex {
        self.momentum.lock().cancel();
        self.position.advance(delta)
    }

    pub fn drag_start(&self, y: f64) {
        self.drag_start_at(y, Instant::now());
    }

    pub fn drag_start_at(&self, y: f64, at: Instant) {
        self.momentum.lock().drag_start(y, at, &self.position);
    }

    pub fn drag_move(&self, y: f64) -> FrameIndex {
        self.drag_move_at(y, Instant::now())
    }

    pub fn drag_move_at(&self, y: f64, at: Instant) -> FrameIndex {
        self.momentum.lock().drag_move(y, at, &self.position)
    }

    /// Ends the drag. Returns `true` if the release starts coasting.
    pub fn drag_end(&self) -> bool {
        self.drag_end_at(Instant::now())
    }

    pub fn drag_end_at(&self, at: Instant) -> bool {
        self.momentum.lock().drag_end(at, &self.position)
    }

    /// Runs a fresh loading generation at the current frame, retrying chunks
    /// that failed earlier.
    pub fn reload(&self) {
        self.position.poke();
    }

    /// Refetches annotations, e.g. after one was created or edited elsewhere.
    pub fn invalidate_annotations(&self) {
        self.overlay.lock().invalidate();
        self.position.poke();
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshots.clone()
    }

    pub fn latest_snapshot(&self) -> Option<Arc<DisplaySnapshot>> {
        self.snapshots.borrow().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stops both tasks, discards pending loads and drops every decoded frame
    /// the session holds. Snapshots already handed out stay valid.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let released = self.streamer.close();
        self.publisher.send_replace(None);
        debug!("stream counters at shutdown: {:?}", self.streamer.stats().snapshot());
        info!("scrub session shut down, released {released} frames");
    }
}

impl Drop for ScrubSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts a generation whenever the position cell wakes it, moved or poked,
/// and keeps the annotation overlay covering the visible range.
async fn drive(source: Arc<dyn FrameSource>, view: SessionView) {
    let mut generations = JoinSet::new();
    let mut restart = true;

    loop {
        let center = view.position.get();
        if restart {
            restart = false;
            let generation = view.streamer.begin_generation();
            let streamer = view.streamer.clone();
            generations.spawn(async move {
                let outcome = streamer.run_generation(generation, center).await;
                debug!("generation {generation} at {center}: {outcome:?}");
            });
        }

        refresh_annotations(&source, &view, center, &mut generations);

        tokio::select! {
            _ = view.position.changed() => restart = true,
            Some(joined) = generations.join_next() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!("loading task panicked: {e}");
                    }
                }
            }
        }
    }
}

fn refresh_annotations(
    source: &Arc<dyn FrameSource>,
    view: &SessionView,
    center: FrameIndex,
    tasks: &mut JoinSet<()>,
) {
    let Some(visible) = view.visible_range(center) else {
        return;
    };
    let Some(fetch) = view.overlay.lock().plan_fetch(visible) else {
        return;
    };

    let source = source.clone();
    let overlay = view.overlay.clone();
    tasks.spawn(async move {
        match source.fetch_annotations(fetch.range).await {
            Ok(records) => {
                let count = records.len();
                if overlay.lock().apply(fetch, records) {
                    debug!("{count} annotations for {}..={}", fetch.range.start, fetch.range.end);
                }
            }
            Err(e) => {
                warn!("annotation fetch for {}..={} failed: {e}", fetch.range.start, fetch.range.end);
                overlay.lock().fail(fetch);
            }
        }
    });
}

/// Fixed-rate momentum and render ticks.
async fn animate(
    mut render: RenderLoop<SessionView>,
    publisher: Arc<watch::Sender<Option<Arc<DisplaySnapshot>>>>,
    render_stats: Arc<Mutex<RenderStats>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let now = interval.tick().await.into_std();
        {
            let view = render.source();
            view.momentum.lock().tick(&view.position);
        }

        let outcome = render.tick(now);
        *render_stats.lock() = render.stats();
        if let TickOutcome::Published(snapshot) = outcome {
            tokio::task::yield_now().await;
            let snapshot = Arc::new(snapshot);
            let streamer = render.source().streamer.clone();
            publisher.send_if_modified(|slot| {
                if streamer.is_closed() {
                    return false;
                }
                *slot = Some(snapshot);
                true
            });
        }
    }
}
