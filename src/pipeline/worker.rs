//! Depth inference worker
//!
//! One dedicated thread drains the [`LatestFrameSlot`], runs the model,
//! colormaps the result and posts it to the display context. Only one
//! inference is ever in flight, which is what gives the keep-latest slot its
//! meaning: whatever arrived last while the model was busy is processed next.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, instrument, warn};

use super::slot::LatestFrameSlot;
use crate::depth::DepthModel;
use crate::display::{depth_colormap, Colormap, DisplayUpdate};
use crate::error::{ModelError, PipelineError};
use crate::perf::{PerformanceTracker, Stream};
use crate::{utils, Frame};

const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(2);
/// Shortest idle wait, so an empty slot or a full display never spins
const MIN_IDLE_WAIT: Duration = Duration::from_millis(1);
const DEFAULT_DISPLAY_QUEUE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
}

/// Point-in-time copy of the worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// State the worker thread shares with its owner
struct Shared {
    model: Arc<dyn DepthModel>,
    slot: Arc<LatestFrameSlot>,
    tracker: Arc<PerformanceTracker>,
    colormap: Colormap,
    display: Sender<DisplayUpdate>,
    idle_wait: Duration,
    counters: CachePadded<Counters>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct FramePipelineBuilder {
    model: Arc<dyn DepthModel>,
    slot: Option<Arc<LatestFrameSlot>>,
    tracker: Option<Arc<PerformanceTracker>>,
    colormap: Colormap,
    idle_wait: Duration,
    display_queue: usize,
    worker_core: Option<usize>,
}

impl FramePipelineBuilder {
    pub fn slot(mut self, slot: Arc<LatestFrameSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    /// How long the worker waits for a frame before checking again.
    /// Clamped to at least 1ms.
    pub fn idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait.max(MIN_IDLE_WAIT);
        self
    }

    /// Number of finished updates that may wait for the display context
    pub fn display_queue(mut self, len: usize) -> Self {
        self.display_queue = len.max(1);
        self
    }

    /// Pin the worker thread to a CPU core
    pub fn worker_core(mut self, core: Option<usize>) -> Self {
        self.worker_core = core;
        self
    }

    /// Build a stopped pipeline and the channel its display updates arrive on
    pub fn build(self) -> (FramePipeline, Receiver<DisplayUpdate>) {
        let (display_tx, display_rx) = flume::bounded(self.display_queue);
        let shared = Shared {
            model: self.model,
            slot: self.slot.unwrap_or_default(),
            tracker: self.tracker.unwrap_or_default(),
            colormap: self.colormap,
            display: display_tx,
            idle_wait: self.idle_wait,
            counters: CachePadded::new(Counters::default()),
        };
        let pipeline = FramePipeline {
            shared: Arc::new(shared),
            worker_core: self.worker_core,
            worker: None,
        };
        (pipeline, display_rx)
    }
}

/// Owns the depth worker and its lifecycle
pub struct FramePipeline {
    shared: Arc<Shared>,
    worker_core: Option<usize>,
    worker: Option<Worker>,
}

impl FramePipeline {
    pub fn builder(model: Arc<dyn DepthModel>) -> FramePipelineBuilder {
        FramePipelineBuilder {
            model,
            slot: None,
            tracker: None,
            colormap: depth_colormap,
            idle_wait: DEFAULT_IDLE_WAIT,
            display_queue: DEFAULT_DISPLAY_QUEUE,
            worker_core: None,
        }
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.shared.slot
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.shared.tracker
    }

    pub fn model(&self) -> &Arc<dyn DepthModel> {
        &self.shared.model
    }

    pub fn state(&self) -> PipelineState {
        match &self.worker {
            Some(worker) if !worker.handle.is_finished() => PipelineState::Running,
            _ => PipelineState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.shared.counters;
        WorkerStats {
            processed: counters.processed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Spawn the worker thread
    #[instrument(skip(self), fields(model = %self.shared.model.name()))]
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        // A worker that exited on its own is reaped before restarting
        self.stop()?;

        let (stop_tx, stop_rx) = flume::bounded(1);
        let shared = self.shared.clone();
        let core = self.worker_core;
        let handle = utils::spawn_thread("depth-worker", move || {
            if let Some(core) = core {
                if !utils::pin_current_thread(core) {
                    warn!(core, "Could not pin depth worker");
                }
            }
            shared.run(stop_rx);
        })?;

        self.worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        info!("Depth pipeline started");
        Ok(())
    }

    /// Signal the worker and wait for it to exit.
    ///
    /// An inference already running is allowed to finish first; its result is
    /// either handed to the display whole or dropped whole.
    #[instrument(skip(self))]
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // Disconnecting the stop channel wakes an idle worker immediately
        drop(worker.stop);
        worker
            .handle
            .join()
            .map_err(|_| PipelineError::WorkerPanicked)?;

        let stats = self.stats();
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Depth pipeline stopped"
        );
        Ok(())
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Depth pipeline did not stop cleanly: {}", e);
        }
    }
}

fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

impl Shared {
    fn run(&self, stop: Receiver<()>) {
        debug!("Depth worker running");

        while !stop_requested(&stop) {
            let Some(frame) = self.slot.take() else {
                match stop.recv_timeout(self.idle_wait) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            };

            let Some(update) = self.process(&frame) else {
                continue;
            };
            if !self.publish(update, &stop) {
                break;
            }
        }

        debug!("Depth worker exiting");
    }

    /// Run one frame through the model. `None` when the frame failed.
    ///
    /// A panic anywhere in the model or colormap counts as a failed frame,
    /// not a dead worker.
    fn process(&self, frame: &Frame) -> Option<DisplayUpdate> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_process(frame)))
            .unwrap_or_else(|_| Err(ModelError::Runtime("depth stage panicked".into())));

        match outcome {
            Ok(update) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                Some(update)
            }
            Err(e) => {
                warn!(sequence = frame.sequence, "Inference failed: {}", e);
                metrics::counter!("inference_failures").increment(1);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.tracker.abandon_frame(Stream::Depth);
                None
            }
        }
    }

    fn try_process(&self, frame: &Frame) -> Result<DisplayUpdate, ModelError> {
        let started = Instant::now();
        let prediction = self
            .tracker
            .measure(Stream::Depth, "inference", || self.model.predict(frame));
        metrics::histogram!("inference_time_us").record(started.elapsed().as_micros() as f64);
        let field = prediction?;

        let image = self
            .tracker
            .measure(Stream::Depth, "colormap", || (self.colormap)(&field));
        let model_dimensions = self.model.input_dimensions();
        self.tracker.new_frame(Stream::Depth);

        Ok(DisplayUpdate {
            sequence: frame.sequence,
            image,
            source_dimensions: frame.dimensions(),
            model_dimensions,
            status: self.status(frame),
            latency: frame.timestamp.elapsed(),
        })
    }

    fn status(&self, frame: &Frame) -> String {
        let (model_w, model_h) = self.model.input_dimensions();
        format!(
            "Model: {}\nCamera resolution: {}x{} --> Model input: {}x{}\n\n{}",
            self.model.name(),
            frame.width,
            frame.height,
            model_w,
            model_h,
            self.tracker.report()
        )
    }

    /// Hand `update` to the display context. `false` when the worker should
    /// exit instead.
    fn publish(&self, mut update: DisplayUpdate, stop: &Receiver<()>) -> bool {
        loop {
            match self.display.send_timeout(update, self.idle_wait) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if stop_requested(stop) {
                        debug!(sequence = pending.sequence, "Discarding update on stop");
                        return false;
                    }
                    update = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    info!("Display disconnected, stopping depth worker");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::depth::{DepthField, LuminanceDepthModel, ModelPreset};

    struct Failing;

    impl DepthModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn input_dimensions(&self) -> (u32, u32) {
            (1, 1)
        }

        fn predict(&self, frame: &Frame) -> Result<DepthField, ModelError> {
            if frame.sequence == 2 {
                panic!("backend crashed");
            }
            Err(ModelError::Runtime("bad frame".into()))
        }
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![128; 4 * 4 * 3], 4, 4, sequence)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn start_twice_is_rejected() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (mut pipeline, _rx) = FramePipeline::builder(model).build();

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyRunning)));

        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        pipeline.stop().unwrap();
    }

    #[test]
    fn processes_frame_and_posts_status() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::DepthAnything.spec()));
        let (mut pipeline, rx) = FramePipeline::builder(model).build();
        pipeline.start().unwrap();
        pipeline.slot().put(frame(11));

        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.sequence, 11);
        assert_eq!(update.image.dimensions(), (210, 210));
        assert_eq!(update.source_dimensions, (4, 4));
        assert!(update.status.starts_with(
            "Model: depth_anything_v2_vits_210x210\n\
             Camera resolution: 4x4 --> Model input: 210x210\n\nDepth Frame: "
        ));
        assert!(update.status.contains("    inference: "));
        assert!(update.status.contains("    colormap: "));

        pipeline.stop().unwrap();
        assert_eq!(
            pipeline.stats(),
            WorkerStats {
                processed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn failing_and_panicking_models_do_not_kill_worker() {
        let (mut pipeline, rx) = FramePipeline::builder(Arc::new(Failing)).build();
        pipeline.start().unwrap();

        for sequence in 1..=3 {
            pipeline.slot().put(frame(sequence));
            wait_until(|| pipeline.stats().failed == sequence);
        }

        assert!(pipeline.is_running());
        assert!(rx.try_recv().is_err());
        assert!(pipeline.tracker().last_frame(Stream::Depth).is_none());
        pipeline.stop().unwrap();
    }

    #[test]
    fn stop_wakes_idle_worker_promptly() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (mut pipeline, _rx) = FramePipeline::builder(model)
            .idle_wait(Duration::from_secs(30))
            .build();
        pipeline.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        pipeline.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn worker_exits_when_display_hangs_up() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (mut pipeline, rx) = FramePipeline::builder(model).build();
        drop(rx);
        pipeline.start().unwrap();
        pipeline.slot().put(frame(1));

        wait_until(|| !pipeline.is_running());
        pipeline.stop().unwrap();
    }

    #[test]
    fn restarts_after_worker_exited_on_its_own() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (mut pipeline, rx) = FramePipeline::builder(model).build();
        drop(rx);
        pipeline.start().unwrap();
        pipeline.slot().put(frame(1));
        wait_until(|| !pipeline.is_running());
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn zero_idle_wait_is_clamped() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (pipeline, _rx) = FramePipeline::builder(model)
            .idle_wait(Duration::ZERO)
            .build();
        assert_eq!(pipeline.shared.idle_wait, MIN_IDLE_WAIT);
    }

    fn exploding_colormap(_: &DepthField) -> RgbImage {
        panic!("colormap crashed");
    }

    #[test]
    fn panicking_colormap_does_not_kill_worker() {
        let model = Arc::new(LuminanceDepthModel::new(ModelPreset::Midas.spec()));
        let (mut pipeline, rx) = FramePipeline::builder(model)
            .colormap(exploding_colormap)
            .build();
        pipeline.start().unwrap();

        pipeline.slot().put(frame(1));
        wait_until(|| pipeline.stats().failed == 1);

        assert!(pipeline.is_running());
        assert!(rx.try_recv().is_err());
        assert!(pipeline.tracker().last_frame(Stream::Depth).is_none());
        assert_eq!(pipeline.tracker().recorder(Stream::Depth).current_depth(), 0);
        pipeline.stop().unwrap();
        assert_eq!(pipeline.stats().processed, 0);
    }
}
