//! Recording session control: screen frames with a gaze overlay go to the video sink
//! on every clock tick, gaze samples go to the log sink as they arrive.

use crate::common::{GazeSample, ScreenSize};
use crate::config::Config;
use crate::frame_clock::FrameClock;
use crate::gaze::{DeviceError, GazeDevice, GazeStream, GazeTrail, TrailSnapshot};
use crate::overlay::{self, OverlayStyle};
use crate::screen_capture::{CaptureError, FrameSource, ScreenSource};
use crate::sink::{log_path_for, LogSink, SinkError, SinkFactory, VideoSink};
use log::{debug, error, info, warn};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("A recording is already in progress")]
    AlreadyRecording,
    #[error("No recording in progress")]
    NotRecording,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Failed to start recorder thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub video_path: PathBuf,
    pub log_path: PathBuf,
    pub duration: Duration,
    pub frames_written: u64,
    /// Ticks whose frame never reached the sink because capture failed or the clock overran.
    pub frames_skipped: u64,
    pub frames_failed: u64,
    pub samples_logged: u64,
    pub samples_failed: u64,
    pub device_disconnected: bool,
}

#[derive(Debug, Default)]
struct SessionStats {
    frames_written: AtomicU64,
    frames_skipped: AtomicU64,
    frames_failed: AtomicU64,
    samples_logged: AtomicU64,
    samples_failed: AtomicU64,
    device_disconnected: AtomicBool,
}

type SharedVideo = Arc<Mutex<Option<Box<dyn VideoSink>>>>;
type SharedLog = Arc<Mutex<Option<Box<dyn LogSink>>>>;

struct Session {
    video_path: PathBuf,
    log_path: PathBuf,
    started: Instant,
    recording: Arc<AtomicBool>,
    video: SharedVideo,
    log: SharedLog,
    clock: FrameClock,
    stream: Option<Box<dyn GazeStream>>,
    consumer: Option<JoinHandle<()>>,
    stats: Arc<SessionStats>,
}

pub struct Recorder {
    screen: Arc<dyn ScreenSource>,
    device: Arc<dyn GazeDevice>,
    sinks: Arc<dyn SinkFactory>,
    config: Config,
    size: ScreenSize,
    trail: Arc<Mutex<GazeTrail>>,
    session: Option<Session>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Recorder {
    /// Queries the screen size once; every session records at that size.
    pub fn new(
        screen: Arc<dyn ScreenSource>,
        device: Arc<dyn GazeDevice>,
        sinks: Arc<dyn SinkFactory>,
        config: Config,
    ) -> Result<Self, RecorderError> {
        let size = screen.size()?;
        let trail = Arc::new(Mutex::new(GazeTrail::new(config.overlay.trail_capacity)));
        Ok(Self {
            screen,
            device,
            sinks,
            config,
            size,
            trail,
            session: None,
        })
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.size
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn trail_snapshot(&self) -> TrailSnapshot {
        lock(&self.trail).snapshot()
    }

    /// Opens both sinks, starts the frame clock and subscribes to the gaze device.
    ///
    /// On any failure everything opened so far is closed again and the recorder
    /// stays idle.
    pub fn start_recording(&mut self, path: &Path) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let video_path = path.to_path_buf();
        let log_path = log_path_for(path, &self.config.recording.log_extension);

        let video = self.sinks.open_video(&video_path, self.size)?;
        let log = match self.sinks.open_log(&log_path) {
            Ok(log) => log,
            Err(e) => {
                close_video(Some(video));
                return Err(e.into());
            }
        };

        *lock(&self.trail) = GazeTrail::new(self.config.overlay.trail_capacity);

        let recording = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(SessionStats::default());
        let video: SharedVideo = Arc::new(Mutex::new(Some(video)));
        let log: SharedLog = Arc::new(Mutex::new(Some(log)));

        let rollback = |recording: &AtomicBool, video: &SharedVideo, log: &SharedLog| {
            recording.store(false, Ordering::SeqCst);
            close_video(lock(video).take());
            close_log(lock(log).take());
        };

        let mut clock = match self.start_clock(&recording, &video, &stats) {
            Ok(clock) => clock,
            Err(e) => {
                rollback(&recording, &video, &log);
                return Err(e);
            }
        };

        let (samples_tx, samples_rx) = mpsc::channel();
        let consumer = match spawn_consumer(
            samples_rx,
            log.clone(),
            self.trail.clone(),
            recording.clone(),
            stats.clone(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                clock.stop();
                rollback(&recording, &video, &log);
                return Err(e.into());
            }
        };

        let stream = match self.device.open_stream(self.config.gaze.mode, samples_tx) {
            Ok(stream) => stream,
            Err(e) => {
                clock.stop();
                rollback(&recording, &video, &log);
                // The sender went down with the failed open, so the consumer ends on its own.
                if consumer.join().is_err() {
                    warn!("Gaze consumer panicked");
                }
                return Err(e.into());
            }
        };

        info!("Recording started: {:?} + {:?}", video_path, log_path);
        self.session = Some(Session {
            video_path,
            log_path,
            started: Instant::now(),
            recording,
            video,
            log,
            clock,
            stream: Some(stream),
            consumer: Some(consumer),
            stats,
        });
        Ok(())
    }

    /// Stops the session and closes its files.
    ///
    /// Returns once any frame write in progress has finished; no frame is written
    /// after this is called. Samples the device delivered before its stream closed
    /// are all logged. Teardown always runs to the end; the first sink or device
    /// error met on the way is returned after the recorder is idle again.
    pub fn end_recording(&mut self) -> Result<SessionSummary, RecorderError> {
        let Some(mut session) = self.session.take() else {
            return Err(RecorderError::NotRecording);
        };

        session.recording.store(false, Ordering::SeqCst);
        // Taking the sink waits out a tick that is mid-write and starves any later one.
        let video = lock(&session.video).take();
        session.clock.stop();

        let mut first_error: Option<RecorderError> = None;
        if let Some(video) = video {
            if let Err(e) = video.close() {
                error!("Failed to close video: {}", e);
                first_error = first_error.or(Some(e.into()));
            }
        }
        if let Some(stream) = session.stream.take() {
            if let Err(e) = stream.close() {
                error!("Failed to close gaze stream: {}", e);
                first_error = first_error.or(Some(e.into()));
            }
        }
        // The consumer exits once the channel is drained, so every delivered sample
        // is written before the log closes.
        if let Some(consumer) = session.consumer.take() {
            if consumer.join().is_err() {
                warn!("Gaze consumer panicked");
            }
        }
        if let Some(log) = lock(&session.log).take() {
            if let Err(e) = log.close() {
                error!("Failed to close gaze log: {}", e);
                first_error = first_error.or(Some(e.into()));
            }
        }

        let stats = &session.stats;
        let summary = SessionSummary {
            video_path: session.video_path,
            log_path: session.log_path,
            duration: session.started.elapsed(),
            frames_written: stats.frames_written.load(Ordering::SeqCst),
            frames_skipped: stats.frames_skipped.load(Ordering::SeqCst)
                + session.clock.missed_ticks(),
            frames_failed: stats.frames_failed.load(Ordering::SeqCst),
            samples_logged: stats.samples_logged.load(Ordering::SeqCst),
            samples_failed: stats.samples_failed.load(Ordering::SeqCst),
            device_disconnected: stats.device_disconnected.load(Ordering::SeqCst),
        };
        info!(
            "Recording stopped after {:.1}s: {} frames, {} gaze samples",
            summary.duration.as_secs_f64(),
            summary.frames_written,
            summary.samples_logged
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Starts the clock and waits until its thread has opened the screen.
    fn start_clock(
        &self,
        recording: &Arc<AtomicBool>,
        video: &SharedVideo,
        stats: &Arc<SessionStats>,
    ) -> Result<FrameClock, RecorderError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let screen = self.screen.clone();
        let tick = TickHandler {
            size: self.size,
            style: OverlayStyle::from(&self.config.overlay),
            trail: self.trail.clone(),
            recording: recording.clone(),
            video: video.clone(),
            stats: stats.clone(),
        };

        let mut clock = FrameClock::start(self.config.recording.frame_interval(), move || {
            // Screen capturers stay on the thread that created them.
            let mut frames = match screen.open() {
                Ok(frames) => {
                    let _ = ready_tx.send(Ok(()));
                    Some(frames)
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    None
                }
            };
            move || {
                if let Some(frames) = frames.as_mut() {
                    tick.on_tick(&mut **frames);
                }
            }
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(clock),
            Ok(Err(e)) => {
                clock.stop();
                Err(e.into())
            }
            Err(_) => {
                clock.stop();
                Err(CaptureError::InitError("frame clock exited during setup".to_string()).into())
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.end_recording() {
                error!("Failed to stop recording on drop: {}", e);
            }
        }
    }
}

/// Capture, composite and submit one frame. Runs on the clock thread.
struct TickHandler {
    size: ScreenSize,
    style: OverlayStyle,
    trail: Arc<Mutex<GazeTrail>>,
    recording: Arc<AtomicBool>,
    video: SharedVideo,
    stats: Arc<SessionStats>,
}

impl TickHandler {
    fn on_tick(&self, frames: &mut dyn FrameSource) {
        if !self.recording.load(Ordering::SeqCst) {
            return;
        }

        let mut canvas = match frames.snapshot() {
            Ok(canvas) => canvas,
            Err(e) => {
                error!("Skipping frame: {}", e);
                self.stats.frames_skipped.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };
        if canvas.dimensions() != self.size.to_tuple() {
            error!(
                "Skipping frame: captured {:?}, recording at {:?}",
                canvas.dimensions(),
                self.size.to_tuple()
            );
            self.stats.frames_skipped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let trail = lock(&self.trail).snapshot();
        overlay::compose(&mut canvas, &trail, &self.style);

        let mut video = lock(&self.video);
        let Some(sink) = video.as_mut() else {
            debug!("Dropping frame composed after stop");
            return;
        };
        match sink.write_frame(&canvas) {
            Ok(()) => {
                self.stats.frames_written.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!("Failed to write frame: {}", e);
                self.stats.frames_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

fn spawn_consumer(
    samples: Receiver<GazeSample>,
    log: SharedLog,
    trail: Arc<Mutex<GazeTrail>>,
    recording: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("gaze-consumer".to_string())
        .spawn(move || {
            for sample in samples {
                match lock(&log).as_mut() {
                    Some(sink) => match sink.write_sample(&sample) {
                        Ok(()) => {
                            stats.samples_logged.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!("Failed to log gaze sample: {}", e);
                            stats.samples_failed.fetch_add(1, Ordering::SeqCst);
                        }
                    },
                    None => debug!("Gaze sample after log close dropped"),
                }
                lock(&trail).push(&sample);
            }

            if recording.load(Ordering::SeqCst) {
                warn!("Gaze device disconnected; video continues without new gaze data");
                stats.device_disconnected.store(true, Ordering::SeqCst);
            }
        })
}

fn close_video(video: Option<Box<dyn VideoSink>>) {
    if let Some(Err(e)) = video.map(|v| v.close()) {
        warn!("Failed to close video during rollback: {}", e);
    }
}

fn close_log(log: Option<Box<dyn LogSink>>) {
    if let Some(Err(e)) = log.map(|l| l.close()) {
        warn!("Failed to close gaze log during rollback: {}", e);
    }
}
