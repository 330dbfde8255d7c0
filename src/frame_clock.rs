use log::{debug, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Fixed-period ticker running on its own thread.
///
/// Ticks are scheduled against absolute deadlines. A tick that overruns one or more
/// periods drops the deadlines it missed instead of firing them back to back.
pub struct FrameClock {
    stop: Arc<AtomicBool>,
    missed: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FrameClock {
    /// `on_tick` runs on the clock thread. `setup` runs there first, once, so that
    /// thread-bound resources can be created where they are used.
    pub fn start<S, T>(interval: Duration, setup: S) -> std::io::Result<Self>
    where
        S: FnOnce() -> T + Send + 'static,
        T: FnMut() + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let missed = Arc::new(AtomicU64::new(0));
        let thread_stop = stop.clone();
        let thread_missed = missed.clone();

        let handle = thread::Builder::new()
            .name("frame-clock".to_string())
            .spawn(move || {
                let mut on_tick = setup();
                let interval = interval.max(Duration::from_millis(1));
                let mut deadline = Instant::now() + interval;

                loop {
                    while let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                        if thread_stop.load(Ordering::SeqCst) {
                            return;
                        }
                        thread::park_timeout(wait);
                    }
                    if thread_stop.load(Ordering::SeqCst) {
                        return;
                    }

                    on_tick();

                    deadline += interval;
                    let now = Instant::now();
                    if deadline <= now {
                        let behind = (now - deadline).as_nanos() / interval.as_nanos() + 1;
                        thread_missed.fetch_add(behind as u64, Ordering::Relaxed);
                        debug!("Frame clock overran, dropping {} tick(s)", behind);
                        deadline += interval * behind as u32;
                    }
                }
            })?;

        Ok(Self {
            stop,
            missed,
            handle: Some(handle),
        })
    }

    /// Ticks dropped because a previous tick overran its period.
    pub fn missed_ticks(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Returns once the clock thread has exited; a tick in progress finishes first.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Frame clock thread panicked");
            }
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.stop();
    }
}
