use super::GazeSample;
use std::collections::VecDeque;

/// Recent gaze history shared between the gaze consumer and the frame compositor.
///
/// The bounded window and the current point live in one value so a single lock
/// covers both; readers copy a [`TrailSnapshot`] and never see a half-applied sample.
#[derive(Debug, Clone)]
pub struct GazeTrail {
    capacity: usize,
    points: VecDeque<(f64, f64)>,
    current: (f64, f64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailSnapshot {
    /// Oldest first.
    pub points: Vec<(f64, f64)>,
    pub current: (f64, f64),
    pub capacity: usize,
}

impl GazeTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
            current: (0.0, 0.0),
        }
    }

    pub fn push(&mut self, sample: &GazeSample) {
        self.current = sample.point();
        if self.capacity == 0 {
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(sample.point());
    }

    pub fn snapshot(&self) -> TrailSnapshot {
        TrailSnapshot {
            points: self.points.iter().copied().collect(),
            current: self.current,
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(trail: &mut GazeTrail, n: usize) {
        for i in 0..n {
            trail.push(&GazeSample::new(i as f64, i as f64, (i * 2) as f64));
        }
    }

    fn check_window(n: usize) {
        let mut trail = GazeTrail::new(10);
        feed(&mut trail, n);

        let snapshot = trail.snapshot();
        let kept = n.min(10);
        let evicted = n.saturating_sub(10);
        assert_eq!(snapshot.points.len(), kept);
        for (offset, point) in snapshot.points.iter().enumerate() {
            let i = evicted + offset;
            assert_eq!(*point, (i as f64, (i * 2) as f64));
        }
    }

    #[test]
    fn window_keeps_three() {
        check_window(3);
    }

    #[test]
    fn window_fills_exactly() {
        check_window(10);
    }

    #[test]
    fn window_evicts_oldest() {
        check_window(11);
    }

    #[test]
    fn window_after_many_samples() {
        check_window(25);
    }

    #[test]
    fn current_follows_latest_sample() {
        let mut trail = GazeTrail::new(10);
        assert_eq!(trail.snapshot().current, (0.0, 0.0));

        for i in 0..25 {
            let sample = GazeSample::new(1000.0 + i as f64, -5.0 * i as f64, 3000.5);
            trail.push(&sample);
            assert_eq!(trail.snapshot().current, (sample.x, sample.y));
        }
        assert_eq!(trail.snapshot().current, (-120.0, 3000.5));
    }

    #[test]
    fn concurrent_readers_never_see_a_torn_update() {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        };
        use std::thread;
        use std::time::{Duration, Instant};

        let trail = Arc::new(Mutex::new(GazeTrail::new(10)));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let trail = trail.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut i = 0u64;
                while !done.load(Ordering::Relaxed) {
                    let v = i as f64;
                    trail.lock().unwrap().push(&GazeSample::new(v, v, -v));
                    i += 1;
                }
                i
            })
        };

        let started = Instant::now();
        let mut reads = 0u64;
        while started.elapsed() < Duration::from_secs(5) {
            let snapshot = trail.lock().unwrap().snapshot();
            assert!(snapshot.points.len() <= 10);
            for pair in snapshot.points.windows(2) {
                assert_eq!(pair[1].0, pair[0].0 + 1.0, "gap in {:?}", snapshot.points);
            }
            for &(x, y) in &snapshot.points {
                assert_eq!(y, -x, "torn pair in {:?}", snapshot.points);
            }
            if let Some(&newest) = snapshot.points.last() {
                assert_eq!(snapshot.current, newest);
            }
            reads += 1;
        }

        done.store(true, Ordering::Relaxed);
        let written = writer.join().unwrap();
        assert!(reads > 0 && written > 0);
    }

    #[test]
    fn zero_capacity_tracks_current_only() {
        let mut trail = GazeTrail::new(0);
        trail.push(&GazeSample::new(0.0, 4.0, 2.0));
        let snapshot = trail.snapshot();
        assert!(snapshot.points.is_empty());
        assert_eq!(snapshot.current, (4.0, 2.0));
    }
}
