use std::time::{Duration, Instant};

/// Helper to time various parts of the code.
/// Elapsed time is logged when the struct is dropped.
pub struct Stopwatch {
    start: Instant,
    name: &'static str,
}

impl Stopwatch {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        log::info!("[{}] elapsed {:.3}s", self.name, self.elapsed().as_secs_f64());
    }
}
