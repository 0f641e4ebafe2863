use std::time::Instant;

/// Receives notifications about long-running load phases.
///
/// Each phase is bracketed by `start` and `done`. Durations are in arbitrary
/// units; `advance` may overshoot the announced duration on multi-pass phases.
pub trait Progress {
    fn start(&mut self, description: &str, duration: u64);
    fn advance(&mut self, n: u64);
    fn update(&mut self, current: u64);
    fn done(&mut self);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn start(&mut self, _description: &str, _duration: u64) {}
    fn advance(&mut self, _n: u64) {}
    fn update(&mut self, _current: u64) {}
    fn done(&mut self) {}
}

/// Forwards phase boundaries to the `log` facade.
///
/// Intermediate progress is reported at debug level every tenth of the
/// announced duration.
pub struct LogProgress {
    label: String,
    description: String,
    duration: u64,
    current: u64,
    next_report: u64,
    started: Option<Instant>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        LogProgress {
            label: label.into(),
            description: String::new(),
            duration: 0,
            current: 0,
            next_report: 0,
            started: None,
        }
    }

    fn step(&self) -> u64 {
        (self.duration / 10).max(1)
    }

    fn maybe_report(&mut self) {
        if self.current >= self.next_report {
            debug!(
                "[{}] {}: {}/{}",
                self.label, self.description, self.current, self.duration
            );
            self.next_report = self.current + self.step();
        }
    }
}

impl Progress for LogProgress {
    fn start(&mut self, description: &str, duration: u64) {
        info!("[{}] {} ({} units)", self.label, description, duration);
        self.description = description.to_string();
        self.duration = duration;
        self.current = 0;
        self.next_report = self.step();
        self.started = Some(Instant::now());
    }

    fn advance(&mut self, n: u64) {
        self.current += n;
        self.maybe_report();
    }

    fn update(&mut self, current: u64) {
        self.current = current;
        self.maybe_report();
    }

    fn done(&mut self) {
        let elapsed = self.started.take().map(|s| s.elapsed()).unwrap_or_default();
        info!(
            "[{}] {} finished in {} ms",
            self.label,
            self.description,
            elapsed.as_micros() as f64 / 1000f64
        );
    }
}
