use std::time::{Duration, Instant};

/// Utility for keeping track of the time it took to perform some operation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start_time: Instant,
}

impl Timer {
    /// Create a new `Timer`.
    pub fn now() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Reset internal timer to now.
    pub fn reset(&mut self) {
        self.start_time = Instant::now();
    }

    /// Time since the timer was last reset.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log a message with the elapsed time since the timer was last reset.
    pub fn log_elapsed(&self, what: &str) {
        log::info!("{} took {}", what, format_duration(self.elapsed()));
    }
}

/// Render a duration as `H:MM:SS`, the way run times are reported to users.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn test_format_duration() {
        assert_eq!("0:00:00", format_duration(Duration::from_millis(999)));
        assert_eq!("1:01:01", format_duration(Duration::from_secs(3661)));
        assert_eq!("26:00:05", format_duration(Duration::from_secs(26 * 3600 + 5)));
    }
}
