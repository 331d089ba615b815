//! Progress reporting for long-running analyses.

/// Sink for progress and status messages from analysis algorithms.
///
/// Implementations must tolerate being called from the thread driving the
/// analysis; the library never installs or requires a tracker, and all
/// entry points accept [`NullTracker`] to opt out.
pub trait ProgressTracker: Send + Sync {
    /// Reports fractional progress in `[0, 1]`.
    fn progress(&self, fraction: f64);

    /// Reports progress as a position out of a total.
    fn progress_count(&self, position: u64, total: u64) {
        if total > 0 {
            #[allow(clippy::cast_precision_loss)]
            self.progress(position as f64 / total as f64);
        }
    }

    /// Receives a free-form log message.
    fn log(&self, _message: &str) {}

    /// Receives a status line describing the current phase.
    fn status(&self, _message: &str) {}
}

/// A tracker that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracker;

impl ProgressTracker for NullTracker {
    fn progress(&self, _fraction: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        fractions: Mutex<Vec<f64>>,
    }

    impl ProgressTracker for Recording {
        fn progress(&self, fraction: f64) {
            self.fractions.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn test_progress_count_converts_to_fraction() {
        let tracker = Recording {
            fractions: Mutex::new(Vec::new()),
        };
        tracker.progress_count(1, 4);
        tracker.progress_count(0, 0); // ignored, no total
        let seen = tracker.fractions.lock().unwrap();
        assert_eq!(seen.as_slice(), &[0.25]);
    }
}
