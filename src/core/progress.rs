//! Live progress extracted from rclone's `-P` output

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `Transferred: <size> / <size>, <pct>%, <speed>/s, ETA <duration>`
static PROGRESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Transferred:\s+([\d.]+\s*\w+)\s+/\s+([\d.]+\s*\w+),\s+([\d.]+%)\s*,\s+([\d.]+\s*\w+/s),\s+ETA\s+([\dwdhms]+)",
    )
    .expect("progress pattern is valid")
});

/// Latest progress reported by rclone, already formatted for display
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub transferred: String,
    pub size: String,
    pub percentage: String,
    pub speed: String,
    pub eta: String,
}

impl Default for ProgressSample {
    fn default() -> Self {
        Self {
            transferred: "0 B".to_string(),
            size: "0 B".to_string(),
            percentage: "0%".to_string(),
            speed: "0 B/s".to_string(),
            eta: "-".to_string(),
        }
    }
}

/// Parse one output line, `None` when it is not a progress line
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    let caps = PROGRESS_LINE.captures(line)?;
    Some(ProgressSample {
        transferred: caps[1].to_string(),
        size: caps[2].to_string(),
        percentage: caps[3].to_string(),
        speed: caps[4].to_string(),
        eta: caps[5].to_string(),
    })
}

/// Shared cell holding the latest sample
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    latest: Arc<Mutex<ProgressSample>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line of output, returns whether the sample changed
    pub fn update(&self, line: &str) -> bool {
        match parse_progress_line(line) {
            Some(sample) => {
                if let Ok(mut latest) = self.latest.lock() {
                    *latest = sample;
                }
                true
            }
            None => false,
        }
    }

    /// Copy of the latest sample
    pub fn snapshot(&self) -> ProgressSample {
        self.latest
            .lock()
            .map(|latest| latest.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        let line = "Transferred: 10.5 MiB / 100.0 MiB, 10%, 2.1 MiB/s, ETA 45s";
        let sample = parse_progress_line(line).unwrap();
        assert_eq!(sample.transferred, "10.5 MiB");
        assert_eq!(sample.size, "100.0 MiB");
        assert_eq!(sample.percentage, "10%");
        assert_eq!(sample.speed, "2.1 MiB/s");
        assert_eq!(sample.eta, "45s");
    }

    #[test]
    fn test_parse_rclone_padding() {
        // rclone pads the first column and uses compound durations
        let line = "Transferred:   \t  1.203 GiB / 4.500 GiB, 27%, 12.345 MiB/s, ETA 4m33s";
        let sample = parse_progress_line(line).unwrap();
        assert_eq!(sample.transferred, "1.203 GiB");
        assert_eq!(sample.eta, "4m33s");
    }

    #[test]
    fn test_non_matching_lines() {
        assert!(parse_progress_line("Transferred:            3 / 10, 30%").is_none());
        assert!(parse_progress_line("Checks: 12 / 12, 100%").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn test_tracker_keeps_previous_sample() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot(), ProgressSample::default());

        assert!(tracker.update("Transferred: 10.5 MiB / 100.0 MiB, 10%, 2.1 MiB/s, ETA 45s"));
        let before = tracker.snapshot();

        assert!(!tracker.update("Elapsed time: 5.0s"));
        assert_eq!(tracker.snapshot(), before);
        assert_eq!(before.percentage, "10%");
    }

    #[test]
    fn test_tracker_clones_share_state() {
        let tracker = ProgressTracker::new();
        let reader = tracker.clone();
        tracker.update("Transferred: 1 KiB / 2 KiB, 50%, 1 KiB/s, ETA 1s");
        assert_eq!(reader.snapshot().percentage, "50%");
    }
}
