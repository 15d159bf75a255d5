//! CLI-specific progress handling for rclone-transfer
//!
//! rclone already formats sizes, speed and ETA, so the bar only shows
//! the percentage and the latest sample as its message.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rclone_transfer::ProgressSample;

/// Creates a progress bar for CLI display driven by percentages
pub fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {msg}")
            .expect("Failed to create progress style")
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Percentage of a sample as a number, `0` when unparsable
pub fn percent_of(sample: &ProgressSample) -> u64 {
    sample
        .percentage
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map(|p| p.clamp(0.0, 100.0) as u64)
        .unwrap_or(0)
}

/// One-line summary of a sample
pub fn describe(sample: &ProgressSample) -> String {
    format!(
        "{} / {} ({}) {} ETA {}",
        sample.transferred, sample.size, sample.percentage, sample.speed, sample.eta
    )
}

/// Progress manager for a running transfer
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        let pb = create_progress_bar();

        // Print initial message to stderr
        eprintln!("{}", message);

        Self { pb }
    }

    /// Show the latest sample
    pub fn update(&self, sample: &ProgressSample) {
        self.pb.set_position(percent_of(sample));
        self.pb.set_message(describe(sample));
    }

    pub fn finish(&self, message: &str) {
        self.pb.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(percentage: &str) -> ProgressSample {
        ProgressSample {
            percentage: percentage.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(&sample("42%")), 42);
        assert_eq!(percent_of(&sample("0%")), 0);
        assert_eq!(percent_of(&sample("-")), 0);
    }

    #[test]
    fn test_describe_default_sample() {
        assert_eq!(describe(&ProgressSample::default()), "0 B / 0 B (0%) 0 B/s ETA -");
    }

    #[test]
    fn test_progress_manager_update() {
        let manager = ProgressManager::new("Test transfer");
        manager.update(&sample("75%"));
        assert_eq!(manager.pb.position(), 75);
        manager.finish("done");
    }
}
