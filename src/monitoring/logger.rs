use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::data::types::{MetricSample, SignalKind};

const HEADER: &str = "timestamp,subject_id,google_trends,twitter_mentions,reddit_posts,youtube_views,reach_score,synthetic";

/// Appends every aggregated sample to a CSV file for offline inspection.
pub struct CsvLogger {
    log_path: PathBuf,
}

impl CsvLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        // Header only on first creation
        if !log_path.exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create CSV log: {}", log_path.display()))?;
            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    /// One row per sample. Synthetic signals are listed by name, `|`-separated.
    pub fn log_samples(&self, samples: &[MetricSample]) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open CSV log: {}", self.log_path.display()))?;

        for s in samples {
            let synthetic = SignalKind::ALL
                .iter()
                .filter(|k| s.synthetic.contains(**k))
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join("|");

            writeln!(
                file,
                "{},{},{:.0},{:.0},{:.0},{:.0},{:.2},{}",
                s.timestamp.to_rfc3339(),
                s.subject_id,
                s.metrics.google_trends,
                s.metrics.twitter_mentions,
                s.metrics.reddit_posts,
                s.metrics.youtube_views,
                s.reach_score,
                synthetic
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Metrics, SyntheticMask};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_writes_header_once_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.csv");

        let mut synthetic = SyntheticMask::default();
        synthetic.set(SignalKind::Mentions);
        synthetic.set(SignalKind::Views);
        let sample = MetricSample {
            subject_id: "cr10".to_string(),
            metrics: Metrics {
                google_trends: 61.0,
                twitter_mentions: 812.0,
                reddit_posts: 33.0,
                youtube_views: 41_000.0,
            },
            reach_score: 57.25,
            synthetic,
            timestamp: Utc::now(),
        };

        CsvLogger::new(&path).unwrap().log_samples(&[sample.clone()]).unwrap();
        // Reopening must not duplicate the header
        CsvLogger::new(&path).unwrap().log_samples(&[sample]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains(",cr10,61,812,33,41000,57.25,twitter_mentions|youtube_views"));
    }
}
