use anyhow::Result;
use dashmap::DashMap;

use crate::data::types::{MetricSample, Subject};
use crate::store::{sort_by_base_score, MetricStore, SubjectRegistry};

/// Process-local store used when no database path is configured, and in tests.
pub struct MemoryStore {
    subjects: DashMap<String, Subject>,
    samples: DashMap<String, Vec<MetricSample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            subjects: DashMap::new(),
            samples: DashMap::new(),
        }
    }

    /// Total samples held across all subjects
    pub fn len(&self) -> usize {
        self.samples.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectRegistry for MemoryStore {
    fn list_subjects(&self) -> Result<Vec<Subject>> {
        let mut subjects: Vec<Subject> = self.subjects.iter().map(|e| e.value().clone()).collect();
        sort_by_base_score(&mut subjects);
        Ok(subjects)
    }

    fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        Ok(self.subjects.get(id).map(|e| e.value().clone()))
    }

    fn register_subject(&self, subject: &Subject) -> Result<bool> {
        let mut inserted = false;
        self.subjects.entry(subject.id.clone()).or_insert_with(|| {
            inserted = true;
            subject.clone()
        });
        Ok(inserted)
    }

    fn correct_subject(&self, id: &str, category: &str, verified: bool) -> Result<bool> {
        match self.subjects.get_mut(id) {
            Some(mut entry) => {
                entry.category = category.to_string();
                entry.verified = verified;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl MetricStore for MemoryStore {
    fn append(&self, samples: &[MetricSample]) -> Result<()> {
        for sample in samples {
            let mut series = self.samples.entry(sample.subject_id.clone()).or_default();
            // Keep each series time-ordered even if a batch arrives out of order
            let pos = series.partition_point(|s| s.timestamp <= sample.timestamp);
            series.insert(pos, sample.clone());
        }
        Ok(())
    }

    fn latest(&self, subject_id: &str) -> Result<Option<MetricSample>> {
        Ok(self
            .samples
            .get(subject_id)
            .and_then(|series| series.last().cloned()))
    }

    fn trailing_window(&self, subject_id: &str, n: usize) -> Result<Vec<MetricSample>> {
        Ok(self
            .samples
            .get(subject_id)
            .map(|series| {
                let start = series.len().saturating_sub(n);
                series[start..].to_vec()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Metrics, SyntheticMask};
    use chrono::{Duration, Utc};

    fn subject(id: &str, base_score: f64) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_uppercase(),
            handle: format!("@{id}"),
            platforms: vec![],
            base_score,
            avatar: None,
            category: "Gaming".to_string(),
            verified: false,
        }
    }

    #[test]
    fn test_register_and_list() {
        let store = MemoryStore::new();
        assert!(store.register_subject(&subject("x", 80.0)).unwrap());
        assert!(store.register_subject(&subject("y", 90.0)).unwrap());
        assert!(!store.register_subject(&subject("x", 10.0)).unwrap());

        let list = store.list_subjects().unwrap();
        assert_eq!(list[0].id, "y");
        assert_eq!(list[1].base_score, 80.0);

        assert!(store.correct_subject("x", "Podcast", true).unwrap());
        assert_eq!(store.get_subject("x").unwrap().unwrap().category, "Podcast");
    }

    #[test]
    fn test_out_of_order_batch_is_sorted() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sample = |score: f64, ts| MetricSample {
            subject_id: "x".to_string(),
            metrics: Metrics::UNSYNCED,
            reach_score: score,
            synthetic: SyntheticMask::default(),
            timestamp: ts,
        };

        store
            .append(&[sample(2.0, now), sample(1.0, now - Duration::minutes(5))])
            .unwrap();
        store.append(&[sample(3.0, now + Duration::minutes(5))]).unwrap();

        let window = store.trailing_window("x", 2).unwrap();
        assert_eq!(window.iter().map(|s| s.reach_score).collect::<Vec<_>>(), vec![2.0, 3.0]);
        assert_eq!(store.latest("x").unwrap().unwrap().reach_score, 3.0);
        assert_eq!(store.len(), 3);
    }
}
