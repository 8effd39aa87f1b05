//! Subject registry and metric time-series contracts.
//!
//! The stored `reach_score` of a sample is a cache written at sync time.
//! Readers recompute scores from the raw metrics.

pub mod memory;
pub mod sqlite;

use anyhow::Result;

use crate::data::types::{MetricSample, Subject};

/// Samples shown for a subject's chart and trend.
pub const HISTORY_WINDOW: usize = 24;

pub trait SubjectRegistry: Send + Sync {
    /// All subjects, highest base score first.
    fn list_subjects(&self) -> Result<Vec<Subject>>;

    fn get_subject(&self, id: &str) -> Result<Option<Subject>>;

    /// Insert if absent. Returns false when the id was already registered;
    /// existing subjects are not overwritten.
    fn register_subject(&self, subject: &Subject) -> Result<bool>;

    /// The only mutation allowed after registration. Returns false for an
    /// unknown id.
    fn correct_subject(&self, id: &str, category: &str, verified: bool) -> Result<bool>;
}

pub trait MetricStore: Send + Sync {
    /// Append one cycle's samples as a single batch.
    fn append(&self, samples: &[MetricSample]) -> Result<()>;

    fn latest(&self, subject_id: &str) -> Result<Option<MetricSample>>;

    /// Last `n` samples for the subject, oldest first.
    fn trailing_window(&self, subject_id: &str, n: usize) -> Result<Vec<MetricSample>>;
}

/// Register every subject, returning how many were new.
pub fn seed_registry(registry: &dyn SubjectRegistry, subjects: &[Subject]) -> Result<usize> {
    let mut inserted = 0;
    for subject in subjects {
        if registry.register_subject(subject)? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Base score descending, id ascending on ties.
pub(crate) fn sort_by_base_score(subjects: &mut [Subject]) {
    subjects.sort_by(|a, b| {
        b.base_score
            .partial_cmp(&a.base_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}
