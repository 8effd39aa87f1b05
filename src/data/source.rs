use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::data::types::{RawMetric, SignalKind, SubjectKey};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("No {0} credentials configured")]
    MissingCredentials(&'static str),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed upstream payload: {0}")]
    MalformedPayload(String),

    #[error("Not found upstream: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedPayload(err.to_string())
    }
}

/// One external signal. Implementations return the raw count or an error;
/// substituting synthetic values is left to [`with_fallback`].
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn kind(&self) -> SignalKind;

    async fn fetch(&self, key: &SubjectKey) -> Result<f64, FetchError>;

    fn fallback(&self) -> FallbackPolicy {
        FallbackPolicy::for_kind(self.kind())
    }
}

/// Synthetic value used when an upstream is unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackPolicy {
    /// Stable midpoint so scores don't jump between calls.
    Fixed(f64),
    /// Uniform integer in `[low, high)`.
    Uniform { low: u64, high: u64 },
}

impl FallbackPolicy {
    pub fn for_kind(kind: SignalKind) -> Self {
        match kind {
            SignalKind::SearchInterest => FallbackPolicy::Fixed(50.0),
            SignalKind::Mentions => FallbackPolicy::Uniform { low: 200, high: 1200 },
            SignalKind::Discussions => FallbackPolicy::Uniform { low: 10, high: 60 },
            SignalKind::Views => FallbackPolicy::Uniform { low: 5000, high: 55000 },
        }
    }

    /// Inclusive lower and exclusive upper bound of values this policy yields.
    /// A fixed policy reports `(v, v)`.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            FallbackPolicy::Fixed(v) => (v, v),
            FallbackPolicy::Uniform { low, high } => (low as f64, high as f64),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        match *self {
            FallbackPolicy::Fixed(v) => value == v,
            FallbackPolicy::Uniform { low, high } => value >= low as f64 && value < high as f64,
        }
    }
}

/// Injected pseudo-random source for synthetic values. Seeded in tests,
/// time-seeded in production.
pub struct FallbackRng {
    inner: Mutex<StdRng>,
}

impl FallbackRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::seeded(nanos)
    }

    /// Uniform integer in `[low, high)`. Returns `low` for an empty range.
    pub fn range(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        match self.inner.lock() {
            Ok(mut rng) => rng.gen_range(low..high),
            Err(poisoned) => poisoned.into_inner().gen_range(low..high),
        }
    }

    pub fn draw(&self, policy: FallbackPolicy) -> f64 {
        match policy {
            FallbackPolicy::Fixed(v) => v,
            FallbackPolicy::Uniform { low, high } => self.range(low, high) as f64,
        }
    }
}

/// Run an adapter, substituting its fallback on any error. Never fails.
pub async fn with_fallback(
    source: &dyn SignalSource,
    key: &SubjectKey,
    rng: &FallbackRng,
) -> RawMetric {
    let kind = source.kind();
    match source.fetch(key).await {
        Ok(value) if value.is_finite() && value >= 0.0 => RawMetric::live(kind, value),
        Ok(value) => {
            let synthetic = rng.draw(source.fallback());
            warn!(
                signal = %kind,
                subject = key.display_name(),
                "Upstream returned unusable value {value} - using synthetic {synthetic}"
            );
            RawMetric::synthetic(kind, synthetic)
        }
        Err(e) => {
            let synthetic = rng.draw(source.fallback());
            warn!(
                signal = %kind,
                subject = key.display_name(),
                "{e} - using synthetic {synthetic}"
            );
            RawMetric::synthetic(kind, synthetic)
        }
    }
}
