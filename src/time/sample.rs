//! Time sample and anomaly record types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Where a time reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// Raw local system clock, no network correction available.
    SystemClock,
    /// Local clock corrected by a fresh network sync.
    Network,
    /// Local clock corrected by a previously cached network offset.
    PreviousTrusted,
}

/// One trusted-time reading.
///
/// Confidence decreases as drift magnitude grows or as the last network
/// sync ages; a low-confidence sample is still returned (never blocks) but
/// must not be treated as authoritative.
#[derive(Debug, Clone)]
pub struct TimeSample {
    /// Origin of this reading.
    pub source: TimeSource,

    /// The corrected timestamp.
    pub value: DateTime<Utc>,

    /// Trust in this reading, 0..1.
    pub confidence: f64,

    /// Signed offset of network time versus the local clock at last sync.
    pub drift: Duration,
}

impl TimeSample {
    /// Whether this sample may be treated as authoritative for expiry checks.
    pub fn is_authoritative(&self, floor: f64) -> bool {
        self.confidence >= floor
    }
}

/// Kind of detected clock anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    /// Clock moved backward between readings (license-evasion tactic).
    ClockRollback,
    /// Clock jumped forward far more than elapsed wall time explains.
    ClockJumpForward,
    /// Sustained network-vs-local drift beyond tolerance.
    DriftExceeded,
}

impl AnomalyKind {
    /// Human-readable finding for integrity reports.
    pub fn describe(&self) -> &'static str {
        match self {
            AnomalyKind::ClockRollback => "system clock moved backward between readings",
            AnomalyKind::ClockJumpForward => "system clock jumped forward abnormally",
            AnomalyKind::DriftExceeded => "sustained drift from network time exceeds tolerance",
        }
    }
}

/// Append-only record of a detected anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// When the anomaly was observed (trusted-time terms).
    pub observed_at: DateTime<Utc>,

    /// What kind of anomaly this was.
    pub kind: AnomalyKind,

    /// Magnitude of the jump or drift, in seconds.
    pub magnitude_secs: i64,
}
