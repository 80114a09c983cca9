//! Clock-tamper anomaly detection layered on trusted time.
//!
//! Successive trusted-time samples are compared for backward jumps
//! (rollback, the classic license-evasion tactic), abnormally large
//! forward jumps, and sustained drift beyond tolerance. Forward movement
//! is judged against real elapsed time from the monotonic clock, so an
//! idle gap between observations is not mistaken for a jump. Anomalies
//! are append-only and pruned after a retention window; after an anomaly
//! the integrity signal stays unsafe until enough consecutive clean
//! samples restore trust (hysteresis, so the signal doesn't flap).
//!
//! This service only supplies a trust signal. Revoking or rejecting
//! licenses is the manager's call.

use crate::clock::Clock;
use crate::time::sample::{AnomalyKind, AnomalyRecord, TimeSample};
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Backward movement beyond this is flagged as a rollback.
pub const ROLLBACK_TOLERANCE_SECS: i64 = 5;

/// Forward wall-clock movement exceeding real elapsed time by more than
/// this between samples is flagged.
pub const FORWARD_JUMP_LIMIT_SECS: i64 = 60 * 60;

/// Network-vs-local drift beyond this is flagged.
pub const DRIFT_TOLERANCE_SECS: i64 = 5 * 60;

/// Anomalies older than this no longer affect the integrity signal.
pub const ANOMALY_RETENTION_SECS: i64 = 24 * 60 * 60;

/// Consecutive clean samples required to restore trust after an anomaly.
pub const CLEAN_SAMPLES_TO_RESTORE: u32 = 10;

/// Bounded sample history length.
const HISTORY_LEN: usize = 32;

/// Result of a time integrity check.
#[derive(Debug, Clone)]
pub struct TimeIntegrityReport {
    /// Whether "now" may be trusted for expiry checks.
    pub safe: bool,

    /// Trust in the current time signal, 0..1.
    pub confidence: f64,

    /// Human-readable findings.
    pub issues: Vec<String>,

    /// Suggested operator actions.
    pub recommendations: Vec<String>,
}

/// Protection diagnostics.
#[derive(Debug, Clone)]
pub struct ProtectionStatus {
    /// Whether anomaly detection is running.
    pub active: bool,

    /// Anomalies currently within the retention window.
    pub anomaly_count: usize,

    /// The most recent retained anomaly, if any.
    pub last_anomaly: Option<AnomalyRecord>,

    /// Clean samples observed since the last anomaly.
    pub clean_streak: u32,

    /// Total samples observed.
    pub samples_observed: u64,
}

struct ProtectionState {
    history: VecDeque<TimeSample>,
    last_mono: Option<std::time::Duration>,
    anomalies: Vec<AnomalyRecord>,
    clean_streak: u32,
    samples_observed: u64,
}

/// Flags suspicious time jumps and keeps the anomaly history.
pub struct TimeProtectionService {
    clock: Arc<dyn Clock>,
    state: Mutex<ProtectionState>,
}

impl TimeProtectionService {
    /// Create a protection service with empty history.
    ///
    /// The clock supplies monotonic readings only; wall time comes from
    /// the observed samples.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ProtectionState {
                history: VecDeque::with_capacity(HISTORY_LEN),
                last_mono: None,
                anomalies: Vec::new(),
                clean_streak: 0,
                samples_observed: 0,
            }),
        }
    }

    /// Feed one trusted-time sample into the anomaly detector.
    pub fn observe(&self, sample: &TimeSample) {
        let mono = self.clock.monotonic();
        let mut state = self.state.lock().expect("protection lock");
        state.samples_observed += 1;

        let mut found: Vec<(AnomalyKind, i64)> = Vec::new();

        if let Some(prev) = state.history.back() {
            let delta = (sample.value - prev.value).num_seconds();
            if delta < -ROLLBACK_TOLERANCE_SECS {
                found.push((AnomalyKind::ClockRollback, delta.abs()));
            } else {
                // Idle time between observations is real movement; only
                // the excess over monotonic elapsed time is a jump.
                let elapsed = state
                    .last_mono
                    .map(|m| mono.saturating_sub(m).as_secs() as i64)
                    .unwrap_or(0);
                let excess = delta - elapsed;
                if excess > FORWARD_JUMP_LIMIT_SECS {
                    found.push((AnomalyKind::ClockJumpForward, excess));
                }
            }
        }

        let drift_secs = sample.drift.num_seconds().abs();
        if drift_secs > DRIFT_TOLERANCE_SECS {
            found.push((AnomalyKind::DriftExceeded, drift_secs));
        }

        if found.is_empty() {
            state.clean_streak = state.clean_streak.saturating_add(1);
        } else {
            state.clean_streak = 0;
            for (kind, magnitude_secs) in found {
                warn!(?kind, magnitude_secs, "time anomaly detected");
                state.anomalies.push(AnomalyRecord {
                    observed_at: sample.value,
                    kind,
                    magnitude_secs,
                });
            }
        }

        // Prune by the newest observation we have, so a rolled-back clock
        // cannot age anomalies out of retention.
        let newest = state
            .anomalies
            .iter()
            .map(|a| a.observed_at)
            .chain(std::iter::once(sample.value))
            .max();
        if let Some(newest) = newest {
            let cutoff = newest - Duration::seconds(ANOMALY_RETENTION_SECS);
            state.anomalies.retain(|a| a.observed_at >= cutoff);
        }

        if state.history.len() == HISTORY_LEN {
            state.history.pop_front();
        }
        state.history.push_back(sample.clone());
        state.last_mono = Some(mono);
    }

    /// Check whether "now" may be treated as authoritative.
    pub fn check_integrity(&self) -> TimeIntegrityReport {
        let state = self.state.lock().expect("protection lock");

        if state.anomalies.is_empty() {
            return TimeIntegrityReport {
                safe: true,
                confidence: 1.0,
                issues: Vec::new(),
                recommendations: Vec::new(),
            };
        }

        let restored = state.clean_streak >= CLEAN_SAMPLES_TO_RESTORE;
        let mut issues: Vec<String> = state
            .anomalies
            .iter()
            .map(|a| format!("{} ({}s)", a.kind.describe(), a.magnitude_secs))
            .collect();
        issues.dedup();

        let confidence = if restored {
            0.8
        } else {
            // Each retained anomaly costs trust, down to a floor.
            (1.0 - 0.3 * state.anomalies.len() as f64).max(0.1)
        };

        TimeIntegrityReport {
            safe: restored,
            confidence,
            issues,
            recommendations: vec![
                "re-sync network time".to_string(),
                "contact support if license issues persist".to_string(),
            ],
        }
    }

    /// Current protection diagnostics.
    pub fn protection_status(&self) -> ProtectionStatus {
        let state = self.state.lock().expect("protection lock");
        ProtectionStatus {
            active: true,
            anomaly_count: state.anomalies.len(),
            last_anomaly: state.anomalies.last().cloned(),
            clean_streak: state.clean_streak,
            samples_observed: state.samples_observed,
        }
    }
}
