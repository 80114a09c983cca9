//! Trusted time service: network-corrected clock readings.
//!
//! The service fetches time from HTTPS references (their `Date` headers),
//! caches the network-vs-local offset, and applies it to subsequent local
//! reads until the next resync. Fetch failures are non-fatal: the prior
//! offset is retained and confidence decays with the age of the last sync.
//!
//! Two read paths: `trusted_now` may resync (and is for validation-class
//! calls that tolerate a network round-trip), `cached_now` never touches
//! the network and is for feature checks and status reads. The fetch runs
//! with the state lock released, so cached reads never queue behind
//! blocking I/O.

use crate::clock::Clock;
use crate::errors::TierlockError;
use crate::time::sample::{TimeSample, TimeSource};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Confidence reported when no network sync has ever succeeded.
pub const UNSYNCED_CONFIDENCE: f64 = 0.3;

/// Confidence never drops below this; a best-effort value is always returned.
pub const CONFIDENCE_FLOOR: f64 = 0.2;

/// Sync age at which the age penalty bottoms out.
const CONFIDENCE_DECAY_HORIZON_SECS: i64 = 6 * 60 * 60;

/// A network time reference.
///
/// Capability-injected so tests can script readings without sockets.
pub trait NetworkTimeSource: Send + Sync {
    /// Fetch the current time from the reference.
    fn fetch_time(&self) -> Result<DateTime<Utc>, TierlockError>;

    /// Label used in logs.
    fn name(&self) -> &str;
}

/// Production time source reading the `Date` header of an HTTPS response.
pub struct HttpTimeSource {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpTimeSource {
    /// Create a source for one HTTPS endpoint with the given timeout.
    pub fn new(endpoint: &str, timeout: std::time::Duration) -> Result<Self, TierlockError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TierlockError::TimeSource(format!("Failed to build client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl NetworkTimeSource for HttpTimeSource {
    fn fetch_time(&self) -> Result<DateTime<Utc>, TierlockError> {
        let response = self
            .client
            .head(&self.endpoint)
            .send()
            .map_err(|e| TierlockError::TimeSource(format!("Request failed: {}", e)))?;

        let date_header = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TierlockError::TimeSource("Missing Date header".to_string()))?;

        DateTime::parse_from_rfc2822(date_header)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TierlockError::TimeSource(format!("Invalid Date header: {}", e)))
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

/// Sync status for diagnostics and operator tooling.
#[derive(Debug, Clone)]
pub struct TimeSyncStatus {
    /// When the last successful network sync happened (local clock terms).
    pub last_sync: Option<DateTime<Utc>>,

    /// Cached network-vs-local offset.
    pub offset: Duration,

    /// Network fetch failures since the last successful sync.
    pub consecutive_failures: u32,
}

struct SyncState {
    offset: Duration,
    last_sync: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

/// Obtains time values resistant to local clock manipulation.
pub struct TrustedTimeService {
    clock: Arc<dyn Clock>,
    sources: Vec<Box<dyn NetworkTimeSource>>,
    resync_interval: Duration,
    state: Mutex<SyncState>,
}

impl TrustedTimeService {
    /// Create a service over the given time references.
    ///
    /// An empty source list degrades to the local clock at reduced
    /// confidence; it never fails construction.
    pub fn new(
        clock: Arc<dyn Clock>,
        sources: Vec<Box<dyn NetworkTimeSource>>,
        resync_interval: std::time::Duration,
    ) -> Self {
        let resync_interval =
            Duration::from_std(resync_interval).unwrap_or_else(|_| Duration::minutes(15));
        Self {
            clock,
            sources,
            resync_interval,
            state: Mutex::new(SyncState {
                offset: Duration::zero(),
                last_sync: None,
                consecutive_failures: 0,
            }),
        }
    }

    /// Get the current trusted time, resyncing if the cached offset is stale.
    ///
    /// The network fetch runs without the state lock held. Never blocks on
    /// failure: a best-effort sample at reduced confidence is always
    /// returned.
    pub fn trusted_now(&self) -> TimeSample {
        let local = self.clock.now_utc();

        let stale = {
            let state = self.state.lock().expect("time sync lock");
            match state.last_sync {
                None => true,
                Some(last) => local - last >= self.resync_interval,
            }
        };

        let mut fresh_sync = false;
        if stale && !self.sources.is_empty() {
            let fetched = self.fetch_network_time();
            let mut state = self.state.lock().expect("time sync lock");
            match fetched {
                Some(network_now) => {
                    state.offset = network_now - local;
                    state.last_sync = Some(local);
                    state.consecutive_failures = 0;
                    fresh_sync = true;
                }
                None => {
                    state.consecutive_failures += 1;
                    warn!(
                        failures = state.consecutive_failures,
                        "all network time sources unreachable, keeping cached offset"
                    );
                }
            }
        }

        self.sample_at(local, fresh_sync)
    }

    /// Get the current trusted time from the cached offset only.
    ///
    /// Never touches the network, so feature checks and status reads
    /// cannot stall; staleness shows up as lower confidence instead.
    pub fn cached_now(&self) -> TimeSample {
        self.sample_at(self.clock.now_utc(), false)
    }

    /// Force a resync on the next `trusted_now` call.
    pub fn invalidate_sync(&self) {
        self.state.lock().expect("time sync lock").last_sync = None;
    }

    /// Current sync diagnostics.
    pub fn sync_status(&self) -> TimeSyncStatus {
        let state = self.state.lock().expect("time sync lock");
        TimeSyncStatus {
            last_sync: state.last_sync,
            offset: state.offset,
            consecutive_failures: state.consecutive_failures,
        }
    }

    fn sample_at(&self, local: DateTime<Utc>, fresh_sync: bool) -> TimeSample {
        let state = self.state.lock().expect("time sync lock");
        let value = local + state.offset;
        match state.last_sync {
            None => TimeSample {
                source: TimeSource::SystemClock,
                value,
                confidence: UNSYNCED_CONFIDENCE,
                drift: Duration::zero(),
            },
            Some(last) => {
                let source = if fresh_sync {
                    TimeSource::Network
                } else {
                    TimeSource::PreviousTrusted
                };
                TimeSample {
                    source,
                    value,
                    confidence: confidence(local - last, state.offset),
                    drift: state.offset,
                }
            }
        }
    }

    fn fetch_network_time(&self) -> Option<DateTime<Utc>> {
        for source in &self.sources {
            match source.fetch_time() {
                Ok(t) => {
                    debug!(source = source.name(), "network time sync succeeded");
                    return Some(t);
                }
                Err(e) => {
                    debug!(source = source.name(), error = %e, "time source failed");
                }
            }
        }
        None
    }
}

/// Score a sample: full confidence right after a sync, decaying with the
/// age of that sync and penalized for large offsets.
fn confidence(sync_age: Duration, offset: Duration) -> f64 {
    let age_secs = sync_age.num_seconds().max(0);
    let age_factor =
        1.0 - 0.6 * (age_secs as f64 / CONFIDENCE_DECAY_HORIZON_SECS as f64).min(1.0);

    let offset_secs = offset.num_seconds().abs();
    let offset_factor = if offset_secs <= 30 {
        1.0
    } else if offset_secs <= 300 {
        0.7
    } else {
        0.4
    };

    (age_factor * offset_factor).max(CONFIDENCE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted time source: returns local time shifted by a fixed offset,
    /// optionally failing after a set number of successful fetches. The
    /// shared call counter lets tests assert how often the network was hit.
    struct ShiftedSource {
        clock: Arc<MockClock>,
        shift: Duration,
        calls: Arc<AtomicU32>,
        fail_after: u32,
    }

    impl ShiftedSource {
        fn new(clock: Arc<MockClock>, shift: Duration) -> Self {
            Self {
                clock,
                shift,
                calls: Arc::new(AtomicU32::new(0)),
                fail_after: u32::MAX,
            }
        }

        fn failing_after(clock: Arc<MockClock>, shift: Duration, fail_after: u32) -> Self {
            Self {
                clock,
                shift,
                calls: Arc::new(AtomicU32::new(0)),
                fail_after,
            }
        }

        fn counter(&self) -> Arc<AtomicU32> {
            self.calls.clone()
        }
    }

    impl NetworkTimeSource for ShiftedSource {
        fn fetch_time(&self) -> Result<DateTime<Utc>, TierlockError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_after {
                return Err(TierlockError::TimeSource("unreachable".to_string()));
            }
            Ok(self.clock.now_utc() + self.shift)
        }

        fn name(&self) -> &str {
            "shifted"
        }
    }

    struct FailingSource;

    impl NetworkTimeSource for FailingSource {
        fn fetch_time(&self) -> Result<DateTime<Utc>, TierlockError> {
            Err(TierlockError::TimeSource("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn service_with_shift(clock: Arc<MockClock>, shift: Duration) -> TrustedTimeService {
        TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(ShiftedSource::new(clock, shift))],
            std::time::Duration::from_secs(15 * 60),
        )
    }

    #[test]
    fn fresh_sync_has_full_confidence() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = service_with_shift(clock, Duration::seconds(2));

        let sample = service.trusted_now();
        assert_eq!(sample.source, TimeSource::Network);
        assert!((sample.confidence - 1.0).abs() < 1e-9);
        assert_eq!(sample.drift, Duration::seconds(2));
    }

    #[test]
    fn offset_is_applied_between_syncs() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = service_with_shift(clock.clone(), Duration::seconds(120));

        service.trusted_now();
        clock.advance(Duration::minutes(1));

        let sample = service.trusted_now();
        assert_eq!(sample.source, TimeSource::PreviousTrusted);
        assert_eq!(
            sample.value.to_rfc3339(),
            "2025-01-15T12:03:00+00:00" // local 12:01 + 120s offset
        );
    }

    #[test]
    fn cached_reads_never_resync() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let source = ShiftedSource::new(clock.clone(), Duration::seconds(10));
        let calls = source.counter();
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(source)],
            std::time::Duration::from_secs(60),
        );

        assert_eq!(service.trusted_now().source, TimeSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Well past the resync interval: cached reads still apply the old
        // offset without hitting the network.
        clock.advance(Duration::minutes(30));
        let sample = service.cached_now();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sample.source, TimeSource::PreviousTrusted);
        assert_eq!(sample.drift, Duration::seconds(10));

        // The next validating read resyncs as usual.
        assert_eq!(service.trusted_now().source, TimeSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cached_read_before_any_sync_uses_system_clock() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = service_with_shift(clock.clone(), Duration::seconds(10));

        let sample = service.cached_now();
        assert_eq!(sample.source, TimeSource::SystemClock);
        assert!((sample.confidence - UNSYNCED_CONFIDENCE).abs() < 1e-9);
        assert_eq!(sample.value, clock.now_utc());
    }

    #[test]
    fn confidence_decays_with_sync_age() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(ShiftedSource::new(
                clock.clone(),
                Duration::zero(),
            ))],
            std::time::Duration::from_secs(24 * 60 * 60), // no resync within test
        );

        let fresh = service.trusted_now();
        clock.advance(Duration::hours(3));
        let aged = service.trusted_now();
        assert!(aged.confidence < fresh.confidence);
        assert!(aged.confidence >= CONFIDENCE_FLOOR);
    }

    #[test]
    fn large_offset_reduces_confidence() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = service_with_shift(clock, Duration::minutes(20));

        let sample = service.trusted_now();
        assert!(sample.confidence < 0.5);
    }

    #[test]
    fn fetch_failure_keeps_previous_offset() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let shifted = ShiftedSource::failing_after(clock.clone(), Duration::seconds(10), 1);
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(shifted)],
            std::time::Duration::from_secs(60),
        );

        service.trusted_now();
        clock.advance(Duration::seconds(61));

        let sample = service.trusted_now();
        assert_eq!(sample.source, TimeSource::PreviousTrusted);
        assert_eq!(sample.drift, Duration::seconds(10));
        assert_eq!(service.sync_status().consecutive_failures, 1);
    }

    #[test]
    fn all_sources_failing_falls_back_to_system_clock() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(FailingSource)],
            std::time::Duration::from_secs(60),
        );

        let sample = service.trusted_now();
        assert_eq!(sample.source, TimeSource::SystemClock);
        assert!((sample.confidence - UNSYNCED_CONFIDENCE).abs() < 1e-9);
        assert_eq!(sample.value, clock.now_utc());
        assert_eq!(service.sync_status().consecutive_failures, 1);
    }

    #[test]
    fn later_source_is_tried_when_first_fails() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![
                Box::new(FailingSource),
                Box::new(ShiftedSource::new(clock, Duration::seconds(5))),
            ],
            std::time::Duration::from_secs(60),
        );

        let sample = service.trusted_now();
        assert_eq!(sample.source, TimeSource::Network);
        assert_eq!(sample.drift, Duration::seconds(5));
    }

    #[test]
    fn resync_happens_after_interval() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let source = ShiftedSource::new(clock.clone(), Duration::zero());
        let service = TrustedTimeService::new(
            clock.clone(),
            vec![Box::new(source)],
            std::time::Duration::from_secs(60),
        );

        assert_eq!(service.trusted_now().source, TimeSource::Network);
        assert_eq!(service.trusted_now().source, TimeSource::PreviousTrusted);
        clock.advance(Duration::seconds(61));
        assert_eq!(service.trusted_now().source, TimeSource::Network);
    }
}
