//! Link statistics.
//!
//! Counters are plain atomics so the CSI handler can bump them from the
//! driver's context without taking a lock. Foreign or malformed CSI events
//! are never counted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters for one run of the receiver or transmitter.
#[derive(Debug)]
pub struct LinkStats {
    /// CSI events that passed the admission rule
    frames_admitted: AtomicU64,
    /// Records written to the output stream
    frames_emitted: AtomicU64,
    /// Admitted frames lost because the queue was full
    frames_dropped: AtomicU64,
    /// Records whose write to the output stream failed
    write_errors: AtomicU64,
    /// Recoveries after a lost association
    reconnects: AtomicU64,
    keepalives_sent: AtomicU64,
    keepalive_failures: AtomicU64,
    beacons_sent: AtomicU64,
    beacon_failures: AtomicU64,
    session_id: Uuid,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl LinkStats {
    /// Create empty counters for a new session.
    pub fn new() -> Self {
        Self {
            frames_admitted: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            keepalive_failures: AtomicU64::new(0),
            beacons_sent: AtomicU64::new(0),
            beacon_failures: AtomicU64::new(0),
            session_id: Uuid::new_v4(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous link statistics");
        }

        stats
    }

    /// Record a CSI event that passed the admission rule.
    pub fn record_admitted(&self) {
        self.frames_admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a line written to the output stream.
    pub fn record_emitted(&self) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admitted frame lost to a full queue.
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed write to the output stream.
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a recovery after a lost association.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a keepalive attempt.
    pub fn record_keepalive(&self, delivered: bool) {
        if delivered {
            self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.keepalive_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a beacon attempt.
    pub fn record_beacon(&self, delivered: bool) {
        if delivered {
            self.beacons_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.beacon_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Identifier of this run.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_admitted: self.frames_admitted.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            keepalive_failures: self.keepalive_failures.load(Ordering::Relaxed),
            beacons_sent: self.beacons_sent.load(Ordering::Relaxed),
            beacon_failures: self.beacon_failures.load(Ordering::Relaxed),
            session_id: self.session_id,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Link Statistics (session {}):\n\
             - Frames admitted: {}\n\
             - Frames emitted: {}\n\
             - Frames dropped (queue full): {}\n\
             - Output write errors: {}\n\
             - Reconnects: {}\n\
             - Keepalives sent: {} ({} failed)\n\
             - Beacons sent: {} ({} failed)\n\
             - Session duration: {} seconds",
            stats.session_id,
            stats.frames_admitted,
            stats.frames_emitted,
            stats.frames_dropped,
            stats.write_errors,
            stats.reconnects,
            stats.keepalives_sent,
            stats.keepalive_failures,
            stats.beacons_sent,
            stats.beacon_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                frames_admitted: stats.frames_admitted,
                frames_emitted: stats.frames_emitted,
                frames_dropped: stats.frames_dropped,
                write_errors: stats.write_errors,
                reconnects: stats.reconnects,
                keepalives_sent: stats.keepalives_sent,
                keepalive_failures: stats.keepalive_failures,
                beacons_sent: stats.beacons_sent,
                beacon_failures: stats.beacon_failures,
                last_session: stats.session_id,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                self.frames_admitted
                    .store(persisted.frames_admitted, Ordering::Relaxed);
                self.frames_emitted
                    .store(persisted.frames_emitted, Ordering::Relaxed);
                self.frames_dropped
                    .store(persisted.frames_dropped, Ordering::Relaxed);
                self.write_errors
                    .store(persisted.write_errors, Ordering::Relaxed);
                self.reconnects.store(persisted.reconnects, Ordering::Relaxed);
                self.keepalives_sent
                    .store(persisted.keepalives_sent, Ordering::Relaxed);
                self.keepalive_failures
                    .store(persisted.keepalive_failures, Ordering::Relaxed);
                self.beacons_sent
                    .store(persisted.beacons_sent, Ordering::Relaxed);
                self.beacon_failures
                    .store(persisted.beacon_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_admitted: u64,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub write_errors: u64,
    pub reconnects: u64,
    pub keepalives_sent: u64,
    pub keepalive_failures: u64,
    pub beacons_sent: u64,
    pub beacon_failures: u64,
    pub session_id: Uuid,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub frames_admitted: u64,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub write_errors: u64,
    pub reconnects: u64,
    pub keepalives_sent: u64,
    pub keepalive_failures: u64,
    pub beacons_sent: u64,
    pub beacon_failures: u64,
    pub last_session: Uuid,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedLinkStats = Arc<LinkStats>;

/// Create new shared statistics.
pub fn create_shared_stats() -> SharedLinkStats {
    Arc::new(LinkStats::new())
}

/// Create new shared statistics with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedLinkStats {
    Arc::new(LinkStats::with_persistence(path))
}
