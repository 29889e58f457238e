//! Statistics for the capture link.
//!
//! Tracks what the receiver admitted, emitted and dropped, plus link
//! recoveries and best-effort traffic, so a run can be audited afterwards.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, LinkStats, PersistedStats,
    SharedLinkStats, StatsSnapshot,
};
