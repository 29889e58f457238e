//! csi-link - Wi-Fi Channel State Information telemetry link.
//!
//! A transmitter hosts a dedicated network and broadcasts a steady stream of
//! frames. A receiver joins that network, captures the CSI its radio derives
//! from every received frame, keeps only measurements from the transmitter's
//! hardware address, and streams them out as text lines.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Receiver                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  radio driver ──▶ CaptureCore ══queue══▶ Emitter ──▶ stdout  │
//! │   (callback)      (filter)              (seq, format)        │
//! │                                                              │
//! │  control loop:  AssociationManager ──▶ LivenessSignal        │
//! │                 (poll, reconnect,      (keepalive datagram)  │
//! │                  re-arm CSI)                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payload samples pass through untouched; nothing here decodes or
//! transforms channel data.
//!
//! # Example
//!
//! ```no_run
//! use csi_link::{capture, stats, Config};
//!
//! let config = Config::default();
//! let stats = stats::create_shared_stats();
//! let (core, queue) =
//!     capture::CaptureCore::new(config.receiver.peer, config.receiver.queue_capacity, stats.clone());
//!
//! // `core` is handed to the association manager, which installs it as the
//! // radio's CSI callback; frames are read back from `queue` by an Emitter.
//! let emitter = capture::Emitter::new(queue, std::io::stdout(), stats);
//! ```

pub mod capture;
pub mod config;
pub mod link;
pub mod radio;
pub mod receiver;
pub mod stats;
pub mod transmitter;

// Re-export key types at crate root for convenience
pub use capture::{CaptureCore, CapturedFrame, Emitter};
pub use config::{Config, ConfigError};
pub use link::{AssociationManager, LinkError, LivenessSignal, RetryPolicy};
pub use radio::{CsiConfig, CsiHandler, CsiRecord, LinkStatus, Radio, RadioError};
pub use receiver::CsiReceiver;
pub use stats::{LinkStats, SharedLinkStats};
pub use transmitter::Transmitter;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
