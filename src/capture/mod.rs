//! CSI capture pipeline.
//!
//! ```text
//!  driver context                      emitter thread
//! ┌───────────────┐  bounded queue  ┌─────────────────┐
//! │  CaptureCore  │ ──────────────▶ │     Emitter     │ ──▶ output stream
//! │ (admit, copy) │  CapturedFrame  │ (seq, format)   │
//! └───────────────┘                 └─────────────────┘
//! ```

pub mod emitter;
pub mod filter;
pub mod frame;
pub mod handler;

// Re-export commonly used types
pub use emitter::{spawn_emitter, Emitter};
pub use filter::admit;
pub use frame::{CapturedFrame, CsiLine};
pub use handler::{CaptureCore, DEFAULT_QUEUE_CAPACITY};
