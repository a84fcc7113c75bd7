//! presently turns a stream of GPU frame-presentation trace events into
//! per-process, per-swap-chain frame statistics: inter-present intervals,
//! render-completion and display latencies, FPS, and drop classification,
//! plus reprojection statistics for a mixed-reality compositor.
//!
//! The crate is built around a single consumer, the [`OutputEngine`], which
//! merges several time-ordered event streams (process lifecycle, application
//! presents, late-stage reprojections, and user recording toggles) against a
//! shared monotonic timestamp axis, keeps bounded per-swap-chain and
//! reprojection histories, and emits CSV rows for the intervals in which the
//! user had recording enabled.
//!
//! The tracing session and the parser that produces typed events are external
//! collaborators; they hand events to the engine through a bounded
//! [`crossbeam_channel`] queue. Embedding hosts can observe the engine's
//! output through the [`HostExport`] callback interface.

pub mod console;
pub mod csv;
pub mod error;
pub mod events;
pub mod host;
pub mod lsr;
pub mod options;
pub mod output;
pub mod platform;
pub mod process_filter;
pub mod processes;
pub mod recording;
pub mod replay;
pub mod stats;
pub mod swap_chain;
pub mod timestamp;

#[cfg(target_os = "windows")]
pub mod windows;

pub use console::{Console, NullConsole, StdoutConsole};
pub use error::StartError;
pub use events::{
    CollectedEvent, LsrEvent, LsrResult, PresentEvent, PresentFlags, PresentMode, PresentResult,
    ProcessEvent, Runtime,
};
pub use host::{ChainSnapshot, HostExport, LsrCsvRow, PresentCsvRow};
pub use options::{OutputOptions, Verbosity};
pub use output::OutputEngine;
pub use recording::RecordingToggle;
pub use timestamp::{Qpc, QpcConverter};
