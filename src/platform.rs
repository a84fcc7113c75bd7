//! The OS capabilities the engine depends on, as traits.
//!
//! The engine needs three things from its surroundings: the high-resolution
//! counter, process-image-name lookup, and process-exit polling — plus the
//! tracing session's lost-event counters at shutdown. Realtime backends
//! implement these against the OS; trace-file backends and tests supply
//! synthetic implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::timestamp::Qpc;

/// The monotonic high-resolution counter shared by every event timeline.
pub trait PerfCounter: Send + Sync {
    /// Ticks per second. Queried once at engine start.
    fn frequency(&self) -> u64;
    fn now(&self) -> Qpc;
}

/// Opens processes for name lookup and exit polling.
pub trait ProcessTracker: Send {
    fn open(&self, process_id: u32) -> Option<Box<dyn TrackedProcess>>;
}

/// A process the engine holds open. Dropping the handle releases it.
pub trait TrackedProcess: Send {
    /// Full image path of the process, if it can still be queried.
    fn image_name(&self) -> Option<String>;
    fn has_exited(&self) -> bool;
}

/// Counters maintained by the tracing backend, read once at shutdown.
pub trait TraceSession: Send {
    /// `(events_lost, buffers_lost)`.
    fn lost_counts(&self) -> (u32, u32);
}

/// The capability bundle handed to the engine at construction.
pub struct Platform {
    pub perf: std::sync::Arc<dyn PerfCounter>,
    pub tracker: Box<dyn ProcessTracker>,
    pub session: Box<dyn TraceSession>,
}

/// Counter backed by [`Instant`], for realtime use on hosts without a native
/// QPC. Reports nanoseconds since construction at 1 GHz.
pub struct StdPerfCounter {
    origin: Instant,
}

impl StdPerfCounter {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdPerfCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfCounter for StdPerfCounter {
    fn frequency(&self) -> u64 {
        1_000_000_000
    }

    fn now(&self) -> Qpc {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Manually advanced counter for trace replay and tests.
pub struct ManualPerfCounter {
    frequency: u64,
    now: AtomicU64,
}

impl ManualPerfCounter {
    pub fn new(frequency: u64) -> Self {
        Self {
            frequency,
            now: AtomicU64::new(0),
        }
    }

    pub fn set_now(&self, qpc: Qpc) {
        self.now.store(qpc, Ordering::Relaxed);
    }
}

impl PerfCounter for ManualPerfCounter {
    fn frequency(&self) -> u64 {
        self.frequency
    }

    fn now(&self) -> Qpc {
        self.now.load(Ordering::Relaxed)
    }
}

/// Tracker for trace-file runs: processes in a trace cannot be opened, so
/// lookups fail and lifecycle comes entirely from the event stream.
pub struct NullProcessTracker;

impl ProcessTracker for NullProcessTracker {
    fn open(&self, _process_id: u32) -> Option<Box<dyn TrackedProcess>> {
        None
    }
}

/// Session with nothing to lose: trace replay delivers every event.
pub struct LosslessSession;

impl TraceSession for LosslessSession {
    fn lost_counts(&self) -> (u32, u32) {
        (0, 0)
    }
}
