//! Registry of processes observed in the event streams.
//!
//! Processes are discovered two ways. When reading a trace file, the kernel
//! provider delivers explicit start/stop events. In a live session the
//! registry notices new process ids as they appear in present events, opens a
//! handle for name lookup, and polls that handle to detect exit. Polling
//! stamps the exit with the current counter value — later than the true exit,
//! but safe, since the id cannot be recycled while the handle is held.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::csv::CsvFileState;
use crate::platform::{PerfCounter, ProcessTracker, TrackedProcess};
use crate::process_filter::ProcessFilter;
use crate::swap_chain::SwapChainData;
use crate::timestamp::Qpc;

/// Name recorded when a process cannot be opened or queried.
pub const UNKNOWN_PROCESS_NAME: &str = "<error>";

pub struct ProcessInfo {
    pub handle: Option<Box<dyn TrackedProcess>>,
    /// Image basename, e.g. `game.exe`.
    pub module_name: String,
    /// Whether this process matches the user's filter. Non-target processes
    /// contribute nothing to histories or outputs.
    pub target_process: bool,
    pub chain_map: HashMap<u64, SwapChainData>,
    pub output: CsvFileState,
    pub lsr_output: CsvFileState,
}

impl ProcessInfo {
    fn new(handle: Option<Box<dyn TrackedProcess>>, module_name: String, target: bool) -> Self {
        Self {
            handle,
            module_name,
            target_process: target,
            chain_map: HashMap::new(),
            output: CsvFileState::NotOpened,
            lsr_output: CsvFileState::NotOpened,
        }
    }
}

pub struct ProcessRegistry {
    processes: HashMap<u32, ProcessInfo>,
    filter: ProcessFilter,
    /// Live processes matching the filter, maintained for
    /// terminate-on-proc-exit.
    target_count: u32,
}

impl ProcessRegistry {
    pub fn new(filter: ProcessFilter) -> Self {
        Self {
            processes: HashMap::new(),
            filter,
            target_count: 0,
        }
    }

    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    pub fn get(&self, process_id: u32) -> Option<&ProcessInfo> {
        self.processes.get(&process_id)
    }

    /// Look up a process, creating it on first sight. The realtime path:
    /// opens a handle and queries the image name, recording `"<error>"` when
    /// either step fails.
    pub fn get_or_create(
        &mut self,
        process_id: u32,
        tracker: &dyn ProcessTracker,
    ) -> &mut ProcessInfo {
        match self.processes.entry(process_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let handle = tracker.open(process_id);
                let module_name = handle
                    .as_ref()
                    .and_then(|h| h.image_name())
                    .map(|path| basename(&path))
                    .unwrap_or_else(|| UNKNOWN_PROCESS_NAME.to_string());
                let target = self.filter.is_target(process_id, &module_name);
                if target {
                    self.target_count += 1;
                }
                entry.insert(ProcessInfo::new(handle, module_name, target))
            }
        }
    }

    /// Create a process from a kernel start event (trace-file path, no
    /// handle). Ids already present are left untouched.
    pub fn get_or_create_named(&mut self, process_id: u32, image_file_name: &str) {
        if let Entry::Vacant(entry) = self.processes.entry(process_id) {
            let module_name = basename(image_file_name);
            let target = self.filter.is_target(process_id, &module_name);
            if target {
                self.target_count += 1;
            }
            entry.insert(ProcessInfo::new(None, module_name, target));
        }
    }

    /// Tear down a process once every present preceding its termination has
    /// been processed. Returns the removed entry so the caller can stash its
    /// output files.
    pub fn handle_terminated(&mut self, process_id: u32) -> Option<ProcessInfo> {
        let info = self.processes.remove(&process_id)?;
        if info.target_process {
            self.target_count -= 1;
        }
        Some(info)
    }

    /// Poll open handles for exited processes, appending `(pid, now)` pairs.
    /// The handle is released immediately; teardown waits until the event
    /// streams catch up to the termination time.
    pub fn poll_terminated(
        &mut self,
        counter: &dyn PerfCounter,
        terminated: &mut Vec<(u32, Qpc)>,
    ) {
        for (&process_id, info) in self.processes.iter_mut() {
            if let Some(handle) = &info.handle {
                if handle.has_exited() {
                    terminated.push((process_id, counter.now()));
                    info.handle = None;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ProcessInfo)> {
        self.processes.iter().map(|(&pid, info)| (pid, info))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut ProcessInfo)> {
        self.processes.iter_mut().map(|(&pid, info)| (pid, info))
    }
}

/// Image names arrive as full paths with either separator; only the basename
/// is kept.
fn basename(path: &str) -> String {
    path.rsplit(['\\', '/']).next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullProcessTracker;

    #[test]
    fn unknown_realtime_process_gets_error_name() {
        let mut registry = ProcessRegistry::new(ProcessFilter::default());
        let info = registry.get_or_create(7, &NullProcessTracker);
        assert_eq!(info.module_name, UNKNOWN_PROCESS_NAME);
        assert!(info.target_process);
        assert_eq!(registry.target_count(), 1);
    }

    #[test]
    fn named_creation_extracts_basename_and_counts_targets() {
        let filter = ProcessFilter {
            target_names: vec!["game.exe".into()],
            ..Default::default()
        };
        let mut registry = ProcessRegistry::new(filter);
        registry.get_or_create_named(7, r"C:\Games\game.exe");
        registry.get_or_create_named(8, "other.exe");

        assert_eq!(registry.get(7).unwrap().module_name, "game.exe");
        assert!(registry.get(7).unwrap().target_process);
        assert!(!registry.get(8).unwrap().target_process);
        assert_eq!(registry.target_count(), 1);
    }

    #[test]
    fn termination_releases_target_count() {
        let mut registry = ProcessRegistry::new(ProcessFilter::default());
        registry.get_or_create_named(7, "game.exe");
        assert_eq!(registry.target_count(), 1);

        let info = registry.handle_terminated(7).unwrap();
        assert!(info.target_process);
        assert_eq!(registry.target_count(), 0);
        assert!(registry.get(7).is_none());

        // A second termination for the same id is a no-op.
        assert!(registry.handle_terminated(7).is_none());
    }
}
