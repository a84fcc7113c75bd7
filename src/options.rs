use std::path::PathBuf;

use crate::process_filter::ProcessFilter;

/// How much detail ends up in CSV rows and console snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Simple,
    Normal,
    Verbose,
}

/// Everything the output engine needs to know about what the user asked for.
/// Command-line parsing lives in the binary; embedding hosts fill this in
/// directly.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub filter: ProcessFilter,
    pub verbosity: Verbosity,
    /// Suppress rows for presents that never reached the display.
    pub exclude_dropped: bool,
    /// One CSV file pair per target process instead of a consolidated pair.
    pub multi_csv: bool,
    /// Stop the engine when the last target process exits.
    pub terminate_on_proc_exit: bool,
    /// Skip the live console redraw.
    pub simple_console: bool,
    /// Events come from a trace file rather than a live session: recording
    /// toggles carry no timestamps, and the engine runs without pacing.
    pub trace_file: bool,
    /// Consolidated present CSV path, or the stem for per-process files.
    /// `None` disables present CSV output.
    pub output_path: Option<PathBuf>,
    /// Same for the reprojection CSV.
    pub lsr_output_path: Option<PathBuf>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            filter: ProcessFilter::default(),
            verbosity: Verbosity::Normal,
            exclude_dropped: false,
            multi_csv: false,
            terminate_on_proc_exit: false,
            simple_console: false,
            trace_file: false,
            output_path: None,
            lsr_output_path: None,
        }
    }
}
