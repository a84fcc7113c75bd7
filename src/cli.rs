use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use presently::options::{OutputOptions, Verbosity};
use presently::process_filter::ProcessFilter;

#[derive(Debug, Parser)]
#[command(
    name = "presently",
    version,
    about = r#"
presently derives per-process, per-swap-chain frame statistics from captured
GPU presentation events.

EXAMPLES:
    # Import a capture and write frame statistics next to it:
    presently import frames.jsonl -o frames.csv

    # Only the processes you care about, one CSV per process:
    presently import frames.jsonl --name game.exe --multi-csv
"#
)]
pub struct Opt {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Import a capture of parsed presentation events and derive statistics.
    ///
    /// Live collection attaches through the library interface; the
    /// command-line tool works from captures.
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Path to the capture file that should be imported.
    pub file: PathBuf,

    #[command(flatten)]
    pub output_args: OutputArgs,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerbosityArg {
    Simple,
    Normal,
    Verbose,
}

impl std::fmt::Display for VerbosityArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}

impl From<VerbosityArg> for Verbosity {
    fn from(arg: VerbosityArg) -> Self {
        match arg {
            VerbosityArg::Simple => Verbosity::Simple,
            VerbosityArg::Normal => Verbosity::Normal,
            VerbosityArg::Verbose => Verbosity::Verbose,
        }
    }
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Record every process. This is the default when neither --pid nor
    /// --name is given.
    #[arg(long, conflicts_with_all = ["pid", "name"])]
    pub all: bool,

    /// Only record the process with this id.
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Only record processes with this image name (can be specified multiple
    /// times; matched case-insensitively).
    #[arg(long)]
    pub name: Vec<String>,

    /// Never record processes with this image name, even when they would
    /// otherwise match (can be specified multiple times).
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Leave presents that never reached the display out of the CSV.
    #[arg(long)]
    pub exclude_dropped: bool,

    /// Write one CSV file per process instead of one consolidated file.
    #[arg(long)]
    pub multi_csv: bool,

    /// Column set and computed statistics.
    #[arg(long, value_enum, default_value_t = VerbosityArg::Normal)]
    pub verbosity: VerbosityArg,

    /// Stop once the last recorded process has exited.
    #[arg(long)]
    pub terminate_on_proc_exit: bool,

    /// Suppress the live console redraw.
    #[arg(long)]
    pub simple_console: bool,

    /// Present CSV filename (also the stem for per-process files).
    #[arg(short, long, default_value = "presently.csv")]
    pub output: PathBuf,

    /// Reprojection CSV filename. Derived from --output when omitted.
    #[arg(long)]
    pub lsr_output: Option<PathBuf>,

    /// Collect statistics without writing any CSV.
    #[arg(long, conflicts_with_all = ["output", "lsr_output"])]
    pub no_csv: bool,
}

impl OutputArgs {
    pub fn output_options(&self, trace_file: bool) -> OutputOptions {
        let filter = ProcessFilter {
            target_pid: self.pid,
            target_names: self.name.clone(),
            exclude_names: self.exclude.clone(),
        };
        let (output_path, lsr_output_path) = if self.no_csv {
            (None, None)
        } else {
            let lsr_path = self
                .lsr_output
                .clone()
                .unwrap_or_else(|| derive_lsr_path(&self.output));
            (Some(self.output.clone()), Some(lsr_path))
        };
        OutputOptions {
            filter,
            verbosity: self.verbosity.into(),
            exclude_dropped: self.exclude_dropped,
            multi_csv: self.multi_csv,
            terminate_on_proc_exit: self.terminate_on_proc_exit,
            simple_console: self.simple_console,
            trace_file,
            output_path,
            lsr_output_path,
        }
    }
}

/// `frames.csv` gets `frames-lsr.csv` as its reprojection sibling.
fn derive_lsr_path(output: &PathBuf) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    output.with_file_name(format!("{stem}-lsr.{extension}"))
}
