//! Row-oriented CSV output.
//!
//! Fields are comma-separated with no quoting; none of the emitted values can
//! contain a comma (process names are basenames, enum tokens are fixed).
//! Floating-point fields carry six fractional digits. Files open lazily on
//! the first row written to them, with the header written at open time; an
//! open failure disables that output and the engine keeps collecting.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::host::{LsrCsvRow, PresentCsvRow};
use crate::options::{OutputOptions, Verbosity};

#[derive(Default)]
pub enum CsvFileState {
    #[default]
    NotOpened,
    Open(CsvFile),
    /// Opening failed; rows for this target are dropped from here on.
    Disabled,
}

pub struct CsvFile {
    writer: BufWriter<File>,
}

impl CsvFile {
    fn create(path: &Path, header: &str) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{header}")?;
        Ok(Self { writer })
    }
}

pub struct CsvOutput {
    verbosity: Verbosity,
    multi_csv: bool,
    output_path: Option<PathBuf>,
    lsr_output_path: Option<PathBuf>,
    consolidated_output: CsvFileState,
    consolidated_lsr_output: CsvFileState,
    /// In multi-csv mode, files of terminated processes keyed by module name,
    /// so a restarted process continues its file instead of truncating it.
    saved_files: HashMap<String, (CsvFileState, CsvFileState)>,
}

impl CsvOutput {
    pub fn new(options: &OutputOptions) -> Self {
        Self {
            verbosity: options.verbosity,
            multi_csv: options.multi_csv,
            output_path: options.output_path.clone(),
            lsr_output_path: options.lsr_output_path.clone(),
            consolidated_output: CsvFileState::NotOpened,
            consolidated_lsr_output: CsvFileState::NotOpened,
            saved_files: HashMap::new(),
        }
    }

    /// Write one present row to the consolidated file, or to the process's
    /// own file in multi-csv mode. `process_slot` is the owning process's
    /// file state.
    pub fn write_present_row(&mut self, process_slot: &mut CsvFileState, row: &PresentCsvRow) {
        let Some(base_path) = self.output_path.clone() else {
            return;
        };
        let verbosity = self.verbosity;
        let slot = if self.multi_csv {
            self.claim_saved(process_slot, &row.process_name);
            ensure_open(
                process_slot,
                &per_process_path(&base_path, &row.process_name),
                &present_csv_header(verbosity),
            );
            process_slot
        } else {
            ensure_open(
                &mut self.consolidated_output,
                &base_path,
                &present_csv_header(verbosity),
            );
            &mut self.consolidated_output
        };

        if let CsvFileState::Open(file) = slot {
            if let Err(err) = write_present_fields(&mut file.writer, verbosity, row) {
                log::warn!("present CSV write failed, disabling output: {err}");
                *slot = CsvFileState::Disabled;
            }
        }
    }

    /// Write one reprojection row, analogous to `write_present_row` but into
    /// the LSR file pair. `process_slot` is the owning process's LSR file
    /// state.
    pub fn write_lsr_row(&mut self, process_slot: &mut CsvFileState, row: &LsrCsvRow) {
        let Some(base_path) = self.lsr_output_path.clone() else {
            return;
        };
        let verbosity = self.verbosity;
        let slot = if self.multi_csv {
            self.claim_saved_lsr(process_slot, &row.process_name);
            ensure_open(
                process_slot,
                &per_process_path(&base_path, &row.process_name),
                &lsr_csv_header(verbosity),
            );
            process_slot
        } else {
            ensure_open(
                &mut self.consolidated_lsr_output,
                &base_path,
                &lsr_csv_header(verbosity),
            );
            &mut self.consolidated_lsr_output
        };

        if let CsvFileState::Open(file) = slot {
            if let Err(err) = write_lsr_fields(&mut file.writer, verbosity, row) {
                log::warn!("reprojection CSV write failed, disabling output: {err}");
                *slot = CsvFileState::Disabled;
            }
        }
    }

    /// Keep a terminated process's files for reuse if the same module starts
    /// again during this run.
    pub fn stash_process_files(
        &mut self,
        module_name: &str,
        output: CsvFileState,
        lsr_output: CsvFileState,
    ) {
        self.saved_files
            .insert(module_name.to_string(), (output, lsr_output));
    }

    /// If a saved file pair exists for this module, move it into the slots of
    /// the newly created process.
    fn claim_saved(&mut self, process_slot: &mut CsvFileState, module_name: &str) {
        if matches!(process_slot, CsvFileState::NotOpened) {
            if let Some((output, _lsr)) = self.saved_files.get_mut(module_name) {
                if !matches!(output, CsvFileState::NotOpened) {
                    *process_slot = std::mem::take(output);
                }
            }
        }
    }

    /// Same as `claim_saved` but for the LSR half of the pair.
    fn claim_saved_lsr(&mut self, process_slot: &mut CsvFileState, module_name: &str) {
        if matches!(process_slot, CsvFileState::NotOpened) {
            if let Some((_output, lsr)) = self.saved_files.get_mut(module_name) {
                if !matches!(lsr, CsvFileState::NotOpened) {
                    *process_slot = std::mem::take(lsr);
                }
            }
        }
    }

    /// Close every file the output still owns, writing the lost-event footer
    /// where applicable. Per-process slots are closed by the engine with
    /// [`close_slot`].
    pub fn close(&mut self, events_lost: u32, buffers_lost: u32) {
        close_slot(&mut self.consolidated_output, events_lost, buffers_lost);
        close_slot(&mut self.consolidated_lsr_output, events_lost, buffers_lost);
        for (_module, (output, lsr_output)) in self.saved_files.iter_mut() {
            close_slot(output, events_lost, buffers_lost);
            close_slot(lsr_output, events_lost, buffers_lost);
        }
    }
}

/// Flush and close one file, appending the lost-event footer when anything
/// was lost.
pub fn close_slot(slot: &mut CsvFileState, events_lost: u32, buffers_lost: u32) {
    if let CsvFileState::Open(file) = slot {
        if events_lost > 0 || buffers_lost > 0 {
            let _ = writeln!(file.writer, "//LostEvents={events_lost},LostBuffers={buffers_lost}");
        }
        if let Err(err) = file.writer.flush() {
            log::warn!("CSV flush failed on close: {err}");
        }
    }
    *slot = CsvFileState::NotOpened;
}

fn ensure_open(slot: &mut CsvFileState, path: &Path, header: &str) {
    if matches!(slot, CsvFileState::NotOpened) {
        *slot = match CsvFile::create(path, header) {
            Ok(file) => CsvFileState::Open(file),
            Err(err) => {
                log::warn!("could not create {}: {err}; output disabled", path.display());
                CsvFileState::Disabled
            }
        };
    }
}

/// `game.exe` written next to `stats.csv` becomes `stats-game.exe.csv`.
fn per_process_path(base: &Path, module_name: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    base.with_file_name(format!("{stem}-{module_name}.{extension}"))
}

pub fn present_csv_header(verbosity: Verbosity) -> String {
    let mut header = String::from("ProcessName,ProcessID,SwapChainAddress,Runtime,SyncInterval,PresentFlags");
    if verbosity > Verbosity::Simple {
        header.push_str(",AllowsTearing,PresentMode");
    }
    if verbosity >= Verbosity::Verbose {
        header.push_str(",WasBatched,DwmNotified");
    }
    header.push_str(",Dropped,TimeInSeconds,msBetweenPresents");
    if verbosity > Verbosity::Simple {
        header.push_str(",msBetweenDisplayChange");
    }
    header.push_str(",msInPresentApi");
    if verbosity > Verbosity::Simple {
        header.push_str(",msUntilRenderComplete,msUntilDisplayed");
    }
    header
}

fn write_present_fields(
    writer: &mut impl Write,
    verbosity: Verbosity,
    row: &PresentCsvRow,
) -> std::io::Result<()> {
    write!(
        writer,
        "{},{},0x{:016X},{},{},{}",
        row.process_name,
        row.process_id,
        row.swap_chain_address,
        row.runtime,
        row.sync_interval,
        row.present_flags,
    )?;
    if verbosity > Verbosity::Simple {
        write!(writer, ",{},{}", u8::from(row.supports_tearing), row.present_mode)?;
    }
    if verbosity >= Verbosity::Verbose {
        write!(
            writer,
            ",{},{}",
            u8::from(row.was_batched),
            u8::from(row.dwm_notified)
        )?;
    }
    write!(
        writer,
        ",{},{:.6},{:.6}",
        u8::from(row.dropped),
        row.time_in_seconds,
        row.ms_between_presents,
    )?;
    if verbosity > Verbosity::Simple {
        write!(writer, ",{:.6}", row.ms_between_display_change)?;
    }
    write!(writer, ",{:.6}", row.ms_in_present_api)?;
    if verbosity > Verbosity::Simple {
        write!(
            writer,
            ",{:.6},{:.6}",
            row.ms_until_render_complete, row.ms_until_displayed
        )?;
    }
    writeln!(writer)
}

pub fn lsr_csv_header(verbosity: Verbosity) -> String {
    let mut header = String::from("Application,ProcessID,LsrProcessID");
    if verbosity >= Verbosity::Verbose {
        header.push_str(",AppFrameId");
    }
    header.push_str(",TimeInSeconds");
    if verbosity >= Verbosity::Verbose {
        header.push_str(",AppPresentDeltaMs,AppPresentToLsrMs");
    }
    header.push_str(",msBetweenLsrs,AppMissed,LsrMissed");
    if verbosity >= Verbosity::Verbose {
        header.push_str(",AppSourceReleaseToLsrAcquireMs,AppCpuRenderFrameMs");
    }
    header.push_str(",AppPredictionLatencyMs");
    if verbosity >= Verbosity::Verbose {
        header.push_str(",AppMispredictionMs,LsrCpuRenderFrameMs");
    }
    header.push_str(
        ",LsrPredictionLatencyMs,LsrMotionToPhotonLatencyMs,TimeUntilVsyncMs,LsrThreadWakeupToGpuEndMs,TotalWakeupErrorMs",
    );
    if verbosity >= Verbosity::Verbose {
        header.push_str(
            ",ThreadWakeupStartLatchToCpuRenderFrameStartInMs,CpuRenderFrameStartToHeadPoseCallbackStartInMs,HeadPoseCallbackStartToHeadPoseCallbackStopInMs,HeadPoseCallbackStopToInputLatchInMs,InputLatchToGpuSubmissionInMs",
        );
    }
    header.push_str(
        ",GpuSubmissionToGpuStartInMs,GpuStartToGpuStopInMs,GpuStopToCopyStartInMs,CopyStartToCopyStopInMs,CopyStopToVsyncInMs",
    );
    header
}

fn write_lsr_fields(
    writer: &mut impl Write,
    verbosity: Verbosity,
    row: &LsrCsvRow,
) -> std::io::Result<()> {
    write!(
        writer,
        "{},{},{}",
        row.process_name, row.app_process_id, row.lsr_process_id
    )?;
    if verbosity >= Verbosity::Verbose {
        write!(writer, ",{}", row.app_frame_id)?;
    }
    write!(writer, ",{:.6}", row.time_in_seconds)?;
    if verbosity >= Verbosity::Verbose {
        write!(
            writer,
            ",{:.6},{:.6}",
            row.app_present_delta_ms, row.app_present_to_lsr_ms
        )?;
    }
    write!(
        writer,
        ",{:.6},{},{}",
        row.ms_between_lsrs,
        u8::from(row.app_missed),
        row.lsr_missed_count,
    )?;
    if verbosity >= Verbosity::Verbose {
        write!(
            writer,
            ",{:.6},{:.6}",
            row.app_source_release_to_lsr_acquire_ms, row.app_cpu_render_frame_ms
        )?;
    }
    write!(writer, ",{:.6}", row.app_prediction_latency_ms)?;
    if verbosity >= Verbosity::Verbose {
        write!(
            writer,
            ",{:.6},{:.6}",
            row.app_misprediction_ms, row.lsr_cpu_render_frame_ms
        )?;
    }
    write!(
        writer,
        ",{:.6},{:.6},{:.6},{:.6},{:.6}",
        row.lsr_prediction_latency_ms,
        row.lsr_motion_to_photon_latency_ms,
        row.time_until_vsync_ms,
        row.lsr_thread_wakeup_to_gpu_end_ms,
        row.total_wakeup_error_ms,
    )?;
    if verbosity >= Verbosity::Verbose {
        write!(
            writer,
            ",{:.6},{:.6},{:.6},{:.6},{:.6}",
            row.thread_wakeup_start_latch_to_cpu_render_frame_start_ms,
            row.cpu_render_frame_start_to_head_pose_callback_start_ms,
            row.head_pose_callback_start_to_head_pose_callback_stop_ms,
            row.head_pose_callback_stop_to_input_latch_ms,
            row.input_latch_to_gpu_submission_ms,
        )?;
    }
    writeln!(
        writer,
        ",{:.6},{:.6},{:.6},{:.6},{:.6}",
        row.gpu_submission_to_gpu_start_ms,
        row.gpu_start_to_gpu_stop_ms,
        row.gpu_stop_to_copy_start_ms,
        row.copy_start_to_copy_stop_ms,
        row.copy_stop_to_vsync_ms,
    )
}
