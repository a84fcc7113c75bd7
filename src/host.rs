//! Callback interface for embedding hosts.
//!
//! A host registers one [`HostExport`] implementation and receives the same
//! data the engine writes to the console and to CSV. All calls are issued
//! synchronously on the merger thread; the engine assumes nothing about the
//! host's threading and expects calls to return promptly.

use std::time::SystemTime;

use serde_derive::Serialize;

use crate::timestamp::Qpc;

/// One swap chain's console summary.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub process_name: String,
    pub process_id: u32,
    pub swap_chain_address: u64,
    pub runtime: &'static str,
    pub sync_interval: i32,
    pub present_flags: u32,
    pub ms_per_frame: f64,
    pub fps: f64,
    pub wall_clock_time: SystemTime,
}

/// One present CSV row, with every column regardless of verbosity.
#[derive(Debug, Clone, Serialize)]
pub struct PresentCsvRow {
    pub process_name: String,
    pub process_id: u32,
    pub swap_chain_address: u64,
    pub runtime: &'static str,
    pub sync_interval: i32,
    pub present_flags: u32,
    pub supports_tearing: bool,
    pub present_mode: &'static str,
    pub was_batched: bool,
    pub dwm_notified: bool,
    pub dropped: bool,
    pub time_in_seconds: f64,
    pub ms_between_presents: f64,
    pub ms_between_display_change: f64,
    pub ms_in_present_api: f64,
    pub ms_until_render_complete: f64,
    pub ms_until_displayed: f64,
    pub qpc_time: Qpc,
    pub wall_clock_time: SystemTime,
}

/// One reprojection CSV row, with every column regardless of verbosity.
#[derive(Debug, Clone, Serialize)]
pub struct LsrCsvRow {
    pub process_name: String,
    pub app_process_id: u32,
    pub lsr_process_id: u32,
    pub app_frame_id: u32,
    pub time_in_seconds: f64,
    pub app_present_delta_ms: f64,
    pub app_present_to_lsr_ms: f64,
    pub ms_between_lsrs: f64,
    pub app_missed: bool,
    pub lsr_missed_count: u32,
    pub app_source_release_to_lsr_acquire_ms: f64,
    pub app_cpu_render_frame_ms: f64,
    pub app_prediction_latency_ms: f64,
    pub app_misprediction_ms: f64,
    pub lsr_cpu_render_frame_ms: f64,
    pub lsr_prediction_latency_ms: f64,
    pub lsr_motion_to_photon_latency_ms: f64,
    pub time_until_vsync_ms: f64,
    pub lsr_thread_wakeup_to_gpu_end_ms: f64,
    pub total_wakeup_error_ms: f64,
    pub thread_wakeup_start_latch_to_cpu_render_frame_start_ms: f64,
    pub cpu_render_frame_start_to_head_pose_callback_start_ms: f64,
    pub head_pose_callback_start_to_head_pose_callback_stop_ms: f64,
    pub head_pose_callback_stop_to_input_latch_ms: f64,
    pub input_latch_to_gpu_submission_ms: f64,
    pub gpu_submission_to_gpu_start_ms: f64,
    pub gpu_start_to_gpu_stop_ms: f64,
    pub gpu_stop_to_copy_start_ms: f64,
    pub copy_start_to_copy_stop_ms: f64,
    pub copy_stop_to_vsync_ms: f64,
    pub qpc_time: Qpc,
    pub wall_clock_time: SystemTime,
}

/// Capability set an embedding host implements to observe the engine.
///
/// Payloads are passed by shared reference; hosts copy what they keep. The
/// engine calls `notify_csv_row` exactly once per present row it emits, in
/// emission order.
pub trait HostExport: Send {
    fn notify_console_snapshot(&mut self, snapshot: &ChainSnapshot);

    fn notify_csv_row(&mut self, row: &PresentCsvRow);

    /// Reprojection rows. Hosts that only care about presents can ignore
    /// these.
    fn notify_lsr_csv_row(&mut self, _row: &LsrCsvRow) {}
}
