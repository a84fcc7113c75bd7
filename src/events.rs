//! Typed event records handed to the engine by the trace parser.
//!
//! The parser (an external collaborator) delivers each stream in
//! non-decreasing `qpc_time` order; the engine never reorders events within a
//! stream. Events move through the pipeline by value: the queue owns an event
//! until the merger consumes it, and the swap-chain ring then owns its copy.

use bitflags::bitflags;
use serde_derive::{Deserialize, Serialize};

use crate::timestamp::Qpc;

/// The graphics API family that originated a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    D3d9,
    Dxgi,
    Other,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::D3d9 => "D3D9",
            Runtime::Dxgi => "DXGI",
            Runtime::Other => "Other",
        }
    }
}

/// The mechanism the OS compositor used to get the frame on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentMode {
    Unknown,
    HardwareLegacyFlip,
    HardwareLegacyCopyToFrontBuffer,
    HardwareDirectFlip,
    HardwareIndependentFlip,
    ComposedFlip,
    ComposedCopyGpuGdi,
    ComposedCopyCpuGdi,
    ComposedCompositionAtlas,
    HardwareComposedIndependentFlip,
}

impl PresentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PresentMode::Unknown => "Other",
            PresentMode::HardwareLegacyFlip => "Hardware: Legacy Flip",
            PresentMode::HardwareLegacyCopyToFrontBuffer => {
                "Hardware: Legacy Copy to front buffer"
            }
            PresentMode::HardwareDirectFlip => "Hardware: Direct Flip",
            PresentMode::HardwareIndependentFlip => "Hardware: Independent Flip",
            PresentMode::ComposedFlip => "Composed: Flip",
            PresentMode::ComposedCopyGpuGdi => "Composed: Copy with GPU GDI",
            PresentMode::ComposedCopyCpuGdi => "Composed: Copy with CPU GDI",
            PresentMode::ComposedCompositionAtlas => "Composed: Composition Atlas",
            PresentMode::HardwareComposedIndependentFlip => {
                "Hardware Composed: Independent Flip"
            }
        }
    }
}

/// Disposition of a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentResult {
    Unknown,
    /// The frame was scanned out to the display.
    Presented,
    /// The frame was replaced before it reached the display.
    Discarded,
    Error,
}

bitflags! {
    /// Flags passed to the present API call, carried through verbatim. The
    /// `serde` feature of `bitflags` supplies the serialization impls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PresentFlags: u32 {
        const TEST = 0x1;
        const DO_NOT_SEQUENCE = 0x2;
        const RESTART = 0x4;
        const DO_NOT_WAIT = 0x8;
        const STEREO_PREFER_RIGHT = 0x10;
        const STEREO_TEMPORARY_MONO = 0x20;
        const RESTRICT_TO_OUTPUT = 0x40;
        const USE_DURATION = 0x100;
        const ALLOW_TEARING = 0x200;
    }
}

/// One application present, as produced by the trace parser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresentEvent {
    pub process_id: u32,
    /// Opaque identity of the swap chain the frame was presented through.
    pub swap_chain_address: u64,
    pub qpc_time: Qpc,
    /// Ticks spent inside the present API call.
    pub time_taken: u64,
    /// Counter value at which GPU rendering completed; 0 if unknown.
    pub ready_time: Qpc,
    /// Counter value at which the frame reached the display. Only meaningful
    /// when `final_state` is `Presented`.
    pub screen_time: Qpc,
    pub runtime: Runtime,
    pub sync_interval: i32,
    pub present_flags: PresentFlags,
    pub present_mode: PresentMode,
    pub final_state: PresentResult,
    pub supports_tearing: bool,
    pub was_batched: bool,
    pub dwm_notified: bool,
}

impl PresentEvent {
    pub fn was_displayed(&self) -> bool {
        self.final_state == PresentResult::Presented
    }
}

/// Disposition of a late-stage reprojection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LsrResult {
    Unknown,
    Presented,
    MissedVsync,
    Error,
}

impl LsrResult {
    pub fn is_presented(self) -> bool {
        self == LsrResult::Presented
    }

    pub fn is_missed(self) -> bool {
        self == LsrResult::MissedVsync
    }
}

/// The application frame an LSR worked from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LsrSource {
    pub app_process_id: u32,
    pub app_frame_id: u32,
    /// Counter value at which the application presented this frame; 0 if the
    /// compositor had no valid source.
    pub app_present_time: Qpc,
    /// Ticks the application spent rendering the frame on the CPU.
    pub app_cpu_render_frame_time: u64,
    /// Ticks between the application releasing the frame and the compositor
    /// acquiring it for presentation.
    pub release_from_rendering_to_acquire_for_presentation_time: u64,
}

/// One late-stage reprojection pass: the mixed-reality compositor taking an
/// application frame and reprojecting it to the display. The phase timings
/// are already in milliseconds when they leave the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsrEvent {
    pub process_id: u32,
    pub qpc_time: Qpc,
    pub final_state: LsrResult,
    pub missed_vsync_count: u32,
    pub new_source_latched: bool,
    pub source: LsrSource,

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

    pub time_until_vsync_ms: f64,
    pub time_until_photons_middle_ms: f64,
    pub lsr_prediction_latency_ms: f64,
    pub app_prediction_latency_ms: f64,
    pub app_misprediction_ms: f64,
    pub total_wakeup_error_ms: f64,
}

impl LsrEvent {
    pub fn app_process_id(&self) -> u32 {
        self.source.app_process_id
    }

    pub fn app_frame_id(&self) -> u32 {
        self.source.app_frame_id
    }

    pub fn app_present_time(&self) -> Qpc {
        self.source.app_present_time
    }

    pub fn is_valid_app_frame(&self) -> bool {
        self.source.app_present_time != 0
    }

    /// CPU time the compositor spent preparing this reprojection, from render
    /// frame start through handing the work to the GPU.
    pub fn lsr_cpu_render_frame_ms(&self) -> f64 {
        self.cpu_render_frame_start_to_head_pose_callback_start_ms
            + self.head_pose_callback_start_to_head_pose_callback_stop_ms
            + self.head_pose_callback_stop_to_input_latch_ms
            + self.input_latch_to_gpu_submission_ms
    }

    /// Time from latching input to the vsync the frame targeted.
    pub fn input_latch_to_vsync_ms(&self) -> f64 {
        self.input_latch_to_gpu_submission_ms
            + self.gpu_submission_to_gpu_start_ms
            + self.gpu_start_to_gpu_stop_ms
            + self.gpu_stop_to_copy_start_ms
            + self.copy_start_to_copy_stop_ms
            + self.copy_stop_to_vsync_ms
    }

    /// Measured motion-to-photon latency: input latch to vsync, plus the
    /// vsync-to-middle-of-photons span.
    pub fn lsr_motion_to_photon_latency_ms(&self) -> f64 {
        self.input_latch_to_vsync_ms() + (self.time_until_photons_middle_ms - self.time_until_vsync_ms)
    }

    /// Time from the reprojection thread waking up until the GPU (and any
    /// hybrid copy) finished.
    pub fn thread_wakeup_to_gpu_end_ms(&self) -> f64 {
        self.thread_wakeup_start_latch_to_cpu_render_frame_start_ms
            + self.lsr_cpu_render_frame_ms()
            + self.gpu_submission_to_gpu_start_ms
            + self.gpu_start_to_gpu_stop_ms
            + self.gpu_stop_to_copy_start_ms
            + self.copy_start_to_copy_stop_ms
    }
}

/// Process lifecycle notification from the kernel provider. An empty
/// `image_file_name` marks a termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub process_id: u32,
    pub qpc_time: Qpc,
    pub image_file_name: String,
}

impl ProcessEvent {
    pub fn is_termination(&self) -> bool {
        self.image_file_name.is_empty()
    }
}

/// One parsed event, as enqueued by the consumer thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CollectedEvent {
    Process(ProcessEvent),
    Present(PresentEvent),
    Lsr(Box<LsrEvent>),
}
