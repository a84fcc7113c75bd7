//! Live console view of the tracked processes.
//!
//! The engine builds one complete display string per tick and hands it to a
//! [`Console`] in a single replace; cursor handling and clearing live in the
//! renderer, not in the engine.

use std::fmt::Write as _;
use std::io::Write as _;

use crate::lsr::LateStageReprojectionData;
use crate::options::Verbosity;
use crate::processes::{ProcessInfo, ProcessRegistry};
use crate::timestamp::QpcConverter;

/// Single-slot screen the engine writes into.
pub trait Console: Send {
    fn replace(&mut self, text: &str);
}

/// Renders to stdout, clearing the previous frame with ANSI escapes.
pub struct StdoutConsole {
    wrote_anything: bool,
}

impl StdoutConsole {
    pub fn new() -> Self {
        Self {
            wrote_anything: false,
        }
    }
}

impl Default for StdoutConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdoutConsole {
    fn replace(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if self.wrote_anything {
            let _ = write!(stdout, "\x1b[2J\x1b[H");
        }
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        self.wrote_anything = !text.is_empty();
    }
}

/// Discards everything; used with `simple-console` and in tests.
pub struct NullConsole;

impl Console for NullConsole {
    fn replace(&mut self, _text: &str) {}
}

/// Append the per-swap-chain lines for one process. Processes without a
/// two-entry chain history print nothing.
pub fn format_process(
    display: &mut String,
    process_id: u32,
    info: &ProcessInfo,
    verbosity: Verbosity,
    conv: &QpcConverter,
) {
    if !info.target_process || info.module_name.is_empty() || info.chain_map.is_empty() {
        return;
    }

    let mut wrote_header = false;
    for (&address, chain) in &info.chain_map {
        let Some(summary) = chain.summarize(verbosity, conv) else {
            continue;
        };
        if !wrote_header {
            wrote_header = true;
            let _ = writeln!(display, "{}[{}]:", info.module_name, process_id);
        }
        let _ = write!(
            display,
            "    {:016X} ({}): SyncInterval={} Flags={} {:.2} ms/frame ({:.1} fps",
            address,
            summary.runtime.as_str(),
            summary.sync_interval,
            summary.present_flags,
            summary.ms_per_frame,
            summary.fps,
        );
        if let Some(displayed_fps) = summary.displayed_fps {
            let _ = write!(display, ", {displayed_fps:.1} fps displayed");
        }
        if let Some(latency) = summary.avg_display_latency_ms {
            let _ = write!(display, ", {latency:.2} ms latency");
        }
        let _ = write!(display, ")");
        if let Some(mode) = summary.latest_displayed_mode {
            let _ = write!(display, " {}", mode.as_str());
        }
        display.push('\n');
    }
    if wrote_header {
        display.push('\n');
    }
}

/// Append the mixed-reality block: application frame rate against the
/// compositor, reprojection phase costs, and pose latencies.
pub fn format_lsr(
    display: &mut String,
    registry: &ProcessRegistry,
    lsr: &LateStageReprojectionData,
    verbosity: Verbosity,
    conv: &QpcConverter,
) {
    if lsr.history_size() < 2 {
        return;
    }

    let stats = lsr.runtime_stats(conv);
    let history_time = lsr.history_time_seconds(conv);
    let history_size = lsr.history_size();

    let _ = writeln!(display, "Mixed Reality:");

    // Application.
    let fps = lsr.source_fps(conv);
    if verbosity > Verbosity::Simple {
        let app_name = registry
            .get(stats.app_process_id)
            .map(|info| info.module_name.as_str())
            .unwrap_or("<unknown>");
        let _ = write!(
            display,
            "    App - {}[{}]:\n        {:.2} ms/frame ({:.1} fps, {:.2} ms CPU",
            app_name,
            stats.app_process_id,
            1000.0 / fps,
            fps,
            stats.app_source_cpu_render_ms,
        );
    } else {
        let _ = write!(
            display,
            "    App:\n        {:.2} ms/frame ({:.1} fps",
            1000.0 / fps,
            fps,
        );
    }
    let _ = writeln!(
        display,
        ", {:.1}% of Compositor frame rate)",
        (history_size as u64 - stats.app_missed_frames) as f64 / history_size as f64 * 100.0,
    );
    let _ = writeln!(
        display,
        "        Missed Present: {} total in last {:.1} seconds ({} total observed)",
        stats.app_missed_frames, history_time, lsr.lifetime_app_missed_frames,
    );
    let _ = writeln!(
        display,
        "        Post-Present to Compositor CPU: {:.2} ms",
        stats.app_source_release_to_lsr_acquire_ms,
    );

    // Compositor.
    let fps = lsr.fps(conv);
    let lsr_name = registry
        .get(stats.lsr_process_id)
        .map(|info| info.module_name.as_str())
        .unwrap_or("<unknown>");
    let _ = writeln!(
        display,
        "    Compositor - {}[{}]:\n        {:.2} ms/frame ({:.1} fps, {:.1} displayed fps, {:.2} ms CPU)",
        lsr_name,
        stats.lsr_process_id,
        1000.0 / fps,
        fps,
        lsr.displayed_fps(conv),
        stats.lsr_cpu_render_ms,
    );
    let _ = writeln!(
        display,
        "        Missed V-Sync: {} consecutive, {} total in last {:.1} seconds ({} total observed)",
        stats.lsr_consecutive_missed_frames,
        stats.lsr_missed_frames,
        history_time,
        lsr.lifetime_lsr_missed_frames,
    );
    let _ = writeln!(
        display,
        "        Reprojection: {:.2} ms gpu preemption ({:.2} ms max) | {:.2} ms gpu execution ({:.2} ms max)",
        stats.gpu_preemption_ms.average(),
        stats.gpu_preemption_ms.max(),
        stats.gpu_execution_ms.average(),
        stats.gpu_execution_ms.max(),
    );
    if stats.copy_execution_ms.average() > 0.0 {
        let _ = writeln!(
            display,
            "        Hybrid Copy: {:.2} ms gpu preemption ({:.2} ms max) | {:.2} ms gpu execution ({:.2} ms max)",
            stats.copy_preemption_ms.average(),
            stats.copy_preemption_ms.max(),
            stats.copy_execution_ms.average(),
            stats.copy_execution_ms.max(),
        );
    }
    let _ = writeln!(
        display,
        "        Gpu-End to V-Sync: {:.2} ms",
        stats.gpu_end_to_vsync_ms,
    );

    // Latency.
    let _ = writeln!(
        display,
        "    Pose Latency:\n        App Motion-to-Mid-Photon: {:.2} ms",
        stats.app_pose_latency_ms,
    );
    let _ = writeln!(
        display,
        "        Compositor Motion-to-Mid-Photon: {:.2} ms ({:.2} ms to V-Sync)",
        stats.lsr_pose_latency_ms,
        stats.input_latch_to_vsync_ms.average(),
    );
    let _ = writeln!(
        display,
        "        V-Sync to Mid-Photon: {:.2} ms",
        stats.vsync_to_photons_middle_ms,
    );
    display.push('\n');
}
