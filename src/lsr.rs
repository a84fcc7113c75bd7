//! History and statistics for the mixed-reality compositor's late-stage
//! reprojection passes.

use std::collections::VecDeque;

use crate::events::LsrEvent;
use crate::stats::RunningStat;
use crate::timestamp::QpcConverter;

/// Maximum age of history entries, in milliseconds.
pub const MAX_HISTORY_TIME_MS: f64 = 3000.0;
/// Hard cap on deque length: 120 Hz worth of the history window.
pub const MAX_LSRS_IN_DEQUE: usize = 120 * (MAX_HISTORY_TIME_MS as usize / 1000);

/// Statistics over the current LSR history window. All-zero (the empty
/// sentinel) when the history holds fewer than two entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsrRuntimeStats {
    pub gpu_preemption_ms: RunningStat,
    pub gpu_execution_ms: RunningStat,
    pub copy_preemption_ms: RunningStat,
    pub copy_execution_ms: RunningStat,
    pub input_latch_to_vsync_ms: RunningStat,

    pub app_source_release_to_lsr_acquire_ms: f64,
    pub app_source_cpu_render_ms: f64,
    pub lsr_cpu_render_ms: f64,
    pub gpu_end_to_vsync_ms: f64,
    pub vsync_to_photons_middle_ms: f64,
    pub lsr_pose_latency_ms: f64,
    pub app_pose_latency_ms: f64,

    pub app_missed_frames: u64,
    pub lsr_missed_frames: u64,
    pub lsr_consecutive_missed_frames: u64,

    pub app_process_id: u32,
    pub lsr_process_id: u32,
}

#[derive(Debug, Default)]
pub struct LateStageReprojectionData {
    /// Every reprojection, in arrival order.
    lsr_history: VecDeque<LsrEvent>,
    /// Only reprojections that made their vsync.
    displayed_history: VecDeque<LsrEvent>,
    /// Only reprojections that latched a fresh application frame.
    source_history: VecDeque<LsrEvent>,

    pub lifetime_lsr_missed_frames: u64,
    pub lifetime_app_missed_frames: u64,
}

impl LateStageReprojectionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        !self.lsr_history.is_empty()
    }

    /// Record one reprojection. Returns false when the event violates the
    /// non-decreasing timestamp order of the stream and was discarded.
    pub fn add_lsr(&mut self, event: LsrEvent) -> bool {
        if let Some(back) = self.lsr_history.back() {
            debug_assert!(back.qpc_time <= event.qpc_time);
            if back.qpc_time > event.qpc_time {
                return false;
            }
        }

        if event.final_state.is_presented() {
            debug_assert_eq!(event.missed_vsync_count, 0);
            self.displayed_history.push_back(event.clone());
        } else if event.final_state.is_missed() {
            self.lifetime_lsr_missed_frames += u64::from(event.missed_vsync_count);
        }

        if event.new_source_latched {
            self.source_history.push_back(event.clone());
        } else {
            self.lifetime_app_missed_frames += 1;
        }

        self.lsr_history.push_back(event);
        true
    }

    /// Drop entries that fall outside the history window or length cap.
    pub fn prune(&mut self, conv: &QpcConverter) {
        prune_deque(&mut self.source_history, conv);
        prune_deque(&mut self.displayed_history, conv);
        prune_deque(&mut self.lsr_history, conv);
    }

    pub fn history_len(&self) -> usize {
        self.lsr_history.len()
    }

    pub fn history_span_ms(&self, conv: &QpcConverter) -> f64 {
        deque_span_ms(&self.lsr_history, conv)
    }

    /// Seconds covered by the current history; 0 with fewer than two entries.
    pub fn history_time_seconds(&self, conv: &QpcConverter) -> f64 {
        deque_span_ms(&self.lsr_history, conv) / 1000.0
    }

    /// Number of entries contributing to windowed statistics; 0 with fewer
    /// than two entries.
    pub fn history_size(&self) -> usize {
        if self.lsr_history.len() < 2 {
            0
        } else {
            self.lsr_history.len()
        }
    }

    pub fn fps(&self, conv: &QpcConverter) -> f64 {
        deque_fps(&self.lsr_history, conv)
    }

    pub fn displayed_fps(&self, conv: &QpcConverter) -> f64 {
        deque_fps(&self.displayed_history, conv)
    }

    pub fn source_fps(&self, conv: &QpcConverter) -> f64 {
        deque_fps(&self.source_history, conv)
    }

    /// Last two entries of the full history, newest last. Used for CSV rows,
    /// which need the previous reprojection for deltas.
    pub fn latest_pair(&self) -> Option<(&LsrEvent, &LsrEvent)> {
        let len = self.lsr_history.len();
        if len < 2 {
            return None;
        }
        Some((&self.lsr_history[len - 2], &self.lsr_history[len - 1]))
    }

    pub fn runtime_stats(&self, conv: &QpcConverter) -> LsrRuntimeStats {
        let mut stats = LsrRuntimeStats::default();
        let count = self.lsr_history.len();
        if count < 2 {
            return stats;
        }

        let mut total_app_source_release_to_acquire_ticks = 0u64;
        let mut total_app_source_cpu_render_ticks = 0u64;
        let mut previous_missed = false;
        for current in &self.lsr_history {
            stats.gpu_preemption_ms.add(current.gpu_submission_to_gpu_start_ms);
            stats.gpu_execution_ms.add(current.gpu_start_to_gpu_stop_ms);
            stats.copy_preemption_ms.add(current.gpu_stop_to_copy_start_ms);
            stats.copy_execution_ms.add(current.copy_start_to_copy_stop_ms);
            stats
                .input_latch_to_vsync_ms
                .add(current.input_latch_to_vsync_ms());

            total_app_source_release_to_acquire_ticks += current
                .source
                .release_from_rendering_to_acquire_for_presentation_time;
            total_app_source_cpu_render_ticks += current.source.app_cpu_render_frame_time;
            stats.lsr_cpu_render_ms += current.lsr_cpu_render_frame_ms();

            stats.gpu_end_to_vsync_ms += current.copy_stop_to_vsync_ms;
            stats.vsync_to_photons_middle_ms +=
                current.time_until_photons_middle_ms - current.time_until_vsync_ms;
            stats.lsr_pose_latency_ms += current.lsr_prediction_latency_ms;
            stats.app_pose_latency_ms += current.app_prediction_latency_ms;

            if !current.new_source_latched {
                stats.app_missed_frames += 1;
            }

            let missed = current.final_state.is_missed();
            if missed {
                stats.lsr_missed_frames += u64::from(current.missed_vsync_count);
                // A count above one means multiple vsyncs were missed within
                // a single reprojection period.
                if current.missed_vsync_count > 1 {
                    stats.lsr_consecutive_missed_frames +=
                        u64::from(current.missed_vsync_count - 1);
                }
                if previous_missed {
                    stats.lsr_consecutive_missed_frames += 1;
                }
            }
            previous_missed = missed;
        }

        let newest = &self.lsr_history[count - 1];
        stats.app_process_id = newest.app_process_id();
        stats.lsr_process_id = newest.process_id;

        let count = count as f64;
        stats.app_source_release_to_lsr_acquire_ms =
            conv.delta_to_ms(total_app_source_release_to_acquire_ticks) / count;
        stats.app_source_cpu_render_ms =
            conv.delta_to_ms(total_app_source_cpu_render_ticks) / count;
        stats.lsr_cpu_render_ms /= count;
        stats.gpu_end_to_vsync_ms /= count;
        stats.vsync_to_photons_middle_ms /= count;
        stats.lsr_pose_latency_ms /= count;
        stats.app_pose_latency_ms /= count;

        stats
    }
}

fn deque_span_ms(history: &VecDeque<LsrEvent>, conv: &QpcConverter) -> f64 {
    match (history.front(), history.back()) {
        (Some(front), Some(back)) if history.len() >= 2 => {
            conv.delta_to_ms(back.qpc_time - front.qpc_time)
        }
        _ => 0.0,
    }
}

fn deque_fps(history: &VecDeque<LsrEvent>, conv: &QpcConverter) -> f64 {
    match (history.front(), history.back()) {
        (Some(front), Some(back)) if history.len() >= 2 => {
            (history.len() - 1) as f64 / conv.delta_to_seconds(back.qpc_time - front.qpc_time)
        }
        _ => 0.0,
    }
}

fn prune_deque(history: &mut VecDeque<LsrEvent>, conv: &QpcConverter) {
    while let (Some(front), Some(back)) = (history.front(), history.back()) {
        if history.len() > MAX_LSRS_IN_DEQUE
            || conv.delta_to_ms(back.qpc_time - front.qpc_time) > MAX_HISTORY_TIME_MS
        {
            history.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LsrResult, LsrSource};

    fn lsr(qpc: u64, state: LsrResult, missed: u32, new_source: bool) -> LsrEvent {
        LsrEvent {
            process_id: 42,
            qpc_time: qpc,
            final_state: state,
            missed_vsync_count: missed,
            new_source_latched: new_source,
            source: LsrSource {
                app_process_id: 7,
                app_frame_id: 1,
                app_present_time: qpc.saturating_sub(50),
                app_cpu_render_frame_time: 30,
                release_from_rendering_to_acquire_for_presentation_time: 10,
            },
            thread_wakeup_start_latch_to_cpu_render_frame_start_ms: 0.1,
            cpu_render_frame_start_to_head_pose_callback_start_ms: 0.2,
            head_pose_callback_start_to_head_pose_callback_stop_ms: 0.3,
            head_pose_callback_stop_to_input_latch_ms: 0.1,
            input_latch_to_gpu_submission_ms: 0.2,
            gpu_submission_to_gpu_start_ms: 0.5,
            gpu_start_to_gpu_stop_ms: 1.5,
            gpu_stop_to_copy_start_ms: 0.2,
            copy_start_to_copy_stop_ms: 0.4,
            copy_stop_to_vsync_ms: 2.0,
            time_until_vsync_ms: 5.0,
            time_until_photons_middle_ms: 13.0,
            lsr_prediction_latency_ms: 20.0,
            app_prediction_latency_ms: 40.0,
            app_misprediction_ms: 0.5,
            total_wakeup_error_ms: 0.05,
        }
    }

    fn conv() -> QpcConverter {
        // 1000 ticks per second, so one tick is one millisecond.
        QpcConverter::new(1000).unwrap()
    }

    #[test]
    fn prune_honors_length_and_time_bounds() {
        let conv = conv();
        let mut data = LateStageReprojectionData::new();
        for i in 0..400u64 {
            // 10 ms apart.
            assert!(data.add_lsr(lsr(1000 + i * 10, LsrResult::Presented, 0, true)));
            data.prune(&conv);
        }
        assert!(data.history_len() <= MAX_LSRS_IN_DEQUE);
        assert!(data.history_span_ms(&conv) <= MAX_HISTORY_TIME_MS);
        // With 10 ms spacing, the 3000 ms window holds 301 entries.
        assert_eq!(data.history_len(), 301);
    }

    #[test]
    fn missed_and_source_classification() {
        let mut data = LateStageReprojectionData::new();
        data.add_lsr(lsr(100, LsrResult::Presented, 0, true));
        data.add_lsr(lsr(200, LsrResult::MissedVsync, 2, false));
        data.add_lsr(lsr(300, LsrResult::Presented, 0, false));

        assert_eq!(data.lifetime_lsr_missed_frames, 2);
        assert_eq!(data.lifetime_app_missed_frames, 2);
        assert_eq!(data.history_len(), 3);
        assert_eq!(data.displayed_history.len(), 2);
        assert_eq!(data.source_history.len(), 1);
    }

    #[test]
    fn runtime_stats_empty_sentinel_below_two_entries() {
        let conv = conv();
        let mut data = LateStageReprojectionData::new();
        data.add_lsr(lsr(100, LsrResult::Presented, 0, true));
        let stats = data.runtime_stats(&conv);
        assert_eq!(stats.gpu_execution_ms.count(), 0);
        assert_eq!(stats.app_pose_latency_ms, 0.0);
        assert_eq!(stats.app_process_id, 0);
    }

    #[test]
    fn runtime_stats_averages() {
        let conv = conv();
        let mut data = LateStageReprojectionData::new();
        data.add_lsr(lsr(100, LsrResult::Presented, 0, true));
        data.add_lsr(lsr(200, LsrResult::MissedVsync, 1, false));
        data.add_lsr(lsr(300, LsrResult::MissedVsync, 1, true));

        let stats = data.runtime_stats(&conv);
        assert_eq!(stats.gpu_execution_ms.count(), 3);
        assert_eq!(stats.gpu_execution_ms.average(), 1.5);
        assert_eq!(stats.app_missed_frames, 1);
        assert_eq!(stats.lsr_missed_frames, 2);
        // Two missed reprojections back to back count once.
        assert_eq!(stats.lsr_consecutive_missed_frames, 1);
        assert_eq!(stats.app_process_id, 7);
        assert_eq!(stats.lsr_process_id, 42);
        // 30 ticks == 30 ms at this frequency, averaged over 3 entries.
        assert_eq!(stats.app_source_cpu_render_ms, 30.0);
        assert_eq!(stats.app_source_release_to_lsr_acquire_ms, 10.0);
        assert_eq!(stats.vsync_to_photons_middle_ms, 8.0);
    }

    #[test]
    fn fps_over_window() {
        let conv = conv();
        let mut data = LateStageReprojectionData::new();
        for i in 0..4u64 {
            data.add_lsr(lsr(1000 + i * 100, LsrResult::Presented, 0, true));
        }
        // 3 intervals over 300 ms.
        assert_eq!(data.fps(&conv), 10.0);
        assert_eq!(data.history_time_seconds(&conv), 0.3);
    }
}
