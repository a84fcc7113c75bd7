//! Bounded history of recent presents for one swap chain, and the frame
//! statistics derived from it.

use crate::events::{PresentEvent, PresentMode, Runtime};
use crate::options::Verbosity;
use crate::timestamp::QpcConverter;

/// Ring capacity. Entries past this age get overwritten by new presents.
pub const PRESENT_HISTORY_MAX_COUNT: usize = 64;

/// Frame statistics for one present, computed against the chain history as it
/// was just before the present was appended. Values that cannot be computed
/// for this present report 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub time_in_seconds: f64,
    pub ms_between_presents: f64,
    pub ms_in_present_api: f64,
    pub ms_until_render_complete: f64,
    pub ms_until_displayed: f64,
    pub ms_between_display_change: f64,
}

/// Per-chain summary for the live console, derived from the oldest and newest
/// history entries. Only available once the chain has two presents.
#[derive(Debug, Clone, Copy)]
pub struct ChainSummary {
    pub runtime: Runtime,
    pub sync_interval: i32,
    pub present_flags: u32,
    pub ms_per_frame: f64,
    pub fps: f64,
    pub displayed_fps: Option<f64>,
    pub avg_display_latency_ms: Option<f64>,
    pub latest_displayed_mode: Option<PresentMode>,
}

#[derive(Debug, Default)]
pub struct SwapChainData {
    /// Ring storage; grows up to `PRESENT_HISTORY_MAX_COUNT` and is then
    /// overwritten in place.
    present_history: Vec<PresentEvent>,
    /// Absolute write cursor. The slot for the next present is
    /// `next_present_index % PRESENT_HISTORY_MAX_COUNT`.
    next_present_index: u64,
    present_history_count: usize,
    /// Absolute index of the most recent present that reached the display.
    last_displayed_present_index: Option<u64>,
}

impl SwapChainData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present_history_count(&self) -> usize {
        self.present_history_count
    }

    pub fn add_present(&mut self, present: PresentEvent) {
        let displayed = present.was_displayed();
        let slot = (self.next_present_index % PRESENT_HISTORY_MAX_COUNT as u64) as usize;
        if slot == self.present_history.len() {
            self.present_history.push(present);
        } else {
            self.present_history[slot] = present;
        }
        if displayed {
            self.last_displayed_present_index = Some(self.next_present_index);
        }
        self.next_present_index += 1;
        self.present_history_count =
            (self.present_history_count + 1).min(PRESENT_HISTORY_MAX_COUNT);
    }

    fn entry(&self, absolute_index: u64) -> &PresentEvent {
        &self.present_history[(absolute_index % PRESENT_HISTORY_MAX_COUNT as u64) as usize]
    }

    /// Oldest entry still in the ring.
    pub fn oldest(&self) -> Option<&PresentEvent> {
        if self.present_history_count == 0 {
            return None;
        }
        Some(self.entry(self.next_present_index - self.present_history_count as u64))
    }

    /// Most recently added entry.
    pub fn newest(&self) -> Option<&PresentEvent> {
        if self.present_history_count == 0 {
            return None;
        }
        Some(self.entry(self.next_present_index - 1))
    }

    /// The most recent displayed present, if its slot has not been
    /// overwritten since.
    pub fn last_displayed(&self) -> Option<&PresentEvent> {
        let index = self.last_displayed_present_index?;
        let live_start = self.next_present_index - self.present_history_count as u64;
        if index < live_start {
            return None;
        }
        Some(self.entry(index))
    }

    /// Statistics for `present` relative to the current history. Must be
    /// called before `add_present(present)`; returns `None` when the chain
    /// has no prior entry to measure against.
    pub fn frame_stats(
        &self,
        present: &PresentEvent,
        verbosity: Verbosity,
        conv: &QpcConverter,
    ) -> Option<FrameStats> {
        let previous = self.newest()?;

        let mut stats = FrameStats {
            time_in_seconds: conv.qpc_to_seconds(present.qpc_time),
            ms_between_presents: conv.delta_to_ms(present.qpc_time.saturating_sub(previous.qpc_time)),
            ms_in_present_api: conv.delta_to_ms(present.time_taken),
            ..FrameStats::default()
        };

        if verbosity > Verbosity::Simple {
            if present.ready_time > 0 {
                stats.ms_until_render_complete =
                    conv.delta_to_ms(present.ready_time.saturating_sub(present.qpc_time));
            }
            if present.was_displayed() {
                stats.ms_until_displayed =
                    conv.delta_to_ms(present.screen_time.saturating_sub(present.qpc_time));
                if let Some(last_displayed) = self.last_displayed() {
                    stats.ms_between_display_change = conv
                        .delta_to_ms(present.screen_time.saturating_sub(last_displayed.screen_time));
                }
            }
        }

        Some(stats)
    }

    /// Summary over the whole ring for the console and the host snapshot.
    pub fn summarize(&self, verbosity: Verbosity, conv: &QpcConverter) -> Option<ChainSummary> {
        if self.present_history_count < 2 {
            return None;
        }
        let oldest = self.oldest()?;
        let newest = self.newest()?;

        let cpu_avg = conv.delta_to_seconds(newest.qpc_time - oldest.qpc_time)
            / (self.present_history_count - 1) as f64;

        let mut summary = ChainSummary {
            runtime: newest.runtime,
            sync_interval: newest.sync_interval,
            present_flags: newest.present_flags.bits(),
            ms_per_frame: 1000.0 * cpu_avg,
            fps: 1.0 / cpu_avg,
            displayed_fps: None,
            avg_display_latency_ms: None,
            latest_displayed_mode: None,
        };

        if verbosity > Verbosity::Simple {
            let live_start = self.next_present_index - self.present_history_count as u64;
            let mut display_count = 0usize;
            let mut latency_ticks = 0u64;
            let mut first_screen_time = 0;
            let mut latest_displayed: Option<&PresentEvent> = None;
            for i in 0..self.present_history_count as u64 {
                let p = self.entry(live_start + i);
                if p.was_displayed() {
                    if display_count == 0 {
                        first_screen_time = p.screen_time;
                    }
                    latency_ticks += p.screen_time.saturating_sub(p.qpc_time);
                    latest_displayed = Some(p);
                    display_count += 1;
                }
            }
            if let Some(displayed) = latest_displayed {
                summary.latest_displayed_mode = Some(displayed.present_mode);
                summary.avg_display_latency_ms =
                    Some(conv.delta_to_ms(latency_ticks) / display_count as f64);
                if display_count >= 2 {
                    summary.displayed_fps = Some(
                        (display_count - 1) as f64
                            / conv.delta_to_seconds(displayed.screen_time - first_screen_time),
                    );
                }
            }
        }

        Some(summary)
    }
}
