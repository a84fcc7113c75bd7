//! The output merger: the single consumer of every event stream.
//!
//! Present and LSR events are parsed some time after they occur, while
//! recording toggles and process terminations are stamped on the same counter
//! axis. Each tick the merger sweeps all four timelines in timestamp order,
//! so that every event is classified as recorded or not by where it happened,
//! and per-process state is torn down only after every present that preceded
//! the termination has been drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, TryRecvError};

use crate::console::{self, Console};
use crate::csv::{self, CsvOutput};
use crate::events::{CollectedEvent, LsrEvent, PresentEvent, ProcessEvent};
use crate::host::{ChainSnapshot, HostExport, LsrCsvRow, PresentCsvRow};
use crate::lsr::LateStageReprojectionData;
use crate::options::{OutputOptions, Verbosity};
use crate::platform::Platform;
use crate::processes::ProcessRegistry;
use crate::recording::RecordingToggle;
use crate::timestamp::{Qpc, QpcConverter};

/// Pacing for realtime collection. Trace files run unpaced.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct OutputEngine {
    options: OutputOptions,
    conv: QpcConverter,
    platform: Platform,
    events_rx: Receiver<CollectedEvent>,
    toggle: Arc<RecordingToggle>,
    quit: Arc<AtomicBool>,
    console: Box<dyn Console>,
    host: Option<Box<dyn HostExport>>,

    registry: ProcessRegistry,
    lsr: LateStageReprojectionData,
    csv: CsvOutput,

    // Per-tick buffers, reused between ticks.
    lifecycle_events: Vec<ProcessEvent>,
    present_events: Vec<PresentEvent>,
    lsr_events: Vec<LsrEvent>,
    toggle_history: Vec<Qpc>,
    /// Terminations waiting for the event streams to catch up to their
    /// timestamp.
    pending_terminations: Vec<(u32, Qpc)>,
}

impl OutputEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: OutputOptions,
        conv: QpcConverter,
        platform: Platform,
        events_rx: Receiver<CollectedEvent>,
        toggle: Arc<RecordingToggle>,
        quit: Arc<AtomicBool>,
        console: Box<dyn Console>,
        host: Option<Box<dyn HostExport>>,
    ) -> Self {
        let registry = ProcessRegistry::new(options.filter.clone());
        let csv = CsvOutput::new(&options);
        Self {
            options,
            conv,
            platform,
            events_rx,
            toggle,
            quit,
            console,
            host,
            registry,
            lsr: LateStageReprojectionData::new(),
            csv,
            lifecycle_events: Vec::with_capacity(128),
            present_events: Vec::with_capacity(4096),
            lsr_events: Vec::with_capacity(4096),
            toggle_history: Vec::with_capacity(16),
            pending_terminations: Vec::with_capacity(16),
        }
    }

    /// Consume events until asked to quit or the producer goes away. The quit
    /// flag is read before the drain so that one final batch is processed
    /// after collection stops.
    pub fn run(&mut self) {
        loop {
            let quit = self.quit.load(Ordering::Relaxed);
            let disconnected = self.drain_queue();

            self.process_events();
            self.update_console();

            if quit || disconnected {
                break;
            }

            self.registry
                .poll_terminated(self.platform.perf.as_ref(), &mut self.pending_terminations);

            if !self.options.trace_file {
                std::thread::sleep(TICK_INTERVAL);
            }
        }
        self.finish();
    }

    /// Move everything the consumer thread queued since the last tick into
    /// the per-stream buffers. Returns true when the producer disconnected.
    fn drain_queue(&mut self) -> bool {
        loop {
            match self.events_rx.try_recv() {
                Ok(CollectedEvent::Process(event)) => self.lifecycle_events.push(event),
                Ok(CollectedEvent::Present(event)) => self.present_events.push(event),
                Ok(CollectedEvent::Lsr(event)) => self.lsr_events.push(*event),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn process_events(&mut self) {
        let mut recording = self.toggle.snapshot(&mut self.toggle_history);

        // Process lifecycle first: creations apply immediately, terminations
        // are deferred until the present streams catch up, because a present
        // that began before the termination can complete after it. Recording
        // toggles don't interact with these events — they are only delivered
        // when parsing a trace file, and trace files carry no toggle history.
        for event in self.lifecycle_events.drain(..) {
            if event.is_termination() {
                self.pending_terminations
                    .push((event.process_id, event.qpc_time));
            } else {
                self.registry
                    .get_or_create_named(event.process_id, &event.image_file_name);
            }
        }

        let mut present_index = 0usize;
        let mut lsr_index = 0usize;
        let mut toggle_index = 0usize;
        let mut terminated_index = 0usize;

        'sweep: loop {
            let next_toggle_qpc = self.toggle_history.get(toggle_index).copied();

            // Handle terminations up to the next recording toggle. Reaching a
            // present at or past the termination time proves the streams have
            // caught up, so the process can be torn down; running out of
            // events instead leaves the termination for a later batch.
            while terminated_index < self.pending_terminations.len() {
                let (terminated_pid, terminated_qpc) =
                    self.pending_terminations[terminated_index];
                if let Some(toggle_qpc) = next_toggle_qpc {
                    if toggle_qpc < terminated_qpc {
                        break;
                    }
                }

                let mut hit_stop = false;
                self.add_presents(&mut present_index, recording, Some(terminated_qpc), &mut hit_stop);
                self.add_lsrs(&mut lsr_index, recording, Some(terminated_qpc), &mut hit_stop);
                if !hit_stop {
                    break 'sweep;
                }
                self.finish_terminated(terminated_pid);
                terminated_index += 1;
            }

            // Drain up to the next toggle; if we reached it, flip the
            // recording state and keep sweeping.
            let mut hit_toggle = false;
            self.add_presents(&mut present_index, recording, next_toggle_qpc, &mut hit_toggle);
            self.add_lsrs(&mut lsr_index, recording, next_toggle_qpc, &mut hit_toggle);
            if !hit_toggle {
                break;
            }
            toggle_index += 1;
            recording = !recording;
        }

        self.present_events.clear();
        self.lsr_events.clear();

        self.toggle.discard_prefix(toggle_index);
        self.pending_terminations.drain(..terminated_index);
    }

    /// Feed present events into the swap-chain histories, starting at
    /// `*index`. Stops at the first event with `qpc_time >= stop_qpc`, if a
    /// stop is given, setting `hit_stop` and leaving `*index` on that event.
    ///
    /// When recording, the CSV row is emitted before the present enters the
    /// ring: the row describes the event relative to the previous entry.
    fn add_presents(
        &mut self,
        index: &mut usize,
        recording: bool,
        stop_qpc: Option<Qpc>,
        hit_stop: &mut bool,
    ) {
        while *index < self.present_events.len() {
            let present = self.present_events[*index];
            if let Some(stop) = stop_qpc {
                if present.qpc_time >= stop {
                    *hit_stop = true;
                    return;
                }
            }
            *index += 1;

            let verbosity = self.options.verbosity;
            let exclude_dropped = self.options.exclude_dropped;
            let conv = self.conv;

            let info = self
                .registry
                .get_or_create(present.process_id, self.platform.tracker.as_ref());
            if !info.target_process {
                continue;
            }

            let chain = info.chain_map.entry(present.swap_chain_address).or_default();
            if recording {
                let dropped = !present.was_displayed();
                let stats = chain.frame_stats(&present, verbosity, &conv);
                if let Some(stats) = stats {
                    if !(exclude_dropped && dropped) {
                        let row = PresentCsvRow {
                            process_name: info.module_name.clone(),
                            process_id: present.process_id,
                            swap_chain_address: present.swap_chain_address,
                            runtime: present.runtime.as_str(),
                            sync_interval: present.sync_interval,
                            present_flags: present.present_flags.bits(),
                            supports_tearing: present.supports_tearing,
                            present_mode: present.present_mode.as_str(),
                            was_batched: present.was_batched,
                            dwm_notified: present.dwm_notified,
                            dropped,
                            time_in_seconds: stats.time_in_seconds,
                            ms_between_presents: stats.ms_between_presents,
                            ms_between_display_change: stats.ms_between_display_change,
                            ms_in_present_api: stats.ms_in_present_api,
                            ms_until_render_complete: stats.ms_until_render_complete,
                            ms_until_displayed: stats.ms_until_displayed,
                            qpc_time: present.qpc_time,
                            wall_clock_time: SystemTime::now(),
                        };
                        self.csv.write_present_row(&mut info.output, &row);
                        if let Some(host) = self.host.as_mut() {
                            host.notify_csv_row(&row);
                        }
                    }
                }
            }

            info.chain_map
                .get_mut(&present.swap_chain_address)
                .expect("chain was just created")
                .add_present(present);
        }
    }

    /// The LSR variant of `add_presents`. Targeting uses the application's
    /// process id, and unlike presents the row is emitted after the event
    /// joins the history, because the row needs the previous history entry
    /// for its deltas.
    fn add_lsrs(
        &mut self,
        index: &mut usize,
        recording: bool,
        stop_qpc: Option<Qpc>,
        hit_stop: &mut bool,
    ) {
        while *index < self.lsr_events.len() {
            if let Some(stop) = stop_qpc {
                if self.lsr_events[*index].qpc_time >= stop {
                    *hit_stop = true;
                    return;
                }
            }
            let event = self.lsr_events[*index].clone();
            *index += 1;

            let verbosity = self.options.verbosity;
            let exclude_dropped = self.options.exclude_dropped;
            let conv = self.conv;

            let app_process_id = event.app_process_id();
            let info = self
                .registry
                .get_or_create(app_process_id, self.platform.tracker.as_ref());
            if !info.target_process {
                continue;
            }

            if verbosity > Verbosity::Simple && app_process_id == 0 {
                // Incomplete event data.
                continue;
            }

            let presented = event.final_state.is_presented();
            if !self.lsr.add_lsr(event) {
                log::warn!("discarding out-of-order reprojection event");
                continue;
            }

            if recording && (presented || !exclude_dropped) {
                let row = self.lsr.latest_pair().map(|(previous, current)| {
                    let mut app_present_delta_ms = 0.0;
                    let mut app_present_to_lsr_ms = 0.0;
                    if current.is_valid_app_frame() {
                        app_present_to_lsr_ms = conv
                            .delta_to_ms(current.qpc_time.saturating_sub(current.app_present_time()));
                        if previous.is_valid_app_frame()
                            && current.app_process_id() == previous.app_process_id()
                        {
                            app_present_delta_ms = conv.delta_to_ms(
                                current
                                    .app_present_time()
                                    .saturating_sub(previous.app_present_time()),
                            );
                        }
                    }
                    LsrCsvRow {
                        process_name: info.module_name.clone(),
                        app_process_id: current.app_process_id(),
                        lsr_process_id: current.process_id,
                        app_frame_id: current.app_frame_id(),
                        time_in_seconds: conv.qpc_to_seconds(current.qpc_time),
                        app_present_delta_ms,
                        app_present_to_lsr_ms,
                        ms_between_lsrs: conv
                            .delta_to_ms(current.qpc_time - previous.qpc_time),
                        app_missed: !current.new_source_latched,
                        lsr_missed_count: current.missed_vsync_count,
                        app_source_release_to_lsr_acquire_ms: conv.delta_to_ms(
                            current
                                .source
                                .release_from_rendering_to_acquire_for_presentation_time,
                        ),
                        app_cpu_render_frame_ms: conv
                            .delta_to_ms(current.source.app_cpu_render_frame_time),
                        app_prediction_latency_ms: current.app_prediction_latency_ms,
                        app_misprediction_ms: current.app_misprediction_ms,
                        lsr_cpu_render_frame_ms: current.lsr_cpu_render_frame_ms(),
                        lsr_prediction_latency_ms: current.lsr_prediction_latency_ms,
                        lsr_motion_to_photon_latency_ms: current
                            .lsr_motion_to_photon_latency_ms(),
                        time_until_vsync_ms: current.time_until_vsync_ms,
                        lsr_thread_wakeup_to_gpu_end_ms: current.thread_wakeup_to_gpu_end_ms(),
                        total_wakeup_error_ms: current.total_wakeup_error_ms,
                        thread_wakeup_start_latch_to_cpu_render_frame_start_ms: current
                            .thread_wakeup_start_latch_to_cpu_render_frame_start_ms,
                        cpu_render_frame_start_to_head_pose_callback_start_ms: current
                            .cpu_render_frame_start_to_head_pose_callback_start_ms,
                        head_pose_callback_start_to_head_pose_callback_stop_ms: current
                            .head_pose_callback_start_to_head_pose_callback_stop_ms,
                        head_pose_callback_stop_to_input_latch_ms: current
                            .head_pose_callback_stop_to_input_latch_ms,
                        input_latch_to_gpu_submission_ms: current
                            .input_latch_to_gpu_submission_ms,
                        gpu_submission_to_gpu_start_ms: current.gpu_submission_to_gpu_start_ms,
                        gpu_start_to_gpu_stop_ms: current.gpu_start_to_gpu_stop_ms,
                        gpu_stop_to_copy_start_ms: current.gpu_stop_to_copy_start_ms,
                        copy_start_to_copy_stop_ms: current.copy_start_to_copy_stop_ms,
                        copy_stop_to_vsync_ms: current.copy_stop_to_vsync_ms,
                        qpc_time: current.qpc_time,
                        wall_clock_time: SystemTime::now(),
                    }
                });
                if let Some(row) = row {
                    self.csv.write_lsr_row(&mut info.lsr_output, &row);
                    if let Some(host) = self.host.as_mut() {
                        host.notify_lsr_csv_row(&row);
                    }
                }
            }

            self.lsr.prune(&conv);
        }
    }

    /// Tear down a process whose termination time has been reached by the
    /// event streams.
    fn finish_terminated(&mut self, process_id: u32) {
        let Some(info) = self.registry.handle_terminated(process_id) else {
            return;
        };
        if info.target_process {
            if self.options.multi_csv {
                self.csv
                    .stash_process_files(&info.module_name, info.output, info.lsr_output);
            }
            if self.options.terminate_on_proc_exit && self.registry.target_count() == 0 {
                self.quit.store(true, Ordering::Relaxed);
            }
        }
    }

    fn update_console(&mut self) {
        let now = SystemTime::now();

        // Host snapshots go out every tick; they are independent of the
        // terminal view.
        if let Some(host) = self.host.as_mut() {
            for (process_id, info) in self.registry.iter() {
                if !info.target_process {
                    continue;
                }
                for (&address, chain) in &info.chain_map {
                    if let Some(summary) = chain.summarize(self.options.verbosity, &self.conv) {
                        let snapshot = ChainSnapshot {
                            process_name: info.module_name.clone(),
                            process_id,
                            swap_chain_address: address,
                            runtime: summary.runtime.as_str(),
                            sync_interval: summary.sync_interval,
                            present_flags: summary.present_flags,
                            ms_per_frame: summary.ms_per_frame,
                            fps: summary.fps,
                            wall_clock_time: now,
                        };
                        host.notify_console_snapshot(&snapshot);
                    }
                }
            }
        }

        // The atomic read is uncorrelated with the toggle history; good
        // enough for a heartbeat.
        let realtime_recording = self.toggle.is_recording();
        if self.options.simple_console {
            #[cfg(debug_assertions)]
            if realtime_recording {
                print!(".");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            return;
        }

        let mut display = String::new();
        for (process_id, info) in self.registry.iter() {
            console::format_process(&mut display, process_id, info, self.options.verbosity, &self.conv);
        }
        console::format_lsr(&mut display, &self.registry, &self.lsr, self.options.verbosity, &self.conv);
        if realtime_recording {
            display.push_str("** RECORDING **\n");
        }
        self.console.replace(&display);
    }

    /// Flush and close every output, report lost events, release process
    /// handles.
    fn finish(&mut self) {
        if !self.options.simple_console {
            self.console.replace("");
        }

        let (events_lost, buffers_lost) = self.platform.session.lost_counts();
        if events_lost > 0 || buffers_lost > 0 {
            eprintln!("Warning: the trace session lost {events_lost} events and {buffers_lost} buffers.");
        }

        for (_process_id, info) in self.registry.iter_mut() {
            csv::close_slot(&mut info.output, events_lost, buffers_lost);
            csv::close_slot(&mut info.lsr_output, events_lost, buffers_lost);
            info.handle = None;
        }
        self.csv.close(events_lost, buffers_lost);
    }
}
