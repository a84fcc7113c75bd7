use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crossbeam_channel::unbounded;

use presently::console::NullConsole;
use presently::events::{
    CollectedEvent, LsrEvent, LsrResult, LsrSource, PresentEvent, PresentFlags, PresentMode,
    PresentResult, ProcessEvent, Runtime,
};
use presently::host::{ChainSnapshot, HostExport, LsrCsvRow, PresentCsvRow};
use presently::options::{OutputOptions, Verbosity};
use presently::platform::{LosslessSession, ManualPerfCounter, NullProcessTracker, Platform};
use presently::process_filter::ProcessFilter;
use presently::recording::RecordingToggle;
use presently::replay::{spawn_reader, CaptureHeader, CaptureWriter};
use presently::timestamp::QpcConverter;
use presently::OutputEngine;

const FREQUENCY: u64 = 1000;

fn present(pid: u32, qpc: u64, state: PresentResult) -> CollectedEvent {
    CollectedEvent::Present(PresentEvent {
        process_id: pid,
        swap_chain_address: 0xABCD,
        qpc_time: qpc,
        time_taken: 2,
        ready_time: qpc + 1,
        screen_time: qpc + 5,
        runtime: Runtime::Dxgi,
        sync_interval: 1,
        present_flags: PresentFlags::empty(),
        present_mode: PresentMode::HardwareIndependentFlip,
        final_state: state,
        supports_tearing: false,
        was_batched: false,
        dwm_notified: true,
    })
}

fn process_start(pid: u32, qpc: u64, name: &str) -> CollectedEvent {
    CollectedEvent::Process(ProcessEvent {
        process_id: pid,
        qpc_time: qpc,
        image_file_name: name.into(),
    })
}

fn process_stop(pid: u32, qpc: u64) -> CollectedEvent {
    CollectedEvent::Process(ProcessEvent {
        process_id: pid,
        qpc_time: qpc,
        image_file_name: String::new(),
    })
}

fn lsr(qpc: u64, app_pid: u32) -> CollectedEvent {
    CollectedEvent::Lsr(Box::new(LsrEvent {
        process_id: 42,
        qpc_time: qpc,
        final_state: LsrResult::Presented,
        missed_vsync_count: 0,
        new_source_latched: true,
        source: LsrSource {
            app_process_id: app_pid,
            app_frame_id: 1,
            app_present_time: qpc - 20,
            app_cpu_render_frame_time: 5,
            release_from_rendering_to_acquire_for_presentation_time: 2,
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
    }))
}

fn trace_platform() -> Platform {
    Platform {
        perf: Arc::new(ManualPerfCounter::new(FREQUENCY)),
        tracker: Box::new(NullProcessTracker),
        session: Box::new(LosslessSession),
    }
}

fn data_rows(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .filter(|line| !line.starts_with("//"))
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct HostLog {
    rows: Vec<PresentCsvRow>,
    lsr_rows: Vec<LsrCsvRow>,
    snapshots: Vec<ChainSnapshot>,
}

struct SharedHost(Arc<Mutex<HostLog>>);

impl HostExport for SharedHost {
    fn notify_console_snapshot(&mut self, snapshot: &ChainSnapshot) {
        self.0.lock().unwrap().snapshots.push(snapshot.clone());
    }

    fn notify_csv_row(&mut self, row: &PresentCsvRow) {
        self.0.lock().unwrap().rows.push(row.clone());
    }

    fn notify_lsr_csv_row(&mut self, row: &LsrCsvRow) {
        self.0.lock().unwrap().lsr_rows.push(row.clone());
    }
}

#[test]
fn import_capture_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let capture_path = dir.path().join("frames.jsonl");
    let csv_path = dir.path().join("frames.csv");

    let mut writer =
        CaptureWriter::create(&capture_path, &CaptureHeader { qpc_frequency: FREQUENCY }).unwrap();
    writer.write_event(&process_start(7, 50, r"C:\games\game.exe")).unwrap();
    for qpc in [100, 200, 300] {
        writer.write_event(&present(7, qpc, PresentResult::Presented)).unwrap();
    }
    writer.finish().unwrap();

    let (header, receiver, reader) = spawn_reader(&capture_path).unwrap();
    let converter = QpcConverter::new(header.qpc_frequency).unwrap();

    let toggle = Arc::new(RecordingToggle::new(false));
    toggle.set_recording(true, 0);

    let options = OutputOptions {
        verbosity: Verbosity::Normal,
        trace_file: true,
        simple_console: true,
        output_path: Some(csv_path.clone()),
        ..Default::default()
    };
    let mut engine = OutputEngine::new(
        options,
        converter,
        trace_platform(),
        receiver,
        toggle,
        Arc::new(AtomicBool::new(false)),
        Box::new(NullConsole),
        None,
    );
    engine.run();
    reader.join().unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = contents.lines();
    let header_line = lines.next().unwrap();
    assert_eq!(
        header_line,
        "ProcessName,ProcessID,SwapChainAddress,Runtime,SyncInterval,PresentFlags,AllowsTearing,PresentMode,Dropped,TimeInSeconds,msBetweenPresents,msBetweenDisplayChange,msInPresentApi,msUntilRenderComplete,msUntilDisplayed"
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("game.exe,7,0x000000000000ABCD,DXGI,1,0,0,Hardware: Independent Flip,0,0.200000,100.000000,100.000000,2.000000,"));
    for row in &rows {
        assert_eq!(row.split(',').count(), header_line.split(',').count());
    }
}

#[test]
fn realtime_toggles_classify_rows_by_event_time() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("frames.csv");

    let (sender, receiver) = unbounded();
    for qpc in [100, 200, 300, 400] {
        sender.send(present(7, qpc, PresentResult::Presented)).unwrap();
    }
    drop(sender);

    let toggle = Arc::new(RecordingToggle::new(true));
    toggle.set_recording(true, 150);
    toggle.set_recording(false, 350);

    let options = OutputOptions {
        verbosity: Verbosity::Simple,
        simple_console: true,
        output_path: Some(csv_path.clone()),
        ..Default::default()
    };
    let mut engine = OutputEngine::new(
        options,
        QpcConverter::new(FREQUENCY).unwrap(),
        trace_platform(),
        receiver,
        toggle,
        Arc::new(AtomicBool::new(false)),
        Box::new(NullConsole),
        None,
    );
    engine.run();

    let rows = data_rows(&csv_path);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains(",0.200000,"));
    assert!(rows[1].contains(",0.300000,"));
}

#[test]
fn host_receives_every_csv_row_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("frames.csv");
    let lsr_csv_path = dir.path().join("frames-lsr.csv");

    let (sender, receiver) = unbounded();
    sender.send(process_start(7, 10, "holo_app.exe")).unwrap();
    for qpc in [100, 200, 300] {
        sender.send(present(7, qpc, PresentResult::Presented)).unwrap();
    }
    for qpc in [150, 250, 350] {
        sender.send(lsr(qpc, 7)).unwrap();
    }
    drop(sender);

    let toggle = Arc::new(RecordingToggle::new(false));
    toggle.set_recording(true, 0);

    let log = Arc::new(Mutex::new(HostLog::default()));
    let options = OutputOptions {
        verbosity: Verbosity::Normal,
        trace_file: true,
        simple_console: true,
        output_path: Some(csv_path.clone()),
        lsr_output_path: Some(lsr_csv_path.clone()),
        ..Default::default()
    };
    let mut engine = OutputEngine::new(
        options,
        QpcConverter::new(FREQUENCY).unwrap(),
        trace_platform(),
        receiver,
        toggle,
        Arc::new(AtomicBool::new(false)),
        Box::new(NullConsole),
        Some(Box::new(SharedHost(log.clone()))),
    );
    engine.run();

    let present_rows = data_rows(&csv_path);
    let lsr_rows = data_rows(&lsr_csv_path);
    let log = log.lock().unwrap();

    assert_eq!(log.rows.len(), present_rows.len());
    assert_eq!(log.rows.len(), 2);
    assert_eq!(log.rows[0].qpc_time, 200);
    assert_eq!(log.rows[1].qpc_time, 300);
    assert_eq!(log.rows[0].ms_between_presents, 100.0);
    assert_eq!(log.rows[0].process_name, "holo_app.exe");

    assert_eq!(log.lsr_rows.len(), lsr_rows.len());
    assert_eq!(log.lsr_rows.len(), 2);
    assert_eq!(log.lsr_rows[0].qpc_time, 250);
    assert_eq!(log.lsr_rows[0].ms_between_lsrs, 100.0);
    assert_eq!(log.lsr_rows[0].app_process_id, 7);
    assert_eq!(log.lsr_rows[0].lsr_process_id, 42);

    // Snapshots carry the chain summary for the one populated chain.
    assert_eq!(log.snapshots.len(), 1);
    assert_eq!(log.snapshots[0].fps, 10.0);
}

#[test]
fn multi_csv_reuses_files_across_process_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("frames.csv");

    let (sender, receiver) = unbounded();
    sender.send(process_start(7, 10, "game.exe")).unwrap();
    sender.send(present(7, 100, PresentResult::Presented)).unwrap();
    sender.send(present(7, 200, PresentResult::Presented)).unwrap();
    sender.send(process_stop(7, 300)).unwrap();
    sender.send(process_start(12, 400, "game.exe")).unwrap();
    sender.send(present(12, 500, PresentResult::Presented)).unwrap();
    sender.send(present(12, 600, PresentResult::Presented)).unwrap();
    drop(sender);

    let toggle = Arc::new(RecordingToggle::new(false));
    toggle.set_recording(true, 0);

    let options = OutputOptions {
        verbosity: Verbosity::Simple,
        trace_file: true,
        simple_console: true,
        multi_csv: true,
        output_path: Some(csv_path.clone()),
        ..Default::default()
    };
    let mut engine = OutputEngine::new(
        options,
        QpcConverter::new(FREQUENCY).unwrap(),
        trace_platform(),
        receiver,
        toggle,
        Arc::new(AtomicBool::new(false)),
        Box::new(NullConsole),
        None,
    );
    engine.run();

    // No consolidated file in multi-csv mode; both processes share one
    // per-module file with a single header.
    assert!(!csv_path.exists());
    let per_process = dir.path().join("frames-game.exe.csv");
    let contents = std::fs::read_to_string(&per_process).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ProcessName,"));
    assert!(lines[1].starts_with("game.exe,7,"));
    assert!(lines[2].starts_with("game.exe,12,"));
}

#[test]
fn excluded_process_produces_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("frames.csv");

    let (sender, receiver) = unbounded();
    sender.send(process_start(7, 10, "foo.exe")).unwrap();
    for qpc in [100, 200, 300] {
        sender.send(present(7, qpc, PresentResult::Presented)).unwrap();
    }
    drop(sender);

    let toggle = Arc::new(RecordingToggle::new(false));
    toggle.set_recording(true, 0);

    let log = Arc::new(Mutex::new(HostLog::default()));
    let options = OutputOptions {
        filter: ProcessFilter {
            exclude_names: vec!["foo.exe".into()],
            ..Default::default()
        },
        trace_file: true,
        simple_console: true,
        output_path: Some(csv_path.clone()),
        ..Default::default()
    };
    let mut engine = OutputEngine::new(
        options,
        QpcConverter::new(FREQUENCY).unwrap(),
        trace_platform(),
        receiver,
        toggle,
        Arc::new(AtomicBool::new(false)),
        Box::new(NullConsole),
        Some(Box::new(SharedHost(log.clone()))),
    );
    engine.run();

    assert!(!csv_path.exists());
    let log = log.lock().unwrap();
    assert!(log.rows.is_empty());
    assert!(log.snapshots.is_empty());
}
