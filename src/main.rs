use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use presently::console::{NullConsole, StdoutConsole};
use presently::output::OutputEngine;
use presently::platform::{LosslessSession, ManualPerfCounter, NullProcessTracker, Platform};
use presently::recording::RecordingToggle;
use presently::replay;
use presently::timestamp::QpcConverter;

mod cli;

use cli::{Action, ImportArgs, Opt};

fn main() {
    env_logger::init();
    let opt = Opt::parse();
    match opt.action {
        Action::Import(import_args) => run_import(import_args),
    }
}

fn run_import(args: ImportArgs) {
    let options = args.output_args.output_options(true);

    let (header, receiver, reader) = match replay::spawn_reader(&args.file) {
        Ok(parts) => parts,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let converter = match QpcConverter::new(header.qpc_frequency) {
        Ok(converter) => converter,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    // Captures have no realtime cues, so the toggle log keeps no history and
    // the whole run records.
    let toggle = Arc::new(RecordingToggle::new(false));
    toggle.set_recording(true, 0);

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            quit.store(true, Ordering::Relaxed);
        }) {
            log::warn!("could not install Ctrl+C handler: {err}");
        }
    }

    let platform = Platform {
        perf: Arc::new(ManualPerfCounter::new(header.qpc_frequency)),
        tracker: Box::new(NullProcessTracker),
        session: Box::new(LosslessSession),
    };
    let console: Box<dyn presently::console::Console> = if options.simple_console {
        Box::new(NullConsole)
    } else {
        Box::new(StdoutConsole::new())
    };

    let output_path = options.output_path.clone();
    let mut engine = OutputEngine::new(
        options,
        converter,
        platform,
        receiver,
        toggle,
        quit,
        console,
        None,
    );
    engine.run();

    if let Err(err) = reader.join() {
        log::warn!("capture reader thread panicked: {err:?}");
    }

    if let Some(path) = output_path {
        eprintln!("Wrote {}", path.display());
    }
}
