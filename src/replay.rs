//! Trace-file backend: replays a capture of parsed events.
//!
//! A capture is a JSON-lines file. The first line is a [`CaptureHeader`]
//! carrying the counter frequency of the machine the trace was taken on;
//! every following line is one [`CollectedEvent`]. The reader thread plays
//! the file into the engine's queue as fast as the engine consumes it.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};
use serde_derive::{Deserialize, Serialize};

use crate::error::StartError;
use crate::events::CollectedEvent;

/// Capacity of the queue between the reader thread and the engine.
const QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureHeader {
    /// Ticks per second of the counter the capture's timestamps use.
    pub qpc_frequency: u64,
}

/// Open a capture and start replaying it on a background thread.
///
/// Returns the capture header, the receiving end of the event queue, and the
/// reader's join handle. The queue disconnects when the file is exhausted,
/// which the engine treats as the end of the session.
pub fn spawn_reader(
    path: &Path,
) -> Result<(CaptureHeader, Receiver<CollectedEvent>, JoinHandle<()>), StartError> {
    let file =
        File::open(path).map_err(|err| StartError::CaptureFileOpen(path.to_path_buf(), err))?;
    let mut reader = BufReader::new(file);

    let mut header_line = String::new();
    reader
        .read_line(&mut header_line)
        .map_err(|err| StartError::CaptureFileOpen(path.to_path_buf(), err))?;
    if header_line.trim().is_empty() {
        return Err(StartError::CaptureFileMissingHeader(path.to_path_buf()));
    }
    let header: CaptureHeader = serde_json::from_str(header_line.trim())
        .map_err(|err| StartError::CaptureFileBadHeader(path.to_path_buf(), err))?;

    let (sender, receiver) = bounded(QUEUE_CAPACITY);
    let handle = std::thread::spawn(move || {
        for (line_number, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::warn!("capture read failed after line {line_number}: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CollectedEvent>(&line) {
                Ok(event) => {
                    if sender.send(event).is_err() {
                        // The engine is gone; stop replaying.
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("skipping malformed capture line {}: {err}", line_number + 2);
                }
            }
        }
    });

    Ok((header, receiver, handle))
}

/// Writes a capture in the format [`spawn_reader`] consumes.
pub struct CaptureWriter {
    writer: BufWriter<File>,
}

impl CaptureWriter {
    pub fn create(path: &Path, header: &CaptureHeader) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, header)?;
        writeln!(writer)?;
        Ok(Self { writer })
    }

    pub fn write_event(&mut self, event: &CollectedEvent) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        writeln!(self.writer)
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ProcessEvent;

    #[test]
    fn round_trips_a_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut writer =
            CaptureWriter::create(&path, &CaptureHeader { qpc_frequency: 1000 }).unwrap();
        writer
            .write_event(&CollectedEvent::Process(ProcessEvent {
                process_id: 7,
                qpc_time: 100,
                image_file_name: "game.exe".into(),
            }))
            .unwrap();
        writer.finish().unwrap();

        let (header, receiver, handle) = spawn_reader(&path).unwrap();
        assert_eq!(header.qpc_frequency, 1000);
        let event = receiver.recv().unwrap();
        match event {
            CollectedEvent::Process(process) => {
                assert_eq!(process.process_id, 7);
                assert_eq!(process.image_file_name, "game.exe");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(receiver.recv().is_err());
        handle.join().unwrap();
    }

    #[test]
    fn missing_header_is_a_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            spawn_reader(&path),
            Err(StartError::CaptureFileMissingHeader(_))
        ));
    }
}
