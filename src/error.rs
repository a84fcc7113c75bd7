use std::path::PathBuf;

use thiserror::Error;

/// Errors which prevent the engine from starting at all. These are reported
/// once and the process refuses to run; nothing here is recoverable by
/// retrying.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("the high-resolution counter reported a frequency of zero")]
    ZeroCounterFrequency,

    #[error("could not open capture file {0}: {1}")]
    CaptureFileOpen(PathBuf, #[source] std::io::Error),

    #[error("capture file {0} is missing its header line")]
    CaptureFileMissingHeader(PathBuf),

    #[error("capture file {0} has a malformed header: {1}")]
    CaptureFileBadHeader(PathBuf, #[source] serde_json::Error),
}
