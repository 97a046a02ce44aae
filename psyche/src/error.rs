use thiserror::Error;

/// Failures raised by the control core itself.
///
/// Collaborator seams (perception, dialogue backend, persistence) report
/// through [`anyhow::Error`]; this enum covers what the core decides is fatal
/// or worth distinguishing.
#[derive(Debug, Error)]
pub enum Error {
    /// No input device matched during startup.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// The physical capture device refused to start.
    #[error("camera failed to start: {0}")]
    CameraStart(String),
    /// The event queue has no consumer anymore.
    #[error("event queue closed")]
    QueueClosed,
    /// The query gateway no longer accepts work.
    #[error("query gateway shut down")]
    GatewayClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
