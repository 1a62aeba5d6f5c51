// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the fusion pipeline

use std::fmt;

/// Result type alias using FusionError
pub type FusionResult<T> = Result<T, FusionError>;

/// Main pipeline error type
#[derive(Debug, Clone)]
pub enum FusionError {
    /// Sensor-related errors
    Sensor(SensorError),
    /// Pass scheduling/execution errors
    Pass(PassError),
    /// Configuration errors
    Config(String),
    /// Filesystem errors (config load/save)
    Io(String),
}

/// Sensor-specific errors
#[derive(Debug, Clone)]
pub enum SensorError {
    /// No new frame is ready; the previous frame should be reused
    NoFrameAvailable,
    /// The sensor went away during operation
    Disconnected,
    /// A frame arrived with inconsistent dimensions or payload size
    BadFrame(String),
}

/// Pass scheduling errors
#[derive(Debug, Clone)]
pub enum PassError {
    /// A pass read a slot no earlier pass wrote this frame
    MissingInput {
        /// Name of the offending pass
        pass: &'static str,
        /// The slot that was never written
        slot: &'static str,
    },
    /// A layer index outside the pass's layer count
    LayerOutOfRange(usize),
    /// Two buffers that must share dimensions do not
    SizeMismatch {
        /// What was expected, e.g. "position"
        expected: (usize, usize),
        /// What was provided
        got: (usize, usize),
    },
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::Sensor(e) => write!(f, "Sensor error: {}", e),
            FusionError::Pass(e) => write!(f, "Pass error: {}", e),
            FusionError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FusionError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::NoFrameAvailable => write!(f, "No frame available"),
            SensorError::Disconnected => write!(f, "Sensor disconnected"),
            SensorError::BadFrame(msg) => write!(f, "Bad frame: {}", msg),
        }
    }
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::MissingInput { pass, slot } => {
                write!(f, "Pass '{}' read slot '{}' before it was written", pass, slot)
            }
            PassError::LayerOutOfRange(layer) => write!(f, "Layer index {} out of range", layer),
            PassError::SizeMismatch { expected, got } => write!(
                f,
                "Buffer size mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
        }
    }
}

impl std::error::Error for FusionError {}
impl std::error::Error for SensorError {}
impl std::error::Error for PassError {}

impl From<SensorError> for FusionError {
    fn from(err: SensorError) -> Self {
        FusionError::Sensor(err)
    }
}

impl From<PassError> for FusionError {
    fn from(err: PassError) -> Self {
        FusionError::Pass(err)
    }
}

impl From<std::io::Error> for FusionError {
    fn from(err: std::io::Error) -> Self {
        FusionError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FusionError {
    fn from(err: serde_json::Error) -> Self {
        FusionError::Config(err.to_string())
    }
}
