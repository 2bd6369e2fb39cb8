//! Error taxonomy for the consumer stage.
//! Queue-empty and trigger-not-found are normal flow and never show up here.

use std::fmt;

/// Thread lifecycle misuse. Surfaced to the caller, never retried, state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    AlreadyRunning,
    NotRunning,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::AlreadyRunning => write!(f, "processor thread already running"),
            LifecycleError::NotRunning => write!(f, "processor thread not running"),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Window memory could not be obtained. The previous window is left intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    Empty {
        window_size: usize,
        persistence_size: usize,
    },
    Overflow {
        window_size: usize,
        persistence_size: usize,
    },
    OutOfMemory {
        samples: usize,
    },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::Empty { window_size, persistence_size } => write!(
                f,
                "window dimensions must be non-zero ({window_size} x {persistence_size})"
            ),
            AllocationError::Overflow { window_size, persistence_size } => write!(
                f,
                "window size overflows: {window_size} x {persistence_size}"
            ),
            AllocationError::OutOfMemory { samples } => {
                write!(f, "cannot allocate window of {samples} samples")
            }
        }
    }
}

impl std::error::Error for AllocationError {}

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    ShapeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "sink IO error: {e}"),
            SinkError::ShapeMismatch { expected, actual } => {
                write!(f, "window shape mismatch: expected {expected} samples, got {actual}")
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::ShapeMismatch { .. } => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Everything the control surface can hand back.
#[derive(Debug)]
pub enum ProcessorError {
    Lifecycle(LifecycleError),
    Allocation(AllocationError),
    Sink(SinkError),
    Config(ConfigError),
    Spawn(std::io::Error),
    WorkerPanicked,
    WindowNotFull,
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::Lifecycle(e) => write!(f, "{e}"),
            ProcessorError::Allocation(e) => write!(f, "{e}"),
            ProcessorError::Sink(e) => write!(f, "{e}"),
            ProcessorError::Config(e) => write!(f, "{e}"),
            ProcessorError::Spawn(e) => write!(f, "failed to spawn processor thread: {e}"),
            ProcessorError::WorkerPanicked => write!(f, "processor thread panicked"),
            ProcessorError::WindowNotFull => write!(f, "persistence window is not full"),
        }
    }
}

impl std::error::Error for ProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessorError::Lifecycle(e) => Some(e),
            ProcessorError::Allocation(e) => Some(e),
            ProcessorError::Sink(e) => Some(e),
            ProcessorError::Config(e) => Some(e),
            ProcessorError::Spawn(e) => Some(e),
            ProcessorError::WorkerPanicked | ProcessorError::WindowNotFull => None,
        }
    }
}

impl From<LifecycleError> for ProcessorError {
    fn from(e: LifecycleError) -> Self {
        ProcessorError::Lifecycle(e)
    }
}

impl From<AllocationError> for ProcessorError {
    fn from(e: AllocationError) -> Self {
        ProcessorError::Allocation(e)
    }
}

impl From<SinkError> for ProcessorError {
    fn from(e: SinkError) -> Self {
        ProcessorError::Sink(e)
    }
}

impl From<ConfigError> for ProcessorError {
    fn from(e: ConfigError) -> Self {
        ProcessorError::Config(e)
    }
}
