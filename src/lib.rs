//! scope-link: real-time consumer stage of an oscilloscope acquisition pipeline.
//! Drains captured buffers from the trigger queue, aligns them on their trigger
//! and stacks them into a persistence window that is flushed to a sink.

pub mod buffer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod sink;
pub mod state_machine;
pub mod trigger;
pub mod window;

pub use buffer::{Sample, SampleBuffer};
pub use config::ProcessorConfig;
pub use error::{AllocationError, ConfigError, LifecycleError, ProcessorError, SinkError};
pub use pool::{BufferHandle, BufferPool};
pub use processor::{Processor, StatsSnapshot};
pub use queue::{trigger_queue, QueueConsumer, QueueProducer};
pub use sink::{CsvSink, NullSink, WindowSink};
pub use state_machine::ProcessorState;
pub use trigger::TriggerSearch;
