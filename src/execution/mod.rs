//! Command execution and pipeline running

pub mod buffer;
pub mod cancel;
pub mod engine;
pub mod executor;
pub mod fork;
pub mod result;
pub mod streaming;

pub use buffer::OutputBuffer;
pub use cancel::{Armed, CancelToken, Interrupter};
pub use engine::{AutoConfirm, Confirm, EventHandler, PipelineRunner, RunEvent};
pub use executor::{Executor, RunOptions};
pub use fork::{find_fork_log, fork_finished, list_fork_logs, read_fork_log, ForkHandle, ForkLogSummary, ForkStatus};
pub use result::{ExecutionResult, Termination, CANCELLED_EXIT_CODE, TIMEOUT_EXIT_CODE};
pub use streaming::{NoopSink, OutputSink, StreamKind};
