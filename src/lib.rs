pub mod config;
pub mod constants;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod line_protocol;
pub mod logging;
pub mod registry;
pub mod sinks;
pub mod state;
pub mod statsd;
pub mod tracker;
pub mod transport;

pub use error::{NotifyError, Result};
pub use hub::NotifierHub;
pub use registry::{DispatchReport, SinkRegistry};
pub use sinks::SinkAdapter;
pub use state::{BuildInfo, BuildState, JobCompletion, JobFinalResult, RepoRef, StageRecord};
pub use tracker::{BuildEventListener, BuildStatusSession};
