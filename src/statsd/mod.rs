//! UDP metrics transport: a buffered StatsD client and its self-refreshing wrapper.

pub mod client;
pub mod resilient;

pub use client::{MetricsClient, StatsdClient};
pub use resilient::{ClientFactory, ResilientSinkClient};
