use std::io;
/// Structured logging utilities for stagecast
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stagecast=info"));

    let registry = Registry::default().with(env_filter);

    if json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::NONE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

#[macro_export]
macro_rules! log_sink_failure {
    ($sink:expr, $event:expr, $err:expr, $transient:expr) => {
        tracing::warn!(
            sink = $sink,
            event = %$event,
            error = %$err,
            transient = $transient,
            "Notification delivery failed"
        );
    };
}

#[macro_export]
macro_rules! log_sink_delivered {
    ($sink:expr, $event:expr) => {
        tracing::debug!(sink = $sink, event = %$event, "Notification delivered");
    };
}

#[macro_export]
macro_rules! log_client_swap {
    ($target:expr) => {
        tracing::debug!(target_addr = %$target, "UDP metrics client refreshed");
    };
}

/// Event summaries attached to delivery logs
#[derive(Debug, Clone)]
pub enum DeliveryEvent<'a> {
    Stage { name: &'a str, state: &'a str },
    JobFinal { state: &'a str },
    OutOfStageError { name: &'a str },
}

impl std::fmt::Display for DeliveryEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage { name, state } => write!(f, "stage '{}' -> {}", name, state),
            Self::JobFinal { state } => write!(f, "job final -> {}", state),
            Self::OutOfStageError { name } => write!(f, "out-of-stage error '{}'", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_event_display() {
        let event = DeliveryEvent::Stage {
            name: "Build",
            state: "CompletedSuccess",
        };
        assert_eq!(event.to_string(), "stage 'Build' -> CompletedSuccess");

        let event = DeliveryEvent::JobFinal {
            state: "CompletedError",
        };
        assert!(event.to_string().contains("CompletedError"));

        let event = DeliveryEvent::OutOfStageError { name: "checkout" };
        assert!(event.to_string().contains("checkout"));
    }
}
