//! Ordered fan-out to attached sinks.
//!
//! Each sink call is isolated: an error or a panic in one sink is logged and
//! the next sink still gets the event.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{is_transient, Result};
use crate::logging::DeliveryEvent;
use crate::sinks::SinkAdapter;
use crate::state::{BuildInfo, JobFinalResult, StageRecord};
use crate::{log_sink_delivered, log_sink_failure};

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl std::ops::AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Identity comparison on the data pointer; vtables may differ per codegen unit.
pub fn same_sink(a: &Arc<dyn SinkAdapter>, b: &Arc<dyn SinkAdapter>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Arc<dyn SinkAdapter>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sink: &Arc<dyn SinkAdapter>) -> bool {
        self.sinks.iter().any(|s| same_sink(s, sink))
    }

    /// Append an enabled sink. Returns false for disabled or already-registered sinks.
    pub fn register(&mut self, sink: Arc<dyn SinkAdapter>) -> bool {
        if !sink.enabled() || self.contains(&sink) {
            return false;
        }
        self.sinks.push(sink);
        true
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn dispatch_stage(&self, build: &BuildInfo, stage: &StageRecord) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in &self.sinks {
            report.record(deliver_stage(sink.as_ref(), build, stage));
        }
        report
    }

    /// Only sinks that opted into out-of-stage errors see these.
    pub fn dispatch_out_of_stage(&self, build: &BuildInfo, stage: &StageRecord) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in self.sinks.iter().filter(|s| s.wants_out_of_stage_errors()) {
            let event = DeliveryEvent::OutOfStageError { name: &stage.name };
            report.record(guarded(sink.name(), event, || {
                sink.on_stage_event(build, stage)
            }));
        }
        report
    }

    pub fn dispatch_job_final(
        &self,
        build: &BuildInfo,
        result: &JobFinalResult,
        stages: &[StageRecord],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in &self.sinks {
            let event = DeliveryEvent::JobFinal {
                state: result.state.as_str(),
            };
            report.record(guarded(sink.name(), event, || {
                sink.on_job_final(build, result, stages)
            }));
        }
        report
    }
}

/// Deliver one stage event to one sink with failure isolation.
pub fn deliver_stage(sink: &dyn SinkAdapter, build: &BuildInfo, stage: &StageRecord) -> bool {
    let event = DeliveryEvent::Stage {
        name: &stage.name,
        state: stage.state.as_str(),
    };
    guarded(sink.name(), event, || sink.on_stage_event(build, stage))
}

fn guarded<F>(sink: &str, event: DeliveryEvent<'_>, f: F) -> bool
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {
            log_sink_delivered!(sink, event);
            true
        }
        Ok(Err(e)) => {
            log_sink_failure!(sink, event, e, is_transient(&e));
            false
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            log_sink_failure!(sink, event, reason, false);
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BuildState;

    struct Inert;

    impl SinkAdapter for Inert {
        fn name(&self) -> &str {
            "inert"
        }
        fn enabled(&self) -> bool {
            false
        }
        fn on_stage_event(&self, _: &BuildInfo, _: &StageRecord) -> Result<()> {
            Ok(())
        }
        fn on_job_final(&self, _: &BuildInfo, _: &JobFinalResult, _: &[StageRecord]) -> Result<()> {
            Ok(())
        }
    }

    struct Panicky;

    impl SinkAdapter for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn enabled(&self) -> bool {
            true
        }
        fn on_stage_event(&self, _: &BuildInfo, _: &StageRecord) -> Result<()> {
            panic!("backend exploded")
        }
        fn on_job_final(&self, _: &BuildInfo, _: &JobFinalResult, _: &[StageRecord]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_disabled_sink_is_not_registered() {
        let mut registry = SinkRegistry::new();
        assert!(!registry.register(Arc::new(Inert)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = SinkRegistry::new();
        let sink: Arc<dyn SinkAdapter> = Arc::new(Panicky);
        assert!(registry.register(sink.clone()));
        assert!(!registry.register(sink));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["panicky".to_string()]);
    }

    #[test]
    fn test_panic_is_contained() {
        let mut registry = SinkRegistry::new();
        registry.register(Arc::new(Panicky));
        let stage = StageRecord::new("Build", BuildState::CompletedSuccess, 1);
        let report = registry.dispatch_stage(&BuildInfo::default(), &stage);
        assert_eq!(report, DispatchReport { delivered: 0, failed: 1 });
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: bang");
    }
}
