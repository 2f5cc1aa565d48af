/// Session behaviour: attach-time replay, ordering, close-time flush and sink isolation
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use parking_lot::Mutex;
    use stagecast::config::GithubConfig;
    use stagecast::error::{NotifyError, Result};
    use stagecast::sinks::{SinkAdapter, SourceControlSink};
    use stagecast::transport::{HttpRequest, HttpResponse, HttpTransport};
    use stagecast::{
        BuildEventListener, BuildInfo, BuildState, BuildStatusSession, DispatchReport,
        JobCompletion, JobFinalResult, RepoRef, StageRecord,
    };

    /// Records every stage event it receives.
    struct RecordingSink {
        name: &'static str,
        enabled: bool,
        out_of_stage: bool,
        stages: Mutex<Vec<(String, BuildState, bool)>>,
        finals: Mutex<Vec<BuildState>>,
    }

    impl RecordingSink {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self::plain(name))
        }

        fn with_out_of_stage(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                out_of_stage: true,
                ..Self::plain(name)
            })
        }

        fn disabled(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                enabled: false,
                ..Self::plain(name)
            })
        }

        fn plain(name: &'static str) -> Self {
            Self {
                name,
                enabled: true,
                out_of_stage: false,
                stages: Mutex::new(Vec::new()),
                finals: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<(String, BuildState)> {
            self.stages
                .lock()
                .iter()
                .map(|(n, s, _)| (n.clone(), *s))
                .collect()
        }
    }

    impl SinkAdapter for RecordingSink {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn wants_out_of_stage_errors(&self) -> bool {
            self.out_of_stage
        }

        fn on_stage_event(&self, _build: &BuildInfo, stage: &StageRecord) -> Result<()> {
            self.stages
                .lock()
                .push((stage.name.clone(), stage.state, stage.is_stage));
            Ok(())
        }

        fn on_job_final(
            &self,
            _build: &BuildInfo,
            result: &JobFinalResult,
            _stages: &[StageRecord],
        ) -> Result<()> {
            self.finals.lock().push(result.state);
            Ok(())
        }
    }

    enum Failure {
        Error,
        Panic,
    }

    struct BrokenSink {
        failure: Failure,
        calls: AtomicUsize,
    }

    impl BrokenSink {
        fn new(failure: Failure) -> Arc<Self> {
            Arc::new(Self {
                failure,
                calls: AtomicUsize::new(0),
            })
        }

        fn fail(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failure {
                Failure::Error => Err(NotifyError::transport("broken", "connection refused")),
                Failure::Panic => panic!("sink blew up"),
            }
        }
    }

    impl SinkAdapter for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        fn enabled(&self) -> bool {
            true
        }

        fn on_stage_event(&self, _build: &BuildInfo, _stage: &StageRecord) -> Result<()> {
            self.fail()
        }

        fn on_job_final(
            &self,
            _build: &BuildInfo,
            _result: &JobFinalResult,
            _stages: &[StageRecord],
        ) -> Result<()> {
            self.fail()
        }
    }

    /// Captures every request and answers 201.
    #[derive(Default)]
    struct CapturingTransport {
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl HttpTransport for CapturingTransport {
        fn post(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().push(request.clone());
            Ok(HttpResponse {
                status: 201,
                body: String::new(),
            })
        }
    }

    fn session() -> BuildStatusSession {
        BuildStatusSession::new(BuildInfo {
            job_name: "web".to_string(),
            target_url: "https://ci.example.com/job/web/7".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "web".to_string(),
            branch: "main".to_string(),
            build_url: "https://ci.example.com/job/web/7".to_string(),
            build_number: 7,
            trigger: "push".to_string(),
        })
    }

    #[test]
    fn test_attach_replays_buffered_stages_once() {
        let session = session();
        session.record_stage("A", BuildState::Pending, 0);
        session.record_stage("B", BuildState::CompletedSuccess, 5);

        let sink = RecordingSink::new("late");
        assert!(session.attach_sink(sink.clone()));
        assert!(!session.attach_sink(sink.clone()));

        assert_eq!(
            sink.seen(),
            vec![
                ("A".to_string(), BuildState::Pending),
                ("B".to_string(), BuildState::CompletedSuccess),
            ]
        );
        assert_eq!(session.sink_count(), 1);
    }

    #[test]
    fn test_stage_order_is_first_seen_order() {
        let session = session();
        let early = RecordingSink::new("early");
        session.attach_sink(early.clone());

        for name in ["A", "B", "C"] {
            session.record_stage(name, BuildState::Pending, 0);
        }
        session.record_stage("C", BuildState::CompletedSuccess, 3);
        session.record_stage("A", BuildState::CompletedSuccess, 1);
        session.record_stage("B", BuildState::CompletedError, 2);

        let late = RecordingSink::new("late");
        session.attach_sink(late.clone());

        let replayed: Vec<String> = late.seen().into_iter().map(|(n, _)| n).collect();
        assert_eq!(replayed, vec!["A", "B", "C"]);
        let live: Vec<String> = early.seen().into_iter().map(|(n, _)| n).collect();
        assert_eq!(live, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_pending_is_never_broadcast_live() {
        let session = session();
        let sink = RecordingSink::new("live");
        session.attach_sink(sink.clone());

        let report = session.record_stage("Build", BuildState::Pending, 0);
        assert_eq!(report, DispatchReport::default());
        assert!(sink.seen().is_empty());
    }

    #[test]
    fn test_failing_sinks_do_not_block_others() {
        let session = session();
        let erroring = BrokenSink::new(Failure::Error);
        let panicking = BrokenSink::new(Failure::Panic);
        let healthy = RecordingSink::new("healthy");

        session.attach_sink(erroring.clone());
        session.attach_sink(panicking.clone());
        session.attach_sink(healthy.clone());

        let report = session.record_stage("Build", BuildState::CompletedSuccess, 10);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });

        let report = session.record_job_final(JobCompletion::new(BuildState::CompletedSuccess, 20));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });

        assert_eq!(erroring.calls.load(Ordering::SeqCst), 2);
        assert_eq!(panicking.calls.load(Ordering::SeqCst), 2);
        assert_eq!(healthy.seen().len(), 1);
        assert_eq!(*healthy.finals.lock(), vec![BuildState::CompletedSuccess]);
    }

    #[test]
    fn test_close_completes_pending_stages_with_job_state() {
        let session = session();
        let sink = RecordingSink::new("live");
        session.attach_sink(sink.clone());

        session.record_stage("Build", BuildState::CompletedSuccess, 4);
        session.record_stage("Deploy", BuildState::Pending, 0);
        session.record_job_final(JobCompletion::new(BuildState::Aborted, 50));

        assert_eq!(
            sink.seen(),
            vec![
                ("Build".to_string(), BuildState::CompletedSuccess),
                ("Deploy".to_string(), BuildState::Aborted),
            ]
        );
        assert_eq!(*sink.finals.lock(), vec![BuildState::Aborted]);
        assert_eq!(session.stage("Deploy").unwrap().state, BuildState::Aborted);
        assert!(session.is_closed());
    }

    #[test]
    fn test_changed_final_state_is_delivered_again() {
        let session = session();
        let sink = RecordingSink::new("live");
        session.attach_sink(sink.clone());

        session.record_stage("A", BuildState::CompletedSuccess, 1);
        session.record_stage("A", BuildState::CompletedError, 2);

        assert_eq!(
            sink.seen(),
            vec![
                ("A".to_string(), BuildState::CompletedSuccess),
                ("A".to_string(), BuildState::CompletedError),
            ]
        );
        assert_eq!(session.stages().len(), 1);
        assert_eq!(session.stage("A").unwrap().state, BuildState::CompletedError);
    }

    #[test]
    fn test_stage_recorded_after_close_is_delivered() {
        let session = session();
        let sink = RecordingSink::new("live");
        session.attach_sink(sink.clone());

        session.record_stage("A", BuildState::CompletedSuccess, 1);
        session.record_stage("A", BuildState::CompletedError, 2);
        session.record_job_final(JobCompletion::new(BuildState::CompletedError, 10));
        let report = session.record_stage("Late", BuildState::CompletedSuccess, 3);

        assert!(session.is_closed());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        assert_eq!(
            sink.seen(),
            vec![
                ("A".to_string(), BuildState::CompletedSuccess),
                ("A".to_string(), BuildState::CompletedError),
                ("Late".to_string(), BuildState::CompletedSuccess),
            ]
        );
        assert_eq!(*sink.finals.lock(), vec![BuildState::CompletedError]);

        let names: Vec<String> = session.stages().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A", "Late"]);
    }

    #[test]
    fn test_job_duration_excludes_blocked_time() {
        let session = session();
        let mut params = JobCompletion::new(BuildState::CompletedSuccess, 1_000);
        params.blocked_duration_millis = 250;
        session.record_job_final(params);

        let result = session.job_result().unwrap();
        assert_eq!(result.duration_millis, 750);
        assert!(result.blocked());
        assert!(result.passed());
    }

    #[test]
    fn test_out_of_stage_errors_reach_only_opted_in_sinks() {
        let session = session();
        let opted_in = RecordingSink::with_out_of_stage("scm");
        let other = RecordingSink::new("metrics");
        session.attach_sink(opted_in.clone());
        session.attach_sink(other.clone());

        let report = session.record_out_of_stage_error("Post Actions");
        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });

        let seen = opted_in.stages.lock().clone();
        assert_eq!(
            seen,
            vec![("Post Actions".to_string(), BuildState::CompletedError, false)]
        );
        assert!(other.seen().is_empty());

        let late = RecordingSink::with_out_of_stage("late");
        session.attach_sink(late.clone());
        assert!(late.seen().is_empty());
        assert!(session.stages().is_empty());
    }

    #[test]
    fn test_disabled_sinks_are_not_attached() {
        let session = session();
        session.record_stage("Build", BuildState::CompletedSuccess, 1);
        let sink = RecordingSink::disabled("off");
        assert!(!session.attach_sink(sink.clone()));
        assert!(sink.seen().is_empty());
        assert_eq!(session.sink_count(), 0);
    }

    #[test]
    fn test_listener_surface_drives_session() {
        let session = session();
        let sink = RecordingSink::new("live");
        session.attach_sink(sink.clone());

        let listener: &dyn BuildEventListener = &session;
        listener.on_stage_transition("Build", BuildState::CompletedSuccess, 3);
        listener.on_job_complete(JobCompletion::new(BuildState::CompletedSuccess, 9));

        assert_eq!(sink.seen().len(), 1);
        assert_eq!(sink.finals.lock().len(), 1);
    }

    #[test]
    fn test_concurrent_attach_sees_each_stage_once() {
        let session = Arc::new(session());
        let stages: Vec<String> = (0..50).map(|i| format!("stage-{}", i)).collect();

        let producer = {
            let session = Arc::clone(&session);
            let stages = stages.clone();
            thread::spawn(move || {
                for name in &stages {
                    session.record_stage(name, BuildState::Pending, 0);
                }
            })
        };

        let sinks: Vec<Arc<RecordingSink>> = (0..4).map(|_| RecordingSink::new("late")).collect();
        for sink in &sinks {
            session.attach_sink(sink.clone());
        }
        producer.join().unwrap();

        let late = RecordingSink::new("after");
        session.attach_sink(late.clone());
        let names: Vec<String> = late.seen().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, stages);

        for sink in &sinks {
            let seen: Vec<String> = sink.seen().into_iter().map(|(n, _)| n).collect();
            let mut deduped = seen.clone();
            deduped.dedup();
            assert_eq!(seen, deduped);
            assert!(seen.iter().all(|n| stages.contains(n)));
        }
    }

    #[test]
    fn test_commit_status_pending_then_success() {
        let transport = Arc::new(CapturingTransport::default());
        let config = GithubConfig {
            api_url: "https://api.github.test".to_string(),
            token: "secret".to_string(),
            ..GithubConfig::default()
        };
        let repo = RepoRef {
            owner: "acme".to_string(),
            name: "web".to_string(),
            sha: "abc123".to_string(),
        };

        let session = session();
        session.record_stage("Stage 1", BuildState::Pending, 0);
        session.attach_sink(Arc::new(SourceControlSink::new(
            &config,
            Some(repo),
            transport.clone(),
        )));
        session.record_stage("Stage 1", BuildState::CompletedSuccess, 12);

        let requests = transport.requests.lock().clone();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(
                request.url,
                "https://api.github.test/repos/acme/web/statuses/abc123"
            );
            assert_eq!(request.header_value("authorization"), Some("Bearer secret"));
        }

        let bodies: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect();
        assert_eq!(bodies[0]["state"], "pending");
        assert_eq!(bodies[0]["description"], "Building stage");
        assert_eq!(bodies[0]["context"], "Stage 1");
        assert_eq!(bodies[1]["state"], "success");
        assert_eq!(bodies[1]["description"], "Stage built successfully");
        assert_eq!(bodies[1]["context"], "Stage 1");
        assert_eq!(bodies[1]["target_url"], "https://ci.example.com/job/web/7");
    }
}
