use criterion::{criterion_group, criterion_main, Criterion};
use stagecast::line_protocol::{BuildDims, JobMetric, SchemaVersion, StageMetric};
use std::hint::black_box;

fn dims() -> BuildDims<'static> {
    BuildDims {
        job_name: "web-app pipeline",
        owner: "acme",
        repo: "web-app",
        branch: "feature/login",
        build_url: "https://ci.example.com/job/web-app/42",
        build_number: 42,
        trigger: "push by octocat",
    }
}

fn bench_stage_lines(c: &mut Criterion) {
    let metric = StageMetric {
        build: dims(),
        stage_name: "Unit Tests",
        result: "CompletedSuccess",
        stage_time: 12_345,
        passed: 1,
    };

    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let encoder = version.encoder();
        c.bench_function(&format!("stage line {:?}", version), |b| {
            b.iter(|| encoder.stage_line(black_box(&metric)))
        });
    }
}

fn bench_job_lines(c: &mut Criterion) {
    let metric = JobMetric {
        build: dims(),
        result: "CompletedError",
        blocked: 1,
        job_time: 600_000,
        blocked_time: 4_200,
        passed: 0,
    };

    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let encoder = version.encoder();
        c.bench_function(&format!("job line {:?}", version), |b| {
            b.iter(|| encoder.job_line(black_box(&metric)))
        });
    }
}

criterion_group!(benches, bench_stage_lines, bench_job_lines);
criterion_main!(benches);
