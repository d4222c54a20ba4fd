mod utils;
use utils::*;

use serde_json::json;
use std::time::Duration;
use tensorbench::prelude::*;
use tensorbench_runtime::{BenchRuntime, HttpGateway};

fn payload(model: ModelSpec) -> PredictRequest {
    PredictRequest::from_json(
        model,
        &json!({
            "x": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            "ids": [1, 2, 3],
        }),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn every_run_succeeds() {
    let addr = init().await;

    let mut summary = BenchmarkRequest::new(&addr.to_string(), payload(ModelSpec::new("mnist")))
        .runs(400)
        .clients(4)
        .concurrency(8)
        .run(HttpGateway::new())
        .unwrap();

    let mut progress = vec![];
    while let Some(event) = summary.recv().await {
        match event {
            RunEvent::Progress(pct) => progress.push(pct),
            RunEvent::Done => break,
        }
    }

    assert_eq!(progress.last(), Some(&100.));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    let outcome = summary.outcome().unwrap();
    assert_eq!(outcome.runs(), 400);
    assert_eq!(outcome.errors, 0, "{:?}", outcome.failed().next());
    assert!(outcome.connection_failures.is_empty());

    let report = outcome.report();
    assert_eq!(report.runs, 400);
    assert!(report.rps > 0.);
    assert!(report.latency_p50 > Duration::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn versioned_model_with_signature() {
    let addr = init().await;

    let model = ModelSpec::new("mnist")
        .version(2)
        .signature_name("predict_images");
    let mut summary = BenchmarkRequest::new(&format!("http://{addr}"), payload(model))
        .runs(20)
        .concurrency(4)
        .run(HttpGateway::new())
        .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.runs(), 20);
    assert_eq!(outcome.errors, 0, "{:?}", outcome.failed().next());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn failing_model_records_errors() {
    let addr = init().await;

    let mut summary = BenchmarkRequest::new(&addr.to_string(), payload(ModelSpec::new("failing")))
        .runs(50)
        .clients(2)
        .concurrency(4)
        .run(HttpGateway::new())
        .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.runs(), 50);
    assert_eq!(outcome.errors, 50);
    for result in &outcome.results {
        let message = result.error_message();
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("Model failed to run"), "{message}");
    }
    assert_eq!(summary.errors(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn slow_model_times_out() {
    let addr = init().await;

    let mut summary =
        BenchmarkRequest::new(&addr.to_string(), payload(ModelSpec::new("delay-2000")))
            .runs(8)
            .concurrency(8)
            .max_timeout(Duration::from_millis(100))
            .run(HttpGateway::new())
            .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.errors, 8);
    for result in &outcome.results {
        assert!(result.error_message().contains("deadline"), "{result:?}");
        assert!(result.elapsed < Duration::from_secs(2));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn rejected_calls_are_recorded() {
    let addr = init().await;

    let mut summary = BenchmarkRequest::new(&addr.to_string(), payload(ModelSpec::new("max-5")))
        .runs(60)
        .clients(2)
        .concurrency(8)
        .run(HttpGateway::new())
        .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.runs(), 60);
    assert!(outcome.errors > 0);
    assert!(outcome.errors < 60, "no call got through");
    for result in outcome.failed() {
        let message = result.error_message();
        assert!(message.contains("503"), "{message}");
        assert!(message.contains("Too many requests"), "{message}");
    }
    assert_eq!(outcome.report().errors, outcome.errors);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn throttled_model_slows_the_run() {
    let addr = init().await;

    let mut summary =
        BenchmarkRequest::new(&addr.to_string(), payload(ModelSpec::new("limited-50")))
            .runs(100)
            .concurrency(10)
            .run(HttpGateway::new())
            .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.runs(), 100);
    assert_eq!(outcome.errors, 0);
    // The first 50 calls use the burst, the rest are paced at 50 per second.
    assert!(
        outcome.elapsed >= Duration::from_millis(500),
        "{:?}",
        outcome.elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn unreachable_host_fails_every_client() {
    let _ = init().await;

    let gateway = HttpGateway::new().dial_timeout(Duration::from_secs(2));
    let mut summary = BenchmarkRequest::new("127.0.0.1:9", payload(ModelSpec::new("mnist")))
        .runs(10)
        .clients(2)
        .run(gateway)
        .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.runs(), 0);
    assert_eq!(outcome.connection_failures.len(), 2);

    let report = outcome.report();
    assert_eq!(report.failed_clients, 2);
    assert_eq!(report.missing_runs, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn runtime_end_to_end() {
    let addr = init().await;

    let input = std::env::temp_dir().join(format!("tensorbench-e2e-{}.json", std::process::id()));
    tokio::fs::write(&input, r#"{ "x": [[0.1, 0.2, 0.3]] }"#)
        .await
        .unwrap();

    let report = BenchRuntime::new()
        .host(&addr.to_string())
        .model(ModelSpec::new("half_plus_two"))
        .input(&input)
        .json(true)
        .run()
        .await;
    tokio::fs::remove_file(&input).await.unwrap();

    let report = report.unwrap();
    assert_eq!(report.runs, 1_000);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn runtime_rejects_bad_payload() {
    let addr = init().await;

    let input = std::env::temp_dir().join(format!("tensorbench-ragged-{}.json", std::process::id()));
    tokio::fs::write(&input, r#"{ "x": [[1.0, 2.0], [3.0]] }"#)
        .await
        .unwrap();

    let res = BenchRuntime::new()
        .host(&addr.to_string())
        .input(&input)
        .run()
        .await;
    tokio::fs::remove_file(&input).await.unwrap();

    assert!(matches!(
        res,
        Err(tensorbench_runtime::RuntimeError::Encode(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn integer_first_image_is_sent_as_floats() {
    let addr = init().await;

    let request = PredictRequest::from_json(
        ModelSpec::new("mnist"),
        &json!({ "images": [[0, 0.5], [1, 0.25]] }),
    )
    .unwrap();
    let mut summary = BenchmarkRequest::new(&addr.to_string(), request)
        .runs(10)
        .run(HttpGateway::new())
        .unwrap();

    let outcome = summary.wait().await.unwrap();
    assert_eq!(outcome.errors, 0, "{:?}", outcome.failed().next());
}
