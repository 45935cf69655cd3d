//! End-to-end tests: the real router on a loopback listener, driven by the real client
//!
//! Every test binds `127.0.0.1:0`, so they run in parallel without port clashes
//! and never leave the machine.

use network_speed_tester::{
    client::{HttpClient, NetworkClient, TerminalReason},
    executor::{SessionContext, TestRunner},
    models::{Config, MeasurementRun},
    server::SpeedTestServer,
    store::{FileResultStore, MemoryResultStore, ResultStore},
    realtime::UdpEchoEndpoint,
    types::{SubTest, TestStatus},
    AppError,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base: String,
    store: Arc<dyn ResultStore>,
    _stop: oneshot::Sender<()>,
}

async fn spawn_server(store: Arc<dyn ResultStore>) -> TestServer {
    let mut config = Config::default();
    config.server_host = "127.0.0.1".to_string();
    config.static_dir = "no-such-static-dir".into();
    config.max_download_mb = 8;

    let echo = Arc::new(UdpEchoEndpoint::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        None,
        None,
        Duration::from_secs(5),
    ));
    let server = SpeedTestServer::from_parts(config, store.clone(), echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    TestServer { base, store, _stop: tx }
}

/// Client settings small enough for a test run to finish in about a second
fn client_config(base: &str) -> Config {
    let mut config = Config::default();
    config.server_url = base.to_string();
    config.latency_probes = 3;
    config.probe_gap_ms = 5;
    config.download_size_mb = 2;
    config.upload_size_mb = 1;
    config.packet_count = 20;
    config.packet_interval_ms = 5;
    config.drain_grace_ms = 500;
    config.timeout_seconds = 10;
    config
}

fn runner_for(config: Config) -> (TestRunner, Arc<NetworkClient>) {
    let client = Arc::new(NetworkClient::from_config(&config).unwrap());
    let runner = TestRunner::new(Arc::new(config), client.clone(), Arc::new(SessionContext::new()));
    (runner, client)
}

#[tokio::test]
async fn test_full_run_measures_everything_and_saves() -> anyhow::Result<()> {
    let server = spawn_server(Arc::new(MemoryResultStore::new())).await;
    let (runner, client) = runner_for(client_config(&server.base));

    let report = runner.run_once().await?;

    for step in [SubTest::Latency, SubTest::Download, SubTest::Upload, SubTest::Exchange] {
        assert_eq!(report.step(step).map(|s| s.status), Some(TestStatus::Success), "{}", step);
    }
    assert_eq!(report.run.measured_count(), 5);
    assert!(report.run.download.unwrap() > 0.0);
    assert!(report.run.upload.unwrap() > 0.0);

    let loss = report.run.packet_loss.unwrap();
    assert!((0.0..=100.0).contains(&loss));

    let session = report.session.as_ref().unwrap();
    assert_eq!(session.sent, 20);
    assert!(!session.reason.is_failure());

    let id = report.saved_id.clone().expect("run should be saved");
    let link = report.share_link.clone().unwrap();
    assert!(link.ends_with(&format!("/results/{}", id)));

    let record = client.load_result(&id).await?;
    assert_eq!(record.id, id);
    assert_eq!(record.run, report.run);
    Ok(())
}

#[tokio::test]
async fn test_lossless_loopback_exchange() {
    let server = spawn_server(Arc::new(MemoryResultStore::new())).await;
    let mut config = client_config(&server.base);
    config.save_results = false;
    let (runner, _) = runner_for(config);

    let report = runner.run_once().await.unwrap();
    let session = report.session.unwrap();

    // Loopback may still drop under load; only a complete batch ends early
    if session.reason == TerminalReason::AllEchoesReceived {
        assert_eq!(session.samples_ms.len(), 20);
        assert_eq!(report.run.packet_loss, Some(0.0));
    }
    assert_eq!(session.duplicates, 0);
    assert!(report.saved_id.is_none());
}

#[tokio::test]
async fn test_history_after_repeated_runs() {
    let server = spawn_server(Arc::new(MemoryResultStore::new())).await;
    let mut config = client_config(&server.base);
    config.packet_count = 5;
    config.save_results = false;
    let (runner, _) = runner_for(config);

    let reports = runner.run(2).await.unwrap();
    let history = runner.context().history();

    assert_eq!(reports.len(), 2);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].run_id, reports[1].run_id);
    assert!(!runner.context().is_running());
}

#[tokio::test]
async fn test_file_store_persists_saved_runs() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileResultStore::open(dir.path()).await.unwrap());
    let server = spawn_server(store).await;
    let client = NetworkClient::new(&server.base, Duration::from_secs(5)).unwrap();

    let run = MeasurementRun {
        latency: Some(12.5),
        download: Some(93.2),
        upload: Some(41.0),
        jitter: None,
        packet_loss: Some(1.0),
    };
    let id = client.save_result(&run).await.unwrap();

    assert!(dir.path().join(format!("{}.json", id)).exists());
    let stored = server.store.load(&id).await.unwrap();
    assert_eq!(stored.run, run);
}

#[tokio::test]
async fn test_unknown_result_is_not_found() {
    let server = spawn_server(Arc::new(MemoryResultStore::new())).await;
    let client = NetworkClient::new(&server.base, Duration::from_secs(5)).unwrap();

    let result = client.load_result("6a0c2f0e-5b7e-4a43-9d0e-3f1b2c4d5e6f").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_server_measures_nothing() {
    // Bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = client_config(&base);
    config.latency_probes = 1;
    config.gather_timeout_secs = 1;
    let (runner, _) = runner_for(config);

    let report = runner.run_once().await.unwrap();

    assert!(!report.run.has_any_measurement());
    assert_eq!(report.step(SubTest::Latency).unwrap().status, TestStatus::TransportFailed);
    assert_eq!(report.step(SubTest::Exchange).unwrap().status, TestStatus::SetupFailed);
    assert!(report.saved_id.is_none());
    assert!(report.persist_error.is_none());
}
