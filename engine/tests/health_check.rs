//! Black-box end-to-end specs for the `omni-engine` CLI binary: bootstrap,
//! `/health`, `/config`, and a workspace-scan warm-up round trip, the way
//! the lineage's `tests/specs.rs` drives its CLI binaries directly rather
//! than calling library code in-process.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

struct EngineProcess {
    child: Child,
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Picks an ephemeral message port such that `port + 1` (the health port)
/// is also free, releasing both listeners before the child binds them.
/// Small race in theory; in practice stable enough for CI.
fn free_port_pair() -> u16 {
    loop {
        let message = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = message.local_addr().unwrap().port();
        if let Ok(health) = TcpListener::bind(("127.0.0.1", port + 1)) {
            drop(message);
            drop(health);
            return port;
        }
    }
}

fn spawn_demo(port: u16, workspace: Option<&std::path::Path>) -> EngineProcess {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_omni-engine"));
    cmd.arg("--port").arg(port.to_string()).arg("demo");
    if let Some(workspace) = workspace {
        cmd.arg("--workspace").arg(workspace);
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    EngineProcess { child: cmd.spawn().expect("failed to spawn omni-engine") }
}

async fn wait_for_health(port: u16) -> serde_json::Value {
    let url = format!("http://127.0.0.1:{}/health", port + 1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(response) = reqwest::get(&url).await {
            if let Ok(body) = response.json::<serde_json::Value>().await {
                return body;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("omni-engine never became healthy on port {port}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn demo_mode_boots_and_reports_healthy() {
    let port = free_port_pair();
    let _engine = spawn_demo(port, None);

    let health = wait_for_health(port).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["agents"].as_array().is_some_and(|agents| !agents.is_empty()));
}

#[tokio::test]
async fn config_endpoint_never_exposes_secrets() {
    let port = free_port_pair();
    let _engine = spawn_demo(port, None);
    wait_for_health(port).await;

    let url = format!("http://127.0.0.1:{}/config", port + 1);
    let body = reqwest::get(&url).await.unwrap().json::<serde_json::Value>().await.unwrap();
    assert!(body.get("apiKey").is_none());
    assert!(body.get("host").is_some());
}

#[tokio::test]
async fn demo_workspace_warm_up_scan_completes_before_serving() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("app.py"), "api_key = \"sk-abcdefgh12345678\"\n").unwrap();

    let port = free_port_pair();
    let _engine = spawn_demo(port, Some(tmp.path()));

    // The warm-up scan runs before the listener binds, so a successful
    // health response implies the scan already completed.
    let health = wait_for_health(port).await;
    assert_eq!(health["status"], "healthy");
}
