// tests/integration/reload_test.rs

//! Hot reload of the configuration file.

use super::test_helpers::{DEFAULT_ROUTE_TOML, TestContext};
use spinelproxy::core::protocol::RespFrame;
use spinelproxy::core::tasks::config_reloader::ConfigReloaderTask;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

const RELOADED_TOML: &str = r#"
[[auth.users]]
username = "dana"
password = "dana-pass"
tenant_id = 9

[[routes]]
resource = { type = "standalone", addr = "redis://10.0.0.9:6379" }

[[routes]]
tenant_id = 9
resource = { type = "standalone", addr = "redis://10.0.9.1:6379" }
"#;

/// Rewrites the file and pushes its mtime forward so the change is seen even
/// on filesystems with coarse timestamps.
fn rewrite(path: &Path, contents: &str, bump: u64) {
    fs::write(path, contents).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(bump))
        .unwrap();
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_unchanged_file_is_not_reloaded() {
    let ctx = TestContext::new();
    let file = config_file(DEFAULT_ROUTE_TOML);
    let mut task = ConfigReloaderTask::new(
        ctx.state.clone(),
        file.path().to_string_lossy().into_owned(),
        Duration::from_secs(1),
    );

    assert_eq!(task.check_once().await, None);
    assert_eq!(ctx.state.routes.version(), 1);
}

#[tokio::test]
async fn test_changed_file_installs_routes_and_users() {
    let ctx = TestContext::new();
    let file = config_file(DEFAULT_ROUTE_TOML);
    let mut task = ConfigReloaderTask::new(
        ctx.state.clone(),
        file.path().to_string_lossy().into_owned(),
        Duration::from_secs(1),
    );

    rewrite(file.path(), RELOADED_TOML, 10);
    assert_eq!(task.check_once().await, Some(2));
    // A second check without another change does nothing.
    assert_eq!(task.check_once().await, None);

    // The reloaded users require auth from now on.
    let mut session = ctx.session();
    assert_eq!(
        ctx.exec(&mut session, &["AUTH", "dana", "dana-pass"]).await,
        RespFrame::ok()
    );
    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.pool.addrs(), vec!["10.0.9.1:6379"]);
}

#[tokio::test]
async fn test_invalid_file_keeps_the_running_config() {
    let ctx = TestContext::new();
    let file = config_file(DEFAULT_ROUTE_TOML);
    let mut task = ConfigReloaderTask::new(
        ctx.state.clone(),
        file.path().to_string_lossy().into_owned(),
        Duration::from_secs(1),
    );

    rewrite(file.path(), "[[routes]\nthis is not toml", 10);
    assert_eq!(task.check_once().await, None);

    // Duplicate routes parse but fail validation.
    let duplicated = format!("{DEFAULT_ROUTE_TOML}{DEFAULT_ROUTE_TOML}");
    rewrite(file.path(), &duplicated, 20);
    assert_eq!(task.check_once().await, None);

    assert_eq!(ctx.state.routes.version(), 1);
    let mut session = ctx.session();
    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.pool.addrs(), vec!["10.0.0.1:6379"]);
}

#[tokio::test]
async fn test_missing_file_is_ignored() {
    let ctx = TestContext::new();
    let file = config_file(DEFAULT_ROUTE_TOML);
    let path = file.path().to_string_lossy().into_owned();
    let mut task = ConfigReloaderTask::new(ctx.state.clone(), path, Duration::from_secs(1));

    file.close().unwrap();
    assert_eq!(task.check_once().await, None);
    assert_eq!(ctx.state.routes.version(), 1);
}

#[tokio::test]
async fn test_reloader_stops_on_shutdown() {
    let ctx = TestContext::new();
    let file = config_file(DEFAULT_ROUTE_TOML);
    let task = ConfigReloaderTask::new(
        ctx.state.clone(),
        file.path().to_string_lossy().into_owned(),
        Duration::from_millis(20),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(task.run(shutdown_rx));

    rewrite(file.path(), RELOADED_TOML, 10);
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.state.routes.version() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the reloader should pick up the change");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
