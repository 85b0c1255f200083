//! Gateway tests grouped by protocol behavior, driven over a spawned
//! ephemeral server.

use super::*;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::tempdir;

use sitex_runtime::{
    load_operation_record, FsExtensionManager, OperationKind, SiteExtensionDescriptor,
    SiteExtensionError,
};

async fn spawn_test_server(
    config: SiteExtensionServerConfig,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let state = Arc::new(SiteExtensionServerState::new(&config));
    let app = build_site_extension_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

fn write_feed_entry(feed_root: &Path, id: &str, version: &str) {
    std::fs::create_dir_all(feed_root).expect("create feed root");
    let body = json!({
        "id": id,
        "title": format!("{id} extension"),
        "version": version,
    });
    std::fs::write(
        feed_root.join(format!("{id}.json")),
        serde_json::to_string_pretty(&body).expect("encode feed entry"),
    )
    .expect("write feed entry");
}

fn fs_config(root: &Path, bind: &str) -> SiteExtensionServerConfig {
    SiteExtensionServerConfig {
        bind: bind.to_string(),
        manager: Arc::new(FsExtensionManager::new(
            root.join("feed"),
            root.join("extensions"),
        )),
        settings_root: root.join("settings"),
    }
}

async fn poll_until<F>(
    client: &Client,
    url: &str,
    description: &str,
    mut accept: F,
) -> reqwest::Response
where
    F: FnMut(&reqwest::Response) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = client
            .get(url)
            .header(PREFER_HEADER, PREFER_RESPOND_ASYNC)
            .send()
            .await
            .expect("poll request");
        if accept(&response) {
            return response;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {description}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[test]
fn unit_request_mode_parses_prefer_header_tokens() {
    let mut headers = HeaderMap::new();
    assert_eq!(request_mode(&headers), RequestMode::Sync);

    headers.insert(PREFER_HEADER, HeaderValue::from_static("respond-async"));
    assert_eq!(request_mode(&headers), RequestMode::Async);

    headers.insert(
        PREFER_HEADER,
        HeaderValue::from_static("wait=10, RESPOND-ASYNC"),
    );
    assert_eq!(request_mode(&headers), RequestMode::Async);

    headers.insert(PREFER_HEADER, HeaderValue::from_static("wait=10"));
    assert_eq!(request_mode(&headers), RequestMode::Sync);
}

#[tokio::test]
async fn integration_async_install_acknowledges_then_first_poll_carries_restart_header() {
    let temp = tempdir().expect("tempdir");
    write_feed_entry(&temp.path().join("feed"), "logstream", "1.0.0");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();
    let url = format!("http://{addr}/api/siteextensions/logstream");

    let ack = client
        .put(&url)
        .header(PREFER_HEADER, PREFER_RESPOND_ASYNC)
        .json(&json!({"version": "1.0.0"}))
        .send()
        .await
        .expect("install request");
    assert_eq!(ack.status(), reqwest::StatusCode::CREATED);
    let body: Value = ack.json().await.expect("ack body");
    assert_eq!(body["id"], "logstream");
    assert_eq!(body["provisioningState"], "Created");

    let first_success = poll_until(&client, &url, "restart notification", |response| {
        response.headers().contains_key(SITE_OPERATION_HEADER)
    })
    .await;
    assert_eq!(first_success.status(), reqwest::StatusCode::OK);
    assert_eq!(
        first_success
            .headers()
            .get(SITE_OPERATION_HEADER)
            .and_then(|value| value.to_str().ok()),
        Some(SITE_OPERATION_RESTART)
    );
    let body: Value = first_success.json().await.expect("poll body");
    assert_eq!(body["provisioningState"], "Succeeded");

    // Notification is delivered exactly once.
    let second = client
        .get(&url)
        .header(PREFER_HEADER, PREFER_RESPOND_ASYNC)
        .send()
        .await
        .expect("second poll");
    assert_eq!(second.status(), reqwest::StatusCode::OK);
    assert!(!second.headers().contains_key(SITE_OPERATION_HEADER));

    let record = load_operation_record(&temp.path().join("settings"), "logstream")
        .expect("load record")
        .expect("record persists after install");
    assert!(record.operation.is_none());
}

#[tokio::test]
async fn integration_async_uninstall_drains_record_then_reports_not_found() {
    let temp = tempdir().expect("tempdir");
    write_feed_entry(&temp.path().join("feed"), "logstream", "1.0.0");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();
    let url = format!("http://{addr}/api/siteextensions/logstream");

    // Seed an installed extension synchronously.
    let installed = client
        .put(&url)
        .json(&json!({"version": "1.0.0"}))
        .send()
        .await
        .expect("sync install");
    assert_eq!(installed.status(), reqwest::StatusCode::OK);

    let ack = client
        .delete(&url)
        .header(PREFER_HEADER, PREFER_RESPOND_ASYNC)
        .send()
        .await
        .expect("uninstall request");
    assert_eq!(ack.status(), reqwest::StatusCode::ACCEPTED);

    // The first terminal poll returns the success record and deletes it, so
    // draining ends at a plain not-found read of the removed extension.
    let gone = poll_until(&client, &url, "record drained", |response| {
        response.status() == reqwest::StatusCode::NOT_FOUND
    })
    .await;
    let body: Value = gone.json().await.expect("gone body");
    assert_eq!(body["id"], "logstream");

    assert!(load_operation_record(&temp.path().join("settings"), "logstream")
        .expect("load record")
        .is_none());
    assert!(!temp.path().join("extensions").join("logstream").exists());
}

struct FailingInstallManager;

#[async_trait]
impl SiteExtensionManager for FailingInstallManager {
    async fn get_remote_extensions(
        &self,
        _filter: Option<&str>,
        _allow_prerelease: bool,
        _feed_url: Option<&str>,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError> {
        Ok(Vec::new())
    }

    async fn get_remote_extension(
        &self,
        _id: &str,
        _version: Option<&str>,
        _feed_url: Option<&str>,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError> {
        Ok(None)
    }

    async fn get_local_extensions(
        &self,
        _filter: Option<&str>,
        _check_latest: bool,
    ) -> Result<Vec<SiteExtensionDescriptor>, SiteExtensionError> {
        Ok(Vec::new())
    }

    async fn get_local_extension(
        &self,
        _id: &str,
        _check_latest: bool,
    ) -> Result<Option<SiteExtensionDescriptor>, SiteExtensionError> {
        Ok(None)
    }

    async fn install_extension(
        &self,
        _id: &str,
        _version: Option<&str>,
        _feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        Err(SiteExtensionError::InvalidRequest(
            "download error".to_string(),
        ))
    }

    async fn uninstall_extension(&self, id: &str) -> Result<bool, SiteExtensionError> {
        Err(SiteExtensionError::NotFound { id: id.to_string() })
    }

    async fn init_install_descriptor(
        &self,
        id: &str,
        version: Option<&str>,
        _feed_url: Option<&str>,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        Ok(SiteExtensionDescriptor {
            version: version.map(str::to_string),
            ..SiteExtensionDescriptor::empty(id)
        })
    }

    async fn init_uninstall_descriptor(
        &self,
        id: &str,
    ) -> Result<SiteExtensionDescriptor, SiteExtensionError> {
        Ok(SiteExtensionDescriptor::empty(id))
    }
}

#[tokio::test]
async fn integration_failed_async_install_surfaces_comment_and_keeps_record() {
    let temp = tempdir().expect("tempdir");
    let config = SiteExtensionServerConfig {
        bind: "127.0.0.1:0".to_string(),
        manager: Arc::new(FailingInstallManager),
        settings_root: temp.path().join("settings"),
    };
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();
    let url = format!("http://{addr}/api/siteextensions/logstream");

    let ack = client
        .put(&url)
        .header(PREFER_HEADER, PREFER_RESPOND_ASYNC)
        .json(&json!({"version": "1.0.0"}))
        .send()
        .await
        .expect("install request");
    assert_eq!(ack.status(), reqwest::StatusCode::CREATED);

    let failed = poll_until(&client, &url, "failed install", |response| {
        response.status() == reqwest::StatusCode::BAD_REQUEST
    })
    .await;
    let body: Value = failed.json().await.expect("failure body");
    assert_eq!(body["provisioningState"], "Failed");
    assert!(body["comment"]
        .as_str()
        .expect("failure comment")
        .contains("download error"));

    let record = load_operation_record(&temp.path().join("settings"), "logstream")
        .expect("load record")
        .expect("failed record is kept for diagnosis");
    assert_eq!(record.operation, Some(OperationKind::Install));
    assert_eq!(record.status, 400);
}

#[tokio::test]
async fn functional_sync_install_blocks_until_succeeded() {
    let temp = tempdir().expect("tempdir");
    write_feed_entry(&temp.path().join("feed"), "logstream", "1.0.0");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();

    let response = client
        .put(format!("http://{addr}/api/siteextensions/logstream"))
        .json(&json!({"version": "1.0.0"}))
        .send()
        .await
        .expect("sync install");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["provisioningState"], "Succeeded");
    assert_eq!(body["version"], "1.0.0");
}

#[tokio::test]
async fn functional_sync_uninstall_returns_boolean_success() {
    let temp = tempdir().expect("tempdir");
    write_feed_entry(&temp.path().join("feed"), "logstream", "1.0.0");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();
    let url = format!("http://{addr}/api/siteextensions/logstream");

    client
        .put(&url)
        .json(&json!({}))
        .send()
        .await
        .expect("seed install");

    let response = client.delete(&url).send().await.expect("sync uninstall");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body, Value::Bool(true));
}

#[tokio::test]
async fn functional_feed_endpoints_list_and_miss() {
    let temp = tempdir().expect("tempdir");
    write_feed_entry(&temp.path().join("feed"), "logstream", "1.0.0");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();

    let listing = client
        .get(format!("http://{addr}/api/extensionfeed?filter=log"))
        .send()
        .await
        .expect("feed list");
    assert_eq!(listing.status(), reqwest::StatusCode::OK);
    let body: Value = listing.json().await.expect("list body");
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let missing = client
        .get(format!("http://{addr}/api/extensionfeed/ghost"))
        .send()
        .await
        .expect("feed miss");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.expect("miss body");
    assert_eq!(body["error"]["code"], "extension_not_found");
}

#[tokio::test]
async fn regression_sync_read_of_missing_extension_uses_error_envelope() {
    let temp = tempdir().expect("tempdir");
    let config = fs_config(temp.path(), "127.0.0.1:0");
    let (addr, _server) = spawn_test_server(config).await.expect("server");
    let client = Client::new();

    let response = client
        .get(format!("http://{addr}/api/siteextensions/ghost"))
        .send()
        .await
        .expect("sync read");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["error"]["code"], "extension_not_found");
}
