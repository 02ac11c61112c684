//! Configuration file to running client

use std::collections::HashMap;

use branches_client::{ApiClient, ClientSettings};
use branches_config::{API_URL_ENV, BranchesConfig};
use branches_core::{FileTokenStore, SessionController, TokenStore};
use branches_types::SessionStatus;
use serde_json::json;
use wiremock::MockServer;

use crate::common::{mount_boards, mount_health, mount_me, settle, token};

fn lookup(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    move |name| map.get(name).cloned()
}

fn client_from(config: Option<&BranchesConfig>, env: &[(&str, String)]) -> (ApiClient, FileTokenStore) {
    let settings = BranchesConfig::settings_with(config, lookup(env));
    let api = ApiClient::new(ClientSettings {
        base_url: settings.base_url,
        connect_timeout: settings.connect_timeout,
        request_timeout: settings.request_timeout,
    })
    .unwrap();
    let store = FileTokenStore::new(settings.token_path.expect("token path configured"));
    (api, store)
}

#[tokio::test]
async fn configured_server_and_token_path_are_used() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_me(&server, "tok-1", "test@example.com").await;
    mount_boards(&server, json!([])).await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[api]\nbase_url = \"{}/\"\nrequest_timeout_secs = 5\n\n[session]\ntoken_path = \"${{STATE}}/token\"\n",
            server.uri()
        ),
    )
    .unwrap();
    let config = BranchesConfig::load_from(&config_path).unwrap().unwrap();

    let env = [("STATE", dir.path().display().to_string())];
    let (api, store) = client_from(Some(&config), &env);
    assert_eq!(api.base_url(), server.uri());
    assert_eq!(store.path(), dir.path().join("token"));
    store.save(&token("tok-1")).unwrap();

    let mut controller = SessionController::new(api, store);
    assert_eq!(controller.start().unwrap(), SessionStatus::Authenticating);
    settle(&mut controller).await;
    assert_eq!(controller.session().user_email(), Some("test@example.com"));
}

#[tokio::test]
async fn environment_overrides_configured_server() {
    let server = MockServer::start().await;
    mount_health(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[api]\nbase_url = \"http://127.0.0.1:9\"\n\n[session]\ntoken_path = \"{}\"\n",
            dir.path().join("token").display()
        ),
    )
    .unwrap();
    let config = BranchesConfig::load_from(&config_path).unwrap().unwrap();

    let (api, store) = client_from(Some(&config), &[(API_URL_ENV, server.uri())]);
    let mut controller = SessionController::new(api, store);
    controller.start().unwrap();
    settle(&mut controller).await;

    assert_eq!(
        controller.backend_status(),
        branches_types::BackendStatus::Ok
    );
}
