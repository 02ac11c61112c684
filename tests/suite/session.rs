//! Authentication lifecycle against a mock board service

use std::time::Duration;

use branches_client::{ApiClient, ClientSettings};
use branches_core::{
    DiscardReason, FileTokenStore, MemoryTokenStore, Operation, SessionController, SignOutReason,
    StoreError, SyncError, SyncUpdate, TokenStore,
};
use branches_types::{BackendStatus, Session, SessionStatus};
use serde_json::json;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    board, controller, errors, mount_boards, mount_boards_delayed, mount_columns, mount_health,
    mount_login, mount_me, pump_until, settle, token, updates,
};

#[tokio::test]
async fn startup_without_saved_credential_is_anonymous() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut controller = controller(&server, MemoryTokenStore::new());
    assert_eq!(controller.start().unwrap(), SessionStatus::Anonymous);

    let outcomes = settle(&mut controller).await;
    assert_eq!(updates(&outcomes), [&SyncUpdate::Health(BackendStatus::Ok)]);
    assert_eq!(controller.session(), &Session::Anonymous);
    assert_eq!(controller.backend_status(), BackendStatus::Ok);
}

#[tokio::test]
async fn login_persists_credential_and_loads_boards() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_string("username=test%40example.com&password=secret123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "tok-1", "test@example.com").await;
    Mock::given(method("GET"))
        .and(path("/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryTokenStore::new();
    let mut controller = controller(&server, store.clone());
    controller.start().unwrap();
    controller.login("test@example.com", "secret123").unwrap();

    let outcomes = settle(&mut controller).await;
    assert!(errors(&outcomes).is_empty(), "{outcomes:?}");
    let updates = updates(&outcomes);
    assert!(updates.contains(&&SyncUpdate::SignedIn));
    assert!(updates.contains(&&SyncUpdate::IdentityLoaded {
        email: "test@example.com".to_string()
    }));

    assert_eq!(controller.status(), SessionStatus::Authenticated);
    assert_eq!(controller.session().token(), Some(&token("tok-1")));
    assert_eq!(controller.session().user_email(), Some("test@example.com"));
    assert_eq!(store.current(), Some(token("tok-1")));
}

#[tokio::test]
async fn failed_login_reports_detail_and_keeps_stored_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    // Never started, so the stored credential is not in use.
    let store = MemoryTokenStore::with_credential(token("tok-old"));
    let mut controller = controller(&server, store.clone());
    controller.login("test@example.com", "wrong").unwrap();

    let outcomes = settle(&mut controller).await;
    let errs = errors(&outcomes);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].operation, Operation::Login);
    assert_eq!(errs[0].to_string(), "Invalid credentials");

    assert_eq!(
        controller.session(),
        &Session::AuthError {
            message: "Invalid credentials".to_string()
        }
    );
    assert_eq!(store.current(), Some(token("tok-old")));
}

#[tokio::test]
async fn unreachable_server_during_login_uses_network_message() {
    // Pooled mock servers keep listening after drop; use a port nothing owns.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let api = ApiClient::new(ClientSettings::new(format!("http://127.0.0.1:{port}"))).unwrap();
    let mut controller = SessionController::new(api, MemoryTokenStore::new());

    controller.login("test@example.com", "secret123").unwrap();
    let outcomes = settle(&mut controller).await;

    let errs = errors(&outcomes);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].to_string(), "Network error while logging in.");
    assert_eq!(controller.status(), SessionStatus::AuthError);
}

#[tokio::test]
async fn login_can_be_retried_after_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login(&server, "tok-2").await;
    mount_me(&server, "tok-2", "test@example.com").await;
    mount_boards(&server, json!([])).await;

    let mut controller = controller(&server, MemoryTokenStore::new());
    controller.login("test@example.com", "typo").unwrap();
    let outcomes = settle(&mut controller).await;
    assert_eq!(errors(&outcomes)[0].to_string(), "Login failed");
    assert_eq!(controller.status(), SessionStatus::AuthError);

    controller.login("test@example.com", "secret123").unwrap();
    settle(&mut controller).await;
    assert_eq!(controller.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn unsaveable_credential_is_an_auth_error() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryTokenStore::new().failing_writes();
    let mut controller = controller(&server, store.clone());
    controller.login("test@example.com", "secret123").unwrap();

    let outcomes = settle(&mut controller).await;
    let errs = errors(&outcomes);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0].source, SyncError::Store(StoreError::Write { .. })));
    assert_eq!(controller.status(), SessionStatus::AuthError);
    assert!(store.current().is_none());
}

#[tokio::test]
async fn rejected_saved_credential_fails_closed() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "detail": "Could not validate credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryTokenStore::with_credential(token("tok-stale"));
    let mut controller = controller(&server, store.clone());
    assert_eq!(controller.start().unwrap(), SessionStatus::Authenticating);

    let outcomes = settle(&mut controller).await;
    assert!(errors(&outcomes).is_empty());
    assert!(updates(&outcomes).iter().any(|u| matches!(
        u,
        SyncUpdate::SignedOut {
            reason: SignOutReason::CredentialRejected {
                operation: Operation::RestoreSession,
                ..
            }
        }
    )));

    assert_eq!(controller.session(), &Session::Anonymous);
    assert!(store.current().is_none());
}

#[tokio::test]
async fn uncleared_store_is_reported_when_credential_is_rejected() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = MemoryTokenStore::with_credential(token("tok-stale")).failing_writes();
    let mut controller = controller(&server, store.clone());
    controller.start().unwrap();

    let outcomes = settle(&mut controller).await;
    let errs = errors(&outcomes);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].operation, Operation::RestoreSession);
    assert!(matches!(errs[0].source, SyncError::Store(StoreError::Remove { .. })));

    // Signed out in memory regardless; the stale credential is still on disk.
    assert_eq!(controller.session(), &Session::Anonymous);
    assert_eq!(store.current(), Some(token("tok-stale")));
}

#[tokio::test]
async fn undecodable_identity_also_fails_closed() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = MemoryTokenStore::with_credential(token("tok-1"));
    let mut controller = controller(&server, store.clone());
    controller.start().unwrap();
    settle(&mut controller).await;

    assert_eq!(controller.status(), SessionStatus::Anonymous);
    assert!(store.current().is_none());
}

#[tokio::test]
async fn saved_session_survives_restart() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_login(&server, "tok-1").await;
    mount_me(&server, "tok-1", "test@example.com").await;
    mount_boards(&server, json!([board(1, "Sprint")])).await;
    mount_columns(&server, 1, json!([])).await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("branches_access_token");

    {
        let mut first = controller(&server, FileTokenStore::new(&token_path));
        first.start().unwrap();
        first.login("test@example.com", "secret123").unwrap();
        settle(&mut first).await;
        assert_eq!(first.status(), SessionStatus::Authenticated);
    }

    let mut second = controller(&server, FileTokenStore::new(&token_path));
    assert_eq!(second.start().unwrap(), SessionStatus::Authenticating);
    let outcomes = settle(&mut second).await;
    assert!(updates(&outcomes).contains(&&SyncUpdate::SessionRestored {
        email: "test@example.com".to_string()
    }));
    assert_eq!(second.status(), SessionStatus::Authenticated);
    assert_eq!(second.selected_board_id().map(|id| id.0), Some(1));
}

#[tokio::test]
async fn unreadable_token_store_starts_anonymous() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    let dir = tempfile::tempdir().unwrap();

    // A directory where the token file should be.
    let mut controller = controller(&server, FileTokenStore::new(dir.path()));
    let err = controller.start().unwrap_err();

    assert_eq!(err.operation, Operation::RestoreSession);
    assert!(matches!(err.source, SyncError::Store(StoreError::Read { .. })));
    assert_eq!(controller.session(), &Session::Anonymous);
    settle(&mut controller).await;
}

#[tokio::test]
async fn logout_is_idempotent() {
    let server = MockServer::start().await;
    mount_boards(&server, json!([board(1, "Sprint")])).await;
    mount_columns(&server, 1, json!([])).await;
    let mut controller = crate::common::restored(&server).await;
    assert!(!controller.boards().is_empty());

    controller.logout().unwrap();
    let once = (
        controller.session().clone(),
        controller.boards().to_vec(),
        controller.columns().to_vec(),
        controller.selected_board_id(),
    );
    controller.logout().unwrap();
    let twice = (
        controller.session().clone(),
        controller.boards().to_vec(),
        controller.columns().to_vec(),
        controller.selected_board_id(),
    );

    assert_eq!(once, twice);
    assert_eq!(once, (Session::Anonymous, Vec::new(), Vec::new(), None));
    assert!(controller.store().load().unwrap().is_none());
}

#[tokio::test]
async fn board_list_arriving_after_logout_is_discarded() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_me(&server, "tok-1", "test@example.com").await;
    mount_boards_delayed(&server, json!([board(1, "Sprint")]), Duration::from_millis(300)).await;

    let mut controller = controller(&server, MemoryTokenStore::with_credential(token("tok-1")));
    controller.start().unwrap();
    pump_until(&mut controller, |o| {
        matches!(o, Ok(SyncUpdate::SessionRestored { .. }))
    })
    .await;

    controller.logout().unwrap();
    let outcomes = settle(&mut controller).await;

    assert!(updates(&outcomes).contains(&&SyncUpdate::Discarded {
        reason: DiscardReason::StaleSession
    }));
    assert!(controller.boards().is_empty());
    assert_eq!(controller.selected_board_id(), None);
}

#[tokio::test]
async fn refresh_identity_failure_signs_out() {
    let server = MockServer::start().await;
    mount_boards(&server, json!([])).await;
    let mut controller = crate::common::restored(&server).await;

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    controller.refresh_identity().unwrap();
    let outcomes = settle(&mut controller).await;

    assert!(updates(&outcomes).iter().any(|u| matches!(
        u,
        SyncUpdate::SignedOut {
            reason: SignOutReason::CredentialRejected {
                operation: Operation::RefreshIdentity,
                ..
            }
        }
    )));
    assert_eq!(controller.status(), SessionStatus::Anonymous);
    assert!(controller.store().current().is_none());
}

#[tokio::test]
async fn register_signs_in_like_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "access_token": "tok-new",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "tok-new", "new@example.com").await;
    mount_boards(&server, json!([])).await;

    let store = MemoryTokenStore::new();
    let mut controller = controller(&server, store.clone());
    controller.register("new@example.com", "secret123").unwrap();
    settle(&mut controller).await;

    assert_eq!(controller.session().user_email(), Some("new@example.com"));
    assert_eq!(store.current(), Some(token("tok-new")));
}

#[tokio::test]
async fn duplicate_registration_shows_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "Email already registered" })),
        )
        .mount(&server)
        .await;

    let mut controller = controller(&server, MemoryTokenStore::new());
    controller.register("taken@example.com", "pw").unwrap();
    let outcomes = settle(&mut controller).await;

    assert_eq!(errors(&outcomes)[0].to_string(), "Email already registered");
    assert_eq!(controller.session().error_message(), Some("Email already registered"));
}

#[tokio::test]
async fn login_rejected_while_signed_in() {
    let server = MockServer::start().await;
    mount_boards(&server, json!([])).await;
    let mut controller = crate::common::restored(&server).await;

    let err = controller.login("test@example.com", "secret123").unwrap_err();
    assert_eq!(err.operation, Operation::Login);
    assert!(err.validation_error().is_some());
    assert_eq!(controller.in_flight(), 0);
}

#[tokio::test]
async fn failing_health_probe_is_display_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut controller = controller(&server, MemoryTokenStore::new());
    controller.start().unwrap();
    let outcomes = settle(&mut controller).await;

    assert!(errors(&outcomes).is_empty());
    assert_eq!(controller.backend_status(), BackendStatus::Error);
    assert_eq!(controller.status(), SessionStatus::Anonymous);
}
