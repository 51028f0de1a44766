use std::sync::Arc;

use futures::future::join_all;
use mockito::{Matcher, Server};
use serde_json::json;

use voxchat_core::auth::{
    AuthError, CredentialRecord, MemoryStore, RefreshCoordinator, SessionState,
};

const REFRESH: &str = "/api/v1/auth/refresh";

fn session_with(access: Option<&str>, refresh: Option<&str>) -> (SessionState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_record(CredentialRecord {
        access_token: access.map(String::from),
        refresh_token: refresh.map(String::from),
        account_id: Some("ada@example.com".into()),
    }));
    (SessionState::load(store.clone()), store)
}

fn coordinator(server: &Server, session: &SessionState) -> Arc<RefreshCoordinator> {
    Arc::new(RefreshCoordinator::new(
        reqwest::Client::new(),
        &server.url(),
        session.clone(),
    ))
}

fn tokens(access: &str, refresh: &str) -> String {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600
    })
    .to_string()
}

#[tokio::test]
async fn test_successful_refresh_replaces_and_persists_tokens() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", REFRESH)
        .match_body(Matcher::Json(json!({"refresh_token": "R0"})))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tokens("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let (session, store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    assert!(refresher.refresh().await);
    mock.assert_async().await;

    let current = session.current();
    assert_eq!(current.access_token.as_deref(), Some("A1"));
    assert_eq!(current.refresh_token.as_deref(), Some("R1"));
    assert_eq!(current.account_id.as_deref(), Some("ada@example.com"));
    assert!(current.expires_at.is_some());

    let persisted = store.snapshot().unwrap();
    assert_eq!(persisted.access_token.as_deref(), Some("A1"));
    assert_eq!(persisted.refresh_token.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_rejected_refresh_token_clears_session() {
    for status in [400, 401, 403] {
        let mut server = Server::new_async().await;
        server
            .mock("POST", REFRESH)
            .with_status(status)
            .with_body(r#"{"detail":"invalid refresh token"}"#)
            .create_async()
            .await;

        let (session, store) = session_with(Some("A0"), Some("R0"));
        let refresher = coordinator(&server, &session);

        assert_eq!(
            refresher.try_refresh().await,
            Err(AuthError::InvalidRefreshToken { status: status as u16 })
        );
        assert!(!session.is_authenticated());
        assert_eq!(session.refresh_token(), None);
        assert_eq!(store.snapshot(), None);
    }
}

#[tokio::test]
async fn test_server_error_keeps_session() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", REFRESH)
        .with_status(500)
        .create_async()
        .await;

    let (session, store) = session_with(Some("A0"), Some("R0"));
    let before = session.current();
    let refresher = coordinator(&server, &session);

    assert!(!refresher.refresh().await);
    assert_eq!(session.current(), before);
    assert_eq!(store.snapshot().unwrap().refresh_token.as_deref(), Some("R0"));
}

#[tokio::test]
async fn test_unparseable_success_is_transient() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let (session, _store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    match refresher.try_refresh().await {
        Err(AuthError::TransientRefreshFailure(_)) => {}
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(session.access_token().as_deref(), Some("A0"));
}

#[tokio::test]
async fn test_no_refresh_token_skips_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(tokens("A1", "R1"))
        .expect(0)
        .create_async()
        .await;

    let (session, _store) = session_with(None, None);
    let refresher = coordinator(&server, &session);

    assert_eq!(refresher.try_refresh().await, Err(AuthError::NoRefreshToken));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", REFRESH)
        .match_body(Matcher::Json(json!({"refresh_token": "R0"})))
        .with_status(200)
        .with_body(tokens("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let (session, _store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    // All callers queue before the first network call can complete
    let results = join_all((0..8).map(|_| refresher.refresh())).await;

    assert!(results.into_iter().all(|ok| ok));
    assert_eq!(refresher.rounds(), 1);
    assert_eq!(session.access_token().as_deref(), Some("A1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_later_caller_starts_fresh_round() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", REFRESH)
        .match_body(Matcher::Json(json!({"refresh_token": "R0"})))
        .with_status(200)
        .with_body(tokens("A1", "R1"))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", REFRESH)
        .match_body(Matcher::Json(json!({"refresh_token": "R1"})))
        .with_status(200)
        .with_body(tokens("A2", "R2"))
        .expect(1)
        .create_async()
        .await;

    let (session, _store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    assert!(refresher.refresh().await);
    assert!(refresher.refresh().await);

    assert_eq!(refresher.rounds(), 2);
    assert_eq!(session.access_token().as_deref(), Some("A2"));
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_refresh_on_worker_thread() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(tokens("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let (session, _store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    let worker = Arc::clone(&refresher);
    let ok = tokio::spawn(async move { worker.refresh_blocking() })
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(session.access_token().as_deref(), Some("A1"));
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_refresh_from_plain_thread() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", REFRESH)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let (session, store) = session_with(Some("A0"), Some("R0"));
    let refresher = coordinator(&server, &session);

    let plain = Arc::clone(&refresher);
    let ok = tokio::task::spawn_blocking(move || {
        std::thread::spawn(move || plain.refresh_blocking())
            .join()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(!ok);
    assert!(!session.is_authenticated());
    assert_eq!(store.snapshot(), None);
    mock.assert_async().await;
}
