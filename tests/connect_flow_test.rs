// Integration tests for the account-linking flow: plan-limit admission and
// the PKCE callback path against a mocked provider.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mockito::{Matcher, Server};
use pulse::accounts::{AccountStore, NewLinkedAccount, Plan, Provider};
use pulse::oauth::{AuthFlowController, CallbackParams, PendingAuthStore, ProviderConfig};
use pulse::Error;
use std::sync::Arc;

fn test_store() -> Arc<AccountStore> {
    let key = BASE64.encode([7u8; 32]);
    Arc::new(AccountStore::new(":memory:", &key).unwrap())
}

fn new_account(user_id: uuid::Uuid, provider: Provider, account_id: &str) -> NewLinkedAccount {
    NewLinkedAccount {
        user_id,
        provider,
        account_id: account_id.to_string(),
        email: None,
        username: None,
        access_token: "at".to_string(),
        refresh_token: None,
        scopes: vec![],
    }
}

fn twitter_config(server: &Server) -> ProviderConfig {
    ProviderConfig {
        provider: Provider::Twitter,
        auth_url: format!("{}/i/oauth2/authorize", server.url()),
        token_url: format!("{}/2/oauth2/token", server.url()),
        api_base: server.url(),
        identity_url: format!("{}/2/users/me", server.url()),
        scopes: vec!["tweet.read".to_string(), "users.read".to_string()],
        client_id: "client-1".to_string(),
        client_secret: None,
        redirect_uri: "http://localhost:3000/auth/twitter/callback".to_string(),
    }
}

fn gmail_config() -> ProviderConfig {
    ProviderConfig {
        provider: Provider::Gmail,
        auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
        token_url: "https://oauth2.googleapis.com/token".to_string(),
        api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
        identity_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        scopes: vec![],
        client_id: "client-2".to_string(),
        client_secret: Some("secret".to_string()),
        redirect_uri: "http://localhost:3000/auth/gmail/callback".to_string(),
    }
}

fn query_param(url: &str, name: &str) -> String {
    let marker = format!("{name}=");
    let start = url.find(&marker).map(|i| i + marker.len()).unwrap();
    let rest = &url[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    rest[..end].to_string()
}

/// A free-plan user holds three linked accounts; linking a fourth is
/// rejected and leaves no record behind.
#[test]
fn test_free_plan_limit_blocks_fourth_account() {
    let store = test_store();
    let alice = store
        .create_user("Alice", "alice@example.com", Plan::Free)
        .unwrap();

    store
        .create(new_account(alice.id, Provider::Gmail, "g-1"))
        .unwrap();
    store
        .create(new_account(alice.id, Provider::Gmail, "g-2"))
        .unwrap();
    store
        .create(new_account(alice.id, Provider::Twitter, "t-1"))
        .unwrap();
    assert_eq!(store.count_for_user(alice.id).unwrap(), 3);

    let err = store
        .create(new_account(alice.id, Provider::Twitter, "t-2"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PlanLimitExceeded {
            plan: Plan::Free,
            limit: 3
        }
    ));

    // The rejected link left nothing behind
    assert_eq!(store.count_for_user(alice.id).unwrap(), 3);
    assert!(store
        .find(alice.id, Provider::Twitter, "t-2")
        .unwrap()
        .is_none());
}

/// Upgraded plans admit more accounts under the same gate.
#[test]
fn test_pro_plan_admits_six() {
    let store = test_store();
    let bob = store
        .create_user("Bob", "bob@example.com", Plan::Pro)
        .unwrap();

    for i in 0..6 {
        store
            .create(new_account(bob.id, Provider::Twitter, &format!("t-{i}")))
            .unwrap();
    }

    let err = store
        .create(new_account(bob.id, Provider::Twitter, "t-6"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PlanLimitExceeded {
            plan: Plan::Pro,
            limit: 6
        }
    ));
}

/// Full PKCE callback against a mocked provider: the state issued at the
/// start of the flow completes the exchange once and is dead afterwards.
#[tokio::test]
async fn test_pkce_state_is_single_use() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/2/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-1".into()),
            Matcher::UrlEncoded("client_id".into(), "client-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "at-1", "refresh_token": "rt-1"}"#)
        .create_async()
        .await;
    let _identity_mock = server
        .mock("GET", "/2/users/me")
        .match_header("authorization", "Bearer at-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"id": "744901", "name": "Carol", "username": "carol"}}"#)
        .create_async()
        .await;

    let store = test_store();
    let carol = store
        .create_user("Carol", "carol@example.com", Plan::Free)
        .unwrap();
    let controller = AuthFlowController::new(
        Arc::clone(&store),
        PendingAuthStore::new(600),
        gmail_config(),
        twitter_config(&server),
    );

    let auth_url = controller.start_twitter();
    let state = query_param(&auth_url, "state");
    assert!(auth_url.contains("code_challenge_method=S256"));

    let params = CallbackParams {
        code: Some("code-1".to_string()),
        state: Some(state.clone()),
        ..Default::default()
    };

    let account = controller
        .finish_twitter(Some(carol.id), &params)
        .await
        .unwrap();
    token_mock.assert_async().await;
    assert_eq!(account.account_id, "744901");
    assert_eq!(account.username.as_deref(), Some("carol"));
    assert_eq!(account.access_token, "at-1");
    assert_eq!(store.count_for_user(carol.id).unwrap(), 1);

    // Replaying the callback with the consumed state is rejected before
    // any exchange happens
    let err = controller
        .finish_twitter(Some(carol.id), &params)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExpiredOrUnknownState));
    assert_eq!(store.count_for_user(carol.id).unwrap(), 1);
}

/// Linking the same provider account twice yields a duplicate error, not a
/// second record.
#[tokio::test]
async fn test_relinking_same_account_is_rejected() {
    let mut server = Server::new_async().await;
    let _token_mock = server
        .mock("POST", "/2/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "at-1", "refresh_token": "rt-1"}"#)
        .expect_at_least(2)
        .create_async()
        .await;
    let _identity_mock = server
        .mock("GET", "/2/users/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"id": "744901", "name": "Carol", "username": "carol"}}"#)
        .expect_at_least(2)
        .create_async()
        .await;

    let store = test_store();
    let carol = store
        .create_user("Carol", "carol@example.com", Plan::Free)
        .unwrap();
    let controller = AuthFlowController::new(
        Arc::clone(&store),
        PendingAuthStore::new(600),
        gmail_config(),
        twitter_config(&server),
    );

    let first_state = query_param(&controller.start_twitter(), "state");
    controller
        .finish_twitter(
            Some(carol.id),
            &CallbackParams {
                code: Some("code-1".to_string()),
                state: Some(first_state),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // A fresh flow authorizing the same provider account
    let second_state = query_param(&controller.start_twitter(), "state");
    let err = controller
        .finish_twitter(
            Some(carol.id),
            &CallbackParams {
                code: Some("code-2".to_string()),
                state: Some(second_state),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::DuplicateAccount {
            provider: Provider::Twitter
        }
    ));
    assert_eq!(store.count_for_user(carol.id).unwrap(), 1);
}
