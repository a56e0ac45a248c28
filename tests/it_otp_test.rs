//! Integration tests for registration and the OTP verification flow

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};

use coursedeck_client::auth::{
    AuthErrorKind, AuthStatus, MemorySessionStore, OtpChallenge, CHALLENGE_EXPIRY_SECS,
    RESEND_COOLDOWN_SECS,
};
use coursedeck_client::{ApiError, AuthClient, ClientConfig};

fn client_with(server_url: &str) -> AuthClient {
    AuthClient::with_store(
        ClientConfig::with_base_url(server_url),
        Arc::new(MemorySessionStore::new()),
    )
    .expect("Failed to build client")
}

#[tokio::test]
async fn register_then_verify_round_trip() {
    //* Given
    let mut server = Server::new_async().await;

    let register = server
        .mock("POST", "/auth/user/register")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"email":"student@example.edu","status":"pending_verification"}}"#)
        .expect(1)
        .create_async()
        .await;

    let verify = server
        .mock("POST", "/auth/user/verify-otp")
        .match_body(Matcher::JsonString(
            r#"{"email":"student@example.edu","otp":"482913"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"account verified"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server.url());

    //* When
    let pending = client
        .register(&coursedeck_client::models::RegisterRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "student@example.edu".to_string(),
            password: "hunter2".to_string(),
            phone: None,
        })
        .await
        .expect("registration should be accepted");

    let challenge = OtpChallenge::start(pending.email.clone());
    let confirmation = client
        .submit_otp(&challenge, "482913")
        .await
        .expect("verification should succeed");

    //* Then
    assert!(pending.is_pending_verification());
    assert_eq!(confirmation.message.as_deref(), Some("account verified"));
    assert_eq!(client.auth_state().status, AuthStatus::Success);
    register.assert_async().await;
    verify.assert_async().await;
}

#[tokio::test(start_paused = true)]
async fn expired_challenge_rejects_submit_without_network() {
    //* Given - no reachable server; a network attempt would fail loudly
    let client = client_with("http://127.0.0.1:9");
    let challenge = OtpChallenge::start("student@example.edu".to_string());

    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    tokio::time::advance(Duration::from_secs(CHALLENGE_EXPIRY_SECS as u64)).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert!(challenge.is_expired());

    //* When
    let result = client.submit_otp(&challenge, "482913").await;

    //* Then - rejected locally with a field error
    let Err(ApiError::Validation(fields)) = result else {
        panic!("expected local validation rejection");
    };
    assert!(fields.contains_key("otp"));
}

#[tokio::test]
async fn resend_restarts_both_countdowns() {
    //* Given
    let mut server = Server::new_async().await;
    let resend = server
        .mock("POST", "/auth/user/resend-otp")
        .match_body(Matcher::JsonString(r#"{"email":"student@example.edu"}"#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"code sent"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server.url());
    let mut challenge = OtpChallenge::start("student@example.edu".to_string());

    //* When
    client
        .resend_otp(&mut challenge)
        .await
        .expect("resend should succeed");

    //* Then - both counters are back at their initial values
    let countdown = challenge.countdown();
    assert_eq!(countdown.resend_remaining(), RESEND_COOLDOWN_SECS);
    assert_eq!(countdown.expiry_remaining(), CHALLENGE_EXPIRY_SECS);
    assert!(!countdown.is_expired());
    resend.assert_async().await;
}

#[tokio::test]
async fn invalid_code_surfaces_field_errors() {
    //* Given
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/user/verify-otp")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Validation failed","errors":{"otp":"code does not match"}}"#)
        .create_async()
        .await;

    let client = client_with(&server.url());
    let challenge = OtpChallenge::start("student@example.edu".to_string());

    //* When
    let result = client.submit_otp(&challenge, "000000").await;

    //* Then
    assert!(matches!(result, Err(ApiError::Validation(_))));
    let state = client.auth_state();
    assert_eq!(state.status, AuthStatus::Error);
    match state.error {
        Some(AuthErrorKind::Fields(fields)) => {
            assert_eq!(
                fields.get("otp").map(String::as_str),
                Some("code does not match")
            );
        }
        other => panic!("expected field errors, got {:?}", other),
    }
}
