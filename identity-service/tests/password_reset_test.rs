//! Password reset flow tests against a live PostgreSQL.

mod common;

use axum::http::StatusCode;
use common::{create_user, post_json, spawn_app, unique_email};
use identity_service::services::ServiceError;

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn request_response_is_identical_for_known_and_unknown_emails() {
    let app = spawn_app().await;
    let email = unique_email();
    create_user(&app, &email, "s3cret-pw1", "viewer").await;

    let (known_status, known_body) = post_json(
        &app.router,
        "/auth/password-reset/request",
        serde_json::json!({ "email": email }),
    )
    .await;

    let (unknown_status, unknown_body) = post_json(
        &app.router,
        "/auth/password-reset/request",
        serde_json::json!({ "email": unique_email() }),
    )
    .await;

    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known_body, unknown_body);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn full_reset_flow_changes_password_and_kills_sessions() {
    let app = spawn_app().await;
    let email = unique_email();
    let user = create_user(&app, &email, "old-passw0rd", "viewer").await;

    app.state
        .sessions
        .create(user.id, "10.0.0.1".to_string(), "tests".to_string())
        .await
        .unwrap();

    app.state.password_reset.request(&email, None).await.unwrap();

    // Pull the token the way the email would carry it.
    let token: String = sqlx::query_scalar(
        "SELECT token FROM password_reset_tokens WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user.id)
    .fetch_one(app.state.db.pool())
    .await
    .unwrap();

    let verification = app.state.password_reset.verify(&token).await.unwrap();
    assert_eq!(verification.user_id, user.id);

    app.state
        .password_reset
        .consume(&token, "new-passw0rd", None)
        .await
        .unwrap();

    // Old password gone, new one works, sessions terminated.
    assert!(matches!(
        app.state
            .auth
            .login(&email, "old-passw0rd", None, "tests".to_string())
            .await,
        Err(ServiceError::InvalidCredentials)
    ));
    assert!(app
        .state
        .auth
        .login(&email, "new-passw0rd", None, "tests".to_string())
        .await
        .is_ok());
    assert!(app
        .state
        .sessions
        .list_active(user.id)
        .await
        .unwrap()
        .is_empty());

    // The token is spent.
    assert!(matches!(
        app.state.password_reset.verify(&token).await,
        Err(ServiceError::ResetTokenAlreadyUsed)
    ));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn concurrent_consumes_produce_exactly_one_success() {
    let app = spawn_app().await;
    let email = unique_email();
    let user = create_user(&app, &email, "old-passw0rd", "viewer").await;

    app.state.password_reset.request(&email, None).await.unwrap();
    let token: String = sqlx::query_scalar(
        "SELECT token FROM password_reset_tokens WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user.id)
    .fetch_one(app.state.db.pool())
    .await
    .unwrap();

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let service = app.state.password_reset.clone();
            let token = token.clone();
            tokio::spawn(async move {
                service
                    .consume(&token, &format!("new-passw0rd-{i}"), None)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut already_used = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(ServiceError::ResetTokenAlreadyUsed) => already_used += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_used, 4);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn expired_token_fails_with_expired_even_if_never_used() {
    let app = spawn_app().await;
    let email = unique_email();
    let user = create_user(&app, &email, "old-passw0rd", "viewer").await;

    app.state.password_reset.request(&email, None).await.unwrap();
    let token: String = sqlx::query_scalar(
        "SELECT token FROM password_reset_tokens WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user.id)
    .fetch_one(app.state.db.pool())
    .await
    .unwrap();

    sqlx::query(
        "UPDATE password_reset_tokens SET expires_at = NOW() - INTERVAL '1 minute' WHERE token = $1",
    )
    .bind(&token)
    .execute(app.state.db.pool())
    .await
    .unwrap();

    assert!(matches!(
        app.state.password_reset.verify(&token).await,
        Err(ServiceError::ResetTokenExpired)
    ));
    assert!(matches!(
        app.state
            .password_reset
            .consume(&token, "new-passw0rd", None)
            .await,
        Err(ServiceError::ResetTokenExpired)
    ));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn garbage_token_is_invalid() {
    let app = spawn_app().await;
    assert!(matches!(
        app.state.password_reset.verify("not-a-token").await,
        Err(ServiceError::ResetTokenInvalid)
    ));
}
