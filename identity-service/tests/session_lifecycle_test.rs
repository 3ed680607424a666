//! Session lifecycle tests against a live PostgreSQL.

mod common;

use common::{create_user, spawn_app, unique_email};
use identity_service::services::ServiceError;
use uuid::Uuid;

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn fresh_session_validates_and_touches() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let session = app
        .state
        .sessions
        .create(user.id, "10.0.0.1".to_string(), "tests".to_string())
        .await
        .unwrap();

    let validated = app.state.sessions.validate(session.id).await.unwrap();
    assert_eq!(validated.id, session.id);
    assert!(validated.is_active);

    // last_activity moved forward on the validate.
    let reloaded = app.state.sessions.get(session.id).await.unwrap();
    assert!(reloaded.last_activity >= session.last_activity);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn unknown_session_is_not_found() {
    let app = spawn_app().await;
    let result = app.state.sessions.validate(Uuid::new_v4()).await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound)));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn idle_session_expires_lazily_and_stays_expired() {
    let app = spawn_app().await; // 30 minute timeout
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let session = app
        .state
        .sessions
        .create(user.id, "10.0.0.1".to_string(), "tests".to_string())
        .await
        .unwrap();

    // Back-date the activity past the timeout.
    sqlx::query("UPDATE user_sessions SET last_activity = NOW() - INTERVAL '40 minutes' WHERE id = $1")
        .bind(session.id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let result = app.state.sessions.validate(session.id).await;
    assert!(matches!(result, Err(ServiceError::SessionExpired)));

    // The flip is persisted: the session is inactive with no logout_time,
    // and every later validation fails with Expired, same as the first.
    let row = app.state.sessions.get(session.id).await.unwrap();
    assert!(!row.is_active);
    assert!(row.logout_time.is_none());

    let again = app.state.sessions.validate(session.id).await;
    assert!(matches!(again, Err(ServiceError::SessionExpired)));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn terminate_leaves_sibling_sessions_live() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let first = app
        .state
        .sessions
        .create(user.id, "10.0.0.1".to_string(), "device-a".to_string())
        .await
        .unwrap();
    let second = app
        .state
        .sessions
        .create(user.id, "10.0.0.2".to_string(), "device-b".to_string())
        .await
        .unwrap();

    app.state.sessions.terminate(first.id).await.unwrap();

    assert!(matches!(
        app.state.sessions.validate(first.id).await,
        Err(ServiceError::SessionTerminated)
    ));
    assert!(app.state.sessions.validate(second.id).await.is_ok());

    // Idempotent: terminating again is a no-op and keeps the logout_time.
    let logout_time = app.state.sessions.get(first.id).await.unwrap().logout_time;
    assert!(logout_time.is_some());
    app.state.sessions.terminate(first.id).await.unwrap();
    assert_eq!(
        app.state.sessions.get(first.id).await.unwrap().logout_time,
        logout_time
    );
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn terminate_all_spares_other_users() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;
    let other = create_user(&app, &unique_email(), "s3cret-pw2", "viewer").await;

    for _ in 0..3 {
        app.state
            .sessions
            .create(user.id, "10.0.0.1".to_string(), "tests".to_string())
            .await
            .unwrap();
    }
    let other_session = app
        .state
        .sessions
        .create(other.id, "10.0.0.9".to_string(), "tests".to_string())
        .await
        .unwrap();

    let count = app.state.sessions.terminate_all(user.id).await.unwrap();
    assert_eq!(count, 3);

    assert!(app
        .state
        .sessions
        .list_active(user.id)
        .await
        .unwrap()
        .is_empty());
    assert!(app.state.sessions.validate(other_session.id).await.is_ok());

    // History is retained: nothing is deleted by termination.
    assert_eq!(app.state.sessions.list(user.id).await.unwrap().len(), 3);
}
