//! Two-factor lifecycle tests against a live PostgreSQL.

mod common;

use common::{create_user, spawn_app, unique_email};
use identity_service::services::{ServiceError, TwoFactorMethod};
use totp_rs::{Algorithm, Secret, TOTP};

/// Current TOTP code for a base32 secret, computed the same way an
/// authenticator app would.
fn current_code(secret_base32: &str) -> String {
    let bytes = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
    let totp = TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, bytes, None, String::new());
    totp.generate_current().unwrap()
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn enable_requires_a_valid_first_code() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let setup = app.state.two_factor.setup(&user.email).unwrap();

    // A wrong code never enables.
    let wrong = app
        .state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, "000000")
        .await;
    assert!(matches!(wrong, Err(ServiceError::InvalidTwoFactorCode)));
    assert!(!app.state.two_factor.is_enabled(user.id).await.unwrap());

    let code = current_code(&setup.secret);
    app.state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, &code)
        .await
        .unwrap();

    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.backup_codes_remaining, 10);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn login_stops_at_the_gate_and_code_completes_it() {
    let app = spawn_app().await;
    let email = unique_email();
    let user = create_user(&app, &email, "s3cret-pw1", "analyst").await;

    let setup = app.state.two_factor.setup(&user.email).unwrap();
    let code = current_code(&setup.secret);
    app.state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, &code)
        .await
        .unwrap();

    // Credential check passes but no session is created.
    let outcome = app
        .state
        .auth
        .login(&email, "s3cret-pw1", None, "tests".to_string())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        identity_service::services::LoginOutcome::TwoFactorRequired { user_id } if user_id == user.id
    ));
    assert!(app
        .state
        .sessions
        .list_active(user.id)
        .await
        .unwrap()
        .is_empty());

    // The code mints the session.
    let success = app
        .state
        .auth
        .complete_two_factor_login(
            user.id,
            &current_code(&setup.secret),
            TwoFactorMethod::Totp,
            None,
            "tests".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(success.user.id, user.id);
    assert_eq!(
        app.state.sessions.list_active(user.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn backup_code_works_exactly_once() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let setup = app.state.two_factor.setup(&user.email).unwrap();
    let code = current_code(&setup.secret);
    app.state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, &code)
        .await
        .unwrap();

    let backup = setup.backup_codes[0].clone();

    let remaining = app
        .state
        .two_factor
        .verify_backup_code(user.id, &backup)
        .await
        .unwrap();
    assert_eq!(remaining, 9);

    // Second attempt with the same code fails; consumption removed it.
    let second = app.state.two_factor.verify_backup_code(user.id, &backup).await;
    assert!(matches!(second, Err(ServiceError::InvalidBackupCode)));

    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert_eq!(status.backup_codes_remaining, 9);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn concurrent_backup_code_spends_produce_one_winner() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let setup = app.state.two_factor.setup(&user.email).unwrap();
    let code = current_code(&setup.secret);
    app.state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, &code)
        .await
        .unwrap();

    let backup = setup.backup_codes[0].clone();
    let service = app.state.two_factor.clone();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let backup = backup.clone();
            tokio::spawn(async move { service.verify_backup_code(user.id, &backup).await })
        })
        .collect();

    let mut successes = 0;
    let mut invalid = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::InvalidBackupCode) => invalid += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(invalid, 3);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn disable_reauthenticates_the_caller() {
    let app = spawn_app().await;
    let user = create_user(&app, &unique_email(), "s3cret-pw1", "viewer").await;

    let setup = app.state.two_factor.setup(&user.email).unwrap();
    let code = current_code(&setup.secret);
    app.state
        .two_factor
        .enable(user.id, &setup.secret, &setup.backup_codes, &code)
        .await
        .unwrap();

    // Wrong password: still enabled.
    let wrong = app
        .state
        .two_factor
        .disable(user.id, &user.password_hash, "wrong-password")
        .await;
    assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));
    assert!(app.state.two_factor.is_enabled(user.id).await.unwrap());

    app.state
        .two_factor
        .disable(user.id, &user.password_hash, "s3cret-pw1")
        .await
        .unwrap();
    assert!(!app.state.two_factor.is_enabled(user.id).await.unwrap());
}
