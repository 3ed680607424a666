//! Dynamic grant tests against a live PostgreSQL.

mod common;

use axum::http::StatusCode;
use common::{create_user, get_authed, post_json, post_json_authed, spawn_app, unique_email};
use identity_service::models::PermissionGrant;
use uuid::Uuid;

fn grant(role: &str, resource: &str, action: &str) -> PermissionGrant {
    PermissionGrant {
        role: role.to_string(),
        resource: resource.to_string(),
        action: action.to_string(),
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn dynamic_grant_unions_with_the_compiled_matrix() {
    let app = spawn_app().await;
    // Unique role per run keeps tests independent on a shared database.
    let role = format!("role-{}", Uuid::new_v4().simple());

    assert!(!app.state.permissions.check(&role, "documents", "read"));

    app.state
        .permissions
        .add_grant(&grant(&role, "documents", "create"))
        .await
        .unwrap();

    // Union, not replace: the new action appears alongside nothing else for
    // a custom role, and alongside defaults for a compiled one.
    assert!(app.state.permissions.check(&role, "documents", "create"));

    app.state
        .permissions
        .add_grant(&grant("viewer", "documents", "create"))
        .await
        .unwrap();
    let actions = app.state.permissions.resolve_actions("viewer", "documents");
    assert!(actions.contains("read"));
    assert!(actions.contains("create"));

    // Cleanup the viewer grant so other runs see pristine defaults.
    app.state
        .permissions
        .remove_grant(&grant("viewer", "documents", "create"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn removing_a_grant_restores_defaults_only() {
    let app = spawn_app().await;
    let role = format!("role-{}", Uuid::new_v4().simple());

    app.state
        .permissions
        .add_grant(&grant(&role, "reports", "export"))
        .await
        .unwrap();
    assert!(app.state.permissions.check(&role, "reports", "export"));

    let deleted = app
        .state
        .permissions
        .remove_grant(&grant(&role, "reports", "export"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(!app.state.permissions.check(&role, "reports", "export"));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn duplicate_grants_are_ignored() {
    let app = spawn_app().await;
    let role = format!("role-{}", Uuid::new_v4().simple());
    let g = grant(&role, "documents", "read");

    assert!(app.state.permissions.add_grant(&g).await.unwrap());
    assert!(!app.state.permissions.add_grant(&g).await.unwrap());

    app.state.permissions.remove_grant(&g).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn grant_management_is_gated_by_role() {
    let app = spawn_app().await;
    let viewer_email = unique_email();
    let admin_email = unique_email();
    create_user(&app, &viewer_email, "s3cret-pw1", "viewer").await;
    create_user(&app, &admin_email, "s3cret-pw1", "admin").await;

    let login = |email: String| {
        let router = app.router.clone();
        async move {
            let (_, body) = post_json(
                &router,
                "/auth/login",
                serde_json::json!({ "credential": email, "password": "s3cret-pw1" }),
            )
            .await;
            body["token"].as_str().unwrap().to_string()
        }
    };

    let viewer_token = login(viewer_email).await;
    let admin_token = login(admin_email).await;
    let role = format!("role-{}", Uuid::new_v4().simple());
    let grant_body = serde_json::json!({ "role": role, "resource": "documents", "action": "read" });

    // Viewers can query but not mutate.
    let (status, body) = get_authed(
        &app.router,
        "/permissions/check?resource=documents&action=read",
        &viewer_token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (status, _) =
        post_json_authed(&app.router, "/permissions", &viewer_token, grant_body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        post_json_authed(&app.router, "/permissions", &admin_token, grant_body).await;
    assert_eq!(status, StatusCode::CREATED);

    app.state
        .permissions
        .remove_grant(&grant(&role, "documents", "read"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL (DATABASE_URL)
async fn queries_are_stable_between_refreshes() {
    let app = spawn_app().await;
    let role = format!("role-{}", Uuid::new_v4().simple());

    let snapshot = app.state.permissions.current();
    let before = snapshot.resolve_actions("viewer", "documents");

    // A write lands in storage, but the held snapshot answers identically
    // until a refresh swaps in a new one.
    app.state
        .db
        .insert_permission_grant(&grant(&role, "documents", "read"))
        .await
        .unwrap();
    assert_eq!(snapshot.resolve_actions("viewer", "documents"), before);
    assert!(!snapshot.check(&role, "documents", "read"));

    let version_before = snapshot.version();
    app.state.permissions.refresh().await.unwrap();
    let refreshed = app.state.permissions.current();
    assert!(refreshed.version() > version_before);
    assert!(refreshed.check(&role, "documents", "read"));

    app.state
        .db
        .delete_permission_grant(&grant(&role, "documents", "read"))
        .await
        .unwrap();
}
