//! Integration tests for users, groups, tags and VM records.

mod common;

use axum::http::StatusCode;
use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn test_user_crud_as_admin() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let created = app
        .post(
            "/api/users",
            &admin,
            json!({ "username": "erin", "email": "erin@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["data"]["permission"], "Read");

    let duplicate = app
        .post("/api/users", &admin, json!({ "username": "erin", "password": "pw" }))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let same_email = app
        .post(
            "/api/users",
            &admin,
            json!({ "username": "erin2", "email": "erin@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(same_email.status, StatusCode::CONFLICT);

    let updated = app
        .put(
            "/api/users/erin",
            &admin,
            json!({ "new_username": "erin-w", "permission": "Write" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(updated.body["data"]["username"], "erin-w");
    assert_eq!(updated.body["data"]["permission"], "Write");

    let old_name = app.get("/api/users/erin", &admin).await;
    assert_eq!(old_name.status, StatusCode::NOT_FOUND);

    let listed = app.get("/api/users", &admin).await;
    let names: Vec<_> = listed.body["data"]
        .as_array()
        .expect("users")
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert!(names.contains(&"admin"));
    assert!(names.contains(&"erin-w"));

    assert_eq!(
        app.delete("/api/users/erin-w", &admin).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.delete("/api/users/erin-w", &admin).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_user_management_is_admin_only() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;

    let listed = app.get("/api/users", &writer).await;
    assert_eq!(listed.status, StatusCode::OK);

    let create = app
        .post("/api/users", &writer, json!({ "username": "x", "password": "pw" }))
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);

    let promote = app
        .put("/api/users/writer", &writer, json!({ "permission": "Admin" }))
        .await;
    assert_eq!(promote.status, StatusCode::FORBIDDEN);

    let delete = app.delete("/api/users/admin", &writer).await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_rename_keeps_own_session() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let renamed = app
        .put("/api/users/admin", &admin, json!({ "new_username": "root-admin" }))
        .await;
    assert_eq!(renamed.status, StatusCode::OK);

    let cookie = renamed.set_cookie.unwrap_or(admin);
    let me = app.get("/api/auth/me", &cookie).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["username"], "root-admin");
}

#[tokio::test]
async fn test_groups_and_membership() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;
    let admin = app.login_admin().await;

    let group = app
        .post("/api/groups", &writer, json!({ "name": "devs" }))
        .await;
    assert_eq!(group.status, StatusCode::OK);
    assert_eq!(group.body["data"]["name"], "devs");

    let duplicate = app
        .post("/api/groups", &writer, json!({ "name": "devs" }))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let blank = app.post("/api/groups", &writer, json!({ "name": "  " })).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    // Membership is user management.
    let by_writer = app.put("/api/users/writer/groups/devs", &writer, json!({})).await;
    assert_eq!(by_writer.status, StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let added = app.put("/api/users/writer/groups/devs", &admin, json!({})).await;
        assert_eq!(added.status, StatusCode::OK);
    }

    let members = app.get("/api/groups/devs/members", &writer).await;
    assert_eq!(members.body["data"]["members"], json!(["writer"]));

    let groups = app.get("/api/users/writer/groups", &writer).await;
    assert_eq!(groups.body["data"][0]["name"], "devs");

    let missing = app
        .put("/api/users/writer/groups/nope", &admin, json!({}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    assert_eq!(
        app.delete("/api/users/writer/groups/devs", &admin)
            .await
            .status,
        StatusCode::OK
    );
    let members = app.get("/api/groups/devs/members", &writer).await;
    assert_eq!(members.body["data"]["members"], json!([]));

    assert_eq!(
        app.delete("/api/groups/devs", &writer).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.get("/api/groups", &writer).await.body["data"],
        json!([])
    );
}

#[tokio::test]
async fn test_read_user_cannot_edit_inventory() {
    let app = spawn_app().await;
    let reader = app.user_session("reader", "Read").await;

    for uri in ["/api/groups", "/api/tags", "/api/vms"] {
        let listed = app.get(uri, &reader).await;
        assert_eq!(listed.status, StatusCode::OK, "{uri}");

        let created = app.post(uri, &reader, json!({ "name": "x" })).await;
        assert_eq!(created.status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn test_vm_records_and_tags() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;

    assert_eq!(
        app.post("/api/vms", &writer, json!({ "name": "web-01" }))
            .await
            .status,
        StatusCode::OK
    );
    assert_eq!(
        app.post("/api/tags", &writer, json!({ "name": "prod" }))
            .await
            .status,
        StatusCode::OK
    );

    let tagged = app.put("/api/vms/web-01/tags/prod", &writer, json!({})).await;
    assert_eq!(tagged.status, StatusCode::OK);

    let tags = app.get("/api/vms/web-01/tags", &writer).await;
    assert_eq!(tags.body["data"][0]["name"], "prod");

    let unknown_tag = app.put("/api/vms/web-01/tags/qa", &writer, json!({})).await;
    assert_eq!(unknown_tag.status, StatusCode::NOT_FOUND);

    assert_eq!(
        app.delete("/api/vms/web-01/tags/prod", &writer).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.delete("/api/vms/web-01/tags/prod", &writer).await.status,
        StatusCode::NOT_FOUND
    );

    assert_eq!(
        app.delete("/api/tags/prod", &writer).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.delete("/api/vms/web-01", &writer).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.delete("/api/vms/web-01", &writer).await.status,
        StatusCode::NOT_FOUND
    );
}
