//! Integration tests for the VM lifecycle endpoints against the mock provider.

mod common;

use axum::http::StatusCode;
use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn test_list_vms_open_to_read_users() {
    let app = spawn_app().await;
    let reader = app.user_session("reader", "Read").await;

    let response = app.get("/api/azure/vms", &reader).await;

    assert_eq!(response.status, StatusCode::OK);
    let vms = response.body["data"]["vms"].as_array().expect("vms array");
    let names: Vec<_> = vms.iter().map(|vm| vm["name"].as_str()).collect();
    assert_eq!(names, vec![Some("mock-vm1"), Some("mock-vm2")]);
    assert_eq!(vms[0]["resourceGroup"], "mock-group");
    assert_eq!(vms[0]["location"], "mock-loc");
    assert_eq!(vms[1]["status"], "VM deallocated");
}

#[tokio::test]
async fn test_read_user_cannot_act() {
    let app = spawn_app().await;
    let reader = app.user_session("reader", "Read").await;

    let single = app
        .post(
            "/api/azure/vm/action",
            &reader,
            json!({ "name": "vm1", "resourceGroup": "rg", "action": "start" }),
        )
        .await;
    assert_eq!(single.status, StatusCode::FORBIDDEN);

    // Gate runs before input validation.
    let invalid = app.post("/api/azure/vm/action", &reader, json!({})).await;
    assert_eq!(invalid.status, StatusCode::FORBIDDEN);

    let bulk = app
        .post(
            "/api/azure/vms/bulk_action",
            &reader,
            json!({
                "vms": [{ "name": "mock-vm1", "resourceGroup": "mock-group" }],
                "action": "restart",
            }),
        )
        .await;
    assert_eq!(bulk.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_read_user_forbidden_for_malformed_bodies() {
    let app = spawn_app().await;
    let reader = app.user_session("reader", "Read").await;

    let wrong_type = app
        .post("/api/azure/vm/action", &reader, json!({ "name": 5 }))
        .await;
    assert_eq!(wrong_type.status, StatusCode::FORBIDDEN);
    assert_eq!(wrong_type.body["success"], false);

    let bulk_wrong_type = app
        .post(
            "/api/azure/vms/bulk_action",
            &reader,
            json!({ "vms": "x", "action": "start" }),
        )
        .await;
    assert_eq!(bulk_wrong_type.status, StatusCode::FORBIDDEN);

    for uri in ["/api/azure/vm/action", "/api/azure/vms/bulk_action"] {
        let not_json = app.post_raw(uri, &reader, "not json").await;
        assert_eq!(not_json.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(not_json.body["success"], false, "{uri}");
    }
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;

    let wrong_type = app
        .post("/api/azure/vm/action", &writer, json!({ "name": 5 }))
        .await;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_type.body["success"], false);
    assert!(
        wrong_type.body["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("Invalid request body"))
    );

    let not_json = app
        .post_raw("/api/azure/vms/bulk_action", &writer, "not json")
        .await;
    assert_eq!(not_json.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_json.body["success"], false);
}

#[tokio::test]
async fn test_path_like_vm_names_are_rejected() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;

    let response = app
        .post(
            "/api/azure/vm/action",
            &writer,
            json!({
                "name": "x/../../otherRG/providers/Microsoft.Compute/virtualMachines/victim",
                "resourceGroup": "rg",
                "action": "deallocate",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VM name contains invalid characters");
}

#[tokio::test]
async fn test_write_user_single_action() {
    let app = spawn_app().await;
    let writer = app.user_session("writer", "Write").await;

    let response = app
        .post(
            "/api/azure/vm/action",
            &writer,
            json!({ "name": "mock-vm2", "resourceGroup": "mock-group", "action": "start" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(
        response.body["data"],
        json!({
            "name": "mock-vm2",
            "resourceGroup": "mock-group",
            "location": "mock-loc",
            "status": "[MOCK] start",
        })
    );

    let listed = app.get("/api/azure/vms", &writer).await;
    assert_eq!(listed.body["data"]["vms"][1]["status"], "[MOCK] start");
}

#[tokio::test]
async fn test_single_action_validation() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let cases = [
        (json!({ "resourceGroup": "rg", "action": "start" }), "VM name is required"),
        (json!({ "name": "vm1", "action": "start" }), "resourceGroup is required"),
        (json!({ "name": "vm1", "resourceGroup": "rg" }), "action is required"),
    ];

    for (body, message) in cases {
        let response = app.post("/api/azure/vm/action", &admin, body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], message);
    }

    let unknown = app
        .post(
            "/api/azure/vm/action",
            &admin,
            json!({ "name": "vm1", "resourceGroup": "rg", "action": "reboot" }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert!(
        unknown.body["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("Invalid action 'reboot'"))
    );
}

#[tokio::test]
async fn test_bulk_restart_scenario() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let response = app
        .post(
            "/api/azure/vms/bulk_action",
            &admin,
            json!({
                "vms": [{ "name": "mock-vm1", "resourceGroup": "mock-group" }],
                "action": "restart",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(
        response.body["data"],
        json!([{
            "name": "mock-vm1",
            "resourceGroup": "mock-group",
            "location": "mock-loc",
            "status": "[MOCK] restart",
        }])
    );
}

#[tokio::test]
async fn test_bulk_reports_failures_inline_in_order() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let response = app
        .post(
            "/api/azure/vms/bulk_action",
            &admin,
            json!({
                "vms": [
                    { "name": "mock-vm2", "resourceGroup": "mock-group" },
                    { "name": "orphan" },
                    { "name": "mock-vm1", "resourceGroup": "mock-group" },
                ],
                "action": "deallocate",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let results = response.body["data"].as_array().expect("results");
    assert_eq!(results.len(), 3);

    assert_eq!(results[0]["name"], "mock-vm2");
    assert_eq!(results[0]["status"], "[MOCK] deallocate");

    assert_eq!(results[1]["name"], "orphan");
    assert_eq!(results[1]["status"], "Error: resourceGroup is required");
    assert_eq!(results[1]["error"], "resourceGroup is required");

    assert_eq!(results[2]["name"], "mock-vm1");
    assert_eq!(results[2]["status"], "[MOCK] deallocate");
}

#[tokio::test]
async fn test_bulk_empty_and_invalid_action() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let empty = app
        .post(
            "/api/azure/vms/bulk_action",
            &admin,
            json!({ "vms": [], "action": "start" }),
        )
        .await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.body["data"], json!([]));

    let invalid = app
        .post(
            "/api/azure/vms/bulk_action",
            &admin,
            json!({
                "vms": [{ "name": "mock-vm1", "resourceGroup": "mock-group" }],
                "action": "explode",
            }),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::OK);
    assert!(
        invalid.body["data"][0]["status"]
            .as_str()
            .is_some_and(|s| s.starts_with("Error: Invalid action 'explode'"))
    );
}
