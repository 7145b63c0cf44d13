//! Organization, membership and auth integration tests.
//!
//! Run with: `cargo test -p expensa-api --test organizations_test`

mod helpers;

use helpers::auth::{create_organization, join_with_role, mint_token, test_user};
use helpers::{api_path, data, setup_test_app};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let app = setup_test_app().await;

    let response = app.client().get(&api_path("/organizations")).await;
    assert_eq!(response.status_code(), 401);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn expired_and_foreign_tokens_are_rejected() {
    let app = setup_test_app().await;

    let expired = mint_token(Uuid::new_v4(), Some("late@acme.test"), -3600);
    let response = app
        .client()
        .get(&api_path("/organizations"))
        .add_header("Authorization", format!("Bearer {}", expired))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = app
        .client()
        .get(&api_path("/organizations"))
        .add_header("Authorization", "Bearer not-a-jwt")
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn health_is_public() {
    let app = setup_test_app().await;
    let response = app.client().get(&api_path("/health")).await;
    assert_eq!(response.status_code(), 200);

    let ready = app.client().get(&api_path("/health/ready")).await;
    assert_eq!(ready.status_code(), 200);
    assert_eq!(data(&ready.json::<Value>())["database"], "not_configured");
}

#[tokio::test]
async fn creator_becomes_owner_and_sees_invite_code() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");

    let org = create_organization(app.client(), &owner, "Acme Corp").await;
    assert_eq!(org["role"], "owner");
    assert_eq!(org["slug"], "acme-corp");
    assert!(org["invite_code"].as_str().is_some());

    let list = app
        .client()
        .get(&api_path("/organizations"))
        .add_header("Authorization", owner.bearer())
        .await;
    assert_eq!(list.status_code(), 200);
    let body = list.json::<Value>();
    let rows = data(&body).as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["role"], "owner");
}

#[tokio::test]
async fn joining_by_invite_code_makes_a_member_without_invite_visibility() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let member = test_user("member@acme.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;

    let code = org["invite_code"].as_str().unwrap().to_lowercase();
    let join = app
        .client()
        .post(&api_path("/organizations/join"))
        .add_header("Authorization", member.bearer())
        .json(&json!({ "invite_code": code }))
        .await;
    assert_eq!(join.status_code(), 200);
    let body = join.json::<Value>();
    assert_eq!(data(&body)["role"], "member");
    assert!(data(&body).get("invite_code").is_none());

    let bad = app
        .client()
        .post(&api_path("/organizations/join"))
        .add_header("Authorization", member.bearer())
        .json(&json!({ "invite_code": "NOPE0000" }))
        .await;
    assert_eq!(bad.status_code(), 400);
}

#[tokio::test]
async fn last_owner_cannot_step_down() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;
    let org_id = org["id"].as_str().unwrap();

    let response = app
        .client()
        .patch(&api_path(&format!("/organizations/{}/members/{}", org_id, owner.id)))
        .add_header("Authorization", owner.bearer())
        .json(&json!({ "role": "member" }))
        .await;
    assert_eq!(response.status_code(), 409);
    assert_eq!(response.json::<Value>()["code"], "LAST_OWNER");

    let leave = app
        .client()
        .delete(&api_path(&format!("/organizations/{}/members/{}", org_id, owner.id)))
        .add_header("Authorization", owner.bearer())
        .await;
    assert_eq!(leave.status_code(), 409);
}

#[tokio::test]
async fn viewers_cannot_manage_members() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let viewer = test_user("viewer@acme.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;
    join_with_role(app.client(), &owner, &org, &viewer, "viewer").await;

    let response = app
        .client()
        .post(&api_path(&format!(
            "/organizations/{}/members",
            org["id"].as_str().unwrap()
        )))
        .add_header("Authorization", viewer.bearer())
        .json(&json!({ "email": "someone@acme.test", "role": "member" }))
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(response.json::<Value>()["code"], "FORBIDDEN");

    let members = app
        .client()
        .get(&api_path(&format!(
            "/organizations/{}/members",
            org["id"].as_str().unwrap()
        )))
        .add_header("Authorization", viewer.bearer())
        .await;
    assert_eq!(members.status_code(), 200);
    assert_eq!(data(&members.json::<Value>()).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn profile_email_is_bound_to_the_token() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let mallory = test_user("mallory@evil.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;

    let response = app
        .client()
        .post(&api_path("/users"))
        .add_header("Authorization", mallory.bearer())
        .json(&json!({ "email": "ceo@acme.test" }))
        .await;
    assert_eq!(response.status_code(), 403);

    let response = app
        .client()
        .post(&api_path(&format!(
            "/organizations/{}/members",
            org["id"].as_str().unwrap()
        )))
        .add_header("Authorization", owner.bearer())
        .json(&json!({ "email": "ceo@acme.test", "role": "admin" }))
        .await;
    assert_eq!(response.status_code(), 404);

    let profile = app
        .client()
        .post(&api_path("/users"))
        .add_header("Authorization", mallory.bearer())
        .json(&json!({ "display_name": "Mallory" }))
        .await;
    assert_eq!(profile.status_code(), 200);
    assert_eq!(data(&profile.json::<Value>())["email"], "mallory@evil.test");
}

#[tokio::test]
async fn non_members_get_forbidden_not_the_organization() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let outsider = test_user("outsider@elsewhere.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;

    let response = app
        .client()
        .get(&api_path(&format!(
            "/organizations/{}",
            org["id"].as_str().unwrap()
        )))
        .add_header("Authorization", outsider.bearer())
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn custom_categories_join_the_defaults() {
    let app = setup_test_app().await;
    let owner = test_user("owner@acme.test");
    let org = create_organization(app.client(), &owner, "Acme Corp").await;
    let org_id = org["id"].as_str().unwrap();

    let add = app
        .client()
        .post(&api_path(&format!("/organizations/{}/categories", org_id)))
        .add_header("Authorization", owner.bearer())
        .json(&json!({ "name": "Client Gifts" }))
        .await;
    assert_eq!(add.status_code(), 201);

    let list = app
        .client()
        .get(&api_path("/categories"))
        .add_query_param("organization_id", org_id)
        .add_header("Authorization", owner.bearer())
        .await;
    assert_eq!(list.status_code(), 200);
    let body = list.json::<Value>();
    let text = data(&body).to_string();
    assert!(text.contains("Client Gifts"));
    assert!(text.contains("Groceries"));

    let remove = app
        .client()
        .delete(&api_path(&format!(
            "/organizations/{}/categories/Client%20Gifts",
            org_id
        )))
        .add_header("Authorization", owner.bearer())
        .await;
    assert_eq!(remove.status_code(), 200);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app().await;
    let response = app.client().get("/api/openapi.json").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert!(body["paths"]["/api/v1/expenses"].is_object());
}
