use axum_test::TestServer;
use chrono::Utc;
use expensa_api::auth::JwtClaims;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{api_path, data};

/// Shared secret the test router verifies tokens with.
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";

/// A user as the identity provider would describe them.
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

pub fn mint_token(user_id: Uuid, email: Option<&str>, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id,
        email: email.map(str::to_string),
        exp: now + ttl_secs,
        iat: Some(now),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("token")
}

/// A fresh identity with a valid one-hour token. No profile exists until first use.
pub fn test_user(email: &str) -> TestUser {
    let id = Uuid::new_v4();
    TestUser {
        id,
        email: email.to_string(),
        token: mint_token(id, Some(email), 3600),
    }
}

/// Create an organization as `owner`; returns its JSON representation.
pub async fn create_organization(client: &TestServer, owner: &TestUser, name: &str) -> Value {
    let response = client
        .post(&api_path("/organizations"))
        .add_header("Authorization", owner.bearer())
        .json(&json!({ "name": name }))
        .await;
    assert_eq!(response.status_code(), 201);
    data(&response.json::<Value>()).clone()
}

/// Add `user` to the organization with `role` via the owner's invite code, then set the role.
pub async fn join_with_role(
    client: &TestServer,
    owner: &TestUser,
    organization: &Value,
    user: &TestUser,
    role: &str,
) {
    let join = client
        .post(&api_path("/organizations/join"))
        .add_header("Authorization", user.bearer())
        .json(&json!({ "invite_code": organization["invite_code"] }))
        .await;
    assert_eq!(join.status_code(), 200);

    if role != "member" {
        let change = client
            .patch(&api_path(&format!(
                "/organizations/{}/members/{}",
                organization["id"].as_str().unwrap(),
                user.id
            )))
            .add_header("Authorization", owner.bearer())
            .json(&json!({ "role": role }))
            .await;
        assert_eq!(change.status_code(), 200);
    }
}
