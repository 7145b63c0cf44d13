use std::sync::Arc;

use expensa_core::models::{UpsertUserRequest, User};
use expensa_core::validation::trimmed;
use expensa_core::AppError;
use expensa_db::UserStore;
use validator::Validate;

use super::access::Actor;

/// Profiles of users authenticated by the identity provider.
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Create or refresh the caller's profile. A token that carries an email decides the
    /// address; the body may only repeat it. Tokens without one fall back to the body.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn upsert_profile(&self, actor: &Actor, request: UpsertUserRequest) -> Result<User, AppError> {
        request.validate()?;
        let requested = trimmed(request.email);
        let email = match trimmed(actor.email.clone()) {
            Some(verified) => {
                if requested
                    .as_deref()
                    .is_some_and(|r| !r.eq_ignore_ascii_case(&verified))
                {
                    tracing::warn!(user_id = %actor.user_id, "Profile email differs from token email");
                    return Err(AppError::Forbidden(
                        "email must match the email of the signed-in account".to_string(),
                    ));
                }
                verified
            }
            None => requested
                .ok_or_else(|| AppError::InvalidInput("email is required".to_string()))?,
        };
        let display_name = trimmed(request.display_name);

        self.users
            .upsert(actor.user_id, &email, display_name.as_deref())
            .await
    }

    pub async fn me(&self, actor: &Actor) -> Result<User, AppError> {
        self.users
            .get(actor.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found; create it with POST /api/v1/users".to_string()))
    }

    /// The caller's profile, created from the token's email on first use.
    pub async fn ensure(&self, actor: &Actor) -> Result<User, AppError> {
        if let Some(user) = self.users.get(actor.user_id).await? {
            return Ok(user);
        }
        match trimmed(actor.email.clone()) {
            Some(email) => {
                tracing::info!(user_id = %actor.user_id, "Creating profile from token claims");
                self.users.upsert(actor.user_id, &email, None).await
            }
            None => Err(AppError::BadRequest(
                "Profile not found; create it with POST /api/v1/users first".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expensa_db::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn upsert_falls_back_to_token_email() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let actor = Actor::new(Uuid::new_v4(), Some("rina@example.com".to_string()));
        let user = service
            .upsert_profile(
                &actor,
                UpsertUserRequest {
                    email: None,
                    display_name: Some(" Rina ".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(user.email, "rina@example.com");
        assert_eq!(user.display_name.as_deref(), Some("Rina"));
        assert_eq!(service.me(&actor).await.unwrap().id, actor.user_id);
    }

    #[tokio::test]
    async fn body_email_cannot_override_token_email() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let mallory = Actor::new(Uuid::new_v4(), Some("mallory@evil.test".to_string()));

        let err = service
            .upsert_profile(
                &mallory,
                UpsertUserRequest {
                    email: Some("ceo@acme.test".to_string()),
                    display_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(matches!(
            service.me(&mallory).await.unwrap_err(),
            AppError::NotFound(_)
        ));

        let user = service
            .upsert_profile(
                &mallory,
                UpsertUserRequest {
                    email: Some("Mallory@Evil.test".to_string()),
                    display_name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.email, "mallory@evil.test");
    }

    #[tokio::test]
    async fn body_email_used_when_token_has_none() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let actor = Actor::new(Uuid::new_v4(), None);
        let user = service
            .upsert_profile(
                &actor,
                UpsertUserRequest {
                    email: Some("rina@example.com".to_string()),
                    display_name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.email, "rina@example.com");
    }

    #[tokio::test]
    async fn ensure_requires_an_email_somewhere() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let anonymous = Actor::new(Uuid::new_v4(), None);
        assert!(matches!(
            service.ensure(&anonymous).await.unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            service.me(&anonymous).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn email_is_unique_across_users() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let first = Actor::new(Uuid::new_v4(), Some("dup@example.com".to_string()));
        let second = Actor::new(Uuid::new_v4(), Some("DUP@example.com".to_string()));
        service.ensure(&first).await.unwrap();
        assert!(matches!(
            service.ensure(&second).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }
}
