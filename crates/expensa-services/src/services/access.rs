use std::sync::Arc;

use expensa_core::policy::{Action, AuthorizationPolicy, Resource, Subject};
use expensa_core::AppError;
use expensa_db::MemberStore;
use uuid::Uuid;

/// The authenticated caller, as verified from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(user_id: Uuid, email: Option<String>) -> Self {
        Self { user_id, email }
    }
}

/// Resolves the caller's role and asks the policy.
#[derive(Clone)]
pub struct AccessControl {
    members: Arc<dyn MemberStore>,
    policy: Arc<dyn AuthorizationPolicy>,
}

impl AccessControl {
    pub fn new(members: Arc<dyn MemberStore>, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        Self { members, policy }
    }

    pub async fn subject(&self, actor: &Actor, organization_id: Uuid) -> Result<Subject, AppError> {
        let role = self.members.get_role(organization_id, actor.user_id).await?;
        Ok(Subject {
            user_id: actor.user_id,
            role,
        })
    }

    /// Look up the caller's role in `organization_id` and authorize `action`.
    pub async fn authorize(
        &self,
        actor: &Actor,
        organization_id: Uuid,
        action: Action,
        resource: &Resource,
    ) -> Result<Subject, AppError> {
        let subject = self.subject(actor, organization_id).await?;
        if let Err(err) = self.policy.authorize(&subject, action, resource) {
            tracing::info!(
                user_id = %actor.user_id,
                organization_id = %organization_id,
                action = ?action,
                "Authorization denied"
            );
            return Err(err);
        }
        Ok(subject)
    }

    pub fn allows(&self, subject: &Subject, action: Action, resource: &Resource) -> bool {
        self.policy.evaluate(subject, action, resource).is_allowed()
    }
}
