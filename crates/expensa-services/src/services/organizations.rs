//! Organizations, memberships, invite codes and custom categories.

use std::sync::Arc;

use chrono::Duration;
use expensa_core::models::{
    generate_invite_code, slugify, AddMemberRequest, CategoryListResponse,
    CreateOrganizationRequest, CustomCategoryRequest, ExpenseFilter, ExpenseOrder,
    InviteCodeResponse, JoinOrganizationRequest, MemberWithUser, Organization, OrganizationMember,
    OrganizationResponse, OrganizationSettings, OrganizationSummary, Role,
    UpdateMemberRoleRequest, UpdateOrganizationRequest,
};
use expensa_core::policy::{Action, Resource};
use expensa_core::validation::{normalize_category_name, normalize_custom_categories};
use expensa_core::{AppError, Clock};
use expensa_db::{ExpenseStore, MemberStore, NewOrganization, OrganizationStore, UserStore};
use rand::Rng;
use uuid::Uuid;
use validator::Validate;

use super::access::{AccessControl, Actor};
use super::categorization::CategoryCache;
use super::receipt_files::ReceiptFiles;
use super::users::UserService;

const SLUG_ATTEMPTS: usize = 4;

fn slug_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
    let mut rng = rand::rng();
    (0..4)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

pub struct OrganizationService {
    organizations: Arc<dyn OrganizationStore>,
    members: Arc<dyn MemberStore>,
    users: Arc<dyn UserStore>,
    expenses: Arc<dyn ExpenseStore>,
    profiles: Arc<UserService>,
    access: AccessControl,
    categories: Arc<CategoryCache>,
    files: Arc<ReceiptFiles>,
    clock: Arc<dyn Clock>,
    invite_ttl: Duration,
}

impl OrganizationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        members: Arc<dyn MemberStore>,
        users: Arc<dyn UserStore>,
        expenses: Arc<dyn ExpenseStore>,
        profiles: Arc<UserService>,
        access: AccessControl,
        categories: Arc<CategoryCache>,
        files: Arc<ReceiptFiles>,
        clock: Arc<dyn Clock>,
        invite_ttl_days: i64,
    ) -> Self {
        Self {
            organizations,
            members,
            users,
            expenses,
            profiles,
            access,
            categories,
            files,
            clock,
            invite_ttl: Duration::days(invite_ttl_days),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Organization, AppError> {
        self.organizations
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
    }

    /// Load the organization and authorize an organization-level action.
    async fn authorized(
        &self,
        actor: &Actor,
        id: Uuid,
        action: Action,
    ) -> Result<(Organization, Role), AppError> {
        let organization = self.load(id).await?;
        let subject = self
            .access
            .authorize(actor, id, action, &Resource::Organization { id })
            .await?;
        let role = subject
            .role
            .ok_or_else(|| AppError::Forbidden("Not a member of this organization".to_string()))?;
        Ok((organization, role))
    }

    /// Create an organization with the caller as its first owner. A slug derived from the
    /// name gets a random suffix when taken; an explicit slug must be free.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateOrganizationRequest,
    ) -> Result<OrganizationResponse, AppError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput(
                "Organization name must not be blank".to_string(),
            ));
        }
        self.profiles.ensure(actor).await?;

        let explicit = request.slug.as_deref().map(slugify);
        let base = explicit.clone().unwrap_or_else(|| slugify(&name));

        let mut attempt = 0;
        loop {
            let slug = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, slug_suffix())
            };
            let new = NewOrganization {
                name: name.clone(),
                slug,
                created_by: actor.user_id,
                invite_code: generate_invite_code(),
                invite_code_expires_at: self.clock.now() + self.invite_ttl,
            };

            match self.organizations.create_with_owner(new).await {
                Ok((organization, owner)) => {
                    tracing::info!(
                        organization_id = %organization.id,
                        slug = %organization.slug,
                        "Organization created"
                    );
                    return Ok(OrganizationResponse::for_role(organization, owner.role));
                }
                Err(AppError::Conflict(msg)) => {
                    attempt += 1;
                    if explicit.is_some() || attempt >= SLUG_ATTEMPTS {
                        return Err(AppError::Conflict(msg));
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn list_mine(&self, actor: &Actor) -> Result<Vec<OrganizationSummary>, AppError> {
        self.organizations.list_for_user(actor.user_id).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<OrganizationResponse, AppError> {
        let (organization, role) = self.authorized(actor, id, Action::ViewOrganization).await?;
        Ok(OrganizationResponse::for_role(organization, role))
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateOrganizationRequest,
    ) -> Result<OrganizationResponse, AppError> {
        request.validate()?;
        let (_, role) = self.authorized(actor, id, Action::UpdateOrganization).await?;

        let name = match request.name.map(|n| n.trim().to_string()) {
            Some(n) if n.is_empty() => {
                return Err(AppError::InvalidInput(
                    "Organization name must not be blank".to_string(),
                ))
            }
            other => other,
        };
        let settings = match request.settings {
            Some(mut settings) => {
                settings.custom_categories = normalize_custom_categories(&settings.custom_categories)?;
                Some(settings)
            }
            None => None,
        };

        let organization = self.organizations.update(id, name, settings).await?;
        Ok(OrganizationResponse::for_role(organization, role))
    }

    /// Owner only. Members and expenses are removed with the organization.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        self.authorized(actor, id, Action::DeleteOrganization).await?;
        let expenses = self
            .expenses
            .list(&ExpenseFilter::for_organization(id), ExpenseOrder::NewestFirst)
            .await?;
        if !self.organizations.delete(id).await? {
            return Err(AppError::NotFound(format!("Organization {} not found", id)));
        }
        tracing::info!(organization_id = %id, "Organization deleted");
        self.files.release_all(id, &expenses).await;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn regenerate_invite(&self, actor: &Actor, id: Uuid) -> Result<InviteCodeResponse, AppError> {
        self.authorized(actor, id, Action::RegenerateInvite).await?;
        let code = generate_invite_code();
        let expires_at = self.clock.now() + self.invite_ttl;
        self.organizations.set_invite_code(id, &code, expires_at).await?;
        Ok(InviteCodeResponse {
            invite_code: code,
            expires_at,
        })
    }

    /// Join with an invite code as a member.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn join(
        &self,
        actor: &Actor,
        request: JoinOrganizationRequest,
    ) -> Result<OrganizationResponse, AppError> {
        request.validate()?;
        let code = request.invite_code.trim().to_uppercase();
        self.profiles.ensure(actor).await?;

        let organization = self
            .organizations
            .find_by_invite_code(&code)
            .await?
            .filter(|org| org.invite_is_valid(&code, self.clock.now()))
            .ok_or_else(|| AppError::InvalidInput("Invalid or expired invite code".to_string()))?;

        let member = self
            .members
            .add(organization.id, actor.user_id, Role::Member)
            .await?;
        tracing::info!(organization_id = %organization.id, "Joined organization by invite code");
        Ok(OrganizationResponse::for_role(organization, member.role))
    }

    pub async fn list_members(&self, actor: &Actor, id: Uuid) -> Result<Vec<MemberWithUser>, AppError> {
        self.authorized(actor, id, Action::ViewMembers).await?;
        self.members.list(id).await
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn add_member(
        &self,
        actor: &Actor,
        id: Uuid,
        request: AddMemberRequest,
    ) -> Result<MemberWithUser, AppError> {
        request.validate()?;
        self.load(id).await?;

        let user = match (request.user_id, request.email.as_deref()) {
            (Some(user_id), None) => self
                .users
                .get(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?,
            (None, Some(email)) => self
                .users
                .find_by_email(email.trim())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "No user with email {}; they must sign in once before being added",
                        email.trim()
                    ))
                })?,
            _ => {
                return Err(AppError::InvalidInput(
                    "Provide exactly one of user_id or email".to_string(),
                ))
            }
        };

        self.access
            .authorize(
                actor,
                id,
                Action::AddMember,
                &Resource::Membership {
                    organization_id: id,
                    target_user_id: user.id,
                    current_role: None,
                    new_role: Some(request.role),
                },
            )
            .await?;

        let member = self.members.add(id, user.id, request.role).await?;
        tracing::info!(organization_id = %id, member = %user.id, role = %member.role, "Member added");
        Ok(MemberWithUser {
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: member.role,
            joined_at: member.joined_at,
        })
    }

    async fn current_role(&self, id: Uuid, user_id: Uuid) -> Result<Role, AppError> {
        self.members
            .get_role(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} is not a member", user_id)))
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn change_role(
        &self,
        actor: &Actor,
        id: Uuid,
        target_user_id: Uuid,
        request: UpdateMemberRoleRequest,
    ) -> Result<OrganizationMember, AppError> {
        self.load(id).await?;
        let current_role = self.current_role(id, target_user_id).await?;
        self.access
            .authorize(
                actor,
                id,
                Action::ChangeMemberRole,
                &Resource::Membership {
                    organization_id: id,
                    target_user_id,
                    current_role: Some(current_role),
                    new_role: Some(request.role),
                },
            )
            .await?;

        let member = self.members.update_role(id, target_user_id, request.role).await?;
        tracing::info!(
            organization_id = %id,
            member = %target_user_id,
            from = %current_role,
            to = %member.role,
            "Member role changed"
        );
        Ok(member)
    }

    /// Remove a member, or leave when `target_user_id` is the caller.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn remove_member(&self, actor: &Actor, id: Uuid, target_user_id: Uuid) -> Result<(), AppError> {
        self.load(id).await?;
        let current_role = self.current_role(id, target_user_id).await?;
        self.access
            .authorize(
                actor,
                id,
                Action::RemoveMember,
                &Resource::Membership {
                    organization_id: id,
                    target_user_id,
                    current_role: Some(current_role),
                    new_role: None,
                },
            )
            .await?;

        self.members.remove(id, target_user_id).await?;
        tracing::info!(organization_id = %id, member = %target_user_id, "Member removed");
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn add_category(
        &self,
        actor: &Actor,
        id: Uuid,
        request: CustomCategoryRequest,
    ) -> Result<OrganizationSettings, AppError> {
        request.validate()?;
        let (organization, _) = self.authorized(actor, id, Action::ManageCategories).await?;
        let name = normalize_category_name(&request.name)?;

        let mut settings = organization.settings;
        if settings.has_category(&name) {
            return Err(AppError::Conflict(format!(
                "Category '{}' already exists",
                name
            )));
        }
        settings.custom_categories.push(name);
        settings.custom_categories = normalize_custom_categories(&settings.custom_categories)?;

        let updated = self.organizations.update(id, None, Some(settings)).await?;
        Ok(updated.settings)
    }

    /// Existing expenses keep the category string.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn remove_category(
        &self,
        actor: &Actor,
        id: Uuid,
        name: &str,
    ) -> Result<OrganizationSettings, AppError> {
        let (organization, _) = self.authorized(actor, id, Action::ManageCategories).await?;
        let name = name.trim();

        let mut settings = organization.settings;
        let before = settings.custom_categories.len();
        settings
            .custom_categories
            .retain(|c| !c.eq_ignore_ascii_case(name));
        if settings.custom_categories.len() == before {
            return Err(AppError::NotFound(format!("Category '{}' not found", name)));
        }

        let updated = self.organizations.update(id, None, Some(settings)).await?;
        Ok(updated.settings)
    }

    /// Global categories plus, when an organization is given, its custom names.
    pub async fn categories(
        &self,
        actor: &Actor,
        organization_id: Option<Uuid>,
    ) -> Result<CategoryListResponse, AppError> {
        let custom_categories = match organization_id {
            Some(id) => {
                let (organization, _) = self.authorized(actor, id, Action::ViewOrganization).await?;
                organization.settings.custom_categories
            }
            None => Vec::new(),
        };
        let categories = self.categories.categories().await?;
        Ok(CategoryListResponse {
            categories: categories.as_ref().clone(),
            custom_categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn creator_becomes_owner() {
        let fx = Fixture::new().await;
        let org = fx.organizations.get(&fx.owner, fx.org).await.unwrap();
        assert_eq!(org.role, Role::Owner);
        assert!(org.invite_code.is_some());
        let members = fx.organizations.list_members(&fx.owner, fx.org).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Owner);
    }

    #[tokio::test]
    async fn derived_slug_gets_suffix_but_explicit_slug_conflicts() {
        let fx = Fixture::new().await;
        let again = fx
            .organizations
            .create(
                &fx.owner,
                CreateOrganizationRequest {
                    name: "Acme Corp".to_string(),
                    slug: None,
                },
            )
            .await
            .unwrap();
        assert!(again.slug.starts_with("acme-corp-"));

        let err = fx
            .organizations
            .create(
                &fx.owner,
                CreateOrganizationRequest {
                    name: "Other".to_string(),
                    slug: Some("acme-corp".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn last_owner_cannot_leave_or_be_removed() {
        let fx = Fixture::new().await;
        let admin = fx.join_as(Role::Admin).await;

        let err = fx
            .organizations
            .remove_member(&fx.owner, fx.org, fx.owner.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LastOwner(_)));

        // Admins cannot touch owners at all.
        let err = fx
            .organizations
            .remove_member(&admin, fx.org, fx.owner.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = fx
            .organizations
            .change_role(
                &fx.owner,
                fx.org,
                fx.owner.user_id,
                UpdateMemberRoleRequest { role: Role::Admin },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LastOwner(_)));

        let members = fx.organizations.list_members(&fx.owner, fx.org).await.unwrap();
        let owner = members
            .iter()
            .find(|m| m.user_id == fx.owner.user_id)
            .unwrap();
        assert_eq!(owner.role, Role::Owner);
    }

    #[tokio::test]
    async fn ownership_can_be_handed_over() {
        let fx = Fixture::new().await;
        let admin = fx.join_as(Role::Admin).await;
        fx.organizations
            .change_role(&fx.owner, fx.org, admin.user_id, UpdateMemberRoleRequest { role: Role::Owner })
            .await
            .unwrap();
        fx.organizations
            .remove_member(&fx.owner, fx.org, fx.owner.user_id)
            .await
            .unwrap();
        let org = fx.organizations.get(&admin, fx.org).await.unwrap();
        assert_eq!(org.role, Role::Owner);
    }

    #[tokio::test]
    async fn join_with_invite_code() {
        let fx = Fixture::new().await;
        let code = fx
            .organizations
            .regenerate_invite(&fx.owner, fx.org)
            .await
            .unwrap()
            .invite_code;

        let newcomer = fx.user("new@example.com").await;
        let joined = fx
            .organizations
            .join(
                &newcomer,
                JoinOrganizationRequest {
                    invite_code: code.to_lowercase(),
                },
            )
            .await
            .unwrap();
        assert_eq!(joined.role, Role::Member);
        assert!(joined.invite_code.is_none());

        let err = fx
            .organizations
            .join(&newcomer, JoinOrganizationRequest { invite_code: code })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_invite_is_rejected() {
        let fx = Fixture::new().await;
        let code = fx
            .organizations
            .get(&fx.owner, fx.org)
            .await
            .unwrap()
            .invite_code
            .unwrap();
        fx.clock.advance(Duration::days(8));

        let newcomer = fx.user("late@example.com").await;
        let err = fx
            .organizations
            .join(&newcomer, JoinOrganizationRequest { invite_code: code })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn add_member_by_email() {
        let fx = Fixture::new().await;
        let dina = fx.user("dina@example.com").await;
        let added = fx
            .organizations
            .add_member(
                &fx.owner,
                fx.org,
                AddMemberRequest {
                    user_id: None,
                    email: Some("DINA@example.com".to_string()),
                    role: Role::Accountant,
                },
            )
            .await
            .unwrap();
        assert_eq!(added.user_id, dina.user_id);
        assert_eq!(added.role, Role::Accountant);

        let err = fx
            .organizations
            .add_member(
                &fx.owner,
                fx.org,
                AddMemberRequest {
                    user_id: Some(dina.user_id),
                    email: None,
                    role: Role::Member,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn claimed_address_does_not_capture_an_invitation() {
        let fx = Fixture::new().await;
        let mallory = Actor::new(Uuid::new_v4(), Some("mallory@evil.test".to_string()));
        let err = fx
            .users
            .upsert_profile(
                &mallory,
                expensa_core::models::UpsertUserRequest {
                    email: Some("ceo@acme.test".to_string()),
                    display_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = fx
            .organizations
            .add_member(
                &fx.owner,
                fx.org,
                AddMemberRequest {
                    user_id: None,
                    email: Some("ceo@acme.test".to_string()),
                    role: Role::Admin,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(fx.store.get_role(fx.org, mallory.user_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn custom_categories() {
        let fx = Fixture::new().await;
        let settings = fx
            .organizations
            .add_category(&fx.owner, fx.org, CustomCategoryRequest { name: " Fuel ".to_string() })
            .await
            .unwrap();
        assert_eq!(settings.custom_categories, vec!["Fuel".to_string()]);

        let err = fx
            .organizations
            .add_category(&fx.owner, fx.org, CustomCategoryRequest { name: "fuel".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let listed = fx.organizations.categories(&fx.owner, Some(fx.org)).await.unwrap();
        assert_eq!(listed.custom_categories, vec!["Fuel".to_string()]);
        assert!(!listed.categories.is_empty());

        let settings = fx
            .organizations
            .remove_category(&fx.owner, fx.org, "FUEL")
            .await
            .unwrap();
        assert!(settings.custom_categories.is_empty());

        let member = fx.join_as(Role::Member).await;
        let err = fx
            .organizations
            .add_category(&member, fx.org, CustomCategoryRequest { name: "Parking".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn only_owner_deletes() {
        let fx = Fixture::new().await;
        let admin = fx.join_as(Role::Admin).await;
        let err = fx.organizations.delete(&admin, fx.org).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        fx.organizations.delete(&fx.owner, fx.org).await.unwrap();
        let err = fx.organizations.get(&fx.owner, fx.org).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
