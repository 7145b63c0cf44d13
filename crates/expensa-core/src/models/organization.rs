use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::member::Role;
use crate::constants::INVITE_CODE_LENGTH;

/// Free-form organization settings. `custom_categories` is always present; any other keys
/// written by clients are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrganizationSettings {
    #[serde(default)]
    pub custom_categories: Vec<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OrganizationSettings {
    pub fn has_category(&self, name: &str) -> bool {
        self.custom_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Tenant boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub settings: OrganizationSettings,
    pub invite_code: Option<String>,
    pub invite_code_expires_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn invite_is_valid(&self, code: &str, now: DateTime<Utc>) -> bool {
        match (&self.invite_code, self.invite_code_expires_at) {
            (Some(current), Some(expires_at)) => current == code && expires_at > now,
            _ => false,
        }
    }
}

/// Organization as seen by one of its members. The invite code is only shown to managers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub settings: OrganizationSettings,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code_expires_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationResponse {
    pub fn for_role(org: Organization, role: Role) -> Self {
        let (invite_code, invite_code_expires_at) = if role.is_manager() {
            (org.invite_code, org.invite_code_expires_at)
        } else {
            (None, None)
        };
        OrganizationResponse {
            id: org.id,
            name: org.name,
            slug: org.slug,
            settings: org.settings,
            role,
            invite_code,
            invite_code_expires_at,
            created_by: org.created_by,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}

/// Row of `GET /organizations`: the caller's organizations with the caller's role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// Request DTO for creating an organization
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(
        min = 1,
        max = 120,
        message = "Organization name must be between 1 and 120 characters"
    ))]
    pub name: String,
    /// Derived from the name when omitted.
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "slug must be between 1 and 64 characters"))]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct UpdateOrganizationRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 120,
        message = "Organization name must be between 1 and 120 characters"
    ))]
    pub name: Option<String>,
    /// Replaces the settings document.
    #[serde(default)]
    pub settings: Option<OrganizationSettings>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct JoinOrganizationRequest {
    #[validate(length(min = 1, max = 32, message = "invite_code must not be empty"))]
    pub invite_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InviteCodeResponse {
    pub invite_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CustomCategoryRequest {
    #[validate(length(
        min = 1,
        max = 60,
        message = "Category name must be between 1 and 60 characters"
    ))]
    pub name: String,
}

/// Lowercase, hyphen-separated form of a name, suitable for a unique slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(64);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "org".to_string()
    } else {
        slug
    }
}

/// Random invite code from an alphabet without look-alike characters.
pub fn generate_invite_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
