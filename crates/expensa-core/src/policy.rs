//! Authorization policy
//!
//! Every mutating operation asks one [`AuthorizationPolicy`] whether the acting member may
//! perform an [`Action`] on a [`Resource`]. Handlers never inspect roles themselves.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ExpenseStatus, Role};

/// The acting user and their role in the organization that owns the resource.
/// `role` is `None` when the user is not a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub user_id: Uuid,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewOrganization,
    UpdateOrganization,
    DeleteOrganization,
    RegenerateInvite,
    ManageCategories,
    ViewMembers,
    AddMember,
    ChangeMemberRole,
    RemoveMember,
    UploadReceipt,
    CreateExpense,
    ViewExpense,
    ListAllExpenses,
    EditExpense,
    DeleteExpense,
    ApproveExpense,
    RejectExpense,
    FlagExpense,
    ViewApprovalQueue,
    ExportReport,
}

impl Action {
    pub fn describe(&self) -> &'static str {
        match self {
            Action::ViewOrganization => "view this organization",
            Action::UpdateOrganization => "update this organization",
            Action::DeleteOrganization => "delete this organization",
            Action::RegenerateInvite => "regenerate the invite code",
            Action::ManageCategories => "manage custom categories",
            Action::ViewMembers => "view members",
            Action::AddMember => "add members",
            Action::ChangeMemberRole => "change member roles",
            Action::RemoveMember => "remove members",
            Action::UploadReceipt => "upload receipts",
            Action::CreateExpense => "create expenses",
            Action::ViewExpense => "view this expense",
            Action::ListAllExpenses => "list every member's expenses",
            Action::EditExpense => "edit this expense",
            Action::DeleteExpense => "delete this expense",
            Action::ApproveExpense => "approve expenses",
            Action::RejectExpense => "reject expenses",
            Action::FlagExpense => "flag expenses",
            Action::ViewApprovalQueue => "view the approval queue",
            Action::ExportReport => "export reports",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Organization {
        id: Uuid,
    },
    Expense {
        organization_id: Uuid,
        created_by: Uuid,
        status: ExpenseStatus,
    },
    /// A membership being added, changed or removed.
    Membership {
        organization_id: Uuid,
        target_user_id: Uuid,
        /// Current role of the target, `None` when the target is not yet a member.
        current_role: Option<Role>,
        /// Role being granted, if any.
        new_role: Option<Role>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason)),
        }
    }
}

pub trait AuthorizationPolicy: Send + Sync {
    fn evaluate(&self, subject: &Subject, action: Action, resource: &Resource) -> Decision;

    /// `evaluate` mapped to `AppError::Forbidden` on deny.
    fn authorize(
        &self,
        subject: &Subject,
        action: Action,
        resource: &Resource,
    ) -> Result<(), AppError> {
        self.evaluate(subject, action, resource).into_result()
    }
}

/// Role-table policy used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolePolicy;

fn deny(role: Role, action: Action) -> Decision {
    Decision::Deny(format!("Role {} cannot {}", role, action.describe()))
}

fn allow_if(cond: bool, role: Role, action: Action) -> Decision {
    if cond {
        Decision::Allow
    } else {
        deny(role, action)
    }
}

impl AuthorizationPolicy for RolePolicy {
    fn evaluate(&self, subject: &Subject, action: Action, resource: &Resource) -> Decision {
        let Some(role) = subject.role else {
            return Decision::Deny("Not a member of this organization".to_string());
        };

        match action {
            Action::ViewOrganization | Action::ViewMembers => Decision::Allow,
            Action::UpdateOrganization | Action::RegenerateInvite | Action::ManageCategories => {
                allow_if(role.is_manager(), role, action)
            }
            Action::DeleteOrganization => allow_if(role == Role::Owner, role, action),

            Action::AddMember | Action::ChangeMemberRole | Action::RemoveMember => {
                membership_decision(subject, role, action, resource)
            }

            Action::UploadReceipt | Action::CreateExpense => {
                allow_if(role.can_submit(), role, action)
            }
            Action::ListAllExpenses => allow_if(role != Role::Member, role, action),

            Action::ViewExpense => match resource {
                Resource::Expense { created_by, .. } => allow_if(
                    role != Role::Member || *created_by == subject.user_id,
                    role,
                    action,
                ),
                _ => deny(role, action),
            },
            Action::EditExpense | Action::DeleteExpense => match resource {
                Resource::Expense {
                    created_by, status, ..
                } => {
                    if role.is_reviewer() {
                        Decision::Allow
                    } else if *created_by != subject.user_id || !role.can_submit() {
                        deny(role, action)
                    } else if !status.is_pending() {
                        Decision::Deny(format!(
                            "{} expenses can only be changed by an owner, admin or accountant",
                            status
                        ))
                    } else {
                        Decision::Allow
                    }
                }
                _ => deny(role, action),
            },

            Action::ApproveExpense
            | Action::RejectExpense
            | Action::FlagExpense
            | Action::ViewApprovalQueue
            | Action::ExportReport => allow_if(role.is_reviewer(), role, action),
        }
    }
}

fn membership_decision(subject: &Subject, role: Role, action: Action, resource: &Resource) -> Decision {
    let Resource::Membership {
        target_user_id,
        current_role,
        new_role,
        ..
    } = resource
    else {
        return deny(role, action);
    };

    // Anyone may leave; the last-owner check happens in the store.
    if action == Action::RemoveMember && *target_user_id == subject.user_id {
        return Decision::Allow;
    }

    if !role.is_manager() {
        return deny(role, action);
    }

    let touches_owner = *current_role == Some(Role::Owner) || *new_role == Some(Role::Owner);
    if touches_owner && role != Role::Owner {
        return Decision::Deny("Only an owner can grant or revoke the owner role".to_string());
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(role: Option<Role>) -> Subject {
        Subject {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn draft_by(user_id: Uuid) -> Resource {
        Resource::Expense {
            organization_id: Uuid::new_v4(),
            created_by: user_id,
            status: ExpenseStatus::Draft,
        }
    }

    #[test]
    fn only_reviewers_approve() {
        let policy = RolePolicy;
        let expense = draft_by(Uuid::new_v4());
        for role in [Role::Owner, Role::Admin, Role::Accountant] {
            assert!(policy
                .evaluate(&subject(Some(role)), Action::ApproveExpense, &expense)
                .is_allowed());
        }
        for role in [Role::Member, Role::Viewer] {
            let err = policy
                .authorize(&subject(Some(role)), Action::ApproveExpense, &expense)
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
    }

    #[test]
    fn non_member_is_denied_everything() {
        let policy = RolePolicy;
        let org = Resource::Organization { id: Uuid::new_v4() };
        assert!(!policy
            .evaluate(&subject(None), Action::ViewOrganization, &org)
            .is_allowed());
    }

    #[test]
    fn viewer_cannot_submit() {
        let policy = RolePolicy;
        let org = Resource::Organization { id: Uuid::new_v4() };
        assert!(!policy
            .evaluate(&subject(Some(Role::Viewer)), Action::CreateExpense, &org)
            .is_allowed());
        assert!(policy
            .evaluate(&subject(Some(Role::Member)), Action::UploadReceipt, &org)
            .is_allowed());
    }

    #[test]
    fn member_edits_own_pending_expense_only() {
        let policy = RolePolicy;
        let me = subject(Some(Role::Member));
        assert!(policy
            .evaluate(&me, Action::EditExpense, &draft_by(me.user_id))
            .is_allowed());
        assert!(!policy
            .evaluate(&me, Action::EditExpense, &draft_by(Uuid::new_v4()))
            .is_allowed());

        let verified = Resource::Expense {
            organization_id: Uuid::new_v4(),
            created_by: me.user_id,
            status: ExpenseStatus::Verified,
        };
        assert!(!policy.evaluate(&me, Action::EditExpense, &verified).is_allowed());
        assert!(policy
            .evaluate(&subject(Some(Role::Accountant)), Action::EditExpense, &verified)
            .is_allowed());
    }

    #[test]
    fn member_sees_only_own_expenses() {
        let policy = RolePolicy;
        let me = subject(Some(Role::Member));
        assert!(policy
            .evaluate(&me, Action::ViewExpense, &draft_by(me.user_id))
            .is_allowed());
        assert!(!policy
            .evaluate(&me, Action::ViewExpense, &draft_by(Uuid::new_v4()))
            .is_allowed());
        assert!(policy
            .evaluate(
                &subject(Some(Role::Viewer)),
                Action::ViewExpense,
                &draft_by(Uuid::new_v4())
            )
            .is_allowed());
    }

    #[test]
    fn only_owner_touches_owner_role() {
        let policy = RolePolicy;
        let org_id = Uuid::new_v4();
        let promote = Resource::Membership {
            organization_id: org_id,
            target_user_id: Uuid::new_v4(),
            current_role: Some(Role::Member),
            new_role: Some(Role::Owner),
        };
        assert!(!policy
            .evaluate(&subject(Some(Role::Admin)), Action::ChangeMemberRole, &promote)
            .is_allowed());
        assert!(policy
            .evaluate(&subject(Some(Role::Owner)), Action::ChangeMemberRole, &promote)
            .is_allowed());

        let demote_to_viewer = Resource::Membership {
            organization_id: org_id,
            target_user_id: Uuid::new_v4(),
            current_role: Some(Role::Member),
            new_role: Some(Role::Viewer),
        };
        assert!(policy
            .evaluate(
                &subject(Some(Role::Admin)),
                Action::ChangeMemberRole,
                &demote_to_viewer
            )
            .is_allowed());
    }

    #[test]
    fn anyone_may_leave() {
        let policy = RolePolicy;
        let me = subject(Some(Role::Viewer));
        let leave = Resource::Membership {
            organization_id: Uuid::new_v4(),
            target_user_id: me.user_id,
            current_role: Some(Role::Viewer),
            new_role: None,
        };
        assert!(policy.evaluate(&me, Action::RemoveMember, &leave).is_allowed());
    }

    #[test]
    fn only_owner_deletes_organization() {
        let policy = RolePolicy;
        let org = Resource::Organization { id: Uuid::new_v4() };
        assert!(!policy
            .evaluate(&subject(Some(Role::Admin)), Action::DeleteOrganization, &org)
            .is_allowed());
        assert!(policy
            .evaluate(&subject(Some(Role::Owner)), Action::DeleteOrganization, &org)
            .is_allowed());
    }
}
