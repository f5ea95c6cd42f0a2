use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekeep_auth::Principal;
use gatekeep_core::{GroupId, PermissionId, RoleId, User, UserId};
use gatekeep_infra::CascadeReport;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRolesRequest {
    pub user_ids: Vec<UserId>,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupsRequest {
    pub user_ids: Vec<UserId>,
    pub group_ids: Vec<GroupId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsEntry {
    pub role_id: RoleId,
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRolesEntry {
    pub group_id: GroupId,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNamedRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedResponse {
    pub message: String,
    pub assigned_count: u64,
}

impl AssignedResponse {
    pub fn new(what: &str, assigned_count: u64) -> Self {
        let message = if assigned_count == 0 {
            format!("no new {what} assignments; all were already present")
        } else {
            format!("{what} assigned successfully")
        };
        Self { message, assigned_count }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedResponse {
    pub message: String,
    pub removed_count: u64,
}

impl RemovedResponse {
    pub fn new(what: &str, removed_count: u64) -> Self {
        let message = if removed_count == 0 {
            format!("no matching {what} assignments to remove")
        } else {
            format!("{what} deassigned successfully")
        };
        Self { message, removed_count }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub message: String,
    pub deleted_count: u64,
    pub edges_removed: u64,
}

impl DeletedResponse {
    pub fn new(what: &str, report: CascadeReport) -> Self {
        Self {
            message: format!("{what} deleted"),
            deleted_count: report.entities_deleted,
            edges_removed: report.edges_removed,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub enabled: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            enabled: user.enabled,
            version: user.version,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalView {
    pub user_id: UserId,
    pub email: String,
    pub roles: Vec<String>,
    pub authorities: Vec<String>,
}

impl From<&Principal> for PrincipalView {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id,
            email: principal.email.clone(),
            roles: principal
                .role_authorities()
                .into_iter()
                .map(|a| a.trim_start_matches("ROLE_").to_string())
                .collect(),
            authorities: principal.authorities.iter().map(|a| a.as_str().to_string()).collect(),
        }
    }
}
