// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::filter::{AppFilter, EntityFilter};

/// Permission types, covering both per-application entity types and
/// account-level administration rights.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum PermissionType {
    // App entity permissions.
    Service,
    Provisioner,
    Env,
    Workflow,
    Pipeline,
    Deployment,
    AppTemplate,

    /// Full access on every app entity type; the grant's entity filter is
    /// ignored.
    AllAppEntities,

    // Account-level permissions.
    UserPermissionManagement,
    UserPermissionRead,
    AccountManagement,
    ManageApplications,
    TemplateManagement,
    AuditViewer,
    ManageTags,
    ManageAccountDefaults,
    ManageCloudProviders,
    ManageConnectors,
    ManageApplicationStacks,
    ManageDelegates,
    ManageAlertNotificationRules,
    ManageDelegateProfiles,
    ManageConfigAsCode,
    ManageSecrets,
    ManageSecretManagers,
    ManageAuthenticationSettings,
    ManageIpAllowlist,
    ManageDeploymentFreezes,
    ManagePipelineGovernanceStandards,
    ManageApiKeys,
    ManageCustomDashboards,
    CreateCustomDashboards,
    ManageSshAndWinrm,
    ManageRestrictedAccess,
}

/// The app entity types a grant can address directly. `AllAppEntities` grants
/// expand over exactly this list.
pub const APP_ENTITY_TYPES: [PermissionType; 7] = [
    PermissionType::Service,
    PermissionType::Provisioner,
    PermissionType::Env,
    PermissionType::Workflow,
    PermissionType::Pipeline,
    PermissionType::Deployment,
    PermissionType::AppTemplate,
];

/// A single grant inside a user group: a permission type scoped to a set of
/// applications and, within each, to a subset of entities.
///
/// Absent filters widen rather than narrow: no app filter means every
/// application of the account, no entity filter means the type-specific
/// default (all entities, or all environment types).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppPermission {
    pub permission_type: PermissionType,
    pub app_filter: Option<AppFilter>,
    pub entity_filter: Option<EntityFilter>,
    pub actions: HashSet<Action>,
}

/// Account-level permission set carried by a user group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountPermissions {
    pub permissions: HashSet<PermissionType>,
}

/// A single required permission for an authorization check.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PermissionAttribute {
    pub permission_type: PermissionType,
    pub action: Action,
}

impl PermissionAttribute {
    pub fn new(permission_type: PermissionType, action: Action) -> Self {
        Self {
            permission_type,
            action,
        }
    }
}
