// SPDX-License-Identifier: MIT OR Apache-2.0

//! User groups and the built-in default groups every account starts with.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::entity::EnvironmentType;
use crate::filter::{AppFilter, EntityFilter, EnvFilter, GenericEntityFilter, WorkflowFilter};
use crate::permission::{AccountPermissions, AppPermission, PermissionType};

pub const DEFAULT_ACCOUNT_ADMIN_USER_GROUP_NAME: &str = "Account Administrator";
pub const DEFAULT_PROD_SUPPORT_USER_GROUP_NAME: &str = "Production Support";
pub const DEFAULT_NON_PROD_SUPPORT_USER_GROUP_NAME: &str = "Non-Production Support";

const DEFAULT_USER_GROUP_DESCRIPTION: &str = "Default account admin user group";
const DEFAULT_PROD_SUPPORT_USER_GROUP_DESCRIPTION: &str =
    "Production Support members have access to override configuration, \
     setup infrastructure and setup/execute deployment workflows within PROD environments";
const DEFAULT_NON_PROD_SUPPORT_USER_GROUP_DESCRIPTION: &str =
    "Non-production Support members have access to override configuration, \
     setup infrastructure and setup/execute deployment workflows within NON_PROD environments";

/// A named set of users and the grants they share. Groups are maintained by
/// administrators and are read-only input to the aggregation engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserGroup {
    pub account_id: String,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub member_ids: Vec<String>,
    pub account_permissions: Option<AccountPermissions>,
    pub app_permissions: Vec<AppPermission>,
}

/// The default administrator group: every enabled account permission plus
/// full access to every entity of every application.
pub fn build_default_admin_user_group(account_id: &str, member_id: Option<&str>) -> UserGroup {
    let all_entities = AppPermission {
        permission_type: PermissionType::AllAppEntities,
        app_filter: Some(AppFilter::All),
        entity_filter: None,
        actions: all_actions(),
    };

    UserGroup {
        account_id: account_id.to_owned(),
        name: DEFAULT_ACCOUNT_ADMIN_USER_GROUP_NAME.to_owned(),
        description: DEFAULT_USER_GROUP_DESCRIPTION.to_owned(),
        is_default: true,
        member_ids: member_id.map(str::to_owned).into_iter().collect(),
        account_permissions: Some(AccountPermissions {
            permissions: default_enabled_account_permissions(),
        }),
        app_permissions: vec![all_entities],
    }
}

/// A read-only group: audit visibility on the account, read access on every
/// entity of every application.
pub fn build_read_only_user_group(
    account_id: &str,
    member_id: Option<&str>,
    name: &str,
) -> UserGroup {
    let read_everything = AppPermission {
        permission_type: PermissionType::AllAppEntities,
        app_filter: Some(AppFilter::All),
        entity_filter: None,
        actions: HashSet::from([Action::Read]),
    };

    UserGroup {
        account_id: account_id.to_owned(),
        name: name.to_owned(),
        description: DEFAULT_USER_GROUP_DESCRIPTION.to_owned(),
        is_default: true,
        member_ids: member_id.map(str::to_owned).into_iter().collect(),
        account_permissions: Some(AccountPermissions {
            permissions: HashSet::from([PermissionType::AuditViewer]),
        }),
        app_permissions: vec![read_everything],
    }
}

pub fn build_prod_support_user_group(account_id: &str) -> UserGroup {
    build_support_user_group(
        account_id,
        EnvironmentType::Prod,
        DEFAULT_PROD_SUPPORT_USER_GROUP_NAME,
        DEFAULT_PROD_SUPPORT_USER_GROUP_DESCRIPTION,
        true,
    )
}

pub fn build_non_prod_support_user_group(account_id: &str) -> UserGroup {
    build_support_user_group(
        account_id,
        EnvironmentType::NonProd,
        DEFAULT_NON_PROD_SUPPORT_USER_GROUP_NAME,
        DEFAULT_NON_PROD_SUPPORT_USER_GROUP_DESCRIPTION,
        true,
    )
}

/// Support groups manage configuration and run deployments within one
/// environment type only.
fn build_support_user_group(
    account_id: &str,
    env_type: EnvironmentType,
    name: &str,
    description: &str,
    is_default: bool,
) -> UserGroup {
    let actions = non_deployment_actions();
    let all_apps = Some(AppFilter::All);
    let env_types = HashSet::from([env_type]);

    let service = AppPermission {
        permission_type: PermissionType::Service,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Generic(GenericEntityFilter::All)),
        actions: actions.clone(),
    };
    let provisioner = AppPermission {
        permission_type: PermissionType::Provisioner,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Generic(GenericEntityFilter::All)),
        actions: actions.clone(),
    };
    let environment = AppPermission {
        permission_type: PermissionType::Env,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Env(EnvFilter::ByType(env_types.clone()))),
        actions: actions.clone(),
    };
    let workflow = AppPermission {
        permission_type: PermissionType::Workflow,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Workflow(WorkflowFilter {
            env_types: env_types.clone(),
            templates: true,
            env_ids: None,
        })),
        actions: actions.clone(),
    };
    let deployment = AppPermission {
        permission_type: PermissionType::Deployment,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Env(EnvFilter::ByType(env_types.clone()))),
        actions: HashSet::from([
            Action::Read,
            Action::ExecuteWorkflow,
            Action::ExecutePipeline,
            Action::ExecuteWorkflowRollback,
            Action::AbortWorkflow,
        ]),
    };
    let pipeline = AppPermission {
        permission_type: PermissionType::Pipeline,
        app_filter: all_apps.clone(),
        entity_filter: Some(EntityFilter::Env(EnvFilter::ByType(env_types))),
        actions: actions.clone(),
    };
    let template = AppPermission {
        permission_type: PermissionType::AppTemplate,
        app_filter: all_apps,
        entity_filter: Some(EntityFilter::Generic(GenericEntityFilter::All)),
        actions,
    };

    UserGroup {
        account_id: account_id.to_owned(),
        name: name.to_owned(),
        description: description.to_owned(),
        is_default,
        member_ids: Vec::new(),
        account_permissions: Some(AccountPermissions {
            permissions: HashSet::from([PermissionType::AuditViewer]),
        }),
        app_permissions: vec![
            service,
            provisioner,
            environment,
            workflow,
            deployment,
            pipeline,
            template,
        ],
    }
}

/// Every account-level permission type.
pub fn all_account_permissions() -> HashSet<PermissionType> {
    HashSet::from([
        PermissionType::UserPermissionManagement,
        PermissionType::UserPermissionRead,
        PermissionType::AccountManagement,
        PermissionType::ManageApplications,
        PermissionType::TemplateManagement,
        PermissionType::AuditViewer,
        PermissionType::ManageTags,
        PermissionType::ManageAccountDefaults,
        PermissionType::ManageCloudProviders,
        PermissionType::ManageConnectors,
        PermissionType::ManageApplicationStacks,
        PermissionType::ManageDelegates,
        PermissionType::ManageAlertNotificationRules,
        PermissionType::ManageDelegateProfiles,
        PermissionType::ManageConfigAsCode,
        PermissionType::ManageSecrets,
        PermissionType::ManageSecretManagers,
        PermissionType::ManageAuthenticationSettings,
        PermissionType::ManageIpAllowlist,
        PermissionType::ManageDeploymentFreezes,
        PermissionType::ManagePipelineGovernanceStandards,
        PermissionType::ManageApiKeys,
        PermissionType::ManageCustomDashboards,
        PermissionType::CreateCustomDashboards,
        PermissionType::ManageSshAndWinrm,
        PermissionType::ManageRestrictedAccess,
    ])
}

/// Account permissions enabled on the default admin group. Restricted-access
/// management stays off until explicitly granted.
pub fn default_enabled_account_permissions() -> HashSet<PermissionType> {
    let mut permissions = all_account_permissions();
    permissions.remove(&PermissionType::ManageRestrictedAccess);
    permissions
}

pub fn all_actions() -> HashSet<Action> {
    HashSet::from([
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::ExecuteWorkflow,
        Action::ExecuteWorkflowRollback,
        Action::AbortWorkflow,
        Action::ExecutePipeline,
    ])
}

pub fn non_deployment_actions() -> HashSet<Action> {
    HashSet::from([
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
    ])
}
