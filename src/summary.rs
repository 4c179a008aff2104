// SPDX-License-Identifier: MIT OR Apache-2.0

//! The aggregated output model: per-application and account-level permission
//! summaries, queried (never recomputed) on each authorization check.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::action::{Action, DashboardAction};
use crate::entity::EnvironmentType;
use crate::filter::ExecutableElementKind;
use crate::permission::PermissionType;

/// An authorized environment: id plus its type tag.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct EnvInfo {
    pub env_id: String,
    pub env_type: EnvironmentType,
}

/// A deployable element (pipeline or workflow) authorized for deployment into
/// a set of environments.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ExecutableElementInfo {
    pub entity_id: String,
    pub entity_kind: ExecutableElementKind,
}

/// Fully resolved permissions for one application, merged across every grant
/// of every user group.
///
/// An entity id appears under an action only if some grant, after filter
/// evaluation, authorized that action on it; merging is union-only, so no
/// grant ever revokes what another grant established.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppPermissionSummary {
    pub can_create_service: bool,
    pub can_create_provisioner: bool,
    pub can_create_environment: bool,
    pub can_create_workflow: bool,
    /// Whether workflows parameterized by environment may be created; only
    /// set by environment-addressed workflow grants carrying the templates
    /// tag.
    pub can_create_templatized_workflow: bool,
    pub can_create_pipeline: bool,
    pub can_create_template: bool,

    pub service_permissions: HashMap<Action, HashSet<String>>,
    pub provisioner_permissions: HashMap<Action, HashSet<String>>,
    pub env_permissions: HashMap<Action, HashSet<EnvInfo>>,
    pub workflow_permissions: HashMap<Action, HashSet<String>>,
    pub pipeline_permissions: HashMap<Action, HashSet<String>>,
    pub deployment_permissions: HashMap<Action, HashSet<String>>,
    pub template_permissions: HashMap<Action, HashSet<String>>,

    /// Environment types new environments may be created with.
    pub env_create_permissions_for_env_types: HashSet<EnvironmentType>,

    pub workflow_create_permissions_for_envs: HashSet<String>,
    pub workflow_update_permissions_for_envs: HashSet<String>,
    /// Workflows granted update directly by id; these bypass the
    /// environment-based checks downstream.
    pub workflow_update_permissions_by_entity: HashSet<String>,

    pub pipeline_create_permissions_for_envs: HashSet<String>,
    pub pipeline_update_permissions_for_envs: HashSet<String>,
    /// Pipelines granted update directly by id.
    pub pipeline_update_permissions_by_entity: HashSet<String>,

    pub workflow_execute_permissions_for_envs: HashSet<String>,
    pub pipeline_execute_permissions_for_envs: HashSet<String>,
    pub rollback_workflow_execute_permissions_for_envs: HashSet<String>,
    pub abort_workflow_execute_permissions_for_envs: HashSet<String>,

    /// Per deployable element, the environments it may be deployed into.
    pub env_executable_element_deploy_permissions:
        HashMap<ExecutableElementInfo, HashSet<String>>,
}

impl AppPermissionSummary {
    /// The action-to-ids map of an entity-id-addressed permission type.
    /// Environments are tracked as [`EnvInfo`] sets and account-level types
    /// have no entity map; both return `None`.
    pub fn permissions_for(
        &self,
        permission_type: PermissionType,
    ) -> Option<&HashMap<Action, HashSet<String>>> {
        match permission_type {
            PermissionType::Service => Some(&self.service_permissions),
            PermissionType::Provisioner => Some(&self.provisioner_permissions),
            PermissionType::Workflow => Some(&self.workflow_permissions),
            PermissionType::Pipeline => Some(&self.pipeline_permissions),
            PermissionType::Deployment => Some(&self.deployment_permissions),
            PermissionType::AppTemplate => Some(&self.template_permissions),
            _ => None,
        }
    }
}

/// The id-to-actions transposition of [`AppPermissionSummary`], the shape the
/// UI consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppPermissionSummaryForUi {
    pub can_create_service: bool,
    pub can_create_provisioner: bool,
    pub can_create_environment: bool,
    pub can_create_workflow: bool,
    pub can_create_pipeline: bool,
    pub can_create_template: bool,

    pub service_permissions: HashMap<String, HashSet<Action>>,
    pub provisioner_permissions: HashMap<String, HashSet<Action>>,
    pub env_permissions: HashMap<String, HashSet<Action>>,
    pub workflow_permissions: HashMap<String, HashSet<Action>>,
    pub pipeline_permissions: HashMap<String, HashSet<Action>>,
    pub deployment_permissions: HashMap<String, HashSet<Action>>,
    pub template_permissions: HashMap<String, HashSet<Action>>,
}

impl From<&AppPermissionSummary> for AppPermissionSummaryForUi {
    fn from(summary: &AppPermissionSummary) -> Self {
        AppPermissionSummaryForUi {
            can_create_service: summary.can_create_service,
            can_create_provisioner: summary.can_create_provisioner,
            can_create_environment: summary.can_create_environment,
            can_create_workflow: summary.can_create_workflow,
            can_create_pipeline: summary.can_create_pipeline,
            can_create_template: summary.can_create_template,
            service_permissions: transpose_entity_actions(&summary.service_permissions),
            provisioner_permissions: transpose_entity_actions(&summary.provisioner_permissions),
            env_permissions: transpose_env_actions(&summary.env_permissions),
            workflow_permissions: transpose_entity_actions(&summary.workflow_permissions),
            pipeline_permissions: transpose_entity_actions(&summary.pipeline_permissions),
            deployment_permissions: transpose_entity_actions(&summary.deployment_permissions),
            template_permissions: transpose_entity_actions(&summary.template_permissions),
        }
    }
}

/// Transpose an action-to-ids map into the id-to-actions form.
fn transpose_entity_actions(
    from: &HashMap<Action, HashSet<String>>,
) -> HashMap<String, HashSet<Action>> {
    let mut to: HashMap<String, HashSet<Action>> = HashMap::new();
    for (action, entity_ids) in from {
        for entity_id in entity_ids {
            to.entry(entity_id.clone()).or_default().insert(*action);
        }
    }
    to
}

fn transpose_env_actions(
    from: &HashMap<Action, HashSet<EnvInfo>>,
) -> HashMap<String, HashSet<Action>> {
    let mut to: HashMap<String, HashSet<Action>> = HashMap::new();
    for (action, envs) in from {
        for env in envs {
            to.entry(env.env_id.clone()).or_default().insert(*action);
        }
    }
    to
}

/// Account-level permission summary: the flat union of all account permission
/// sets across the user's groups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountPermissionSummary {
    pub permissions: HashSet<PermissionType>,
}

/// The complete evaluated permission snapshot for one user on one account.
///
/// Built once per evaluation and treated as immutable afterwards; callers
/// cache it against the session and query it on every authorization check.
/// `dashboard_permissions` is filled by the dashboard feature before the
/// value is published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPermissionInfo {
    pub account_id: String,
    /// UI-shaped per-app summaries (id to actions).
    pub app_permissions: HashMap<String, AppPermissionSummaryForUi>,
    /// Internal per-app summaries (action to ids), the form authorization
    /// checks query.
    pub app_permissions_internal: HashMap<String, AppPermissionSummary>,
    pub account_permissions: AccountPermissionSummary,
    /// Whether the summaries cover every application of the account.
    pub has_all_app_access: bool,
    pub dashboard_permissions: HashMap<String, HashSet<DashboardAction>>,
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    #[test]
    fn ui_form_round_trips_to_action_map() {
        let mut summary = AppPermissionSummary::default();
        summary.service_permissions.insert(
            Action::Read,
            HashSet::from(["svc1".to_owned(), "svc2".to_owned()]),
        );
        summary
            .service_permissions
            .insert(Action::Update, HashSet::from(["svc1".to_owned()]));

        let ui = AppPermissionSummaryForUi::from(&summary);
        assert_eq!(
            ui.service_permissions["svc1"],
            HashSet::from([Action::Read, Action::Update])
        );
        assert_eq!(
            ui.service_permissions["svc2"],
            HashSet::from([Action::Read])
        );

        // Transposing back recovers the original action-to-ids map.
        let mut back: HashMap<Action, HashSet<String>> = HashMap::new();
        for (entity_id, actions) in &ui.service_permissions {
            for action in actions {
                back.entry(*action).or_default().insert(entity_id.clone());
            }
        }
        assert_eq!(back, summary.service_permissions);
    }

    #[test]
    fn env_transposition_keys_by_env_id() {
        let mut summary = AppPermissionSummary::default();
        summary.env_permissions.insert(
            Action::Read,
            HashSet::from([EnvInfo {
                env_id: "env1".to_owned(),
                env_type: crate::entity::EnvironmentType::Prod,
            }]),
        );

        let ui = AppPermissionSummaryForUi::from(&summary);
        assert_eq!(ui.env_permissions["env1"], HashSet::from([Action::Read]));
    }
}
