// SPDX-License-Identifier: MIT OR Apache-2.0

//! Determines which entity types an evaluation needs, fetches them and groups
//! them by owning application.

use std::collections::{HashMap, HashSet};

use crate::aggregate::EvaluationError;
use crate::entity::{AppEntity, Environment, Pipeline, Provisioner, Service, Template, Workflow};
use crate::filter::AppFilter;
use crate::group::UserGroup;
use crate::permission::{APP_ENTITY_TYPES, PermissionType};
use crate::traits::EntitySource;

/// Per entity type, the applications whose entities the evaluation must see.
pub type RequiredAppIds = HashMap<PermissionType, HashSet<String>>;

/// Scan all grants to determine which entity types need fetching and for
/// which applications, including derived requirements: pipelines resolve
/// through workflows, and workflows and deployments resolve through
/// environments.
pub fn collect_required_app_ids(
    user_groups: &[UserGroup],
    all_app_ids: &HashSet<String>,
) -> RequiredAppIds {
    let mut required: RequiredAppIds = APP_ENTITY_TYPES
        .iter()
        .map(|permission_type| (*permission_type, HashSet::new()))
        .collect();

    for group in user_groups {
        for permission in &group.app_permissions {
            let app_ids = AppFilter::apply(permission.app_filter.as_ref(), all_app_ids);
            if app_ids.is_empty() {
                continue;
            }

            if permission.permission_type == PermissionType::AllAppEntities {
                for permission_type in APP_ENTITY_TYPES {
                    required
                        .entry(permission_type)
                        .or_default()
                        .extend(app_ids.iter().cloned());
                }
            } else {
                required
                    .entry(permission.permission_type)
                    .or_default()
                    .extend(app_ids);
            }
        }
    }

    // Closure over the indirection, after the per-grant pass: pipelines
    // execute via workflows, and workflows and deployments execute against
    // environments.
    let pipeline_apps = required[&PermissionType::Pipeline].clone();
    required
        .entry(PermissionType::Workflow)
        .or_default()
        .extend(pipeline_apps);

    let workflow_apps = required[&PermissionType::Workflow].clone();
    let deployment_apps = required[&PermissionType::Deployment].clone();
    let env_apps = required.entry(PermissionType::Env).or_default();
    env_apps.extend(workflow_apps);
    env_apps.extend(deployment_apps);

    required
}

/// All fetched entities of one evaluation, grouped by owning application.
/// Applications without entities of a type simply have no key; consumers read
/// through the `*_for` accessors which treat absence as empty.
#[derive(Debug, Default)]
pub struct EntityIndex {
    pub services: HashMap<String, Vec<Service>>,
    pub provisioners: HashMap<String, Vec<Provisioner>>,
    pub environments: HashMap<String, Vec<Environment>>,
    pub workflows: HashMap<String, Vec<Workflow>>,
    pub pipelines: HashMap<String, Vec<Pipeline>>,
    pub templates: HashMap<String, Vec<Template>>,
}

impl EntityIndex {
    pub fn services_for(&self, app_id: &str) -> &[Service] {
        self.services.get(app_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn provisioners_for(&self, app_id: &str) -> &[Provisioner] {
        self.provisioners
            .get(app_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn environments_for(&self, app_id: &str) -> &[Environment] {
        self.environments
            .get(app_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn workflows_for(&self, app_id: &str) -> &[Workflow] {
        self.workflows.get(app_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pipelines_for(&self, app_id: &str) -> &[Pipeline] {
        self.pipelines.get(app_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn templates_for(&self, app_id: &str) -> &[Template] {
        self.templates.get(app_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn group_by_app<E: AppEntity>(entities: Vec<E>) -> HashMap<String, Vec<E>> {
    let mut grouped: HashMap<String, Vec<E>> = HashMap::new();
    for entity in entities {
        grouped
            .entry(entity.app_id().to_owned())
            .or_default()
            .push(entity);
    }
    grouped
}

/// Fetch every required entity type for the account and group by app id.
/// Requiring pipelines or deployments pulls workflows in too, since both
/// resolve through them.
pub fn fetch_required_entities<S: EntitySource>(
    source: &S,
    account_id: &str,
    required: &RequiredAppIds,
) -> Result<EntityIndex, EvaluationError<S::Error>> {
    let needs = |permission_type: PermissionType| {
        required
            .get(&permission_type)
            .is_some_and(|app_ids| !app_ids.is_empty())
    };

    let mut index = EntityIndex::default();

    if needs(PermissionType::Service) {
        index.services = group_by_app(
            source
                .services(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }
    if needs(PermissionType::Provisioner) {
        index.provisioners = group_by_app(
            source
                .provisioners(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }
    if needs(PermissionType::Env) {
        index.environments = group_by_app(
            source
                .environments(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }
    if needs(PermissionType::Workflow)
        || needs(PermissionType::Pipeline)
        || needs(PermissionType::Deployment)
    {
        index.workflows = group_by_app(
            source
                .workflows(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }
    if needs(PermissionType::Pipeline) || needs(PermissionType::Deployment) {
        index.pipelines = group_by_app(
            source
                .pipelines(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }
    if needs(PermissionType::AppTemplate) {
        index.templates = group_by_app(
            source
                .templates(account_id)
                .map_err(EvaluationError::EntityFetch)?,
        );
    }

    Ok(index)
}
