// SPDX-License-Identifier: MIT OR Apache-2.0

//! The permission aggregation pass: applies every grant of every user group
//! to the fetched entity catalog and merges the results into one queryable
//! snapshot per application.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::action::Action;
use crate::entity::{
    Environment, Pipeline, PipelineStageElement, StageElementKind, Workflow,
    is_variable_expression,
};
use crate::filter::{
    AppFilter, EntityFilter, EnvFilter, ExecutableElementKind, GenericEntityFilter, WorkflowFilter,
};
use crate::group::UserGroup;
use crate::indexer::{EntityIndex, collect_required_app_ids, fetch_required_entities};
use crate::permission::PermissionType;
use crate::summary::{
    AccountPermissionSummary, AppPermissionSummary, AppPermissionSummaryForUi, EnvInfo,
    ExecutableElementInfo, UserPermissionInfo,
};
use crate::traits::EntitySource;

/// Errors that abort a permission evaluation. No partial snapshot is ever
/// returned: authorizing against an incomplete view is unsafe.
#[derive(Debug, Error)]
pub enum EvaluationError<E: std::error::Error> {
    /// A grant carries an entity filter whose shape does not fit its
    /// permission type. Always a defect in upstream data.
    #[error("invalid entity filter for {permission_type:?} permission, expected {expected} filter")]
    InvalidFilterType {
        permission_type: PermissionType,
        expected: &'static str,
    },

    /// A fetch on the entity source failed.
    #[error("entity fetch failed: {0}")]
    EntityFetch(E),
}

/// Mutable state shared by all grants within one evaluation pass: for every
/// environment, the actions grants have already authorized against it.
/// Pipeline grants and deployment grants accumulate separately. Discarded
/// when the pass ends.
#[derive(Default)]
struct AggregationScratch {
    env_actions_for_pipeline: HashMap<String, HashSet<Action>>,
    env_actions_for_deployment: HashMap<String, HashSet<Action>>,
}

/// Evaluate the complete permission snapshot for one user: every application
/// the groups grant access to, with per-entity action sets resolved through
/// the grant filters and merged across groups.
pub fn evaluate_user_permission_info<S: EntitySource>(
    source: &S,
    account_id: &str,
    user_groups: &[UserGroup],
) -> Result<UserPermissionInfo, EvaluationError<S::Error>> {
    let account_permissions = collect_account_permissions(user_groups);

    let all_app_ids = source
        .app_ids(account_id)
        .map_err(EvaluationError::EntityFetch)?;

    let required = collect_required_app_ids(user_groups, &all_app_ids);
    let index = fetch_required_entities(source, account_id, &required)?;

    let app_permissions_internal =
        populate_app_permissions(source, user_groups, &index, &all_app_ids)?;

    let has_all_app_access = all_app_ids.len() <= app_permissions_internal.len();
    let app_permissions = app_permissions_internal
        .iter()
        .map(|(app_id, summary)| (app_id.clone(), AppPermissionSummaryForUi::from(summary)))
        .collect();

    debug!(
        "evaluated permissions for {} of {} apps in account {account_id}",
        app_permissions_internal.len(),
        all_app_ids.len()
    );

    Ok(UserPermissionInfo {
        account_id: account_id.to_owned(),
        app_permissions,
        app_permissions_internal,
        account_permissions: AccountPermissionSummary {
            permissions: account_permissions,
        },
        has_all_app_access,
        dashboard_permissions: HashMap::new(),
    })
}

fn collect_account_permissions(user_groups: &[UserGroup]) -> HashSet<PermissionType> {
    let mut permissions = HashSet::new();
    for group in user_groups {
        if let Some(account_permissions) = &group.account_permissions {
            permissions.extend(account_permissions.permissions.iter().copied());
        }
    }
    permissions
}

fn populate_app_permissions<S: EntitySource>(
    source: &S,
    user_groups: &[UserGroup],
    index: &EntityIndex,
    all_app_ids: &HashSet<String>,
) -> Result<HashMap<String, AppPermissionSummary>, EvaluationError<S::Error>> {
    let mut summaries: HashMap<String, AppPermissionSummary> = HashMap::new();
    let mut scratch = AggregationScratch::default();

    for group in user_groups {
        for permission in &group.app_permissions {
            if permission.actions.is_empty() {
                warn!("grant has no actions for apps {:?}", permission.app_filter);
                continue;
            }

            let app_ids = AppFilter::apply(permission.app_filter.as_ref(), all_app_ids);

            match permission.permission_type {
                PermissionType::AllAppEntities => {
                    // Entity filters are ignored: an all-entities grant means
                    // full access within every type.
                    for permission_type in [
                        PermissionType::Service,
                        PermissionType::Provisioner,
                        PermissionType::Env,
                        PermissionType::Workflow,
                        PermissionType::Deployment,
                        PermissionType::AppTemplate,
                    ] {
                        attach_permission(
                            &mut summaries,
                            index,
                            &app_ids,
                            permission_type,
                            None,
                            &permission.actions,
                        )?;
                    }
                    attach_pipeline_permission(
                        source,
                        &mut scratch.env_actions_for_pipeline,
                        &mut summaries,
                        index,
                        &app_ids,
                        PermissionType::Pipeline,
                        None,
                        &permission.actions,
                    )?;
                    attach_pipeline_permission(
                        source,
                        &mut scratch.env_actions_for_deployment,
                        &mut summaries,
                        index,
                        &app_ids,
                        PermissionType::Deployment,
                        None,
                        &permission.actions,
                    )?;
                }
                PermissionType::Pipeline => {
                    attach_pipeline_permission(
                        source,
                        &mut scratch.env_actions_for_pipeline,
                        &mut summaries,
                        index,
                        &app_ids,
                        PermissionType::Pipeline,
                        permission.entity_filter.as_ref(),
                        &permission.actions,
                    )?;
                }
                permission_type => {
                    attach_permission(
                        &mut summaries,
                        index,
                        &app_ids,
                        permission_type,
                        permission.entity_filter.as_ref(),
                        &permission.actions,
                    )?;

                    if permission_type == PermissionType::Deployment {
                        attach_pipeline_permission(
                            source,
                            &mut scratch.env_actions_for_deployment,
                            &mut summaries,
                            index,
                            &app_ids,
                            PermissionType::Deployment,
                            permission.entity_filter.as_ref(),
                            &permission.actions,
                        )?;
                    }
                }
            }
        }
    }

    Ok(summaries)
}

/// The subset of a grant's actions that is tracked per entity.
fn fixed_actions(actions: &HashSet<Action>) -> HashSet<Action> {
    actions
        .iter()
        .copied()
        .filter(|action| Action::FIXED_ENTITY_ACTIONS.contains(action))
        .collect()
}

fn generic_filter<'a, E: std::error::Error>(
    entity_filter: Option<&'a EntityFilter>,
    permission_type: PermissionType,
) -> Result<Option<&'a GenericEntityFilter>, EvaluationError<E>> {
    match entity_filter {
        None => Ok(None),
        Some(filter) => match filter.as_generic() {
            Some(filter) => Ok(Some(filter)),
            None => Err(EvaluationError::InvalidFilterType {
                permission_type,
                expected: "id-based",
            }),
        },
    }
}

fn env_filter_of<E: std::error::Error>(
    entity_filter: Option<&EntityFilter>,
    permission_type: PermissionType,
) -> Result<Option<EnvFilter>, EvaluationError<E>> {
    match entity_filter {
        None => Ok(None),
        Some(filter) => match filter.as_env() {
            Some(filter) => Ok(Some(filter)),
            None => Err(EvaluationError::InvalidFilterType {
                permission_type,
                expected: "environment-based",
            }),
        },
    }
}

fn workflow_filter_of<'a, E: std::error::Error>(
    entity_filter: Option<&'a EntityFilter>,
    permission_type: PermissionType,
) -> Result<Option<&'a WorkflowFilter>, EvaluationError<E>> {
    match entity_filter {
        None => Ok(None),
        Some(filter) => match filter.as_workflow() {
            Some(filter) => Ok(Some(filter)),
            None => Err(EvaluationError::InvalidFilterType {
                permission_type,
                expected: "workflow",
            }),
        },
    }
}

fn merge_action_entity_map(
    map: &mut HashMap<Action, HashSet<String>>,
    entity_ids: &HashSet<String>,
    actions: &HashSet<Action>,
) {
    for action in actions {
        map.entry(*action)
            .or_default()
            .extend(entity_ids.iter().cloned());
    }
}

fn merge_action_env_map(
    map: &mut HashMap<Action, HashSet<EnvInfo>>,
    envs: &HashSet<EnvInfo>,
    actions: &HashSet<Action>,
) {
    for action in actions {
        map.entry(*action).or_default().extend(envs.iter().cloned());
    }
}

/// Merge a per-pipeline action multimap into an action-to-ids map. Unlike the
/// plain entity merge, every pipeline can carry a different action set after
/// narrowing.
fn merge_action_pipeline_map(
    map: &mut HashMap<Action, HashSet<String>>,
    pipeline_actions: &HashMap<String, HashSet<Action>>,
) {
    for (pipeline_id, actions) in pipeline_actions {
        for action in actions {
            map.entry(*action).or_default().insert(pipeline_id.clone());
        }
    }
}

fn attach_permission<E: std::error::Error>(
    summaries: &mut HashMap<String, AppPermissionSummary>,
    index: &EntityIndex,
    app_ids: &HashSet<String>,
    permission_type: PermissionType,
    entity_filter: Option<&EntityFilter>,
    actions: &HashSet<Action>,
) -> Result<(), EvaluationError<E>> {
    let entity_actions = fixed_actions(actions);
    let create = actions.contains(&Action::Create);

    for app_id in app_ids {
        let summary = summaries.entry(app_id.clone()).or_default();

        match permission_type {
            PermissionType::Service => {
                if create {
                    summary.can_create_service = true;
                }
                if entity_actions.is_empty() {
                    continue;
                }
                let filter = generic_filter(entity_filter, permission_type)?;
                let entity_ids = GenericEntityFilter::apply(filter, index.services_for(app_id));
                if entity_ids.is_empty() {
                    continue;
                }
                merge_action_entity_map(&mut summary.service_permissions, &entity_ids, &entity_actions);
            }
            PermissionType::Provisioner => {
                if create {
                    summary.can_create_provisioner = true;
                }
                if entity_actions.is_empty() {
                    continue;
                }
                let filter = generic_filter(entity_filter, permission_type)?;
                let entity_ids =
                    GenericEntityFilter::apply(filter, index.provisioners_for(app_id));
                if entity_ids.is_empty() {
                    continue;
                }
                merge_action_entity_map(
                    &mut summary.provisioner_permissions,
                    &entity_ids,
                    &entity_actions,
                );
            }
            PermissionType::AppTemplate => {
                if create {
                    summary.can_create_template = true;
                }
                if entity_actions.is_empty() {
                    continue;
                }
                let filter = generic_filter(entity_filter, permission_type)?;
                let entity_ids = GenericEntityFilter::apply(filter, index.templates_for(app_id));
                if entity_ids.is_empty() {
                    continue;
                }
                merge_action_entity_map(
                    &mut summary.template_permissions,
                    &entity_ids,
                    &entity_actions,
                );
            }
            PermissionType::Env => {
                let filter = env_filter_of(entity_filter, permission_type)?;
                if create {
                    summary.can_create_environment = true;
                    summary
                        .env_create_permissions_for_env_types
                        .extend(EnvFilter::create_env_types(filter.as_ref()));
                }
                if entity_actions.is_empty() {
                    continue;
                }
                let env_infos = EnvFilter::env_infos(filter.as_ref(), index.environments_for(app_id));
                if env_infos.is_empty() {
                    continue;
                }
                merge_action_env_map(&mut summary.env_permissions, &env_infos, &entity_actions);
            }
            PermissionType::Workflow => {
                if entity_filter.is_some_and(EntityFilter::is_generic) {
                    // Permission granted directly on named workflows.
                    let filter = generic_filter(entity_filter, permission_type)?;
                    if create {
                        summary.can_create_workflow = true;
                    }
                    if entity_actions.is_empty() {
                        continue;
                    }
                    let workflow_ids =
                        GenericEntityFilter::apply(filter, index.workflows_for(app_id));
                    if entity_actions.contains(&Action::Update) {
                        // Direct per-entity update grants bypass the
                        // environment-based checks downstream.
                        summary
                            .workflow_update_permissions_by_entity
                            .extend(workflow_ids.iter().cloned());
                    }
                    if workflow_ids.is_empty() {
                        continue;
                    }
                    merge_action_entity_map(
                        &mut summary.workflow_permissions,
                        &workflow_ids,
                        &entity_actions,
                    );
                } else {
                    // Permission granted indirectly through environments.
                    let filter = workflow_filter_of(entity_filter, permission_type)?;
                    let environments = index.environments_for(app_id);
                    let env_view = WorkflowFilter::as_env_filter(filter);

                    if create {
                        summary.can_create_workflow = true;
                        let env_ids = EnvFilter::env_ids(Some(&env_view), environments);
                        summary
                            .workflow_create_permissions_for_envs
                            .extend(env_ids);

                        if !summary.can_create_templatized_workflow {
                            summary.can_create_templatized_workflow =
                                WorkflowFilter::effective(filter).templates;
                        }
                    }
                    if entity_actions.is_empty() {
                        continue;
                    }
                    if entity_actions.contains(&Action::Update) {
                        let env_ids = EnvFilter::env_ids(Some(&env_view), environments);
                        summary
                            .workflow_update_permissions_for_envs
                            .extend(env_ids);
                    }
                    let workflow_ids = WorkflowFilter::workflow_ids(
                        filter,
                        index.workflows_for(app_id),
                        environments,
                    );
                    if workflow_ids.is_empty() {
                        continue;
                    }
                    merge_action_entity_map(
                        &mut summary.workflow_permissions,
                        &workflow_ids,
                        &entity_actions,
                    );
                }
            }
            PermissionType::Deployment => {
                // Deployments have no create flag: they exist only as the
                // result of executing workflows and pipelines.
                if entity_actions.is_empty() {
                    continue;
                }
                let filter = env_filter_of(entity_filter, permission_type)?;
                let environments = index.environments_for(app_id);
                let deployment_ids = deployment_ids_by_filter(
                    index.workflows_for(app_id),
                    environments,
                    filter.as_ref(),
                    app_id,
                );
                if deployment_ids.is_empty() {
                    continue;
                }
                merge_action_entity_map(
                    &mut summary.deployment_permissions,
                    &deployment_ids,
                    &entity_actions,
                );

                let env_ids = EnvFilter::env_ids(filter.as_ref(), environments);
                if entity_actions.contains(&Action::ExecuteWorkflow) {
                    summary
                        .workflow_execute_permissions_for_envs
                        .extend(env_ids.iter().cloned());
                }
                if entity_actions.contains(&Action::ExecutePipeline) {
                    summary
                        .pipeline_execute_permissions_for_envs
                        .extend(env_ids.iter().cloned());
                }
                if entity_actions.contains(&Action::ExecuteWorkflowRollback) {
                    summary
                        .rollback_workflow_execute_permissions_for_envs
                        .extend(env_ids.iter().cloned());
                }
                if entity_actions.contains(&Action::AbortWorkflow) {
                    summary
                        .abort_workflow_execute_permissions_for_envs
                        .extend(env_ids.iter().cloned());
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn attach_pipeline_permission<S: EntitySource>(
    source: &S,
    env_actions: &mut HashMap<String, HashSet<Action>>,
    summaries: &mut HashMap<String, AppPermissionSummary>,
    index: &EntityIndex,
    app_ids: &HashSet<String>,
    permission_type: PermissionType,
    entity_filter: Option<&EntityFilter>,
    actions: &HashSet<Action>,
) -> Result<(), EvaluationError<S::Error>> {
    let entity_actions = fixed_actions(actions);
    let create = actions.contains(&Action::Create);

    for app_id in app_ids {
        let summary = summaries.entry(app_id.clone()).or_default();
        let pipelines = index.pipelines_for(app_id);
        let environments = index.environments_for(app_id);

        match permission_type {
            PermissionType::Pipeline => {
                if entity_filter.is_some_and(EntityFilter::is_generic) {
                    // Permission granted directly on named pipelines.
                    let filter = generic_filter(entity_filter, permission_type)?;
                    if create {
                        summary.can_create_pipeline = true;
                    }
                    if entity_actions.is_empty() {
                        continue;
                    }
                    let pipeline_ids = GenericEntityFilter::apply(filter, pipelines);
                    if entity_actions.contains(&Action::Update) {
                        summary
                            .pipeline_update_permissions_by_entity
                            .extend(pipeline_ids.iter().cloned());
                    }
                    let pipeline_actions: HashMap<String, HashSet<Action>> = pipeline_ids
                        .into_iter()
                        .map(|pipeline_id| (pipeline_id, entity_actions.clone()))
                        .collect();
                    merge_action_pipeline_map(&mut summary.pipeline_permissions, &pipeline_actions);
                } else {
                    // Permission granted indirectly through environments.
                    let filter = env_filter_of(entity_filter, permission_type)?;
                    if create {
                        summary.can_create_pipeline = true;
                        let env_ids = EnvFilter::env_ids(filter.as_ref(), environments);
                        summary
                            .pipeline_create_permissions_for_envs
                            .extend(env_ids);
                    }
                    if entity_actions.is_empty() {
                        continue;
                    }
                    if entity_actions.contains(&Action::Update) {
                        let env_ids = EnvFilter::env_ids(filter.as_ref(), environments);
                        summary
                            .pipeline_update_permissions_for_envs
                            .extend(env_ids);
                    }

                    let mut workflow_cache = workflow_cache_for_app(index, app_id);
                    let pipeline_actions = pipeline_ids_by_filter(
                        source,
                        pipelines,
                        environments,
                        filter.as_ref(),
                        env_actions,
                        &entity_actions,
                        &mut workflow_cache,
                        app_id,
                    )?;
                    merge_action_pipeline_map(&mut summary.pipeline_permissions, &pipeline_actions);
                }
            }
            PermissionType::Deployment => {
                if entity_actions.is_empty() {
                    continue;
                }
                let filter = env_filter_of(entity_filter, permission_type)?;

                let mut workflow_cache = workflow_cache_for_app(index, app_id);
                let pipeline_actions = pipeline_ids_by_filter(
                    source,
                    pipelines,
                    environments,
                    filter.as_ref(),
                    env_actions,
                    &entity_actions,
                    &mut workflow_cache,
                    app_id,
                )?;
                merge_action_pipeline_map(&mut summary.deployment_permissions, &pipeline_actions);

                build_pipeline_env_map(
                    pipelines,
                    environments,
                    entity_filter,
                    filter.as_ref(),
                    &entity_actions,
                    &mut summary.env_executable_element_deploy_permissions,
                );
                build_workflow_env_map(
                    index.workflows_for(app_id),
                    environments,
                    entity_filter,
                    filter.as_ref(),
                    &entity_actions,
                    &mut summary.env_executable_element_deploy_permissions,
                );
            }
            _ => {}
        }
    }

    Ok(())
}

/// Seed the per-app workflow cache from the fetched workflow index.
fn workflow_cache_for_app(index: &EntityIndex, app_id: &str) -> HashMap<String, Workflow> {
    index
        .workflows_for(app_id)
        .iter()
        .map(|workflow| (workflow.id.clone(), workflow.clone()))
        .collect()
}

/// Deployments are addressed through the workflows that produce them: the env
/// filter widens into a workflow filter (templatized workflows included) and
/// selects workflow ids.
fn deployment_ids_by_filter(
    workflows: &[Workflow],
    environments: &[Environment],
    env_filter: Option<&EnvFilter>,
    app_id: &str,
) -> HashSet<String> {
    let workflow_filter = WorkflowFilter::from_env_filter(env_filter);

    if !environments.is_empty() {
        let env_ids = EnvFilter::env_ids(env_filter, environments);
        if env_ids.is_empty() {
            debug!("no environments matched the deployment filter for app {app_id}");
            return HashSet::new();
        }
    }

    WorkflowFilter::workflow_ids(Some(&workflow_filter), workflows, environments)
}

/// Extend the per-app workflow cache with every workflow the pipelines' stage
/// elements reference, in one batch fetch.
fn fill_workflow_cache<S: EntitySource>(
    source: &S,
    workflow_cache: &mut HashMap<String, Workflow>,
    pipelines: &[Pipeline],
) -> Result<(), EvaluationError<S::Error>> {
    let mut missing: HashSet<String> = HashSet::new();
    for pipeline in pipelines {
        for stage in &pipeline.stages {
            for element in &stage.elements {
                if let Some(workflow_id) = &element.workflow_id
                    && !workflow_cache.contains_key(workflow_id)
                {
                    missing.insert(workflow_id.clone());
                }
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    for workflow in source
        .workflows_by_ids(&missing)
        .map_err(EvaluationError::EntityFetch)?
    {
        workflow_cache.insert(workflow.id.clone(), workflow);
    }

    Ok(())
}

/// Resolve which pipelines an environment-scoped grant covers, and with which
/// actions.
///
/// A pipeline is covered only if every stage element resolves to an
/// authorized environment. Stages resolving to environments that only another
/// grant authorized narrow the pipeline's action set to the overlap with that
/// grant's actions for the environment.
fn pipeline_ids_by_filter<S: EntitySource>(
    source: &S,
    pipelines: &[Pipeline],
    environments: &[Environment],
    env_filter: Option<&EnvFilter>,
    env_actions: &mut HashMap<String, HashSet<Action>>,
    grant_actions: &HashSet<Action>,
    workflow_cache: &mut HashMap<String, Workflow>,
    app_id: &str,
) -> Result<HashMap<String, HashSet<Action>>, EvaluationError<S::Error>> {
    let mut pipeline_actions: HashMap<String, HashSet<Action>> = HashMap::new();
    if pipelines.is_empty() {
        return Ok(pipeline_actions);
    }

    let env_ids = if environments.is_empty() {
        HashSet::new()
    } else {
        let env_ids = EnvFilter::env_ids(env_filter, environments);
        // Record this grant's environments so pipelines resolved under later
        // grants can match against them.
        for env_id in &env_ids {
            env_actions
                .entry(env_id.clone())
                .or_default()
                .extend(grant_actions.iter().copied());
        }
        env_ids
    };

    fill_workflow_cache(source, workflow_cache, pipelines)?;

    for pipeline in pipelines {
        let mut entity_actions = grant_actions.clone();
        let mut matched = true;

        'stages: for stage in &pipeline.stages {
            for element in &stage.elements {
                let stage_matched =
                    match resolve_env_for_stage_element(source, app_id, element, workflow_cache)? {
                        StageEnvResolution::Vacuous(verdict) => verdict,
                        StageEnvResolution::Env(env_id) => {
                            if env_ids.contains(&env_id) {
                                true
                            } else if let Some(other_actions) = env_actions.get(&env_id) {
                                entity_actions.retain(|action| other_actions.contains(action));
                                true
                            } else {
                                false
                            }
                        }
                    };

                if !stage_matched {
                    matched = false;
                    break 'stages;
                }
            }
        }

        if matched {
            pipeline_actions
                .entry(pipeline.id.clone())
                .or_default()
                .extend(entity_actions.iter().copied());
        }
    }

    Ok(pipeline_actions)
}

/// Outcome of resolving one pipeline stage element to an environment.
enum StageEnvResolution {
    /// No concrete environment; the boolean is the stage's verdict.
    Vacuous(bool),
    Env(String),
}

/// Resolve the environment a pipeline stage element executes against.
///
/// Approval stages carry no environment and match vacuously. Elements whose
/// environment cannot be resolved (missing workflow, unresolved template
/// variable, disabled assertion on an empty resolution) deliberately match:
/// unresolvable indirection must not block otherwise-legitimate pipelines.
fn resolve_env_for_stage_element<S: EntitySource>(
    source: &S,
    app_id: &str,
    element: &PipelineStageElement,
    workflow_cache: &mut HashMap<String, Workflow>,
) -> Result<StageEnvResolution, EvaluationError<S::Error>> {
    if element.kind == StageElementKind::Approval {
        return Ok(StageEnvResolution::Vacuous(true));
    }

    let Some(workflow_id) = &element.workflow_id else {
        return Ok(StageEnvResolution::Vacuous(false));
    };

    let env_id = resolve_env_id(source, app_id, workflow_id, element, workflow_cache)?;
    match env_id {
        None => Ok(StageEnvResolution::Vacuous(true)),
        Some(env_id) if element.disable_assertion && env_id.is_empty() => {
            Ok(StageEnvResolution::Vacuous(true))
        }
        Some(env_id) if is_variable_expression(&env_id) => Ok(StageEnvResolution::Vacuous(true)),
        Some(env_id) => Ok(StageEnvResolution::Env(env_id)),
    }
}

fn resolve_env_id<S: EntitySource>(
    source: &S,
    app_id: &str,
    workflow_id: &str,
    element: &PipelineStageElement,
    workflow_cache: &mut HashMap<String, Workflow>,
) -> Result<Option<String>, EvaluationError<S::Error>> {
    if let Some(workflow) = workflow_cache.get(workflow_id) {
        return Ok(source.resolve_env_id(workflow, &element.workflow_variables));
    }

    debug!("workflow not found in cache: {workflow_id}");
    let Some(workflow) = source
        .workflow(app_id, workflow_id)
        .map_err(EvaluationError::EntityFetch)?
    else {
        return Ok(None);
    };

    let env_id = source.resolve_env_id(&workflow, &element.workflow_variables);
    workflow_cache.insert(workflow_id.to_owned(), workflow);
    Ok(env_id)
}

/// For deployment grants carrying ExecutePipeline, map each covered pipeline
/// to the environments it may be deployed into.
fn build_pipeline_env_map(
    pipelines: &[Pipeline],
    environments: &[Environment],
    entity_filter: Option<&EntityFilter>,
    env_filter: Option<&EnvFilter>,
    entity_actions: &HashSet<Action>,
    permissions: &mut HashMap<ExecutableElementInfo, HashSet<String>>,
) {
    if pipelines.is_empty() || !entity_actions.contains(&Action::ExecutePipeline) {
        return;
    }

    // Plain env filters widen to every pipeline; only an explicit
    // executable-elements filter narrows by pipeline id.
    let element_filter = match entity_filter {
        Some(EntityFilter::Executable(filter))
            if filter.element_kind == ExecutableElementKind::Pipeline =>
        {
            Some(&filter.elements)
        }
        _ => None,
    };

    let env_ids = EnvFilter::env_ids(env_filter, environments);
    for pipeline_id in GenericEntityFilter::apply(element_filter, pipelines) {
        let element = ExecutableElementInfo {
            entity_id: pipeline_id,
            entity_kind: ExecutableElementKind::Pipeline,
        };
        permissions
            .entry(element)
            .or_default()
            .extend(env_ids.iter().cloned());
    }
}

/// For deployment grants carrying ExecuteWorkflow, map each covered workflow
/// to the environments it may be deployed into.
fn build_workflow_env_map(
    workflows: &[Workflow],
    environments: &[Environment],
    entity_filter: Option<&EntityFilter>,
    env_filter: Option<&EnvFilter>,
    entity_actions: &HashSet<Action>,
    permissions: &mut HashMap<ExecutableElementInfo, HashSet<String>>,
) {
    if workflows.is_empty() || !entity_actions.contains(&Action::ExecuteWorkflow) {
        return;
    }

    let element_filter = match entity_filter {
        Some(EntityFilter::Executable(filter))
            if filter.element_kind == ExecutableElementKind::Workflow =>
        {
            Some(&filter.elements)
        }
        _ => None,
    };

    let env_ids = EnvFilter::env_ids(env_filter, environments);
    for workflow_id in GenericEntityFilter::apply(element_filter, workflows) {
        let element = ExecutableElementInfo {
            entity_id: workflow_id,
            entity_kind: ExecutableElementKind::Workflow,
        };
        permissions
            .entry(element)
            .or_default()
            .extend(env_ids.iter().cloned());
    }
}

/// Whether every stage of `pipeline` resolves into `allowed_env_ids`.
/// Unresolvable stages pass, consistent with the aggregation's fail-open
/// handling of broken indirection.
pub fn pipeline_has_only_allowed_envs<S: EntitySource>(
    source: &S,
    pipeline: &Pipeline,
    allowed_env_ids: &HashSet<String>,
) -> Result<bool, EvaluationError<S::Error>> {
    let mut workflow_cache = HashMap::new();
    fill_workflow_cache(source, &mut workflow_cache, std::slice::from_ref(pipeline))?;

    for stage in &pipeline.stages {
        for element in &stage.elements {
            match resolve_env_for_stage_element(
                source,
                &pipeline.app_id,
                element,
                &mut workflow_cache,
            )? {
                StageEnvResolution::Vacuous(true) => {}
                StageEnvResolution::Vacuous(false) => return Ok(false),
                StageEnvResolution::Env(env_id) => {
                    if !allowed_env_ids.contains(&env_id) {
                        return Ok(false);
                    }
                }
            }
        }
    }

    Ok(true)
}
