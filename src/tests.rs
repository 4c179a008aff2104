// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use crate::action::Action;
use crate::aggregate::{EvaluationError, evaluate_user_permission_info, pipeline_has_only_allowed_envs};
use crate::authorize::{
    UserRequestContext, authorize, authorize_account_permission, get_entity_id_filter,
};
use crate::entity::EnvironmentType;
use crate::filter::{AppFilter, EntityFilter, EnvFilter, GenericEntityFilter, WorkflowFilter};
use crate::group::{UserGroup, build_default_admin_user_group, build_prod_support_user_group};
use crate::permission::{AppPermission, PermissionAttribute, PermissionType};
use crate::summary::{EnvInfo, UserPermissionInfo};
use crate::test_utils::{
    MemorySource, approval_stage, env_stage, env_stage_with_variables, environment, pipeline,
    provisioner, service, template, templatized_workflow, workflow,
};

const ACCOUNT: &str = "acct1";

fn ids(values: &[&str]) -> HashSet<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn group_of(grants: Vec<AppPermission>) -> UserGroup {
    UserGroup {
        account_id: ACCOUNT.to_owned(),
        name: "group".to_owned(),
        description: String::new(),
        is_default: false,
        member_ids: Vec::new(),
        account_permissions: None,
        app_permissions: grants,
    }
}

fn grant(
    permission_type: PermissionType,
    entity_filter: Option<EntityFilter>,
    actions: &[Action],
) -> AppPermission {
    AppPermission {
        permission_type,
        app_filter: None,
        entity_filter,
        actions: actions.iter().copied().collect(),
    }
}

fn evaluate(source: &MemorySource, groups: &[UserGroup]) -> UserPermissionInfo {
    evaluate_user_permission_info(source, ACCOUNT, groups).unwrap()
}

/// One app with one entity of every type: svc1, prov1, tmpl1, env1 (prod),
/// wf1 bound to env1, pip1 executing wf1.
fn single_app_source() -> MemorySource {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.services = vec![service("app1", "svc1")];
    source.provisioners = vec![provisioner("app1", "prov1")];
    source.templates = vec![template("app1", "tmpl1")];
    source.environments = vec![environment("app1", "env1", EnvironmentType::Prod)];
    source.workflows = vec![workflow("app1", "wf1", Some("env1"))];
    source.pipelines = vec![pipeline("app1", "pip1", vec![env_stage("wf1")])];
    source
}

#[test]
fn admin_group_gets_full_access_everywhere() {
    let source = single_app_source();
    let admin = build_default_admin_user_group(ACCOUNT, None);

    let info = evaluate(&source, &[admin]);

    assert!(info.has_all_app_access);
    let summary = &info.app_permissions_internal["app1"];

    assert!(summary.can_create_service);
    assert!(summary.can_create_provisioner);
    assert!(summary.can_create_environment);
    assert!(summary.can_create_workflow);
    assert!(summary.can_create_templatized_workflow);
    assert!(summary.can_create_pipeline);
    assert!(summary.can_create_template);

    assert_eq!(summary.service_permissions[&Action::Read], ids(&["svc1"]));
    assert_eq!(summary.service_permissions[&Action::Delete], ids(&["svc1"]));
    assert_eq!(
        summary.provisioner_permissions[&Action::Update],
        ids(&["prov1"])
    );
    assert_eq!(summary.template_permissions[&Action::Read], ids(&["tmpl1"]));
    assert_eq!(
        summary.env_permissions[&Action::Read],
        HashSet::from([EnvInfo {
            env_id: "env1".to_owned(),
            env_type: EnvironmentType::Prod,
        }])
    );
    assert_eq!(summary.workflow_permissions[&Action::Read], ids(&["wf1"]));
    assert_eq!(
        summary.pipeline_permissions[&Action::ExecutePipeline],
        ids(&["pip1"])
    );
    // Deployments resolve through both workflows and pipelines.
    assert_eq!(
        summary.deployment_permissions[&Action::Read],
        ids(&["wf1", "pip1"])
    );
    assert_eq!(summary.workflow_execute_permissions_for_envs, ids(&["env1"]));
    assert_eq!(summary.pipeline_execute_permissions_for_envs, ids(&["env1"]));
}

#[test]
fn adding_groups_never_removes_access() {
    let source = single_app_source();

    let read_only = group_of(vec![grant(
        PermissionType::AllAppEntities,
        None,
        &[Action::Read],
    )]);
    let smaller = evaluate(&source, std::slice::from_ref(&read_only));

    let admin = build_default_admin_user_group(ACCOUNT, None);
    let larger = evaluate(&source, &[read_only, admin]);

    let smaller_summary = &smaller.app_permissions_internal["app1"];
    let larger_summary = &larger.app_permissions_internal["app1"];

    for (action, entity_ids) in &smaller_summary.service_permissions {
        assert!(entity_ids.is_subset(&larger_summary.service_permissions[action]));
    }
    for (action, entity_ids) in &smaller_summary.workflow_permissions {
        assert!(entity_ids.is_subset(&larger_summary.workflow_permissions[action]));
    }
    for (action, entity_ids) in &smaller_summary.deployment_permissions {
        assert!(entity_ids.is_subset(&larger_summary.deployment_permissions[action]));
    }
}

#[test]
fn env_grants_merge_by_id_and_type() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::NonProd),
    ];

    let groups = vec![group_of(vec![
        grant(
            PermissionType::Env,
            Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env1"])))),
            &[Action::Read],
        ),
        grant(
            PermissionType::Env,
            Some(EntityFilter::Env(EnvFilter::ByType(HashSet::from([
                EnvironmentType::Prod,
            ])))),
            &[Action::Update],
        ),
    ])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    let env1 = EnvInfo {
        env_id: "env1".to_owned(),
        env_type: EnvironmentType::Prod,
    };
    // env1 is selected by the first grant and is PROD, so it picks up both
    // actions; env2 matches neither grant.
    assert_eq!(
        summary.env_permissions[&Action::Read],
        HashSet::from([env1.clone()])
    );
    assert_eq!(
        summary.env_permissions[&Action::Update],
        HashSet::from([env1])
    );
}

#[test]
fn has_all_app_access_requires_every_app() {
    let mut source = MemorySource::with_app_ids(&["app1", "app2"]);
    source.services = vec![service("app1", "svc1")];

    let partial = group_of(vec![AppPermission {
        permission_type: PermissionType::AllAppEntities,
        app_filter: Some(AppFilter::Selected(ids(&["app1"]))),
        entity_filter: None,
        actions: HashSet::from([Action::Read]),
    }]);
    let info = evaluate(&source, &[partial]);
    assert_eq!(info.app_permissions_internal.len(), 1);
    assert!(!info.has_all_app_access);

    let full = group_of(vec![grant(
        PermissionType::AllAppEntities,
        None,
        &[Action::Read],
    )]);
    let info = evaluate(&source, &[full]);
    assert_eq!(info.app_permissions_internal.len(), 2);
    assert!(info.has_all_app_access);
}

#[test]
fn pipeline_needs_every_stage_covered() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::Prod),
    ];
    source.workflows = vec![
        workflow("app1", "wf1", Some("env1")),
        workflow("app1", "wf2", Some("env2")),
    ];
    source.pipelines = vec![
        pipeline("app1", "pip-both", vec![env_stage("wf1"), env_stage("wf2")]),
        pipeline("app1", "pip-one", vec![env_stage("wf1")]),
    ];

    let groups = vec![group_of(vec![grant(
        PermissionType::Pipeline,
        Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env1"])))),
        &[Action::Read],
    )])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    // pip-both has a stage into env2, which no grant covers, so it is
    // excluded even though wf1 alone would match.
    assert_eq!(summary.pipeline_permissions[&Action::Read], ids(&["pip-one"]));
}

#[test]
fn approval_only_pipeline_matches_any_env_scope() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![environment("app1", "env1", EnvironmentType::Prod)];
    source.pipelines = vec![pipeline("app1", "pip-approval", vec![approval_stage()])];

    let groups = vec![group_of(vec![grant(
        PermissionType::Pipeline,
        Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env1"])))),
        &[Action::Read],
    )])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];
    assert_eq!(
        summary.pipeline_permissions[&Action::Read],
        ids(&["pip-approval"])
    );
}

#[test]
fn unresolvable_stages_fail_open() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![environment("app1", "env1", EnvironmentType::Prod)];
    source.workflows = vec![templatized_workflow("app1", "wf-template", "env")];
    source.pipelines = vec![
        // References a workflow that does not exist.
        pipeline("app1", "pip-ghost", vec![env_stage("wf-ghost")]),
        // The environment variable stays unsubstituted.
        pipeline(
            "app1",
            "pip-unresolved",
            vec![env_stage_with_variables("wf-template", &[("env", "${env}")])],
        ),
    ];

    let groups = vec![group_of(vec![grant(
        PermissionType::Pipeline,
        Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env1"])))),
        &[Action::Read],
    )])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];
    assert_eq!(
        summary.pipeline_permissions[&Action::Read],
        ids(&["pip-ghost", "pip-unresolved"])
    );
}

#[test]
fn overlapping_pipeline_grants_narrow_to_common_actions() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::Prod),
    ];
    source.workflows = vec![
        workflow("app1", "wf1", Some("env1")),
        workflow("app1", "wf2", Some("env2")),
    ];
    source.pipelines = vec![pipeline(
        "app1",
        "pip-both",
        vec![env_stage("wf1"), env_stage("wf2")],
    )];

    let groups = vec![group_of(vec![
        grant(
            PermissionType::Pipeline,
            Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env1"])))),
            &[Action::Read, Action::Update],
        ),
        grant(
            PermissionType::Pipeline,
            Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env2"])))),
            &[Action::Read],
        ),
    ])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    // The second grant covers env2 directly and env1 through the first
    // grant's recorded actions; the overlap is read only.
    assert_eq!(summary.pipeline_permissions[&Action::Read], ids(&["pip-both"]));
    assert!(
        !summary
            .pipeline_permissions
            .get(&Action::Update)
            .is_some_and(|pipelines| pipelines.contains("pip-both"))
    );
}

#[test]
fn workflow_grants_by_entity_and_by_env() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::NonProd),
    ];
    source.workflows = vec![
        workflow("app1", "wf1", Some("env1")),
        workflow("app1", "wf2", Some("env2")),
        templatized_workflow("app1", "wf-template", "env"),
    ];

    let groups = vec![group_of(vec![
        grant(
            PermissionType::Workflow,
            Some(EntityFilter::Generic(GenericEntityFilter::Selected(ids(&[
                "wf1",
            ])))),
            &[Action::Update],
        ),
        grant(
            PermissionType::Workflow,
            Some(EntityFilter::Workflow(WorkflowFilter {
                env_types: HashSet::from([EnvironmentType::NonProd]),
                templates: true,
                env_ids: None,
            })),
            &[Action::Create, Action::Read],
        ),
    ])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    // Direct by-entity update bypasses env-based checks downstream.
    assert_eq!(summary.workflow_update_permissions_by_entity, ids(&["wf1"]));
    assert_eq!(summary.workflow_permissions[&Action::Update], ids(&["wf1"]));

    // The env-addressed grant covers non-prod and templatized workflows.
    assert_eq!(
        summary.workflow_permissions[&Action::Read],
        ids(&["wf2", "wf-template"])
    );
    assert!(summary.can_create_workflow);
    assert!(summary.can_create_templatized_workflow);
    assert_eq!(summary.workflow_create_permissions_for_envs, ids(&["env2"]));
}

#[test]
fn deployment_grant_records_env_execute_permissions() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::NonProd),
    ];
    source.workflows = vec![
        workflow("app1", "wf1", Some("env1")),
        workflow("app1", "wf2", Some("env2")),
    ];

    let groups = vec![group_of(vec![grant(
        PermissionType::Deployment,
        Some(EntityFilter::Env(EnvFilter::ByType(HashSet::from([
            EnvironmentType::Prod,
        ])))),
        &[Action::Read, Action::ExecuteWorkflow],
    )])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    assert_eq!(summary.deployment_permissions[&Action::Read], ids(&["wf1"]));
    assert_eq!(summary.workflow_execute_permissions_for_envs, ids(&["env1"]));
    assert!(summary.pipeline_execute_permissions_for_envs.is_empty());

    // Every workflow is deployable, but only into the granted environments.
    let deployable: Vec<_> = summary
        .env_executable_element_deploy_permissions
        .iter()
        .map(|(element, env_ids)| (element.entity_id.clone(), env_ids.clone()))
        .collect();
    assert!(deployable.contains(&("wf1".to_owned(), ids(&["env1"]))));
    assert!(deployable.contains(&("wf2".to_owned(), ids(&["env1"]))));
}

#[test]
fn deployment_grant_with_no_matching_envs_grants_nothing() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![environment("app1", "env1", EnvironmentType::Prod)];
    source.workflows = vec![workflow("app1", "wf1", Some("env1"))];

    let groups = vec![group_of(vec![grant(
        PermissionType::Deployment,
        Some(EntityFilter::Env(EnvFilter::Selected(ids(&["env-other"])))),
        &[Action::Read, Action::ExecuteWorkflow],
    )])];

    let info = evaluate(&source, &groups);
    let summary = &info.app_permissions_internal["app1"];

    assert!(summary.deployment_permissions.is_empty());
    assert!(summary.workflow_execute_permissions_for_envs.is_empty());
}

#[test]
fn prod_support_group_is_limited_to_prod() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "prod-env", EnvironmentType::Prod),
        environment("app1", "dev-env", EnvironmentType::NonProd),
    ];
    source.workflows = vec![
        workflow("app1", "wf-prod", Some("prod-env")),
        workflow("app1", "wf-dev", Some("dev-env")),
    ];

    let info = evaluate(&source, &[build_prod_support_user_group(ACCOUNT)]);
    let summary = &info.app_permissions_internal["app1"];

    let prod_env = EnvInfo {
        env_id: "prod-env".to_owned(),
        env_type: EnvironmentType::Prod,
    };
    assert_eq!(
        summary.env_permissions[&Action::Read],
        HashSet::from([prod_env])
    );
    assert!(summary.workflow_permissions[&Action::Read].contains("wf-prod"));
    assert!(!summary.workflow_permissions[&Action::Read].contains("wf-dev"));

    // The deployment grant is execute-only within prod environments.
    assert_eq!(
        summary.workflow_execute_permissions_for_envs,
        ids(&["prod-env"])
    );
    assert!(summary.can_create_workflow);
    assert!(summary.can_create_environment);
    assert_eq!(
        summary.env_create_permissions_for_env_types,
        HashSet::from([EnvironmentType::Prod])
    );
}

#[test]
fn mismatched_filter_shape_is_an_error() {
    let source = single_app_source();
    let groups = vec![group_of(vec![grant(
        PermissionType::Service,
        Some(EntityFilter::Env(EnvFilter::default())),
        &[Action::Read],
    )])];

    let result = evaluate_user_permission_info(&source, ACCOUNT, &groups);
    assert!(matches!(
        result,
        Err(EvaluationError::InvalidFilterType { .. })
    ));
}

#[test]
fn fetch_failure_aborts_the_evaluation() {
    let mut source = single_app_source();
    source.fail_fetches = true;

    let groups = vec![group_of(vec![grant(
        PermissionType::Service,
        None,
        &[Action::Read],
    )])];

    let result = evaluate_user_permission_info(&source, ACCOUNT, &groups);
    assert!(matches!(result, Err(EvaluationError::EntityFetch(_))));
}

#[test]
fn pipeline_env_containment_check() {
    let mut source = MemorySource::with_app_ids(&["app1"]);
    source.environments = vec![
        environment("app1", "env1", EnvironmentType::Prod),
        environment("app1", "env2", EnvironmentType::Prod),
    ];
    source.workflows = vec![
        workflow("app1", "wf1", Some("env1")),
        workflow("app1", "wf2", Some("env2")),
    ];
    let pip = pipeline("app1", "pip1", vec![env_stage("wf1"), env_stage("wf2")]);

    assert!(pipeline_has_only_allowed_envs(&source, &pip, &ids(&["env1", "env2"])).unwrap());
    assert!(!pipeline_has_only_allowed_envs(&source, &pip, &ids(&["env1"])).unwrap());

    // A pipeline with no stages is trivially contained.
    let empty = pipeline("app1", "pip-empty", Vec::new());
    assert!(pipeline_has_only_allowed_envs(&source, &empty, &HashSet::new()).unwrap());
}

#[test]
fn authorize_checks_the_snapshot() {
    let source = single_app_source();
    let admin = build_default_admin_user_group(ACCOUNT, None);
    let info = evaluate(&source, &[admin]);

    let context = UserRequestContext {
        account_id: ACCOUNT.to_owned(),
        permission_info: Some(info),
    };

    let read_service = [PermissionAttribute::new(PermissionType::Service, Action::Read)];
    let app_ids = vec!["app1".to_owned()];

    assert!(authorize(Some(&context), &read_service, &app_ids, "svc1").is_ok());
    assert!(authorize(Some(&context), &read_service, &app_ids, "svc-unknown").is_err());

    // Create checks go through the per-type flags.
    let create_service = [PermissionAttribute::new(
        PermissionType::Service,
        Action::Create,
    )];
    assert!(authorize(Some(&context), &create_service, &app_ids, "ignored").is_ok());

    // No context means RBAC is disabled for the request.
    assert!(authorize(None, &read_service, &app_ids, "svc-unknown").is_ok());

    // A context without a snapshot denies.
    let empty_context = UserRequestContext {
        account_id: ACCOUNT.to_owned(),
        permission_info: None,
    };
    assert!(authorize(Some(&empty_context), &read_service, &app_ids, "svc1").is_err());
}

#[test]
fn account_permission_check_intersects() {
    let source = single_app_source();
    let admin = build_default_admin_user_group(ACCOUNT, None);
    let info = evaluate(&source, &[admin]);

    let context = UserRequestContext {
        account_id: ACCOUNT.to_owned(),
        permission_info: Some(info),
    };

    let manage = [PermissionAttribute::new(
        PermissionType::AccountManagement,
        Action::Read,
    )];
    assert!(authorize_account_permission(Some(&context), &manage).is_ok());

    let restricted = [PermissionAttribute::new(
        PermissionType::ManageRestrictedAccess,
        Action::Read,
    )];
    assert!(authorize_account_permission(Some(&context), &restricted).is_err());
}

#[test]
fn entity_id_filter_unions_over_apps_and_attributes() {
    let mut source = MemorySource::with_app_ids(&["app1", "app2"]);
    source.services = vec![service("app1", "svc1"), service("app2", "svc2")];
    source.environments = vec![environment("app1", "env1", EnvironmentType::Prod)];

    let groups = vec![group_of(vec![
        grant(PermissionType::Service, None, &[Action::Read]),
        grant(PermissionType::Env, None, &[Action::Read]),
    ])];
    let info = evaluate(&source, &groups);

    let attributes = [
        PermissionAttribute::new(PermissionType::Service, Action::Read),
        PermissionAttribute::new(PermissionType::Env, Action::Read),
    ];

    let app_ids = vec!["app1".to_owned(), "app2".to_owned()];
    assert_eq!(
        get_entity_id_filter(&attributes, &info, &app_ids),
        ids(&["svc1", "svc2", "env1"])
    );

    // Unknown apps contribute nothing.
    let unknown = vec!["app-unknown".to_owned()];
    assert!(get_entity_id_filter(&attributes, &info, &unknown).is_empty());
}
