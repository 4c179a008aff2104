// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization queries over an evaluated permission snapshot. Failures here
//! are per-call: they never invalidate a published snapshot.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::action::Action;
use crate::aggregate::EvaluationError;
use crate::filter::{AppFilter, EnvFilter};
use crate::permission::{PermissionAttribute, PermissionType};
use crate::summary::UserPermissionInfo;
use crate::traits::EntitySource;

/// Errors raised by authorization queries.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("user not authorized")]
    UserNotAuthorized,

    /// The queried permission type has no per-entity tracking for the
    /// requested action (e.g. create on deployments).
    #[error("unsupported permission type for this check: {0:?}")]
    UnsupportedPermissionType(PermissionType),
}

/// Per-request authorization context, passed explicitly into every check.
///
/// `permission_info` is the snapshot evaluated at login or session refresh;
/// `None` means no snapshot was computed for the session, which denies
/// everything.
#[derive(Clone, Debug)]
pub struct UserRequestContext {
    pub account_id: String,
    pub permission_info: Option<UserPermissionInfo>,
}

/// Check that every required permission holds for `entity_id` in every given
/// application.
///
/// A request without a context has RBAC disabled and passes implicitly.
pub fn authorize(
    context: Option<&UserRequestContext>,
    required: &[PermissionAttribute],
    app_ids: &[String],
    entity_id: &str,
) -> Result<(), AuthorizationError> {
    let Some(context) = context else {
        return Ok(());
    };
    let Some(info) = &context.permission_info else {
        return Err(AuthorizationError::UserNotAuthorized);
    };

    for app_id in app_ids {
        for attribute in required {
            if !authorize_access_type(info, app_id, entity_id, attribute)? {
                warn!("user not authorized for {entity_id} in app {app_id}");
                return Err(AuthorizationError::UserNotAuthorized);
            }
        }
    }

    Ok(())
}

fn authorize_access_type(
    info: &UserPermissionInfo,
    app_id: &str,
    entity_id: &str,
    attribute: &PermissionAttribute,
) -> Result<bool, AuthorizationError> {
    let Some(summary) = info.app_permissions_internal.get(app_id) else {
        return Ok(false);
    };

    if attribute.action == Action::Create {
        return match attribute.permission_type {
            PermissionType::Service => Ok(summary.can_create_service),
            PermissionType::Provisioner => Ok(summary.can_create_provisioner),
            PermissionType::Env => Ok(summary.can_create_environment),
            PermissionType::Workflow => Ok(summary.can_create_workflow),
            PermissionType::Pipeline => Ok(summary.can_create_pipeline),
            PermissionType::AppTemplate => Ok(summary.can_create_template),
            other => Err(AuthorizationError::UnsupportedPermissionType(other)),
        };
    }

    if attribute.permission_type == PermissionType::Env {
        let authorized = summary
            .env_permissions
            .get(&attribute.action)
            .is_some_and(|envs| envs.iter().any(|env| env.env_id == entity_id));
        return Ok(authorized);
    }

    let Some(permissions) = summary.permissions_for(attribute.permission_type) else {
        return Err(AuthorizationError::UnsupportedPermissionType(
            attribute.permission_type,
        ));
    };

    Ok(permissions
        .get(&attribute.action)
        .is_some_and(|entity_ids| entity_ids.contains(entity_id)))
}

/// Account-level check: at least one required attribute's permission type
/// must be present in the account permission set. A missing snapshot is a
/// denial, not a crash.
pub fn authorize_account_permission(
    context: Option<&UserRequestContext>,
    required: &[PermissionAttribute],
) -> Result<(), AuthorizationError> {
    let Some(context) = context else {
        return Ok(());
    };
    let Some(info) = &context.permission_info else {
        return Err(AuthorizationError::UserNotAuthorized);
    };

    let permissions = &info.account_permissions.permissions;
    let authorized = required
        .iter()
        .any(|attribute| permissions.contains(&attribute.permission_type));

    if !authorized {
        warn!(
            "user not authorized, required one of {:?}",
            required
                .iter()
                .map(|attribute| attribute.permission_type)
                .collect::<Vec<_>>()
        );
        return Err(AuthorizationError::UserNotAuthorized);
    }

    Ok(())
}

/// Allow-list of entity ids for listing endpoints: the union over `app_ids`
/// and `required` of the ids the snapshot records under each attribute's
/// action. Absent summaries contribute nothing; the result narrows, never
/// widens.
pub fn get_entity_id_filter(
    required: &[PermissionAttribute],
    info: &UserPermissionInfo,
    app_ids: &[String],
) -> HashSet<String> {
    let mut entity_ids = HashSet::new();

    for app_id in app_ids {
        let Some(summary) = info.app_permissions_internal.get(app_id) else {
            continue;
        };

        for attribute in required {
            if attribute.permission_type == PermissionType::Env {
                if let Some(envs) = summary.env_permissions.get(&attribute.action) {
                    entity_ids.extend(envs.iter().map(|env| env.env_id.clone()));
                }
                continue;
            }

            if let Some(permissions) = summary.permissions_for(attribute.permission_type)
                && let Some(ids) = permissions.get(&attribute.action)
            {
                entity_ids.extend(ids.iter().cloned());
            }
        }
    }

    entity_ids
}

/// Resolve an app filter against the account's applications.
pub fn get_app_ids_by_filter<S: EntitySource>(
    source: &S,
    account_id: &str,
    filter: Option<&AppFilter>,
) -> Result<HashSet<String>, EvaluationError<S::Error>> {
    let all_app_ids = source
        .app_ids(account_id)
        .map_err(EvaluationError::EntityFetch)?;
    Ok(AppFilter::apply(filter, &all_app_ids))
}

/// Resolve an env filter against one application's environments.
pub fn get_env_ids_by_filter<S: EntitySource>(
    source: &S,
    account_id: &str,
    app_id: &str,
    filter: Option<&EnvFilter>,
) -> Result<HashSet<String>, EvaluationError<S::Error>> {
    let environments: Vec<_> = source
        .environments(account_id)
        .map_err(EvaluationError::EntityFetch)?
        .into_iter()
        .filter(|environment| environment.app_id == app_id)
        .collect();
    Ok(EnvFilter::env_ids(filter, &environments))
}
