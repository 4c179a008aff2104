// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod action;
pub mod aggregate;
pub mod authorize;
pub mod entity;
pub mod filter;
pub mod group;
pub mod indexer;
pub mod permission;
pub mod summary;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;
pub mod traits;

pub use action::{Action, DashboardAction};
pub use aggregate::{
    EvaluationError, evaluate_user_permission_info, pipeline_has_only_allowed_envs,
};
pub use authorize::{
    AuthorizationError, UserRequestContext, authorize, authorize_account_permission,
    get_entity_id_filter,
};
pub use permission::{AccountPermissions, AppPermission, PermissionAttribute, PermissionType};
pub use summary::{AppPermissionSummary, UserPermissionInfo};
