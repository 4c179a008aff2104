// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Operations a grant can authorize on application entities.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    ExecuteWorkflow,
    ExecuteWorkflowRollback,
    ExecutePipeline,
    AbortWorkflow,
}

impl Action {
    /// Actions tracked against individual entity ids. `Create` is excluded:
    /// it is recorded as a per-type flag, never per entity.
    pub const FIXED_ENTITY_ACTIONS: [Action; 7] = [
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::ExecutePipeline,
        Action::ExecuteWorkflow,
        Action::ExecuteWorkflowRollback,
        Action::AbortWorkflow,
    ];
}

/// Actions on dashboards. Dashboard permissions are computed by the dashboard
/// feature on top of the evaluated permission info; the engine only carries
/// them on the final result.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum DashboardAction {
    Read,
    Update,
    Delete,
    Manage,
}
