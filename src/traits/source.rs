// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::error::Error;

use crate::entity::{Environment, Pipeline, Provisioner, Service, Template, Workflow};

/// Read-only access to the entity catalog of an account.
///
/// All aggregation inputs are fetched through this trait before the
/// evaluation pass runs. A failed fetch aborts the whole evaluation: it is
/// unsafe to authorize against a partial view.
pub trait EntitySource {
    type Error: Error;

    /// Ids of every application in the account.
    fn app_ids(&self, account_id: &str) -> Result<HashSet<String>, Self::Error>;

    fn services(&self, account_id: &str) -> Result<Vec<Service>, Self::Error>;

    fn provisioners(&self, account_id: &str) -> Result<Vec<Provisioner>, Self::Error>;

    fn environments(&self, account_id: &str) -> Result<Vec<Environment>, Self::Error>;

    fn workflows(&self, account_id: &str) -> Result<Vec<Workflow>, Self::Error>;

    fn pipelines(&self, account_id: &str) -> Result<Vec<Pipeline>, Self::Error>;

    fn templates(&self, account_id: &str) -> Result<Vec<Template>, Self::Error>;

    /// Single workflow lookup, used when pipeline resolution hits a workflow
    /// the per-app cache does not hold.
    fn workflow(&self, app_id: &str, workflow_id: &str) -> Result<Option<Workflow>, Self::Error>;

    /// Batch workflow lookup, used to fill the per-app cache in one round
    /// trip instead of one query per referenced workflow.
    fn workflows_by_ids(&self, workflow_ids: &HashSet<String>)
    -> Result<Vec<Workflow>, Self::Error>;

    /// Resolve the environment a workflow targets, substituting the template
    /// variable of an environment-parameterized workflow from the supplied
    /// values. `None` when the workflow has no environment, the expression is
    /// malformed or no value was supplied.
    fn resolve_env_id(
        &self,
        workflow: &Workflow,
        variables: &HashMap<String, String>,
    ) -> Option<String> {
        match workflow.env_template_expression() {
            Some(expression) => {
                let name = expression.variable_name()?;
                variables.get(name).cloned()
            }
            None => workflow.env_id.clone(),
        }
    }
}
