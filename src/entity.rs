// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-model projections of the entities permissions are granted on. Each
//! carries the minimal fields the aggregation needs: id, owning application
//! and the type-specific attributes filters match against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field name a template expression must bind to make a workflow's
/// environment execution-time parameterized.
const ENV_ID_FIELD: &str = "envId";

/// Coarse classification of environments, used by environment-shaped filters
/// as an alternative to explicit ids.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EnvironmentType {
    Prod,
    NonProd,
}

/// Accessors shared by every per-application entity projection.
pub trait AppEntity {
    fn id(&self) -> &str;

    fn app_id(&self) -> &str;
}

macro_rules! impl_app_entity {
    ($($entity:ty),+) => {
        $(impl AppEntity for $entity {
            fn id(&self) -> &str {
                &self.id
            }

            fn app_id(&self) -> &str {
                &self.app_id
            }
        })+
    };
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub app_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provisioner {
    pub id: String,
    pub app_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub app_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub app_id: String,
    pub environment_type: EnvironmentType,
}

/// A template expression binding one workflow field to an execution-time
/// variable, e.g. field `envId` to `${env}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateExpression {
    pub field_name: String,
    pub expression: String,
}

impl TemplateExpression {
    /// The bare variable name inside a `${...}` expression.
    pub fn variable_name(&self) -> Option<&str> {
        self.expression
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub app_id: String,
    /// Environment the workflow executes against; `None` for
    /// environment-agnostic workflows.
    pub env_id: Option<String>,
    pub template_expressions: Vec<TemplateExpression>,
}

impl Workflow {
    /// Whether the workflow's environment is bound to a template expression
    /// and supplied at execution time.
    pub fn is_env_templatized(&self) -> bool {
        self.env_template_expression().is_some()
    }

    /// The template expression bound to the environment field, if any.
    pub fn env_template_expression(&self) -> Option<&TemplateExpression> {
        self.template_expressions
            .iter()
            .find(|expression| expression.field_name == ENV_ID_FIELD)
    }
}

/// Kind of a pipeline stage element. Approval stages carry no workflow and
/// match environment-scoped grants vacuously.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum StageElementKind {
    Approval,
    EnvState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageElement {
    pub kind: StageElementKind,
    /// Workflow the stage executes; absent when the stage was saved without
    /// one bound yet.
    pub workflow_id: Option<String>,
    /// Variable values supplied to the workflow, including the environment
    /// variable of templatized workflows.
    pub workflow_variables: HashMap<String, String>,
    /// When set, an empty environment resolution is accepted instead of
    /// asserted on.
    pub disable_assertion: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub elements: Vec<PipelineStageElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub app_id: String,
    pub stages: Vec<PipelineStage>,
}

impl_app_entity!(Service, Provisioner, Template, Environment, Workflow, Pipeline);

/// Whether a value is still an unsubstituted `${...}` template expression.
pub fn is_variable_expression(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}')
}
