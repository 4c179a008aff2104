// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities: entity fixtures and an in-memory entity source.

mod memory_source;

use std::collections::HashMap;

pub use memory_source::{MemorySource, MemorySourceError};

use crate::entity::{
    Environment, EnvironmentType, Pipeline, PipelineStage, PipelineStageElement, Provisioner,
    Service, StageElementKind, Template, TemplateExpression, Workflow,
};

#[cfg(feature = "test_utils")]
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

pub fn service(app_id: &str, id: &str) -> Service {
    Service {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
    }
}

pub fn provisioner(app_id: &str, id: &str) -> Provisioner {
    Provisioner {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
    }
}

pub fn template(app_id: &str, id: &str) -> Template {
    Template {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
    }
}

pub fn environment(app_id: &str, id: &str, environment_type: EnvironmentType) -> Environment {
    Environment {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
        environment_type,
    }
}

/// A workflow bound to a fixed environment (or none).
pub fn workflow(app_id: &str, id: &str, env_id: Option<&str>) -> Workflow {
    Workflow {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
        env_id: env_id.map(str::to_owned),
        template_expressions: Vec::new(),
    }
}

/// A workflow whose environment is supplied at execution time through the
/// given variable.
pub fn templatized_workflow(app_id: &str, id: &str, variable: &str) -> Workflow {
    Workflow {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
        env_id: None,
        template_expressions: vec![TemplateExpression {
            field_name: "envId".to_owned(),
            expression: format!("${{{variable}}}"),
        }],
    }
}

pub fn pipeline(app_id: &str, id: &str, stages: Vec<PipelineStage>) -> Pipeline {
    Pipeline {
        id: id.to_owned(),
        app_id: app_id.to_owned(),
        stages,
    }
}

/// A stage executing the given workflow.
pub fn env_stage(workflow_id: &str) -> PipelineStage {
    PipelineStage {
        elements: vec![PipelineStageElement {
            kind: StageElementKind::EnvState,
            workflow_id: Some(workflow_id.to_owned()),
            workflow_variables: HashMap::new(),
            disable_assertion: false,
        }],
    }
}

/// A stage executing the given workflow with variable values, for templatized
/// workflows.
pub fn env_stage_with_variables(
    workflow_id: &str,
    variables: &[(&str, &str)],
) -> PipelineStage {
    PipelineStage {
        elements: vec![PipelineStageElement {
            kind: StageElementKind::EnvState,
            workflow_id: Some(workflow_id.to_owned()),
            workflow_variables: variables
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            disable_assertion: false,
        }],
    }
}

/// An approval stage; carries no workflow and matches any environment scope.
pub fn approval_stage() -> PipelineStage {
    PipelineStage {
        elements: vec![PipelineStageElement {
            kind: StageElementKind::Approval,
            workflow_id: None,
            workflow_variables: HashMap::new(),
            disable_assertion: false,
        }],
    }
}
