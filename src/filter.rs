// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filter shapes carried by grants and their evaluation against candidate
//! entity sets. Every evaluation returns a subset of the candidates; filters
//! never invent ids.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entity::{AppEntity, Environment, EnvironmentType, Workflow};
use crate::summary::EnvInfo;

/// Selects which applications of an account a grant applies to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AppFilter {
    All,
    Selected(HashSet<String>),
    ExcludeSelected(HashSet<String>),
}

impl AppFilter {
    /// Resolve against the account's full app id universe. An absent filter
    /// selects every application.
    pub fn apply(filter: Option<&AppFilter>, all_app_ids: &HashSet<String>) -> HashSet<String> {
        match filter {
            None | Some(AppFilter::All) => all_app_ids.clone(),
            Some(AppFilter::Selected(ids)) => all_app_ids.intersection(ids).cloned().collect(),
            Some(AppFilter::ExcludeSelected(ids)) => {
                all_app_ids.difference(ids).cloned().collect()
            }
        }
    }
}

/// Id-based entity selection, used by the types without an environment
/// dimension and by the by-name addressing mode of workflows and pipelines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GenericEntityFilter {
    All,
    Selected(HashSet<String>),
}

impl GenericEntityFilter {
    /// Matching ids out of `entities`. An absent filter selects all.
    pub fn apply<E: AppEntity>(
        filter: Option<&GenericEntityFilter>,
        entities: &[E],
    ) -> HashSet<String> {
        match filter {
            None | Some(GenericEntityFilter::All) => {
                entities.iter().map(|entity| entity.id().to_owned()).collect()
            }
            Some(GenericEntityFilter::Selected(ids)) => entities
                .iter()
                .filter(|entity| ids.contains(entity.id()))
                .map(|entity| entity.id().to_owned())
                .collect(),
        }
    }
}

/// Environment selection: by coarse environment type, or by explicit ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EnvFilter {
    ByType(HashSet<EnvironmentType>),
    Selected(HashSet<String>),
}

impl Default for EnvFilter {
    fn default() -> Self {
        EnvFilter::ByType(HashSet::from([
            EnvironmentType::Prod,
            EnvironmentType::NonProd,
        ]))
    }
}

impl EnvFilter {
    /// The effective filter: an absent filter and an empty type set both fall
    /// back to every environment type.
    pub(crate) fn effective(filter: Option<&EnvFilter>) -> EnvFilter {
        match filter {
            None => EnvFilter::default(),
            Some(EnvFilter::ByType(types)) if types.is_empty() => EnvFilter::default(),
            Some(filter) => filter.clone(),
        }
    }

    /// Ids of the matching environments.
    pub fn env_ids(filter: Option<&EnvFilter>, environments: &[Environment]) -> HashSet<String> {
        match EnvFilter::effective(filter) {
            EnvFilter::Selected(ids) => environments
                .iter()
                .filter(|env| ids.contains(&env.id))
                .map(|env| env.id.clone())
                .collect(),
            EnvFilter::ByType(types) => environments
                .iter()
                .filter(|env| types.contains(&env.environment_type))
                .map(|env| env.id.clone())
                .collect(),
        }
    }

    /// Matching environments with their type tag.
    pub fn env_infos(filter: Option<&EnvFilter>, environments: &[Environment]) -> HashSet<EnvInfo> {
        let matched = EnvFilter::env_ids(filter, environments);
        environments
            .iter()
            .filter(|env| matched.contains(&env.id))
            .map(|env| EnvInfo {
                env_id: env.id.clone(),
                env_type: env.environment_type,
            })
            .collect()
    }

    /// Environment types this filter allows creating environments of.
    /// Id-based filters contribute no types.
    pub fn create_env_types(filter: Option<&EnvFilter>) -> HashSet<EnvironmentType> {
        match EnvFilter::effective(filter) {
            EnvFilter::ByType(types) => types,
            EnvFilter::Selected(_) => HashSet::new(),
        }
    }
}

/// Workflow selection through environments. The environment scope is the
/// union of the explicit id selection (when present) and the type tags;
/// `templates` additionally matches workflows whose environment is supplied
/// at execution time through a template variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFilter {
    pub env_types: HashSet<EnvironmentType>,
    pub templates: bool,
    /// `Some` mirrors an explicit id selection; `None` means the filter only
    /// carries type tags.
    pub env_ids: Option<HashSet<String>>,
}

impl Default for WorkflowFilter {
    fn default() -> Self {
        WorkflowFilter {
            env_types: HashSet::from([EnvironmentType::Prod, EnvironmentType::NonProd]),
            templates: true,
            env_ids: None,
        }
    }
}

impl WorkflowFilter {
    /// The effective filter: one carrying nothing at all falls back to every
    /// environment type plus templatized workflows.
    pub(crate) fn effective(filter: Option<&WorkflowFilter>) -> WorkflowFilter {
        match filter {
            None => WorkflowFilter::default(),
            Some(filter)
                if filter.env_types.is_empty() && !filter.templates && filter.env_ids.is_none() =>
            {
                WorkflowFilter::default()
            }
            Some(filter) => filter.clone(),
        }
    }

    /// Ids of the environments the filter's environment scope covers.
    fn matched_env_ids(&self, environments: &[Environment]) -> HashSet<String> {
        environments
            .iter()
            .filter(|env| {
                self.env_ids
                    .as_ref()
                    .is_some_and(|ids| ids.contains(&env.id))
                    || self.env_types.contains(&env.environment_type)
            })
            .map(|env| env.id.clone())
            .collect()
    }

    /// Matching workflow ids. Templatized workflows match on the `templates`
    /// tag alone; a workflow with no environment at all always matches.
    pub fn workflow_ids(
        filter: Option<&WorkflowFilter>,
        workflows: &[Workflow],
        environments: &[Environment],
    ) -> HashSet<String> {
        let filter = WorkflowFilter::effective(filter);
        let env_ids = filter.matched_env_ids(environments);

        workflows
            .iter()
            .filter(|workflow| {
                if workflow.is_env_templatized() {
                    return filter.templates;
                }
                match &workflow.env_id {
                    None => true,
                    Some(env_id) => env_ids.contains(env_id),
                }
            })
            .map(|workflow| workflow.id.clone())
            .collect()
    }

    /// The env-shaped view of this filter, with the precedence a plain env
    /// filter uses: an explicit id selection wins over type tags.
    pub fn as_env_filter(filter: Option<&WorkflowFilter>) -> EnvFilter {
        let filter = WorkflowFilter::effective(filter);
        match filter.env_ids {
            Some(ids) => EnvFilter::Selected(ids),
            None => EnvFilter::ByType(filter.env_types),
        }
    }

    /// Widen an env filter into a workflow filter: same environment scope,
    /// plus templatized workflows (deployments must also cover workflows
    /// whose environment is supplied at execution time).
    pub fn from_env_filter(env_filter: Option<&EnvFilter>) -> WorkflowFilter {
        match EnvFilter::effective(env_filter) {
            EnvFilter::ByType(types) => WorkflowFilter {
                env_types: types,
                templates: true,
                env_ids: None,
            },
            EnvFilter::Selected(ids) => WorkflowFilter {
                env_types: HashSet::new(),
                templates: true,
                env_ids: Some(ids),
            },
        }
    }
}

/// Which executable element kind an [`ExecutableElementsFilter`] addresses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ExecutableElementKind {
    Pipeline,
    Workflow,
}

/// Deployment grant scoped to specific executable elements: an environment
/// scope plus an id selection over the pipelines or workflows deployable into
/// those environments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutableElementsFilter {
    pub env_filter: EnvFilter,
    pub element_kind: ExecutableElementKind,
    pub elements: GenericEntityFilter,
}

/// The polymorphic per-entity filter carried by a grant. Which variants are
/// legal depends on the grant's permission type; a mismatch surfaces as
/// [`EvaluationError::InvalidFilterType`](crate::aggregate::EvaluationError).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityFilter {
    Generic(GenericEntityFilter),
    Env(EnvFilter),
    Workflow(WorkflowFilter),
    Executable(ExecutableElementsFilter),
}

impl EntityFilter {
    pub fn is_generic(&self) -> bool {
        matches!(self, EntityFilter::Generic(_))
    }

    pub fn as_generic(&self) -> Option<&GenericEntityFilter> {
        match self {
            EntityFilter::Generic(filter) => Some(filter),
            _ => None,
        }
    }

    /// Env-shaped view. Workflow filters degrade to their environment part,
    /// executable-element filters expose their environment scope.
    pub fn as_env(&self) -> Option<EnvFilter> {
        match self {
            EntityFilter::Env(filter) => Some(filter.clone()),
            EntityFilter::Executable(filter) => Some(filter.env_filter.clone()),
            EntityFilter::Workflow(filter) => Some(WorkflowFilter::as_env_filter(Some(filter))),
            EntityFilter::Generic(_) => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowFilter> {
        match self {
            EntityFilter::Workflow(filter) => Some(filter),
            _ => None,
        }
    }
}
