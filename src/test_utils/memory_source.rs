// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use thiserror::Error;

use crate::entity::{Environment, Pipeline, Provisioner, Service, Template, Workflow};
use crate::traits::EntitySource;

/// Error of [`MemorySource`]. The source can be primed to fail every fetch,
/// for exercising fail-fast evaluation paths.
#[derive(Debug, Error)]
#[error("in-memory source failure")]
pub struct MemorySourceError;

/// [`EntitySource`] backed by plain vectors.
#[derive(Debug, Default)]
pub struct MemorySource {
    pub app_ids: HashSet<String>,
    pub services: Vec<Service>,
    pub provisioners: Vec<Provisioner>,
    pub environments: Vec<Environment>,
    pub workflows: Vec<Workflow>,
    pub pipelines: Vec<Pipeline>,
    pub templates: Vec<Template>,
    /// When set, every fetch fails.
    pub fail_fetches: bool,
}

impl MemorySource {
    pub fn with_app_ids(app_ids: &[&str]) -> Self {
        MemorySource {
            app_ids: app_ids.iter().map(|id| (*id).to_owned()).collect(),
            ..MemorySource::default()
        }
    }

    fn check(&self) -> Result<(), MemorySourceError> {
        if self.fail_fetches {
            Err(MemorySourceError)
        } else {
            Ok(())
        }
    }
}

impl EntitySource for MemorySource {
    type Error = MemorySourceError;

    fn app_ids(&self, _account_id: &str) -> Result<HashSet<String>, Self::Error> {
        self.check()?;
        Ok(self.app_ids.clone())
    }

    fn services(&self, _account_id: &str) -> Result<Vec<Service>, Self::Error> {
        self.check()?;
        Ok(self.services.clone())
    }

    fn provisioners(&self, _account_id: &str) -> Result<Vec<Provisioner>, Self::Error> {
        self.check()?;
        Ok(self.provisioners.clone())
    }

    fn environments(&self, _account_id: &str) -> Result<Vec<Environment>, Self::Error> {
        self.check()?;
        Ok(self.environments.clone())
    }

    fn workflows(&self, _account_id: &str) -> Result<Vec<Workflow>, Self::Error> {
        self.check()?;
        Ok(self.workflows.clone())
    }

    fn pipelines(&self, _account_id: &str) -> Result<Vec<Pipeline>, Self::Error> {
        self.check()?;
        Ok(self.pipelines.clone())
    }

    fn templates(&self, _account_id: &str) -> Result<Vec<Template>, Self::Error> {
        self.check()?;
        Ok(self.templates.clone())
    }

    fn workflow(&self, app_id: &str, workflow_id: &str) -> Result<Option<Workflow>, Self::Error> {
        self.check()?;
        Ok(self
            .workflows
            .iter()
            .find(|workflow| workflow.app_id == app_id && workflow.id == workflow_id)
            .cloned())
    }

    fn workflows_by_ids(
        &self,
        workflow_ids: &HashSet<String>,
    ) -> Result<Vec<Workflow>, Self::Error> {
        self.check()?;
        Ok(self
            .workflows
            .iter()
            .filter(|workflow| workflow_ids.contains(&workflow.id))
            .cloned()
            .collect())
    }
}
