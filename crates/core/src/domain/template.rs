use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalChain;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub title: String,
    pub required_role: Option<String>,
}

impl StepTemplate {
    pub fn new(title: impl Into<String>, required_role: impl Into<String>) -> Self {
        Self { title: title.into(), required_role: Some(required_role.into()) }
    }
}

/// Fixed titles and order used by request intake to open a new chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTemplate {
    pub steps: Vec<StepTemplate>,
}

impl Default for ChainTemplate {
    /// Submission, registrar, department head, accounting, director.
    fn default() -> Self {
        Self {
            steps: vec![
                StepTemplate::new("Dépôt de la demande", "accueil"),
                StepTemplate::new("Service Scolarité", "scolarite"),
                StepTemplate::new("Chef de Département", "chef_departement"),
                StepTemplate::new("Service Comptabilité", "comptabilite"),
                StepTemplate::new("Direction", "directeur"),
            ],
        }
    }
}

impl ChainTemplate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.steps.is_empty() {
            return Err(DomainError::InvalidArgument(
                "chain template needs at least one step".to_string(),
            ));
        }
        if let Some(position) = self.steps.iter().position(|step| step.title.trim().is_empty()) {
            return Err(DomainError::InvalidArgument(format!(
                "chain template step {} has an empty title",
                position + 1
            )));
        }
        Ok(())
    }

    pub fn instantiate(&self) -> Result<ApprovalChain, DomainError> {
        self.validate()?;
        ApprovalChain::pending(
            self.steps.iter().map(|step| (step.title.clone(), step.required_role.clone())),
        )
    }
}
