use std::{collections::HashMap, fs, path::Path};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{CaseDataProvider, ProviderError};
use crate::error::Rejection;

/// A case data provider backed by a YAML file.
///
/// ```yaml
/// cases:
///   CF-2016-644:
///     parties:
///       - id: "1"
///         name: "Jane Doe"
///         events:
///           - date: "2026-11-02"
///             time: "09:00"
///             description: "Arraignment"
///             location: "Courtroom 4"
/// ```
///
/// Case numbers are matched case-insensitively. Unknown cases and parties
/// yield an empty list, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureProvider {
    #[serde(default)]
    cases: HashMap<String, FixtureCase>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureCase {
    #[serde(default)]
    pub parties: Vec<FixtureParty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureParty {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub events: Vec<Value>,
}

impl FixtureProvider {
    pub fn from_yaml(contents: &str) -> Result<Self, ProviderError> {
        let parsed: FixtureProvider = serde_yaml_bw::from_str(contents)?;
        let cases = parsed
            .cases
            .into_iter()
            .map(|(case_id, case)| (case_id.to_uppercase(), case))
            .collect();
        Ok(Self { cases })
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let contents = fs::read_to_string(path)?;
        let provider = Self::from_yaml(&contents)?;
        info!("Loaded {} case(s) from {}", provider.cases.len(), path.display());
        Ok(provider)
    }

    pub fn insert_case(&mut self, case_id: &str, case: FixtureCase) {
        self.cases.insert(case_id.to_uppercase(), case);
    }

    fn case(&self, case_id: &str) -> Option<&FixtureCase> {
        self.cases.get(&case_id.trim().to_uppercase())
    }
}

#[async_trait]
impl CaseDataProvider for FixtureProvider {
    fn name(&self) -> String {
        "fixture".to_string()
    }

    async fn parties(&self, case_id: &str) -> Result<Vec<Value>, Rejection> {
        let Some(case) = self.case(case_id) else {
            debug!(case_id, "no fixture for case");
            return Ok(Vec::new());
        };
        let parties = case
            .parties
            .iter()
            .map(|p| serde_json::json!({ "id": p.id, "name": p.name }))
            .collect();
        Ok(parties)
    }

    async fn party_events(&self, case_id: &str, party_id: &str) -> Result<Vec<Value>, Rejection> {
        let events = self
            .case(case_id)
            .and_then(|case| case.parties.iter().find(|p| p.id == party_id))
            .map(|party| party.events.clone())
            .unwrap_or_default();
        Ok(events)
    }
}
